use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{backend::wgpu::WgpuDevice, optim::AdamConfig, prelude::*};
use clap::Args;
use steel_defect_unet::training::{fit, save_model};
use steel_defect_unet::{
    BatchGenerator, DefectTable, FolderSource, GeneratorConfig, Normalize, RESIZE_SHAPE, Subset,
    TrainingConfig, UNetConfig,
};

use super::common::{HISTORY_FILE, MyAutodiffBackend, TRAINING_CONFIG_FILE, split_train_table};

#[derive(Args)]
pub struct TrainArgs {
    #[arg(short, long)]
    pub data_dir: PathBuf,

    #[arg(short, long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,

    #[arg(short, long, default_value_t = 1)]
    pub epochs: usize,

    #[arg(short, long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(short, long, default_value_t = 0.001)]
    pub lr: f64,

    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,

    #[arg(long, default_value_t = 0.8)]
    pub train_ratio: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

fn create_artifact_dir(artifact_dir: &Path) -> Result<()> {
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir)
        .with_context(|| format!("Failed to create {}", artifact_dir.display()))
}

fn generator(
    data_dir: &Path,
    table: DefectTable,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
) -> Result<BatchGenerator<FolderSource>> {
    let subset = Subset::Train;
    let source = FolderSource::new(data_dir, &subset);
    let config = GeneratorConfig::new(subset)
        .with_batch_size(batch_size)
        .with_shuffle(shuffle)
        .with_seed(Some(seed));
    let normalize = Normalize::unit_range();

    let generator = BatchGenerator::new(table, config, source)?;
    Ok(generator.with_preprocess(move |images| normalize.apply(images)))
}

pub fn run(args: &TrainArgs) -> Result<()> {
    create_artifact_dir(&args.artifact_dir)?;

    println!("Initializing device...");
    let device = WgpuDevice::default();

    let (train_table, valid_table) = split_train_table(&args.data_dir, args.train_ratio)?;
    let train = generator(&args.data_dir, train_table, args.batch_size, true, args.seed)?;
    let valid = generator(&args.data_dir, valid_table, args.batch_size, false, args.seed)?;
    println!(
        "Loaded {} train batches and {} valid batches of {} images",
        train.len(),
        valid.len(),
        args.batch_size
    );

    let config = TrainingConfig::new(
        UNetConfig::new(RESIZE_SHAPE).with_base_channels(args.base_channels),
        AdamConfig::new(),
    )
    .with_num_epochs(args.epochs)
    .with_learning_rate(args.lr)
    .with_seed(args.seed);
    config
        .save(args.artifact_dir.join(TRAINING_CONFIG_FILE))
        .context("Failed to save training config")?;

    println!(
        "Creating U-Net model with {} base channels...",
        args.base_channels
    );
    let model = config.model.init::<MyAutodiffBackend>(&device);

    let (model_trained, history) =
        fit(model, &config, train, valid, &args.artifact_dir, &device)?;

    save_model(&model_trained, &config.model, &args.artifact_dir)?;
    let history_path = args.artifact_dir.join(HISTORY_FILE);
    let file = File::create(&history_path)
        .with_context(|| format!("Failed to create {}", history_path.display()))?;
    serde_json::to_writer_pretty(file, &history)?;

    if let Some(best) = history.best_valid_dice() {
        println!("Best valid dice {:.4} at epoch {}", best.valid_dice, best.epoch);
    }
    println!("Training completed successfully!");
    Ok(())
}
