use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::wgpu::WgpuDevice;
use clap::Args;
use steel_defect_unet::training::{load_model, predict};
use steel_defect_unet::{
    BatchGenerator, DefectTable, FolderSource, GeneratorConfig, Normalize, SOURCE_SHAPE, Subset,
    to_submission,
};

use super::common::{MyBackend, SUBMISSION_CSV, load_table};

#[derive(Args)]
pub struct PredictArgs {
    #[arg(short, long)]
    pub data_dir: PathBuf,

    #[arg(short, long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,

    /// Only predict the first N batches
    #[arg(long)]
    pub batches: Option<usize>,

    #[arg(short, long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(short, long, default_value_t = 0.5)]
    pub threshold: f32,

    #[arg(long, default_value_t = 250)]
    pub min_pixels: usize,

    #[arg(short, long, default_value = "submission.csv")]
    pub out: PathBuf,
}

pub fn run(args: &PredictArgs) -> Result<()> {
    let device = WgpuDevice::default();
    let (model, model_config) = load_model::<MyBackend, _>(&args.artifact_dir, &device)
        .with_context(|| format!("Failed to load model from {}", args.artifact_dir.display()))?;

    let table = load_table(&args.data_dir, SUBMISSION_CSV)?;
    let table = match args.batches {
        Some(n) => {
            let keep: Vec<usize> = (0..(n * args.batch_size).min(table.len())).collect();
            table.subset(&keep)
        }
        None => table,
    };
    let table = DefectTable::from_image_ids(table.iter().map(|row| row.image_id.clone()));
    if args.batch_size > 0 && table.len() % args.batch_size != 0 {
        log::warn!(
            "The last {} images do not fill a batch and are left out of the submission",
            table.len() % args.batch_size
        );
    }

    let subset = Subset::Test;
    let source = FolderSource::new(&args.data_dir, &subset);
    let config = GeneratorConfig::new(subset)
        .with_batch_size(args.batch_size)
        .with_resize_shape(model_config.input_size);
    let normalize = Normalize::unit_range();
    let generator = BatchGenerator::new(table, config, source)?
        .with_preprocess(move |images| normalize.apply(images));

    let predictions = predict(&model, &generator, &device)?;
    let submission = to_submission(&predictions, args.threshold, args.min_pixels, SOURCE_SHAPE);

    let file = File::create(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;
    submission.write_class_csv(file)?;

    let defective = submission.iter().filter(|row| row.count() > 0).count();
    println!(
        "Wrote {} images ({} with defects) to {}",
        submission.len(),
        defective,
        args.out.display()
    );
    Ok(())
}
