use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::wgpu::WgpuDevice;
use clap::Args;
use steel_defect_unet::evaluation::HISTOGRAM_LIMITS;
use steel_defect_unet::training::{load_model, predict};
use steel_defect_unet::{
    BatchGenerator, DefectClass, FolderSource, GeneratorConfig, Normalize, Subset,
    ThresholdConfig, ThresholdEvaluator,
};

use super::common::{MyBackend, split_train_table};

const HISTOGRAM_BINS: usize = 20;

#[derive(Args)]
pub struct EvaluateArgs {
    #[arg(short, long)]
    pub data_dir: PathBuf,

    #[arg(short, long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,

    #[arg(short, long, value_delimiter = ',', default_values_t = [0.1, 0.25, 0.5, 0.75, 0.9])]
    pub thresholds: Vec<f32>,

    #[arg(long, default_value_t = 250)]
    pub min_pixels: usize,

    #[arg(short, long, default_value_t = 16)]
    pub batch_size: usize,

    /// Must match the ratio used for training
    #[arg(long, default_value_t = 0.8)]
    pub train_ratio: f64,
}

pub fn run(args: &EvaluateArgs) -> Result<()> {
    let device = WgpuDevice::default();
    let (model, model_config) = load_model::<MyBackend, _>(&args.artifact_dir, &device)
        .with_context(|| format!("Failed to load model from {}", args.artifact_dir.display()))?;

    let (_, valid_table) = split_train_table(&args.data_dir, args.train_ratio)?;

    let subset = Subset::Train;
    let source = FolderSource::new(&args.data_dir, &subset);
    let config = GeneratorConfig::new(subset)
        .with_batch_size(args.batch_size)
        .with_resize_shape(model_config.input_size);
    let normalize = Normalize::unit_range();
    let generator = BatchGenerator::new(valid_table, config, source)?
        .with_preprocess(move |images| normalize.apply(images));

    let predictions = predict(&model, &generator, &device)?;
    println!("Predicted {} validation images", predictions.len());

    let evaluator = ThresholdEvaluator::new(
        ThresholdConfig::new()
            .with_thresholds(args.thresholds.clone())
            .with_min_pixels(args.min_pixels),
    );
    let reports = evaluator.evaluate(&predictions, generator.table())?;

    for report in &reports {
        report.log_summary();
        println!("Threshold {}", report.threshold);
        for class in DefectClass::ALL {
            let (correct, incorrect) = report.counts(class);
            let limit = HISTOGRAM_LIMITS[class.channel()];
            let (correct_bins, incorrect_bins) = report.histogram(class, HISTOGRAM_BINS, limit);
            println!(
                "  defect {class}: {correct} correct, {incorrect} incorrect (areas < {limit})"
            );
            println!("    correct   {correct_bins:?}");
            println!("    incorrect {incorrect_bins:?}");
        }
    }

    Ok(())
}
