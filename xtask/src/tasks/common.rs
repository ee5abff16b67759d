use std::path::Path;

use anyhow::{Context, Result};
use burn::backend::{Autodiff, Wgpu};
use steel_defect_unet::DefectTable;

pub type MyBackend = Wgpu<f32, i32>;
pub type MyAutodiffBackend = Autodiff<MyBackend>;

pub const TRAIN_CSV: &str = "train.csv";
pub const SUBMISSION_CSV: &str = "sample_submission.csv";
pub const HISTORY_FILE: &str = "history.json";
pub const TRAINING_CONFIG_FILE: &str = "training.json";

pub fn load_table(data_dir: &Path, file: &str) -> Result<DefectTable> {
    let path = data_dir.join(file);
    let table = DefectTable::from_path(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    log::info!("Loaded {} images from {}", table.len(), path.display());
    Ok(table)
}

/// The deterministic train/validation split shared by `train` and `evaluate`.
pub fn split_train_table(data_dir: &Path, train_ratio: f64) -> Result<(DefectTable, DefectTable)> {
    let table = load_table(data_dir, TRAIN_CSV)?;
    let (train, valid) = table.split_at_fraction(train_ratio);
    log::info!("Split into {} train and {} valid images", train.len(), valid.len());
    Ok((train, valid))
}
