use std::path::Path;
use std::sync::{Arc, mpsc};

use burn::{
    backend::NdArray,
    data::dataloader::{DataLoaderBuilder, batcher::Batcher},
    optim::AdamConfig,
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{
        LearnerBuilder, LearnerSummary, MetricSummary,
        metric::{LossMetric, Metric},
    },
};
use thiserror::Error;

use super::learner::{EpochSummary, History};
use super::metrics::DiceMetric;
use super::renderer::LogRenderer;
use crate::dataset::{
    BatchGenerator, DatasetError, GeneratorDataset, ImageSource, SegmentationBatcher,
};
use crate::model::{UNet, UNetConfig};
use crate::prediction::Predictions;

/// Recorder file name; [CompactRecorder] appends the `.mpk` extension.
pub const MODEL_FILE: &str = "model";
pub const MODEL_CONFIG_FILE: &str = "config.json";

const LOG_EVERY: usize = 50;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("I/O error: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("Unable to record model: {0}")]
    Recorder(String),

    #[error("Invalid model config: {0}")]
    Config(String),

    #[error("Unable to read tensor data: {0}")]
    TensorData(String),

    #[error("Unable to summarize training: {0}")]
    Summary(String),
}

#[derive(Config)]
pub struct TrainingConfig {
    pub model: UNetConfig,
    pub optimizer: AdamConfig,
    #[config(default = 1)]
    pub num_epochs: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = 42)]
    pub seed: u64,
}

/// Trains `model` for `config.num_epochs` epochs, validating after each one.
///
/// Both generators reshuffle at the start of every epoch. Metric logs are written under
/// `artifact_dir/train` and `artifact_dir/valid`; the returned [History] holds their
/// per-epoch means.
pub fn fit<B, S>(
    model: UNet<B>,
    config: &TrainingConfig,
    train: BatchGenerator<S>,
    valid: BatchGenerator<S>,
    artifact_dir: &Path,
    device: &B::Device,
) -> Result<(UNet<B>, History), TrainingError>
where
    B: AutodiffBackend,
    S: ImageSource + Send + 'static,
{
    B::seed(config.seed);

    log::info!(
        "Training for {} epochs: {} train batches, {} valid batches",
        config.num_epochs,
        train.len(),
        valid.len()
    );

    let train = Arc::new(GeneratorDataset::new(train));
    let valid = Arc::new(GeneratorDataset::new(valid));

    let dataloader_train = DataLoaderBuilder::new(SegmentationBatcher::<B>::new(device.clone()))
        .batch_size(train.batch_size())
        .build(train.clone());
    let dataloader_valid =
        DataLoaderBuilder::new(SegmentationBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(valid.batch_size())
            .build(valid.clone());

    let (done, finished) = mpsc::channel();
    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(DiceMetric::new())
        .metric_valid_numeric(DiceMetric::new())
        .renderer(LogRenderer::new(LOG_EVERY, done))
        .with_application_logger(None)
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .build(model, config.optimizer.init(), config.learning_rate);

    let model = learner.fit(dataloader_train, dataloader_valid);

    if let Some(error) = train.take_error().or_else(|| valid.take_error()) {
        return Err(error.into());
    }

    // metric logs are complete once the renderer saw the last event
    finished
        .recv()
        .map_err(|_| TrainingError::Summary("training ended before its last event".into()))?;
    let history = read_history(artifact_dir, config.num_epochs)?;

    for summary in &history.epochs {
        log::info!(
            "[Epoch {}] train loss {:.4} dice {:.4} | valid loss {:.4} dice {:.4}",
            summary.epoch,
            summary.train_loss,
            summary.train_dice,
            summary.valid_loss,
            summary.valid_dice
        );
    }

    Ok((model, history))
}

/// Per-epoch means of the loss and dice logs under `artifact_dir`. Missing values are NaN.
fn read_history(artifact_dir: &Path, num_epochs: usize) -> Result<History, TrainingError> {
    let loss = LossMetric::<NdArray>::NAME;
    let dice = DiceMetric::<NdArray>::NAME;

    let summary =
        LearnerSummary::new(artifact_dir, &[loss, dice]).map_err(TrainingError::Summary)?;
    let train = &summary.metrics.train;
    let valid = &summary.metrics.valid;

    let mut history = History::default();
    for epoch in 1..=summary.epochs.min(num_epochs) {
        history.push(EpochSummary::new(
            epoch,
            epoch_mean(train, loss, epoch),
            epoch_mean(train, dice, epoch),
            epoch_mean(valid, loss, epoch),
            epoch_mean(valid, dice, epoch),
        ));
    }

    Ok(history)
}

fn epoch_mean(metrics: &[MetricSummary], name: &str, epoch: usize) -> f64 {
    metrics
        .iter()
        .find(|metric| metric.name == name)
        .and_then(|metric| metric.entries.iter().find(|entry| entry.step == epoch))
        .map_or(f64::NAN, |entry| entry.value)
}

/// Runs the model over every batch of `generator`, in order. Masks are ignored.
pub fn predict<B, S>(
    model: &UNet<B>,
    generator: &BatchGenerator<S>,
    device: &B::Device,
) -> Result<Predictions, TrainingError>
where
    B: Backend,
    S: ImageSource,
{
    let batcher = SegmentationBatcher::<B>::new(device.clone());
    let mut predictions = Predictions::new(generator.config().resize_shape);

    for record in generator.iter() {
        let record = record?;
        let image_ids = record.image_ids.clone();
        let batch = batcher.batch(record.into_samples());

        let probs = model
            .forward(batch.images)
            .permute([0, 2, 3, 1])
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| TrainingError::TensorData(format!("{e:?}")))?;

        let per_image = probs.len() / image_ids.len().max(1);
        for (image_id, chunk) in image_ids.into_iter().zip(probs.chunks_exact(per_image)) {
            predictions.push(image_id, chunk);
        }
    }

    log::debug!("Predicted {} images", predictions.len());
    Ok(predictions)
}

/// Writes the weights and the model config to `dir`.
pub fn save_model<B: Backend, P: AsRef<Path>>(
    model: &UNet<B>,
    config: &UNetConfig,
    dir: P,
) -> Result<(), TrainingError> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    config.save(dir.join(MODEL_CONFIG_FILE))?;
    model
        .clone()
        .save_file(dir.join(MODEL_FILE), &CompactRecorder::new())
        .map_err(|e| TrainingError::Recorder(format!("{e:?}")))?;

    log::info!("Saved model to {}", dir.display());
    Ok(())
}

pub fn load_model<B: Backend, P: AsRef<Path>>(
    dir: P,
    device: &B::Device,
) -> Result<(UNet<B>, UNetConfig), TrainingError> {
    let dir = dir.as_ref();

    let config = UNetConfig::load(dir.join(MODEL_CONFIG_FILE))
        .map_err(|e| TrainingError::Config(format!("{e:?}")))?;
    let model = config
        .init::<B>(device)
        .load_file(dir.join(MODEL_FILE), &CompactRecorder::new(), device)
        .map_err(|e| TrainingError::Recorder(format!("{e:?}")))?;

    Ok((model, config))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use burn::backend::{Autodiff, NdArray};
    use image::RgbImage;

    use super::*;
    use crate::dataset::{DefectRow, DefectTable, GeneratorConfig, Subset};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    struct MemorySource(HashMap<String, RgbImage>);

    impl ImageSource for MemorySource {
        fn load(&self, image_id: &str) -> Result<RgbImage, DatasetError> {
            self.0.get(image_id).cloned().ok_or_else(|| DatasetError::ImageError {
                path: image_id.into(),
                source: image::ImageError::IoError(std::io::ErrorKind::NotFound.into()),
            })
        }
    }

    fn generator(n: usize, subset: Subset) -> BatchGenerator<MemorySource> {
        let table = DefectTable::new(
            (0..n)
                .map(|i| {
                    DefectRow::new(
                        format!("{i}.jpg"),
                        ["1 64".to_string(), String::new(), String::new(), String::new()],
                    )
                })
                .collect(),
        );
        let images = (0..n)
            .map(|i| {
                let image = RgbImage::from_pixel(32, 16, image::Rgb([40 * i as u8; 3]));
                (format!("{i}.jpg"), image)
            })
            .collect();
        let config = GeneratorConfig::new(subset)
            .with_batch_size(2)
            .with_resize_shape([16, 32])
            .with_source_shape([32, 64]);

        BatchGenerator::new(table, config, MemorySource(images))
            .unwrap()
            .with_preprocess(|images| images.data_mut().iter_mut().for_each(|v| *v /= 255.0))
    }

    fn model_config() -> UNetConfig {
        UNetConfig::new([16, 32]).with_base_channels(2).with_depth(2)
    }

    fn artifact_dir(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("steel-{name}-{}", std::process::id()))
    }

    #[test]
    fn fit_records_one_summary_per_epoch() {
        let device = Default::default();
        let config = TrainingConfig::new(model_config(), AdamConfig::new()).with_num_epochs(2);
        let model = config.model.init::<TestAutodiffBackend>(&device);
        let dir = artifact_dir("fit");

        let train = generator(4, Subset::Train);
        let valid = generator(2, Subset::Train);
        let (_, history) = fit(model, &config, train, valid, &dir, &device).unwrap();

        assert_eq!(history.epochs.len(), 2);
        for (epoch, summary) in (1..).zip(&history.epochs) {
            assert_eq!(summary.epoch, epoch);
            assert!(summary.train_loss.is_finite() && summary.valid_loss.is_finite());
            assert!(summary.train_dice > 0.0 && summary.train_dice <= 1.0);
            assert!(summary.valid_dice > 0.0 && summary.valid_dice <= 1.0);
        }
        assert!(dir.join("train").join("epoch-2").join("Dice.log").exists());
        assert!(dir.join("valid").join("epoch-1").join("Loss.log").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn fit_reports_images_that_fail_to_load() {
        let device = Default::default();
        let config = TrainingConfig::new(model_config(), AdamConfig::new());
        let model = config.model.init::<TestAutodiffBackend>(&device);
        let dir = artifact_dir("fit-error");

        let train = generator(4, Subset::Train);
        let table = train.table().clone();
        let valid_config = train.config().clone();
        let valid = BatchGenerator::new(table, valid_config, MemorySource(HashMap::new())).unwrap();

        let result = fit(model, &config, train, valid, &dir, &device);
        assert!(matches!(
            result,
            Err(TrainingError::Dataset(DatasetError::ImageError { .. }))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn predict_keeps_batch_order() {
        let device = Default::default();
        let model = model_config().init::<TestBackend>(&device);
        let generator = generator(5, Subset::Test);

        let predictions = predict(&model, &generator, &device).unwrap();

        // five rows with a batch size of two leave the last image out
        assert_eq!(predictions.len(), 4);
        assert_eq!(predictions.shape(), [16, 32]);
        assert_eq!(predictions.image_ids(), &["0.jpg", "1.jpg", "2.jpg", "3.jpg"]);
    }

    #[test]
    fn saved_model_loads_back() {
        let device = Default::default();
        let config = model_config();
        let model = config.init::<TestBackend>(&device);
        let dir = std::env::temp_dir().join(format!("steel-model-{}", std::process::id()));

        save_model(&model, &config, &dir).unwrap();
        let (loaded, loaded_config) = load_model::<TestBackend, _>(&dir, &device).unwrap();

        assert_eq!(loaded_config.base_channels, 2);
        let images = Tensor::<TestBackend, 4>::ones([1, 3, 16, 32], &device);
        let expected = model.forward(images.clone()).into_data();
        loaded
            .forward(images)
            .into_data()
            .assert_approx_eq(&expected, 4);

        std::fs::remove_dir_all(&dir).ok();
    }
}
