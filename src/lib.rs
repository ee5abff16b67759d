pub mod defect;
pub mod mask;
pub mod morphology;
pub mod overlay;
pub mod prediction;
pub mod rle;

#[cfg(feature = "models")]
pub mod model;

#[cfg(feature = "dataset")]
pub mod dataset;

#[cfg(feature = "dataset")]
pub mod evaluation;

#[cfg(feature = "training")]
pub mod training;

pub use defect::{DefectClass, NUM_CLASSES};
pub use mask::{Mask, RESIZE_SHAPE, SOURCE_SHAPE, Shape};
pub use prediction::{Predictions, ProbabilityMap};
pub use rle::{Rle, RleError};

#[cfg(feature = "unet")]
pub use model::{OutputActivation, UNet, UNetConfig};

#[cfg(feature = "dataset")]
pub use dataset::{
    BatchGenerator, BatchRecord, DatasetError, DefectRow, DefectTable, FolderSource,
    GeneratorConfig, ImageSource, Normalize, Subset,
};

#[cfg(feature = "dataset")]
pub use evaluation::{ThresholdConfig, ThresholdEvaluator, ThresholdReport, to_submission};

#[cfg(feature = "training")]
pub use training::{History, TrainingConfig, TrainingError, dice_coefficient};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
