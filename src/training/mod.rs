pub mod learner;
pub mod loss;
pub mod metrics;
mod renderer;
mod trainer;

pub use learner::{EpochSummary, History, SegmentationOutput};
pub use loss::{BceLoss, BceLossConfig};
pub use metrics::{DiceInput, DiceMetric, dice_coefficient};
pub use renderer::LogRenderer;
pub use trainer::{
    MODEL_CONFIG_FILE, MODEL_FILE, TrainingConfig, TrainingError, fit, load_model, predict,
    save_model,
};
