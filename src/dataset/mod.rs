mod batcher;
mod generator;
mod loader;
mod table;

use std::path::PathBuf;

use thiserror::Error;

use crate::defect::DefectClass;
use crate::rle::RleError;

pub use batcher::{SegmentationBatch, SegmentationBatcher};
pub use generator::{
    BatchGenerator, BatchRecord, FolderSource, GeneratorConfig, ImageSource, ImageTensor,
    MaskTensor, Normalize, SteelSample, Subset,
};
pub use loader::GeneratorDataset;
pub use table::{DefectRow, DefectTable};

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("I/O error: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("CSV error: `{0}`")]
    CsvError(#[from] csv::Error),

    #[error("Unable to load image `{path:?}`: {source}")]
    ImageError {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid `ImageId_ClassId` value: `{0}`")]
    InvalidImageClassId(String),

    #[error("Rows {start} to {end} do not hold classes 1-4 of a single image", end = .start + 3)]
    MalformedGroup { start: usize },

    #[error("Row count {0} is not a multiple of 4")]
    IncompleteGroup(usize),

    #[error("Batch {index} is out of range for {len} batches")]
    BatchOutOfRange { index: usize, len: usize },

    #[error("Batch size must be positive")]
    ZeroBatchSize,

    #[error("Invalid encoding for `{image_id}` class {class}: {source}")]
    InvalidEncoding {
        image_id: String,
        class: DefectClass,
        #[source]
        source: RleError,
    },
}
