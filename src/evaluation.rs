//! Post-hoc threshold sweep over validation predictions.
//!
//! For every threshold the predicted area of each class is compared with the ground truth:
//! areas of images that do carry the defect land in `correct`, areas predicted on images
//! without it land in `incorrect`. Areas under the noise floor are ignored.

use burn::prelude::*;
use thiserror::Error;

use crate::dataset::{DefectRow, DefectTable};
use crate::defect::{DefectClass, NUM_CLASSES};
use crate::mask::Shape;
use crate::prediction::Predictions;
use crate::rle;

/// Upper bound of the area histograms per class.
pub const HISTOGRAM_LIMITS: [usize; NUM_CLASSES] = [10_000, 10_000, 100_000, 100_000];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("{predictions} predictions for a table of {rows} rows")]
    LengthMismatch { predictions: usize, rows: usize },

    #[error("Prediction {index} is for `{predicted}` but table row holds `{expected}`")]
    Misaligned {
        index: usize,
        predicted: String,
        expected: String,
    },
}

#[derive(Config, Debug)]
pub struct ThresholdConfig {
    #[config(default = "vec![0.1, 0.25, 0.5, 0.75, 0.9]")]
    pub thresholds: Vec<f32>,
    /// Areas below this many native pixels are treated as noise.
    #[config(default = 250)]
    pub min_pixels: usize,
    /// Native pixels per predicted pixel (2x2 for the default resize).
    #[config(default = 4)]
    pub area_scale: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdReport {
    pub threshold: f32,
    pub correct: [Vec<usize>; NUM_CLASSES],
    pub incorrect: [Vec<usize>; NUM_CLASSES],
}

impl ThresholdReport {
    fn new(threshold: f32) -> Self {
        Self {
            threshold,
            correct: Default::default(),
            incorrect: Default::default(),
        }
    }

    /// Number of non-zero `(correct, incorrect)` areas of `class`.
    pub fn counts(&self, class: DefectClass) -> (usize, usize) {
        let nonzero = |areas: &[usize]| areas.iter().filter(|&&a| a != 0).count();
        (
            nonzero(&self.correct[class.channel()]),
            nonzero(&self.incorrect[class.channel()]),
        )
    }

    /// Buckets `(correct, incorrect)` areas below `limit` into `bins` equal-width bins.
    pub fn histogram(
        &self,
        class: DefectClass,
        bins: usize,
        limit: usize,
    ) -> (Vec<usize>, Vec<usize>) {
        let bucket = |areas: &[usize]| {
            let mut counts = vec![0; bins];
            if bins == 0 || limit == 0 {
                return counts;
            }
            for &area in areas.iter().filter(|&&a| a < limit) {
                counts[(area * bins / limit).min(bins - 1)] += 1;
            }
            counts
        };

        (
            bucket(&self.correct[class.channel()]),
            bucket(&self.incorrect[class.channel()]),
        )
    }

    pub fn log_summary(&self) {
        for class in DefectClass::ALL {
            let (correct, incorrect) = self.counts(class);
            log::info!(
                "With threshold = {}, defect {} has {} correct and {} incorrect masks",
                self.threshold,
                class,
                correct,
                incorrect
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    config: ThresholdConfig,
}

impl ThresholdEvaluator {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    /// One report per configured threshold. Prediction `i` must belong to row `i` of `table`.
    pub fn evaluate(
        &self,
        predictions: &Predictions,
        table: &DefectTable,
    ) -> Result<Vec<ThresholdReport>, EvaluationError> {
        if predictions.len() > table.len() {
            return Err(EvaluationError::LengthMismatch {
                predictions: predictions.len(),
                rows: table.len(),
            });
        }

        for (index, (map, row)) in predictions.iter().zip(table.iter()).enumerate() {
            if map.image_id() != row.image_id {
                return Err(EvaluationError::Misaligned {
                    index,
                    predicted: map.image_id().to_string(),
                    expected: row.image_id.clone(),
                });
            }
        }

        let reports = self
            .config
            .thresholds
            .iter()
            .map(|&threshold| {
                let mut report = ThresholdReport::new(threshold);

                for (map, row) in predictions.iter().zip(table.iter()) {
                    for class in DefectClass::ALL {
                        let area = self.config.area_scale * map.count_at_least(class, threshold);
                        if area < self.config.min_pixels {
                            continue;
                        }

                        let bucket = if row.has_defect(class) {
                            &mut report.correct
                        } else {
                            &mut report.incorrect
                        };
                        bucket[class.channel()].push(area);
                    }
                }

                report
            })
            .collect();

        Ok(reports)
    }
}

/// Thresholds every prediction and encodes the masks at `source_shape`.
///
/// Masks covering fewer than `min_pixels` native pixels are left empty.
pub fn to_submission(
    predictions: &Predictions,
    threshold: f32,
    min_pixels: usize,
    source_shape: Shape,
) -> DefectTable {
    DefectTable::new(
        predictions
            .iter()
            .map(|map| {
                let encoded = DefectClass::ALL.map(|class| {
                    let mask = map.threshold(class, threshold).upsample(source_shape);
                    if mask.count() < min_pixels.max(1) {
                        String::new()
                    } else {
                        rle::encode(&mask).to_string()
                    }
                });
                DefectRow::new(map.image_id().to_string(), encoded)
            })
            .collect(),
    )
}
