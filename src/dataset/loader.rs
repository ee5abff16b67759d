use std::sync::Mutex;

use burn::data::dataset::Dataset;

use super::{BatchGenerator, DatasetError, ImageSource, SteelSample};

/// Serves the samples of a [BatchGenerator] to a burn data loader.
///
/// Reading position 0 starts a new epoch, so every pass of a sequential loader sees a fresh
/// permutation. The loader must use the generator's batch size, no shuffling and no workers.
///
/// A sample that fails to load ends the pass early; the first such error is kept and can be
/// taken with [take_error](GeneratorDataset::take_error).
pub struct GeneratorDataset<S> {
    generator: Mutex<BatchGenerator<S>>,
    len: usize,
    error: Mutex<Option<DatasetError>>,
}

impl<S: ImageSource> GeneratorDataset<S> {
    pub fn new(generator: BatchGenerator<S>) -> Self {
        let len = generator.len() * generator.config().batch_size;

        Self {
            generator: Mutex::new(generator),
            len,
            error: Mutex::new(None),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.generator
            .lock()
            .map(|generator| generator.config().batch_size)
            .unwrap_or_else(|poisoned| poisoned.into_inner().config().batch_size)
    }

    /// First error met while reading samples, if any.
    pub fn take_error(&self) -> Option<DatasetError> {
        match self.error.lock() {
            Ok(mut error) => error.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn record_error(&self, error: DatasetError) {
        log::error!("Unable to load a sample: {error}");

        let mut slot = match self.error.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.get_or_insert(error);
    }
}

impl<S> Dataset<SteelSample> for GeneratorDataset<S>
where
    S: ImageSource + Send,
{
    fn get(&self, index: usize) -> Option<SteelSample> {
        let sample = {
            let mut generator = match self.generator.lock() {
                Ok(generator) => generator,
                Err(poisoned) => poisoned.into_inner(),
            };

            if index == 0 {
                generator.on_epoch_end();
            }
            generator.sample(index)
        };

        match sample {
            Ok(sample) => Some(sample),
            Err(DatasetError::BatchOutOfRange { .. }) => None,
            Err(error) => {
                self.record_error(error);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use image::RgbImage;

    use super::*;
    use crate::dataset::{DefectRow, DefectTable, GeneratorConfig, Subset};

    struct MemorySource(HashMap<String, RgbImage>);

    impl ImageSource for MemorySource {
        fn load(&self, image_id: &str) -> Result<RgbImage, DatasetError> {
            self.0.get(image_id).cloned().ok_or_else(|| DatasetError::ImageError {
                path: PathBuf::from(image_id),
                source: image::ImageError::IoError(std::io::Error::from(
                    std::io::ErrorKind::NotFound,
                )),
            })
        }
    }

    fn dataset(rows: usize, images: usize, shuffle: bool) -> GeneratorDataset<MemorySource> {
        let table = DefectTable::new(
            (0..rows)
                .map(|i| DefectRow::new(format!("{i}.jpg"), Default::default()))
                .collect(),
        );
        let source = MemorySource(
            (0..images)
                .map(|i| (format!("{i}.jpg"), RgbImage::new(4, 2)))
                .collect(),
        );
        let config = GeneratorConfig::new(Subset::Train)
            .with_batch_size(3)
            .with_resize_shape([2, 4])
            .with_source_shape([2, 4])
            .with_shuffle(shuffle)
            .with_seed(Some(17));

        GeneratorDataset::new(BatchGenerator::new(table, config, source).unwrap())
    }

    fn epoch(dataset: &GeneratorDataset<MemorySource>) -> Vec<String> {
        dataset.iter().map(|sample| sample.image_id).collect()
    }

    #[test]
    fn serves_full_batches_only() {
        let dataset = dataset(7, 7, false);

        assert_eq!(dataset.len(), 6);
        assert_eq!(dataset.batch_size(), 3);
        assert_eq!(
            epoch(&dataset),
            ["0.jpg", "1.jpg", "2.jpg", "3.jpg", "4.jpg", "5.jpg"]
        );
        assert!(dataset.get(6).is_none());
        assert!(dataset.take_error().is_none());
    }

    #[test]
    fn reshuffles_when_a_pass_starts() {
        let dataset = dataset(30, 30, true);

        let passes: Vec<_> = (0..4).map(|_| epoch(&dataset)).collect();
        for pass in &passes {
            let mut sorted = pass.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 30);
        }
        assert!(passes.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn keeps_the_first_load_error() {
        let dataset = dataset(6, 4, false);

        assert_eq!(epoch(&dataset).len(), 4);
        assert!(matches!(
            dataset.take_error(),
            Some(DatasetError::ImageError { .. })
        ));
        assert!(dataset.take_error().is_none());
    }
}
