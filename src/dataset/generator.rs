use std::path::{Path, PathBuf};

use burn::prelude::*;
use derive_new::new;
use image::{RgbImage, imageops::FilterType};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::{DatasetError, DefectRow, DefectTable};
use crate::defect::{DefectClass, NUM_CLASSES};
use crate::mask::{Mask, Shape};

pub const CHANNELS: usize = 3;

#[derive(Config, Debug)]
pub enum Subset {
    Train,
    Test,
}

impl Subset {
    /// Image directory of this subset, relative to the dataset root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Subset::Train => "train_images",
            Subset::Test => "test_images",
        }
    }

    pub fn has_masks(&self) -> bool {
        matches!(self, Subset::Train)
    }
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    pub subset: Subset,
    #[config(default = 16)]
    pub batch_size: usize,
    /// Resolution of the images and masks handed to the model.
    #[config(default = "[128, 800]")]
    pub resize_shape: [usize; 2],
    /// Resolution the encodings refer to.
    #[config(default = "[256, 1600]")]
    pub source_shape: [usize; 2],
    #[config(default = false)]
    pub shuffle: bool,
    pub seed: Option<u64>,
}

/// Loads an RGB image by its `ImageId`.
pub trait ImageSource {
    fn load(&self, image_id: &str) -> Result<RgbImage, DatasetError>;
}

/// Images stored as files under `<root>/train_images` or `<root>/test_images`.
#[derive(Debug, Clone)]
pub struct FolderSource {
    dir: PathBuf,
}

impl FolderSource {
    pub fn new<P: AsRef<Path>>(root: P, subset: &Subset) -> Self {
        Self {
            dir: root.as_ref().join(subset.dir_name()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ImageSource for FolderSource {
    fn load(&self, image_id: &str) -> Result<RgbImage, DatasetError> {
        let path = self.dir.join(image_id);
        image::open(&path)
            .map(|image| image.into_rgb8())
            .map_err(|source| DatasetError::ImageError { path, source })
    }
}

/// Batch of images in `[batch, height, width, channel]` order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    batch_size: usize,
    height: usize,
    width: usize,
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn zeros(batch_size: usize, [height, width]: Shape) -> Self {
        Self {
            batch_size,
            height,
            width,
            data: vec![0.0; batch_size * height * width * CHANNELS],
        }
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.batch_size, self.height, self.width, CHANNELS]
    }

    pub fn sample(&self, index: usize) -> &[f32] {
        let len = self.sample_len();
        &self.data[index * len..(index + 1) * len]
    }

    pub fn sample_mut(&mut self, index: usize) -> &mut [f32] {
        let len = self.sample_len();
        &mut self.data[index * len..(index + 1) * len]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Converts a sample back to 8-bit RGB, clamping to `0..=255`.
    ///
    /// Returns `None` when `index` is outside the batch.
    pub fn to_rgb_image(&self, index: usize) -> Option<RgbImage> {
        if index >= self.batch_size {
            return None;
        }

        let pixels = self
            .sample(index)
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect();

        RgbImage::from_raw(self.width as u32, self.height as u32, pixels)
    }

    fn sample_len(&self) -> usize {
        self.height * self.width * CHANNELS
    }
}

/// Per-sample stacks of the four class masks.
#[derive(new, Debug, Clone, PartialEq)]
pub struct MaskTensor {
    masks: Vec<[Mask; NUM_CLASSES]>,
}

impl MaskTensor {
    pub fn sample(&self, index: usize) -> &[Mask; NUM_CLASSES] {
        &self.masks[index]
    }

    pub fn get(&self, index: usize, class: DefectClass) -> &Mask {
        &self.masks[index][class.channel()]
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

/// Per-channel `(x - mean) / std` normalization.
#[derive(new, Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    pub mean: [f32; CHANNELS],
    pub std: [f32; CHANNELS],
}

impl Normalize {
    /// Maps raw `0..=255` pixels to `0..=1`.
    pub fn unit_range() -> Self {
        Self::new([0.0; CHANNELS], [255.0; CHANNELS])
    }

    pub fn apply(&self, images: &mut ImageTensor) {
        for pixel in images.data_mut().chunks_exact_mut(CHANNELS) {
            for (c, value) in pixel.iter_mut().enumerate() {
                *value = (*value - self.mean[c]) / self.std[c];
            }
        }
    }
}

/// One image of a batch together with its masks.
#[derive(Debug, Clone)]
pub struct SteelSample {
    pub image_id: String,
    pub shape: Shape,
    /// Pixels in `[height, width, channel]` order.
    pub image: Vec<f32>,
    pub masks: Option<[Mask; NUM_CLASSES]>,
}

#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub index: usize,
    pub batch_size: usize,
    /// Image shown in each slot of the batch.
    pub image_ids: Vec<String>,
    pub images: ImageTensor,
    /// `None` for the test subset.
    pub masks: Option<MaskTensor>,
}

impl BatchRecord {
    pub fn len(&self) -> usize {
        self.image_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_ids.is_empty()
    }

    pub fn image_id(&self, slot: usize) -> Option<&str> {
        self.image_ids.get(slot).map(String::as_str)
    }

    /// Position of `slot` across the whole epoch.
    pub fn global_slot(&self, slot: usize) -> usize {
        self.index * self.batch_size + slot
    }

    pub fn into_samples(self) -> Vec<SteelSample> {
        let [_, height, width, _] = self.images.dims();
        let masks = self.masks.map(|m| m.masks);

        self.image_ids
            .into_iter()
            .enumerate()
            .map(|(slot, image_id)| SteelSample {
                image_id,
                shape: [height, width],
                image: self.images.sample(slot).to_vec(),
                masks: masks.as_ref().map(|m| m[slot].clone()),
            })
            .collect()
    }
}

type PreprocessFn = Box<dyn Fn(&mut ImageTensor) + Send + Sync>;

/// Fixed-size batches of resized images and decoded masks over a [DefectTable].
///
/// The last `len % batch_size` rows of each epoch are never served.
pub struct BatchGenerator<S> {
    table: DefectTable,
    config: GeneratorConfig,
    source: S,
    preprocess: Option<PreprocessFn>,
    indexes: Vec<usize>,
    rng: StdRng,
}

impl<S: ImageSource> BatchGenerator<S> {
    pub fn new(
        table: DefectTable,
        config: GeneratorConfig,
        source: S,
    ) -> Result<Self, DatasetError> {
        if config.batch_size == 0 {
            return Err(DatasetError::ZeroBatchSize);
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let dropped = table.len() % config.batch_size;
        if dropped > 0 {
            log::debug!(
                "{} of {} rows do not fill a batch of {} and are skipped",
                dropped,
                table.len(),
                config.batch_size
            );
        }

        let mut generator = Self {
            table,
            config,
            source,
            preprocess: None,
            indexes: Vec::new(),
            rng,
        };
        generator.on_epoch_end();

        Ok(generator)
    }

    /// Applies `preprocess` to the images, not the masks, of every batch.
    pub fn with_preprocess<F>(mut self, preprocess: F) -> Self
    where
        F: Fn(&mut ImageTensor) + Send + Sync + 'static,
    {
        self.preprocess = Some(Box::new(preprocess));
        self
    }

    pub fn len(&self) -> usize {
        self.table.len() / self.config.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table(&self) -> &DefectTable {
        &self.table
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }

    /// Starts a new epoch with a fresh ordering of the rows.
    pub fn on_epoch_end(&mut self) {
        self.indexes = (0..self.table.len()).collect();
        if self.config.shuffle {
            self.indexes.shuffle(&mut self.rng);
        }
    }

    pub fn get(&self, index: usize) -> Result<BatchRecord, DatasetError> {
        let len = self.len();
        if index >= len {
            return Err(DatasetError::BatchOutOfRange { index, len });
        }

        let batch_size = self.config.batch_size;
        let with_masks = self.config.subset.has_masks();

        let mut images = ImageTensor::zeros(batch_size, self.config.resize_shape);
        let mut masks = Vec::with_capacity(if with_masks { batch_size } else { 0 });
        let mut image_ids = Vec::with_capacity(batch_size);

        for (slot, &row_index) in self.indexes[index * batch_size..(index + 1) * batch_size]
            .iter()
            .enumerate()
        {
            let row = &self.table.rows()[row_index];

            masks.extend(self.read_row(row, &mut images, slot)?);
            image_ids.push(row.image_id.clone());
        }

        if let Some(preprocess) = &self.preprocess {
            preprocess(&mut images);
        }

        Ok(BatchRecord {
            index,
            batch_size,
            image_ids,
            images,
            masks: with_masks.then(|| MaskTensor::new(masks)),
        })
    }

    /// The image at `position` of the current epoch, i.e. slot `position % batch_size` of
    /// batch `position / batch_size`.
    ///
    /// `preprocess` sees a batch holding this single image.
    pub fn sample(&self, position: usize) -> Result<SteelSample, DatasetError> {
        let batch_size = self.config.batch_size;
        if position >= self.len() * batch_size {
            return Err(DatasetError::BatchOutOfRange {
                index: position / batch_size,
                len: self.len(),
            });
        }

        let row = &self.table.rows()[self.indexes[position]];
        let mut images = ImageTensor::zeros(1, self.config.resize_shape);
        let masks = self.read_row(row, &mut images, 0)?;

        if let Some(preprocess) = &self.preprocess {
            preprocess(&mut images);
        }

        Ok(SteelSample {
            image_id: row.image_id.clone(),
            shape: self.config.resize_shape,
            image: images.data,
            masks,
        })
    }

    /// Writes the resized image of `row` into `slot` and decodes its masks when the subset
    /// has them.
    fn read_row(
        &self,
        row: &DefectRow,
        images: &mut ImageTensor,
        slot: usize,
    ) -> Result<Option<[Mask; NUM_CLASSES]>, DatasetError> {
        let [height, width] = self.config.resize_shape;

        let image = self.source.load(&row.image_id)?;
        let image = if image.dimensions() == (width as u32, height as u32) {
            image
        } else {
            image::imageops::resize(&image, width as u32, height as u32, FilterType::CatmullRom)
        };

        images
            .sample_mut(slot)
            .iter_mut()
            .zip(image.as_raw())
            .for_each(|(dst, &src)| *dst = src as f32);

        if !self.config.subset.has_masks() {
            return Ok(None);
        }
        row.decode_masks(self.config.source_shape, self.config.resize_shape)
            .map(Some)
    }

    /// Batches of the current epoch, in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<BatchRecord, DatasetError>> + '_ {
        (0..self.len()).map(|index| self.get(index))
    }
}
