use burn::{data::dataloader::batcher::Batcher, prelude::*};

use super::SteelSample;
use super::generator::CHANNELS;
use crate::defect::NUM_CLASSES;

#[derive(Clone)]
pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

#[derive(Clone, Debug)]
pub struct SegmentationBatch<B: Backend> {
    /// `[batch, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// `[batch, 4, height, width]` with values in {0, 1}.
    pub masks: Tensor<B, 4>,
}

impl<B: Backend> Batcher<SteelSample, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<SteelSample>) -> SegmentationBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);

        for item in items {
            let [height, width] = item.shape;

            let mut image_data = Vec::with_capacity(CHANNELS * height * width);
            for c in 0..CHANNELS {
                for y in 0..height {
                    for x in 0..width {
                        image_data.push(item.image[(y * width + x) * CHANNELS + c]);
                    }
                }
            }

            let mask_data: Vec<f32> = match &item.masks {
                Some(class_masks) => class_masks
                    .iter()
                    .flat_map(|mask| mask.as_slice().iter().map(|&v| if v { 1.0 } else { 0.0 }))
                    .collect(),
                None => vec![0.0; NUM_CLASSES * height * width],
            };

            images.push(Tensor::<B, 3>::from_data(
                TensorData::new(image_data, Shape::new([CHANNELS, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            ));
            masks.push(Tensor::<B, 3>::from_data(
                TensorData::new(mask_data, Shape::new([NUM_CLASSES, height, width]))
                    .convert::<B::FloatElem>(),
                &self.device,
            ));
        }

        SegmentationBatch {
            images: Tensor::stack::<4>(images, 0),
            masks: Tensor::stack::<4>(masks, 0),
        }
    }
}
