use burn::{
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

#[cfg(feature = "training")]
use burn::{
    tensor::backend::AutodiffBackend,
    train::{TrainOutput, TrainStep, ValidStep},
};

#[cfg(feature = "training")]
use crate::{
    dataset::SegmentationBatch,
    training::{SegmentationOutput, loss::BceLossConfig},
};

use super::blocks::{DoubleConv, DoubleConvConfig, Down, DownConfig, Up, UpConfig};

#[derive(Config, Debug)]
pub enum OutputActivation {
    /// Independent per-class probabilities; classes may overlap.
    Sigmoid,
    /// Probabilities summing to one across classes.
    Softmax,
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    stem: DoubleConv<B>,
    downs: Vec<Down<B>>,
    ups: Vec<Up<B>>,
    head: Conv2d<B>,
    use_softmax: bool,
}

#[derive(Config, Debug)]
pub struct UNetConfig {
    /// Height and width of the input; both must be divisible by `2^depth`.
    pub input_size: [usize; 2],
    #[config(default = "3")]
    pub input_channels: usize,
    #[config(default = "64")]
    pub base_channels: usize,
    #[config(default = "4")]
    pub num_classes: usize,
    #[config(default = "4")]
    pub depth: usize,
    #[config(default = "0.1")]
    pub dropout: f64,
    #[config(default = "OutputActivation::Sigmoid")]
    pub activation: OutputActivation,
    /// Encoder name recorded with the model. Weights are always trained from scratch.
    pub backbone: Option<String>,
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        self.assertions();

        let channels = |level: usize| self.base_channels << level;

        let downs = (1..=self.depth)
            .map(|level| {
                DownConfig::new([channels(level - 1), channels(level)])
                    .with_dropout(self.dropout)
                    .init(device)
            })
            .collect();

        let ups = (1..=self.depth)
            .rev()
            .map(|level| {
                UpConfig::new([channels(level), channels(level - 1)])
                    .with_dropout(self.dropout)
                    .init(device)
            })
            .collect();

        UNet {
            stem: DoubleConvConfig::new([self.input_channels, self.base_channels])
                .with_dropout(self.dropout)
                .init(device),
            downs,
            ups,
            head: Conv2dConfig::new([self.base_channels, self.num_classes], [1, 1]).init(device),
            use_softmax: matches!(self.activation, OutputActivation::Softmax),
        }
    }

    fn assertions(&self) {
        assert!(self.depth >= 1, "U-Net depth must be at least 1");

        let stride = 1 << self.depth;
        assert!(
            self.input_size.iter().all(|&side| side % stride == 0),
            "Input size {:?} must be divisible by {} for a depth of {}",
            self.input_size,
            stride,
            self.depth
        );
    }
}

impl<B: Backend> UNet<B> {
    /// Maps `[batch, channels, height, width]` images to per-class probabilities of shape
    /// `[batch, num_classes, height, width]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.stem.forward(images);
        let mut skips = Vec::with_capacity(self.downs.len());

        for down in &self.downs {
            skips.push(x.clone());
            x = down.forward(x);
        }

        for (up, skip) in self.ups.iter().zip(skips.into_iter().rev()) {
            x = up.forward(x, skip);
        }

        let x = self.head.forward(x);

        if self.use_softmax {
            softmax(x, 1)
        } else {
            sigmoid(x)
        }
    }

    #[cfg(feature = "training")]
    pub fn forward_segmentation(&self, item: SegmentationBatch<B>) -> SegmentationOutput<B> {
        let targets = item.masks;
        let output = self.forward(item.images);

        let loss = BceLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        SegmentationOutput::new(loss, output, targets)
    }
}

#[cfg(feature = "training")]
impl<B: AutodiffBackend> TrainStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> TrainOutput<SegmentationOutput<B>> {
        let item = self.forward_segmentation(batch);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

#[cfg(feature = "training")]
impl<B: Backend> ValidStep<SegmentationBatch<B>, SegmentationOutput<B>> for UNet<B> {
    fn step(&self, batch: SegmentationBatch<B>) -> SegmentationOutput<B> {
        self.forward_segmentation(batch)
    }
}
