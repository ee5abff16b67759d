use burn::{
    nn::{
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

/// `conv 3x3 -> batch norm -> relu`, keeping the spatial size.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.activation.forward(self.norm.forward(self.conv.forward(x)))
    }
}

#[derive(Config, Debug)]
pub struct ConvBnReluConfig {
    /// `[input, output]` channels.
    channels: [usize; 2],
}

impl ConvBnReluConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBnRelu<B> {
        ConvBnRelu {
            conv: Conv2dConfig::new(self.channels, [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(self.channels[1]).init(device),
            activation: Relu::new(),
        }
    }
}

#[derive(Module, Debug)]
pub struct DoubleConv<B: Backend> {
    first: ConvBnRelu<B>,
    dropout: Dropout,
    second: ConvBnRelu<B>,
}

impl<B: Backend> DoubleConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.first.forward(x);
        self.second.forward(self.dropout.forward(x))
    }
}

#[derive(Config, Debug)]
pub struct DoubleConvConfig {
    channels: [usize; 2],
    #[config(default = "0.1")]
    dropout: f64,
}

impl DoubleConvConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DoubleConv<B> {
        let [_, output] = self.channels;
        DoubleConv {
            first: ConvBnReluConfig::new(self.channels).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            second: ConvBnReluConfig::new([output, output]).init(device),
        }
    }
}

/// Halves the resolution, then convolves.
#[derive(Module, Debug)]
pub struct Down<B: Backend> {
    pool: MaxPool2d,
    conv: DoubleConv<B>,
}

impl<B: Backend> Down<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(self.pool.forward(x))
    }
}

#[derive(Config, Debug)]
pub struct DownConfig {
    channels: [usize; 2],
    #[config(default = "0.1")]
    dropout: f64,
}

impl DownConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Down<B> {
        Down {
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            conv: DoubleConvConfig::new(self.channels)
                .with_dropout(self.dropout)
                .init(device),
        }
    }
}

/// Doubles the resolution and merges the skip connection of the matching [Down] level.
#[derive(Module, Debug)]
pub struct Up<B: Backend> {
    upsample: ConvTranspose2d<B>,
    conv: DoubleConv<B>,
}

impl<B: Backend> Up<B> {
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.upsample.forward(x);
        self.conv.forward(Tensor::cat(vec![x, skip], 1))
    }
}

#[derive(Config, Debug)]
pub struct UpConfig {
    channels: [usize; 2],
    #[config(default = "0.1")]
    dropout: f64,
}

impl UpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Up<B> {
        let [_, output] = self.channels;
        Up {
            upsample: ConvTranspose2dConfig::new(self.channels, [2, 2])
                .with_stride([2, 2])
                .init(device),
            // the skip carries as many channels as the upsampled features
            conv: DoubleConvConfig::new([output * 2, output])
                .with_dropout(self.dropout)
                .init(device),
        }
    }
}
