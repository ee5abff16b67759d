mod blocks;
mod unet;

pub use blocks::{
    ConvBnRelu, ConvBnReluConfig, DoubleConv, DoubleConvConfig, Down, DownConfig, Up, UpConfig,
};

pub use unet::{OutputActivation, UNet, UNetConfig};
