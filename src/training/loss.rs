use std::marker::PhantomData;

use burn::prelude::*;

#[derive(Config, Debug)]
pub struct BceLossConfig {
    /// Probabilities are clamped to `[epsilon, 1 - epsilon]` before taking the log.
    #[config(default = 1e-7)]
    pub epsilon: f32,
}

impl BceLossConfig {
    pub fn init<B: Backend>(&self, _device: &B::Device) -> BceLoss<B> {
        self.assertions();
        BceLoss {
            epsilon: self.epsilon,
            _b: PhantomData,
        }
    }

    fn assertions(&self) {
        assert!(
            self.epsilon > 0. && self.epsilon < 0.5,
            "Epsilon must be in (0, 0.5). Got {}",
            self.epsilon
        );
    }
}

/// Mean binary cross-entropy between per-class probabilities and binary targets.
#[derive(Module, Debug)]
pub struct BceLoss<B: Backend> {
    pub epsilon: f32,
    _b: PhantomData<B>,
}

impl<B: Backend> BceLoss<B> {
    pub fn forward(&self, probs: Tensor<B, 4>, targets: Tensor<B, 4>) -> Tensor<B, 1> {
        assert!(
            probs.dims() == targets.dims(),
            "Shape mismatch: probabilities {:?} vs targets {:?}",
            probs.dims(),
            targets.dims()
        );

        let eps = self.epsilon;
        let probs = probs.clamp(eps, 1.0 - eps);

        let positive = targets.clone() * probs.clone().log();
        let negative = targets.neg().add_scalar(1.0) * probs.neg().add_scalar(1.0).log();

        (positive + negative).mean().neg()
    }
}
