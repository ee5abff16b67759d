use burn::{
    backend::NdArray,
    prelude::*,
    tensor::Transaction,
    train::metric::{Adaptor, ItemLazy, LossInput},
};
use derive_new::new;
use serde::{Deserialize, Serialize};

use super::metrics::DiceInput;

#[derive(new)]
pub struct SegmentationOutput<B: Backend> {
    pub loss: Tensor<B, 1>,
    /// `[batch, num_classes, height, width]` probabilities.
    pub output: Tensor<B, 4>,
    pub targets: Tensor<B, 4>,
}

impl<B: Backend> ItemLazy for SegmentationOutput<B> {
    type ItemSync = SegmentationOutput<NdArray>;

    fn sync(self) -> Self::ItemSync {
        let [output, loss, targets] = Transaction::default()
            .register(self.output)
            .register(self.loss)
            .register(self.targets)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");

        let device = &Default::default();

        SegmentationOutput {
            output: Tensor::from_data(output, device),
            loss: Tensor::from_data(loss, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

impl<B: Backend> Adaptor<LossInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> LossInput<B> {
        LossInput::new(self.loss.clone())
    }
}

impl<B: Backend> Adaptor<DiceInput<B>> for SegmentationOutput<B> {
    fn adapt(&self) -> DiceInput<B> {
        DiceInput::new(self.output.clone(), self.targets.clone())
    }
}

#[derive(new, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_dice: f64,
    pub valid_loss: f64,
    pub valid_dice: f64,
}

/// Per-epoch metrics recorded by [fit](super::fit).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub epochs: Vec<EpochSummary>,
}

impl History {
    pub fn push(&mut self, summary: EpochSummary) {
        self.epochs.push(summary);
    }

    pub fn last(&self) -> Option<&EpochSummary> {
        self.epochs.last()
    }

    pub fn best_valid_dice(&self) -> Option<&EpochSummary> {
        self.epochs
            .iter()
            .max_by(|a, b| a.valid_dice.total_cmp(&b.valid_dice))
    }
}
