use std::marker::PhantomData;

use burn::prelude::*;
use burn::train::metric::state::{FormatOptions, NumericMetricState};
use burn::train::metric::{Metric, MetricEntry, MetricMetadata, Numeric};
use derive_new::new;

/// Dice coefficient `(2|t·p| + smooth) / (|t| + |p| + smooth)` over the flattened tensors.
pub fn dice_coefficient<B: Backend, const D: usize>(
    y_true: Tensor<B, D>,
    y_pred: Tensor<B, D>,
    smooth: f32,
) -> Tensor<B, 1> {
    let y_true = y_true.flatten::<1>(0, D - 1);
    let y_pred = y_pred.flatten::<1>(0, D - 1);

    let intersection = (y_true.clone() * y_pred.clone()).sum();

    intersection.mul_scalar(2.0).add_scalar(smooth)
        / (y_true.sum() + y_pred.sum()).add_scalar(smooth)
}

/// Soft [dice coefficient](dice_coefficient) of the predicted probabilities.
#[derive(Default)]
pub struct DiceMetric<B: Backend> {
    state: NumericMetricState,
    _b: PhantomData<B>,
}

#[derive(new)]
pub struct DiceInput<B: Backend> {
    /// `[batch, num_classes, height, width]` probabilities.
    outputs: Tensor<B, 4>,
    targets: Tensor<B, 4>,
}

impl<B: Backend> DiceMetric<B> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend> Metric for DiceMetric<B> {
    type Input = DiceInput<B>;
    const NAME: &'static str = "Dice";

    fn update(&mut self, input: &DiceInput<B>, _metadata: &MetricMetadata) -> MetricEntry {
        let [batch_size, ..] = input.outputs.dims();

        let dice = dice_coefficient(input.targets.clone(), input.outputs.clone(), 1.0)
            .into_scalar()
            .elem::<f64>();

        self.state.update(
            dice,
            batch_size,
            FormatOptions::new(Self::NAME).precision(4),
        )
    }

    fn clear(&mut self) {
        self.state.reset()
    }
}

impl<B: Backend> Numeric for DiceMetric<B> {
    fn value(&self) -> f64 {
        self.state.value()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use burn::backend::NdArray;
    use burn::data::dataloader::Progress;

    use super::*;

    type TestBackend = NdArray<f32>;

    pub(crate) fn single_batch_metadata() -> MetricMetadata {
        MetricMetadata {
            progress: Progress {
                items_processed: 1,
                items_total: 1,
            },
            epoch: 1,
            epoch_total: 1,
            iteration: 1,
            lr: None,
        }
    }

    #[test]
    fn identical_masks_score_one() {
        let device = Default::default();
        let mask = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 0.0], [1.0, 1.0]]]], &device);

        let dice = dice_coefficient(mask.clone(), mask, 1.0).into_scalar();
        assert!((dice - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_masks_score_smooth_over_total() {
        let device = Default::default();
        let ones = Tensor::<TestBackend, 2>::ones([3, 3], &device);
        let zeros = Tensor::<TestBackend, 2>::zeros([3, 3], &device);

        let dice = dice_coefficient(ones, zeros, 1.0).into_scalar();
        assert!((dice - 1.0 / 10.0).abs() < 1e-6);
    }

    #[test]
    fn metric_reports_the_batch_dice() {
        let device = Default::default();
        let targets = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 1.0], [0.0, 0.0]]]], &device);
        let outputs = Tensor::<TestBackend, 4>::from_floats([[[[1.0, 0.0], [0.0, 0.0]]]], &device);

        let mut metric = DiceMetric::<TestBackend>::new();
        let input = DiceInput::new(outputs, targets);
        let entry = metric.update(&input, &single_batch_metadata());

        // (2 * 1 + 1) / (2 + 1 + 1)
        assert!((metric.value() - 0.75).abs() < 1e-6);
        assert_eq!(entry.name, "Dice");

        metric.clear();
        assert!(metric.value().is_nan());
    }

    #[test]
    fn empty_masks_score_one() {
        let device = Default::default();
        let zeros = Tensor::<TestBackend, 1>::zeros([5], &device);

        let dice = dice_coefficient(zeros.clone(), zeros, 1.0).into_scalar();
        assert!((dice - 1.0).abs() < 1e-6);
    }
}
