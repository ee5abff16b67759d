use crate::defect::{DefectClass, NUM_CLASSES};
use crate::mask::{Mask, Shape};

/// Model output for a sequence of images, stored `[image, height, width, class]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    height: usize,
    width: usize,
    image_ids: Vec<String>,
    probs: Vec<f32>,
}

impl Predictions {
    pub fn new([height, width]: Shape) -> Self {
        Self {
            height,
            width,
            image_ids: Vec::new(),
            probs: Vec::new(),
        }
    }

    /// Appends one image. Panics when `probs` is not `height * width * 4` long.
    pub fn push(&mut self, image_id: impl Into<String>, probs: &[f32]) {
        assert_eq!(
            probs.len(),
            self.map_len(),
            "Expected {}x{}x{} probabilities",
            self.height,
            self.width,
            NUM_CLASSES
        );
        self.image_ids.push(image_id.into());
        self.probs.extend_from_slice(probs);
    }

    pub fn shape(&self) -> Shape {
        [self.height, self.width]
    }

    pub fn len(&self) -> usize {
        self.image_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_ids.is_empty()
    }

    pub fn image_ids(&self) -> &[String] {
        &self.image_ids
    }

    pub fn get(&self, index: usize) -> Option<ProbabilityMap<'_>> {
        let len = self.map_len();
        let probs = self.probs.get(index * len..(index + 1) * len)?;

        Some(ProbabilityMap {
            height: self.height,
            width: self.width,
            image_id: &self.image_ids[index],
            probs,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ProbabilityMap<'_>> {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    fn map_len(&self) -> usize {
        self.height * self.width * NUM_CLASSES
    }
}

/// Probabilities of a single image.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilityMap<'a> {
    height: usize,
    width: usize,
    image_id: &'a str,
    probs: &'a [f32],
}

impl ProbabilityMap<'_> {
    pub fn image_id(&self) -> &str {
        self.image_id
    }

    pub fn probability(&self, row: usize, col: usize, class: DefectClass) -> f32 {
        self.probs[(row * self.width + col) * NUM_CLASSES + class.channel()]
    }

    fn class_values(&self, class: DefectClass) -> impl Iterator<Item = f32> + '_ {
        self.probs
            .iter()
            .skip(class.channel())
            .step_by(NUM_CLASSES)
            .copied()
    }

    /// Number of pixels with `p >= threshold`.
    pub fn count_at_least(&self, class: DefectClass, threshold: f32) -> usize {
        self.class_values(class).filter(|&p| p >= threshold).count()
    }

    pub fn max(&self, class: DefectClass) -> f32 {
        self.class_values(class).fold(0.0, f32::max)
    }

    pub fn threshold(&self, class: DefectClass, threshold: f32) -> Mask {
        Mask::from_fn([self.height, self.width], |row, col| {
            self.probability(row, col, class) >= threshold
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_channels_last() {
        let mut predictions = Predictions::new([1, 2]);
        predictions.push("a.jpg", &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]);
        predictions.push("b.jpg", &[0.0; 8]);

        let first = predictions.get(0).unwrap();
        assert_eq!(first.image_id(), "a.jpg");
        assert_eq!(first.probability(0, 1, DefectClass::Two), 0.6);
        assert_eq!(first.count_at_least(DefectClass::Four, 0.5), 1);
        assert_eq!(first.max(DefectClass::One), 0.5);

        let mask = first.threshold(DefectClass::Three, 0.3);
        assert_eq!(mask.pixels().collect::<Vec<_>>(), vec![(0, 0), (0, 1)]);

        assert_eq!(predictions.iter().count(), 2);
        assert!(predictions.get(2).is_none());
    }

    #[test]
    #[should_panic(expected = "Expected 1x2x4 probabilities")]
    fn rejects_wrong_length() {
        Predictions::new([1, 2]).push("a.jpg", &[0.0; 3]);
    }
}
