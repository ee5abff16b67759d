//! Colored defect outlines for visual inspection.

use image::{GrayImage, Luma, RgbImage};

use crate::defect::{DefectClass, NUM_CLASSES};
use crate::mask::Mask;
use crate::morphology::{contour, dilate};
use crate::prediction::ProbabilityMap;

/// Dilation and contour width applied before painting a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    pub pad: usize,
    pub width: usize,
}

impl OverlayStyle {
    /// Thin outline used when browsing ground truth.
    pub const INSPECTION: Self = Self { pad: 3, width: 2 };
    /// Thicker outline used next to prediction maps.
    pub const PREDICTION: Self = Self { pad: 2, width: 3 };
}

/// Channels overwritten for each class: yellow, green, blue, magenta.
fn class_color(class: DefectClass) -> [Option<u8>; 3] {
    match class {
        DefectClass::One => [Some(235), Some(235), None],
        DefectClass::Two => [None, Some(210), None],
        DefectClass::Three => [None, None, Some(255)],
        DefectClass::Four => [Some(255), None, Some(255)],
    }
}

/// Paints the outline of every class mask onto a copy of `image`.
pub fn render_overlay(
    image: &RgbImage,
    masks: &[Mask; NUM_CLASSES],
    style: OverlayStyle,
) -> RgbImage {
    let mut out = image.clone();
    let (width, height) = out.dimensions();

    for class in DefectClass::ALL {
        let outline = contour(&dilate(&masks[class.channel()], style.pad), style.width);
        let color = class_color(class);

        for (row, col) in outline.pixels() {
            if row as u32 >= height || col as u32 >= width {
                continue;
            }
            let pixel = out.get_pixel_mut(col as u32, row as u32);
            for (value, paint) in pixel.0.iter_mut().zip(color) {
                if let Some(paint) = paint {
                    *value = paint;
                }
            }
        }
    }

    out
}

/// `"has defect 1 3"` for the non-empty masks, or an empty string.
pub fn defect_label(masks: &[Mask; NUM_CLASSES]) -> String {
    let classes: Vec<String> = DefectClass::ALL
        .into_iter()
        .filter(|class| !masks[class.channel()].is_empty())
        .map(|class| class.to_string())
        .collect();

    if classes.is_empty() {
        String::new()
    } else {
        format!("has defect {}", classes.join(" "))
    }
}

/// Grayscale rendering of one class probability map.
pub fn probability_heatmap(
    map: &ProbabilityMap<'_>,
    class: DefectClass,
    [height, width]: [usize; 2],
) -> GrayImage {
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let p = map.probability(y as usize, x as usize, class);
        Luma([(p.clamp(0.0, 1.0) * 255.0).round() as u8])
    })
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::prediction::Predictions;

    fn masks_with(class: DefectClass, mask: Mask) -> [Mask; NUM_CLASSES] {
        let mut masks: [Mask; NUM_CLASSES] = std::array::from_fn(|_| Mask::zeros(mask.shape()));
        masks[class.channel()] = mask;
        masks
    }

    #[test]
    fn paints_only_the_outline() {
        let image = RgbImage::from_pixel(20, 12, Rgb([10, 20, 30]));
        let block = Mask::from_fn([12, 20], |r, c| (3..9).contains(&r) && (5..15).contains(&c));
        let masks = masks_with(DefectClass::Three, block.clone());

        let style = OverlayStyle { pad: 0, width: 1 };
        let out = render_overlay(&image, &masks, style);
        let outline = contour(&block, 1);

        for (x, y, pixel) in out.enumerate_pixels() {
            if outline.get(y as usize, x as usize) {
                assert_eq!(pixel.0, [10, 20, 255]);
            } else {
                assert_eq!(pixel.0, [10, 20, 30]);
            }
        }
        assert!(!outline.is_empty());
    }

    #[test]
    fn yellow_and_magenta_keep_untouched_channels() {
        let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let dot = Mask::from_fn([4, 4], |r, c| r == 1 && c == 1);

        let masks = masks_with(DefectClass::One, dot.clone());
        let yellow = render_overlay(&image, &masks, OverlayStyle::PREDICTION);
        assert!(yellow.pixels().any(|p| p.0 == [235, 235, 3]));

        let masks = masks_with(DefectClass::Four, dot);
        let magenta = render_overlay(&image, &masks, OverlayStyle::INSPECTION);
        assert!(magenta.pixels().any(|p| p.0 == [255, 2, 255]));
        assert!(magenta.pixels().all(|p| p.0[1] == 2));
    }

    #[test]
    fn labels_non_empty_classes() {
        let dot = Mask::from_fn([2, 2], |r, c| r == 0 && c == 0);
        let mut masks = masks_with(DefectClass::One, dot.clone());
        masks[2] = dot;
        assert_eq!(defect_label(&masks), "has defect 1 3");
        assert_eq!(defect_label(&masks_with(DefectClass::Two, Mask::zeros([2, 2]))), "");
    }

    #[test]
    fn heatmap_scales_probabilities() {
        let mut predictions = Predictions::new([1, 2]);
        predictions.push("a.jpg", &[0.0, 1.0, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0]);
        let map = predictions.get(0).unwrap();

        let heatmap = probability_heatmap(&map, DefectClass::Two, predictions.shape());
        assert_eq!(heatmap.get_pixel(0, 0).0, [255]);
        assert_eq!(heatmap.get_pixel(1, 0).0, [128]);
    }
}
