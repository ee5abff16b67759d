//! Windowed morphology over binary masks.

use crate::mask::Mask;

/// Direction in which a shift grows the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

const DILATION_ORDER: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

/// Shifts `mask` by `k` pixels, filling the exposed edge with zeros.
///
/// `Up` moves content towards row 0, so `out[r][c] = mask[r + k][c]`.
pub fn shift(mask: &Mask, direction: Direction, k: usize) -> Mask {
    Mask::from_fn(mask.shape(), |row, col| match direction {
        Direction::Up => mask.get(row + k, col),
        Direction::Down => row >= k && mask.get(row - k, col),
        Direction::Left => mask.get(row, col + k),
        Direction::Right => col >= k && mask.get(row, col - k),
    })
}

/// Border of every region: pixels that differ from the pixel `width` columns to the right
/// or `width` rows below. Pixels past the far edges count as background.
pub fn contour(mask: &Mask, width: usize) -> Mask {
    let horizontal = mask.zip_with(&shift(mask, Direction::Left, width), |a, b| a ^ b);
    let vertical = mask.zip_with(&shift(mask, Direction::Up, width), |a, b| a ^ b);

    horizontal.zip_with(&vertical, |a, b| a | b)
}

/// Grows every region using the odd offsets in `1..pad`.
///
/// Directions are applied one after the other, each accumulating onto the result of the
/// previous one. `pad = 2` and `pad = 3` both shift by 1 only.
pub fn dilate(mask: &Mask, pad: usize) -> Mask {
    let mut out = mask.clone();

    for direction in DILATION_ORDER {
        for k in (1..pad).step_by(2) {
            let shifted = shift(&out, direction, k);
            out = out.zip_with(&shifted, |a, b| a | b);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_pixel() -> Mask {
        Mask::from_fn([7, 7], |r, c| r == 3 && c == 3)
    }

    #[test]
    fn shift_fills_with_zeros() {
        let mask = Mask::from_fn([3, 3], |r, _| r == 0);
        assert!(shift(&mask, Direction::Up, 1).is_empty());

        let down = shift(&mask, Direction::Down, 1);
        assert_eq!(down.pixels().collect::<Vec<_>>(), vec![(1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn contour_of_empty_mask_is_empty() {
        assert!(contour(&Mask::zeros([5, 8]), 3).is_empty());
    }

    #[test]
    fn contour_of_a_row_segment() {
        let mask = Mask::from_fn([5, 10], |r, c| r == 2 && (2..=7).contains(&c));
        let border = contour(&mask, 1);

        let expected = Mask::from_fn([5, 10], |r, c| {
            // left and right ends of the segment
            (r == 2 && (c == 1 || c == 7))
                // the segment itself differs from the row below
                || (r == 2 && (2..=7).contains(&c))
                // the row above differs from the segment
                || (r == 1 && (2..=7).contains(&c))
        });
        assert_eq!(border, expected);
    }

    #[test]
    fn contour_leaves_the_interior_untouched() {
        let mask = Mask::from_fn([20, 20], |r, c| (4..16).contains(&r) && (4..16).contains(&c));
        let border = contour(&mask, 2);

        assert!(!border.get(10, 10));
        assert!(border.get(4, 14));
        assert!(border.get(14, 4));
        assert!(border.get(2, 8));
        assert!(!border.get(0, 0));
    }

    #[test]
    fn contour_with_zero_width_is_empty() {
        let mask = Mask::from_fn([4, 4], |r, c| r == c);
        assert!(contour(&mask, 0).is_empty());
    }

    #[test]
    fn dilate_by_two_adds_a_cross() {
        let grown = dilate(&single_pixel(), 2);

        // each direction accumulates onto the previous one, so the cross fills into a square
        let expected = Mask::from_fn([7, 7], |r, c| (2..=4).contains(&r) && (2..=4).contains(&c));
        assert_eq!(grown, expected);
        assert!(grown.get(2, 3) && grown.get(4, 3) && grown.get(3, 2) && grown.get(3, 4));
    }

    #[test]
    fn dilate_uses_only_odd_offsets() {
        let mask = single_pixel();
        assert_eq!(dilate(&mask, 3), dilate(&mask, 2));
        assert_ne!(dilate(&mask, 4), dilate(&mask, 2));
        assert_eq!(dilate(&mask, 4).count(), 7 * 7);
    }

    #[test]
    fn dilate_with_small_pad_is_identity() {
        let mask = single_pixel();
        assert_eq!(dilate(&mask, 0), mask);
        assert_eq!(dilate(&mask, 1), mask);
    }
}
