//! Run-length encoding of defect masks.
//!
//! Runs are `(start, length)` pairs with 1-indexed starts over the image
//! flattened in column-major order, i.e. `index = row + col * height`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::mask::{Mask, Shape};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RleError {
    #[error("Odd number of RLE tokens: `{0}`")]
    OddTokenCount(usize),

    #[error("Invalid RLE token: `{0}`")]
    InvalidToken(String),

    #[error("RLE pair ({start}, {length}) must be positive")]
    NonPositive { start: usize, length: usize },

    #[error("RLE run ({start}, {length}) exceeds a buffer of {size} pixels")]
    OutOfBounds {
        start: usize,
        length: usize,
        size: usize,
    },

    #[error("Cannot subsample {native:?} to {output:?}")]
    IncompatibleShape { native: Shape, output: Shape },
}

/// A parsed run-length encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rle {
    runs: Vec<(usize, usize)>,
}

impl Rle {
    pub fn runs(&self) -> &[(usize, usize)] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of pixels covered by the runs.
    pub fn area(&self) -> usize {
        self.runs.iter().map(|&(_, length)| length).sum()
    }

    /// Expands the runs into a mask of `shape`.
    pub fn to_mask(&self, [height, width]: Shape) -> Result<Mask, RleError> {
        let size = height * width;
        let mut buffer = vec![false; size];

        for &(start, length) in &self.runs {
            let begin = start - 1;
            let end = begin
                .checked_add(length)
                .filter(|&end| end <= size)
                .ok_or(RleError::OutOfBounds {
                    start,
                    length,
                    size,
                })?;
            buffer[begin..end].iter_mut().for_each(|v| *v = true);
        }

        Ok(Mask::from_fn([height, width], |row, col| {
            buffer[row + col * height]
        }))
    }
}

impl FromStr for Rle {
    type Err = RleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = s
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<usize>()
                    .map_err(|_| RleError::InvalidToken(token.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if tokens.len() % 2 != 0 {
            return Err(RleError::OddTokenCount(tokens.len()));
        }

        let runs = tokens
            .chunks_exact(2)
            .map(|pair| match (pair[0], pair[1]) {
                (0, _) | (_, 0) => Err(RleError::NonPositive {
                    start: pair[0],
                    length: pair[1],
                }),
                run => Ok(run),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { runs })
    }
}

impl fmt::Display for Rle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (start, length)) in self.runs.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{} {}", start, length)?;
        }
        Ok(())
    }
}

/// Decodes an RLE string at `native` resolution and subsamples it to `output`.
///
/// Subsampling keeps every `native / output`-th row and column; it is not an area resize.
pub fn decode(rle: &str, native: Shape, output: Shape) -> Result<Mask, RleError> {
    let [native_h, native_w] = native;
    let [output_h, output_w] = output;

    if output_h == 0
        || output_w == 0
        || native_h % output_h != 0
        || native_w % output_w != 0
    {
        return Err(RleError::IncompatibleShape { native, output });
    }

    if rle.trim().is_empty() {
        return Ok(Mask::zeros(output));
    }

    let mask = rle.parse::<Rle>()?.to_mask(native)?;
    if native == output {
        return Ok(mask);
    }

    let sy = native_h / output_h;
    let sx = native_w / output_w;
    Ok(Mask::from_fn(output, |row, col| mask.get(row * sy, col * sx)))
}

/// Encodes the foreground runs of `mask` in column-major order.
pub fn encode(mask: &Mask) -> Rle {
    let [height, width] = mask.shape();
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for index in 0..height * width {
        let (row, col) = (index % height, index / height);
        match (mask.get(row, col), current.as_mut()) {
            (true, Some((_, length))) => *length += 1,
            (true, None) => current = Some((index + 1, 1)),
            (false, Some(_)) => runs.extend(current.take()),
            (false, None) => {}
        }
    }
    runs.extend(current);

    Rle { runs }
}
