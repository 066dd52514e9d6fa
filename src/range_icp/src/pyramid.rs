//! Column-subsampling image pyramid over pixel coordinates.
//!
//! With `L` levels, level `l` samples every `2^(L-1-l)`-th column at full
//! height. The pixel array is reordered so that each level appends one
//! contiguous run, and the prefix `0..levels[l].range.end` is exactly the
//! image of level `l`. Coarse-to-fine registration restricts the objective to
//! a growing prefix of the same array.

use std::ops::Range;

use crate::error::{RegistrationError, Result};
use crate::projection::PixelCoord;

/// Highest level count accepted; strides beyond `2^31` exceed any `u32` width.
const MAX_LEVELS: u32 = 32;

/// One resolution tier of the pyramid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidLevel {
    /// Number of columns in this level's image.
    pub width: u32,
    /// Number of rows (always the full image height).
    pub height: u32,
    /// Run of the reordered pixel array added by this level.
    pub range: Range<usize>,
}

impl PyramidLevel {
    /// Number of pixels in this level's image, i.e. the prefix length.
    pub fn num_pixels(&self) -> usize {
        self.range.end
    }
}

/// Level (0 = coarsest) that first contains column `x`.
#[inline]
fn level_of(x: u32, levels: u32) -> u32 {
    let coarsest = levels - 1;
    // column 0 is part of every level
    let tz = if x == 0 { coarsest } else { x.trailing_zeros().min(coarsest) };
    coarsest - tz
}

/// Reorder `pixels` into pyramid order and describe the levels.
///
/// `pixels` must contain every coordinate of the `width × height` grid exactly
/// once, in any order. The reorder is stable, so pixels of the same level keep
/// their relative order.
///
/// # Errors
/// [`RegistrationError::DataMismatch`] when `levels` is zero (or absurdly
/// large), the grid is empty, or `pixels` is not a permutation of the grid.
/// `pixels` is untouched on error.
pub fn make_pyramid(
    levels: u32,
    width: u32,
    height: u32,
    pixels: &mut [PixelCoord],
) -> Result<Vec<PyramidLevel>> {
    if levels == 0 || levels > MAX_LEVELS {
        return Err(RegistrationError::mismatch(format!(
            "pyramid needs 1..={MAX_LEVELS} levels, got {levels}"
        )));
    }
    if width == 0 || height == 0 {
        return Err(RegistrationError::mismatch(format!(
            "pyramid over an empty {width}x{height} image"
        )));
    }
    check_permutation(width, height, pixels)?;

    pixels.sort_by_key(|p| level_of(p.x, levels));

    let mut result = Vec::with_capacity(levels as usize);
    let mut start = 0;
    for l in 0..levels {
        let stride = 1u64 << (levels - 1 - l);
        let level_width = (width as u64).div_ceil(stride) as u32;
        let end = level_width as usize * height as usize;
        result.push(PyramidLevel {
            width: level_width,
            height,
            range: start..end,
        });
        start = end;
    }

    debug_assert_eq!(start, pixels.len());
    Ok(result)
}

/// All `width × height` coordinates in row-major order.
pub fn image_pixels(width: u32, height: u32) -> Vec<PixelCoord> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| PixelCoord::new(x, y)))
        .collect()
}

fn check_permutation(width: u32, height: u32, pixels: &[PixelCoord]) -> Result<()> {
    let total = width as usize * height as usize;
    if pixels.len() != total {
        return Err(RegistrationError::mismatch(format!(
            "expected {total} pixels for a {width}x{height} image, got {}",
            pixels.len()
        )));
    }

    let mut seen = vec![false; total];
    for p in pixels {
        if p.x >= width || p.y >= height {
            return Err(RegistrationError::mismatch(format!(
                "pixel ({}, {}) outside {width}x{height} image",
                p.x, p.y
            )));
        }
        let idx = p.y as usize * width as usize + p.x as usize;
        if std::mem::replace(&mut seen[idx], true) {
            return Err(RegistrationError::mismatch(format!(
                "pixel ({}, {}) listed twice",
                p.x, p.y
            )));
        }
    }
    Ok(())
}
