//! Spherical projection model shared by the rasterizer and the ICP objective.
//!
//! A point `p` with range `r = ‖p‖`, yaw `atan2(p.y, p.x)` and pitch
//! `asin(p.z / r)` lands at continuous image coordinates
//!
//! - `u = 0.5 · (1 - yaw/π) · width`
//! - `v = (fov_up - pitch) / (fov_up + fov_down) · height`
//!
//! and is assigned to pixel `(floor(u), floor(v))`. Row 0 is the top of the
//! vertical field of view; the column axis wraps around at 360°.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{RegistrationError, Result};

/// Integer pixel position (`x` = column, `y` = row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: u32,
    pub y: u32,
}

impl PixelCoord {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Result of projecting a single point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub pixel: PixelCoord,
    pub range: f64,
}

/// Spherical range-image model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphericalProjection {
    width: u32,
    height: u32,
    /// Upper vertical bound in radians (non-negative).
    fov_up: f64,
    /// Total vertical field of view in radians.
    fov: f64,
    min_depth: f64,
    max_depth: f64,
}

impl SphericalProjection {
    /// Create a projection model.
    ///
    /// `fov_up_deg` and `fov_down_deg` are taken as magnitudes, so both
    /// `-24.8` and `24.8` describe the same lower bound.
    pub fn new(
        width: u32,
        height: u32,
        fov_up_deg: f32,
        fov_down_deg: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RegistrationError::config(format!(
                "image size must be positive, got {width}x{height}"
            )));
        }

        let fov_up = (fov_up_deg.abs() as f64).to_radians();
        let fov_down = (fov_down_deg.abs() as f64).to_radians();
        let fov = fov_up + fov_down;
        if !fov.is_finite() || fov <= 0.0 {
            return Err(RegistrationError::config(format!(
                "vertical field of view must be positive (fov_up={fov_up_deg}, fov_down={fov_down_deg})"
            )));
        }

        if !(min_depth >= 0.0 && min_depth < max_depth) {
            return Err(RegistrationError::config(format!(
                "depth range must satisfy 0 <= min_depth < max_depth, got [{min_depth}, {max_depth}]"
            )));
        }

        Ok(Self {
            width,
            height,
            fov_up,
            fov,
            min_depth: min_depth as f64,
            max_depth: max_depth as f64,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels in the image.
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major linear index of a pixel.
    #[inline]
    pub fn index(&self, pixel: PixelCoord) -> usize {
        pixel.y as usize * self.width as usize + pixel.x as usize
    }

    /// Pixel at a row-major linear index.
    #[inline]
    pub fn pixel(&self, index: usize) -> PixelCoord {
        let w = self.width as usize;
        PixelCoord::new((index % w) as u32, (index / w) as u32)
    }

    /// Continuous image coordinates `(u, v, range)` of a point, without any
    /// bounds or depth check.
    #[inline]
    pub fn image_coords(&self, point: &Vector3<f64>) -> (f64, f64, f64) {
        let range = point.norm();
        let yaw = point.y.atan2(point.x);
        let pitch = (point.z / range).asin();

        let u = 0.5 * (1.0 - yaw / PI) * self.width as f64;
        let v = (self.fov_up - pitch) / self.fov * self.height as f64;
        (u, v, range)
    }

    /// Project a point to its pixel.
    ///
    /// Returns `None` when the point is non-finite, outside the open depth
    /// interval `(min_depth, max_depth)`, or outside the vertical field of view.
    #[inline]
    pub fn project(&self, point: &Vector3<f64>) -> Option<Projection> {
        if !(point.x.is_finite() && point.y.is_finite() && point.z.is_finite()) {
            return None;
        }

        let (u, v, range) = self.image_coords(point);
        if !(range > self.min_depth && range < self.max_depth) {
            return None;
        }
        if !(v >= 0.0 && v < self.height as f64) {
            return None;
        }

        // yaw == -π lands exactly on the right border, which wraps to column 0
        let mut col = u.floor() as u32;
        if col >= self.width {
            col -= self.width;
        }
        let row = v.floor() as u32;

        Some(Projection {
            pixel: PixelCoord::new(col, row),
            range,
        })
    }

    /// Unit viewing ray through continuous image coordinates `(u, v)`.
    ///
    /// Inverse of the angular part of [`image_coords`](Self::image_coords);
    /// `(col + 0.5, row + 0.5)` is the ray through a pixel center.
    pub fn ray_direction(&self, u: f64, v: f64) -> Vector3<f64> {
        let yaw = PI * (1.0 - 2.0 * u / self.width as f64);
        let pitch = self.fov_up - v / self.height as f64 * self.fov;
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        Vector3::new(cp * cy, cp * sy, sp)
    }
}
