//! Range-image rasterization of LiDAR scans.
//!
//! Turns an unordered point cloud into the structured vertex and normal maps
//! of a [`Frame`]:
//! - vertex map, z-buffered (nearest point per pixel) or averaged
//! - optional bilateral smoothing of the vertex map
//! - normal map from neighboring vertices
//!
//! # Example
//!
//! ```ignore
//! use range_icp::{Frame, RangeImageRasterizer, RasterizerConfig};
//!
//! let rasterizer = RangeImageRasterizer::new(RasterizerConfig::default())?;
//! let mut frame = Frame::new(720, 64);
//! rasterizer.process(&scan, &mut frame)?;
//! assert!(frame.is_valid());
//! ```

mod backend;
mod cpu;

pub use backend::ComputeBackend;
pub use cpu::{
    averaged_vertex_map, bilateral_filter, normal_map, project_points, zbuffer_vertex_map,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistrationError, Result};
use crate::frame::{Frame, Point};
use crate::projection::SphericalProjection;

/// Rasterizer parameters. Field names follow the parameter record keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterizerConfig {
    /// Image width in pixels (horizontal resolution over 360°).
    #[serde(rename = "data_width")]
    pub width: u32,

    /// Image height in pixels (number of rows over the vertical field of view).
    #[serde(rename = "data_height")]
    pub height: u32,

    /// Upper vertical field-of-view bound in degrees (sign ignored).
    #[serde(rename = "data_fov_up")]
    pub fov_up: f32,

    /// Lower vertical field-of-view bound in degrees (sign ignored).
    #[serde(rename = "data_fov_down")]
    pub fov_down: f32,

    /// Points at or below this range are dropped (meters).
    pub min_depth: f32,

    /// Points at or beyond this range are dropped (meters).
    pub max_depth: f32,

    /// Average all points per pixel instead of keeping the nearest.
    #[serde(default, rename = "avg_vertexmap")]
    pub average: bool,

    /// Run the bilateral filter before normal estimation.
    #[serde(default, rename = "filter_vertexmap")]
    pub filter: bool,

    /// Spatial standard deviation of the bilateral filter (pixels).
    #[serde(default = "default_sigma_space", rename = "bilateral_sigma_space")]
    pub sigma_space: f32,

    /// Range standard deviation of the bilateral filter (meters).
    #[serde(default = "default_sigma_range", rename = "bilateral_sigma_range")]
    pub sigma_range: f32,

    /// Publish the filtered vertices as the frame's vertex map.
    #[serde(default, rename = "use_filtered_vertexmap")]
    pub use_filtered: bool,

    /// Worker threads (0 = global pool, 1 = serial).
    #[serde(default)]
    pub num_threads: usize,
}

fn default_sigma_space() -> f32 {
    1.0
}

fn default_sigma_range() -> f32 {
    0.5
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        // Velodyne HDL-64E as mounted on the KITTI vehicle
        Self {
            width: 720,
            height: 64,
            fov_up: 3.0,
            fov_down: -25.0,
            min_depth: 0.5,
            max_depth: 100.0,
            average: false,
            filter: false,
            sigma_space: default_sigma_space(),
            sigma_range: default_sigma_range(),
            use_filtered: false,
            num_threads: 0,
        }
    }
}

impl RasterizerConfig {
    /// Spherical model described by this configuration.
    pub fn projection(&self) -> Result<SphericalProjection> {
        SphericalProjection::new(
            self.width,
            self.height,
            self.fov_up,
            self.fov_down,
            self.min_depth,
            self.max_depth,
        )
    }

    /// Check the configuration without building a rasterizer.
    pub fn validate(&self) -> Result<()> {
        self.projection()?;
        if self.filter {
            let positive = |v: f32| v.is_finite() && v > 0.0;
            if !positive(self.sigma_space) || !positive(self.sigma_range) {
                return Err(RegistrationError::config(format!(
                    "bilateral sigmas must be positive (space={}, range={})",
                    self.sigma_space, self.sigma_range
                )));
            }
        }
        Ok(())
    }
}

/// Projects point clouds into [`Frame`]s.
#[derive(Debug, Clone)]
pub struct RangeImageRasterizer {
    config: RasterizerConfig,
    projection: SphericalProjection,
    backend: ComputeBackend,
}

impl RangeImageRasterizer {
    /// Validate the configuration and set up the compute backend.
    pub fn new(config: RasterizerConfig) -> Result<Self> {
        config.validate()?;
        let projection = config.projection()?;
        let backend = ComputeBackend::with_threads(config.num_threads)?;
        Ok(Self {
            config,
            projection,
            backend,
        })
    }

    pub fn config(&self) -> &RasterizerConfig {
        &self.config
    }

    /// Projection model shared with the registration objective.
    pub fn projection(&self) -> &SphericalProjection {
        &self.projection
    }

    pub fn backend(&self) -> &ComputeBackend {
        &self.backend
    }

    /// Replace the parameters. On error the rasterizer keeps its previous state.
    pub fn set_parameters(&mut self, config: RasterizerConfig) -> Result<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    /// Rasterize `points` into `frame`.
    ///
    /// The frame must have the configured resolution; otherwise it is left
    /// untouched and [`RegistrationError::RasterizationPrecondition`] is
    /// returned. On success the frame holds the new maps, a copy of the points,
    /// and is marked valid.
    pub fn process(&self, points: &[Point], frame: &mut Frame) -> Result<()> {
        if frame.width() != self.projection.width() || frame.height() != self.projection.height()
        {
            return Err(RegistrationError::RasterizationPrecondition(format!(
                "frame is {}x{}, rasterizer is configured for {}x{}",
                frame.width(),
                frame.height(),
                self.projection.width(),
                self.projection.height()
            )));
        }

        let (width, height) = (self.projection.width(), self.projection.height());
        let projections = project_points(&self.backend, &self.projection, points);

        let mut vertices = if self.config.average {
            averaged_vertex_map(&self.backend, &self.projection, points, &projections)
        } else {
            zbuffer_vertex_map(&self.projection, points, &projections)
        };

        let normals = if self.config.filter {
            let filtered = bilateral_filter(
                &self.backend,
                width,
                height,
                &vertices,
                self.config.sigma_space,
                self.config.sigma_range,
            );
            let normals = normal_map(&self.backend, width, height, &filtered);
            if self.config.use_filtered {
                vertices = filtered;
            }
            normals
        } else {
            normal_map(&self.backend, width, height, &vertices)
        };

        frame.commit(vertices, normals, points);

        debug!(
            points = points.len(),
            projected = projections.iter().filter(|p| p.is_some()).count(),
            valid_pixels = frame.num_valid_vertices(),
            "rasterized scan"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        test_rasterizer_config as test_config, BoxRoom, TEST_HEIGHT, TEST_WIDTH,
    };

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "data_width": 720, "data_height": 64,
            "data_fov_up": 2.5, "data_fov_down": -24.8,
            "min_depth": 0.5, "max_depth": 100.0,
            "filter_vertexmap": true, "bilateral_sigma_space": 2.0
        }"#;
        let config: RasterizerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.width, 720);
        assert!(config.filter);
        assert!(!config.average);
        assert_eq!(config.sigma_space, 2.0);
        assert_eq!(config.sigma_range, default_sigma_range());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_missing_required_key() {
        let json = r#"{ "data_width": 720, "data_height": 64 }"#;
        assert!(serde_json::from_str::<RasterizerConfig>(json).is_err());
    }

    #[test]
    fn test_invalid_bilateral_sigma() {
        let config = RasterizerConfig {
            filter: true,
            sigma_range: 0.0,
            ..RasterizerConfig::default()
        };
        assert!(matches!(
            RangeImageRasterizer::new(config),
            Err(RegistrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch_leaves_frame_untouched() {
        let rasterizer = RangeImageRasterizer::new(test_config()).unwrap();
        let mut frame = Frame::new(10, 10);
        let before = frame.clone();

        let result = rasterizer.process(&[[5.0, 0.0, 0.0, 1.0]], &mut frame);
        assert!(matches!(
            result,
            Err(RegistrationError::RasterizationPrecondition(_))
        ));
        assert_eq!(frame, before);
    }

    #[test]
    fn test_room_scan_fills_image() {
        let rasterizer = RangeImageRasterizer::new(test_config()).unwrap();
        let scan = BoxRoom::default().scan(rasterizer.projection());

        let mut frame = Frame::new(TEST_WIDTH, TEST_HEIGHT);
        rasterizer.process(&scan, &mut frame).unwrap();

        assert!(frame.is_valid());
        assert_eq!(frame.points().len(), scan.len());
        assert_eq!(frame.num_valid_vertices(), scan.len());

        // nearly every pixel of a closed room has a normal facing the sensor
        let with_normal = (0..frame.num_pixels())
            .filter_map(|i| Some((frame.valid_vertex(i)?, frame.valid_normal(i)?)))
            .filter(|(v, n)| n.dot(v) < 0.0)
            .count();
        assert!(with_normal as f64 > 0.95 * scan.len() as f64);
    }

    #[test]
    fn test_deterministic_across_backends() {
        let scan = BoxRoom::default().scan(&test_config().projection().unwrap());

        for average in [false, true] {
            let mut frames = Vec::new();
            for num_threads in [1, 0, 4] {
                let config = RasterizerConfig {
                    num_threads,
                    filter: true,
                    average,
                    ..test_config()
                };
                let rasterizer = RangeImageRasterizer::new(config).unwrap();
                let mut frame = Frame::new(TEST_WIDTH, TEST_HEIGHT);
                rasterizer.process(&scan, &mut frame).unwrap();
                assert!(frame.is_valid());
                frames.push(frame);
            }

            assert_eq!(frames[0], frames[1], "average = {average}");
            assert_eq!(frames[0], frames[2], "average = {average}");
        }
    }

    #[test]
    fn test_filtered_vertexmap_flag() {
        let scan = BoxRoom::default().scan(&test_config().projection().unwrap());

        let run = |use_filtered| {
            let config = RasterizerConfig {
                filter: true,
                use_filtered,
                ..test_config()
            };
            let rasterizer = RangeImageRasterizer::new(config).unwrap();
            let mut frame = Frame::new(TEST_WIDTH, TEST_HEIGHT);
            rasterizer.process(&scan, &mut frame).unwrap();
            frame
        };

        let raw = run(false);
        let filtered = run(true);

        // unfiltered maps keep the input coordinates exactly
        let idx = (0..raw.num_pixels())
            .find(|&i| raw.valid_vertex(i).is_some())
            .unwrap();
        assert!(scan.iter().any(|p| p[..3] == raw.vertex_map()[idx][..3]));

        // normals are computed from the filtered map in both cases
        assert_eq!(raw.normal_map(), filtered.normal_map());
    }
}
