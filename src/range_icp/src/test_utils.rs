//! Synthetic scans with known ground truth.
//!
//! Scans are ray-cast from inside an axis-aligned box room, one return per
//! pixel center, so every point re-projects exactly into the pixel it was
//! generated for and an unmoved scan aligns with itself at zero cost.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

use crate::error::Result;
use crate::frame::{Frame, Point};
use crate::projection::SphericalProjection;
use crate::rasterizer::{RangeImageRasterizer, RasterizerConfig};

/// Test image width (1° per column).
pub const TEST_WIDTH: u32 = 360;
/// Test image height.
pub const TEST_HEIGHT: u32 = 64;
/// Upper vertical field of view of the test sensor (degrees).
pub const TEST_FOV_UP: f32 = 30.0;
/// Lower vertical field of view of the test sensor (degrees).
pub const TEST_FOV_DOWN: f32 = -30.0;

/// Closed axis-aligned room; the sensor must be inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxRoom {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Default for BoxRoom {
    /// Asymmetric 14 × 9 × 4 m room around the origin, so that every degree of
    /// freedom is observable.
    fn default() -> Self {
        Self {
            min: Vector3::new(-6.0, -4.0, -1.5),
            max: Vector3::new(8.0, 5.0, 2.5),
        }
    }
}

impl BoxRoom {
    /// Scan seen by a sensor at the origin.
    pub fn scan(&self, projection: &SphericalProjection) -> Vec<Point> {
        self.scan_from(projection, &Isometry3::identity())
    }

    /// Scan seen by a sensor at `sensor_pose` (sensor → room), expressed in
    /// sensor coordinates.
    ///
    /// Points are emitted in row-major pixel order.
    pub fn scan_from(
        &self,
        projection: &SphericalProjection,
        sensor_pose: &Isometry3<f64>,
    ) -> Vec<Point> {
        let origin = sensor_pose.translation.vector;
        let mut points = Vec::with_capacity(projection.num_pixels());

        for row in 0..projection.height() {
            for col in 0..projection.width() {
                let dir = projection.ray_direction(col as f64 + 0.5, row as f64 + 0.5);
                let world_dir = sensor_pose.rotation * dir;
                if let Some(t) = self.exit_distance(&origin, &world_dir) {
                    let p = dir * t;
                    points.push([p.x as f32, p.y as f32, p.z as f32, 1.0]);
                }
            }
        }
        points
    }

    /// Distance along `dir` (unit) from `origin` to the room's boundary.
    fn exit_distance(&self, origin: &Vector3<f64>, dir: &Vector3<f64>) -> Option<f64> {
        let mut t_exit = f64::INFINITY;
        for axis in 0..3 {
            let d = dir[axis];
            if d.abs() < 1e-12 {
                continue;
            }
            let wall = if d > 0.0 { self.max[axis] } else { self.min[axis] };
            t_exit = t_exit.min((wall - origin[axis]) / d);
        }
        (t_exit.is_finite() && t_exit > 0.0).then_some(t_exit)
    }
}

/// Rasterizer configuration of the test sensor.
pub fn test_rasterizer_config() -> RasterizerConfig {
    RasterizerConfig {
        width: TEST_WIDTH,
        height: TEST_HEIGHT,
        fov_up: TEST_FOV_UP,
        fov_down: TEST_FOV_DOWN,
        min_depth: 0.5,
        max_depth: 100.0,
        ..RasterizerConfig::default()
    }
}

/// Rasterized room scan from `sensor_pose`.
pub fn room_frame(
    rasterizer: &RangeImageRasterizer,
    sensor_pose: &Isometry3<f64>,
) -> Result<Frame> {
    let projection = rasterizer.projection();
    let scan = BoxRoom::default().scan_from(projection, sensor_pose);
    let mut frame = Frame::new(projection.width(), projection.height());
    rasterizer.process(&scan, &mut frame)?;
    Ok(frame)
}

/// Pose from a translation and roll/pitch/yaw in degrees.
pub fn pose_from_xyz_rpy_deg(xyz: [f64; 3], rpy_deg: [f64; 3]) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(
            rpy_deg[0].to_radians(),
            rpy_deg[1].to_radians(),
            rpy_deg[2].to_radians(),
        ),
    )
}

/// Rotation about the x axis by `deg` degrees.
pub fn rotation_x_deg(deg: f64) -> Isometry3<f64> {
    pose_from_xyz_rpy_deg([0.0; 3], [deg, 0.0, 0.0])
}

/// Largest absolute entry of `a⁻¹·b - I`, as a pose distance for assertions.
pub fn pose_error(a: &Isometry3<f64>, b: &Isometry3<f64>) -> f64 {
    let delta = (a.inverse() * b).to_homogeneous() - nalgebra::Matrix4::identity();
    delta.abs().max()
}
