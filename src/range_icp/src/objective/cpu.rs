//! Per-pixel evaluation of the point-to-plane objective.
//!
//! For a live pixel with vertex `v` and the current pose `T`:
//! 1. `q = T·v` is projected into the model image (projective association)
//! 2. the model vertex `m` and normal `n` at that pixel form the plane
//! 3. `r = (q - m)·n`, gated on `‖q - m‖` and on the angle between the
//!    rotated live normal and `n`
//! 4. `J = [n, q × n]` for the left perturbation `exp(δ)·T`

use nalgebra::{Isometry3, Vector3, Vector6};

use super::types::{Correspondence, PixelOutcome};
use crate::frame::Frame;
use crate::projection::SphericalProjection;

/// Correspondence rejection thresholds and the robust kernel cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondenceGates {
    /// Largest accepted distance `‖q - m‖` (meters).
    pub max_distance: f64,
    /// Cosine of the largest accepted angle between normals.
    pub min_cos_angle: f64,
    /// Residual magnitude beyond which the Huber kernel down-weights.
    pub cutoff: f64,
}

/// Huber weight of a residual: 1 inside the cutoff, `cutoff/|r|` outside.
#[inline]
pub fn huber_weight(residual: f64, cutoff: f64) -> f64 {
    let abs = residual.abs();
    if abs <= cutoff {
        1.0
    } else {
        cutoff / abs
    }
}

/// Jacobian of `(exp(δ)·q - m)·n` with respect to `δ = [v, ω]` at `δ = 0`.
#[inline]
pub fn point_to_plane_jacobian(q: &Vector3<f64>, n: &Vector3<f64>) -> Vector6<f64> {
    let qxn = q.cross(n);
    Vector6::new(n.x, n.y, n.z, qxn.x, qxn.y, qxn.z)
}

/// Evaluate the live pixel at linear `index` under `pose`.
pub fn evaluate_pixel(
    live: &Frame,
    model: &Frame,
    projection: &SphericalProjection,
    pose: &Isometry3<f64>,
    gates: &CorrespondenceGates,
    index: usize,
) -> PixelOutcome {
    let Some(v) = live.valid_vertex(index) else {
        return PixelOutcome::Invalid;
    };

    let q = pose.rotation * v + pose.translation.vector;
    let Some(hit) = projection.project(&q) else {
        return PixelOutcome::Invalid;
    };

    let model_index = projection.index(hit.pixel);
    let (Some(m), Some(n)) = (model.valid_vertex(model_index), model.valid_normal(model_index))
    else {
        return PixelOutcome::Invalid;
    };

    let diff = q - m;
    if diff.norm() > gates.max_distance {
        return PixelOutcome::Outlier;
    }

    // A live pixel without a normal cannot pass the angle gate.
    let aligned = live
        .valid_normal(index)
        .map(|live_normal| (pose.rotation * live_normal).dot(&n) >= gates.min_cos_angle)
        .unwrap_or(false);
    if !aligned {
        return PixelOutcome::Outlier;
    }

    let residual = diff.dot(&n);
    PixelOutcome::Inlier(Correspondence {
        jacobian: point_to_plane_jacobian(&q, &n),
        residual,
        weight: huber_weight(residual, gates.cutoff),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::INVALID;
    use crate::projection::PixelCoord;
    use crate::se3;
    use approx::assert_relative_eq;

    const PIXEL: PixelCoord = PixelCoord::new(9, 4);

    fn projection() -> SphericalProjection {
        SphericalProjection::new(36, 8, 10.0, -10.0, 0.5, 100.0).unwrap()
    }

    fn gates() -> CorrespondenceGates {
        CorrespondenceGates {
            max_distance: 2.0,
            min_cos_angle: 50f64.to_radians().cos(),
            cutoff: 0.5,
        }
    }

    /// Frame with a single vertex on the ray through `PIXEL` and the given normal.
    fn single_pixel_frame(range: f64, normal: Option<Vector3<f64>>) -> Frame {
        let proj = projection();
        let dir = proj.ray_direction(PIXEL.x as f64 + 0.5, PIXEL.y as f64 + 0.5);
        let v = dir * range;

        let mut vertices = vec![INVALID; proj.num_pixels()];
        let mut normals = vec![INVALID; proj.num_pixels()];
        let idx = proj.index(PIXEL);
        vertices[idx] = [v.x as f32, v.y as f32, v.z as f32, 1.0];
        if let Some(n) = normal {
            normals[idx] = [n.x as f32, n.y as f32, n.z as f32, 1.0];
        }

        let mut frame = Frame::new(proj.width(), proj.height());
        frame.commit(vertices, normals, &[]);
        frame
    }

    fn facing(range: f64) -> Frame {
        let dir = projection().ray_direction(PIXEL.x as f64 + 0.5, PIXEL.y as f64 + 0.5);
        single_pixel_frame(range, Some(-dir))
    }

    #[test]
    fn test_huber_weight() {
        assert_eq!(huber_weight(0.2, 0.5), 1.0);
        assert_eq!(huber_weight(-0.5, 0.5), 1.0);
        assert_relative_eq!(huber_weight(2.0, 0.5), 0.25);
        assert_relative_eq!(huber_weight(-1.0, 0.5), 0.5);
    }

    #[test]
    fn test_identical_pixel_is_zero_residual_inlier() {
        let frame = facing(10.0);
        let idx = projection().index(PIXEL);
        let outcome = evaluate_pixel(
            &frame,
            &frame,
            &projection(),
            &Isometry3::identity(),
            &gates(),
            idx,
        );
        match outcome {
            PixelOutcome::Inlier(c) => {
                assert_relative_eq!(c.residual, 0.0, epsilon = 1e-12);
                assert_eq!(c.weight, 1.0);
            }
            other => panic!("expected inlier, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_live_vertex() {
        let frame = facing(10.0);
        let outcome = evaluate_pixel(
            &frame,
            &frame,
            &projection(),
            &Isometry3::identity(),
            &gates(),
            0,
        );
        assert_eq!(outcome, PixelOutcome::Invalid);
    }

    #[test]
    fn test_missing_model_normal_is_invalid() {
        let live = facing(10.0);
        let model = single_pixel_frame(10.0, None);
        let idx = projection().index(PIXEL);
        let outcome = evaluate_pixel(
            &live,
            &model,
            &projection(),
            &Isometry3::identity(),
            &gates(),
            idx,
        );
        assert_eq!(outcome, PixelOutcome::Invalid);
    }

    #[test]
    fn test_distance_gate() {
        let live = facing(10.0);
        let model = facing(13.0);
        let idx = projection().index(PIXEL);
        let outcome = evaluate_pixel(
            &live,
            &model,
            &projection(),
            &Isometry3::identity(),
            &gates(),
            idx,
        );
        assert_eq!(outcome, PixelOutcome::Outlier);
    }

    #[test]
    fn test_angle_gate() {
        let proj = projection();
        let dir = proj.ray_direction(PIXEL.x as f64 + 0.5, PIXEL.y as f64 + 0.5);
        let perpendicular = dir.cross(&Vector3::z()).normalize();

        let live = single_pixel_frame(10.0, Some(perpendicular));
        let model = facing(10.0);
        let idx = proj.index(PIXEL);
        let outcome = evaluate_pixel(&live, &model, &proj, &Isometry3::identity(), &gates(), idx);
        assert_eq!(outcome, PixelOutcome::Outlier);

        // invalid live normal fails the gate as well
        let live = single_pixel_frame(10.0, None);
        let outcome = evaluate_pixel(&live, &model, &proj, &Isometry3::identity(), &gates(), idx);
        assert_eq!(outcome, PixelOutcome::Outlier);
    }

    #[test]
    fn test_huber_applies_beyond_cutoff() {
        let live = facing(10.0);
        let model = facing(11.0);
        let idx = projection().index(PIXEL);
        let outcome = evaluate_pixel(
            &live,
            &model,
            &projection(),
            &Isometry3::identity(),
            &gates(),
            idx,
        );
        match outcome {
            PixelOutcome::Inlier(c) => {
                // live vertex is 1 m in front of the model plane, facing the sensor
                assert_relative_eq!(c.residual, 1.0, epsilon = 1e-5);
                assert_relative_eq!(c.weight, 0.5, epsilon = 1e-5);
            }
            other => panic!("expected inlier, got {other:?}"),
        }
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let q = Vector3::new(4.0, -2.0, 1.5);
        let m = Vector3::new(3.8, -2.1, 1.4);
        let n = Vector3::new(0.3, -0.5, 0.8).normalize();
        let residual = |delta: &Vector6<f64>| {
            let p = se3::exp(delta) * nalgebra::Point3::from(q);
            (p.coords - m).dot(&n)
        };

        let analytic = point_to_plane_jacobian(&q, &n);
        let h = 1e-6;
        for k in 0..6 {
            let mut plus = Vector6::zeros();
            let mut minus = Vector6::zeros();
            plus[k] = h;
            minus[k] = -h;
            let numeric = (residual(&plus) - residual(&minus)) / (2.0 * h);
            assert_relative_eq!(analytic[k], numeric, epsilon = 1e-6);
        }
    }
}
