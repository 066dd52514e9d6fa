//! Exponential and logarithm maps of the SE3 manifold.
//!
//! Twists are laid out translation first: `[v_x, v_y, v_z, ω_x, ω_y, ω_z]`.
//!
//! - `exp`: Rodrigues' formula for the rotation, left Jacobian
//!   `V = I + (1-cosθ)/θ² K + (θ-sinθ)/θ³ K²` for the translation.
//! - `log`: rotation vector from the rotation block, `V⁻¹` for the translation.
//!
//! Both maps switch to Taylor expansions when `θ` is close to zero.

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3, Vector6,
};

/// Tangent-space coordinates of a rigid motion.
pub type Twist = Vector6<f64>;

/// Below this rotation angle the closed forms are replaced by series expansions.
const SMALL_ANGLE: f64 = 1e-6;

/// Skew-symmetric matrix `[v]×` such that `[v]× w = v × w`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Rotation part of a twist.
pub fn rotation_part(twist: &Twist) -> Vector3<f64> {
    Vector3::new(twist[3], twist[4], twist[5])
}

/// Translation part of a twist.
pub fn translation_part(twist: &Twist) -> Vector3<f64> {
    Vector3::new(twist[0], twist[1], twist[2])
}

/// Map a twist onto the manifold.
pub fn exp(twist: &Twist) -> Isometry3<f64> {
    let omega = rotation_part(twist);
    let v = translation_part(twist);

    let theta_sq = omega.norm_squared();
    let theta = theta_sq.sqrt();
    let k = skew(&omega);
    let k2 = k * k;

    // a = sinθ/θ, b = (1-cosθ)/θ², c = (θ-sinθ)/θ³
    let (a, b, c) = if theta < SMALL_ANGLE {
        (
            1.0 - theta_sq / 6.0,
            0.5 - theta_sq / 24.0,
            1.0 / 6.0 - theta_sq / 120.0,
        )
    } else {
        let (sin_t, cos_t) = theta.sin_cos();
        (
            sin_t / theta,
            (1.0 - cos_t) / theta_sq,
            (theta - sin_t) / (theta_sq * theta),
        )
    };

    let rotation = Matrix3::identity() + k * a + k2 * b;
    let left_jacobian = Matrix3::identity() + k * b + k2 * c;

    let rotation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    Isometry3::from_parts(Translation3::from(left_jacobian * v), rotation)
}

/// Map a rigid transform back to tangent coordinates.
///
/// Inverse of [`exp`] for rotation angles below π.
pub fn log(pose: &Isometry3<f64>) -> Twist {
    let omega = rotation_log(pose.rotation.to_rotation_matrix().matrix());
    let v = inverse_left_jacobian(&omega) * pose.translation.vector;
    Vector6::new(v.x, v.y, v.z, omega.x, omega.y, omega.z)
}

/// `exp` returning a 4×4 homogeneous matrix.
pub fn exp_matrix(twist: &Twist) -> Matrix4<f64> {
    exp(twist).to_homogeneous()
}

/// `log` of a 4×4 homogeneous matrix.
///
/// The upper-left 3×3 block is assumed to be a rotation.
pub fn log_matrix(transform: &Matrix4<f64>) -> Twist {
    let r: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();
    let t = Vector3::new(transform[(0, 3)], transform[(1, 3)], transform[(2, 3)]);
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    log(&Isometry3::from_parts(Translation3::from(t), rotation))
}

/// Rotation vector of a rotation matrix, angle in `[0, π]`.
fn rotation_log(r: &Matrix3<f64>) -> Vector3<f64> {
    // sinθ · axis
    let s = Vector3::new(
        r[(2, 1)] - r[(1, 2)],
        r[(0, 2)] - r[(2, 0)],
        r[(1, 0)] - r[(0, 1)],
    ) * 0.5;
    let sin_t = s.norm();
    let cos_t = ((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    let theta = sin_t.atan2(cos_t);

    if theta < SMALL_ANGLE {
        s * (1.0 + theta * theta / 6.0)
    } else if sin_t < SMALL_ANGLE {
        // θ ≈ π: the antisymmetric part vanishes, recover the axis from the quaternion
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*r)).scaled_axis()
    } else {
        s * (theta / sin_t)
    }
}

/// `V⁻¹ = I - ½K + (1/θ²)(1 - θ sinθ / (2(1-cosθ))) K²`
fn inverse_left_jacobian(omega: &Vector3<f64>) -> Matrix3<f64> {
    let theta_sq = omega.norm_squared();
    let theta = theta_sq.sqrt();
    let k = skew(omega);

    let coeff = if theta < SMALL_ANGLE {
        1.0 / 12.0 + theta_sq / 720.0
    } else {
        let (sin_t, cos_t) = theta.sin_cos();
        (1.0 - theta * sin_t / (2.0 * (1.0 - cos_t))) / theta_sq
    };

    Matrix3::identity() - k * 0.5 + k * k * coeff
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn assert_twist_eq(expected: &Twist, actual: &Twist, epsilon: f64) {
        for i in 0..6 {
            assert_relative_eq!(expected[i], actual[i], epsilon = epsilon);
        }
    }

    #[test]
    fn test_log_exp_roundtrip() {
        let x = Vector6::new(-0.7, 0.1, 0.1, 0.1, -0.5, 0.33);
        assert_twist_eq(&x, &log(&exp(&x)), 1e-4);

        let swapped = Vector6::new(0.1, -0.5, 0.33, -0.7, 0.1, 0.1);
        assert_twist_eq(&swapped, &log(&exp(&swapped)), 1e-4);
    }

    #[test]
    fn test_log_exp_roundtrip_sweep() {
        // Rotation norms spread over (0, π)
        let twists = [
            Vector6::new(1.0, -2.0, 3.0, 0.0, 0.0, 0.0),
            Vector6::new(0.5, 0.5, 0.5, 1e-8, -2e-8, 0.0),
            Vector6::new(-4.0, 0.1, 2.5, 0.3, -0.2, 0.9),
            Vector6::new(10.0, -7.0, 0.2, -1.2, 0.8, 0.4),
            Vector6::new(0.0, 0.0, -1.0, 0.0, 2.5, 1.0),
            Vector6::new(3.0, 3.0, 3.0, 1.7, 1.7, -1.7),
        ];

        for x in &twists {
            assert!(rotation_part(x).norm() < PI);
            assert_twist_eq(x, &log(&exp(x)), 1e-4);
        }
    }

    #[test]
    fn test_exp_zero_is_identity() {
        let pose = exp(&Twist::zeros());
        assert_relative_eq!(pose.to_homogeneous(), Matrix4::identity(), epsilon = 1e-15);
    }

    #[test]
    fn test_exp_pure_rotation_matches_axis_angle() {
        let omega = Vector3::new(0.2, -0.4, 0.7);
        let twist = Vector6::new(0.0, 0.0, 0.0, omega.x, omega.y, omega.z);

        let expected = UnitQuaternion::from_scaled_axis(omega);
        let pose = exp(&twist);

        assert_relative_eq!(
            pose.rotation.to_rotation_matrix().into_inner(),
            expected.to_rotation_matrix().into_inner(),
            epsilon = 1e-12
        );
        assert!(pose.translation.vector.norm() < 1e-15);
    }

    #[test]
    fn test_exp_pure_translation() {
        let twist = Vector6::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.0);
        let pose = exp(&twist);
        assert_relative_eq!(pose.translation.vector, Vector3::new(1.0, 2.0, 3.0));
        assert!(pose.rotation.angle() < 1e-15);
    }

    #[test]
    fn test_small_angle_continuity() {
        // Both sides of the Taylor switch must agree
        let below = Vector6::new(1.0, 1.0, 1.0, 0.9e-6, 0.0, 0.0);
        let above = Vector6::new(1.0, 1.0, 1.0, 1.1e-6, 0.0, 0.0);

        let pb = exp(&below).to_homogeneous();
        let pa = exp(&above).to_homogeneous();
        assert_relative_eq!(pb, pa, epsilon = 1e-6);

        assert_twist_eq(&below, &log(&exp(&below)), 1e-9);
        assert_twist_eq(&above, &log(&exp(&above)), 1e-9);
    }

    #[test]
    fn test_log_near_pi() {
        let omega = Vector3::new(0.0, 0.0, PI - 1e-9);
        let pose = Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_scaled_axis(omega),
        );
        let twist = log(&pose);
        assert_relative_eq!(rotation_part(&twist).norm(), PI, epsilon = 1e-6);
    }

    #[test]
    fn test_matrix_variants_agree() {
        let x = Vector6::new(0.1, 0.2, -0.3, 1.0, -1.0, 0.5);
        let m = exp_matrix(&x);
        assert_relative_eq!(m, exp(&x).to_homogeneous(), epsilon = 1e-12);
        assert_twist_eq(&x, &log_matrix(&m), 1e-9);
    }

    #[test]
    fn test_skew_cross_product() {
        let a = Vector3::new(1.0, -2.0, 0.5);
        let b = Vector3::new(0.3, 0.7, -1.1);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-15);
    }
}
