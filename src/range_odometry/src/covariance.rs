//! Edge uncertainty from a registration result.
//!
//! The information matrix of an odometry edge is the Laplace approximation
//! `JᵀJ` of the final registration, scaled by `information_scale`. Failed or
//! degenerate registrations fall back to `information_scale · I`.

use nalgebra::Matrix6;
use range_icp::optimization::condition_number;
use range_icp::SolverResult;
use tracing::warn;

/// How an information matrix was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InformationSource {
    /// Scaled `JᵀJ` of the registration
    LaplaceApproximation,
    /// Scaled identity
    Fallback,
}

/// Information matrix and its origin
#[derive(Debug, Clone, PartialEq)]
pub struct InformationEstimate {
    pub information: Matrix6<f64>,
    pub source: InformationSource,
}

impl InformationEstimate {
    /// Covariance (inverse information); `None` if not invertible
    pub fn covariance(&self) -> Option<Matrix6<f64>> {
        self.information.try_inverse()
    }
}

/// Estimate the information matrix of a registration
pub fn estimate_information(result: &SolverResult, scale: f64) -> InformationEstimate {
    let jtj = &result.equations.jtj;

    let usable = result.state.is_usable()
        && result.equations.inlier > 0
        && jtj.iter().all(|v| v.is_finite())
        && condition_number(jtj).is_finite();

    if usable {
        InformationEstimate {
            information: jtj * scale,
            source: InformationSource::LaplaceApproximation,
        }
    } else {
        warn!(
            state = result.state.label(),
            inlier = result.equations.inlier,
            "registration unusable for information estimate, using scaled identity"
        );
        fallback_information(scale)
    }
}

/// Scaled identity information
pub fn fallback_information(scale: f64) -> InformationEstimate {
    InformationEstimate {
        information: Matrix6::identity() * scale,
        source: InformationSource::Fallback,
    }
}
