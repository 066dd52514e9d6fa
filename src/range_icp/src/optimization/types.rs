//! Type definitions for the manifold solver.

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use super::debug::SolverDebug;
use crate::error::{RegistrationError, Result};
use crate::objective::NormalEquations;

/// Configuration of the Gauss-Newton loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Iteration cap.
    #[serde(rename = "max iterations")]
    pub max_iterations: usize,

    /// Iteration stops when `‖Δx‖ < stopping_threshold`.
    #[serde(rename = "stopping threshold")]
    pub stopping_threshold: f64,

    /// Smallest accepted `σ_min / σ_max` of the normal matrix.
    #[serde(default = "default_singular_tolerance")]
    pub singular_tolerance: f64,

    /// Keep a per-iteration [`SolverDebug`] history in the result.
    #[serde(default)]
    pub record_history: bool,
}

fn default_singular_tolerance() -> f64 {
    1e-12
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            stopping_threshold: 1e-6,
            singular_tolerance: default_singular_tolerance(),
            record_history: false,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(RegistrationError::config("max iterations must be at least 1"));
        }
        if !(self.stopping_threshold > 0.0) {
            return Err(RegistrationError::config(format!(
                "stopping threshold must be positive, got {}",
                self.stopping_threshold
            )));
        }
        if !(self.singular_tolerance >= 0.0 && self.singular_tolerance < 1.0) {
            return Err(RegistrationError::config(format!(
                "singular_tolerance must be in [0, 1), got {}",
                self.singular_tolerance
            )));
        }
        Ok(())
    }
}

/// How the solver loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationState {
    /// Step norm fell below the stopping threshold.
    Converged,

    /// Iteration cap reached first.
    MaxIterationsReached,

    /// The system could not be solved; the pose is the last good one.
    Failed(RegistrationError),
}

impl TerminationState {
    pub fn is_converged(&self) -> bool {
        matches!(self, TerminationState::Converged)
    }

    /// Converged or ran out of iterations with a finite pose.
    pub fn is_usable(&self) -> bool {
        !matches!(self, TerminationState::Failed(_))
    }

    /// Short label used in logs and debug dumps.
    pub fn label(&self) -> &'static str {
        match self {
            TerminationState::Converged => "converged",
            TerminationState::MaxIterationsReached => "max_iterations",
            TerminationState::Failed(_) => "failed",
        }
    }
}

/// Outcome of [`ManifoldSolver::minimize`](super::ManifoldSolver::minimize).
#[derive(Debug, Clone)]
pub struct SolverResult {
    /// Final pose; never contains NaN.
    pub pose: Isometry3<f64>,

    pub state: TerminationState,

    /// Number of Gauss-Newton steps taken.
    pub iterations: usize,

    /// System evaluated at the last linearization point.
    pub equations: NormalEquations,

    /// Per-iteration history when `record_history` is set.
    pub history: Option<SolverDebug>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SolverConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.stopping_threshold, 1e-6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_keys() {
        let config: SolverConfig =
            serde_json::from_str(r#"{ "max iterations": 20, "stopping threshold": 1e-4 }"#)
                .unwrap();
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.stopping_threshold, 1e-4);
        assert_eq!(config.singular_tolerance, 1e-12);
        assert!(!config.record_history);

        assert!(serde_json::from_str::<SolverConfig>(r#"{ "max iterations": 20 }"#).is_err());
    }

    #[test]
    fn test_config_validate() {
        let zero_iters = SolverConfig {
            max_iterations: 0,
            ..SolverConfig::default()
        };
        assert!(zero_iters.validate().is_err());

        let negative = SolverConfig {
            stopping_threshold: -1.0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(RegistrationError::Configuration(_))
        ));
    }

    #[test]
    fn test_termination_state() {
        assert!(TerminationState::Converged.is_converged());
        assert!(TerminationState::MaxIterationsReached.is_usable());
        assert!(!TerminationState::MaxIterationsReached.is_converged());

        let failed = TerminationState::Failed(RegistrationError::SingularSystem("x".into()));
        assert!(!failed.is_usable());
        assert_eq!(failed.label(), "failed");
    }
}
