//! Gauss-Newton solver on the SE3 manifold.
//!
//! Each iteration:
//! 1. Linearize the objective at the current pose
//! 2. Solve `JᵀJ Δx = -Jᵀr`
//! 3. Retract: `T ← exp(Δx)·T`
//! 4. Stop when `‖Δx‖` falls below the stopping threshold

use nalgebra::Isometry3;
use tracing::{debug, warn};

use super::debug::{IterationDebug, SolverDebug};
use super::newton::solve_normal_equations;
use super::types::{SolverConfig, SolverResult, TerminationState};
use crate::error::Result;
use crate::objective::NormalEquations;
use crate::se3;

/// A least-squares problem over a rigid pose.
///
/// Jacobians are taken with respect to a left perturbation `exp(δ)·T`.
pub trait LeastSquaresObjective {
    /// Prepare for evaluations around `pose` (cache per-linearization data).
    fn initialize(&mut self, pose: &Isometry3<f64>);

    /// Accumulate the normal equations at `pose`.
    fn jacobian_products(&self, pose: &Isometry3<f64>) -> Result<NormalEquations>;
}

/// Iterative minimizer of a [`LeastSquaresObjective`].
#[derive(Debug, Clone)]
pub struct ManifoldSolver {
    config: SolverConfig,
}

impl ManifoldSolver {
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Minimize `objective` starting from `initial_pose`.
    ///
    /// A singular system ends the run with [`TerminationState::Failed`] and
    /// the last pose that was successfully evaluated.
    ///
    /// # Errors
    /// Errors raised by the objective itself (for example mismatched frames)
    /// are returned unchanged.
    pub fn minimize<O>(&self, objective: &mut O, initial_pose: Isometry3<f64>) -> Result<SolverResult>
    where
        O: LeastSquaresObjective + ?Sized,
    {
        let mut pose = initial_pose;
        let mut history = self.config.record_history.then(|| SolverDebug::new(&pose));
        let mut equations = NormalEquations::zeros();
        let mut state = TerminationState::MaxIterationsReached;
        let mut iterations = 0;

        for iteration in 0..self.config.max_iterations {
            objective.initialize(&pose);
            let eq = objective.jacobian_products(&pose)?;
            let mut record = history
                .as_ref()
                .map(|_| IterationDebug::new(iteration, &pose, &eq));

            let step = solve_normal_equations(&eq, self.config.singular_tolerance);
            equations = eq;

            let delta = match step {
                Ok(delta) => delta,
                Err(e) => {
                    warn!(
                        iteration,
                        inlier = equations.inlier,
                        "Gauss-Newton step failed: {e}"
                    );
                    if let (Some(h), Some(r)) = (history.as_mut(), record) {
                        h.iterations.push(r);
                    }
                    state = TerminationState::Failed(e);
                    break;
                }
            };

            pose = se3::exp(&delta) * pose;
            iterations += 1;

            let step_norm = delta.norm();
            debug!(
                iteration,
                cost = equations.cost,
                step = step_norm,
                inlier = equations.inlier,
                outlier = equations.outlier,
                "Gauss-Newton iteration"
            );
            if let (Some(h), Some(r)) = (history.as_mut(), record.as_mut()) {
                r.set_step(&delta, &pose);
                h.iterations.push(r.clone());
            }

            if step_norm < self.config.stopping_threshold {
                state = TerminationState::Converged;
                break;
            }
        }

        if let Some(h) = history.as_mut() {
            h.set_final_pose(&pose);
            h.termination = state.label().to_string();
            if let TerminationState::Failed(e) = &state {
                h.error = Some(e.to_string());
            }
        }

        Ok(SolverResult {
            pose,
            state,
            iterations,
            equations,
            history,
        })
    }
}
