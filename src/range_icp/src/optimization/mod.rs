//! Gauss-Newton minimization over rigid poses.
//!
//! This module implements the registration loop:
//! 1. Accumulate the normal equations at the current pose
//! 2. Solve `JᵀJ Δx = -Jᵀr` (Cholesky, rank-checked with SVD)
//! 3. Retract on SE3 and check convergence

pub mod debug;
pub mod newton;
pub mod solver;
pub mod types;

pub use debug::{IterationDebug, SolverDebug};
pub use newton::{condition_number, gauss_newton_step, solve_normal_equations};
pub use solver::{LeastSquaresObjective, ManifoldSolver};
pub use types::{SolverConfig, SolverResult, TerminationState};
