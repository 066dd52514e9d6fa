//! Per-iteration history of a solver run.
//!
//! Poses are stored as twists `log(T)` in `[v_x, v_y, v_z, ω_x, ω_y, ω_z]`
//! order and matrices row-major, so a dump can be diffed across runs.

use nalgebra::{Isometry3, Matrix6, Vector6};
use serde::{Deserialize, Serialize};

use crate::objective::NormalEquations;
use crate::se3;

/// State captured at one Gauss-Newton iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationDebug {
    /// Iteration number (0-indexed).
    pub iteration: usize,

    /// Pose at the start of this iteration.
    pub pose: Vec<f64>,

    /// `Σ w·r²` at `pose`.
    pub cost: f64,

    pub jtf: Vec<f64>,

    /// Normal matrix, row-major.
    pub jtj: Vec<f64>,

    pub inlier: usize,
    pub outlier: usize,
    pub invalid: usize,

    /// Solved step; empty when the system was singular.
    pub step: Vec<f64>,
    pub step_norm: f64,

    /// Pose after the retraction.
    pub pose_after: Vec<f64>,
}

impl IterationDebug {
    pub fn new(iteration: usize, pose: &Isometry3<f64>, eq: &NormalEquations) -> Self {
        Self {
            iteration,
            pose: twist_vec(pose),
            cost: eq.cost,
            jtf: eq.jtf.iter().copied().collect(),
            jtj: row_major(&eq.jtj),
            inlier: eq.inlier,
            outlier: eq.outlier,
            invalid: eq.invalid,
            ..Default::default()
        }
    }

    pub fn set_step(&mut self, step: &Vector6<f64>, pose_after: &Isometry3<f64>) {
        self.step = step.iter().copied().collect();
        self.step_norm = step.norm();
        self.pose_after = twist_vec(pose_after);
    }

    /// Compact log line.
    pub fn to_log_line(&self) -> String {
        format!(
            "iter={} cost={:.6} step={:.3e} inlier={} outlier={} invalid={}",
            self.iteration, self.cost, self.step_norm, self.inlier, self.outlier, self.invalid
        )
    }
}

/// Complete history of one `minimize` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverDebug {
    pub initial_pose: Vec<f64>,
    pub final_pose: Vec<f64>,
    pub iterations: Vec<IterationDebug>,
    /// Termination label (`converged`, `max_iterations`, `failed`).
    pub termination: String,
    /// Failure message, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl SolverDebug {
    pub fn new(initial_pose: &Isometry3<f64>) -> Self {
        Self {
            initial_pose: twist_vec(initial_pose),
            ..Default::default()
        }
    }

    pub fn set_final_pose(&mut self, pose: &Isometry3<f64>) {
        self.final_pose = twist_vec(pose);
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn twist_vec(pose: &Isometry3<f64>) -> Vec<f64> {
    se3::log(pose).iter().copied().collect()
}

fn row_major(m: &Matrix6<f64>) -> Vec<f64> {
    (0..6).flat_map(|i| (0..6).map(move |j| m[(i, j)])).collect()
}
