//! Accumulated least-squares system of the point-to-plane objective.

use std::ops::{Add, AddAssign};

use nalgebra::{Matrix6, Vector6};
use serde::{Deserialize, Serialize};

/// Contribution of a single inlier correspondence.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    /// Jacobian row `[n_m, q × n_m]`.
    pub jacobian: Vector6<f64>,
    /// Signed point-to-plane distance `(q - m) · n_m`.
    pub residual: f64,
    /// Robust weight in `(0, 1]`.
    pub weight: f64,
}

/// Result of one pixel of the objective.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelOutcome {
    /// No usable correspondence (invalid vertex, out of image, no model data).
    Invalid,
    /// Correspondence rejected by the distance or angle gate.
    Outlier,
    Inlier(Correspondence),
}

/// Weighted normal equations `JᵀWJ Δx = -JᵀWr` and correspondence statistics.
///
/// Partial systems from disjoint pixel sets are merged with `+`; merging is
/// associative and [`NormalEquations::zeros`] is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalEquations {
    /// `Σ w·JᵀJ` (6×6, symmetric positive semi-definite).
    pub jtj: Matrix6<f64>,
    /// `Σ w·Jᵀr`.
    pub jtf: Vector6<f64>,
    /// `Σ w·r²`.
    pub cost: f64,
    pub inlier: usize,
    pub outlier: usize,
    /// Pixels that found a model correspondence (`inlier + outlier`).
    pub valid: usize,
    /// Visited pixels without a correspondence.
    pub invalid: usize,
}

impl Default for NormalEquations {
    fn default() -> Self {
        Self::zeros()
    }
}

impl NormalEquations {
    /// Create an empty system.
    pub fn zeros() -> Self {
        Self {
            jtj: Matrix6::zeros(),
            jtf: Vector6::zeros(),
            cost: 0.0,
            inlier: 0,
            outlier: 0,
            valid: 0,
            invalid: 0,
        }
    }

    /// Fold one pixel outcome into the system.
    pub fn record(&mut self, outcome: &PixelOutcome) {
        match outcome {
            PixelOutcome::Invalid => self.invalid += 1,
            PixelOutcome::Outlier => {
                self.outlier += 1;
                self.valid += 1;
            }
            PixelOutcome::Inlier(c) => {
                let wj = c.jacobian * c.weight;
                self.jtj += wj * c.jacobian.transpose();
                self.jtf += wj * c.residual;
                self.cost += c.weight * c.residual * c.residual;
                self.inlier += 1;
                self.valid += 1;
            }
        }
    }

    /// Merge a partial system computed over a disjoint pixel set.
    pub fn accumulate(&mut self, other: &NormalEquations) {
        self.jtj += other.jtj;
        self.jtf += other.jtf;
        self.cost += other.cost;
        self.inlier += other.inlier;
        self.outlier += other.outlier;
        self.valid += other.valid;
        self.invalid += other.invalid;
    }

    /// Number of visited pixels.
    pub fn visited(&self) -> usize {
        self.valid + self.invalid
    }

    /// Fraction of correspondences that passed the gates.
    pub fn inlier_ratio(&self) -> f64 {
        if self.valid == 0 {
            0.0
        } else {
            self.inlier as f64 / self.valid as f64
        }
    }

    /// Root mean squared weighted residual over inliers.
    pub fn rmse(&self) -> f64 {
        if self.inlier == 0 {
            0.0
        } else {
            (self.cost / self.inlier as f64).sqrt()
        }
    }
}

impl AddAssign<&NormalEquations> for NormalEquations {
    fn add_assign(&mut self, rhs: &NormalEquations) {
        self.accumulate(rhs);
    }
}

impl Add for NormalEquations {
    type Output = NormalEquations;

    fn add(mut self, rhs: NormalEquations) -> NormalEquations {
        self.accumulate(&rhs);
        self
    }
}
