//! Point-to-plane ICP objective over a pair of rasterized frames.
//!
//! The live frame is aligned to the model frame: for a candidate pose `T`
//! (live → model), every visited live pixel is transformed, projected into the
//! model image and compared against the model's local plane there. The result
//! of one evaluation is a fresh [`NormalEquations`].

mod cpu;
mod types;

pub use cpu::{evaluate_pixel, huber_weight, point_to_plane_jacobian, CorrespondenceGates};
pub use types::{Correspondence, NormalEquations, PixelOutcome};

use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};
use crate::frame::Frame;
use crate::optimization::LeastSquaresObjective;
use crate::projection::{PixelCoord, SphericalProjection};
use crate::rasterizer::ComputeBackend;

/// Correspondence gating and robust weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpConfig {
    /// Largest angle between live and model normals (degrees).
    #[serde(rename = "icp-max-angle")]
    pub max_angle: f64,

    /// Largest distance between a transformed live vertex and its model vertex (meters).
    #[serde(rename = "icp-max-distance")]
    pub max_distance: f64,

    /// Huber cutoff on the point-to-plane residual (meters).
    pub cutoff_threshold: f64,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_angle: 50.0,
            max_distance: 2.0,
            cutoff_threshold: 100.0,
        }
    }
}

impl IcpConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_angle > 0.0 && self.max_angle <= 180.0) {
            return Err(RegistrationError::config(format!(
                "icp-max-angle must be in (0, 180], got {}",
                self.max_angle
            )));
        }
        if !(self.max_distance > 0.0 && self.max_distance.is_finite()) {
            return Err(RegistrationError::config(format!(
                "icp-max-distance must be positive, got {}",
                self.max_distance
            )));
        }
        if !(self.cutoff_threshold > 0.0) {
            return Err(RegistrationError::config(format!(
                "cutoff_threshold must be positive, got {}",
                self.cutoff_threshold
            )));
        }
        Ok(())
    }

    pub fn gates(&self) -> CorrespondenceGates {
        CorrespondenceGates {
            max_distance: self.max_distance,
            min_cos_angle: self.max_angle.to_radians().cos(),
            cutoff: self.cutoff_threshold,
        }
    }
}

/// Projective point-to-plane objective between a live and a model frame.
#[derive(Debug, Clone)]
pub struct IcpObjective<'a> {
    config: IcpConfig,
    gates: CorrespondenceGates,
    projection: SphericalProjection,
    backend: ComputeBackend,
    live: &'a Frame,
    model: &'a Frame,
    /// Pixel subset to visit; `None` visits the whole live image.
    restriction: Option<Vec<usize>>,
    /// Visited pixels with a valid live vertex, cached by `initialize`.
    active: Vec<usize>,
    /// Visited pixels without a live vertex, cached by `initialize`.
    skipped: usize,
    linearization_pose: Option<Isometry3<f64>>,
}

impl<'a> IcpObjective<'a> {
    /// Bind the objective to a frame pair.
    ///
    /// `projection` must be the model the frames were rasterized with.
    pub fn new(
        config: IcpConfig,
        projection: SphericalProjection,
        live: &'a Frame,
        model: &'a Frame,
    ) -> Result<Self> {
        config.validate()?;
        check_frames(&projection, live, model)?;
        Ok(Self {
            gates: config.gates(),
            config,
            projection,
            backend: ComputeBackend::default(),
            live,
            model,
            restriction: None,
            active: Vec::new(),
            skipped: 0,
            linearization_pose: None,
        })
    }

    /// Run the per-pixel evaluation on `backend`.
    pub fn with_backend(mut self, backend: ComputeBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Rebind to another frame pair. The pixel restriction is kept; the
    /// cached pixel set is dropped until the next `initialize`.
    pub fn set_data(&mut self, live: &'a Frame, model: &'a Frame) -> Result<()> {
        check_frames(&self.projection, live, model)?;
        self.live = live;
        self.model = model;
        self.reset();
        Ok(())
    }

    /// Visit only `pixels` of the live image (for example a pyramid prefix).
    pub fn restrict_to(&mut self, pixels: &[PixelCoord]) -> Result<()> {
        let (w, h) = (self.projection.width(), self.projection.height());
        let indices = pixels
            .iter()
            .map(|p| {
                if p.x < w && p.y < h {
                    Ok(self.projection.index(*p))
                } else {
                    Err(RegistrationError::mismatch(format!(
                        "pixel ({}, {}) outside {w}x{h} image",
                        p.x, p.y
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        self.restriction = Some(indices);
        self.reset();
        Ok(())
    }

    /// Visit every live pixel again.
    pub fn clear_restriction(&mut self) {
        self.restriction = None;
        self.reset();
    }

    /// Pose passed to the last `initialize`.
    pub fn linearization_pose(&self) -> Option<&Isometry3<f64>> {
        self.linearization_pose.as_ref()
    }

    /// Number of pixels evaluated per call to `jacobian_products`.
    pub fn num_active(&self) -> usize {
        if self.linearization_pose.is_some() {
            self.active.len()
        } else {
            self.partition_visited().0.len()
        }
    }

    /// Split the visited pixels into those with a valid live vertex and a
    /// count of the rest.
    fn partition_visited(&self) -> (Vec<usize>, usize) {
        let live = self.live;
        let visited: Box<dyn Iterator<Item = usize>> = match &self.restriction {
            Some(indices) => Box::new(indices.iter().copied()),
            None => Box::new(0..live.num_pixels()),
        };

        let mut active = Vec::new();
        let mut skipped = 0;
        for idx in visited {
            if live.valid_vertex(idx).is_some() {
                active.push(idx);
            } else {
                skipped += 1;
            }
        }
        (active, skipped)
    }

    fn reset(&mut self) {
        self.active.clear();
        self.skipped = 0;
        self.linearization_pose = None;
    }
}

impl LeastSquaresObjective for IcpObjective<'_> {
    fn initialize(&mut self, pose: &Isometry3<f64>) {
        let (active, skipped) = self.partition_visited();
        self.active = active;
        self.skipped = skipped;
        self.linearization_pose = Some(*pose);
    }

    /// Evaluate at `pose`. Without a prior `initialize` the visited pixel set
    /// is computed on the fly.
    fn jacobian_products(&self, pose: &Isometry3<f64>) -> Result<NormalEquations> {
        let uncached;
        let (active, skipped) = if self.linearization_pose.is_some() {
            (&self.active, self.skipped)
        } else {
            uncached = self.partition_visited();
            (&uncached.0, uncached.1)
        };

        let (live, model) = (self.live, self.model);
        let (projection, gates) = (&self.projection, &self.gates);

        let mut eq = self.backend.fold_reduce(
            active.len(),
            NormalEquations::zeros,
            |mut acc, k| {
                acc.record(&evaluate_pixel(
                    live, model, projection, pose, gates, active[k],
                ));
                acc
            },
            |a, b| a + b,
        );
        eq.invalid += skipped;
        Ok(eq)
    }
}

fn check_frames(projection: &SphericalProjection, live: &Frame, model: &Frame) -> Result<()> {
    for (name, frame) in [("live", live), ("model", model)] {
        if frame.width() != projection.width() || frame.height() != projection.height() {
            return Err(RegistrationError::mismatch(format!(
                "{name} frame is {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                projection.width(),
                projection.height()
            )));
        }
        if !frame.is_valid() {
            return Err(RegistrationError::mismatch(format!(
                "{name} frame has not been rasterized"
            )));
        }
    }
    Ok(())
}
