//! Scan-to-scan odometry driver.
//!
//! Every incoming scan is rasterized and registered against the previous one:
//! 1. Seed with the last relative motion (constant velocity)
//! 2. Register coarse-to-fine over growing pyramid prefixes of the live image
//! 3. Chain the relative pose onto the trajectory and the pose graph

use anyhow::{Context, Result};
use nalgebra::Isometry3;
use range_icp::{
    image_pixels, make_pyramid, Frame, IcpObjective, ManifoldSolver, PixelCoord, Point,
    PyramidLevel, RangeImageRasterizer, SolverResult, TerminationState,
};
use tracing::{debug, info, warn};

use crate::covariance::{estimate_information, InformationEstimate};
use crate::params::OdometryParams;
use crate::pose_graph::PoseGraph;

/// Outcome of registering one scan
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Scan index (0 for the first scan)
    pub index: usize,
    /// Pose of this scan in the frame of the first scan
    pub pose: Isometry3<f64>,
    /// Motion since the previous scan (previous → current)
    pub relative_pose: Isometry3<f64>,
    /// Termination of the finest level; `None` for the first scan
    pub state: Option<TerminationState>,
    /// Gauss-Newton iterations summed over all levels
    pub iterations: usize,
    /// Inlier ratio of the final linearization
    pub inlier_ratio: f64,
    /// Information of the odometry edge
    pub information: Option<InformationEstimate>,
}

/// Incremental LiDAR odometry over consecutive scans
pub struct ScanOdometry {
    params: OdometryParams,
    rasterizer: RangeImageRasterizer,
    solver: ManifoldSolver,
    /// Live pixels in pyramid order
    pixels: Vec<PixelCoord>,
    levels: Vec<PyramidLevel>,
    previous: Option<Frame>,
    velocity: Isometry3<f64>,
    trajectory: Vec<Isometry3<f64>>,
    graph: PoseGraph,
}

impl ScanOdometry {
    pub fn new(params: OdometryParams) -> Result<Self> {
        params.validate()?;
        let rasterizer = RangeImageRasterizer::new(params.rasterizer.clone())
            .context("failed to create rasterizer")?;
        let solver = ManifoldSolver::new(params.solver.clone()).context("failed to create solver")?;

        let projection = rasterizer.projection();
        let (width, height) = (projection.width(), projection.height());
        let mut pixels = image_pixels(width, height);
        let levels = make_pyramid(params.pyramid_levels, width, height, &mut pixels)
            .context("failed to build pixel pyramid")?;

        Ok(Self {
            params,
            rasterizer,
            solver,
            pixels,
            levels,
            previous: None,
            velocity: Isometry3::identity(),
            trajectory: Vec::new(),
            graph: PoseGraph::new(),
        })
    }

    pub fn params(&self) -> &OdometryParams {
        &self.params
    }

    pub fn rasterizer(&self) -> &RangeImageRasterizer {
        &self.rasterizer
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    /// Poses of all processed scans
    pub fn trajectory(&self) -> &[Isometry3<f64>] {
        &self.trajectory
    }

    /// Odometry chain as a pose graph
    pub fn graph(&self) -> &PoseGraph {
        &self.graph
    }

    /// Forget all scans and start a new trajectory
    pub fn reset(&mut self) {
        self.previous = None;
        self.velocity = Isometry3::identity();
        self.trajectory.clear();
        self.graph = PoseGraph::new();
    }

    /// Rasterize `points` and register them against the previous scan
    pub fn process(&mut self, points: &[Point]) -> Result<ScanResult> {
        let index = self.trajectory.len();
        let projection = self.rasterizer.projection();
        let mut live = Frame::new(projection.width(), projection.height());
        self.rasterizer
            .process(points, &mut live)
            .with_context(|| format!("failed to rasterize scan {index}"))?;

        let Some(model) = self.previous.as_ref() else {
            let pose = Isometry3::identity();
            self.trajectory.push(pose);
            self.graph.insert_node(index, pose);
            self.previous = Some(live);
            info!(index, points = points.len(), "first scan");
            return Ok(ScanResult {
                index,
                pose,
                relative_pose: Isometry3::identity(),
                state: None,
                iterations: 0,
                inlier_ratio: 0.0,
                information: None,
            });
        };

        let (result, iterations) = self
            .register(&live, model, self.velocity)
            .with_context(|| format!("failed to register scan {index}"))?;

        // A failed run returns its starting pose: the coarser estimate or the guess.
        let relative_pose = result.pose;
        if !result.state.is_usable() {
            warn!(index, "registration failed, keeping the last estimate");
        }
        let information = estimate_information(&result, self.params.information_scale);

        let pose = self.trajectory.last().copied().unwrap_or_else(Isometry3::identity) * relative_pose;
        self.trajectory.push(pose);
        self.graph.push_odometry(relative_pose, information.information);
        if result.state.is_usable() {
            self.velocity = relative_pose;
        }
        self.previous = Some(live);

        let t = pose.translation.vector;
        info!(
            index,
            state = result.state.label(),
            iterations,
            inlier_ratio = result.equations.inlier_ratio(),
            x = t.x,
            y = t.y,
            z = t.z,
            "scan registered"
        );

        Ok(ScanResult {
            index,
            pose,
            relative_pose,
            inlier_ratio: result.equations.inlier_ratio(),
            state: Some(result.state),
            iterations,
            information: Some(information),
        })
    }

    /// Coarse-to-fine registration of `live` against `model`.
    ///
    /// A level that fails keeps the previous estimate for the next one.
    fn register(
        &self,
        live: &Frame,
        model: &Frame,
        guess: Isometry3<f64>,
    ) -> Result<(SolverResult, usize)> {
        let mut objective = IcpObjective::new(
            self.params.icp.clone(),
            *self.rasterizer.projection(),
            live,
            model,
        )?
        .with_backend(self.rasterizer.backend().clone());

        let mut estimate = guess;
        let mut iterations = 0;
        let mut last = None;

        for (l, level) in self.levels.iter().enumerate() {
            objective.restrict_to(&self.pixels[..level.num_pixels()])?;
            let result = self.solver.minimize(&mut objective, estimate)?;
            iterations += result.iterations;

            debug!(
                level = l,
                width = level.width,
                state = result.state.label(),
                iterations = result.iterations,
                cost = result.equations.cost,
                "pyramid level done"
            );
            if result.state.is_usable() {
                estimate = result.pose;
            }
            last = Some(result);
        }

        let result = last.context("pixel pyramid has no levels")?;
        Ok((result, iterations))
    }
}
