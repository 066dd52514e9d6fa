//! Range-image LiDAR registration.
//!
//! Point clouds from a spinning LiDAR are rasterized into spherical range
//! images (vertex + normal maps) and aligned with projective point-to-plane
//! ICP, solved by Gauss-Newton on the SE3 manifold.
//!
//! # Architecture
//!
//! - [`rasterizer`]: point cloud → [`Frame`] (z-buffer or averaging, optional
//!   bilateral filter, normal estimation)
//! - [`objective`]: per-pixel residuals and Jacobians reduced into
//!   [`NormalEquations`]
//! - [`optimization`]: Gauss-Newton loop with SE3 retraction
//! - [`pyramid`]: column-subsampled pixel orderings for coarse-to-fine runs
//!
//! # Usage
//!
//! ```ignore
//! use range_icp::{Frame, IcpConfig, IcpObjective, ManifoldSolver, RangeImageRasterizer};
//! use nalgebra::Isometry3;
//!
//! let rasterizer = RangeImageRasterizer::new(RasterizerConfig::default())?;
//! let mut live = Frame::new(720, 64);
//! let mut model = Frame::new(720, 64);
//! rasterizer.process(&scan_t1, &mut live)?;
//! rasterizer.process(&scan_t0, &mut model)?;
//!
//! let mut objective =
//!     IcpObjective::new(IcpConfig::default(), *rasterizer.projection(), &live, &model)?;
//! let result = ManifoldSolver::new(SolverConfig::default())?
//!     .minimize(&mut objective, Isometry3::identity())?;
//! println!("{:?} after {} iterations", result.state, result.iterations);
//! ```

pub mod error;
pub mod frame;
pub mod objective;
pub mod optimization;
pub mod projection;
pub mod pyramid;
pub mod rasterizer;
pub mod se3;
pub mod test_utils;

pub use error::{RegistrationError, Result};
pub use frame::{Frame, MapEntry, Point};
pub use objective::{IcpConfig, IcpObjective, NormalEquations};
pub use optimization::{
    LeastSquaresObjective, ManifoldSolver, SolverConfig, SolverDebug, SolverResult,
    TerminationState,
};
pub use projection::{PixelCoord, SphericalProjection};
pub use pyramid::{image_pixels, make_pyramid, PyramidLevel};
pub use rasterizer::{ComputeBackend, RangeImageRasterizer, RasterizerConfig};
pub use se3::Twist;
