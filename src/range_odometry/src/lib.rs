//! Scan-to-scan LiDAR odometry on top of `range_icp`.
//!
//! - [`odometry`]: per-scan rasterization and coarse-to-fine registration
//! - [`pose_graph`]: odometry edges handed to a pluggable graph backend
//! - [`covariance`]: edge information from the registration's `JᵀJ`
//! - [`evaluation`]: KITTI odometry drift metrics
//! - [`params`]: JSON parameter record

pub mod covariance;
pub mod evaluation;
pub mod odometry;
pub mod params;
pub mod pose_graph;

pub use covariance::{estimate_information, InformationEstimate, InformationSource};
pub use evaluation::{average_errors, sequence_errors, trajectory_distances, ErrorSummary, SegmentError};
pub use odometry::{ScanOdometry, ScanResult};
pub use params::OdometryParams;
pub use pose_graph::{DeadReckoningBackend, PoseGraph, PoseGraphBackend, RelativePoseEdge};
