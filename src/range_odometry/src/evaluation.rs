//! KITTI odometry benchmark metrics.
//!
//! Drift is measured over segments of 100 m to 800 m of ground-truth travel,
//! starting every 10th frame. Errors are normalized by segment length
//! (translation in m/m, rotation in rad/m).

use anyhow::{ensure, Result};
use nalgebra::Isometry3;

/// Segment lengths in meters
pub const SEGMENT_LENGTHS: [f64; 8] = [100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0];

/// Frames between segment start positions (1 s at 10 Hz)
pub const STEP_SIZE: usize = 10;

/// Sensor rate assumed for the speed column (Hz)
const FRAME_RATE: f64 = 10.0;

/// Drift over one segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentError {
    pub first_frame: usize,
    /// Rotation error divided by segment length (rad/m)
    pub rotation_error: f64,
    /// Translation error divided by segment length (m/m)
    pub translation_error: f64,
    /// Segment length (m)
    pub length: f64,
    /// Average speed over the segment (m/s)
    pub speed: f64,
}

/// Mean errors over a set of segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSummary {
    pub translation_error: f64,
    pub rotation_error: f64,
    pub segments: usize,
}

/// Cumulative traveled distance at every pose
pub fn trajectory_distances(poses: &[Isometry3<f64>]) -> Vec<f64> {
    let mut dist = Vec::with_capacity(poses.len());
    let mut total = 0.0;
    for (i, pose) in poses.iter().enumerate() {
        if i > 0 {
            total += (pose.translation.vector - poses[i - 1].translation.vector).norm();
        }
        dist.push(total);
    }
    dist
}

/// First frame whose distance exceeds `dist[first_frame] + length`
pub fn last_frame_from_segment_length(dist: &[f64], first_frame: usize, length: f64) -> Option<usize> {
    let start = *dist.get(first_frame)?;
    (first_frame..dist.len()).find(|&i| dist[i] > start + length)
}

/// Angle of the rotation part of `error`
pub fn rotation_error(error: &Isometry3<f64>) -> f64 {
    let r = error.rotation.to_rotation_matrix();
    let m = r.matrix();
    let d = 0.5 * (m[(0, 0)] + m[(1, 1)] + m[(2, 2)] - 1.0);
    d.clamp(-1.0, 1.0).acos()
}

/// Length of the translation part of `error`
pub fn translation_error(error: &Isometry3<f64>) -> f64 {
    error.translation.vector.norm()
}

/// Segment errors of `result` against ground truth `gt`.
///
/// Distances are measured on the ground truth. Both trajectories must have
/// the same number of poses.
pub fn sequence_errors(gt: &[Isometry3<f64>], result: &[Isometry3<f64>]) -> Result<Vec<SegmentError>> {
    ensure!(
        gt.len() == result.len(),
        "trajectory length mismatch: {} ground-truth poses, {} result poses",
        gt.len(),
        result.len()
    );

    let dist = trajectory_distances(gt);
    let mut errors = Vec::new();

    for first_frame in (0..gt.len()).step_by(STEP_SIZE) {
        for &length in &SEGMENT_LENGTHS {
            let Some(last_frame) = last_frame_from_segment_length(&dist, first_frame, length) else {
                continue;
            };

            let delta_gt = gt[first_frame].inverse() * gt[last_frame];
            let delta_result = result[first_frame].inverse() * result[last_frame];
            let error = delta_result.inverse() * delta_gt;

            let num_frames = (last_frame - first_frame + 1) as f64;
            errors.push(SegmentError {
                first_frame,
                rotation_error: rotation_error(&error) / length,
                translation_error: translation_error(&error) / length,
                length,
                speed: length / (num_frames / FRAME_RATE),
            });
        }
    }

    Ok(errors)
}

/// Mean translation and rotation error; `None` for an empty set
pub fn average_errors(errors: &[SegmentError]) -> Option<ErrorSummary> {
    if errors.is_empty() {
        return None;
    }
    let n = errors.len() as f64;
    Some(ErrorSummary {
        translation_error: errors.iter().map(|e| e.translation_error).sum::<f64>() / n,
        rotation_error: errors.iter().map(|e| e.rotation_error).sum::<f64>() / n,
        segments: errors.len(),
    })
}

/// Mean errors per segment length, in [`SEGMENT_LENGTHS`] order
pub fn average_errors_by_length(errors: &[SegmentError]) -> Vec<(f64, ErrorSummary)> {
    SEGMENT_LENGTHS
        .iter()
        .filter_map(|&length| {
            let subset: Vec<_> = errors.iter().filter(|e| e.length == length).copied().collect();
            average_errors(&subset).map(|summary| (length, summary))
        })
        .collect()
}
