//! CPU passes of the rasterization pipeline.
//!
//! 1. project every point to its pixel (parallel map)
//! 2. scatter into the vertex map, z-buffered or averaged (sequential)
//! 3. optional bilateral filter of the vertex map (parallel map)
//! 4. normal estimation from neighboring vertices (parallel map)

use nalgebra::Vector3;

use super::backend::ComputeBackend;
use crate::frame::{to_valid_vector, MapEntry, Point, INVALID};
use crate::projection::{Projection, SphericalProjection};

/// Squared norm below which a cross product is treated as degenerate.
const DEGENERATE_NORMAL_SQ: f64 = 1e-20;

/// Largest bilateral window radius in pixels.
const MAX_BILATERAL_RADIUS: i64 = 8;

#[inline]
fn point_vector(p: &Point) -> Vector3<f64> {
    Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

#[inline]
fn entry(v: &Vector3<f64>) -> MapEntry {
    [v.x as f32, v.y as f32, v.z as f32, 1.0]
}

/// Project every point. `None` marks points that fall outside the image or
/// the depth interval.
pub fn project_points(
    backend: &ComputeBackend,
    projection: &SphericalProjection,
    points: &[Point],
) -> Vec<Option<Projection>> {
    backend.map_indexed(points.len(), |i| projection.project(&point_vector(&points[i])))
}

/// Z-buffered vertex map: the nearest point wins each pixel, ties resolved in
/// favor of the lower point index.
pub fn zbuffer_vertex_map(
    projection: &SphericalProjection,
    points: &[Point],
    projections: &[Option<Projection>],
) -> Vec<MapEntry> {
    let mut nearest: Vec<Option<(f64, usize)>> = vec![None; projection.num_pixels()];

    for (i, p) in projections.iter().enumerate() {
        let Some(p) = p else { continue };
        let slot = &mut nearest[projection.index(p.pixel)];
        // Points are visited in index order, so a strict comparison keeps the
        // lower index on equal range.
        match slot {
            Some((range, _)) if *range <= p.range => {}
            _ => *slot = Some((p.range, i)),
        }
    }

    nearest
        .into_iter()
        .map(|slot| match slot {
            Some((_, i)) => {
                let p = &points[i];
                [p[0], p[1], p[2], 1.0]
            }
            None => INVALID,
        })
        .collect()
}

/// Averaged vertex map: every point landing in a pixel contributes to the
/// pixel's mean position.
pub fn averaged_vertex_map(
    backend: &ComputeBackend,
    projection: &SphericalProjection,
    points: &[Point],
    projections: &[Option<Projection>],
) -> Vec<MapEntry> {
    let n = projection.num_pixels();
    let mut sums = vec![Vector3::<f64>::zeros(); n];
    let mut counts = vec![0u32; n];

    for (i, p) in projections.iter().enumerate() {
        let Some(p) = p else { continue };
        let idx = projection.index(p.pixel);
        sums[idx] += point_vector(&points[i]);
        counts[idx] += 1;
    }

    // Barrier: all sums are complete before any pixel is normalized.
    backend.map_indexed(n, |idx| match counts[idx] {
        0 => INVALID,
        c => entry(&(sums[idx] / c as f64)),
    })
}

/// Edge-preserving smoothing of the vertex map.
///
/// Each valid pixel's range is replaced by the weighted mean range of its
/// valid neighbors, weighted by a spatial Gaussian (`sigma_space`, pixels) and
/// a range Gaussian (`sigma_range`, meters). The vertex is moved along its
/// own viewing ray, so it stays in its pixel. The window wraps horizontally
/// and is clipped vertically.
pub fn bilateral_filter(
    backend: &ComputeBackend,
    width: u32,
    height: u32,
    vertex_map: &[MapEntry],
    sigma_space: f32,
    sigma_range: f32,
) -> Vec<MapEntry> {
    let w = width as i64;
    let h = height as i64;
    let sigma_space = sigma_space as f64;
    let sigma_range = sigma_range as f64;
    let radius = ((2.0 * sigma_space).ceil() as i64).clamp(1, MAX_BILATERAL_RADIUS);
    let inv_space = 1.0 / (2.0 * sigma_space * sigma_space);
    let inv_range = 1.0 / (2.0 * sigma_range * sigma_range);

    backend.map_indexed(vertex_map.len(), |idx| {
        let Some(center) = to_valid_vector(&vertex_map[idx]) else {
            return INVALID;
        };
        let center_range = center.norm();
        let x = idx as i64 % w;
        let y = idx as i64 / w;

        let mut weight_sum = 0.0;
        let mut range_sum = 0.0;
        for dy in -radius..=radius {
            let ny = y + dy;
            if ny < 0 || ny >= h {
                continue;
            }
            for dx in -radius..=radius {
                let nx = (x + dx).rem_euclid(w);
                let Some(neighbor) = to_valid_vector(&vertex_map[(ny * w + nx) as usize]) else {
                    continue;
                };
                let r = neighbor.norm();
                let dr = r - center_range;
                let spatial = ((dx * dx + dy * dy) as f64) * inv_space;
                let weight = (-(spatial + dr * dr * inv_range)).exp();
                weight_sum += weight;
                range_sum += weight * r;
            }
        }

        // The center pixel always contributes with weight 1.
        let filtered_range = range_sum / weight_sum;
        entry(&(center * (filtered_range / center_range)))
    })
}

/// Normal map from a vertex map.
///
/// `n = normalize(Δright × Δup)`. The horizontal neighbor wraps around; a
/// missing right (up) neighbor is replaced by the left (down) neighbor as a
/// backward difference. Normals point towards the sensor origin.
pub fn normal_map(
    backend: &ComputeBackend,
    width: u32,
    height: u32,
    vertex_map: &[MapEntry],
) -> Vec<MapEntry> {
    let w = width as usize;
    let h = height as usize;

    let vertex_at = |x: usize, y: usize| to_valid_vector(&vertex_map[y * w + x]);

    backend.map_indexed(vertex_map.len(), |idx| {
        let x = idx % w;
        let y = idx / w;
        let Some(p) = vertex_at(x, y) else {
            return INVALID;
        };

        let right = (x + 1) % w;
        let left = (x + w - 1) % w;
        let horizontal = if right != x {
            vertex_at(right, y)
                .map(|r| r - p)
                .or_else(|| vertex_at(left, y).map(|l| p - l))
        } else {
            None
        };

        // Row 0 is the top of the image, so "up" is the previous row.
        let vertical = if y > 0 {
            vertex_at(x, y - 1).map(|u| u - p)
        } else {
            None
        }
        .or_else(|| {
            if y + 1 < h {
                vertex_at(x, y + 1).map(|d| p - d)
            } else {
                None
            }
        });

        let (Some(dh), Some(dv)) = (horizontal, vertical) else {
            return INVALID;
        };

        let n = dh.cross(&dv);
        let norm_sq = n.norm_squared();
        if !norm_sq.is_finite() || norm_sq < DEGENERATE_NORMAL_SQ {
            return INVALID;
        }
        let mut n = n / norm_sq.sqrt();
        if n.dot(&p) > 0.0 {
            n = -n;
        }
        entry(&n)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::is_valid;
    use crate::projection::PixelCoord;
    use approx::assert_relative_eq;

    fn projection() -> SphericalProjection {
        SphericalProjection::new(36, 8, 10.0, -10.0, 0.5, 100.0).unwrap()
    }

    /// Point on the ray through the center of `(col, row)` at `range`.
    fn point_at(proj: &SphericalProjection, col: u32, row: u32, range: f64) -> Point {
        let d = proj.ray_direction(col as f64 + 0.5, row as f64 + 0.5) * range;
        [d.x as f32, d.y as f32, d.z as f32, 1.0]
    }

    #[test]
    fn test_zbuffer_keeps_nearest() {
        let proj = projection();
        let points = vec![
            point_at(&proj, 3, 2, 10.0),
            point_at(&proj, 3, 2, 5.0),
            point_at(&proj, 3, 2, 7.0),
        ];
        let projections = project_points(&ComputeBackend::Serial, &proj, &points);
        let map = zbuffer_vertex_map(&proj, &points, &projections);

        let idx = proj.index(PixelCoord::new(3, 2));
        assert_eq!(map[idx], [points[1][0], points[1][1], points[1][2], 1.0]);
        assert_eq!(map.iter().filter(|e| is_valid(e)).count(), 1);
    }

    #[test]
    fn test_zbuffer_tie_prefers_lower_index() {
        let proj = projection();
        let mut a = point_at(&proj, 10, 4, 8.0);
        a[3] = 0.25;
        let b = point_at(&proj, 10, 4, 8.0);
        let points = vec![a, b];
        let projections = project_points(&ComputeBackend::Serial, &proj, &points);
        let map = zbuffer_vertex_map(&proj, &points, &projections);

        let idx = proj.index(PixelCoord::new(10, 4));
        assert_eq!(map[idx], [a[0], a[1], a[2], 1.0]);
    }

    #[test]
    fn test_averaging_takes_mean() {
        let proj = projection();
        let a = point_at(&proj, 5, 5, 4.0);
        let b = point_at(&proj, 5, 5, 6.0);
        let points = vec![a, b];
        let backend = ComputeBackend::Serial;
        let projections = project_points(&backend, &proj, &points);
        let map = averaged_vertex_map(&backend, &proj, &points, &projections);

        let v = map[proj.index(PixelCoord::new(5, 5))];
        for k in 0..3 {
            assert_relative_eq!(v[k], 0.5 * (a[k] + b[k]), epsilon = 1e-5);
        }
        assert_eq!(v[3], 1.0);
    }

    #[test]
    fn test_bilateral_flat_range_is_noop() {
        let proj = projection();
        let points: Vec<Point> = (0..36)
            .flat_map(|c| (0..8).map(move |r| (c, r)))
            .map(|(c, r)| point_at(&proj, c, r, 12.0))
            .collect();
        let backend = ComputeBackend::Serial;
        let projections = project_points(&backend, &proj, &points);
        let map = zbuffer_vertex_map(&proj, &points, &projections);
        let filtered = bilateral_filter(&backend, 36, 8, &map, 1.0, 0.5);

        for (a, b) in map.iter().zip(filtered.iter()) {
            for k in 0..4 {
                assert_relative_eq!(a[k], b[k], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_bilateral_preserves_invalid() {
        let mut map = vec![INVALID; 16];
        map[5] = [1.0, 0.0, 0.0, 1.0];
        let filtered = bilateral_filter(&ComputeBackend::Serial, 4, 4, &map, 1.0, 0.1);
        assert_eq!(filtered[0], INVALID);
        assert_eq!(filtered[5], [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_normals_of_wall_face_sensor() {
        // A wall at x = 10 covering the forward columns.
        let w = 8u32;
        let h = 4u32;
        let mut map = vec![INVALID; (w * h) as usize];
        for y in 0..h {
            for x in 0..w {
                // columns increase to the right (-y), rows increase downwards (-z)
                map[(y * w + x) as usize] = [10.0, -(x as f32), -(y as f32), 1.0];
            }
        }
        let normals = normal_map(&ComputeBackend::Serial, w, h, &map);
        let n = normals[(1 * w + 2) as usize];
        assert_eq!(n[3], 1.0);
        assert_relative_eq!(n[0], -1.0, epsilon = 1e-6);
        assert_relative_eq!(n[1], 0.0, epsilon = 1e-6);
        assert_relative_eq!(n[2], 0.0, epsilon = 1e-6);

        // last row: no row below, the row above still gives a forward difference
        let n = normals[((h - 1) * w + 3) as usize];
        assert_relative_eq!(n[0], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_isolated_pixel_has_no_normal() {
        let mut map = vec![INVALID; 16];
        map[5] = [5.0, 0.0, 0.0, 1.0];
        let normals = normal_map(&ComputeBackend::Serial, 4, 4, &map);
        assert!(normals.iter().all(|n| !is_valid(n)));
    }
}
