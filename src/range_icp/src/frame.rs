//! Rasterized scan: vertex map, normal map and the source points.

use nalgebra::Vector3;

use crate::projection::PixelCoord;

/// A LiDAR return `[x, y, z, extra]`; `extra` is intensity or 1.0.
pub type Point = [f32; 4];

/// Per-pixel entry of a vertex or normal map. `w == 1.0` marks a valid pixel.
pub type MapEntry = [f32; 4];

/// Invalid map entry.
pub const INVALID: MapEntry = [0.0; 4];

/// Fixed-size range-image frame.
///
/// Maps are row-major (`index = row * width + col`), row 0 being the top of
/// the vertical field of view. Only the rasterizer writes the maps; a frame is
/// marked valid once a rasterization completed successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    vertex_map: Vec<MapEntry>,
    normal_map: Vec<MapEntry>,
    points: Vec<Point>,
    valid: bool,
}

impl Frame {
    /// Create an empty (invalid) frame of the given resolution.
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            vertex_map: vec![INVALID; n],
            normal_map: vec![INVALID; n],
            points: Vec::new(),
            valid: false,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_pixels(&self) -> usize {
        self.vertex_map.len()
    }

    /// Whether the maps hold the result of a successful rasterization.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn vertex_map(&self) -> &[MapEntry] {
        &self.vertex_map
    }

    pub fn normal_map(&self) -> &[MapEntry] {
        &self.normal_map
    }

    /// Copy of the points the maps were generated from.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    #[inline]
    fn index(&self, pixel: PixelCoord) -> usize {
        pixel.y as usize * self.width as usize + pixel.x as usize
    }

    /// Raw vertex map entry of a pixel.
    pub fn vertex(&self, pixel: PixelCoord) -> MapEntry {
        self.vertex_map[self.index(pixel)]
    }

    /// Raw normal map entry of a pixel.
    pub fn normal(&self, pixel: PixelCoord) -> MapEntry {
        self.normal_map[self.index(pixel)]
    }

    /// Vertex at a linear index, `None` if the pixel is invalid.
    #[inline]
    pub fn valid_vertex(&self, index: usize) -> Option<Vector3<f64>> {
        to_valid_vector(&self.vertex_map[index])
    }

    /// Normal at a linear index, `None` if the pixel has no valid normal.
    #[inline]
    pub fn valid_normal(&self, index: usize) -> Option<Vector3<f64>> {
        to_valid_vector(&self.normal_map[index])
    }

    /// Number of pixels with a valid vertex.
    pub fn num_valid_vertices(&self) -> usize {
        self.vertex_map.iter().filter(|v| is_valid(v)).count()
    }

    /// Install the result of a rasterization.
    pub(crate) fn commit(
        &mut self,
        vertex_map: Vec<MapEntry>,
        normal_map: Vec<MapEntry>,
        points: &[Point],
    ) {
        debug_assert_eq!(vertex_map.len(), self.num_pixels());
        debug_assert_eq!(normal_map.len(), self.num_pixels());

        self.vertex_map = vertex_map;
        self.normal_map = normal_map;
        self.points.clear();
        self.points.extend_from_slice(points);
        self.valid = true;
    }
}

#[inline]
pub(crate) fn is_valid(entry: &MapEntry) -> bool {
    entry[3] == 1.0
}

#[inline]
pub(crate) fn to_valid_vector(entry: &MapEntry) -> Option<Vector3<f64>> {
    is_valid(entry).then(|| Vector3::new(entry[0] as f64, entry[1] as f64, entry[2] as f64))
}
