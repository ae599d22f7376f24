//! Mesh surface extraction.
//!
//! Turns a model's triangle lists into the capped triangle array sampled by
//! the mesh shape. Each triangle starts with all three edges marked as
//! boundary; edges shared by exactly two near-coplanar triangles are cleared
//! on both sides so edge-mode emission only follows silhouettes and creases.
//!
//! Edges are matched through a quantized, order-independent key built per
//! half-edge, so the key itself says which local edge of each triangle
//! matched.

use ahash::AHashMap;
use flare_kernel::{GpuMeshTriangle, ALL_EDGES};
use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::{
    EffectsConfig, DEFAULT_COPLANAR_THRESHOLD, DEFAULT_EDGE_EPSILON, DEFAULT_MAX_MESH_TRIANGLES,
};

/// Read-only access to model geometry.
pub trait ModelSource {
    /// Name the model is referenced by, e.g. its asset path.
    fn name(&self) -> &str;

    /// Number of submeshes.
    fn submesh_count(&self) -> usize;

    /// Vertex positions of a submesh.
    fn positions(&self, submesh: usize) -> &[Vec3];

    /// Triangle list indices of a submesh.
    fn indices(&self, submesh: usize) -> &[u32];
}

/// Looks models up by reference name.
pub trait ModelResolver {
    /// Returns the model referenced by `name`, if it is available.
    fn resolve(&self, name: &str) -> Option<&dyn ModelSource>;
}

/// One submesh of a [`ModelData`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submesh {
    /// Vertex positions.
    pub positions: Vec<Vec3>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
}

/// In-memory model geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    /// Reference name.
    pub name: String,
    /// Submeshes.
    pub submeshes: Vec<Submesh>,
}

impl ModelData {
    /// Creates a single-submesh model.
    #[must_use]
    pub fn single(name: impl Into<String>, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: name.into(),
            submeshes: vec![Submesh { positions, indices }],
        }
    }
}

impl ModelSource for ModelData {
    fn name(&self) -> &str {
        &self.name
    }

    fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    fn positions(&self, submesh: usize) -> &[Vec3] {
        self.submeshes
            .get(submesh)
            .map_or(&[], |s| s.positions.as_slice())
    }

    fn indices(&self, submesh: usize) -> &[u32] {
        self.submeshes
            .get(submesh)
            .map_or(&[], |s| s.indices.as_slice())
    }
}

/// One extracted triangle in model space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTriangle {
    /// First vertex.
    pub v0: Vec3,
    /// Second vertex.
    pub v1: Vec3,
    /// Third vertex.
    pub v2: Vec3,
    /// Unit normal (zero for degenerate triangles).
    pub normal: Vec3,
    /// Surface area.
    pub area: f32,
    /// Bit i set: edge i is a boundary edge. Edges are v0-v1, v1-v2, v2-v0.
    pub active_edges: u8,
}

impl MeshTriangle {
    /// Builds a triangle with every edge marked as boundary.
    #[must_use]
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        let cross = (v1 - v0).cross(v2 - v0);
        Self {
            v0,
            v1,
            v2,
            normal: cross.normalize_or_zero(),
            area: 0.5 * cross.length(),
            active_edges: ALL_EDGES as u8,
        }
    }

    /// Returns the endpoints of local edge `edge` (0..3).
    #[must_use]
    pub fn edge(&self, edge: usize) -> (Vec3, Vec3) {
        match edge {
            0 => (self.v0, self.v1),
            1 => (self.v1, self.v2),
            _ => (self.v2, self.v0),
        }
    }

    /// Whether local edge `edge` is a boundary edge.
    #[must_use]
    pub const fn is_boundary(&self, edge: usize) -> bool {
        self.active_edges & (1 << edge) != 0
    }

    /// Converts to the GPU layout with the running area total.
    #[must_use]
    pub fn to_gpu(&self, cumulative_area: f32) -> GpuMeshTriangle {
        GpuMeshTriangle {
            v0: self.v0.to_array(),
            area: self.area,
            v1: self.v1.to_array(),
            edge_mask: u32::from(self.active_edges),
            v2: self.v2.to_array(),
            cumulative_area,
            normal: self.normal.to_array(),
            _padding: 0,
        }
    }
}

/// Converts triangles to their GPU layout, accumulating area for weighted
/// selection.
#[must_use]
pub fn to_gpu_triangles(triangles: &[MeshTriangle]) -> Vec<GpuMeshTriangle> {
    let mut total = 0.0;
    triangles
        .iter()
        .map(|triangle| {
            total += triangle.area;
            triangle.to_gpu(total)
        })
        .collect()
}

/// Extraction summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshExtractionStats {
    /// Triangles kept.
    pub triangles: usize,
    /// Whether the triangle cap cut the model short.
    pub truncated: bool,
    /// Index groups skipped for pointing outside the vertex array.
    pub skipped: usize,
    /// Shared edges cleared on both triangles.
    pub internal_edges: usize,
    /// Edges declared by more than two triangles, left as boundary.
    pub non_manifold_edges: usize,
}

/// Result of [`MeshSurfaceExtractor::extract`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshExtraction {
    /// Extracted triangles.
    pub triangles: Vec<MeshTriangle>,
    /// Summary.
    pub stats: MeshExtractionStats,
}

/// Extraction tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractorSettings {
    /// Maximum triangles kept.
    pub max_triangles: usize,
    /// Normal dot product above which a shared edge is internal.
    pub coplanar_threshold: f32,
    /// Quantization step for edge endpoints.
    pub edge_epsilon: f32,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            max_triangles: DEFAULT_MAX_MESH_TRIANGLES as usize,
            coplanar_threshold: DEFAULT_COPLANAR_THRESHOLD,
            edge_epsilon: DEFAULT_EDGE_EPSILON,
        }
    }
}

impl From<&EffectsConfig> for ExtractorSettings {
    fn from(config: &EffectsConfig) -> Self {
        Self {
            max_triangles: config.max_mesh_triangles as usize,
            coplanar_threshold: config.coplanar_threshold,
            edge_epsilon: config.edge_epsilon,
        }
    }
}

type QuantizedPoint = (i64, i64, i64);
type EdgeKey = (QuantizedPoint, QuantizedPoint);

/// Builds triangle lists with active-edge masks from models.
#[derive(Debug, Clone, Default)]
pub struct MeshSurfaceExtractor {
    settings: ExtractorSettings,
}

impl MeshSurfaceExtractor {
    /// Creates an extractor.
    #[must_use]
    pub const fn new(settings: ExtractorSettings) -> Self {
        Self { settings }
    }

    /// Returns the extractor settings.
    #[must_use]
    pub const fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Extracts triangles from `model`. A missing model yields an empty list.
    pub fn extract(&self, model: Option<&dyn ModelSource>) -> MeshExtraction {
        let Some(model) = model else {
            debug!("No model for mesh extraction");
            return MeshExtraction::default();
        };

        let mut stats = MeshExtractionStats::default();
        let mut triangles = self.collect_triangles(model, &mut stats);
        self.clear_shared_edges(&mut triangles, &mut stats);
        stats.triangles = triangles.len();

        if stats.non_manifold_edges > 0 {
            warn!(
                "Model '{}' has {} non-manifold edges; they stay boundary edges",
                model.name(),
                stats.non_manifold_edges
            );
        }
        info!(
            "Extracted {} triangles from '{}' ({} internal edges{})",
            stats.triangles,
            model.name(),
            stats.internal_edges,
            if stats.truncated { ", truncated" } else { "" }
        );

        MeshExtraction { triangles, stats }
    }

    fn collect_triangles(
        &self,
        model: &dyn ModelSource,
        stats: &mut MeshExtractionStats,
    ) -> Vec<MeshTriangle> {
        let cap = self.settings.max_triangles;
        let mut triangles = Vec::new();

        for submesh in 0..model.submesh_count() {
            let positions = model.positions(submesh);
            for group in model.indices(submesh).chunks_exact(3) {
                if triangles.len() >= cap {
                    stats.truncated = true;
                    return triangles;
                }
                let vertex = |i: u32| positions.get(i as usize).copied();
                match (vertex(group[0]), vertex(group[1]), vertex(group[2])) {
                    (Some(v0), Some(v1), Some(v2)) => {
                        triangles.push(MeshTriangle::new(v0, v1, v2));
                    },
                    _ => stats.skipped += 1,
                }
            }
        }

        triangles
    }

    fn clear_shared_edges(&self, triangles: &mut [MeshTriangle], stats: &mut MeshExtractionStats) {
        let mut edges: AHashMap<EdgeKey, Vec<(usize, usize)>> =
            AHashMap::with_capacity(triangles.len() * 3);

        for (index, triangle) in triangles.iter().enumerate() {
            for edge in 0..3 {
                let (a, b) = triangle.edge(edge);
                edges
                    .entry(self.edge_key(a, b))
                    .or_default()
                    .push((index, edge));
            }
        }

        for half_edges in edges.values() {
            match half_edges.as_slice() {
                [(a, edge_a), (b, edge_b)] => {
                    let dot = triangles[*a].normal.dot(triangles[*b].normal);
                    if dot > self.settings.coplanar_threshold {
                        triangles[*a].active_edges &= !(1 << edge_a);
                        triangles[*b].active_edges &= !(1 << edge_b);
                        stats.internal_edges += 1;
                    }
                },
                list if list.len() > 2 => stats.non_manifold_edges += 1,
                _ => {},
            }
        }
    }

    fn quantize(&self, point: Vec3) -> QuantizedPoint {
        let scaled = point / self.settings.edge_epsilon;
        (
            scaled.x.round() as i64,
            scaled.y.round() as i64,
            scaled.z.round() as i64,
        )
    }

    fn edge_key(&self, a: Vec3, b: Vec3) -> EdgeKey {
        let a = self.quantize(a);
        let b = self.quantize(b);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}
