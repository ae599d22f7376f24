//! Built-in models for mesh emitters.
//!
//! Effect documents reference models by name. The runner ships a couple of
//! procedural primitives under the `builtin:` prefix so documents can be
//! exercised without an asset pipeline.

use flare_effects::{ModelData, ModelResolver, ModelSource};
use glam::Vec3;

/// Unit quad in the XZ plane.
pub const QUAD: &str = "builtin:quad";
/// Unit cube centred on the origin.
pub const CUBE: &str = "builtin:cube";

/// Resolver over the built-in primitive models.
#[derive(Debug, Clone)]
pub struct BuiltinModels {
    models: Vec<ModelData>,
}

impl BuiltinModels {
    /// Creates the resolver with every built-in model.
    pub fn new() -> Self {
        Self {
            models: vec![quad(), cube()],
        }
    }

    /// Returns a built-in model by name.
    pub fn get(&self, name: &str) -> Option<&ModelData> {
        self.models.iter().find(|m| m.name == name)
    }
}

impl Default for BuiltinModels {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelResolver for BuiltinModels {
    fn resolve(&self, name: &str) -> Option<&dyn ModelSource> {
        self.get(name).map(|m| m as &dyn ModelSource)
    }
}

fn quad() -> ModelData {
    ModelData::single(
        QUAD,
        vec![
            Vec3::new(-0.5, 0.0, -0.5),
            Vec3::new(0.5, 0.0, -0.5),
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(-0.5, 0.0, 0.5),
        ],
        vec![0, 2, 1, 0, 3, 2],
    )
}

fn cube() -> ModelData {
    let positions = (0..8)
        .map(|i| {
            Vec3::new(
                if i & 1 == 0 { -0.5 } else { 0.5 },
                if i & 2 == 0 { -0.5 } else { 0.5 },
                if i & 4 == 0 { -0.5 } else { 0.5 },
            )
        })
        .collect();

    // Two triangles per face, wound counter-clockwise seen from outside
    let indices = vec![
        0, 2, 3, 0, 3, 1, // -Z
        4, 5, 7, 4, 7, 6, // +Z
        0, 4, 6, 0, 6, 2, // -X
        1, 3, 7, 1, 7, 5, // +X
        0, 1, 5, 0, 5, 4, // -Y
        2, 6, 7, 2, 7, 3, // +Y
    ];

    ModelData::single(CUBE, positions, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flare_effects::{ExtractorSettings, MeshSurfaceExtractor};

    #[test]
    fn test_resolve_builtin() {
        let models = BuiltinModels::new();
        assert!(models.resolve(QUAD).is_some());
        assert!(models.resolve(CUBE).is_some());
        assert!(models.resolve("builtin:teapot").is_none());
    }

    #[test]
    fn test_cube_faces_point_outward() {
        let models = BuiltinModels::new();
        let cube = models.get(CUBE).expect("cube");
        let positions = cube.positions(0);
        for tri in cube.indices(0).chunks_exact(3) {
            let a = positions[tri[0] as usize];
            let b = positions[tri[1] as usize];
            let c = positions[tri[2] as usize];
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(normal.dot(centroid) > 0.0, "inward face {tri:?}");
        }
    }

    #[test]
    fn test_cube_keeps_only_outer_edges() {
        let models = BuiltinModels::new();
        let extractor = MeshSurfaceExtractor::new(ExtractorSettings::default());
        let extraction = extractor.extract(models.resolve(CUBE));

        assert_eq!(extraction.triangles.len(), 12);
        // Each face diagonal is shared by two coplanar triangles
        assert_eq!(extraction.stats.internal_edges, 6);
        for triangle in &extraction.triangles {
            assert_eq!(triangle.active_edges.count_ones(), 2);
        }
    }
}
