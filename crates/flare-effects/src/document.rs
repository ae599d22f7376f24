//! Effect document persistence.
//!
//! Groups and emitters are stored as camelCase JSON:
//!
//! ```json
//! { "version": 1, "groups": [ { "groupName": "fire", "isActive": true,
//!   "isPlaying": false, "currentTime": 0.0, "systemDuration": 0.0,
//!   "translate": [0, 0, 0], "emitters": [ { "name": "core",
//!   "shape": "Sphere", "isActive": true, "textureFilePath": "",
//!   "sphereParams": { ... }, "particleParams": { ... }, "trail": { ... } } ] } ] }
//! ```
//!
//! Loading is lenient: absent fields take their defaults, a malformed
//! parameter block falls back to the defaults of its kind, and a malformed
//! emitter or group is skipped with a warning instead of failing the load.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flare_common::{DocumentError, DocumentResult, SchemaVersion};
use glam::{Quat, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::shape::{MeshEmitMode, ShapeConfig, ShapeKind, ShapeParams};
use crate::spawn::SpawnParameters;
use crate::trail::TrailConfig;

/// Version stamped into saved documents.
pub const DOCUMENT_VERSION: u32 = SchemaVersion::EFFECT_DOCUMENT.major as u32;

/// Root of an effect document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectDocument {
    /// Schema version
    pub version: u32,
    /// Emitter groups
    #[serde(deserialize_with = "lenient_list")]
    pub groups: Vec<GroupDocument>,
}

impl Default for EffectDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            groups: Vec::new(),
        }
    }
}

/// One emitter group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupDocument {
    /// Group name
    pub group_name: String,
    /// Group takes part in updates
    pub is_active: bool,
    /// Group is playing
    pub is_playing: bool,
    /// Seconds since play
    pub current_time: f32,
    /// Auto-stop duration (0 = never)
    pub system_duration: f32,
    /// Group origin offset
    pub translate: Vec3,
    /// Emitters, in name order
    #[serde(deserialize_with = "lenient_list")]
    pub emitters: Vec<EmitterDocument>,
}

impl Default for GroupDocument {
    fn default() -> Self {
        Self {
            group_name: String::new(),
            is_active: true,
            is_playing: false,
            current_time: 0.0,
            system_duration: 0.0,
            translate: Vec3::ZERO,
            emitters: Vec::new(),
        }
    }
}

/// One emitter. Only the block of the active shape is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmitterDocument {
    /// Emitter name
    pub name: String,
    /// Shape kind name
    pub shape: String,
    /// Emitter takes part in updates
    pub is_active: bool,
    /// Texture path
    pub texture_file_path: String,
    /// Sphere parameters
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub sphere_params: Option<SphereParams>,
    /// Box parameters
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub box_params: Option<BoxParams>,
    /// Triangle parameters
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub triangle_params: Option<TriangleParams>,
    /// Cone parameters
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub cone_params: Option<ConeParams>,
    /// Mesh parameters
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub mesh_params: Option<MeshParams>,
    /// Spawn parameters
    #[serde(deserialize_with = "lenient")]
    pub particle_params: SpawnParameters,
    /// Trail settings
    #[serde(deserialize_with = "lenient")]
    pub trail: TrailConfig,
}

impl Default for EmitterDocument {
    fn default() -> Self {
        Self {
            name: String::new(),
            shape: ShapeKind::Sphere.to_string(),
            is_active: true,
            texture_file_path: String::new(),
            sphere_params: None,
            box_params: None,
            triangle_params: None,
            cone_params: None,
            mesh_params: None,
            particle_params: SpawnParameters::default(),
            trail: TrailConfig::default(),
        }
    }
}

/// Sphere block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SphereParams {
    /// Offset from the group origin
    pub translate: Vec3,
    /// Radius
    pub radius: f32,
    /// Particles per emission
    pub count: u32,
    /// Seconds between emissions
    pub interval: f32,
}

impl Default for SphereParams {
    fn default() -> Self {
        Self {
            translate: Vec3::ZERO,
            radius: 1.0,
            count: 1,
            interval: 1.0,
        }
    }
}

/// Box block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BoxParams {
    /// Offset from the group origin
    pub translate: Vec3,
    /// Extent per axis
    pub size: Vec3,
    /// Particles per emission
    pub count: u32,
    /// Seconds between emissions
    pub interval: f32,
}

impl Default for BoxParams {
    fn default() -> Self {
        Self {
            translate: Vec3::ZERO,
            size: Vec3::ONE,
            count: 1,
            interval: 1.0,
        }
    }
}

/// Triangle block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriangleParams {
    /// First vertex
    pub v1: Vec3,
    /// Second vertex
    pub v2: Vec3,
    /// Third vertex
    pub v3: Vec3,
    /// Offset from the group origin
    pub translate: Vec3,
    /// Particles per emission
    pub count: u32,
    /// Seconds between emissions
    pub interval: f32,
}

impl Default for TriangleParams {
    fn default() -> Self {
        Self {
            v1: Vec3::ZERO,
            v2: Vec3::X,
            v3: Vec3::Y,
            translate: Vec3::ZERO,
            count: 1,
            interval: 1.0,
        }
    }
}

/// Cone block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConeParams {
    /// Offset from the group origin
    pub translate: Vec3,
    /// Axis
    pub direction: Vec3,
    /// Base radius
    pub radius: f32,
    /// Height
    pub height: f32,
    /// Particles per emission
    pub count: u32,
    /// Seconds between emissions
    pub interval: f32,
}

impl Default for ConeParams {
    fn default() -> Self {
        Self {
            translate: Vec3::ZERO,
            direction: Vec3::Y,
            radius: 1.0,
            height: 1.0,
            count: 1,
            interval: 1.0,
        }
    }
}

/// Mesh block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeshParams {
    /// Offset from the group origin
    pub translate: Vec3,
    /// Scale per axis
    pub scale: Vec3,
    /// Rotation as `[x, y, z, w]`
    pub rotation: Quat,
    /// Particles per emission
    pub count: u32,
    /// Seconds between emissions
    pub interval: f32,
    /// Sampling mode
    pub emit_mode: MeshEmitMode,
    /// Source model reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            translate: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            count: 1,
            interval: 1.0,
            emit_mode: MeshEmitMode::Surface,
            model_path: None,
        }
    }
}

impl EmitterDocument {
    /// Returns the shape kind, falling back to sphere for unknown names.
    #[must_use]
    pub fn shape_kind(&self) -> ShapeKind {
        ShapeKind::from_name(&self.shape).unwrap_or_else(|| {
            warn!(
                "Emitter '{}' has unknown shape '{}', using Sphere",
                self.name, self.shape
            );
            ShapeKind::Sphere
        })
    }

    /// Builds the shape configuration from the active kind's block.
    ///
    /// A missing block yields that kind's defaults.
    #[must_use]
    pub fn shape_config(&self) -> ShapeConfig {
        match self.shape_kind() {
            ShapeKind::Sphere => {
                let p = self.sphere_params.clone().unwrap_or_default();
                ShapeConfig {
                    translate: p.translate,
                    params: ShapeParams::Sphere { radius: p.radius },
                    count: p.count,
                    interval: p.interval,
                }
            },
            ShapeKind::Box => {
                let p = self.box_params.clone().unwrap_or_default();
                ShapeConfig {
                    translate: p.translate,
                    params: ShapeParams::Box { size: p.size },
                    count: p.count,
                    interval: p.interval,
                }
            },
            ShapeKind::Triangle => {
                let p = self.triangle_params.clone().unwrap_or_default();
                ShapeConfig {
                    translate: p.translate,
                    params: ShapeParams::Triangle {
                        v1: p.v1,
                        v2: p.v2,
                        v3: p.v3,
                    },
                    count: p.count,
                    interval: p.interval,
                }
            },
            ShapeKind::Cone => {
                let p = self.cone_params.clone().unwrap_or_default();
                ShapeConfig {
                    translate: p.translate,
                    params: ShapeParams::Cone {
                        direction: p.direction,
                        radius: p.radius,
                        height: p.height,
                    },
                    count: p.count,
                    interval: p.interval,
                }
            },
            ShapeKind::Mesh => {
                let p = self.mesh_params.clone().unwrap_or_default();
                ShapeConfig {
                    translate: p.translate,
                    params: ShapeParams::Mesh {
                        scale: p.scale,
                        rotation: p.rotation,
                        mode: p.emit_mode,
                    },
                    count: p.count,
                    interval: p.interval,
                }
            },
        }
    }

    /// Stores `config` in the block of its kind and clears the others.
    pub fn set_shape_config(&mut self, config: &ShapeConfig, model_path: Option<&str>) {
        self.shape = config.params.kind().to_string();
        self.sphere_params = None;
        self.box_params = None;
        self.triangle_params = None;
        self.cone_params = None;
        self.mesh_params = None;

        let (translate, count, interval) = (config.translate, config.count, config.interval);
        match config.params {
            ShapeParams::Sphere { radius } => {
                self.sphere_params = Some(SphereParams {
                    translate,
                    radius,
                    count,
                    interval,
                });
            },
            ShapeParams::Box { size } => {
                self.box_params = Some(BoxParams {
                    translate,
                    size,
                    count,
                    interval,
                });
            },
            ShapeParams::Triangle { v1, v2, v3 } => {
                self.triangle_params = Some(TriangleParams {
                    v1,
                    v2,
                    v3,
                    translate,
                    count,
                    interval,
                });
            },
            ShapeParams::Cone {
                direction,
                radius,
                height,
            } => {
                self.cone_params = Some(ConeParams {
                    translate,
                    direction,
                    radius,
                    height,
                    count,
                    interval,
                });
            },
            ShapeParams::Mesh {
                scale,
                rotation,
                mode,
            } => {
                self.mesh_params = Some(MeshParams {
                    translate,
                    scale,
                    rotation,
                    count,
                    interval,
                    emit_mode: mode,
                    model_path: model_path.map(str::to_string),
                });
            },
        }
    }

    /// Model reference of a mesh emitter.
    #[must_use]
    pub fn model_path(&self) -> Option<&str> {
        self.mesh_params.as_ref().and_then(|p| p.model_path.as_deref())
    }
}

impl EffectDocument {
    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> DocumentResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DocumentError::Serialize(e.to_string()))
    }

    /// Parses JSON and checks the version.
    pub fn from_json(text: &str) -> DocumentResult<Self> {
        let document: Self =
            serde_json::from_str(text).map_err(|e| DocumentError::Parse(e.to_string()))?;
        if !SchemaVersion::EFFECT_DOCUMENT.can_read_major(document.version) {
            return Err(DocumentError::UnsupportedVersion {
                expected: DOCUMENT_VERSION,
                found: document.version,
            });
        }
        Ok(document)
    }

    /// Writes the document to `path`.
    ///
    /// Uses atomic write (write to temp, then rename).
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> DocumentResult<()> {
        let path = path.as_ref();
        let json = self.to_json()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = temp_path(path);
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)?;
        info!("Saved effect document to {}", path.display());
        Ok(())
    }

    /// Reads and parses the document at `path`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> DocumentResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let document = Self::from_json(&text)?;
        info!(
            "Loaded effect document from {} ({} groups)",
            path.display(),
            document.groups.len()
        );
        Ok(document)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Deserializes a value, falling back to its default when malformed.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|e| {
        warn!("Malformed parameter block, using defaults: {e}");
        T::default()
    }))
}

/// Deserializes a list, skipping malformed entries.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Null => return Ok(Vec::new()),
        other => {
            warn!("Expected a list, found {other}; ignoring");
            return Ok(Vec::new());
        },
    };

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping malformed entry {index}: {e}");
                None
            },
        })
        .collect())
}
