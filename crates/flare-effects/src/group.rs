//! Emitter groups and the group manager.
//!
//! Groups own named emitters and carry play/stop state, an origin offset and
//! an optional auto-stop duration. Activity and playback are orthogonal:
//! emitters only update while their group is both active and playing.

use std::collections::BTreeMap;
use std::path::Path;

use flare_common::{DocumentResult, EmitterId, EmitterIdAllocator};
use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::EffectsConfig;
use crate::document::{EffectDocument, EmitterDocument, GroupDocument, DOCUMENT_VERSION};
use crate::emitter::Emitter;
use crate::mesh::{ExtractorSettings, MeshSurfaceExtractor, ModelResolver, ModelSource};
use crate::shape::{Placement, ShapeConfig, ShapeKind};
use crate::spawn::SpawnParameters;
use crate::trail::TrailConfig;

/// A named set of emitters with shared playback state.
#[derive(Debug, Clone)]
pub struct EmitterGroup {
    name: String,
    active: bool,
    playing: bool,
    elapsed: f32,
    auto_stop: f32,
    origin: Vec3,
    emitters: BTreeMap<String, Emitter>,
}

impl EmitterGroup {
    /// Creates an active, stopped group.
    #[must_use]
    pub fn new(name: impl Into<String>, auto_stop: f32) -> Self {
        Self {
            name: name.into(),
            active: true,
            playing: false,
            elapsed: 0.0,
            auto_stop,
            origin: Vec3::ZERO,
            emitters: BTreeMap::new(),
        }
    }

    /// Returns the group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the group takes part in updates.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Enables or disables the group.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if !active {
            self.discard_pending();
        }
    }

    /// Whether the group is playing.
    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether emitters of this group update and dispatch this frame.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.active && self.playing
    }

    /// Seconds since the group started playing.
    #[must_use]
    pub const fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Auto-stop duration in seconds (0 = never).
    #[must_use]
    pub const fn auto_stop_duration(&self) -> f32 {
        self.auto_stop
    }

    /// Sets the auto-stop duration.
    pub fn set_auto_stop_duration(&mut self, seconds: f32) {
        self.auto_stop = seconds.max(0.0);
    }

    /// Origin offset added to every emitter's translate.
    #[must_use]
    pub const fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Sets the origin offset.
    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    /// Returns an emitter by name.
    #[must_use]
    pub fn emitter(&self, name: &str) -> Option<&Emitter> {
        self.emitters.get(name)
    }

    /// Returns an emitter by name, mutably.
    pub fn emitter_mut(&mut self, name: &str) -> Option<&mut Emitter> {
        self.emitters.get_mut(name)
    }

    /// Iterates emitters in name order.
    pub fn emitters(&self) -> impl Iterator<Item = &Emitter> {
        self.emitters.values()
    }

    /// Iterates emitters in name order, mutably.
    pub fn emitters_mut(&mut self) -> impl Iterator<Item = &mut Emitter> {
        self.emitters.values_mut()
    }

    /// Number of emitters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.emitters.len()
    }

    /// Returns true when the group has no emitters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    /// Starts playback. No-op when already playing.
    pub fn play(&mut self) {
        if self.playing {
            return;
        }
        self.playing = true;
        self.elapsed = 0.0;
        self.reset_emitters();
        info!("Group '{}' playing", self.name);
    }

    /// Stops playback and resets every emitter.
    pub fn stop(&mut self) {
        self.playing = false;
        self.elapsed = 0.0;
        self.reset_emitters();
        info!("Group '{}' stopped", self.name);
    }

    /// Drops every emitter's queued emissions.
    pub(crate) fn discard_pending(&mut self) {
        for emitter in self.emitters.values_mut() {
            emitter.discard_pending();
        }
    }

    fn reset_emitters(&mut self) {
        for emitter in self.emitters.values_mut() {
            emitter.reset();
        }
    }

    /// Advances playback and updates active emitters.
    ///
    /// Returns true when the group auto-stopped this frame.
    pub fn update(&mut self, delta_time: f32) -> bool {
        if !self.is_running() {
            return false;
        }

        self.elapsed += delta_time;
        if self.auto_stop > 0.0 && self.elapsed >= self.auto_stop {
            debug!(
                "Group '{}' reached its {}s duration",
                self.name, self.auto_stop
            );
            self.stop();
            return true;
        }

        let origin = self.origin;
        for emitter in self.emitters.values_mut().filter(|e| e.is_active()) {
            emitter.update(delta_time, origin);
        }
        false
    }
}

/// Registry of groups and their emitters.
#[derive(Debug)]
pub struct GroupManager {
    config: EffectsConfig,
    extractor: MeshSurfaceExtractor,
    ids: EmitterIdAllocator,
    groups: BTreeMap<String, EmitterGroup>,
}

impl Default for GroupManager {
    fn default() -> Self {
        Self::new(EffectsConfig::default())
    }
}

impl GroupManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            extractor: MeshSurfaceExtractor::new(ExtractorSettings::from(&config)),
            config,
            ids: EmitterIdAllocator::default(),
            groups: BTreeMap::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &EffectsConfig {
        &self.config
    }

    /// Returns the mesh extractor.
    #[must_use]
    pub const fn extractor(&self) -> &MeshSurfaceExtractor {
        &self.extractor
    }

    // === Groups ===

    /// Creates a group. Returns `None` when the name is taken.
    pub fn create_group(&mut self, name: &str) -> Option<&mut EmitterGroup> {
        if self.groups.contains_key(name) {
            warn!("Group '{}' already exists", name);
            return None;
        }
        let group = EmitterGroup::new(name, self.config.default_auto_stop);
        Some(self.groups.entry(name.to_string()).or_insert(group))
    }

    /// Deletes a group and all of its emitters. Missing groups are ignored.
    pub fn delete_group(&mut self, name: &str) -> bool {
        let removed = self.groups.remove(name);
        if let Some(group) = &removed {
            debug!("Deleted group '{}' with {} emitters", name, group.len());
        }
        removed.is_some()
    }

    /// Returns a group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&EmitterGroup> {
        self.groups.get(name)
    }

    /// Returns a group by name, mutably.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut EmitterGroup> {
        self.groups.get_mut(name)
    }

    /// Iterates groups in name order.
    pub fn groups(&self) -> impl Iterator<Item = &EmitterGroup> {
        self.groups.values()
    }

    /// Iterates groups in name order, mutably.
    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut EmitterGroup> {
        self.groups.values_mut()
    }

    /// Starts a group.
    pub fn play(&mut self, group: &str) {
        if let Some(group) = self.groups.get_mut(group) {
            group.play();
        }
    }

    /// Stops a group.
    pub fn stop(&mut self, group: &str) {
        if let Some(group) = self.groups.get_mut(group) {
            group.stop();
        }
    }

    /// Enables or disables a group.
    pub fn set_group_active(&mut self, group: &str, active: bool) {
        if let Some(group) = self.groups.get_mut(group) {
            group.set_active(active);
        }
    }

    /// Sets a group's origin offset.
    pub fn set_group_origin(&mut self, group: &str, origin: Vec3) {
        if let Some(group) = self.groups.get_mut(group) {
            group.set_origin(origin);
        }
    }

    /// Sets a group's auto-stop duration.
    pub fn set_auto_stop(&mut self, group: &str, seconds: f32) {
        if let Some(group) = self.groups.get_mut(group) {
            group.set_auto_stop_duration(seconds);
        }
    }

    // === Emitters ===

    /// Creates an emitter in `group`.
    ///
    /// Returns `None` when the group is missing or already has an emitter
    /// named `name`; the existing emitter is left untouched.
    pub fn create_emitter(&mut self, group: &str, name: &str) -> Option<&mut Emitter> {
        let Some(owner) = self.groups.get_mut(group) else {
            warn!("Cannot create emitter '{}': no group '{}'", name, group);
            return None;
        };
        if owner.emitters.contains_key(name) {
            warn!("Emitter '{}' already exists in group '{}'", name, group);
            return None;
        }
        let mut emitter = Emitter::new(self.ids.allocate(), name);
        emitter.set_max_trail_steps(self.config.max_trail_steps);
        Some(owner.emitters.entry(name.to_string()).or_insert(emitter))
    }

    /// Deletes an emitter. Missing emitters are ignored.
    pub fn delete_emitter(&mut self, group: &str, name: &str) -> bool {
        self.groups
            .get_mut(group)
            .and_then(|g| g.emitters.remove(name))
            .is_some()
    }

    /// Returns an emitter.
    #[must_use]
    pub fn emitter(&self, group: &str, name: &str) -> Option<&Emitter> {
        self.groups.get(group).and_then(|g| g.emitter(name))
    }

    /// Returns an emitter mutably.
    pub fn emitter_mut(&mut self, group: &str, name: &str) -> Option<&mut Emitter> {
        self.groups.get_mut(group).and_then(|g| g.emitter_mut(name))
    }

    fn with_emitter(&mut self, group: &str, name: &str, f: impl FnOnce(&mut Emitter)) {
        if let Some(emitter) = self.emitter_mut(group, name) {
            f(emitter);
        }
    }

    /// Overwrites an emitter's shape.
    pub fn configure_shape(&mut self, group: &str, name: &str, config: ShapeConfig) {
        self.with_emitter(group, name, |e| e.configure_shape(config));
    }

    /// Moves an emitter's shape.
    pub fn retarget(&mut self, group: &str, name: &str, placement: Placement) {
        self.with_emitter(group, name, |e| e.retarget(placement));
    }

    /// Replaces an emitter's spawn parameters.
    pub fn set_spawn_params(&mut self, group: &str, name: &str, spawn: SpawnParameters) {
        self.with_emitter(group, name, |e| e.set_spawn(spawn));
    }

    /// Replaces an emitter's trail settings.
    pub fn set_trail(&mut self, group: &str, name: &str, trail: TrailConfig) {
        self.with_emitter(group, name, |e| e.set_trail(trail));
    }

    /// Sets an emitter's texture path.
    pub fn set_texture(&mut self, group: &str, name: &str, path: &str) {
        self.with_emitter(group, name, |e| e.set_texture(path));
    }

    /// Enables or disables an emitter.
    pub fn set_emitter_active(&mut self, group: &str, name: &str, active: bool) {
        self.with_emitter(group, name, |e| e.set_active(active));
    }

    /// Emits at a point this frame.
    ///
    /// Ignored unless the group is running; see [`EmitterGroup::is_running`].
    pub fn emit_at_position(&mut self, group: &str, name: &str, position: Vec3, count: u32) {
        let Some(owner) = self.groups.get_mut(group) else {
            return;
        };
        if !owner.is_running() {
            debug!("Group '{}' not running, dropping emission of {count}", group);
            return;
        }
        if let Some(emitter) = owner.emitters.get_mut(name) {
            emitter.emit_at_position(position, count);
        }
    }

    /// Rebuilds an emitter's mesh triangles from `model`.
    pub fn set_mesh_source(&mut self, group: &str, name: &str, model: Option<&dyn ModelSource>) {
        let extractor = &self.extractor;
        if let Some(emitter) = self.groups.get_mut(group).and_then(|g| g.emitters.get_mut(name)) {
            emitter.set_mesh_source(extractor, model);
        }
    }

    /// Empties an emitter's mesh triangles.
    pub fn clear_mesh_source(&mut self, group: &str, name: &str) {
        self.with_emitter(group, name, Emitter::clear_mesh_source);
    }

    /// IDs of every emitter.
    #[must_use]
    pub fn emitter_ids(&self) -> Vec<EmitterId> {
        self.groups
            .values()
            .flat_map(|g| g.emitters().map(Emitter::id))
            .collect()
    }

    // === Frame ===

    /// Advances every group. Returns the names of groups that auto-stopped.
    pub fn update(&mut self, delta_time: f32) -> Vec<String> {
        self.groups
            .values_mut()
            .filter_map(|group| group.update(delta_time).then(|| group.name().to_string()))
            .collect()
    }

    // === Documents ===

    /// Captures every group as a document.
    #[must_use]
    pub fn to_document(&self) -> EffectDocument {
        EffectDocument {
            version: DOCUMENT_VERSION,
            groups: self.groups.values().map(group_document).collect(),
        }
    }

    /// Replaces every group with the contents of `document`.
    ///
    /// Mesh emitters resolve their model through `models`; unresolved models
    /// leave an empty triangle list.
    pub fn apply_document(&mut self, document: &EffectDocument, models: Option<&dyn ModelResolver>) {
        let mut groups = BTreeMap::new();

        for doc in &document.groups {
            if groups.contains_key(&doc.group_name) {
                warn!("Duplicate group '{}' in document; skipping", doc.group_name);
                continue;
            }

            let mut group = EmitterGroup::new(doc.group_name.clone(), doc.system_duration.max(0.0));
            group.active = doc.is_active;
            group.playing = doc.is_playing;
            group.elapsed = doc.current_time;
            group.origin = doc.translate;

            for emitter_doc in &doc.emitters {
                if group.emitters.contains_key(&emitter_doc.name) {
                    warn!(
                        "Duplicate emitter '{}' in group '{}'; skipping",
                        emitter_doc.name, doc.group_name
                    );
                    continue;
                }
                let emitter = self.build_emitter(emitter_doc, models);
                group.emitters.insert(emitter_doc.name.clone(), emitter);
            }

            groups.insert(doc.group_name.clone(), group);
        }

        self.groups = groups;
    }

    fn build_emitter(&mut self, doc: &EmitterDocument, models: Option<&dyn ModelResolver>) -> Emitter {
        let mut emitter = Emitter::new(self.ids.allocate(), doc.name.clone());
        emitter.set_max_trail_steps(self.config.max_trail_steps);
        emitter.set_active(doc.is_active);
        emitter.set_texture(doc.texture_file_path.clone());
        emitter.configure_shape(doc.shape_config());
        emitter.set_spawn(doc.particle_params);
        emitter.set_trail(doc.trail);

        if emitter.shape_kind() == ShapeKind::Mesh {
            if let Some(path) = doc.model_path() {
                match models.and_then(|m| m.resolve(path)) {
                    Some(model) => emitter.set_mesh_source(&self.extractor, Some(model)),
                    None => {
                        warn!("Model '{}' for emitter '{}' not found", path, doc.name);
                        emitter.set_unresolved_model(path.to_string());
                    },
                }
            }
        }
        emitter
    }

    /// Saves every group to `path`.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> DocumentResult<()> {
        self.to_document().save_to(path)
    }

    /// Loads groups from `path`.
    ///
    /// On error the current groups are left unchanged.
    pub fn load_from<P: AsRef<Path>>(&mut self, path: P, models: Option<&dyn ModelResolver>) -> DocumentResult<()> {
        let document = EffectDocument::load_from(path)?;
        self.apply_document(&document, models);
        Ok(())
    }
}

fn group_document(group: &EmitterGroup) -> GroupDocument {
    GroupDocument {
        group_name: group.name.clone(),
        is_active: group.active,
        is_playing: group.playing,
        current_time: group.elapsed,
        system_duration: group.auto_stop,
        translate: group.origin,
        emitters: group.emitters().map(emitter_document).collect(),
    }
}

fn emitter_document(emitter: &Emitter) -> EmitterDocument {
    let mut doc = EmitterDocument {
        name: emitter.name().to_string(),
        is_active: emitter.is_active(),
        texture_file_path: emitter.texture().to_string(),
        particle_params: *emitter.spawn(),
        trail: *emitter.trail(),
        ..EmitterDocument::default()
    };
    doc.set_shape_config(&emitter.shape().config(), emitter.model_ref());
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::ModelData;
    use crate::shape::ShapeParams;
    use tempfile::TempDir;

    fn manager_with_emitter() -> GroupManager {
        let mut manager = GroupManager::default();
        manager.create_group("fx").expect("group");
        manager.create_emitter("fx", "sparks").expect("emitter");
        manager
    }

    struct Library(ModelData);

    impl ModelResolver for Library {
        fn resolve(&self, name: &str) -> Option<&dyn ModelSource> {
            (self.0.name == name).then_some(&self.0 as &dyn ModelSource)
        }
    }

    #[test]
    fn test_duplicate_emitter_is_rejected() {
        let mut manager = manager_with_emitter();
        manager.configure_shape(
            "fx",
            "sparks",
            ShapeConfig {
                count: 33,
                ..ShapeConfig::default()
            },
        );

        assert!(manager.create_emitter("fx", "sparks").is_none());
        let original = manager.emitter("fx", "sparks").expect("emitter");
        assert_eq!(original.shape().schedule().count, 33);
        assert_eq!(manager.group("fx").map(EmitterGroup::len), Some(1));
    }

    #[test]
    fn test_duplicate_group_is_rejected() {
        let mut manager = manager_with_emitter();
        assert!(manager.create_group("fx").is_none());
        assert_eq!(manager.group("fx").map(EmitterGroup::len), Some(1));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut manager = manager_with_emitter();
        assert!(!manager.delete_group("nope"));
        assert!(!manager.delete_emitter("fx", "nope"));
        assert!(!manager.delete_emitter("nope", "sparks"));
        assert!(manager.emitter("fx", "sparks").is_some());
    }

    #[test]
    fn test_delete_group_cascades() {
        let mut manager = manager_with_emitter();
        assert!(manager.delete_group("fx"));
        assert!(manager.emitter("fx", "sparks").is_none());
        assert!(manager.emitter_ids().is_empty());
    }

    #[test]
    fn test_setters_on_missing_emitter_are_silent() {
        let mut manager = manager_with_emitter();
        manager.configure_shape("fx", "ghost", ShapeConfig::default_for(ShapeKind::Box));
        manager.set_trail("ghost", "sparks", TrailConfig::default());
        manager.emit_at_position("fx", "ghost", Vec3::ONE, 4);
        manager.play("ghost");
        assert_eq!(
            manager.emitter("fx", "sparks").map(Emitter::shape_kind),
            Some(ShapeKind::Sphere)
        );
    }

    #[test]
    fn test_emission_on_idle_group_is_dropped() {
        let mut manager = manager_with_emitter();
        manager.emit_at_position("fx", "sparks", Vec3::ONE, 10);
        assert!(manager.emitter("fx", "sparks").expect("emitter").pending().is_empty());

        manager.play("fx");
        manager.emit_at_position("fx", "sparks", Vec3::ONE, 10);
        manager.set_group_active("fx", false);
        let emitter = manager.emitter("fx", "sparks").expect("emitter");
        assert!(emitter.pending().is_empty());
        assert!(!emitter.shape().schedule().emit_now());

        manager.emit_at_position("fx", "sparks", Vec3::ONE, 10);
        assert!(manager.emitter("fx", "sparks").expect("emitter").pending().is_empty());
    }

    #[test]
    fn test_stopped_group_does_not_update() {
        let mut manager = manager_with_emitter();
        manager.update(5.0);
        let emitter = manager.emitter("fx", "sparks").expect("emitter");
        assert!(emitter.shape().schedule().timer().abs() < f32::EPSILON);
        assert!(emitter.pending().is_empty());
    }

    #[test]
    fn test_inactive_group_does_not_update() {
        let mut manager = manager_with_emitter();
        manager.play("fx");
        manager.set_group_active("fx", false);
        manager.update(0.5);
        assert!(manager.group("fx").expect("group").elapsed().abs() < f32::EPSILON);
    }

    #[test]
    fn test_play_is_noop_when_playing() {
        let mut manager = manager_with_emitter();
        manager.play("fx");
        manager.update(0.5);
        manager.play("fx");
        assert!((manager.group("fx").expect("group").elapsed() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_auto_stop_resets_emitters() {
        let mut manager = manager_with_emitter();
        manager.set_auto_stop("fx", 1.0);
        manager.configure_shape(
            "fx",
            "sparks",
            ShapeConfig {
                interval: 10.0,
                ..ShapeConfig::default()
            },
        );
        manager.set_trail(
            "fx",
            "sparks",
            TrailConfig {
                enabled: true,
                ..TrailConfig::default()
            },
        );
        manager.play("fx");

        manager.update(0.4);
        manager.update(0.4);
        {
            let emitter = manager.emitter("fx", "sparks").expect("emitter");
            assert!(emitter.trail_state().last_position().is_some());
            assert!(emitter.shape().schedule().timer() > 0.0);
        }

        let stopped = manager.update(0.4);
        assert_eq!(stopped, vec!["fx".to_string()]);

        let group = manager.group("fx").expect("group");
        assert!(!group.is_playing());
        assert!(group.elapsed().abs() < f32::EPSILON);
        let emitter = group.emitter("sparks").expect("emitter");
        assert_eq!(emitter.trail_state().last_position(), None);
        assert!(emitter.shape().schedule().timer().abs() < f32::EPSILON);
    }

    #[test]
    fn test_inactive_emitter_skips_update() {
        let mut manager = manager_with_emitter();
        manager.set_emitter_active("fx", "sparks", false);
        manager.play("fx");
        manager.update(2.0);
        let emitter = manager.emitter("fx", "sparks").expect("emitter");
        assert!(emitter.pending().is_empty());
    }

    #[test]
    fn test_group_origin_offsets_emission() {
        let mut manager = manager_with_emitter();
        manager.set_group_origin("fx", Vec3::new(5.0, 0.0, 0.0));
        manager.configure_shape(
            "fx",
            "sparks",
            ShapeConfig {
                translate: Vec3::new(0.0, 2.0, 0.0),
                interval: 0.1,
                ..ShapeConfig::default()
            },
        );
        manager.play("fx");
        manager.update(0.2);

        let emitter = manager.emitter("fx", "sparks").expect("emitter");
        assert_eq!(emitter.pending()[0].position, Vec3::new(5.0, 2.0, 0.0));
    }

    #[test]
    fn test_document_roundtrip() {
        let mut manager = manager_with_emitter();
        manager.set_group_origin("fx", Vec3::new(1.0, 2.0, 3.0));
        manager.set_auto_stop("fx", 4.0);
        manager.configure_shape(
            "fx",
            "sparks",
            ShapeConfig {
                translate: Vec3::new(0.5, 0.0, 0.0),
                params: ShapeParams::Cone {
                    direction: Vec3::X,
                    radius: 0.25,
                    height: 3.0,
                },
                count: 12,
                interval: 0.2,
            },
        );
        manager.set_texture("fx", "sparks", "textures/spark.png");
        manager.set_spawn_params(
            "fx",
            "sparks",
            SpawnParameters {
                lifetime: 2.0,
                velocity: Vec3::new(0.0, 4.0, 0.0),
                billboard: false,
                ..SpawnParameters::default()
            },
        );
        manager.set_trail(
            "fx",
            "sparks",
            TrailConfig {
                enabled: true,
                min_distance: 0.5,
                lifetime_override: 0.3,
                emission_count: 2,
                inherit_scale: true,
            },
        );
        manager.create_group("idle").expect("group");
        manager.set_group_active("idle", false);

        let document = manager.to_document();
        let json = document.to_json().expect("serialize");
        let parsed = EffectDocument::from_json(&json).expect("parse");
        assert_eq!(parsed, document);

        let mut restored = GroupManager::default();
        restored.apply_document(&parsed, None);
        assert_eq!(restored.to_document(), document);

        let emitter = restored.emitter("fx", "sparks").expect("emitter");
        assert_eq!(emitter.texture(), "textures/spark.png");
        assert_eq!(emitter.shape().config().count, 12);
        assert!(!restored.group("idle").expect("group").is_active());
    }

    #[test]
    fn test_mesh_model_resolved_on_load() {
        let library = Library(ModelData::single(
            "builtin:quad",
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![0, 1, 2, 0, 2, 3],
        ));

        let mut manager = manager_with_emitter();
        manager.configure_shape("fx", "sparks", ShapeConfig::default_for(ShapeKind::Mesh));
        manager.set_mesh_source("fx", "sparks", Some(&library.0));
        let document = manager.to_document();

        let mut restored = GroupManager::default();
        restored.apply_document(&document, Some(&library));
        let emitter = restored.emitter("fx", "sparks").expect("emitter");
        assert_eq!(emitter.triangle_count(), 2);
        assert_eq!(emitter.model_ref(), Some("builtin:quad"));

        let mut unresolved = GroupManager::default();
        unresolved.apply_document(&document, None);
        let emitter = unresolved.emitter("fx", "sparks").expect("emitter");
        assert_eq!(emitter.triangle_count(), 0);
        assert_eq!(emitter.model_ref(), Some("builtin:quad"));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("effects.json");

        let manager = manager_with_emitter();
        manager.save_to(&path).expect("save");

        let mut loaded = GroupManager::default();
        loaded.load_from(&path, None).expect("load");
        assert!(loaded.emitter("fx", "sparks").is_some());
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ definitely not json").expect("write");

        let mut manager = manager_with_emitter();
        assert!(manager.load_from(&path, None).is_err());
        assert!(manager.load_from(dir.path().join("missing.json"), None).is_err());
        assert!(manager.emitter("fx", "sparks").is_some());
    }

    #[test]
    fn test_emitter_ids_are_unique() {
        let mut manager = manager_with_emitter();
        manager.create_emitter("fx", "smoke").expect("emitter");
        let ids = manager.emitter_ids();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }
}
