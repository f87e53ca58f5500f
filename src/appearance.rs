use crate::mesh::{Color, Material, MaterialDelta};
use crate::scene::{ItemId, ItemTransform, SceneIndex};
use anyhow::{bail, Result};
use bevy_ecs::prelude::Entity;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialPreset {
    Standard,
    Glossy,
    Matte,
    Metallic,
}

impl MaterialPreset {
    pub const ALL: [MaterialPreset; 4] =
        [MaterialPreset::Standard, MaterialPreset::Glossy, MaterialPreset::Matte, MaterialPreset::Metallic];

    /// `(metalness, roughness)`
    pub fn channels(self) -> (f32, f32) {
        match self {
            MaterialPreset::Standard => (0.0, 0.5),
            MaterialPreset::Glossy => (0.1, 0.1),
            MaterialPreset::Matte => (0.0, 0.9),
            MaterialPreset::Metallic => (0.9, 0.2),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MaterialPreset::Standard => "standard",
            MaterialPreset::Glossy => "glossy",
            MaterialPreset::Matte => "matte",
            MaterialPreset::Metallic => "metallic",
        }
    }
}

impl FromStr for MaterialPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        match MaterialPreset::ALL.into_iter().find(|preset| preset.as_str() == normalized) {
            Some(preset) => Ok(preset),
            None => bail!("unknown material preset '{s}'"),
        }
    }
}

/// Applies and reverts per-item material edits.
///
/// Materials start out shared between every item spawned from the same template. Before the first
/// edit of a sub-mesh the mutator swaps in a private clone and remembers the material it replaced;
/// that table doubles as the "already cloned" flag and as the snapshot used by reset.
#[derive(Default)]
pub struct AppearanceMutator {
    cloned: HashMap<(ItemId, usize), Arc<Material>>,
}

impl AppearanceMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_modified(&self, id: ItemId) -> bool {
        self.cloned.keys().any(|(owner, _)| *owner == id)
    }

    pub fn apply_color(&mut self, scene: &mut SceneIndex, id: ItemId, color: Color) -> usize {
        self.mutate_item(scene, id, |material| {
            if material.color.is_none() {
                return false;
            }
            material.color = Some(color);
            true
        })
    }

    pub fn apply_preset(&mut self, scene: &mut SceneIndex, id: ItemId, preset: MaterialPreset) -> usize {
        let (metalness, roughness) = preset.channels();
        self.mutate_item(scene, id, |material| {
            if material.metalness.is_none() && material.roughness.is_none() {
                return false;
            }
            if material.metalness.is_some() {
                material.metalness = Some(metalness);
            }
            if material.roughness.is_some() {
                material.roughness = Some(roughness);
            }
            true
        })
    }

    pub fn apply_opacity(&mut self, scene: &mut SceneIndex, id: ItemId, opacity: f32) -> usize {
        if !opacity.is_finite() {
            return 0;
        }
        self.mutate_item(scene, id, |material| {
            material.set_opacity(opacity);
            true
        })
    }

    /// Restores every edited sub-mesh of `id` to the material it had before its first edit.
    /// Returns the number of sub-meshes restored; a second call restores nothing.
    pub fn reset(&mut self, scene: &mut SceneIndex, id: ItemId) -> usize {
        let mut restored = 0;
        for child in scene.sub_mesh_entities(id) {
            let Some(index) = scene.sub_mesh(child).map(|sub_mesh| sub_mesh.index) else {
                continue;
            };
            let Some(original) = self.cloned.remove(&(id, index)) else {
                continue;
            };
            if let Some(mut surface) = scene.surface_mut(child) {
                surface.material = original;
                restored += 1;
            }
        }
        if !scene.retained_deltas(id).is_empty() {
            scene.set_retained_deltas(id, Vec::new());
        }
        restored
    }

    /// Duplicates `source` at `transform` and carries its edit snapshots over to the copy.
    pub fn duplicate(
        &mut self,
        scene: &mut SceneIndex,
        source: ItemId,
        name: String,
        transform: ItemTransform,
    ) -> Option<ItemId> {
        let copy = scene.duplicate_item(source, name, transform)?;
        let inherited: Vec<(usize, Arc<Material>)> = self
            .cloned
            .iter()
            .filter(|((owner, _), _)| *owner == source)
            .map(|((_, index), original)| (*index, Arc::clone(original)))
            .collect();
        for (index, original) in inherited {
            self.cloned.insert((copy, index), original);
        }
        Some(copy)
    }

    /// Current deltas of `id`: every edited sub-mesh in spawn order, then deltas retained from a
    /// loaded layout that matched no sub-mesh.
    pub fn deltas(&self, scene: &SceneIndex, id: ItemId) -> Vec<MaterialDelta> {
        let mut deltas: Vec<MaterialDelta> = scene
            .sub_mesh_entities(id)
            .into_iter()
            .filter_map(|child| {
                let sub_mesh = scene.sub_mesh(child)?;
                if !self.cloned.contains_key(&(id, sub_mesh.index)) {
                    return None;
                }
                let surface = scene.surface(child)?;
                Some(MaterialDelta::capture(sub_mesh.name.clone(), &surface.material))
            })
            .collect();
        deltas.extend(scene.retained_deltas(id).iter().cloned());
        deltas
    }

    /// Applies stored deltas by sub-mesh name. Deltas naming no sub-mesh of `id` are returned.
    pub fn apply_deltas(&mut self, scene: &mut SceneIndex, id: ItemId, deltas: &[MaterialDelta]) -> Vec<MaterialDelta> {
        let children: Vec<(Entity, String)> = scene
            .sub_mesh_entities(id)
            .into_iter()
            .filter_map(|child| scene.sub_mesh(child).map(|sub_mesh| (child, sub_mesh.name.clone())))
            .collect();
        let mut unmatched = Vec::new();
        for delta in deltas {
            match children.iter().find(|(_, name)| *name == delta.child_name) {
                Some((child, _)) => {
                    self.mutate_sub_mesh(scene, id, *child, |material| {
                        delta.apply_to(material);
                        true
                    });
                }
                None => unmatched.push(delta.clone()),
            }
        }
        unmatched
    }

    pub fn forget(&mut self, id: ItemId) {
        self.cloned.retain(|(owner, _), _| *owner != id);
    }

    pub fn clear(&mut self) {
        self.cloned.clear();
    }

    fn mutate_item(
        &mut self,
        scene: &mut SceneIndex,
        id: ItemId,
        mut edit: impl FnMut(&mut Material) -> bool,
    ) -> usize {
        scene
            .sub_mesh_entities(id)
            .into_iter()
            .filter(|child| self.mutate_sub_mesh(scene, id, *child, &mut edit))
            .count()
    }

    /// Copy-on-write edit of one sub-mesh. `edit` returns whether it changed anything; sub-meshes
    /// it declines are left sharing their material.
    fn mutate_sub_mesh(
        &mut self,
        scene: &mut SceneIndex,
        id: ItemId,
        child: Entity,
        mut edit: impl FnMut(&mut Material) -> bool,
    ) -> bool {
        let Some(index) = scene.sub_mesh(child).map(|sub_mesh| sub_mesh.index) else {
            return false;
        };
        let Some(mut surface) = scene.surface_mut(child) else {
            return false;
        };
        let mut candidate = Material::clone(&surface.material);
        if !edit(&mut candidate) {
            return false;
        }
        if !self.cloned.contains_key(&(id, index)) {
            self.cloned.insert((id, index), Arc::clone(&surface.material));
            surface.material = Arc::new(candidate);
        } else {
            *Arc::make_mut(&mut surface.material) = candidate;
        }
        true
    }
}
