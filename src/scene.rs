//! Spatial index for placed furniture.
//!
//! Every placed item is a root entity carrying [`PlacedItem`], [`ItemTransform`] and
//! [`CatalogLink`]; each of its sub-meshes is a separate entity tagged with [`OwnerTag`], so a
//! ray hit on any sub-mesh resolves to its item without walking a parent chain. Selection boxes
//! are spawned as free-standing entities and never contribute to item bounds or picking.

use crate::catalog::{CatalogEntry, FurnitureKind};
use crate::mesh::{Emissive, Material, MaterialDelta, MeshBounds, ModelTemplate};
use crate::picking::ray_hit_obb;
use crate::state::PlacedItemSummary;
use bevy_ecs::prelude::{Component, Entity, With, World};
use bevy_ecs::world::Mut;
use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Process-unique identity of a placed item: a monotonic serial plus a random salt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    serial: u64,
    salt: u32,
}

impl ItemId {
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}-{:08x}", self.serial, self.salt)
    }
}

#[derive(Component, Clone, Debug)]
pub struct PlacedItem {
    pub id: ItemId,
    pub name: String,
    /// Geometry is a procedural stand-in because the asset failed to load.
    pub placeholder: bool,
}

/// Originating catalog entry, kept so the item can be re-serialized even without its asset.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct CatalogLink {
    pub id: Option<String>,
    pub name: String,
    pub path: Option<String>,
    pub category: Option<String>,
    pub kind: FurnitureKind,
}

impl From<&CatalogEntry> for CatalogLink {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            name: entry.name.clone(),
            path: Some(entry.path.clone()).filter(|path| !path.is_empty()),
            category: Some(entry.category.clone()).filter(|category| !category.is_empty()),
            kind: entry.resolved_kind(),
        }
    }
}

#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct ItemTransform {
    pub position: Vec3,
    /// Euler angles in radians, XYZ order.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for ItemTransform {
    fn default() -> Self {
        Self { position: Vec3::ZERO, rotation: Vec3::ZERO, scale: Vec3::ONE }
    }
}

impl ItemTransform {
    pub fn at(position: Vec3) -> Self {
        Self { position, ..Self::default() }
    }

    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }
}

#[derive(Component, Clone, Debug, Default)]
pub struct ItemChildren(pub Vec<Entity>);

#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Selected;

#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnerTag(pub ItemId);

#[derive(Component, Clone, Debug)]
pub struct SubMesh {
    pub name: String,
    pub index: usize,
    pub local: Mat4,
    pub bounds: MeshBounds,
}

#[derive(Component, Clone, Debug)]
pub struct MeshSurface {
    /// Possibly shared with other items spawned from the same template.
    pub material: Arc<Material>,
    /// Per-instance emissive state; `None` when the material has no emissive channel.
    pub emissive: Option<Emissive>,
}

/// Material deltas from a loaded layout that matched no sub-mesh; re-emitted on the next save.
#[derive(Component, Clone, Debug, Default)]
pub struct RetainedDeltas(pub Vec<MaterialDelta>);

#[derive(Component, Clone, Debug)]
pub struct SelectionBox {
    pub owner: ItemId,
    pub bounds: MeshBounds,
}

pub struct ItemSpawn<'a> {
    pub id: ItemId,
    pub name: String,
    pub catalog: CatalogLink,
    pub transform: ItemTransform,
    pub template: &'a ModelTemplate,
    pub placeholder: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PickHit {
    pub item: ItemId,
    pub sub_mesh: Entity,
    pub distance: f32,
}

pub struct SceneIndex {
    world: World,
    items: HashMap<ItemId, Entity>,
    order: Vec<ItemId>,
    next_serial: u64,
    epoch: u64,
}

impl Default for SceneIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneIndex {
    pub fn new() -> Self {
        Self { world: World::new(), items: HashMap::new(), order: Vec::new(), next_serial: 0, epoch: 0 }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn allocate_id(&mut self) -> ItemId {
        self.next_serial += 1;
        ItemId { serial: self.next_serial, salt: rand::random::<u32>() }
    }

    /// Incremented by every wholesale clear; pending work tagged with an older epoch is stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[ItemId] {
        &self.order
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub fn item_entity(&self, id: ItemId) -> Option<Entity> {
        self.items.get(&id).copied()
    }

    pub fn spawn_item(&mut self, spawn: ItemSpawn<'_>) -> Entity {
        let ItemSpawn { id, name, catalog, transform, template, placeholder } = spawn;
        let mut children = Vec::with_capacity(template.sub_meshes.len());
        for (index, sub_mesh) in template.sub_meshes.iter().enumerate() {
            let child = self
                .world
                .spawn((
                    OwnerTag(id),
                    SubMesh {
                        name: sub_mesh.name.clone(),
                        index,
                        local: sub_mesh.local,
                        bounds: sub_mesh.bounds,
                    },
                    MeshSurface { material: Arc::clone(&sub_mesh.material), emissive: sub_mesh.material.emissive },
                ))
                .id();
            children.push(child);
        }
        let entity = self
            .world
            .spawn((PlacedItem { id, name, placeholder }, catalog, transform, ItemChildren(children)))
            .id();
        self.items.insert(id, entity);
        self.order.push(id);
        entity
    }

    /// Deep copy of `source` under a new identity. Materials are cloned, not shared.
    pub fn duplicate_item(&mut self, source: ItemId, name: String, transform: ItemTransform) -> Option<ItemId> {
        let source_entity = self.item_entity(source)?;
        let catalog = self.world.get::<CatalogLink>(source_entity)?.clone();
        let placeholder = self.world.get::<PlacedItem>(source_entity).map(|item| item.placeholder).unwrap_or(false);
        let retained = self.world.get::<RetainedDeltas>(source_entity).cloned();
        let parts: Vec<(SubMesh, Arc<Material>)> = self
            .sub_mesh_entities(source)
            .into_iter()
            .filter_map(|child| {
                let sub_mesh = self.world.get::<SubMesh>(child)?.clone();
                let surface = self.world.get::<MeshSurface>(child)?;
                Some((sub_mesh, Arc::new(Material::clone(&surface.material))))
            })
            .collect();

        let id = self.allocate_id();
        let mut children = Vec::with_capacity(parts.len());
        for (sub_mesh, material) in parts {
            let emissive = material.emissive;
            children.push(self.world.spawn((OwnerTag(id), sub_mesh, MeshSurface { material, emissive })).id());
        }
        let mut entity = self
            .world
            .spawn((PlacedItem { id, name, placeholder }, catalog, transform, ItemChildren(children)));
        if let Some(retained) = retained {
            entity.insert(retained);
        }
        let entity = entity.id();
        self.items.insert(id, entity);
        self.order.push(id);
        Some(id)
    }

    pub fn despawn_item(&mut self, id: ItemId) -> bool {
        let Some(entity) = self.items.remove(&id) else {
            return false;
        };
        self.order.retain(|other| *other != id);
        let children = self.world.get::<ItemChildren>(entity).map(|c| c.0.clone()).unwrap_or_default();
        for child in children {
            self.world.despawn(child);
        }
        let boxes: Vec<Entity> = self.selection_boxes_for(id);
        for selection_box in boxes {
            self.world.despawn(selection_box);
        }
        self.world.despawn(entity)
    }

    /// Removes every item and selection box and starts a new epoch.
    pub fn clear(&mut self) -> Vec<ItemId> {
        let removed = self.order.clone();
        for id in &removed {
            self.despawn_item(*id);
        }
        let mut query = self.world.query_filtered::<Entity, With<SelectionBox>>();
        let stray: Vec<Entity> = query.iter(&self.world).collect();
        for entity in stray {
            self.world.despawn(entity);
        }
        self.epoch += 1;
        removed
    }

    pub fn item(&self, id: ItemId) -> Option<&PlacedItem> {
        self.world.get::<PlacedItem>(self.item_entity(id)?)
    }

    pub fn display_name(&self, id: ItemId) -> Option<&str> {
        self.item(id).map(|item| item.name.as_str())
    }

    pub fn catalog(&self, id: ItemId) -> Option<&CatalogLink> {
        self.world.get::<CatalogLink>(self.item_entity(id)?)
    }

    pub fn transform(&self, id: ItemId) -> Option<ItemTransform> {
        self.world.get::<ItemTransform>(self.item_entity(id)?).copied()
    }

    pub fn set_transform(&mut self, id: ItemId, transform: ItemTransform) -> bool {
        let Some(entity) = self.item_entity(id) else {
            return false;
        };
        match self.world.get_mut::<ItemTransform>(entity) {
            Some(mut current) => {
                *current = transform;
                true
            }
            None => false,
        }
    }

    pub fn retained_deltas(&self, id: ItemId) -> &[MaterialDelta] {
        self.item_entity(id)
            .and_then(|entity| self.world.get::<RetainedDeltas>(entity))
            .map(|retained| retained.0.as_slice())
            .unwrap_or(&[])
    }

    pub fn set_retained_deltas(&mut self, id: ItemId, deltas: Vec<MaterialDelta>) {
        let Some(entity) = self.item_entity(id) else {
            return;
        };
        if deltas.is_empty() {
            self.world.entity_mut(entity).remove::<RetainedDeltas>();
        } else {
            self.world.entity_mut(entity).insert(RetainedDeltas(deltas));
        }
    }

    pub fn sub_mesh_entities(&self, id: ItemId) -> Vec<Entity> {
        self.item_entity(id)
            .and_then(|entity| self.world.get::<ItemChildren>(entity))
            .map(|children| children.0.clone())
            .unwrap_or_default()
    }

    pub fn sub_mesh(&self, entity: Entity) -> Option<&SubMesh> {
        self.world.get::<SubMesh>(entity)
    }

    pub fn surface(&self, entity: Entity) -> Option<&MeshSurface> {
        self.world.get::<MeshSurface>(entity)
    }

    pub fn surface_mut(&mut self, entity: Entity) -> Option<Mut<'_, MeshSurface>> {
        self.world.get_mut::<MeshSurface>(entity)
    }

    /// Resolves a sub-mesh entity to the item that owns it.
    pub fn owner_of(&self, sub_mesh: Entity) -> Option<ItemId> {
        let owner = self.world.get::<OwnerTag>(sub_mesh)?.0;
        self.contains(owner).then_some(owner)
    }

    /// World-space axis-aligned bounds of the item, computed from its current transform.
    pub fn world_bounds(&self, id: ItemId) -> Option<MeshBounds> {
        let transform = self.transform(id)?;
        let item_matrix = transform.matrix();
        self.sub_mesh_entities(id)
            .into_iter()
            .filter_map(|child| self.world.get::<SubMesh>(child))
            .map(|sub_mesh| sub_mesh.bounds.transformed(&(item_matrix * sub_mesh.local)))
            .reduce(|acc, bounds| acc.union(&bounds))
    }

    /// Half extents of the world-space footprint on the floor plane as `(x, z)`.
    pub fn footprint_half_extents(&self, id: ItemId) -> Option<Vec2> {
        let size = self.world_bounds(id)?.size();
        Some(Vec2::new(size.x * 0.5, size.z * 0.5))
    }

    /// Moves the item vertically so its lowest point touches `floor_y`.
    pub fn settle_on_floor(&mut self, id: ItemId, floor_y: f32) -> bool {
        let (Some(bounds), Some(mut transform)) = (self.world_bounds(id), self.transform(id)) else {
            return false;
        };
        if !bounds.is_finite() {
            return false;
        }
        transform.position.y += floor_y - bounds.min.y;
        self.set_transform(id, transform)
    }

    /// Nearest sub-mesh hit along the ray, resolved to its owning item.
    pub fn pick(&mut self, origin: Vec3, direction: Vec3) -> Option<PickHit> {
        let dir = direction.normalize_or_zero();
        if dir.length_squared() <= f32::EPSILON {
            return None;
        }
        let mut query = self.world.query::<(Entity, &OwnerTag, &SubMesh)>();
        let mut closest: Option<PickHit> = None;
        for (entity, owner, sub_mesh) in query.iter(&self.world) {
            let Some(item_entity) = self.items.get(&owner.0) else {
                continue;
            };
            let Some(transform) = self.world.get::<ItemTransform>(*item_entity) else {
                continue;
            };
            let world = transform.matrix() * sub_mesh.local;
            if let Some(distance) = ray_hit_obb(origin, dir, &world, &sub_mesh.bounds) {
                match closest {
                    Some(best) if distance >= best.distance => {}
                    _ => closest = Some(PickHit { item: owner.0, sub_mesh: entity, distance }),
                }
            }
        }
        closest
    }

    pub fn set_selected_flag(&mut self, id: ItemId, selected: bool) -> bool {
        let Some(entity) = self.item_entity(id) else {
            return false;
        };
        let mut entity_mut = self.world.entity_mut(entity);
        if selected {
            entity_mut.insert(Selected);
        } else {
            entity_mut.remove::<Selected>();
        }
        true
    }

    pub fn is_selected(&self, id: ItemId) -> bool {
        self.item_entity(id).map(|entity| self.world.get::<Selected>(entity).is_some()).unwrap_or(false)
    }

    pub fn selected_items(&mut self) -> Vec<ItemId> {
        let mut query = self.world.query_filtered::<&PlacedItem, With<Selected>>();
        query.iter(&self.world).map(|item| item.id).collect()
    }

    pub fn spawn_selection_box(&mut self, owner: ItemId) -> Option<Entity> {
        let bounds = self.world_bounds(owner)?;
        Some(self.world.spawn(SelectionBox { owner, bounds }).id())
    }

    pub fn refresh_selection_box(&mut self, selection_box: Entity) -> bool {
        let Some(owner) = self.world.get::<SelectionBox>(selection_box).map(|b| b.owner) else {
            return false;
        };
        let Some(bounds) = self.world_bounds(owner) else {
            return false;
        };
        match self.world.get_mut::<SelectionBox>(selection_box) {
            Some(mut current) => {
                current.bounds = bounds;
                true
            }
            None => false,
        }
    }

    pub fn despawn_selection_box(&mut self, selection_box: Entity) -> bool {
        if self.world.get::<SelectionBox>(selection_box).is_none() {
            return false;
        }
        self.world.despawn(selection_box)
    }

    pub fn selection_box(&self, selection_box: Entity) -> Option<&SelectionBox> {
        self.world.get::<SelectionBox>(selection_box)
    }

    pub fn selection_box_count(&mut self) -> usize {
        let mut query = self.world.query::<&SelectionBox>();
        query.iter(&self.world).count()
    }

    fn selection_boxes_for(&mut self, owner: ItemId) -> Vec<Entity> {
        let mut query = self.world.query::<(Entity, &SelectionBox)>();
        query.iter(&self.world).filter(|(_, b)| b.owner == owner).map(|(entity, _)| entity).collect()
    }

    pub fn summaries(&self) -> Vec<PlacedItemSummary> {
        self.order
            .iter()
            .filter_map(|id| {
                let item = self.item(*id)?;
                let catalog = self.catalog(*id)?;
                Some(PlacedItemSummary { id: *id, name: item.name.clone(), catalog_id: catalog.id.clone() })
            })
            .collect()
    }
}
