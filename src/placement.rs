use crate::catalog::{CatalogEntry, FurnitureKind};
use crate::config::PlacementConfig;
use crate::mesh::ModelTemplate;
use crate::room::RoomBounds;
use crate::scene::{CatalogLink, ItemId, ItemSpawn, ItemTransform, SceneIndex};
use crate::state::{Notice, ObservableState};
use anyhow::Result;
use glam::{Vec2, Vec3};
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// A placement that passed validation and is waiting for its asset.
///
/// The ticket holds the engine's in-flight slot; dropping it without calling
/// [`PlacementEngine::finish`] releases the slot.
#[derive(Debug)]
pub struct PendingPlacement {
    pub entry: CatalogEntry,
    /// Floor-plane point the user clicked.
    pub position: Vec3,
    epoch: u64,
    claim: SlotClaim,
}

/// Releases the in-flight slot on drop unless a newer ticket already owns it.
#[derive(Debug)]
struct SlotClaim {
    slot: Rc<Cell<Option<u64>>>,
    ticket: u64,
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        if self.slot.get() == Some(self.ticket) {
            self.slot.set(None);
        }
    }
}

/// Turns "place the active catalog item here" into a placed item.
///
/// Placement runs in two phases around the asset load: [`PlacementEngine::begin`] validates the
/// request and claims the single in-flight slot, [`PlacementEngine::finish`] consumes the load
/// result. A result arriving after the scene was cleared is dropped.
pub struct PlacementEngine {
    config: PlacementConfig,
    slot: Rc<Cell<Option<u64>>>,
    next_ticket: u64,
}

impl PlacementEngine {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config, slot: Rc::new(Cell::new(None)), next_ticket: 0 }
    }

    pub fn is_busy(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Validates a placement request at `floor_point`. Rejections publish a notice and return
    /// `None` without touching the scene.
    pub fn begin(
        &mut self,
        scene: &SceneIndex,
        state: &mut ObservableState,
        room: &RoomBounds,
        floor_point: Option<Vec3>,
    ) -> Option<PendingPlacement> {
        if !self.is_busy() && state.loading() {
            // a dropped ticket left the indicator on
            state.set_loading(false);
        }
        let Some(entry) = state.active_item().cloned() else {
            state.notice(Notice::NoActiveItem);
            return None;
        };
        if self.is_busy() {
            tracing::debug!(item = %entry.id, "placement already in flight");
            state.notice(Notice::PlacementBusy);
            return None;
        }
        let Some(point) = floor_point.filter(|point| room.accepts_placement(*point)) else {
            state.notice(Notice::OutsideRoom);
            return None;
        };
        self.next_ticket += 1;
        self.slot.set(Some(self.next_ticket));
        state.set_loading(true);
        Some(PendingPlacement {
            entry,
            position: Vec3::new(point.x, room.floor_y, point.z),
            epoch: scene.epoch(),
            claim: SlotClaim { slot: Rc::clone(&self.slot), ticket: self.next_ticket },
        })
    }

    /// Completes `pending` with the loader's result, substituting a placeholder on failure.
    pub fn finish(
        &mut self,
        scene: &mut SceneIndex,
        state: &mut ObservableState,
        room: &RoomBounds,
        pending: PendingPlacement,
        loaded: Result<Arc<ModelTemplate>>,
    ) -> Option<ItemId> {
        let PendingPlacement { entry, position, epoch, claim } = pending;
        drop(claim);
        state.set_loading(self.is_busy());
        if epoch != scene.epoch() {
            tracing::debug!(item = %entry.id, "scene changed while loading, placement discarded");
            return None;
        }
        let kind = entry.resolved_kind();
        let (template, placeholder) = match loaded {
            Ok(template) if template.is_placeable() => (template, false),
            Ok(_) => {
                tracing::warn!(path = %entry.path, "model has no usable geometry, using placeholder");
                (Arc::new(ModelTemplate::placeholder(kind, &entry.id)), true)
            }
            Err(err) => {
                tracing::warn!(path = %entry.path, error = %err, "model failed to load, using placeholder");
                (Arc::new(ModelTemplate::placeholder(kind, &entry.id)), true)
            }
        };

        let id = scene.allocate_id();
        scene.spawn_item(ItemSpawn {
            id,
            name: entry.name.clone(),
            catalog: CatalogLink::from(&entry),
            transform: ItemTransform::at(position),
            template: &template,
            placeholder,
        });
        if !self.normalize(scene, room, id, kind) {
            tracing::warn!(item = %entry.id, "placed model has degenerate bounds, discarded");
            scene.despawn_item(id);
            return None;
        }

        tracing::info!(%id, item = %entry.id, placeholder, "item placed");
        state.set_placed_items(scene.summaries());
        state.notice(Notice::ItemPlaced { name: entry.name });
        Some(id)
    }

    /// Rescales toward the kind's target height, puts the lowest point on the floor and clamps the
    /// footprint inside the walls.
    fn normalize(&self, scene: &mut SceneIndex, room: &RoomBounds, id: ItemId, kind: FurnitureKind) -> bool {
        let (Some(bounds), Some(mut transform)) = (scene.world_bounds(id), scene.transform(id)) else {
            return false;
        };
        let height = bounds.size().y;
        if !bounds.is_finite() || height <= f32::EPSILON {
            return false;
        }
        if let Some(multiplier) = self.scale_multiplier(height, kind.target_height()) {
            transform.scale *= multiplier;
            scene.set_transform(id, transform);
        }
        if !scene.settle_on_floor(id, room.floor_y) {
            return false;
        }
        let (Some(half_extents), Some(mut transform)) = (scene.footprint_half_extents(id), scene.transform(id)) else {
            return false;
        };
        let clamped = room.clamp(Vec2::new(transform.position.x, transform.position.z), half_extents);
        transform.position.x = clamped.x;
        transform.position.z = clamped.y;
        scene.set_transform(id, transform) && transform.is_finite()
    }

    fn scale_multiplier(&self, height: f32, target: f32) -> Option<f32> {
        if target <= 0.0 || ((height - target).abs() / target) <= self.config.scale_tolerance {
            return None;
        }
        let min = self.config.min_scale_multiplier.max(f32::EPSILON);
        let max = self.config.max_scale_multiplier.max(min);
        Some((target / height).clamp(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::mesh::{Color, Material, SubMeshTemplate};
    use anyhow::anyhow;

    fn room() -> RoomBounds {
        RoomBounds::from_config(&RoomConfig::default())
    }

    fn chair() -> CatalogEntry {
        CatalogEntry::new("chair-01", "Chair", "models/chair.glb", "Seating")
    }

    fn giant() -> Arc<ModelTemplate> {
        let material = Arc::new(Material::standard("m", Color::WHITE));
        Arc::new(ModelTemplate::new(
            Some("giant.glb".to_string()),
            vec![SubMeshTemplate::cuboid("body", Vec3::new(0.0, 4.5, 0.0), Vec3::new(5.0, 9.0, 5.0), material)],
        ))
    }

    #[test]
    fn requires_active_item() {
        let scene = SceneIndex::new();
        let mut state = ObservableState::new();
        let mut engine = PlacementEngine::new(PlacementConfig::default());
        assert!(engine.begin(&scene, &mut state, &room(), Some(Vec3::ZERO)).is_none());
        assert_eq!(state.last_notice(), Some(&Notice::NoActiveItem));
        assert!(!engine.is_busy());
    }

    #[test]
    fn second_request_is_rejected_while_in_flight() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        state.set_active_item(Some(chair()));
        let mut engine = PlacementEngine::new(PlacementConfig::default());
        let pending = engine.begin(&scene, &mut state, &room(), Some(Vec3::ZERO)).expect("accepted");
        assert!(state.loading());
        assert!(engine.begin(&scene, &mut state, &room(), Some(Vec3::X)).is_none());
        assert_eq!(state.last_notice(), Some(&Notice::PlacementBusy));

        let id = engine.finish(&mut scene, &mut state, &room(), pending, Err(anyhow!("offline")));
        assert!(id.is_some());
        assert!(!state.loading());
        assert_eq!(scene.len(), 1);
        assert!(scene.item(id.expect("placed")).expect("item").placeholder);
    }

    #[test]
    fn dropped_ticket_releases_the_slot() {
        let scene = SceneIndex::new();
        let mut state = ObservableState::new();
        state.set_active_item(Some(chair()));
        let mut engine = PlacementEngine::new(PlacementConfig::default());
        let pending = engine.begin(&scene, &mut state, &room(), Some(Vec3::ZERO)).expect("accepted");
        assert!(engine.is_busy());
        drop(pending);
        assert!(!engine.is_busy());

        let again = engine.begin(&scene, &mut state, &room(), Some(Vec3::X));
        assert!(again.is_some());
        assert!(state.loading());
        assert_ne!(state.last_notice(), Some(&Notice::PlacementBusy));
    }

    #[test]
    fn rejection_after_dropped_ticket_clears_loading() {
        let scene = SceneIndex::new();
        let mut state = ObservableState::new();
        state.set_active_item(Some(chair()));
        let mut engine = PlacementEngine::new(PlacementConfig::default());
        drop(engine.begin(&scene, &mut state, &room(), Some(Vec3::ZERO)));
        assert!(state.loading());
        assert!(engine.begin(&scene, &mut state, &room(), Some(Vec3::new(50.0, 0.0, 0.0))).is_none());
        assert!(!state.loading());
        assert_eq!(state.last_notice(), Some(&Notice::OutsideRoom));
    }

    #[test]
    fn stale_result_is_discarded() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        state.set_active_item(Some(chair()));
        let mut engine = PlacementEngine::new(PlacementConfig::default());
        let pending = engine.begin(&scene, &mut state, &room(), Some(Vec3::ZERO)).expect("accepted");
        scene.clear();
        assert!(engine.finish(&mut scene, &mut state, &room(), pending, Err(anyhow!("late"))).is_none());
        assert!(scene.is_empty());
        assert!(!engine.is_busy());
        assert!(state.placed_items().is_empty());
    }

    #[test]
    fn oversized_model_is_scaled_down_within_limits() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        state.set_active_item(Some(chair()));
        let mut engine = PlacementEngine::new(PlacementConfig::default());
        let pending = engine.begin(&scene, &mut state, &room(), Some(Vec3::ZERO)).expect("accepted");
        let id = engine.finish(&mut scene, &mut state, &room(), pending, Ok(giant())).expect("placed");
        let transform = scene.transform(id).expect("transform");
        assert!((transform.scale.x - 0.1).abs() < 1e-5);
        let bounds = scene.world_bounds(id).expect("bounds");
        assert!(bounds.min.y.abs() < 1e-4);
        assert!((bounds.size().y - 0.9).abs() < 1e-3);
    }

    #[test]
    fn multiplier_respects_tolerance_and_clamp() {
        let engine = PlacementEngine::new(PlacementConfig::default());
        assert_eq!(engine.scale_multiplier(1.0, 0.9), None);
        assert_eq!(engine.scale_multiplier(0.001, 0.9), Some(20.0));
        assert_eq!(engine.scale_multiplier(1000.0, 0.9), Some(0.05));
    }
}
