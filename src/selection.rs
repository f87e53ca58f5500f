use crate::camera::{CameraPause, SharedCameraControl};
use crate::config::HighlightConfig;
use crate::mesh::{Color, Emissive};
use crate::picking::intersect_floor;
use crate::room::RoomBounds;
use crate::scene::{ItemId, SceneIndex};
use crate::state::ObservableState;
use crate::wrap_angle;
use anyhow::{anyhow, Result};
use bevy_ecs::prelude::Entity;
use glam::{Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Idle,
    Selected,
    Dragging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerOutcome {
    /// No ray, or a drag is already in progress.
    Ignored,
    Selected(ItemId),
    DragStarted(ItemId),
    Deselected,
    /// Empty space with nothing selected.
    Missed,
}

struct DragSession {
    item: ItemId,
    /// Floor-plane offset from the item position to the grab point, as `(x, z)`.
    offset: Vec2,
    _pause: Option<CameraPause>,
}

enum Interaction {
    Idle,
    Selected(ItemId),
    Dragging(DragSession),
}

struct Highlight {
    item: ItemId,
    selection_box: Option<Entity>,
    prior: Vec<(Entity, Emissive)>,
}

/// Owns the selection: picking, highlight, floor-plane dragging and the keyboard transforms.
/// It is the only writer of the selected item in [`ObservableState`].
pub struct SelectionEngine {
    interaction: Interaction,
    highlight: Option<Highlight>,
    camera: Option<SharedCameraControl>,
    tint: Emissive,
}

impl SelectionEngine {
    pub fn new(config: &HighlightConfig, camera: Option<SharedCameraControl>) -> Self {
        let [r, g, b] = config.emissive_color;
        Self {
            interaction: Interaction::Idle,
            highlight: None,
            camera,
            tint: Emissive { color: Color::new(r, g, b), intensity: config.emissive_intensity },
        }
    }

    /// Replaces the controller paused by future drags; a drag in progress keeps its own pause.
    pub fn set_camera_control(&mut self, camera: Option<SharedCameraControl>) {
        self.camera = camera;
    }

    pub fn phase(&self) -> SelectionPhase {
        match self.interaction {
            Interaction::Idle => SelectionPhase::Idle,
            Interaction::Selected(_) => SelectionPhase::Selected,
            Interaction::Dragging(_) => SelectionPhase::Dragging,
        }
    }

    pub fn selected(&self) -> Option<ItemId> {
        match &self.interaction {
            Interaction::Idle => None,
            Interaction::Selected(id) => Some(*id),
            Interaction::Dragging(session) => Some(session.item),
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.interaction, Interaction::Dragging(_))
    }

    pub fn selection_box(&self) -> Option<Entity> {
        self.highlight.as_ref().and_then(|h| h.selection_box)
    }

    /// Primary pointer press outside any UI surface. Pressing the selected item starts a drag;
    /// pressing another item switches the selection; pressing empty space deselects.
    pub fn pointer_down(
        &mut self,
        scene: &mut SceneIndex,
        state: &mut ObservableState,
        room: &RoomBounds,
        ray: Option<(Vec3, Vec3)>,
    ) -> PointerOutcome {
        if self.is_dragging() {
            return PointerOutcome::Ignored;
        }
        let Some((origin, dir)) = ray else {
            return PointerOutcome::Ignored;
        };
        match scene.pick(origin, dir) {
            Some(hit) if self.selected() == Some(hit.item) => {
                if self.begin_drag(scene, room, hit.item, origin, dir) {
                    PointerOutcome::DragStarted(hit.item)
                } else {
                    PointerOutcome::Selected(hit.item)
                }
            }
            Some(hit) => {
                self.select(scene, state, hit.item);
                PointerOutcome::Selected(hit.item)
            }
            None if self.selected().is_some() => {
                self.deselect(scene, state);
                PointerOutcome::Deselected
            }
            None => PointerOutcome::Missed,
        }
    }

    fn begin_drag(&mut self, scene: &SceneIndex, room: &RoomBounds, item: ItemId, origin: Vec3, dir: Vec3) -> bool {
        let (Some(transform), Some(hit)) = (scene.transform(item), intersect_floor(origin, dir, room.floor_y)) else {
            return false;
        };
        let offset = Vec2::new(hit.x - transform.position.x, hit.z - transform.position.z);
        let pause = self.camera.as_ref().map(CameraPause::acquire);
        tracing::debug!(%item, "drag started");
        self.interaction = Interaction::Dragging(DragSession { item, offset, _pause: pause });
        true
    }

    /// Moves the dragged item under the pointer. Returns whether the item moved.
    pub fn pointer_move(&mut self, scene: &mut SceneIndex, room: &RoomBounds, ray: Option<(Vec3, Vec3)>) -> bool {
        let Interaction::Dragging(session) = &self.interaction else {
            return false;
        };
        let (item, offset) = (session.item, session.offset);
        match self.drag_update(scene, room, item, offset, ray) {
            Ok(moved) => moved,
            Err(err) => {
                tracing::warn!(error = %err, %item, "drag aborted");
                self.interaction =
                    if scene.contains(item) { Interaction::Selected(item) } else { Interaction::Idle };
                false
            }
        }
    }

    fn drag_update(
        &mut self,
        scene: &mut SceneIndex,
        room: &RoomBounds,
        item: ItemId,
        offset: Vec2,
        ray: Option<(Vec3, Vec3)>,
    ) -> Result<bool> {
        let mut transform = scene.transform(item).ok_or_else(|| anyhow!("dragged item {item} no longer exists"))?;
        let Some((origin, dir)) = ray else {
            return Ok(false);
        };
        let Some(hit) = intersect_floor(origin, dir, room.floor_y) else {
            return Ok(false);
        };
        let half_extents = scene
            .footprint_half_extents(item)
            .ok_or_else(|| anyhow!("dragged item {item} has no geometry"))?;
        let candidate = Vec2::new(hit.x, hit.z) - offset;
        let clamped = room.clamp(candidate, half_extents);
        transform.position.x = clamped.x;
        transform.position.z = clamped.y;
        scene.set_transform(item, transform);
        self.refresh_highlight(scene);
        Ok(true)
    }

    /// Ends a drag. The camera controller resumes when the session is dropped.
    pub fn pointer_up(&mut self) -> bool {
        match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Dragging(session) => {
                tracing::debug!(item = %session.item, "drag finished");
                self.interaction = Interaction::Selected(session.item);
                true
            }
            other => {
                self.interaction = other;
                false
            }
        }
    }

    /// Selects `id`, fully reverting the previous selection first.
    pub fn select(&mut self, scene: &mut SceneIndex, state: &mut ObservableState, id: ItemId) -> bool {
        if !scene.contains(id) {
            return false;
        }
        if self.selected() == Some(id) {
            return true;
        }
        self.release(scene);
        scene.set_selected_flag(id, true);
        self.apply_highlight(scene, id);
        self.interaction = Interaction::Selected(id);
        state.set_selected(Some(id));
        true
    }

    pub fn deselect(&mut self, scene: &mut SceneIndex, state: &mut ObservableState) -> bool {
        let had_selection = self.release(scene).is_some();
        state.set_selected(None);
        had_selection
    }

    /// Deselects and removes the selected item from the index.
    pub fn delete_selected(&mut self, scene: &mut SceneIndex, state: &mut ObservableState) -> Option<ItemId> {
        let id = self.selected()?;
        self.deselect(scene, state);
        scene.despawn_item(id).then_some(id)
    }

    /// Rotates the selection about y by `step` radians and re-clamps it to the room.
    pub fn rotate_selected(&mut self, scene: &mut SceneIndex, room: &RoomBounds, step: f32) -> bool {
        let Some(id) = self.selected() else {
            return false;
        };
        let Some(mut transform) = scene.transform(id) else {
            return false;
        };
        transform.rotation.y = wrap_angle(transform.rotation.y + step);
        scene.set_transform(id, transform);
        if let Some(half_extents) = scene.footprint_half_extents(id) {
            let clamped = room.clamp(Vec2::new(transform.position.x, transform.position.z), half_extents);
            transform.position.x = clamped.x;
            transform.position.z = clamped.y;
            scene.set_transform(id, transform);
        }
        self.refresh_highlight(scene);
        true
    }

    pub fn refresh_highlight(&mut self, scene: &mut SceneIndex) {
        if let Some(selection_box) = self.selection_box() {
            scene.refresh_selection_box(selection_box);
        }
    }

    /// Clears the selection without notifying state. Order: stop dragging, restore emissive,
    /// drop the selection box, clear the flag.
    fn release(&mut self, scene: &mut SceneIndex) -> Option<ItemId> {
        let previous = match std::mem::replace(&mut self.interaction, Interaction::Idle) {
            Interaction::Idle => None,
            Interaction::Selected(id) => Some(id),
            Interaction::Dragging(session) => Some(session.item),
        };
        self.remove_highlight(scene);
        if let Some(id) = previous {
            scene.set_selected_flag(id, false);
        }
        previous
    }

    fn apply_highlight(&mut self, scene: &mut SceneIndex, id: ItemId) {
        let mut prior = Vec::new();
        for child in scene.sub_mesh_entities(id) {
            let Some(mut surface) = scene.surface_mut(child) else {
                continue;
            };
            if let Some(current) = surface.emissive {
                prior.push((child, current));
                surface.emissive = Some(self.tint);
            }
        }
        let selection_box = scene.spawn_selection_box(id);
        self.highlight = Some(Highlight { item: id, selection_box, prior });
    }

    fn remove_highlight(&mut self, scene: &mut SceneIndex) {
        let Some(highlight) = self.highlight.take() else {
            return;
        };
        for (child, emissive) in highlight.prior {
            if let Some(mut surface) = scene.surface_mut(child) {
                surface.emissive = Some(emissive);
            }
        }
        if let Some(selection_box) = highlight.selection_box {
            scene.despawn_selection_box(selection_box);
        }
        tracing::trace!(item = %highlight.item, "highlight removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::OrbitControls;
    use crate::catalog::FurnitureKind;
    use crate::config::RoomConfig;
    use crate::mesh::{Material, ModelTemplate, SubMeshTemplate};
    use crate::scene::{CatalogLink, ItemSpawn, ItemTransform};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn room() -> RoomBounds {
        RoomBounds::from_config(&RoomConfig::default())
    }

    fn spawn_box(scene: &mut SceneIndex, template: &ModelTemplate, x: f32) -> ItemId {
        let id = scene.allocate_id();
        scene.spawn_item(ItemSpawn {
            id,
            name: "Box".to_string(),
            catalog: CatalogLink {
                id: Some("box".to_string()),
                name: "Box".to_string(),
                path: None,
                category: None,
                kind: FurnitureKind::Generic,
            },
            transform: ItemTransform::at(Vec3::new(x, 0.5, 0.0)),
            template,
            placeholder: false,
        });
        id
    }

    fn template() -> ModelTemplate {
        let lit = Arc::new(Material::standard("lit", Color::WHITE));
        let unlit = Arc::new(Material::basic("unlit", Color::WHITE));
        ModelTemplate::new(
            None,
            vec![
                SubMeshTemplate::cuboid("body", Vec3::ZERO, Vec3::ONE, lit),
                SubMeshTemplate::cuboid("label", Vec3::new(0.0, 0.0, 0.51), Vec3::new(0.5, 0.5, 0.01), unlit),
            ],
        )
    }

    fn down_ray(x: f32) -> Option<(Vec3, Vec3)> {
        Some((Vec3::new(x, 10.0, 0.0), Vec3::NEG_Y))
    }

    #[test]
    fn switching_selection_restores_previous_emissive() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        let template = template();
        let a = spawn_box(&mut scene, &template, -2.0);
        let b = spawn_box(&mut scene, &template, 2.0);
        let mut engine = SelectionEngine::new(&HighlightConfig::default(), None);

        assert_eq!(engine.pointer_down(&mut scene, &mut state, &room(), down_ray(-2.0)), PointerOutcome::Selected(a));
        let a_body = scene.sub_mesh_entities(a)[0];
        let a_label = scene.sub_mesh_entities(a)[1];
        assert_ne!(scene.surface(a_body).and_then(|s| s.emissive), Some(Emissive::default()));
        assert_eq!(scene.surface(a_label).and_then(|s| s.emissive), None);

        assert_eq!(engine.pointer_down(&mut scene, &mut state, &room(), down_ray(2.0)), PointerOutcome::Selected(b));
        assert_eq!(scene.surface(a_body).and_then(|s| s.emissive), Some(Emissive::default()));
        assert_eq!(scene.selected_items(), vec![b]);
        assert_eq!(scene.selection_box_count(), 1);
        assert_eq!(state.selected(), Some(b));
    }

    #[test]
    fn drag_pauses_camera_and_clamps() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        let template = template();
        let a = spawn_box(&mut scene, &template, 0.0);
        let controls = Rc::new(RefCell::new(OrbitControls::new(Vec3::ZERO, 8.0)));
        let shared: SharedCameraControl = controls.clone();
        let mut engine = SelectionEngine::new(&HighlightConfig::default(), Some(shared));
        let room = room();

        engine.pointer_down(&mut scene, &mut state, &room, down_ray(0.2));
        assert!(controls.borrow().enabled());
        assert_eq!(engine.pointer_down(&mut scene, &mut state, &room, down_ray(0.2)), PointerOutcome::DragStarted(a));
        assert!(!controls.borrow().enabled());

        assert!(engine.pointer_move(&mut scene, &room, down_ray(1.2)));
        let moved = scene.transform(a).expect("transform").position;
        assert!((moved.x - 1.0).abs() < 1e-4, "offset preserved, x = {}", moved.x);
        assert_eq!(moved.y, 0.5);

        engine.pointer_move(&mut scene, &room, Some((Vec3::new(100.0, 10.0, 100.0), Vec3::NEG_Y)));
        let clamped = scene.transform(a).expect("transform").position;
        let half = scene.footprint_half_extents(a).expect("footprint");
        assert!((clamped.x - (5.0 - 0.5 - half.x)).abs() < 1e-4);
        assert!((clamped.z - (5.0 - 0.5 - half.y)).abs() < 1e-4);

        assert!(engine.pointer_up());
        assert!(controls.borrow().enabled());
        assert_eq!(engine.phase(), SelectionPhase::Selected);
    }

    #[test]
    fn drag_of_vanished_item_resumes_camera() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        let template = template();
        let a = spawn_box(&mut scene, &template, 0.0);
        let controls = Rc::new(RefCell::new(OrbitControls::new(Vec3::ZERO, 8.0)));
        let shared: SharedCameraControl = controls.clone();
        let mut engine = SelectionEngine::new(&HighlightConfig::default(), Some(shared));
        engine.select(&mut scene, &mut state, a);
        engine.pointer_down(&mut scene, &mut state, &room(), down_ray(0.0));
        assert!(engine.is_dragging());

        scene.despawn_item(a);
        assert!(!engine.pointer_move(&mut scene, &room(), down_ray(1.0)));
        assert_eq!(engine.phase(), SelectionPhase::Idle);
        assert!(controls.borrow().enabled());
    }

    #[test]
    fn clicking_empty_space_deselects() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        let template = template();
        let a = spawn_box(&mut scene, &template, 0.0);
        let mut engine = SelectionEngine::new(&HighlightConfig::default(), None);
        engine.select(&mut scene, &mut state, a);
        assert_eq!(engine.pointer_down(&mut scene, &mut state, &room(), down_ray(3.0)), PointerOutcome::Deselected);
        assert_eq!(engine.pointer_down(&mut scene, &mut state, &room(), down_ray(3.0)), PointerOutcome::Missed);
        assert!(scene.selected_items().is_empty());
        assert_eq!(scene.selection_box_count(), 0);
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn rotate_wraps_and_refreshes_box() {
        let mut scene = SceneIndex::new();
        let mut state = ObservableState::new();
        let material = Arc::new(Material::standard("m", Color::WHITE));
        let long = ModelTemplate::new(
            None,
            vec![SubMeshTemplate::cuboid("body", Vec3::ZERO, Vec3::new(2.0, 1.0, 0.5), material)],
        );
        let a = spawn_box(&mut scene, &long, 0.0);
        let mut engine = SelectionEngine::new(&HighlightConfig::default(), None);
        engine.select(&mut scene, &mut state, a);
        let step = std::f32::consts::FRAC_PI_2;
        assert!(engine.rotate_selected(&mut scene, &room(), step));
        let selection_box = engine.selection_box().expect("box");
        let size = scene.selection_box(selection_box).expect("box").bounds.size();
        assert!((size.z - 2.0).abs() < 1e-4);
        for _ in 0..3 {
            engine.rotate_selected(&mut scene, &room(), step);
        }
        assert!(scene.transform(a).expect("transform").rotation.y.abs() < 1e-4);
    }
}
