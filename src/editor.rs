use crate::appearance::{AppearanceMutator, MaterialPreset};
use crate::assets::AssetLoader;
use crate::camera::{Camera3D, SharedCameraControl, Viewport};
use crate::catalog::CatalogEntry;
use crate::config::EditorConfig;
use crate::input::{EditorAction, EditorEvent, KeyBindings, PointerButton};
use crate::layout::{deserialize_all, serialize_all, LayoutDocument};
use crate::mesh::{Color, ModelTemplate};
use crate::picking::intersect_floor;
use crate::placement::{PendingPlacement, PlacementEngine};
use crate::room::RoomBounds;
use crate::scene::{ItemId, SceneIndex};
use crate::selection::{PointerOutcome, SelectionEngine};
use crate::state::{Notice, ObservableState};
use crate::storage::{LayoutStore, PersistError};
use anyhow::Result;
use glam::{Vec2, Vec3};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

type UiHitTest = Box<dyn Fn(Vec2) -> bool>;
type Clock = Box<dyn Fn() -> u64>;

/// The editor core: owns the scene and every engine, and is the single entry point for host
/// input and UI commands.
pub struct RoomEditor<L: AssetLoader, S: LayoutStore> {
    config: EditorConfig,
    room: RoomBounds,
    scene: SceneIndex,
    state: ObservableState,
    placement: PlacementEngine,
    selection: SelectionEngine,
    appearance: AppearanceMutator,
    bindings: KeyBindings,
    loader: L,
    store: S,
    camera: Camera3D,
    viewport: Viewport,
    ui_hit_test: Option<UiHitTest>,
    clock: Clock,
}

impl<L: AssetLoader, S: LayoutStore> RoomEditor<L, S> {
    pub fn new(config: EditorConfig, loader: L, store: S) -> Self {
        let room = RoomBounds::from_config(&config.room);
        let placement = PlacementEngine::new(config.placement.clone());
        let selection = SelectionEngine::new(&config.highlight, None);
        Self {
            config,
            room,
            scene: SceneIndex::new(),
            state: ObservableState::new(),
            placement,
            selection,
            appearance: AppearanceMutator::new(),
            bindings: KeyBindings::default(),
            loader,
            store,
            camera: Camera3D::default(),
            viewport: Viewport::new(1280.0, 720.0),
            ui_hit_test: None,
            clock: Box::new(unix_millis),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn room(&self) -> &RoomBounds {
        &self.room
    }

    pub fn scene(&self) -> &SceneIndex {
        &self.scene
    }

    pub fn state(&self) -> &ObservableState {
        &self.state
    }

    /// For subscribing and setting the active item; selection and the item list stay read-only.
    pub fn state_mut(&mut self) -> &mut ObservableState {
        &mut self.state
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn selection(&self) -> &SelectionEngine {
        &self.selection
    }

    pub fn appearance(&self) -> &AppearanceMutator {
        &self.appearance
    }

    pub fn selected(&self) -> Option<ItemId> {
        self.selection.selected()
    }

    pub fn placement_busy(&self) -> bool {
        self.placement.is_busy()
    }

    pub fn set_camera(&mut self, camera: Camera3D) {
        self.camera = camera;
    }

    pub fn camera(&self) -> &Camera3D {
        &self.camera
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_camera_control(&mut self, control: Option<SharedCameraControl>) {
        self.selection.set_camera_control(control);
    }

    /// Predicate telling whether a viewport position lies over a UI surface. Pointer presses
    /// there never reach picking or placement.
    pub fn set_ui_hit_test(&mut self, hit_test: impl Fn(Vec2) -> bool + 'static) {
        self.ui_hit_test = Some(Box::new(hit_test));
    }

    /// Source of layout timestamps, in Unix epoch milliseconds.
    pub fn set_clock(&mut self, clock: impl Fn() -> u64 + 'static) {
        self.clock = Box::new(clock);
    }

    pub fn set_key_bindings(&mut self, bindings: KeyBindings) {
        self.bindings = bindings;
    }

    fn over_ui(&self, position: Vec2) -> bool {
        self.ui_hit_test.as_ref().is_some_and(|hit_test| hit_test(position))
    }

    fn ray(&self, position: Vec2) -> Option<(Vec3, Vec3)> {
        self.camera.screen_ray(position, self.viewport)
    }

    /// Floor-plane point under a viewport position.
    pub fn floor_point(&self, position: Vec2) -> Option<Vec3> {
        let (origin, dir) = self.ray(position)?;
        intersect_floor(origin, dir, self.room.floor_y)
    }

    pub fn set_active_item(&mut self, entry: Option<CatalogEntry>) {
        self.state.set_active_item(entry);
    }

    /// Routes one host event. Double clicks place the active item and therefore await the loader.
    pub async fn dispatch(&mut self, event: EditorEvent) -> bool {
        match event {
            EditorEvent::PointerDown { position, button } => {
                !matches!(self.handle_pointer_down(position, button), PointerOutcome::Ignored)
            }
            EditorEvent::PointerMove { position } => self.handle_pointer_move(position),
            EditorEvent::PointerUp { .. } => self.handle_pointer_up(),
            EditorEvent::DoubleClick { position } => self.place_active_item_at(position).await.is_some(),
            EditorEvent::Key { key } => self.handle_key(&key),
        }
    }

    pub fn handle_pointer_down(&mut self, position: Vec2, button: PointerButton) -> PointerOutcome {
        if button != PointerButton::Primary || self.over_ui(position) {
            return PointerOutcome::Ignored;
        }
        let ray = self.ray(position);
        self.selection.pointer_down(&mut self.scene, &mut self.state, &self.room, ray)
    }

    pub fn handle_pointer_move(&mut self, position: Vec2) -> bool {
        let ray = self.ray(position);
        self.selection.pointer_move(&mut self.scene, &self.room, ray)
    }

    pub fn handle_pointer_up(&mut self) -> bool {
        self.selection.pointer_up()
    }

    pub fn handle_key(&mut self, key: &str) -> bool {
        match self.bindings.action_for_key(key) {
            Some(EditorAction::DeleteSelected) => self.delete_selected(),
            Some(EditorAction::Deselect) => self.deselect(),
            Some(EditorAction::RotateSelected) => self.rotate_selected(),
            Some(EditorAction::DuplicateSelected) => self.duplicate_selected().is_some(),
            None => false,
        }
    }

    /// Places the active catalog item on the floor under `position`.
    pub async fn place_active_item_at(&mut self, position: Vec2) -> Option<ItemId> {
        let pending = self.begin_placement(position)?;
        let loaded = self.loader.load(&pending.entry.path).await;
        self.finish_placement(pending, loaded)
    }

    /// First placement phase for hosts that drive asset loading themselves.
    pub fn begin_placement(&mut self, position: Vec2) -> Option<PendingPlacement> {
        if self.over_ui(position) {
            return None;
        }
        let point = self.floor_point(position);
        self.placement.begin(&self.scene, &mut self.state, &self.room, point)
    }

    pub fn finish_placement(
        &mut self,
        pending: PendingPlacement,
        loaded: Result<Arc<ModelTemplate>>,
    ) -> Option<ItemId> {
        self.placement.finish(&mut self.scene, &mut self.state, &self.room, pending, loaded)
    }

    pub fn select(&mut self, id: ItemId) -> bool {
        self.selection.select(&mut self.scene, &mut self.state, id)
    }

    pub fn deselect(&mut self) -> bool {
        self.selection.deselect(&mut self.scene, &mut self.state)
    }

    pub fn delete_selected(&mut self) -> bool {
        let name = self.selected().and_then(|id| self.scene.display_name(id)).map(str::to_string);
        match self.selection.delete_selected(&mut self.scene, &mut self.state) {
            Some(id) => {
                self.appearance.forget(id);
                self.state.set_placed_items(self.scene.summaries());
                self.state.notice(Notice::ItemDeleted { name: name.unwrap_or_default() });
                true
            }
            None => {
                self.state.notice(Notice::NothingSelected);
                false
            }
        }
    }

    /// Removes every placed item. Pending placements started before the reset are discarded.
    pub fn reset_layout(&mut self) -> usize {
        let removed = self.clear_scene();
        self.state.notice(Notice::LayoutReset { removed });
        removed
    }

    fn clear_scene(&mut self) -> usize {
        self.selection.deselect(&mut self.scene, &mut self.state);
        let removed = self.scene.clear().len();
        self.appearance.clear();
        self.state.set_placed_items(Vec::new());
        removed
    }

    /// `hex` accepts `#rrggbb`, `rrggbb` and `#rgb`.
    pub fn apply_color(&mut self, hex: &str) -> bool {
        let color = match Color::from_hex_str(hex) {
            Ok(color) => color,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring color change");
                return false;
            }
        };
        self.with_selection(|editor, id| editor.appearance.apply_color(&mut editor.scene, id, color) > 0)
    }

    pub fn apply_material_preset(&mut self, preset: MaterialPreset) -> bool {
        self.with_selection(|editor, id| editor.appearance.apply_preset(&mut editor.scene, id, preset) > 0)
    }

    pub fn apply_opacity(&mut self, opacity: f32) -> bool {
        self.with_selection(|editor, id| editor.appearance.apply_opacity(&mut editor.scene, id, opacity) > 0)
    }

    pub fn reset_appearance(&mut self) -> bool {
        self.with_selection(|editor, id| editor.appearance.reset(&mut editor.scene, id) > 0)
    }

    /// Deep copy of the selection, offset on the floor and selected in its place.
    pub fn duplicate_selected(&mut self) -> Option<ItemId> {
        let Some(source) = self.selected() else {
            self.state.notice(Notice::NothingSelected);
            return None;
        };
        let name = format!("{} (copy)", self.scene.display_name(source)?);
        let mut transform = self.scene.transform(source)?;
        let offset = self.config.placement.duplicate_offset;
        transform.position.x += offset;
        transform.position.z += offset;
        let copy = self.appearance.duplicate(&mut self.scene, source, name.clone(), transform)?;
        if let Some(half_extents) = self.scene.footprint_half_extents(copy) {
            let clamped = self.room.clamp(Vec2::new(transform.position.x, transform.position.z), half_extents);
            transform.position.x = clamped.x;
            transform.position.z = clamped.y;
            self.scene.set_transform(copy, transform);
        }
        self.selection.select(&mut self.scene, &mut self.state, copy);
        self.state.set_placed_items(self.scene.summaries());
        self.state.notice(Notice::ItemPlaced { name });
        Some(copy)
    }

    pub fn rotate_selected(&mut self) -> bool {
        let step = self.config.placement.rotate_step_radians();
        if self.selected().is_none() {
            self.state.notice(Notice::NothingSelected);
            return false;
        }
        self.selection.rotate_selected(&mut self.scene, &self.room, step)
    }

    fn with_selection(&mut self, apply: impl FnOnce(&mut Self, ItemId) -> bool) -> bool {
        match self.selected() {
            Some(id) => {
                let changed = apply(self, id);
                if changed {
                    self.selection.refresh_highlight(&mut self.scene);
                }
                changed
            }
            None => {
                self.state.notice(Notice::NothingSelected);
                false
            }
        }
    }

    /// Current layout as a document, timestamped by the editor clock.
    pub fn layout_document(&self) -> LayoutDocument {
        serialize_all(&self.scene, &self.appearance, &self.config.persistence.version, (self.clock)())
    }

    pub fn save(&mut self) -> bool {
        let document = self.layout_document();
        let items = document.objects.len();
        let key = &self.config.persistence.storage_key;
        let result = document.to_json_string().and_then(|json| self.store.write(key, &json));
        match result {
            Ok(()) => {
                self.state.notice(Notice::Saved { items });
                true
            }
            Err(err) => {
                self.state.notice(Notice::SaveFailed { reason: err.to_string() });
                false
            }
        }
    }

    pub fn has_saved_layout(&self) -> bool {
        self.read_saved().ok().flatten().is_some()
    }

    fn read_saved(&self) -> Result<Option<LayoutDocument>, PersistError> {
        match self.store.read(&self.config.persistence.storage_key)? {
            Some(text) => LayoutDocument::from_json_str(&text).map(Some),
            None => Ok(None),
        }
    }

    /// Replaces the scene with the saved layout. A corrupt entry counts as no saved layout.
    pub async fn load(&mut self) -> bool {
        let document = match self.read_saved() {
            Ok(Some(document)) => document,
            Ok(None) => {
                self.state.notice(Notice::NoSavedLayout);
                return false;
            }
            Err(PersistError::Decode(err)) => {
                tracing::warn!(error = %err, "saved layout is corrupt");
                self.state.notice(Notice::NoSavedLayout);
                return false;
            }
            Err(err) => {
                self.state.notice(Notice::LoadFailed { reason: err.to_string() });
                return false;
            }
        };
        self.load_document(&document).await;
        true
    }

    /// Clears the scene and recreates every object of `document`. Returns the restored items.
    pub async fn load_document(&mut self, document: &LayoutDocument) -> Vec<ItemId> {
        self.clear_scene();
        self.state.set_loading(true);
        let restored = deserialize_all(document, &self.loader, &mut self.scene, &mut self.appearance).await;
        self.state.set_loading(self.placement.is_busy());
        self.state.set_placed_items(self.scene.summaries());
        tracing::info!(items = restored.len(), version = %document.version, "layout loaded");
        self.state.notice(Notice::Loaded { items: restored.len() });
        restored
    }

    pub fn clear_saved(&mut self) -> bool {
        match self.store.remove(&self.config.persistence.storage_key) {
            Ok(_) => {
                self.state.notice(Notice::Cleared);
                true
            }
            Err(err) => {
                self.state.notice(Notice::ClearFailed { reason: err.to_string() });
                false
            }
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|elapsed| elapsed.as_millis() as u64).unwrap_or(0)
}
