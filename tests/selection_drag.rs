use glam::{Vec2, Vec3};
use roomcraft::assets::MemoryLoader;
use roomcraft::camera::{Camera3D, OrbitControls, SharedCameraControl};
use roomcraft::catalog::Catalog;
use roomcraft::config::EditorConfig;
use roomcraft::input::{EditorEvent, PointerButton};
use roomcraft::scene::ItemId;
use roomcraft::selection::{PointerOutcome, SelectionPhase};
use roomcraft::state::Notice;
use roomcraft::storage::MemoryStore;
use roomcraft::RoomEditor;
use std::cell::RefCell;
use std::rc::Rc;

type Editor = RoomEditor<MemoryLoader, MemoryStore>;

fn editor() -> (Editor, Rc<RefCell<OrbitControls>>) {
    let mut editor = RoomEditor::new(EditorConfig::default(), MemoryLoader::new(), MemoryStore::new());
    editor.set_camera(Camera3D::new(Vec3::new(0.0, 400.0, 0.5), Vec3::ZERO, 60.0_f32.to_radians(), 0.1, 1000.0));
    let controls = Rc::new(RefCell::new(OrbitControls::new(Vec3::ZERO, 12.0)));
    let shared: SharedCameraControl = controls.clone();
    editor.set_camera_control(Some(shared));
    (editor, controls)
}

fn screen(editor: &Editor, x: f32, z: f32) -> Vec2 {
    editor.camera().project_point(Vec3::new(x, 0.0, z), editor.viewport()).expect("point projects")
}

fn place(editor: &mut Editor, id: &str, x: f32, z: f32) -> ItemId {
    editor.set_active_item(Catalog::builtin().get(id).cloned());
    let at = screen(editor, x, z);
    pollster::block_on(editor.place_active_item_at(at)).expect("placed")
}

fn press(editor: &mut Editor, x: f32, z: f32) -> PointerOutcome {
    let at = screen(editor, x, z);
    editor.handle_pointer_down(at, PointerButton::Primary)
}

#[test]
fn dragging_a_chair_past_the_wall_clamps_to_its_footprint() {
    let (mut editor, controls) = editor();
    let chair = place(&mut editor, "chair-01", 0.0, 0.0);

    assert_eq!(press(&mut editor, 0.0, 0.0), PointerOutcome::Selected(chair));
    assert_eq!(press(&mut editor, 0.0, 0.0), PointerOutcome::DragStarted(chair));
    assert!(!controls.borrow().enabled());

    let far = screen(&editor, 100.0, 100.0);
    assert!(editor.handle_pointer_move(far));
    assert!(editor.handle_pointer_up());
    assert!(controls.borrow().enabled());

    let half = editor.scene().footprint_half_extents(chair).expect("footprint");
    let position = editor.scene().transform(chair).expect("transform").position;
    assert!((position.x - (5.0 - 0.5 - half.x)).abs() < 1e-4, "x = {}", position.x);
    assert!((position.z - (5.0 - 0.5 - half.y)).abs() < 1e-4, "z = {}", position.z);
    assert!(position.y.abs() < 1e-4);
    assert_eq!(editor.selection().phase(), SelectionPhase::Selected);
}

#[test]
fn every_drag_ends_inside_the_room() {
    let (mut editor, _controls) = editor();
    let sofa = place(&mut editor, "sofa-01", 0.0, 0.0);
    editor.select(sofa);
    editor.rotate_selected();

    let targets = [(-50.0, 0.0), (3.9, -80.0), (0.3, 0.2), (60.0, 60.0), (-4.9, 4.9)];
    for (x, z) in targets {
        let current = editor.scene().transform(sofa).expect("transform").position;
        assert_eq!(press(&mut editor, current.x, current.z), PointerOutcome::DragStarted(sofa));
        let target = screen(&editor, x, z);
        editor.handle_pointer_move(target);
        editor.handle_pointer_up();
        let position = editor.scene().transform(sofa).expect("transform").position;
        let half = editor.scene().footprint_half_extents(sofa).expect("footprint");
        assert!(
            editor.room().contains_footprint(Vec2::new(position.x, position.z), half, 1e-4),
            "escaped after dragging toward ({x}, {z}): {position}"
        );
    }
}

#[test]
fn at_most_one_item_is_selected() {
    let (mut editor, _controls) = editor();
    let a = place(&mut editor, "chair-01", -3.0, 0.0);
    let b = place(&mut editor, "table-01", 0.0, 0.0);
    let c = place(&mut editor, "shelf-01", 3.0, 0.0);
    let sequence = [(-3.0, 0.0), (0.0, 0.0), (3.0, 0.0), (0.0, 3.5), (0.0, 0.0), (-3.0, 0.0), (3.0, 0.0)];
    let mut selections = Vec::new();
    for (x, z) in sequence {
        press(&mut editor, x, z);
        editor.handle_pointer_up();
        let flagged: Vec<ItemId> =
            [a, b, c].into_iter().filter(|id| editor.scene().is_selected(*id)).collect();
        assert!(flagged.len() <= 1);
        assert_eq!(flagged.first().copied(), editor.state().selected());
        selections.push(editor.state().selected());
    }
    assert_eq!(selections, vec![Some(a), Some(b), Some(c), None, Some(b), Some(a), Some(c)]);
}

#[test]
fn switching_selection_restores_previous_highlight() {
    let (mut editor, _controls) = editor();
    let a = place(&mut editor, "chair-01", -2.0, 0.0);
    let b = place(&mut editor, "chair-01", 2.0, 0.0);
    let a_parts = editor.scene().sub_mesh_entities(a);
    let before: Vec<_> = a_parts.iter().map(|e| editor.scene().surface(*e).and_then(|s| s.emissive)).collect();

    press(&mut editor, -2.0, 0.0);
    let tinted: Vec<_> = a_parts.iter().map(|e| editor.scene().surface(*e).and_then(|s| s.emissive)).collect();
    assert_ne!(before, tinted);

    assert_eq!(press(&mut editor, 2.0, 0.0), PointerOutcome::Selected(b));
    let after: Vec<_> = a_parts.iter().map(|e| editor.scene().surface(*e).and_then(|s| s.emissive)).collect();
    assert_eq!(before, after);
    assert!(!editor.scene().is_selected(a));
}

#[test]
fn deleting_the_selection_updates_state_once() {
    let (mut editor, _controls) = editor();
    place(&mut editor, "chair-01", -2.0, 0.0);
    let target = place(&mut editor, "desk-01", 2.0, 0.0);
    editor.select(target);
    let count = editor.state().placed_items().len();

    assert!(editor.handle_key("Delete"));
    assert_eq!(editor.state().selected(), None);
    assert_eq!(editor.state().placed_items().len(), count - 1);
    assert!(!editor.scene().contains(target));
    assert_eq!(editor.state().last_notice(), Some(&Notice::ItemDeleted { name: "Desk".to_string() }));

    assert!(!editor.delete_selected());
    assert_eq!(editor.state().placed_items().len(), count - 1);
    assert_eq!(editor.state().last_notice(), Some(&Notice::NothingSelected));
}

#[test]
fn camera_resumes_when_a_drag_is_interrupted() {
    let (mut editor, controls) = editor();
    let chair = place(&mut editor, "chair-01", 1.0, 1.0);
    press(&mut editor, 1.0, 1.0);
    press(&mut editor, 1.0, 1.0);
    assert!(editor.selection().is_dragging());

    assert!(editor.handle_key("Escape"));
    assert!(controls.borrow().enabled());
    assert_eq!(editor.selection().phase(), SelectionPhase::Idle);
    assert!(!editor.handle_pointer_move(screen(&editor, 2.0, 2.0)));

    editor.select(chair);
    press(&mut editor, 1.0, 1.0);
    assert!(!controls.borrow().enabled());
    assert!(editor.delete_selected());
    assert!(controls.borrow().enabled());
}

#[test]
fn rotate_shortcut_turns_selection_by_45_degrees() {
    let (mut editor, _controls) = editor();
    let bed = place(&mut editor, "bed-01", 0.0, 0.0);
    assert!(!editor.handle_key("r"));
    editor.select(bed);
    let box_entity = editor.selection().selection_box().expect("selection box");
    let before = editor.scene().selection_box(box_entity).expect("box").bounds;

    assert!(pollster::block_on(editor.dispatch(EditorEvent::Key { key: "R".to_string() })));
    let rotation = editor.scene().transform(bed).expect("transform").rotation;
    assert!((rotation.y - 45.0_f32.to_radians()).abs() < 1e-5);
    let after = editor.scene().selection_box(box_entity).expect("box").bounds;
    assert_ne!(before, after);
    assert_eq!(editor.scene().world_bounds(bed), Some(after));
}

#[test]
fn secondary_button_and_ui_presses_do_not_pick() {
    let (mut editor, _controls) = editor();
    place(&mut editor, "chair-01", 0.0, 0.0);
    let at = screen(&editor, 0.0, 0.0);
    assert_eq!(editor.handle_pointer_down(at, PointerButton::Secondary), PointerOutcome::Ignored);
    editor.set_ui_hit_test(|_| true);
    assert_eq!(editor.handle_pointer_down(at, PointerButton::Primary), PointerOutcome::Ignored);
    assert_eq!(editor.state().selected(), None);
}
