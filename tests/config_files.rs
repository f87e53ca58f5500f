use roomcraft::config::EditorConfig;
use roomcraft::input::{EditorAction, KeyBindings};

#[test]
fn shipped_editor_config_matches_defaults() {
    let shipped = EditorConfig::load("config/editor.json").expect("config/editor.json parses");
    let defaults = EditorConfig::default();
    assert_eq!(shipped.room.width, defaults.room.width);
    assert_eq!(shipped.room.wall_margin, defaults.room.wall_margin);
    assert_eq!(shipped.placement.rotate_step_degrees, defaults.placement.rotate_step_degrees);
    assert_eq!(shipped.highlight.emissive_color, defaults.highlight.emissive_color);
    assert_eq!(shipped.persistence.storage_key, defaults.persistence.storage_key);
}

#[test]
fn shipped_key_bindings_add_a_rotate_alias() {
    let bindings = KeyBindings::load_or_default("config/input.json");
    assert_eq!(bindings.action_for_key("Q"), Some(EditorAction::RotateSelected));
    assert_eq!(bindings.action_for_key("r"), Some(EditorAction::RotateSelected));
    assert_eq!(bindings.action_for_key("Backspace"), Some(EditorAction::DeleteSelected));
    assert_eq!(bindings.action_for_key("x"), None);
}
