use glam::Vec2;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

/// Input delivered by the host, in viewport pixels with the origin at the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    PointerDown { position: Vec2, button: PointerButton },
    PointerMove { position: Vec2 },
    PointerUp { position: Vec2, button: PointerButton },
    DoubleClick { position: Vec2 },
    /// Key name as reported by the host, e.g. `"Delete"`, `"Escape"` or `"r"`.
    Key { key: String },
}

impl EditorEvent {
    pub fn position(&self) -> Option<Vec2> {
        match self {
            EditorEvent::PointerDown { position, .. }
            | EditorEvent::PointerMove { position }
            | EditorEvent::PointerUp { position, .. }
            | EditorEvent::DoubleClick { position } => Some(*position),
            EditorEvent::Key { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorAction {
    DeleteSelected,
    Deselect,
    RotateSelected,
    DuplicateSelected,
}

impl EditorAction {
    fn from_str(value: &str) -> Option<Self> {
        match value {
            "delete_selected" | "delete" => Some(Self::DeleteSelected),
            "deselect" => Some(Self::Deselect),
            "rotate_selected" | "rotate" => Some(Self::RotateSelected),
            "duplicate_selected" | "duplicate" => Some(Self::DuplicateSelected),
            _ => None,
        }
    }
}

/// Maps host key names to editor actions. Key names compare case-insensitively.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    key_to_action: HashMap<String, EditorAction>,
}

impl KeyBindings {
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<KeyBindingsFile>(&contents) {
                Ok(config) => Self::with_overrides(config.into_overrides(&path.display().to_string())),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse key bindings, using defaults"
                    );
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read key bindings, using defaults");
                Self::default()
            }
        }
    }

    fn with_overrides(overrides: HashMap<EditorAction, Vec<String>>) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in overrides {
            if keys.is_empty() {
                continue;
            }
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<EditorAction, Vec<String>> {
        use EditorAction::*;
        let mut map = HashMap::new();
        map.insert(DeleteSelected, vec![normalize_key("Delete"), normalize_key("Backspace")]);
        map.insert(Deselect, vec![normalize_key("Escape")]);
        map.insert(RotateSelected, vec![normalize_key("r")]);
        map.insert(DuplicateSelected, vec![normalize_key("d")]);
        map
    }

    fn from_action_map(action_map: HashMap<EditorAction, Vec<String>>) -> Self {
        let mut key_to_action = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_action.insert(key, action);
            }
        }
        Self { key_to_action }
    }

    pub fn action_for_key(&self, key: &str) -> Option<EditorAction> {
        self.key_to_action.get(&normalize_key(key)).copied()
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

fn normalize_key(raw: &str) -> String {
    match raw.trim().to_lowercase().as_str() {
        "del" => "delete".to_string(),
        "esc" => "escape".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct KeyBindingsFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl KeyBindingsFile {
    fn into_overrides(self, origin: &str) -> HashMap<EditorAction, Vec<String>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let Some(action) = EditorAction::from_str(&action_name.trim().to_lowercase()) else {
                tracing::warn!(origin, action = %action_name, "unknown editor action, ignoring");
                continue;
            };
            let parsed: Vec<String> =
                keys.iter().map(|key| normalize_key(key)).filter(|key| !key.is_empty()).collect();
            if parsed.is_empty() {
                tracing::warn!(origin, action = %action_name, "action has no valid keys, keeping defaults");
                continue;
            }
            overrides.insert(action, parsed);
        }
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_bindings_cover_editor_shortcuts() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.action_for_key("Delete"), Some(EditorAction::DeleteSelected));
        assert_eq!(bindings.action_for_key("Backspace"), Some(EditorAction::DeleteSelected));
        assert_eq!(bindings.action_for_key("Esc"), Some(EditorAction::Deselect));
        assert_eq!(bindings.action_for_key("R"), Some(EditorAction::RotateSelected));
        assert_eq!(bindings.action_for_key("x"), None);
    }

    #[test]
    fn overrides_replace_only_named_actions() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"bindings":{{"rotate":["q"],"teleport":["t"],"deselect":[]}}}}"#).expect("write");
        let bindings = KeyBindings::load_or_default(file.path());
        assert_eq!(bindings.action_for_key("q"), Some(EditorAction::RotateSelected));
        assert_eq!(bindings.action_for_key("r"), None);
        assert_eq!(bindings.action_for_key("Escape"), Some(EditorAction::Deselect));
        assert_eq!(bindings.action_for_key("t"), None);
    }

    #[test]
    fn key_events_have_no_position() {
        assert_eq!(EditorEvent::Key { key: "r".to_string() }.position(), None);
        let position = Vec2::new(3.0, 4.0);
        assert_eq!(EditorEvent::DoubleClick { position }.position(), Some(position));
    }
}
