use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    #[serde(default = "RoomConfig::default_width")]
    pub width: f32,
    #[serde(default = "RoomConfig::default_depth")]
    pub depth: f32,
    #[serde(default)]
    pub floor_y: f32,
    /// Distance kept between a dragged item's footprint and the walls.
    #[serde(default = "RoomConfig::default_margin")]
    pub wall_margin: f32,
    /// Inset applied to the coarse placement check.
    #[serde(default = "RoomConfig::default_margin")]
    pub placement_margin: f32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            width: Self::default_width(),
            depth: Self::default_depth(),
            floor_y: 0.0,
            wall_margin: Self::default_margin(),
            placement_margin: Self::default_margin(),
        }
    }
}

impl RoomConfig {
    const fn default_width() -> f32 {
        10.0
    }

    const fn default_depth() -> f32 {
        10.0
    }

    const fn default_margin() -> f32 {
        0.5
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacementConfig {
    #[serde(default = "PlacementConfig::default_duplicate_offset")]
    pub duplicate_offset: f32,
    /// Relative height deviation tolerated before a placed model is rescaled.
    #[serde(default = "PlacementConfig::default_scale_tolerance")]
    pub scale_tolerance: f32,
    #[serde(default = "PlacementConfig::default_min_scale_multiplier")]
    pub min_scale_multiplier: f32,
    #[serde(default = "PlacementConfig::default_max_scale_multiplier")]
    pub max_scale_multiplier: f32,
    #[serde(default = "PlacementConfig::default_rotate_step_degrees")]
    pub rotate_step_degrees: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            duplicate_offset: Self::default_duplicate_offset(),
            scale_tolerance: Self::default_scale_tolerance(),
            min_scale_multiplier: Self::default_min_scale_multiplier(),
            max_scale_multiplier: Self::default_max_scale_multiplier(),
            rotate_step_degrees: Self::default_rotate_step_degrees(),
        }
    }
}

impl PlacementConfig {
    const fn default_duplicate_offset() -> f32 {
        0.5
    }

    const fn default_scale_tolerance() -> f32 {
        0.35
    }

    const fn default_min_scale_multiplier() -> f32 {
        0.05
    }

    const fn default_max_scale_multiplier() -> f32 {
        20.0
    }

    const fn default_rotate_step_degrees() -> f32 {
        45.0
    }

    pub fn rotate_step_radians(&self) -> f32 {
        self.rotate_step_degrees.to_radians()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HighlightConfig {
    #[serde(default = "HighlightConfig::default_emissive_color")]
    pub emissive_color: [f32; 3],
    #[serde(default = "HighlightConfig::default_emissive_intensity")]
    pub emissive_intensity: f32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            emissive_color: Self::default_emissive_color(),
            emissive_intensity: Self::default_emissive_intensity(),
        }
    }
}

impl HighlightConfig {
    const fn default_emissive_color() -> [f32; 3] {
        [0.2, 0.45, 1.0]
    }

    const fn default_emissive_intensity() -> f32 {
        0.6
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "PersistenceConfig::default_storage_key")]
    pub storage_key: String,
    #[serde(default = "PersistenceConfig::default_version")]
    pub version: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { storage_key: Self::default_storage_key(), version: Self::default_version() }
    }
}

impl PersistenceConfig {
    fn default_storage_key() -> String {
        "roomcraft.layout".to_string()
    }

    fn default_version() -> String {
        "1.0".to_string()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EditorConfig {
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub highlight: HighlightConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl EditorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = ?err, "config load failed, falling back to defaults");
                Self::default()
            }
        }
    }
}
