//! Layout documents: the persisted snapshot of every placed item.
//!
//! Catalog linkage is written twice, flat (`furnitureType`, `furniturePath`, `furnitureId`) and
//! nested under `furnitureData`, so documents stay readable by older builds. Reading prefers the
//! nested form.

use crate::appearance::AppearanceMutator;
use crate::assets::AssetLoader;
use crate::catalog::FurnitureKind;
use crate::mesh::{Color, MaterialDelta, ModelTemplate};
use crate::scene::{CatalogLink, ItemId, ItemSpawn, ItemTransform, SceneIndex};
use crate::storage::PersistError;
use glam::Vec3;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDocument {
    pub version: String,
    /// Unix epoch milliseconds.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub objects: Vec<LayoutObject>,
}

impl LayoutDocument {
    pub fn from_json_str(text: &str) -> Result<Self, PersistError> {
        serde_json::from_str(text).map_err(PersistError::Decode)
    }

    pub fn to_json_string(&self) -> Result<String, PersistError> {
        serde_json::to_string(self).map_err(PersistError::Encode)
    }

    /// Problems that would make items load incorrectly, one line per problem.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (index, object) in self.objects.iter().enumerate() {
            let label =
                if object.name.is_empty() { format!("#{index}") } else { format!("#{index} '{}'", object.name) };
            if !object.transform().is_finite() {
                issues.push(format!("{label}: non-finite transform"));
            }
            if object.asset_path().is_none() && object.catalog_id().is_none() {
                issues.push(format!("{label}: no catalog linkage"));
            }
            for delta in object.material_mods.iter().flatten() {
                if delta.child_name.is_empty() {
                    issues.push(format!("{label}: material override without childName"));
                }
            }
        }
        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3Data {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Vec3Data {
    fn one() -> Self {
        Vec3::ONE.into()
    }
}

impl Default for Vec3Data {
    fn default() -> Self {
        Vec3::ZERO.into()
    }
}

impl From<Vec3> for Vec3Data {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Data> for Vec3 {
    fn from(v: Vec3Data) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FurnitureData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, deserialize_with = "loose_id")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FurnitureKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialMod {
    pub child_name: String,
    #[serde(default, with = "hex_color")]
    pub color: Option<Color>,
    #[serde(default)]
    pub metalness: Option<f32>,
    #[serde(default)]
    pub roughness: Option<f32>,
    #[serde(default)]
    pub opacity: Option<f32>,
}

impl From<&MaterialDelta> for MaterialMod {
    fn from(delta: &MaterialDelta) -> Self {
        Self {
            child_name: delta.child_name.clone(),
            color: delta.color,
            metalness: delta.metalness,
            roughness: delta.roughness,
            opacity: delta.opacity,
        }
    }
}

impl From<&MaterialMod> for MaterialDelta {
    fn from(stored: &MaterialMod) -> Self {
        Self {
            child_name: stored.child_name.clone(),
            color: stored.color,
            metalness: stored.metalness,
            roughness: stored.roughness,
            opacity: stored.opacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutObject {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub furniture_type: Option<String>,
    #[serde(default)]
    pub furniture_path: Option<String>,
    #[serde(default, deserialize_with = "loose_id")]
    pub furniture_id: Option<String>,
    #[serde(default)]
    pub furniture_data: Option<FurnitureData>,
    #[serde(default)]
    pub position: Vec3Data,
    #[serde(default)]
    pub rotation: Vec3Data,
    #[serde(default = "Vec3Data::one")]
    pub scale: Vec3Data,
    /// `null` until the user edits the item's appearance.
    #[serde(default)]
    pub material_mods: Option<Vec<MaterialMod>>,
}

impl LayoutObject {
    pub fn transform(&self) -> ItemTransform {
        ItemTransform { position: self.position.into(), rotation: self.rotation.into(), scale: self.scale.into() }
    }

    fn nested(&self) -> Option<&FurnitureData> {
        self.furniture_data.as_ref()
    }

    pub fn asset_path(&self) -> Option<&str> {
        self.nested()
            .and_then(|data| data.path.as_deref())
            .or(self.furniture_path.as_deref())
            .filter(|path| !path.is_empty())
    }

    pub fn catalog_id(&self) -> Option<&str> {
        self.nested().and_then(|data| data.id.as_deref()).or(self.furniture_id.as_deref())
    }

    pub fn catalog_name(&self) -> &str {
        self.nested()
            .map(|data| data.name.as_str())
            .filter(|name| !name.is_empty())
            .or(self.furniture_type.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(self.name.as_str())
    }

    pub fn catalog_link(&self) -> CatalogLink {
        let name = self.catalog_name().to_string();
        let kind = self.nested().and_then(|data| data.kind).unwrap_or_else(|| FurnitureKind::classify(&name));
        CatalogLink {
            id: self.catalog_id().map(str::to_string),
            path: self.asset_path().map(str::to_string),
            category: self.nested().and_then(|data| data.category.clone()),
            name,
            kind,
        }
    }

    pub fn deltas(&self) -> Vec<MaterialDelta> {
        self.material_mods.iter().flatten().map(MaterialDelta::from).collect()
    }
}

/// Snapshot of every placed item in placement order.
pub fn serialize_all(
    scene: &SceneIndex,
    appearance: &AppearanceMutator,
    version: &str,
    timestamp: u64,
) -> LayoutDocument {
    let objects = scene
        .ids()
        .iter()
        .filter_map(|id| {
            let item = scene.item(*id)?;
            let catalog = scene.catalog(*id)?;
            let transform = scene.transform(*id)?;
            let deltas = appearance.deltas(scene, *id);
            let material_mods =
                if deltas.is_empty() { None } else { Some(deltas.iter().map(MaterialMod::from).collect()) };
            Some(LayoutObject {
                name: item.name.clone(),
                furniture_type: Some(catalog.name.clone()),
                furniture_path: catalog.path.clone(),
                furniture_id: catalog.id.clone(),
                furniture_data: Some(FurnitureData {
                    name: catalog.name.clone(),
                    path: catalog.path.clone(),
                    id: catalog.id.clone(),
                    category: catalog.category.clone(),
                    kind: Some(catalog.kind),
                }),
                position: transform.position.into(),
                rotation: transform.rotation.into(),
                scale: transform.scale.into(),
                material_mods,
            })
        })
        .collect();
    LayoutDocument { version: version.to_string(), timestamp, objects }
}

/// Recreates every object of `document` in `scene`. Objects whose model cannot be loaded get a
/// placeholder; objects with a non-finite transform are skipped. Transforms are restored exactly.
pub async fn deserialize_all<L: AssetLoader>(
    document: &LayoutDocument,
    loader: &L,
    scene: &mut SceneIndex,
    appearance: &mut AppearanceMutator,
) -> Vec<ItemId> {
    let mut restored = Vec::with_capacity(document.objects.len());
    for (index, object) in document.objects.iter().enumerate() {
        let transform = object.transform();
        if !transform.is_finite() {
            tracing::warn!(index, name = %object.name, "skipping layout object with non-finite transform");
            continue;
        }
        let catalog = object.catalog_link();
        let loaded = match object.asset_path() {
            Some(path) => match loader.load(path).await {
                Ok(template) if template.is_placeable() => Some(template),
                Ok(_) => {
                    tracing::warn!(path, "model has no usable geometry, using placeholder");
                    None
                }
                Err(err) => {
                    tracing::warn!(path, error = %err, "model failed to load, using placeholder");
                    None
                }
            },
            None => {
                tracing::warn!(index, name = %object.name, "layout object has no asset path, using placeholder");
                None
            }
        };
        let placeholder = loaded.is_none();
        let template = loaded.unwrap_or_else(|| {
            let seed = catalog.id.clone().unwrap_or_else(|| catalog.name.clone());
            Arc::new(ModelTemplate::placeholder(catalog.kind, &seed))
        });

        let id = scene.allocate_id();
        let name = if object.name.is_empty() { catalog.name.clone() } else { object.name.clone() };
        scene.spawn_item(ItemSpawn { id, name, catalog, transform, template: &template, placeholder });
        let unmatched = appearance.apply_deltas(scene, id, &object.deltas());
        if !unmatched.is_empty() {
            tracing::debug!(%id, count = unmatched.len(), "retaining unmatched material overrides");
            scene.set_retained_deltas(id, unmatched);
        }
        restored.push(id);
    }
    restored
}

fn loose_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LooseId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<LooseId>::deserialize(deserializer)?.map(|id| match id {
        LooseId::Text(text) => text,
        LooseId::Number(number) => number.to_string(),
    }))
}

/// `"#rrggbb"` on output; accepts hex strings or legacy packed integers on input.
mod hex_color {
    use crate::mesh::Color;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(color: &Option<Color>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match color {
            Some(color) => serializer.serialize_str(&color.to_hex_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Color>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Packed(u32),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Packed(value)) => Ok(Some(Color::from_hex(value))),
            Some(Raw::Text(text)) => Color::from_hex_str(&text).map(Some).map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r##"{
        "version": "1.0",
        "timestamp": 1700000000000,
        "objects": [
            {
                "name": "Old Chair",
                "furnitureType": "Chair",
                "furniturePath": "models/chair.glb",
                "furnitureId": 7,
                "position": {"x": 1.5, "y": 0, "z": -2},
                "rotation": {"x": 0, "y": 0.5, "z": 0},
                "scale": {"x": 1, "y": 1, "z": 1},
                "materialMods": [{"childName": "seat", "color": 16711680, "metalness": 0.1}]
            },
            {
                "name": "Sofa",
                "furniturePath": "legacy/sofa.glb",
                "furnitureData": {"name": "Sofa", "path": "models/sofa.glb", "id": "sofa-01"},
                "materialMods": null
            }
        ]
    }"##;

    #[test]
    fn legacy_fields_are_understood() {
        let doc = LayoutDocument::from_json_str(LEGACY).expect("parse");
        let chair = &doc.objects[0];
        assert_eq!(chair.catalog_id(), Some("7"));
        assert_eq!(chair.asset_path(), Some("models/chair.glb"));
        assert_eq!(chair.catalog_link().kind, FurnitureKind::Seat);
        let mods = chair.material_mods.as_ref().expect("mods");
        assert_eq!(mods[0].color, Some(Color::from_hex(0xff0000)));
        assert_eq!(mods[0].roughness, None);

        let sofa = &doc.objects[1];
        assert_eq!(sofa.asset_path(), Some("models/sofa.glb"));
        assert_eq!(sofa.scale, Vec3Data::one());
        assert!(sofa.material_mods.is_none());
        assert!(doc.issues().is_empty());
    }

    #[test]
    fn colors_are_written_as_hex_and_mods_as_null() {
        let object = LayoutObject {
            name: "Lamp".to_string(),
            furniture_type: None,
            furniture_path: None,
            furniture_id: None,
            furniture_data: None,
            position: Vec3Data::default(),
            rotation: Vec3Data::default(),
            scale: Vec3Data::one(),
            material_mods: None,
        };
        let json = serde_json::to_value(&object).expect("encode");
        assert!(json["materialMods"].is_null());

        let stored = MaterialMod {
            child_name: "shade".to_string(),
            color: Some(Color::from_hex(0x12ab34)),
            metalness: None,
            roughness: Some(0.5),
            opacity: Some(1.0),
        };
        let json = serde_json::to_value(&stored).expect("encode");
        assert_eq!(json["color"], "#12ab34");
        assert_eq!(json["childName"], "shade");
    }

    #[test]
    fn issues_flag_broken_objects() {
        let text = r#"{
            "version": "1.0",
            "objects": [
                {"name": "Ghost"},
                {"name": "Bad", "furnitureId": "x", "materialMods": [{"childName": ""}]}
            ]
        }"#;
        let doc = LayoutDocument::from_json_str(text).expect("parse");
        let issues = doc.issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("no catalog linkage"));
        assert!(issues[1].contains("without childName"));
    }

    #[test]
    fn corrupt_document_is_a_decode_error() {
        assert!(matches!(LayoutDocument::from_json_str("{not json"), Err(PersistError::Decode(_))));
    }
}
