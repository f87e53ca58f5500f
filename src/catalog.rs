use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Coarse furniture classification. Drives the placeholder shape and the target height used when
/// normalizing freshly placed models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FurnitureKind {
    Seat,
    Table,
    Sofa,
    Bed,
    Storage,
    Generic,
}

impl FurnitureKind {
    pub const ALL: [FurnitureKind; 6] = [
        FurnitureKind::Seat,
        FurnitureKind::Table,
        FurnitureKind::Sofa,
        FurnitureKind::Bed,
        FurnitureKind::Storage,
        FurnitureKind::Generic,
    ];

    /// Legacy classification from a free-text display name. Only used for entries and saved
    /// layouts that predate the explicit `kind` field.
    pub fn classify(name: &str) -> Self {
        const VOCABULARY: &[(FurnitureKind, &[&str])] = &[
            (FurnitureKind::Sofa, &["sofa", "couch", "loveseat"]),
            (FurnitureKind::Table, &["table", "desk"]),
            (FurnitureKind::Seat, &["chair", "stool", "seat", "bench"]),
            (FurnitureKind::Bed, &["bed"]),
            (FurnitureKind::Storage, &["shelf", "cabinet", "wardrobe", "dresser", "drawer", "storage"]),
        ];
        let lowered = name.to_lowercase();
        VOCABULARY
            .iter()
            .find(|(_, words)| words.iter().any(|word| lowered.contains(word)))
            .map(|(kind, _)| *kind)
            .unwrap_or(FurnitureKind::Generic)
    }

    /// Expected height in meters of a typical piece of this kind.
    pub fn target_height(self) -> f32 {
        match self {
            FurnitureKind::Seat => 0.9,
            FurnitureKind::Table => 0.75,
            FurnitureKind::Sofa => 0.85,
            FurnitureKind::Bed => 0.8,
            FurnitureKind::Storage => 1.8,
            FurnitureKind::Generic => 0.8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FurnitureKind::Seat => "Seat",
            FurnitureKind::Table => "Table",
            FurnitureKind::Sofa => "Sofa",
            FurnitureKind::Bed => "Bed",
            FurnitureKind::Storage => "Storage",
            FurnitureKind::Generic => "Generic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FurnitureKind>,
}

impl CatalogEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), name: name.into(), path: path.into(), category: category.into(), kind: None }
    }

    pub fn with_kind(mut self, kind: FurnitureKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Explicit kind when present, otherwise the name-based migration.
    pub fn resolved_kind(&self) -> FurnitureKind {
        self.kind.unwrap_or_else(|| FurnitureKind::classify(&self.name))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub items: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(items: Vec<CatalogEntry>) -> Self {
        let mut catalog = Self { items };
        catalog.migrate_kinds();
        catalog
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            CatalogEntry::new("chair-01", "Dining Chair", "models/chair.glb", "Seating").with_kind(FurnitureKind::Seat),
            CatalogEntry::new("armchair-01", "Armchair", "models/armchair.glb", "Seating")
                .with_kind(FurnitureKind::Seat),
            CatalogEntry::new("sofa-01", "Sofa", "models/sofa.glb", "Seating").with_kind(FurnitureKind::Sofa),
            CatalogEntry::new("table-01", "Dining Table", "models/table.glb", "Tables").with_kind(FurnitureKind::Table),
            CatalogEntry::new("desk-01", "Desk", "models/desk.glb", "Tables").with_kind(FurnitureKind::Table),
            CatalogEntry::new("bed-01", "Double Bed", "models/bed.glb", "Bedroom").with_kind(FurnitureKind::Bed),
            CatalogEntry::new("shelf-01", "Bookshelf", "models/bookshelf.glb", "Storage")
                .with_kind(FurnitureKind::Storage),
            CatalogEntry::new("lamp-01", "Floor Lamp", "models/lamp.glb", "Decor"),
        ])
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let parsed: Catalog = serde_json::from_str(text).context("Failed to parse catalog JSON")?;
        Ok(Self::new(parsed.items))
    }

    fn migrate_kinds(&mut self) {
        for entry in &mut self.items {
            if entry.kind.is_none() {
                let kind = FurnitureKind::classify(&entry.name);
                tracing::debug!(id = %entry.id, kind = kind.label(), "classified catalog entry by name");
                entry.kind = Some(kind);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.items.iter().find(|entry| entry.id == id)
    }

    pub fn categories(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.items.iter().map(|entry| entry.category.as_str()).collect();
        set.into_iter().collect()
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a CatalogEntry> + 'a {
        self.items.iter().filter(move |entry| entry.category == category)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_fixed_vocabulary() {
        assert_eq!(FurnitureKind::classify("Office Chair"), FurnitureKind::Seat);
        assert_eq!(FurnitureKind::classify("Coffee Table"), FurnitureKind::Table);
        assert_eq!(FurnitureKind::classify("Bedside Table"), FurnitureKind::Table);
        assert_eq!(FurnitureKind::classify("Corner Sofa"), FurnitureKind::Sofa);
        assert_eq!(FurnitureKind::classify("Sofa Bed"), FurnitureKind::Sofa);
        assert_eq!(FurnitureKind::classify("King Bed"), FurnitureKind::Bed);
        assert_eq!(FurnitureKind::classify("Bookshelf"), FurnitureKind::Storage);
        assert_eq!(FurnitureKind::classify("Floor Lamp"), FurnitureKind::Generic);
    }

    #[test]
    fn entries_without_kind_are_migrated() {
        let catalog = Catalog::from_json_str(
            r#"{"items":[
                {"id":"a","name":"Bar Stool","path":"models/stool.glb","category":"Seating"},
                {"id":"b","name":"Plant","path":"models/plant.glb","category":"Decor","kind":"storage"}
            ]}"#,
        )
        .expect("catalog parses");
        assert_eq!(catalog.get("a").and_then(|e| e.kind), Some(FurnitureKind::Seat));
        assert_eq!(catalog.get("b").and_then(|e| e.kind), Some(FurnitureKind::Storage));
        assert_eq!(catalog.categories(), vec!["Decor", "Seating"]);
    }

    #[test]
    fn builtin_catalog_has_unique_ids() {
        let catalog = Catalog::builtin();
        let ids: BTreeSet<&str> = catalog.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
        assert_eq!(catalog.in_category("Seating").count(), 3);
        assert_eq!(catalog.get("lamp-01").map(CatalogEntry::resolved_kind), Some(FurnitureKind::Generic));
    }
}
