use crate::catalog::FurnitureKind;
use anyhow::{anyhow, bail, Context, Result};
use glam::{Mat4, Vec3};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Linear RGB color with components in `0.0..=1.0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: u32) -> Self {
        let r = ((hex >> 16) & 0xff) as f32 / 255.0;
        let g = ((hex >> 8) & 0xff) as f32 / 255.0;
        let b = (hex & 0xff) as f32 / 255.0;
        Self { r, g, b }
    }

    /// Parses `#rrggbb`, `rrggbb`, `0xrrggbb` and the short `#rgb` form.
    pub fn from_hex_str(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let expanded: String = match digits.len() {
            6 => digits.to_string(),
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            _ => bail!("invalid hex color '{text}'"),
        };
        let value = u32::from_str_radix(&expanded, 16).with_context(|| format!("invalid hex color '{text}'"))?;
        Ok(Self::from_hex(value))
    }

    pub fn to_hex(self) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn to_hex_string(self) -> String {
        format!("#{:06x}", self.to_hex())
    }

    /// `hue` in degrees, `saturation` and `lightness` in `0.0..=1.0`.
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = lightness - c * 0.5;
        Self { r: r + m, g: g + m, b: b + m }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Emissive {
    pub color: Color,
    pub intensity: f32,
}

impl Default for Emissive {
    fn default() -> Self {
        Self { color: Color::BLACK, intensity: 1.0 }
    }
}

/// Surface description for one sub-mesh. Channels a material does not expose are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Option<Color>,
    pub metalness: Option<f32>,
    pub roughness: Option<f32>,
    pub opacity: f32,
    pub transparent: bool,
    pub emissive: Option<Emissive>,
}

impl Material {
    pub fn standard(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color: Some(color),
            metalness: Some(0.0),
            roughness: Some(0.7),
            opacity: 1.0,
            transparent: false,
            emissive: Some(Emissive::default()),
        }
    }

    /// Unlit material without metalness/roughness or emissive channels.
    pub fn basic(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            color: Some(color),
            metalness: None,
            roughness: None,
            opacity: 1.0,
            transparent: false,
            emissive: None,
        }
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
        self.transparent = self.opacity < 1.0;
    }
}

/// Recorded override of one sub-mesh's material, identified by sub-mesh name.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDelta {
    pub child_name: String,
    pub color: Option<Color>,
    pub metalness: Option<f32>,
    pub roughness: Option<f32>,
    pub opacity: Option<f32>,
}

impl MaterialDelta {
    pub fn capture(child_name: impl Into<String>, material: &Material) -> Self {
        Self {
            child_name: child_name.into(),
            color: material.color,
            metalness: material.metalness,
            roughness: material.roughness,
            opacity: Some(material.opacity),
        }
    }

    /// Writes every recorded channel the material exposes.
    pub fn apply_to(&self, material: &mut Material) {
        if let (Some(color), Some(_)) = (self.color, material.color) {
            material.color = Some(color);
        }
        if let (Some(metalness), Some(_)) = (self.metalness, material.metalness) {
            material.metalness = Some(metalness);
        }
        if let (Some(roughness), Some(_)) = (self.roughness, material.roughness) {
            material.roughness = Some(roughness);
        }
        if let Some(opacity) = self.opacity {
            material.set_opacity(opacity);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl MeshBounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self { min: center - half, max: center + half }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        let mut any = false;
        for point in points {
            min = min.min(point);
            max = max.max(point);
            any = true;
        }
        any.then_some(Self { min, max })
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Axis-aligned bounds of this box after `matrix` is applied.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = self.corners().map(|corner| matrix.transform_point3(corner));
        Self::from_points(corners).unwrap_or(*self)
    }

    pub fn union(&self, other: &MeshBounds) -> Self {
        Self { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}

#[derive(Clone, Debug)]
pub struct SubMeshTemplate {
    pub name: String,
    /// Transform from sub-mesh space into model space.
    pub local: Mat4,
    pub bounds: MeshBounds,
    pub material: Arc<Material>,
}

impl SubMeshTemplate {
    pub fn cuboid(name: impl Into<String>, center: Vec3, size: Vec3, material: Arc<Material>) -> Self {
        Self {
            name: name.into(),
            local: Mat4::from_translation(center),
            bounds: MeshBounds::from_center_size(Vec3::ZERO, size),
            material,
        }
    }

    pub fn model_bounds(&self) -> MeshBounds {
        self.bounds.transformed(&self.local)
    }
}

/// Geometry and materials for one placeable object, shared by every instance spawned from it.
#[derive(Clone, Debug)]
pub struct ModelTemplate {
    pub source: Option<String>,
    pub sub_meshes: Vec<SubMeshTemplate>,
}

impl ModelTemplate {
    /// Builds a template, renaming sub-meshes so every name is unique within the model.
    pub fn new(source: Option<String>, mut sub_meshes: Vec<SubMeshTemplate>) -> Self {
        let mut seen: HashSet<String> = HashSet::with_capacity(sub_meshes.len());
        for (index, sub_mesh) in sub_meshes.iter_mut().enumerate() {
            if sub_mesh.name.trim().is_empty() {
                sub_mesh.name = format!("mesh_{index}");
            }
            if !seen.insert(sub_mesh.name.clone()) {
                let mut suffix = 1;
                let mut candidate = format!("{}_{suffix}", sub_mesh.name);
                while seen.contains(&candidate) {
                    suffix += 1;
                    candidate = format!("{}_{suffix}", sub_mesh.name);
                }
                seen.insert(candidate.clone());
                sub_mesh.name = candidate;
            }
        }
        Self { source, sub_meshes }
    }

    pub fn bounds(&self) -> Option<MeshBounds> {
        self.sub_meshes.iter().map(SubMeshTemplate::model_bounds).reduce(|acc, b| acc.union(&b))
    }

    /// Whether the template can be placed: at least one sub-mesh and finite, non-flat bounds.
    pub fn is_placeable(&self) -> bool {
        match self.bounds() {
            Some(bounds) => bounds.is_finite() && bounds.size().y > f32::EPSILON,
            None => false,
        }
    }

    /// Procedural stand-in used when an asset cannot be loaded. Geometry depends on `kind`,
    /// color on `seed` (normally the catalog id) so neighbouring placeholders stay distinct.
    pub fn placeholder(kind: FurnitureKind, seed: &str) -> Self {
        let color = placeholder_color(seed);
        let part = |name: &str, center: Vec3, size: Vec3| {
            SubMeshTemplate::cuboid(name, center, size, Arc::new(Material::standard(name, color)))
        };
        let legs = |spread_x: f32, spread_z: f32, height: f32, thickness: f32| {
            let mut parts = Vec::with_capacity(4);
            let corners = [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)];
            for (index, (sx, sz)) in corners.into_iter().enumerate() {
                parts.push(part(
                    &format!("leg_{index}"),
                    Vec3::new(sx * spread_x, height * 0.5, sz * spread_z),
                    Vec3::new(thickness, height, thickness),
                ));
            }
            parts
        };
        let mut parts = Vec::new();
        match kind {
            FurnitureKind::Seat => {
                parts.push(part("seat", Vec3::new(0.0, 0.45, 0.0), Vec3::new(0.45, 0.08, 0.45)));
                parts.push(part("backrest", Vec3::new(0.0, 0.74, -0.2), Vec3::new(0.45, 0.5, 0.06)));
                parts.extend(legs(0.19, 0.19, 0.41, 0.05));
            }
            FurnitureKind::Table => {
                parts.push(part("tabletop", Vec3::new(0.0, 0.725, 0.0), Vec3::new(1.2, 0.05, 0.8)));
                parts.extend(legs(0.55, 0.35, 0.7, 0.06));
            }
            FurnitureKind::Sofa => {
                parts.push(part("base", Vec3::new(0.0, 0.21, 0.0), Vec3::new(2.0, 0.42, 0.9)));
                parts.push(part("backrest", Vec3::new(0.0, 0.645, -0.35), Vec3::new(2.0, 0.45, 0.2)));
                parts.push(part("arm_left", Vec3::new(-0.9, 0.545, 0.0), Vec3::new(0.2, 0.25, 0.9)));
                parts.push(part("arm_right", Vec3::new(0.9, 0.545, 0.0), Vec3::new(0.2, 0.25, 0.9)));
            }
            FurnitureKind::Bed => {
                parts.push(part("frame", Vec3::new(0.0, 0.15, 0.0), Vec3::new(1.6, 0.3, 2.1)));
                parts.push(part("mattress", Vec3::new(0.0, 0.4, 0.0), Vec3::new(1.5, 0.2, 2.0)));
                parts.push(part("headboard", Vec3::new(0.0, 0.45, -1.01), Vec3::new(1.6, 0.9, 0.08)));
            }
            FurnitureKind::Storage => {
                parts.push(part("body", Vec3::new(0.0, 0.9, 0.0), Vec3::new(0.9, 1.8, 0.4)));
            }
            FurnitureKind::Generic => {
                parts.push(part("box", Vec3::new(0.0, 0.3, 0.0), Vec3::splat(0.6)));
            }
        }
        Self::new(None, parts)
    }

    /// Imports every triangle primitive of the default glTF scene. Primitives that share a glTF
    /// material share one `Arc<Material>`.
    pub fn load_gltf(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let (document, _buffers, _images) = gltf::import(path_ref)
            .with_context(|| format!("Failed to import glTF from {}", path_ref.display()))?;
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| anyhow!("No scenes found in {}", path_ref.display()))?;

        let mut materials: HashMap<Option<usize>, Arc<Material>> = HashMap::new();
        let mut sub_meshes = Vec::new();
        let mut stack: Vec<(gltf::Node<'_>, Mat4)> = scene.nodes().map(|node| (node, Mat4::IDENTITY)).collect();
        while let Some((node, parent)) = stack.pop() {
            let local = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
            if let Some(mesh) = node.mesh() {
                let base_name = node
                    .name()
                    .or_else(|| mesh.name())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("node_{}", node.index()));
                let primitive_count = mesh.primitives().count();
                for (primitive_index, primitive) in mesh.primitives().enumerate() {
                    if primitive.mode() != gltf::mesh::Mode::Triangles {
                        continue;
                    }
                    let bb = primitive.bounding_box();
                    let bounds = MeshBounds::new(Vec3::from_array(bb.min), Vec3::from_array(bb.max));
                    let gltf_material = primitive.material();
                    let material = materials
                        .entry(gltf_material.index())
                        .or_insert_with(|| Arc::new(import_material(&gltf_material)))
                        .clone();
                    let name = if primitive_count > 1 {
                        format!("{base_name}_{primitive_index}")
                    } else {
                        base_name.clone()
                    };
                    sub_meshes.push(SubMeshTemplate { name, local, bounds, material });
                }
            }
            for child in node.children() {
                stack.push((child, local));
            }
        }
        if sub_meshes.is_empty() {
            bail!("No triangle meshes found in {}", path_ref.display());
        }
        Ok(Self::new(Some(path_ref.display().to_string()), sub_meshes))
    }
}

fn import_material(material: &gltf::Material<'_>) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let [er, eg, eb] = material.emissive_factor();
    let name = material.name().map(str::to_string).unwrap_or_else(|| "default".to_string());
    let mut imported = Material {
        name,
        color: Some(Color::new(r, g, b)),
        metalness: Some(pbr.metallic_factor()),
        roughness: Some(pbr.roughness_factor()),
        opacity: 1.0,
        transparent: false,
        emissive: Some(Emissive { color: Color::new(er, eg, eb), intensity: 1.0 }),
    };
    if material.alpha_mode() == gltf::material::AlphaMode::Blend {
        imported.set_opacity(a);
    }
    imported
}

/// Deterministic, saturated color derived from `seed`.
pub fn placeholder_color(seed: &str) -> Color {
    let hash = blake3::hash(seed.as_bytes());
    let bytes = hash.as_bytes();
    let hue = u16::from_le_bytes([bytes[0], bytes[1]]) as f32 / u16::MAX as f32 * 360.0;
    let lightness = 0.45 + (bytes[2] as f32 / 255.0) * 0.15;
    Color::from_hsl(hue, 0.6, lightness)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let color = Color::from_hex_str("#ff8000").expect("parse");
        assert_eq!(color.to_hex(), 0xff8000);
        assert_eq!(color.to_hex_string(), "#ff8000");
        assert_eq!(Color::from_hex_str("0x00ff00").expect("parse").to_hex(), 0x00ff00);
        assert_eq!(Color::from_hex_str("#f00").expect("parse").to_hex(), 0xff0000);
        assert!(Color::from_hex_str("#12").is_err());
        assert!(Color::from_hex_str("#zzzzzz").is_err());
    }

    #[test]
    fn opacity_keeps_transparent_flag_in_sync() {
        let mut material = Material::standard("m", Color::WHITE);
        material.set_opacity(0.4);
        assert!(material.transparent);
        material.set_opacity(1.0);
        assert!(!material.transparent);
        material.set_opacity(3.0);
        assert_eq!(material.opacity, 1.0);
        assert!(!material.transparent);
    }

    #[test]
    fn transformed_bounds_cover_rotation() {
        let bounds = MeshBounds::from_center_size(Vec3::ZERO, Vec3::new(2.0, 1.0, 0.5));
        let rotated = bounds.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2));
        assert!((rotated.size().x - 0.5).abs() < 1e-5);
        assert!((rotated.size().z - 2.0).abs() < 1e-5);
    }

    #[test]
    fn duplicate_sub_mesh_names_are_made_unique() {
        let material = Arc::new(Material::standard("m", Color::WHITE));
        let template = ModelTemplate::new(
            None,
            vec![
                SubMeshTemplate::cuboid("part", Vec3::ZERO, Vec3::ONE, material.clone()),
                SubMeshTemplate::cuboid("part", Vec3::ZERO, Vec3::ONE, material.clone()),
                SubMeshTemplate::cuboid("", Vec3::ZERO, Vec3::ONE, material),
            ],
        );
        let names: Vec<&str> = template.sub_meshes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["part", "part_1", "mesh_2"]);
    }

    #[test]
    fn placeholders_rest_on_their_origin_plane() {
        for kind in FurnitureKind::ALL {
            let template = ModelTemplate::placeholder(kind, "seed");
            let bounds = template.bounds().expect("placeholder bounds");
            assert!(bounds.min.y.abs() < 1e-5, "{kind:?} min y {}", bounds.min.y);
            assert!(template.is_placeable());
        }
    }

    #[test]
    fn placeholder_color_depends_on_seed() {
        assert_eq!(placeholder_color("chair-01"), placeholder_color("chair-01"));
        assert_ne!(placeholder_color("chair-01").to_hex(), placeholder_color("table-02").to_hex());
    }
}
