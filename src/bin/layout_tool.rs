use anyhow::{anyhow, Context, Result};
use roomcraft::assets::{AssetLoader, GltfLoader};
use roomcraft::layout::LayoutDocument;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_target(false).init();
    if let Err(err) = run() {
        eprintln!("error: {err:?}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    match command.as_str() {
        "validate" => {
            let layout_path = args
                .next()
                .ok_or_else(|| anyhow!("validate requires a path: layout_tool validate <layout>"))?;
            cmd_validate(&layout_path)
        }
        "list" => {
            let layout_path =
                args.next().ok_or_else(|| anyhow!("list requires a path: layout_tool list <layout>"))?;
            cmd_list(&layout_path)
        }
        "check-assets" => {
            let layout_path = args.next().ok_or_else(|| {
                anyhow!("check-assets requires arguments: layout_tool check-assets <layout> <asset_root>")
            })?;
            let asset_root = args.next().ok_or_else(|| anyhow!("check-assets missing asset root argument"))?;
            cmd_check_assets(&layout_path, &asset_root)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(anyhow!("unknown command '{other}'")),
    }
}

fn print_usage() {
    eprintln!(
        "Layout Tool

Usage:
  layout_tool validate <layout>                 Check transforms, catalog linkage and overrides
  layout_tool list <layout>                     List items with catalog id, position and overrides
  layout_tool check-assets <layout> <root>      Load every referenced model relative to <root>
  layout_tool help                              Show this message
"
    );
}

fn cmd_validate(layout_path: &str) -> Result<()> {
    let document = load_layout(layout_path)?;
    let issues = document.issues();
    if issues.is_empty() {
        let overridden = document.objects.iter().filter(|object| object.material_mods.is_some()).count();
        println!(
            "Layout '{}' is valid. Version: {}  Items: {}  With material overrides: {}",
            layout_path,
            document.version,
            document.objects.len(),
            overridden,
        );
        Ok(())
    } else {
        Err(anyhow!("layout '{}' has issues:\n  - {}", layout_path, issues.join("\n  - ")))
    }
}

fn cmd_list(layout_path: &str) -> Result<()> {
    let document = load_layout(layout_path)?;
    println!("{:<5} {:<28} {:<16} {:<26} {}", "Idx", "Name", "Catalog ID", "Position", "Overrides");
    println!("{}", "-".repeat(96));
    for (index, object) in document.objects.iter().enumerate() {
        let position = format!("({:.2}, {:.2}, {:.2})", object.position.x, object.position.y, object.position.z);
        let overrides = object.material_mods.as_ref().map_or(0, Vec::len);
        println!(
            "{:<5} {:<28} {:<16} {:<26} {}",
            index,
            object.name,
            object.catalog_id().unwrap_or("-"),
            position,
            overrides
        );
    }
    Ok(())
}

fn cmd_check_assets(layout_path: &str, asset_root: &str) -> Result<()> {
    let document = load_layout(layout_path)?;
    let loader = GltfLoader::new(asset_root);
    let mut users: BTreeMap<&str, usize> = BTreeMap::new();
    let mut unlinked = 0usize;
    for object in &document.objects {
        match object.asset_path() {
            Some(path) => *users.entry(path).or_default() += 1,
            None => unlinked += 1,
        }
    }

    let mut missing = Vec::new();
    for (path, count) in &users {
        match pollster::block_on(loader.load(path)) {
            Ok(template) if template.is_placeable() => {
                println!("ok       {path} ({} sub-meshes, {count} items)", template.sub_meshes.len());
            }
            Ok(_) => missing.push(format!("{path}: no usable geometry ({count} items)")),
            Err(err) => missing.push(format!("{path}: {err:#} ({count} items)")),
        }
    }
    if unlinked > 0 {
        missing.push(format!("{unlinked} items have no asset path"));
    }
    if missing.is_empty() {
        println!("All {} referenced models load from '{}'", users.len(), asset_root);
        Ok(())
    } else {
        Err(anyhow!("items that would use placeholders:\n  - {}", missing.join("\n  - ")))
    }
}

fn load_layout(path: &str) -> Result<LayoutDocument> {
    let normalized = Path::new(path).canonicalize().unwrap_or_else(|_| Path::new(path).to_path_buf());
    let text = fs::read_to_string(&normalized).with_context(|| format!("reading layout '{}'", normalized.display()))?;
    LayoutDocument::from_json_str(&text).with_context(|| format!("parsing layout '{}'", normalized.display()))
}
