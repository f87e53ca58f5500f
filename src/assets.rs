use crate::mesh::ModelTemplate;
use anyhow::{anyhow, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// Asynchronous source of model templates. Implementations may fail; callers substitute a
/// procedural placeholder and never surface the error.
pub trait AssetLoader {
    fn load(&self, path: &str) -> impl Future<Output = Result<Arc<ModelTemplate>>>;
}

/// Loads glTF/GLB files relative to `root`, caching each parsed template so repeated placements
/// share geometry and materials.
pub struct GltfLoader {
    root: PathBuf,
    cache: RefCell<HashMap<String, Arc<ModelTemplate>>>,
}

impl GltfLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), cache: RefCell::new(HashMap::new()) }
    }

    pub fn cached(&self, path: &str) -> bool {
        self.cache.borrow().contains_key(path)
    }
}

impl AssetLoader for GltfLoader {
    async fn load(&self, path: &str) -> Result<Arc<ModelTemplate>> {
        if let Some(template) = self.cache.borrow().get(path) {
            return Ok(Arc::clone(template));
        }
        let full_path = self.root.join(path);
        let template = Arc::new(ModelTemplate::load_gltf(&full_path)?);
        tracing::debug!(path, sub_meshes = template.sub_meshes.len(), "loaded model");
        self.cache.borrow_mut().insert(path.to_string(), Arc::clone(&template));
        Ok(template)
    }
}

/// In-memory loader keyed by asset path. Paths never registered fail to load.
#[derive(Default)]
pub struct MemoryLoader {
    templates: HashMap<String, Arc<ModelTemplate>>,
    requests: Cell<usize>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, template: ModelTemplate) -> Arc<ModelTemplate> {
        let template = Arc::new(template);
        self.templates.insert(path.into(), Arc::clone(&template));
        template
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.templates.remove(path).is_some()
    }

    /// Number of `load` calls so far, successful or not.
    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl AssetLoader for MemoryLoader {
    async fn load(&self, path: &str) -> Result<Arc<ModelTemplate>> {
        self.requests.set(self.requests.get() + 1);
        self.templates.get(path).cloned().ok_or_else(|| anyhow!("asset '{path}' is not available"))
    }
}
