//! Asset loader collaborator interface
//!
//! The stage only accepts resolved resources. Nodes that reference a model
//! by URL ask the loader for it on mount and, when it is not cached yet,
//! request it and wait for the world to deliver the completion.

use std::collections::HashMap;
use std::rc::Rc;

use crate::render::{Geometry, Texture};

/// Kind of asset behind a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Mesh geometry
    Model,
    /// Texture image
    Texture,
}

/// A resolved asset
#[derive(Debug, Clone)]
pub enum LoadedAsset {
    /// Shared geometry
    Geometry(Rc<Geometry>),
    /// Texture; clones share pixels
    Texture(Texture),
}

/// A load that finished since the last poll
#[derive(Debug, Clone)]
pub struct CompletedLoad {
    /// Asset kind
    pub kind: AssetKind,
    /// Requested URL
    pub url: String,
    /// The resolved asset
    pub asset: LoadedAsset,
}

/// Source of resolved assets
pub trait AssetLoader {
    /// Cached asset, if already loaded
    fn get(&self, kind: AssetKind, url: &str) -> Option<LoadedAsset>;

    /// Start loading an asset; repeated requests are coalesced
    fn request(&mut self, kind: AssetKind, url: &str);

    /// Drain loads that completed since the last call
    fn poll(&mut self) -> Vec<CompletedLoad>;
}

/// In-memory loader; loads complete when [`MemoryLoader::resolve`] is called
#[derive(Debug, Default)]
pub struct MemoryLoader {
    cache: HashMap<(AssetKind, String), LoadedAsset>,
    requested: Vec<(AssetKind, String)>,
    completed: Vec<CompletedLoad>,
}

impl MemoryLoader {
    /// Empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an asset available immediately
    pub fn insert(&mut self, kind: AssetKind, url: impl Into<String>, asset: LoadedAsset) {
        self.cache.insert((kind, url.into()), asset);
    }

    /// Finish an outstanding request; the asset is cached and reported by
    /// the next [`AssetLoader::poll`]
    pub fn resolve(&mut self, kind: AssetKind, url: &str, asset: LoadedAsset) {
        self.requested.retain(|(k, u)| !(*k == kind && u == url));
        self.cache.insert((kind, url.to_string()), asset.clone());
        self.completed.push(CompletedLoad {
            kind,
            url: url.to_string(),
            asset,
        });
    }

    /// Requests not resolved yet
    pub fn pending(&self) -> &[(AssetKind, String)] {
        &self.requested
    }
}

impl AssetLoader for MemoryLoader {
    fn get(&self, kind: AssetKind, url: &str) -> Option<LoadedAsset> {
        self.cache.get(&(kind, url.to_string())).cloned()
    }

    fn request(&mut self, kind: AssetKind, url: &str) {
        if !self.requested.iter().any(|(k, u)| *k == kind && u == url) {
            log::debug!("Requested {:?} {}", kind, url);
            self.requested.push((kind, url.to_string()));
        }
    }

    fn poll(&mut self) -> Vec<CompletedLoad> {
        std::mem::take(&mut self.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PrimitiveKind;

    #[test]
    fn test_requests_coalesce_and_resolve() {
        let mut loader = MemoryLoader::new();
        loader.request(AssetKind::Model, "tree.glb");
        loader.request(AssetKind::Model, "tree.glb");
        assert_eq!(loader.pending().len(), 1);
        assert!(loader.get(AssetKind::Model, "tree.glb").is_none());

        let geometry = Rc::new(Geometry::primitive(PrimitiveKind::Box));
        loader.resolve(AssetKind::Model, "tree.glb", LoadedAsset::Geometry(geometry));
        assert!(loader.pending().is_empty());
        assert!(loader.get(AssetKind::Model, "tree.glb").is_some());
        assert_eq!(loader.poll().len(), 1);
        assert!(loader.poll().is_empty());
    }
}
