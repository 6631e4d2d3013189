//! Compiled-graph cache
//!
//! Compilation is pure, so compiled graphs are cached by the blueprint's
//! fingerprint (which folds in the bound config shape). The cache is
//! shared across runs behind a read-mostly lock. Template edits
//! invalidate through [`CompilationCache::invalidate`] or produce a new
//! fingerprint naturally.

use parking_lot::RwLock;
use skein_core::builder::CompiledGraph;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared cache of compiled graphs keyed by fingerprint
#[derive(Debug, Clone, Default)]
pub struct CompilationCache {
    graphs: Arc<RwLock<HashMap<u64, Arc<CompiledGraph>>>>,
}

impl CompilationCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached graph for a fingerprint
    pub fn get(&self, fingerprint: u64) -> Option<Arc<CompiledGraph>> {
        self.graphs.read().get(&fingerprint).cloned()
    }

    /// Insert a compiled graph, returning the shared handle
    pub fn insert(&self, graph: CompiledGraph) -> Arc<CompiledGraph> {
        let shared = Arc::new(graph);
        self.graphs
            .write()
            .insert(shared.fingerprint, shared.clone());
        shared
    }

    /// Drop one entry
    pub fn invalidate(&self, fingerprint: u64) {
        self.graphs.write().remove(&fingerprint);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.graphs.write().clear();
    }

    /// Number of cached graphs
    pub fn len(&self) -> usize {
        self.graphs.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.graphs.read().is_empty()
    }
}
