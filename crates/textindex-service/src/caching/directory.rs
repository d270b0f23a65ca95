use std::sync::Arc;

use super::WeakValueCache;
use crate::directory::MemDirectory;
use crate::node::{ConfigNode, NodeId};

/// The process-wide cache of in-memory index directories.
///
/// One directory per configuration *node*, not one per open call: repeated
/// opens of the same declared index converge on the same directory for as
/// long as any index over it is alive. The cache is keyed by [`NodeId`], so
/// two nodes with identical property values never share a slot.
///
/// There is exactly one instance per process, owned by
/// [`SharedServices`](crate::services::SharedServices); tests construct their
/// own.
pub struct DirectoryCache {
    entries: WeakValueCache<NodeId, MemDirectory>,
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self {
            entries: WeakValueCache::new(),
        }
    }
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live directory for `node`, if any.
    pub fn get(&self, node: &ConfigNode) -> Option<Arc<MemDirectory>> {
        self.entries.get(&node.id())
    }

    /// Returns the shared directory for `node`, creating it on miss.
    pub fn get_or_open(&self, node: &ConfigNode) -> Arc<MemDirectory> {
        self.entries.get_or_insert_with(node.id(), || {
            tracing::debug!(node = %node.id(), "creating in-memory index directory");
            Arc::new(MemDirectory::new())
        })
    }

    /// Installs `directory` for `node`, replacing any existing entry.
    pub fn put(&self, node: NodeId, directory: &Arc<MemDirectory>) {
        self.entries.put(node, directory);
    }

    /// Unconditionally drops the entry for `node`. Idempotent.
    pub fn remove(&self, node: NodeId) {
        self.entries.remove(&node);
    }

    /// Drops the entry for `node` only if it still refers to `directory`.
    ///
    /// Close handlers go through here so that a late close event for a
    /// superseded directory leaves a newer entry under the same node intact.
    pub fn remove_instance(&self, node: NodeId, directory: &MemDirectory) -> bool {
        self.entries.remove_if(&node, directory)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
