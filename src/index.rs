//! This file contains the identifier index, a derived view mapping every
//! identifier in one tree to the chunk currently carrying it. Chunks get
//! duplicated and freed constantly during a stage, so the index is rebuilt
//! for every fresh clone of a tree and never shared between trees.
//!
//! SPDX-License-Identifier: MIT

use std::collections::HashMap;

use crate::chunk::{ChunkTree, Handle};

/// Fresh identifier for a chunk whose id collided, derived from its arena slot
/// so regeneration is deterministic
pub fn regenerate_id(base: &str, handle: Handle, attempt: usize) -> String {
    if attempt == 0 {
        format!("{}@{}", base, handle)
    } else {
        format!("{}@{}.{}", base, handle, attempt)
    }
}

#[derive(Clone, Debug, Default)]
pub struct IdIndex {
    map: HashMap<String, Handle>,
}

impl IdIndex {
    pub fn new() -> Self {
        IdIndex::default()
    }

    /// Index every chunk reachable from the root of `tree`
    pub fn build(tree: &ChunkTree) -> Self {
        let mut index = IdIndex::new();
        if let Some(root) = tree.root() {
            index.tree_add_map(tree, root);
        }

        index
    }

    /// Pre-order insert of a sibling chain: self, son subtree, then next
    pub fn tree_add_map(&mut self, tree: &ChunkTree, head: Handle) {
        let mut iter = Some(head);
        while let Some(handle) = iter {
            self.map.insert(tree[handle].id.clone(), handle);
            if let Some(son) = tree[handle].son {
                self.tree_add_map(tree, son);
            }
            iter = tree[handle].next;
        }
    }

    /// Like `tree_add_map`, but a chunk whose identifier is already taken is
    /// renamed before insertion, used right after duplicating a chunk so the
    /// copy gets a unique id while the original keeps its own
    pub fn set_id_add_map(&mut self, tree: &mut ChunkTree, head: Handle) {
        let mut iter = Some(head);
        while let Some(handle) = iter {
            if self.map.contains_key(&tree[handle].id) {
                let base = tree[handle].id.clone();
                let mut attempt = 0;
                let mut fresh = regenerate_id(&base, handle, attempt);
                while self.map.contains_key(&fresh) {
                    attempt += 1;
                    fresh = regenerate_id(&base, handle, attempt);
                }
                tree[handle].id = fresh;
            }

            self.map.insert(tree[handle].id.clone(), handle);
            if let Some(son) = tree[handle].son {
                self.set_id_add_map(tree, son);
            }
            iter = tree[handle].next;
        }
    }

    /// Drop the entries of a chunk (and with `recurse`, its following
    /// siblings) and of its whole son subtree. Must run before the chunk is
    /// freed
    pub fn delete_from_map(&mut self, tree: &ChunkTree, head: Handle, recurse: bool) {
        let mut iter = Some(head);
        while let Some(handle) = iter {
            let id = &tree[handle].id;
            if self.map.get(id) == Some(&handle) {
                self.map.remove(id);
            }

            if let Some(son) = tree[handle].son {
                self.delete_from_map(tree, son, true);
            }
            iter = if recurse { tree[handle].next } else { None };
        }
    }

    /// Raw lookup
    #[inline]
    pub fn get(&self, id: &str) -> Option<Handle> {
        self.map.get(id).copied()
    }

    /// Lookup that also confirms the chunk is still live and still carries
    /// `id`, a miss means "skip this candidate"
    pub fn resolve(&self, tree: &ChunkTree, id: &str) -> Option<Handle> {
        let handle = self.get(id)?;
        match tree.get(handle) {
            Some(chunk) if chunk.id == id => Some(handle),
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
