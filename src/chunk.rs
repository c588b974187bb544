//! This file contains the chunk tree, the structural model of a single input
//! buffer. Every chunk names a field (or a group of fields) in the buffer and
//! stores its byte range relative to the start of its father. Chunks live in
//! an arena and link to each other by `Handle`, so detaching and freeing a
//! chunk is slot invalidation rather than pointer juggling.
//!
//! Invariants, validated by `ChunkTree::check()`:
//! 1. Every chunk has `start < end`
//! 2. Siblings are contiguous, the first sibling starts at 0
//! 3. A chunk ends no later than its father
//! 4. The last sibling ends exactly where its father ends
//! 5. Identifiers are unique within one tree
//! 6. Absolute offsets are the chunk's own offsets plus the `start` of every
//!    ancestor

use std::collections::HashSet;
use std::ops::{Index, IndexMut};

use crate::description::FieldDesc;
use crate::err::StrataErr;
use crate::fatal;

/// Arena slot index of a chunk, only meaningful for the tree that issued it
pub type Handle = usize;

/// Identifier given to a synthesized root
pub const ROOT_ID: &str = "root";

/// Which side of a length/offset relationship a constraint annotation sits on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsKind {
    LengthMeta,
    LengthPayload,
    OffsetMeta,
    OffsetPayload,
}

/// Length/offset annotation attached to a chunk. For lengths the related
/// field's size is `k * x + b`, for offsets `b` is meaningless
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cons {
    pub target: String,
    pub kind: ConsKind,
    pub k: u32,
    pub b: u32,
}

/// One node of the structure tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,           // Offset relative to the father's start
    pub end: usize,             // Exclusive end relative to the father's start
    pub id: String,             // Unique identifier, key into the IdIndex
    pub kind: Option<String>,   // Optional field type from the description
    pub father: Option<Handle>, // Enclosing chunk, None for the root
    pub son: Option<Handle>,    // Head of the child chain, None for a leaf
    pub prev: Option<Handle>,   // Previous sibling
    pub next: Option<Handle>,   // Next sibling
    pub cons: Vec<Cons>,        // Attached length/offset annotations
}

impl Chunk {
    pub fn new(id: &str, start: usize, end: usize) -> Self {
        Chunk {
            start,
            end,
            id: id.to_string(),
            kind: None,
            father: None,
            son: None,
            prev: None,
            next: None,
            cons: Vec::new(),
        }
    }

    /// Number of bytes this chunk covers
    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Terminal field, no children
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.son.is_none()
    }
}

/// Flattened absolute range of a leaf, used to walk fields in buffer order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Node {
    pub start: usize,
    pub end: usize,
}

/// Arena holding every chunk of one tree
#[derive(Clone, Debug, Default)]
pub struct ChunkTree {
    slots: Vec<Option<Chunk>>,
    vacant: Vec<Handle>,
    root: Option<Handle>,
}

impl Index<Handle> for ChunkTree {
    type Output = Chunk;

    fn index(&self, handle: Handle) -> &Chunk {
        match self.slots.get(handle) {
            Some(Some(chunk)) => chunk,
            _ => panic!("stale chunk handle {}", handle),
        }
    }
}

impl IndexMut<Handle> for ChunkTree {
    fn index_mut(&mut self, handle: Handle) -> &mut Chunk {
        match self.slots.get_mut(handle) {
            Some(Some(chunk)) => chunk,
            _ => panic!("stale chunk handle {}", handle),
        }
    }
}

// Apply a signed delta to an offset
#[inline]
pub(crate) fn shifted(value: usize, delta: isize) -> usize {
    value.wrapping_add_signed(delta)
}

impl ChunkTree {
    pub fn new() -> Self {
        ChunkTree::default()
    }

    /// Build a tree from an ordered list of field descriptors. When the
    /// description has more than one top-level field, a root spanning all of
    /// them is synthesized
    pub fn build(fields: &[FieldDesc]) -> Self {
        let mut tree = ChunkTree::new();

        let Some(head) = tree.build_chain(fields, None) else {
            return tree;
        };

        // Single top-level chunk is the root
        if tree[head].next.is_none() {
            tree.root = Some(head);
            return tree;
        }

        // Otherwise synthesize one covering every top-level sibling
        let chain = tree.siblings(head);
        let start = tree[head].start;
        let end = chain.last().map(|&last| tree[last].end).unwrap_or(start);
        let mut root = Chunk::new(ROOT_ID, start, end);
        root.son = Some(head);
        let root = tree.alloc(root);

        for handle in chain {
            tree[handle].father = Some(root);
        }

        tree.root = Some(root);
        tree
    }

    // Build one sibling chain per level, zero-width descriptors are pruned
    fn build_chain(&mut self, fields: &[FieldDesc], father: Option<Handle>) -> Option<Handle> {
        let mut head = None;
        let mut top: Option<Handle> = None;

        for field in fields {
            if field.end <= field.start {
                continue;
            }

            let mut chunk = Chunk::new(&field.id, field.start, field.end);
            chunk.kind = field.kind.clone();
            chunk.cons = field.cons.clone();
            chunk.father = father;
            chunk.prev = top;
            let node = self.alloc(chunk);

            match top {
                Some(t) => self[t].next = Some(node),
                None => head = Some(node),
            }
            top = Some(node);

            if !field.children.is_empty() {
                let son = self.build_chain(&field.children, Some(node));
                self[node].son = son;
            }
        }

        head
    }

    #[inline]
    pub fn root(&self) -> Option<Handle> {
        self.root
    }

    #[inline]
    pub(crate) fn set_root(&mut self, root: Option<Handle>) {
        self.root = root;
    }

    /// Number of bytes the whole tree covers
    pub fn span(&self) -> usize {
        self.root.map(|root| self.abs_end(root)).unwrap_or(0)
    }

    /// Place a chunk into the arena, reusing a vacant slot if there is one
    pub fn alloc(&mut self, chunk: Chunk) -> Handle {
        if let Some(handle) = self.vacant.pop() {
            self.slots[handle] = Some(chunk);
            return handle;
        }

        self.slots.push(Some(chunk));
        self.slots.len() - 1
    }

    #[inline]
    pub fn get(&self, handle: Handle) -> Option<&Chunk> {
        self.slots.get(handle).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut Chunk> {
        self.slots.get_mut(handle).and_then(Option::as_mut)
    }

    #[inline]
    pub fn is_live(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of chunks currently allocated
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Sibling chain starting at `head`, in order
    pub fn siblings(&self, head: Handle) -> Vec<Handle> {
        let mut chain = Vec::new();
        let mut iter = Some(head);
        while let Some(handle) = iter {
            chain.push(handle);
            iter = self[handle].next;
        }

        chain
    }

    /// Children of a chunk, in order
    pub fn children(&self, handle: Handle) -> Vec<Handle> {
        self[handle]
            .son
            .map(|son| self.siblings(son))
            .unwrap_or_default()
    }

    /// Every live chunk reachable from the root: self, son subtree, next
    pub fn preorder(&self) -> Vec<Handle> {
        let mut order = Vec::new();
        if let Some(root) = self.root {
            self.preorder_chain(root, &mut order);
        }

        order
    }

    fn preorder_chain(&self, head: Handle, order: &mut Vec<Handle>) {
        let mut iter = Some(head);
        while let Some(handle) = iter {
            order.push(handle);
            if let Some(son) = self[handle].son {
                self.preorder_chain(son, order);
            }
            iter = self[handle].next;
        }
    }

    /// Locate a chunk by identifier with a full traversal, the IdIndex is the
    /// fast path
    pub fn find(&self, id: &str) -> Option<Handle> {
        self.preorder()
            .into_iter()
            .find(|&handle| self[handle].id == id)
    }

    /// Is `ancestor` somewhere up the father chain of `handle`
    pub fn is_inner(&self, ancestor: Handle, handle: Handle) -> bool {
        let mut iter = self[handle].father;
        while let Some(father) = iter {
            if father == ancestor {
                return true;
            }
            iter = self[father].father;
        }

        false
    }

    /// Absolute start: own start plus the start of every ancestor
    pub fn abs_start(&self, handle: Handle) -> usize {
        let mut start = self[handle].start;
        let mut father = self[handle].father;
        while let Some(f) = father {
            start += self[f].start;
            father = self[f].father;
        }

        start
    }

    /// Absolute end: own end plus the start (never the end) of every ancestor
    pub fn abs_end(&self, handle: Handle) -> usize {
        let mut end = self[handle].end;
        let mut father = self[handle].father;
        while let Some(f) = father {
            end += self[f].start;
            father = self[f].father;
        }

        end
    }

    // Copy one chunk and its son subtree, links to the source are not kept
    fn copy_node(&mut self, handle: Handle) -> Handle {
        let src = &self[handle];
        let mut chunk = Chunk::new(&src.id, src.start, src.end);
        chunk.kind = src.kind.clone();
        chunk.cons = src.cons.clone();
        let son = src.son;

        let node = self.alloc(chunk);
        if let Some(son) = son {
            let dup = self.duplicate(son, true);
            self.adopt(node, dup);
        }

        node
    }

    // Hang a detached chain under `father` as its children
    fn adopt(&mut self, father: Handle, head: Handle) {
        self[father].son = Some(head);
        let mut iter = Some(head);
        while let Some(handle) = iter {
            self[handle].father = Some(father);
            iter = self[handle].next;
        }
    }

    /// Deep copy a sibling chain (`recurse`) or a single chunk, with every
    /// descendant. Identifiers and relative offsets are preserved, `father`
    /// and `prev` of the copied head are left for the caller to wire up
    pub fn duplicate(&mut self, head: Handle, recurse: bool) -> Handle {
        let first = self.copy_node(head);
        if !recurse {
            return first;
        }

        let mut top = first;
        let mut iter = self[head].next;
        while let Some(handle) = iter {
            let node = self.copy_node(handle);
            self[top].next = Some(node);
            self[node].prev = Some(top);
            top = node;
            iter = self[handle].next;
        }

        first
    }

    /// Same as `duplicate`, but copies out of another tree's arena
    pub fn import(&mut self, src: &ChunkTree, head: Handle, recurse: bool) -> Handle {
        let first = self.import_node(src, head);
        if !recurse {
            return first;
        }

        let mut top = first;
        let mut iter = src[head].next;
        while let Some(handle) = iter {
            let node = self.import_node(src, handle);
            self[top].next = Some(node);
            self[node].prev = Some(top);
            top = node;
            iter = src[handle].next;
        }

        first
    }

    fn import_node(&mut self, src: &ChunkTree, handle: Handle) -> Handle {
        let from = &src[handle];
        let mut chunk = Chunk::new(&from.id, from.start, from.end);
        chunk.kind = from.kind.clone();
        chunk.cons = from.cons.clone();

        let node = self.alloc(chunk);
        if let Some(son) = from.son {
            let dup = self.import(src, son, true);
            self.adopt(node, dup);
        }

        node
    }

    /// Release a chunk (and with `recurse`, every following sibling) together
    /// with its son subtree. Never walks `father` or `prev`, freeing an
    /// already freed or absent head is a no-op
    pub fn free(&mut self, head: Option<Handle>, recurse: bool) {
        let mut iter = head;
        while let Some(handle) = iter {
            let Some(chunk) = self.slots.get_mut(handle).and_then(Option::take) else {
                break;
            };
            self.vacant.push(handle);

            if self.root == Some(handle) {
                self.root = None;
            }

            self.free(chunk.son, true);
            iter = if recurse { chunk.next } else { None };
        }
    }

    /// Absolute ranges of every leaf sorted by start, duplicate starts dropped
    pub fn node_list(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .preorder()
            .into_iter()
            .filter(|&handle| self[handle].is_leaf())
            .map(|handle| Node {
                start: self.abs_start(handle),
                end: self.abs_end(handle),
            })
            .collect();

        nodes.sort_by_key(|node| node.start);
        nodes.dedup_by_key(|node| node.start);
        nodes
    }

    /// Walk the whole tree validating the structural invariants, reports the
    /// first violation found
    pub fn check(&self) -> Result<(), StrataErr> {
        let Some(root) = self.root else {
            return Ok(());
        };

        if self[root].father.is_some() || self[root].prev.is_some() || self[root].next.is_some() {
            return Err(StrataErr::at_chunk(
                &self[root].id,
                "root is linked into a sibling chain",
            ));
        }

        let mut seen = HashSet::new();
        self.check_chain(root, &mut seen)
    }

    fn check_chain(&self, head: Handle, seen: &mut HashSet<String>) -> Result<(), StrataErr> {
        let mut iter = Some(head);
        while let Some(handle) = iter {
            let chunk = &self[handle];

            if !seen.insert(chunk.id.clone()) {
                return Err(StrataErr::at_chunk(&chunk.id, "duplicate id"));
            }

            if chunk.start >= chunk.end {
                return Err(StrataErr::at_chunk(
                    &chunk.id,
                    &format!("start {} >= end {}", chunk.start, chunk.end),
                ));
            }

            match chunk.prev {
                Some(prev) => {
                    if self[prev].next != Some(handle) {
                        return Err(StrataErr::at_chunk(&chunk.id, "prev/next links disagree"));
                    }
                    if chunk.start != self[prev].end {
                        return Err(StrataErr::at_chunk(
                            &chunk.id,
                            &format!("start {} != prev end {}", chunk.start, self[prev].end),
                        ));
                    }
                }
                None => {
                    if chunk.start != 0 {
                        return Err(StrataErr::at_chunk(
                            &chunk.id,
                            &format!("first sibling starts at {}", chunk.start),
                        ));
                    }
                    if let Some(father) = chunk.father {
                        if self[father].son != Some(handle) {
                            return Err(StrataErr::at_chunk(
                                &chunk.id,
                                "father does not point at first child",
                            ));
                        }
                    }
                }
            }

            if let Some(father) = chunk.father {
                let end = self.abs_end(handle);
                let father_end = self.abs_end(father);
                if end > father_end {
                    return Err(StrataErr::at_chunk(
                        &chunk.id,
                        &format!("ends at {} past father end {}", end, father_end),
                    ));
                }
                if chunk.next.is_none() && end != father_end {
                    return Err(StrataErr::at_chunk(
                        &chunk.id,
                        &format!("last child ends at {} but father ends at {}", end, father_end),
                    ));
                }
            }

            if let Some(son) = chunk.son {
                if self.get(son).map(|c| c.father) != Some(Some(handle)) {
                    return Err(StrataErr::at_chunk(&chunk.id, "son does not point back"));
                }
                self.check_chain(son, seen)?;
            }

            iter = chunk.next;
        }

        Ok(())
    }

    /// Consistency check that takes the whole process down on violation
    pub fn check_or_abort(&self) {
        if let Err(err) = self.check() {
            fatal!(err);
        }
    }
}
