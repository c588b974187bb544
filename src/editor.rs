//! This file contains the structural editors. Every operation here keeps a
//! byte buffer and its chunk tree in lock step: a size change at one chunk is
//! pushed up through every ancestor's `end` and across the later siblings at
//! every level, so relative offsets stay correct after each call.
//!
//! Methods on `ChunkTree` only touch the tree, the free functions at the bottom
//! are the composite edits that also rewrite the buffer.
//!
//! SPDX-License-Identifier: MIT

use crate::bytes::{copy_and_insert, delete_data};
use crate::chunk::{shifted, Chunk, ChunkTree, Handle};
use crate::index::IdIndex;

impl ChunkTree {
    /// Shift `start` and `end` of every chunk in a sibling chain by `delta`
    pub fn add_len(&mut self, head: Option<Handle>, delta: isize) {
        let mut iter = head;
        while let Some(handle) = iter {
            let chunk = &mut self[handle];
            chunk.start = shifted(chunk.start, delta);
            chunk.end = shifted(chunk.end, delta);
            iter = chunk.next;
        }
    }

    // Absorb a size change at `item`: its later siblings move, every ancestor
    // grows and the later siblings of every ancestor move as well. `item`
    // itself is left alone
    fn propagate(&mut self, item: Handle, delta: isize) {
        let next = self[item].next;
        self.add_len(next, delta);

        let mut father = self[item].father;
        while let Some(f) = father {
            let end = self[f].end;
            self[f].end = shifted(end, delta);

            let next = self[f].next;
            self.add_len(next, delta);
            father = self[f].father;
        }
    }

    // Rewrite prev/next along an ordered chain
    fn relink(&mut self, chain: &[Handle]) {
        for (i, &handle) in chain.iter().enumerate() {
            self[handle].prev = if i == 0 { None } else { Some(chain[i - 1]) };
            self[handle].next = chain.get(i + 1).copied();
        }
    }

    /// Remove `item` from its sibling chain. Every ancestor shrinks by the
    /// item's length and everything after it moves left. The item keeps its
    /// `father` (so callers can walk up afterwards) but loses its sibling
    /// links. Nothing is freed. Returns false for a chunk without a father
    pub fn detach(&mut self, item: Handle) -> bool {
        let Some(father) = self[item].father else {
            return false;
        };

        let len = self[item].len() as isize;
        self.propagate(item, -len);

        let prev = self[item].prev;
        let next = self[item].next;
        match prev {
            Some(p) => self[p].next = next,
            None => self[father].son = next,
        }
        if let Some(n) = next {
            self[n].prev = prev;
        }

        self[item].prev = None;
        self[item].next = None;
        true
    }

    // Detach, drop from the index, free
    fn discard(&mut self, index: &mut IdIndex, item: Handle) {
        self.detach(item);
        index.delete_from_map(self, item, false);
        self.free(Some(item), false);
    }

    /// Link the unattached chunk `new` right after `item`. It is rebased to
    /// start where `item` ends, and the ancestors and later siblings make room
    /// for it
    pub fn insert_after(&mut self, item: Handle, new: Handle) {
        let len = self[new].len();
        let start = self[item].end;
        self[new].start = start;
        self[new].end = start + len;

        self.propagate(item, len as isize);

        let next = self[item].next;
        if let Some(n) = next {
            self[n].prev = Some(new);
        }
        self[new].next = next;
        self[new].prev = Some(item);
        self[new].father = self[item].father;
        self[item].next = Some(new);
    }

    /// Deepest chunk of the chain at `head` that contains absolute offset `pos`
    pub fn find_chunk_include(&self, head: Handle, pos: usize) -> Option<Handle> {
        let mut iter = Some(head);
        while let Some(handle) = iter {
            if self.abs_end(handle) <= pos {
                iter = self[handle].next;
            } else if self.abs_start(handle) > pos {
                return None;
            } else if let Some(son) = self[handle].son {
                iter = Some(son);
            } else {
                return Some(handle);
            }
        }

        None
    }

    /// Absorb `insert_len` raw bytes inserted at absolute `insert_to` into the
    /// leaf covering that offset, no new chunk is created. Inserting at the
    /// very end grows the last leaf
    pub fn insert_block(&mut self, insert_to: usize, insert_len: usize) -> bool {
        let Some(root) = self.root() else {
            return false;
        };

        let span = self.span();
        if insert_len == 0 || insert_to > span {
            return false;
        }

        let pos = if insert_to == span {
            insert_to.saturating_sub(1)
        } else {
            insert_to
        };

        let Some(item) = self.find_chunk_include(root, pos) else {
            return false;
        };

        self[item].end += insert_len;
        self.propagate(item, insert_len as isize);
        true
    }

    /// Reflect the removal of the absolute byte range
    /// `[delete_from, delete_from + delete_len)` in the tree. Chunks straddling
    /// the range are trimmed, chunks inside it are removed, and any chunk left
    /// with zero width is collapsed. The root is never collapsed: a range
    /// covering the whole tree is refused
    pub fn delete_block(&mut self, index: &mut IdIndex, delete_from: usize, delete_len: usize) -> bool {
        let Some(root) = self.root() else {
            return false;
        };

        let root_start = self[root].start;
        let root_len = self[root].len();
        if delete_len == 0
            || delete_len >= root_len
            || delete_from < root_start
            || (delete_from - root_start)
                .checked_add(delete_len)
                .map_or(true, |end| end > root_len)
        {
            return false;
        }

        let lo = delete_from - root_start;
        self.delete_son_block(index, root, lo, lo + delete_len);
        self[root].end -= delete_len;
        true
    }

    // Cut `[lo, hi)`, given relative to `father`'s start, out of its children.
    // The father's own `end` is the caller's job
    fn delete_son_block(&mut self, index: &mut IdIndex, father: Handle, lo: usize, hi: usize) {
        let kids = self.children(father);
        if kids.is_empty() {
            return;
        }

        let mut kept = Vec::with_capacity(kids.len());
        for kid in kids {
            let (start, end) = (self[kid].start, self[kid].end);

            // Bytes removed ahead of this chunk, and from inside it
            let before = hi.min(start).saturating_sub(lo);
            let cut_lo = lo.max(start);
            let cut_hi = hi.min(end);
            let inside = cut_hi.saturating_sub(cut_lo);

            if inside > 0 {
                self.delete_son_block(index, kid, cut_lo - start, cut_hi - start);
            }

            self[kid].start = start - before;
            self[kid].end = end - before - inside;

            if self[kid].is_empty() {
                index.delete_from_map(self, kid, false);
                self.free(Some(kid), false);
            } else {
                kept.push(kid);
            }
        }

        self[father].son = kept.first().copied();
        self.relink(&kept);
    }

    /// Swap the positions of two chunks of the chain at `head`, returns the
    /// (possibly new) head. Only links change, byte ranges are untouched
    pub fn swap_chunks(&mut self, head: Handle, left: Handle, right: Handle) -> Handle {
        let mut chain = self.siblings(head);
        let left_at = chain.iter().position(|&h| h == left);
        let right_at = chain.iter().position(|&h| h == right);

        let (Some(left_at), Some(right_at)) = (left_at, right_at) else {
            return head;
        };

        chain.swap(left_at, right_at);
        self.relink(&chain);
        chain[0]
    }

    /// Graft the tail of `other` onto the head of `self` at absolute
    /// `split_at`. The result describes `buf1[..split_at] ++ buf2[split_at..]`.
    /// A split at 0 yields `other` untouched, a split at (or past) the end of
    /// `self` yields `self` untouched, and a split past the end of `other`
    /// yields only the truncated `self`
    pub fn splice_tree(mut self, mut other: ChunkTree, split_at: usize) -> ChunkTree {
        let Some(head_root) = self.root() else {
            return other;
        };
        let Some(tail_root) = other.root() else {
            return self;
        };

        if split_at == 0 {
            return other;
        }

        let head_span = self.span();
        if split_at >= head_span {
            return self;
        }

        // Neither tree is shared, a throwaway index absorbs the unmapping
        let mut scratch = IdIndex::new();
        self.delete_block(&mut scratch, split_at, head_span - split_at);

        let tail_span = other.span();
        if split_at >= tail_span {
            return self;
        }
        other.delete_block(&mut scratch, 0, split_at);

        let head_len = self[head_root].len();
        let tail_len = other[tail_root].len();

        let tail = self.import(&other, tail_root, false);
        self[tail].start = head_len;
        self[tail].end = head_len + tail_len;

        let mut index = IdIndex::build(&self);
        index.set_id_add_map(&mut self, tail);

        let root_id = self[head_root].id.clone();
        let root = self.alloc(Chunk::new(&root_id, 0, head_len + tail_len));
        index.set_id_add_map(&mut self, root);

        self[root].son = Some(head_root);
        self[head_root].father = Some(root);
        self[tail].father = Some(root);
        self.relink(&[head_root, tail]);
        self.set_root(Some(root));
        self
    }
}

/// Clone the chunk `chunk_id` (bytes and structure) and place the copy right
/// after (or before) the chunk `insert_id`. The copy's identifiers are
/// regenerated where they collide. Returns false, with buffer and tree
/// untouched, when either identifier is unresolved, either chunk is the root
/// or the source is empty
pub fn insert_chunk(
    buf: &mut Vec<u8>,
    index: &mut IdIndex,
    tree: &mut ChunkTree,
    chunk_id: &str,
    insert_id: &str,
    after: bool,
) -> bool {
    let (Some(source), Some(item)) = (index.resolve(tree, chunk_id), index.resolve(tree, insert_id)) else {
        return false;
    };

    let Some(father) = tree[item].father else {
        return false;
    };

    if tree[source].father.is_none() || tree[source].is_empty() {
        return false;
    }

    let clone_len = tree[source].len();
    let copy_start = tree.abs_start(source);
    let insert_at = if after {
        tree.abs_end(item)
    } else {
        tree.abs_start(item)
    };

    if !copy_and_insert(buf, insert_at, copy_start, clone_len) {
        return false;
    }

    let dup = tree.duplicate(source, false);
    index.set_id_add_map(tree, dup);

    // Inserting ahead of a first child goes through a zero-width anchor
    let mut sentinel = None;
    let anchor = match (after, tree[item].prev) {
        (true, _) => item,
        (false, Some(prev)) => prev,
        (false, None) => {
            let start = tree[item].start;
            let mut anchor = Chunk::new("", start, start);
            anchor.father = Some(father);
            anchor.next = Some(item);
            let anchor = tree.alloc(anchor);

            tree[item].prev = Some(anchor);
            tree[father].son = Some(anchor);
            sentinel = Some(anchor);
            anchor
        }
    };

    tree.insert_after(anchor, dup);

    if let Some(anchor) = sentinel {
        tree[father].son = Some(dup);
        tree[dup].prev = None;
        tree.free(Some(anchor), false);
    }

    true
}

/// Remove the chunk `id` and its bytes. Ancestors left with zero width are
/// removed too, all the way up but never the root. Returns false, with
/// buffer and tree untouched, when the identifier is unresolved, names the
/// root, or would empty the buffer
pub fn delete_chunk(buf: &mut Vec<u8>, index: &mut IdIndex, tree: &mut ChunkTree, id: &str) -> bool {
    let Some(victim) = index.resolve(tree, id) else {
        return false;
    };

    let mut father = tree[victim].father;
    if father.is_none() {
        return false;
    }

    let delete_start = tree.abs_start(victim);
    let delete_len = tree[victim].len();
    if delete_len >= buf.len() || delete_start + delete_len > buf.len() {
        return false;
    }

    tree.discard(index, victim);

    while let Some(f) = father {
        if tree[f].father.is_none() || !tree[f].is_empty() {
            break;
        }

        father = tree[f].father;
        tree.discard(index, f);
    }

    delete_data(buf, delete_start, delete_len)
}

/// Swap two sibling chunks, bytes and structure. The pair may be given in
/// either order. Chunks between them move by the difference in length.
/// Returns false when the chunks are the same, have no father or have
/// different fathers
pub fn exchange_chunk(buf: &mut Vec<u8>, tree: &mut ChunkTree, left: Handle, right: Handle) -> bool {
    if left == right {
        return false;
    }

    let (Some(father), Some(other)) = (tree[left].father, tree[right].father) else {
        return false;
    };

    if father != other {
        return false;
    }

    let (left, right) = if tree[left].start < tree[right].start {
        (left, right)
    } else {
        (right, left)
    };

    let (left_start, left_end) = (tree.abs_start(left), tree.abs_end(left));
    let (right_start, right_end) = (tree.abs_start(right), tree.abs_end(right));
    if right_end > buf.len() {
        return false;
    }

    let mut swapped = Vec::with_capacity(buf.len());
    swapped.extend_from_slice(&buf[..left_start]);
    swapped.extend_from_slice(&buf[right_start..right_end]);
    swapped.extend_from_slice(&buf[left_end..right_start]);
    swapped.extend_from_slice(&buf[left_start..left_end]);
    swapped.extend_from_slice(&buf[right_end..]);
    *buf = swapped;

    let left_len = tree[left].len();
    let right_len = tree[right].len();
    let gap = right_len as isize - left_len as isize;

    let mut iter = tree[left].next;
    while let Some(handle) = iter {
        if handle == right {
            break;
        }
        let chunk = &mut tree[handle];
        chunk.start = shifted(chunk.start, gap);
        chunk.end = shifted(chunk.end, gap);
        iter = chunk.next;
    }

    let base = tree[left].start;
    let top = tree[right].end;
    tree[right].start = base;
    tree[right].end = base + right_len;
    tree[left].end = top;
    tree[left].start = top - left_len;

    let head = tree[father].son.unwrap_or(left);
    let head = tree.swap_chunks(head, left, right);
    tree[father].son = Some(head);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::FieldDesc;

    fn leaf(id: &str, start: usize, end: usize) -> FieldDesc {
        FieldDesc::new(id, start, end)
    }

    // A:[0,4) B:[4,6) C:[6,10)
    fn abc() -> (Vec<u8>, ChunkTree, IdIndex) {
        let tree = ChunkTree::build(&[leaf("A", 0, 4), leaf("B", 4, 6), leaf("C", 6, 10)]);
        let index = IdIndex::build(&tree);
        (b"aaaabbcccc".to_vec(), tree, index)
    }

    // hdr:[0,3) rec:[3,11) { tag:[0,2) body:[2,8) { x:[0,3) y:[3,6) } } end:[11,12)
    fn nested() -> (Vec<u8>, ChunkTree, IdIndex) {
        let body = leaf("body", 2, 8).with_children(vec![leaf("x", 0, 3), leaf("y", 3, 6)]);
        let rec = leaf("rec", 3, 11).with_children(vec![leaf("tag", 0, 2), body]);
        let tree = ChunkTree::build(&[leaf("hdr", 0, 3), rec, leaf("end", 11, 12)]);
        let index = IdIndex::build(&tree);
        (b"HHHTTxxxyyyE".to_vec(), tree, index)
    }

    fn ranges(tree: &ChunkTree, father: Handle) -> Vec<(String, usize, usize)> {
        tree.children(father)
            .into_iter()
            .map(|h| (tree[h].id.clone(), tree[h].start, tree[h].end))
            .collect()
    }

    fn leaf_len_sum(tree: &ChunkTree) -> usize {
        tree.preorder()
            .into_iter()
            .filter(|&h| tree[h].is_leaf())
            .map(|h| tree[h].len())
            .sum()
    }

    #[test]
    fn delete_then_reinsert_scenario() {
        let (mut buf, mut tree, mut index) = abc();
        let root = tree.root().unwrap();

        assert!(delete_chunk(&mut buf, &mut index, &mut tree, "B"));
        assert_eq!(buf.len(), 8);
        assert_eq!(
            ranges(&tree, root),
            vec![("A".to_string(), 0, 4), ("C".to_string(), 4, 8)]
        );
        tree.check().unwrap();

        assert!(insert_chunk(&mut buf, &mut index, &mut tree, "A", "C", true));
        assert_eq!(buf, b"aaaaccccaaaa");
        let kids = ranges(&tree, root);
        assert_eq!(kids.len(), 3);
        assert_eq!((kids[2].1, kids[2].2), (8, 12));
        assert_ne!(kids[2].0, "A");
        assert!(index.resolve(&tree, &kids[2].0).is_some());
        tree.check().unwrap();
    }

    #[test]
    fn insert_before_first_child() {
        let (mut buf, mut tree, mut index) = abc();
        assert!(insert_chunk(&mut buf, &mut index, &mut tree, "C", "A", false));
        assert_eq!(buf, b"ccccaaaabbcccc");

        let root = tree.root().unwrap();
        let first = tree[root].son.unwrap();
        assert!(tree[first].id.starts_with("C@"));
        assert_eq!((tree[first].start, tree[first].end), (0, 4));
        assert!(tree[first].prev.is_none());
        tree.check().unwrap();

        // The anchor slot went back to the arena
        assert_eq!(tree.live_count(), 5);
    }

    #[test]
    fn insert_before_middle_child() {
        let (mut buf, mut tree, mut index) = abc();
        assert!(insert_chunk(&mut buf, &mut index, &mut tree, "B", "C", false));
        assert_eq!(buf, b"aaaabbbbcccc");
        tree.check().unwrap();
        assert_eq!(tree.span(), buf.len());
    }

    #[test]
    fn insert_chunk_misses_are_no_ops() {
        let (mut buf, mut tree, mut index) = abc();
        assert!(!insert_chunk(&mut buf, &mut index, &mut tree, "nope", "A", true));
        assert!(!insert_chunk(&mut buf, &mut index, &mut tree, "A", "root", true));
        assert!(!insert_chunk(&mut buf, &mut index, &mut tree, "root", "A", true));
        assert_eq!(buf, b"aaaabbcccc");
        assert_eq!(tree.live_count(), 4);
    }

    #[test]
    fn insert_nested_copy_renames_descendants() {
        let (mut buf, mut tree, mut index) = nested();
        assert!(insert_chunk(&mut buf, &mut index, &mut tree, "body", "hdr", true));
        assert_eq!(buf.len(), 18);
        assert_eq!(&buf[3..9], b"xxxyyy");
        tree.check().unwrap();
        assert_eq!(index.len(), tree.live_count());
        assert_eq!(leaf_len_sum(&tree), buf.len());
    }

    #[test]
    fn delete_cascades_through_emptied_ancestors() {
        let body = leaf("body", 0, 4).with_children(vec![leaf("only", 0, 4)]);
        let rec = leaf("rec", 2, 6).with_children(vec![body]);
        let mut tree = ChunkTree::build(&[leaf("hdr", 0, 2), rec, leaf("tail", 6, 8)]);
        let mut index = IdIndex::build(&tree);
        let mut buf = b"hhoooott".to_vec();

        assert!(delete_chunk(&mut buf, &mut index, &mut tree, "only"));
        assert_eq!(buf, b"hhtt");
        for id in ["only", "body", "rec"] {
            assert!(index.resolve(&tree, id).is_none(), "{} survived", id);
        }
        assert_eq!(tree.live_count(), 3);
        tree.check().unwrap();
    }

    #[test]
    fn delete_chunk_refuses_whole_buffer() {
        let mut tree = ChunkTree::build(&[leaf("all", 0, 4).with_children(vec![leaf("x", 0, 4)])]);
        let mut index = IdIndex::build(&tree);
        let mut buf = b"abcd".to_vec();
        assert!(!delete_chunk(&mut buf, &mut index, &mut tree, "x"));
        assert!(!delete_chunk(&mut buf, &mut index, &mut tree, "all"));
        assert_eq!(buf, b"abcd");
    }

    #[test]
    fn exchange_is_an_involution() {
        let (mut buf, mut tree, mut index) = abc();
        let a = index.get("A").unwrap();
        let c = index.get("C").unwrap();

        assert!(exchange_chunk(&mut buf, &mut tree, a, c));
        assert_eq!(buf, b"ccccbbaaaa");
        tree.check().unwrap();
        let root = tree.root().unwrap();
        let ids: Vec<String> = ranges(&tree, root).into_iter().map(|r| r.0).collect();
        assert_eq!(ids, vec!["C", "B", "A"]);

        assert!(exchange_chunk(&mut buf, &mut tree, a, c));
        assert_eq!(buf, b"aaaabbcccc");
        tree.check().unwrap();

        index = IdIndex::build(&tree);
        assert_eq!(index.get("A"), Some(a));
    }

    #[test]
    fn exchange_shifts_unequal_neighbours() {
        let (mut buf, mut tree, index) = abc();
        let b = index.get("B").unwrap();
        let c = index.get("C").unwrap();

        assert!(exchange_chunk(&mut buf, &mut tree, c, b));
        assert_eq!(buf, b"aaaaccccbb");
        let root = tree.root().unwrap();
        assert_eq!(
            ranges(&tree, root),
            vec![
                ("A".to_string(), 0, 4),
                ("C".to_string(), 4, 8),
                ("B".to_string(), 8, 10)
            ]
        );
        tree.check().unwrap();
    }

    #[test]
    fn exchange_rejects_strangers() {
        let (mut buf, mut tree, index) = nested();
        let hdr = index.get("hdr").unwrap();
        let x = index.get("x").unwrap();
        let root = tree.root().unwrap();
        assert!(!exchange_chunk(&mut buf, &mut tree, hdr, x));
        assert!(!exchange_chunk(&mut buf, &mut tree, hdr, hdr));
        assert!(!exchange_chunk(&mut buf, &mut tree, root, hdr));
        assert_eq!(buf, b"HHHTTxxxyyyE");
    }

    #[test]
    fn swap_chunks_returns_new_head() {
        let (_, mut tree, index) = abc();
        let a = index.get("A").unwrap();
        let b = index.get("B").unwrap();
        let c = index.get("C").unwrap();

        let head = tree.swap_chunks(a, a, c);
        assert_eq!(head, c);
        assert_eq!(tree.siblings(head), vec![c, b, a]);
        assert!(tree[c].prev.is_none());
        assert!(tree[a].next.is_none());
    }

    #[test]
    fn insert_block_grows_enclosing_leaf() {
        let (_, mut tree, index) = nested();
        assert!(tree.insert_block(6, 3));
        let x = index.get("x").unwrap();
        let y = index.get("y").unwrap();
        assert_eq!((tree[x].start, tree[x].end), (0, 6));
        assert_eq!(tree.abs_start(y), 11);
        assert_eq!(tree.span(), 15);
        tree.check().unwrap();

        // Inserting at the very end grows the last leaf
        assert!(tree.insert_block(15, 2));
        let end = index.get("end").unwrap();
        assert_eq!(tree[end].len(), 3);
        tree.check().unwrap();

        assert!(!tree.insert_block(99, 1));
    }

    #[test]
    fn delete_block_trims_straddled_chunks() {
        let (_, mut tree, mut index) = nested();
        // Covers the tail of hdr, all of tag and the head of x
        assert!(tree.delete_block(&mut index, 1, 5));
        tree.check().unwrap();
        assert_eq!(tree.span(), 7);

        assert!(index.resolve(&tree, "tag").is_none());
        let hdr = index.get("hdr").unwrap();
        let x = index.get("x").unwrap();
        assert_eq!(tree[hdr].len(), 1);
        assert_eq!(tree[x].len(), 2);
        assert_eq!(tree.abs_start(x), 1);
        assert_eq!(leaf_len_sum(&tree), 7);
    }

    #[test]
    fn delete_block_collapses_and_refuses_root() {
        let (_, mut tree, mut index) = nested();
        // Exactly rec
        assert!(tree.delete_block(&mut index, 3, 8));
        for id in ["rec", "tag", "body", "x", "y"] {
            assert!(index.resolve(&tree, id).is_none());
        }
        tree.check().unwrap();
        assert_eq!(tree.span(), 4);

        assert!(!tree.delete_block(&mut index, 0, 4));
        assert!(!tree.delete_block(&mut index, 2, 3));
        assert!(!tree.delete_block(&mut index, 1, 0));
    }

    #[test]
    fn splice_boundaries() {
        let (_, t1, _) = abc();
        let (_, t2, _) = nested();

        let spliced = t1.clone().splice_tree(t2.clone(), 0);
        assert_eq!(spliced.span(), 12);
        assert!(spliced.find("body").is_some());

        let spliced = t1.clone().splice_tree(t2, 10);
        assert_eq!(spliced.span(), 10);
        assert!(spliced.find("body").is_none());
        spliced.check().unwrap();
    }

    #[test]
    fn splice_in_the_middle() {
        let (buf1, t1, _) = abc();
        let (buf2, t2, _) = nested();
        let split = 5;

        let spliced = t1.splice_tree(t2, split);
        let mut buf = buf1[..split].to_vec();
        buf.extend_from_slice(&buf2[split..]);

        spliced.check().unwrap();
        assert_eq!(spliced.span(), buf.len());
        assert_eq!(leaf_len_sum(&spliced), buf.len());

        let root = spliced.root().unwrap();
        let halves = spliced.children(root);
        assert_eq!(halves.len(), 2);
        assert_eq!(spliced[halves[0]].len(), split);
        assert_eq!(spliced.abs_start(halves[1]), split);

        // The head keeps A and the first byte of B, the tail starts inside x
        let x = spliced.find("x").unwrap();
        assert_eq!(spliced.abs_start(x), split);
        assert_eq!(spliced[x].len(), 3);
    }

    #[test]
    fn splice_past_second_tree_keeps_head() {
        let short = ChunkTree::build(&[leaf("p", 0, 2), leaf("q", 2, 3)]);
        let (_, t1, _) = abc();
        let spliced = t1.splice_tree(short, 6);
        spliced.check().unwrap();
        assert_eq!(spliced.span(), 6);
    }
}
