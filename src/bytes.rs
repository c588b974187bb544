//! This file contains the buffer-only editing primitives. None of these touch
//! a chunk tree, callers pair every buffer edit with the matching tree edit.
//!
//! SPDX-License-Identifier: MIT

/// Insert `copy_len` bytes taken from `copy_start` of the original buffer at
/// `insert_at`. Returns false, leaving the buffer alone, if either range is
/// out of bounds
pub fn copy_and_insert(
    buf: &mut Vec<u8>,
    insert_at: usize,
    copy_start: usize,
    copy_len: usize,
) -> bool {
    let Some(copy_end) = copy_start.checked_add(copy_len) else {
        return false;
    };
    if insert_at > buf.len() || copy_end > buf.len() {
        return false;
    }

    // Snapshot the block first, the insert may land inside it
    let block = buf[copy_start..copy_end].to_vec();
    buf.splice(insert_at..insert_at, block);
    true
}

/// Insert caller supplied bytes at `insert_at`
pub fn insert_data(buf: &mut Vec<u8>, insert_at: usize, data: &[u8]) -> bool {
    if insert_at > buf.len() {
        return false;
    }

    buf.splice(insert_at..insert_at, data.iter().copied());
    true
}

/// Remove `[delete_start, delete_start + delete_len)`
pub fn delete_data(buf: &mut Vec<u8>, delete_start: usize, delete_len: usize) -> bool {
    let Some(delete_end) = delete_start.checked_add(delete_len) else {
        return false;
    };
    if delete_end > buf.len() {
        return false;
    }

    buf.drain(delete_start..delete_end);
    true
}
