//! Structure-aware mutation of binary inputs. An input is described by a
//! tree of named fields (`chunk`), optionally annotated with field semantics
//! (`track`), and mutated by stages (`mutators`) that keep the tree and the
//! bytes in agreement after every edit.
//!
//! SPDX-License-Identifier: MIT

pub mod misc;
pub mod err;

pub mod bytes;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod description;
pub mod editor;
pub mod index;
pub mod mutators;
pub mod number;
pub mod stats;
pub mod track;
