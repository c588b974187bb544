//! This file contains the structural havoc stage. Each burst stacks a handful
//! of random structure-level edits on a fresh copy of the baseline: chunks
//! get duplicated, deleted and swapped around, and when the input comes with
//! a track, enum, length and offset fields get targeted as well. This mirrors
//! what AFL's havoc does on raw bytes, just one level up.
//!
//! SPDX-License-Identifier: MIT

use super::{Baseline, Executor, Stage, StageConfig, StageCore, StageReport, Trial};
use crate::editor::{delete_chunk, exchange_chunk, insert_chunk};
use crate::err::StrataErr;
use crate::misc::Rng;
use crate::number::{
    infer_endian, number_add, number_set_interesting, number_subtract, Endian, ARITH_MAX,
};
use crate::track::Track;

/// Block size tiers, straight out of AFL
const HAVOC_BLK_SMALL: usize = 32;
const HAVOC_BLK_MEDIUM: usize = 128;
const HAVOC_BLK_LARGE: usize = 1500;
pub const HAVOC_BLK_XL: usize = 32768;

/// Edits that need nothing but the tree
const STRUCTURAL_OPS: usize = 4;

/// Every edit, track-aware ones included
const ALL_OPS: usize = 14;

/// Pick a block length the way AFL does, biased towards small blocks and
/// never above `limit`
pub fn choose_block_len(rng: &mut Rng, limit: usize) -> usize {
    if limit == 0 {
        return 0;
    }

    let (mut min_value, max_value) = match rng.below(3) {
        0 => (1, HAVOC_BLK_SMALL),
        1 => (HAVOC_BLK_SMALL, HAVOC_BLK_MEDIUM),
        _ => {
            if rng.below(10) != 0 {
                (HAVOC_BLK_MEDIUM, HAVOC_BLK_LARGE)
            } else {
                (HAVOC_BLK_LARGE, HAVOC_BLK_XL)
            }
        }
    };

    if min_value >= limit {
        min_value = 1;
    }

    min_value + rng.below(max_value.min(limit) - min_value + 1)
}

/// A length or offset relationship picked at random
struct Relation<'a> {
    meta: &'a str,
    payload: &'a str,
    is_length: bool,
}

// Coin flip between the two kinds, then a reservoir pick within the kind
fn pick_relation<'a>(rng: &mut Rng, track: &'a Track) -> Option<Relation<'a>> {
    if rng.coin() {
        rng.pick(&track.lengths).map(|decl| Relation {
            meta: &decl.meta,
            payload: &decl.payload,
            is_length: true,
        })
    } else {
        rng.pick(&track.offsets).map(|decl| Relation {
            meta: &decl.meta,
            payload: &decl.payload,
            is_length: false,
        })
    }
}

pub struct HavocStage {
    core: StageCore,
    multiplier: usize,
    stack: usize,
    max_size: usize,
}

impl HavocStage {
    pub fn new(config: &StageConfig) -> Self {
        HavocStage {
            core: StageCore::new(config),
            multiplier: config.havoc_multiplier,
            stack: config.havoc_stack,
            max_size: config.max_input_size,
        }
    }

    // Apply edit number `op` to the trial, misses are silently skipped
    fn apply(&mut self, op: usize, trial: &mut Trial, ids: &[String], track: Option<&Track>) {
        let rng = &mut self.core.rng;

        match op {
            // Copy a random chunk next to another random chunk
            0 => {
                let source = &ids[rng.below(ids.len())];
                let anchor = &ids[rng.below(ids.len())];
                let after = rng.coin();

                let Some(handle) = trial.index.resolve(&trial.tree, source) else {
                    return;
                };
                if trial.buf.len() + trial.tree[handle].len() > self.max_size {
                    return;
                }

                insert_chunk(&mut trial.buf, &mut trial.index, &mut trial.tree, source, anchor, after);
            }

            // Delete a random chunk
            1 | 2 => {
                let victim = &ids[rng.below(ids.len())];
                delete_chunk(&mut trial.buf, &mut trial.index, &mut trial.tree, victim);
            }

            // Swap two random siblings
            3 => {
                let id = &ids[rng.below(ids.len())];
                let Some(handle) = trial.index.resolve(&trial.tree, id) else {
                    return;
                };
                let Some(father) = trial.tree[handle].father else {
                    return;
                };

                let siblings = trial.tree.children(father);
                let (Some(&left), Some(&right)) = (rng.pick(&siblings), rng.pick(&siblings)) else {
                    return;
                };
                exchange_chunk(&mut trial.buf, &mut trial.tree, left, right);
            }

            // Replace an enum field with a legal candidate
            4 => {
                let Some(decl) = track.and_then(|t| rng.pick(&t.enums)) else {
                    return;
                };
                let Some(handle) = trial.index.resolve(&trial.tree, &decl.id) else {
                    return;
                };
                let Some(candidate) = rng.pick(&decl.candidates) else {
                    return;
                };

                let start = trial.tree.abs_start(handle);
                let len = trial.tree[handle].len().min(candidate.len());
                if start + len <= trial.buf.len() {
                    trial.buf[start..start + len].copy_from_slice(&candidate[..len]);
                }
            }

            // Nudge a length/offset meta, random byte order
            5 | 6 => {
                let Some(relation) = track.and_then(|t| pick_relation(rng, t)) else {
                    return;
                };
                let Some(handle) = trial.index.resolve(&trial.tree, relation.meta) else {
                    return;
                };

                let start = trial.tree.abs_start(handle);
                let width = trial.tree[handle].len();
                let amount = 1 + rng.below(ARITH_MAX);
                let endian = Endian::random(rng);
                if rng.coin() {
                    number_add(&mut trial.buf, start, width, amount as i64, endian);
                } else {
                    number_subtract(&mut trial.buf, start, width, amount as u64, endian);
                }
            }

            // Set a length/offset meta to an interesting value
            7 | 8 => {
                let Some(relation) = track.and_then(|t| pick_relation(rng, t)) else {
                    return;
                };
                let Some(handle) = trial.index.resolve(&trial.tree, relation.meta) else {
                    return;
                };

                let start = trial.tree.abs_start(handle);
                let width = trial.tree[handle].len();
                number_set_interesting(&mut trial.buf, start, width, rng);
            }

            // Insert bytes inside a payload
            9 | 10 => {
                let Some(relation) = track.and_then(|t| pick_relation(rng, t)) else {
                    return;
                };
                Self::payload_insert(rng, trial, &relation, self.max_size);
            }

            // Delete bytes from a payload
            11..=13 => {
                let Some(relation) = track.and_then(|t| pick_relation(rng, t)) else {
                    return;
                };
                Self::payload_delete(rng, trial, &relation);
            }

            _ => unreachable!(),
        }
    }

    // Endianness of a length meta, guessed from the payload length it holds
    fn length_endian(trial: &Trial, relation: &Relation) -> Option<(usize, Endian)> {
        let meta = trial.index.resolve(&trial.tree, relation.meta)?;
        let payload = trial.index.resolve(&trial.tree, relation.payload)?;

        let width = trial.tree[meta].len();
        let start = trial.tree.abs_start(meta);
        let expected = trial.tree[payload].len() as u64;
        Some((width, infer_endian(&trial.buf, start, width, expected)))
    }

    // Adjust the meta of a length relationship by `delta`
    fn adjust_length(trial: &mut Trial, relation: &Relation, layout: Option<(usize, Endian)>, delta: i64) {
        let Some((width, endian)) = layout else {
            return;
        };

        let Some(meta) = trial.index.resolve(&trial.tree, relation.meta) else {
            return;
        };

        // The edit resized the meta itself, its old width no longer applies
        if trial.tree[meta].len() != width {
            return;
        }

        let start = trial.tree.abs_start(meta);
        number_add(&mut trial.buf, start, width, delta, endian);
    }

    fn payload_insert(rng: &mut Rng, trial: &mut Trial, relation: &Relation, max_size: usize) {
        let Some(payload) = trial.index.resolve(&trial.tree, relation.payload) else {
            return;
        };

        let buf_len = trial.buf.len();
        let actually_clone = rng.below(4) != 0;
        let (clone_len, block) = if actually_clone {
            let clone_len = choose_block_len(rng, buf_len);
            let clone_from = rng.below(buf_len - clone_len + 1);
            (clone_len, trial.buf[clone_from..clone_from + clone_len].to_vec())
        } else {
            let clone_len = choose_block_len(rng, HAVOC_BLK_XL);
            let fill = if rng.coin() {
                rng.byte()
            } else {
                trial.buf[rng.below(buf_len)]
            };
            (clone_len, vec![fill; clone_len])
        };

        if clone_len == 0 || buf_len + clone_len > max_size {
            return;
        }

        let layout = if relation.is_length {
            Self::length_endian(trial, relation)
        } else {
            None
        };

        let clone_to = trial.tree.abs_start(payload) + rng.below(trial.tree[payload].len());
        if trial.insert_bytes(clone_to, &block) {
            Self::adjust_length(trial, relation, layout, clone_len as i64);
        }
    }

    fn payload_delete(rng: &mut Rng, trial: &mut Trial, relation: &Relation) {
        let Some(payload) = trial.index.resolve(&trial.tree, relation.payload) else {
            return;
        };

        let len = trial.tree[payload].len();
        if trial.buf.len() < 2 || len < 2 {
            return;
        }

        let layout = if relation.is_length {
            Self::length_endian(trial, relation)
        } else {
            None
        };

        let del_len = choose_block_len(rng, len - 1);
        let del_from = trial.tree.abs_start(payload) + rng.below(len - del_len);
        if trial.delete_bytes(del_from, del_len) {
            Self::adjust_length(trial, relation, layout, -(del_len as i64));
        }
    }
}

impl Stage for HavocStage {
    fn name(&self) -> &'static str {
        "havoc"
    }

    fn short_name(&self) -> &'static str {
        "struct_havoc"
    }

    fn run(&mut self, baseline: &Baseline, executor: &mut dyn Executor) -> Result<StageReport, StrataErr> {
        self.core.begin();

        // Everything below the root is a candidate
        let root = baseline.tree.root();
        let ids: Vec<String> = baseline
            .tree
            .preorder()
            .into_iter()
            .filter(|&handle| Some(handle) != root)
            .map(|handle| baseline.tree[handle].id.clone())
            .collect();

        if ids.is_empty() {
            return Ok(self.core.report(false));
        }

        let track = baseline.track.as_ref();
        let pool = if track.is_some() {
            ALL_OPS
        } else {
            STRUCTURAL_OPS
        };

        let bursts = ids.len() * self.multiplier;
        let mut trial = Trial::from_baseline(baseline);

        for _ in 0..bursts {
            for _ in 0..self.stack {
                let op = self.core.rng.below(pool);
                self.apply(op, &mut trial, &ids, track);
            }

            if self.core.submit(executor, &trial, track)? {
                return Ok(self.core.report(true));
            }

            trial.reset(baseline);
        }

        Ok(self.core.report(false))
    }
}
