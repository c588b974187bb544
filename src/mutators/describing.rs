//! This file contains the description-aware stage, the systematic counterpart
//! to havoc. It walks the track declaration by declaration: every enum gets
//! every legal candidate, every length relationship gets its payload grown
//! and shrunk with the meta kept in agreement (and the meta itself set to
//! every interesting value), and every offset gets widened with matching
//! bytes inserted after it. Each trial starts from a clean baseline copy.
//!
//! SPDX-License-Identifier: MIT

use super::{Baseline, Executor, Stage, StageConfig, StageCore, StageReport, Trial};
use crate::err::StrataErr;
use crate::number::{infer_endian, interesting_values, is_numeric_width, write_number, Endian};
use crate::track::{ConstraintDecl, EnumDecl, LengthDecl, OffsetDecl, Track};

/// Payloads grow by up to this many bytes
const MAX_GROW: usize = 36;

/// Step between growth/shrink amounts
const LENGTH_STEP: usize = 2;

/// Offset metas are widened by 1..MAX_WIDEN bytes
const MAX_WIDEN: usize = 36;

pub struct DescribingStage {
    core: StageCore,
}

impl DescribingStage {
    pub fn new(config: &StageConfig) -> Self {
        DescribingStage {
            core: StageCore::new(config),
        }
    }

    // Try every candidate over the enum field, restoring the baseline bytes
    // after each one. Candidates longer than the field are skipped
    fn mutate_enum(
        &mut self,
        decl: &EnumDecl,
        baseline: &Baseline,
        trial: &mut Trial,
        executor: &mut dyn Executor,
    ) -> Result<bool, StrataErr> {
        let Some(handle) = trial.index.resolve(&trial.tree, &decl.id) else {
            return Ok(false);
        };

        let start = trial.tree.abs_start(handle);
        let len = trial.tree[handle].len();

        for candidate in &decl.candidates {
            let end = start + candidate.len();
            if candidate.len() > len || end > trial.buf.len() {
                continue;
            }

            trial.buf[start..end].copy_from_slice(candidate);
            if self.core.submit(executor, trial, baseline.track.as_ref())? {
                return Ok(true);
            }
            trial.buf[start..end].copy_from_slice(&baseline.buf[start..end]);
        }

        Ok(false)
    }

    fn mutate_length(
        &mut self,
        decl: &LengthDecl,
        baseline: &Baseline,
        trial: &mut Trial,
        executor: &mut dyn Executor,
    ) -> Result<bool, StrataErr> {
        let track = baseline.track.as_ref();

        let (Some(meta), Some(payload)) = (
            trial.index.resolve(&trial.tree, &decl.meta),
            trial.index.resolve(&trial.tree, &decl.payload),
        ) else {
            return Ok(false);
        };

        let width = trial.tree[meta].len();
        if !is_numeric_width(width) {
            return Ok(false);
        }

        let meta_start = trial.tree.abs_start(meta);
        let payload_len = trial.tree[payload].len();
        let endian = infer_endian(&trial.buf, meta_start, width, payload_len as u64);

        // Grow the payload, meta follows
        for amount in (LENGTH_STEP..=MAX_GROW).step_by(LENGTH_STEP) {
            if amount >= trial.buf.len() {
                break;
            }

            let rng = &mut self.core.rng;
            if trial.grow_payload(&decl.meta, &decl.payload, amount, endian, rng)
                && self.core.submit(executor, trial, track)?
            {
                return Ok(true);
            }
            trial.reset(baseline);
        }

        // Shrink it, meta follows
        for amount in (LENGTH_STEP..payload_len).step_by(LENGTH_STEP) {
            if trial.shrink_payload(&decl.meta, &decl.payload, amount, endian)
                && self.core.submit(executor, trial, track)?
            {
                return Ok(true);
            }
            trial.reset(baseline);
        }

        // Interesting values in both byte orders, single bytes only once
        let orders: &[Endian] = if width == 1 {
            &[Endian::Little]
        } else {
            &[Endian::Little, Endian::Big]
        };

        for value in interesting_values(width) {
            for &order in orders {
                write_number(&mut trial.buf, meta_start, width, value, order);
                if self.core.submit(executor, trial, track)? {
                    return Ok(true);
                }
            }
        }
        trial.reset(baseline);

        Ok(false)
    }

    fn mutate_offset(
        &mut self,
        decl: &OffsetDecl,
        baseline: &Baseline,
        trial: &mut Trial,
        executor: &mut dyn Executor,
    ) -> Result<bool, StrataErr> {
        let track = baseline.track.as_ref();

        let Some(meta) = trial.index.resolve(&trial.tree, &decl.meta) else {
            return Ok(false);
        };

        let width = trial.tree[meta].len();
        if !is_numeric_width(width) {
            return Ok(false);
        }

        // Only an absolute offset tells us what value to expect
        let payload = trial.index.resolve(&trial.tree, &decl.payload);
        let endian = match payload {
            Some(payload) if decl.absolute => {
                let meta_start = trial.tree.abs_start(meta);
                let expected = trial.tree.abs_start(payload) as u64;
                infer_endian(&trial.buf, meta_start, width, expected)
            }
            _ => Endian::Little,
        };

        for amount in 1..MAX_WIDEN {
            if amount > trial.buf.len() {
                break;
            }

            let rng = &mut self.core.rng;
            if trial.widen_offset(&decl.meta, amount, endian, rng)
                && self.core.submit(executor, trial, track)?
            {
                return Ok(true);
            }
            trial.reset(baseline);
        }

        Ok(false)
    }

    // Constraints are carried through untouched, no edit is derived from them
    fn mutate_constraint(&mut self, _decl: &ConstraintDecl) {}

    fn run_track(
        &mut self,
        track: &Track,
        baseline: &Baseline,
        trial: &mut Trial,
        executor: &mut dyn Executor,
    ) -> Result<bool, StrataErr> {
        for decl in &track.enums {
            if self.mutate_enum(decl, baseline, trial, executor)? {
                return Ok(true);
            }
        }

        for decl in &track.lengths {
            if self.mutate_length(decl, baseline, trial, executor)? {
                return Ok(true);
            }
        }

        for decl in &track.offsets {
            if self.mutate_offset(decl, baseline, trial, executor)? {
                return Ok(true);
            }
        }

        for decl in &track.constraints {
            self.mutate_constraint(decl);
        }

        Ok(false)
    }
}

impl Stage for DescribingStage {
    fn name(&self) -> &'static str {
        "describing"
    }

    fn short_name(&self) -> &'static str {
        "describing_aware"
    }

    fn run(&mut self, baseline: &Baseline, executor: &mut dyn Executor) -> Result<StageReport, StrataErr> {
        self.core.begin();

        // Nothing to describe without a track
        let Some(track) = baseline.track.as_ref() else {
            return Ok(self.core.report(false));
        };

        let mut trial = Trial::from_baseline(baseline);
        let stopped = self.run_track(track, baseline, &mut trial, executor)?;
        Ok(self.core.report(stopped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkTree;
    use crate::description::FieldDesc;
    use crate::mutators::Recorder;
    use crate::number::read_number;

    // ver:[0,2) kind:[2,3) len:[3,5) (big endian) body:[5,11) crc:[11,12)
    fn sample(track: &str) -> Baseline {
        let tree = ChunkTree::build(&[
            FieldDesc::new("ver", 0, 2),
            FieldDesc::new("kind", 2, 3),
            FieldDesc::new("len", 3, 5),
            FieldDesc::new("body", 5, 11),
            FieldDesc::new("crc", 11, 12),
        ]);
        let buf = b"V1k\x00\x06bbbbbbC".to_vec();
        Baseline::new(buf, tree, Some(Track::parse(track).unwrap())).unwrap()
    }

    fn verified() -> StageConfig {
        StageConfig {
            seed: Some(42),
            verify_trees: true,
            ..Default::default()
        }
    }

    #[test]
    fn enum_candidates_are_legal_and_local() {
        let baseline = sample("(ver;0;Enum;2;{[01, 02];[7F];})\n");
        let mut recorder = Recorder::new();
        let report = DescribingStage::new(&verified())
            .run(&baseline, &mut recorder)
            .unwrap();

        // Two declared candidates plus their reversals
        assert_eq!(report.trials, 4);
        let legal: [&[u8]; 3] = [&[0x01, 0x02], &[0x7F], &[0x02, 0x01]];
        for buf in &recorder.buffers {
            assert_eq!(&buf[2..], &baseline.buf[2..]);
            let hit = legal.iter().any(|cand| &buf[..cand.len()] == *cand);
            assert!(hit, "{:02X?} is not a candidate", &buf[..2]);
        }
    }

    #[test]
    fn oversized_candidates_are_skipped() {
        let baseline = sample("(kind;0;Enum;1;{[01, 02, 03];})\n");
        let mut recorder = Recorder::new();
        let report = DescribingStage::new(&verified())
            .run(&baseline, &mut recorder)
            .unwrap();
        assert_eq!(report.trials, 0);
    }

    #[test]
    fn length_mutations_keep_meta_in_sync() {
        let baseline = sample("(len;body;Length;0)\n");
        let mut recorder = Recorder::new();
        let report = DescribingStage::new(&verified())
            .run(&baseline, &mut recorder)
            .unwrap();
        assert!(recorder.violations.is_empty(), "{:?}", recorder.violations);

        // Growth: 2..=10 (the input is 12 bytes), shrink: 2 and 4
        let grown = 5;
        let shrunk = 2;
        let interesting = interesting_values(2).len() * 2;
        assert_eq!(report.trials, grown + shrunk + interesting);

        for buf in &recorder.buffers[..grown + shrunk] {
            let delta = buf.len() as i64 - baseline.buf.len() as i64;
            let meta = read_number(buf, 3, 2, Endian::Big).unwrap() as i64;
            assert_eq!(meta, 6 + delta);
            assert_eq!(&buf[..3], &baseline.buf[..3]);
            assert_eq!(*buf.last().unwrap(), b'C');
        }

        for buf in &recorder.buffers[grown + shrunk..] {
            assert_eq!(buf.len(), baseline.buf.len());
            assert_eq!(&buf[5..], &baseline.buf[5..]);
        }
    }

    #[test]
    fn offset_widening_inserts_after_meta() {
        let baseline = sample("(len;crc;Offset;1)\n");
        let mut recorder = Recorder::new();
        let report = DescribingStage::new(&verified())
            .run(&baseline, &mut recorder)
            .unwrap();

        // 1..=12, then the input is too short
        assert_eq!(report.trials, 12);
        assert!(recorder.violations.is_empty(), "{:?}", recorder.violations);
        for (i, buf) in recorder.buffers.iter().enumerate() {
            let amount = i + 1;
            assert_eq!(buf.len(), baseline.buf.len() + amount);
            assert_eq!(read_number(buf, 3, 2, Endian::Little), Some(0x0600 + amount as u64));
            assert_eq!(&buf[5 + amount..], &baseline.buf[5..]);
        }
    }

    #[test]
    fn constraints_alone_produce_nothing() {
        let baseline = sample("(ver;len;Constraint;1)\n");
        let mut recorder = Recorder::new();
        let report = DescribingStage::new(&verified())
            .run(&baseline, &mut recorder)
            .unwrap();
        assert_eq!(report.trials, 0);
        assert!(!report.stopped);
    }

    #[test]
    fn stop_verdict_ends_the_stage() {
        let baseline = sample("(len;body;Length;0)\n(len;crc;Offset;0)\n");
        let mut recorder = Recorder::with_limit(3);
        let report = DescribingStage::new(&verified())
            .run(&baseline, &mut recorder)
            .unwrap();
        assert!(report.stopped);
        assert_eq!(recorder.buffers.len(), 3);
    }
}
