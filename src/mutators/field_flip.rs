//! This file contains the field flip stage: AFL's deterministic passes run
//! field by field over the leaves in buffer order. Walking bit flips of 1, 2
//! and 4 bits, byte flips of 1, 2 and 4 bytes, +/- arithmetic and interesting
//! value overwrites of 1, 2 and 4 byte numbers. No window ever crosses a leaf
//! boundary, the tree never changes, and the touched bytes are put back right
//! after every trial.
//!
//! SPDX-License-Identifier: MIT

use std::ops::Range;

use super::{Baseline, Executor, Stage, StageConfig, StageCore, StageReport, Trial};
use crate::err::StrataErr;
use crate::number::{interesting_values, number_add, write_number, Endian, ARITH_MAX};

/// One deterministic sub-pass, run in declaration order over every leaf
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pass {
    Flip1,
    Flip2,
    Flip4,
    Flip8,
    Flip16,
    Flip32,
    Arith8,
    Arith16,
    Arith32,
    Interest8,
    Interest16,
    Interest32,
}

impl Pass {
    pub const ALL: [Pass; 12] = [
        Pass::Flip1,
        Pass::Flip2,
        Pass::Flip4,
        Pass::Flip8,
        Pass::Flip16,
        Pass::Flip32,
        Pass::Arith8,
        Pass::Arith16,
        Pass::Arith32,
        Pass::Interest8,
        Pass::Interest16,
        Pass::Interest32,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            Pass::Flip1 => "flip1",
            Pass::Flip2 => "flip2",
            Pass::Flip4 => "flip4",
            Pass::Flip8 => "flip8",
            Pass::Flip16 => "flip16",
            Pass::Flip32 => "flip32",
            Pass::Arith8 => "arith8",
            Pass::Arith16 => "arith16",
            Pass::Arith32 => "arith32",
            Pass::Interest8 => "int8",
            Pass::Interest16 => "int16",
            Pass::Interest32 => "int32",
        }
    }

    // Bits walked by the bit flips, bytes by everything else
    fn width(self) -> usize {
        match self {
            Pass::Flip1 | Pass::Flip8 | Pass::Arith8 | Pass::Interest8 => 1,
            Pass::Flip2 | Pass::Flip16 | Pass::Arith16 | Pass::Interest16 => 2,
            Pass::Flip4 | Pass::Flip32 | Pass::Arith32 | Pass::Interest32 => 4,
        }
    }

    fn walks_bits(self) -> bool {
        matches!(self, Pass::Flip1 | Pass::Flip2 | Pass::Flip4)
    }

    // Every window position of a leaf spanning `[start, end)` such that the
    // window stays inside the leaf
    fn positions(self, start: usize, end: usize) -> Range<usize> {
        let last = self.width() - 1;
        if self.walks_bits() {
            start * 8..(end * 8).saturating_sub(last)
        } else {
            start..end.saturating_sub(last)
        }
    }

    // Edits tried at one window position
    fn edits_at(self, pos: usize) -> Vec<Edit> {
        let width = self.width();
        let endians: &[Endian] = if width == 1 {
            &[Endian::Little]
        } else {
            &[Endian::Little, Endian::Big]
        };

        match self {
            Pass::Flip1 | Pass::Flip2 | Pass::Flip4 => vec![Edit::Bits { first: pos, count: width }],
            Pass::Flip8 | Pass::Flip16 | Pass::Flip32 => vec![Edit::Invert { at: pos, width }],
            Pass::Arith8 | Pass::Arith16 | Pass::Arith32 => {
                let mut edits = Vec::with_capacity(ARITH_MAX * endians.len() * 2);
                for j in 1..=ARITH_MAX as i64 {
                    for &endian in endians {
                        edits.push(Edit::Add { at: pos, width, delta: j, endian });
                        edits.push(Edit::Add { at: pos, width, delta: -j, endian });
                    }
                }
                edits
            }
            Pass::Interest8 | Pass::Interest16 | Pass::Interest32 => {
                let values = interesting_values(width);
                let mut edits = Vec::with_capacity(values.len() * endians.len());
                for &endian in endians {
                    for &value in &values {
                        edits.push(Edit::Set { at: pos, width, value, endian });
                    }
                }
                edits
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Edit {
    Bits { first: usize, count: usize },
    Invert { at: usize, width: usize },
    Add { at: usize, width: usize, delta: i64, endian: Endian },
    Set { at: usize, width: usize, value: u64, endian: Endian },
}

impl Edit {
    // Bytes the edit can touch
    fn bytes(&self) -> Range<usize> {
        match *self {
            Edit::Bits { first, count } => first >> 3..((first + count - 1) >> 3) + 1,
            Edit::Invert { at, width }
            | Edit::Add { at, width, .. }
            | Edit::Set { at, width, .. } => at..at + width,
        }
    }

    fn apply(&self, buf: &mut [u8]) {
        match *self {
            Edit::Bits { first, count } => {
                for bit in first..first + count {
                    flip_bit(buf, bit);
                }
            }
            Edit::Invert { at, width } => {
                for byte in &mut buf[at..at + width] {
                    *byte ^= 0xFF;
                }
            }
            Edit::Add { at, width, delta, endian } => {
                number_add(buf, at, width, delta, endian);
            }
            Edit::Set { at, width, value, endian } => {
                write_number(buf, at, width, value, endian);
            }
        }
    }
}

#[inline]
fn flip_bit(buf: &mut [u8], bit: usize) {
    buf[bit >> 3] ^= 128 >> (bit & 7);
}

pub struct FieldFlipStage {
    core: StageCore,
    passes: Vec<Pass>,
}

impl FieldFlipStage {
    pub fn new(config: &StageConfig) -> Self {
        Self::with_passes(config, &Pass::ALL)
    }

    /// Only run the given sub-passes, still in the order given
    pub fn with_passes(config: &StageConfig, passes: &[Pass]) -> Self {
        FieldFlipStage {
            core: StageCore::new(config),
            passes: passes.to_vec(),
        }
    }
}

impl Stage for FieldFlipStage {
    fn name(&self) -> &'static str {
        "field_flip"
    }

    fn short_name(&self) -> &'static str {
        "field_det"
    }

    fn run(&mut self, baseline: &Baseline, executor: &mut dyn Executor) -> Result<StageReport, StrataErr> {
        self.core.begin();

        let track = baseline.track.as_ref();
        let mut trial = Trial::from_baseline(baseline);
        let nodes = baseline.tree.node_list();

        for &pass in &self.passes {
            for node in &nodes {
                let end = node.end.min(trial.buf.len());
                for pos in pass.positions(node.start, end) {
                    for edit in pass.edits_at(pos) {
                        edit.apply(&mut trial.buf);
                        if self.core.submit(executor, &trial, track)? {
                            return Ok(self.core.report(true));
                        }

                        let touched = edit.bytes();
                        trial.buf[touched.clone()].copy_from_slice(&baseline.buf[touched]);
                    }
                }
            }
        }

        Ok(self.core.report(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkTree;
    use crate::description::FieldDesc;
    use crate::mutators::Recorder;

    fn sample() -> Baseline {
        let tree = ChunkTree::build(&[
            FieldDesc::new("a", 0, 1),
            FieldDesc::new("b", 1, 3)
                .with_children(vec![FieldDesc::new("b0", 0, 1), FieldDesc::new("b1", 1, 2)]),
        ]);
        Baseline::new(vec![0x00, 0xFF, 0x0F], tree, None).unwrap()
    }

    // A 4 byte word followed by a 1 byte tag
    fn word_and_tag() -> Baseline {
        let tree = ChunkTree::build(&[FieldDesc::new("word", 0, 4), FieldDesc::new("tag", 4, 5)]);
        Baseline::new(vec![0x01, 0x02, 0x03, 0x04, 0x80], tree, None).unwrap()
    }

    fn run(baseline: &Baseline, passes: &[Pass]) -> (StageReport, Recorder) {
        let mut recorder = Recorder::new();
        let report = FieldFlipStage::with_passes(&StageConfig::default(), passes)
            .run(baseline, &mut recorder)
            .unwrap();
        (report, recorder)
    }

    #[test]
    fn walks_every_bit_once() {
        let baseline = sample();
        let (report, recorder) = run(&baseline, &[Pass::Flip1]);

        assert_eq!(report.trials, 24);
        assert_eq!(recorder.buffers[0], vec![0x80, 0xFF, 0x0F]);
        assert_eq!(recorder.buffers[8], vec![0x00, 0x7F, 0x0F]);
        assert_eq!(recorder.buffers[23], vec![0x00, 0xFF, 0x0E]);

        // Exactly one bit differs in every trial
        for buf in &recorder.buffers {
            let diff: u32 = buf
                .iter()
                .zip(&baseline.buf)
                .map(|(a, b)| (a ^ b).count_ones())
                .sum();
            assert_eq!(diff, 1);
        }
    }

    #[test]
    fn trials_per_pass() {
        let baseline = word_and_tag();
        let expected = [
            (Pass::Flip1, 32 + 8),
            (Pass::Flip2, 31 + 7),
            (Pass::Flip4, 29 + 5),
            (Pass::Flip8, 4 + 1),
            (Pass::Flip16, 3),
            (Pass::Flip32, 1),
            (Pass::Arith8, 2 * ARITH_MAX * 5),
            (Pass::Arith16, 4 * ARITH_MAX * 3),
            (Pass::Arith32, 4 * ARITH_MAX),
            (Pass::Interest8, 9 * 5),
            (Pass::Interest16, 2 * 19 * 3),
            (Pass::Interest32, 2 * 27),
        ];

        let mut total = 0;
        for (pass, trials) in expected {
            let (report, recorder) = run(&baseline, &[pass]);
            assert_eq!(report.trials, trials, "{}", pass.short_name());
            assert_eq!(recorder.buffers.len(), trials);
            assert!(recorder.violations.is_empty());
            total += trials;
        }

        let mut recorder = Recorder::new();
        let report = FieldFlipStage::new(&StageConfig::default())
            .run(&baseline, &mut recorder)
            .unwrap();
        assert_eq!(report.trials, total);
        assert!(!report.stopped);
    }

    #[test]
    fn windows_stay_inside_one_field() {
        let baseline = word_and_tag();
        let (_, recorder) = run(&baseline, &Pass::ALL);

        for buf in &recorder.buffers {
            assert_eq!(buf.len(), baseline.buf.len());
            let changed: Vec<usize> = (0..buf.len()).filter(|&i| buf[i] != baseline.buf[i]).collect();
            if let (Some(&first), Some(&last)) = (changed.first(), changed.last()) {
                assert!(last < 4 || first >= 4, "{:?} straddles word and tag", changed);
            }
        }
    }

    #[test]
    fn edits_are_undone_between_trials() {
        let baseline = word_and_tag();

        let (_, recorder) = run(&baseline, &[Pass::Flip2, Pass::Flip8]);
        assert_eq!(recorder.buffers[0], vec![0xC1, 0x02, 0x03, 0x04, 0x80]);
        assert_eq!(recorder.buffers[1], vec![0x61, 0x02, 0x03, 0x04, 0x80]);
        assert_eq!(recorder.buffers[42], vec![0x01, 0x02, 0x03, 0x04, 0x7F]);

        // LE +1, LE -1, BE +1, BE -1 on the first two bytes
        let (_, recorder) = run(&baseline, &[Pass::Arith16]);
        assert_eq!(&recorder.buffers[0][..2], &[0x02, 0x02]);
        assert_eq!(&recorder.buffers[1][..2], &[0x00, 0x02]);
        assert_eq!(&recorder.buffers[2][..2], &[0x01, 0x03]);
        assert_eq!(&recorder.buffers[3][..2], &[0x01, 0x01]);
        assert_eq!(&recorder.buffers[3][2..], &baseline.buf[2..]);

        let (_, recorder) = run(&baseline, &[Pass::Interest32]);
        assert_eq!(recorder.buffers[0], vec![0x80, 0xFF, 0xFF, 0xFF, 0x80]);
        assert_eq!(recorder.buffers[27], vec![0xFF, 0xFF, 0xFF, 0x80, 0x80]);
    }

    #[test]
    fn short_fields_skip_wide_passes() {
        let baseline = sample();
        for pass in [Pass::Flip16, Pass::Flip32, Pass::Arith16, Pass::Arith32, Pass::Interest32] {
            let (report, _) = run(&baseline, &[pass]);
            assert_eq!(report.trials, 0, "{}", pass.short_name());
        }
    }

    #[test]
    fn stops_when_asked() {
        let baseline = sample();
        let mut recorder = Recorder::with_limit(10);
        let report = FieldFlipStage::new(&StageConfig::default())
            .run(&baseline, &mut recorder)
            .unwrap();
        assert!(report.stopped);
        assert_eq!(report.trials, 10);
    }
}
