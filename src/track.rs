//! This file contains the track, the field semantics layered on top of a
//! chunk tree: which fields are enums (and their legal values), which field
//! holds the length or the offset of which other field, and free-form
//! constraints between two fields.
//!
//! The text form has one declaration per line, tokens split on any of `();{}`:
//!
//! ```text
//! (kind;0000000000000000;Enum;2;{[01];[02, 00];})
//! (len;body;Length;0)
//! (ptr;data;Offset;1)
//! (a;b;Constraint;3)
//! ```
//!
//! SPDX-License-Identifier: MIT

use std::fmt;

use crate::err::StrataErr;

const DELIMITERS: &[char] = &['(', ')', ';', '{', '}'];
const CANDIDATE_DELIMITERS: &[char] = &['[', ']', ',', ' '];

/// Placeholder second identifier written for enum declarations
const ENUM_FILLER: &str = "0000000000000000";

/// An enumerated field: the declared candidates come first, followed by the
/// byte reversal of each one
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumDecl {
    pub id: String,
    pub candidates: Vec<Vec<u8>>,
    declared: usize,
}

impl EnumDecl {
    pub fn new(id: &str, declared: Vec<Vec<u8>>) -> Self {
        let count = declared.len();
        let mut candidates = declared;
        for i in 0..count {
            let reversed = candidates[i].iter().rev().copied().collect();
            candidates.push(reversed);
        }

        EnumDecl {
            id: id.to_string(),
            candidates,
            declared: count,
        }
    }

    /// Candidates as written in the declaration, without the reversals
    pub fn declared(&self) -> &[Vec<u8>] {
        &self.candidates[..self.declared]
    }
}

/// `meta` holds the byte length of `payload`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LengthDecl {
    pub meta: String,
    pub payload: String,
}

/// `meta` holds the position of `payload`, from the start of the input when
/// `absolute`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffsetDecl {
    pub meta: String,
    pub payload: String,
    pub absolute: bool,
}

/// Opaque relationship between two fields, carried but never acted on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstraintDecl {
    pub left: String,
    pub right: String,
    pub kind: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Track {
    pub enums: Vec<EnumDecl>,
    pub lengths: Vec<LengthDecl>,
    pub offsets: Vec<OffsetDecl>,
    pub constraints: Vec<ConstraintDecl>,
}

// `[0A, 1B]` into bytes
fn parse_candidate(text: &str) -> Result<Vec<u8>, StrataErr> {
    text.split(CANDIDATE_DELIMITERS)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let digits = part
                .strip_prefix("0x")
                .or_else(|| part.strip_prefix("0X"))
                .unwrap_or(part);
            u8::from_str_radix(digits, 16)
                .map_err(|_| StrataErr::from(&format!("Bad candidate byte '{}'", part)))
        })
        .collect()
}

fn parse_number(token: Option<&str>, line: usize) -> Result<u32, StrataErr> {
    let token = token.ok_or_else(|| StrataErr::from(&format!("Line {}: missing number", line)))?;
    token
        .parse::<u32>()
        .map_err(|_| StrataErr::from(&format!("Line {}: bad number '{}'", line, token)))
}

impl Track {
    pub fn new() -> Self {
        Track::default()
    }

    /// No declarations at all
    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
            && self.lengths.is_empty()
            && self.offsets.is_empty()
            && self.constraints.is_empty()
    }

    /// Parse the text form. Lines with fewer than three tokens or an unknown
    /// kind are skipped, malformed numbers and candidates are errors
    pub fn parse(text: &str) -> Result<Self, StrataErr> {
        let mut track = Track::new();

        for (lineno, line) in text.lines().enumerate() {
            let lineno = lineno + 1;
            let mut tokens = line
                .split(DELIMITERS)
                .map(str::trim)
                .filter(|token| !token.is_empty());

            let (Some(id1), Some(id2), Some(kind)) = (tokens.next(), tokens.next(), tokens.next())
            else {
                continue;
            };

            match kind {
                "Enum" => {
                    let count = parse_number(tokens.next(), lineno)? as usize;
                    let mut declared = Vec::with_capacity(count);
                    for candidate in tokens.by_ref().take(count) {
                        let bytes = parse_candidate(candidate)?;
                        if !bytes.is_empty() {
                            declared.push(bytes);
                        }
                    }
                    track.enums.push(EnumDecl::new(id1, declared));
                }
                "Length" => {
                    track.lengths.push(LengthDecl {
                        meta: id1.to_string(),
                        payload: id2.to_string(),
                    });
                }
                "Offset" => {
                    let absolute = parse_number(tokens.next(), lineno)? != 0;
                    track.offsets.push(OffsetDecl {
                        meta: id1.to_string(),
                        payload: id2.to_string(),
                        absolute,
                    });
                }
                "Constraint" => {
                    let kind = parse_number(tokens.next(), lineno)?;
                    track.constraints.push(ConstraintDecl {
                        left: id1.to_string(),
                        right: id2.to_string(),
                        kind,
                    });
                }
                _ => continue,
            }
        }

        Ok(track)
    }
}

struct Candidate<'a>(&'a [u8]);

impl fmt::Display for Candidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        write!(f, "]")
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for decl in &self.enums {
            write!(f, "({};{};Enum;{};{{", decl.id, ENUM_FILLER, decl.declared)?;
            for candidate in decl.declared() {
                write!(f, "{};", Candidate(candidate))?;
            }
            writeln!(f, "}})")?;
        }

        for decl in &self.lengths {
            writeln!(f, "({};{};Length;0)", decl.meta, decl.payload)?;
        }

        for decl in &self.offsets {
            writeln!(f, "({};{};Offset;{})", decl.meta, decl.payload, decl.absolute as u32)?;
        }

        for decl in &self.constraints {
            writeln!(f, "({};{};Constraint;{})", decl.left, decl.right, decl.kind)?;
        }

        Ok(())
    }
}
