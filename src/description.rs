//! This file contains the adapter between the on-disk structural description
//! of an input (a JSON "format" file) and the `FieldDesc` list a `ChunkTree`
//! is built from. The format is an ordered object keyed by field identifier:
//!
//! ```text
//! { "hdr":  { "start": 0, "end": 4, "type": "header",
//!             "son": { "magic": { "start": 0, "end": 4 } } },
//!   "body": { "start": 4, "end": 16 } }
//! ```
//!
//! Offsets are relative to the enclosing field. Key order matters, so
//! `serde_json` is built with `preserve_order`.
//!
//! SPDX-License-Identifier: MIT

use serde_json::{json, Map, Value};

use crate::chunk::{ChunkTree, Cons, ConsKind, Handle};
use crate::err::StrataErr;

/// One named field as handed over by the description provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDesc {
    pub id: String,
    pub start: usize,
    pub end: usize,
    pub kind: Option<String>,
    pub cons: Vec<Cons>,
    pub children: Vec<FieldDesc>,
}

impl FieldDesc {
    pub fn new(id: &str, start: usize, end: usize) -> Self {
        FieldDesc {
            id: id.to_string(),
            start,
            end,
            kind: None,
            cons: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder helper for nested descriptions
    pub fn with_children(mut self, children: Vec<FieldDesc>) -> Self {
        self.children = children;
        self
    }
}

// Missing or negative bounds disqualify a field
fn get_bound(field: &Value, key: &str) -> Option<usize> {
    let value = field.get(key)?.as_i64()?;
    usize::try_from(value).ok()
}

fn parse_cons_kind(name: &str) -> Option<ConsKind> {
    match name {
        "length_meta" => Some(ConsKind::LengthMeta),
        "length_payload" => Some(ConsKind::LengthPayload),
        "offset_meta" => Some(ConsKind::OffsetMeta),
        "offset_payload" => Some(ConsKind::OffsetPayload),
        _ => None,
    }
}

fn cons_kind_name(kind: ConsKind) -> &'static str {
    match kind {
        ConsKind::LengthMeta => "length_meta",
        ConsKind::LengthPayload => "length_payload",
        ConsKind::OffsetMeta => "offset_meta",
        ConsKind::OffsetPayload => "offset_payload",
    }
}

// Optional "constraint" list on a field, malformed entries are dropped
fn parse_cons(field: &Value) -> Vec<Cons> {
    let Some(list) = field.get("constraint").and_then(Value::as_array) else {
        return Vec::new();
    };

    list.iter()
        .filter_map(|entry| {
            let target = entry.get("target")?.as_str()?.to_string();
            let kind = parse_cons_kind(entry.get("kind")?.as_str()?)?;
            let k = entry.get("k").and_then(Value::as_u64).unwrap_or(1) as u32;
            let b = entry.get("b").and_then(Value::as_u64).unwrap_or(0) as u32;
            Some(Cons { target, kind, k, b })
        })
        .collect()
}

/// Convert one level of the JSON object into field descriptors
pub fn fields_from_object(object: &Map<String, Value>) -> Vec<FieldDesc> {
    let mut fields = Vec::with_capacity(object.len());

    for (id, field) in object {
        let (Some(start), Some(end)) = (get_bound(field, "start"), get_bound(field, "end")) else {
            continue;
        };

        let mut desc = FieldDesc::new(id, start, end);
        desc.kind = field.get("type").and_then(Value::as_str).map(str::to_string);
        desc.cons = parse_cons(field);

        if let Some(son) = field.get("son").and_then(Value::as_object) {
            desc.children = fields_from_object(son);
        }

        fields.push(desc);
    }

    fields
}

/// Parse the text of a format file into field descriptors
pub fn parse_description(text: &str) -> Result<Vec<FieldDesc>, StrataErr> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| StrataErr::from(&format!("Unable to parse description: {}", e)))?;

    let Some(object) = value.as_object() else {
        return Err(StrataErr::from("Description top level must be an object"));
    };

    Ok(fields_from_object(object))
}

/// Parse a format file straight into a chunk tree
pub fn load_tree(text: &str) -> Result<ChunkTree, StrataErr> {
    let fields = parse_description(text)?;
    let tree = ChunkTree::build(&fields);

    if tree.root().is_none() {
        return Err(StrataErr::from("Description contains no usable fields"));
    }

    Ok(tree)
}

fn chain_to_json(tree: &ChunkTree, head: Handle) -> Value {
    let mut object = Map::new();

    for handle in tree.siblings(head) {
        let chunk = &tree[handle];
        let mut field = Map::new();
        field.insert("start".to_string(), json!(chunk.start));
        field.insert("end".to_string(), json!(chunk.end));

        if let Some(kind) = &chunk.kind {
            field.insert("type".to_string(), json!(kind));
        }

        if !chunk.cons.is_empty() {
            let cons: Vec<Value> = chunk
                .cons
                .iter()
                .map(|c| {
                    json!({
                        "target": c.target,
                        "kind": cons_kind_name(c.kind),
                        "k": c.k,
                        "b": c.b,
                    })
                })
                .collect();
            field.insert("constraint".to_string(), Value::Array(cons));
        }

        if let Some(son) = chunk.son {
            field.insert("son".to_string(), chain_to_json(tree, son));
        }

        object.insert(chunk.id.clone(), Value::Object(field));
    }

    Value::Object(object)
}

/// Serialize a (possibly mutated) tree back into the format file shape
pub fn tree_to_json(tree: &ChunkTree) -> Value {
    match tree.root() {
        Some(root) => chain_to_json(tree, root),
        None => Value::Object(Map::new()),
    }
}

impl ChunkTree {
    pub fn to_json(&self) -> Value {
        tree_to_json(self)
    }
}
