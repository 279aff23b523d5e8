#![forbid(unsafe_code)]

//! Per-instance override payloads.
//!
//! A payload attribute holds either inline JSON (`{"count": 3}`) or a
//! reference `#some-id` to a node whose text content is the JSON. The result
//! must be a JSON object.

use crate::error::{BinderyError, Result};
use crate::host::HostTree;
use crate::value::{Map, Value};

/// Parse a raw payload attribute into an override map. Blank payloads yield
/// an empty map.
pub fn parse_payload(tree: &dyn HostTree, raw: &str) -> Result<Map> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    let text = match raw.strip_prefix('#') {
        Some(id) => {
            let node = tree
                .by_id(id)
                .ok_or_else(|| BinderyError::malformed(format!("no node with id `{id}`")))?;
            tree.text_content(node)
        }
        None => raw.to_owned(),
    };
    match serde_json::from_str::<serde_json::Value>(&text)? {
        serde_json::Value::Object(fields) => Ok(fields
            .into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect()),
        other => Err(BinderyError::malformed(format!(
            "expected an object, found {}",
            Value::from_json(other).type_name()
        ))),
    }
}
