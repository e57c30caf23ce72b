//! JSON flattening into `"key: value"` lines.
//!
//! A JSON file is turned into plain text by walking the value tree and
//! emitting one line per scalar, prefixed with the path that leads to it:
//!
//! ```text
//! {"name": "Aries", "traits": ["bold", "driven"], "meta": {"element": "fire"}}
//!
//! name: Aries
//! traits[0]: bold
//! traits[1]: driven
//! meta.element: fire
//! ```
//!
//! A top-level array of records becomes one text per record; any other
//! top-level shape becomes a single text. Recursion stops at `max_depth`,
//! where the rest of the subtree is written as compact JSON.

use serde_json::Value;

/// Depth limit used by the document loader.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// Flatten one JSON value into `path: value` lines.
pub fn flatten_json(value: &Value, max_depth: usize) -> Vec<String> {
    let mut lines = Vec::new();
    walk(value, String::new(), 0, max_depth, &mut lines);
    lines
}

/// Split a parsed JSON file into record texts.
///
/// Returns `(row, text)` pairs. `row` is `Some(i)` for elements of a top-level
/// array and `None` for a single-object (or scalar) file. Records that
/// flatten to nothing are dropped.
pub fn json_records(value: &Value, max_depth: usize) -> Vec<(Option<usize>, String)> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| (Some(i), flatten_json(item, max_depth).join("\n")))
            .filter(|(_, text)| !text.is_empty())
            .collect(),
        other => {
            let text = flatten_json(other, max_depth).join("\n");
            if text.is_empty() {
                Vec::new()
            } else {
                vec![(None, text)]
            }
        }
    }
}

fn walk(value: &Value, path: String, depth: usize, max_depth: usize, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if depth >= max_depth {
                out.push(line(&path, &value.to_string()));
                return;
            }
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                walk(child, child_path, depth + 1, max_depth, out);
            }
        }
        Value::Array(items) => {
            if depth >= max_depth {
                out.push(line(&path, &value.to_string()));
                return;
            }
            for (i, child) in items.iter().enumerate() {
                walk(child, format!("{}[{}]", path, i), depth + 1, max_depth, out);
            }
        }
        Value::String(s) => out.push(line(&path, s)),
        scalar => out.push(line(&path, &scalar.to_string())),
    }
}

fn line(path: &str, value: &str) -> String {
    if path.is_empty() {
        value.to_string()
    } else {
        format!("{}: {}", path, value)
    }
}
