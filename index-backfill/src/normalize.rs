//! Record content → text sent to the embedding service.

use serde_json::{Map, Value};
use tracing::trace;

/// Boundary marker around the serialized content.
pub const DELIMITER: &str = "```";

/// Serializes a record's fields into the embedding input.
///
/// - Visits fields in key order, skipping `skip_field` (the vector itself).
/// - Strings verbatim, numbers/bools via display, `null` dropped, arrays and
///   objects flattened.
/// - Collapses every whitespace run (newlines included) into one space.
/// - Truncates to `max_chars` on a char boundary, then wraps in [`DELIMITER`].
pub fn embedding_text(fields: &Map<String, Value>, skip_field: &str, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (key, value) in fields {
        if key == skip_field {
            continue;
        }
        collect_scalars(value, &mut parts);
    }

    let joined = collapse_whitespace(&parts.join(" "));
    let body = truncate_chars(&joined, max_chars);
    trace!(
        fields = fields.len(),
        chars = body.chars().count(),
        "normalize::embedding_text"
    );

    let mut out = String::with_capacity(body.len() + 2 * DELIMITER.len());
    out.push_str(DELIMITER);
    out.push_str(body);
    out.push_str(DELIMITER);
    out
}

fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => items.iter().for_each(|v| collect_scalars(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_scalars(v, out)),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
