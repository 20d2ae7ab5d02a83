//! SQL literal and identifier quoting.
//!
//! [`escape_literal`] is the single choke point every value passes through
//! before it is substituted into a statement. Values are emitted as
//! dollar-quoted strings, which PostgreSQL reads verbatim: quotes, backslashes
//! and semicolons inside the body carry no meaning. The only way out of a
//! dollar-quoted body is its own closing tag, so the tag is chosen such that
//! it cannot occur early.
//!
//! Identifiers are double-quoted with [`quote_ident`]. Callers only ever pass
//! names taken from a validated column schema or table binding.

use sync_core::RawValue;

/// The sink's NULL literal.
pub const NULL_LITERAL: &str = "NULL";

const TAG_PREFIX: &str = "m2p";

/// Render a value as a SQL literal.
///
/// - `Null` → `NULL`
/// - documents and arrays → JSON text, then dollar-quoted
/// - everything else → its display text, dollar-quoted
pub fn escape_literal(value: &RawValue) -> String {
    match value {
        RawValue::Null => NULL_LITERAL.to_string(),
        RawValue::Document(_) | RawValue::Array(_) => dollar_quote(&value.to_json_string()),
        RawValue::Bool(_)
        | RawValue::Int(_)
        | RawValue::Float(_)
        | RawValue::String(_)
        | RawValue::Timestamp(_) => dollar_quote(&value.to_string()),
    }
}

/// Dollar-quote arbitrary text.
///
/// Uses `$$` unless the body would terminate it early, then falls back to
/// `$m2p$`, `$m2p_1$`, `$m2p_2$`, ... until a tag is found whose first
/// occurrence in `body + tag` is the closing one.
pub fn dollar_quote(body: &str) -> String {
    let mut attempt = 0usize;
    loop {
        let tag = match attempt {
            0 => "$$".to_string(),
            1 => format!("${TAG_PREFIX}$"),
            n => format!("${TAG_PREFIX}_{}$", n - 1),
        };
        if closes_only_at_end(body, &tag) {
            return format!("{tag}{body}{tag}");
        }
        attempt += 1;
    }
}

fn closes_only_at_end(body: &str, tag: &str) -> bool {
    let mut candidate = String::with_capacity(body.len() + tag.len());
    candidate.push_str(body);
    candidate.push_str(tag);
    candidate.find(tag) == Some(body.len())
}

/// Double-quote an identifier, doubling any embedded double quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
