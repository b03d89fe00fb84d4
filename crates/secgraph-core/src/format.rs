//! Plain-text rendering of result envelopes
//!
//! Pure string construction with no failure path: any well-formed envelope
//! renders, including empty result sets and failures.

use crate::envelope::{FieldValue, Record, ResultEnvelope};

const NO_RESULTS: &str = "No results found.";

/// Render an envelope for terminal display.
///
/// Failures render as `Error: {message}`. Each record becomes its
/// `key: value` pairs joined with ` | `, wrapped at `width` columns;
/// records are separated by a blank line. A `width` of zero disables
/// wrapping.
pub fn format_envelope(envelope: &ResultEnvelope, width: usize) -> String {
    if !envelope.success {
        let message = envelope.error.as_deref().unwrap_or("unknown error");
        return format!("Error: {}", message);
    }

    let records = match envelope.result {
        Some(ref records) if !records.is_empty() => records,
        _ => return NO_RESULTS.to_string(),
    };

    records
        .iter()
        .map(|record| wrap_line(&render_record(record), width))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// One record as ` | `-joined `key: value` pairs, null fields skipped
fn render_record(record: &Record) -> String {
    let pairs: Vec<String> = record
        .iter()
        .filter(|(_, value)| !matches!(value, FieldValue::Null))
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect();
    if pairs.is_empty() {
        NO_RESULTS.to_string()
    } else {
        pairs.join(" | ")
    }
}

/// Greedy word wrap. A token longer than the width stands on its own line.
fn wrap_line(text: &str, width: usize) -> String {
    if width == 0 {
        return text.to_string();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}
