//! Value transforms applied when a mapping is materialized.

use crate::fields::Transformation;
use crate::notion_value::ExtractedValue;

/// Apply one transform to an extracted value. A transform that does not
/// fit the value's shape returns the value unchanged.
#[must_use]
pub fn apply_transformation(transformation: &Transformation, value: ExtractedValue) -> ExtractedValue {
    use ExtractedValue::*;
    match (transformation, value) {
        (Transformation::Lowercase, Text(text)) => Text(text.to_lowercase()),
        (Transformation::Uppercase, Text(text)) => Text(text.to_uppercase()),
        (Transformation::Capitalize, Text(text)) => Text(capitalize_words(&text)),
        (Transformation::Trim, Text(text)) => Text(text.trim().to_string()),
        (Transformation::Slug { separator }, Text(text)) => Text(slugify(&text, separator)),
        (Transformation::Round, Number(Some(n))) => Number(Some(n.round())),
        (Transformation::Floor, Number(Some(n))) => Number(Some(n.floor())),
        (Transformation::Ceil, Number(Some(n))) => Number(Some(n.ceil())),
        (Transformation::FirstOnly, List(values)) if !values.is_empty() => {
            Text(values.into_iter().next().unwrap_or_default())
        }
        (Transformation::Join { separator }, List(values)) => Text(values.join(separator)),
        (Transformation::Split { separator }, Text(text)) => List(
            text.split(separator.as_str())
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
        ),
        (Transformation::ToText, value) => to_text(value),
        (Transformation::WrapList, Text(text)) => List(vec![text]),
        (_, value) => value,
    }
}

fn to_text(value: ExtractedValue) -> ExtractedValue {
    use ExtractedValue::*;
    match value {
        Number(Some(n)) => Text(format_number(n)),
        Number(None) | Empty => Text(String::new()),
        Flag(true) => Text("Yes".to_string()),
        Flag(false) => Text("No".to_string()),
        List(values) => Text(values.join(", ")),
        other => other,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn capitalize_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if at_word_start {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        at_word_start = !ch.is_alphanumeric();
    }
    out
}

fn slugify(text: &str, separator: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_separator = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push_str(separator);
            }
            pending_separator = false;
            out.extend(ch.to_lowercase());
        } else if ch.is_whitespace() {
            pending_separator = true;
        }
    }
    out
}
