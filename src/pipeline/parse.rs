//! Response parsing: model completion → [`AnalysisRecord`].
//!
//! The prompt asks the model for one `key: value` pair per line. Models mostly
//! comply but routinely add a preamble, drop a field, leave a value blank or
//! write a confidence like "high". The parser therefore works line by line
//! and never fails on a single bad line:
//!
//! * lines without `:` are ignored;
//! * the key/value split happens on the **first** `:` only, so values may
//!   contain colons (`primary_focus: Steel: fatigue behaviour`);
//! * each known key has a coercion function in [`FIELD_COERCIONS`];
//! * unknown keys are kept verbatim in [`AnalysisRecord::extra`];
//! * expected keys the model never wrote get a typed default and are listed
//!   in [`AnalysisRecord::missing_fields`].
//!
//! A prose answer without any expected key still yields a record: every
//! field is defaulted and listed as missing. Only a blank completion is a
//! [`ParseError`].

use crate::output::AnalysisRecord;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::warn;

/// A completion that could not be turned into a record.
///
/// Carries the raw text so callers can log or store what the model said.
#[derive(Debug, Clone, Error)]
#[error("Failed to parse response: {reason}")]
pub struct ParseError {
    pub reason: String,
    pub raw_response: String,
}

/// A coerced field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

type Coercion = fn(&str) -> FieldValue;

/// Every expected field with the coercion applied to its value.
pub static FIELD_COERCIONS: [(&str, Coercion); 7] = [
    ("is_relevant", coerce_bool),
    ("confidence_score", coerce_score),
    ("primary_focus", coerce_text),
    ("recommendation", coerce_text),
    ("materials_identified", coerce_list),
    ("key_evidence", coerce_list),
    ("exclusion_reasons", coerce_list),
];

/// `true` only for the literal text "true", in any case.
fn coerce_bool(value: &str) -> FieldValue {
    FieldValue::Bool(value.eq_ignore_ascii_case("true"))
}

/// Finite float, else 0.0. Unparseable text is logged, not rejected.
fn coerce_score(value: &str) -> FieldValue {
    if value.is_empty() {
        return FieldValue::Float(0.0);
    }
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => FieldValue::Float(v),
        _ => {
            warn!("Unparseable confidence_score '{}', using 0.0", value);
            FieldValue::Float(0.0)
        }
    }
}

fn coerce_text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

/// Comma-separated list; pieces trimmed, empties dropped, order kept.
fn coerce_list(value: &str) -> FieldValue {
    FieldValue::List(
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn coercion_for(key: &str) -> Option<&'static (&'static str, Coercion)> {
    FIELD_COERCIONS.iter().find(|(name, _)| *name == key)
}

/// Parse a raw completion into an [`AnalysisRecord`].
///
/// Deterministic and side-effect free apart from logging: parsing the same
/// text twice yields equal records.
pub fn parse_response(raw: &str) -> Result<AnalysisRecord, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError {
            reason: "empty response".to_string(),
            raw_response: raw.to_string(),
        });
    }

    let mut record = AnalysisRecord::default();
    let mut seen: BTreeSet<&'static str> = BTreeSet::new();

    for line in raw.trim().lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match coercion_for(key) {
            Some(&(name, coerce)) => {
                record.apply(name, coerce(value));
                seen.insert(name);
            }
            None => {
                record.extra.insert(key.to_string(), value.to_string());
            }
        }
    }

    if seen.is_empty() {
        let preview: String = raw.chars().take(200).collect();
        warn!("LLM response contains no expected key. Response: '{}...'", preview);
    }

    for &(name, _) in FIELD_COERCIONS.iter() {
        if !seen.contains(name) {
            warn!("LLM response missing expected key: '{}'", name);
            record.missing_fields.push(name.to_string());
        }
    }

    Ok(record)
}
