//! Tag list decoding and normalization.
//!
//! The upstream sometimes delivers a tag list as a JSON string whose content
//! is itself the JSON array (`"[\"a\",\"b\"]"`). Every consumer of tag data
//! goes through this module, which unwraps exactly one such extra layer and
//! otherwise degrades to an empty list instead of failing the record.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;
use thiserror::Error;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace pattern"));

/// Maximum normalized tag length; longer tags are dropped.
pub const MAX_TAG_LEN: usize = 64;

/// Why a tag list could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TagParseError {
    #[error("tag list is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("tag list is not an array of strings (found {0})")]
    NotAList(&'static str),
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn list_of_strings(value: Value) -> Result<Vec<String>, TagParseError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(TagParseError::NotAList(kind(&other))),
            })
            .collect(),
        other => Err(TagParseError::NotAList(kind(&other))),
    }
}

/// Decode a tag list from an already-parsed JSON value.
///
/// A string value is unwrapped once and its content must be the list.
pub fn try_tags_from_value(value: Value) -> Result<Vec<String>, TagParseError> {
    match value {
        Value::String(inner) => {
            if inner.trim().is_empty() {
                return Ok(Vec::new());
            }
            let unwrapped: Value = serde_json::from_str(&inner)
                .map_err(|e| TagParseError::InvalidJson(e.to_string()))?;
            list_of_strings(unwrapped)
        }
        other => list_of_strings(other),
    }
}

/// Decode a tag list from stored or received JSON text.
pub fn try_parse_tag_list(raw: &str) -> Result<Vec<String>, TagParseError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value =
        serde_json::from_str(raw).map_err(|e| TagParseError::InvalidJson(e.to_string()))?;
    try_tags_from_value(value)
}

/// Lenient form of [`try_parse_tag_list`]: undecodable input yields `[]`.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    try_parse_tag_list(raw).unwrap_or_default()
}

/// Lenient form of [`try_tags_from_value`].
pub fn tags_from_value(value: Value) -> Vec<String> {
    try_tags_from_value(value).unwrap_or_default()
}

/// Normalize one tag: trim, lowercase, whitespace runs become `-`.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = WHITESPACE_RUN
        .replace_all(&trimmed.to_lowercase(), "-")
        .into_owned();
    if normalized.len() > MAX_TAG_LEN {
        return None;
    }
    Some(normalized)
}

/// Normalize a list, dropping empties and duplicates (first occurrence wins).
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .filter_map(|t| normalize_tag(t.as_ref()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Serde helper for DTO fields carrying a tag list in any of the shapes the
/// upstream produces. Never fails; see [`tags_from_value`].
pub fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    Ok(normalize_tags(tags_from_value(value)))
}
