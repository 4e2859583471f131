//! JSON content sniffing and parsing.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - A mongoexport-style dump, one object per line: `{"a":1}\n{"a":2}\n`
//!
//! The format is chosen from the first non-whitespace character; there is no fallback from one
//! format to the other.

use serde_json::Value;

use crate::error::{LoadError, LoadResult};
use crate::types::{GenericDocument, RawInput};

const BOM: char = '\u{feff}';

/// Layout detected from the leading character of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    /// A single JSON array of objects.
    Array,
    /// Newline-delimited JSON objects.
    Dump,
}

/// Detect the layout of `text` from its first non-whitespace character.
///
/// Returns `Ok(None)` for empty (or whitespace-only) content.
pub fn sniff_format(text: &str) -> Result<Option<ContentFormat>, char> {
    match text.trim_start_matches(BOM).trim_start().chars().next() {
        None => Ok(None),
        Some('[') => Ok(Some(ContentFormat::Array)),
        Some('{') => Ok(Some(ContentFormat::Dump)),
        Some(other) => Err(other),
    }
}

/// Parse an input into documents, in source order.
pub fn parse_documents(input: &RawInput) -> LoadResult<Vec<GenericDocument>> {
    let name = input.source_name();
    let text = std::str::from_utf8(input.content()).map_err(|e| LoadError::MalformedInput {
        input: name.to_string(),
        message: format!("content is not valid utf-8: {e}"),
    })?;

    match sniff_format(text) {
        Ok(None) => Err(LoadError::EmptyInput {
            input: name.to_string(),
        }),
        Ok(Some(ContentFormat::Array)) => parse_array(name, text.trim_start_matches(BOM)),
        Ok(Some(ContentFormat::Dump)) => parse_dump(name, text.trim_start_matches(BOM)),
        Err(found) => Err(LoadError::UnrecognizedFormat {
            input: name.to_string(),
            found,
        }),
    }
}

fn parse_array(name: &str, text: &str) -> LoadResult<Vec<GenericDocument>> {
    let value = serde_json::from_str::<Value>(text).map_err(|e| LoadError::MalformedInput {
        input: name.to_string(),
        message: format!("invalid json array: {e}"),
    })?;

    let Value::Array(items) = value else {
        return Err(LoadError::MalformedInput {
            input: name.to_string(),
            message: "top-level value is not an array".to_string(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(LoadError::MalformedInput {
                input: name.to_string(),
                message: format!("array element {idx} is not a json object"),
            }),
        })
        .collect()
}

fn parse_dump(name: &str, text: &str) -> LoadResult<Vec<GenericDocument>> {
    let mut docs = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str::<Value>(line).map_err(|e| LoadError::MalformedInput {
            input: name.to_string(),
            message: format!("invalid json at line {}: {}", i + 1, e),
        })?;
        match value {
            Value::Object(map) => docs.push(map),
            _ => {
                return Err(LoadError::MalformedInput {
                    input: name.to_string(),
                    message: format!("line {} is not a json object", i + 1),
                });
            }
        }
    }
    Ok(docs)
}
