//! Minimal JSON path support for extraction and assertions.
//!
//! Properties are written in dotted/bracket notation: `user.name`,
//! `items[0].id`, `items.0.id`, `headers["content.type"]`. A leading `$`
//! is accepted and ignored.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("key '{0}' not found")]
    MissingKey(String),

    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("'{0}' is not an array index")]
    NotAnIndex(String),

    #[error("cannot descend into {kind} at '{segment}'")]
    NotTraversable { segment: String, kind: &'static str },
}

/// Convert a property string into path segments.
pub fn to_path(property: &str) -> Vec<PathSegment> {
    let property = property.trim();
    let property = property.strip_prefix('$').unwrap_or(property);

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = property.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => flush_key(&mut current, &mut segments),
            '[' => {
                flush_key(&mut current, &mut segments);
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                segments.push(bracket_segment(inner.trim()));
            }
            _ => current.push(ch),
        }
    }
    flush_key(&mut current, &mut segments);

    segments
}

fn flush_key(current: &mut String, segments: &mut Vec<PathSegment>) {
    if !current.is_empty() {
        segments.push(PathSegment::Key(std::mem::take(current)));
    }
}

fn bracket_segment(inner: &str) -> PathSegment {
    let quoted = inner.len() >= 2
        && ((inner.starts_with('"') && inner.ends_with('"'))
            || (inner.starts_with('\'') && inner.ends_with('\'')));
    if quoted {
        return PathSegment::Key(inner[1..inner.len() - 1].to_string());
    }
    match inner.parse::<usize>() {
        Ok(idx) => PathSegment::Index(idx),
        Err(_) => PathSegment::Key(inner.to_string()),
    }
}

/// Walk `path` from `root`. An empty path returns `root` itself.
pub fn query<'a>(
    root: &'a Value,
    path: &[PathSegment],
) -> Result<&'a Value, QueryError> {
    let mut current = root;

    for segment in path {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map
                .get(key)
                .ok_or_else(|| QueryError::MissingKey(key.clone()))?,
            (Value::Object(map), PathSegment::Index(idx)) => map
                .get(&idx.to_string())
                .ok_or_else(|| QueryError::MissingKey(idx.to_string()))?,
            (Value::Array(items), PathSegment::Key(key)) => {
                let index = key
                    .parse::<usize>()
                    .map_err(|_| QueryError::NotAnIndex(key.clone()))?;
                index_into(items, index)?
            }
            (Value::Array(items), PathSegment::Index(idx)) => {
                index_into(items, *idx)?
            }
            (other, segment) => {
                return Err(QueryError::NotTraversable {
                    segment: segment.to_string(),
                    kind: kind_of(other),
                });
            }
        };
    }

    Ok(current)
}

fn index_into(items: &[Value], index: usize) -> Result<&Value, QueryError> {
    items.get(index).ok_or(QueryError::IndexOutOfRange {
        index,
        len: items.len(),
    })
}

/// Name of a JSON value's type, as used in error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
