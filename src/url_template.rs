//! Splits a URL template into its base URL and query parameters.
//!
//! Templates still contain `{{name}}` placeholders at this point, so they
//! are not parsed as URLs; only the structure around the placeholders is
//! checked.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("empty url")]
    Empty,

    #[error("missing protocol scheme")]
    MissingScheme,

    #[error("invalid control character in url")]
    ControlCharacter,

    #[error("invalid url escape \"{0}\"")]
    InvalidEscape(String),
}

/// Decompose `template` into `(base_url, query_params)`.
///
/// The fragment is dropped. Query values are percent-decoded; when a key
/// repeats, its first value wins.
pub fn decompose(
    template: &str,
) -> Result<(String, BTreeMap<String, String>), UrlError> {
    let template = template.trim();
    if template.is_empty() {
        return Err(UrlError::Empty);
    }
    if template.chars().any(|c| c.is_control()) {
        return Err(UrlError::ControlCharacter);
    }
    check_escapes(template)?;

    let without_fragment = match template.split_once('#') {
        Some((head, _)) => head,
        None => template,
    };
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, query),
        None => (without_fragment, ""),
    };

    if base.starts_with("://") {
        return Err(UrlError::MissingScheme);
    }
    if base.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut params = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key.is_empty() {
            continue;
        }
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }

    Ok((base.to_string(), params))
}

/// Every `%` must start a two-digit hex escape.
fn check_escapes(template: &str) -> Result<(), UrlError> {
    let bytes = template.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b'%' {
            continue;
        }
        let escape = bytes.get(idx + 1..idx + 3);
        let valid = escape
            .is_some_and(|pair| pair.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            let end = (idx + 3).min(template.len());
            let snippet = String::from_utf8_lossy(&bytes[idx..end]);
            return Err(UrlError::InvalidEscape(snippet.into_owned()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decompose_without_query() {
        let (base, params) =
            decompose("https://api.example.com/users").unwrap();
        assert_eq!(base, "https://api.example.com/users");
        assert!(params.is_empty());
    }

    #[test]
    fn test_decompose_with_templated_query() {
        let (base, params) =
            decompose("{{host}}/users?id={{user_id}}&sort=name%20asc")
                .unwrap();
        assert_eq!(base, "{{host}}/users");
        assert_eq!(params["id"], "{{user_id}}");
        assert_eq!(params["sort"], "name asc");
    }

    #[test]
    fn test_decompose_first_value_wins_and_fragment_dropped() {
        let (base, params) =
            decompose("http://h/p?a=1&a=2&b=#section").unwrap();
        assert_eq!(base, "http://h/p");
        assert_eq!(params["a"], "1");
        assert_eq!(params["b"], "");
    }

    #[test]
    fn test_decompose_rejects_malformed_templates() {
        assert_eq!(decompose("   "), Err(UrlError::Empty));
        assert_eq!(decompose("?a=1"), Err(UrlError::Empty));
        assert_eq!(decompose("://host/path"), Err(UrlError::MissingScheme));
        assert_eq!(
            decompose("http://host/\u{7f}"),
            Err(UrlError::ControlCharacter)
        );
        assert_eq!(
            decompose("http://host/%zz"),
            Err(UrlError::InvalidEscape("%zz".to_string()))
        );
        assert_eq!(
            decompose("http://host/%4"),
            Err(UrlError::InvalidEscape("%4".to_string()))
        );
    }
}
