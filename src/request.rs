//! Turns a declared request step into the concrete request to send.

use crate::context::VariableStore;
use crate::error::BuildError;
use crate::model::{HttpMethod, ResultVariable, Step};
use crate::url_template;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Concrete request, with every placeholder the store could resolve
/// substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestRequest {
    pub method: HttpMethod,
    pub base_url: String,
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_body")]
    pub body: Vec<u8>,
}

impl RestRequest {
    /// Base URL followed by the query string, for display.
    pub fn display_url(&self) -> String {
        if self.query_params.is_empty() {
            return self.base_url.clone();
        }
        let query = self
            .query_params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.base_url, query)
    }
}

impl fmt::Display for RestRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.display_url())
    }
}

fn serialize_body<S>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

/// Build the request for `step`.
///
/// `override_headers` come from the run configuration and replace step
/// headers of the same name. Body, URL, query values and header values
/// are patched in that order; every field the store changed yields one
/// `Used` record.
pub fn build_request(
    step: &Step,
    override_headers: &BTreeMap<String, String>,
    store: &VariableStore,
) -> Result<(RestRequest, Vec<ResultVariable>), BuildError> {
    let (base_url, query_params) = url_template::decompose(&step.url)
        .map_err(|source| BuildError::MalformedUrl {
            template: step.url.clone(),
            source,
        })?;

    // Multi-value headers: only the first value is sent.
    let mut headers: BTreeMap<String, String> = step
        .headers
        .iter()
        .filter_map(|(name, values)| {
            values.first().map(|value| (name.clone(), value.clone()))
        })
        .collect();
    // Header names are case-insensitive: an override replaces any step
    // header spelled differently.
    for (name, value) in override_headers {
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }

    let mut applied = Vec::new();
    let mut patcher = |template: &str, field: String| -> String {
        let patched = store.patch(template);
        if patched != template {
            applied.push(ResultVariable::used(field, patched.clone()));
        }
        patched
    };

    let body = patcher(&step.body, "body".to_string());
    let base_url = patcher(&base_url, "URL".to_string());
    let query_params = query_params
        .into_iter()
        .map(|(key, value)| {
            let patched = patcher(&value, format!("params[{key}]"));
            (key, patched)
        })
        .collect();
    let headers = headers
        .into_iter()
        .map(|(key, value)| {
            let patched = patcher(&value, format!("headers.{key}"));
            (key, patched)
        })
        .collect();

    let request = RestRequest {
        method: step.method,
        base_url,
        headers,
        query_params,
        body: body.into_bytes(),
    };
    Ok((request, applied))
}
