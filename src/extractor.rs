//! Harvests declared variables out of a completed response.

use crate::context::VariableStore;
use crate::error::ExtractionError;
use crate::jsonpath;
use crate::model::{Response, ResultVariable, Source, Variable};
use serde_json::{Number, Value};
use std::time::Duration;
use tracing::debug;

/// JSON leaf classified for export into the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    String(String),
    Bool(bool),
    Number(Number),
    Unsupported(&'static str),
}

impl ExtractedValue {
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::String(s) => ExtractedValue::String(s.clone()),
            Value::Bool(b) => ExtractedValue::Bool(*b),
            Value::Number(n) => ExtractedValue::Number(n.clone()),
            other => ExtractedValue::Unsupported(jsonpath::kind_of(other)),
        }
    }

    /// String stored in the variable store, or the unsupported type name.
    ///
    /// Numbers use the shortest decimal that parses back to the same
    /// value: `30.0` renders as `30`, `0.1` as `0.1`.
    pub fn render(&self) -> Result<String, &'static str> {
        match self {
            ExtractedValue::String(s) => Ok(s.clone()),
            ExtractedValue::Bool(b) => Ok(b.to_string()),
            ExtractedValue::Number(n) => Ok(render_number(n)),
            ExtractedValue::Unsupported(kind) => Err(kind),
        }
    }
}

fn render_number(number: &Number) -> String {
    if let Some(i) = number.as_i64() {
        return i.to_string();
    }
    if let Some(u) = number.as_u64() {
        return u.to_string();
    }
    match number.as_f64() {
        Some(f) => f.to_string(),
        None => number.to_string(),
    }
}

/// Elapsed time rounded half-up to whole milliseconds.
pub fn round_millis(elapsed: Duration) -> u128 {
    (elapsed.as_nanos() + 500_000) / 1_000_000
}

/// Extract each declaration from `response` into `store`.
///
/// Records follow declaration order. Declarations with an empty name are
/// skipped, as are header declarations whose header is absent.
pub fn extract_variables(
    response: &Response,
    declarations: &[Variable],
    store: &mut VariableStore,
) -> Vec<ResultVariable> {
    let mut created = Vec::new();

    for variable in declarations {
        if variable.name.is_empty() {
            continue;
        }

        let value = match variable.source {
            Source::ResponseTime => {
                Ok(round_millis(response.time_elapsed).to_string())
            }
            Source::ResponseStatus => Ok(response.status_code.to_string()),
            Source::ResponseHeader => {
                match response
                    .header(&variable.property)
                    .and_then(|values| values.first())
                {
                    Some(value) => Ok(value.clone()),
                    None => {
                        debug!(
                            "Header '{}' absent, variable '{}' not created",
                            variable.property, variable.name
                        );
                        continue;
                    }
                }
            }
            Source::ResponseJson => extract_json(response, variable),
        };

        if let Ok(value) = &value {
            store.add(variable.name.clone(), value.clone());
        }
        created.push(ResultVariable::created(variable.name.clone(), value));
    }

    created
}

fn extract_json(
    response: &Response,
    variable: &Variable,
) -> Result<String, ExtractionError> {
    let path = jsonpath::to_path(&variable.property);
    let leaf = jsonpath::query(&response.body, &path).map_err(|err| {
        ExtractionError::query(&variable.name, &variable.property, err)
    })?;

    ExtractedValue::classify(leaf).render().map_err(|kind| {
        ExtractionError::UnsupportedType {
            name: variable.name.clone(),
            kind,
        }
    })
}
