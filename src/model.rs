//! Scenario declarations and run results.

use crate::error::ExtractionError;
use crate::request::RestRequest;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A scenario file: an ordered list of steps run against one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, used in logs and report file names.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Steps, executed strictly in declaration order.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Deserialize a scenario from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Deserialize a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the invariants the step engine relies on: every step has a
    /// known kind and every request step has a URL.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (idx, step) in self.steps.iter().enumerate() {
            match &step.step_type {
                StepType::Pause => {}
                StepType::Request => {
                    if step.url.trim().is_empty() {
                        anyhow::bail!(
                            "step {}: request step without url",
                            idx + 1
                        );
                    }
                    if let Some(variable) = step
                        .variables
                        .iter()
                        .find(|v| !is_referable_name(&v.name))
                    {
                        anyhow::bail!(
                            "step {}: variable name '{}' cannot be referenced as a placeholder",
                            idx + 1,
                            variable.name
                        );
                    }
                }
                StepType::Other(kind) => {
                    anyhow::bail!(
                        "step {}: {kind} is an invalid step_type",
                        idx + 1
                    );
                }
            }
        }
        Ok(())
    }
}

/// Whether `{{name}}` can resolve to `name`: no braces and no
/// surrounding whitespace. Empty names are skipped by extraction.
fn is_referable_name(name: &str) -> bool {
    name.is_empty() || (!name.contains(['{', '}']) && name.trim() == name)
}

/// Kind of a step. Unknown kinds are kept by name so the engine can
/// report them instead of failing at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Pause,
    Request,
    Other(String),
}

impl From<String> for StepType {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "pause" => StepType::Pause,
            "request" => StepType::Request,
            _ => StepType::Other(kind),
        }
    }
}

impl From<StepType> for String {
    fn from(kind: StepType) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepType::Pause => f.write_str("pause"),
            StepType::Request => f.write_str("request"),
            StepType::Other(kind) => f.write_str(kind),
        }
    }
}

/// A single declared step.
///
/// Pause steps only use `duration`; request steps use every other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub step_type: StepType,
    /// Pause length in seconds.
    #[serde(default)]
    pub duration: u64,
    /// URL template, query string included.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Header templates. Only the first value of each list is sent.
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    /// Raw body template.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Values to extract from the response once assertions ran.
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl Step {
    /// A pause step of `seconds`.
    pub fn pause(seconds: u64) -> Self {
        Self {
            step_type: StepType::Pause,
            duration: seconds,
            url: String::new(),
            method: HttpMethod::default(),
            headers: BTreeMap::new(),
            body: String::new(),
            assertions: Vec::new(),
            variables: Vec::new(),
        }
    }

    /// A request step with no headers, body, assertions or variables.
    pub fn request(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            step_type: StepType::Request,
            url: url.into(),
            method,
            ..Self::pause(0)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        f.write_str(name)
    }
}

/// Part of a response a variable or an assertion reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    ResponseTime,
    ResponseStatus,
    ResponseHeader,
    ResponseJson,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::ResponseTime => "response_time",
            Source::ResponseStatus => "response_status",
            Source::ResponseHeader => "response_header",
            Source::ResponseJson => "response_json",
        };
        f.write_str(name)
    }
}

/// Variable extraction declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Name in the variable store. Declarations with an empty name are
    /// ignored.
    pub name: String,
    pub source: Source,
    /// Header name or JSON path, depending on `source`.
    #[serde(default)]
    pub property: String,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        source: Source,
        property: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            property: property.into(),
        }
    }
}

/// Assertion declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub source: Source,
    pub comparison: Comparison,
    #[serde(default)]
    pub property: String,
    /// Expected value, when the comparison takes one.
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equal,
    NotEqual,
    Empty,
    NotEmpty,
    Contains,
    DoesNotContain,
    IsANumber,
    EqualNumber,
    IsLessThan,
    IsLessThanOrEqual,
    IsGreaterThan,
    IsGreaterThanOrEqual,
    IsNull,
    HasKey,
    HasValue,
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Comparison::Equal => "equal",
            Comparison::NotEqual => "not_equal",
            Comparison::Empty => "empty",
            Comparison::NotEmpty => "not_empty",
            Comparison::Contains => "contains",
            Comparison::DoesNotContain => "does_not_contain",
            Comparison::IsANumber => "is_a_number",
            Comparison::EqualNumber => "equal_number",
            Comparison::IsLessThan => "is_less_than",
            Comparison::IsLessThanOrEqual => "is_less_than_or_equal",
            Comparison::IsGreaterThan => "is_greater_than",
            Comparison::IsGreaterThanOrEqual => {
                "is_greater_than_or_equal"
            }
            Comparison::IsNull => "is_null",
            Comparison::HasKey => "has_key",
            Comparison::HasValue => "has_value",
        };
        f.write_str(name)
    }
}

/// Completed HTTP response as seen by assertions and extraction.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status_code: u16,
    /// Header values keyed by lowercase header name.
    pub headers: BTreeMap<String, Vec<String>>,
    /// Parsed JSON body; `Null` when the body is empty or not JSON.
    pub body: Value,
    #[serde(skip)]
    pub raw_body: String,
    #[serde(serialize_with = "serialize_millis")]
    pub time_elapsed: Duration,
}

impl Response {
    pub fn new(
        status_code: u16,
        headers: impl IntoIterator<Item = (String, String)>,
        raw_body: String,
        time_elapsed: Duration,
    ) -> Self {
        let mut header_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            header_map
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(value);
        }
        let body = if raw_body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&raw_body).unwrap_or(Value::Null)
        };
        Self {
            status_code,
            headers: header_map,
            body,
            raw_body,
            time_elapsed,
        }
    }

    /// Values of header `name`, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }
}

/// Whether a provenance record comes from substitution or extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableUsage {
    Used,
    Created,
}

/// Provenance record.
///
/// `Used` records name the patched request field (`body`, `URL`,
/// `headers.<key>`, `params[<key>]`) and its value after substitution.
/// `Created` records name the extracted variable and hold its value or
/// the reason it could not be extracted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultVariable {
    pub key: String,
    /// Serialized as the plain string, or as the error object.
    #[serde(serialize_with = "serialize_outcome")]
    pub value: Result<String, ExtractionError>,
    pub usage: VariableUsage,
}

impl ResultVariable {
    pub fn used(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Ok(value.into()),
            usage: VariableUsage::Used,
        }
    }

    pub fn created(
        key: impl Into<String>,
        value: Result<String, ExtractionError>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            usage: VariableUsage::Created,
        }
    }

    pub fn is_error(&self) -> bool {
        self.value.is_err()
    }
}

impl fmt::Display for ResultVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Ok(value) => write!(f, "{} = {}", self.key, value),
            Err(err) => write!(f, "{}: {}", self.key, err),
        }
    }
}

/// Outcome of one assertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultAssertion {
    pub success: bool,
    pub message: String,
    pub source: Source,
    pub comparison: Comparison,
    pub property: String,
    pub expected: Option<Value>,
}

/// Result of one step.
#[derive(Debug, Clone, Serialize)]
pub struct ResultStep {
    pub step_type: StepType,
    /// The request actually sent, after substitution.
    pub request: Option<RestRequest>,
    pub response: Option<Response>,
    #[serde(serialize_with = "serialize_millis")]
    pub step_time: Duration,
    pub assertions: Vec<ResultAssertion>,
    /// Request fields changed by substitution.
    pub variables_applied: Vec<ResultVariable>,
    /// Variables extracted from the response.
    pub variables_created: Vec<ResultVariable>,
}

impl ResultStep {
    pub fn new(step_type: StepType) -> Self {
        Self {
            step_type,
            request: None,
            response: None,
            step_time: Duration::ZERO,
            assertions: Vec::new(),
            variables_applied: Vec::new(),
            variables_created: Vec::new(),
        }
    }

    /// True when every assertion passed and every extraction succeeded.
    pub fn is_success(&self) -> bool {
        self.assertions.iter().all(|a| a.success)
            && !self.variables_created.iter().any(ResultVariable::is_error)
    }
}

/// Result of a whole scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ResultScenario {
    pub name: String,
    pub description: Option<String>,
    pub success: bool,
    /// Step-level error that stopped the run, if any.
    pub error: Option<String>,
    pub steps: Vec<ResultStep>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn serialize_outcome<S>(
    value: &Result<String, ExtractionError>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Ok(value) => serializer.serialize_str(value),
        Err(err) => err.serialize(serializer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_from_json() {
        let scenario = Scenario::from_json(
            r#"{
                "name": "users",
                "steps": [
                    {"step_type": "pause", "duration": 1},
                    {
                        "step_type": "request",
                        "method": "POST",
                        "url": "{{host}}/users?limit=10",
                        "headers": {"Accept": ["application/json"]},
                        "body": "{\"name\": \"{{name}}\"}",
                        "assertions": [
                            {"source": "response_status", "comparison": "equal", "value": 201}
                        ],
                        "variables": [
                            {"name": "id", "source": "response_json", "property": "user.id"}
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(scenario.steps.len(), 2);
        assert_eq!(scenario.steps[0].step_type, StepType::Pause);
        assert_eq!(scenario.steps[0].duration, 1);

        let request = &scenario.steps[1];
        assert_eq!(request.step_type, StepType::Request);
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.headers["Accept"], vec!["application/json"]);
        assert_eq!(request.assertions[0].comparison, Comparison::Equal);
        assert_eq!(request.assertions[0].value, Some(json!(201)));
        assert_eq!(
            request.variables[0],
            Variable::new("id", Source::ResponseJson, "user.id")
        );
        scenario.validate().unwrap();
    }

    #[test]
    fn test_scenario_from_yaml_defaults() {
        let scenario = Scenario::from_yaml(
            "name: minimal\nsteps:\n  - step_type: request\n    url: http://localhost/ping\n",
        )
        .unwrap();

        let step = &scenario.steps[0];
        assert_eq!(step.method, HttpMethod::Get);
        assert!(step.headers.is_empty());
        assert!(step.body.is_empty());
        assert!(step.variables.is_empty());
    }

    #[test]
    fn test_unknown_step_type_is_kept_and_rejected() {
        let scenario = Scenario::from_yaml(
            "name: bad\nsteps:\n  - step_type: teleport\n",
        )
        .unwrap();

        assert_eq!(
            scenario.steps[0].step_type,
            StepType::Other("teleport".to_string())
        );
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("teleport is an invalid step_type"));
    }

    #[test]
    fn test_unreachable_variable_name_is_rejected() {
        let mut step = Step::request(HttpMethod::Get, "http://localhost/ping");
        step.variables = vec![Variable::new("user id", Source::ResponseStatus, "")];
        let mut scenario = Scenario {
            name: "names".to_string(),
            description: None,
            version: None,
            steps: vec![step],
        };
        scenario.validate().unwrap();

        scenario.steps[0]
            .variables
            .push(Variable::new(" padded", Source::ResponseStatus, ""));
        let err = scenario.validate().unwrap_err();
        assert!(err.to_string().contains("' padded' cannot be referenced"));

        scenario.steps[0].variables[1].name = "a}b".to_string();
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_request_without_url_is_rejected() {
        let scenario =
            Scenario::from_yaml("name: bad\nsteps:\n  - step_type: request\n")
                .unwrap();
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_response_headers_are_case_insensitive() {
        let response = Response::new(
            200,
            vec![
                ("X-Req-Id".to_string(), "abc".to_string()),
                ("x-req-id".to_string(), "def".to_string()),
            ],
            String::new(),
            Duration::ZERO,
        );

        assert_eq!(
            response.header("X-REQ-ID"),
            Some(&["abc".to_string(), "def".to_string()][..])
        );
        assert_eq!(response.body, Value::Null);
    }

    #[test]
    fn test_response_non_json_body_is_null() {
        let response = Response::new(
            200,
            Vec::new(),
            "plain text".to_string(),
            Duration::ZERO,
        );
        assert_eq!(response.body, Value::Null);
        assert_eq!(response.raw_body, "plain text");
    }

    #[test]
    fn test_result_step_success() {
        let mut result = ResultStep::new(StepType::Request);
        assert!(result.is_success());

        result.variables_created.push(ResultVariable::created(
            "id",
            Err(ExtractionError::UnsupportedType {
                name: "id".to_string(),
                kind: "null",
            }),
        ));
        assert!(!result.is_success());
    }
}
