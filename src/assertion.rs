//! Assertion evaluation against a completed response.

use crate::extractor::round_millis;
use crate::jsonpath;
use crate::model::{Assertion, Comparison, Response, ResultAssertion, Source};
use serde_json::{Number, Value};

/// Evaluates one assertion declaration against a response.
pub trait AssertionController: Send + Sync {
    fn assert(&self, assertion: &Assertion, response: &Response) -> ResultAssertion;
}

/// Comparison-based assertions on status, headers, JSON body and timing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAssertionController;

impl AssertionController for DefaultAssertionController {
    fn assert(&self, assertion: &Assertion, response: &Response) -> ResultAssertion {
        let subject = describe_subject(assertion);
        let expected = assertion.value.as_ref().map(as_text);

        let outcome = match actual_value(assertion, response) {
            Ok(actual) => compare(
                assertion.comparison,
                &actual,
                assertion.value.as_ref(),
            )
            .map(|passed| (passed, as_text(&actual))),
            Err(reason) => Err(reason),
        };

        let (success, message) = match outcome {
            Ok((passed, actual)) => {
                let mut message = format!("{subject} {}", assertion.comparison);
                if let Some(expected) = &expected {
                    message.push_str(&format!(" {expected}"));
                }
                if !passed {
                    message.push_str(&format!(" (actual: {actual})"));
                }
                (passed, message)
            }
            Err(reason) => (false, format!("{subject}: {reason}")),
        };

        ResultAssertion {
            success,
            message,
            source: assertion.source,
            comparison: assertion.comparison,
            property: assertion.property.clone(),
            expected: assertion.value.clone(),
        }
    }
}

fn describe_subject(assertion: &Assertion) -> String {
    match assertion.source {
        Source::ResponseHeader | Source::ResponseJson
            if !assertion.property.is_empty() =>
        {
            format!("{} {}", assertion.source, assertion.property)
        }
        _ => assertion.source.to_string(),
    }
}

fn actual_value(assertion: &Assertion, response: &Response) -> Result<Value, String> {
    match assertion.source {
        Source::ResponseStatus => Ok(Value::Number(Number::from(response.status_code))),
        Source::ResponseTime => {
            let millis = round_millis(response.time_elapsed);
            Ok(Value::Number(Number::from(u64::try_from(millis).unwrap_or(u64::MAX))))
        }
        Source::ResponseHeader => response
            .header(&assertion.property)
            .and_then(|values| values.first())
            .map(|value| Value::String(value.clone()))
            .ok_or_else(|| format!("header '{}' not found", assertion.property)),
        Source::ResponseJson => {
            let path = jsonpath::to_path(&assertion.property);
            jsonpath::query(&response.body, &path)
                .cloned()
                .map_err(|err| err.to_string())
        }
    }
}

/// Text form of a value: strings unquoted, `null` as the empty string.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn compare(
    comparison: Comparison,
    actual: &Value,
    expected: Option<&Value>,
) -> Result<bool, String> {
    let expected_text = || {
        expected
            .map(as_text)
            .ok_or_else(|| format!("comparison {comparison} needs a value"))
    };
    let numbers = || -> Result<(f64, f64), String> {
        let expected = expected
            .ok_or_else(|| format!("comparison {comparison} needs a value"))?;
        let left = as_number(actual)
            .ok_or_else(|| format!("actual value {} is not a number", as_text(actual)))?;
        let right = as_number(expected)
            .ok_or_else(|| format!("expected value {} is not a number", as_text(expected)))?;
        Ok((left, right))
    };

    let passed = match comparison {
        Comparison::Equal => as_text(actual) == expected_text()?,
        Comparison::NotEqual => as_text(actual) != expected_text()?,
        Comparison::Empty => is_empty(actual),
        Comparison::NotEmpty => !is_empty(actual),
        Comparison::Contains => contains(actual, &expected_text()?),
        Comparison::DoesNotContain => !contains(actual, &expected_text()?),
        Comparison::IsANumber => as_number(actual).is_some(),
        Comparison::EqualNumber => {
            let (left, right) = numbers()?;
            left == right
        }
        Comparison::IsLessThan => {
            let (left, right) = numbers()?;
            left < right
        }
        Comparison::IsLessThanOrEqual => {
            let (left, right) = numbers()?;
            left <= right
        }
        Comparison::IsGreaterThan => {
            let (left, right) = numbers()?;
            left > right
        }
        Comparison::IsGreaterThanOrEqual => {
            let (left, right) = numbers()?;
            left >= right
        }
        Comparison::IsNull => actual.is_null(),
        Comparison::HasKey => {
            let key = expected_text()?;
            actual.as_object().is_some_and(|map| map.contains_key(&key))
        }
        Comparison::HasValue => {
            let wanted = expected_text()?;
            match actual {
                Value::Array(items) => items.iter().any(|v| as_text(v) == wanted),
                Value::Object(map) => map.values().any(|v| as_text(v) == wanted),
                _ => false,
            }
        }
    };
    Ok(passed)
}

fn contains(actual: &Value, needle: &str) -> bool {
    match actual {
        Value::String(s) => s.contains(needle),
        Value::Array(items) => items.iter().any(|v| as_text(v) == needle),
        Value::Object(map) => map.contains_key(needle),
        other => as_text(other).contains(needle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn response() -> Response {
        Response::new(
            201,
            vec![("Content-Type".to_string(), "application/json".to_string())],
            json!({
                "id": "u-1",
                "count": 3,
                "tags": ["a", "b"],
                "meta": {"owner": "ann"},
                "deleted": null,
                "notes": ""
            })
            .to_string(),
            Duration::from_millis(40),
        )
    }

    fn check(
        source: Source,
        property: &str,
        comparison: Comparison,
        value: Option<Value>,
    ) -> ResultAssertion {
        let assertion = Assertion {
            source,
            comparison,
            property: property.to_string(),
            value,
        };
        DefaultAssertionController.assert(&assertion, &response())
    }

    fn passes_json(property: &str, comparison: Comparison, value: Option<Value>) -> bool {
        check(Source::ResponseJson, property, comparison, value).success
    }

    #[test]
    fn test_status_equal_accepts_number_or_string() {
        assert!(check(Source::ResponseStatus, "", Comparison::Equal, Some(json!(201))).success);
        assert!(check(Source::ResponseStatus, "", Comparison::Equal, Some(json!("201"))).success);

        let failed = check(Source::ResponseStatus, "", Comparison::Equal, Some(json!(200)));
        assert!(!failed.success);
        assert_eq!(failed.message, "response_status equal 200 (actual: 201)");
    }

    #[test]
    fn test_header_assertions() {
        let found = check(
            Source::ResponseHeader,
            "content-type",
            Comparison::Contains,
            Some(json!("json")),
        );
        assert!(found.success);

        let missing = check(Source::ResponseHeader, "X-Missing", Comparison::NotEmpty, None);
        assert!(!missing.success);
        assert!(missing.message.contains("not found"));
    }

    #[test]
    fn test_json_assertions() {
        assert!(passes_json("id", Comparison::Equal, Some(json!("u-1"))));
        assert!(passes_json("count", Comparison::IsGreaterThan, Some(json!(2))));
        assert!(passes_json("count", Comparison::IsLessThanOrEqual, Some(json!("3"))));
        assert!(passes_json("count", Comparison::EqualNumber, Some(json!(3.0))));
        assert!(passes_json("tags", Comparison::Contains, Some(json!("b"))));
        assert!(passes_json("tags", Comparison::DoesNotContain, Some(json!("z"))));
        assert!(passes_json("meta", Comparison::HasKey, Some(json!("owner"))));
        assert!(passes_json("meta", Comparison::HasValue, Some(json!("ann"))));
        assert!(passes_json("deleted", Comparison::IsNull, None));
        assert!(passes_json("notes", Comparison::Empty, None));
        assert!(passes_json("count", Comparison::IsANumber, None));
        assert!(!passes_json("id", Comparison::IsANumber, None));
    }

    #[test]
    fn test_time_assertion() {
        assert!(check(Source::ResponseTime, "", Comparison::IsLessThan, Some(json!(1000))).success);
    }

    #[test]
    fn test_non_numeric_comparison_fails_with_reason() {
        let result = check(Source::ResponseJson, "id", Comparison::IsGreaterThan, Some(json!(1)));
        assert!(!result.success);
        assert!(result.message.contains("is not a number"));
    }

    #[test]
    fn test_missing_expected_value_fails() {
        let result = check(Source::ResponseJson, "id", Comparison::Equal, None);
        assert!(!result.success);
        assert!(result.message.contains("needs a value"));
    }
}
