//! A draft-7 JSON-Schema subset validator for tool arguments.
//!
//! Supports `type`, `enum`, `minimum`, `maximum`, `pattern`, `required`, and
//! `additionalProperties: false`. Unlike a general-purpose validator this one
//! never coerces values (a string `"10"` is not a number `10`): the wire
//! contract calls for rejection, not forgiveness.

use regex::Regex;
use serde_json::Value;

/// One schema violation, reported with a JSON-pointer path to the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON-pointer path, e.g. `/max_depth`.
    pub pointer: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.pointer, self.message)
    }
}

/// Validate `arguments` against `schema`. `schema` is expected to be a draft-7
/// fragment whose top-level `type` is `"object"`.
///
/// Returns every violation found rather than stopping at the first.
#[must_use]
pub fn validate(schema: &Value, arguments: &Value) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_object(schema, arguments, "", &mut violations);
    violations
}

fn check_object(schema: &Value, instance: &Value, pointer: &str, out: &mut Vec<Violation>) {
    let Some(obj) = instance.as_object() else {
        out.push(Violation {
            pointer: pointer.to_string(),
            message: "expected an object".to_string(),
        });
        return;
    };

    let properties = schema.get("properties").and_then(Value::as_object);
    let required = schema.get("required").and_then(Value::as_array);
    let additional_allowed = schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    if let Some(required) = required {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                out.push(Violation {
                    pointer: format!("{pointer}/{name}"),
                    message: "is required".to_string(),
                });
            }
        }
    }

    if let Some(properties) = properties {
        for (key, value) in obj {
            match properties.get(key) {
                Some(field_schema) => {
                    check_value(field_schema, value, &format!("{pointer}/{key}"), out);
                }
                None if !additional_allowed => {
                    out.push(Violation {
                        pointer: format!("{pointer}/{key}"),
                        message: "is not a recognized property".to_string(),
                    });
                }
                None => {}
            }
        }
    } else if !additional_allowed && !obj.is_empty() {
        for key in obj.keys() {
            out.push(Violation {
                pointer: format!("{pointer}/{key}"),
                message: "is not a recognized property".to_string(),
            });
        }
    }
}

fn check_value(schema: &Value, instance: &Value, pointer: &str, out: &mut Vec<Violation>) {
    if let Some(expected_type) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected_type, instance) {
            out.push(Violation {
                pointer: pointer.to_string(),
                message: format!("expected type {expected_type}, got {}", type_name(instance)),
            });
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(instance) {
            out.push(Violation {
                pointer: pointer.to_string(),
                message: format!("must be one of {allowed:?}"),
            });
        }
    }

    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if let Some(n) = instance.as_f64() {
            if n < min {
                out.push(Violation {
                    pointer: pointer.to_string(),
                    message: format!("must be >= {min}"),
                });
            }
        }
    }

    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if let Some(n) = instance.as_f64() {
            if n > max {
                out.push(Violation {
                    pointer: pointer.to_string(),
                    message: format!("must be <= {max}"),
                });
            }
        }
    }

    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        if let Some(s) = instance.as_str() {
            match Regex::new(pattern) {
                Ok(re) if !re.is_match(s) => {
                    out.push(Violation {
                        pointer: pointer.to_string(),
                        message: format!("must match pattern {pattern}"),
                    });
                }
                Ok(_) => {}
                Err(_) => out.push(Violation {
                    pointer: pointer.to_string(),
                    message: format!("schema declares an invalid pattern: {pattern}"),
                }),
            }
        }
    }

    if schema.get("type").and_then(Value::as_str) == Some("object") {
        check_object(schema, instance, pointer, out);
    }
}

fn type_matches(expected: &str, instance: &Value) -> bool {
    match expected {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "integer" => instance.is_i64() || instance.is_u64(),
        "number" => instance.is_number(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        _ => true,
    }
}

fn type_name(instance: &Value) -> &'static str {
    match instance {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn query_callers_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "function_name": {"type": "string"},
                "max_depth": {"type": "integer", "minimum": 1, "maximum": 10}
            },
            "required": ["function_name"],
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        let args = json!({"function_name": "auth.login", "max_depth": 2});
        assert!(validate(&query_callers_schema(), &args).is_empty());
    }

    #[test]
    fn missing_required_field_is_reported_with_pointer() {
        let args = json!({"max_depth": 2});
        let violations = validate(&query_callers_schema(), &args);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].pointer, "/function_name");
    }

    #[test]
    fn out_of_range_number_is_reported() {
        let args = json!({"function_name": "x", "max_depth": 999});
        let violations = validate(&query_callers_schema(), &args);
        assert!(violations.iter().any(|v| v.pointer == "/max_depth"));
    }

    #[test]
    fn unknown_property_rejected_when_additional_properties_false() {
        let args = json!({"function_name": "x", "bogus": true});
        let violations = validate(&query_callers_schema(), &args);
        assert!(violations.iter().any(|v| v.pointer == "/bogus"));
    }

    #[test]
    fn no_type_coercion_of_numeric_strings() {
        let args = json!({"function_name": "x", "max_depth": "2"});
        let violations = validate(&query_callers_schema(), &args);
        assert!(violations.iter().any(|v| v.pointer == "/max_depth"));
    }

    #[test]
    fn pattern_keyword_is_enforced() {
        let schema = json!({
            "type": "object",
            "properties": {"id": {"type": "string", "pattern": "^[a-z]+$"}},
            "required": ["id"]
        });
        let violations = validate(&schema, &json!({"id": "ABC123"}));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].pointer, "/id");
    }

    #[test]
    fn enum_keyword_is_enforced() {
        let schema = json!({
            "type": "object",
            "properties": {"mode": {"type": "string", "enum": ["fast", "thorough"]}},
        });
        let violations = validate(&schema, &json!({"mode": "slow"}));
        assert_eq!(violations.len(), 1);
    }
}
