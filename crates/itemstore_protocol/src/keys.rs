//! Rules for addressed key values and document object keys.

use crate::error::KeyError;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

pub const MAX_KEY_VALUE_LENGTH: usize = 512;

const KEY_VALUE_RULE: &str = r"^[A-Za-z_][A-Za-z0-9._-]*$";
const JSON_KEY_RULE: &str = r"^[A-Za-z0-9][A-Za-z0-9_-]*$";

static KEY_VALUE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(KEY_VALUE_RULE).expect("key value grammar compiles"));
static JSON_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(JSON_KEY_RULE).expect("JSON key grammar compiles"));

/// Validate a value addressed as a pk, rk or index key.
pub fn validate_key_value(value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::Empty);
    }
    if value.chars().count() > MAX_KEY_VALUE_LENGTH {
        return Err(KeyError::TooLong {
            max: MAX_KEY_VALUE_LENGTH,
        });
    }
    if !KEY_VALUE_PATTERN.is_match(value) {
        return Err(KeyError::InvalidValue {
            value: value.to_string(),
            rule: KEY_VALUE_RULE,
        });
    }
    Ok(())
}

/// Validate a key value against a table's configured pattern.
pub fn validate_key_pattern(value: &str, pattern: &Regex) -> Result<(), KeyError> {
    if pattern.is_match(value) {
        Ok(())
    } else {
        Err(KeyError::PatternMismatch {
            value: value.to_string(),
            pattern: pattern.as_str().to_string(),
        })
    }
}

/// Every object key, at any depth, must match the JSON key grammar.
pub fn validate_json_keys(value: &Value) -> Result<(), KeyError> {
    walk_json_keys(value, "")
}

fn walk_json_keys(value: &Value, path: &str) -> Result<(), KeyError> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                if !JSON_KEY_PATTERN.is_match(key) {
                    return Err(KeyError::InvalidJsonKey {
                        key: key.clone(),
                        path: child_path,
                    });
                }
                walk_json_keys(child, &child_path)?;
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk_json_keys(item, &format!("{path}[{i}]"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_value_rules() {
        validate_key_value("order1").unwrap();
        validate_key_value("_a.b-c").unwrap();
        assert_eq!(validate_key_value(""), Err(KeyError::Empty));
        assert!(matches!(
            validate_key_value("1abc"),
            Err(KeyError::InvalidValue { .. })
        ));
        assert!(matches!(
            validate_key_value("a/b"),
            Err(KeyError::InvalidValue { .. })
        ));
        let long = "a".repeat(MAX_KEY_VALUE_LENGTH + 1);
        assert_eq!(
            validate_key_value(&long),
            Err(KeyError::TooLong {
                max: MAX_KEY_VALUE_LENGTH
            })
        );
    }

    #[test]
    fn test_key_pattern() {
        let pattern = Regex::new("^[a-z]+$").unwrap();
        validate_key_pattern("abc", &pattern).unwrap();
        assert!(matches!(
            validate_key_pattern("abc1", &pattern),
            Err(KeyError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn test_json_keys_nested_path() {
        validate_json_keys(&json!({"a": {"b_c": [{"d-e": 1}]}})).unwrap();

        let err = validate_json_keys(&json!({"a": {"list": [{"ok": 1}, {"bad key": 2}]}}))
            .unwrap_err();
        assert_eq!(
            err,
            KeyError::InvalidJsonKey {
                key: "bad key".to_string(),
                path: "a.list[1].bad key".to_string(),
            }
        );
    }

    #[test]
    fn test_json_key_must_not_start_with_symbol() {
        assert!(validate_json_keys(&json!({"_private": true})).is_err());
    }
}
