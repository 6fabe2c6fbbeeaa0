use std::collections::HashMap;

use common::error::AppError;
use serde_json::Value;

const MAX_FILTER_VALUE_LEN: usize = 256;

/// §4.2: `metadata_filter` keys must come from a declared whitelist, and
/// values are length-bounded. Any violation fails with `invalid_filter`,
/// not a generic validation error, so the API layer can surface the
/// dedicated error code.
pub fn validate_metadata_filter(
    filter: &HashMap<String, Value>,
    whitelist: &[String],
) -> Result<(), AppError> {
    for (key, value) in filter {
        if !whitelist.iter().any(|allowed| allowed == key) {
            return Err(AppError::InvalidFilter(format!(
                "metadata filter key '{key}' is not in the allowed set"
            )));
        }
        if !is_scalar(value) {
            return Err(AppError::InvalidFilter(format!(
                "metadata filter value for '{key}' must be a scalar"
            )));
        }
        if value_len(value) > MAX_FILTER_VALUE_LEN {
            return Err(AppError::InvalidFilter(format!(
                "metadata filter value for '{key}' exceeds {MAX_FILTER_VALUE_LEN} characters"
            )));
        }
    }
    Ok(())
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null
    )
}

fn value_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn whitelist() -> Vec<String> {
        vec!["category".to_string(), "language".to_string()]
    }

    #[test]
    fn rejects_keys_outside_the_whitelist() {
        let mut filter = HashMap::new();
        filter.insert("secret_field".to_string(), json!("x"));
        let err = validate_metadata_filter(&filter, &whitelist()).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter(_)));
    }

    #[test]
    fn rejects_values_over_the_length_bound() {
        let mut filter = HashMap::new();
        filter.insert("category".to_string(), json!("x".repeat(300)));
        let err = validate_metadata_filter(&filter, &whitelist()).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter(_)));
    }

    #[test]
    fn rejects_non_scalar_values() {
        let mut filter = HashMap::new();
        filter.insert("category".to_string(), json!(["a", "b"]));
        let err = validate_metadata_filter(&filter, &whitelist()).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter(_)));
    }

    #[test]
    fn accepts_whitelisted_scalar_values() {
        let mut filter = HashMap::new();
        filter.insert("category".to_string(), json!("docs"));
        filter.insert("language".to_string(), json!("en"));
        validate_metadata_filter(&filter, &whitelist()).expect("should pass");
    }
}
