//! JSON Schema validation for external-model responses, trimmed from the
//! lineage's schema layer down to the single shape this pipeline needs.

pub(crate) mod labeler;

use jsonschema::Draft;
use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct ValidationResult {
    pub(crate) valid: bool,
    pub(crate) errors: Vec<String>,
}

/// Validates `instance` against `schema_json` under JSON Schema draft 2020-12.
pub(crate) fn validate_json(schema_json: &Value, instance: &Value) -> ValidationResult {
    let validator = match jsonschema::options().with_draft(Draft::Draft202012).build(schema_json) {
        Ok(validator) => validator,
        Err(error) => {
            return ValidationResult {
                valid: false,
                errors: vec![format!("schema did not compile: {error}")],
            };
        }
    };

    let errors: Vec<String> = validator.iter_errors(instance).map(|e| e.to_string()).collect();
    ValidationResult { valid: errors.is_empty(), errors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_json_accepts_matching_instance() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        });
        let result = validate_json(&schema, &json!({ "name": "ok" }));
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn validate_json_reports_errors_for_missing_field() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        });
        let result = validate_json(&schema, &json!({}));
        assert!(!result.valid);
        assert!(!result.errors.is_empty());
    }
}
