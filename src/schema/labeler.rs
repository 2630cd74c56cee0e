use serde_json::{Value, json};

/// Response shape required from the external labeling model (§4.6): a
/// headline, a one-paragraph summary, and a category drawn from the fixed
/// set. Word-count limits (summary <= 30 words) aren't expressible in JSON
/// Schema's string constraints, so they're checked separately after this
/// schema passes; see `LabelerClient::label`.
pub(crate) fn response_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "headline": { "type": "string", "minLength": 1 },
            "summary": { "type": "string", "minLength": 1 },
            "category": {
                "type": "string",
                "enum": ["Politics", "Business", "Technology", "Sports", "Entertainment", "General"]
            }
        },
        "required": ["headline", "summary", "category"],
        "additionalProperties": true
    })
}
