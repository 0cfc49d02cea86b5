//! Structured-output schema construction and answer validation.
//!
//! Each leaf declares its allowed answers as plain strings. The chat endpoint receives a
//! JSON schema whose `answer` field enumerates exactly those strings (plus `null` for
//! declining), and the returned answer is checked for membership before it is written onto
//! the leaf. JSON schema enums carry values, not named members, so no identifier mapping is
//! needed for the option strings.

use serde_json::{json, Value};

/// Build the structured-output schema for a leaf's response options.
///
/// With a non-empty option list the `answer` field is an enum over exactly those strings
/// plus `null`; enum membership is exclusive, so `null` has to be listed explicitly for the
/// model to be able to decline. Free-text questions (no options) accept any string or null.
pub fn answer_schema(options: &[String]) -> Value {
    let answer = if options.is_empty() {
        json!({ "type": ["string", "null"] })
    } else {
        let mut allowed: Vec<Value> = options.iter().cloned().map(Value::String).collect();
        allowed.push(Value::Null);
        json!({ "type": ["string", "null"], "enum": allowed })
    };
    json!({
        "type": "object",
        "properties": {
            "answer": answer,
            "rationale": { "type": "string" },
            "citation_ids": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["answer", "rationale", "citation_ids"],
        "additionalProperties": false
    })
}

/// Check that a returned answer is a member of the leaf's option set.
///
/// `None` is always accepted (the model declined to answer). An empty option list places no
/// constraint on the answer.
pub fn validate_answer(answer: Option<&str>, options: &[String]) -> bool {
    match answer {
        None => true,
        Some(_) if options.is_empty() => true,
        Some(value) => options.iter().any(|option| option == value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn schema_enumerates_options_verbatim() {
        let schema = answer_schema(&opts(&["Yes", "No"]));
        let allowed = schema["properties"]["answer"]["enum"]
            .as_array()
            .expect("enum");
        assert_eq!(allowed.len(), 3);
        assert_eq!(allowed[0], "Yes");
        assert_eq!(allowed[1], "No");
    }

    #[test]
    fn schema_enum_lists_null_so_the_model_can_decline() {
        let schema = answer_schema(&opts(&["Yes", "No"]));
        let allowed = schema["properties"]["answer"]["enum"]
            .as_array()
            .expect("enum");
        assert!(allowed.contains(&serde_json::Value::Null));
    }

    #[test]
    fn free_text_schema_has_no_enum() {
        let schema = answer_schema(&[]);
        assert!(schema["properties"]["answer"].get("enum").is_none());
    }

    #[test]
    fn membership_validation() {
        let options = opts(&["Yes", "No"]);
        assert!(validate_answer(Some("Yes"), &options));
        assert!(validate_answer(None, &options));
        assert!(!validate_answer(Some("Maybe"), &options));
        assert!(validate_answer(Some("anything"), &[]));
    }
}
