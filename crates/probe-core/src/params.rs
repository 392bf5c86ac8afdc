use serde_json::Value;

/// Best-effort pretty-print of an edit buffer. Valid JSON comes back
/// re-indented; anything else is returned unchanged so a half-typed buffer
/// is never destroyed.
pub fn format_json_params(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

/// Whether the buffer is currently well-formed JSON; saves and invokes are
/// blocked while this is false.
pub fn params_are_valid_json(raw: &str) -> bool {
    serde_json::from_str::<Value>(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatting_is_idempotent() {
        let raw = r#"{"userId":123,"flags":[1,2]}"#;
        let once = format_json_params(raw);
        let twice = format_json_params(&once);
        assert_eq!(once, twice);
        assert!(once.contains("\n"));
    }

    #[test]
    fn invalid_json_passes_through_unchanged() {
        let raw = "{not json";
        assert_eq!(format_json_params(raw), raw);
        assert!(!params_are_valid_json(raw));
    }

    #[test]
    fn empty_object_formats_to_braces() {
        assert_eq!(format_json_params("{}"), "{}");
        assert!(params_are_valid_json("{}"));
    }
}
