use serde_json::{Map, Value};

/// Read a text field from a work item's field bag. Non-string scalars are
/// rendered, objects are read through their `displayName` (identity fields).
pub fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => obj
            .get("displayName")
            .and_then(|v| v.as_str())
            .map(String::from),
        Value::Array(_) => None,
    }
}

/// Read a numeric field, accepting numbers encoded as strings.
pub fn number_field(fields: &Map<String, Value>, name: &str) -> Option<f64> {
    match fields.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn reads_plain_and_identity_text() {
        let fields = bag(json!({
            "System.Title": "Login page",
            "System.AssignedTo": { "displayName": "Dana", "uniqueName": "dana@example.com" },
            "System.Rev": 3,
        }));
        assert_eq!(text_field(&fields, "System.Title").as_deref(), Some("Login page"));
        assert_eq!(text_field(&fields, "System.AssignedTo").as_deref(), Some("Dana"));
        assert_eq!(text_field(&fields, "System.Rev").as_deref(), Some("3"));
        assert_eq!(text_field(&fields, "System.State"), None);
    }

    #[test]
    fn reads_numbers_and_numeric_strings() {
        let fields = bag(json!({
            "Microsoft.VSTS.Scheduling.StoryPoints": 5,
            "Microsoft.VSTS.Scheduling.RemainingWork": "2.5",
            "Microsoft.VSTS.Scheduling.CompletedWork": null,
        }));
        assert_eq!(number_field(&fields, "Microsoft.VSTS.Scheduling.StoryPoints"), Some(5.0));
        assert_eq!(number_field(&fields, "Microsoft.VSTS.Scheduling.RemainingWork"), Some(2.5));
        assert_eq!(number_field(&fields, "Microsoft.VSTS.Scheduling.CompletedWork"), None);
    }
}
