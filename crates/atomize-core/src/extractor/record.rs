//! Tagged-union decode of one generation output line.

use serde_json::Value;

/// One decoded generation record, classified by key presence.
///
/// Classification checks `title`, then `action`, then `status`, so a line
/// carrying several known keys resolves to the first match.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// `{"title": "..."}` -- names the task for the sidebar.
    Title(String),
    /// `{"action": "..."}` -- one micro-win step.
    Action(String),
    /// `{"status": "end"}` -- generation is finished.
    End,
    /// Not valid JSON, or valid JSON matching no known shape.
    Unrecognized,
}

impl Record {
    /// Decode a single line. Never fails: anything unparseable comes back
    /// as [`Record::Unrecognized`] so the session can skip it and continue.
    pub fn decode(line: &str) -> Record {
        let Ok(value) = serde_json::from_str::<Value>(line.trim()) else {
            return Record::Unrecognized;
        };

        if let Some(title) = value.get("title").and_then(Value::as_str) {
            return Record::Title(title.to_owned());
        }
        if let Some(action) = value.get("action").and_then(Value::as_str) {
            return Record::Action(action.to_owned());
        }
        if value.get("status").and_then(Value::as_str) == Some("end") {
            return Record::End;
        }

        Record::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_title() {
        let record = Record::decode(r#"{"title": "Clean Desk"}"#);
        assert_eq!(record, Record::Title("Clean Desk".to_owned()));
    }

    #[test]
    fn decode_action() {
        let record = Record::decode(r#"{"action": "Open the drawer"}"#);
        assert_eq!(record, Record::Action("Open the drawer".to_owned()));
    }

    #[test]
    fn decode_end() {
        assert_eq!(Record::decode(r#"{"status": "end"}"#), Record::End);
    }

    #[test]
    fn decode_tolerates_surrounding_whitespace() {
        assert_eq!(Record::decode("  {\"status\": \"end\"}\t"), Record::End);
    }

    #[test]
    fn title_takes_priority_over_other_keys() {
        let record = Record::decode(r#"{"title": "t", "action": "a", "status": "end"}"#);
        assert_eq!(record, Record::Title("t".to_owned()));
    }

    #[test]
    fn status_other_than_end_is_unrecognized() {
        let record = Record::decode(r#"{"status": "running"}"#);
        assert_eq!(record, Record::Unrecognized);
    }

    #[test]
    fn wrongly_typed_title_is_unrecognized() {
        assert_eq!(Record::decode(r#"{"title": 7}"#), Record::Unrecognized);
    }

    #[test]
    fn unknown_shape_is_unrecognized() {
        assert_eq!(
            Record::decode(r#"{"note": "model chatter"}"#),
            Record::Unrecognized
        );
    }

    #[test]
    fn non_object_json_is_unrecognized() {
        assert_eq!(Record::decode("42"), Record::Unrecognized);
        assert_eq!(Record::decode(r#"["action"]"#), Record::Unrecognized);
        assert_eq!(Record::decode(r#""end""#), Record::Unrecognized);
    }

    #[test]
    fn malformed_json_is_unrecognized() {
        assert_eq!(Record::decode("{\"title\": "), Record::Unrecognized);
        assert_eq!(Record::decode("not json at all"), Record::Unrecognized);
    }
}
