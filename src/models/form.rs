//! Submitted field parsing.
//!
//! The admin panel posts `multipart/form-data` where every value is text,
//! while scripted clients post JSON. Both land in a [`FormFields`] map and
//! are coerced per field here.
use serde_json::{Map, Value};

use crate::error::AppError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFields(Map<String, Value>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// `true` when the field was submitted, even if empty.
    pub fn contains(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(|v| !v.is_null())
    }

    /// Trimmed text. Numbers and booleans are rendered as text.
    pub fn text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Text that must be present and non-empty.
    pub fn required_text(&self, field: &str) -> Result<String, AppError> {
        self.text(field)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::validation(format!("{} is required", field)))
    }

    /// Optional boolean. Form checkboxes and the blog status select send
    /// text, so `on`, `1`, `published` and their opposites are understood.
    pub fn bool(&self, field: &str) -> Result<Option<bool>, AppError> {
        let parsed = match self.0.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" | "published" => Some(true),
                "false" | "off" | "0" | "no" | "draft" | "" => Some(false),
                _ => None,
            },
            Some(_) => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| AppError::validation(format!("{} must be true or false", field)))
    }

    pub fn integer(&self, field: &str) -> Result<Option<i64>, AppError> {
        let invalid = || AppError::validation(format!("{} must be a whole number", field));
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
            Some(_) => Err(invalid()),
        }
    }

    /// A JSON array of strings or one comma separated string.
    pub fn tags(&self, field: &str) -> Result<Option<Vec<String>>, AppError> {
        let clean = |s: &str| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(clean(s))),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.trim().to_string()),
                    _ => Err(AppError::validation(format!(
                        "{} must be a list of strings",
                        field
                    ))),
                })
                .filter(|tag| !matches!(tag, Ok(t) if t.is_empty()))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(AppError::validation(format!(
                "{} must be a list of strings",
                field
            ))),
        }
    }
}

impl From<Map<String, Value>> for FormFields {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for FormFields {
    fn from(pairs: [(&str, Value); N]) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_text_rejects_missing_and_blank() {
        let fields = FormFields::from([("title", json!("  ")), ("subtitle", json!("Triple glazed"))]);
        let err = fields.required_text("title").unwrap_err();
        assert_eq!(err.to_string(), "title is required");
        assert!(fields.required_text("category").is_err());
        assert_eq!(fields.required_text("subtitle").unwrap(), "Triple glazed");
    }

    #[test]
    fn bool_understands_form_values() {
        let fields = FormFields::from([
            ("a", json!("on")),
            ("b", json!("false")),
            ("c", json!(true)),
            ("d", json!("published")),
            ("e", json!("draft")),
            ("f", json!("maybe")),
        ]);
        assert_eq!(fields.bool("a").unwrap(), Some(true));
        assert_eq!(fields.bool("b").unwrap(), Some(false));
        assert_eq!(fields.bool("c").unwrap(), Some(true));
        assert_eq!(fields.bool("d").unwrap(), Some(true));
        assert_eq!(fields.bool("e").unwrap(), Some(false));
        assert_eq!(fields.bool("missing").unwrap(), None);
        assert!(fields.bool("f").is_err());
    }

    #[test]
    fn integer_accepts_numbers_and_numeric_text() {
        let fields = FormFields::from([
            ("a", json!(3)),
            ("b", json!(" 12 ")),
            ("c", json!("")),
            ("d", json!("twelve")),
        ]);
        assert_eq!(fields.integer("a").unwrap(), Some(3));
        assert_eq!(fields.integer("b").unwrap(), Some(12));
        assert_eq!(fields.integer("c").unwrap(), None);
        assert!(fields.integer("d").is_err());
    }

    #[test]
    fn tags_from_text_or_array() {
        let fields = FormFields::from([
            ("text", json!("glazing, , energy ,doors")),
            ("list", json!(["glazing", " doors ", ""])),
            ("bad", json!([1, 2])),
        ]);
        assert_eq!(
            fields.tags("text").unwrap().unwrap(),
            vec!["glazing", "energy", "doors"]
        );
        assert_eq!(fields.tags("list").unwrap().unwrap(), vec!["glazing", "doors"]);
        assert!(fields.tags("bad").is_err());
        assert_eq!(fields.tags("missing").unwrap(), None);
    }
}
