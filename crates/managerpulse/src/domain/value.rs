use serde::Serialize;

/// Loosely typed view of a single field, shared by the admin display layer and
/// the import/export resources.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FieldValue {
    pub fn text(value: &Option<String>) -> Self {
        match value {
            Some(text) => Self::Text(text.clone()),
            None => Self::Null,
        }
    }

    pub fn int(value: Option<i64>) -> Self {
        value.map(Self::Int).unwrap_or(Self::Null)
    }

    pub fn float(value: Option<f64>) -> Self {
        value.map(Self::Float).unwrap_or(Self::Null)
    }

    pub fn choice<C: super::choices::Choice>(value: Option<C>) -> Self {
        match value {
            Some(choice) => Self::Text(choice.as_str().to_string()),
            None => Self::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value the way it is written into an interchange cell.
    pub fn to_cell(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(true) => "1".to_string(),
            Self::Bool(false) => "0".to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Int(value) => serde_json::Value::from(*value),
            Self::Float(value) => serde_json::Value::from(*value),
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Text(value) => serde_json::Value::String(value.clone()),
        }
    }
}

/// Accepts `1`/`0`/`true`/`false` in any case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for FieldValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self::Text(value.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_render_booleans_as_digits_and_null_as_blank() {
        assert_eq!(FieldValue::Bool(true).to_cell(), "1");
        assert_eq!(FieldValue::Bool(false).to_cell(), "0");
        assert_eq!(FieldValue::Null.to_cell(), "");
        assert_eq!(FieldValue::Float(52.5).to_cell(), "52.5");
    }

    #[test]
    fn booleans_parse_from_digits_and_words() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }
}
