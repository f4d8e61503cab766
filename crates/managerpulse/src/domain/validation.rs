use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Record-level validation failure. Always recoverable: it is reported back
/// to the operator and nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationError) {
        self.errors.extend(other.errors);
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .errors
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{rendered}")
    }
}

impl std::error::Error for ValidationError {}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Accumulates field checks so one pass reports every problem on a record.
#[derive(Debug, Default)]
pub(crate) struct Checks {
    errors: ValidationError,
}

impl Checks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn required_text(&mut self, field: &str, value: &str, max_len: usize) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(field, "this field is required");
        } else {
            self.max_len(field, value, max_len);
        }
        self
    }

    pub(crate) fn optional_text(
        &mut self,
        field: &str,
        value: &Option<String>,
        max_len: usize,
    ) -> &mut Self {
        if let Some(value) = value {
            self.max_len(field, value, max_len);
        }
        self
    }

    pub(crate) fn required<T>(&mut self, field: &str, value: &Option<T>) -> &mut Self {
        if value.is_none() {
            self.errors.push(field, "this field is required");
        }
        self
    }

    pub(crate) fn optional_url(
        &mut self,
        field: &str,
        value: &Option<String>,
        max_len: usize,
    ) -> &mut Self {
        if let Some(value) = value {
            self.max_len(field, value, max_len);
            match url::Url::parse(value) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => self.errors.push(field, "enter a valid URL"),
            }
        }
        self
    }

    pub(crate) fn latitude(&mut self, field: &str, value: Option<f64>) -> &mut Self {
        self.float_range(field, value, -90.0, 90.0)
    }

    pub(crate) fn longitude(&mut self, field: &str, value: Option<f64>) -> &mut Self {
        self.float_range(field, value, -180.0, 180.0)
    }

    pub(crate) fn rating(&mut self, field: &str, value: Option<i64>) -> &mut Self {
        if let Some(value) = value {
            if !(1..=5).contains(&value) {
                self.errors.push(field, "rating must be between 1 and 5");
            }
        }
        self
    }

    pub(crate) fn float_range(
        &mut self,
        field: &str,
        value: Option<f64>,
        min: f64,
        max: f64,
    ) -> &mut Self {
        if let Some(value) = value {
            if !value.is_finite() || value < min || value > max {
                self.errors
                    .push(field, format!("value must be between {min} and {max}"));
            }
        }
        self
    }

    pub(crate) fn non_negative(&mut self, field: &str, value: i64) -> &mut Self {
        if value < 0 {
            self.errors.push(field, "value must not be negative");
        }
        self
    }

    pub(crate) fn finish(&mut self) -> Result<(), ValidationError> {
        std::mem::take(&mut self.errors).into_result()
    }

    fn max_len(&mut self, field: &str, value: &str, max_len: usize) {
        let length = value.chars().count();
        if length > max_len {
            self.errors.push(
                field,
                format!("ensure this value has at most {max_len} characters (it has {length})"),
            );
        }
    }
}

/// Deserializes `merged`, which is `base` with `patch` applied, into an
/// input. On failure each patched key is tried alone against `base` so the
/// error lands on the field that caused it; a key patched to null that the
/// input cannot leave empty is reported as required.
pub fn decode_fields<T: DeserializeOwned>(
    base: &Map<String, Value>,
    patch: &Map<String, Value>,
    merged: Map<String, Value>,
) -> Result<T, ValidationError> {
    let err = match serde_json::from_value::<T>(Value::Object(merged)) {
        Ok(input) => return Ok(input),
        Err(err) => err,
    };

    let mut errors = ValidationError::default();
    for (key, value) in patch {
        let mut single = base.clone();
        single.insert(key.clone(), value.clone());
        if let Err(field_err) = serde_json::from_value::<T>(Value::Object(single)) {
            if value.is_null() {
                errors.push(key.as_str(), "this field is required");
            } else {
                errors.push(key.as_str(), field_err.to_string());
            }
        }
    }
    if errors.is_empty() {
        errors.push("__all__", err.to_string());
    }
    Err(errors)
}

/// Blank text is stored as absent.
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
