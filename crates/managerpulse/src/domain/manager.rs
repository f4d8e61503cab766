use super::validation::{normalize_text, Checks, Validate, ValidationError};
use super::{EntityKind, FieldValue, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Manager {
    pub id: i64,
    pub company_id: i64,
    pub display_name: Option<String>,
    /// e.g. "Engineering Manager".
    pub title: Option<String>,
    /// e.g. "Platform", "Mobile".
    pub team: Option<String>,
    pub location: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerInput {
    pub company: Option<i64>,
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub team: Option<String>,
    pub location: Option<String>,
    pub is_verified: bool,
}

impl ManagerInput {
    pub fn normalized(self) -> Self {
        Self {
            company: self.company,
            display_name: normalize_text(self.display_name),
            title: normalize_text(self.title),
            team: normalize_text(self.team),
            location: normalize_text(self.location),
            is_verified: self.is_verified,
        }
    }
}

impl Validate for ManagerInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required("company", &self.company)
            .optional_text("display_name", &self.display_name, 255)
            .optional_text("title", &self.title, 255)
            .optional_text("team", &self.team, 255)
            .optional_text("location", &self.location, 255)
            .finish()
    }
}

impl Record for Manager {
    const KIND: EntityKind = EntityKind::Manager;
    type Input = ManagerInput;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "company" => FieldValue::Int(self.company_id),
            "display_name" => FieldValue::text(&self.display_name),
            "title" => FieldValue::text(&self.title),
            "team" => FieldValue::text(&self.team),
            "location" => FieldValue::text(&self.location),
            "is_verified" => FieldValue::Bool(self.is_verified),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Null,
        }
    }

    fn to_input(&self) -> ManagerInput {
        ManagerInput {
            company: Some(self.company_id),
            display_name: self.display_name.clone(),
            title: self.title.clone(),
            team: self.team.clone(),
            location: self.location.clone(),
            is_verified: self.is_verified,
        }
    }
}
