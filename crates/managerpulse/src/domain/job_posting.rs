use super::choices::JobSource;
use super::validation::{normalize_text, Checks, Validate, ValidationError};
use super::{EntityKind, FieldValue, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct JobPosting {
    pub id: i64,
    pub company_id: i64,
    pub title: String,
    pub team: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_remote: bool,
    pub source: JobSource,
    pub url: Option<String>,
    pub salary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPostingInput {
    pub company: Option<i64>,
    pub title: String,
    pub team: Option<String>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_remote: bool,
    pub source: JobSource,
    pub url: Option<String>,
    pub salary: Option<String>,
}

impl JobPostingInput {
    pub fn normalized(self) -> Self {
        Self {
            company: self.company,
            title: self.title.trim().to_string(),
            team: normalize_text(self.team),
            location: normalize_text(self.location),
            lat: self.lat,
            lng: self.lng,
            is_remote: self.is_remote,
            source: self.source,
            url: normalize_text(self.url),
            salary: normalize_text(self.salary),
        }
    }
}

impl Validate for JobPostingInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required("company", &self.company)
            .required_text("title", &self.title, 255)
            .optional_text("team", &self.team, 255)
            .optional_text("location", &self.location, 255)
            .latitude("lat", self.lat)
            .longitude("lng", self.lng)
            .optional_url("url", &self.url, 500)
            .optional_text("salary", &self.salary, 100)
            .finish()
    }
}

impl Record for JobPosting {
    const KIND: EntityKind = EntityKind::JobPosting;
    type Input = JobPostingInput;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "company" => FieldValue::Int(self.company_id),
            "title" => FieldValue::Text(self.title.clone()),
            "team" => FieldValue::text(&self.team),
            "location" => FieldValue::text(&self.location),
            "lat" => FieldValue::float(self.lat),
            "lng" => FieldValue::float(self.lng),
            "is_remote" => FieldValue::Bool(self.is_remote),
            "source" => FieldValue::choice(Some(self.source)),
            "url" => FieldValue::text(&self.url),
            "salary" => FieldValue::text(&self.salary),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Null,
        }
    }

    fn to_input(&self) -> JobPostingInput {
        JobPostingInput {
            company: Some(self.company_id),
            title: self.title.clone(),
            team: self.team.clone(),
            location: self.location.clone(),
            lat: self.lat,
            lng: self.lng,
            is_remote: self.is_remote,
            source: self.source,
            url: self.url.clone(),
            salary: self.salary.clone(),
        }
    }
}
