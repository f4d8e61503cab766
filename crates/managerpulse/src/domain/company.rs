use super::validation::{normalize_text, Checks, Validate, ValidationError};
use super::{EntityKind, FieldValue, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Company profile; the root every other record hangs off.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub domain: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
    /// Head-count bucket such as `1-10`, `11-50`, `500+`.
    pub size: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyInput {
    pub name: String,
    pub domain: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub logo_url: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
}

impl CompanyInput {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn normalized(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            domain: normalize_text(self.domain),
            lat: self.lat,
            lng: self.lng,
            city: normalize_text(self.city),
            region: normalize_text(self.region),
            country: normalize_text(self.country),
            logo_url: normalize_text(self.logo_url),
            industry: normalize_text(self.industry),
            size: normalize_text(self.size),
        }
    }
}

impl Validate for CompanyInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required_text("name", &self.name, 255)
            .optional_text("domain", &self.domain, 255)
            .latitude("lat", self.lat)
            .longitude("lng", self.lng)
            .optional_text("city", &self.city, 255)
            .optional_text("region", &self.region, 255)
            .optional_text("country", &self.country, 255)
            .optional_url("logo_url", &self.logo_url, 500)
            .optional_text("industry", &self.industry, 100)
            .optional_text("size", &self.size, 50)
            .finish()
    }
}

impl Record for Company {
    const KIND: EntityKind = EntityKind::Company;
    type Input = CompanyInput;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "name" => FieldValue::Text(self.name.clone()),
            "domain" => FieldValue::text(&self.domain),
            "lat" => FieldValue::float(self.lat),
            "lng" => FieldValue::float(self.lng),
            "city" => FieldValue::text(&self.city),
            "region" => FieldValue::text(&self.region),
            "country" => FieldValue::text(&self.country),
            "logo_url" => FieldValue::text(&self.logo_url),
            "industry" => FieldValue::text(&self.industry),
            "size" => FieldValue::text(&self.size),
            "created_at" => self.created_at.into(),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Null,
        }
    }

    fn to_input(&self) -> CompanyInput {
        CompanyInput {
            name: self.name.clone(),
            domain: self.domain.clone(),
            lat: self.lat,
            lng: self.lng,
            city: self.city.clone(),
            region: self.region.clone(),
            country: self.country.clone(),
            logo_url: self.logo_url.clone(),
            industry: self.industry.clone(),
            size: self.size.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_required() {
        let err = CompanyInput::default().validate().expect_err("missing name");
        assert_eq!(err.errors[0].field, "name");
    }

    #[test]
    fn normalized_input_trims_and_drops_blanks() {
        let input = CompanyInput {
            name: "  Acme ".to_string(),
            city: Some(" ".to_string()),
            industry: Some(" Robotics".to_string()),
            ..CompanyInput::default()
        }
        .normalized();

        assert_eq!(input.name, "Acme");
        assert_eq!(input.city, None);
        assert_eq!(input.industry.as_deref(), Some("Robotics"));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn logo_url_must_be_http() {
        let input = CompanyInput {
            logo_url: Some("not a url".to_string()),
            ..CompanyInput::named("Acme")
        };
        let err = input.validate().expect_err("bad url");
        assert_eq!(err.errors[0].field, "logo_url");
    }
}
