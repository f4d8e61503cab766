use super::choices::Confidence;
use super::validation::{normalize_text, Checks, Validate, ValidationError};
use super::{EntityKind, FieldValue, Record};
use crate::scoring;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Averaged rating fields, paired with the review rating each one summarises.
pub const AVERAGE_FIELDS: [&str; 5] = [
    "avg_autonomy",
    "avg_feedback_quality",
    "avg_clarity",
    "avg_fairness",
    "avg_work_life_balance",
];

/// Derived per-company summary. Exactly one per company.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CompanyAggregate {
    pub id: i64,
    pub company_id: i64,
    pub n_contributors: i64,
    pub avg_autonomy: Option<f64>,
    pub avg_feedback_quality: Option<f64>,
    pub avg_clarity: Option<f64>,
    pub avg_fairness: Option<f64>,
    pub avg_work_life_balance: Option<f64>,
    pub confidence: Confidence,
    pub public_summary: Option<String>,
    pub top_tags: Option<String>,
    pub best_for: Option<String>,
    pub hard_for: Option<String>,
    pub is_publishable: bool,
    pub updated_at: DateTime<Utc>,
}

impl CompanyAggregate {
    pub fn averages(&self) -> [Option<f64>; 5] {
        [
            self.avg_autonomy,
            self.avg_feedback_quality,
            self.avg_clarity,
            self.avg_fairness,
            self.avg_work_life_balance,
        ]
    }

    pub fn overall_score(&self) -> Option<f64> {
        scoring::overall_score(self.averages())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanyAggregateInput {
    pub company: Option<i64>,
    pub n_contributors: i64,
    pub avg_autonomy: Option<f64>,
    pub avg_feedback_quality: Option<f64>,
    pub avg_clarity: Option<f64>,
    pub avg_fairness: Option<f64>,
    pub avg_work_life_balance: Option<f64>,
    pub confidence: Confidence,
    pub public_summary: Option<String>,
    pub top_tags: Option<String>,
    pub best_for: Option<String>,
    pub hard_for: Option<String>,
    pub is_publishable: bool,
}

impl CompanyAggregateInput {
    pub fn for_company(company_id: i64) -> Self {
        Self {
            company: Some(company_id),
            ..Self::default()
        }
    }

    pub fn normalized(self) -> Self {
        Self {
            public_summary: normalize_text(self.public_summary),
            top_tags: normalize_text(self.top_tags),
            best_for: normalize_text(self.best_for),
            hard_for: normalize_text(self.hard_for),
            ..self
        }
    }
}

impl Validate for CompanyAggregateInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required("company", &self.company)
            .non_negative("n_contributors", self.n_contributors)
            .float_range("avg_autonomy", self.avg_autonomy, 1.0, 5.0)
            .float_range("avg_feedback_quality", self.avg_feedback_quality, 1.0, 5.0)
            .float_range("avg_clarity", self.avg_clarity, 1.0, 5.0)
            .float_range("avg_fairness", self.avg_fairness, 1.0, 5.0)
            .float_range("avg_work_life_balance", self.avg_work_life_balance, 1.0, 5.0)
            .finish()
    }
}

impl Record for CompanyAggregate {
    const KIND: EntityKind = EntityKind::CompanyAggregate;
    type Input = CompanyAggregateInput;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "company" => FieldValue::Int(self.company_id),
            "n_contributors" => FieldValue::Int(self.n_contributors),
            "avg_autonomy" => FieldValue::float(self.avg_autonomy),
            "avg_feedback_quality" => FieldValue::float(self.avg_feedback_quality),
            "avg_clarity" => FieldValue::float(self.avg_clarity),
            "avg_fairness" => FieldValue::float(self.avg_fairness),
            "avg_work_life_balance" => FieldValue::float(self.avg_work_life_balance),
            "confidence" => FieldValue::choice(Some(self.confidence)),
            "public_summary" => FieldValue::text(&self.public_summary),
            "top_tags" => FieldValue::text(&self.top_tags),
            "best_for" => FieldValue::text(&self.best_for),
            "hard_for" => FieldValue::text(&self.hard_for),
            "is_publishable" => FieldValue::Bool(self.is_publishable),
            "updated_at" => self.updated_at.into(),
            _ => FieldValue::Null,
        }
    }

    fn to_input(&self) -> CompanyAggregateInput {
        CompanyAggregateInput {
            company: Some(self.company_id),
            n_contributors: self.n_contributors,
            avg_autonomy: self.avg_autonomy,
            avg_feedback_quality: self.avg_feedback_quality,
            avg_clarity: self.avg_clarity,
            avg_fairness: self.avg_fairness,
            avg_work_life_balance: self.avg_work_life_balance,
            confidence: self.confidence,
            public_summary: self.public_summary.clone(),
            top_tags: self.top_tags.clone(),
            best_for: self.best_for.clone(),
            hard_for: self.hard_for.clone(),
            is_publishable: self.is_publishable,
        }
    }

    fn derived_score(&self) -> Option<f64> {
        self.overall_score()
    }
}
