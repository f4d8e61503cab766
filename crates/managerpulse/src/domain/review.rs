use super::choices::{ReviewDuration, Sentiment, WouldWorkAgain};
use super::validation::{normalize_text, Checks, Validate, ValidationError};
use super::{EntityKind, FieldValue, Record};
use crate::scoring;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Names of the five 1-5 rating questions, in display order.
pub const RATING_FIELDS: [&str; 5] = [
    "autonomy",
    "feedback_quality",
    "clarity",
    "fairness",
    "work_life_balance",
];

/// Anonymous feedback about a company and, optionally, one of its managers.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub company_id: i64,
    pub manager_id: Option<i64>,
    pub autonomy: Option<i64>,
    pub feedback_quality: Option<i64>,
    pub clarity: Option<i64>,
    pub fairness: Option<i64>,
    pub work_life_balance: Option<i64>,
    pub duration: Option<ReviewDuration>,
    pub sentiment: Option<Sentiment>,
    pub would_work_again: Option<WouldWorkAgain>,
    /// Comma-separated tags.
    pub tags: Option<String>,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn ratings(&self) -> [Option<i64>; 5] {
        [
            self.autonomy,
            self.feedback_quality,
            self.clarity,
            self.fairness,
            self.work_life_balance,
        ]
    }

    pub fn average_score(&self) -> Option<f64> {
        scoring::average_score(self.ratings())
    }

    pub fn tag_list(&self) -> Vec<String> {
        split_tags(self.tags.as_deref().unwrap_or_default())
    }
}

/// Splits a comma-separated tag string into trimmed, lower-cased tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewInput {
    pub company: Option<i64>,
    pub manager: Option<i64>,
    pub autonomy: Option<i64>,
    pub feedback_quality: Option<i64>,
    pub clarity: Option<i64>,
    pub fairness: Option<i64>,
    pub work_life_balance: Option<i64>,
    pub duration: Option<ReviewDuration>,
    pub sentiment: Option<Sentiment>,
    pub would_work_again: Option<WouldWorkAgain>,
    pub tags: Option<String>,
    pub summary: Option<String>,
}

impl ReviewInput {
    pub fn for_company(company_id: i64) -> Self {
        Self {
            company: Some(company_id),
            ..Self::default()
        }
    }

    pub fn normalized(self) -> Self {
        Self {
            tags: normalize_text(self.tags),
            summary: normalize_text(self.summary),
            ..self
        }
    }
}

impl Validate for ReviewInput {
    fn validate(&self) -> Result<(), ValidationError> {
        Checks::new()
            .required("company", &self.company)
            .rating("autonomy", self.autonomy)
            .rating("feedback_quality", self.feedback_quality)
            .rating("clarity", self.clarity)
            .rating("fairness", self.fairness)
            .rating("work_life_balance", self.work_life_balance)
            .finish()
    }
}

impl Record for Review {
    const KIND: EntityKind = EntityKind::Review;
    type Input = ReviewInput;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, name: &str) -> FieldValue {
        match name {
            "id" => FieldValue::Int(self.id),
            "company" => FieldValue::Int(self.company_id),
            "manager" => FieldValue::int(self.manager_id),
            "autonomy" => FieldValue::int(self.autonomy),
            "feedback_quality" => FieldValue::int(self.feedback_quality),
            "clarity" => FieldValue::int(self.clarity),
            "fairness" => FieldValue::int(self.fairness),
            "work_life_balance" => FieldValue::int(self.work_life_balance),
            "duration" => FieldValue::choice(self.duration),
            "sentiment" => FieldValue::choice(self.sentiment),
            "would_work_again" => FieldValue::choice(self.would_work_again),
            "tags" => FieldValue::text(&self.tags),
            "summary" => FieldValue::text(&self.summary),
            "created_at" => self.created_at.into(),
            _ => FieldValue::Null,
        }
    }

    fn to_input(&self) -> ReviewInput {
        ReviewInput {
            company: Some(self.company_id),
            manager: self.manager_id,
            autonomy: self.autonomy,
            feedback_quality: self.feedback_quality,
            clarity: self.clarity,
            fairness: self.fairness,
            work_life_balance: self.work_life_balance,
            duration: self.duration,
            sentiment: self.sentiment,
            would_work_again: self.would_work_again,
            tags: self.tags.clone(),
            summary: self.summary.clone(),
        }
    }

    fn derived_score(&self) -> Option<f64> {
        self.average_score()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratings_outside_range_are_rejected() {
        let input = ReviewInput {
            autonomy: Some(0),
            fairness: Some(6),
            clarity: Some(3),
            ..ReviewInput::for_company(1)
        };
        let err = input.validate().expect_err("out of range");
        let fields: Vec<_> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["autonomy", "fairness"]);
    }

    #[test]
    fn split_tags_normalizes_entries() {
        assert_eq!(
            split_tags(" Mentorship, remote-friendly ,,Mentorship "),
            vec!["mentorship", "remote-friendly", "mentorship"]
        );
    }

    #[test]
    fn review_without_ratings_is_valid() {
        assert!(ReviewInput::for_company(3).validate().is_ok());
    }
}
