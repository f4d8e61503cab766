//! Records of the review dataset and the inputs used to write them.

pub mod aggregate;
pub mod choices;
pub mod company;
pub mod job_posting;
pub mod manager;
pub mod review;
pub mod validation;
pub mod value;

pub use aggregate::{CompanyAggregate, CompanyAggregateInput, AVERAGE_FIELDS};
pub use choices::{Choice, ChoiceError, Confidence, JobSource, ReviewDuration, Sentiment, WouldWorkAgain};
pub use company::{Company, CompanyInput};
pub use job_posting::{JobPosting, JobPostingInput};
pub use manager::{Manager, ManagerInput};
pub use review::{split_tags, Review, ReviewInput, RATING_FIELDS};
pub use validation::{decode_fields, FieldError, Validate, ValidationError};
pub use value::{parse_bool, FieldValue};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use std::fmt;

/// The five persisted entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Manager,
    JobPosting,
    Review,
    CompanyAggregate,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Company,
        EntityKind::Manager,
        EntityKind::JobPosting,
        EntityKind::Review,
        EntityKind::CompanyAggregate,
    ];

    /// URL segment used by the admin surface and the CLI.
    pub fn slug(self) -> &'static str {
        match self {
            EntityKind::Company => "companies",
            EntityKind::Manager => "managers",
            EntityKind::JobPosting => "job-postings",
            EntityKind::Review => "reviews",
            EntityKind::CompanyAggregate => "company-aggregates",
        }
    }

    /// Singular human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Manager => "manager",
            EntityKind::JobPosting => "job posting",
            EntityKind::Review => "review",
            EntityKind::CompanyAggregate => "company aggregate",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Company => "companies",
            EntityKind::Manager => "managers",
            EntityKind::JobPosting => "job_postings",
            EntityKind::Review => "reviews",
            EntityKind::CompanyAggregate => "company_aggregates",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        let normalized = slug.trim().trim_matches('/').to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|kind| kind.slug() == normalized)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// A persisted row plus the uniform accessors the admin and interchange
/// layers rely on.
pub trait Record:
    for<'r> sqlx::FromRow<'r, SqliteRow>
    + for<'r> sqlx::FromRow<'r, PgRow>
    + Serialize + Clone + Send + Sync + Unpin + 'static
{
    const KIND: EntityKind;

    /// Writable form of the record, as accepted by create/update and import.
    type Input: Validate
        + Clone
        + PartialEq
        + Default
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    fn id(&self) -> i64;

    /// Value of a named field; unknown names yield [`FieldValue::Null`].
    fn field(&self, name: &str) -> FieldValue;

    fn to_input(&self) -> Self::Input;

    /// Read-only score shown next to the record, if the entity has one.
    fn derived_score(&self) -> Option<f64> {
        None
    }
}
