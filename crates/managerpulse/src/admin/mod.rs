//! Generic back-office over the five entities, driven by static
//! [`registry::EntityAdmin`] records.

/// Runs `$body` with `$alias` bound to the record type of `$kind`.
macro_rules! with_record {
    ($kind:expr, |$alias:ident| $body:expr) => {
        match $kind {
            $crate::domain::EntityKind::Company => {
                type $alias = $crate::domain::Company;
                $body
            }
            $crate::domain::EntityKind::Manager => {
                type $alias = $crate::domain::Manager;
                $body
            }
            $crate::domain::EntityKind::JobPosting => {
                type $alias = $crate::domain::JobPosting;
                $body
            }
            $crate::domain::EntityKind::Review => {
                type $alias = $crate::domain::Review;
                $body
            }
            $crate::domain::EntityKind::CompanyAggregate => {
                type $alias = $crate::domain::CompanyAggregate;
                $body
            }
        }
    };
}

pub mod changelist;
pub mod display;
pub mod form;
pub mod registry;
pub mod service;

pub use changelist::{ChangeList, ListParams};
pub use form::ChangeForm;
pub use registry::{AdminAction, EntityAdmin};
pub use service::{ActionOutcome, AdminIndex, AdminService, AutocompleteResults, DeleteSummary};

use crate::domain::{EntityKind, ValidationError};
use crate::error::store_status;
use crate::interchange::InterchangeError;
use crate::store::{StoreError, Transient};
use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("unknown admin entity '{0}'")]
    UnknownEntity(String),
    #[error("invalid lookup: {0}")]
    InvalidLookup(String),
    #[error("action '{}' is not available for {}", .action, .entity.label())]
    UnknownAction { entity: EntityKind, action: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Interchange(#[from] InterchangeError),
}

impl AdminError {
    pub fn status(&self) -> StatusCode {
        match self {
            AdminError::UnknownEntity(_) => StatusCode::NOT_FOUND,
            AdminError::InvalidLookup(_) | AdminError::UnknownAction { .. } => StatusCode::BAD_REQUEST,
            AdminError::Store(err) => store_status(err),
            AdminError::Interchange(err) => err.status(),
        }
    }
}

impl Transient for AdminError {
    fn is_transient(&self) -> bool {
        match self {
            AdminError::Store(err) => err.is_transient(),
            AdminError::Interchange(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<ValidationError> for AdminError {
    fn from(value: ValidationError) -> Self {
        Self::Store(StoreError::Validation(value))
    }
}

/// Resolves the entity named in an admin URL.
pub fn resolve_entity(slug: &str) -> Result<EntityKind, AdminError> {
    EntityKind::from_slug(slug).ok_or_else(|| AdminError::UnknownEntity(slug.to_string()))
}
