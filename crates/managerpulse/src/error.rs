use crate::admin::AdminError;
use crate::bootstrap::BootstrapError;
use crate::config::ConfigError;
use crate::domain::ValidationError;
use crate::interchange::InterchangeError;
use crate::store::StoreError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Store(StoreError),
    Admin(AdminError),
    Interchange(InterchangeError),
    Bootstrap(BootstrapError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Store(err) => store_status(err),
            AppError::Admin(err) => err.status(),
            AppError::Interchange(err) => err.status(),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Bootstrap(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Field-level messages, when the failure is a rejected record.
    pub fn validation(&self) -> Option<&ValidationError> {
        let store = match self {
            AppError::Store(err) => err,
            AppError::Admin(AdminError::Store(err)) => err,
            AppError::Admin(AdminError::Interchange(InterchangeError::Store(err))) => err,
            AppError::Interchange(InterchangeError::Store(err)) => err,
            _ => return None,
        };
        match store {
            StoreError::Validation(validation) => Some(validation),
            _ => None,
        }
    }
}

pub(crate) fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Database(_) | StoreError::Migrate(_) | StoreError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Store(err) => write!(f, "{}", err),
            AppError::Admin(err) => write!(f, "{}", err),
            AppError::Interchange(err) => write!(f, "{}", err),
            AppError::Bootstrap(err) => write!(f, "bootstrap failed: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Admin(err) => Some(err),
            AppError::Interchange(err) => Some(err),
            AppError::Bootstrap(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = match self.validation() {
            Some(validation) => Json(json!({
                "error": self.to_string(),
                "errors": validation.errors,
            })),
            None => Json(json!({ "error": self.to_string() })),
        };
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<AdminError> for AppError {
    fn from(value: AdminError) -> Self {
        Self::Admin(value)
    }
}

impl From<InterchangeError> for AppError {
    fn from(value: InterchangeError) -> Self {
        Self::Interchange(value)
    }
}

impl From<BootstrapError> for AppError {
    fn from(value: BootstrapError) -> Self {
        Self::Bootstrap(value)
    }
}
