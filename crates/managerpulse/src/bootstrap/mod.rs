//! Startup sequence run before the HTTP server binds: migrations, static
//! asset collection and administrator provisioning. Every step is fatal.

pub mod static_files;
pub mod superuser;

pub use static_files::{collect_static, CollectReport, MANIFEST_NAME};
pub use superuser::{provision_superuser, Provisioned};

use crate::config::{AppConfig, AppEnvironment};
use crate::store::{Database, StoreError};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to collect static files into {path}: {source}")]
    Static {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write static manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// What a completed bootstrap did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub collected: Option<CollectReport>,
    pub superuser: Provisioned,
}

/// Connects, migrates, collects static files and provisions the
/// administrator, returning the ready database.
pub async fn run(config: &AppConfig) -> Result<(Database, BootstrapReport), BootstrapError> {
    if config.security.uses_default_secret() && config.environment == AppEnvironment::Production {
        warn!("SECRET_KEY is not set; using the insecure development key");
    }

    let database = Database::connect(&config.database).await?;
    database.migrate().await?;

    let collected = collect_static(&config.static_files)?;
    let superuser = {
        let mut conn = database.acquire().await?;
        provision_superuser(&mut conn, config.security.password_hasher(), &config.superuser).await?
    };

    info!(?superuser, "bootstrap finished");
    Ok((
        database,
        BootstrapReport {
            collected,
            superuser,
        },
    ))
}
