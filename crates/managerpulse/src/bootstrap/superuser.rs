use crate::accounts::{AdminUser, NewAdmin, PasswordHasher};
use crate::config::SuperuserConfig;
use crate::store::{Conn, StoreError};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
    /// No password configured.
    Skipped,
}

/// Creates the configured administrator unless the username is taken.
pub async fn provision_superuser(
    conn: &mut Conn,
    hasher: PasswordHasher,
    config: &SuperuserConfig,
) -> Result<Provisioned, StoreError> {
    let Some(password) = config.password.as_deref() else {
        return Ok(Provisioned::Skipped);
    };

    if AdminUser::find_by_username(conn, &config.username).await?.is_some() {
        info!(username = %config.username, "superuser already exists");
        return Ok(Provisioned::AlreadyExists);
    }

    AdminUser::create(
        conn,
        hasher,
        &NewAdmin {
            username: config.username.clone(),
            email: Some(config.email.clone()),
            password: password.to_string(),
            is_superuser: true,
        },
    )
    .await?;
    info!(username = %config.username, "superuser created");
    Ok(Provisioned::Created)
}
