use super::{dispatch, Conn, StoreError};
use crate::accounts::{AdminUser, NewAdmin, PasswordHasher};
use chrono::Utc;

impl AdminUser {
    pub async fn find_by_username(conn: &mut Conn, username: &str) -> Result<Option<AdminUser>, StoreError> {
        let user = dispatch!(conn, |c| {
            sqlx::query_as::<_, AdminUser>("SELECT * FROM admin_users WHERE username = $1")
                .bind(username)
                .fetch_optional(&mut *c)
                .await?
        });
        Ok(user)
    }

    pub async fn create(conn: &mut Conn, hasher: PasswordHasher, new: &NewAdmin) -> Result<AdminUser, StoreError> {
        let password_hash = hasher.hash_blocking(new.password.clone()).await?;
        dispatch!(conn, |c| {
            sqlx::query_as::<_, AdminUser>(
                "INSERT INTO admin_users (username, email, password_hash, is_superuser, created_at) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(new.username.trim())
            .bind(&new.email)
            .bind(&password_hash)
            .bind(new.is_superuser)
            .bind(Utc::now())
            .fetch_one(&mut *c)
            .await
        })
        .map_err(StoreError::from_write)
    }

    /// Returns the account when the credentials match. Unknown usernames
    /// still pay for one key derivation.
    pub async fn authenticate(
        conn: &mut Conn,
        hasher: PasswordHasher,
        username: &str,
        password: &str,
    ) -> Result<Option<AdminUser>, StoreError> {
        let user = Self::find_by_username(conn, username).await?;
        let stored = user.as_ref().map(|user| user.password_hash.clone());
        let valid = hasher.verify_blocking(password.to_string(), stored).await?;
        Ok(user.filter(|_| valid))
    }
}
