//! Administrator accounts guarding the admin surface.
//!
//! Passwords are stored as `pbkdf2_sha256$<iterations>$<salt>$<hash>` with the
//! derived key base64 encoded, the layout Django uses. The iteration count is
//! read back from each hash, so the work factor can be raised without
//! invalidating existing accounts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::task::JoinError;

pub const ALGORITHM: &str = "pbkdf2_sha256";
/// OWASP's current recommendation for PBKDF2-HMAC-SHA256.
pub const DEFAULT_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 22;
const KEY_LEN: usize = 32;
/// Salt of the hash verified when a login names no existing account.
const DUMMY_SALT: &str = "managerpulseunknownusr";

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
}

/// Values needed to create an account; the password is hashed on insert.
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub is_superuser: bool,
}

/// Work factor for new hashes. Key derivation is CPU bound, so the async
/// helpers run it on the blocking thread pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHasher {
    iterations: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher {
    pub const fn new(iterations: u32) -> Self {
        Self {
            iterations: if iterations == 0 { 1 } else { iterations },
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn hash(&self, password: &str) -> String {
        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LEN)
            .map(char::from)
            .collect();
        encode_hash(password, &salt, self.iterations)
    }

    /// A well-formed hash no password derives to, costing as much to check
    /// as a real one.
    fn dummy_hash(&self) -> String {
        format!(
            "{ALGORITHM}${}${DUMMY_SALT}${}",
            self.iterations,
            STANDARD.encode([0u8; KEY_LEN])
        )
    }

    pub async fn hash_blocking(self, password: String) -> Result<String, JoinError> {
        tokio::task::spawn_blocking(move || self.hash(&password)).await
    }

    /// Checks `password` against `encoded` off the async runtime. With no
    /// stored hash the password is checked against a dummy one, so unknown
    /// usernames take as long to reject as wrong passwords.
    pub async fn verify_blocking(self, password: String, encoded: Option<String>) -> Result<bool, JoinError> {
        tokio::task::spawn_blocking(move || match encoded {
            Some(encoded) => verify_password(&password, &encoded),
            None => {
                verify_password(&password, &self.dummy_hash());
                false
            }
        })
        .await
    }
}

/// Checks `password` against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if algorithm != ALGORITHM || salt.is_empty() {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let Ok(expected) = STANDARD.decode(expected) else {
        return false;
    };
    if iterations == 0 || expected.len() != KEY_LEN {
        return false;
    }

    derive_key(password, salt, iterations)[..].ct_eq(&expected[..]).into()
}

fn encode_hash(password: &str, salt: &str, iterations: u32) -> String {
    let key = derive_key(password, salt, iterations);
    format!("{ALGORITHM}${iterations}${salt}${}", STANDARD.encode(key))
}

fn derive_key(password: &str, salt: &str, iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PasswordHasher {
        PasswordHasher::new(1_000)
    }

    #[test]
    fn hash_round_trips() {
        let encoded = fast().hash("correct horse");
        assert!(encoded.starts_with("pbkdf2_sha256$1000$"));
        assert!(verify_password("correct horse", &encoded));
        assert!(!verify_password("battery staple", &encoded));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(fast().hash("same"), fast().hash("same"));
    }

    #[test]
    fn matches_the_published_pbkdf2_sha256_vector() {
        // PBKDF2-HMAC-SHA256("password", "salt", 1 iteration, 32 bytes).
        let encoded = "pbkdf2_sha256$1$salt$Eg+2z/z4syxD5yJSVsT4N6hlSMkszDVICAWYfLcL4Xs=";
        assert!(verify_password("password", encoded));
        assert!(!verify_password("Password", encoded));
    }

    #[test]
    fn iteration_count_is_read_from_the_hash() {
        let encoded = encode_hash("pw", "fixedsalt", 3);
        assert!(encoded.starts_with("pbkdf2_sha256$3$fixedsalt$"));
        assert!(verify_password("pw", &encoded));
    }

    #[test]
    fn malformed_hashes_never_match() {
        for encoded in [
            "",
            "pbkdf2_sha256$10$abc",
            "sha256$1$salt$Eg+2z/z4syxD5yJSVsT4N6hlSMkszDVICAWYfLcL4Xs=",
            "pbkdf2_sha256$x$salt$Eg+2z/z4syxD5yJSVsT4N6hlSMkszDVICAWYfLcL4Xs=",
            "pbkdf2_sha256$0$salt$Eg+2z/z4syxD5yJSVsT4N6hlSMkszDVICAWYfLcL4Xs=",
            "pbkdf2_sha256$1$salt$c2hvcnQ=",
        ] {
            assert!(!verify_password("password", encoded), "{encoded}");
        }
    }

    #[test]
    fn dummy_hash_is_well_formed_and_never_matches() {
        let hasher = fast();
        let dummy = hasher.dummy_hash();
        assert!(dummy.starts_with("pbkdf2_sha256$1000$"));
        assert_eq!(dummy.split('$').count(), 4);
        assert!(!verify_password("", &dummy));
    }

    #[tokio::test]
    async fn blocking_helpers_hash_and_verify_off_the_runtime() {
        let hasher = fast();
        let encoded = hasher.hash_blocking("s3cret".to_string()).await.expect("hash");
        assert!(hasher
            .verify_blocking("s3cret".to_string(), Some(encoded.clone()))
            .await
            .expect("verify"));
        assert!(!hasher
            .verify_blocking("wrong".to_string(), Some(encoded))
            .await
            .expect("verify"));
        assert!(!hasher.verify_blocking("s3cret".to_string(), None).await.expect("verify"));
    }
}
