use crate::accounts::{PasswordHasher, DEFAULT_ITERATIONS};
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_SECRET_KEY: &str = "managerpulse-insecure-change-this-in-production";
const DEFAULT_ALLOWED_HOSTS: &str = "localhost,127.0.0.1,.railway.app,.up.railway.app";
const DEFAULT_DATABASE_URL: &str = "sqlite://db.sqlite3";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub static_files: StaticFilesConfig,
    pub superuser: SuperuserConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "10000".to_string())
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database = DatabaseConfig::new(
            non_blank("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
        )?;

        let security = SecurityConfig {
            secret_key: non_blank("SECRET_KEY").unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string()),
            debug: env::var("DEBUG")
                .map(|value| value.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            allowed_hosts: AllowedHosts::parse(
                &env::var("ALLOWED_HOSTS").unwrap_or_else(|_| DEFAULT_ALLOWED_HOSTS.to_string()),
            ),
            password_iterations: match non_blank("PASSWORD_HASH_ITERATIONS") {
                Some(raw) => raw
                    .parse::<u32>()
                    .ok()
                    .filter(|iterations| *iterations > 0)
                    .ok_or(ConfigError::InvalidHashIterations)?,
                None => DEFAULT_ITERATIONS,
            },
        };

        let static_files = StaticFilesConfig {
            source_dir: PathBuf::from(
                non_blank("STATIC_SOURCE_DIR").unwrap_or_else(|| "static".to_string()),
            ),
            root: PathBuf::from(non_blank("STATIC_ROOT").unwrap_or_else(|| "staticfiles".to_string())),
        };

        let superuser = SuperuserConfig {
            username: non_blank("SUPERUSER_USERNAME").unwrap_or_else(|| "admin".to_string()),
            email: non_blank("SUPERUSER_EMAIL").unwrap_or_else(|| "admin@example.com".to_string()),
            password: non_blank("SUPERUSER_PASSWORD"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            security,
            static_files,
            superuser,
        })
    }
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

/// Where records are persisted, chosen by the URL scheme.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub backend: DatabaseBackend,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Result<Self, ConfigError> {
        let url = url.into();
        let backend = match url::Url::parse(&url).as_ref().map(url::Url::scheme) {
            Ok("sqlite") => DatabaseBackend::Sqlite,
            Ok("postgres" | "postgresql") => DatabaseBackend::Postgres,
            _ => return Err(ConfigError::UnsupportedDatabase { url }),
        };
        Ok(Self {
            url,
            backend,
            max_connections: 5,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub secret_key: String,
    pub debug: bool,
    pub allowed_hosts: AllowedHosts,
    /// PBKDF2 rounds for newly hashed admin passwords.
    pub password_iterations: u32,
}

impl SecurityConfig {
    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == DEFAULT_SECRET_KEY
    }

    pub fn password_hasher(&self) -> PasswordHasher {
        PasswordHasher::new(self.password_iterations)
    }
}

/// Host header allow-list. `.example.com` matches the domain and any
/// subdomain; `*` matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedHosts {
    patterns: Vec<String>,
}

impl AllowedHosts {
    pub fn parse(raw: &str) -> Self {
        let patterns = raw
            .split(',')
            .map(|pattern| pattern.trim().to_ascii_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Checks a `Host` header value; any port suffix is ignored.
    pub fn allows(&self, host_header: &str) -> bool {
        let host = strip_port(host_header.trim()).to_ascii_lowercase();
        let host = host.trim_end_matches('.');
        if host.is_empty() {
            return false;
        }

        self.patterns.iter().any(|pattern| {
            if pattern == "*" {
                true
            } else if let Some(domain) = pattern.strip_prefix('.') {
                host == domain || host.ends_with(pattern.as_str())
            } else {
                host == pattern
            }
        })
    }
}

fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal, optionally followed by a port.
        return rest.split(']').next().unwrap_or_default();
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[derive(Debug, Clone)]
pub struct StaticFilesConfig {
    pub source_dir: PathBuf,
    pub root: PathBuf,
}

/// Administrator provisioned at startup when a password is configured.
#[derive(Debug, Clone)]
pub struct SuperuserConfig {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    UnsupportedDatabase { url: String },
    InvalidHashIterations,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::UnsupportedDatabase { url } => {
                let scheme = url.split(':').next().unwrap_or_default();
                write!(
                    f,
                    "DATABASE_URL must be a sqlite: or postgres: URL (got scheme '{scheme}')"
                )
            }
            ConfigError::InvalidHashIterations => {
                write!(f, "PASSWORD_HASH_ITERATIONS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::UnsupportedDatabase { .. }
            | ConfigError::InvalidHashIterations => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "PORT",
            "APP_LOG_LEVEL",
            "DATABASE_URL",
            "SECRET_KEY",
            "DEBUG",
            "ALLOWED_HOSTS",
            "STATIC_SOURCE_DIR",
            "STATIC_ROOT",
            "SUPERUSER_USERNAME",
            "SUPERUSER_EMAIL",
            "SUPERUSER_PASSWORD",
            "PASSWORD_HASH_ITERATIONS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.database.url, "sqlite://db.sqlite3");
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.security.password_hasher().iterations(), DEFAULT_ITERATIONS);
        assert!(config.security.debug);
        assert!(config.security.uses_default_secret());
        assert_eq!(config.static_files.root, PathBuf::from("staticfiles"));
        assert_eq!(config.superuser.username, "admin");
        assert_eq!(config.superuser.email, "admin@example.com");
        assert_eq!(config.superuser.password, None);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 10000));
        reset_env();
    }

    #[test]
    fn debug_flag_is_case_insensitive() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DEBUG", "TRUE");
        assert!(AppConfig::load().expect("config").security.debug);
        env::set_var("DEBUG", "0");
        assert!(!AppConfig::load().expect("config").security.debug);
        reset_env();
    }

    #[test]
    fn accepts_sqlite_and_postgres_database_urls() {
        for (url, backend) in [
            ("sqlite://db.sqlite3", DatabaseBackend::Sqlite),
            ("sqlite::memory:", DatabaseBackend::Sqlite),
            ("postgres://user:pw@db:5432/managerpulse", DatabaseBackend::Postgres),
            ("postgresql://db/managerpulse", DatabaseBackend::Postgres),
        ] {
            let config = DatabaseConfig::new(url).expect(url);
            assert_eq!(config.backend, backend, "{url}");
            assert_eq!(config.url, url);
        }

        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("DATABASE_URL", "postgres://user:pw@db/managerpulse");
        let config = AppConfig::load().expect("postgres is supported");
        assert_eq!(config.database.backend, DatabaseBackend::Postgres);
        reset_env();
    }

    #[test]
    fn rejects_other_database_schemes_without_leaking_credentials() {
        for url in ["mysql://user:pw@db/managerpulse", "db.sqlite3", ""] {
            let err = DatabaseConfig::new(url).expect_err(url);
            assert!(matches!(err, ConfigError::UnsupportedDatabase { .. }));
            assert!(!err.to_string().contains("pw"));
        }
    }

    #[test]
    fn password_iterations_must_be_positive() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PASSWORD_HASH_ITERATIONS", "1000");
        let config = AppConfig::load().expect("config");
        assert_eq!(config.security.password_hasher().iterations(), 1000);
        for raw in ["0", "many"] {
            env::set_var("PASSWORD_HASH_ITERATIONS", raw);
            assert!(matches!(
                AppConfig::load(),
                Err(ConfigError::InvalidHashIterations)
            ));
        }
        reset_env();
    }

    #[test]
    fn allowed_hosts_match_exact_and_suffix_patterns() {
        let hosts = AllowedHosts::parse(DEFAULT_ALLOWED_HOSTS);
        assert!(hosts.allows("localhost:10000"));
        assert!(hosts.allows("127.0.0.1"));
        assert!(hosts.allows("railway.app"));
        assert!(hosts.allows("managerpulse.up.railway.app"));
        assert!(hosts.allows("API.Railway.App"));
        assert!(!hosts.allows("evilrailway.app"));
        assert!(!hosts.allows("example.com"));
        assert!(!hosts.allows(""));
    }

    #[test]
    fn wildcard_and_ipv6_hosts() {
        assert!(AllowedHosts::parse("*").allows("anything.test"));
        let hosts = AllowedHosts::parse("::1");
        assert!(hosts.allows("[::1]:8080"));
    }
}
