//! Persistence for the review dataset on SQLite or PostgreSQL.
//!
//! Referential behaviour lives in the schema: deleting a company cascades to
//! its managers, postings, reviews and aggregate, and deleting a manager
//! detaches its reviews. Functions take a `&mut Conn` so callers can compose
//! them inside a transaction; statements use numbered `$N` placeholders,
//! which both engines accept.

pub mod accounts;
pub mod aggregates;
pub mod companies;
pub mod job_postings;
pub mod managers;
pub mod retry;
pub mod reviews;

pub use retry::{with_retry, RetryConfig, Transient};

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::domain::{EntityKind, Record, ValidationError};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::error::ErrorKind;
use sqlx::migrate::Migrator;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{PgConnection, PgPool, Postgres, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");
static POSTGRES_MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

/// SQLite busy/locked result codes (primary and extended) and the
/// PostgreSQL serialization and deadlock SQLSTATEs. A transaction failing
/// with one of these can simply be run again.
const TRANSIENT_CODES: &[&str] = &["5", "6", "261", "262", "517", "773", "40001", "40P01"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to apply migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid record: {0}")]
    Validation(#[from] ValidationError),
    #[error("{} {} not found", .entity.label(), .id)]
    NotFound { entity: EntityKind, id: i64 },
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// Maps constraint failures raised by a write into validation errors so
    /// they are reported like any other rejected field.
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let message = match db_err.kind() {
                ErrorKind::UniqueViolation => Some("a record with this value already exists"),
                ErrorKind::ForeignKeyViolation => Some("referenced record does not exist"),
                ErrorKind::NotNullViolation => Some("a required value is missing"),
                ErrorKind::CheckViolation => Some("a value is outside the allowed range"),
                _ => None,
            };
            if let Some(message) = message {
                return Self::Validation(ValidationError::field("__all__", message));
            }
        }
        Self::Database(err)
    }
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .is_some_and(|code| TRANSIENT_CODES.contains(&&*code)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Pool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

/// Shared handle to the connection pool of either engine.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    #[instrument(skip(config), fields(backend = ?config.backend))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = match config.backend {
            DatabaseBackend::Sqlite => {
                let options = SqliteConnectOptions::from_str(&config.url)?
                    .create_if_missing(true)
                    .foreign_keys(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .busy_timeout(Duration::from_secs(5));
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect_with(options)
                    .await?;
                Pool::Sqlite(pool)
            }
            DatabaseBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(&config.url)
                    .await?;
                Pool::Postgres(pool)
            }
        };

        info!("database connected");
        Ok(Self { pool })
    }

    /// Private in-memory SQLite database with the schema applied. A single
    /// connection is kept alive for the lifetime of the pool because every
    /// in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let database = Self {
            pool: Pool::Sqlite(pool),
        };
        database.migrate().await?;
        Ok(database)
    }

    /// Applies pending migrations; already-applied ones are skipped.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        match &self.pool {
            Pool::Sqlite(pool) => SQLITE_MIGRATOR.run(pool).await?,
            Pool::Postgres(pool) => POSTGRES_MIGRATOR.run(pool).await?,
        }
        info!("migrations applied");
        Ok(())
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self.pool {
            Pool::Sqlite(_) => DatabaseBackend::Sqlite,
            Pool::Postgres(_) => DatabaseBackend::Postgres,
        }
    }

    /// A pooled connection outside any transaction.
    pub async fn acquire(&self) -> Result<Conn, StoreError> {
        let inner = match &self.pool {
            Pool::Sqlite(pool) => Inner::Sqlite(pool.acquire().await?),
            Pool::Postgres(pool) => Inner::Postgres(pool.acquire().await?),
        };
        Ok(Conn { inner })
    }

    /// Starts a transaction; it rolls back unless [`Tx::commit`] is called.
    pub async fn begin(&self) -> Result<Tx, StoreError> {
        let inner = match &self.pool {
            Pool::Sqlite(pool) => Inner::SqliteTx(pool.begin().await?),
            Pool::Postgres(pool) => Inner::PostgresTx(pool.begin().await?),
        };
        Ok(Tx(Conn { inner }))
    }
}

enum Inner {
    Sqlite(PoolConnection<Sqlite>),
    SqliteTx(Transaction<'static, Sqlite>),
    Postgres(PoolConnection<Postgres>),
    PostgresTx(Transaction<'static, Postgres>),
}

/// A connection to whichever engine backs the [`Database`].
pub struct Conn {
    inner: Inner,
}

/// Engine-specific view of a [`Conn`], matched on by [`dispatch!`].
pub(crate) enum Link<'c> {
    Sqlite(&'c mut SqliteConnection),
    Postgres(&'c mut PgConnection),
}

impl Conn {
    pub fn backend(&self) -> DatabaseBackend {
        match self.inner {
            Inner::Sqlite(_) | Inner::SqliteTx(_) => DatabaseBackend::Sqlite,
            Inner::Postgres(_) | Inner::PostgresTx(_) => DatabaseBackend::Postgres,
        }
    }

    pub(crate) fn link(&mut self) -> Link<'_> {
        match &mut self.inner {
            Inner::Sqlite(conn) => Link::Sqlite(&mut **conn),
            Inner::SqliteTx(tx) => Link::Sqlite(&mut **tx),
            Inner::Postgres(conn) => Link::Postgres(&mut **conn),
            Inner::PostgresTx(tx) => Link::Postgres(&mut **tx),
        }
    }
}

/// An open transaction. Dereferences to the [`Conn`] it runs on.
pub struct Tx(Conn);

impl Tx {
    pub async fn commit(self) -> Result<(), StoreError> {
        match self.0.inner {
            Inner::SqliteTx(tx) => tx.commit().await?,
            Inner::PostgresTx(tx) => tx.commit().await?,
            Inner::Sqlite(_) | Inner::Postgres(_) => {}
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), StoreError> {
        match self.0.inner {
            Inner::SqliteTx(tx) => tx.rollback().await?,
            Inner::PostgresTx(tx) => tx.rollback().await?,
            Inner::Sqlite(_) | Inner::Postgres(_) => {}
        }
        Ok(())
    }
}

impl Deref for Tx {
    type Target = Conn;

    fn deref(&self) -> &Conn {
        &self.0
    }
}

impl DerefMut for Tx {
    fn deref_mut(&mut self) -> &mut Conn {
        &mut self.0
    }
}

/// Runs `$body` once per engine with `$c` bound to the concrete connection,
/// so the same query text is type-checked against both drivers. The
/// two-identifier form also names the engine type as `$db`.
macro_rules! dispatch {
    ($conn:expr, |$c:ident| $body:expr) => {
        match $crate::store::Conn::link($conn) {
            $crate::store::Link::Sqlite($c) => $body,
            $crate::store::Link::Postgres($c) => $body,
        }
    };
    ($conn:expr, |$c:ident, $db:ident| $body:expr) => {
        match $crate::store::Conn::link($conn) {
            $crate::store::Link::Sqlite($c) => {
                type $db = ::sqlx::Sqlite;
                $body
            }
            $crate::store::Link::Postgres($c) => {
                type $db = ::sqlx::Postgres;
                $body
            }
        }
    };
}

pub(crate) use dispatch;

/// Entity-specific writes. Reads are shared through the generic helpers below.
#[async_trait]
pub trait Repository: Record {
    /// Inserts a record, keeping `id` when one is supplied.
    async fn insert(conn: &mut Conn, id: Option<i64>, input: &Self::Input) -> Result<Self, StoreError>;

    async fn update(conn: &mut Conn, id: i64, input: &Self::Input) -> Result<Self, StoreError>;
}

/// `INSERT … RETURNING *` over `columns`, led by the id column when the
/// caller supplies one. Omitting it lets either engine assign the key.
pub(crate) fn insert_sql(kind: EntityKind, explicit_id: bool, columns: &[&str]) -> String {
    let names: Vec<&str> = explicit_id
        .then_some("id")
        .into_iter()
        .chain(columns.iter().copied())
        .collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|n| format!("${n}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        kind.table(),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// Moves the PostgreSQL id sequence past a row inserted with an explicit id
/// so later generated keys do not collide with it. SQLite tracks this itself.
pub(crate) async fn claim_explicit_id(conn: &mut Conn, kind: EntityKind, id: Option<i64>) -> Result<(), StoreError> {
    if id.is_none() {
        return Ok(());
    }
    if let Link::Postgres(pg) = conn.link() {
        let table = kind.table();
        let sql = format!("SELECT setval(pg_get_serial_sequence('{table}', 'id'), (SELECT MAX(id) FROM {table}))");
        sqlx::query(&sql).execute(&mut *pg).await?;
    }
    Ok(())
}

pub async fn fetch<R: Record>(conn: &mut Conn, id: i64) -> Result<Option<R>, StoreError> {
    let sql = format!("SELECT * FROM {} WHERE id = $1", R::KIND.table());
    let record = dispatch!(conn, |c| {
        sqlx::query_as::<_, R>(&sql).bind(id).fetch_optional(&mut *c).await?
    });
    Ok(record)
}

pub async fn get<R: Record>(conn: &mut Conn, id: i64) -> Result<R, StoreError> {
    fetch::<R>(conn, id).await?.ok_or(StoreError::NotFound {
        entity: R::KIND,
        id,
    })
}

/// Every record of a type in primary-key order.
pub async fn fetch_all<R: Record>(conn: &mut Conn) -> Result<Vec<R>, StoreError> {
    let sql = format!("SELECT * FROM {} ORDER BY id", R::KIND.table());
    Ok(dispatch!(conn, |c| sqlx::query_as::<_, R>(&sql).fetch_all(&mut *c).await?))
}

/// Records whose `fk_column` points at `parent_id`, newest first.
pub async fn children<R: Record>(conn: &mut Conn, fk_column: &str, parent_id: i64) -> Result<Vec<R>, StoreError> {
    let table = R::KIND.table();
    let order = if R::KIND == EntityKind::CompanyAggregate {
        "updated_at"
    } else {
        "created_at"
    };
    let sql = format!("SELECT * FROM {table} WHERE {fk_column} = $1 ORDER BY {order} DESC, id DESC");
    Ok(dispatch!(conn, |c| {
        sqlx::query_as::<_, R>(&sql).bind(parent_id).fetch_all(&mut *c).await?
    }))
}

/// Deletes one record; returns whether a row was removed.
pub async fn delete(conn: &mut Conn, kind: EntityKind, id: i64) -> Result<bool, StoreError> {
    let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
    let removed = dispatch!(conn, |c| {
        sqlx::query(&sql).bind(id).execute(&mut *c).await?.rows_affected()
    });
    Ok(removed > 0)
}

pub async fn exists(conn: &mut Conn, kind: EntityKind, id: i64) -> Result<bool, StoreError> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", kind.table());
    let found: bool = dispatch!(conn, |c| {
        sqlx::query_scalar(&sql).bind(id).fetch_one(&mut *c).await?
    });
    Ok(found)
}

pub async fn count_related(
    conn: &mut Conn,
    kind: EntityKind,
    fk_column: &str,
    parent_id: i64,
) -> Result<i64, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {fk_column} = $1", kind.table());
    let count: i64 = dispatch!(conn, |c| {
        sqlx::query_scalar(&sql).bind(parent_id).fetch_one(&mut *c).await?
    });
    Ok(count)
}

/// Resolves a foreign key from an input, rejecting absent or dangling ids.
pub(crate) async fn resolve_reference(
    conn: &mut Conn,
    field: &str,
    kind: EntityKind,
    id: Option<i64>,
) -> Result<i64, StoreError> {
    let Some(id) = id else {
        return Err(ValidationError::field(field, "this field is required").into());
    };
    if exists(conn, kind, id).await? {
        Ok(id)
    } else {
        Err(ValidationError::field(field, format!("{} {id} does not exist", kind.label())).into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeEffect {
    Deleted,
    Detached,
}

/// One line of the "what else does this delete touch" summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadeEntry {
    pub entity: EntityKind,
    pub effect: CascadeEffect,
    pub count: i64,
}

/// Rows that deleting `kind`/`id` would remove or detach, as enforced by the
/// schema's foreign keys.
pub async fn cascade_summary(conn: &mut Conn, kind: EntityKind, id: i64) -> Result<Vec<CascadeEntry>, StoreError> {
    let dependents: &[(EntityKind, &str, CascadeEffect)] = match kind {
        EntityKind::Company => &[
            (EntityKind::Manager, "company_id", CascadeEffect::Deleted),
            (EntityKind::JobPosting, "company_id", CascadeEffect::Deleted),
            (EntityKind::Review, "company_id", CascadeEffect::Deleted),
            (EntityKind::CompanyAggregate, "company_id", CascadeEffect::Deleted),
        ],
        EntityKind::Manager => &[(EntityKind::Review, "manager_id", CascadeEffect::Detached)],
        EntityKind::JobPosting | EntityKind::Review | EntityKind::CompanyAggregate => &[],
    };

    let mut summary = Vec::with_capacity(dependents.len());
    for (entity, fk_column, effect) in dependents {
        let count = count_related(conn, *entity, fk_column, id).await?;
        if count > 0 {
            summary.push(CascadeEntry {
                entity: *entity,
                effect: *effect,
                count,
            });
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_leads_with_an_explicit_id() {
        assert_eq!(
            insert_sql(EntityKind::Company, false, &["name", "city"]),
            "INSERT INTO companies (name, city) VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(
            insert_sql(EntityKind::Review, true, &["company_id"]),
            "INSERT INTO reviews (id, company_id) VALUES ($1, $2) RETURNING *"
        );
    }

    #[tokio::test]
    async fn transactions_roll_back_unless_committed() {
        let db = Database::in_memory().await.expect("db");
        assert_eq!(db.backend(), DatabaseBackend::Sqlite);

        let mut tx = db.begin().await.expect("begin");
        sqlx_insert_company(&mut tx, "Dropped").await;
        tx.rollback().await.expect("rollback");

        let mut tx = db.begin().await.expect("begin");
        sqlx_insert_company(&mut tx, "Kept").await;
        tx.commit().await.expect("commit");

        let mut conn = db.acquire().await.expect("conn");
        assert_eq!(conn.backend(), DatabaseBackend::Sqlite);
        let names: Vec<String> = dispatch!(&mut conn, |c| {
            sqlx::query_scalar("SELECT name FROM companies ORDER BY id")
                .fetch_all(&mut *c)
                .await
                .expect("names")
        });
        assert_eq!(names, vec!["Kept".to_string()]);
    }

    async fn sqlx_insert_company(conn: &mut Conn, name: &str) {
        dispatch!(conn, |c| {
            sqlx::query("INSERT INTO companies (name, created_at, updated_at) VALUES ($1, $2, $2)")
                .bind(name)
                .bind(chrono::Utc::now())
                .execute(&mut *c)
                .await
                .expect("insert");
        });
    }

    #[test]
    fn only_busy_and_serialization_failures_are_transient() {
        assert!(!StoreError::NotFound {
            entity: EntityKind::Company,
            id: 1
        }
        .is_transient());
        assert!(!StoreError::Validation(ValidationError::field("name", "required")).is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}
