//! Bulk import and export of records as CSV, TSV or JSON files.
//!
//! Imports run inside one transaction. Rows are validated one by one and
//! their errors collected; if any row fails, or the import is a dry run, the
//! transaction is rolled back and nothing is written. A transaction that
//! collides with a concurrent writer is replayed from the first row.

pub mod dataset;
pub mod resource;

pub use dataset::{Dataset, Format};
pub use resource::{CellType, Resource, ResourceField};

use crate::domain::{
    decode_fields, parse_bool, Company, CompanyAggregate, EntityKind, FieldError, FieldValue, JobPosting,
    Manager, Record, Review,
};
use crate::error::store_status;
use crate::store::{self, with_retry, Conn, Database, Repository, RetryConfig, StoreError, Transient};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum InterchangeError {
    #[error("unsupported format '{0}'; expected csv, tsv or json")]
    UnsupportedFormat(String),
    #[error("{} records cannot be imported or exported", .0.label())]
    NoResource(EntityKind),
    #[error("malformed delimited file: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InterchangeError {
    pub fn status(&self) -> StatusCode {
        match self {
            InterchangeError::NoResource(_) => StatusCode::NOT_FOUND,
            InterchangeError::UnsupportedFormat(_)
            | InterchangeError::Csv(_)
            | InterchangeError::Json(_)
            | InterchangeError::InvalidDocument(_) => StatusCode::BAD_REQUEST,
            InterchangeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            InterchangeError::Store(err) => store_status(err),
        }
    }
}

impl Transient for InterchangeError {
    fn is_transient(&self) -> bool {
        matches!(self, InterchangeError::Store(err) if err.is_transient())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportOptions {
    /// Validate and report without writing anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    New,
    Update,
    Skip,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowResult {
    /// 1-based position among the data rows.
    pub number: usize,
    pub outcome: RowOutcome,
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportTotals {
    pub new: usize,
    pub update: usize,
    pub skip: usize,
    pub error: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub entity: EntityKind,
    pub dry_run: bool,
    /// Whether the rows were written.
    pub committed: bool,
    pub totals: ImportTotals,
    pub rows: Vec<RowResult>,
}

impl ImportReport {
    pub fn has_errors(&self) -> bool {
        self.totals.error > 0
    }

    fn record(&mut self, result: RowResult, report_skipped: bool) {
        match result.outcome {
            RowOutcome::New => self.totals.new += 1,
            RowOutcome::Update => self.totals.update += 1,
            RowOutcome::Skip => self.totals.skip += 1,
            RowOutcome::Error => self.totals.error += 1,
        }
        if result.outcome != RowOutcome::Skip || report_skipped {
            self.rows.push(result);
        }
    }
}

fn resource_for(kind: EntityKind) -> Result<&'static Resource, InterchangeError> {
    Resource::for_kind(kind).ok_or(InterchangeError::NoResource(kind))
}

/// Exports every record of `kind` in primary-key order.
pub async fn export(
    conn: &mut Conn,
    kind: EntityKind,
    format: Format,
) -> Result<Vec<u8>, InterchangeError> {
    let resource = resource_for(kind)?;
    match kind {
        EntityKind::Company => export_records::<Company>(conn, resource, format).await,
        EntityKind::Manager => export_records::<Manager>(conn, resource, format).await,
        EntityKind::JobPosting => export_records::<JobPosting>(conn, resource, format).await,
        EntityKind::Review => export_records::<Review>(conn, resource, format).await,
        EntityKind::CompanyAggregate => export_records::<CompanyAggregate>(conn, resource, format).await,
    }
}

/// Exports selected records only, keeping the requested id order.
pub async fn export_selected(
    conn: &mut Conn,
    kind: EntityKind,
    format: Format,
    ids: &[i64],
) -> Result<Vec<u8>, InterchangeError> {
    let resource = resource_for(kind)?;
    match kind {
        EntityKind::Company => export_ids::<Company>(conn, resource, format, ids).await,
        EntityKind::Manager => export_ids::<Manager>(conn, resource, format, ids).await,
        EntityKind::JobPosting => export_ids::<JobPosting>(conn, resource, format, ids).await,
        EntityKind::Review => export_ids::<Review>(conn, resource, format, ids).await,
        EntityKind::CompanyAggregate => export_ids::<CompanyAggregate>(conn, resource, format, ids).await,
    }
}

async fn export_records<R: Record>(
    conn: &mut Conn,
    resource: &Resource,
    format: Format,
) -> Result<Vec<u8>, InterchangeError> {
    let records = store::fetch_all::<R>(conn).await?;
    render(resource, &records, format)
}

async fn export_ids<R: Record>(
    conn: &mut Conn,
    resource: &Resource,
    format: Format,
    ids: &[i64],
) -> Result<Vec<u8>, InterchangeError> {
    let mut records = Vec::with_capacity(ids.len());
    for &id in ids {
        if let Some(record) = store::fetch::<R>(conn, id).await? {
            records.push(record);
        }
    }
    render(resource, &records, format)
}

fn render<R: Record>(resource: &Resource, records: &[R], format: Format) -> Result<Vec<u8>, InterchangeError> {
    let headers: Vec<String> = resource.headers().into_iter().map(str::to_string).collect();
    let values: Vec<Vec<FieldValue>> = records
        .iter()
        .map(|record| resource.fields.iter().map(|field| record.field(field.name)).collect())
        .collect();

    let dataset = Dataset {
        headers,
        rows: values
            .iter()
            .map(|row| row.iter().map(FieldValue::to_cell).collect())
            .collect(),
    };
    let typed: Vec<Vec<Value>> = values
        .iter()
        .map(|row| row.iter().map(FieldValue::to_json).collect())
        .collect();

    dataset.write(format, Some(&typed))
}

/// Parses and imports a file for `kind`.
#[instrument(skip(db, data), fields(bytes = data.len()))]
pub async fn import(
    db: &Database,
    kind: EntityKind,
    format: Format,
    data: &[u8],
    options: ImportOptions,
) -> Result<ImportReport, InterchangeError> {
    let resource = resource_for(kind)?;
    let dataset = Dataset::read(format, data)?;
    import_dataset(db, resource, &dataset, options).await
}

pub async fn import_dataset(
    db: &Database,
    resource: &Resource,
    dataset: &Dataset,
    options: ImportOptions,
) -> Result<ImportReport, InterchangeError> {
    with_retry(&RetryConfig::default(), || import_attempt(db, resource, dataset, options)).await
}

async fn import_attempt(
    db: &Database,
    resource: &Resource,
    dataset: &Dataset,
    options: ImportOptions,
) -> Result<ImportReport, InterchangeError> {
    let mut tx = db.begin().await?;
    let report = match resource.kind {
        EntityKind::Company => import_rows::<Company>(&mut tx, resource, dataset, options).await?,
        EntityKind::Manager => import_rows::<Manager>(&mut tx, resource, dataset, options).await?,
        EntityKind::JobPosting => import_rows::<JobPosting>(&mut tx, resource, dataset, options).await?,
        EntityKind::Review => import_rows::<Review>(&mut tx, resource, dataset, options).await?,
        EntityKind::CompanyAggregate => {
            import_rows::<CompanyAggregate>(&mut tx, resource, dataset, options).await?
        }
    };

    if report.committed {
        tx.commit().await?;
        info!(
            entity = %resource.kind,
            new = report.totals.new,
            update = report.totals.update,
            skip = report.totals.skip,
            "import committed"
        );
    } else {
        tx.rollback().await?;
        if report.has_errors() {
            warn!(entity = %resource.kind, errors = report.totals.error, "import rolled back");
        } else {
            info!(entity = %resource.kind, "dry run finished, nothing written");
        }
    }
    Ok(report)
}

async fn import_rows<R: Repository>(
    conn: &mut Conn,
    resource: &Resource,
    dataset: &Dataset,
    options: ImportOptions,
) -> Result<ImportReport, InterchangeError> {
    let mut report = ImportReport {
        entity: resource.kind,
        dry_run: options.dry_run,
        committed: false,
        totals: ImportTotals::default(),
        rows: Vec::new(),
    };

    for (index, row) in dataset.rows.iter().enumerate() {
        let number = index + 1;
        let result = match import_row::<R>(conn, resource, dataset, row).await {
            Ok((outcome, id)) => RowResult {
                number,
                outcome,
                id: Some(id),
                errors: Vec::new(),
            },
            Err(RowError::Invalid { id, errors }) => RowResult {
                number,
                outcome: RowOutcome::Error,
                id,
                errors,
            },
            Err(RowError::Fatal(err)) => return Err(err),
        };
        report.record(result, resource.report_skipped);
    }

    report.committed = !options.dry_run && !report.has_errors();
    Ok(report)
}

enum RowError {
    Invalid { id: Option<i64>, errors: Vec<FieldError> },
    Fatal(InterchangeError),
}

impl RowError {
    fn field(id: Option<i64>, field: &str, message: impl Into<String>) -> Self {
        RowError::Invalid {
            id,
            errors: vec![FieldError {
                field: field.to_string(),
                message: message.into(),
            }],
        }
    }
}

async fn import_row<R: Repository>(
    conn: &mut Conn,
    resource: &Resource,
    dataset: &Dataset,
    row: &[String],
) -> Result<(RowOutcome, i64), RowError> {
    let cell = |name: &str| dataset.column(name).and_then(|index| row.get(index));

    let id = match cell("id").map(|raw| raw.trim()).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| RowError::field(None, "id", format!("'{raw}' is not a valid id")))?,
        ),
        None => None,
    };

    let existing = match id {
        Some(id) => store::fetch::<R>(conn, id)
            .await
            .map_err(|err| RowError::Fatal(err.into()))?,
        None => None,
    };

    // Columns missing from the file keep their stored (or default) values.
    let base = match &existing {
        Some(record) => record.to_input(),
        None => R::Input::default(),
    };
    let base = match serde_json::to_value(&base) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(err) => return Err(RowError::Fatal(err.into())),
    };
    let mut values = base.clone();
    let mut patch = Map::new();

    let mut errors = Vec::new();
    for field in resource.fields.iter().filter(|field| field.name != "id") {
        let Some(raw) = cell(field.name) else {
            continue;
        };
        match cell_value(field.cell, raw) {
            Ok(value) => {
                // A blank cell clears text; required text stays a string so
                // validation reports it rather than the decoder.
                let value = match (value, values.get(field.name)) {
                    (Value::Null, Some(Value::String(_))) if field.cell == CellType::Text => {
                        Value::String(String::new())
                    }
                    (value, _) => value,
                };
                patch.insert(field.name.to_string(), value.clone());
                values.insert(field.name.to_string(), value);
            }
            Err(message) => errors.push(FieldError {
                field: field.name.to_string(),
                message,
            }),
        }
    }
    if !errors.is_empty() {
        return Err(RowError::Invalid { id, errors });
    }

    let input: R::Input = decode_fields(&base, &patch, values).map_err(|invalid| RowError::Invalid {
        id,
        errors: invalid.errors,
    })?;

    let written = match existing {
        Some(record) if resource.skip_unchanged && record.to_input() == input => {
            return Ok((RowOutcome::Skip, record.id()));
        }
        Some(record) => R::update(conn, record.id(), &input)
            .await
            .map(|updated| (RowOutcome::Update, updated.id())),
        None => R::insert(conn, id, &input)
            .await
            .map(|created| (RowOutcome::New, created.id())),
    };

    written.map_err(|err| match err {
        StoreError::Validation(validation) => RowError::Invalid {
            id,
            errors: validation.errors,
        },
        other => RowError::Fatal(other.into()),
    })
}

fn cell_value(cell: CellType, raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    match cell {
        _ if raw.is_empty() => Ok(match cell {
            CellType::Bool => Value::Bool(false),
            _ => Value::Null,
        }),
        CellType::Int => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("'{raw}' is not a whole number")),
        CellType::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::from)
            .ok_or_else(|| format!("'{raw}' is not a number")),
        CellType::Bool => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| format!("'{raw}' is not a boolean; use 1/0 or true/false")),
        CellType::Text | CellType::Choice => Ok(Value::String(raw.to_string())),
    }
}
