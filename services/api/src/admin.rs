//! `/admin` routes over [`AdminService`].

use crate::infra::require_admin;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use managerpulse::admin::{
    resolve_entity, ActionOutcome, AdminError, AdminIndex, AdminService, AutocompleteResults, ChangeForm,
    ChangeList, DeleteSummary, ListParams,
};
use managerpulse::domain::parse_bool;
use managerpulse::error::AppError;
use managerpulse::interchange::{Format, ImportOptions, ImportReport};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

pub(crate) fn admin_router(service: Arc<AdminService>) -> Router {
    Router::new()
        .route("/admin/", get(index_handler))
        .route("/admin/:entity", get(list_handler).post(create_handler))
        .route("/admin/:entity/export", get(export_handler))
        .route("/admin/:entity/import", post(import_handler))
        .route("/admin/:entity/autocomplete", get(autocomplete_handler))
        .route("/admin/:entity/action", post(action_handler))
        .route(
            "/admin/:entity/:id",
            get(detail_handler).put(update_handler).delete(delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(service.clone(), require_admin))
        .with_state(service)
}

type Service = State<Arc<AdminService>>;

async fn index_handler(State(service): Service) -> Json<AdminIndex> {
    Json(service.index())
}

async fn list_handler(
    State(service): Service,
    Path(entity): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ChangeList>, AppError> {
    let kind = resolve_entity(&entity)?;
    let params = ListParams::from_pairs(pairs);
    Ok(Json(service.list(kind, &params).await?))
}

async fn create_handler(
    State(service): Service,
    Path(entity): Path<String>,
    Json(values): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<ChangeForm>), AppError> {
    let kind = resolve_entity(&entity)?;
    let form = service.create(kind, &values).await?;
    Ok((StatusCode::CREATED, Json(form)))
}

async fn detail_handler(
    State(service): Service,
    Path((entity, id)): Path<(String, i64)>,
) -> Result<Json<ChangeForm>, AppError> {
    let kind = resolve_entity(&entity)?;
    Ok(Json(service.detail(kind, id).await?))
}

async fn update_handler(
    State(service): Service,
    Path((entity, id)): Path<(String, i64)>,
    Json(values): Json<Map<String, Value>>,
) -> Result<Json<ChangeForm>, AppError> {
    let kind = resolve_entity(&entity)?;
    Ok(Json(service.update(kind, id, &values).await?))
}

async fn delete_handler(
    State(service): Service,
    Path((entity, id)): Path<(String, i64)>,
) -> Result<Json<DeleteSummary>, AppError> {
    let kind = resolve_entity(&entity)?;
    Ok(Json(service.delete(kind, id).await?))
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    #[serde(default)]
    format: Option<String>,
    /// Comma-separated ids; all records when absent.
    #[serde(default)]
    ids: Option<String>,
}

async fn export_handler(
    State(service): Service,
    Path(entity): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let kind = resolve_entity(&entity)?;
    let format: Format = query.format.as_deref().unwrap_or("csv").parse()?;
    let ids = query.ids.as_deref().map(parse_ids).transpose()?;

    let body = service.export(kind, format, ids.as_deref()).await?;
    let filename = format!(
        "{}-{}.{}",
        kind.slug(),
        Utc::now().format("%Y-%m-%d"),
        format.as_str()
    );
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

fn parse_ids(raw: &str) -> Result<Vec<i64>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .map_err(|_| AdminError::InvalidLookup(format!("'{id}' is not a valid id")).into())
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ImportQuery {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    dry_run: Option<String>,
}

async fn import_handler(
    State(service): Service,
    Path(entity): Path<String>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<Json<ImportReport>, AppError> {
    let kind = resolve_entity(&entity)?;
    let format: Format = query.format.as_deref().unwrap_or("csv").parse()?;
    let dry_run = query.dry_run.as_deref().and_then(parse_bool).unwrap_or(false);

    let report = service
        .import(kind, format, &body, ImportOptions { dry_run })
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct AutocompleteQuery {
    #[serde(default)]
    term: String,
}

async fn autocomplete_handler(
    State(service): Service,
    Path(entity): Path<String>,
    Query(query): Query<AutocompleteQuery>,
) -> Result<Json<AutocompleteResults>, AppError> {
    let kind = resolve_entity(&entity)?;
    Ok(Json(service.autocomplete(kind, &query.term).await?))
}

#[derive(Debug, Deserialize)]
struct ActionRequest {
    action: String,
    #[serde(default)]
    ids: Vec<i64>,
}

async fn action_handler(
    State(service): Service,
    Path(entity): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionOutcome>, AppError> {
    let kind = resolve_entity(&entity)?;
    Ok(Json(service.run_action(kind, &request.action, &request.ids).await?))
}
