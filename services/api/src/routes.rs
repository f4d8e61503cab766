use crate::admin::admin_router;
use crate::infra::{enforce_allowed_hosts, AppState};
use axum::extract::Path;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use serde_json::json;
use std::path::{Component, Path as FsPath};
use tracing::warn;

pub(crate) fn build_router(state: AppState) -> Router {
    admin_router(state.admin.clone())
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/static/*path", get(static_file))
        .layer(middleware::from_fn_with_state(
            state.allowed_hosts.clone(),
            enforce_allowed_hosts,
        ))
        .layer(Extension(state))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serves collected assets from the static root.
pub(crate) async fn static_file(
    Extension(state): Extension<AppState>,
    Path(path): Path<String>,
) -> Response {
    let relative = FsPath::new(&path);
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return not_found();
    }

    let file = state.static_root.join(relative);
    match tokio::fs::read(&file).await {
        Ok(contents) => {
            let mime = mime_guess::from_path(&file).first_or_octet_stream();
            let content_type = HeaderValue::from_str(mime.as_ref())
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            ([(header::CONTENT_TYPE, content_type)], contents).into_response()
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(err) => {
            warn!(path = %file.display(), error = %err, "failed to read static file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use base64::prelude::{Engine as _, BASE64_STANDARD};
    use managerpulse::accounts::{AdminUser, NewAdmin, PasswordHasher};
    use managerpulse::admin::AdminService;
    use managerpulse::aggregation::AggregationPolicy;
    use managerpulse::config::AllowedHosts;
    use managerpulse::store::Database;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tower::ServiceExt;

    const HASHER: PasswordHasher = PasswordHasher::new(1_000);

    async fn app(static_root: PathBuf) -> Router {
        let database = Database::in_memory().await.expect("database");
        {
            let mut conn = database.acquire().await.expect("connection");
            AdminUser::create(
                &mut conn,
                HASHER,
                &NewAdmin {
                    username: "admin".to_string(),
                    email: None,
                    password: "s3cret".to_string(),
                    is_superuser: true,
                },
            )
            .await
            .expect("admin user");
        }

        build_router(AppState {
            readiness: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            admin: Arc::new(
                AdminService::new(database, AggregationPolicy::default()).with_password_hasher(HASHER),
            ),
            allowed_hosts: Arc::new(AllowedHosts::parse("localhost,.railway.app")),
            static_root: Arc::new(static_root),
        })
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let credentials = BASE64_STANDARD.encode("admin:s3cret");
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "localhost:10000")
            .header(header::AUTHORIZATION, format!("Basic {credentials}"));
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_is_public_but_host_checked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = app(dir.path().to_path_buf()).await;

        let ok = router
            .clone()
            .oneshot(
                Request::get("/health")
                    .header(header::HOST, "managerpulse.up.railway.app")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);

        let rejected = router
            .oneshot(
                Request::get("/health")
                    .header(header::HOST, "evil.example.com")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_requires_credentials() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = app(dir.path().to_path_buf()).await;

        let response = router
            .oneshot(
                Request::get("/admin/")
                    .header(header::HOST, "localhost")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn wrong_passwords_and_unknown_users_are_both_unauthorized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = app(dir.path().to_path_buf()).await;

        for credentials in ["admin:wrong", "nobody:s3cret"] {
            let response = router
                .clone()
                .oneshot(
                    Request::get("/admin/")
                        .header(header::HOST, "localhost")
                        .header(
                            header::AUTHORIZATION,
                            format!("Basic {}", BASE64_STANDARD.encode(credentials)),
                        )
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{credentials}");
        }
    }

    #[tokio::test]
    async fn create_list_and_delete_through_the_admin() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = app(dir.path().to_path_buf()).await;

        let created = router
            .clone()
            .oneshot(request(
                "POST",
                "/admin/companies",
                Some(json!({ "name": "Acme", "city": "Berlin" })),
            ))
            .await
            .expect("response");
        assert_eq!(created.status(), StatusCode::CREATED);
        let company_id = json_body(created).await["id"].as_i64().expect("id");

        let review = router
            .clone()
            .oneshot(request(
                "POST",
                "/admin/reviews",
                Some(json!({ "company": company_id, "autonomy": 5, "feedback_quality": 3 })),
            ))
            .await
            .expect("response");
        assert_eq!(review.status(), StatusCode::CREATED);
        let review = json_body(review).await;
        assert_eq!(review["score"]["value"], "4.0");

        let list = router
            .clone()
            .oneshot(request("GET", "/admin/companies?q=acme", None))
            .await
            .expect("response");
        assert_eq!(list.status(), StatusCode::OK);
        let list = json_body(list).await;
        assert_eq!(list["result_count"], 1);
        assert_eq!(list["rows"][0]["label"], "Acme");

        let deleted = router
            .clone()
            .oneshot(request("DELETE", &format!("/admin/companies/{company_id}"), None))
            .await
            .expect("response");
        assert_eq!(deleted.status(), StatusCode::OK);
        let deleted = json_body(deleted).await;
        assert_eq!(deleted["cascade"][0]["entity"], "review");
        assert_eq!(deleted["cascade"][0]["count"], 1);

        let reviews = router
            .oneshot(request("GET", "/admin/reviews", None))
            .await
            .expect("response");
        assert_eq!(json_body(reviews).await["full_count"], 0);
    }

    #[tokio::test]
    async fn client_errors_carry_statuses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = app(dir.path().to_path_buf()).await;

        let unknown = router
            .clone()
            .oneshot(request("GET", "/admin/users", None))
            .await
            .expect("response");
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let bad_filter = router
            .clone()
            .oneshot(request("GET", "/admin/companies?password=x", None))
            .await
            .expect("response");
        assert_eq!(bad_filter.status(), StatusCode::BAD_REQUEST);

        let invalid = router
            .clone()
            .oneshot(request("POST", "/admin/reviews", Some(json!({ "autonomy": 9 }))))
            .await
            .expect("response");
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(invalid).await;
        assert!(body["errors"].as_array().is_some_and(|errors| !errors.is_empty()));

        let no_resource = router
            .oneshot(request("GET", "/admin/company-aggregates/export?format=csv", None))
            .await
            .expect("response");
        assert_eq!(no_resource.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn import_then_export_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let router = app(dir.path().to_path_buf()).await;

        let credentials = BASE64_STANDARD.encode("admin:s3cret");
        let import = Request::post("/admin/companies/import?format=csv")
            .header(header::HOST, "localhost")
            .header(header::AUTHORIZATION, format!("Basic {credentials}"))
            .body(Body::from("name,city\nAcme,Berlin\nGlobex,Springfield\n"))
            .expect("request");
        let report = router.clone().oneshot(import).await.expect("response");
        assert_eq!(report.status(), StatusCode::OK);
        let report = json_body(report).await;
        assert_eq!(report["totals"]["new"], 2);
        assert_eq!(report["committed"], true);

        let export = router
            .oneshot(request("GET", "/admin/companies/export?format=csv", None))
            .await
            .expect("response");
        assert_eq!(export.status(), StatusCode::OK);
        assert!(export.headers()[header::CONTENT_TYPE]
            .to_str()
            .expect("ascii")
            .starts_with("text/csv"));
        let bytes = to_bytes(export.into_body(), usize::MAX).await.expect("body");
        let text = String::from_utf8(bytes.to_vec()).expect("utf8");
        assert!(text.starts_with("id,name,domain"));
        assert!(text.contains("Globex"));
    }

    #[tokio::test]
    async fn static_files_are_served_with_guessed_types() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("css")).expect("mkdir");
        std::fs::write(dir.path().join("css/admin.css"), "body {}").expect("write");
        let router = app(dir.path().to_path_buf()).await;

        let found = router
            .clone()
            .oneshot(
                Request::get("/static/css/admin.css")
                    .header(header::HOST, "localhost")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(found.headers()[header::CONTENT_TYPE], "text/css");

        let traversal = router
            .oneshot(
                Request::get("/static/../secrets.txt")
                    .header(header::HOST, "localhost")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(traversal.status(), StatusCode::NOT_FOUND);
    }
}
