use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use managerpulse::admin::AdminService;
use managerpulse::config::AllowedHosts;
use managerpulse::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, warn};

const REALM: &str = "Basic realm=\"ManagerPulse Admin\"";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) admin: Arc<AdminService>,
    pub(crate) allowed_hosts: Arc<AllowedHosts>,
    pub(crate) static_root: Arc<PathBuf>,
}

/// Rejects requests whose `Host` header is not in `ALLOWED_HOSTS`.
pub(crate) async fn enforce_allowed_hosts(
    State(hosts): State<Arc<AllowedHosts>>,
    request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
        .to_string();

    if hosts.allows(&host) {
        return next.run(request).await;
    }

    warn!(%host, "rejected request for disallowed host");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": format!("invalid HTTP_HOST header: '{host}'") })),
    )
        .into_response()
}

/// HTTP Basic authentication against the administrator accounts.
pub(crate) async fn require_admin(
    State(service): State<Arc<AdminService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some((username, password)) = basic_credentials(request.headers()) else {
        return unauthorized();
    };

    let user = match service.authenticate(&username, &password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!(%username, "admin login failed");
            return unauthorized();
        }
        Err(err) => return AppError::from(err).into_response(),
    };

    debug!(username = %user.username, "admin request authenticated");
    request.extensions_mut().insert(user);
    next.run(request).await
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM))],
        Json(json!({ "error": "authentication required" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(authorization).expect("valid header"),
        );
        headers
    }

    #[test]
    fn parses_basic_credentials() {
        let encoded = BASE64_STANDARD.encode("admin:pa:ss");
        assert_eq!(
            basic_credentials(&headers(&format!("Basic {encoded}"))),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(basic_credentials(&headers("Bearer token")), None);
        assert_eq!(basic_credentials(&headers("Basic !!!")), None);
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
    }
}
