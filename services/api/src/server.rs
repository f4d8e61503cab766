use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::build_router;
use axum_prometheus::PrometheusMetricLayer;
use managerpulse::admin::AdminService;
use managerpulse::aggregation::AggregationPolicy;
use managerpulse::bootstrap;
use managerpulse::config::AppConfig;
use managerpulse::error::AppError;
use managerpulse::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (database, _) = bootstrap::run(&config).await?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        admin: Arc::new(
            AdminService::new(database, AggregationPolicy::default())
                .with_password_hasher(config.security.password_hasher()),
        ),
        allowed_hosts: Arc::new(config.security.allowed_hosts.clone()),
        static_root: Arc::new(config.static_files.root.clone()),
    };

    let app = build_router(app_state).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, debug = config.security.debug, %addr, "managerpulse admin ready");

    axum::serve(listener, app).await?;
    Ok(())
}
