use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAllotmentStore, InMemoryNotificationSink, StaticDirectory};
use crate::routes::with_workflow_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use donorbank::config::AppConfig;
use donorbank::error::AppError;
use donorbank::identity::CredentialVerifier;
use donorbank::telemetry;
use donorbank::workflows::allotment::service::AllotmentService;
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

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryAllotmentStore::default());
    let notifications = Arc::new(InMemoryNotificationSink::default());
    let directory = StaticDirectory::demo();
    let allotment_service = Arc::new(AllotmentService::new(
        store,
        directory.clone(),
        notifications,
        config.workflow,
    ));
    let verifier: Arc<dyn CredentialVerifier> = directory;

    let app = with_workflow_routes(allotment_service, verifier)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "donor allotment service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
