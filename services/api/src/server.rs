use crate::cli::ServeArgs;
use crate::infra::{build_pipeline, load_records, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use timesheet_pipeline::config::AppConfig;
use timesheet_pipeline::error::AppError;
use timesheet_pipeline::telemetry;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(workers) = args.workers.take() {
        config.pipeline.workers = workers.max(1);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let seed_csv = args
        .seed_csv
        .take()
        .or_else(|| config.pipeline.seed_csv.as_ref().map(PathBuf::from));
    let (records, source) = load_records(seed_csv.as_deref(), Utc::now())?;
    info!(records = records.len(), source = source.label(), "timesheets loaded");

    let pipeline = build_pipeline(&config, records)?;
    let jobs = pipeline.jobs.clone();
    let workers = jobs.start_workers(config.pipeline.workers);

    let app = with_service_routes(pipeline)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        workers = workers.len(),
        "timesheet pipeline ready"
    );

    let served = axum::serve(listener, app).await;

    jobs.shutdown();
    for worker in workers {
        let _ = worker.await;
    }
    served?;
    Ok(())
}
