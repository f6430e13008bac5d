//! DWL Server - Main entry point

use anyhow::Result;
use dwl_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use dwl_server::{
    api::{self, AppState},
    audit::FileLineLog,
    config::Config,
    features::FeatureState,
    notify::PgNotificationChannel,
    pipeline::{OrchestratorSettings, PipelineComponents, UploadOrchestrator},
    staging::StagingStore,
    transform::{PgLoadVerifier, PgTransformJob},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("dwl-server")
        .filter_directives("dwl_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting DWL Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect_lazy(&config.database.url)?;

    info!("Database connection pool configured");

    let pipeline = &config.pipeline;
    let components = PipelineComponents {
        staging: StagingStore::new(&pipeline.staging_dir),
        channel: Arc::new(PgNotificationChannel::new(db_pool.clone())),
        job: Arc::new(PgTransformJob::new(
            db_pool.clone(),
            pipeline.procedure.clone(),
            pipeline.pass_start_time,
        )?),
        verifier: Arc::new(PgLoadVerifier::new(
            db_pool.clone(),
            pipeline.verify_relation.clone(),
        )?),
        audit: Arc::new(FileLineLog::open(&pipeline.audit_log).await?),
        faults: Arc::new(FileLineLog::open(&pipeline.fault_log).await?),
    };

    info!(
        staging_dir = %pipeline.staging_dir.display(),
        procedure = %pipeline.procedure,
        topic = %pipeline.notify_topic,
        relation = %pipeline.verify_relation,
        "Upload pipeline initialized"
    );

    let audit = components.audit.clone();
    let orchestrator = UploadOrchestrator::new(components, OrchestratorSettings::from(pipeline));

    let state = AppState {
        db: Some(db_pool),
        features: FeatureState {
            orchestrator: Arc::new(orchestrator),
            audit,
        },
    };

    let app = api::create_router(state, &config.server, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight uploads a moment to finish
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
