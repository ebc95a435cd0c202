mod supervisor;

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::sync::watch;

use partwatch_common::config::PipelineConfig;
use partwatch_core::Store;
use supervisor::Supervisor;

struct AppState {
    store: Store,
    metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("orchestrator starting");

    let config = match PipelineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration — refusing to start");
            std::process::exit(1);
        }
    };

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder");

    let store = match Store::connect(&config.database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to postgres");
            std::process::exit(1);
        }
    };

    if let Err(e) = store.migrate().await {
        tracing::error!(error = %e, "failed to run migrations");
        std::process::exit(1);
    }

    tracing::info!("database connected and migrated");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Worker process supervision.
    let mut supervisor = Supervisor::new(store.clone(), config.database_url.clone());
    if let Some(endpoint) = &config.ai_validation_endpoint {
        supervisor = supervisor.with_env("AI_VALIDATION_ENDPOINT", endpoint);
    }
    if let Some(key) = &config.ai_validation_api_key {
        supervisor = supervisor.with_env("AI_VALIDATION_API_KEY", key);
    }
    supervisor.add_workers(
        "partwatch-browser-worker",
        &config.container_id,
        config.total_browser_workers,
        0,
    );
    supervisor.add_workers(
        "partwatch-validation-worker",
        &config.container_id,
        config.total_validation_workers,
        config.total_browser_workers,
    );

    tracing::info!(
        browser_workers = config.total_browser_workers,
        validation_workers = config.total_validation_workers,
        "starting worker supervision"
    );

    let supervision_handle = tokio::spawn(supervisor::run_loop(
        supervisor,
        Duration::from_secs(5),
        shutdown_rx.clone(),
    ));

    // Heartbeat recovery sweep.
    let heartbeat_store = store.clone();
    let heartbeat_timeout = Duration::from_secs(config.heartbeat_timeout_seconds as u64);
    let heartbeat_interval = Duration::from_secs(config.heartbeat_sweep_interval_seconds);
    let heartbeat_handle = tokio::spawn(async move {
        partwatch_core::heartbeat::run_loop(heartbeat_store, heartbeat_timeout, heartbeat_interval).await;
    });

    // Catalog task seeding.
    let seed_store = store.clone();
    let mut seed_shutdown = shutdown_rx.clone();
    let seed_handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match partwatch_core::seed::seed_catalog_tasks(&seed_store, 100).await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(created = n, "seeded catalog tasks"),
                        Err(e) => tracing::error!(error = %e, "failed to seed catalog tasks"),
                    }
                }
                _ = seed_shutdown.changed() => {
                    if *seed_shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    });

    // Reparse seeding, only when enabled.
    let reparse_handle = if config.reparse_mode {
        let reparse_store = store.clone();
        let min_interval_hours = config.min_reparse_interval_hours;
        let mut reparse_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(300));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match partwatch_core::seed::seed_reparse_tasks(&reparse_store, min_interval_hours, 100).await {
                            Ok(0) => {}
                            Ok(n) => tracing::info!(created = n, "seeded reparse tasks"),
                            Err(e) => tracing::error!(error = %e, "failed to seed reparse tasks"),
                        }
                    }
                    _ = reparse_shutdown.changed() => {
                        if *reparse_shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        }))
    } else {
        None
    };

    let state = Arc::new(AppState {
        store: store.clone(),
        metrics_handle,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.engine_port))
        .await
        .expect("failed to bind TCP listener");

    tracing::info!(port = config.engine_port, "orchestrator listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_tx));
    if let Err(e) = server.await {
        tracing::error!(error = %e, "HTTP server error");
    }

    let _ = supervision_handle.await;
    heartbeat_handle.abort();
    seed_handle.abort();
    if let Some(h) = reparse_handle {
        h.abort();
    }
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
    let _ = tx.send(true);
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ok = state.store.health_check().await.is_ok();
    let status = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = serde_json::json!({ "status": if ok { "healthy" } else { "unhealthy" } });
    (status, Json(body))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
