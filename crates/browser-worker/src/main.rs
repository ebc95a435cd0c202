use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use partwatch_common::config::PipelineConfig;
use partwatch_common::error::Result;
use partwatch_common::types::CatalogTask;
use partwatch_common::types::ObjectTask;
use partwatch_core::browser::{
    BrowserLibrary, CardParseRequest, CardStatus, CatalogParseRequest, CatalogStatus,
    HttpBrowserLibrary,
};
use partwatch_core::{catalog_listings, catalog_tasks, object_data, object_tasks, proxy_pool, Store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match PipelineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration — refusing to start");
            std::process::exit(1);
        }
    };

    let worker_id = config
        .worker_id
        .clone()
        .unwrap_or_else(|| partwatch_common::config::worker_id(&config.container_id, 0));

    tracing::info!(worker_id = %worker_id, "browser worker starting");

    let store = match Store::connect(&config.database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to postgres");
            std::process::exit(1);
        }
    };

    let browser: Arc<dyn BrowserLibrary> = Arc::new(HttpBrowserLibrary::new(config.browser_service_url.clone()));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    loop {
        if *shutdown_rx.borrow() {
            tracing::info!(worker_id = %worker_id, "shutdown requested, exiting");
            break;
        }

        match run_one_cycle(&store, &browser, &config, &worker_id).await {
            Ok(true) => {}
            Ok(false) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
            Err(e) => {
                tracing::error!(worker_id = %worker_id, error = %e, "cycle failed");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Decides whether to prefer catalog or object work based on the current
/// validated-but-not-yet-object-parsed buffer, claims one task, and
/// processes it. Returns `Ok(true)` if a task was processed, `Ok(false)`
/// if both queues were empty.
async fn run_one_cycle(
    store: &Store,
    browser: &Arc<dyn BrowserLibrary>,
    config: &PipelineConfig,
    worker_id: &str,
) -> Result<bool> {
    let buffer = count_object_buffer(store).await?;
    let prefer_catalog = buffer < config.catalog_buffer_size;

    if prefer_catalog {
        if process_next_catalog_task(store, browser, config, worker_id).await? {
            return Ok(true);
        }
        process_next_object_task(store, browser, config, worker_id).await
    } else {
        if process_next_object_task(store, browser, config, worker_id).await? {
            return Ok(true);
        }
        process_next_catalog_task(store, browser, config, worker_id).await
    }
}

async fn count_object_buffer(store: &Store) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT count(DISTINCT a.id) FROM articulums a \
         JOIN object_tasks ot ON ot.articulum_id = a.id \
         WHERE a.state = 'validated' AND ot.status = 'pending'",
    )
    .fetch_one(store.pool())
    .await?;
    Ok(row.0)
}

async fn process_next_catalog_task(
    store: &Store,
    browser: &Arc<dyn BrowserLibrary>,
    config: &PipelineConfig,
    worker_id: &str,
) -> Result<bool> {
    let Some(task) = catalog_tasks::claim(store, worker_id).await? else {
        return Ok(false);
    };

    let (heartbeat_cancel, _heartbeat_handle) = spawn_catalog_heartbeat(store.clone(), task.id, config.heartbeat_update_interval);

    let result = run_catalog_task(store, browser, config, worker_id, &task).await;

    let _ = heartbeat_cancel.send(());

    if let Err(e) = result {
        tracing::error!(worker_id = %worker_id, task_id = %task.id, error = %e, "catalog task processing error");
    }

    Ok(true)
}

async fn run_catalog_task(
    store: &Store,
    browser: &Arc<dyn BrowserLibrary>,
    config: &PipelineConfig,
    worker_id: &str,
    task: &CatalogTask,
) -> Result<()> {
    let articulum = partwatch_core::articulums::get(store, task.articulum_id)
        .await?
        .ok_or_else(|| partwatch_common::error::PipelineError::NotFound("articulum".into()))?;

    let mut proxy = proxy_pool::acquire_with_wait(
        store,
        worker_id,
        Duration::from_secs(config.proxy_wait_timeout_seconds),
    )
    .await?;

    let mut page = task.checkpoint_page;
    let mut rotations = 0u32;

    loop {
        let request = CatalogParseRequest {
            articulum: articulum.value.clone(),
            proxy_url: proxy.url(),
            start_page: page,
            max_pages: config.catalog_max_pages,
        };

        let result = browser.parse_catalog(request).await;

        match result.status {
            CatalogStatus::Success | CatalogStatus::Empty => {
                for listing in &result.listings {
                    catalog_listings::upsert(store, task.articulum_id, listing).await?;
                }
                proxy_pool::reset_errors(store, proxy.id).await?;
                proxy_pool::release(store, proxy.id).await?;
                catalog_tasks::complete(store, task).await?;
                return Ok(());
            }
            CatalogStatus::ProxyBlocked | CatalogStatus::ProxyAuthRequired => {
                proxy_pool::block(store, proxy.id, "browser library reported proxy blocked").await?;
                catalog_tasks::set_checkpoint(store, task.id, result.resume_page_number).await?;
                page = result.resume_page_number;
                rotations += 1;
                if rotations >= config.proxy_rotation_limit {
                    catalog_tasks::return_to_queue(store, task).await?;
                    return Ok(());
                }
                proxy = proxy_pool::acquire_with_wait(
                    store,
                    worker_id,
                    Duration::from_secs(config.proxy_wait_timeout_seconds),
                )
                .await?;
            }
            CatalogStatus::CaptchaFailed => {
                catalog_tasks::set_checkpoint(store, task.id, result.resume_page_number).await?;
                proxy_pool::release(store, proxy.id).await?;
                catalog_tasks::return_to_queue(store, task).await?;
                return Ok(());
            }
            CatalogStatus::LoadTimeout => {
                proxy_pool::increment_error(store, proxy.id).await?;
                catalog_tasks::return_to_queue(store, task).await?;
                return Ok(());
            }
            CatalogStatus::ServerUnavailable => {
                proxy_pool::release(store, proxy.id).await?;
                catalog_tasks::return_to_queue(store, task).await?;
                return Ok(());
            }
            CatalogStatus::PageNotDetected | CatalogStatus::WrongPage => {
                proxy_pool::release(store, proxy.id).await?;
                let count = catalog_tasks::increment_wrong_page_count(store, task.id).await?;
                if count >= 3 {
                    catalog_tasks::fail(store, task, "repeated unrecognized pages").await?;
                } else {
                    catalog_tasks::return_to_queue(store, task).await?;
                }
                return Ok(());
            }
        }
    }
}

fn spawn_catalog_heartbeat(
    store: Store,
    task_id: partwatch_common::CatalogTaskId,
    interval_secs: u64,
) -> (oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {
                    if let Err(e) = catalog_tasks::heartbeat(&store, task_id).await {
                        tracing::warn!(error = %e, "heartbeat refresh failed");
                    }
                }
                _ = &mut rx => {
                    return;
                }
            }
        }
    });
    (tx, handle)
}

async fn process_next_object_task(
    store: &Store,
    browser: &Arc<dyn BrowserLibrary>,
    config: &PipelineConfig,
    worker_id: &str,
) -> Result<bool> {
    let Some(task) = object_tasks::claim(store, worker_id).await? else {
        return Ok(false);
    };

    let (heartbeat_cancel, _heartbeat_handle) =
        spawn_object_heartbeat(store.clone(), task.id, config.heartbeat_update_interval);

    let result = run_object_task(store, browser, config, worker_id, &task).await;

    let _ = heartbeat_cancel.send(());

    if let Err(e) = result {
        tracing::error!(worker_id = %worker_id, task_id = %task.id, error = %e, "object task processing error");
    }

    Ok(true)
}

async fn run_object_task(
    store: &Store,
    browser: &Arc<dyn BrowserLibrary>,
    config: &PipelineConfig,
    worker_id: &str,
    task: &ObjectTask,
) -> Result<()> {
    let proxy = proxy_pool::acquire_with_wait(
        store,
        worker_id,
        Duration::from_secs(config.proxy_wait_timeout_seconds),
    )
    .await?;

    let request = CardParseRequest {
        avito_item_id: task.avito_item_id.clone(),
        proxy_url: proxy.url(),
    };

    let result = browser.parse_card(request).await;

    match result.status {
        CardStatus::Success => {
            if let Some(card) = result.data {
                if object_data::is_used_condition(&card.characteristics) {
                    proxy_pool::reset_errors(store, proxy.id).await?;
                    proxy_pool::release(store, proxy.id).await?;
                    object_tasks::invalidate(store, task, "listing condition is used").await?;
                } else {
                    object_data::insert(store, task.articulum_id, &card).await?;
                    proxy_pool::reset_errors(store, proxy.id).await?;
                    proxy_pool::release(store, proxy.id).await?;
                    object_tasks::complete(store, task).await?;
                }
            } else {
                proxy_pool::release(store, proxy.id).await?;
                object_tasks::fail(store, task, "success status with no data").await?;
            }
        }
        CardStatus::ProxyBlocked => {
            proxy_pool::block(store, proxy.id, "browser library reported proxy blocked").await?;
            object_tasks::return_to_queue(store, task).await?;
        }
        CardStatus::CaptchaFailed => {
            proxy_pool::release(store, proxy.id).await?;
            object_tasks::return_to_queue(store, task).await?;
        }
        CardStatus::NotFound => {
            proxy_pool::reset_errors(store, proxy.id).await?;
            proxy_pool::release(store, proxy.id).await?;
            object_tasks::invalidate(store, task, "listing not found").await?;
        }
        CardStatus::ServerUnavailable => {
            proxy_pool::release(store, proxy.id).await?;
            object_tasks::return_to_queue(store, task).await?;
        }
        CardStatus::PageNotDetected | CardStatus::WrongPage => {
            proxy_pool::release(store, proxy.id).await?;
            object_tasks::fail(store, task, "unrecognized page").await?;
        }
    }

    Ok(())
}

fn spawn_object_heartbeat(
    store: Store,
    task_id: partwatch_common::ObjectTaskId,
    interval_secs: u64,
) -> (oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {
                    if let Err(e) = object_tasks::heartbeat(&store, task_id).await {
                        tracing::warn!(error = %e, "heartbeat refresh failed");
                    }
                }
                _ = &mut rx => {
                    return;
                }
            }
        }
    });
    (tx, handle)
}
