use std::time::Duration;

use sqlx::Row;

use partwatch_common::error::Result;

use crate::proxy_pool;
use crate::store::Store;

/// Releases a worker's claims and returns its in-flight work to the
/// respective queues. Used both by the timed sweep below and directly by
/// the orchestrator's process supervisor the moment it observes a worker
/// exit, so a cleanly-detected crash doesn't have to wait a full timeout.
pub async fn release_worker(store: &Store, worker_id: &str) -> Result<()> {
    recover_catalog_tasks_for_worker(store, worker_id).await?;
    recover_object_tasks_for_worker(store, worker_id).await?;
    proxy_pool::release_all_for_worker(store, worker_id).await?;
    Ok(())
}

async fn recover_catalog_tasks_for_worker(store: &Store, worker_id: &str) -> Result<()> {
    let rows = sqlx::query(
        "SELECT id, articulum_id FROM catalog_tasks WHERE status = 'processing' AND worker_id = $1",
    )
    .bind(worker_id)
    .fetch_all(store.pool())
    .await?;

    for row in rows {
        let task_id: uuid::Uuid = row.get("id");
        let articulum_id: uuid::Uuid = row.get("articulum_id");
        requeue_catalog_task(store, task_id, articulum_id).await?;
    }
    Ok(())
}

async fn recover_object_tasks_for_worker(store: &Store, worker_id: &str) -> Result<()> {
    let rows = sqlx::query(
        "SELECT id, articulum_id FROM object_tasks WHERE status = 'processing' AND worker_id = $1",
    )
    .bind(worker_id)
    .fetch_all(store.pool())
    .await?;

    for row in rows {
        let task_id: uuid::Uuid = row.get("id");
        let articulum_id: uuid::Uuid = row.get("articulum_id");
        requeue_object_task(store, task_id, articulum_id).await?;
    }
    Ok(())
}

async fn requeue_catalog_task(store: &Store, task_id: uuid::Uuid, articulum_id: uuid::Uuid) -> Result<()> {
    let mut tx = store.pool().begin().await?;

    sqlx::query("UPDATE catalog_tasks SET status = 'pending', worker_id = NULL WHERE id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE articulums SET state = 'new', state_updated_at = now() \
         WHERE id = $1 AND state = 'catalog_parsing'",
    )
    .bind(articulum_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn requeue_object_task(store: &Store, task_id: uuid::Uuid, articulum_id: uuid::Uuid) -> Result<()> {
    let mut tx = store.pool().begin().await?;

    sqlx::query("UPDATE object_tasks SET status = 'pending', worker_id = NULL WHERE id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await?;

    // Only step the articulum back to `Validated` if this was the last
    // in-flight object task — a sibling still running means the articulum
    // correctly stays in `ObjectParsing`.
    sqlx::query(
        "UPDATE articulums SET state = 'validated', state_updated_at = now() \
         WHERE id = $1 AND state = 'object_parsing' \
         AND NOT EXISTS ( \
             SELECT 1 FROM object_tasks \
             WHERE articulum_id = $1 AND status IN ('pending', 'processing') AND id != $2 \
         )",
    )
    .bind(articulum_id)
    .bind(task_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// One sweep pass: finds tasks whose heartbeat has gone stale and returns
/// them (and their proxies, and their articulums) to a retryable state.
/// Also repairs articulums stuck in `CatalogParsing` with no live task at
/// all — a state that can only arise from a crash between claim and the
/// first heartbeat write.
pub async fn sweep(store: &Store, timeout: Duration) -> Result<u64> {
    let timeout_secs = timeout.as_secs() as i64;
    let mut recovered = 0u64;

    let stale_catalog = sqlx::query(
        "SELECT id, articulum_id FROM catalog_tasks \
         WHERE status = 'processing' AND heartbeat_at < now() - make_interval(secs => $1)",
    )
    .bind(timeout_secs)
    .fetch_all(store.pool())
    .await?;

    for row in &stale_catalog {
        let task_id: uuid::Uuid = row.get("id");
        let articulum_id: uuid::Uuid = row.get("articulum_id");
        requeue_catalog_task(store, task_id, articulum_id).await?;
        recovered += 1;
    }

    let stale_object = sqlx::query(
        "SELECT id, articulum_id FROM object_tasks \
         WHERE status = 'processing' AND heartbeat_at < now() - make_interval(secs => $1)",
    )
    .bind(timeout_secs)
    .fetch_all(store.pool())
    .await?;

    for row in &stale_object {
        let task_id: uuid::Uuid = row.get("id");
        let articulum_id: uuid::Uuid = row.get("articulum_id");
        requeue_object_task(store, task_id, articulum_id).await?;
        recovered += 1;
    }

    let orphaned = sqlx::query(
        "UPDATE articulums SET state = 'new', state_updated_at = now() \
         WHERE state = 'catalog_parsing' \
         AND NOT EXISTS ( \
             SELECT 1 FROM catalog_tasks \
             WHERE articulum_id = articulums.id AND status = 'processing' \
         )",
    )
    .execute(store.pool())
    .await?;
    recovered += orphaned.rows_affected();

    Ok(recovered)
}

/// Runs `sweep` on a fixed interval until the process exits. Intended to be
/// spawned once by the orchestrator.
pub async fn run_loop(store: Store, timeout: Duration, interval: Duration) {
    let mut tick = tokio::time::interval(interval);
    loop {
        tick.tick().await;
        match sweep(&store, timeout).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(recovered = n, "heartbeat sweep recovered stuck tasks"),
            Err(e) => tracing::error!(error = %e, "heartbeat sweep failed"),
        }
    }
}
