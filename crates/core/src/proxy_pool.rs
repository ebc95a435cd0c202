use std::time::Duration;

use sqlx::Row;

use partwatch_common::error::{PipelineError, Result};
use partwatch_common::types::Proxy;
use partwatch_common::ProxyId;

use crate::store::Store;

fn row_to_proxy(row: &sqlx::postgres::PgRow) -> Proxy {
    Proxy {
        id: ProxyId::from(row.get::<uuid::Uuid, _>("id")),
        host: row.get("host"),
        port: row.get("port"),
        username: row.get("username"),
        password: row.get("password"),
        is_blocked: row.get("is_blocked"),
        is_in_use: row.get("is_in_use"),
        worker_id: row.get("worker_id"),
        consecutive_errors: row.get("consecutive_errors"),
        last_error_at: row.get("last_error_at"),
        blocked_reason: row.get("blocked_reason"),
        blocked_at: row.get("blocked_at"),
    }
}

/// Atomically claims one unblocked, unused proxy for `worker_id`, or
/// returns `None` if the pool is fully occupied/blocked right now.
pub async fn acquire(store: &Store, worker_id: &str) -> Result<Option<Proxy>> {
    let row = sqlx::query(
        "WITH claimed AS ( \
            SELECT id FROM proxies \
            WHERE is_blocked = false AND is_in_use = false \
            ORDER BY consecutive_errors ASC, id \
            LIMIT 1 \
            FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE proxies SET is_in_use = true, worker_id = $1 \
         FROM claimed WHERE proxies.id = claimed.id \
         RETURNING proxies.*",
    )
    .bind(worker_id)
    .fetch_optional(store.pool())
    .await?;

    Ok(row.as_ref().map(row_to_proxy))
}

/// Polls `acquire` until a proxy is available or `timeout` elapses.
pub async fn acquire_with_wait(store: &Store, worker_id: &str, timeout: Duration) -> Result<Proxy> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(proxy) = acquire(store, worker_id).await? {
            return Ok(proxy);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(PipelineError::ProxyExhausted);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

pub async fn release(store: &Store, proxy_id: ProxyId) -> Result<()> {
    sqlx::query("UPDATE proxies SET is_in_use = false, worker_id = NULL WHERE id = $1")
        .bind(uuid::Uuid::from(proxy_id))
        .execute(store.pool())
        .await?;
    Ok(())
}

/// Records a transient failure. On the third consecutive error the proxy
/// is permanently blocked instead of released back into rotation.
pub async fn increment_error(store: &Store, proxy_id: ProxyId) -> Result<()> {
    let row = sqlx::query(
        "UPDATE proxies SET consecutive_errors = consecutive_errors + 1, last_error_at = now() \
         WHERE id = $1 RETURNING consecutive_errors",
    )
    .bind(uuid::Uuid::from(proxy_id))
    .fetch_one(store.pool())
    .await?;

    let errors: i32 = row.get("consecutive_errors");
    if errors >= Proxy::MAX_CONSECUTIVE_ERRORS {
        block(store, proxy_id, "three consecutive transient errors").await
    } else {
        release(store, proxy_id).await
    }
}

pub async fn block(store: &Store, proxy_id: ProxyId, reason: &str) -> Result<()> {
    sqlx::query(
        "UPDATE proxies SET is_blocked = true, is_in_use = false, worker_id = NULL, \
         blocked_reason = $2, blocked_at = now() WHERE id = $1",
    )
    .bind(uuid::Uuid::from(proxy_id))
    .bind(reason)
    .execute(store.pool())
    .await?;
    Ok(())
}

pub async fn reset_errors(store: &Store, proxy_id: ProxyId) -> Result<()> {
    sqlx::query("UPDATE proxies SET consecutive_errors = 0 WHERE id = $1")
        .bind(uuid::Uuid::from(proxy_id))
        .execute(store.pool())
        .await?;
    Ok(())
}

/// Releases every proxy currently claimed by `worker_id`. Used by the
/// supervisor when a worker process exits without cleaning up after itself.
pub async fn release_all_for_worker(store: &Store, worker_id: &str) -> Result<()> {
    sqlx::query("UPDATE proxies SET is_in_use = false, worker_id = NULL WHERE worker_id = $1")
        .bind(worker_id)
        .execute(store.pool())
        .await?;
    Ok(())
}
