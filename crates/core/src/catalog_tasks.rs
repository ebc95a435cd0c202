use sqlx::Row;

use partwatch_common::error::Result;
use partwatch_common::types::{ArticulumState, CatalogTask, TaskStatus};
use partwatch_common::{ArticulumId, CatalogTaskId};

use crate::state_machine;
use crate::store::Store;

fn row_to_task(row: &sqlx::postgres::PgRow) -> CatalogTask {
    CatalogTask {
        id: CatalogTaskId::from(row.get::<uuid::Uuid, _>("id")),
        articulum_id: ArticulumId::from(row.get::<uuid::Uuid, _>("articulum_id")),
        status: TaskStatus::from_db_str(row.get("status")).unwrap_or(TaskStatus::Pending),
        checkpoint_page: row.get("checkpoint_page"),
        worker_id: row.get("worker_id"),
        heartbeat_at: row.get("heartbeat_at"),
        created_at: row.get("created_at"),
        wrong_page_count: row.get("wrong_page_count"),
    }
}

pub async fn create(store: &Store, articulum_id: ArticulumId) -> Result<CatalogTaskId> {
    let id = CatalogTaskId::new();
    sqlx::query(
        "INSERT INTO catalog_tasks (id, articulum_id, status, checkpoint_page) \
         VALUES ($1, $2, 'pending', 1)",
    )
    .bind(uuid::Uuid::from(id))
    .bind(uuid::Uuid::from(articulum_id))
    .execute(store.pool())
    .await?;
    Ok(id)
}

/// Claims the oldest pending catalog task whose articulum is still `New`,
/// and in the same transaction moves that articulum to `CatalogParsing`.
/// If either half cannot proceed, the whole claim is rolled back.
pub async fn claim(store: &Store, worker_id: &str) -> Result<Option<CatalogTask>> {
    let mut tx = store.pool().begin().await?;

    let row = sqlx::query(
        "WITH claimed AS ( \
            SELECT ct.id FROM catalog_tasks ct \
            JOIN articulums a ON a.id = ct.articulum_id \
            WHERE ct.status = 'pending' AND a.state = 'new' \
            ORDER BY ct.created_at \
            LIMIT 1 \
            FOR UPDATE OF ct SKIP LOCKED \
         ) \
         UPDATE catalog_tasks SET status = 'processing', worker_id = $1, heartbeat_at = now() \
         FROM claimed WHERE catalog_tasks.id = claimed.id \
         RETURNING catalog_tasks.*",
    )
    .bind(worker_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    let task = row_to_task(&row);

    let moved = sqlx::query(
        "UPDATE articulums SET state = 'catalog_parsing', state_updated_at = now() \
         WHERE id = $1 AND state = 'new'",
    )
    .bind(uuid::Uuid::from(task.articulum_id))
    .execute(&mut *tx)
    .await?;

    if moved.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(None);
    }

    tx.commit().await?;
    Ok(Some(task))
}

pub async fn heartbeat(store: &Store, task_id: CatalogTaskId) -> Result<()> {
    sqlx::query("UPDATE catalog_tasks SET heartbeat_at = now() WHERE id = $1 AND status = 'processing'")
        .bind(uuid::Uuid::from(task_id))
        .execute(store.pool())
        .await?;
    Ok(())
}

pub async fn set_checkpoint(store: &Store, task_id: CatalogTaskId, page: i32) -> Result<()> {
    sqlx::query("UPDATE catalog_tasks SET checkpoint_page = $2 WHERE id = $1")
        .bind(uuid::Uuid::from(task_id))
        .bind(page)
        .execute(store.pool())
        .await?;
    Ok(())
}

pub async fn complete(store: &Store, task: &CatalogTask) -> Result<()> {
    sqlx::query("UPDATE catalog_tasks SET status = 'completed' WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await?;
    state_machine::transition(
        store,
        task.articulum_id,
        ArticulumState::CatalogParsing,
        ArticulumState::CatalogParsed,
    )
    .await?;
    Ok(())
}

/// Terminal failure: the task will not be retried, and the articulum
/// returns to `New` so a later reseed can try again from page 1.
pub async fn fail(store: &Store, task: &CatalogTask, _reason: &str) -> Result<()> {
    sqlx::query("UPDATE catalog_tasks SET status = 'failed', worker_id = NULL WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await?;
    state_machine::transition(
        store,
        task.articulum_id,
        ArticulumState::CatalogParsing,
        ArticulumState::New,
    )
    .await?;
    Ok(())
}

/// Non-terminal return to queue: the task keeps its checkpoint and will be
/// claimed again, typically after a proxy rotation budget was exhausted or
/// the upstream returned a transient server error.
pub async fn return_to_queue(store: &Store, task: &CatalogTask) -> Result<()> {
    sqlx::query("UPDATE catalog_tasks SET status = 'pending', worker_id = NULL WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await?;
    state_machine::transition(
        store,
        task.articulum_id,
        ArticulumState::CatalogParsing,
        ArticulumState::New,
    )
    .await?;
    Ok(())
}

pub async fn increment_wrong_page_count(store: &Store, task_id: CatalogTaskId) -> Result<i32> {
    let row = sqlx::query(
        "UPDATE catalog_tasks SET wrong_page_count = wrong_page_count + 1 WHERE id = $1 \
         RETURNING wrong_page_count",
    )
    .bind(uuid::Uuid::from(task_id))
    .fetch_one(store.pool())
    .await?;
    Ok(row.get("wrong_page_count"))
}
