use sqlx::Row;

use partwatch_common::error::Result;
use partwatch_common::types::{ObjectTask, TaskStatus};
use partwatch_common::{ArticulumId, ObjectTaskId};

use crate::store::Store;

fn row_to_task(row: &sqlx::postgres::PgRow) -> ObjectTask {
    ObjectTask {
        id: ObjectTaskId::from(row.get::<uuid::Uuid, _>("id")),
        articulum_id: ArticulumId::from(row.get::<uuid::Uuid, _>("articulum_id")),
        avito_item_id: row.get("avito_item_id"),
        status: TaskStatus::from_db_str(row.get("status")).unwrap_or(TaskStatus::Pending),
        worker_id: row.get("worker_id"),
        heartbeat_at: row.get("heartbeat_at"),
        created_at: row.get("created_at"),
        wrong_page_count: row.get("wrong_page_count"),
    }
}

pub async fn create(store: &Store, articulum_id: ArticulumId, avito_item_id: &str) -> Result<ObjectTaskId> {
    let id = ObjectTaskId::new();
    sqlx::query(
        "INSERT INTO object_tasks (id, articulum_id, avito_item_id, status) \
         VALUES ($1, $2, $3, 'pending') ON CONFLICT DO NOTHING",
    )
    .bind(uuid::Uuid::from(id))
    .bind(uuid::Uuid::from(articulum_id))
    .bind(avito_item_id)
    .execute(store.pool())
    .await?;
    Ok(id)
}

/// Claims the oldest pending object task, with no predicate on the
/// articulum's current state — by the time an object task exists its
/// articulum has already been moved to `Validated`. On an articulum's
/// first claimed object task this also advances it to `ObjectParsing`;
/// a lost race on that transition (another worker got there first) is
/// not an error, since the articulum only needs to make that move once.
pub async fn claim(store: &Store, worker_id: &str) -> Result<Option<ObjectTask>> {
    let mut tx = store.pool().begin().await?;

    let row = sqlx::query(
        "WITH claimed AS ( \
            SELECT id FROM object_tasks \
            WHERE status = 'pending' \
            ORDER BY created_at \
            LIMIT 1 \
            FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE object_tasks SET status = 'processing', worker_id = $1, heartbeat_at = now() \
         FROM claimed WHERE object_tasks.id = claimed.id \
         RETURNING object_tasks.*",
    )
    .bind(worker_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    let task = row_to_task(&row);

    // Best-effort; ignore the lost-race case (another task already moved it).
    sqlx::query(
        "UPDATE articulums SET state = 'object_parsing', state_updated_at = now() \
         WHERE id = $1 AND state = 'validated'",
    )
    .bind(uuid::Uuid::from(task.articulum_id))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(task))
}

pub async fn heartbeat(store: &Store, task_id: ObjectTaskId) -> Result<()> {
    sqlx::query("UPDATE object_tasks SET heartbeat_at = now() WHERE id = $1 AND status = 'processing'")
        .bind(uuid::Uuid::from(task_id))
        .execute(store.pool())
        .await?;
    Ok(())
}

pub async fn complete(store: &Store, task: &ObjectTask) -> Result<()> {
    sqlx::query("UPDATE object_tasks SET status = 'completed' WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await?;
    Ok(())
}

pub async fn fail(store: &Store, task: &ObjectTask, _reason: &str) -> Result<()> {
    sqlx::query("UPDATE object_tasks SET status = 'failed', worker_id = NULL WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await?;
    Ok(())
}

/// Terminal, non-retryable outcome: the listing is used/removed/invalid.
pub async fn invalidate(store: &Store, task: &ObjectTask, _reason: &str) -> Result<()> {
    sqlx::query("UPDATE object_tasks SET status = 'invalid', worker_id = NULL WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await?;
    Ok(())
}

pub async fn return_to_queue(store: &Store, task: &ObjectTask) -> Result<()> {
    sqlx::query("UPDATE object_tasks SET status = 'pending', worker_id = NULL WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await?;
    Ok(())
}
