use sqlx::Row;

use partwatch_common::error::Result;
use partwatch_common::types::{Articulum, ArticulumState};
use partwatch_common::ArticulumId;

use crate::store::Store;

fn row_to_articulum(row: &sqlx::postgres::PgRow) -> Articulum {
    Articulum {
        id: row.get::<uuid::Uuid, _>("id").into(),
        value: row.get("value"),
        state: ArticulumState::from_db_str(row.get("state")).unwrap_or(ArticulumState::New),
        state_updated_at: row.get("state_updated_at"),
        created_at: row.get("created_at"),
    }
}

/// Inserts a new articulum in state `New`, doing nothing if the value is
/// already tracked. Articulums enter the system from outside the pipeline
/// (an operator request, a batch import); this is that entry point.
pub async fn create(store: &Store, value: &str) -> Result<ArticulumId> {
    let id = ArticulumId::new();
    let row = sqlx::query(
        "INSERT INTO articulums (id, value) VALUES ($1, $2) \
         ON CONFLICT (value) DO UPDATE SET value = articulums.value \
         RETURNING id",
    )
    .bind(uuid::Uuid::from(id))
    .bind(value)
    .fetch_one(store.pool())
    .await?;

    Ok(row.get::<uuid::Uuid, _>("id").into())
}

pub async fn get(store: &Store, id: ArticulumId) -> Result<Option<Articulum>> {
    let row = sqlx::query(
        "SELECT id, value, state, state_updated_at, created_at FROM articulums WHERE id = $1",
    )
    .bind(uuid::Uuid::from(id))
    .fetch_optional(store.pool())
    .await?;

    Ok(row.as_ref().map(row_to_articulum))
}
