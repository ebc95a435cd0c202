use sqlx::Row;

use partwatch_common::error::Result;
use partwatch_common::ArticulumId;

use crate::catalog_tasks;
use crate::object_tasks;
use crate::store::Store;

/// Creates a catalog task for every `New` articulum that doesn't already
/// have one pending. Intended to run on a fixed interval from the
/// orchestrator; batched so a large backlog doesn't block the loop.
pub async fn seed_catalog_tasks(store: &Store, batch_size: i64) -> Result<u64> {
    let rows = sqlx::query(
        "SELECT a.id FROM articulums a \
         WHERE a.state = 'new' \
         AND NOT EXISTS ( \
             SELECT 1 FROM catalog_tasks ct WHERE ct.articulum_id = a.id AND ct.status = 'pending' \
         ) \
         LIMIT $1",
    )
    .bind(batch_size)
    .fetch_all(store.pool())
    .await?;

    let mut created = 0u64;
    for row in rows {
        let articulum_id: ArticulumId = row.get::<uuid::Uuid, _>("id").into();
        catalog_tasks::create(store, articulum_id).await?;
        created += 1;
    }
    Ok(created)
}

/// Re-queues past `object_data` captures older than `min_interval_hours`
/// for a fresh detail-page parse, honoring the allow/deny filter tables.
/// Only runs when reparse mode is enabled.
pub async fn seed_reparse_tasks(store: &Store, min_interval_hours: i64, batch_size: i64) -> Result<u64> {
    let rows = sqlx::query(
        "SELECT DISTINCT ON (od.avito_item_id) od.articulum_id, od.avito_item_id \
         FROM object_data od \
         JOIN articulums a ON a.id = od.articulum_id \
         WHERE od.parsed_at < now() - make_interval(hours => $1) \
         AND NOT EXISTS ( \
             SELECT 1 FROM reparse_filter_items f \
             WHERE f.avito_item_id = od.avito_item_id AND f.allow = false \
         ) \
         AND NOT EXISTS ( \
             SELECT 1 FROM reparse_filter_articulums fa \
             WHERE fa.value = a.value AND fa.allow = false \
         ) \
         AND NOT EXISTS ( \
             SELECT 1 FROM object_tasks ot \
             WHERE ot.avito_item_id = od.avito_item_id AND ot.status IN ('pending', 'processing') \
         ) \
         ORDER BY od.avito_item_id, od.parsed_at DESC \
         LIMIT $2",
    )
    .bind(min_interval_hours)
    .bind(batch_size)
    .fetch_all(store.pool())
    .await?;

    let mut created = 0u64;
    for row in rows {
        let articulum_id: ArticulumId = row.get::<uuid::Uuid, _>("articulum_id").into();
        let avito_item_id: String = row.get("avito_item_id");
        object_tasks::create(store, articulum_id, &avito_item_id).await?;
        created += 1;
    }
    Ok(created)
}
