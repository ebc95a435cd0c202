pub mod ai;
pub mod mechanical;
pub mod price_filter;

use sqlx::Row;

use partwatch_common::error::Result;
use partwatch_common::types::{ArticulumState, CatalogListing, ValidationStage};
use partwatch_common::{ArticulumId, ValidationResultId};

use crate::object_tasks;
use crate::state_machine;
use crate::store::Store;

/// Claims the oldest articulum sitting in `CatalogParsed`, moving it to
/// `Validating` in the same statement. Returns its id if a row was claimed.
pub async fn claim_articulum(store: &Store) -> Result<Option<ArticulumId>> {
    let row = sqlx::query(
        "UPDATE articulums SET state = 'validating', state_updated_at = now() \
         WHERE id = ( \
             SELECT id FROM articulums WHERE state = 'catalog_parsed' \
             ORDER BY state_updated_at \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING id",
    )
    .fetch_optional(store.pool())
    .await?;

    Ok(row.map(|r| ArticulumId::from(r.get::<uuid::Uuid, _>("id"))))
}

pub async fn listings_for_articulum(store: &Store, articulum_id: ArticulumId) -> Result<Vec<CatalogListing>> {
    let rows = sqlx::query(
        "SELECT id, articulum_id, avito_item_id, title, price, snippet, seller_name, \
         seller_reviews, image_urls, created_at FROM catalog_listings WHERE articulum_id = $1",
    )
    .bind(uuid::Uuid::from(articulum_id))
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CatalogListing {
            id: row.get::<uuid::Uuid, _>("id").into(),
            articulum_id: row.get::<uuid::Uuid, _>("articulum_id").into(),
            avito_item_id: row.get("avito_item_id"),
            title: row.get("title"),
            price: row.get("price"),
            snippet: row.get("snippet"),
            seller_name: row.get("seller_name"),
            seller_reviews: row.get("seller_reviews"),
            image_urls: serde_json::from_value(row.get("image_urls")).unwrap_or_default(),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub async fn record_result(
    store: &Store,
    articulum_id: ArticulumId,
    avito_item_id: &str,
    stage: ValidationStage,
    passed: bool,
    reason: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO validation_results (id, articulum_id, avito_item_id, stage, passed, rejection_reason) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (articulum_id, avito_item_id, stage) \
         DO UPDATE SET passed = excluded.passed, rejection_reason = excluded.rejection_reason",
    )
    .bind(uuid::Uuid::from(ValidationResultId::new()))
    .bind(uuid::Uuid::from(articulum_id))
    .bind(avito_item_id)
    .bind(stage.as_db_str())
    .bind(passed)
    .bind(reason)
    .execute(store.pool())
    .await?;
    Ok(())
}

/// Items that passed every stage actually run (price filter is always run
/// when enabled; mechanical always runs; AI only when enabled).
pub fn survivors<'a>(
    listings: &'a [CatalogListing],
    price_results: &[(String, bool)],
    mechanical_results: &[(String, bool)],
    ai_results: Option<&[ai::AiVerdict]>,
) -> Vec<&'a CatalogListing> {
    listings
        .iter()
        .filter(|l| {
            let price_ok = price_results
                .iter()
                .find(|(id, _)| id == &l.avito_item_id)
                .map(|(_, ok)| *ok)
                .unwrap_or(false);
            let mechanical_ok = mechanical_results
                .iter()
                .find(|(id, _)| id == &l.avito_item_id)
                .map(|(_, ok)| *ok)
                .unwrap_or(false);
            let ai_ok = ai_results
                .map(|results| {
                    results
                        .iter()
                        .find(|v| v.avito_item_id == l.avito_item_id)
                        .map(|v| v.passed)
                        .unwrap_or(false)
                })
                .unwrap_or(true);
            price_ok && mechanical_ok && ai_ok
        })
        .collect()
}

pub async fn reject_articulum(store: &Store, articulum_id: ArticulumId) -> Result<bool> {
    state_machine::transition(
        store,
        articulum_id,
        ArticulumState::Validating,
        ArticulumState::RejectedByMinCount,
    )
    .await
}

/// Accepts the articulum and creates one object task per surviving item.
pub async fn accept_articulum(
    store: &Store,
    articulum_id: ArticulumId,
    survivor_item_ids: &[String],
    skip_object_parsing: bool,
) -> Result<bool> {
    let moved = state_machine::transition(
        store,
        articulum_id,
        ArticulumState::Validating,
        ArticulumState::Validated,
    )
    .await?;

    if moved && !skip_object_parsing {
        for item_id in survivor_item_ids {
            object_tasks::create(store, articulum_id, item_id).await?;
        }
    }

    Ok(moved)
}
