use partwatch_common::error::Result;
use partwatch_common::ArticulumId;

use crate::browser::RawListing;
use crate::store::Store;

/// Inserts a freshly-scraped listing, doing nothing if `avito_item_id` was
/// already recorded (by this articulum or an earlier run of another one).
pub async fn upsert(store: &Store, articulum_id: ArticulumId, listing: &RawListing) -> Result<()> {
    sqlx::query(
        "INSERT INTO catalog_listings \
         (id, articulum_id, avito_item_id, title, price, snippet, seller_name, seller_reviews, image_urls) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (avito_item_id) DO NOTHING",
    )
    .bind(uuid::Uuid::from(partwatch_common::CatalogListingId::new()))
    .bind(uuid::Uuid::from(articulum_id))
    .bind(&listing.avito_item_id)
    .bind(&listing.title)
    .bind(listing.price)
    .bind(&listing.snippet)
    .bind(&listing.seller_name)
    .bind(listing.seller_reviews)
    .bind(serde_json::to_value(&listing.image_urls).unwrap_or(serde_json::Value::Array(vec![])))
    .execute(store.pool())
    .await?;
    Ok(())
}
