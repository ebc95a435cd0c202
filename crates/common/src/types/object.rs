use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{ArticulumId, CatalogListingId, ObjectDataId, ObjectTaskId};

/// A claimable unit of work: parse one listing's detail page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectTask {
    pub id: ObjectTaskId,
    pub articulum_id: ArticulumId,
    pub avito_item_id: String,
    pub status: super::TaskStatus,
    pub worker_id: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub wrong_page_count: i32,
}

/// A captured detail-page snapshot. Append-only: a re-parse of the same
/// listing creates a new row rather than overwriting the old one, so view
/// count deltas over time can be reconstructed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectData {
    pub id: ObjectDataId,
    pub articulum_id: ArticulumId,
    pub catalog_listing_id: Option<CatalogListingId>,
    pub avito_item_id: String,
    pub title: String,
    pub price: Option<i64>,
    pub description: Option<String>,
    pub seller_name: Option<String>,
    pub view_count: Option<i64>,
    pub characteristics: Value,
    pub image_urls: Vec<String>,
    pub parsed_at: DateTime<Utc>,
}
