use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ArticulumId, CatalogListingId, CatalogTaskId};

/// Status of a catalog (search-results page) task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Invalid,
}

impl TaskStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Invalid => "invalid",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "invalid" => Self::Invalid,
            _ => return None,
        })
    }
}

/// A claimable unit of work: parse one articulum's search-result pages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogTask {
    pub id: CatalogTaskId,
    pub articulum_id: ArticulumId,
    pub status: TaskStatus,
    pub checkpoint_page: i32,
    pub worker_id: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub wrong_page_count: i32,
}

/// A single listing scraped off a search-results page.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogListing {
    pub id: CatalogListingId,
    pub articulum_id: ArticulumId,
    pub avito_item_id: String,
    pub title: String,
    pub price: Option<i64>,
    pub snippet: Option<String>,
    pub seller_name: Option<String>,
    pub seller_reviews: i32,
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}
