use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ArticulumId, ValidationResultId};

/// A single validation stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStage {
    PriceFilter,
    Mechanical,
    Ai,
}

impl ValidationStage {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::PriceFilter => "price_filter",
            Self::Mechanical => "mechanical",
            Self::Ai => "ai",
        }
    }
}

/// Outcome of running one stage against one listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: ValidationResultId,
    pub articulum_id: ArticulumId,
    pub avito_item_id: String,
    pub stage: ValidationStage,
    pub passed: bool,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
