use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ArticulumId;

/// Lifecycle states of an articulum (part number) moving through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticulumState {
    New,
    CatalogParsing,
    CatalogParsed,
    Validating,
    Validated,
    ObjectParsing,
    RejectedByMinCount,
}

impl ArticulumState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::CatalogParsing => "catalog_parsing",
            Self::CatalogParsed => "catalog_parsed",
            Self::Validating => "validating",
            Self::Validated => "validated",
            Self::ObjectParsing => "object_parsing",
            Self::RejectedByMinCount => "rejected_by_min_count",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        Some(match s {
            "new" => Self::New,
            "catalog_parsing" => Self::CatalogParsing,
            "catalog_parsed" => Self::CatalogParsed,
            "validating" => Self::Validating,
            "validated" => Self::Validated,
            "object_parsing" => Self::ObjectParsing,
            "rejected_by_min_count" => Self::RejectedByMinCount,
            _ => return None,
        })
    }

    /// Terminal states have no outbound transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ObjectParsing | Self::RejectedByMinCount)
    }
}

/// A part number tracked through search, validation, and detail-page capture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Articulum {
    pub id: ArticulumId,
    pub value: String,
    pub state: ArticulumState,
    pub state_updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Articulum {
    pub fn new(value: String) -> Self {
        let now = Utc::now();
        Self {
            id: ArticulumId::new(),
            value,
            state: ArticulumState::New,
            state_updated_at: now,
            created_at: now,
        }
    }
}
