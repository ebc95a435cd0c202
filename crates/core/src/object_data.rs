use partwatch_common::error::Result;
use partwatch_common::{ArticulumId, ObjectDataId};

use crate::browser::RawCard;
use crate::store::Store;

/// An object detail parse is always an insert, never an update — history
/// is kept so view-count deltas can be reconstructed across re-parses.
pub async fn insert(store: &Store, articulum_id: ArticulumId, card: &RawCard) -> Result<ObjectDataId> {
    let id = ObjectDataId::new();
    sqlx::query(
        "INSERT INTO object_data \
         (id, articulum_id, avito_item_id, title, price, description, seller_name, view_count, \
          characteristics, image_urls) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(uuid::Uuid::from(id))
    .bind(uuid::Uuid::from(articulum_id))
    .bind(&card.avito_item_id)
    .bind(&card.title)
    .bind(card.price)
    .bind(&card.description)
    .bind(&card.seller_name)
    .bind(card.view_count)
    .bind(&card.characteristics)
    .bind(serde_json::to_value(&card.image_urls).unwrap_or(serde_json::Value::Array(vec![])))
    .execute(store.pool())
    .await?;
    Ok(id)
}

/// Used by the object-processing decision table to reject used/removed
/// listings before they are persisted.
pub fn is_used_condition(characteristics: &serde_json::Value) -> bool {
    let Some(condition) = characteristics.get("condition").and_then(|v| v.as_str()) else {
        return false;
    };
    let lowered = condition.to_lowercase();
    lowered.contains("used") || lowered.contains("б/у") || lowered.contains("бу")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_used_condition() {
        assert!(is_used_condition(&json!({"condition": "Used"})));
        assert!(is_used_condition(&json!({"condition": "Состояние: б/у"})));
        assert!(!is_used_condition(&json!({"condition": "New"})));
        assert!(!is_used_condition(&json!({})));
    }
}
