use partwatch_common::types::CatalogListing;

/// An item fails the price filter when it has no listed price, or the
/// price is below the configured floor.
pub fn check(listing: &CatalogListing, min_price: i64) -> Result<(), String> {
    match listing.price {
        None => Err("missing price".to_string()),
        Some(price) if price < min_price => Err(format!("price {} below minimum {}", price, min_price)),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use partwatch_common::ArticulumId;

    fn listing(price: Option<i64>) -> CatalogListing {
        CatalogListing {
            id: Default::default(),
            articulum_id: ArticulumId::new(),
            avito_item_id: "1".into(),
            title: "t".into(),
            price,
            snippet: None,
            seller_name: None,
            seller_reviews: 0,
            image_urls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_missing_price() {
        assert!(check(&listing(None), 1000).is_err());
    }

    #[test]
    fn rejects_below_floor() {
        assert!(check(&listing(Some(999)), 1000).is_err());
    }

    #[test]
    fn accepts_at_or_above_floor() {
        assert!(check(&listing(Some(1000)), 1000).is_ok());
        assert!(check(&listing(Some(5000)), 1000).is_ok());
    }
}
