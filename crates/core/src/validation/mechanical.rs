use partwatch_common::types::CatalogListing;

const STOP_WORDS: &[&str] = &["копия", "реплика", "б/у", "бу", "подделка", "не оригинал"];

/// Visually-equivalent Cyrillic letters mapped to their Latin lookalikes,
/// so an articulum typed in one alphabet still matches listing text typed
/// in the other.
const HOMOGLYPHS: &[(char, char)] = &[
    ('а', 'a'),
    ('в', 'b'),
    ('е', 'e'),
    ('к', 'k'),
    ('м', 'm'),
    ('н', 'h'),
    ('о', 'o'),
    ('р', 'p'),
    ('с', 'c'),
    ('т', 't'),
    ('у', 'y'),
    ('х', 'x'),
];

/// Case-folds, maps Cyrillic homoglyphs to Latin, and strips everything
/// that isn't a letter or digit.
fn normalize(s: &str) -> String {
    let lowered = s.to_lowercase();
    lowered
        .chars()
        .filter_map(|c| {
            let mapped = HOMOGLYPHS
                .iter()
                .find(|(cyrillic, _)| *cyrillic == c)
                .map(|(_, latin)| *latin)
                .unwrap_or(c);
            mapped.is_alphanumeric().then_some(mapped)
        })
        .collect()
}

fn check_articulum_present(listing: &CatalogListing, articulum: &str) -> Result<(), String> {
    let needle = normalize(articulum);
    let haystack = normalize(&format!(
        "{} {}",
        listing.title,
        listing.snippet.as_deref().unwrap_or("")
    ));
    if haystack.contains(&needle) {
        Ok(())
    } else {
        Err("articulum not found in title or snippet".to_string())
    }
}

fn check_stop_words(listing: &CatalogListing) -> Result<(), String> {
    let text = format!(
        "{} {}",
        listing.title.to_lowercase(),
        listing.snippet.as_deref().unwrap_or("").to_lowercase()
    );
    for word in STOP_WORDS {
        if text.contains(word) {
            return Err(format!("stop word '{}' found", word));
        }
    }
    Ok(())
}

fn check_seller_reviews(listing: &CatalogListing, min_reviews: i32) -> Result<(), String> {
    if min_reviews > 0 && listing.seller_reviews < min_reviews {
        return Err(format!(
            "seller has {} reviews, minimum is {}",
            listing.seller_reviews, min_reviews
        ));
    }
    Ok(())
}

/// Computes the interquartile-range-sane price range for a set of prices,
/// and the threshold below which a price is "suspiciously low" relative to
/// the top of the market for this articulum.
///
/// Returns `None` when there are too few prices to form a meaningful range.
pub fn iqr_low_price_threshold(prices: &[i64]) -> Option<f64> {
    if prices.len() < 4 {
        return None;
    }
    let mut sorted: Vec<i64> = prices.to_vec();
    sorted.sort_unstable();

    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    let iqr = q3 - q1;
    let low_bound = q1 - iqr;
    let high_bound = q3 + iqr;

    let retained: Vec<f64> = sorted
        .iter()
        .map(|&p| p as f64)
        .filter(|&p| p >= low_bound && p <= high_bound)
        .collect();

    if retained.is_empty() {
        return None;
    }

    let mut descending = retained.clone();
    descending.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let top_count = (2 * descending.len() / 5).max(1);
    let top_slice = &descending[..top_count.min(descending.len())];
    let median_top = median(top_slice);

    Some(0.5 * median_top)
}

fn percentile(sorted: &[i64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower] as f64
    } else {
        let frac = rank - lower as f64;
        sorted[lower] as f64 * (1.0 - frac) + sorted[upper] as f64 * frac
    }
}

fn median(values: &[f64]) -> f64 {
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn check_iqr(listing: &CatalogListing, low_threshold: Option<f64>) -> Result<(), String> {
    let Some(threshold) = low_threshold else {
        return Ok(());
    };
    match listing.price {
        Some(price) if (price as f64) < threshold => {
            Err(format!("price {} is suspiciously low (threshold {:.0})", price, threshold))
        }
        _ => Ok(()),
    }
}

pub struct MechanicalConfig {
    pub require_articulum_in_text: bool,
    pub min_seller_reviews: i32,
    pub enable_iqr: bool,
}

/// Runs the stage-2 sub-checks in order; the first failure is the recorded
/// rejection reason.
pub fn check(
    listing: &CatalogListing,
    articulum: &str,
    config: &MechanicalConfig,
    iqr_threshold: Option<f64>,
) -> Result<(), String> {
    if config.require_articulum_in_text {
        check_articulum_present(listing, articulum)?;
    }
    check_stop_words(listing)?;
    check_seller_reviews(listing, config.min_seller_reviews)?;
    if config.enable_iqr {
        check_iqr(listing, iqr_threshold)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use partwatch_common::ArticulumId;

    fn listing(title: &str, snippet: &str, price: Option<i64>, reviews: i32) -> CatalogListing {
        CatalogListing {
            id: Default::default(),
            articulum_id: ArticulumId::new(),
            avito_item_id: "1".into(),
            title: title.into(),
            price,
            snippet: Some(snippet.into()),
            seller_name: None,
            seller_reviews: reviews,
            image_urls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn homoglyph_normalization_matches_cyrillic_lookalikes() {
        let latin = listing("Насос CAT100 новый", "", Some(2000), 0);
        assert!(check_articulum_present(&latin, "CAT100").is_ok());

        // Same articulum, but typed with visually-identical Cyrillic letters
        // (С, А, Т are the Cyrillic lookalikes for Latin C, A, T).
        let cyrillic = listing("Насос САТ100 новый", "", Some(2000), 0);
        assert!(check_articulum_present(&cyrillic, "CAT100").is_ok());
    }

    #[test]
    fn missing_articulum_fails() {
        let l = listing("Насос оригинал", "", Some(2000), 0);
        assert!(check_articulum_present(&l, "CAT100").is_err());
    }

    #[test]
    fn stop_words_reject() {
        let l = listing("LR081595 копия китай", "", Some(2000), 0);
        assert!(check_stop_words(&l).is_err());
    }

    #[test]
    fn seller_reviews_threshold() {
        let l = listing("x", "", Some(2000), 2);
        assert!(check_seller_reviews(&l, 5).is_err());
        assert!(check_seller_reviews(&l, 2).is_ok());
        assert!(check_seller_reviews(&l, 0).is_ok());
    }

    #[test]
    fn iqr_flags_outlier_low_price() {
        let prices = vec![100, 110, 105, 115, 20];
        let threshold = iqr_low_price_threshold(&prices).expect("threshold computed");
        assert!(20.0 < threshold);
        assert!(100.0 > threshold);
    }

    #[test]
    fn iqr_needs_minimum_sample_size() {
        assert!(iqr_low_price_threshold(&[100, 110]).is_none());
    }
}
