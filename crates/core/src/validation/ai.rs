use serde::{Deserialize, Serialize};

use partwatch_common::error::{PipelineError, Result};
use partwatch_common::types::CatalogListing;

#[derive(Serialize)]
struct AiItem<'a> {
    id: &'a str,
    title: String,
    snippet: String,
    price: Option<i64>,
}

#[derive(Serialize)]
struct AiRequest<'a> {
    articulum: &'a str,
    items: Vec<AiItem<'a>>,
}

#[derive(Deserialize)]
struct AiResponse {
    passed: Vec<String>,
    rejected: Vec<AiRejection>,
}

#[derive(Deserialize)]
struct AiRejection {
    id: String,
    reason: String,
}

pub struct AiVerdict {
    pub avito_item_id: String,
    pub passed: bool,
    pub reason: Option<String>,
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Issues one AI validation call for an entire articulum's surviving
/// listings (not one call per item). A transport/protocol failure is
/// returned as an error so the caller can roll the articulum back to
/// `CatalogParsed` instead of treating it as a per-item rejection.
pub async fn validate(
    client: &reqwest::Client,
    endpoint: &str,
    api_key: &str,
    articulum: &str,
    listings: &[CatalogListing],
) -> Result<Vec<AiVerdict>> {
    let items: Vec<AiItem> = listings
        .iter()
        .map(|l| AiItem {
            id: &l.avito_item_id,
            title: truncate(&l.title, 100),
            snippet: truncate(l.snippet.as_deref().unwrap_or(""), 200),
            price: l.price,
        })
        .collect();

    let request = AiRequest { articulum, items };

    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| PipelineError::AiValidation(e.to_string()))?;

    if !response.status().is_success() {
        return Err(PipelineError::AiValidation(format!(
            "endpoint returned status {}",
            response.status()
        )));
    }

    let parsed: AiResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::AiValidation(e.to_string()))?;

    let mut verdicts = Vec::with_capacity(listings.len());
    for listing in listings {
        if parsed.passed.iter().any(|id| id == &listing.avito_item_id) {
            verdicts.push(AiVerdict {
                avito_item_id: listing.avito_item_id.clone(),
                passed: true,
                reason: None,
            });
        } else if let Some(rejection) = parsed
            .rejected
            .iter()
            .find(|r| r.id == listing.avito_item_id)
        {
            verdicts.push(AiVerdict {
                avito_item_id: listing.avito_item_id.clone(),
                passed: false,
                reason: Some(rejection.reason.clone()),
            });
        } else {
            verdicts.push(AiVerdict {
                avito_item_id: listing.avito_item_id.clone(),
                passed: false,
                reason: Some("no decision".to_string()),
            });
        }
    }

    Ok(verdicts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundary_not_byte_length() {
        let s = "a".repeat(250);
        assert_eq!(truncate(&s, 100).chars().count(), 100);
    }
}
