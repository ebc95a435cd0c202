use std::time::Duration;

use tokio::sync::watch;

use partwatch_common::config::PipelineConfig;
use partwatch_common::error::Result;
use partwatch_common::types::{CatalogListing, ValidationStage};
use partwatch_common::ArticulumId;
use partwatch_core::validation::{ai, mechanical, price_filter};
use partwatch_core::{state_machine, validation, Store};

/// Number of consecutive AI-endpoint failures this process will tolerate
/// before giving up and exiting, so the supervisor restarts it on a fresh
/// connection rather than spinning forever against a dead endpoint.
const MAX_CONSECUTIVE_AI_FAILURES: u32 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match PipelineConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration — refusing to start");
            std::process::exit(1);
        }
    };

    let worker_id = config
        .worker_id
        .clone()
        .unwrap_or_else(|| partwatch_common::config::worker_id(&config.container_id, 0));

    tracing::info!(worker_id = %worker_id, "validation worker starting");

    let store = match Store::connect(&config.database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to postgres");
            std::process::exit(1);
        }
    };

    let http_client = reqwest::Client::new();

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let mut consecutive_ai_failures = 0u32;

    loop {
        if *shutdown_rx.borrow() {
            tracing::info!(worker_id = %worker_id, "shutdown requested, exiting");
            break;
        }

        match validation::claim_articulum(&store).await {
            Ok(Some(articulum_id)) => {
                match process_articulum(&store, &http_client, &config, articulum_id).await {
                    Ok(AiOutcome::Ok) => {
                        consecutive_ai_failures = 0;
                    }
                    Ok(AiOutcome::AiFailed) => {
                        consecutive_ai_failures += 1;
                        tracing::warn!(
                            worker_id = %worker_id,
                            consecutive_failures = consecutive_ai_failures,
                            "AI validation endpoint failed, rolled articulum back to catalog_parsed"
                        );
                        if consecutive_ai_failures >= MAX_CONSECUTIVE_AI_FAILURES {
                            tracing::error!(
                                worker_id = %worker_id,
                                "AI validation endpoint failed {} times in a row, exiting",
                                consecutive_ai_failures
                            );
                            std::process::exit(2);
                        }
                    }
                    Err(e) => {
                        tracing::error!(worker_id = %worker_id, error = %e, "validation cycle failed");
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(2)) => {}
                    _ = shutdown_rx.changed() => {}
                }
            }
            Err(e) => {
                tracing::error!(worker_id = %worker_id, error = %e, "failed to claim articulum");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

enum AiOutcome {
    Ok,
    AiFailed,
}

async fn process_articulum(
    store: &Store,
    http_client: &reqwest::Client,
    config: &PipelineConfig,
    articulum_id: ArticulumId,
) -> Result<AiOutcome> {
    let articulum = partwatch_core::articulums::get(store, articulum_id)
        .await?
        .ok_or_else(|| partwatch_common::error::PipelineError::NotFound("articulum".into()))?;

    let listings = validation::listings_for_articulum(store, articulum_id).await?;

    let price_results = run_price_stage(store, articulum_id, &listings, config).await?;

    let iqr_threshold = if config.enable_iqr_price_filter {
        let passing_prices: Vec<i64> = listings
            .iter()
            .filter(|l| price_results.iter().any(|(id, ok)| id == &l.avito_item_id && *ok))
            .filter_map(|l| l.price)
            .collect();
        mechanical::iqr_low_price_threshold(&passing_prices)
    } else {
        None
    };

    let mechanical_config = mechanical::MechanicalConfig {
        require_articulum_in_text: config.require_articulum_in_text,
        min_seller_reviews: config.min_seller_reviews,
        enable_iqr: config.enable_iqr_price_filter,
    };
    let mechanical_results =
        run_mechanical_stage(store, articulum_id, &listings, &articulum.value, &mechanical_config, iqr_threshold).await?;

    let ai_candidates: Vec<CatalogListing> = listings
        .iter()
        .filter(|l| {
            price_results.iter().any(|(id, ok)| id == &l.avito_item_id && *ok)
                && mechanical_results.iter().any(|(id, ok)| id == &l.avito_item_id && *ok)
        })
        .cloned()
        .collect();

    let ai_results = if !config.enable_ai_validation || ai_candidates.is_empty() {
        None
    } else {
        match (&config.ai_validation_endpoint, &config.ai_validation_api_key) {
            (Some(endpoint), Some(api_key)) => {
                match ai::validate(http_client, endpoint, api_key, &articulum.value, &ai_candidates).await {
                    Ok(verdicts) => {
                        for verdict in &verdicts {
                            validation::record_result(
                                store,
                                articulum_id,
                                &verdict.avito_item_id,
                                ValidationStage::Ai,
                                verdict.passed,
                                verdict.reason.as_deref(),
                            )
                            .await?;
                        }
                        Some(verdicts)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "AI validation endpoint call failed");
                        state_machine::rollback_to_catalog_parsed(store, articulum_id).await?;
                        return Ok(AiOutcome::AiFailed);
                    }
                }
            }
            _ => {
                tracing::warn!("AI validation enabled but endpoint/key not configured, skipping stage");
                None
            }
        }
    };

    let survivors = validation::survivors(
        &listings,
        &price_results,
        &mechanical_results,
        ai_results.as_deref(),
    );

    if survivors.len() as i64 >= config.min_validated_items {
        let survivor_ids: Vec<String> = survivors.iter().map(|l| l.avito_item_id.clone()).collect();
        validation::accept_articulum(store, articulum_id, &survivor_ids, config.skip_object_parsing).await?;
        tracing::info!(
            articulum = %articulum.value,
            survivors = survivor_ids.len(),
            "articulum validated"
        );
    } else {
        validation::reject_articulum(store, articulum_id).await?;
        tracing::info!(
            articulum = %articulum.value,
            survivors = survivors.len(),
            minimum = config.min_validated_items,
            "articulum rejected: too few validated items"
        );
    }

    Ok(AiOutcome::Ok)
}

async fn run_price_stage(
    store: &Store,
    articulum_id: ArticulumId,
    listings: &[CatalogListing],
    config: &PipelineConfig,
) -> Result<Vec<(String, bool)>> {
    let mut results = Vec::with_capacity(listings.len());
    for listing in listings {
        let outcome = if config.enable_price_validation {
            price_filter::check(listing, config.min_price)
        } else {
            Ok(())
        };
        let (passed, reason) = match &outcome {
            Ok(()) => (true, None),
            Err(reason) => (false, Some(reason.as_str())),
        };
        validation::record_result(
            store,
            articulum_id,
            &listing.avito_item_id,
            ValidationStage::PriceFilter,
            passed,
            reason,
        )
        .await?;
        results.push((listing.avito_item_id.clone(), passed));
    }
    Ok(results)
}

async fn run_mechanical_stage(
    store: &Store,
    articulum_id: ArticulumId,
    listings: &[CatalogListing],
    articulum_value: &str,
    config: &mechanical::MechanicalConfig,
    iqr_threshold: Option<f64>,
) -> Result<Vec<(String, bool)>> {
    let mut results = Vec::with_capacity(listings.len());
    for listing in listings {
        let outcome = mechanical::check(listing, articulum_value, config, iqr_threshold);
        let (passed, reason) = match &outcome {
            Ok(()) => (true, None),
            Err(reason) => (false, Some(reason.as_str())),
        };
        validation::record_result(
            store,
            articulum_id,
            &listing.avito_item_id,
            ValidationStage::Mechanical,
            passed,
            reason,
        )
        .await?;
        results.push((listing.avito_item_id.clone(), passed));
    }
    Ok(results)
}
