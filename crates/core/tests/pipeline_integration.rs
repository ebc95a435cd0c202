//! Integration tests against a live Postgres instance. Run with:
//!   DATABASE_URL=postgres://... cargo test -p partwatch-core -- --ignored

use partwatch_common::types::ArticulumState;
use partwatch_core::{articulums, catalog_tasks, heartbeat, proxy_pool, state_machine, Store};

async fn setup() -> Store {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");
    let store = Store::connect(&database_url, 5)
        .await
        .expect("failed to connect to postgres");
    store.migrate().await.expect("failed to run migrations");
    store
}

#[tokio::test]
#[ignore]
async fn claim_transitions_articulum_and_is_exclusive() {
    let store = setup().await;
    let articulum_id = articulums::create(&store, &format!("TEST-{}", uuid::Uuid::new_v4()))
        .await
        .unwrap();
    catalog_tasks::create(&store, articulum_id).await.unwrap();

    let claimed = catalog_tasks::claim(&store, "worker-1").await.unwrap();
    assert!(claimed.is_some());

    // A second claim attempt finds nothing: the articulum left `New`.
    let second = catalog_tasks::claim(&store, "worker-2").await.unwrap();
    assert!(second.is_none());

    let articulum = articulums::get(&store, articulum_id).await.unwrap().unwrap();
    assert_eq!(articulum.state, ArticulumState::CatalogParsing);
}

#[tokio::test]
#[ignore]
async fn heartbeat_sweep_recovers_stuck_task_and_releases_proxy() {
    let store = setup().await;
    let articulum_id = articulums::create(&store, &format!("TEST-{}", uuid::Uuid::new_v4()))
        .await
        .unwrap();
    catalog_tasks::create(&store, articulum_id).await.unwrap();
    let task = catalog_tasks::claim(&store, "worker-stuck")
        .await
        .unwrap()
        .unwrap();

    let proxy = proxy_pool::acquire(&store, "worker-stuck").await.unwrap();

    // Force the heartbeat into the past so the sweep finds it.
    sqlx::query("UPDATE catalog_tasks SET heartbeat_at = now() - interval '1 hour' WHERE id = $1")
        .bind(uuid::Uuid::from(task.id))
        .execute(store.pool())
        .await
        .unwrap();

    let recovered = heartbeat::sweep(&store, std::time::Duration::from_secs(60))
        .await
        .unwrap();
    assert!(recovered >= 1);

    let articulum = articulums::get(&store, articulum_id).await.unwrap().unwrap();
    assert_eq!(articulum.state, ArticulumState::New);

    if let Some(proxy) = proxy {
        let row: (bool,) = sqlx::query_as("SELECT is_in_use FROM proxies WHERE id = $1")
            .bind(uuid::Uuid::from(proxy.id))
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(!row.0);
    }
}

#[tokio::test]
#[ignore]
async fn rollback_to_catalog_parsed_clears_validation_results() {
    let store = setup().await;
    let articulum_id = articulums::create(&store, &format!("TEST-{}", uuid::Uuid::new_v4()))
        .await
        .unwrap();

    sqlx::query("UPDATE articulums SET state = 'validating' WHERE id = $1")
        .bind(uuid::Uuid::from(articulum_id))
        .execute(store.pool())
        .await
        .unwrap();

    partwatch_core::validation::record_result(
        &store,
        articulum_id,
        "item-1",
        partwatch_common::types::ValidationStage::Mechanical,
        true,
        None,
    )
    .await
    .unwrap();

    let rolled_back = state_machine::rollback_to_catalog_parsed(&store, articulum_id)
        .await
        .unwrap();
    assert!(rolled_back);

    let remaining: (i64,) =
        sqlx::query_as("SELECT count(*) FROM validation_results WHERE articulum_id = $1")
            .bind(uuid::Uuid::from(articulum_id))
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(remaining.0, 0);
}
