mod common;

use chrono::Duration;
use common::{TestDatabase, state_vector};
use contrail::ingest_config::MergePolicy;
use contrail::state_vectors_repo::{ApplyOutcome, StateVectorSink, StateVectorsRepository};

#[tokio::test]
async fn test_ignore_keeps_first_seen_row() {
    let test_db = TestDatabase::new()
        .await
        .expect("Failed to create test database");
    let repo = StateVectorsRepository::new(test_db.pool());

    let first = state_vector("a1b2c3", "UAL123", 1_700_000_000);
    let outcome = repo
        .apply(vec![first.clone()], MergePolicy::Ignore)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome {
            written: 1,
            duplicates: 0
        }
    );

    let mut changed = first.clone();
    changed.callsign = Some("UAL999".to_string());
    changed.velocity = Some(10.0);
    changed.fetch_time = first.fetch_time + Duration::minutes(10);

    let outcome = repo
        .apply(vec![changed], MergePolicy::Ignore)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome {
            written: 0,
            duplicates: 1
        }
    );

    let stored = repo.find("a1b2c3", 1_700_000_000).await.unwrap().unwrap();
    assert_eq!(stored, first);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_upsert_overwrites_every_non_key_column() {
    let test_db = TestDatabase::new()
        .await
        .expect("Failed to create test database");
    let repo = StateVectorsRepository::new(test_db.pool());

    let first = state_vector("a1b2c3", "UAL123", 1_700_000_000);
    repo.apply(vec![first.clone()], MergePolicy::Upsert)
        .await
        .unwrap();

    let mut changed = first.clone();
    changed.callsign = None;
    changed.origin_country = "Canada".to_string();
    changed.time_position = None;
    changed.longitude = Some(-79.6);
    changed.latitude = Some(43.7);
    changed.baro_altitude = None;
    changed.on_ground = true;
    changed.velocity = Some(0.0);
    changed.true_track = Some(360.0);
    changed.vertical_rate = None;
    changed.sensors = Some("[1,2]".to_string());
    changed.geo_altitude = None;
    changed.squawk = Some("7700".to_string());
    changed.spi = true;
    changed.position_source = Some(2);
    changed.fetch_time = first.fetch_time + Duration::minutes(10);

    let outcome = repo
        .apply(vec![changed.clone()], MergePolicy::Upsert)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome {
            written: 1,
            duplicates: 0
        }
    );

    let stored = repo.find("a1b2c3", 1_700_000_000).await.unwrap().unwrap();
    assert_eq!(stored, changed);
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_aircraft_new_contact_is_a_new_row() {
    let test_db = TestDatabase::new()
        .await
        .expect("Failed to create test database");
    let repo = StateVectorsRepository::new(test_db.pool());

    let batch = vec![
        state_vector("a1b2c3", "UAL123", 1_700_000_000),
        state_vector("a1b2c3", "UAL123", 1_700_000_010),
    ];
    let outcome = repo.apply(batch, MergePolicy::Ignore).await.unwrap();

    assert_eq!(outcome.written, 2);
    assert_eq!(repo.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_failing_row_rolls_back_whole_batch() {
    let test_db = TestDatabase::new()
        .await
        .expect("Failed to create test database");
    let repo = StateVectorsRepository::new(test_db.pool());

    let existing = state_vector("a1b2c3", "UAL123", 1_700_000_000);
    repo.apply(vec![existing.clone()], MergePolicy::Upsert)
        .await
        .unwrap();

    // Built by hand to get past normalization; the table's check constraint refuses it
    let mut invalid = state_vector("d4e5f6", "DAL456", 1_700_000_000);
    invalid.latitude = Some(95.0);

    let mut overwrite = existing.clone();
    overwrite.callsign = Some("CHANGED".to_string());

    let batch = vec![
        overwrite,
        state_vector("0a0b0c", "AAL789", 1_700_000_000),
        invalid,
    ];
    let result = repo.apply(batch, MergePolicy::Upsert).await;

    assert!(result.is_err());
    assert_eq!(repo.count().await.unwrap(), 1);
    let stored = repo.find("a1b2c3", 1_700_000_000).await.unwrap().unwrap();
    assert_eq!(stored, existing);
    assert!(repo.find("0a0b0c", 1_700_000_000).await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let test_db = TestDatabase::new()
        .await
        .expect("Failed to create test database");
    let repo = StateVectorsRepository::new(test_db.pool());

    for policy in [MergePolicy::Ignore, MergePolicy::Upsert] {
        let outcome = repo.apply(Vec::new(), policy).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::default());
    }
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_keys_within_one_batch() {
    let test_db = TestDatabase::new()
        .await
        .expect("Failed to create test database");
    let repo = StateVectorsRepository::new(test_db.pool());

    let first = state_vector("a1b2c3", "UAL123", 1_700_000_000);
    let second = state_vector("a1b2c3", "UAL124", 1_700_000_000);

    let outcome = repo
        .apply(vec![first.clone(), second.clone()], MergePolicy::Ignore)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ApplyOutcome {
            written: 1,
            duplicates: 1
        }
    );
    let stored = repo.find("a1b2c3", 1_700_000_000).await.unwrap().unwrap();
    assert_eq!(stored.callsign.as_deref(), Some("UAL123"));

    // Under upsert the later row in the batch wins
    let outcome = repo
        .apply(vec![first, second], MergePolicy::Upsert)
        .await
        .unwrap();
    assert_eq!(outcome.written, 2);
    let stored = repo.find("a1b2c3", 1_700_000_000).await.unwrap().unwrap();
    assert_eq!(stored.callsign.as_deref(), Some("UAL124"));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_rows_come_back_in_key_order() {
    let test_db = TestDatabase::new()
        .await
        .expect("Failed to create test database");
    let repo = StateVectorsRepository::new(test_db.pool());

    let batch = vec![
        state_vector("ffffff", "B", 20),
        state_vector("000001", "A", 30),
        state_vector("000001", "A", 10),
    ];
    repo.apply(batch, MergePolicy::Upsert).await.unwrap();

    let keys: Vec<(String, i64)> = repo
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|sv| (sv.icao24, sv.last_contact))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("000001".to_string(), 10),
            ("000001".to_string(), 30),
            ("ffffff".to_string(), 20),
        ]
    );
}
