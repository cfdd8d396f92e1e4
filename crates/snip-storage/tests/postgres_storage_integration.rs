use std::collections::BTreeMap;
use std::time::Duration;

use snip_storage::{
    OwnerId, PostgresStorage, ReadStorage, SaveOutcome, ShortId, Storage, StorageError,
    TombstonePolicy,
};
use snip_telemetry::Logger;
use snip_test_infra::postgres::{PostgresConfig, PostgresServer};
use sqlx::postgres::PgPoolOptions;

struct Fixture {
    _postgres: PostgresServer,
    storage: PostgresStorage,
}

impl Fixture {
    async fn start() -> Self {
        Self::start_with(TombstonePolicy::Hide).await
    }

    async fn start_with(policy: TombstonePolicy) -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let pool = connect_with_retry(&url).await;

        let storage = PostgresStorage::new(pool, policy, Logger::root("test").named("postgres"));
        storage.ensure_schema().await.expect("create schema");

        Self {
            _postgres: postgres,
            storage,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::PgPool {
    let mut last_error = None;

    for _ in 0..20 {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn id(value: &str) -> ShortId {
    ShortId::new_unchecked(value)
}

fn owner(value: &str) -> OwnerId {
    OwnerId::new_unchecked(value)
}

fn pairs(items: &[(&str, &str)]) -> BTreeMap<ShortId, String> {
    items
        .iter()
        .map(|(i, url)| (id(i), url.to_string()))
        .collect()
}

#[tokio::test]
async fn save_and_get_record() {
    let fixture = Fixture::start().await;
    let u1 = owner("u1");

    let outcome = fixture
        .storage
        .save_id(&u1, &id("abc123"), "https://example.com")
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Created);

    let got = fixture.storage.get(&id("abc123")).await.unwrap().unwrap();
    assert_eq!(got.original_url, "https://example.com");
    assert_eq!(got.owner_id, u1);
    assert!(!got.deleted);
    assert!(fixture.storage.get(&id("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn save_classifies_conflicts() {
    let fixture = Fixture::start().await;
    let u1 = owner("u1");

    fixture
        .storage
        .save_id(&u1, &id("abc123"), "https://one.example")
        .await
        .unwrap();

    let same = fixture
        .storage
        .save_id(&u1, &id("abc123"), "https://one.example")
        .await
        .unwrap();
    assert_eq!(same, SaveOutcome::Unchanged);

    let err = fixture
        .storage
        .save_id(&u1, &id("abc123"), "https://two.example")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(_)));

    let existing = fixture
        .storage
        .save_id(&u1, &id("xyz789"), "https://one.example")
        .await
        .unwrap();
    assert_eq!(existing, SaveOutcome::UrlExists(id("abc123")));
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let fixture = Fixture::start().await;
    let u1 = owner("u1");

    fixture
        .storage
        .save_id(&u1, &id("bbb222"), "https://taken.example")
        .await
        .unwrap();

    let err = fixture
        .storage
        .save_batch(
            &u1,
            &pairs(&[("aaa111", "https://a.example"), ("bbb222", "https://b.example")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyExists(_)));
    assert!(fixture.storage.get(&id("aaa111")).await.unwrap().is_none());

    fixture
        .storage
        .save_batch(
            &u1,
            &pairs(&[("aaa111", "https://a.example"), ("ccc333", "https://c.example")]),
        )
        .await
        .unwrap();
    assert_eq!(fixture.storage.get_user_urls(&u1).await.unwrap().len(), 3);
}

#[tokio::test]
async fn delete_is_scoped_to_owner_and_keeps_claims() {
    let fixture = Fixture::start().await;
    let u1 = owner("u1");
    let u2 = owner("u2");

    fixture
        .storage
        .save_id(&u1, &id("abc123"), "https://example.com")
        .await
        .unwrap();

    assert_eq!(
        fixture.storage.batch_delete(&u2, &[id("abc123")]).await.unwrap(),
        0
    );
    assert!(fixture.storage.get(&id("abc123")).await.unwrap().is_some());

    assert_eq!(
        fixture.storage.batch_delete(&u1, &[id("abc123")]).await.unwrap(),
        1
    );
    assert_eq!(
        fixture.storage.batch_delete(&u1, &[id("abc123")]).await.unwrap(),
        0
    );
    assert!(fixture.storage.get(&id("abc123")).await.unwrap().is_none());
    assert!(fixture.storage.get_user_urls(&u1).await.unwrap().is_empty());
    assert_eq!(
        fixture
            .storage
            .get_id_by_url("https://example.com")
            .await
            .unwrap(),
        Some(id("abc123"))
    );
}

#[tokio::test]
async fn resolve_policy_returns_deleted_records() {
    let fixture = Fixture::start_with(TombstonePolicy::Resolve).await;
    let u1 = owner("u1");

    fixture
        .storage
        .save_id(&u1, &id("abc123"), "https://example.com")
        .await
        .unwrap();
    fixture.storage.batch_delete(&u1, &[id("abc123")]).await.unwrap();

    let got = fixture.storage.get(&id("abc123")).await.unwrap().unwrap();
    assert!(got.deleted);
}

#[tokio::test]
async fn ping_reaches_the_server() {
    let fixture = Fixture::start().await;
    fixture.storage.ping().await.unwrap();
}
