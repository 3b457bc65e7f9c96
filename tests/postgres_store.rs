//! Runs only when `BUCKETEER_TEST_DATABASE_URL` points at a PostgreSQL
//! database the test may create tables in.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use bucketeer::ratelimit::{BucketKey, BucketPolicy, RateLimiter};
use bucketeer::store::{BucketStore, PostgresStore, PostgresStoreOptions};

fn database_url() -> Option<String> {
    std::env::var("BUCKETEER_TEST_DATABASE_URL").ok()
}

fn options(url: &str, table: &str) -> PostgresStoreOptions {
    PostgresStoreOptions {
        database_url: url.to_string(),
        max_connections: 8,
        lock_timeout: Duration::from_secs(5),
        table_name: table.to_string(),
    }
}

fn unique_table() -> String {
    format!("bucket_state_{}", uuid::Uuid::new_v4().simple())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_separate_pools_share_one_quota() {
    let Some(url) = database_url() else {
        eprintln!("BUCKETEER_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let table = unique_table();

    // One pool per simulated process.
    let mut limiters = Vec::new();
    for i in 0..4 {
        let store = PostgresStore::connect(options(&url, &table)).await.unwrap();
        let limiter = RateLimiter::new(Arc::new(store), BucketPolicy::default())
            .with_instance_id(format!("process-{}", i));
        limiters.push(Arc::new(limiter));
    }

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let limiter = Arc::clone(&limiters[i % limiters.len()]);
            tokio::spawn(async move { limiter.try_consume("shared-key").await.unwrap() })
        })
        .collect();

    let accepted = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();
    assert_eq!(accepted, 3);

    let inspector = PostgresStore::connect(options(&url, &table)).await.unwrap();
    let row = inspector
        .snapshot(&BucketKey::new("shared-key").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.available_tokens, 0);

    sqlx::query(&format!("DROP TABLE {}", table))
        .execute(inspector.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_colliding_hash_keys_keep_separate_rows() {
    let Some(url) = database_url() else {
        eprintln!("BUCKETEER_TEST_DATABASE_URL not set; skipping");
        return;
    };
    let table = unique_table();
    let store = Arc::new(PostgresStore::connect(options(&url, &table)).await.unwrap());
    let limiter = RateLimiter::new(store.clone(), BucketPolicy::default());

    for _ in 0..3 {
        assert!(limiter.try_consume("Aa").await.unwrap());
    }
    assert!(!limiter.try_consume("Aa").await.unwrap());
    assert!(limiter.try_consume("BB").await.unwrap());

    sqlx::query(&format!("DROP TABLE {}", table))
        .execute(store.pool())
        .await
        .unwrap();
}
