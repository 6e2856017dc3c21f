/*!
 * Integration tests against on-disk stores
 *
 * Blob stores are local directories and both tables live in one SQLite file,
 * all opened from store URIs the way the CLI opens them.
 */

#![cfg(feature = "sqlite")]

use std::fs;
use tempfile::TempDir;

use lz_router::backend::RouterStores;
use lz_router::{
    AuditStatus, DatasetRecord, EventBatch, PartitioningScheme, Router, RouterConfig, StoreNames,
};

fn config(dir: &TempDir) -> RouterConfig {
    let root = dir.path();
    for sub in ["lz", "dl", "ex"] {
        fs::create_dir_all(root.join(sub)).unwrap();
    }
    let db = root.join("router.db");

    RouterConfig::with_stores(StoreNames {
        catalog: format!("sqlite://{}?table=dataset_catalog", db.display()),
        audit: format!("sqlite://{}?table=landing_zone_log", db.display()),
        data_lake: format!("file://{}", root.join("dl").display()),
        source: format!("file://{}", root.join("lz").display()),
        exception: format!("file://{}", root.join("ex").display()),
    })
}

fn payload(key: &str, size: u64) -> String {
    serde_json::json!({
        "Records": [{
            "eventSource": "aws:s3",
            "eventTime": "2024-01-02T03:04:05Z",
            "s3": { "object": { "key": key, "size": size } }
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_route_between_directories_with_sqlite_tables() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    config.validate().unwrap();

    let router = Router::new(&config, RouterStores::open(&config).await.unwrap());
    router
        .catalog()
        .register(&DatasetRecord::new(
            "SALES",
            "sales/",
            PartitioningScheme::Ymd,
        ))
        .await
        .unwrap();

    fs::write(dir.path().join("lz").join("eu_SALES_01022024.csv"), b"id,total\n").unwrap();

    let batch = EventBatch::from_json(&payload("eu_SALES_01022024.csv", 9)).unwrap();
    router.process_batch(&batch).await.into_result().unwrap();

    let landed = dir
        .path()
        .join("dl")
        .join("sales/Year=2024/Month=01/Day=02/eu_SALES_01022024.csv");
    assert_eq!(fs::read(landed).unwrap(), b"id,total\n");

    let records = router.audit().list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AuditStatus::Committed);
    assert_eq!(
        records[0].entry.destination_path,
        "sales/Year=2024/Month=01/Day=02/eu_SALES_01022024.csv"
    );
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    fs::write(dir.path().join("lz").join("x_NOPE_01022024.csv"), b"x").unwrap();
    let batch = EventBatch::from_json(&payload("x_NOPE_01022024.csv", 1)).unwrap();

    {
        let router = Router::new(&config, RouterStores::open(&config).await.unwrap());
        router.process_batch(&batch).await.into_result().unwrap();
    }

    assert!(dir.path().join("ex").join("x_NOPE_01022024.csv").exists());

    // A fresh process sees the committed record and skips the redelivery
    let router = Router::new(&config, RouterStores::open(&config).await.unwrap());
    let outcome = router.process_batch(&batch).await;
    assert_eq!(outcome.duplicates(), 1);
}
