// Integration tests for the canceled-order archive

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::create_temp_db_dir;
use grid_bracket_bot::core::CanceledOrder;
use grid_bracket_bot::{CanceledOrderStore, Database};

fn canceled(symbol: &str, order_id: u64, price: f64) -> CanceledOrder {
    CanceledOrder {
        symbol: symbol.to_string(),
        order_id,
        order_list_id: -1,
        client_order_id: format!("grid{}", order_id),
        price,
        orig_qty: 0.0002,
        executed_qty: 0.0,
        cummulative_quote_qty: 0.0,
        status: "CANCELED".to_string(),
        time_in_force: "GTC".to_string(),
        order_type: "LIMIT".to_string(),
        side: "SELL".to_string(),
    }
}

#[test]
fn test_database_creation() {
    let (_temp_dir, db_path) = create_temp_db_dir();
    let db = Database::new(&db_path).expect("Failed to create database");

    assert!(db_path.exists());
    assert!(db.health_check().unwrap());
}

#[test]
fn test_archive_survives_reopen() {
    let (_temp_dir, db_path) = create_temp_db_dir();

    {
        let store = CanceledOrderStore::new(Database::new(&db_path).unwrap());
        store.record(&canceled("BTCUSDT", 1, 50_813.14)).unwrap();
    }

    let store = CanceledOrderStore::new(Database::new(&db_path).unwrap());
    let archived = store.recent("BTCUSDT", 10).unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].order, canceled("BTCUSDT", 1, 50_813.14));
}

#[test]
fn test_recent_is_newest_first_and_limited() {
    let store = CanceledOrderStore::new(Database::new_in_memory().unwrap());
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

    for i in 0..5u64 {
        store
            .record_at(&canceled("BTCUSDT", i, 50_000.0 + i as f64), start + Duration::seconds(i as i64))
            .unwrap();
    }
    store.record_at(&canceled("ETHUSDT", 99, 3_000.0), start).unwrap();

    let recent = store.recent("BTCUSDT", 3).unwrap();
    let ids: Vec<u64> = recent.iter().map(|a| a.order.order_id).collect();
    assert_eq!(ids, vec![4, 3, 2]);
    assert_eq!(recent[0].canceled_at, start + Duration::seconds(4));

    assert_eq!(store.count("BTCUSDT").unwrap(), 5);
    assert_eq!(store.count("ETHUSDT").unwrap(), 1);
    assert_eq!(store.count("XRPUSDT").unwrap(), 0);
}

#[test]
fn test_stores_share_one_connection() {
    let db = Database::new_in_memory().unwrap();
    let writer = CanceledOrderStore::new(db.clone());
    let reader = CanceledOrderStore::new(db);

    writer.record(&canceled("BTCUSDT", 7, 49_000.0)).unwrap();
    assert_eq!(reader.count("BTCUSDT").unwrap(), 1);
}
