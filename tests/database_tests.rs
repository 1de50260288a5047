//! Tests for the Database composition layer
//!
//! These tests verify:
//! - Natural-key dedup of clients and items
//! - Invoice insert/read round trip across the six tables
//! - Cascading delete and replace
//! - Flush boundary and reopen
//! - Integrity checks failing loudly on damaged data

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use ledgerdb::db::{DateMode, INVOICE_COUNT_KEY};
use ledgerdb::storage::PropertyPage;
use ledgerdb::{Client, Config, Database, Invoice, Item, LedgerError, Purchase, PurchaseGroup};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_db(max_partition_size: usize) -> (TempDir, PathBuf, Database) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().to_path_buf();
    let db = Database::open(config(&path, max_partition_size)).unwrap();
    (temp_dir, path, db)
}

fn config(path: &PathBuf, max_partition_size: usize) -> Config {
    Config::builder()
        .data_dir(path)
        .max_partition_size(max_partition_size)
        .build()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sample_invoice(address: &str, on: NaiveDate) -> Invoice {
    let desk = Item::new("Desk", 120.0, 0.21);
    let chair = Item::new("Chair", 45.5, 0.21);
    let repair = Item::new("Repair", 30.0, 0.0).with_default_date(true);

    Invoice::new(address, on)
        .with_group(
            PurchaseGroup::new(vec![Client::new("Alice")])
                .with_purchase(Purchase::new(desk.clone(), 1))
                .with_purchase(Purchase::new(chair, 4)),
        )
        .with_group(
            PurchaseGroup::new(vec![Client::new("Bob"), Client::new("Carol"), Client::new("Alice")])
                .with_purchase(Purchase::new(repair, 2).between(date(2024, 3, 1), date(2024, 3, 5)))
                .with_purchase(Purchase::new(desk, 2).on(date(2024, 3, 2))),
        )
}

/// Compare an invoice by content, ignoring assigned ids
fn assert_same_content(actual: &Invoice, expected: &Invoice) {
    assert_eq!(actual.address, expected.address);
    assert_eq!(actual.date, expected.date);
    assert_eq!(actual.pdf_filename, expected.pdf_filename);
    assert_eq!(actual.groups.len(), expected.groups.len());

    for (a, e) in actual.groups.iter().zip(&expected.groups) {
        let names = |g: &PurchaseGroup| g.clients.iter().map(|c| c.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(a), names(e));
        assert_eq!(a.stop_words, e.stop_words);
        assert_eq!(a.purchases.len(), e.purchases.len());
        for (pa, pe) in a.purchases.iter().zip(&e.purchases) {
            assert!(pa.item.same_article(&pe.item));
            assert_eq!(pa.count, pe.count);
            assert_eq!(pa.from, pe.from);
            assert_eq!(pa.to, pe.to);
            assert_eq!(pa.date_mode, pe.date_mode);
        }
    }
}

// =============================================================================
// Client and Item Tests
// =============================================================================

#[test]
fn test_insert_client_dedups_by_name() {
    let (_temp, _path, mut db) = setup_db(4);

    let alice = db.insert_client("Alice").unwrap();
    let bob = db.insert_client("Bob").unwrap();
    let again = db.insert_client("Alice").unwrap();

    assert_eq!(alice.id, 1);
    assert_eq!(bob.id, 2);
    assert_eq!(again, alice);
    assert_eq!(db.clients().unwrap(), vec![alice, bob]);
}

#[test]
fn test_insert_item_dedups_by_name_price_vat() {
    let (_temp, _path, mut db) = setup_db(4);

    let desk = db.insert_item(&Item::new("Desk", 100.0, 0.21)).unwrap();
    let same = db.insert_item(&Item::new("Desk", 100.0, 0.21)).unwrap();
    let cheaper = db.insert_item(&Item::new("Desk", 90.0, 0.21)).unwrap();

    assert_eq!(same.id, desk.id);
    assert_ne!(cheaper.id, desk.id);
    assert_eq!(db.items().unwrap().len(), 2);
    assert_eq!(db.item(cheaper.id).unwrap(), Some(cheaper));
}

#[test]
fn test_set_item_active() {
    let (_temp, _path, mut db) = setup_db(4);
    let desk = db.insert_item(&Item::new("Desk", 100.0, 0.21)).unwrap();
    assert!(desk.active);

    let updated = db.set_item_active(desk.id, false).unwrap();
    assert!(!updated.active);
    assert_eq!(db.item(desk.id).unwrap().map(|i| i.active), Some(false));
    assert_eq!(db.items().unwrap().len(), 1);

    let err = db.set_item_active(99, true).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { id: 99, .. }));
}

#[test]
fn test_invalid_item_rejected() {
    let (_temp, _path, mut db) = setup_db(4);

    let err = db.insert_item(&Item::new("Desk", -1.0, 0.21)).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidValue { ref column, .. } if column == "price"));
    assert!(db.items().unwrap().is_empty());
}

// =============================================================================
// Invoice Round Trip Tests
// =============================================================================

#[test]
fn test_insert_and_read_invoice() {
    let (_temp, _path, mut db) = setup_db(4);
    let invoice = sample_invoice("1 Main St", date(2024, 3, 10));

    let stored = db.insert_invoice(&invoice).unwrap();
    assert_eq!(stored.id, 1);
    assert_same_content(&stored, &invoice);

    let read = db.invoice(stored.id).unwrap().unwrap();
    assert_eq!(read, stored);
    assert_eq!(db.invoice_count(), 1);
}

#[test]
fn test_invoice_shares_clients_and_items() {
    let (_temp, _path, mut db) = setup_db(4);
    db.insert_invoice(&sample_invoice("1 Main St", date(2024, 3, 10)))
        .unwrap();

    // Alice appears in both groups, Desk in two purchases
    assert_eq!(db.clients().unwrap().len(), 3);
    assert_eq!(db.items().unwrap().len(), 3);

    let invoice = db.invoice(1).unwrap().unwrap();
    assert_eq!(invoice.groups[0].clients[0], invoice.groups[1].clients[2]);
}

#[test]
fn test_group_without_clients_rejected() {
    let (_temp, _path, mut db) = setup_db(4);
    let invoice = Invoice::new("x", date(2024, 1, 1)).with_group(PurchaseGroup::new(vec![]));

    let err = db.insert_invoice(&invoice).unwrap_err();
    assert!(err.is_validation());
    assert_eq!(db.invoice_count(), 0);
    assert!(db.invoices().unwrap().is_empty());
    assert!(!db.is_dirty());
}

#[test]
fn test_bad_purchase_rejected_before_any_write() {
    let (_temp, _path, mut db) = setup_db(4);
    let invoice = Invoice::new("x", date(2024, 1, 1)).with_group(
        PurchaseGroup::new(vec![Client::new("Alice")])
            .with_purchase(Purchase::new(Item::new("Desk", 10.0, 0.21), -3)),
    );

    let err = db.insert_invoice(&invoice).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidValue { ref column, .. } if column == "count"));
    assert!(db.clients().unwrap().is_empty());
    assert!(!db.is_dirty());
}

#[test]
fn test_range_dates_must_be_ordered() {
    let (_temp, _path, mut db) = setup_db(4);
    let invoice = Invoice::new("x", date(2024, 1, 1)).with_group(
        PurchaseGroup::new(vec![Client::new("Alice")]).with_purchase(
            Purchase::new(Item::new("Repair", 10.0, 0.0), 1)
                .between(date(2024, 2, 1), date(2024, 1, 1)),
        ),
    );

    assert!(db.insert_invoice(&invoice).unwrap_err().is_validation());
}

#[test]
fn test_invoices_newest_first_and_by_date() {
    let (_temp, _path, mut db) = setup_db(2);

    let days = [5, 1, 9, 5, 3];
    for (i, d) in days.iter().enumerate() {
        db.insert_invoice(&sample_invoice(&format!("Street {}", i), date(2024, 6, *d)))
            .unwrap();
    }

    let dates: Vec<u32> = db
        .invoices()
        .unwrap()
        .iter()
        .map(|inv| chrono::Datelike::day(&inv.date))
        .collect();
    assert_eq!(dates, vec![9, 5, 5, 3, 1]);

    let on_fifth = db.invoices_on(date(2024, 6, 5)).unwrap();
    assert_eq!(on_fifth.len(), 2);
    assert!(db.invoices_on(date(2024, 6, 2)).unwrap().is_empty());
}

#[test]
fn test_purchase_dates_and_modes_round_trip() {
    let (_temp, _path, mut db) = setup_db(4);
    let stored = db
        .insert_invoice(&sample_invoice("1 Main St", date(2024, 3, 10)))
        .unwrap();

    let invoice = db.invoice(stored.id).unwrap().unwrap();
    let purchases = &invoice.groups[1].purchases;

    assert_eq!(purchases[0].date_mode, DateMode::Range);
    assert_eq!(purchases[0].from, Some(date(2024, 3, 1)));
    assert_eq!(purchases[0].to, Some(date(2024, 3, 5)));
    assert_eq!(purchases[1].date_mode, DateMode::Single);
    assert_eq!(purchases[1].to, None);
    assert_eq!(invoice.groups[0].purchases[0].date_mode, DateMode::Disabled);
}

#[test]
fn test_invoice_totals() {
    let invoice = sample_invoice("1 Main St", date(2024, 3, 10));

    // 120 + 4 * 45.5 + 2 * 30 + 2 * 120
    assert_eq!(invoice.net_total(), 602.0);
    assert!((invoice.gross_total() - (602.0 + 542.0 * 0.21)).abs() < 1e-9);
}

// =============================================================================
// Remove and Replace Tests
// =============================================================================

#[test]
fn test_remove_invoice_cascades() {
    let (_temp, _path, mut db) = setup_db(3);
    let first = db
        .insert_invoice(&sample_invoice("first", date(2024, 1, 1)))
        .unwrap();
    let second = db
        .insert_invoice(&sample_invoice("second", date(2024, 1, 2)))
        .unwrap();

    assert!(db.remove_invoice(first.id).unwrap());
    assert!(!db.remove_invoice(first.id).unwrap());

    assert_eq!(db.invoice(first.id).unwrap(), None);
    assert_eq!(db.invoice(second.id).unwrap(), Some(second));
    assert_eq!(db.invoice_count(), 1);

    // Children of the removed invoice are gone, shared rows stay
    let stats = db.stats().unwrap();
    let records = |name: &str| stats.tables.iter().find(|t| t.table == name).unwrap().records;
    assert_eq!(records("purchase_groups"), 2);
    assert_eq!(records("purchases"), 4);
    assert_eq!(records("client_group_relation"), 2);
    assert_eq!(records("clients"), 3);
    db.test_data_corrupted().unwrap();
}

#[test]
fn test_replace_invoice_keeps_id() {
    let (_temp, _path, mut db) = setup_db(4);
    let stored = db
        .insert_invoice(&sample_invoice("old", date(2024, 1, 1)))
        .unwrap();

    let mut changed = Invoice::new("new", date(2024, 2, 1)).with_group(
        PurchaseGroup::new(vec![Client::new("Dave")])
            .with_purchase(Purchase::new(Item::new("Lamp", 15.0, 0.1), 3)),
    );
    changed.id = stored.id;
    changed.pdf_filename = Some("invoice-1.pdf".to_string());

    let replaced = db.replace_invoice(&changed).unwrap();
    assert_eq!(replaced.id, stored.id);
    assert_same_content(&replaced, &changed);

    assert_eq!(db.invoice(stored.id).unwrap(), Some(replaced));
    assert_eq!(db.invoice_count(), 1);
    db.test_data_corrupted().unwrap();

    // The next fresh invoice does not collide
    let next = db.insert_invoice(&sample_invoice("next", date(2024, 3, 1))).unwrap();
    assert_eq!(next.id, stored.id + 1);
}

#[test]
fn test_replace_missing_invoice() {
    let (_temp, _path, mut db) = setup_db(4);
    let mut invoice = sample_invoice("x", date(2024, 1, 1));
    invoice.id = 42;

    let err = db.replace_invoice(&invoice).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { id: 42, .. }));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_flush_and_reopen() {
    let (_temp, path, mut db) = setup_db(3);
    let mut expected = Vec::new();
    for d in 1..=6 {
        expected.push(
            db.insert_invoice(&sample_invoice(&format!("Street {}", d), date(2024, 4, d)))
                .unwrap(),
        );
    }
    db.flush().unwrap();
    assert!(!db.is_dirty());
    drop(db);

    let mut db = Database::open(config(&path, 3)).unwrap();
    expected.reverse();
    assert_eq!(db.invoices().unwrap(), expected);
    assert_eq!(db.invoice_count(), 6);

    let page = PropertyPage::load(path.join("metadata.properties")).unwrap();
    assert_eq!(page.get_i64(INVOICE_COUNT_KEY).unwrap(), Some(6));
    assert_eq!(page.get_i64("invoices.max_id").unwrap(), Some(6));
    db.test_data_corrupted().unwrap();
}

#[test]
fn test_unflushed_batch_is_lost_cleanly() {
    let (_temp, path, mut db) = setup_db(4);
    db.insert_invoice(&sample_invoice("kept", date(2024, 1, 1)))
        .unwrap();
    db.flush().unwrap();
    db.insert_invoice(&sample_invoice("lost", date(2024, 1, 2)))
        .unwrap();
    drop(db);

    let mut db = Database::open(config(&path, 4)).unwrap();
    let invoices = db.invoices().unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].address, "kept");
    db.test_data_corrupted().unwrap();
}

#[test]
fn test_reload_discards_unflushed() {
    let (_temp, _path, mut db) = setup_db(4);
    db.insert_invoice(&sample_invoice("kept", date(2024, 1, 1)))
        .unwrap();
    db.flush().unwrap();
    db.insert_invoice(&sample_invoice("dropped", date(2024, 1, 2)))
        .unwrap();

    db.reload().unwrap();

    assert_eq!(db.invoice_count(), 1);
    assert_eq!(db.invoices().unwrap().len(), 1);
    // The dropped invoice's id is free again
    let next = db.insert_invoice(&sample_invoice("again", date(2024, 1, 3))).unwrap();
    assert_eq!(next.id, 2);
}

#[test]
fn test_repartition_preserves_content() {
    let (_temp, path, mut db) = setup_db(2);
    for d in 1..=5 {
        db.insert_invoice(&sample_invoice(&format!("Street {}", d), date(2024, 5, d)))
            .unwrap();
    }
    db.remove_invoice(2).unwrap();
    db.remove_invoice(4).unwrap();
    let before = db.invoices().unwrap();

    db.repartition().unwrap();

    assert_eq!(db.invoices().unwrap(), before);
    let mut reopened = Database::open(config(&path, 2)).unwrap();
    assert_eq!(reopened.invoices().unwrap(), before);
    reopened.test_data_corrupted().unwrap();
}

// =============================================================================
// Integrity Tests
// =============================================================================

#[test]
fn test_missing_counters_self_heal() {
    let (_temp, path, mut db) = setup_db(4);
    db.insert_invoice(&sample_invoice("a", date(2024, 1, 1)))
        .unwrap();
    db.insert_invoice(&sample_invoice("b", date(2024, 1, 2)))
        .unwrap();
    db.flush().unwrap();
    drop(db);

    fs::remove_file(path.join("metadata.properties")).unwrap();

    let mut db = Database::open(config(&path, 4)).unwrap();
    assert_eq!(db.invoice_count(), 2);
    db.test_data_corrupted().unwrap();
    let next = db.insert_invoice(&sample_invoice("c", date(2024, 1, 3))).unwrap();
    assert_eq!(next.id, 3);
}

#[test]
fn test_count_mismatch_detected() {
    let (_temp, path, mut db) = setup_db(4);
    db.insert_invoice(&sample_invoice("a", date(2024, 1, 1)))
        .unwrap();
    db.flush().unwrap();
    drop(db);

    let file = path.join("metadata.properties");
    let mut page = PropertyPage::load(&file).unwrap();
    page.set_i64(INVOICE_COUNT_KEY, 5);
    page.save().unwrap();

    let mut db = Database::open(config(&path, 4)).unwrap();
    assert!(db.test_data_corrupted().unwrap_err().is_data_corrupted());
}

#[test]
fn test_counter_behind_table_detected() {
    let (_temp, path, mut db) = setup_db(4);
    db.insert_invoice(&sample_invoice("a", date(2024, 1, 1)))
        .unwrap();
    db.flush().unwrap();
    drop(db);

    let file = path.join("metadata.properties");
    let mut page = PropertyPage::load(&file).unwrap();
    page.set_i64("clients.max_id", 1);
    page.save().unwrap();

    let mut db = Database::open(config(&path, 4)).unwrap();
    assert!(db.test_data_corrupted().unwrap_err().is_data_corrupted());
}

#[test]
fn test_missing_child_rows_fail_read() {
    let (_temp, path, mut db) = setup_db(100);
    db.insert_invoice(&sample_invoice("a", date(2024, 1, 1)))
        .unwrap();
    db.flush().unwrap();
    drop(db);

    // Lose every purchase row
    fs::remove_file(path.join("purchases_0.part")).unwrap();

    let mut db = Database::open(config(&path, 100)).unwrap();
    assert!(db.invoice(1).unwrap_err().is_data_corrupted());
    assert!(db.invoices().unwrap_err().is_data_corrupted());
    assert!(db.test_data_corrupted().unwrap_err().is_data_corrupted());
}

#[test]
fn test_missing_item_fails_read() {
    let (_temp, path, mut db) = setup_db(100);
    db.insert_invoice(&sample_invoice("a", date(2024, 1, 1)))
        .unwrap();
    db.flush().unwrap();
    drop(db);

    fs::remove_file(path.join("items_0.part")).unwrap();

    let mut db = Database::open(config(&path, 100)).unwrap();
    assert!(db.invoice(1).unwrap_err().is_data_corrupted());
}
