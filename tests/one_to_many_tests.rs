// ==================== Owned Table (One-to-Many) Tests ====================

mod common;

use colpersist_core::{
    CollectionDescriptor, CollectionClassification, CollectionKind, CollectionPersister,
    CollectionState, Column, Entry, IdentifierGenerator, InMemoryDatabase, Navigable,
    NavigableRole, SqlValue, StatementCompiler, StorageStrategy, Table, ValueType,
};
use common::{column, rows_where, seed, setup};
use serde_json::json;
use std::sync::Arc;

fn seed_orders(db: &mut InMemoryDatabase, ids: &[i64]) {
    for id in ids {
        seed(db, "orders", &[&[("id", SqlValue::Integer(*id))]]);
    }
}

fn owners(db: &InMemoryDatabase) -> Vec<serde_json::Value> {
    column(db, "orders", "customer_id")
}

#[test]
fn test_create_attaches_existing_rows() {
    let (registry, mut db) = setup();
    let orders = registry.get("Customer.orders").unwrap();
    seed_orders(&mut db, &[10, 11, 12]);

    let mut state = CollectionState::new(CollectionKind::Bag, Some(json!(5)));
    state.add(json!(10)).unwrap();
    state.add(json!(11)).unwrap();
    let stats = orders.flush(&mut state, None, &mut db).unwrap();

    assert_eq!(stats.inserted, 2);
    let log = db.statement_log();
    assert_eq!(log[0].sql, "update orders set customer_id=? where id=?");
    assert_eq!(log[0].params, vec![SqlValue::Integer(5), SqlValue::Integer(10)]);
    assert_eq!(owners(&db), vec![json!(5), json!(5), serde_json::Value::Null]);
    assert_eq!(orders.size(&json!(5), &mut db).unwrap(), 2);
}

#[test]
fn test_removed_element_is_detached_not_deleted() {
    let (registry, mut db) = setup();
    let orders = registry.get("Customer.orders").unwrap();
    seed_orders(&mut db, &[10, 11, 12]);

    let mut state = CollectionState::new(CollectionKind::Bag, Some(json!(5)));
    state.add(json!(10)).unwrap();
    state.add(json!(11)).unwrap();
    orders.flush(&mut state, None, &mut db).unwrap();
    db.clear_log();

    state.remove_element(&json!(10)).unwrap();
    state.add(json!(12)).unwrap();
    let stats = orders.flush(&mut state, None, &mut db).unwrap();

    assert!(!stats.recreated);
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.detached, 1);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.inserted, 1);
    let log = db.statement_log();
    assert_eq!(log[0].sql, "update orders set customer_id=null where customer_id=? and id=?");
    assert_eq!(log[0].params, vec![SqlValue::Integer(5), SqlValue::Integer(10)]);
    assert_eq!(db.rows("orders").unwrap().len(), 3);
    assert_eq!(owners(&db), vec![serde_json::Value::Null, json!(5), json!(5)]);
}

#[test]
fn test_remove_clears_foreign_keys() {
    let (registry, mut db) = setup();
    let orders = registry.get("Customer.orders").unwrap();
    seed(
        &mut db,
        "orders",
        &[
            &[("id", SqlValue::Integer(10)), ("customer_id", SqlValue::Integer(5))],
            &[("id", SqlValue::Integer(11)), ("customer_id", SqlValue::Integer(5))],
            &[("id", SqlValue::Integer(12)), ("customer_id", SqlValue::Integer(6))],
        ],
    );

    let affected = orders.remove(&json!(5), &mut db).unwrap();

    assert_eq!(affected, 2);
    assert_eq!(
        db.statement_log()[0].sql,
        "update orders set customer_id=null where customer_id=?"
    );
    assert_eq!(owners(&db), vec![serde_json::Value::Null, serde_json::Value::Null, json!(6)]);
}

#[test]
fn test_row_delete_is_unsupported() {
    let (registry, mut db) = setup();
    let orders = registry.get("Customer.orders").unwrap();

    let state = CollectionState::loaded(CollectionKind::Bag, json!(5), vec![Entry::element(json!(10))]);
    let err = orders.delete_rows(&state, None, &mut db).unwrap_err();
    assert!(err.is_unsupported());
    assert!(db.statement_log().is_empty());
    assert!(!orders.unsupported_operations().is_empty());
}

#[test]
fn test_owned_list_positions_follow_removal() {
    let (registry, mut db) = setup();
    let addresses = registry.get("Customer.addresses").unwrap();
    for id in [20, 21, 22] {
        seed(&mut db, "addresses", &[&[("id", SqlValue::Integer(id))]]);
    }

    let mut state = CollectionState::new(CollectionKind::List, Some(json!(5)));
    for id in [20, 21, 22] {
        state.add(json!(id)).unwrap();
    }
    addresses.flush(&mut state, None, &mut db).unwrap();
    assert_eq!(
        db.statement_log()[0].sql,
        "update addresses set customer_id=?, pos=? where id=?"
    );
    assert_eq!(
        rows_where(&db, "addresses", "customer_id", SqlValue::Integer(5), &["id", "pos"]),
        vec![
            vec![json!(20), json!(0)],
            vec![json!(21), json!(1)],
            vec![json!(22), json!(2)],
        ]
    );

    state.remove_at(0).unwrap();
    let stats = addresses.flush(&mut state, None, &mut db).unwrap();

    // the dropped tail row and both shifted rows are detached, then the
    // shifted rows are attached again at their new positions
    assert_eq!((stats.detached, stats.updated, stats.inserted), (3, 2, 0));

    assert_eq!(
        rows_where(&db, "addresses", "customer_id", SqlValue::Integer(5), &["id", "pos"]),
        vec![vec![json!(21), json!(0)], vec![json!(22), json!(1)]]
    );
    assert_eq!(
        rows_where(&db, "addresses", "id", SqlValue::Integer(20), &["customer_id", "pos"]),
        vec![vec![serde_json::Value::Null, serde_json::Value::Null]]
    );
    assert_eq!(addresses.size(&json!(5), &mut db).unwrap(), 2);
}

fn owned_descriptor(insert: bool, delete: bool) -> CollectionDescriptor {
    let table = Table::new("orders").unwrap();
    CollectionDescriptor::builder("Customer.orders", CollectionClassification::Bag, table.clone())
        .storage(StorageStrategy::OwnedTable)
        .key(Navigable::basic(
            NavigableRole::Key,
            Column::physical(&table, "customer_id").unwrap(),
            ValueType::Integer,
        ))
        .element(Navigable::basic(
            NavigableRole::Element,
            Column::physical(&table, "id").unwrap(),
            ValueType::Integer,
        ))
        .row_insert_enabled(insert)
        .row_delete_enabled(delete)
        .build()
        .unwrap()
}

#[test]
fn test_disabled_row_inserts_write_nothing() {
    let persister =
        CollectionPersister::new(Arc::new(owned_descriptor(false, true)), &StatementCompiler::default()).unwrap();
    let mut db = common::create_database();
    seed_orders(&mut db, &[10]);

    let mut state = CollectionState::new(CollectionKind::Bag, Some(json!(5)));
    state.add(json!(10)).unwrap();
    let stats = persister.flush(&mut state, None, &mut db).unwrap();

    assert_eq!(stats.inserted, 0);
    assert!(db.statement_log().is_empty());
}

#[test]
fn test_disabled_row_deletes_keep_foreign_keys() {
    let persister =
        CollectionPersister::new(Arc::new(owned_descriptor(true, false)), &StatementCompiler::default()).unwrap();
    let mut db = common::create_database();
    seed(
        &mut db,
        "orders",
        &[&[("id", SqlValue::Integer(10)), ("customer_id", SqlValue::Integer(5))]],
    );

    assert_eq!(persister.remove(&json!(5), &mut db).unwrap(), 0);
    let mut state = CollectionState::loaded(CollectionKind::Bag, json!(5), vec![Entry::element(json!(10))]);
    state.remove_element(&json!(10)).unwrap();
    persister.flush(&mut state, None, &mut db).unwrap();

    assert_eq!(owners(&db), vec![json!(5)]);
}

#[test]
fn test_owned_table_with_identifier_reports_unsupported() {
    let table = Table::new("orders").unwrap();
    let descriptor = CollectionDescriptor::builder("Customer.orders", CollectionClassification::Bag, table.clone())
        .storage(StorageStrategy::OwnedTable)
        .key(Navigable::basic(
            NavigableRole::Key,
            Column::physical(&table, "customer_id").unwrap(),
            ValueType::Integer,
        ))
        .element(Navigable::basic(
            NavigableRole::Element,
            Column::physical(&table, "id").unwrap(),
            ValueType::Integer,
        ))
        .identifier(
            Navigable::basic(
                NavigableRole::Identifier,
                Column::physical(&table, "link_id").unwrap(),
                ValueType::Integer,
            ),
            IdentifierGenerator::increment_from(1),
        )
        .build()
        .unwrap();
    let persister = CollectionPersister::new(Arc::new(descriptor), &StatementCompiler::default()).unwrap();
    assert!(!persister.unsupported_operations().is_empty());

    let mut db = common::create_database();
    let mut state = CollectionState::new(CollectionKind::IdBag, Some(json!(5)));
    state.add(json!(10)).unwrap();
    let err = persister.flush(&mut state, None, &mut db).unwrap_err();
    assert!(err.is_unsupported());
    assert!(db.statement_log().is_empty());
}
