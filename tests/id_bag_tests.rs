// ==================== Identifier Bag Tests ====================

mod common;

use colpersist_core::{CollectionKind, CollectionState, Entry, PersistentCollection, SqlValue};
use common::{rows_where, seed, setup};
use serde_json::json;

fn stored(db: &colpersist_core::InMemoryDatabase) -> Vec<Vec<serde_json::Value>> {
    rows_where(db, "order_notes", "order_id", SqlValue::Integer(1), &["note_id", "note"])
}

#[test]
fn test_identifiers_are_generated_on_create() {
    let (registry, mut db) = setup();
    let notes = registry.get("Order.notes").unwrap();

    let mut state = CollectionState::new(CollectionKind::IdBag, Some(json!(1)));
    state.add(json!("fragile")).unwrap();
    state.add(json!("fragile")).unwrap();
    notes.flush(&mut state, None, &mut db).unwrap();

    assert_eq!(
        db.statement_log()[0].sql,
        "insert into order_notes (order_id, note_id, note) values (?, ?, ?)"
    );
    assert_eq!(
        stored(&db),
        vec![
            vec![json!(100), json!("fragile")],
            vec![json!(101), json!("fragile")],
        ]
    );
    let ids: Vec<_> = state
        .entries()
        .into_iter()
        .map(|e| state.identifier_for(e).cloned())
        .collect();
    assert_eq!(ids, vec![Some(json!(100)), Some(json!(101))]);
}

#[test]
fn test_duplicate_removed_by_identifier() {
    let (registry, mut db) = setup();
    let notes = registry.get("Order.notes").unwrap();
    seed(
        &mut db,
        "order_notes",
        &[
            &[
                ("order_id", SqlValue::Integer(1)),
                ("note_id", SqlValue::Integer(7)),
                ("note", "fragile".into()),
            ],
            &[
                ("order_id", SqlValue::Integer(1)),
                ("note_id", SqlValue::Integer(8)),
                ("note", "fragile".into()),
            ],
        ],
    );

    let mut state = CollectionState::loaded(
        CollectionKind::IdBag,
        json!(1),
        vec![
            Entry::identified(json!(7), json!("fragile")),
            Entry::identified(json!(8), json!("fragile")),
        ],
    );
    state.remove_element(&json!("fragile")).unwrap();
    state.add(json!("urgent")).unwrap();
    let stats = notes.flush(&mut state, None, &mut db).unwrap();

    // surrogate ids keep a bag addressable, so no recreate
    assert!(!stats.recreated);
    assert_eq!(stats.deleted, 1);
    assert_eq!(stats.inserted, 1);
    let log = db.statement_log();
    assert_eq!(log[0].sql, "delete from order_notes where note_id=?");
    assert_eq!(log[0].params, vec![SqlValue::Integer(7)]);
    assert_eq!(
        stored(&db),
        vec![
            vec![json!(8), json!("fragile")],
            vec![json!(100), json!("urgent")],
        ]
    );
}

#[test]
fn test_index_exists_uses_identifier() {
    let (registry, mut db) = setup();
    let notes = registry.get("Order.notes").unwrap();

    let mut state = CollectionState::new(CollectionKind::IdBag, Some(json!(1)));
    state.add(json!("fragile")).unwrap();
    notes.flush(&mut state, None, &mut db).unwrap();

    assert!(notes.index_exists(&json!(1), &json!(100), &mut db).unwrap());
    assert!(!notes.index_exists(&json!(1), &json!(101), &mut db).unwrap());
    assert!(!notes.index_exists(&json!(2), &json!(100), &mut db).unwrap());
    assert_eq!(notes.size(&json!(1), &mut db).unwrap(), 1);
}

#[test]
fn test_queued_additions_get_identifiers() {
    let (registry, mut db) = setup();
    let notes = registry.get("Order.notes").unwrap();

    let mut lazy = CollectionState::uninitialized(CollectionKind::IdBag, json!(1));
    lazy.queue_addition(json!("gift")).unwrap();
    let stats = notes.flush(&mut lazy, None, &mut db).unwrap();

    assert_eq!(stats.queued, 1);
    assert_eq!(stored(&db), vec![vec![json!(100), json!("gift")]]);
}
