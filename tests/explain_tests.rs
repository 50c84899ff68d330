// ==================== Explain Output Tests ====================

mod common;

use colpersist::{explain, render_text, MappingError};
use colpersist_core::{Clause, CollectionOperation, RowIdentity, SizeStrategy};
use common::create_registry;

#[test]
fn test_every_role_explains() {
    let registry = create_registry();
    let explained = explain(&registry, None).unwrap();

    assert_eq!(explained.len(), registry.len());
    for collection in &explained {
        assert!(
            collection
                .statements
                .iter()
                .any(|s| s.operation == CollectionOperation::DeleteAll),
            "{} has no delete-all",
            collection.role
        );
        let mut operations: Vec<_> = collection.statements.iter().map(|s| s.operation).collect();
        let total = operations.len();
        operations.dedup();
        assert_eq!(operations.len(), total);
    }
}

#[test]
fn test_row_identity_per_role() {
    let registry = create_registry();
    let identity = |role: &str| explain(&registry, Some(role)).unwrap()[0].row_identity;

    assert_eq!(identity("Order.tags"), RowIdentity::KeyAndElement);
    assert_eq!(identity("Order.lines"), RowIdentity::KeyAndIndex);
    assert_eq!(identity("Order.attributes"), RowIdentity::KeyAndIndex);
    assert_eq!(identity("Order.notes"), RowIdentity::SurrogateId);
}

#[test]
fn test_owned_table_statements() {
    let registry = create_registry();
    let explained = explain(&registry, Some("Customer.addresses")).unwrap();
    let addresses = &explained[0];

    assert_eq!(addresses.size_strategy, SizeStrategy::MaxIndex);
    assert!(addresses
        .unsupported
        .iter()
        .any(|reason| reason.contains("deleting single rows")));

    let detach = addresses
        .statements
        .iter()
        .find(|s| s.operation == CollectionOperation::DetachRow)
        .unwrap();
    assert_eq!(
        detach.sql,
        "update addresses set customer_id=null, pos=null where customer_id=? and id=?"
    );
    assert!(detach.parameters.iter().all(|p| p.clause == Clause::Restriction));

    let text = render_text(&explained);
    assert!(text.contains("unsupported: Customer.addresses: deleting single rows"));
}

#[test]
fn test_unknown_role() {
    let registry = create_registry();
    assert!(matches!(
        explain(&registry, Some("Order.missing")),
        Err(MappingError::UnknownRole(_))
    ));
}
