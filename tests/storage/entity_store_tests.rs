//! EntityStore interface tests.
//!
//! These tests verify the contract of the EntityStore trait.
//! Each storage implementation should run these tests. Tests share one store,
//! so assertions are relative to what was there before.

use uuid::Uuid;

use formbus::entities::{CreatePrison, FormEntity, Prison};
use formbus::storage::{EntityStore, StorageError};

/// Create a test prison with the given id and name.
pub fn make_prison(id: Uuid, name_ru: &str) -> Prison {
    Prison::from_create(
        id,
        CreatePrison {
            name_ru: name_ru.to_string(),
            name_ua: "Б".to_string(),
            subject: "X".to_string(),
            object_type: "Y".to_string(),
            lat: 1.0,
            lon: 2.0,
            address: "addr".to_string(),
            management: "m".to_string(),
            employees_count: 3,
            prisoners_count: 4,
            staff: "s".to_string(),
            contacts: "c".to_string(),
        },
    )
}

async fn count<S: EntityStore<Prison>>(store: &S) -> usize {
    store.list_all().await.expect("list should succeed").len()
}

// =============================================================================
// EntityStore::create tests
// =============================================================================

pub async fn test_create_single<S: EntityStore<Prison>>(store: &S) {
    let before = count(store).await;
    let id = Uuid::new_v4();

    store
        .create(make_prison(id, "single"))
        .await
        .expect("create should succeed");

    assert_eq!(count(store).await, before + 1, "should have one more entity");
}

pub async fn test_create_duplicate_id_is_integrity<S: EntityStore<Prison>>(store: &S) {
    let id = Uuid::new_v4();
    store
        .create(make_prison(id, "original"))
        .await
        .expect("first create should succeed");
    let before = count(store).await;

    let result = store.create(make_prison(id, "duplicate")).await;

    assert!(
        matches!(result, Err(StorageError::Integrity(_))),
        "duplicate id should be an integrity violation, got {:?}",
        result
    );
    assert_eq!(count(store).await, before, "no partial row should remain");
    let kept = store.get_by_id(id).await.expect("original should remain");
    assert_eq!(kept.name_ru, "original");
}

pub async fn test_create_allows_same_fields_with_new_id<S: EntityStore<Prison>>(store: &S) {
    let before = count(store).await;

    store
        .create(make_prison(Uuid::new_v4(), "twin"))
        .await
        .expect("first create should succeed");
    store
        .create(make_prison(Uuid::new_v4(), "twin"))
        .await
        .expect("second create should succeed");

    assert_eq!(count(store).await, before + 2);
}

// =============================================================================
// EntityStore::list_all / get_by_id tests
// =============================================================================

pub async fn test_list_contains_created<S: EntityStore<Prison>>(store: &S) {
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    for (i, id) in ids.iter().enumerate() {
        store
            .create(make_prison(*id, &format!("listed-{}", i)))
            .await
            .expect("create should succeed");
    }

    let all = store.list_all().await.expect("list should succeed");
    for id in &ids {
        assert!(all.iter().any(|p| p.id == *id), "list should contain {}", id);
    }
}

pub async fn test_get_preserves_fields<S: EntityStore<Prison>>(store: &S) {
    let id = Uuid::new_v4();
    let mut prison = make_prison(id, "Исправительная колония №1");
    prison.lat = 55.751244;
    prison.lon = -37.618423;
    prison.employees_count = i64::from(i32::MAX) + 1;
    prison.prisoners_count = 0;
    prison.contacts = "+7 (000) 000-00-00; mail@example.org".to_string();

    store
        .create(prison.clone())
        .await
        .expect("create should succeed");

    let fetched = store.get_by_id(id).await.expect("get should succeed");
    assert_eq!(fetched, prison);
    assert_eq!(fetched.id(), id);
}

pub async fn test_get_missing_is_not_found<S: EntityStore<Prison>>(store: &S) {
    let missing = Uuid::new_v4();

    let result = store.get_by_id(missing).await;

    assert!(
        matches!(result, Err(StorageError::NotFound(id)) if id == missing),
        "missing id should be NotFound, got {:?}",
        result
    );
}

/// Run all EntityStore tests against a store.
#[macro_export]
macro_rules! run_entity_store_tests {
    ($store:expr) => {
        use $crate::storage::entity_store_tests::*;

        // create tests
        test_create_single($store).await;
        println!("  test_create_single: PASSED");

        test_create_duplicate_id_is_integrity($store).await;
        println!("  test_create_duplicate_id_is_integrity: PASSED");

        test_create_allows_same_fields_with_new_id($store).await;
        println!("  test_create_allows_same_fields_with_new_id: PASSED");

        // read tests
        test_list_contains_created($store).await;
        println!("  test_list_contains_created: PASSED");

        test_get_preserves_fields($store).await;
        println!("  test_get_preserves_fields: PASSED");

        test_get_missing_is_not_found($store).await;
        println!("  test_get_missing_is_not_found: PASSED");
    };
}
