//! Test tagged trees: identifier uniqueness, lookup and removal.

use crate::e2e_tests::helpers::{assert_empty_tree, assert_identifier_index, new_tagged};
use crate::storage::{Backend, NodeKey, RecordKey};
use crate::tree::TreeError;

#[test]
fn test_reused_identifier_replaces_entry() {
    let (backend, mut tree) = new_tagged::<i64, String>(2);
    tree.insert(1, "a".to_string(), "x").unwrap();
    tree.insert(2, "b".to_string(), "y").unwrap();
    tree.insert(5, "c".to_string(), "x").unwrap();

    assert_eq!(
        tree.items().unwrap(),
        vec![
            (2, "b".to_string(), "y".to_string()),
            (5, "c".to_string(), "x".to_string()),
        ]
    );
    assert_eq!(
        tree.get_by_identifier("x").unwrap(),
        Some((5, "c".to_string(), "x".to_string()))
    );
    assert_identifier_index(&backend, &tree);
}

#[test]
fn test_empty_identifier_is_rejected() {
    let (backend, mut tree) = new_tagged::<i64, String>(2);
    let err = tree.insert(1, "a".to_string(), "").unwrap_err();
    assert!(matches!(err, TreeError::InvalidIdentifier(_)));
    assert_empty_tree(&backend, "test");
}

#[test]
fn test_repeated_identifier_in_one_update_last_wins() {
    let (backend, mut tree) = new_tagged::<i64, i64>(2);
    tree.update(vec![
        (1, 10, "same".to_string()),
        (2, 20, "other".to_string()),
        (3, 30, "same".to_string()),
        (0, 40, "same".to_string()),
    ])
    .unwrap();

    assert_eq!(tree.tree_size().unwrap(), 2);
    assert_eq!(
        tree.get_by_identifier("same").unwrap(),
        Some((0, 40, "same".to_string()))
    );
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);
}

#[test]
fn test_updates_with_same_identifiers_twice() {
    let (backend, mut tree) = new_tagged::<String, i64>(2);
    let ids: Vec<String> = (0..12).map(|x| format!("id-{x}")).collect();

    tree.update(ids.iter().enumerate().map(|(x, id)| ("abc".to_string(), i64::try_from(x).unwrap(), id.clone())))
        .unwrap();
    tree.update(ids.iter().enumerate().map(|(x, id)| ("abc".to_string(), i64::try_from(x).unwrap() + 100, id.clone())))
        .unwrap();
    assert_eq!(tree.tree_size().unwrap(), 12);
    assert_eq!(tree.count(&"abc".to_string()).unwrap(), 12);
    assert_identifier_index(&backend, &tree);

    tree.update(ids.iter().map(|id| ("def".to_string(), 0, id.clone())))
        .unwrap();
    assert_eq!(tree.count(&"abc".to_string()).unwrap(), 0);
    assert_eq!(tree.count(&"def".to_string()).unwrap(), 12);
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);
}

#[test]
fn test_remove_all_then_insert_in_one_batch() {
    let (backend, mut tree) = new_tagged::<i64, i64>(2);
    tree.update((0..20).map(|x| (x % 2, x, format!("id-{x}")))).unwrap();

    tree.perform_in_batch(|batch| {
        let removed = batch.remove_all(&1)?;
        assert_eq!(removed.len(), 10);
        batch.insert(1, 99, "id-1")?;
        batch.insert(7, 77, "id-0")?;
        Ok(())
    })
    .unwrap();

    assert_eq!(tree.count(&1).unwrap(), 1);
    assert_eq!(tree.count(&0).unwrap(), 9);
    assert_eq!(tree.get_by_identifier("id-1").unwrap(), Some((1, 99, "id-1".to_string())));
    assert_eq!(tree.get_by_identifier("id-0").unwrap(), Some((7, 77, "id-0".to_string())));
    assert_eq!(tree.get_by_identifier("id-3").unwrap(), None);
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);
}

#[test]
fn test_identifier_lookups_inside_a_batch() {
    let (backend, mut tree) = new_tagged::<i64, String>(3);
    tree.update((0..30).map(|x| (x, "v".to_string(), x.to_string()))).unwrap();

    tree.perform_in_batch(|batch| {
        // Moving an identifier to a new key within the batch.
        batch.insert(100, "v".to_string(), "15")?;
        assert_eq!(batch.get_by_identifier("15")?, Some((100, "v".to_string(), "15".to_string())));
        batch.insert(0, "v2".to_string(), "15")?;
        assert_eq!(batch.get_by_identifier("15")?, Some((0, "v2".to_string(), "15".to_string())));

        assert_eq!(batch.remove_by_identifier("7")?, Some((7, "v".to_string(), "7".to_string())));
        assert_eq!(batch.get_by_identifier("7")?, None);
        assert_eq!(batch.remove_by_identifier("7")?, None);
        assert_eq!(batch.count(&0)?, 2);
        Ok(())
    })
    .unwrap();

    assert_eq!(tree.tree_size().unwrap(), 29);
    assert_eq!(tree.index_right(&0).unwrap(), 2);
    assert!(!tree.contains(&15).unwrap());
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);
}

#[test]
fn test_removed_identifier_can_be_reused_in_next_batch() {
    let (backend, mut tree) = new_tagged::<i64, i64>(2);
    tree.update((0..10).map(|x| (x, x, format!("id-{x}")))).unwrap();
    assert_eq!(tree.remove_by_identifier("id-4").unwrap(), Some((4, 4, "id-4".to_string())));

    tree.perform_in_batch(|batch| {
        assert_eq!(batch.get_by_identifier("id-4")?, None);
        batch.insert(40, 40, "id-4")?;
        assert_eq!(batch.get_by_identifier("id-4")?, Some((40, 40, "id-4".to_string())));
        Ok(())
    })
    .unwrap();

    assert_eq!(tree.get_by_identifier("id-4").unwrap(), Some((40, 40, "id-4".to_string())));
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);
}

#[test]
fn test_remove_by_identifier_through_rebalancing() {
    let (backend, mut tree) = new_tagged::<i64, i64>(5);
    for x in (0..25).rev() {
        tree.insert(x, x, x.to_string()).unwrap();
        tree.insert(x, x + 50, (x + 50).to_string()).unwrap();
    }
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);

    let removals = [
        "3", "53", "1", "14", "64", "13", "63", "60", "9", "59", "4", "54", "0", "6", "2", "7", "8",
    ];
    for identifier in removals {
        let (key, value, id) = tree.remove_by_identifier(identifier).unwrap().unwrap();
        assert_eq!(id, identifier);
        assert_eq!(value.to_string(), identifier);
        assert_eq!(key, value % 50);
        tree.verify().unwrap();
        assert_identifier_index(&backend, &tree);
    }
    assert_eq!(tree.tree_size().unwrap(), 50 - removals.len());

    let remaining: Vec<String> = tree.items().unwrap().into_iter().map(|(_, _, id)| id).collect();
    tree.perform_in_batch(|batch| {
        for identifier in &remaining {
            assert!(batch.remove_by_identifier(identifier)?.is_some());
        }
        Ok(())
    })
    .unwrap();
    assert_eq!(tree.tree_size().unwrap(), 0);
    assert_empty_tree(&backend, "test");
}

#[test]
fn test_identifiers_survive_structural_changes() {
    let (backend, mut tree) = new_tagged::<i64, i64>(2);
    for x in 0..80 {
        tree.insert((x * 37) % 23, x, format!("e{x}")).unwrap();
    }
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);

    for index in [0, 40, 10, 10, 60, 3, 33, 20] {
        let (_, value, identifier) = tree.pop(index).unwrap();
        assert_eq!(identifier, format!("e{value}"));
        assert_eq!(tree.get_by_identifier(&identifier).unwrap(), None);
    }
    tree.verify().unwrap();
    assert_identifier_index(&backend, &tree);
}

#[test]
fn test_stored_entry_without_identifier_is_corruption() {
    let (backend, mut tree) = new_tagged::<i64, i64>(2);
    tree.insert(1, 10, "a").unwrap();

    // Rewrite the root as if its identifiers had been lost.
    backend
        .write_many(
            "test",
            vec![(
                RecordKey::Node(NodeKey::Root),
                br#"{"aid":1,"k":[1],"v":[10]}"#.to_vec(),
            )],
        )
        .unwrap();

    assert!(matches!(tree.get_by_index(0), Err(TreeError::Corruption(_))));
    assert!(matches!(tree.items(), Err(TreeError::Corruption(_))));
    assert!(matches!(tree.pop(0), Err(TreeError::Corruption(_))));
    assert_eq!(tree.tree_size().unwrap(), 1);
}
