//! Test inserts into set trees: splits, overwrites and key types.

use crate::e2e_tests::helpers::{keys_of, new_set};

#[test]
fn test_insert_fills_root_then_splits() {
    let (_backend, mut tree) = new_set::<i64, String>(5);
    for x in (0..9).rev() {
        tree.insert(x, x.to_string()).unwrap();
    }
    // A root with 2t - 1 entries is still a single leaf.
    assert_eq!(tree.summary().unwrap(), "tree size: 9\ndegree: 5\n\nNode(id: root, 9 items)");
    tree.verify().unwrap();

    tree.insert(9, "9".to_string()).unwrap();
    tree.verify().unwrap();
    let summary = tree.summary().unwrap();
    assert!(summary.starts_with("tree size: 10\ndegree: 5\n\nNode(id: root, 1 items)"));
    assert_eq!(keys_of(&tree.items().unwrap()), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_insert_shuffled_sequence() {
    let (_backend, mut tree) = new_set::<i64, String>(2);
    let sequence = [10, 8, 13, 11, 12, 2, 1, 14, 5, 0, 3, 7, 4, 9, 6];
    for x in sequence {
        tree.insert(x, format!("v{x}")).unwrap();
        tree.verify().unwrap();
    }

    let items = tree.items().unwrap();
    assert_eq!(keys_of(&items), (0..15).collect::<Vec<_>>());
    for (key, value) in items {
        assert_eq!(value, format!("v{key}"));
    }
}

#[test]
fn test_insert_existing_key_overwrites_value() {
    let (_backend, mut tree) = new_set::<i64, String>(2);
    tree.update((0..20).map(|x| (x, "old".to_string()))).unwrap();
    tree.update((0..20).step_by(3).map(|x| (x, "new".to_string())))
        .unwrap();

    assert_eq!(tree.tree_size().unwrap(), 20);
    for (key, value) in tree.items().unwrap() {
        let expected = if key % 3 == 0 { "new" } else { "old" };
        assert_eq!(value, expected, "key {key}");
    }
    tree.verify().unwrap();
}

#[test]
fn test_insert_zero_and_negative_keys() {
    let (_backend, mut tree) = new_set::<i64, i64>(3);
    for x in -20..20 {
        tree.insert(x * 7 % 40, x).unwrap();
    }
    let keys = keys_of(&tree.items().unwrap());
    let mut expected: Vec<i64> = (-20..20).map(|x| x * 7 % 40).collect();
    expected.sort_unstable();
    expected.dedup();
    assert_eq!(keys, expected);
    assert_eq!(tree.get_by_index(0).unwrap().0, expected[0]);
    assert_eq!(tree.index(&0).unwrap(), expected.iter().position(|&k| k == 0).unwrap());
    tree.verify().unwrap();
}

#[test]
fn test_string_and_tuple_keys() {
    let (_backend, mut tree) = new_set::<String, u32>(2);
    for word in ["pear", "apple", "fig", "banana", "cherry", "date", "elderberry"] {
        tree.insert(word.to_string(), u32::try_from(word.len()).unwrap())
            .unwrap();
    }
    assert_eq!(
        keys_of(&tree.items().unwrap()),
        vec!["apple", "banana", "cherry", "date", "elderberry", "fig", "pear"]
    );
    assert_eq!(tree.get(&"fig".to_string()).unwrap(), Some(("fig".to_string(), 3)));
    assert_eq!(tree.lower_bound(&"c".to_string()).unwrap(), 2);

    let (_backend, mut tree) = new_set::<(u32, String), bool>(2);
    tree.insert((2, "b".to_string()), true).unwrap();
    tree.insert((1, "z".to_string()), false).unwrap();
    tree.insert((2, "a".to_string()), true).unwrap();
    assert_eq!(
        keys_of(&tree.items().unwrap()),
        vec![(1, "z".to_string()), (2, "a".to_string()), (2, "b".to_string())]
    );
}

#[test]
fn test_batched_inserts_read_fewer_records() {
    let (backend, mut tree) = new_set::<u32, u32>(3);
    backend.reset_stats();
    for x in 0..50 {
        tree.insert(x, x).unwrap();
    }
    let one_by_one = backend.stats();

    let (backend, mut tree) = new_set::<u32, u32>(3);
    backend.reset_stats();
    tree.update((0..50).map(|x| (x, x))).unwrap();
    let batched = backend.stats();

    assert_eq!(batched.commits, 1);
    assert_eq!(one_by_one.commits, 50);
    assert!(batched.read_calls < one_by_one.read_calls);
    assert!(batched.records_written < one_by_one.records_written);
}
