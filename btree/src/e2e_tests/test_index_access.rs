//! Test rank based access: by index, by range and index of a key.

use crate::e2e_tests::helpers::{new_set, new_tagged};
use crate::tree::TreeError;

#[test]
fn test_get_by_index_matches_sorted_order() {
    let (_backend, mut tree) = new_set::<i64, String>(2);
    tree.update((0..50).rev().map(|x| (x * 3, format!("v{x}")))).unwrap();

    for x in 0..50 {
        let index = usize::try_from(x).unwrap();
        assert_eq!(tree.get_by_index(index).unwrap(), (x * 3, format!("v{x}")));
        assert_eq!(tree.index(&(x * 3)).unwrap(), index);
    }
    assert!(matches!(
        tree.get_by_index(50),
        Err(TreeError::IndexOutOfRange { index: 50, size: 50 })
    ));
    assert!(matches!(tree.index(&1), Err(TreeError::KeyNotFound)));
}

#[test]
fn test_get_range_for_every_window() {
    for size in [0usize, 1, 2, 3, 5, 11, 17, 31, 50] {
        let (_backend, mut tree) = new_set::<usize, usize>(2);
        tree.update((0..size).map(|x| (x, x * x))).unwrap();
        let reference: Vec<(usize, usize)> = (0..size).map(|x| (x, x * x)).collect();

        for a in 0..=size {
            for b in a..=size + 1 {
                let expected = &reference[a..b.min(size)];
                assert_eq!(
                    tree.get_range(a, b).unwrap(),
                    expected,
                    "size {size}, range {a}..{b}"
                );
            }
        }
    }
}

#[test]
fn test_range_reads_stay_local() {
    let (backend, mut tree) = new_set::<u32, u32>(2);
    tree.update((0..500).map(|x| (x, x))).unwrap();

    backend.reset_stats();
    assert_eq!(tree.get_range(250, 253).unwrap(), vec![(250, 250), (251, 251), (252, 252)]);
    // A handful of nodes along one or two root-to-leaf paths, not the tree.
    assert!(backend.stats().records_read < 30);
}

#[test]
fn test_contains() {
    let (_backend, mut tree) = new_set::<i64, ()>(3);
    tree.update((0..40).filter(|x| x % 4 == 1).map(|x| (x, ()))).unwrap();

    for x in -5..45 {
        let inserted = (0..40).contains(&x) && x % 4 == 1;
        assert_eq!(tree.contains(&x).unwrap(), inserted, "key {x}");
    }
}

#[test]
fn test_index_left_and_right_of_duplicate_runs() {
    let (_backend, mut tree) = new_tagged::<usize, usize>(2);
    tree.update((0..50).map(|x| (x % 5, x, x.to_string()))).unwrap();
    tree.verify().unwrap();

    for key in 0..5 {
        assert_eq!(tree.count(&key).unwrap(), 10);
        assert_eq!(tree.index_left(&key).unwrap(), 10 * key);
        assert_eq!(tree.index_right(&key).unwrap(), 10 * key + 10);
    }
    assert_eq!(tree.count(&7).unwrap(), 0);
    assert!(matches!(tree.index_left(&7), Err(TreeError::KeyNotFound)));
    assert!(matches!(tree.index_right(&7), Err(TreeError::KeyNotFound)));

    // Within a run, entries keep their insertion order.
    let run: Vec<usize> = tree
        .get_all(&3)
        .unwrap()
        .into_iter()
        .map(|(_, value, _)| value)
        .collect();
    assert_eq!(run, (0..10).map(|x| x * 5 + 3).collect::<Vec<_>>());
}
