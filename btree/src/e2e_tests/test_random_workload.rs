//! Seeded random workloads checked against simple in-memory references.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::{
    assert_empty_tree, assert_identifier_index, bisect_left, bisect_right, new_multi, new_set,
    new_tagged,
};

const STEPS: usize = 400;

#[test]
fn test_random_set_workload() {
    for (seed, degree) in [(1, 2), (2, 3), (3, 5)] {
        let mut rng = StdRng::seed_from_u64(seed);
        let (backend, mut tree) = new_set::<i32, usize>(degree);
        let mut reference = BTreeMap::new();

        for step in 0..STEPS {
            match rng.random_range(0..10_u32) {
                0..=5 => {
                    let key = rng.random_range(-100..100);
                    tree.insert(key, step).unwrap();
                    reference.insert(key, step);
                }
                6 | 7 => {
                    let key = rng.random_range(-100..100);
                    assert_eq!(
                        tree.remove(&key).unwrap(),
                        reference.remove(&key).map(|value| (key, value))
                    );
                }
                _ if !reference.is_empty() => {
                    let index = rng.random_range(0..reference.len());
                    let key = *reference.keys().nth(index).unwrap();
                    let value = reference.remove(&key).unwrap();
                    assert_eq!(tree.pop(index).unwrap(), (key, value));
                }
                _ => {}
            }
            if step % 25 == 0 {
                tree.verify().unwrap();
                assert_eq!(tree.tree_size().unwrap(), reference.len());
            }
        }

        tree.verify().unwrap();
        let expected: Vec<(i32, usize)> = reference.iter().map(|(&k, &v)| (k, v)).collect();
        assert_eq!(tree.items().unwrap(), expected);

        for key in reference.keys() {
            tree.remove(key).unwrap();
        }
        assert_empty_tree(&backend, "test");
    }
}

#[test]
fn test_random_multi_workload() {
    for (seed, degree) in [(11, 2), (12, 4)] {
        let mut rng = StdRng::seed_from_u64(seed);
        let (_backend, mut tree) = new_multi::<i32, usize>(degree);
        let mut reference: Vec<(i32, usize)> = Vec::new();

        for step in 0..STEPS {
            match rng.random_range(0..10_u32) {
                0..=6 => {
                    let key = rng.random_range(0..30);
                    tree.insert(key, step).unwrap();
                    let keys: Vec<i32> = reference.iter().map(|(k, _)| *k).collect();
                    reference.insert(bisect_right(&keys, &key), (key, step));
                }
                7 => {
                    let key = rng.random_range(0..30);
                    let keys: Vec<i32> = reference.iter().map(|(k, _)| *k).collect();
                    let expected: Vec<(i32, usize)> = reference
                        .drain(bisect_left(&keys, &key)..bisect_right(&keys, &key))
                        .collect();
                    assert_eq!(tree.remove_all(&key).unwrap(), expected);
                }
                _ if !reference.is_empty() => {
                    let index = rng.random_range(0..reference.len());
                    assert_eq!(tree.pop(index).unwrap(), reference.remove(index));
                }
                _ => {}
            }
            if step % 25 == 0 {
                tree.verify().unwrap();
                assert_eq!(tree.items().unwrap(), reference);
            }
        }
        tree.verify().unwrap();
        assert_eq!(tree.items().unwrap(), reference);
    }
}

#[test]
fn test_random_tagged_workload() {
    for (seed, degree) in [(21, 2), (22, 3)] {
        let mut rng = StdRng::seed_from_u64(seed);
        let (backend, mut tree) = new_tagged::<i32, usize>(degree);
        let mut reference: Vec<(i32, usize, String)> = Vec::new();

        for step in 0..STEPS {
            match rng.random_range(0..10_u32) {
                0..=5 => {
                    let key = rng.random_range(0..20);
                    let identifier = format!("id-{}", rng.random_range(0..80_u32));
                    tree.insert(key, step, identifier.clone()).unwrap();

                    reference.retain(|(_, _, id)| *id != identifier);
                    let keys: Vec<i32> = reference.iter().map(|(k, _, _)| *k).collect();
                    reference.insert(bisect_right(&keys, &key), (key, step, identifier));
                }
                6 | 7 => {
                    let identifier = format!("id-{}", rng.random_range(0..80_u32));
                    let position = reference.iter().position(|(_, _, id)| *id == identifier);
                    assert_eq!(
                        tree.remove_by_identifier(&identifier).unwrap(),
                        position.map(|position| reference.remove(position))
                    );
                }
                _ if !reference.is_empty() => {
                    let index = rng.random_range(0..reference.len());
                    assert_eq!(tree.pop(index).unwrap(), reference.remove(index));
                }
                _ => {}
            }
            if step % 40 == 0 {
                tree.verify().unwrap();
                assert_identifier_index(&backend, &tree);
                assert_eq!(tree.items().unwrap(), reference);
            }
        }
        tree.verify().unwrap();
        assert_identifier_index(&backend, &tree);
        assert_eq!(tree.items().unwrap(), reference);
    }
}
