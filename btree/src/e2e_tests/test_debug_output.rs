//! Test the debugging renderings of a tree.

use crate::e2e_tests::helpers::{new_set, new_tagged};

#[test]
fn test_summary_of_leaf_root() {
    let (_backend, mut tree) = new_set::<i64, String>(2);
    assert_eq!(tree.summary().unwrap(), "tree size: 0\ndegree: 2\n\nNode(id: root, 0 items)");

    tree.update((0..3).map(|x| (x, x.to_string()))).unwrap();
    assert_eq!(tree.summary().unwrap(), "tree size: 3\ndegree: 2\n\nNode(id: root, 3 items)");
}

#[test]
fn test_summary_indents_children() {
    let (_backend, mut tree) = new_set::<i64, String>(2);
    tree.update((0..4).map(|x| (x, x.to_string()))).unwrap();

    let summary = tree.summary().unwrap();
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 6, "{summary}");
    assert_eq!(lines[0], "tree size: 4");
    assert_eq!(lines[3], "Node(id: root, 1 items)");
    assert!(lines[4].starts_with("    Node(id: ") && lines[4].ends_with(", 1 items)"));
    assert!(lines[5].starts_with("    Node(id: ") && lines[5].ends_with(", 2 items)"));
}

#[test]
fn test_dump_shows_node_contents() {
    let (_backend, mut tree) = new_tagged::<i64, String>(2);
    tree.update((0..4).map(|x| (x, x.to_string(), format!("id-{x}")))).unwrap();

    let dump = tree.dump().unwrap();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 3, "{dump}");
    assert!(lines[0].starts_with("Node(id=root, keys=[1], values=[\"1\"], ids=[\"id-1\"]"));
    assert!(lines[0].ends_with("counts=[1, 2])"));
    assert!(lines[1].starts_with("    Node(id="));
    assert!(lines[1].contains("keys=[0]"));
    assert!(lines[2].contains("keys=[2, 3]"));
    assert!(lines[2].contains("links=[], counts=[])"));
}
