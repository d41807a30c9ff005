//! Subtree reuse across parses: whole-tree reuse for unedited input, leaf
//! reuse around an edit, and fragility/hidden-split blocking.

mod common;

use std::cmp::Ordering;
use std::sync::Arc;

use sylva::{Length, Parser, Tree};

#[test]
fn unedited_reparse_returns_the_previous_root() {
    let language = common::arithmetic();
    let mut parser = Parser::new(language);
    let first = parser.parse_str("1+2*3", None).unwrap();
    let second = parser.parse_str("1+2*3", Some(&first)).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    let metrics = parser.last_metrics();
    assert_eq!(metrics.subtrees_reused, 1);
    // Only end-of-input was lexed.
    assert_eq!(metrics.tokens_lexed, 1);
}

#[test]
fn edit_reuses_all_unchanged_leaves() {
    let language = common::arithmetic();
    let mut parser = Parser::new(language.clone());
    let old_tree = parser.parse_str("1+2+3", None).unwrap();
    let old_leaves = common::leaves(&old_tree);
    assert_eq!(old_leaves.len(), 5);

    // Replace the leaf covering `2` with a two-char leaf flagged as
    // edited, the way an embedding edit layer would.
    let edited_leaf = Arc::new(Tree::leaf(
        common::NUM,
        Length::ZERO,
        Length::new(2, 2),
        language.symbol_metadata(common::NUM),
    ))
    .marked_changed();
    let edited = common::replace_at(&language, &old_tree, &[0, 2, 0, 0], edited_leaf);
    assert!(edited.has_changes());
    assert_eq!(edited.total_size(), Length::new(6, 6));

    let new_tree = parser.parse_str("1+20+3", Some(&edited)).unwrap();
    let fresh = parser.parse_str("1+20+3", None).unwrap();
    assert_eq!(new_tree.compare(&fresh), Ordering::Equal);
    assert_eq!(new_tree.to_sexp(&language), fresh.to_sexp(&language));

    let new_leaves = common::leaves(&new_tree);
    assert_eq!(new_leaves.len(), 5);
    // `1`, both `+`s, and `3` keep their identity; `20` is a fresh leaf.
    assert!(Arc::ptr_eq(&new_leaves[0], &old_leaves[0]));
    assert!(Arc::ptr_eq(&new_leaves[1], &old_leaves[1]));
    assert!(!Arc::ptr_eq(&new_leaves[2], &old_leaves[2]));
    assert_eq!(new_leaves[2].total_size(), Length::new(2, 2));
    assert!(Arc::ptr_eq(&new_leaves[3], &old_leaves[3]));
    assert!(Arc::ptr_eq(&new_leaves[4], &old_leaves[4]));
}

#[test]
fn subtrees_right_of_the_edit_are_reused_wholesale() {
    let language = common::arithmetic();
    let mut parser = Parser::new(language.clone());
    let old_tree = parser.parse_str("1+2+3", None).unwrap();
    // The trailing `term` subtree covering `3`.
    let old_term = Arc::clone(&old_tree.children()[2]);

    let edited_leaf = Arc::new(Tree::leaf(
        common::NUM,
        Length::ZERO,
        Length::new(2, 2),
        language.symbol_metadata(common::NUM),
    ))
    .marked_changed();
    let edited = common::replace_at(&language, &old_tree, &[0, 2, 0, 0], edited_leaf);

    let new_tree = parser.parse_str("1+20+3", Some(&edited)).unwrap();
    assert!(Arc::ptr_eq(&new_tree.children()[2], &old_term));
}

#[test]
fn fragile_subtrees_are_not_reused_but_their_leaves_are() {
    let language = common::ambiguous();
    let mut parser = Parser::new(language.clone());
    let old_tree = parser.parse_str("1+2*3", None).unwrap();
    let old_leaves = common::leaves(&old_tree);
    assert_eq!(old_leaves.len(), 5);
    // The inner `2*3` expression was built while the stack was split.
    assert!(old_tree.children()[2].is_fragile());

    let edited_leaf = Arc::new(Tree::leaf(
        common::NUM,
        Length::ZERO,
        Length::new(1, 1),
        language.symbol_metadata(common::NUM),
    ))
    .marked_changed();
    let edited = common::replace_at(&language, &old_tree, &[0, 0], edited_leaf);

    let new_tree = parser.parse_str("9+2*3", Some(&edited)).unwrap();
    let fresh = parser.parse_str("9+2*3", None).unwrap();
    assert_eq!(new_tree.compare(&fresh), Ordering::Equal);

    let new_leaves = common::leaves(&new_tree);
    assert_eq!(new_leaves.len(), 5);
    // The edited number is fresh, and the `*` sits under a hidden-split
    // cell so its reuse is blocked; the other leaves keep their identity.
    assert!(!Arc::ptr_eq(&new_leaves[0], &old_leaves[0]));
    assert!(Arc::ptr_eq(&new_leaves[1], &old_leaves[1]));
    assert!(Arc::ptr_eq(&new_leaves[2], &old_leaves[2]));
    assert!(!Arc::ptr_eq(&new_leaves[3], &old_leaves[3]));
    assert!(Arc::ptr_eq(&new_leaves[4], &old_leaves[4]));
}

#[test]
fn reuse_skips_content_left_of_the_frontier() {
    let language = common::arithmetic();
    let mut parser = Parser::new(language.clone());
    let old_tree = parser.parse_str("10+20+30", None).unwrap();

    let edited_leaf = Arc::new(Tree::leaf(
        common::NUM,
        Length::ZERO,
        Length::new(1, 1),
        language.symbol_metadata(common::NUM),
    ))
    .marked_changed();
    // Shrink the first number.
    let edited = common::replace_at(&language, &old_tree, &[0, 0, 0, 0, 0], edited_leaf);
    assert_eq!(edited.total_size(), Length::new(7, 7));

    let new_tree = parser.parse_str("1+20+30", Some(&edited)).unwrap();
    let fresh = parser.parse_str("1+20+30", None).unwrap();
    assert_eq!(new_tree.compare(&fresh), Ordering::Equal);
    assert_eq!(new_tree.total_size(), Length::new(7, 7));
}
