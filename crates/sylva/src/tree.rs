//! The concrete syntax tree node.
//!
//! Nodes are immutable once built and shared through `Arc`; a stack frame,
//! a cursor, and a finished tree all hold plain clones of the same `Arc`.
//! Children are owned by their parent. There are no parent back-pointers
//! (the reusable-node cursor keeps its own ancestor stack), so the
//! structure is acyclic and a dropped root releases its whole subtree.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::language::{Language, StateId, Symbol, SymbolMetadata};
use crate::lexer::LexStateId;
use crate::syntax::Length;

/// Reuse tag recording the parse state a node was built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStateTag {
    /// Reusable regardless of the surrounding parse state.
    Independent,
    /// Never reusable across parse states.
    Error,
    State(StateId),
}

/// Reuse tag recording the lex state a leaf was scanned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexStateTag {
    /// Reusable under any lex state.
    Independent,
    State(LexStateId),
}

#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) symbol: Symbol,
    pub(crate) padding: Length,
    pub(crate) size: Length,
    pub(crate) children: Vec<Arc<Tree>>,
    pub(crate) named_child_count: usize,
    pub(crate) visible_child_count: usize,
    /// Chars contributed by error or skipped content, in this subtree.
    pub(crate) error_size: usize,
    pub(crate) extra: bool,
    pub(crate) fragile_left: bool,
    pub(crate) fragile_right: bool,
    pub(crate) has_changes: bool,
    pub(crate) visible: bool,
    pub(crate) named: bool,
    pub(crate) parse_state: ParseStateTag,
    pub(crate) lex_state: LexStateTag,
    pub(crate) first_unexpected: Option<char>,
}

impl Tree {
    /// A terminal produced by the lexer.
    #[must_use]
    pub fn leaf(symbol: Symbol, padding: Length, size: Length, metadata: SymbolMetadata) -> Self {
        Self {
            symbol,
            padding,
            size,
            children: Vec::new(),
            named_child_count: 0,
            visible_child_count: 0,
            error_size: 0,
            extra: false,
            fragile_left: false,
            fragile_right: false,
            has_changes: false,
            visible: metadata.visible,
            named: metadata.named,
            parse_state: ParseStateTag::Independent,
            lex_state: LexStateTag::Independent,
            first_unexpected: None,
        }
    }

    /// An error leaf for input the lexer could not tokenize.
    #[must_use]
    pub fn error_leaf(padding: Length, size: Length, first_unexpected: Option<char>) -> Self {
        let mut tree = Self::leaf(
            Symbol::ERROR,
            padding,
            size,
            SymbolMetadata {
                visible: true,
                named: true,
                ..SymbolMetadata::default()
            },
        );
        tree.fragile_left = true;
        tree.fragile_right = true;
        tree.parse_state = ParseStateTag::Error;
        tree.error_size = tree.total_chars();
        tree.first_unexpected = first_unexpected;
        tree
    }

    /// An interior node owning `children`. Callers that popped more trees
    /// than they keep (trailing extras) split the array before calling.
    ///
    /// The parse-state tag defaults to [`ParseStateTag::Error`]; reduce
    /// overwrites it once it knows whether the node is fragile.
    #[must_use]
    pub fn interior(symbol: Symbol, children: Vec<Arc<Tree>>, metadata: SymbolMetadata) -> Self {
        let mut tree = Self::leaf(symbol, Length::ZERO, Length::ZERO, metadata);
        tree.parse_state = ParseStateTag::Error;
        tree.set_children(children);
        tree
    }

    /// An error node wrapping skipped content.
    #[must_use]
    pub fn error_node(children: Vec<Arc<Tree>>) -> Self {
        let mut tree = Self::interior(
            Symbol::ERROR,
            children,
            SymbolMetadata {
                visible: true,
                named: true,
                ..SymbolMetadata::default()
            },
        );
        tree.fragile_left = true;
        tree.fragile_right = true;
        tree.parse_state = ParseStateTag::Error;
        tree
    }

    /// Replace the children and recompute derived metadata: padding and
    /// size, child counts, `error_size`, and the `has_changes` flag.
    pub(crate) fn set_children(&mut self, children: Vec<Arc<Tree>>) {
        self.children = children;

        let mut total = Length::ZERO;
        let mut named = 0;
        let mut visible = 0;
        let mut error_size = 0;
        let mut has_changes = false;
        for child in &self.children {
            total += child.total_size();
            if child.visible {
                visible += 1;
            }
            if child.named {
                named += 1;
            }
            if child.has_changes {
                has_changes = true;
            }
            if !child.extra {
                if child.symbol == Symbol::ERROR {
                    error_size += child.total_chars();
                } else {
                    error_size += child.error_size;
                }
            }
        }

        self.padding = self
            .children
            .first()
            .map_or(Length::ZERO, |child| child.padding);
        self.size = total - self.padding;
        self.named_child_count = named;
        self.visible_child_count = visible;
        self.has_changes = has_changes;
        self.error_size = if self.symbol == Symbol::ERROR {
            self.total_chars()
        } else {
            error_size
        };
    }

    #[must_use]
    pub const fn symbol(&self) -> Symbol {
        self.symbol
    }

    #[must_use]
    pub const fn padding(&self) -> Length {
        self.padding
    }

    #[must_use]
    pub const fn size(&self) -> Length {
        self.size
    }

    /// Padding plus size: the full extent this node covers.
    #[must_use]
    pub fn total_size(&self) -> Length {
        self.padding + self.size
    }

    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.total_size().chars
    }

    #[must_use]
    pub fn children(&self) -> &[Arc<Tree>] {
        &self.children
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub const fn named_child_count(&self) -> usize {
        self.named_child_count
    }

    #[must_use]
    pub const fn visible_child_count(&self) -> usize {
        self.visible_child_count
    }

    #[must_use]
    pub const fn error_size(&self) -> usize {
        self.error_size
    }

    #[must_use]
    pub const fn is_extra(&self) -> bool {
        self.extra
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self.symbol, Symbol::ERROR)
    }

    /// A node is fragile iff either fragility flag is set.
    #[must_use]
    pub const fn is_fragile(&self) -> bool {
        self.fragile_left || self.fragile_right
    }

    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.has_changes
    }

    #[must_use]
    pub const fn parse_state(&self) -> ParseStateTag {
        self.parse_state
    }

    #[must_use]
    pub const fn lex_state(&self) -> LexStateTag {
        self.lex_state
    }

    #[must_use]
    pub const fn first_unexpected(&self) -> Option<char> {
        self.first_unexpected
    }

    /// A copy of this node flagged as overlapping an edit. Embedding edit
    /// layers rebuild the spine above an edited leaf with this; interior
    /// reconstruction propagates the flag upward automatically.
    #[must_use]
    pub fn marked_changed(self: &Arc<Self>) -> Arc<Self> {
        let mut copy = Self::clone(self);
        copy.has_changes = true;
        Arc::new(copy)
    }

    /// Total order used for tie-breaks: symbol, then child count, then
    /// children recursively.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        self.symbol
            .cmp(&other.symbol)
            .then_with(|| self.children.len().cmp(&other.children.len()))
            .then_with(|| {
                for (left, right) in self.children.iter().zip(&other.children) {
                    let ordering = left.compare(right);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            })
    }

    /// Render the subtree as an S-expression, for debugging and tests.
    #[must_use]
    pub fn to_sexp(&self, language: &Language) -> String {
        let mut out = String::new();
        self.write_sexp(language, &mut out);
        out
    }

    fn write_sexp(&self, language: &Language, out: &mut String) {
        let name = language.symbol_name(self.symbol);
        if self.children.is_empty() {
            out.push_str(name);
            return;
        }
        let _ = write!(out, "({name}");
        for child in &self.children {
            out.push(' ');
            child.write_sexp(language, out);
        }
        out.push(')');
    }
}

/// The sole ambiguity-resolution policy: prefer the candidate (`right`)
/// over the incumbent (`left`) iff it has a smaller `error_size`, or ties
/// on `error_size` and compares earlier. A full tie keeps the incumbent.
#[must_use]
pub fn select_tree(left: Option<&Tree>, right: &Tree) -> bool {
    let Some(left) = left else {
        return true;
    };
    match right.error_size.cmp(&left.error_size) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => left.compare(right) == Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(symbol: u16, chars: usize) -> Arc<Tree> {
        Arc::new(Tree::leaf(
            Symbol(symbol),
            Length::ZERO,
            Length::new(chars, chars),
            SymbolMetadata {
                visible: true,
                ..SymbolMetadata::default()
            },
        ))
    }

    #[test]
    fn interior_sums_children_and_hoists_first_padding() {
        let first = Tree::leaf(
            Symbol(1),
            Length::new(2, 2),
            Length::new(3, 3),
            SymbolMetadata::default(),
        );
        let node = Tree::interior(
            Symbol(9),
            vec![Arc::new(first), leaf(2, 4)],
            SymbolMetadata::default(),
        );
        assert_eq!(node.padding(), Length::new(2, 2));
        assert_eq!(node.size(), Length::new(7, 7));
        assert_eq!(node.total_chars(), 9);
    }

    #[test]
    fn error_size_counts_error_children_and_nested_errors() {
        let error_child = Arc::new(Tree::error_leaf(
            Length::new(1, 1),
            Length::new(1, 1),
            Some('+'),
        ));
        let clean = leaf(1, 3);
        let inner = Arc::new(Tree::interior(
            Symbol(9),
            vec![clean.clone(), error_child],
            SymbolMetadata::default(),
        ));
        assert_eq!(inner.error_size(), 2);

        let outer = Tree::interior(Symbol(10), vec![inner, clean], SymbolMetadata::default());
        assert_eq!(outer.error_size(), 2);
    }

    #[test]
    fn extra_children_do_not_contribute_error_size() {
        let mut error_child = Tree::error_leaf(Length::ZERO, Length::new(2, 2), None);
        error_child.extra = true;
        let node = Tree::interior(
            Symbol(9),
            vec![leaf(1, 1), Arc::new(error_child)],
            SymbolMetadata::default(),
        );
        assert_eq!(node.error_size(), 0);
    }

    #[test]
    fn error_node_error_size_is_its_own_extent() {
        let node = Tree::error_node(vec![leaf(1, 2), leaf(2, 3)]);
        assert_eq!(node.error_size(), 5);
        assert!(node.is_fragile());
    }

    #[test]
    fn has_changes_propagates_through_reconstruction() {
        let edited = leaf(1, 1).marked_changed();
        let node = Tree::interior(Symbol(9), vec![leaf(2, 1), edited], SymbolMetadata::default());
        assert!(node.has_changes());
    }

    #[test]
    fn compare_orders_by_symbol_then_shape() {
        let small = Tree::interior(Symbol(3), vec![leaf(1, 1)], SymbolMetadata::default());
        let wide = Tree::interior(Symbol(3), vec![leaf(1, 1), leaf(1, 1)], SymbolMetadata::default());
        assert_eq!(small.compare(&wide), Ordering::Less);
        assert_eq!(wide.compare(&small), Ordering::Greater);
        assert_eq!(small.compare(&small), Ordering::Equal);
    }

    #[test]
    fn select_tree_prefers_smaller_error_then_earlier_then_incumbent() {
        let clean = Tree::interior(Symbol(3), vec![leaf(1, 1)], SymbolMetadata::default());
        let broken = Tree::error_node(vec![leaf(1, 1)]);
        assert!(select_tree(Some(&broken), &clean));
        assert!(!select_tree(Some(&clean), &broken));
        assert!(select_tree(None, &broken));

        // Equal error sizes fall back to compare; a full tie keeps the left.
        let wide = Tree::interior(Symbol(3), vec![leaf(1, 1), leaf(1, 1)], SymbolMetadata::default());
        assert!(select_tree(Some(&wide), &clean));
        assert!(!select_tree(Some(&clean), &wide));
        assert!(!select_tree(Some(&clean), &clean.clone()));
    }
}
