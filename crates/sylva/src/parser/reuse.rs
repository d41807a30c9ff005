//! Subtree reuse from the previous parse.
//!
//! The cursor walks the previous tree left to right, tracking its char
//! offset and an explicit ancestor stack (the tree itself carries no parent
//! pointers). At each stack position the driver asks it for the next
//! candidate subtree; candidates that overlap an edit or fail the reuse
//! rules are broken down into finer pieces until something fits, and the
//! lexer takes over where nothing does.

use std::sync::Arc;

use crate::error::ParseError;
use crate::language::{ERROR_STATE, ParseAction, Symbol};
use crate::lexer::{ERROR_LEX_STATE, LexStateId};
use crate::parser::{DebugEvent, Parser, parse_log};
use crate::stack::StackVersion;
use crate::tree::{LexStateTag, ParseStateTag, Tree};

/// Cursor into the previous tree: the current candidate subtree plus the
/// path of `(parent, child index)` pairs above it.
#[derive(Clone)]
pub(crate) struct ReusableNode {
    tree: Option<Arc<Tree>>,
    ancestors: Vec<(Arc<Tree>, usize)>,
    char_index: usize,
}

impl ReusableNode {
    pub fn new(tree: Option<Arc<Tree>>) -> Self {
        Self {
            tree,
            ancestors: Vec::new(),
            char_index: 0,
        }
    }

    pub fn tree(&self) -> Option<&Arc<Tree>> {
        self.tree.as_ref()
    }

    pub const fn char_index(&self) -> usize {
        self.char_index
    }

    /// Advance past the current subtree to the next leaf or subtree,
    /// walking up until a right sibling exists.
    pub fn pop(&mut self) {
        let Some(tree) = self.tree.take() else {
            return;
        };
        self.char_index += tree.total_chars();
        while let Some((parent, index)) = self.ancestors.last_mut() {
            let next = *index + 1;
            if next < parent.child_count() {
                *index = next;
                self.tree = Some(Arc::clone(&parent.children()[next]));
                return;
            }
            self.ancestors.pop();
        }
    }

    /// Descend to the first child, repeating while the child is fragile,
    /// so reuse is retried at the coarsest safe granularity. Error nodes
    /// and leaves are skipped instead.
    pub fn breakdown(&mut self) {
        loop {
            let Some(tree) = self.tree.clone() else {
                return;
            };
            if tree.is_error() || tree.child_count() == 0 {
                self.pop();
                return;
            }
            let first = Arc::clone(&tree.children()[0]);
            self.ancestors.push((tree, 0));
            let fragile = first.is_fragile();
            self.tree = Some(first);
            if !fragile {
                return;
            }
        }
    }
}

impl Parser {
    /// Produce the lookahead for `version`: a reusable subtree from the
    /// previous tree when the cursor yields one, a fresh token otherwise.
    pub(crate) fn next_lookahead(
        &mut self,
        version: StackVersion,
        cursor: &mut ReusableNode,
    ) -> Result<Arc<Tree>, ParseError> {
        let position = self.stack.top_position(version);

        while let Some(tree) = cursor.tree().cloned() {
            if cursor.char_index() > position.chars {
                break;
            }

            if cursor.char_index() < position.chars {
                parse_log!(
                    self,
                    "past_reusable symbol:{}",
                    self.language.symbol_name(tree.symbol())
                );
                cursor.pop();
                continue;
            }

            if tree.has_changes() {
                if tree.child_count() == 0 {
                    self.breakdown_top_of_stack(version)?;
                }
                parse_log!(
                    self,
                    "breakdown_changed symbol:{}",
                    self.language.symbol_name(tree.symbol())
                );
                cursor.breakdown();
                continue;
            }

            if !self.can_reuse(version, &tree) {
                parse_log!(
                    self,
                    "breakdown_unreusable symbol:{}",
                    self.language.symbol_name(tree.symbol())
                );
                cursor.breakdown();
                continue;
            }

            parse_log!(
                self,
                "reuse symbol:{} size:{} extra:{}",
                self.language.symbol_name(tree.symbol()),
                tree.total_chars(),
                tree.is_extra()
            );
            self.metrics.subtrees_reused += 1;
            cursor.pop();
            return Ok(tree);
        }

        self.lexer.reset(position);
        let parse_state = self.stack.top_state(version);
        let error_mode = parse_state == ERROR_STATE;
        let lex_state = if error_mode {
            ERROR_LEX_STATE
        } else {
            self.language.lex_state(parse_state)
        };
        if self.debugger.is_some() {
            let message = format!("lex state:{lex_state}");
            if let Some(debugger) = self.debugger.as_mut() {
                debugger(DebugEvent::Lex, &message);
            }
        }
        Ok(self.lex(lex_state, error_mode))
    }

    fn lex(&mut self, lex_state: LexStateId, error_mode: bool) -> Arc<Tree> {
        self.lexer.start();
        (self.language.lex_fn())(&mut self.lexer, lex_state, error_mode);
        let result = self.lexer.finish();
        self.metrics.tokens_lexed += 1;

        let mut tree = if result.symbol == Symbol::ERROR {
            Tree::error_leaf(result.padding, result.size, result.first_unexpected)
        } else {
            parse_log!(
                self,
                "accept_token symbol:{}",
                self.language.symbol_name(result.symbol)
            );
            Tree::leaf(
                result.symbol,
                result.padding,
                result.size,
                self.language.symbol_metadata(result.symbol),
            )
        };
        if result.is_fragile {
            tree.lex_state = LexStateTag::State(lex_state);
        }
        Arc::new(tree)
    }

    /// Whether `tree` may stand in for a fresh lookahead at `version`'s
    /// frontier.
    pub(crate) fn can_reuse(&self, version: StackVersion, tree: &Tree) -> bool {
        if tree.symbol() == Symbol::ERROR {
            return false;
        }

        let top_state = self.stack.top_state(version);
        if tree.is_fragile() && tree.parse_state() != ParseStateTag::State(top_state) {
            return false;
        }

        if let LexStateTag::State(lex_state) = tree.lex_state()
            && lex_state != self.language.lex_state(top_state)
        {
            return false;
        }

        let action = self.language.last_action(top_state, tree.symbol());
        let action_extra = match action {
            ParseAction::Error => return false,
            ParseAction::Shift {
                can_hide_split: true,
                ..
            } => return false,
            ParseAction::Shift { extra, .. } | ParseAction::Reduce { extra, .. } => extra,
            _ => false,
        };
        !(tree.is_extra() && !action_extra)
    }
}
