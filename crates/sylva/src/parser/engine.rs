//! The inner action loop: shift, reduce, accept, breakdown.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::ParseError;
use crate::language::{ERROR_STATE, ParseAction, StateId, Symbol};
use crate::parser::recovery::Repair;
use crate::parser::{Parser, essential_count, parse_log};
use crate::stack::{PopResult, StackSlice, StackVersion};
use crate::tree::{ParseStateTag, Tree, select_tree};

/// Outcome of feeding one lookahead to a stack version.
pub(crate) enum Consumed {
    /// The version advanced (or forked); it still exists.
    Updated,
    /// The version was removed by an accept.
    Removed,
}

pub(crate) enum Breakdown {
    Performed,
    Aborted,
}

pub(crate) enum Reduction {
    Succeeded { version: StackVersion },
    StoppedAtError { slice: StackSlice },
}

impl Parser {
    /// Apply actions for `(top state, lookahead)` until the version shifts,
    /// accepts, or recovers. Reduces loop back with the version renumbered
    /// onto the reduction result; a missing action drives the error branch.
    pub(crate) fn consume_lookahead(
        &mut self,
        version: StackVersion,
        lookahead: &Arc<Tree>,
    ) -> Result<Consumed, ParseError> {
        loop {
            let state = self.stack.top_state(version);

            let mut error_repair_failed = false;
            let mut error_repair_depth: Option<usize> = None;
            let mut last_reduction: Option<StackVersion> = None;

            let actions: SmallVec<[ParseAction; 4]> = self
                .language
                .actions(state, lookahead.symbol())
                .iter()
                .copied()
                .collect();

            let mut index = 0;
            loop {
                let action = if index < actions.len() {
                    actions[index]
                } else if error_repair_failed {
                    ParseAction::Error
                } else {
                    break;
                };
                index += 1;

                // Reductions deeper than the repair boundary are moot.
                if let Some(depth) = error_repair_depth
                    && let ParseAction::Reduce { child_count, .. } = action
                    && usize::from(child_count) > depth
                {
                    continue;
                }

                match action {
                    ParseAction::Error => match self.breakdown_top_of_stack(version)? {
                        Breakdown::Performed => continue,
                        Breakdown::Aborted => {
                            parse_log!(self, "handle_error");
                            self.log_dot_graph();
                            self.handle_error(version, state, lookahead)?;
                            error_repair_failed = false;
                        }
                    },

                    ParseAction::Shift {
                        to_state, extra, ..
                    } => {
                        let next_state = if extra {
                            parse_log!(self, "shift_extra");
                            state
                        } else {
                            parse_log!(self, "shift state:{to_state}");
                            to_state
                        };
                        self.shift(version, next_state, lookahead, extra);
                        return Ok(Consumed::Updated);
                    }

                    ParseAction::Reduce {
                        symbol,
                        child_count,
                        extra,
                        fragile,
                    } => {
                        if extra {
                            parse_log!(self, "reduce_extra");
                        } else {
                            parse_log!(
                                self,
                                "reduce symbol:{} child_count:{child_count} fragile:{fragile}",
                                self.language.symbol_name(symbol)
                            );
                        }

                        match self.reduce(version, symbol, child_count, extra, fragile)? {
                            Reduction::Succeeded { version: reduced } => {
                                last_reduction = Some(reduced);
                            }
                            Reduction::StoppedAtError { slice } => {
                                let depth = essential_count(&slice.trees);
                                error_repair_depth = Some(depth);
                                parse_log!(self, "repair count_above_error:{depth}");
                                match self.repair_error(slice, lookahead, &actions)? {
                                    Repair::NoneFound => {
                                        if last_reduction.is_none() {
                                            error_repair_failed = true;
                                        }
                                    }
                                    Repair::Succeeded { version: repaired } => {
                                        last_reduction = Some(repaired);
                                    }
                                }
                            }
                        }
                    }

                    ParseAction::Accept => {
                        parse_log!(self, "accept");
                        self.accept(version)?;
                        return Ok(Consumed::Removed);
                    }

                    ParseAction::Recover { to_state } => {
                        if lookahead.symbol() == Symbol::END {
                            self.recover_eof(version);
                        } else {
                            self.recover(version, to_state, lookahead);
                        }
                        return Ok(Consumed::Updated);
                    }
                }
            }

            if let Some(reduced) = last_reduction {
                self.stack.renumber_version(reduced, version);
            }
        }
    }

    /// Push the lookahead. Marking an extra is copy-on-write: the cached
    /// lookahead may be shared with other versions.
    pub(crate) fn shift(
        &mut self,
        version: StackVersion,
        state: StateId,
        lookahead: &Arc<Tree>,
        extra: bool,
    ) {
        let mut tree = Arc::clone(lookahead);
        if extra && !tree.extra {
            Arc::make_mut(&mut tree).extra = true;
        }
        let is_pending = tree.child_count() > 0;
        self.stack.push(version, Some(tree), is_pending, state);
    }

    /// Pop `count` essential frames and replace them with a `symbol` node.
    /// Ambiguous pops produce one slice per path; slices sharing a version
    /// are folded through tree selection. Crossing an error frame hands the
    /// slice back for repair instead.
    pub(crate) fn reduce(
        &mut self,
        version: StackVersion,
        symbol: Symbol,
        count: u16,
        extra: bool,
        fragile: bool,
    ) -> Result<Reduction, ParseError> {
        let initial_version_count = self.stack.version_count();

        let slices = match self.stack.pop_count(version, usize::from(count)) {
            PopResult::StoppedAtError(slice) => {
                return Ok(Reduction::StoppedAtError { slice });
            }
            PopResult::Slices(slices) => slices,
        };
        let Some(first_version) = slices.first().map(|slice| slice.version) else {
            return Err(ParseError::StackUnderflow {
                state: self.stack.top_state(version),
                symbol,
            });
        };

        let metadata = self.language.symbol_metadata(symbol);
        let slice_count = slices.len();
        let mut iter = slices.into_iter().peekable();
        while let Some(slice) = iter.next() {
            let slice_version = slice.version;
            let mut trees = slice.trees;
            let keep = without_trailing_extras(&trees);
            let mut trailing = trees.split_off(keep);
            let mut parent = Tree::interior(symbol, trees, metadata);

            // Fold further slices of the same version (ambiguous paths)
            // into this node, keeping the preferred children.
            while let Some(next) = iter.peek()
                && next.version == slice_version
            {
                let next = match iter.next() {
                    Some(next) => next,
                    None => break,
                };
                let mut candidate = next.trees;
                let keep = without_trailing_extras(&candidate);
                let candidate_trailing = candidate.split_off(keep);
                if self.switch_children(&mut parent, candidate) {
                    trailing = candidate_trailing;
                }
            }

            // A node built while the parse is split (or from an ambiguous
            // pop) is only valid in its exact context; flag it so reuse
            // stays conservative. The pop's own transient slice versions
            // do not count as a split.
            let state = self.stack.top_state(slice_version);
            if fragile || self.is_split || initial_version_count > 1 || slice_count > 1 {
                parent.fragile_left = true;
                parent.fragile_right = true;
                parent.parse_state = ParseStateTag::Error;
            } else {
                parent.parse_state = ParseStateTag::State(state);
            }

            let next_state = if extra {
                parent.extra = true;
                state
            } else {
                match self.language.last_action(state, symbol) {
                    ParseAction::Shift { to_state, .. } | ParseAction::Recover { to_state } => {
                        to_state
                    }
                    _ => return Err(ParseError::MissingGoto { state, symbol }),
                }
            };

            self.stack
                .push(slice_version, Some(Arc::new(parent)), false, next_state);
            for tree in trailing {
                self.stack.push(slice_version, Some(tree), false, next_state);
            }
        }

        self.stack.merge_from(initial_version_count);
        self.metrics.reductions += 1;

        Ok(Reduction::Succeeded {
            version: first_version,
        })
    }

    /// Compare `candidate` children against the incumbent node and adopt
    /// them when tree selection prefers the result.
    fn switch_children(&mut self, parent: &mut Tree, candidate: Vec<Arc<Tree>>) -> bool {
        let scratch = Tree::interior(
            parent.symbol,
            candidate,
            self.language.symbol_metadata(parent.symbol),
        );
        if select_tree(Some(parent), &scratch) {
            parse_log!(
                self,
                "switch_children symbol:{}",
                self.language.symbol_name(parent.symbol)
            );
            parent.padding = scratch.padding;
            parent.size = scratch.size;
            parent.error_size = scratch.error_size;
            parent.children = scratch.children;
            parent.named_child_count = scratch.named_child_count;
            parent.visible_child_count = scratch.visible_child_count;
            parent.has_changes = scratch.has_changes;
            true
        } else {
            false
        }
    }

    /// Replace pending composite frames at the top of the stack with their
    /// children, repeating while finer reuse boundaries remain exposed.
    pub(crate) fn breakdown_top_of_stack(
        &mut self,
        version: StackVersion,
    ) -> Result<Breakdown, ParseError> {
        let mut did_break_down = false;
        let mut last_child: Option<Arc<Tree>> = None;
        let mut still_pending = false;

        loop {
            let slices = self.stack.pop_pending(version);
            if slices.is_empty() {
                break;
            }
            did_break_down = true;
            still_pending = false;

            for slice in slices {
                let slice_version = slice.version;
                let trees = slice.trees;
                let Some(parent) = trees.first().cloned() else {
                    continue;
                };
                parse_log!(
                    self,
                    "breakdown_pop symbol:{} size:{}",
                    self.language.symbol_name(parent.symbol()),
                    parent.total_chars()
                );

                let mut state = self.stack.top_state(slice_version);
                for child in parent.children() {
                    last_child = Some(Arc::clone(child));
                    still_pending = child.child_count() > 0;

                    if child.symbol() == Symbol::ERROR {
                        state = ERROR_STATE;
                    } else if !child.is_extra() {
                        state = match self.language.last_action(state, child.symbol()) {
                            ParseAction::Shift { to_state, .. } => to_state,
                            _ => {
                                return Err(ParseError::MissingGoto {
                                    state,
                                    symbol: child.symbol(),
                                });
                            }
                        };
                    }

                    parse_log!(
                        self,
                        "breakdown_push symbol:{} size:{}",
                        self.language.symbol_name(child.symbol()),
                        child.total_chars()
                    );
                    self.stack
                        .push(slice_version, Some(Arc::clone(child)), still_pending, state);
                }

                for tree in trees.into_iter().skip(1) {
                    self.stack.push(slice_version, Some(tree), false, state);
                }
            }

            if !(last_child.is_some() && still_pending) {
                break;
            }
        }

        Ok(if did_break_down {
            Breakdown::Performed
        } else {
            Breakdown::Aborted
        })
    }

    /// Pop the whole version; the rightmost non-extra tree of each path is
    /// a candidate root, absorbing its siblings as children. The best
    /// candidate (by tree selection) becomes the finished tree.
    pub(crate) fn accept(&mut self, version: StackVersion) -> Result<(), ParseError> {
        let slices = self.stack.pop_all(version);
        let Some(first_version) = slices.first().map(|slice| slice.version) else {
            return Err(ParseError::StackUnderflow {
                state: self.stack.top_state(version),
                symbol: Symbol::END,
            });
        };

        for slice in slices {
            let mut trees = slice.trees;
            let Some(root_index) = trees.iter().rposition(|tree| !tree.is_extra()) else {
                continue;
            };

            let is_error_root = trees[root_index].is_error();
            let root = if trees.len() == 1 {
                // The root alone: keep it untouched so a wholesale-reused
                // previous tree keeps its identity.
                match trees.pop() {
                    Some(root) => root,
                    None => continue,
                }
            } else {
                let mut root = Arc::clone(&trees[root_index]);
                let skipped: usize = trees[..root_index]
                    .iter()
                    .filter(|tree| !tree.is_extra())
                    .map(|tree| tree.size().chars)
                    .sum();
                let root_children: Vec<Arc<Tree>> = root.children().to_vec();
                trees.splice(root_index..=root_index, root_children);

                let node = Arc::make_mut(&mut root);
                node.set_children(trees);
                // An error root already charges every child to error_size.
                if !is_error_root {
                    node.error_size += skipped;
                }
                root
            };

            if select_tree(self.finished_tree.as_deref(), &root) {
                parse_log!(
                    self,
                    "select_tree symbol:{} error_size:{}",
                    self.language.symbol_name(root.symbol()),
                    root.error_size()
                );
                self.finished_tree = Some(root);
            }
        }

        self.stack.remove_version(first_version);
        self.stack.remove_version(version);
        Ok(())
    }
}

fn without_trailing_extras(trees: &[Arc<Tree>]) -> usize {
    let mut keep = trees.len();
    while keep > 0 && trees[keep - 1].is_extra() {
        keep -= 1;
    }
    keep
}
