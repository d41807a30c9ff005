//! Error recovery: synthesizing error frames, repairing reductions that
//! cross them, and forking recovery continuations.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::ParseError;
use crate::language::{
    ERROR_STATE, Language, ParseAction, STATE_AFTER_EOF_RECOVERY, StateId, Symbol,
};
use crate::parser::engine::Reduction;
use crate::parser::{Parser, ReduceAction, essential_count, parse_log};
use crate::stack::{IterateAction, StackSlice, StackVersion};
use crate::tree::Tree;

pub(crate) enum Repair {
    Succeeded { version: StackVersion },
    NoneFound,
}

impl Parser {
    /// No action exists for the lookahead: gather every reduction the
    /// current state offers, apply them all (as fragile), then install an
    /// error frame so the parse continues in the error state.
    pub(crate) fn handle_error(
        &mut self,
        version: StackVersion,
        state: StateId,
        _lookahead: &Arc<Tree>,
    ) -> Result<(), ParseError> {
        let previous_version_count = self.stack.version_count();
        let language = Arc::clone(&self.language);

        let mut has_shift_action = false;
        self.reduce_actions.clear();
        for index in 0..language.symbol_count() {
            let symbol = Symbol(index as u16);
            for action in language.actions(state, symbol) {
                match *action {
                    ParseAction::Shift { extra: false, .. } | ParseAction::Recover { .. } => {
                        has_shift_action = true;
                    }
                    ParseAction::Reduce {
                        symbol: target,
                        child_count,
                        extra: false,
                        ..
                    } if child_count > 0 => {
                        self.reduce_actions.add(ReduceAction {
                            symbol: target,
                            count: usize::from(child_count),
                        });
                    }
                    _ => {}
                }
            }
        }

        let gathered: SmallVec<[ReduceAction; 8]> = self.reduce_actions.iter().copied().collect();
        let mut did_reduce = false;
        for action in gathered {
            let count = u16::try_from(action.count).unwrap_or(u16::MAX);
            match self.reduce(version, action.symbol, count, false, true)? {
                Reduction::Succeeded { .. } => did_reduce = true,
                Reduction::StoppedAtError { slice } => {
                    self.stack.remove_version(slice.version);
                }
            }
        }

        // Without any shift out of this state the pre-reduce frontier is a
        // dead end; keep only the reduced one.
        if did_reduce && !has_shift_action {
            self.stack.renumber_version(previous_version_count, version);
        }

        self.stack.push(version, None, false, ERROR_STATE);
        while self.stack.version_count() > previous_version_count {
            self.stack
                .push(previous_version_count, None, false, ERROR_STATE);
            if !self.stack.merge(version, previous_version_count) {
                return Err(ParseError::VersionMismatch {
                    left: version,
                    right: previous_version_count,
                });
            }
        }

        self.metrics.errors_recovered += 1;
        Ok(())
    }

    /// A reduction stopped at an error frame. Search the stack below the
    /// frame for a point where some reduction in `actions` could consume a
    /// prefix of the pre-error trees plus everything above the frame,
    /// absorbing the rest into an error node.
    pub(crate) fn repair_error(
        &mut self,
        slice: StackSlice,
        lookahead: &Arc<Tree>,
        actions: &[ParseAction],
    ) -> Result<Repair, ParseError> {
        let language = Arc::clone(&self.language);
        let lookahead_symbol = lookahead.symbol();
        let count_above_error = essential_count(&slice.trees);

        self.reduce_actions.clear();
        for action in actions {
            if let ParseAction::Reduce {
                symbol,
                child_count,
                ..
            } = *action
                && usize::from(child_count) > count_above_error
            {
                self.reduce_actions.add(ReduceAction {
                    symbol,
                    count: usize::from(child_count) - count_above_error,
                });
            }
        }

        let mut found_repair = false;
        let mut best_repair = ReduceAction {
            symbol: Symbol::ERROR,
            count: 0,
        };
        let mut best_next_state: StateId = 0;
        let mut best_skip_count = 0usize;

        let trees_above = &slice.trees;
        let repairs = &mut self.reduce_actions;
        let pop = self
            .stack
            .iterate(slice.version, |state, trees, tree_count, _, _| {
                let mut result = IterateAction::NONE;
                let mut index = 0;
                while index < repairs.len() {
                    let repair = repairs.get(index);
                    if repair.count > tree_count {
                        index += 1;
                        continue;
                    }
                    let skip_count = tree_count - repair.count;
                    if found_repair && skip_count >= best_skip_count {
                        repairs.remove(index);
                        continue;
                    }

                    let ParseAction::Shift { to_state, .. } =
                        language.last_action(state, repair.symbol)
                    else {
                        index += 1;
                        continue;
                    };
                    if !language.has_action(to_state, lookahead_symbol) {
                        index += 1;
                        continue;
                    }

                    if is_valid_repair(
                        &language,
                        trees,
                        trees_above,
                        state,
                        repair.symbol,
                        repair.count,
                        lookahead_symbol,
                    ) {
                        result.pop = true;
                        found_repair = true;
                        best_repair = repair;
                        best_skip_count = skip_count;
                        best_next_state = to_state;
                        repairs.remove(index);
                    } else {
                        index += 1;
                    }
                }
                if repairs.is_empty() {
                    result.stop = true;
                }
                result
            });

        if !found_repair {
            parse_log!(self, "no_repair_found");
            self.stack.remove_version(slice.version);
            return Ok(Repair::NoneFound);
        }

        let mut pop = pop;
        let Some(chosen) = pop.pop() else {
            self.stack.remove_version(slice.version);
            return Ok(Repair::NoneFound);
        };
        let mut children = chosen.trees;
        self.stack.renumber_version(chosen.version, slice.version);

        // Retract the other materialized paths, one removal per distinct
        // version, walking downward so indices stay valid.
        let mut next_version = chosen.version;
        for other in pop.into_iter().rev() {
            if other.version != next_version {
                self.stack.remove_version(other.version);
            }
            next_version = other.version;
        }

        let split = best_repair.count.min(children.len());
        let skipped = children.split_off(split);
        let error = Arc::new(Tree::error_node(skipped));
        children.push(error);
        children.extend(slice.trees);

        let parent = Tree::interior(
            best_repair.symbol,
            children,
            self.language.symbol_metadata(best_repair.symbol),
        );
        parse_log!(
            self,
            "repair_found symbol:{} child_count:{} skipped:{}",
            self.language.symbol_name(best_repair.symbol),
            best_repair.count + count_above_error,
            parent.error_size()
        );
        self.stack
            .push(slice.version, Some(Arc::new(parent)), false, best_next_state);

        Ok(Repair::Succeeded {
            version: slice.version,
        })
    }

    /// Fork the version: one continuation treats the lookahead as more
    /// error-region content, the other resumes the normal parse at
    /// `to_state`.
    pub(crate) fn recover(&mut self, version: StackVersion, to_state: StateId, lookahead: &Arc<Tree>) {
        parse_log!(self, "recover state:{to_state}");
        let new_version = self.stack.duplicate_version(version);
        let extra = self.language.symbol_metadata(lookahead.symbol()).extra;
        self.shift(new_version, ERROR_STATE, lookahead, extra);
        self.shift(version, to_state, lookahead, false);
    }

    /// EOF in the error state: install an empty error node where the start
    /// symbol would go, so the next action is an accept.
    pub(crate) fn recover_eof(&mut self, version: StackVersion) {
        parse_log!(self, "recover_eof");
        let parent = Arc::new(Tree::error_node(Vec::new()));
        self.stack
            .push(version, Some(parent), false, STATE_AFTER_EOF_RECOVERY);
    }
}

/// Simulate the repair: shifting `goal_count_below` essential pre-error
/// trees from `start_state`, then every tree above the error, must pass
/// through shift actions only and end in a state where the lookahead
/// triggers a reduction of `goal_symbol`.
fn is_valid_repair(
    language: &Language,
    trees_below: &[Arc<Tree>],
    trees_above: &[Arc<Tree>],
    start_state: StateId,
    goal_symbol: Symbol,
    goal_count_below: usize,
    lookahead: Symbol,
) -> bool {
    let mut state = start_state;
    let mut count_below = 0;

    // `trees_below` is topmost-first; shifting runs bottom-up.
    for tree in trees_below.iter().rev() {
        let ParseAction::Shift {
            to_state, extra, ..
        } = language.last_action(state, tree.symbol())
        else {
            return false;
        };
        if extra || tree.is_extra() {
            continue;
        }
        state = to_state;
        count_below += 1;

        if count_below == goal_count_below {
            for tree in trees_above {
                let ParseAction::Shift {
                    to_state, extra, ..
                } = language.last_action(state, tree.symbol())
                else {
                    return false;
                };
                if extra || tree.is_extra() {
                    continue;
                }
                state = to_state;
            }
            return language.actions(state, lookahead).iter().any(
                |action| matches!(action, ParseAction::Reduce { symbol, .. } if *symbol == goal_symbol),
            );
        }
    }

    false
}
