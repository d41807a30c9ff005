//! Compiled language data consulted by the driver.
//!
//! A [`Language`] bundles the read-only parse table (actions keyed by
//! `(state, symbol)`), per-state lex states, per-symbol metadata and debug
//! names, and the scan function. It is immutable for the life of a parser
//! and can be shared between parsers through an `Arc`.
//!
//! Tables are dense in behavior: looking up a cell with no entries yields a
//! single implicit [`ParseAction::Error`], which is what sends the driver
//! into its recovery path. The error state has its own row (the recovery
//! row) that maps each symbol to the action taken while the parser sits on
//! an error frame; [`LanguageBuilder::build`] makes that row total over
//! terminals.

use compact_str::CompactString;
use hashbrown::HashMap;
use smallvec::SmallVec;
use thiserror::Error;

use crate::lexer::{LexFn, LexStateId};

/// A terminal or non-terminal id. `END` and `ERROR` are builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u16);

impl Symbol {
    /// Input termination.
    pub const END: Self = Self(0);
    /// The builtin error-node symbol.
    pub const ERROR: Self = Self(u16::MAX);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

pub type StateId = u16;

/// The error parse state. Not a row in the main table; lookups against it
/// consult the recovery row.
pub const ERROR_STATE: StateId = StateId::MAX;

/// The state pushed by EOF recovery. By table convention this is the state
/// reached after the start symbol, whose action on [`Symbol::END`] is
/// accept.
pub const STATE_AFTER_EOF_RECOVERY: StateId = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymbolMetadata {
    /// May appear anywhere; not counted as a structural child by reduces.
    pub extra: bool,
    pub structural: bool,
    pub named: bool,
    pub visible: bool,
}

/// One entry of a parse-table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAction {
    Shift {
        /// Ignored when `extra` is set; an extra shift keeps the state.
        to_state: StateId,
        extra: bool,
        /// Marks shifts that may obscure an ambiguity; blocks subtree reuse.
        can_hide_split: bool,
    },
    Reduce {
        symbol: Symbol,
        child_count: u16,
        extra: bool,
        fragile: bool,
    },
    Accept,
    Recover {
        to_state: StateId,
    },
    Error,
}

impl ParseAction {
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

const IMPLICIT_ERROR: &[ParseAction] = &[ParseAction::Error];

type ActionRow = HashMap<Symbol, SmallVec<[ParseAction; 2]>>;

pub struct Language {
    symbol_count: usize,
    metadata: Vec<SymbolMetadata>,
    names: Vec<CompactString>,
    lex_states: Vec<LexStateId>,
    rows: Vec<ActionRow>,
    recovery_row: ActionRow,
    lex_fn: LexFn,
}

impl std::fmt::Debug for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Language")
            .field("symbol_count", &self.symbol_count)
            .field("state_count", &self.rows.len())
            .finish_non_exhaustive()
    }
}

impl Language {
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbol_count
    }

    #[must_use]
    pub fn symbol_metadata(&self, symbol: Symbol) -> SymbolMetadata {
        if symbol == Symbol::ERROR {
            return SymbolMetadata {
                visible: true,
                named: true,
                ..SymbolMetadata::default()
            };
        }
        self.metadata
            .get(symbol.index())
            .copied()
            .unwrap_or_default()
    }

    /// Debug name of a symbol.
    #[must_use]
    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        if symbol == Symbol::ERROR {
            return "ERROR";
        }
        self.names.get(symbol.index()).map_or("?", |n| n.as_str())
    }

    /// The lex state the scanner runs in for a parse state.
    #[must_use]
    pub fn lex_state(&self, state: StateId) -> LexStateId {
        self.lex_states.get(state as usize).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn lex_fn(&self) -> LexFn {
        self.lex_fn
    }

    /// All actions for `(state, symbol)`, in table order. A cell with no
    /// entries yields the implicit error action.
    #[must_use]
    pub fn actions(&self, state: StateId, symbol: Symbol) -> &[ParseAction] {
        let row = if state == ERROR_STATE {
            Some(&self.recovery_row)
        } else {
            self.rows.get(state as usize)
        };
        row.and_then(|row| row.get(&symbol))
            .map_or(IMPLICIT_ERROR, |cell| cell.as_slice())
    }

    /// The final action of a cell; used where only one action is expected
    /// (gotos, reuse checks).
    #[must_use]
    pub fn last_action(&self, state: StateId, symbol: Symbol) -> ParseAction {
        self.actions(state, symbol)
            .last()
            .copied()
            .unwrap_or(ParseAction::Error)
    }

    #[must_use]
    pub fn has_action(&self, state: StateId, symbol: Symbol) -> bool {
        !self.actions(state, symbol)[0].is_error()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    #[error("symbol limit exceeded (at most {0} symbols)")]
    TooManySymbols(usize),
    #[error("reduce target {0:?} is not a registered non-terminal")]
    ReduceTargetNotNonTerminal(Symbol),
    #[error("action references state {0}, but only {1} states are defined")]
    UnknownState(StateId, usize),
}

/// Assembles a [`Language`] from symbol registrations and table entries.
///
/// Within one cell, add reduce actions before the shift: the driver
/// processes cell entries in order and treats the last entry as the cell's
/// shift/goto. `build` marks shifts that share a cell with reduces as
/// `can_hide_split`, appends shift-extra entries for every extra symbol in
/// every state (including the recovery row), and completes the recovery
/// row: terminals without an explicit recover target consume into the
/// error region, and `END` recovers to state 1.
pub struct LanguageBuilder {
    metadata: Vec<SymbolMetadata>,
    names: Vec<CompactString>,
    terminal: Vec<bool>,
    state_count: usize,
    lex_states: Vec<LexStateId>,
    rows: Vec<ActionRow>,
    recovery_row: ActionRow,
    lex_fn: LexFn,
}

impl LanguageBuilder {
    #[must_use]
    pub fn new(lex_fn: LexFn) -> Self {
        let mut builder = Self {
            metadata: Vec::new(),
            names: Vec::new(),
            terminal: Vec::new(),
            state_count: 0,
            lex_states: Vec::new(),
            rows: Vec::new(),
            recovery_row: ActionRow::new(),
            lex_fn,
        };
        // Symbol 0 is the builtin END terminal.
        builder.register("end", SymbolMetadata::default(), true);
        builder
    }

    fn register(&mut self, name: &str, metadata: SymbolMetadata, terminal: bool) -> Symbol {
        let id = self.names.len();
        self.names.push(CompactString::from(name));
        self.metadata.push(metadata);
        self.terminal.push(terminal);
        Symbol(u16::try_from(id).unwrap_or(u16::MAX - 1))
    }

    pub fn token(&mut self, name: &str, metadata: SymbolMetadata) -> Symbol {
        self.register(name, metadata, true)
    }

    pub fn non_terminal(&mut self, name: &str, metadata: SymbolMetadata) -> Symbol {
        self.register(name, metadata, false)
    }

    fn row_mut(&mut self, state: StateId) -> &mut ActionRow {
        let index = state as usize;
        if index >= self.rows.len() {
            self.rows.resize_with(index + 1, ActionRow::new);
        }
        self.state_count = self.state_count.max(index + 1);
        &mut self.rows[index]
    }

    pub fn action(&mut self, state: StateId, symbol: Symbol, action: ParseAction) -> &mut Self {
        self.row_mut(state).entry(symbol).or_default().push(action);
        self
    }

    pub fn shift(&mut self, state: StateId, symbol: Symbol, to_state: StateId) -> &mut Self {
        self.action(
            state,
            symbol,
            ParseAction::Shift {
                to_state,
                extra: false,
                can_hide_split: false,
            },
        )
    }

    pub fn reduce(
        &mut self,
        state: StateId,
        lookahead: Symbol,
        symbol: Symbol,
        child_count: u16,
    ) -> &mut Self {
        self.action(
            state,
            lookahead,
            ParseAction::Reduce {
                symbol,
                child_count,
                extra: false,
                fragile: false,
            },
        )
    }

    pub fn accept(&mut self, state: StateId, lookahead: Symbol) -> &mut Self {
        self.action(state, lookahead, ParseAction::Accept)
    }

    /// Register a recovery target: while the parser sits on an error frame,
    /// `symbol` continues the parse at `to_state`.
    pub fn recover(&mut self, symbol: Symbol, to_state: StateId) -> &mut Self {
        self.recovery_row
            .entry(symbol)
            .or_default()
            .push(ParseAction::Recover { to_state });
        self
    }

    /// Set the lex state used in `state`. States default to lex state 0.
    pub fn lex_state(&mut self, state: StateId, lex_state: LexStateId) -> &mut Self {
        let index = state as usize;
        if index >= self.lex_states.len() {
            self.lex_states.resize(index + 1, 0);
        }
        self.state_count = self.state_count.max(index + 1);
        self.lex_states[index] = lex_state;
        self
    }

    pub fn build(mut self) -> Result<Language, LanguageError> {
        let symbol_count = self.names.len();
        if symbol_count >= usize::from(u16::MAX) {
            return Err(LanguageError::TooManySymbols(usize::from(u16::MAX) - 1));
        }

        self.rows.resize_with(self.state_count, ActionRow::new);
        self.lex_states.resize(self.state_count, 0);

        for row in &self.rows {
            for cell in row.values() {
                for action in cell {
                    if let ParseAction::Reduce { symbol, .. } = *action
                        && self.terminal.get(symbol.index()).copied().unwrap_or(true)
                    {
                        return Err(LanguageError::ReduceTargetNotNonTerminal(symbol));
                    }
                    if let ParseAction::Shift {
                        to_state,
                        extra: false,
                        ..
                    } = *action
                        && to_state as usize >= self.state_count
                    {
                        return Err(LanguageError::UnknownState(to_state, self.state_count));
                    }
                }
            }
        }

        // A shift sharing a cell with reduces can hide an ambiguity split;
        // reused subtrees must not paper over it.
        for row in &mut self.rows {
            for cell in row.values_mut() {
                let has_reduce = cell
                    .iter()
                    .any(|a| matches!(a, ParseAction::Reduce { .. }));
                if has_reduce {
                    for action in cell.iter_mut() {
                        if let ParseAction::Shift { can_hide_split, .. } = action {
                            *can_hide_split = true;
                        }
                    }
                }
            }
        }

        let extras: Vec<Symbol> = (0..symbol_count)
            .filter(|&i| self.metadata[i].extra)
            .map(|i| Symbol(i as u16))
            .collect();
        let shift_extra = ParseAction::Shift {
            to_state: 0,
            extra: true,
            can_hide_split: false,
        };
        for row in self.rows.iter_mut().chain(Some(&mut self.recovery_row)) {
            for &extra in &extras {
                row.entry(extra).or_default().push(shift_extra);
            }
        }

        // Totalize the recovery row over terminals so the error state can
        // always consume the lookahead. Error leaves produced by the lexer
        // also land here.
        self.recovery_row.entry(Symbol::ERROR).or_insert_with(|| {
            SmallVec::from_slice(&[ParseAction::Shift {
                to_state: ERROR_STATE,
                extra: false,
                can_hide_split: false,
            }])
        });
        for index in 0..symbol_count {
            let symbol = Symbol(index as u16);
            if !self.terminal[index] || self.metadata[index].extra {
                continue;
            }
            self.recovery_row.entry(symbol).or_insert_with(|| {
                let action = if symbol == Symbol::END {
                    ParseAction::Recover {
                        to_state: STATE_AFTER_EOF_RECOVERY,
                    }
                } else {
                    ParseAction::Shift {
                        to_state: ERROR_STATE,
                        extra: false,
                        can_hide_split: false,
                    }
                };
                SmallVec::from_slice(&[action])
            });
        }

        Ok(Language {
            symbol_count,
            metadata: self.metadata,
            names: self.names,
            lex_states: self.lex_states,
            rows: self.rows,
            recovery_row: self.recovery_row,
            lex_fn: self.lex_fn,
        })
    }
}
