//! Failure taxonomy of the parse driver.
//!
//! Grammar errors in the input are never surfaced here; they become error
//! nodes in the returned tree. These variants cover internal failures:
//! malformed parse tables and stack invariant violations.

use thiserror::Error;

use crate::language::{StateId, Symbol};
use crate::stack::StackVersion;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A reduced symbol has no shift or recover entry in the state it
    /// landed on. The table generator must provide a goto for every
    /// reachable (state, non-terminal) pair.
    #[error("no shift or recover action for symbol {symbol:?} in state {state}")]
    MissingGoto { state: StateId, symbol: Symbol },

    /// Two stack versions that the recovery path requires to be mergeable
    /// disagreed on state or position.
    #[error("stack versions {left} and {right} cannot be merged")]
    VersionMismatch {
        left: StackVersion,
        right: StackVersion,
    },

    /// A reduce action asked for more frames than the stack holds.
    #[error("reduce of {symbol:?} popped past the base of the stack in state {state}")]
    StackUnderflow { state: StateId, symbol: Symbol },

    /// Every stack version died without an accepted tree.
    #[error("parse completed without producing a tree")]
    NoTree,
}
