//! # Sylva
//!
//! An incremental GLR parsing runtime.
//!
//! Sylva drives a precompiled parse table and a per-language scan function
//! over a character source, producing a concrete syntax tree. It keeps a
//! graph-structured stack of concurrent parse versions (so local
//! ambiguities fork and re-merge instead of failing), recovers from
//! grammar errors by synthesizing error nodes, and, given the tree from a
//! previous parse of an edited input, reuses every subtree the edit did
//! not touch.
//!
//! ## Overview
//!
//! - [`language`]: the read-only compiled table: actions keyed by
//!   `(state, symbol)`, symbol metadata, lex states, and the scan
//!   function. Assembled with [`LanguageBuilder`] or any external
//!   generator.
//! - [`lexer`]: the positioned scanner the scan function drives, plus the
//!   [`TextInput`] source abstraction.
//! - [`tree`]: immutable, reference-counted tree nodes.
//! - [`stack`]: the graph-structured parse stack.
//! - [`parser`]: the driver, [`Parser::parse`] and friends.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sylva::{LanguageBuilder, Lexer, Parser, Symbol, SymbolMetadata};
//!
//! fn lex(lexer: &mut Lexer, _state: u16, _error_mode: bool) {
//!     const WORD: Symbol = Symbol(1);
//!     if lexer.lookahead().is_some_and(char::is_alphabetic) {
//!         while lexer.lookahead().is_some_and(char::is_alphabetic) {
//!             lexer.advance(false);
//!         }
//!         lexer.accept(WORD);
//!     }
//! }
//!
//! let mut builder = LanguageBuilder::new(lex);
//! let word = builder.token("word", SymbolMetadata::default());
//! let file = builder.non_terminal(
//!     "file",
//!     SymbolMetadata { structural: true, named: true, visible: true, extra: false },
//! );
//! builder.shift(0, word, 2);
//! builder.reduce(2, Symbol::END, file, 1);
//! builder.shift(0, file, 1);
//! builder.accept(1, Symbol::END);
//! let language = Arc::new(builder.build().expect("table is well formed"));
//!
//! let mut parser = Parser::new(language);
//! let tree = parser.parse_str("hello", None).expect("parse succeeds");
//! assert_eq!(tree.total_chars(), 5);
//! ```

pub mod error;
pub mod language;
pub mod lexer;
pub mod parser;
pub mod stack;
pub mod syntax;
pub mod tree;

pub use error::ParseError;
pub use language::{
    ERROR_STATE, Language, LanguageBuilder, LanguageError, ParseAction, STATE_AFTER_EOF_RECOVERY,
    StateId, Symbol, SymbolMetadata,
};
pub use lexer::{LexFn, LexStateId, LexedToken, Lexer, StringInput, TextInput};
pub use parser::{DebugEvent, DebugFn, ParseMetrics, Parser, ParserConfig};
pub use stack::{IterateAction, PopResult, Stack, StackSlice, StackVersion};
pub use syntax::Length;
pub use tree::{LexStateTag, ParseStateTag, Tree, select_tree};
