//! The positioned lexical scanner.
//!
//! The driver owns a [`Lexer`] and drives it through `start`/`finish`/
//! `reset`; the per-language scan function ([`LexFn`]) sees the same object
//! and consumes characters through [`Lexer::lookahead`], [`Lexer::advance`],
//! [`Lexer::accept`], and [`Lexer::mark_fragile`]. Characters advanced with
//! `skip = true` before the first content character become the token's
//! padding.
//!
//! If a scan accepts nothing, `finish` reports `END` at end of input and
//! otherwise emits an `ERROR` result carrying the first unexpected
//! character, consuming at least one char so the parse always progresses.

use crate::language::Symbol;
use crate::syntax::Length;

pub type LexStateId = u16;

/// The lex state the driver requests while sitting in the error parse
/// state: best-effort token boundary discovery.
pub const ERROR_LEX_STATE: LexStateId = 0;

/// A character source addressed by absolute (char, byte) offsets.
///
/// `read` returns the next chunk after the cursor and advances past it; an
/// empty chunk means end of input. `seek` repositions the cursor.
pub trait TextInput {
    fn seek(&mut self, position: Length);
    fn read(&mut self) -> &str;
}

/// An in-memory input source.
pub struct StringInput {
    text: String,
    offset: usize,
}

impl StringInput {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            offset: 0,
        }
    }
}

impl TextInput for StringInput {
    fn seek(&mut self, position: Length) {
        self.offset = position.bytes.min(self.text.len());
    }

    fn read(&mut self) -> &str {
        let start = self.offset;
        self.offset = self.text.len();
        &self.text[start..]
    }
}

/// The per-language scan function: recognize one token at the lexer's
/// cursor, given a lex state and whether the parser is in error mode.
pub type LexFn = fn(&mut Lexer, LexStateId, bool);

/// The outcome of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexedToken {
    pub symbol: Symbol,
    pub padding: Length,
    pub size: Length,
    pub is_fragile: bool,
    pub first_unexpected: Option<char>,
}

pub struct Lexer {
    input: Option<Box<dyn TextInput>>,
    chunk: String,
    /// Byte offset of the lookahead char within `chunk`.
    chunk_offset: usize,
    lookahead: Option<char>,
    /// Absolute position of the lookahead char.
    position: Length,
    scan_start: Length,
    token_start: Length,
    token_end: Option<Length>,
    accepted: Option<Symbol>,
    fragile: bool,
    started_token: bool,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: None,
            chunk: String::new(),
            chunk_offset: 0,
            lookahead: None,
            position: Length::ZERO,
            scan_start: Length::ZERO,
            token_start: Length::ZERO,
            token_end: None,
            accepted: None,
            fragile: false,
            started_token: false,
        }
    }

    /// Install a new input and rewind to its start.
    pub fn set_input(&mut self, input: Box<dyn TextInput>) {
        self.input = Some(input);
        self.reset(Length::ZERO);
    }

    /// Reposition to an absolute offset.
    pub fn reset(&mut self, position: Length) {
        if let Some(input) = self.input.as_mut() {
            input.seek(position);
        }
        self.chunk.clear();
        self.chunk_offset = 0;
        self.lookahead = None;
        self.position = position;
        self.refill();
    }

    /// Begin a scan at the cursor.
    pub fn start(&mut self) {
        self.scan_start = self.position;
        self.token_start = self.position;
        self.token_end = None;
        self.accepted = None;
        self.fragile = false;
        self.started_token = false;
        self.refill();
    }

    /// Collect the scan result.
    pub fn finish(&mut self) -> LexedToken {
        if let Some(symbol) = self.accepted {
            let end = self.token_end.unwrap_or(self.position);
            return LexedToken {
                symbol,
                padding: self.token_start - self.scan_start,
                size: end - self.token_start,
                is_fragile: self.fragile,
                first_unexpected: None,
            };
        }

        if self.lookahead.is_none() && self.position == self.token_start {
            return LexedToken {
                symbol: Symbol::END,
                padding: self.token_start - self.scan_start,
                size: Length::ZERO,
                is_fragile: false,
                first_unexpected: None,
            };
        }

        let first_unexpected = self.lookahead;
        if self.position == self.token_start {
            self.advance(false);
        }
        LexedToken {
            symbol: Symbol::ERROR,
            padding: self.token_start - self.scan_start,
            size: self.position - self.token_start,
            is_fragile: false,
            first_unexpected,
        }
    }

    /// The character at the cursor, or `None` at end of input.
    #[must_use]
    pub const fn lookahead(&self) -> Option<char> {
        self.lookahead
    }

    /// Absolute position of the cursor.
    #[must_use]
    pub const fn position(&self) -> Length {
        self.position
    }

    /// Consume the lookahead. With `skip` set before any content character
    /// the consumed char counts as padding.
    pub fn advance(&mut self, skip: bool) {
        let Some(c) = self.lookahead else {
            return;
        };
        self.chunk_offset += c.len_utf8();
        self.position += Length::new(1, c.len_utf8());
        self.lookahead = None;
        self.refill();
        if skip && !self.started_token {
            self.token_start = self.position;
        } else {
            self.started_token = true;
        }
    }

    /// Record a recognized token ending at the cursor.
    pub fn accept(&mut self, symbol: Symbol) {
        self.accepted = Some(symbol);
        self.token_end = Some(self.position);
    }

    /// Flag the token as dependent on the lex state it was scanned in.
    pub fn mark_fragile(&mut self) {
        self.fragile = true;
    }

    fn refill(&mut self) {
        if self.lookahead.is_some() {
            return;
        }
        loop {
            if self.chunk_offset < self.chunk.len() {
                self.lookahead = self.chunk[self.chunk_offset..].chars().next();
                return;
            }
            let Some(input) = self.input.as_mut() else {
                return;
            };
            let next = input.read();
            if next.is_empty() {
                return;
            }
            self.chunk.clear();
            self.chunk.push_str(next);
            self.chunk_offset = 0;
        }
    }
}
