//! The parse driver.
//!
//! [`Parser::parse`] runs the outer loop over stack versions: it always
//! advances the version furthest behind in the input, so every frontier
//! reaches the same position before [`Stack::condense`] folds compatible
//! ones back together. Per version it obtains a lookahead (a reused
//! subtree from the previous parse when the cursor allows it, a freshly
//! lexed token otherwise) and feeds it to the action engine until the
//! version either advances or is removed by an accept. When the last
//! version is gone, the best accepted tree is the result.

mod engine;
mod recovery;
mod reduce_actions;
mod reuse;

use std::io::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ParseError;
use crate::language::Language;
use crate::lexer::{Lexer, StringInput, TextInput};
use crate::stack::Stack;
use crate::tree::Tree;

pub(crate) use reduce_actions::{ReduceAction, ReduceActionSet};
pub(crate) use reuse::ReusableNode;

/// Tag on debug messages delivered to the installed debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    Parse,
    Lex,
}

/// Logging sink receiving formatted text lines.
pub type DebugFn = Box<dyn FnMut(DebugEvent, &str)>;

/// Messages are only formatted when a debugger is installed.
macro_rules! parse_log {
    ($parser:expr, $($arg:tt)*) => {
        if $parser.debugger.is_some() {
            let message = format!($($arg)*);
            if let Some(debugger) = $parser.debugger.as_mut() {
                debugger($crate::parser::DebugEvent::Parse, &message);
            }
        }
    };
}
pub(crate) use parse_log;

#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    /// Bound on concurrent stack versions and pop-iterator forks; excess
    /// forks are dropped rather than explored.
    pub max_versions: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { max_versions: 64 }
    }
}

/// Counters recorded by the most recent [`Parser::parse`] call.
#[derive(Debug, Clone, Default)]
pub struct ParseMetrics {
    pub tokens_lexed: usize,
    pub subtrees_reused: usize,
    pub reductions: usize,
    pub errors_recovered: usize,
    pub max_versions: usize,
    pub parse_time: Duration,
}

pub struct Parser {
    pub(crate) language: Arc<Language>,
    pub(crate) stack: Stack,
    pub(crate) lexer: Lexer,
    pub(crate) reduce_actions: ReduceActionSet,
    pub(crate) finished_tree: Option<Arc<Tree>>,
    pub(crate) is_split: bool,
    pub(crate) debugger: Option<DebugFn>,
    pub(crate) dot_graphs: bool,
    pub(crate) metrics: ParseMetrics,
}

impl Parser {
    #[must_use]
    pub fn new(language: Arc<Language>) -> Self {
        Self::with_config(language, ParserConfig::default())
    }

    #[must_use]
    pub fn with_config(language: Arc<Language>, config: ParserConfig) -> Self {
        Self {
            language,
            stack: Stack::new(0, config.max_versions),
            lexer: Lexer::new(),
            reduce_actions: ReduceActionSet::default(),
            finished_tree: None,
            is_split: false,
            debugger: None,
            dot_graphs: false,
            metrics: ParseMetrics::default(),
        }
    }

    #[must_use]
    pub fn language(&self) -> &Arc<Language> {
        &self.language
    }

    /// Install a logging sink receiving `PARSE`-tagged text lines.
    pub fn set_debugger(&mut self, debugger: DebugFn) {
        self.debugger = Some(debugger);
    }

    pub fn take_debugger(&mut self) -> Option<DebugFn> {
        self.debugger.take()
    }

    /// Emit Graphviz stack snapshots to stderr at condense points.
    pub fn set_dot_graph_logging(&mut self, enabled: bool) {
        self.dot_graphs = enabled;
    }

    #[must_use]
    pub fn last_metrics(&self) -> &ParseMetrics {
        &self.metrics
    }

    /// Parse `text` held in memory. See [`Parser::parse`].
    pub fn parse_str(
        &mut self,
        text: &str,
        previous_tree: Option<&Arc<Tree>>,
    ) -> Result<Arc<Tree>, ParseError> {
        self.parse(StringInput::new(text), previous_tree)
    }

    /// Run a full parse of `input`, reusing unchanged subtrees of
    /// `previous_tree` where the grammar allows it.
    ///
    /// Grammar errors in the input never fail the parse; they appear as
    /// error nodes with non-zero `error_size` in the returned tree.
    pub fn parse(
        &mut self,
        input: impl TextInput + 'static,
        previous_tree: Option<&Arc<Tree>>,
    ) -> Result<Arc<Tree>, ParseError> {
        let started = Instant::now();
        self.metrics = ParseMetrics::default();
        if previous_tree.is_some() {
            parse_log!(self, "parse_after_edit");
        } else {
            parse_log!(self, "new_parse");
        }

        self.lexer.set_input(Box::new(input));
        self.stack.clear();
        self.finished_tree = None;

        let mut max_position = 0usize;
        let mut cursor = ReusableNode::new(previous_tree.cloned());

        loop {
            let mut lookahead: Option<Arc<Tree>> = None;
            let mut position = 0usize;
            self.is_split = self.stack.version_count() > 1;

            let mut active_cursor = cursor.clone();
            let mut version = 0;
            while version < self.stack.version_count() {
                active_cursor = cursor.clone();
                loop {
                    let last_position = position;
                    let new_position = self.stack.top_position(version).chars;
                    if new_position > max_position {
                        max_position = new_position;
                        version += 1;
                        break;
                    }
                    if new_position == max_position && version > 0 {
                        version += 1;
                        break;
                    }
                    position = new_position;

                    parse_log!(
                        self,
                        "process version:{version} version_count:{} state:{} position:{position}",
                        self.stack.version_count(),
                        self.stack.top_state(version)
                    );

                    let tree = match lookahead.take() {
                        Some(tree)
                            if position == last_position && self.can_reuse(version, &tree) =>
                        {
                            tree
                        }
                        _ => self.next_lookahead(version, &mut active_cursor)?,
                    };

                    parse_log!(
                        self,
                        "lookahead symbol:{} size:{}",
                        self.language.symbol_name(tree.symbol()),
                        tree.total_chars()
                    );

                    let outcome = self.consume_lookahead(version, &tree)?;
                    lookahead = Some(tree);
                    self.metrics.max_versions =
                        self.metrics.max_versions.max(self.stack.version_count());
                    match outcome {
                        engine::Consumed::Removed => break,
                        engine::Consumed::Updated => {}
                    }
                }
            }
            cursor = active_cursor;

            if self.stack.condense() {
                parse_log!(self, "condense");
                self.log_dot_graph();
            }

            if self.stack.version_count() == 0 {
                self.metrics.parse_time = started.elapsed();
                self.stack.clear();
                return self.finished_tree.take().ok_or(ParseError::NoTree);
            }
        }
    }

    pub(crate) fn log_dot_graph(&mut self) {
        if self.dot_graphs {
            let stderr = std::io::stderr();
            let mut out = stderr.lock();
            let _ = self.stack.write_dot_graph(&self.language, &mut out);
            let _ = out.flush();
        }
    }
}

pub(crate) fn essential_count(trees: &[Arc<Tree>]) -> usize {
    trees.iter().filter(|tree| !tree.is_extra()).count()
}
