//! Shared fixture languages for the integration suites.
//!
//! Both fixtures parse arithmetic over `number + * ( )` with whitespace as
//! an extra token. `arithmetic()` is the classic deterministic
//! expr/term/factor grammar; `ambiguous()` collapses everything into one
//! `expr` rule (`E → E+E | E*E | (E) | number`), so its conflict cells
//! carry both a reduce and a shift and force the parser to fork.

#![allow(dead_code)]

use std::sync::Arc;

use sylva::{
    Language, LanguageBuilder, LexStateId, Lexer, Symbol, SymbolMetadata, Tree,
};

pub const NUM: Symbol = Symbol(1);
pub const PLUS: Symbol = Symbol(2);
pub const STAR: Symbol = Symbol(3);
pub const LPAREN: Symbol = Symbol(4);
pub const RPAREN: Symbol = Symbol(5);
pub const WS: Symbol = Symbol(6);
pub const EXPR: Symbol = Symbol(7);
pub const TERM: Symbol = Symbol(8);
pub const FACTOR: Symbol = Symbol(9);

fn lex_arithmetic(lexer: &mut Lexer, _state: LexStateId, _error_mode: bool) {
    match lexer.lookahead() {
        Some(c) if c.is_whitespace() => {
            while lexer.lookahead().is_some_and(char::is_whitespace) {
                lexer.advance(false);
            }
            lexer.accept(WS);
        }
        Some(c) if c.is_ascii_digit() => {
            while lexer.lookahead().is_some_and(|c| c.is_ascii_digit()) {
                lexer.advance(false);
            }
            lexer.accept(NUM);
        }
        Some('+') => {
            lexer.advance(false);
            lexer.accept(PLUS);
        }
        Some('*') => {
            lexer.advance(false);
            lexer.accept(STAR);
        }
        Some('(') => {
            lexer.advance(false);
            lexer.accept(LPAREN);
        }
        Some(')') => {
            lexer.advance(false);
            lexer.accept(RPAREN);
        }
        _ => {}
    }
}

fn token_metadata() -> SymbolMetadata {
    SymbolMetadata {
        visible: true,
        ..SymbolMetadata::default()
    }
}

fn rule_metadata() -> SymbolMetadata {
    SymbolMetadata {
        structural: true,
        named: true,
        visible: true,
        ..SymbolMetadata::default()
    }
}

fn register_tokens(builder: &mut LanguageBuilder) {
    let num = builder.token("number", token_metadata());
    let plus = builder.token("plus", token_metadata());
    let star = builder.token("star", token_metadata());
    let lparen = builder.token("lparen", token_metadata());
    let rparen = builder.token("rparen", token_metadata());
    let ws = builder.token(
        "whitespace",
        SymbolMetadata {
            extra: true,
            visible: true,
            ..SymbolMetadata::default()
        },
    );
    assert_eq!(
        [num, plus, star, lparen, rparen, ws],
        [NUM, PLUS, STAR, LPAREN, RPAREN, WS]
    );
}

/// Deterministic grammar (states follow the textbook SLR construction,
/// with state 0 the start and state 1 accepting on end-of-input):
///
/// ```text
/// expr   → expr + term | term
/// term   → term * factor | factor
/// factor → ( expr ) | number
/// ```
pub fn arithmetic() -> Arc<Language> {
    let mut b = LanguageBuilder::new(lex_arithmetic);
    register_tokens(&mut b);
    let expr = b.non_terminal("expr", rule_metadata());
    let term = b.non_terminal("term", rule_metadata());
    let factor = b.non_terminal("factor", rule_metadata());
    assert_eq!([expr, term, factor], [EXPR, TERM, FACTOR]);

    b.shift(0, NUM, 5).shift(0, LPAREN, 4);
    b.shift(0, EXPR, 1).shift(0, TERM, 2).shift(0, FACTOR, 3);

    b.shift(1, PLUS, 6).accept(1, Symbol::END);

    for lookahead in [PLUS, RPAREN, Symbol::END] {
        b.reduce(2, lookahead, EXPR, 1);
    }
    b.shift(2, STAR, 7);

    for lookahead in [PLUS, STAR, RPAREN, Symbol::END] {
        b.reduce(3, lookahead, TERM, 1);
    }

    b.shift(4, NUM, 5).shift(4, LPAREN, 4);
    b.shift(4, EXPR, 8).shift(4, TERM, 2).shift(4, FACTOR, 3);

    for lookahead in [PLUS, STAR, RPAREN, Symbol::END] {
        b.reduce(5, lookahead, FACTOR, 1);
    }

    b.shift(6, NUM, 5).shift(6, LPAREN, 4);
    b.shift(6, TERM, 9).shift(6, FACTOR, 3);

    b.shift(7, NUM, 5).shift(7, LPAREN, 4);
    b.shift(7, FACTOR, 10);

    b.shift(8, PLUS, 6).shift(8, RPAREN, 11);

    for lookahead in [PLUS, RPAREN, Symbol::END] {
        b.reduce(9, lookahead, EXPR, 3);
    }
    b.shift(9, STAR, 7);

    for lookahead in [PLUS, STAR, RPAREN, Symbol::END] {
        b.reduce(10, lookahead, TERM, 3);
    }

    for lookahead in [PLUS, STAR, RPAREN, Symbol::END] {
        b.reduce(11, lookahead, FACTOR, 3);
    }

    b.recover(NUM, 5)
        .recover(LPAREN, 4)
        .recover(EXPR, 1)
        .recover(TERM, 9)
        .recover(FACTOR, 3);

    Arc::new(b.build().expect("arithmetic table is well formed"))
}

/// Ambiguous grammar: `expr → expr + expr | expr * expr | ( expr ) |
/// number`. States 8 and 9 carry shift/reduce conflicts, so the parser
/// explores both parses and tree selection picks one.
pub fn ambiguous() -> Arc<Language> {
    let mut b = LanguageBuilder::new(lex_arithmetic);
    register_tokens(&mut b);
    let expr = b.non_terminal("expr", rule_metadata());
    assert_eq!(expr, EXPR);

    b.shift(0, NUM, 2).shift(0, LPAREN, 3);
    b.shift(0, EXPR, 1);

    b.shift(1, PLUS, 5).shift(1, STAR, 6).accept(1, Symbol::END);

    for lookahead in [PLUS, STAR, RPAREN, Symbol::END] {
        b.reduce(2, lookahead, EXPR, 1);
    }

    b.shift(3, NUM, 2).shift(3, LPAREN, 3);
    b.shift(3, EXPR, 4);

    b.shift(4, PLUS, 5).shift(4, STAR, 6).shift(4, RPAREN, 7);

    b.shift(5, NUM, 2).shift(5, LPAREN, 3);
    b.shift(5, EXPR, 8);

    b.shift(6, NUM, 2).shift(6, LPAREN, 3);
    b.shift(6, EXPR, 9);

    for lookahead in [PLUS, STAR, RPAREN, Symbol::END] {
        b.reduce(7, lookahead, EXPR, 3);
    }

    for state in [8, 9] {
        // Reduce first, shift last: the final entry of a cell is its goto.
        b.reduce(state, PLUS, EXPR, 3);
        b.shift(state, PLUS, 5);
        b.reduce(state, STAR, EXPR, 3);
        b.shift(state, STAR, 6);
        b.reduce(state, RPAREN, EXPR, 3);
        b.reduce(state, Symbol::END, EXPR, 3);
    }

    b.recover(NUM, 2).recover(LPAREN, 3).recover(EXPR, 1);

    Arc::new(b.build().expect("ambiguous table is well formed"))
}

/// Rebuild `tree` with the node at `path` replaced, recomputing sizes and
/// propagating `has_changes` up the spine, the shape an embedding edit
/// layer produces.
pub fn replace_at(
    language: &Language,
    tree: &Arc<Tree>,
    path: &[usize],
    replacement: Arc<Tree>,
) -> Arc<Tree> {
    let Some((&index, rest)) = path.split_first() else {
        return replacement;
    };
    let mut children: Vec<Arc<Tree>> = tree.children().to_vec();
    children[index] = replace_at(language, &children[index], rest, replacement);
    Arc::new(Tree::interior(
        tree.symbol(),
        children,
        language.symbol_metadata(tree.symbol()),
    ))
}

/// Collect the leaves of a tree in order.
pub fn leaves(tree: &Arc<Tree>) -> Vec<Arc<Tree>> {
    let mut out = Vec::new();
    collect_leaves(tree, &mut out);
    out
}

fn collect_leaves(tree: &Arc<Tree>, out: &mut Vec<Arc<Tree>>) {
    if tree.children().is_empty() {
        out.push(Arc::clone(tree));
    } else {
        for child in tree.children() {
            collect_leaves(child, out);
        }
    }
}
