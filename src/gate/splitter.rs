//! Statement Splitter
//!
//! Stacked statements (`SELECT 1; DROP TABLE t`) are rejected on the separator
//! count alone, independently of the keyword scan.

use super::extract::ExtractedStatement;
use super::lexer::{tokenize, Token, TokenKind};

/// Byte offsets of every `;` the gate considers a separator. Semicolons inside
/// terminated literals and quoted identifiers are data and are skipped; those in
/// comments or unterminated quotes count.
pub fn separator_offsets(tokens: &[Token<'_>]) -> Vec<usize> {
    let mut offsets = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::Punct if token.text == ";" => offsets.push(token.offset),
            TokenKind::Word | TokenKind::Whitespace | TokenKind::Punct => {}
            _ if token.is_opaque() => {}
            _ => offsets.extend(token.text.match_indices(';').map(|(i, _)| token.offset + i)),
        }
    }
    offsets
}

pub fn count_statements(stmt: &ExtractedStatement) -> usize {
    separator_offsets(&tokenize(stmt.as_str())).len()
}

/// The first separator that makes `sql` a stacked statement, if any: the second
/// separator when there are several, or a lone one that is not the last
/// non-whitespace character.
pub fn stacked_separator(sql: &str, offsets: &[usize]) -> Option<usize> {
    match offsets {
        [] => None,
        [only] => {
            let tail = &sql[only + 1..];
            if tail.trim().is_empty() {
                None
            } else {
                Some(*only)
            }
        }
        [_, second, ..] => Some(*second),
    }
}
