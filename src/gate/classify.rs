//! Tokenizer-backed statement classification.
//!
//! Matching is case-insensitive and binds on whole words, so `create_date` or
//! `insertdate` never trip the `CREATE`/`INSERT` rules. Keywords are searched
//! everywhere except inside terminated string literals and quoted identifiers;
//! comments are searched too.

use super::extract::ExtractedStatement;
use super::lexer::{scanned_words, tokenize, Token, TokenKind};
use super::splitter::{separator_offsets, stacked_separator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_FORBIDDEN_KEYWORDS: [&str; 11] = [
    "INSERT", "UPDATE", "DELETE", "ALTER", "DROP", "TRUNCATE", "VACUUM", "CREATE", "GRANT",
    "REVOKE", "COPY",
];

/// Reported as the offending keyword when a dollar-quoted body is found.
pub const DOLLAR_QUOTE: &str = "$$";

/// Variants are `non_exhaustive`: code outside this crate can match on a
/// classification but never build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    #[non_exhaustive]
    Select { has_limit: bool },
    #[non_exhaustive]
    NonSelectForbidden {
        /// First thing the statement starts with, empty for blank input.
        leading: String,
    },
    #[non_exhaustive]
    MultiStatement { separators: usize, position: usize },
    #[non_exhaustive]
    ContainsForbiddenKeyword { keyword: String, position: usize },
    /// Ends inside a string literal, quoted identifier or block comment.
    /// Anything appended to such text would land inside that token.
    #[non_exhaustive]
    Unterminated { token: TokenKind, position: usize },
}

impl Classification {
    pub fn is_select(&self) -> bool {
        matches!(self, Classification::Select { .. })
    }
}

/// Uppercased set of words that disqualify a statement wherever they appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet(BTreeSet<String>);

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_ascii_uppercase())
                .filter(|k| !k.is_empty())
                .collect(),
        )
    }

    /// Adds deployer-supplied keywords on top of the current set.
    pub fn extend<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.0.extend(
            keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_ascii_uppercase())
                .filter(|k| !k.is_empty()),
        );
    }

    pub fn contains(&self, word: &str) -> bool {
        self.0.contains(&word.to_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for KeywordSet {
    fn default() -> Self {
        Self::new(DEFAULT_FORBIDDEN_KEYWORDS)
    }
}

/// Classifies with the default forbidden keyword set.
pub fn classify(stmt: &ExtractedStatement) -> Classification {
    classify_with(stmt, &KeywordSet::default())
}

/// Checks, in order: forbidden keywords, stacked statements, unterminated
/// tokens, leading `SELECT`.
pub fn classify_with(stmt: &ExtractedStatement, forbidden: &KeywordSet) -> Classification {
    let sql = stmt.as_str();
    let tokens = tokenize(sql);

    if let Some((position, keyword)) = find_forbidden(&tokens, forbidden) {
        return Classification::ContainsForbiddenKeyword { keyword, position };
    }

    let separators = separator_offsets(&tokens);
    if let Some(position) = stacked_separator(sql, &separators) {
        return Classification::MultiStatement {
            separators: separators.len(),
            position,
        };
    }

    if let Some(open) = tokens.iter().find(|t| !t.terminated) {
        return Classification::Unterminated {
            token: open.kind,
            position: open.offset,
        };
    }

    match tokens.iter().find(|t| t.kind != TokenKind::Whitespace) {
        Some(first) if first.is_word("SELECT") => Classification::Select {
            has_limit: has_top_level_limit(&tokens),
        },
        first => Classification::NonSelectForbidden {
            leading: first.map(leading_text).unwrap_or_default(),
        },
    }
}

fn find_forbidden(tokens: &[Token<'_>], forbidden: &KeywordSet) -> Option<(usize, String)> {
    if let Some((position, word)) = scanned_words(tokens).find(|(_, w)| forbidden.contains(w)) {
        return Some((position, word.to_uppercase()));
    }
    find_dollar_quote(tokens).map(|position| (position, DOLLAR_QUOTE.to_string()))
}

fn find_dollar_quote(tokens: &[Token<'_>]) -> Option<usize> {
    for (idx, token) in tokens.iter().enumerate() {
        if token.is_punct('$') && tokens.get(idx + 1).is_some_and(|next| next.is_punct('$')) {
            return Some(token.offset);
        }
        if !token.is_code() && !token.is_opaque() {
            if let Some(i) = token.text.find(DOLLAR_QUOTE) {
                return Some(token.offset + i);
            }
        }
    }
    None
}

/// True when a `LIMIT` word appears in code outside any parentheses. A limit on
/// a subquery does not bound the outer result.
fn has_top_level_limit(tokens: &[Token<'_>]) -> bool {
    let mut depth: i32 = 0;
    for token in tokens.iter().filter(|t| t.is_code()) {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth -= 1;
        } else if depth == 0 && token.is_word("LIMIT") {
            return true;
        }
    }
    false
}

fn leading_text(token: &Token<'_>) -> String {
    token.text.chars().take(32).collect()
}
