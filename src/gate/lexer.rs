//! SQL Lexer
//!
//! A flat, dialect-agnostic scanner that is just precise enough for the gate:
//! it knows where words, punctuation, string literals, quoted identifiers and
//! comments begin and end. It never builds a tree.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Run of identifier characters (letters, digits, underscore).
    Word,
    /// `'...'` with `''` escapes.
    StringLiteral,
    /// `"..."`, `` `...` `` or `[...]`.
    QuotedIdent,
    /// `-- ...` up to (not including) the newline.
    LineComment,
    /// `/* ... */`
    BlockComment,
    Whitespace,
    /// Any other single character.
    Punct,
}

impl TokenKind {
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Word => "word",
            TokenKind::StringLiteral => "string literal",
            TokenKind::QuotedIdent => "quoted identifier",
            TokenKind::LineComment => "line comment",
            TokenKind::BlockComment => "block comment",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Punct => "punctuation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset into the scanned text.
    pub offset: usize,
    /// False when a literal, quoted identifier or block comment runs off the end.
    pub terminated: bool,
}

impl<'a> Token<'a> {
    /// Terminated literals and quoted identifiers carry data, not SQL. Nothing
    /// else is opaque: comments and unterminated quotes are scanned like code.
    pub fn is_opaque(&self) -> bool {
        self.terminated && matches!(self.kind, TokenKind::StringLiteral | TokenKind::QuotedIdent)
    }

    pub fn is_code(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::Punct)
    }

    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_punct(&self, ch: char) -> bool {
        self.kind == TokenKind::Punct && self.text.starts_with(ch)
    }
}

pub fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Splits `sql` into tokens. Concatenating the token texts yields `sql` again.
pub fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = sql.as_bytes();
    let mut pos = 0;

    while pos < sql.len() {
        let rest = &sql[pos..];
        let Some(ch) = rest.chars().next() else {
            break;
        };

        let (kind, len, terminated) = if ch.is_whitespace() {
            (TokenKind::Whitespace, span_while(rest, char::is_whitespace), true)
        } else if is_ident_char(ch) {
            (TokenKind::Word, span_while(rest, is_ident_char), true)
        } else if rest.starts_with("--") {
            let len = rest.find('\n').unwrap_or(rest.len());
            (TokenKind::LineComment, len, true)
        } else if rest.starts_with("/*") {
            match rest[2..].find("*/") {
                Some(end) => (TokenKind::BlockComment, end + 4, true),
                None => (TokenKind::BlockComment, rest.len(), false),
            }
        } else if ch == '\'' {
            let (len, terminated) = span_quoted(bytes, pos, b'\'');
            (TokenKind::StringLiteral, len, terminated)
        } else if ch == '"' || ch == '`' {
            let (len, terminated) = span_quoted(bytes, pos, ch as u8);
            (TokenKind::QuotedIdent, len, terminated)
        } else if ch == '[' {
            match rest.find(']') {
                Some(end) => (TokenKind::QuotedIdent, end + 1, true),
                None => (TokenKind::QuotedIdent, rest.len(), false),
            }
        } else {
            (TokenKind::Punct, ch.len_utf8(), true)
        };

        tokens.push(Token {
            kind,
            text: &sql[pos..pos + len],
            offset: pos,
            terminated,
        });
        pos += len;
    }

    tokens
}

fn span_while(text: &str, pred: impl Fn(char) -> bool) -> usize {
    text.char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Length of a quoted run starting at `start`, where a doubled quote is an escape.
fn span_quoted(bytes: &[u8], start: usize, quote: u8) -> (usize, bool) {
    let mut idx = start + 1;
    while idx < bytes.len() {
        if bytes[idx] == quote {
            if bytes.get(idx + 1) == Some(&quote) {
                idx += 2;
                continue;
            }
            return (idx + 1 - start, true);
        }
        idx += 1;
    }
    (bytes.len() - start, false)
}

/// Identifier-character runs inside `text` with their byte offsets relative to `text`.
pub fn words(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        let rest = &text[pos..];
        let start = pos + rest.char_indices().find(|(_, c)| is_ident_char(*c))?.0;
        let len = span_while(&text[start..], is_ident_char);
        pos = start + len;
        Some((start, &text[start..start + len]))
    })
}

/// Every word the gate must consider when looking for keywords: code words plus
/// the words inside comments and unterminated quotes. Offsets are absolute.
pub fn scanned_words<'a>(tokens: &'a [Token<'a>]) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    tokens.iter().flat_map(|token| {
        let inner: Box<dyn Iterator<Item = (usize, &'a str)> + 'a> = match token.kind {
            TokenKind::Word => Box::new(std::iter::once((token.offset, token.text))),
            TokenKind::Whitespace | TokenKind::Punct => Box::new(std::iter::empty()),
            _ if token.is_opaque() => Box::new(std::iter::empty()),
            _ => {
                let base = token.offset;
                Box::new(words(token.text).map(move |(off, w)| (base + off, w)))
            }
        };
        inner
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_round_trips_text() {
        let sql = "SELECT a, 'it''s' AS \"x\" FROM t -- done\n/* c */;";
        let joined: String = tokenize(sql).iter().map(|t| t.text).collect();
        assert_eq!(joined, sql);
    }

    #[test]
    fn test_tokenize_literal_with_escaped_quote() {
        let tokens = tokenize("'it''s'");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert!(tokens[0].is_opaque());
    }

    #[test]
    fn test_tokenize_unterminated_literal_is_not_opaque() {
        let tokens = tokenize("SELECT 'oops; DROP TABLE t");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::StringLiteral);
        assert!(!last.terminated);
        assert!(!last.is_opaque());
    }

    #[test]
    fn test_tokenize_comments_and_quoted_identifiers() {
        assert_eq!(
            kinds("SELECT [a b], `c` -- x\n/* y */"),
            vec![
                TokenKind::Word,
                TokenKind::QuotedIdent,
                TokenKind::Punct,
                TokenKind::QuotedIdent,
                TokenKind::LineComment,
                TokenKind::BlockComment,
            ]
        );
    }

    #[test]
    fn test_scanned_words_include_comments_but_not_literals() {
        let sql = "SELECT 'drop' /* delete */ FROM t";
        let tokens = tokenize(sql);
        let found: Vec<&str> = scanned_words(&tokens).map(|(_, w)| w).collect();
        assert_eq!(found, vec!["SELECT", "delete", "FROM", "t"]);
    }

    #[test]
    fn test_scanned_words_offsets_are_absolute() {
        let sql = "SELECT 1 -- drop";
        let tokens = tokenize(sql);
        let (offset, word) = scanned_words(&tokens).last().unwrap();
        assert_eq!(word, "drop");
        assert_eq!(&sql[offset..offset + 4], "drop");
    }

    #[test]
    fn test_words_handles_unicode() {
        let found: Vec<&str> = words("café-naïve x").map(|(_, w)| w).collect();
        assert_eq!(found, vec!["café", "naïve", "x"]);
    }
}
