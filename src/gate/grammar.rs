//! Optional grammar check layered beneath the lexical gate.
//!
//! Runs on statements the policy engine already accepted and can only turn an
//! accept into a reject.

use super::policy::{RejectCode, Rejection};
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

pub fn check_grammar(sql: &str) -> Result<(), Rejection> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql).map_err(|e| {
        Rejection::new(
            RejectCode::Unparseable,
            format!("statement does not parse as SQL: {}", e),
        )
    })?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [_] => Err(Rejection::new(
            RejectCode::NotASelect,
            "parsed statement is not a query",
        )),
        [] => Err(Rejection::new(RejectCode::Unparseable, "no statement found")),
        many => Err(Rejection::new(
            RejectCode::MultiStatement,
            format!("parser found {} statements; submit exactly one SELECT", many.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_accepts_query() {
        assert!(check_grammar("SELECT a, count(*) FROM t GROUP BY a LIMIT 100").is_ok());
    }

    #[test]
    fn test_grammar_rejects_garbage() {
        let err = check_grammar("SELECT * FROM t WHERE (a = 1 LIMIT 100").unwrap_err();
        assert_eq!(err.code, RejectCode::Unparseable);
    }

    #[test]
    fn test_grammar_rejects_stacked() {
        let err = check_grammar("SELECT 1; SELECT 2").unwrap_err();
        assert_eq!(err.code, RejectCode::MultiStatement);
    }
}
