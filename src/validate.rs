//! Shallow structural validation of generated SQL.
//!
//! These checks are a fast-fail filter: they accumulate errors rather than
//! stopping at the first, and they never reject a statement for syntax the
//! checks do not understand.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::SchemaModel;
use crate::sql::lexer::{Lexer, Token};

static FROM_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\b").expect("from pattern"));

/// Outcome of [`validate_sql`]. `valid` holds iff `errors` is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Default for ValidationVerdict {
    fn default() -> Self {
        Self::passed()
    }
}

impl ValidationVerdict {
    /// Verdict used when validation is skipped.
    pub fn passed() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Turn a failed verdict into [`Error::Validation`].
    pub fn ensure_valid(&self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(Error::Validation(self.errors.clone()))
        }
    }
}

/// Validate `sql`, checking referenced tables against `schema` when given.
pub fn validate_sql(sql: &str, schema: Option<&SchemaModel>) -> ValidationVerdict {
    let mut errors = Vec::new();

    let open = sql.matches('(').count();
    let close = sql.matches(')').count();
    if open != close {
        errors.push(format!(
            "unbalanced parentheses: {open} '(' but {close} ')'"
        ));
    }

    let first_word = sql.split_whitespace().next().unwrap_or_default();
    if first_word.eq_ignore_ascii_case("SELECT") && !FROM_WORD.is_match(sql) {
        errors.push("missing required keyword: FROM".to_string());
    }

    if sql.matches('\'').count() % 2 != 0 {
        errors.push("unbalanced single quotes".to_string());
    }
    if sql.matches('"').count() % 2 != 0 {
        errors.push("unbalanced double quotes".to_string());
    }

    if let Some(schema) = schema {
        let references = TableReferences::scan(sql);
        let mut reported: Vec<&str> = Vec::new();
        for table in &references.tables {
            let known = schema.find_table(table).is_some()
                || references
                    .ctes
                    .iter()
                    .any(|cte| cte.eq_ignore_ascii_case(table));
            let seen = reported.iter().any(|r| r.eq_ignore_ascii_case(table));
            if !known && !seen {
                errors.push(format!("table not found in schema: {table}"));
                reported.push(table);
            }
        }
    }

    ValidationVerdict::from_errors(errors)
}

/// Tables named after FROM or JOIN, in order of appearance, plus the names
/// of common table expressions declared in the statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableReferences {
    pub tables: Vec<String>,
    pub ctes: Vec<String>,
}

/// Words that end a FROM item instead of aliasing it.
const CLAUSE_WORDS: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "FETCH", "UNION", "INTERSECT",
    "EXCEPT", "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL", "USING", "WINDOW",
    "FOR", "RETURNING", "SET", "VALUES",
];

impl TableReferences {
    pub fn scan(sql: &str) -> Self {
        let tokens = Lexer::new(sql).tokenize();
        let mut refs = TableReferences::default();
        // One entry per open parenthesis: whether it encloses a query
        let mut frames: Vec<bool> = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            match &tokens[i] {
                Token::LParen => {
                    frames.push(matches!(tokens.get(i + 1), Some(Token::Select | Token::With)));
                    i += 1;
                }
                Token::RParen => {
                    frames.pop();
                    i += 1;
                }
                Token::Ident(name) if is_cte_declaration(&tokens, i) => {
                    refs.ctes.push(name.clone());
                    i += 1;
                }
                Token::From | Token::Join if frames.last().copied().unwrap_or(true) => {
                    i = refs.scan_from_items(&tokens, i + 1);
                }
                _ => i += 1,
            }
        }

        refs
    }

    /// Read the FROM/JOIN item list starting at `i`. Returns the index of the
    /// first token not consumed.
    fn scan_from_items(&mut self, tokens: &[Token], mut i: usize) -> usize {
        loop {
            if matches!(tokens.get(i), Some(Token::Only))
                || matches!(tokens.get(i), Some(Token::Ident(w)) if w.eq_ignore_ascii_case("LATERAL"))
            {
                i += 1;
            }

            let Some(Token::Ident(first)) = tokens.get(i) else {
                // Subquery or something the scan does not model
                return i;
            };
            let mut name = first.clone();
            i += 1;
            while let (Some(Token::Dot), Some(Token::Ident(part))) = (tokens.get(i), tokens.get(i + 1)) {
                name = part.clone();
                i += 2;
            }

            // Table function such as generate_series(1, 10)
            if !matches!(tokens.get(i), Some(Token::LParen)) {
                self.tables.push(name);
            }

            // Optional alias
            if matches!(tokens.get(i), Some(Token::As)) {
                i += 1;
            }
            if let Some(Token::Ident(alias)) = tokens.get(i) {
                if !CLAUSE_WORDS.iter().any(|w| alias.eq_ignore_ascii_case(w)) {
                    i += 1;
                }
            }

            if matches!(tokens.get(i), Some(Token::Comma)) {
                i += 1;
            } else {
                return i;
            }
        }
    }
}

/// `name AS (` or `name (cols) AS (` as found in a WITH clause.
fn is_cte_declaration(tokens: &[Token], i: usize) -> bool {
    let mut j = i + 1;
    if matches!(tokens.get(j), Some(Token::LParen)) {
        // Column list
        while !matches!(tokens.get(j), Some(Token::RParen) | None) {
            j += 1;
        }
        j += 1;
    }
    matches!(tokens.get(j), Some(Token::As)) && matches!(tokens.get(j + 1), Some(Token::LParen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::shop_schema;
    use pretty_assertions::assert_eq;

    fn errors(sql: &str) -> Vec<String> {
        validate_sql(sql, Some(&shop_schema())).errors
    }

    #[test]
    fn test_known_table_is_valid() {
        let verdict = validate_sql("SELECT * FROM orders", Some(&shop_schema()));
        assert_eq!(verdict, ValidationVerdict::passed());
    }

    #[test]
    fn test_removing_table_flips_verdict() {
        let mut schema = shop_schema();
        schema.remove_table("orders");
        let verdict = validate_sql("SELECT * FROM orders", Some(&schema));
        assert!(!verdict.valid);
        assert_eq!(verdict.errors, vec!["table not found in schema: orders"]);
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let verdict = validate_sql("SELECT * FROM (orders", None);
        assert!(!verdict.valid);
        assert!(verdict.errors[0].contains("unbalanced parentheses"));
    }

    #[test]
    fn test_checks_accumulate() {
        let errs = validate_sql("SELECT 'a, \"b (c", None).errors;
        assert_eq!(
            errs,
            vec![
                "unbalanced parentheses: 1 '(' but 0 ')'",
                "missing required keyword: FROM",
                "unbalanced single quotes",
                "unbalanced double quotes",
            ]
        );
    }

    #[test]
    fn test_from_must_be_a_word() {
        assert_eq!(
            validate_sql("select from_date", None).errors,
            vec!["missing required keyword: FROM"]
        );
        assert!(validate_sql("UPDATE t SET a = 1", None).valid);
    }

    #[test]
    fn test_joins_aliases_and_case() {
        let sql = "SELECT c.email, o.total FROM Customers AS c \
                   JOIN public.orders o ON o.customer_id = c.id \
                   LEFT JOIN \"ORDERS\" x ON x.id = o.id";
        assert!(errors(sql).is_empty());
    }

    #[test]
    fn test_comma_list_and_unknown_tables_reported_once() {
        let sql = "SELECT * FROM customers c, invoices i JOIN invoices j ON j.id = i.id JOIN refunds r ON r.id = c.id";
        assert_eq!(
            errors(sql),
            vec![
                "table not found in schema: invoices",
                "table not found in schema: refunds",
            ]
        );
    }

    #[test]
    fn test_function_arguments_are_not_tables() {
        let sql = "SELECT EXTRACT(YEAR FROM o.created_at), TRIM(BOTH ' ' FROM c.email) \
                   FROM orders o JOIN customers c ON c.id = o.customer_id";
        assert!(errors(sql).is_empty());
    }

    #[test]
    fn test_subqueries_are_checked() {
        let sql = "SELECT * FROM customers WHERE id IN (SELECT customer_id FROM payments)";
        assert_eq!(errors(sql), vec!["table not found in schema: payments"]);

        let sql = "SELECT n FROM (SELECT COUNT(*) AS n FROM orders) sub";
        assert!(errors(sql).is_empty());
    }

    #[test]
    fn test_cte_names_and_table_functions_are_known() {
        let sql = "WITH big (id) AS (SELECT id FROM orders WHERE total > 100), \
                   recent AS (SELECT * FROM big) \
                   SELECT * FROM recent JOIN generate_series(1, 3) g ON true";
        assert!(errors(sql).is_empty());
    }

    #[test]
    fn test_literals_and_comments_are_ignored() {
        let sql = "SELECT 'FROM ghosts' FROM orders -- JOIN phantoms\n";
        assert!(errors(sql).is_empty());
    }

    #[test]
    fn test_without_schema_tables_are_not_checked() {
        assert!(validate_sql("SELECT * FROM anything", None).valid);
    }

    #[test]
    fn test_ensure_valid() {
        assert!(ValidationVerdict::passed().ensure_valid().is_ok());
        let failed = validate_sql("SELECT (", None);
        assert!(matches!(failed.ensure_valid(), Err(Error::Validation(e)) if e.len() == 2));
    }
}
