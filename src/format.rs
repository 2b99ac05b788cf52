//! Cosmetic SQL formatting.
//!
//! Keywords are upper-cased and clause keywords start a new, indented line.
//! Quoted literals, quoted identifiers and comments pass through untouched
//! and no token is added, dropped or reordered, so formatting is idempotent.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:SELECT|FROM|WHERE|GROUP|BY|ORDER|HAVING|JOIN|LEFT|RIGHT|INNER|OUTER|FULL|CROSS|ON|LIMIT|OFFSET|INSERT|INTO|VALUES|UPDATE|SET|DELETE|CREATE|TABLE|ALTER|DROP|BEGIN|AND|OR|NOT|IN|LIKE|BETWEEN|IS|NULL|AS|DISTINCT|UNION|ALL|ASC|DESC|WITH|CASE|WHEN|THEN|ELSE|END|EXISTS)\b",
    )
    .expect("keyword pattern")
});

static CLAUSES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*\b(?:DELETE\s+FROM|INSERT\s+INTO|GROUP\s+BY|ORDER\s+BY|(?:(?:LEFT|RIGHT|FULL)(?:\s+OUTER)?|INNER|CROSS|OUTER)\s+JOIN|JOIN|SELECT|FROM|WHERE|HAVING|LIMIT|VALUES|UPDATE|SET)\b",
    )
    .expect("clause pattern")
});

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("line break pattern"));

static INNER_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Formats SQL with a fixed indent for continuation lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFormatter {
    indent: String,
}

impl Default for SqlFormatter {
    fn default() -> Self {
        Self::with_indent(4)
    }
}

impl SqlFormatter {
    pub fn with_indent(width: usize) -> Self {
        Self {
            indent: " ".repeat(width),
        }
    }

    pub fn format(&self, sql: &str) -> String {
        let line_prefix = format!("\n{}", self.indent);
        let mut out = String::with_capacity(sql.len() + 32);

        for segment in split_literals(sql.trim()) {
            match segment {
                Segment::Literal(text) | Segment::Comment(text) => out.push_str(text),
                Segment::Code(code) => {
                    let upper = KEYWORDS.replace_all(code, |caps: &Captures| caps[0].to_uppercase());
                    let broken = CLAUSES.replace_all(&upper, |caps: &Captures| {
                        let clause = INNER_SPACE.replace_all(caps[0].trim_start(), " ");
                        format!("\n{clause}")
                    });
                    let indented = LINE_BREAK.replace_all(&broken, line_prefix.as_str());
                    out.push_str(&indented);
                }
            }
        }

        out.trim().to_string()
    }
}

/// Format with the default four-space indent.
pub fn format_sql(sql: &str) -> String {
    SqlFormatter::default().format(sql)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Code(&'a str),
    /// Quoted text, quotes included. An unterminated quote runs to the end.
    Literal(&'a str),
    /// `--` comment up to (not including) the newline, or a `/* */` block.
    /// An unterminated block runs to the end.
    Comment(&'a str),
}

impl<'a> Segment<'a> {
    fn text(&self) -> &'a str {
        match *self {
            Segment::Code(s) | Segment::Literal(s) | Segment::Comment(s) => s,
        }
    }
}

pub(crate) fn split_literals(sql: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let bytes = sql.as_bytes();
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let open = i;
        let comment = match (bytes[i], bytes.get(i + 1)) {
            (quote @ (b'\'' | b'"' | b'`'), _) => {
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => break,
                        // Doubled quote is an escaped quote
                        Some(&b) if b == quote && bytes.get(i + 1) == Some(&quote) => i += 2,
                        Some(&b) if b == quote => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                false
            }
            (b'-', Some(b'-')) => {
                i = sql[i..].find('\n').map_or(bytes.len(), |n| i + n);
                true
            }
            (b'/', Some(b'*')) => {
                i = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + n + 4);
                true
            }
            _ => {
                i += 1;
                continue;
            }
        };
        if code_start < open {
            segments.push(Segment::Code(&sql[code_start..open]));
        }
        let text = &sql[open..i];
        segments.push(if comment { Segment::Comment(text) } else { Segment::Literal(text) });
        code_start = i;
    }
    if code_start < bytes.len() {
        segments.push(Segment::Code(&sql[code_start..]));
    }

    segments
}

/// Byte offset of the first `;` outside quotes and comments.
pub(crate) fn statement_terminator(sql: &str) -> Option<usize> {
    let mut offset = 0;
    for segment in split_literals(sql) {
        if let Segment::Code(code) = segment {
            if let Some(at) = code.find(';') {
                return Some(offset + at);
            }
        }
        offset += segment.text().len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_basic_select() {
        assert_eq!(
            format_sql("select id, name from users where active = 1 order by name limit 10;"),
            "SELECT id, name\n    FROM users\n    WHERE active = 1\n    ORDER BY name\n    LIMIT 10;"
        );
    }

    #[test]
    fn test_joins_and_grouping() {
        assert_eq!(
            format_sql(
                "select c.id, count(*) from customers c left outer join orders o on o.customer_id = c.id group by c.id having count(*) > 1"
            ),
            "SELECT c.id, count(*)\n    FROM customers c\n    LEFT OUTER JOIN orders o ON o.customer_id = c.id\n    GROUP BY c.id\n    HAVING count(*) > 1"
        );
    }

    #[test]
    fn test_dml_clauses() {
        assert_eq!(
            format_sql("insert into t (a) values (1)"),
            "INSERT INTO t (a)\n    VALUES (1)"
        );
        assert_eq!(
            format_sql("update t set a = 1 where b is not null"),
            "UPDATE t\n    SET a = 1\n    WHERE b IS NOT NULL"
        );
        assert_eq!(format_sql("delete from t where a in (1, 2)"), "DELETE FROM t\n    WHERE a IN (1, 2)");
    }

    #[test]
    fn test_keyword_substrings_untouched() {
        assert_eq!(
            format_sql("select order_id, selection from orders_from"),
            "SELECT order_id, selection\n    FROM orders_from"
        );
    }

    #[test]
    fn test_literals_untouched() {
        assert_eq!(
            format_sql("select 'select from where' as x, \"Order\" from t where s = 'it''s from'"),
            "SELECT 'select from where' AS x, \"Order\"\n    FROM t\n    WHERE s = 'it''s from'"
        );
    }

    #[test]
    fn test_unterminated_literal_runs_to_end() {
        assert_eq!(format_sql("select 'from x"), "SELECT 'from x");
    }

    #[test]
    fn test_existing_line_breaks_are_indented() {
        assert_eq!(
            format_sql("SELECT a,\n  b\nFROM t"),
            "SELECT a,\n    b\n    FROM t"
        );
    }

    #[test]
    fn test_custom_indent() {
        assert_eq!(SqlFormatter::with_indent(2).format("select a from t"), "SELECT a\n  FROM t");
    }

    #[test]
    fn test_comments_untouched() {
        let formatted = format_sql("select a -- drop from x\nfrom t");
        assert_eq!(formatted, "SELECT a -- drop from x\n    FROM t");
        assert_eq!(formatted.matches("FROM").count(), 1);

        assert_eq!(
            format_sql("select a /* where from */ from t /* open"),
            "SELECT a /* where from */\n    FROM t /* open"
        );
    }

    #[test]
    fn test_begin_is_a_keyword() {
        assert_eq!(format_sql("begin transaction"), "BEGIN transaction");
    }

    #[test]
    fn test_statement_terminator_skips_literals_and_comments() {
        assert_eq!(statement_terminator("SELECT 'a;b' FROM t; x"), Some(19));
        assert_eq!(statement_terminator("SELECT 1 -- ;\nFROM t /* ; */"), None);
        assert_eq!(statement_terminator("SELECT \"a;\" FROM t"), None);
    }

    const VOCAB: &[&str] = &[
        "select", "FROM", "where", "group by", "Order  By", "left join", "inner join", "on",
        "and", "or", "not", "null", "limit", "set", "update", "values", "insert into",
        "delete from", "a", "b_c", "from_x", "t.id", "(", ")", ",", "=", "*", "1", "'it''s'",
        "'from where'", "\"Col\"", "`tick`", "'open", "\n", "\t", "  ", ";",
        "-- from where", "/* select from */", "/* open",
    ];

    const SEPARATORS: &[&str] = &[" ", "", "\n", "  "];

    proptest! {
        #[test]
        fn prop_format_is_idempotent(
            tokens in prop::collection::vec(prop::sample::select(VOCAB), 0..24),
            sep in prop::sample::select(SEPARATORS),
        ) {
            let sql = tokens.join(sep);
            let once = format_sql(&sql);
            let twice = format_sql(&once);
            prop_assert_eq!(twice, once);
        }

        #[test]
        fn prop_format_keeps_tokens(
            tokens in prop::collection::vec(prop::sample::select(VOCAB), 0..24),
        ) {
            let sql = tokens.join(" ");
            let squash = |s: &str| s.split_whitespace().collect::<String>().to_uppercase();
            prop_assert_eq!(squash(&format_sql(&sql)), squash(&sql));
        }
    }
}
