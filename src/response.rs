//! SQL and explanation extraction from free-form model output.
//!
//! Extraction runs an ordered list of independent [`Strategy`] matchers and
//! keeps the first non-empty hit. No match yields an empty string; callers
//! decide whether that is an error.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::format::statement_terminator;

/// One extraction strategy: a pure function from response text to SQL.
#[derive(Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<&str>,
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy").field("name", &self.name).finish()
    }
}

/// Strategies in priority order.
pub const STRATEGIES: [Strategy; 6] = [
    Strategy {
        name: "sql_fence",
        extract: sql_fence,
    },
    Strategy {
        name: "keyword_fence",
        extract: keyword_fence,
    },
    Strategy {
        name: "labeled_fence",
        extract: labeled_fence,
    },
    Strategy {
        name: "query_labeled_fence",
        extract: query_labeled_fence,
    },
    Strategy {
        name: "labeled_inline",
        extract: labeled_inline,
    },
    Strategy {
        name: "bare_keyword",
        extract: bare_keyword,
    },
];

static SQL_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?i:sql)\b\s*(.*?)\s*```").expect("sql fence pattern"));

static STATEMENT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:SELECT|INSERT|UPDATE|DELETE|CREATE|ALTER|DROP|BEGIN|WITH)\b")
        .expect("statement start pattern")
});

static FENCE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+-]*[ \t]*\r?$").expect("fence tag pattern"));

static LABELED_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)SQL:\s*```\s*(.*?)\s*```").expect("labeled fence pattern"));

static QUERY_LABELED_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)SQL Query:\s*```\s*(.*?)\s*```").expect("query labeled fence pattern")
});

static LABELED_INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)SQL:\s*((?i:SELECT|INSERT|UPDATE|DELETE|CREATE|ALTER|DROP|BEGIN|WITH)\b.*?;)",
    )
    .expect("labeled inline pattern")
});

// Upper-case only: these are searched for in prose. The statement kinds
// match STATEMENT_START so formatted output re-extracts.
static BARE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(?:SELECT|INSERT|UPDATE|DELETE|CREATE|ALTER|DROP)\s+\S|BEGIN\b|WITH\s+(?i:RECURSIVE\s+)?\w+\s*(?:\([^)]*\)\s*)?AS\s*\()",
    )
    .expect("bare keyword pattern")
});

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").expect("fenced block pattern"));

static EXPLANATION_MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["Explicación:", "Explanation:", "Esta consulta:", "This query:"]
        .iter()
        .map(|marker| {
            Regex::new(&format!(r"(?s){}(.*?)(?:```|$)", regex::escape(marker)))
                .expect("explanation marker pattern")
        })
        .collect()
});

fn first_group<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

/// Fenced block tagged `sql`.
fn sql_fence(text: &str) -> Option<&str> {
    first_group(&SQL_FENCE, text)
}

/// Fenced block whose content, after an optional info string, opens with a
/// statement keyword. Blocks are taken in open/close pairs.
fn keyword_fence(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| {
            let body = body.as_str();
            let untagged = match body.split_once('\n') {
                Some((tag, rest)) if FENCE_TAG.is_match(tag) => rest,
                _ => body,
            };
            [untagged, body]
                .into_iter()
                .map(str::trim)
                .find(|content| STATEMENT_START.is_match(content))
        })
}

/// `SQL:` label followed by a fenced block.
fn labeled_fence(text: &str) -> Option<&str> {
    first_group(&LABELED_FENCE, text)
}

/// `SQL Query:` label followed by a fenced block.
fn query_labeled_fence(text: &str) -> Option<&str> {
    first_group(&QUERY_LABELED_FENCE, text)
}

/// `SQL:` label followed by an inline statement ending in `;`.
fn labeled_inline(text: &str) -> Option<&str> {
    first_group(&LABELED_INLINE, text)
}

/// Left-most statement phrase, through the next `;` outside quotes and
/// comments, or the end of text.
fn bare_keyword(text: &str) -> Option<&str> {
    let start = BARE_KEYWORD.find(text)?.start();
    let rest = &text[start..];
    match statement_terminator(rest) {
        Some(end) => Some(&rest[..=end]),
        None => Some(rest),
    }
}

/// Extract the SQL statement from a model response, or an empty string.
pub fn extract_sql(text: &str) -> String {
    for strategy in &STRATEGIES {
        if let Some(sql) = (strategy.extract)(text) {
            let sql = sql.trim();
            if !sql.is_empty() {
                debug!(strategy = strategy.name, "sql extracted");
                return sql.to_string();
            }
        }
    }
    debug!("no extraction strategy matched");
    String::new()
}

/// Extract the explanation that accompanies `sql` in a model response.
pub fn extract_explanation(text: &str, sql: &str) -> String {
    for marker in EXPLANATION_MARKERS.iter() {
        if let Some(found) = first_group(marker, text) {
            return found.trim().to_string();
        }
    }

    if !sql.is_empty() {
        let without_blocks = FENCED_BLOCK.replace_all(text, "");
        let remainder = without_blocks.replace(sql, "");
        let remainder = remainder.trim();
        if !remainder.is_empty() {
            return remainder.to_string();
        }
    }

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_sql;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const TAGGED: &str = "Aquí está la consulta:\n\n```sql\nSELECT id FROM users;\n```\n\nExplicación: filtra usuarios por id.";

    #[test]
    fn test_tagged_fence_and_explanation() {
        let sql = extract_sql(TAGGED);
        assert_eq!(sql, "SELECT id FROM users;");
        let explanation = extract_explanation(TAGGED, &sql);
        assert!(explanation.contains("filtra usuarios"));
    }

    #[test]
    fn test_tag_is_case_insensitive() {
        assert_eq!(extract_sql("```SQL\nSELECT 1 FROM t\n```"), "SELECT 1 FROM t");
    }

    #[test]
    fn test_untagged_fence_with_keyword() {
        let text = "Try this:\n```\nselect name from products where price > 10\n```";
        assert_eq!(
            keyword_fence(text).map(str::trim),
            Some("select name from products where price > 10")
        );
        assert_eq!(extract_sql(text), "select name from products where price > 10");
    }

    #[test]
    fn test_untagged_fence_without_keyword_is_skipped() {
        assert_eq!(keyword_fence("```\nprint('hi')\n```"), None);
    }

    #[test]
    fn test_fences_pair_up() {
        let text = "```python\nx = 1\n```\nselect is mentioned here\n```\nmore\n```";
        assert_eq!(keyword_fence(text), None);

        let text = "```text\nnotes\n```\n\n```\nDELETE FROM t\n```";
        assert_eq!(keyword_fence(text), Some("DELETE FROM t"));
        assert_eq!(keyword_fence("```select 1 from t```"), Some("select 1 from t"));
    }

    #[test]
    fn test_labeled_fences() {
        assert_eq!(
            labeled_fence("SQL: ```call refresh_stats()```"),
            Some("call refresh_stats()")
        );
        assert_eq!(
            query_labeled_fence("SQL Query:\n```\nexec report\n```"),
            Some("exec report")
        );
        assert_eq!(extract_sql("SQL Query:\n```\nexec report\n```"), "exec report");
    }

    #[test]
    fn test_labeled_inline() {
        let text = "SQL: SELECT * FROM orders WHERE total > 5; that is all";
        assert_eq!(labeled_inline(text), Some("SELECT * FROM orders WHERE total > 5;"));
        assert_eq!(extract_sql(text), "SELECT * FROM orders WHERE total > 5;");
    }

    #[test]
    fn test_bare_keyword_stops_at_terminator() {
        let text = "The answer is SELECT COUNT(*) FROM customers; it counts rows.";
        assert_eq!(extract_sql(text), "SELECT COUNT(*) FROM customers;");
    }

    #[test]
    fn test_bare_keyword_runs_to_end_without_terminator() {
        let text = "Use DELETE FROM sessions WHERE expired = 1";
        assert_eq!(extract_sql(text), "DELETE FROM sessions WHERE expired = 1");
    }

    #[test]
    fn test_bare_keyword_takes_leftmost_phrase() {
        let text = "UPDATE accounts SET flagged = 1 WHERE id IN (SELECT id FROM audits);";
        assert_eq!(bare_keyword(text), Some(text));
    }

    #[test]
    fn test_bare_keyword_keeps_cte_prefix() {
        let text = "WITH recent AS (SELECT * FROM orders) SELECT COUNT(*) FROM recent;";
        assert_eq!(extract_sql(text), text);
    }

    #[test]
    fn test_bare_keyword_skips_quoted_terminators() {
        assert_eq!(
            bare_keyword("SELECT 'a;b' AS c FROM t -- no; really\nWHERE x = 1; rest"),
            Some("SELECT 'a;b' AS c FROM t -- no; really\nWHERE x = 1;")
        );
        assert_eq!(bare_keyword("SELECT 'a;b' AS c\n    FROM t"), Some("SELECT 'a;b' AS c\n    FROM t"));
    }

    #[test]
    fn test_bare_keyword_covers_fenced_statement_kinds() {
        assert_eq!(extract_sql("CREATE index idx ON t (a)"), "CREATE index idx ON t (a)");
        assert_eq!(extract_sql("then DROP view v;"), "DROP view v;");
        assert_eq!(extract_sql("BEGIN;"), "BEGIN;");
        assert_eq!(
            extract_sql("WITH RECURSIVE n(i) AS (SELECT 1) SELECT i FROM n"),
            "WITH RECURSIVE n(i) AS (SELECT 1) SELECT i FROM n"
        );
    }

    #[test]
    fn test_formatted_output_reextracts() {
        for response in [
            "```sql\nSELECT 'a;b' AS c FROM t\n```",
            "```sql\ncreate index idx on t (a)\n```",
            "```\nbegin transaction\n```",
            "```\ndrop view v;\n```",
        ] {
            let first = extract_sql(response);
            assert!(!first.is_empty(), "{response}");
            let again = extract_sql(&format_sql(&first));
            assert_eq!(squash(&again), squash(&first), "{response}");
        }
    }

    #[test]
    fn test_bare_keyword_ignores_identifiers() {
        assert_eq!(bare_keyword("see the SELECTION column"), None);
        assert_eq!(bare_keyword("we select nothing"), None);
    }

    #[test]
    fn test_no_match_is_empty() {
        assert_eq!(extract_sql("I cannot answer that with this schema."), "");
        assert_eq!(extract_sql("```sql\n```"), "");
    }

    #[test]
    fn test_explanation_markers_in_order() {
        let text = "```sql\nSELECT 1 FROM t\n```\nExplanation: returns one.\nThis query: ignored";
        assert_eq!(
            extract_explanation(text, "SELECT 1 FROM t"),
            "returns one.\nThis query: ignored"
        );

        let text = "Esta consulta: cuenta filas\n```sql\nSELECT COUNT(*) FROM t\n```";
        assert_eq!(extract_explanation(text, ""), "cuenta filas");
    }

    #[test]
    fn test_explanation_fallback_strips_sql() {
        let text = "Counts orders per customer.\n```sql\nSELECT customer_id, COUNT(*) FROM orders GROUP BY customer_id\n```";
        let sql = extract_sql(text);
        assert_eq!(extract_explanation(text, &sql), "Counts orders per customer.");

        let text = "Run SELECT * FROM t;";
        assert_eq!(extract_explanation(text, "SELECT * FROM t;"), "Run");
    }

    #[test]
    fn test_explanation_falls_back_to_whole_response() {
        let text = "```sql\nSELECT 1 FROM t\n```";
        assert_eq!(extract_explanation(text, "SELECT 1 FROM t"), text);
        assert_eq!(extract_explanation("  nothing here ", ""), "nothing here");
    }

    fn squash(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
    }

    proptest! {
        #[test]
        fn prop_reextraction_is_stable(
            columns in prop::collection::vec("[a-z][a-z_]{0,6}", 1..4),
            table in "[a-z][a-z_]{0,8}",
            filter in proptest::option::of("[a-z; ]{0,8}"),
            limit in proptest::option::of(1u32..100),
        ) {
            let mut sql = format!("select {} from {}", columns.join(", "), table);
            if let Some(value) = filter {
                sql.push_str(&format!(" where {} = '{value}'", columns[0]));
            }
            if let Some(n) = limit {
                sql.push_str(&format!(" limit {n}"));
            }
            sql.push(';');
            let response = format!("Sure.\n```sql\n{sql}\n```\nExplanation: done");

            let first = extract_sql(&response);
            let again = extract_sql(&format_sql(&first));
            prop_assert_eq!(squash(&again), squash(&first));
        }
    }
}
