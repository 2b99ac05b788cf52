//! SQL dialect detection and dump header hints.

use std::sync::LazyLock;

use regex::Regex;

/// Dialect a dump is written in. Decides type classification, the engine
/// name reported in database info, and string escaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Detect from the dump itself.
    #[default]
    Auto,
    Generic,
    PostgreSQL,
    MySQL,
    SQLite,
}

/// Markers checked in order; the first one found in the lowercased dump
/// decides. Tool banners come before type names.
const HINTS: &[(&str, Dialect)] = &[
    ("postgresql database dump", Dialect::PostgreSQL),
    ("pg_dump", Dialect::PostgreSQL),
    ("-- postgres", Dialect::PostgreSQL),
    ("mysql dump", Dialect::MySQL),
    ("mysqldump", Dialect::MySQL),
    ("mariadb dump", Dialect::MySQL),
    ("-- mysql", Dialect::MySQL),
    ("pragma foreign_keys", Dialect::SQLite),
    ("sqlite_sequence", Dialect::SQLite),
    ("serial", Dialect::PostgreSQL),
    ("text[]", Dialect::PostgreSQL),
    ("::text", Dialect::PostgreSQL),
    ("timestamptz", Dialect::PostgreSQL),
    ("auto_increment", Dialect::MySQL),
    ("tinyint", Dialect::MySQL),
    ("engine=", Dialect::MySQL),
    ("unsigned", Dialect::MySQL),
    ("autoincrement", Dialect::SQLite),
];

impl Dialect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "generic" => Some(Self::Generic),
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" | "sqlite3" => Some(Self::SQLite),
            _ => None,
        }
    }

    pub fn detect(content: &str) -> Self {
        let lower = content.to_lowercase();
        HINTS
            .iter()
            .find(|(marker, _)| lower.contains(marker))
            .map_or(Self::Generic, |(_, dialect)| *dialect)
    }

    /// Resolve `Auto` against `content`; concrete dialects pass through.
    pub fn resolve(self, content: &str) -> Self {
        match self {
            Self::Auto => Self::detect(content),
            other => other,
        }
    }

    pub fn engine_name(self) -> &'static str {
        match self {
            Self::Auto | Self::Generic => "generic",
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }
}

/// Server version and character set announced by a dump, when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpInfo {
    pub version: Option<String>,
    pub charset: Option<String>,
}

static VERSION_HINTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^--\s*Dumped from database version\s+(\S+)",
        r"(?m)^--\s*Server version\s+(\S+)",
        r"(?m)^--\s*SQLite version\s+(\S+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("version hint pattern"))
    .collect()
});

static CHARSET_HINTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)client_encoding\s*=\s*'([\w-]+)'",
        r"(?i)ENCODING\s*=\s*'([\w-]+)'",
        r"(?i)DEFAULT\s+CHARSET\s*=\s*(\w+)",
        r"(?i)SET\s+NAMES\s+(\w+)",
        r#"(?i)PRAGMA\s+encoding\s*=\s*['"]?([\w-]+)"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("charset hint pattern"))
    .collect()
});

impl DumpInfo {
    /// Scan a dump for version and charset hints. The first matching hint wins.
    pub fn scan(content: &str) -> Self {
        let first_capture = |patterns: &[Regex]| {
            patterns
                .iter()
                .find_map(|re| re.captures(content))
                .map(|caps| caps[1].to_string())
        };
        Self {
            version: first_capture(&VERSION_HINTS),
            charset: first_capture(&CHARSET_HINTS),
        }
    }
}
