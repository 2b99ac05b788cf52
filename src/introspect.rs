//! Schema introspection.
//!
//! [`SchemaIntrospector`] is the seam between a concrete database source and
//! the generation pipeline. [`DdlIntrospector`] reflects a SQL dump: table
//! definitions, constraints and indexes from the DDL, sample rows from its
//! `INSERT` statements.

use std::io;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::schema::{ColumnInfo, DatabaseInfo, IndexInfo, SampleRow, SchemaModel, TableInfo};
use crate::sql::{
    classify, parse_sql, Dialect, DumpInfo, Literal, ParsedDump, ParsedInsert, ParsedTable,
    TypeFamily,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntrospectError {
    #[error("cannot reach schema source: {0}")]
    Connection(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("cannot reflect schema: {0}")]
    Schema(String),
}

impl From<IntrospectError> for Error {
    fn from(e: IntrospectError) -> Self {
        Error::Schema(e.to_string())
    }
}

/// How much of the schema to reflect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    /// Columns, primary keys and foreign keys.
    Basic,
    /// Adds indexes.
    Standard,
    /// Adds column extras and row-count estimates.
    #[default]
    Full,
}

impl AnalysisDepth {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "basic" => Some(Self::Basic),
            "standard" => Some(Self::Standard),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeOptions {
    pub depth: AnalysisDepth,
    /// Analyze only these tables when set.
    pub include_tables: Option<Vec<String>>,
    pub exclude_tables: Vec<String>,
    pub include_sample_data: bool,
    pub max_sample_rows: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            depth: AnalysisDepth::Full,
            include_tables: None,
            exclude_tables: Vec::new(),
            include_sample_data: true,
            max_sample_rows: 5,
        }
    }
}

impl AnalyzeOptions {
    fn selects(&self, table: &str) -> bool {
        let included = self
            .include_tables
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == table));
        included && !self.exclude_tables.iter().any(|n| n == table)
    }
}

/// Produces a [`SchemaModel`] from some database source.
pub trait SchemaIntrospector {
    fn analyze(&self, options: &AnalyzeOptions) -> Result<SchemaModel, IntrospectError>;
}

enum DdlSource {
    Text(String),
    File(PathBuf),
}

/// Introspector over a SQL dump held in memory or on disk.
pub struct DdlIntrospector {
    source: DdlSource,
    dialect: Dialect,
    name: Option<String>,
}

impl DdlIntrospector {
    pub fn from_sql(sql: impl Into<String>) -> Self {
        Self {
            source: DdlSource::Text(sql.into()),
            dialect: Dialect::Auto,
            name: None,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: DdlSource::File(path.into()),
            dialect: Dialect::Auto,
            name: None,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Database name reported in the model. Defaults to the dump file stem.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn read_source(&self) -> Result<String, IntrospectError> {
        match &self.source {
            DdlSource::Text(sql) => Ok(sql.clone()),
            DdlSource::File(path) => std::fs::read_to_string(path).map_err(|e| {
                let message = format!("{}: {}", path.display(), e);
                match e.kind() {
                    io::ErrorKind::PermissionDenied => IntrospectError::Permission(message),
                    _ => IntrospectError::Connection(message),
                }
            }),
        }
    }

    fn database_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.source {
            DdlSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string()),
            DdlSource::Text(_) => "unknown".to_string(),
        }
    }
}

impl SchemaIntrospector for DdlIntrospector {
    fn analyze(&self, options: &AnalyzeOptions) -> Result<SchemaModel, IntrospectError> {
        let sql = self.read_source()?;
        let dump =
            parse_sql(&sql, self.dialect).map_err(|e| IntrospectError::Schema(e.to_string()))?;
        if dump.tables.is_empty() {
            return Err(IntrospectError::Schema(
                "no CREATE TABLE statements found".to_string(),
            ));
        }

        let hints = DumpInfo::scan(&sql);
        let database_info = DatabaseInfo {
            name: self.database_name(),
            engine: dump.dialect.engine_name().to_string(),
            version: hints.version.unwrap_or_else(|| "unknown".to_string()),
            charset: hints.charset.unwrap_or_else(|| "unknown".to_string()),
        };

        let selected: Vec<&ParsedTable> =
            dump.tables.iter().filter(|t| options.selects(&t.name)).collect();
        debug!(
            found = dump.tables.len(),
            selected = selected.len(),
            dialect = dump.dialect.engine_name(),
            "reflected dump"
        );

        let tables: Vec<TableInfo> = selected
            .iter()
            .map(|parsed| build_table(parsed, &dump, options.depth))
            .collect();

        let mut sample_data = IndexMap::new();
        if options.include_sample_data {
            for table in &tables {
                let rows = collect_samples(table, &dump, options.max_sample_rows);
                sample_data.insert(table.name.clone(), rows);
            }
        }

        let model = SchemaModel::new(database_info, tables).with_sample_data(sample_data);
        let stats = model.stats();
        info!(
            tables = stats.tables_count,
            columns = stats.columns_count,
            "schema analyzed"
        );
        Ok(model)
    }
}

fn build_table(parsed: &ParsedTable, dump: &ParsedDump, depth: AnalysisDepth) -> TableInfo {
    let mut table = TableInfo::new(parsed.name.clone());

    for col in &parsed.columns {
        let mut column = ColumnInfo::new(col.name.clone(), col.raw_type.clone());
        column.nullable = !col.not_null && !col.primary_key;
        column.default = col.default.clone();
        if depth == AnalysisDepth::Full {
            let unique_index = parsed
                .indexes
                .iter()
                .any(|idx| idx.unique && idx.columns == [col.name.as_str()]);
            column.unique = Some(col.unique || unique_index);
            column.indexed = Some(
                parsed
                    .indexes
                    .iter()
                    .any(|idx| idx.columns.iter().any(|c| c == &col.name)),
            );
            column.autoincrement = Some(col.autoincrement);
        }
        table.add_column(column);
    }
    table.set_primary_key(parsed.primary_key.iter().cloned());

    for fk in &parsed.foreign_keys {
        let target_columns = if fk.target_columns.is_empty() {
            referenced_key(dump, &fk.target)
        } else {
            fk.target_columns.clone()
        };
        for (column, references_column) in fk.columns.iter().zip(target_columns) {
            if !table.columns.contains_key(column) {
                warn!(table = %parsed.name, column = %column, "foreign key on unknown column skipped");
                continue;
            }
            table = table.with_foreign_key(column.clone(), fk.target.clone(), references_column);
        }
    }

    if depth != AnalysisDepth::Basic {
        table.indexes = parsed
            .indexes
            .iter()
            .map(|idx| IndexInfo {
                name: idx.name.clone(),
                columns: idx.columns.clone(),
                unique: idx.unique,
            })
            .collect();
        // Inline UNIQUE columns carry an implicit unique index
        for col in parsed.columns.iter().filter(|c| c.unique) {
            let covered = table
                .indexes
                .iter()
                .any(|idx| idx.unique && idx.columns == [col.name.as_str()]);
            if !covered {
                table.indexes.push(IndexInfo {
                    name: None,
                    columns: vec![col.name.clone()],
                    unique: true,
                });
            }
        }
    }

    if depth == AnalysisDepth::Full {
        table.row_count = inserts_for(dump, &parsed.name)
            .map(|insert| insert.rows.len() as u64)
            .sum();
    }

    table
}

/// Primary key of a referenced table, or `id` when unknown.
fn referenced_key(dump: &ParsedDump, target: &str) -> Vec<String> {
    dump.tables
        .iter()
        .find(|t| t.name == target)
        .map(|t| t.primary_key.clone())
        .filter(|pk| !pk.is_empty())
        .unwrap_or_else(|| vec!["id".to_string()])
}

fn inserts_for<'a>(dump: &'a ParsedDump, table: &'a str) -> impl Iterator<Item = &'a ParsedInsert> {
    dump.inserts.iter().filter(move |insert| insert.table == table)
}

fn collect_samples(table: &TableInfo, dump: &ParsedDump, max_rows: usize) -> Vec<SampleRow> {
    let mut samples = Vec::new();

    for insert in inserts_for(dump, &table.name) {
        let names: Vec<&str> = if insert.columns.is_empty() {
            table.columns.keys().map(String::as_str).collect()
        } else {
            insert.columns.iter().map(String::as_str).collect()
        };

        for row in &insert.rows {
            if samples.len() >= max_rows {
                return samples;
            }
            let sample: SampleRow = names
                .iter()
                .zip(row)
                .map(|(name, literal)| {
                    let family = table
                        .columns
                        .get(*name)
                        .map(|c| classify(&c.data_type, dump.dialect))
                        .unwrap_or(TypeFamily::Other);
                    (name.to_string(), literal_value(literal, family))
                })
                .collect();
            samples.push(sample);
        }
    }

    samples
}

fn literal_value(literal: &Literal, family: TypeFamily) -> serde_json::Value {
    use serde_json::Value;

    match literal {
        Literal::Null => Value::Null,
        Literal::Num(n) if family == TypeFamily::Boolean => match n.as_str() {
            "0" => Value::Bool(false),
            "1" => Value::Bool(true),
            _ => Value::String(n.clone()),
        },
        Literal::Num(n) if family == TypeFamily::Text => Value::String(n.clone()),
        Literal::Num(n) => number_value(n),
        Literal::Str(s) if family == TypeFamily::Boolean => match s.as_str() {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            _ => Value::String(s.clone()),
        },
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Word(w) if w.eq_ignore_ascii_case("true") => Value::Bool(true),
        Literal::Word(w) if w.eq_ignore_ascii_case("false") => Value::Bool(false),
        Literal::Word(w) => Value::String(w.clone()),
    }
}

fn number_value(text: &str) -> serde_json::Value {
    if let Ok(i) = text.parse::<i64>() {
        return i.into();
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(text.to_string()))
}
