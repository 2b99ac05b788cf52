//! Normalized in-memory schema model.
//!
//! A [`SchemaModel`] is built once per analysis pass. Relationships and stats
//! are derived from the tables and recomputed whenever the table set changes;
//! they are never edited directly.

use std::fmt::Write;

use indexmap::IndexMap;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Descriptive information about the analyzed database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub engine: String,
    pub version: String,
    pub charset: String,
}

impl Default for DatabaseInfo {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            engine: "unknown".to_string(),
            version: "unknown".to_string(),
            charset: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(default)]
    pub name: String,
    /// Declared type, engine specific.
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    // Extras below are only filled in by a full-depth analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoincrement: Option<bool>,
}

fn default_true() -> bool {
    true
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            default: None,
            unique: None,
            indexed: None,
            autoincrement: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = Some(true);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    #[serde(default)]
    pub name: String,
    pub columns: IndexMap<String, ColumnInfo>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyInfo>,
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    /// Advisory estimate only; 0 when unavailable.
    #[serde(default)]
    pub row_count: u64,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            row_count: 0,
        }
    }

    /// Add a column. A column flagged as primary key joins the key set.
    pub fn add_column(&mut self, column: ColumnInfo) {
        if column.primary_key && !self.primary_key.contains(&column.name) {
            self.primary_key.push(column.name.clone());
        }
        self.columns.insert(column.name.clone(), column);
    }

    pub fn with_column(mut self, column: ColumnInfo) -> Self {
        self.add_column(column);
        self
    }

    /// Replace the primary key, keeping column flags in sync.
    /// Names that are not columns of this table are dropped.
    pub fn set_primary_key<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut key = Vec::new();
        for name in columns {
            let name = name.into();
            if self.columns.contains_key(&name) && !key.contains(&name) {
                key.push(name);
            }
        }
        for column in self.columns.values_mut() {
            column.primary_key = key.contains(&column.name);
            if column.primary_key {
                column.nullable = false;
            }
        }
        self.primary_key = key;
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_primary_key(columns);
        self
    }

    pub fn with_foreign_key(
        mut self,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyInfo {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        });
        self
    }

    pub fn with_index(mut self, name: Option<&str>, columns: &[&str], unique: bool) -> Self {
        self.indexes.push(IndexInfo {
            name: name.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        });
        self
    }

    /// Whether `column` is a primary-key member, covered by a unique index,
    /// or carries the unique extra.
    pub fn is_unique(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column)
            || self
                .indexes
                .iter()
                .any(|idx| idx.unique && idx.columns.iter().any(|c| c == column))
            || self
                .columns
                .get(column)
                .is_some_and(|c| c.unique == Some(true))
    }

    fn validate(&self) -> std::result::Result<(), String> {
        for pk in &self.primary_key {
            match self.columns.get(pk) {
                None => {
                    return Err(format!(
                        "primary key column '{}' is not a column of table '{}'",
                        pk, self.name
                    ));
                }
                Some(col) if !col.primary_key => {
                    return Err(format!(
                        "column '{}.{}' is in the primary key but not flagged as such",
                        self.name, pk
                    ));
                }
                _ => {}
            }
        }
        if let Some(col) = self
            .columns
            .values()
            .find(|c| c.primary_key && !self.primary_key.contains(&c.name))
        {
            return Err(format!(
                "column '{}.{}' is flagged as primary key but missing from the key",
                self.name, col.name
            ));
        }
        for fk in &self.foreign_keys {
            if !self.columns.contains_key(&fk.column) {
                return Err(format!(
                    "foreign key column '{}' is not a column of table '{}'",
                    fk.column, self.name
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    OneToOne,
    OneToMany,
    ManyToOne,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub table_from: String,
    pub column_from: String,
    pub table_to: String,
    pub column_to: String,
    pub relationship_type: RelationshipType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaStats {
    pub tables_count: usize,
    pub columns_count: usize,
    pub foreign_keys_count: usize,
    pub primary_keys_count: usize,
    pub indexes_count: usize,
}

impl SchemaStats {
    fn compute(tables: &IndexMap<String, TableInfo>) -> Self {
        tables.values().fold(
            SchemaStats {
                tables_count: tables.len(),
                ..Default::default()
            },
            |mut stats, table| {
                stats.columns_count += table.columns.len();
                stats.foreign_keys_count += table.foreign_keys.len();
                stats.primary_keys_count += table.primary_key.len();
                stats.indexes_count += table.indexes.len();
                stats
            },
        )
    }
}

/// One sample row, keyed by column name.
pub type SampleRow = IndexMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDocument")]
pub struct SchemaModel {
    database_info: DatabaseInfo,
    tables: IndexMap<String, TableInfo>,
    relationships: Vec<Relationship>,
    stats: SchemaStats,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    sample_data: IndexMap<String, Vec<SampleRow>>,
}

/// Wire shape accepted by [`SchemaModel::from_json`]. `tables` and
/// `relationships` are required keys; the stored relationships are ignored
/// and recomputed.
#[derive(Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    database_info: DatabaseInfo,
    tables: IndexMap<String, TableInfo>,
    #[allow(dead_code)]
    relationships: IgnoredAny,
    #[serde(default)]
    sample_data: IndexMap<String, Vec<SampleRow>>,
}

impl TryFrom<SchemaDocument> for SchemaModel {
    type Error = Error;

    fn try_from(doc: SchemaDocument) -> Result<Self> {
        let mut tables = Vec::with_capacity(doc.tables.len());
        for (key, mut table) in doc.tables {
            if table.name.is_empty() {
                table.name = key.clone();
            } else if table.name != key {
                return Err(Error::schema(format!(
                    "table key '{}' does not match table name '{}'",
                    key, table.name
                )));
            }
            for (col_key, column) in table.columns.iter_mut() {
                if column.name.is_empty() {
                    column.name = col_key.clone();
                }
            }
            tables.push(table);
        }
        let mut model = SchemaModel::new(doc.database_info, tables);
        model.sample_data = doc.sample_data;
        Ok(model)
    }
}

impl SchemaModel {
    pub fn new(database_info: DatabaseInfo, tables: impl IntoIterator<Item = TableInfo>) -> Self {
        let tables: IndexMap<String, TableInfo> =
            tables.into_iter().map(|t| (t.name.clone(), t)).collect();
        let mut model = Self {
            database_info,
            tables,
            relationships: Vec::new(),
            stats: SchemaStats::default(),
            sample_data: IndexMap::new(),
        };
        model.refresh();
        model
    }

    /// Parse a JSON schema document.
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| Error::schema(format!("invalid schema document: {e}")))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::schema(e.to_string()))
    }

    pub fn database_info(&self) -> &DatabaseInfo {
        &self.database_info
    }

    pub fn tables(&self) -> &IndexMap<String, TableInfo> {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Look up a table by exact name, falling back to ASCII case-insensitive.
    pub fn find_table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name).or_else(|| {
            self.tables
                .values()
                .find(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn stats(&self) -> SchemaStats {
        self.stats
    }

    pub fn sample_data(&self) -> &IndexMap<String, Vec<SampleRow>> {
        &self.sample_data
    }

    pub fn with_sample_data(mut self, sample_data: IndexMap<String, Vec<SampleRow>>) -> Self {
        self.sample_data = sample_data;
        self
    }

    pub fn remove_table(&mut self, name: &str) -> Option<TableInfo> {
        let removed = self.tables.shift_remove(name);
        if removed.is_some() {
            self.sample_data.shift_remove(name);
            self.refresh();
        }
        removed
    }

    fn refresh(&mut self) {
        self.relationships = infer_relationships(&self.tables);
        self.stats = SchemaStats::compute(&self.tables);
    }

    /// Structural checks applied before a schema is accepted for generation.
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(Error::schema("schema contains no tables"));
        }
        for (key, table) in &self.tables {
            if key != &table.name {
                return Err(Error::schema(format!(
                    "table key '{}' does not match table name '{}'",
                    key, table.name
                )));
            }
            table.validate().map_err(Error::Schema)?;
        }
        Ok(())
    }

    /// Human-readable listing with key information and column constraints.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let info = &self.database_info;
        let _ = writeln!(out, "Database: {} ({} {})", info.name, info.engine, info.version);
        let _ = writeln!(
            out,
            "Tables: {}, Columns: {}",
            self.stats.tables_count, self.stats.columns_count
        );

        for table in self.tables.values() {
            let _ = writeln!(out, "\nTable {}:", table.name);
            for column in table.columns.values() {
                let key_info = if column.primary_key {
                    " (primary key)".to_string()
                } else if let Some(fk) = table.foreign_keys.iter().find(|fk| fk.column == column.name) {
                    format!(
                        " (foreign key -> {}.{})",
                        fk.references_table, fk.references_column
                    )
                } else {
                    String::new()
                };
                let _ = write!(out, "  - {} ({}){}", column.name, column.data_type, key_info);

                let mut constraints = Vec::new();
                if !column.nullable {
                    constraints.push("NOT NULL".to_string());
                }
                if let Some(default) = &column.default {
                    constraints.push(format!("DEFAULT {default}"));
                }
                if column.unique == Some(true) {
                    constraints.push("UNIQUE".to_string());
                }
                if column.autoincrement == Some(true) {
                    constraints.push("AUTOINCREMENT".to_string());
                }
                if !constraints.is_empty() {
                    let _ = write!(out, ": {}", constraints.join(" "));
                }
                out.push('\n');
            }
        }
        out
    }
}

/// Derive one relationship per foreign key.
///
/// A referenced table outside the analyzed set yields `many_to_one` without
/// any uniqueness check.
pub fn infer_relationships(tables: &IndexMap<String, TableInfo>) -> Vec<Relationship> {
    let mut relationships = Vec::new();

    for (table_name, table) in tables {
        for fk in &table.foreign_keys {
            let relationship_type = match tables.get(&fk.references_table) {
                Some(target) => {
                    let from_is_unique = table.is_unique(&fk.column);
                    let to_is_unique = target.is_unique(&fk.references_column);
                    match (from_is_unique, to_is_unique) {
                        (true, true) => RelationshipType::OneToOne,
                        (true, false) => RelationshipType::OneToMany,
                        _ => RelationshipType::ManyToOne,
                    }
                }
                None => RelationshipType::ManyToOne,
            };

            relationships.push(Relationship {
                table_from: table_name.clone(),
                column_from: fk.column.clone(),
                table_to: fk.references_table.clone(),
                column_to: fk.references_column.clone(),
                relationship_type,
            });
        }
    }

    relationships
}
