//! Column type classification.

use super::Dialect;

/// Broad family of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Temporal,
    Json,
    Binary,
    Other,
}

impl TypeFamily {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

/// Classify a declared SQL type.
pub fn classify(sql_type: &str, dialect: Dialect) -> TypeFamily {
    let lower = sql_type.trim().to_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();
    // Drop modifiers such as UNSIGNED and array brackets
    let base = base.strip_suffix(" unsigned").unwrap_or(base);
    if base.ends_with("[]") {
        return TypeFamily::Other;
    }

    match dialect {
        Dialect::PostgreSQL => classify_postgres(base),
        Dialect::MySQL => classify_mysql(base, &lower),
        Dialect::SQLite => classify_sqlite(base),
        _ => classify_generic(base),
    }
}

fn classify_postgres(base: &str) -> TypeFamily {
    match base {
        "int" | "int4" | "integer" | "serial" | "serial4" | "bigint" | "int8" | "bigserial"
        | "serial8" | "smallint" | "int2" | "smallserial" | "serial2" => TypeFamily::Integer,
        "real" | "float4" | "double precision" | "float8" => TypeFamily::Float,
        "decimal" | "numeric" | "money" => TypeFamily::Decimal,
        "varchar" | "character varying" | "char" | "character" | "text" | "citext" | "uuid" => {
            TypeFamily::Text
        }
        "boolean" | "bool" => TypeFamily::Boolean,
        "bytea" => TypeFamily::Binary,
        "json" | "jsonb" => TypeFamily::Json,
        t if t.starts_with("time") => TypeFamily::Temporal,
        "date" | "interval" => TypeFamily::Temporal,
        _ => TypeFamily::Other,
    }
}

fn classify_mysql(base: &str, full: &str) -> TypeFamily {
    match base {
        // TINYINT(1) is the conventional boolean
        "tinyint" if full.starts_with("tinyint(1)") => TypeFamily::Boolean,
        "int" | "integer" | "bigint" | "smallint" | "mediumint" | "tinyint" => {
            TypeFamily::Integer
        }
        "float" | "double" | "real" => TypeFamily::Float,
        "decimal" | "numeric" => TypeFamily::Decimal,
        "varchar" | "char" | "text" | "longtext" | "mediumtext" | "tinytext" | "enum" | "set" => {
            TypeFamily::Text
        }
        "bool" | "boolean" | "bit" => TypeFamily::Boolean,
        "datetime" | "timestamp" | "date" | "time" | "year" => TypeFamily::Temporal,
        "blob" | "longblob" | "mediumblob" | "tinyblob" | "binary" | "varbinary" => {
            TypeFamily::Binary
        }
        "json" => TypeFamily::Json,
        _ => TypeFamily::Other,
    }
}

/// SQLite type affinity rules, by substring.
fn classify_sqlite(base: &str) -> TypeFamily {
    if base.contains("int") {
        TypeFamily::Integer
    } else if base.contains("char") || base.contains("clob") || base.contains("text") {
        TypeFamily::Text
    } else if base.is_empty() || base.contains("blob") {
        TypeFamily::Binary
    } else if base.contains("real") || base.contains("floa") || base.contains("doub") {
        TypeFamily::Float
    } else if base.starts_with("bool") {
        TypeFamily::Boolean
    } else if base.starts_with("date") || base.starts_with("time") {
        TypeFamily::Temporal
    } else {
        TypeFamily::Decimal
    }
}

fn classify_generic(base: &str) -> TypeFamily {
    match base {
        "int" | "integer" | "bigint" | "smallint" | "tinyint" => TypeFamily::Integer,
        "real" | "float" | "double" | "double precision" => TypeFamily::Float,
        "decimal" | "numeric" => TypeFamily::Decimal,
        "varchar" | "character varying" | "char" | "character" | "text" | "nvarchar" => {
            TypeFamily::Text
        }
        "timestamp" | "datetime" | "date" | "time" => TypeFamily::Temporal,
        "boolean" | "bool" | "bit" => TypeFamily::Boolean,
        "blob" | "varbinary" => TypeFamily::Binary,
        "json" => TypeFamily::Json,
        _ => TypeFamily::Other,
    }
}
