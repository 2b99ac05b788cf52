//! Prompt construction.
//!
//! A [`PromptTemplate`] is parsed once, when it is registered, so a template
//! lacking `{query}` or `{schema}` is rejected before any generation runs.
//! Rendering then only substitutes values.

use std::collections::HashMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::SchemaModel;

pub const QUERY: &str = "query";
pub const SCHEMA: &str = "schema";
pub const EXAMPLES: &str = "examples";

const REQUIRED: [&str; 2] = [QUERY, SCHEMA];
const KNOWN: [&str; 3] = [QUERY, SCHEMA, EXAMPLES];

pub const DEFAULT_TEMPLATE: &str = r#"
# Tarea: Generar una consulta SQL a partir de una descripción en lenguaje natural

## Esquema de la base de datos
{schema}

## Consulta en lenguaje natural
{query}

## Instrucciones
- Genera una consulta SQL que responda correctamente a la consulta en lenguaje natural.
- La consulta debe ser compatible con el esquema de base de datos proporcionado.
- Utiliza únicamente tablas y columnas que existan en el esquema.
- No inventes nombres de tablas o columnas.
- No utilices funciones o sintaxis específica de un motor de base de datos, a menos que se indique lo contrario.
- Si no es posible generar una consulta SQL con la información disponible, explica por qué.
- Proporciona una breve explicación de lo que hace la consulta y cómo responde a la pregunta.

## Formato de respuesta
Primero proporciona la consulta SQL entre comillas triples con la etiqueta sql:

```sql
-- Tu consulta SQL aquí
```

Luego proporciona una explicación de cómo la consulta resuelve la pregunta:

Explicación:
[Breve explicación de la consulta y cómo responde a la pregunta]

{examples}
"#;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template is missing the {{{0}}} placeholder")]
    MissingPlaceholder(String),
    #[error("template uses unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(String),
}

/// A parsed prompt template with named `{placeholder}` slots.
///
/// `{{` and `}}` produce literal braces. A brace that does not open a
/// well-formed slot name is kept as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        // The built-in template always parses.
        Self::parse(DEFAULT_TEMPLATE).unwrap_or_else(|_| Self {
            source: DEFAULT_TEMPLATE.to_string(),
            segments: vec![Segment::Text(DEFAULT_TEMPLATE.to_string())],
        })
    }
}

impl PromptTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let segments = split_segments(source);

        for slot in segments.iter().filter_map(|s| match s {
            Segment::Slot(name) => Some(name),
            Segment::Text(_) => None,
        }) {
            if !KNOWN.contains(&slot.as_str()) {
                return Err(TemplateError::UnknownPlaceholder(slot.clone()));
            }
        }
        for required in REQUIRED {
            if !segments.contains(&Segment::Slot(required.to_string())) {
                return Err(TemplateError::MissingPlaceholder(required.to_string()));
            }
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute every slot from `values`.
    pub fn render(&self, values: &HashMap<&str, String>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => match values.get(name.as_str()) {
                    Some(value) => out.push_str(value),
                    None => return Err(TemplateError::MissingPlaceholder(name.clone())),
                },
            }
        }
        Ok(out)
    }
}

fn split_segments(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut rest = source;

    while let Some(pos) = rest.find(['{', '}']) {
        text.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            text.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            text.push('}');
            rest = &tail[2..];
        } else if let Some(name) = slot_name(tail) {
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(Segment::Slot(name.to_string()));
            rest = &tail[name.len() + 2..];
        } else {
            text.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    text.push_str(rest);
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }

    segments
}

/// Name of the slot opened at the start of `tail`, if well formed.
fn slot_name(tail: &str) -> Option<&str> {
    let inner = tail.strip_prefix('{')?;
    let end = inner.find('}')?;
    let name = &inner[..end];
    let valid = !name.is_empty()
        && name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// A question paired with the SQL that answers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub question: String,
    pub sql: String,
}

/// Render the schema as the model sees it: tables in stored order, primary
/// key columns marked with `*`, foreign keys, then every relationship.
pub fn schema_summary(schema: &SchemaModel) -> String {
    let mut lines = Vec::new();

    let info = schema.database_info();
    lines.push(format!("Base de datos: {} ({})", info.name, info.engine));

    lines.push("\nESTRUCTURA DE TABLAS:".to_string());
    for (table_name, table) in schema.tables() {
        lines.push(format!("\nTABLA {table_name}"));

        for (column_name, column) in &table.columns {
            let pk_mark = if column.primary_key { "*" } else { "" };
            let null_mark = if column.nullable { "NULL" } else { "NOT NULL" };
            lines.push(format!(
                "  {pk_mark}{column_name} {} {null_mark}",
                column.data_type
            ));
        }

        if !table.foreign_keys.is_empty() {
            lines.push("  FOREIGN KEYS:".to_string());
            for fk in &table.foreign_keys {
                lines.push(format!(
                    "    {} -> {}.{}",
                    fk.column, fk.references_table, fk.references_column
                ));
            }
        }
    }

    if !schema.relationships().is_empty() {
        lines.push("\nRELACIONES:".to_string());
        for rel in schema.relationships() {
            lines.push(format!(
                "  {}.{} -> {}.{} ({})",
                rel.table_from, rel.column_from, rel.table_to, rel.column_to, rel.relationship_type
            ));
        }
    }

    lines.join("\n")
}

/// Few-shot block substituted for `{examples}`. Empty without examples.
pub fn examples_block(examples: &[FewShotExample]) -> String {
    if examples.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Ejemplos\n");
    for example in examples {
        let _ = write!(
            out,
            "\nPregunta: {}\n```sql\n{}\n```\n",
            example.question.trim(),
            example.sql.trim()
        );
    }
    out
}

/// Render `template` for `question` over `schema`.
pub fn build_prompt(
    question: &str,
    schema: &SchemaModel,
    template: &PromptTemplate,
    examples: &[FewShotExample],
) -> Result<String, TemplateError> {
    let values = HashMap::from([
        (QUERY, question.to_string()),
        (SCHEMA, schema_summary(schema)),
        (EXAMPLES, examples_block(examples)),
    ]);
    template.render(&values)
}

/// Template plus few-shot examples, ready to render prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptBuilder {
    template: PromptTemplate,
    examples: Vec<FewShotExample>,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template,
            examples: Vec::new(),
        }
    }

    pub fn with_examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn examples(&self) -> &[FewShotExample] {
        &self.examples
    }

    pub fn build(&self, question: &str, schema: &SchemaModel) -> Result<String, TemplateError> {
        build_prompt(question, schema, &self.template, &self.examples)
    }
}
