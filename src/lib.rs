pub mod config;
pub mod error;
pub mod format;
pub mod generator;
pub mod introspect;
pub mod measure;
pub mod prompt;
pub mod provider;
pub mod response;
pub mod schema;
pub mod sql;
pub mod validate;

use js_sys::{Array, Object, Reflect};
use wasm_bindgen::prelude::*;

pub use error::{Error, Result};
pub use generator::{GenerationOptions, GenerationResult, SqlGenerator};
pub use schema::SchemaModel;

use introspect::{AnalyzeOptions, DdlIntrospector, SchemaIntrospector};

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

#[wasm_bindgen(js_name = "formatSql")]
pub fn format_sql(sql: &str) -> String {
    format::format_sql(sql)
}

#[wasm_bindgen(js_name = "extractSql")]
pub fn extract_sql(text: &str) -> String {
    response::extract_sql(text)
}

#[wasm_bindgen(js_name = "extractExplanation")]
pub fn extract_explanation(text: &str, sql: &str) -> String {
    response::extract_explanation(text, sql)
}

/// Validate SQL, optionally against a schema model in JSON form.
/// Returns `{ valid, errors }`.
#[wasm_bindgen(js_name = "validateSql")]
pub fn validate_sql(sql: &str, schema_json: Option<String>) -> std::result::Result<JsValue, String> {
    let schema = schema_json
        .as_deref()
        .map(SchemaModel::from_json)
        .transpose()
        .map_err(|e| e.to_string())?;
    let verdict = validate::validate_sql(sql, schema.as_ref());

    let errors: Array = verdict.errors.iter().map(|e| JsValue::from_str(e)).collect();
    let out = Object::new();
    Reflect::set(&out, &"valid".into(), &JsValue::from_bool(verdict.valid))
        .and_then(|_| Reflect::set(&out, &"errors".into(), &errors))
        .map_err(|_| "failed to build verdict object".to_string())?;
    Ok(out.into())
}

/// Render the default prompt for `question` over a schema model in JSON form.
#[wasm_bindgen(js_name = "buildPrompt")]
pub fn build_prompt(question: &str, schema_json: &str) -> std::result::Result<String, String> {
    let schema = SchemaModel::from_json(schema_json).map_err(|e| e.to_string())?;
    prompt::PromptBuilder::default()
        .build(question, &schema)
        .map_err(|e| e.to_string())
}

/// Reflect a SQL dump into a schema model, returned as JSON.
#[wasm_bindgen(js_name = "analyzeDdl")]
pub fn analyze_ddl(ddl: &str, dialect: Option<String>) -> std::result::Result<String, String> {
    let dialect = match dialect.as_deref() {
        Some(name) => sql::Dialect::from_str(name).ok_or_else(|| format!("unknown dialect '{name}'"))?,
        None => sql::Dialect::Auto,
    };
    let model = DdlIntrospector::from_sql(ddl)
        .with_dialect(dialect)
        .analyze(&AnalyzeOptions::default())
        .map_err(|e| e.to_string())?;
    model.to_json_pretty().map_err(|e| e.to_string())
}
