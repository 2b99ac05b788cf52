//! Question-to-SQL orchestration.
//!
//! [`SqlGenerator`] holds the provider, schema and prompt configuration and
//! drives one question through the pipeline:
//!
//! ```text
//! Idle -> Prompting -> AwaitingProvider -> Parsing -> Formatting -> Validating -> Done
//! ```
//!
//! Any failure after `Idle` moves to `Error` and surfaces as exactly one
//! [`Error`] kind. Nothing is retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::format::format_sql;
use crate::prompt::{FewShotExample, PromptBuilder, PromptTemplate};
use crate::provider::LlmProvider;
use crate::response::{extract_explanation, extract_sql};
use crate::schema::SchemaModel;
use crate::validate::{validate_sql, ValidationVerdict};

const NO_SQL_EXTRACTED: &str = "no se pudo extraer una consulta SQL válida";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Prompting,
    AwaitingProvider,
    Parsing,
    Formatting,
    Validating,
    Done,
    Error,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Prompting => "prompting",
            Phase::AwaitingProvider => "awaiting_provider",
            Phase::Parsing => "parsing",
            Phase::Formatting => "formatting",
            Phase::Validating => "validating",
            Phase::Done => "done",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives progress notifications from [`SqlGenerator::generate`].
pub trait GenerationObserver: Send + Sync {
    fn on_phase_start(&self, _phase: Phase) {}

    /// `fraction` is in `0.0..=1.0` across the whole pipeline.
    fn on_progress(&self, _phase: Phase, _fraction: f32) {}

    fn on_phase_complete(&self, _phase: Phase) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl GenerationObserver for NoopObserver {}

/// Reports phases as `tracing` debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl GenerationObserver for TracingObserver {
    fn on_phase_start(&self, phase: Phase) {
        debug!(%phase, "phase started");
    }

    fn on_progress(&self, phase: Phase, fraction: f32) {
        debug!(%phase, progress = fraction, "generation progress");
    }

    fn on_phase_complete(&self, phase: Phase) {
        debug!(%phase, "phase complete");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationOptions {
    pub validate_sql: bool,
    pub include_explanation: bool,
    pub format_sql: bool,
    /// Passed to the provider, which enforces it.
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            validate_sql: true,
            include_explanation: true,
            format_sql: true,
            timeout: Duration::from_secs(30),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub query: String,
    pub sql: String,
    pub explanation: String,
    pub validation: ValidationVerdict,
    /// Wall-clock time from the start of prompting.
    #[serde(serialize_with = "duration_secs::serialize")]
    pub generation_time: Duration,
}

pub struct SqlGenerator {
    provider: RwLock<Option<Arc<dyn LlmProvider>>>,
    schema: RwLock<Option<Arc<SchemaModel>>>,
    prompt: RwLock<PromptBuilder>,
    observer: Arc<dyn GenerationObserver>,
}

impl Default for SqlGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlGenerator {
    pub fn new() -> Self {
        Self {
            provider: RwLock::new(None),
            schema: RwLock::new(None),
            prompt: RwLock::new(PromptBuilder::default()),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Install `provider`. Any [`LlmProvider`] has a generation entry point,
    /// so the provider is always accepted.
    pub fn set_provider(&self, provider: Arc<dyn LlmProvider>) -> bool {
        debug!(provider = provider.name(), "provider set");
        *self.provider.write() = Some(provider);
        true
    }

    /// Accept `schema` if it passes structural validation. A rejected schema
    /// leaves the previous one in place.
    pub fn set_schema(&self, schema: SchemaModel) -> bool {
        match schema.validate() {
            Ok(()) => {
                debug!(tables = schema.stats().tables_count, "schema set");
                *self.schema.write() = Some(Arc::new(schema));
                true
            }
            Err(e) => {
                warn!(error = %e, "schema rejected");
                false
            }
        }
    }

    pub fn schema(&self) -> Option<Arc<SchemaModel>> {
        self.schema.read().clone()
    }

    /// Replace the prompt template. An invalid template is logged and
    /// ignored, keeping the current one.
    pub fn set_prompt_template(&self, template: &str) {
        match PromptTemplate::parse(template) {
            Ok(parsed) => {
                let mut prompt = self.prompt.write();
                let examples = prompt.examples().to_vec();
                *prompt = PromptBuilder::new(parsed).with_examples(examples);
            }
            Err(e) => warn!(error = %e, "prompt template rejected"),
        }
    }

    pub fn reset_prompt_template(&self) {
        let mut prompt = self.prompt.write();
        let examples = prompt.examples().to_vec();
        *prompt = PromptBuilder::default().with_examples(examples);
    }

    pub fn set_examples(&self, examples: Vec<FewShotExample>) {
        let mut prompt = self.prompt.write();
        *prompt = prompt.clone().with_examples(examples);
    }

    pub fn prompt_template(&self) -> String {
        self.prompt.read().template().source().to_string()
    }

    /// Render the prompt `generate` would send for `question`.
    pub fn build_prompt(&self, question: &str) -> Result<String> {
        let schema = self
            .schema()
            .ok_or_else(|| Error::schema("no schema has been set"))?;
        self.prompt
            .read()
            .build(question, &schema)
            .map_err(|e| Error::generation(format!("failed to build prompt: {e}")))
    }

    pub fn generate(&self, question: &str, options: &GenerationOptions) -> Result<GenerationResult> {
        let provider = self
            .provider
            .read()
            .clone()
            .ok_or_else(|| Error::provider("no provider has been set"))?;
        let schema = self
            .schema()
            .ok_or_else(|| Error::schema("no schema has been set"))?;
        let prompt = self.prompt.read().clone();

        let mut run = Run {
            observer: self.observer.as_ref(),
            phase: Phase::Idle,
        };
        match run.execute(question, options, provider.as_ref(), &schema, &prompt) {
            Ok(result) => {
                info!(
                    elapsed = ?result.generation_time,
                    valid = result.validation.valid,
                    "sql generated"
                );
                Ok(result)
            }
            Err(e) => {
                error!(phase = %run.phase, kind = e.kind(), error = %e, "generation failed");
                run.enter(Phase::Error);
                Err(e)
            }
        }
    }
}

/// State of a single `generate` call.
struct Run<'a> {
    observer: &'a dyn GenerationObserver,
    phase: Phase,
}

const STEPS: f32 = 5.0;

impl Run<'_> {
    fn enter(&mut self, phase: Phase) {
        debug!(from = %self.phase, to = %phase, "transition");
        self.phase = phase;
        self.observer.on_phase_start(phase);
    }

    fn complete(&self, step: f32) {
        self.observer.on_progress(self.phase, step / STEPS);
        self.observer.on_phase_complete(self.phase);
    }

    fn execute(
        &mut self,
        question: &str,
        options: &GenerationOptions,
        provider: &dyn LlmProvider,
        schema: &SchemaModel,
        prompt: &PromptBuilder,
    ) -> Result<GenerationResult> {
        self.enter(Phase::Prompting);
        let started = Instant::now();
        let prompt_text = prompt
            .build(question, schema)
            .map_err(|e| Error::generation(format!("failed to build prompt: {e}")))?;
        self.complete(1.0);

        self.enter(Phase::AwaitingProvider);
        let response = provider
            .generate(&prompt_text, options.timeout)
            .map_err(|e| Error::provider(e.to_string()))?;
        if response.text.trim().is_empty() {
            return Err(Error::generation("provider returned an empty response"));
        }
        self.complete(2.0);

        self.enter(Phase::Parsing);
        let sql = extract_sql(&response.text);
        if sql.is_empty() {
            return Err(Error::generation(NO_SQL_EXTRACTED));
        }
        let explanation = if options.include_explanation {
            extract_explanation(&response.text, &sql)
        } else {
            String::new()
        };
        self.complete(3.0);

        let sql = if options.format_sql {
            self.enter(Phase::Formatting);
            let formatted = format_sql(&sql);
            self.complete(4.0);
            formatted
        } else {
            sql
        };

        let validation = if options.validate_sql {
            self.enter(Phase::Validating);
            let verdict = validate_sql(&sql, Some(schema));
            self.complete(STEPS);
            verdict
        } else {
            ValidationVerdict::passed()
        };

        self.enter(Phase::Done);
        Ok(GenerationResult {
            query: question.to_string(),
            sql,
            explanation,
            validation,
            generation_time: started.elapsed(),
        })
    }
}

/// One-shot generation without keeping a [`SqlGenerator`] around.
pub fn generate_sql(
    question: &str,
    provider: Arc<dyn LlmProvider>,
    schema: SchemaModel,
    options: &GenerationOptions,
) -> Result<GenerationResult> {
    let generator = SqlGenerator::new();
    generator.set_provider(provider);
    if !generator.set_schema(schema) {
        return Err(Error::schema("schema failed structural validation"));
    }
    generator.generate(question, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderFailure, ProviderResponse, StaticProvider};
    use crate::schema::tests::shop_schema;
    use crate::schema::DatabaseInfo;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    const RESPONSE: &str = "Aquí está:\n```sql\nselect count(*) from orders;\n```\nExplicación: cuenta los pedidos.";

    fn generator_with(text: &str) -> SqlGenerator {
        let generator = SqlGenerator::new();
        generator.set_provider(Arc::new(StaticProvider::new(text)));
        assert!(generator.set_schema(shop_schema()));
        generator
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        prompts: Mutex<Vec<(String, Duration)>>,
    }

    impl GenerationObserver for Recorder {
        fn on_phase_start(&self, phase: Phase) {
            self.events.lock().push(phase.to_string());
        }
    }

    impl LlmProvider for Recorder {
        fn generate(&self, prompt: &str, timeout: Duration) -> std::result::Result<ProviderResponse, ProviderFailure> {
            self.prompts.lock().push((prompt.to_string(), timeout));
            Ok(ProviderResponse::new(RESPONSE))
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    struct Failing(ProviderFailure);

    impl LlmProvider for Failing {
        fn generate(&self, _: &str, _: Duration) -> std::result::Result<ProviderResponse, ProviderFailure> {
            Err(self.0.clone())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_full_pipeline() {
        let result = generator_with(RESPONSE)
            .generate("¿Cuántos pedidos hay?", &GenerationOptions::default())
            .unwrap();
        assert_eq!(result.query, "¿Cuántos pedidos hay?");
        assert_eq!(result.sql, "SELECT count(*)\n    FROM orders;");
        assert_eq!(result.explanation, "cuenta los pedidos.");
        assert_eq!(result.validation, ValidationVerdict::passed());
    }

    #[test]
    fn test_missing_provider_then_schema() {
        let generator = SqlGenerator::new();
        let err = generator.generate("q", &GenerationOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Provider(_)));

        generator.set_provider(Arc::new(StaticProvider::new(RESPONSE)));
        let err = generator.generate("q", &GenerationOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_rejected_schema_keeps_previous() {
        let generator = generator_with(RESPONSE);
        assert!(!generator.set_schema(SchemaModel::new(DatabaseInfo::default(), [])));
        assert_eq!(generator.schema().unwrap().stats().tables_count, 2);
    }

    #[test]
    fn test_provider_failure_is_rewrapped() {
        let generator = generator_with(RESPONSE);
        generator.set_provider(Arc::new(Failing(ProviderFailure::Timeout(Duration::from_secs(2)))));
        let err = generator.generate("q", &GenerationOptions::default()).unwrap_err();
        assert_eq!(err, Error::Provider("provider timed out after 2s".to_string()));

        generator.set_provider(Arc::new(Failing(ProviderFailure::Failed("quota exceeded".to_string()))));
        let err = generator.generate("q", &GenerationOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "Provider error: quota exceeded");
    }

    #[test]
    fn test_blank_response_is_generation_error() {
        let err = generator_with("  \n ")
            .generate("q", &GenerationOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn test_nothing_extracted() {
        let err = generator_with("Lo siento, no puedo responder a eso.")
            .generate("q", &GenerationOptions::default())
            .unwrap_err();
        assert_eq!(err, Error::Generation(NO_SQL_EXTRACTED.to_string()));
    }

    #[test]
    fn test_options_disable_stages() {
        let options = GenerationOptions {
            validate_sql: false,
            include_explanation: false,
            format_sql: false,
            ..Default::default()
        };
        let result = generator_with("```sql\nselect * from invoices\n```")
            .generate("q", &options)
            .unwrap();
        assert_eq!(result.sql, "select * from invoices");
        assert_eq!(result.explanation, "");
        assert_eq!(result.validation, ValidationVerdict::passed());
    }

    #[test]
    fn test_validation_failures_are_data() {
        let result = generator_with("```sql\nSELECT * FROM invoices\n```")
            .generate("q", &GenerationOptions::default())
            .unwrap();
        assert!(!result.validation.valid);
        assert_eq!(result.validation.errors, vec!["table not found in schema: invoices"]);
    }

    #[test]
    fn test_observer_sees_phases_and_provider_sees_timeout() {
        let recorder = Arc::new(Recorder::default());
        let generator = SqlGenerator::new().with_observer(recorder.clone());
        assert!(generator.set_provider(recorder.clone()));
        generator.set_schema(shop_schema());

        let options = GenerationOptions {
            format_sql: false,
            timeout: Duration::from_secs(7),
            ..Default::default()
        };
        generator.generate("¿pedidos?", &options).unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["prompting", "awaiting_provider", "parsing", "validating", "done"]
        );
        let prompts = recorder.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].0.contains("¿pedidos?"));
        assert_eq!(prompts[0].1, Duration::from_secs(7));
    }

    #[test]
    fn test_observer_sees_error_phase() {
        let recorder = Arc::new(Recorder::default());
        let generator = SqlGenerator::new().with_observer(recorder.clone());
        generator.set_provider(Arc::new(StaticProvider::new("nada")));
        generator.set_schema(shop_schema());
        assert!(generator.generate("q", &GenerationOptions::default()).is_err());
        assert_eq!(recorder.events.lock().last().map(String::as_str), Some("error"));
    }

    #[test]
    fn test_invalid_template_keeps_previous() {
        let generator = generator_with(RESPONSE);
        generator.set_prompt_template("only {schema}");
        assert_eq!(generator.prompt_template(), crate::prompt::DEFAULT_TEMPLATE);

        generator.set_prompt_template("S={schema} Q={query}");
        assert!(generator.build_prompt("hola").unwrap().ends_with("Q=hola"));

        generator.reset_prompt_template();
        assert_eq!(generator.prompt_template(), crate::prompt::DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_examples_survive_template_changes() {
        let generator = generator_with(RESPONSE);
        generator.set_examples(vec![FewShotExample {
            question: "Clientes".to_string(),
            sql: "SELECT * FROM customers".to_string(),
        }]);
        generator.set_prompt_template("{schema}\n{query}\n{examples}");
        assert!(generator.build_prompt("q").unwrap().contains("Pregunta: Clientes"));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: GenerationOptions =
            serde_json::from_str(r#"{"format_sql": false, "timeout_secs": 2.5}"#).unwrap();
        assert!(!options.format_sql);
        assert!(options.validate_sql);
        assert_eq!(options.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_one_shot_helper() {
        let result = generate_sql(
            "q",
            Arc::new(StaticProvider::new(RESPONSE)),
            shop_schema(),
            &GenerationOptions::default(),
        )
        .unwrap();
        assert!(result.validation.valid);

        let err = generate_sql(
            "q",
            Arc::new(StaticProvider::new(RESPONSE)),
            SchemaModel::new(DatabaseInfo::default(), []),
            &GenerationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
