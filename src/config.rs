//! TOML configuration file.
//!
//! Every section is optional. Command-line flags override file values.
//!
//! ```toml
//! [generation]
//! format_sql = true
//! timeout_secs = 60
//!
//! [provider]
//! command = "llm"
//! args = ["-m", "local"]
//!
//! [schema]
//! dialect = "postgres"
//! depth = "standard"
//! exclude_tables = ["schema_migrations"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generator::GenerationOptions;
use crate::introspect::{AnalysisDepth, AnalyzeOptions};
use crate::prompt::{FewShotExample, PromptTemplate, TemplateError};
use crate::provider::CommandProvider;
use crate::sql::Dialect;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown dialect '{0}'")]
    Dialect(String),
    #[error("prompt template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        source: TemplateError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub generation: GenerationOptions,
    pub prompt: PromptConfig,
    pub provider: ProviderConfig,
    pub schema: SchemaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptConfig {
    /// Replaces the built-in template when set.
    pub template_file: Option<PathBuf>,
    pub examples: Vec<FewShotExample>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaConfig {
    pub dialect: String,
    pub depth: AnalysisDepth,
    pub include_tables: Option<Vec<String>>,
    pub exclude_tables: Vec<String>,
    pub include_sample_data: bool,
    pub max_sample_rows: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        let analyze = AnalyzeOptions::default();
        Self {
            dialect: "auto".to_string(),
            depth: analyze.depth,
            include_tables: analyze.include_tables,
            exclude_tables: analyze.exclude_tables,
            include_sample_data: analyze.include_sample_data,
            max_sample_rows: analyze.max_sample_rows,
        }
    }
}

impl SchemaConfig {
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        Dialect::from_str(&self.dialect).ok_or_else(|| ConfigError::Dialect(self.dialect.clone()))
    }

    pub fn analyze_options(&self) -> AnalyzeOptions {
        AnalyzeOptions {
            depth: self.depth,
            include_tables: self.include_tables.clone(),
            exclude_tables: self.exclude_tables.clone(),
            include_sample_data: self.include_sample_data,
            max_sample_rows: self.max_sample_rows,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        // Template paths are relative to the config file
        if let (Some(template), Some(dir)) = (&config.prompt.template_file, path.parent()) {
            if template.is_relative() {
                config.prompt.template_file = Some(dir.join(template));
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.schema.dialect()?;
        Ok(config)
    }

    /// Source of the configured template file, checked for the required
    /// placeholders.
    pub fn prompt_template(&self) -> Result<Option<String>, ConfigError> {
        let Some(path) = &self.prompt.template_file else {
            return Ok(None);
        };
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        PromptTemplate::parse(&source).map_err(|source| ConfigError::Template {
            path: path.clone(),
            source,
        })?;
        Ok(Some(source))
    }

    pub fn command_provider(&self) -> Option<CommandProvider> {
        self.provider
            .command
            .as_ref()
            .map(|command| CommandProvider::new(command).with_args(self.provider.args.clone()))
    }
}
