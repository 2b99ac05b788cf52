use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use nlsql::config::Config;
use nlsql::generator::{GenerationOptions, SqlGenerator, TracingObserver};
use nlsql::introspect::{AnalysisDepth, DdlIntrospector, SchemaIntrospector};
use nlsql::measure::TextTable;
use nlsql::provider::{LlmProvider, StaticProvider};
use nlsql::schema::SchemaModel;
use nlsql::sql::Dialect;
use nlsql::validate::validate_sql;

#[derive(Parser, Debug)]
#[command(name = "nlsql", version)]
#[command(about = "Turn natural-language questions into SQL grounded in a database schema")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a SQL dump and print its schema
    Schema {
        #[command(flatten)]
        source: SchemaSource,

        /// Print the schema model as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the prompt that would be sent for a question
    Prompt {
        #[command(flatten)]
        source: SchemaSource,

        question: String,
    },
    /// Generate SQL for a question
    Generate {
        #[command(flatten)]
        source: SchemaSource,

        question: String,

        /// Provider command; receives the prompt on stdin
        #[arg(long, value_name = "CMD", conflicts_with = "response_file")]
        provider_cmd: Option<String>,

        /// Extra argument for the provider command (repeatable)
        #[arg(long = "provider-arg", value_name = "ARG", allow_hyphen_values = true)]
        provider_args: Vec<String>,

        /// Use a saved model response instead of calling a provider
        #[arg(long, value_name = "PATH")]
        response_file: Option<PathBuf>,

        /// Provider timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,

        #[arg(long)]
        no_format: bool,

        #[arg(long)]
        no_validate: bool,

        #[arg(long)]
        no_explanation: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check SQL against a schema
    Validate {
        #[command(flatten)]
        source: SchemaSource,

        /// SQL text, or `-` to read stdin
        sql: String,
    },
    /// Format SQL
    Format {
        /// SQL text, or `-` to read stdin
        sql: String,
    },
}

#[derive(Args, Debug)]
struct SchemaSource {
    /// Schema model (.json) or SQL dump
    schema: PathBuf,

    /// Dump dialect: auto, generic, postgres, mysql, sqlite
    #[arg(long)]
    dialect: Option<String>,

    /// Analysis depth: basic, standard, full
    #[arg(long)]
    depth: Option<String>,

    /// Database name (defaults to the dump file name)
    #[arg(long)]
    name: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("nlsql=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Schema { source, json } => {
            let schema = load_schema(&source, &config)?;
            if json {
                println!("{}", schema.to_json_pretty()?);
            } else {
                print!("{}", schema.describe());
                println!();
                println!("{}", stats_table(&schema));
            }
        }
        Command::Prompt { source, question } => {
            let generator = configured_generator(&source, &config)?;
            println!("{}", generator.build_prompt(&question)?);
        }
        Command::Generate {
            source,
            question,
            provider_cmd,
            provider_args,
            response_file,
            timeout,
            no_format,
            no_validate,
            no_explanation,
            json,
        } => {
            let generator = configured_generator(&source, &config)?;

            let provider: Arc<dyn LlmProvider> = if let Some(path) = response_file {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Arc::new(StaticProvider::new(text))
            } else if let Some(command) = provider_cmd {
                Arc::new(nlsql::provider::CommandProvider::new(command).with_args(provider_args))
            } else if let Some(provider) = config.command_provider() {
                Arc::new(provider)
            } else {
                bail!("no provider configured: pass --provider-cmd, --response-file or set [provider] in the config");
            };
            generator.set_provider(provider);

            let options = GenerationOptions {
                validate_sql: config.generation.validate_sql && !no_validate,
                include_explanation: config.generation.include_explanation && !no_explanation,
                format_sql: config.generation.format_sql && !no_format,
                timeout: match timeout {
                    Some(secs) => Duration::try_from_secs_f64(secs).context("invalid --timeout")?,
                    None => config.generation.timeout,
                },
            };
            let result = generator.generate(&question, &options)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.sql);
                if !result.explanation.is_empty() {
                    println!("\n{}", result.explanation);
                }
                for error in &result.validation.errors {
                    eprintln!("warning: {error}");
                }
            }
            if !result.validation.valid {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Validate { source, sql } => {
            let schema = load_schema(&source, &config)?;
            let verdict = validate_sql(&read_arg(&sql)?, Some(&schema));
            if verdict.valid {
                println!("valid");
            } else {
                for error in &verdict.errors {
                    println!("{error}");
                }
                return Ok(ExitCode::from(2));
            }
        }
        Command::Format { sql } => {
            println!("{}", nlsql::format::format_sql(&read_arg(&sql)?));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Generator with the schema and prompt settings applied, but no provider.
fn configured_generator(source: &SchemaSource, config: &Config) -> anyhow::Result<SqlGenerator> {
    let generator = SqlGenerator::new().with_observer(Arc::new(TracingObserver));
    if !generator.set_schema(load_schema(source, config)?) {
        bail!("schema {} failed structural validation", source.schema.display());
    }
    if let Some(template) = config.prompt_template()? {
        generator.set_prompt_template(&template);
    }
    generator.set_examples(config.prompt.examples.clone());
    Ok(generator)
}

fn load_schema(source: &SchemaSource, config: &Config) -> anyhow::Result<SchemaModel> {
    let path = &source.schema;
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(SchemaModel::from_json(&text)?);
    }

    let dialect = match &source.dialect {
        Some(name) => Dialect::from_str(name).with_context(|| format!("unknown dialect '{name}'"))?,
        None => config.schema.dialect()?,
    };
    let mut options = config.schema.analyze_options();
    if let Some(depth) = &source.depth {
        options.depth =
            AnalysisDepth::from_str(depth).with_context(|| format!("unknown depth '{depth}'"))?;
    }

    let mut introspector = DdlIntrospector::from_path(path).with_dialect(dialect);
    if let Some(name) = &source.name {
        introspector = introspector.with_name(name.clone());
    }
    debug!(path = %path.display(), ?options, "analyzing dump");
    let schema = introspector.analyze(&options).map_err(nlsql::Error::from)?;
    Ok(schema)
}

fn stats_table(schema: &SchemaModel) -> String {
    let mut table = TextTable::new(["table", "columns", "primary key", "foreign keys", "rows"]);
    for info in schema.tables().values() {
        table.push_row([
            info.name.clone(),
            info.columns.len().to_string(),
            info.primary_key.join(", "),
            info.foreign_keys.len().to_string(),
            info.row_count.to_string(),
        ]);
    }
    table.render()
}

fn read_arg(value: &str) -> anyhow::Result<String> {
    if value != "-" {
        return Ok(value.to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}
