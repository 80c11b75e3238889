//! docdb-query CLI
//!
//! Command-line front end for the rewrite engine:
//! - Expand template variables and time macros in a piece of text
//! - Rewrite a full request body
//! - Generate a default config file

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docdb_query::config::{generate_default_config, Config, LoggingConfig};
use docdb_query::model::{Query, QueryRequest, RequestOptions, ScopedVar, ScopedVars, TimeRange};
use docdb_query::query::{
    QueryExecutor, QueryOrchestrator, ReplaceMode, ResponseStream, TemplateVariableResolver,
    TimeMacroExpander, VariableRegistry,
};

#[derive(Parser)]
#[command(name = "docdb-query")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Expand template variables and time macros in document-database queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Expand variables and time macros in TEXT (or stdin)
    Expand {
        #[command(flatten)]
        range: RangeArgs,
        /// Variables in name=value format (repeat a name for multi-values)
        #[arg(short = 'V', long = "var")]
        vars: Vec<String>,
        /// Text to expand
        text: Option<String>,
    },

    /// Rewrite every target of a request body and print the result
    Rewrite {
        #[command(flatten)]
        range: RangeArgs,
        /// Variables in name=value format (repeat a name for multi-values)
        #[arg(short = 'V', long = "var")]
        vars: Vec<String>,
        /// Request JSON file (default: stdin)
        path: Option<PathBuf>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
pub struct RangeArgs {
    /// Range start: RFC 3339, epoch milliseconds, "now" or "now-6h"
    #[arg(long)]
    pub from: Option<String>,
    /// Range end: RFC 3339, epoch milliseconds, "now" or "now-6h"
    #[arg(long)]
    pub to: Option<String>,
}

/// Request body accepted by `rewrite`; every field but the targets is optional
#[derive(Deserialize)]
struct RewriteInput {
    targets: Vec<Query>,
    #[serde(flatten)]
    options: RequestOptions,
}

/// The CLI only rewrites; nothing is sent anywhere
struct DryRun;

impl QueryExecutor for DryRun {
    fn execute(&self, request: QueryRequest) -> ResponseStream {
        tracing::info!(request_id = %request.request_id, "dry run, request not executed");
        stream::empty().boxed()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Expand { range, vars, text } => {
            let text = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            let range = range.resolve()?;
            let scoped = parse_vars(&vars)?;

            let registry = config.registry();
            let expander = TimeMacroExpander::new(config.expansion.display_zone()?);

            let substituted = registry.replace(&text, &scoped, ReplaceMode::Json);
            let expanded = expander.expand(&substituted, &range)?;
            println!("{}", expanded);
        }

        Commands::Rewrite { range, vars, path } => {
            let body = match path {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => read_stdin()?,
            };
            let input: RewriteInput =
                serde_json::from_str(&body).context("parsing request body")?;

            let mut options = input.options;
            if range.from.is_some() || range.to.is_some() || options.range.is_none() {
                options.range = Some(range.resolve()?);
            }
            if !vars.is_empty() {
                let mut scoped = options.scoped_vars.take().unwrap_or_default();
                scoped.extend(parse_vars(&vars)?);
                options.scoped_vars = Some(scoped);
            }

            let request = QueryRequest::from_options(
                options,
                input.targets,
                format!("cli-{}", uuid::Uuid::new_v4()),
                config.expansion.variable_query_range_hours,
            )
            .context("default time range cannot be represented")?;

            let orchestrator = QueryOrchestrator::new(
                TemplateVariableResolver::new(Arc::new(config.registry())),
                TimeMacroExpander::new(config.expansion.display_zone()?),
                Arc::new(DryRun),
            );

            let rewritten = orchestrator.rewrite(&request)?;
            println!("{}", serde_json::to_string_pretty(&rewritten)?);
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("docdb_query={}", logging.level)),
    );

    let writer = match logging.file.as_deref() {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path))?;
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(Arc::new(file))
        }
        None => tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init(),
    }

    Ok(())
}

fn read_stdin() -> anyhow::Result<String> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("reading stdin")?;
    Ok(buffer)
}

/// Parse `name=value` pairs; a repeated name becomes a multi-value
fn parse_vars(vars: &[String]) -> anyhow::Result<ScopedVars> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();

    for var in vars {
        let Some((name, value)) = var.split_once('=') else {
            bail!("Invalid variable '{}': expected name=value", var);
        };
        match grouped.iter_mut().find(|(n, _)| n == name) {
            Some((_, values)) => values.push(value.to_string()),
            None => grouped.push((name.to_string(), vec![value.to_string()])),
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(name, mut values)| {
            let var = if values.len() == 1 {
                ScopedVar::single(values.remove(0))
            } else {
                ScopedVar::multi(values)
            };
            (name, var)
        })
        .collect())
}

impl RangeArgs {
    /// Defaults to the last six hours
    fn resolve(&self) -> anyhow::Result<TimeRange> {
        let now = Utc::now();
        let to = match self.to.as_deref() {
            Some(s) => parse_time(s, now)?,
            None => now,
        };
        let from = match self.from.as_deref() {
            Some(s) => parse_time(s, now)?,
            None => to - Duration::hours(6),
        };
        Ok(TimeRange::new(from, to))
    }
}

/// Parse "now", "now-7d", RFC 3339 or epoch milliseconds
fn parse_time(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    if s == "now" {
        return Ok(now);
    }

    let re = regex::Regex::new(r"^now-(\d+)([mhdw])$")?;
    if let Some(caps) = re.captures(s) {
        let amount: i64 = caps[1].parse()?;
        let offset = match &caps[2] {
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            "w" => Duration::try_weeks(amount),
            unit => bail!("Invalid time unit: {}", unit),
        };
        let Some(time) = offset.and_then(|offset| now.checked_sub_signed(offset)) else {
            bail!("Time offset '{}' is out of range", s);
        };
        return Ok(time);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(millis) = s.parse::<i64>() {
        if let Some(range) = TimeRange::from_millis(millis, millis) {
            return Ok(range.from);
        }
    }

    bail!("Cannot parse time '{}'", s)
}
