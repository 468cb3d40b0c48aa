//! # Service Bus Queue CLI
//!
//! Command-line interface for operating Service Bus job queues by hand.
//!
//! This module provides CLI commands for:
//! - Pushing jobs and raw payloads, immediately or scheduled
//! - Popping a message and deleting or releasing it
//! - Reading the queue size and clearing the queue
//! - Validating and showing the resolved connection configuration
//!
//! Connections are read from an optional config file (YAML, TOML or JSON) and
//! then from `SBQ__`-prefixed environment variables, e.g.
//! `SBQ__CONNECTIONS__SERVICEBUS__KEY=...`.

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use servicebus_queue::{
    Delay, JobDescriptor, JobQueue, LeasedJob, QueueConnectionsConfig, QueueError, QueueName,
    QueueRegistry,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "SBQ";

// ============================================================================
// CLI Structure
// ============================================================================

/// sbq - push, pop and inspect Service Bus job queues
#[derive(Parser, Debug)]
#[command(name = "sbq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Push, pop and inspect Service Bus job queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SBQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level or filter directive
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Named connection to use instead of the configured default
    #[arg(long, env = "SBQ_CONNECTION")]
    pub connection: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enqueue a job
    Push {
        #[command(flatten)]
        job: JobArgs,

        /// Queue to record on the payload
        #[arg(long)]
        queue: Option<QueueName>,
    },

    /// Enqueue a raw JSON payload
    PushRaw {
        /// JSON payload
        payload: String,

        /// Extra request header as NAME=VALUE (repeatable)
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Queue to record on the payload
        #[arg(long)]
        queue: Option<QueueName>,
    },

    /// Enqueue a job that becomes visible later
    Later {
        /// Delay in seconds
        #[arg(long, conflicts_with = "at", required_unless_present = "at")]
        delay: Option<u64>,

        /// Absolute RFC 3339 instant
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[command(flatten)]
        job: JobArgs,

        /// Queue to record on the payload
        #[arg(long)]
        queue: Option<QueueName>,
    },

    /// Receive one message; it is released again unless --delete is given
    Pop {
        /// Delete the message after printing it
        #[arg(long, conflicts_with = "release")]
        delete: bool,

        /// Release the message with this redelivery delay in seconds
        #[arg(long)]
        release: Option<u64>,

        /// Queue to record on the handle
        #[arg(long)]
        queue: Option<QueueName>,
    },

    /// Show the number of messages in the queue
    Size {
        #[arg(long)]
        queue: Option<QueueName>,
    },

    /// Delete every message currently in the queue
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,

        #[arg(long)]
        queue: Option<QueueName>,
    },

    /// Validate configuration
    Config {
        /// Show resolved configuration (keys are never shown)
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Job fields shared by push and later
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Handler name
    #[arg(long)]
    pub job: String,

    /// Handler arguments as JSON
    #[arg(long, default_value = "{}", value_parser = parse_json)]
    pub data: serde_json::Value,

    /// Human-readable job name
    #[arg(long)]
    pub display_name: Option<String>,

    /// Maximum delivery attempts
    #[arg(long)]
    pub max_tries: Option<u32>,

    /// Processing timeout in seconds
    #[arg(long)]
    pub timeout: Option<u32>,
}

impl JobArgs {
    /// Job descriptor for these arguments
    pub fn descriptor(&self) -> JobDescriptor {
        let mut job = JobDescriptor::new(self.job.clone(), self.data.clone());
        job.display_name = self.display_name.clone();
        job.max_tries = self.max_tries;
        job.timeout = self.timeout;
        job
    }
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Configuration format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

fn parse_header(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, header_value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), header_value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", value)),
    }
}

fn parse_json(value: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(value).map_err(|e| format!("invalid JSON: {}", e))
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },

    #[error("Failed to render output: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(QueueError::Configuration(_)) => 1,
            Self::Queue(_) => 2,
            Self::InvalidArgument { .. } => 4,
            Self::Logging { .. } => 5,
            Self::Output { .. } => 5,
            Self::Io(_) => 5,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "sbq", &mut stdout);
            Ok(())
        }
        Commands::Config { show, format } => {
            let config = load_configuration(cli.config.as_deref())?;
            execute_config_command(&config, show, format, &mut stdout)
        }
        command => {
            let config = load_configuration(cli.config.as_deref())?;
            let registry = QueueRegistry::new(config);
            let queue = registry.connection(cli.connection.as_deref())?;

            execute_queue_command(command, queue.as_ref(), cli.output, &mut stdout).await
        }
    }
}

/// Initialize logging to stderr based on CLI arguments
///
/// `RUST_LOG` takes precedence over `--log-level`.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Load connections from `path` (or the default locations) and the environment
///
/// Sources, later ones overriding earlier ones:
///  1. `{config_dir}/sbq/config.{yaml,toml,json}` and `./sbq.{yaml,toml,json}`
///     when no explicit path is given, both optional
///  2. The explicit `path`, which must exist
///  3. Environment variables prefixed `SBQ__` with `__` as separator
pub fn load_configuration(path: Option<&Path>) -> Result<QueueConnectionsConfig, CliError> {
    let mut builder = config::Config::builder();

    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration from explicit path");
            builder = builder.add_source(config::File::from(path).required(true));
        }
        None => {
            if let Some(dir) = dirs::config_dir() {
                builder = builder
                    .add_source(config::File::from(dir.join("sbq").join("config")).required(false));
            }
            builder = builder.add_source(config::File::with_name("sbq").required(false));
        }
    }

    let config: QueueConnectionsConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    config.validate()?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Execute config command
pub fn execute_config_command(
    config: &QueueConnectionsConfig,
    show: bool,
    format: ConfigFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    if !show {
        writeln!(
            out,
            "Configuration is valid: {} connection(s), default '{}'",
            config.connections.len(),
            config.default
        )?;
        return Ok(());
    }

    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
        ConfigFormat::Toml => toml::to_string(config).map_err(|e| e.to_string()),
    }
    .map_err(|message| CliError::Output { message })?;

    writeln!(out, "{}", rendered.trim_end())?;
    Ok(())
}

/// Execute a queue command against `queue`, writing results to `out`
pub async fn execute_queue_command(
    command: Commands,
    queue: &dyn JobQueue,
    output: OutputFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Commands::Push { job, queue: target } => {
            queue.push(&job.descriptor(), target.as_ref()).await?;
            info!(job = %job.job, "Job pushed");
            render(out, output, "pushed", serde_json::json!({"job": job.job}))
        }
        Commands::PushRaw {
            payload,
            headers,
            queue: target,
        } => {
            queue.push_raw(&payload, target.as_ref(), &headers).await?;
            render(out, output, "pushed", serde_json::json!({"bytes": payload.len()}))
        }
        Commands::Later {
            delay,
            at,
            job,
            queue: target,
        } => {
            let delay = match (delay, at) {
                (_, Some(at)) => Delay::Until(at),
                (Some(seconds), None) => Delay::Seconds(seconds),
                (None, None) => {
                    return Err(CliError::InvalidArgument {
                        arg: "delay".to_string(),
                        message: "either --delay or --at is required".to_string(),
                    })
                }
            };
            let available_at = delay.resolve(Utc::now());

            queue.later(delay, &job.descriptor(), target.as_ref()).await?;
            render(
                out,
                output,
                "scheduled",
                serde_json::json!({"job": job.job, "available_at": available_at.to_rfc3339()}),
            )
        }
        Commands::Pop {
            delete,
            release,
            queue: target,
        } => {
            let Some(job) = queue.pop(target.as_ref()).await? else {
                return render(out, output, "empty", serde_json::json!({}));
            };

            let body = String::from_utf8_lossy(job.raw_body()).into_owned();
            let settled = if delete {
                job.delete().await?;
                "deleted".to_string()
            } else {
                let delay = release.unwrap_or(0);
                job.release(delay).await?;
                format!("released ({}s)", delay)
            };

            render(
                out,
                output,
                "popped",
                serde_json::json!({
                    "id": job.job_id(),
                    "attempts": job.attempts(),
                    "body": body,
                    "settled": settled,
                }),
            )
        }
        Commands::Size { queue: target } => {
            let size = queue.size(target.as_ref()).await?;
            render(out, output, "size", serde_json::json!({"size": size}))
        }
        Commands::Clear { yes, queue: target } => {
            if !yes {
                return Err(CliError::InvalidArgument {
                    arg: "yes".to_string(),
                    message: "clearing deletes messages permanently; pass --yes to confirm"
                        .to_string(),
                });
            }
            let deleted = queue.clear(target.as_ref()).await?;
            info!(deleted, "Queue cleared");
            render(out, output, "cleared", serde_json::json!({"deleted": deleted}))
        }
        Commands::Config { .. } | Commands::Completions { .. } => Err(CliError::InvalidArgument {
            arg: "command".to_string(),
            message: "not a queue command".to_string(),
        }),
    }
}

fn render(
    out: &mut dyn Write,
    output: OutputFormat,
    event: &str,
    fields: serde_json::Value,
) -> Result<(), CliError> {
    match output {
        OutputFormat::Json => {
            let mut record = serde_json::json!({"result": event});
            if let (Some(record), serde_json::Value::Object(fields)) =
                (record.as_object_mut(), fields)
            {
                record.extend(fields);
            }
            writeln!(out, "{}", record)?;
        }
        OutputFormat::Text => {
            let mut line = event.to_string();
            if let serde_json::Value::Object(fields) = fields {
                for (key, value) in fields {
                    match value {
                        serde_json::Value::String(text) => {
                            line.push_str(&format!(" {}={}", key, text))
                        }
                        other => line.push_str(&format!(" {}={}", key, other)),
                    }
                }
            }
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}
