//! # AutoReport CLI (`autoreport`)
//!
//! ## Usage
//!
//! ```bash
//! autoreport --config ./config/autoreport.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `autoreport serve` | Start the HTTP server |
//! | `autoreport extract <zip>` | Print the extraction context as JSON |
//! | `autoreport analyze <zip>` | Extract, then request an analysis from the server |
//! | `autoreport report <zip>` | Extract, analyze, and stream a report to stdout |
//! | `autoreport models` | List selectable models |
//!
//! Logs go to stderr (`RUST_LOG`, default `autoreport=info`); stdout carries
//! only command output.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use autoreport::client::AnalysisClient;
use autoreport::config::{self, Config};
use autoreport::extract;
use autoreport::models::{ExtractionContext, ReportSettings, Tone, UniversityFormat, Verbosity};
use autoreport::providers::MODELS;
use autoreport::server;

const DEFAULT_CONFIG_PATH: &str = "./config/autoreport.toml";

/// AutoReport: zipped project in, architecture analysis and project report out.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/autoreport.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "autoreport", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/autoreport.toml`; built-in defaults are used
    /// when that file does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Extract the bounded context from a project archive and print it.
    Extract {
        /// Path to the project `.zip`.
        zip: PathBuf,

        /// Model id recorded in the context (defaults to the configured default).
        #[arg(long)]
        model: Option<String>,
    },

    /// Extract a project archive and request an architecture analysis.
    Analyze {
        zip: PathBuf,

        /// Model used for the analysis.
        #[arg(long)]
        model: Option<String>,

        /// Server base URL (overrides `client.server_url`).
        #[arg(long)]
        server: Option<String>,
    },

    /// Extract, analyze, and stream a project report to stdout.
    Report {
        zip: PathBuf,

        /// Model used for the analysis.
        #[arg(long)]
        model: Option<String>,

        /// Model used for the report (defaults to the analysis model).
        #[arg(long)]
        target_model: Option<String>,

        /// short, medium, long, or exhaustive.
        #[arg(long, default_value = "medium")]
        verbosity: String,

        /// formal or conversational.
        #[arg(long, default_value = "formal")]
        tone: String,

        /// "Bangalore University BCA", "VTU", or "Generic".
        #[arg(long, default_value = "Bangalore University BCA")]
        format: String,

        /// Extra instructions appended to the report prompt.
        #[arg(long)]
        prompt: Option<String>,

        #[arg(long)]
        server: Option<String>,
    },

    /// List selectable models.
    Models,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autoreport=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> anyhow::Result<Config> {
    let allow_missing = path == Path::new(DEFAULT_CONFIG_PATH);
    config::load_config(path, allow_missing)
}

fn extract_context(
    zip: &Path,
    model: Option<&str>,
    cfg: &Config,
) -> anyhow::Result<ExtractionContext> {
    let model_id = model.unwrap_or(&cfg.models.default_model_id);
    let ctx = extract::extract_file(zip, model_id)
        .with_context(|| format!("Failed to extract {}", zip.display()))?;
    tracing::info!(
        project = %ctx.project_name,
        snippets = ctx.snippet_count,
        "archive extracted"
    );
    Ok(ctx)
}

fn client_for(server: Option<&str>, cfg: &Config) -> anyhow::Result<AnalysisClient> {
    AnalysisClient::new(server.unwrap_or(&cfg.client.server_url))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let credentials = cfg.providers.credentials();
            server::run_server(cfg, credentials).await?;
        }
        Commands::Extract { zip, model } => {
            let ctx = extract_context(&zip, model.as_deref(), &cfg)?;
            println!("{}", serde_json::to_string_pretty(&ctx)?);
        }
        Commands::Analyze { zip, model, server } => {
            let ctx = extract_context(&zip, model.as_deref(), &cfg)?;
            let client = client_for(server.as_deref(), &cfg)?;
            let analysis = client.request_analysis(&ctx).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Commands::Report {
            zip,
            model,
            target_model,
            verbosity,
            tone,
            format,
            prompt,
            server,
        } => {
            let ctx = extract_context(&zip, model.as_deref(), &cfg)?;
            let client = client_for(server.as_deref(), &cfg)?;
            let analysis = client.request_analysis(&ctx).await?;

            let settings = ReportSettings {
                verbosity: Verbosity::from(verbosity),
                tone: Tone::from(tone),
                university_format: UniversityFormat::from(format),
                custom_prompt: prompt,
            };
            let target = target_model.unwrap_or(ctx.model_id);
            let mut rx = client
                .generate_report(&analysis, Some(&target), &settings)
                .await?;

            while let Some(delta) = rx.recv().await {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(delta.as_bytes())?;
                stdout.flush()?;
            }
            println!();
        }
        Commands::Models => {
            for m in MODELS {
                let marker = if m.id == cfg.models.default_model_id {
                    " (default)"
                } else {
                    ""
                };
                println!("{:<40} {:<12} {}{}", m.id, m.provider.to_string(), m.name, marker);
            }
        }
    }

    Ok(())
}
