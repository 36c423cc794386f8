use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use iac_roots::app::{self, Target};
use iac_roots::synth::{self, TemplateFormat};
use iac_roots::{deploy, writer};

#[derive(Debug, Parser)]
#[command(name = "iac-roots", version, about = "Synthesize and deploy the CICD and module stacks")]
struct Cli {
    /// Directory the templates and manifest are written to.
    #[arg(long, default_value = "cdk.out")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = TemplateFormat::Json)]
    format: TemplateFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the CloudFormation templates.
    Synth {
        #[command(subcommand)]
        target: Target,
    },
    /// Synthesize, then create or update the stacks in CloudFormation.
    Deploy {
        /// Write the stack outputs to this JSON file.
        #[arg(long)]
        outputs_file: Option<PathBuf>,

        /// Seconds between stack status checks.
        #[arg(long, default_value_t = 5)]
        poll_seconds: u64,

        #[command(subcommand)]
        target: Target,
    },
}

/// Uses `RUST_LOG` if set, otherwise `LOG_LEVEL` (default `info`).
fn init_tracing() -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let target = match &cli.command {
        Command::Synth { target } => target,
        Command::Deploy { target, .. } => target,
    };
    let app = app::load_app(target).await?;

    let stacks = synth::synthesize(&app).context("synthesis failed")?;
    let manifest = synth::write(&stacks, &cli.output_dir, cli.format)?;
    info!(manifest = %manifest.display(), stacks = stacks.len(), "synthesized");

    if let Command::Deploy {
        outputs_file,
        poll_seconds,
        ..
    } = &cli.command
    {
        let outputs = deploy::deploy_all(&stacks, cli.format, Duration::from_secs(*poll_seconds))
            .await
            .context("deployment failed")?;
        for (stack, stack_outputs) in &outputs {
            for (key, value) in stack_outputs {
                info!(stack = %stack, "{} = {}", key, value);
            }
        }

        if let Some(path) = outputs_file {
            writer::write_outputs(path, &outputs)?;
            info!(path = %path.display(), "wrote outputs");
        }
    }

    Ok(())
}
