//! `rembg` command-line entry point
//!
//! Only the `i` (single image) command is provided. Anything else prints the
//! help text and exits with status 1.

use crate::{
    models::DEFAULT_MODEL,
    processor::{BackgroundRemover, OnnxRemover},
    tracing_config::init_cli_tracing,
};
use anyhow::{Context, Result};
use clap::{error::ErrorKind, Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

/// Remove image backgrounds with rembg-compatible models
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "rembg")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove the background from a single image file
    I(ImageArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ImageArgs {
    /// Model name
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Input image path
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output image path (PNG)
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

/// Main CLI entry point
pub async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return exit_for_parse_error(&e),
    };

    if let Err(e) = init_cli_tracing(cli.verbose) {
        eprintln!("Error: failed to initialize tracing: {e:#}");
        return ExitCode::FAILURE;
    }

    let Some(Command::I(args)) = cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    };

    // The input check comes before reading the environment so a missing
    // input always reports itself
    let result = match ensure_input_exists(&args)
        .and_then(|()| OnnxRemover::from_env().context("Invalid environment configuration"))
    {
        Ok(remover) => run_image_command(&remover, &args).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Run the `i` command against a background remover
///
/// The input is checked before the remover is touched; a missing input
/// never creates a session.
///
/// # Errors
/// - Input file does not exist
/// - Session creation or removal failures
/// - File system errors reading the input or writing the output
pub async fn run_image_command<R: BackgroundRemover>(remover: &R, args: &ImageArgs) -> Result<()> {
    ensure_input_exists(args)?;

    let start = Instant::now();
    tracing::info!(
        model = %args.model,
        input = %args.input.display(),
        output = %args.output.display(),
        "Removing background"
    );

    let mut session = remover
        .new_session(&args.model)
        .await
        .with_context(|| format!("Failed to create session for model '{}'", args.model))?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }

    let input = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let output = remover
        .remove(&input, &mut session)
        .with_context(|| format!("Failed to remove background from {}", args.input.display()))?;

    tokio::fs::write(&args.output, &output)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    tracing::info!(
        bytes = output.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Wrote {}",
        args.output.display()
    );
    Ok(())
}

fn ensure_input_exists(args: &ImageArgs) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("input file not found: {}", args.input.display());
    }
    Ok(())
}

fn exit_for_parse_error(error: &clap::Error) -> ExitCode {
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = error.print();
            ExitCode::SUCCESS
        },
        _ => {
            let _ = error.print();
            eprintln!("{}", Cli::command().render_help());
            ExitCode::FAILURE
        },
    }
}
