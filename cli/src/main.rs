use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use plistconv::{Error, convert_file, convert_file_to};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "plistconv",
    version,
    about = "Convert binary property lists to XML property lists, in place."
)]
struct Cli {
    /// Binary plist files; each one is overwritten with its XML form.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Write the XML here instead of replacing the input (one input only).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log decoding details to stderr. RUST_LOG takes precedence.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.output.is_some() && cli.paths.len() > 1 {
        Cli::command()
            .error(
                ErrorKind::ArgumentConflict,
                "--output takes exactly one input path",
            )
            .exit();
    }
    init_tracing(cli.verbose);

    if let Err(e) = real_main(cli) {
        error!("{:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .init();
}

fn real_main(cli: Cli) -> anyhow::Result<()> {
    let mut failed = 0usize;
    for path in &cli.paths {
        match convert_one(path, cli.output.as_deref()) {
            Ok(()) => debug!(path = %path.display(), "done"),
            Err(e) => {
                // reported regardless of the log filter
                eprintln!("plistconv: {e:#}");
                debug!(error = ?e, "conversion failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed to convert", cli.paths.len());
    }
    Ok(())
}

fn convert_one(path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let result = match output {
        Some(output) => convert_file_to(path, output),
        None => convert_file(path),
    };
    match result {
        // already names the path
        Err(e @ Error::PathNotFound(_)) => Err(e.into()),
        other => other.with_context(|| format!("failed to convert {}", path.display())),
    }
}
