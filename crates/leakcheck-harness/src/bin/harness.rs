//! CLI entrypoint for leak-check log tooling.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use leakcheck_harness::summary::LogSummary;
use leakcheck_harness::validate::validate_log_file;

/// Tooling for structured leak-check logs.
#[derive(Debug, Parser)]
#[command(name = "leakcheck-harness")]
#[command(about = "Validate and summarize leak-check JSONL logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Plain,
}

impl OutputFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Plain => "plain",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check every line of a log against the record schema.
    ValidateLog {
        /// JSONL log written by a `LEAKCHECK_LOG` run.
        #[arg(long)]
        log: PathBuf,
    },
    /// Aggregate pass/warn/fail/skip counts and list findings.
    Summarize {
        #[arg(long)]
        log: PathBuf,
        #[arg(long, value_enum, default_value = "plain")]
        format: OutputFormat,
        /// Write to this path instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            if !errors.is_empty() {
                for error in &errors {
                    eprintln!("{error}");
                }
                return Err(format!(
                    "{}: {} validation error(s) in {lines} line(s)",
                    log.display(),
                    errors.len()
                )
                .into());
            }
            eprintln!("OK: {} ({lines} line(s))", log.display());
        }
        Command::Summarize {
            log,
            format,
            output,
        } => {
            let summary = LogSummary::from_file(&log)?;
            let body = summary.render(format.as_str())?;

            if let Some(path) = output {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, body)?;
                eprintln!("Wrote summary to {}", path.display());
            } else {
                print!("{body}");
            }

            if summary.has_failures() {
                return Err(format!(
                    "{} leak check(s) failed",
                    summary.count(leakcheck::CheckOutcome::Fail)
                )
                .into());
            }
        }
    }

    Ok(())
}
