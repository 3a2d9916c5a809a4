mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, cmd_build, cmd_clean, cmd_plan, cmd_targets};
use output::{OutputFormat, print_error};

/// kiln - incremental C/C++ build orchestrator
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Path to the build file
  #[arg(short = 'f', long = "file", global = true, default_value = kiln_lib::consts::BUILD_FILE_NAME)]
  file: PathBuf,

  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short = 'o', long = "output", global = true, value_enum, default_value_t)]
  output: OutputFormat,

  /// Shorthand for `--output json`
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Compile and link targets whose inputs changed
  Build {
    /// Targets to build (default: all)
    targets: Vec<String>,

    /// Maximum number of compiler processes at once
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// Extra compiler flag, may be repeated
    #[arg(long = "flag", allow_hyphen_values = true)]
    flags: Vec<String>,
  },

  /// Show which tasks a build would run
  Plan {
    /// Targets to plan (default: all)
    targets: Vec<String>,
  },

  /// Remove objects, artifacts and dependency records
  Clean {
    /// Targets to clean (default: all)
    targets: Vec<String>,
  },

  /// List targets defined in the build file
  Targets,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let output = if cli.json { OutputFormat::Json } else { cli.output };

  let result: Result<bool> = match cli.command {
    Commands::Build { targets, jobs, flags } => cmd_build(
      &cli.file,
      BuildArgs {
        targets,
        jobs,
        flags,
      },
      output,
    ),
    Commands::Plan { targets } => cmd_plan(&cli.file, &targets, output).map(|_| true),
    Commands::Clean { targets } => cmd_clean(&cli.file, &targets, output).map(|_| true),
    Commands::Targets => cmd_targets(&cli.file, output).map(|_| true),
  };

  match result {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
