//! Implementation of the `kiln build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use kiln_lib::execute::{self, BuildReport, TargetStatus, TaskStatus};

use crate::output::{
  OutputFormat, format_duration, print_captured, print_error, print_info, print_json, print_stat, print_success,
  print_task, symbols,
};

use super::load_project;

pub struct BuildArgs {
  pub targets: Vec<String>,
  pub jobs: Option<usize>,
  pub flags: Vec<String>,
}

/// Build the selected targets. Returns `false` when any target failed.
pub fn cmd_build(file: &Path, args: BuildArgs, output: OutputFormat) -> Result<bool> {
  let start = Instant::now();
  let mut project = load_project(file)?;

  if let Some(jobs) = args.jobs {
    project.config.parallelism = jobs.max(1);
  }
  project.config.extra_flags = args.flags;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(execute::build(&project.registry, &args.targets, &project.config))
    .context("Build failed")?;

  if output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report);
    println!();
    print_stat("Processes", &report.invocations().to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  Ok(report.is_success())
}

fn print_report(report: &BuildReport) {
  for task in &report.tasks {
    let id = task.id.to_string();
    match task.status {
      TaskStatus::UpToDate => {}
      TaskStatus::Success => {
        let detail = task.reason.as_ref().map(ToString::to_string).unwrap_or_default();
        print_task(symbols::SUCCESS, &id, &detail);
      }
      TaskStatus::Skipped => print_task(symbols::SKIP, &id, "skipped"),
      TaskStatus::ScanFailed | TaskStatus::CompileFailed | TaskStatus::LinkFailed => {
        print_error(&format!("{} ({})", id, task.status));
        if let Some(invocation) = &task.invocation {
          eprintln!("    {} {}", symbols::ARROW, invocation);
        }
        if let Some(code) = task.exit_code {
          eprintln!("    exit code {}", code);
        }
        if let Some(stderr) = task.error.as_ref().and_then(|e| e.stderr()) {
          print_captured(stderr);
        } else if let Some(error) = &task.error {
          print_captured(&error.to_string());
        }
      }
    }
  }

  println!();
  for (name, status) in &report.targets {
    match status {
      TargetStatus::Built => print_success(&format!("{} built", name)),
      TargetStatus::UpToDate => print_info(&format!("{} up to date", name)),
      TargetStatus::Failed => print_error(&format!("{} failed", name)),
    }
  }
}
