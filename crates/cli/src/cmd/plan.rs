//! Implementation of the `kiln plan` command.
//!
//! Reports which tasks a build would run and why, wave by wave, without
//! starting any process.

use std::path::Path;

use anyhow::{Context, Result};

use kiln_lib::execute;

use crate::output::{OutputFormat, print_info, print_json, print_stat, print_task, symbols};

use super::load_project;

pub fn cmd_plan(file: &Path, targets: &[String], output: OutputFormat) -> Result<()> {
  let project = load_project(file)?;
  let plan = execute::plan(&project.registry, targets, &project.config).context("Failed to plan build")?;

  if output.is_json() {
    return print_json(&plan);
  }

  if plan.stale_count() == 0 {
    print_info("Everything is up to date");
    return Ok(());
  }

  for (wave, entries) in plan.waves.iter().enumerate() {
    println!("Wave {}:", wave + 1);
    for entry in entries {
      let id = entry.id.to_string();
      match entry.staleness.reason() {
        Some(reason) => {
          let detail = if entry.rescan {
            format!("{}, rescan", reason)
          } else {
            reason.to_string()
          };
          print_task(symbols::STALE, &id, &detail);
          if let Some(invocation) = &entry.invocation {
            println!("      {} {}", symbols::ARROW, invocation);
          }
        }
        None if entry.rescan => print_task(symbols::INFO, &id, "rescan"),
        None => {}
      }
    }
  }

  println!();
  print_stat("Tasks to run", &plan.stale_count().to_string());
  Ok(())
}
