//! Implementation of the `kiln clean` command.

use std::path::Path;

use anyhow::{Context, Result};

use kiln_lib::execute;

use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning};

use super::load_project;

pub fn cmd_clean(file: &Path, targets: &[String], output: OutputFormat) -> Result<()> {
  let project = load_project(file)?;
  let report = execute::clean(&project.registry, targets, &project.config).context("Clean failed")?;

  if output.is_json() {
    return print_json(&report);
  }

  if report.removed.is_empty() && report.records == 0 {
    print_warning("Nothing to clean");
    return Ok(());
  }

  print_success("Clean complete!");
  print_stat("Files removed", &report.removed.len().to_string());
  print_stat("Records dropped", &report.records.to_string());
  Ok(())
}
