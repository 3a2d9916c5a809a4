//! Implementation of the `kiln targets` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use kiln_lib::config::ArtifactKind;

use crate::output::{OutputFormat, print_json};

use super::load_project;

#[derive(Serialize)]
struct TargetSummary {
  name: String,
  kind: ArtifactKind,
  sources: usize,
  output: PathBuf,
}

pub fn cmd_targets(file: &Path, output: OutputFormat) -> Result<()> {
  let project = load_project(file)?;

  let summaries: Vec<TargetSummary> = project
    .registry
    .targets()
    .map(|t| TargetSummary {
      name: t.name.clone(),
      kind: t.kind,
      sources: t.sources.len(),
      output: t.output.clone(),
    })
    .collect();

  if output.is_json() {
    return print_json(&summaries);
  }

  for summary in &summaries {
    let kind = match summary.kind {
      ArtifactKind::Executable => "executable",
      ArtifactKind::StaticLibrary => "static-library",
    };
    println!(
      "{:<20} {:<15} {:>3} source(s) -> {}",
      summary.name,
      kind,
      summary.sources,
      summary.output.display()
    );
  }
  Ok(())
}
