//! Build execution.
//!
//! This module provides the entry points for building, planning and cleaning
//! targets. It handles:
//! - task graph construction and dependency ordering
//! - parallel execution of independent compile tasks, bounded by a semaphore
//! - per-target failure isolation (a failed compile skips the rest of that
//!   target and its link, other targets carry on)
//! - recording dependency scans in the [`DependencyStore`]

pub mod dag;
pub mod runner;
pub mod types;


use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{ArtifactKind, Target, TargetRegistry};
use crate::invocation::{compile_invocation, link_invocation};
use crate::scan::{DependencyScanner, ToolchainScanner};
use crate::stale::{
  FileStamps, Filesystem, Staleness, compile_staleness, link_staleness, needs_rescan, record_stamp, resolve_libraries,
};
use crate::state::{BuildLock, DependencyRecord, DependencyStore, LockMode};

pub use dag::{BuildGraph, CompileTask, LinkTask, TaskNode};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use types::{BuildReport, ExecuteConfig, ExecuteError, TargetStatus, TaskId, TaskReport, TaskStatus};

/// Drives builds over a task graph with injectable collaborators.
pub struct Engine<S, R, F> {
  shared: Arc<Shared<S, R, F>>,
}

struct Shared<S, R, F> {
  config: ExecuteConfig,
  scanner: Arc<S>,
  runner: Arc<R>,
  stamps: Arc<F>,
  store: Arc<DependencyStore>,
  semaphore: Semaphore,
}

impl Engine<ToolchainScanner<ProcessRunner>, ProcessRunner, Filesystem> {
  /// Engine running the real toolchain against files under `config.root`.
  pub fn with_toolchain(config: ExecuteConfig, store: Arc<DependencyStore>) -> Self {
    let runner = Arc::new(ProcessRunner);
    let scanner = Arc::new(ToolchainScanner::new(runner.clone(), &config.root));
    let stamps = Arc::new(Filesystem::new(&config.root));
    Self::new(config, scanner, runner, stamps, store)
  }
}

impl<S, R, F> Engine<S, R, F>
where
  S: DependencyScanner,
  R: CommandRunner,
  F: FileStamps,
{
  pub fn new(
    config: ExecuteConfig,
    scanner: Arc<S>,
    runner: Arc<R>,
    stamps: Arc<F>,
    store: Arc<DependencyStore>,
  ) -> Self {
    let permits = config.parallelism.max(1);
    Self {
      shared: Arc::new(Shared {
        config,
        scanner,
        runner,
        stamps,
        store,
        semaphore: Semaphore::new(permits),
      }),
    }
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.shared.config
  }

  pub fn store(&self) -> &DependencyStore {
    &self.shared.store
  }

  /// Run every stale task of the graph.
  ///
  /// Task failures are reported in the [`BuildReport`], not as `Err`. An
  /// `Err` means the build itself could not proceed.
  pub async fn build(&self, graph: &BuildGraph) -> Result<BuildReport, ExecuteError> {
    info!(
      targets = graph.targets().len(),
      tasks = graph.len(),
      parallelism = self.shared.config.parallelism,
      "starting build"
    );

    let failed: HashMap<String, Arc<AtomicBool>> = graph
      .targets()
      .iter()
      .map(|t| (t.name.clone(), Arc::new(AtomicBool::new(false))))
      .collect();
    let mut recompiled: HashSet<String> = HashSet::new();
    let mut pending: HashMap<NodeIndex, usize> = graph.nodes().map(|(idx, _)| (idx, graph.in_degree(idx))).collect();
    let mut reports: Vec<(NodeIndex, TaskReport)> = Vec::with_capacity(graph.len());
    let mut join_set = JoinSet::new();

    for idx in graph.roots() {
      self.spawn(&mut join_set, graph, idx, &failed, false);
    }

    while let Some(joined) = join_set.join_next().await {
      let (idx, report) = joined.map_err(|e| {
        error!(error = %e, "build task panicked");
        ExecuteError::TaskPanicked(e.to_string())
      })?;

      let target = report.id.target().to_string();
      if report.status == TaskStatus::Success && !report.id.is_link() {
        recompiled.insert(target.clone());
      }
      if report.status.is_failure()
        && let Some(flag) = failed.get(&target)
      {
        flag.store(true, Ordering::SeqCst);
      }
      reports.push((idx, report));

      for dependent in graph.dependents(idx).collect::<Vec<_>>() {
        let Some(remaining) = pending.get_mut(&dependent) else {
          continue;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
          continue;
        }

        let node = graph.node(dependent);
        let target_failed = failed.get(&node.target().name).is_some_and(|f| f.load(Ordering::SeqCst));
        if target_failed {
          warn!(target = %node.target().name, "skipping link, a compile task failed");
          reports.push((dependent, TaskReport::new(node.id(), TaskStatus::Skipped)));
        } else {
          let rebuilt = recompiled.contains(&node.target().name);
          self.spawn(&mut join_set, graph, dependent, &failed, rebuilt);
        }
      }
    }

    reports.sort_by_key(|(idx, _)| *idx);
    let report = summarize(graph, reports.into_iter().map(|(_, r)| r).collect());

    info!(
      invocations = report.invocations(),
      failed = report.failures().count(),
      "build finished"
    );
    Ok(report)
  }

  fn spawn(
    &self,
    join_set: &mut JoinSet<(NodeIndex, TaskReport)>,
    graph: &BuildGraph,
    idx: NodeIndex,
    failed: &HashMap<String, Arc<AtomicBool>>,
    recompiled: bool,
  ) {
    let shared = self.shared.clone();
    let node = graph.node(idx).clone();
    let failed = failed
      .get(&node.target().name)
      .cloned()
      .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

    join_set.spawn(async move {
      let report = match node {
        TaskNode::Compile(task) => shared.compile(task, failed).await,
        TaskNode::Link(task) => shared.link(task, recompiled).await,
      };
      (idx, report)
    });
  }

  /// Run [`Engine::build`] and persist the dependency store, also when the
  /// build itself errored, so records of finished scans are kept.
  pub async fn build_and_save(&self, graph: &BuildGraph) -> Result<BuildReport, ExecuteError> {
    let result = self.build(graph).await;
    self.shared.store.save()?;
    result
  }

  /// Report what a build would do without running anything.
  ///
  /// Cached dependency records stand in for scans that would run; tasks whose
  /// record needs refreshing are flagged with `rescan`.
  pub fn plan(&self, graph: &BuildGraph) -> Plan {
    let shared = &self.shared;
    let mut entries: HashMap<NodeIndex, PlanEntry> = HashMap::new();
    let mut stale_targets: HashSet<String> = HashSet::new();

    for (idx, node) in graph.nodes() {
      if let TaskNode::Compile(task) = node {
        let record = shared.store.get(&task.key);
        let rescan = needs_rescan(shared.stamps.as_ref(), &task.source.path, record.as_ref());
        let headers = record.map(|r| r.headers).unwrap_or_default();
        let staleness = compile_staleness(shared.stamps.as_ref(), &task.source.path, &task.object, &headers, false);

        if staleness.is_stale() {
          stale_targets.insert(task.target.name.clone());
        }

        let invocation = compile_invocation(
          &task.target,
          &task.source,
          &task.object,
          &shared.config.extra_flags,
          shared.config.flag_merge,
        )
        .map(|inv| inv.to_string())
        .ok();

        entries.insert(
          idx,
          PlanEntry {
            id: node.id(),
            wave: 0,
            rescan,
            staleness,
            invocation,
          },
        );
      }
    }

    for (idx, node) in graph.nodes() {
      if let TaskNode::Link(task) = node {
        let libraries = shared.libraries(&task.target);
        let compiles_pending = stale_targets.contains(&task.target.name);
        let staleness = link_staleness(
          shared.stamps.as_ref(),
          &task.target.output,
          &task.objects,
          compiles_pending,
          &libraries,
        );
        entries.insert(
          idx,
          PlanEntry {
            id: node.id(),
            wave: 0,
            rescan: false,
            staleness,
            invocation: Some(link_invocation(&task.target, &task.objects).to_string()),
          },
        );
      }
    }

    let waves = graph
      .execution_waves()
      .into_iter()
      .enumerate()
      .map(|(wave, nodes)| {
        nodes
          .into_iter()
          .filter_map(|idx| entries.remove(&idx))
          .map(|mut entry| {
            entry.wave = wave;
            entry
          })
          .collect()
      })
      .collect();

    Plan { waves }
  }

  /// Remove objects, artifacts and dependency records of the graph's targets.
  pub fn clean(&self, graph: &BuildGraph) -> Result<CleanReport, ExecuteError> {
    let root = &self.shared.config.root;
    let mut report = CleanReport::default();

    let mut outputs: Vec<PathBuf> = graph.compile_tasks().map(|t| t.object.clone()).collect();
    outputs.extend(graph.targets().iter().map(|t| t.output.clone()));

    for output in outputs {
      match std::fs::remove_file(root.join(&output)) {
        Ok(()) => {
          debug!(path = ?output, "removed");
          report.removed.push(output);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ExecuteError::Io(e)),
      }
    }

    for target in graph.targets() {
      report.records += self.shared.store.remove_target(&target.name);
    }

    info!(files = report.removed.len(), records = report.records, "cleaned");
    Ok(report)
  }
}

impl<S, R, F> Shared<S, R, F>
where
  S: DependencyScanner,
  R: CommandRunner,
  F: FileStamps,
{
  fn libraries(&self, target: &Target) -> Vec<PathBuf> {
    if self.config.track_libraries {
      resolve_libraries(self.stamps.as_ref(), target)
    } else {
      Vec::new()
    }
  }

  async fn compile(&self, task: CompileTask, failed: Arc<AtomicBool>) -> TaskReport {
    let id = TaskId::Compile(task.key.clone());

    let Ok(_permit) = self.semaphore.acquire().await else {
      return TaskReport::new(id, TaskStatus::Skipped);
    };

    if failed.load(Ordering::SeqCst) {
      warn!(task = %task.key, "skipping compile, target already failed");
      return TaskReport::new(id, TaskStatus::Skipped);
    }

    let mut report = TaskReport::new(id, TaskStatus::UpToDate);
    let source = &task.source.path;
    let cached = self.store.get(&task.key);

    let (headers, changed) = if needs_rescan(self.stamps.as_ref(), source, cached.as_ref()) {
      report.scanned = true;
      match self.scanner.discover(&task.target, &task.source).await {
        Ok(headers) => {
          let stamp = record_stamp(self.stamps.as_ref(), source, &headers);
          let previous = self.store.put(&task.key, DependencyRecord::new(headers.clone(), stamp));
          let changed = previous.is_none_or(|p| p.headers != headers);
          debug!(task = %task.key, headers = headers.len(), changed, "dependency record refreshed");
          (headers, changed)
        }
        Err(e) => {
          error!(task = %task.key, error = %e, "dependency scan failed");
          self.store.remove(&task.key);
          failed.store(true, Ordering::SeqCst);
          report.status = TaskStatus::ScanFailed;
          report.invocation = e.invocation().map(str::to_string);
          report.exit_code = e.exit_code();
          report.error = Some(ExecuteError::Scan(e));
          return report;
        }
      }
    } else {
      debug!(task = %task.key, "reusing cached dependency record");
      (cached.map(|r| r.headers).unwrap_or_else(BTreeSet::new), false)
    };

    let staleness = compile_staleness(self.stamps.as_ref(), source, &task.object, &headers, changed);
    let Staleness::Stale(reason) = staleness else {
      debug!(task = %task.key, "object up to date");
      return report;
    };
    report.reason = Some(reason);

    let invocation = match compile_invocation(
      &task.target,
      &task.source,
      &task.object,
      &self.config.extra_flags,
      self.config.flag_merge,
    ) {
      Ok(invocation) => invocation.with_cwd(&self.config.root),
      Err(e) => return self.fail_compile(report, &task, &failed, e.into()),
    };
    let cmd = invocation.to_string();
    report.invocation = Some(cmd.clone());

    if let Err(e) = self.ensure_parent(&task.object) {
      return self.fail_compile(report, &task, &failed, e);
    }

    info!(task = %task.key, reason = ?report.reason, "compiling");
    debug!(cmd = %cmd, "compile invocation");

    match self.runner.run(&invocation).await {
      Ok(output) if output.success() => {
        report.status = TaskStatus::Success;
        report.exit_code = output.code;
        report
      }
      Ok(output) => {
        report.exit_code = output.code;
        let err = ExecuteError::CompileFailed {
          cmd,
          code: output.code,
          stderr: output.stderr,
        };
        self.fail_compile(report, &task, &failed, err)
      }
      Err(source) => self.fail_compile(report, &task, &failed, ExecuteError::Spawn { cmd, source }),
    }
  }

  fn fail_compile(
    &self,
    mut report: TaskReport,
    task: &CompileTask,
    failed: &AtomicBool,
    err: ExecuteError,
  ) -> TaskReport {
    error!(task = %task.key, error = %err, "compile failed");
    // The next build must recompile regardless of what the failed run left behind.
    self.store.remove(&task.key);
    failed.store(true, Ordering::SeqCst);
    report.status = TaskStatus::CompileFailed;
    report.error = Some(err);
    report
  }

  async fn link(&self, task: LinkTask, recompiled: bool) -> TaskReport {
    let target = &task.target;
    let id = TaskId::Link(target.name.clone());

    let Ok(_permit) = self.semaphore.acquire().await else {
      return TaskReport::new(id, TaskStatus::Skipped);
    };

    let mut report = TaskReport::new(id, TaskStatus::UpToDate);
    let libraries = self.libraries(target);
    let staleness = link_staleness(self.stamps.as_ref(), &target.output, &task.objects, recompiled, &libraries);
    let Staleness::Stale(reason) = staleness else {
      debug!(target = %target.name, "artifact up to date");
      return report;
    };
    report.reason = Some(reason);

    let invocation = link_invocation(target, &task.objects).with_cwd(&self.config.root);
    let cmd = invocation.to_string();
    report.invocation = Some(cmd.clone());

    if let Err(e) = self.ensure_parent(&target.output) {
      return fail_link(report, &target.name, e);
    }

    // Archives are rebuilt from scratch; `ar rcs` would keep members of removed sources.
    if target.kind == ArtifactKind::StaticLibrary {
      match std::fs::remove_file(self.config.root.join(&target.output)) {
        Ok(()) => debug!(target = %target.name, path = ?target.output, "removed previous archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return fail_link(report, &target.name, ExecuteError::Io(e)),
      }
    }

    info!(target = %target.name, reason = ?report.reason, "linking");
    debug!(cmd = %cmd, "link invocation");

    match self.runner.run(&invocation).await {
      Ok(output) if output.success() => {
        report.status = TaskStatus::Success;
        report.exit_code = output.code;
        report
      }
      Ok(output) => {
        report.exit_code = output.code;
        let err = ExecuteError::LinkFailed {
          cmd,
          code: output.code,
          stderr: output.stderr,
        };
        fail_link(report, &target.name, err)
      }
      Err(source) => fail_link(report, &target.name, ExecuteError::Spawn { cmd, source }),
    }
  }

  fn ensure_parent(&self, path: &Path) -> Result<(), ExecuteError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(self.config.root.join(parent))?;
    }
    Ok(())
  }
}

fn fail_link(mut report: TaskReport, target: &str, err: ExecuteError) -> TaskReport {
  error!(target = %target, error = %err, "link failed");
  report.status = TaskStatus::LinkFailed;
  report.error = Some(err);
  report
}

/// Roll task reports up into per-target statuses.
fn summarize(graph: &BuildGraph, tasks: Vec<TaskReport>) -> BuildReport {
  let mut report = BuildReport {
    tasks,
    ..BuildReport::default()
  };

  for target in graph.targets() {
    let mut status = TargetStatus::UpToDate;
    for task in report.tasks.iter().filter(|t| t.id.target() == target.name) {
      if task.status.is_failure() {
        status = TargetStatus::Failed;
        break;
      }
      if task.id.is_link() && task.status == TaskStatus::Success {
        status = TargetStatus::Built;
      }
    }
    report.targets.insert(target.name.clone(), status);
  }

  report
}

/// One task of a [`Plan`].
#[derive(Debug, Serialize)]
pub struct PlanEntry {
  pub id: TaskId,
  pub wave: usize,
  /// The cached dependency record would be refreshed first.
  pub rescan: bool,
  #[serde(serialize_with = "serialize_staleness")]
  pub staleness: Staleness,
  pub invocation: Option<String>,
}

fn serialize_staleness<S: serde::Serializer>(staleness: &Staleness, serializer: S) -> Result<S::Ok, S::Error> {
  match staleness.reason() {
    Some(reason) => serializer.collect_str(reason),
    None => serializer.serialize_none(),
  }
}

/// What a build would do, grouped into execution waves.
#[derive(Debug, Default, Serialize)]
pub struct Plan {
  pub waves: Vec<Vec<PlanEntry>>,
}

impl Plan {
  pub fn entries(&self) -> impl Iterator<Item = &PlanEntry> {
    self.waves.iter().flatten()
  }

  pub fn entry(&self, id: &TaskId) -> Option<&PlanEntry> {
    self.entries().find(|e| &e.id == id)
  }

  /// Number of tasks that would run a process.
  pub fn stale_count(&self) -> usize {
    self.entries().filter(|e| e.staleness.is_stale()).count()
  }
}

#[derive(Debug, Default, Serialize)]
pub struct CleanReport {
  pub removed: Vec<PathBuf>,
  pub records: usize,
}

/// Build the selected targets with the real toolchain.
///
/// Takes the exclusive build lock, loads the dependency store from
/// `config.state_dir`, runs the build and saves the store afterwards, even
/// when some targets failed.
pub async fn build(
  registry: &TargetRegistry,
  names: &[String],
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError> {
  let graph = BuildGraph::from_registry(registry, names)?;
  let _lock = BuildLock::acquire(&config.state_dir, LockMode::Exclusive, &lock_command("build", names))?;
  let store = Arc::new(DependencyStore::load(&config.state_dir)?);

  Engine::with_toolchain(config.clone(), store).build_and_save(&graph).await
}

/// Plan the selected targets without running anything.
pub fn plan(registry: &TargetRegistry, names: &[String], config: &ExecuteConfig) -> Result<Plan, ExecuteError> {
  let graph = BuildGraph::from_registry(registry, names)?;
  let _lock = BuildLock::acquire(&config.state_dir, LockMode::Shared, &lock_command("plan", names))?;
  let store = Arc::new(DependencyStore::load(&config.state_dir)?);

  Ok(Engine::with_toolchain(config.clone(), store).plan(&graph))
}

/// Remove build outputs and dependency records of the selected targets.
pub fn clean(registry: &TargetRegistry, names: &[String], config: &ExecuteConfig) -> Result<CleanReport, ExecuteError> {
  let graph = BuildGraph::from_registry(registry, names)?;
  let _lock = BuildLock::acquire(&config.state_dir, LockMode::Exclusive, &lock_command("clean", names))?;
  let store = Arc::new(DependencyStore::load(&config.state_dir)?);

  let report = Engine::with_toolchain(config.clone(), store.clone()).clean(&graph)?;
  store.save()?;
  Ok(report)
}

fn lock_command(command: &str, names: &[String]) -> String {
  let mut rendered = format!("kiln {}", command);
  for name in names {
    rendered.push(' ');
    rendered.push_str(name);
  }
  rendered
}
