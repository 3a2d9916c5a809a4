//! Task graph for compile and link scheduling.
//!
//! Every selected target contributes one compile node per source and one link
//! node, with an edge from each compile node to the link node. Compile nodes
//! never depend on each other, so the graph is always two levels deep per
//! target, but the scheduler only relies on the edges.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::config::{ConfigError, SourceFile, TaskKey, Target, TargetRegistry};

use super::types::TaskId;

/// One source compiled for one target.
#[derive(Debug, Clone)]
pub struct CompileTask {
  pub target: Arc<Target>,
  pub source: SourceFile,
  pub key: TaskKey,
  pub object: PathBuf,
}

/// Links (or archives) a target's objects into its artifact.
#[derive(Debug, Clone)]
pub struct LinkTask {
  pub target: Arc<Target>,
  /// Objects in declared source order.
  pub objects: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum TaskNode {
  Compile(CompileTask),
  Link(LinkTask),
}

impl TaskNode {
  pub fn id(&self) -> TaskId {
    match self {
      TaskNode::Compile(task) => TaskId::Compile(task.key.clone()),
      TaskNode::Link(task) => TaskId::Link(task.target.name.clone()),
    }
  }

  pub fn target(&self) -> &Arc<Target> {
    match self {
      TaskNode::Compile(task) => &task.target,
      TaskNode::Link(task) => &task.target,
    }
  }
}

/// The compile/link graph for a set of targets.
pub struct BuildGraph {
  graph: DiGraph<TaskNode, ()>,
  targets: Vec<Arc<Target>>,
  links: BTreeMap<String, NodeIndex>,
}

impl BuildGraph {
  /// Build the graph for the named targets, or all targets when `names` is
  /// empty.
  pub fn from_registry(registry: &TargetRegistry, names: &[String]) -> Result<Self, ConfigError> {
    Self::new(registry.select(names)?)
  }

  /// Build the graph for the given targets.
  ///
  /// # Errors
  ///
  /// - `NoSources` if a target has no sources
  /// - `OutsideBaseDir` if a mirrored layout cannot place an object
  /// - `ObjectPathCollision` if two compile tasks would write the same object
  pub fn new(targets: Vec<Arc<Target>>) -> Result<Self, ConfigError> {
    let mut graph = DiGraph::new();
    let mut links = BTreeMap::new();
    let mut objects: HashMap<PathBuf, TaskKey> = HashMap::new();

    for target in &targets {
      if target.sources.is_empty() {
        return Err(ConfigError::NoSources(target.name.clone()));
      }

      let mut compile_nodes = Vec::with_capacity(target.sources.len());
      let mut target_objects = Vec::with_capacity(target.sources.len());

      for source in &target.sources {
        let key = target.task_key(source);
        let object = target.object_path(source)?;

        if let Some(first) = objects.get(&object) {
          return Err(ConfigError::ObjectPathCollision {
            path: object,
            first: first.clone(),
            second: key,
          });
        }
        objects.insert(object.clone(), key.clone());

        target_objects.push(object.clone());
        compile_nodes.push(graph.add_node(TaskNode::Compile(CompileTask {
          target: target.clone(),
          source: source.clone(),
          key,
          object,
        })));
      }

      let link = graph.add_node(TaskNode::Link(LinkTask {
        target: target.clone(),
        objects: target_objects,
      }));
      for compile in compile_nodes {
        graph.add_edge(compile, link, ());
      }
      links.insert(target.name.clone(), link);
    }

    debug!(targets = targets.len(), tasks = graph.node_count(), "built task graph");

    Ok(Self { graph, targets, links })
  }

  pub fn targets(&self) -> &[Arc<Target>] {
    &self.targets
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn node(&self, idx: NodeIndex) -> &TaskNode {
    &self.graph[idx]
  }

  pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &TaskNode)> {
    self.graph.node_indices().map(|idx| (idx, &self.graph[idx]))
  }

  pub fn compile_tasks(&self) -> impl Iterator<Item = &CompileTask> {
    self.graph.node_weights().filter_map(|node| match node {
      TaskNode::Compile(task) => Some(task),
      TaskNode::Link(_) => None,
    })
  }

  pub fn link_node(&self, target: &str) -> Option<NodeIndex> {
    self.links.get(target).copied()
  }

  /// Nodes that must finish before `idx` may start.
  pub fn dependencies(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
    self.graph.neighbors_directed(idx, Direction::Incoming)
  }

  /// Nodes waiting on `idx`.
  pub fn dependents(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
    self.graph.neighbors_directed(idx, Direction::Outgoing)
  }

  pub fn in_degree(&self, idx: NodeIndex) -> usize {
    self.dependencies(idx).count()
  }

  /// Nodes with no dependencies, in insertion order.
  pub fn roots(&self) -> Vec<NodeIndex> {
    self.graph.node_indices().filter(|&idx| self.in_degree(idx) == 0).collect()
  }

  /// Group nodes into waves that could run in parallel.
  ///
  /// Each wave contains nodes whose dependencies are all in earlier waves.
  pub fn execution_waves(&self) -> Vec<Vec<NodeIndex>> {
    let mut in_degree: HashMap<NodeIndex, usize> =
      self.graph.node_indices().map(|idx| (idx, self.in_degree(idx))).collect();
    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[idx] == 0).copied().collect();
      if ready.is_empty() {
        // Unreachable for graphs built by `new`, which only add compile -> link edges.
        break;
      }
      ready.sort();

      for idx in &ready {
        remaining.remove(idx);
        for dependent in self.dependents(*idx) {
          if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree = degree.saturating_sub(1);
          }
        }
      }

      waves.push(ready);
    }

    waves
  }
}
