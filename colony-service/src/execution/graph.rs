// Execution Graph (DAG) Builder
// Builds an index-addressed dependency graph over executions and partitions it into batches

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Anything that can be placed in an execution graph
pub trait DependencyNode {
    /// Unique name of the node
    fn node_name(&self) -> &str;
    /// Names of the nodes this one must run after
    fn node_dependencies(&self) -> &[String];
}

/// Error type for graph construction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Reference to a module that is not part of the set
    #[error("module '{module}' depends on unknown module '{dependency}'")]
    DependencyNotFound { module: String, dependency: String },

    /// Circular dependency; the path starts and ends on the same module
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// The same module appears twice in one set
    #[error("module '{name}' appears more than once")]
    DuplicateModule { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Directed acyclic graph of executions
///
/// Nodes live in an arena addressed by index; `dependencies[i]` lists the
/// nodes `i` must run after. Every node in batch `n` depends only on nodes
/// in batches `0..n`.
#[derive(Debug, Clone)]
pub struct ExecutionGraph<T> {
    nodes: Vec<T>,
    indices: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    levels: Vec<usize>,
    batches: Vec<Vec<usize>>,
}

impl<T: DependencyNode> ExecutionGraph<T> {
    /// Build and validate a graph
    pub fn build(nodes: Vec<T>) -> Result<Self, GraphError> {
        let mut indices = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if indices.insert(node.node_name().to_string(), i).is_some() {
                return Err(GraphError::DuplicateModule {
                    name: node.node_name().to_string(),
                });
            }
        }

        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for dep in node.node_dependencies() {
                let Some(&dep_idx) = indices.get(dep) else {
                    return Err(GraphError::DependencyNotFound {
                        module: node.node_name().to_string(),
                        dependency: dep.clone(),
                    });
                };
                if !dependencies[i].contains(&dep_idx) {
                    dependencies[i].push(dep_idx);
                    dependents[dep_idx].push(i);
                }
            }
        }

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(GraphError::CyclicDependency {
                cycle: cycle
                    .into_iter()
                    .map(|i| nodes[i].node_name().to_string())
                    .collect(),
            });
        }

        let levels = assign_levels(&dependencies, &dependents)?;
        let batch_count = levels.iter().max().map_or(0, |max| max + 1);
        let mut batches = vec![Vec::new(); batch_count];
        for (i, &level) in levels.iter().enumerate() {
            batches[level].push(i);
        }

        tracing::debug!(nodes = nodes.len(), batches = batches.len(), "built execution graph");

        Ok(Self {
            nodes,
            indices,
            dependencies,
            dependents,
            levels,
            batches,
        })
    }

    /// Serializable view of the graph for diagnostics
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            batches: self
                .batch_names()
                .into_iter()
                .map(|batch| batch.into_iter().map(str::to_string).collect())
                .collect(),
            nodes: self
                .nodes
                .iter()
                .enumerate()
                .map(|(i, node)| NodeSnapshot {
                    name: node.node_name().to_string(),
                    batch: self.levels[i],
                    dependencies: self.dependencies[i]
                        .iter()
                        .map(|&d| self.nodes[d].node_name().to_string())
                        .collect(),
                })
                .collect(),
        }
    }

    /// Names per batch, in execution order
    pub fn batch_names(&self) -> Vec<Vec<&str>> {
        self.batches
            .iter()
            .map(|batch| batch.iter().map(|&i| self.nodes[i].node_name()).collect())
            .collect()
    }
}

impl<T> ExecutionGraph<T> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[T] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &T {
        &self.nodes[index]
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Nodes that directly depend on a node
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Batch index of a node
    pub fn level(&self, index: usize) -> usize {
        self.levels[index]
    }

    /// Node indices per batch; members of one batch have no edges between them
    pub fn batches(&self) -> &[Vec<usize>] {
        &self.batches
    }
}

/// Serializable summary of an execution graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub batches: Vec<Vec<String>>,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub name: String,
    pub batch: usize,
    pub dependencies: Vec<String>,
}

/// DFS with white/gray/black coloring; returns the first cycle found
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::White; dependencies.len()];
    let mut path = Vec::new();

    for start in 0..dependencies.len() {
        if marks[start] == Mark::White {
            if let Some(cycle) = visit(start, dependencies, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    dependencies: &[Vec<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    marks[node] = Mark::Gray;
    path.push(node);

    for &dep in &dependencies[node] {
        match marks[dep] {
            Mark::Gray => {
                // dep is on the current path, so the cycle is path[dep..] -> dep
                let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(dep);
                return Some(cycle);
            }
            Mark::White => {
                if let Some(cycle) = visit(dep, dependencies, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Black => {}
        }
    }

    path.pop();
    marks[node] = Mark::Black;
    None
}

/// Longest-path level of every node: 0 without dependencies, otherwise
/// 1 + the highest level among its dependencies
fn assign_levels(
    dependencies: &[Vec<usize>],
    dependents: &[Vec<usize>],
) -> Result<Vec<usize>, GraphError> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut levels = vec![0; dependencies.len()];
    let mut queue: VecDeque<usize> = (0..dependencies.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut processed = 0;

    while let Some(node) = queue.pop_front() {
        processed += 1;
        for &next in &dependents[node] {
            levels[next] = levels[next].max(levels[node] + 1);
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if processed != dependencies.len() {
        // find_cycle runs first, so this only guards the invariant
        return Err(GraphError::CyclicDependency { cycle: Vec::new() });
    }
    Ok(levels)
}
