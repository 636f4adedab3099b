// ABOUTME: Dependency graph over tasks and deterministic execution planning
// ABOUTME: Merges implicit in-job ordering with explicit cross-job edges and validates acyclicity

use indexmap::IndexMap;
use petgraph::algo::{has_path_connecting, is_cyclic_directed, tarjan_scc};
use petgraph::graph::NodeIndex;
use petgraph::{Direction, Graph};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use super::collection::JobList;
use super::error::{EngineError, Result};
use super::task::{Task, TaskId};

/// Reference to a task from a [`Dependence`] entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskRef {
    /// Object identity.
    Id(TaskId),
    /// Bare task name; must be unique across all jobs.
    Name(String),
    /// Task name within a named job.
    Qualified { job: String, task: String },
}

impl TaskRef {
    pub fn qualified(job: impl Into<String>, task: impl Into<String>) -> Self {
        TaskRef::Qualified {
            job: job.into(),
            task: task.into(),
        }
    }
}

impl From<TaskId> for TaskRef {
    fn from(id: TaskId) -> Self {
        TaskRef::Id(id)
    }
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        TaskRef::Id(task.id())
    }
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> Self {
        TaskRef::Name(name.to_string())
    }
}

impl From<String> for TaskRef {
    fn from(name: String) -> Self {
        TaskRef::Name(name)
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Id(id) => write!(f, "task id {}", id),
            TaskRef::Name(name) => write!(f, "'{}'", name),
            TaskRef::Qualified { job, task } => write!(f, "'{}/{}'", job, task),
        }
    }
}

/// Explicit ordering edges beyond the implicit order inside each job.
#[derive(Debug, Clone, Default)]
pub struct Dependence {
    edges: IndexMap<TaskRef, Vec<TaskRef>>,
}

impl Dependence {
    pub fn new() -> Self {
        Self::default()
    }

    /// `parent` must run before `child`.
    pub fn add(&mut self, parent: impl Into<TaskRef>, child: impl Into<TaskRef>) -> &mut Self {
        self.edges
            .entry(parent.into())
            .or_default()
            .push(child.into());
        self
    }

    pub fn add_all<I, R>(&mut self, parent: impl Into<TaskRef>, children: I) -> &mut Self
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        self.edges
            .entry(parent.into())
            .or_default()
            .extend(children.into_iter().map(Into::into));
        self
    }

    /// Register `parent` with no outgoing edge.
    pub fn isolate(&mut self, parent: impl Into<TaskRef>) -> &mut Self {
        self.edges.entry(parent.into()).or_default();
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskRef, &[TaskRef])> {
        self.edges
            .iter()
            .map(|(parent, children)| (parent, children.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// A task node and its position in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub job: String,
    pub task: String,
    pub job_index: usize,
    pub task_index: usize,
    /// Position in the flattened declaration order.
    pub order: usize,
}

impl TaskNode {
    pub fn label(&self) -> String {
        format!("{}/{}", self.job, self.task)
    }
}

pub struct TaskGraph {
    graph: Graph<TaskNode, ()>,
    task_indices: HashMap<TaskId, NodeIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub order: Vec<TaskNode>,
    pub total_tasks: usize,
}

impl TaskGraph {
    /// Build the task graph for `workflow` and validate it.
    pub fn build(workflow: &str, jobs: &JobList, dependence: Option<&Dependence>) -> Result<Self> {
        let dependence = dependence.filter(|dependence| !dependence.is_empty());
        if jobs.is_empty() && dependence.is_none() {
            return Err(EngineError::UndefinedGraph {
                workflow: workflow.to_string(),
            });
        }

        let mut graph = Graph::new();
        let mut task_indices = HashMap::new();
        let mut order = 0;

        for (job_index, job) in jobs.iter().enumerate() {
            if job.tasks().is_empty() {
                return Err(EngineError::EmptyJob {
                    job: job.name().to_string(),
                });
            }

            let mut previous: Option<NodeIndex> = None;
            for (task_index, task) in job.tasks().iter().enumerate() {
                let node = graph.add_node(TaskNode {
                    id: task.id(),
                    job: job.name().to_string(),
                    task: task.name().to_string(),
                    job_index,
                    task_index,
                    order,
                });
                task_indices.insert(task.id(), node);
                order += 1;

                // Implicit edge to the previous task of the same job
                if let Some(previous) = previous {
                    graph.update_edge(previous, node, ());
                }
                previous = Some(node);
            }
        }

        let mut task_graph = Self {
            graph,
            task_indices,
        };

        if let Some(dependence) = dependence {
            for (parent, children) in dependence.iter() {
                let parent_node = task_graph.resolve(parent)?;
                for child in children {
                    let child_node = task_graph.resolve(child)?;
                    task_graph.graph.update_edge(parent_node, child_node, ());
                }
            }
        }

        task_graph.validate_acyclic()?;
        Ok(task_graph)
    }

    fn resolve(&self, reference: &TaskRef) -> Result<NodeIndex> {
        let unknown = || EngineError::UnknownTask {
            reference: reference.to_string(),
        };

        match reference {
            TaskRef::Id(id) => self.task_indices.get(id).copied().ok_or_else(unknown),
            TaskRef::Qualified { job, task } => self
                .graph
                .node_indices()
                .find(|&node| self.graph[node].job == *job && self.graph[node].task == *task)
                .ok_or_else(unknown),
            TaskRef::Name(name) => {
                let matches: Vec<NodeIndex> = self
                    .graph
                    .node_indices()
                    .filter(|&node| self.graph[node].task == *name)
                    .collect();

                match matches.as_slice() {
                    [] => Err(unknown()),
                    [node] => Ok(*node),
                    _ => Err(EngineError::AmbiguousTask {
                        name: name.clone(),
                        jobs: matches
                            .iter()
                            .map(|&node| self.graph[node].job.clone())
                            .collect(),
                    }),
                }
            }
        }
    }

    /// Fail with the tasks of one cycle if the graph is not a DAG.
    pub fn validate_acyclic(&self) -> Result<()> {
        if !is_cyclic_directed(&self.graph) {
            return Ok(());
        }

        let cycle = tarjan_scc(&self.graph)
            .into_iter()
            .find(|component| {
                component.len() > 1
                    || self.graph.contains_edge(component[0], component[0])
            })
            .unwrap_or_default();

        let mut nodes: Vec<&TaskNode> = cycle.iter().map(|&node| &self.graph[node]).collect();
        nodes.sort_by_key(|node| node.order);

        Err(EngineError::CyclicGraph {
            tasks: nodes.into_iter().map(TaskNode::label).collect(),
        })
    }

    /// Topological order preferring declaration order wherever the edges
    /// leave a choice.
    pub fn topological_order(&self) -> Result<Vec<&TaskNode>> {
        self.topological_order_by(|node| node.order)
    }

    /// Kahn's algorithm; among ready nodes the smallest `key` goes first.
    pub fn topological_order_by<K, F>(&self, key: F) -> Result<Vec<&TaskNode>>
    where
        K: Ord,
        F: Fn(&TaskNode) -> K,
    {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|node| {
                let degree = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .count();
                (node, degree)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(K, NodeIndex)>> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&node, _)| Reverse((key(&self.graph[node]), node)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(&self.graph[node]);

            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((key(&self.graph[next]), next)));
                    }
                }
            }
        }

        if order.len() < self.graph.node_count() {
            // Leftover nodes sit on or behind a cycle
            self.validate_acyclic()?;
        }

        Ok(order)
    }

    pub fn create_execution_plan(&self) -> Result<ExecutionPlan> {
        let order: Vec<TaskNode> = self.topological_order()?.into_iter().cloned().collect();
        Ok(ExecutionPlan {
            total_tasks: self.task_count(),
            order,
        })
    }

    pub fn node(&self, id: TaskId) -> Option<&TaskNode> {
        self.task_indices.get(&id).map(|&node| &self.graph[node])
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Tasks that must run directly before `id`.
    pub fn dependencies(&self, id: TaskId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Tasks that must run directly after `id`.
    pub fn dependents(&self, id: TaskId) -> Vec<&TaskNode> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Tasks with no dependencies, in declaration order.
    pub fn roots(&self) -> Vec<&TaskNode> {
        self.graph
            .node_indices()
            .filter(|&node| {
                self.graph
                    .neighbors_directed(node, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|node| &self.graph[node])
            .collect()
    }

    /// Whether `later` (transitively) depends on `earlier`.
    pub fn has_path(&self, earlier: TaskId, later: TaskId) -> bool {
        match (self.task_indices.get(&earlier), self.task_indices.get(&later)) {
            (Some(&from), Some(&to)) => has_path_connecting(&self.graph, from, to, None),
            _ => false,
        }
    }

    fn neighbors(&self, id: TaskId, direction: Direction) -> Vec<&TaskNode> {
        let Some(&node) = self.task_indices.get(&id) else {
            return Vec::new();
        };

        let mut nodes: Vec<&TaskNode> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|neighbor| &self.graph[neighbor])
            .collect();
        nodes.sort_by_key(|node| node.order);
        nodes
    }
}

impl ExecutionPlan {
    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.order.iter().position(|node| node.id == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    /// `job/task` labels in execution order.
    pub fn labels(&self) -> Vec<String> {
        self.order.iter().map(TaskNode::label).collect()
    }
}
