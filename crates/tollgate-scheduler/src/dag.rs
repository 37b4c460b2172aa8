//! Dependency graph between the change detector and job instances.

use crate::matrix::{JobInstance, MatrixExpansion};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tollgate_core::ids::JobId;
use tollgate_core::{Error, Result};

/// Which instances receive a dependency edge on the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatePolicy {
    /// Gate every instance except those marked `always_run`.
    #[default]
    RespectAlwaysRun,
    /// Gate every instance, ignoring `always_run`.
    GateAll,
    /// Gate nothing; every instance runs its task body.
    Disabled,
}

impl GatePolicy {
    pub fn gates(&self, job: &JobInstance) -> bool {
        match self {
            GatePolicy::RespectAlwaysRun => !job.always_run,
            GatePolicy::GateAll => true,
            GatePolicy::Disabled => false,
        }
    }
}

/// A node in the job graph.
#[derive(Debug, Clone)]
pub enum GraphNode {
    Detector,
    Job(JobInstance),
}

impl GraphNode {
    pub fn name(&self) -> &str {
        match self {
            GraphNode::Detector => "check-for-changes",
            GraphNode::Job(job) => &job.display_name,
        }
    }
}

/// Directed acyclic graph with one detector node and one node per instance.
#[derive(Debug)]
pub struct JobGraph {
    graph: DiGraph<GraphNode, ()>,
    detector: NodeIndex,
    jobs: Vec<NodeIndex>,
    by_id: HashMap<JobId, NodeIndex>,
}

impl JobGraph {
    /// Add every instance and wire an edge from the detector to each gated one.
    pub fn build(expansion: &MatrixExpansion, policy: GatePolicy) -> Result<Self> {
        if expansion.is_empty() {
            return Err(Error::Graph("no job instances to wire".into()));
        }

        let mut graph = DiGraph::new();
        let detector = graph.add_node(GraphNode::Detector);
        let mut jobs = Vec::with_capacity(expansion.len());
        let mut by_id = HashMap::new();

        for job in &expansion.jobs {
            let gated = policy.gates(job);
            let idx = graph.add_node(GraphNode::Job(job.clone()));
            if gated {
                graph.add_edge(detector, idx, ());
            }
            if by_id.insert(job.id, idx).is_some() {
                return Err(Error::Graph(format!("job id {} appears twice", job.id)));
            }
            jobs.push(idx);
        }

        let dag = Self {
            graph,
            detector,
            jobs,
            by_id,
        };

        dag.topological_order()?;

        Ok(dag)
    }

    /// Job instances in expansion order.
    pub fn jobs(&self) -> impl Iterator<Item = &JobInstance> {
        self.jobs.iter().filter_map(|&idx| match &self.graph[idx] {
            GraphNode::Job(job) => Some(job),
            GraphNode::Detector => None,
        })
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Whether a job must wait for the detector before its gate check.
    pub fn depends_on_detector(&self, job_id: JobId) -> bool {
        self.by_id
            .get(&job_id)
            .map(|&idx| self.graph.contains_edge(self.detector, idx))
            .unwrap_or(false)
    }

    /// Jobs gated on the detector.
    pub fn dependents(&self) -> Vec<&JobInstance> {
        self.graph
            .neighbors_directed(self.detector, Direction::Outgoing)
            .filter_map(|idx| match &self.graph[idx] {
                GraphNode::Job(job) => Some(job),
                GraphNode::Detector => None,
            })
            .collect()
    }

    /// Jobs with no dependency at all.
    pub fn independent(&self) -> Vec<&JobInstance> {
        self.jobs()
            .filter(|job| !self.depends_on_detector(job.id))
            .collect()
    }

    /// Nodes in an order that respects every dependency edge.
    pub fn topological_order(&self) -> Result<Vec<&GraphNode>> {
        toposort(&self.graph, None)
            .map(|indices| indices.iter().map(|&idx| &self.graph[idx]).collect())
            .map_err(|_| Error::Graph("cycle detected in job dependencies".into()))
    }
}
