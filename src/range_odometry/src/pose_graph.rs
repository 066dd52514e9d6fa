//! Pose-graph boundary.
//!
//! Odometry produces a chain of relative-pose edges with information matrices.
//! [`PoseGraph`] records them together with initial node values and submits
//! everything to a [`PoseGraphBackend`]; an actual optimizer (factor graph,
//! sparse Gauss-Newton, ...) plugs in behind that trait.

use std::collections::BTreeMap;

use anyhow::{ensure, Result};
use nalgebra::{Isometry3, Matrix6};

/// Constraint `pose(to) = pose(from) · relative_pose`
#[derive(Debug, Clone, PartialEq)]
pub struct RelativePoseEdge {
    pub from: usize,
    pub to: usize,
    pub relative_pose: Isometry3<f64>,
    /// 6x6 information in twist order `[v, ω]`
    pub information: Matrix6<f64>,
}

/// Optimizer behind the pose graph
pub trait PoseGraphBackend {
    fn set_initial(&mut self, node: usize, pose: Isometry3<f64>);

    fn add_edge(&mut self, edge: RelativePoseEdge);

    /// Optimize and return the estimate of every node
    fn optimize(&mut self, max_iterations: usize) -> BTreeMap<usize, Isometry3<f64>>;
}

/// Pass-through backend returning the initial values unchanged
#[derive(Debug, Clone, Default)]
pub struct DeadReckoningBackend {
    initial: BTreeMap<usize, Isometry3<f64>>,
    edges: Vec<RelativePoseEdge>,
}

impl DeadReckoningBackend {
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}

impl PoseGraphBackend for DeadReckoningBackend {
    fn set_initial(&mut self, node: usize, pose: Isometry3<f64>) {
        self.initial.insert(node, pose);
    }

    fn add_edge(&mut self, edge: RelativePoseEdge) {
        self.edges.push(edge);
    }

    fn optimize(&mut self, _max_iterations: usize) -> BTreeMap<usize, Isometry3<f64>> {
        self.initial.clone()
    }
}

/// Nodes with initial values and the edges between them
#[derive(Debug, Clone, Default)]
pub struct PoseGraph {
    nodes: BTreeMap<usize, Isometry3<f64>>,
    edges: Vec<RelativePoseEdge>,
}

impl PoseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the initial value of `node`
    pub fn insert_node(&mut self, node: usize, pose: Isometry3<f64>) {
        self.nodes.insert(node, pose);
    }

    /// Add an edge between two existing nodes
    pub fn add_edge(&mut self, edge: RelativePoseEdge) -> Result<()> {
        ensure!(
            self.nodes.contains_key(&edge.from) && self.nodes.contains_key(&edge.to),
            "edge {} -> {} references an unknown node",
            edge.from,
            edge.to
        );
        ensure!(edge.from != edge.to, "self edge on node {}", edge.from);
        self.edges.push(edge);
        Ok(())
    }

    /// Append a node after the last one, chained by an odometry edge.
    ///
    /// The first call on an empty graph creates node 0 at `relative_pose`
    /// without an edge. Returns the new node id.
    pub fn push_odometry(&mut self, relative_pose: Isometry3<f64>, information: Matrix6<f64>) -> usize {
        let Some((&last, &last_pose)) = self.nodes.last_key_value() else {
            self.nodes.insert(0, relative_pose);
            return 0;
        };

        let node = last + 1;
        self.nodes.insert(node, last_pose * relative_pose);
        self.edges.push(RelativePoseEdge {
            from: last,
            to: node,
            relative_pose,
            information,
        });
        node
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &BTreeMap<usize, Isometry3<f64>> {
        &self.nodes
    }

    pub fn edges(&self) -> &[RelativePoseEdge] {
        &self.edges
    }

    /// Initial value of `node`
    pub fn pose(&self, node: usize) -> Option<&Isometry3<f64>> {
        self.nodes.get(&node)
    }

    /// Hand all nodes and edges to `backend`
    pub fn submit<B: PoseGraphBackend + ?Sized>(&self, backend: &mut B) {
        for (&node, &pose) in &self.nodes {
            backend.set_initial(node, pose);
        }
        for edge in &self.edges {
            backend.add_edge(edge.clone());
        }
    }

    /// Submit to `backend` and optimize
    pub fn optimize_with<B: PoseGraphBackend + ?Sized>(
        &self,
        backend: &mut B,
        max_iterations: usize,
    ) -> BTreeMap<usize, Isometry3<f64>> {
        self.submit(backend);
        backend.optimize(max_iterations)
    }
}
