//! Dependency graph with typed edges and the query suite: dependencies,
//! dependents, bounded impact, cycle detection, hubs, orphans, and stats.
//!
//! Nodes are keyed by file path. Forward and reverse adjacency are kept as
//! index lists into one edge arena, so both directions are O(deg). The graph
//! is a multigraph; parallel edges of different kinds are expected.

use crate::error::{IndexError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

/// Combined degree at or above which a node counts as a hub in `stats`.
const HUB_DEGREE_MIN: usize = 5;

/// Default traversal bound for `impact_of`.
pub const DEFAULT_IMPACT_DEPTH: usize = 5;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Imports,
    Exports,
    Calls,
    References,
    Extends,
    Implements,
    Uses,
}

impl EdgeKind {
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Imports => "imports",
            EdgeKind::Exports => "exports",
            EdgeKind::Calls => "calls",
            EdgeKind::References => "references",
            EdgeKind::Extends => "extends",
            EdgeKind::Implements => "implements",
            EdgeKind::Uses => "uses",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "imports" => Some(EdgeKind::Imports),
            "exports" => Some(EdgeKind::Exports),
            "calls" => Some(EdgeKind::Calls),
            "references" => Some(EdgeKind::References),
            "extends" => Some(EdgeKind::Extends),
            "implements" => Some(EdgeKind::Implements),
            "uses" => Some(EdgeKind::Uses),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub file_path: String,
}

/// A node reached by `impact_of`, with its BFS distance from the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactedNode {
    pub path: String,
    pub distance: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubFile {
    pub path: String,
    pub in_degree: usize,
    pub out_degree: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub cycle_count: usize,
    pub hub_count: usize,
    pub orphan_count: usize,
}

// ---------------------------------------------------------------------------
// Graph store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    /// node id -> indices of outgoing edges
    by_source: HashMap<String, Vec<usize>>,
    /// node id -> indices of incoming edges
    by_target: HashMap<String, Vec<usize>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node ids in sorted order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn add_node(&mut self, path: &str) {
        self.nodes
            .entry(path.to_string())
            .or_insert_with(|| GraphNode { file_path: path.to_string() });
    }

    /// Insert a typed edge. Both endpoints must already exist; an edge into
    /// the void is a programmer error, not user input.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: EdgeKind) -> Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(IndexError::InvariantViolation(format!(
                "edge source {from:?} is not a node"
            )));
        }
        if !self.nodes.contains_key(to) {
            return Err(IndexError::InvariantViolation(format!(
                "edge target {to:?} is not a node"
            )));
        }
        let idx = self.edges.len();
        self.by_source.entry(from.to_string()).or_default().push(idx);
        self.by_target.entry(to.to_string()).or_default().push(idx);
        self.edges.push(GraphEdge { from: from.to_string(), to: to.to_string(), kind });
        Ok(())
    }

    /// Remove a node and every edge touching it. Index lists are rebuilt;
    /// removal is O(V + E).
    pub fn remove_node(&mut self, path: &str) -> bool {
        if self.nodes.remove(path).is_none() {
            return false;
        }
        self.edges.retain(|e| e.from != path && e.to != path);
        self.rebuild_adjacency();
        true
    }

    fn rebuild_adjacency(&mut self) {
        self.by_source.clear();
        self.by_target.clear();
        for (idx, edge) in self.edges.iter().enumerate() {
            self.by_source.entry(edge.from.clone()).or_default().push(idx);
            self.by_target.entry(edge.to.clone()).or_default().push(idx);
        }
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.by_source.get(id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.by_target.get(id).map(|v| v.len()).unwrap_or(0)
    }

    /// Outgoing edges of a node, optionally filtered by kind.
    pub fn edges_from(&self, id: &str, kind: Option<EdgeKind>) -> Vec<&GraphEdge> {
        self.by_source
            .get(id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &self.edges[i])
                    .filter(|e| kind.is_none() || Some(e.kind) == kind)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Incoming edges of a node, optionally filtered by kind.
    pub fn edges_to(&self, id: &str, kind: Option<EdgeKind>) -> Vec<&GraphEdge> {
        self.by_target
            .get(id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &self.edges[i])
                    .filter(|e| kind.is_none() || Some(e.kind) == kind)
                    .collect()
            })
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Direct dependencies (distinct outgoing neighbors), sorted.
    pub fn dependencies_of(&self, id: &str) -> Vec<String> {
        self.dependencies_of_depth(id, 1)
    }

    /// Dependencies reachable within `depth` hops along outgoing edges.
    pub fn dependencies_of_depth(&self, id: &str, depth: usize) -> Vec<String> {
        self.bfs(id, depth, Direction::Out)
    }

    /// Direct dependents (distinct incoming neighbors), sorted.
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.bfs(id, 1, Direction::In)
    }

    /// `impact_of` with the standard depth bound.
    pub fn impact_of_default(&self, id: &str) -> Vec<ImpactedNode> {
        self.impact_of(id, DEFAULT_IMPACT_DEPTH)
    }

    /// Blast radius: nodes reachable along outgoing edges within `max_depth`
    /// hops, with their distances, ordered by (distance, path). The origin is
    /// not included even when it sits on a cycle.
    pub fn impact_of(&self, id: &str, max_depth: usize) -> Vec<ImpactedNode> {
        let mut visited: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        visited.insert(id, 0);
        queue.push_back((id, 0));

        while let Some((current, dist)) = queue.pop_front() {
            if dist >= max_depth {
                continue;
            }
            for edge in self.edges_from(current, None) {
                let next = edge.to.as_str();
                if !visited.contains_key(next) {
                    visited.insert(next, dist + 1);
                    queue.push_back((next, dist + 1));
                }
            }
        }

        let mut reached: Vec<ImpactedNode> = visited
            .into_iter()
            .filter(|(node, _)| *node != id)
            .map(|(node, distance)| ImpactedNode { path: node.to_string(), distance })
            .collect();
        reached.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.path.cmp(&b.path)));
        reached
    }

    fn bfs(&self, id: &str, max_depth: usize, direction: Direction) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        queue.push_back((id, 0));

        while let Some((current, dist)) = queue.pop_front() {
            if dist >= max_depth {
                continue;
            }
            let neighbors = match direction {
                Direction::Out => self.edges_from(current, None),
                Direction::In => self.edges_to(current, None),
            };
            for edge in neighbors {
                let next = match direction {
                    Direction::Out => edge.to.as_str(),
                    Direction::In => edge.from.as_str(),
                };
                if next != id && visited.insert(next) {
                    queue.push_back((next, dist + 1));
                }
            }
        }

        let mut result: Vec<String> = visited.into_iter().map(|s| s.to_string()).collect();
        result.sort();
        result
    }

    /// All elementary cycles found by three-color DFS, each rotated to start
    /// at its lexicographically smallest node and deduplicated. Self-edges
    /// surface as single-node cycles.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut colors: HashMap<&str, Color> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();

        for id in self.nodes.keys() {
            if !colors.contains_key(id.as_str()) {
                self.dfs_cycles(id, &mut colors, &mut stack, &mut seen, &mut cycles);
            }
        }

        debug!(cycles = cycles.len(), "cycle detection complete");
        cycles
    }

    fn dfs_cycles<'a>(
        &'a self,
        node: &'a str,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
        seen: &mut HashSet<Vec<String>>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        colors.insert(node, Color::Gray);
        stack.push(node);

        for edge in self.edges_from(node, None) {
            let next = edge.to.as_str();
            match colors.get(next) {
                Some(Color::Gray) => {
                    // Back edge: the cycle runs from next's position in the
                    // recursion stack to the current node.
                    if let Some(pos) = stack.iter().position(|&n| n == next) {
                        let cycle = canonical_rotation(&stack[pos..]);
                        if seen.insert(cycle.clone()) {
                            cycles.push(cycle);
                        }
                    }
                }
                Some(Color::Black) => {}
                None => self.dfs_cycles(next, colors, stack, seen, cycles),
            }
        }

        stack.pop();
        colors.insert(node, Color::Black);
    }

    /// Top `limit` nodes by combined degree.
    pub fn hub_files(&self, limit: usize) -> Vec<HubFile> {
        let mut hubs: Vec<HubFile> = self
            .nodes
            .keys()
            .map(|id| HubFile {
                in_degree: self.in_degree(id),
                out_degree: self.out_degree(id),
                path: id.clone(),
            })
            .collect();
        hubs.sort_by(|a, b| {
            (b.in_degree + b.out_degree)
                .cmp(&(a.in_degree + a.out_degree))
                .then_with(|| a.path.cmp(&b.path))
        });
        hubs.truncate(limit);
        hubs
    }

    /// Nodes with no edges in either direction, sorted.
    pub fn orphan_files(&self) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|id| self.in_degree(id) == 0 && self.out_degree(id) == 0)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let hub_count = self
            .nodes
            .keys()
            .filter(|id| self.in_degree(id) + self.out_degree(id) >= HUB_DEGREE_MIN)
            .count();
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            cycle_count: self.find_cycles().len(),
            hub_count,
            orphan_count: self.orphan_files().len(),
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Out,
    In,
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    Gray,
    Black,
}

/// Rotate a cycle so its lexicographically smallest node comes first.
fn canonical_rotation(cycle: &[&str]) -> Vec<String> {
    let smallest = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| *n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[smallest..]
        .iter()
        .chain(cycle[..smallest].iter())
        .map(|s| s.to_string())
        .collect()
}
