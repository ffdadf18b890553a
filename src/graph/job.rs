//! The link graph job: the one mutable world a solver run operates on.
//!
//! A job owns a dense edge matrix (distances, capacities, demands, assigned
//! flow), per-node annotations (station id, attached path fragments, the
//! flow-share table) and the path arena. Nothing else is shared; a job can be
//! solved on any thread independently of every other job.

use anyhow::{Result, bail};

use crate::graph::flows::FlowStatMap;
use crate::graph::path::{DISTANCE_UNREACHABLE, Path, PathArena, PathId};
use crate::graph::{NodeId, StationId};

/// Solver tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    /// Divisor applied to a demand to size individual flow pushes. Higher
    /// values spread a demand over more, smaller pushes.
    pub accuracy: u32,
    /// Percentage of an edge's capacity the shortest-path pass may fill.
    pub short_path_saturation: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            accuracy: 16,
            short_path_saturation: 80,
        }
    }
}

impl SolverSettings {
    fn validate(&self) -> Result<()> {
        if self.accuracy == 0 {
            bail!("accuracy must be at least 1");
        }
        if self.short_path_saturation == 0 || self.short_path_saturation > 100 {
            bail!(
                "short_path_saturation must be a percentage in 1..=100, got {}",
                self.short_path_saturation
            );
        }
        Ok(())
    }
}

/// Capacity usable under a saturation limit; `None` lifts the limit.
///
/// A present but zero-capacity link keeps a usable capacity of one unit so it
/// can still carry a trickle instead of dead-ending the search.
pub(crate) fn effective_capacity(capacity: u32, max_saturation: Option<u32>) -> u32 {
    match max_saturation {
        None => capacity,
        Some(pct) => (u64::from(capacity) * u64::from(pct) / 100).max(1) as u32,
    }
}

/// Mutable per-edge state for an ordered node pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeAnnotation {
    distance: u32,
    capacity: u32,
    flow: u32,
    demand: u32,
    unsatisfied_demand: u32,
}

impl EdgeAnnotation {
    fn absent() -> Self {
        Self {
            distance: DISTANCE_UNREACHABLE,
            capacity: 0,
            flow: 0,
            demand: 0,
            unsatisfied_demand: 0,
        }
    }

    /// Whether a link exists for this pair at all.
    pub fn has_link(&self) -> bool {
        self.distance < DISTANCE_UNREACHABLE
    }

    pub fn distance(&self) -> u32 {
        self.distance
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn flow(&self) -> u32 {
        self.flow
    }

    pub fn demand(&self) -> u32 {
        self.demand
    }

    pub fn unsatisfied_demand(&self) -> u32 {
        self.unsatisfied_demand
    }

    pub(crate) fn add_flow(&mut self, flow: u32) {
        self.flow += flow;
    }

    pub(crate) fn remove_flow(&mut self, flow: u32) {
        debug_assert!(self.flow >= flow);
        self.flow -= flow;
    }

    pub(crate) fn satisfy_demand(&mut self, flow: u32) {
        debug_assert!(self.unsatisfied_demand >= flow);
        self.unsatisfied_demand -= flow;
    }
}

/// Per-node state: the station behind the node, the routing table built so
/// far, and the path fragments currently departing from here.
#[derive(Debug)]
pub struct NodeAnnotation {
    station: StationId,
    flows: FlowStatMap,
    paths: Vec<PathId>,
}

pub struct LinkGraphJob {
    settings: SolverSettings,
    nodes: Vec<NodeAnnotation>,
    edges: Vec<EdgeAnnotation>,
    adjacency: Vec<Vec<NodeId>>,
    paths: PathArena,
}

impl LinkGraphJob {
    /// Creates an edgeless job over the given stations. Station ids must be
    /// unique; the second pass resolves share-table entries back to nodes
    /// through them.
    pub fn new(stations: Vec<StationId>, settings: SolverSettings) -> Result<Self> {
        settings.validate()?;
        let mut seen = stations.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != stations.len() {
            bail!("station ids must be unique");
        }
        let size = stations.len();
        let nodes = stations
            .into_iter()
            .map(|station| NodeAnnotation {
                station,
                flows: FlowStatMap::default(),
                paths: Vec::new(),
            })
            .collect();
        Ok(Self {
            settings,
            nodes,
            edges: vec![EdgeAnnotation::absent(); size * size],
            adjacency: vec![Vec::new(); size],
            paths: PathArena::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn station(&self, node: NodeId) -> StationId {
        self.nodes[node].station
    }

    pub fn flows(&self, node: NodeId) -> &FlowStatMap {
        &self.nodes[node].flows
    }

    pub(crate) fn flows_mut(&mut self, node: NodeId) -> &mut FlowStatMap {
        &mut self.nodes[node].flows
    }

    /// Path fragments departing from `node`, in attachment order.
    pub fn node_paths(&self, node: NodeId) -> &[PathId] {
        &self.nodes[node].paths
    }

    pub(crate) fn take_node_paths(&mut self, node: NodeId) -> Vec<PathId> {
        std::mem::take(&mut self.nodes[node].paths)
    }

    /// Targets of real outgoing links, ascending.
    pub fn out_neighbors(&self, node: NodeId) -> &[NodeId] {
        &self.adjacency[node]
    }

    pub fn edge(&self, from: NodeId, to: NodeId) -> &EdgeAnnotation {
        &self.edges[from * self.nodes.len() + to]
    }

    pub(crate) fn edge_mut(&mut self, from: NodeId, to: NodeId) -> &mut EdgeAnnotation {
        let size = self.nodes.len();
        &mut self.edges[from * size + to]
    }

    /// Installs a link. `distance` must be positive and finite; self-links
    /// are rejected (the diagonal is reserved for consumption bookkeeping).
    pub fn set_edge(&mut self, from: NodeId, to: NodeId, distance: u32, capacity: u32) -> Result<()> {
        if from == to {
            bail!("self-link {from}->{to} is not a real edge");
        }
        if from >= self.size() || to >= self.size() {
            bail!("link {from}->{to} out of bounds for {} nodes", self.size());
        }
        if distance == 0 || distance == DISTANCE_UNREACHABLE {
            bail!("link {from}->{to} needs a positive finite distance");
        }
        let edge = self.edge_mut(from, to);
        let was_present = edge.has_link();
        edge.distance = distance;
        edge.capacity = capacity;
        if !was_present {
            let row = &mut self.adjacency[from];
            let at = row.partition_point(|&t| t < to);
            row.insert(at, to);
        }
        Ok(())
    }

    /// Registers demand for an ordered pair. The pair does not need a direct
    /// link; the solver routes over whatever paths exist.
    pub fn set_demand(&mut self, from: NodeId, to: NodeId, demand: u32) -> Result<()> {
        if from >= self.size() || to >= self.size() {
            bail!("demand {from}->{to} out of bounds for {} nodes", self.size());
        }
        let edge = self.edge_mut(from, to);
        edge.demand = demand;
        edge.unsatisfied_demand = demand;
        Ok(())
    }

    pub fn total_demand(&self) -> u64 {
        self.edges.iter().map(|e| u64::from(e.demand)).sum()
    }

    pub fn total_unsatisfied_demand(&self) -> u64 {
        self.edges.iter().map(|e| u64::from(e.unsatisfied_demand)).sum()
    }

    pub fn path(&self, id: PathId) -> &Path {
        self.paths.get(id)
    }

    pub(crate) fn path_mut(&mut self, id: PathId) -> &mut Path {
        self.paths.get_mut(id)
    }

    pub(crate) fn alloc_path(&mut self, node: NodeId, is_root: bool) -> PathId {
        self.paths.alloc(node, is_root)
    }

    pub(crate) fn free_path(&mut self, id: PathId) {
        self.paths.free(id);
    }

    pub(crate) fn detach_path(&mut self, id: PathId) {
        self.paths.detach(id);
    }

    pub(crate) fn fork_path(&mut self, id: PathId, parent: PathId, capacity: u32, free_capacity: i64, distance: u32) {
        self.paths.fork(id, parent, capacity, free_capacity, distance);
    }

    pub(crate) fn live_paths(&self) -> usize {
        self.paths.live_count()
    }

    /// Pushes up to `want` units of flow along the tree chain ending at
    /// `leaf`, bounded by every edge's remaining headroom when a saturation
    /// limit applies. The amount actually pushed lands on each edge and each
    /// path node of the chain; a fragment receiving its first flow is
    /// attached to its parent node's path list. Returns the pushed amount.
    pub(crate) fn add_flow_along(&mut self, leaf: PathId, want: u32, max_saturation: Option<u32>) -> u32 {
        let mut flow = want;
        if let Some(pct) = max_saturation {
            let mut cur = leaf;
            while let Some(parent) = self.paths.get(cur).parent() {
                let from = self.paths.get(parent).node();
                let to = self.paths.get(cur).node();
                let edge = self.edge(from, to);
                let usable = effective_capacity(edge.capacity(), Some(pct));
                if usable <= edge.flow() {
                    return 0;
                }
                flow = flow.min(usable - edge.flow());
                cur = parent;
            }
        }
        if flow == 0 {
            return 0;
        }
        let mut cur = leaf;
        while let Some(parent) = self.paths.get(cur).parent() {
            let from = self.paths.get(parent).node();
            let to = self.paths.get(cur).node();
            if self.paths.get(cur).flow() == 0 {
                self.nodes[from].paths.push(cur);
            }
            self.paths.get_mut(cur).add_flow(flow);
            self.edge_mut(from, to).add_flow(flow);
            cur = parent;
        }
        self.paths.get_mut(cur).add_flow(flow);
        flow
    }
}
