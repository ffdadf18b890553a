//! Two-pass multi-commodity flow solver.
//!
//! The first pass saturates shortest paths, capped at a configurable share
//! of each link's capacity, and cancels any directed cycles the greedy
//! assignment produced. The second pass re-runs the search over the routes
//! established so far, ranked by remaining headroom instead of distance, and
//! absorbs whatever demand is left with no capacity limit. Neither pass
//! guarantees optimality; together they produce a sensible, deterministic
//! distribution for every demand that is reachable at all.

use std::cmp::Reverse;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use fxhash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::graph::job::{LinkGraphJob, effective_capacity};
use crate::graph::path::{DISTANCE_UNREACHABLE, FREE_CAPACITY_NONE, Path, PathId, capacity_ratio};
use crate::graph::{NodeId, StationId};
use crate::solvers::flow_mapper::map_flows;

/// Counters for one solver pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassInfo {
    pub pass: &'static str,
    pub sweeps: u32,
    pub flow_pushed: u64,
    pub cycles_eliminated: u32,
    pub elapsed: Duration,
}

/// Counters for a full solver run.
#[derive(Debug, Clone, Serialize)]
pub struct SolveStats {
    pub passes: Vec<PassInfo>,
}

/// Runs both passes and folds the resulting path trees into the per-node
/// flow-share tables. Afterwards every edge's `flow` reflects the assigned
/// routing and `unsatisfied_demand` whatever could not be placed (non-zero
/// only for destinations with no path at all).
pub fn solve(job: &mut LinkGraphJob) -> SolveStats {
    let first = first_pass(job);
    map_flows(job);
    let second = second_pass(job);
    map_flows(job);
    SolveStats {
        passes: vec![first, second],
    }
}

/// Ranking discipline for the best-first search. The key doubles as the
/// frontier ordering; it always embeds the node id, so two distinct paths
/// never compare equal.
trait Annotation {
    type Key: Ord + Copy;

    fn key(path: &Path) -> Self::Key;

    fn node_of(key: &Self::Key) -> NodeId;

    /// Whether extending `base` by an edge with the given parameters would
    /// beat the path currently held for the target node.
    fn is_better(path: &Path, base: &Path, capacity: u32, free_capacity: i64, distance: u32) -> bool;
}

/// Rates paths by accumulated distance; paths with spare capacity always
/// beat overloaded ones regardless of length.
struct DistanceAnnotation;

impl Annotation for DistanceAnnotation {
    // Shorter first, lower node id on equal distance.
    type Key = (u32, NodeId);

    fn key(path: &Path) -> Self::Key {
        (path.distance(), path.node())
    }

    fn node_of(key: &Self::Key) -> NodeId {
        key.1
    }

    fn is_better(path: &Path, base: &Path, _capacity: u32, free_capacity: i64, distance: u32) -> bool {
        if base.distance() == DISTANCE_UNREACHABLE {
            return false;
        }
        if path.distance() == DISTANCE_UNREACHABLE {
            return true;
        }
        if free_capacity > 0 && base.free_capacity() > 0 {
            if path.free_capacity() > 0 {
                base.distance() + distance < path.distance()
            } else {
                // The candidate has headroom and the held path has none.
                true
            }
        } else if path.free_capacity() > 0 {
            false
        } else {
            base.distance() + distance < path.distance()
        }
    }
}

/// Rates paths by their bottleneck capacity ratio; distance only breaks
/// ties. Adding edges can only lower a path's ratio, which keeps the
/// best-first expansion sound.
struct CapacityAnnotation;

impl Annotation for CapacityAnnotation {
    // Highest ratio first, higher node id on equal ratio.
    type Key = (Reverse<i64>, Reverse<NodeId>);

    fn key(path: &Path) -> Self::Key {
        (Reverse(path.capacity_ratio()), Reverse(path.node()))
    }

    fn node_of(key: &Self::Key) -> NodeId {
        key.1.0
    }

    fn is_better(path: &Path, base: &Path, capacity: u32, free_capacity: i64, distance: u32) -> bool {
        let min_ratio = capacity_ratio(
            base.free_capacity().min(free_capacity),
            base.capacity().min(capacity),
        );
        let path_ratio = path.capacity_ratio();
        if min_ratio == path_ratio {
            if base.distance() == DISTANCE_UNREACHABLE {
                false
            } else {
                base.distance() + distance < path.distance()
            }
        } else {
            min_ratio > path_ratio
        }
    }
}

/// Strategy for enumerating candidate next hops from a node.
trait EdgeIterator {
    fn new(job: &LinkGraphJob) -> Self;

    fn set_node(&mut self, job: &LinkGraphJob, source: NodeId, node: NodeId);

    fn next(&mut self) -> Option<NodeId>;
}

/// Yields every real outgoing link of the current node.
struct GraphEdgeIterator {
    targets: Vec<NodeId>,
    pos: usize,
}

impl EdgeIterator for GraphEdgeIterator {
    fn new(_job: &LinkGraphJob) -> Self {
        Self {
            targets: Vec::new(),
            pos: 0,
        }
    }

    fn set_node(&mut self, job: &LinkGraphJob, _source: NodeId, node: NodeId) {
        self.targets.clear();
        self.targets.extend_from_slice(job.out_neighbors(node));
        self.pos = 0;
    }

    fn next(&mut self) -> Option<NodeId> {
        let target = self.targets.get(self.pos).copied();
        if target.is_some() {
            self.pos += 1;
        }
        target
    }
}

/// Yields the next hops recorded in the current node's flow-share table for
/// the tree's source station. Nodes without an entry yield nothing.
struct FlowEdgeIterator {
    station_to_node: FxHashMap<StationId, NodeId>,
    targets: Vec<NodeId>,
    pos: usize,
}

impl EdgeIterator for FlowEdgeIterator {
    fn new(job: &LinkGraphJob) -> Self {
        let station_to_node = (0..job.size()).map(|node| (job.station(node), node)).collect();
        Self {
            station_to_node,
            targets: Vec::new(),
            pos: 0,
        }
    }

    fn set_node(&mut self, job: &LinkGraphJob, source: NodeId, node: NodeId) {
        self.targets.clear();
        self.pos = 0;
        if let Some(stat) = job.flows(node).get(job.station(source)) {
            for via in stat.shares().keys() {
                self.targets.push(self.station_to_node[via]);
            }
        }
    }

    fn next(&mut self) -> Option<NodeId> {
        let target = self.targets.get(self.pos).copied();
        if target.is_some() {
            self.pos += 1;
        }
        target
    }
}

/// Visit state of one node during the per-origin cycle search.
#[derive(Debug, Clone, Copy)]
enum Visit {
    Unvisited,
    /// Being expanded; carries the fragment the walk followed out of here.
    InProgress(PathId),
    /// Fully searched, no cycles below.
    Resolved,
}

struct MultiCommodityFlow<'a> {
    job: &'a mut LinkGraphJob,
    max_saturation: Option<u32>,
    accuracy: u32,
    flow_pushed: u64,
    cycles_eliminated: u32,
}

impl MultiCommodityFlow<'_> {
    /// Best-first search from `source_node`, producing one path per node.
    /// Unreached nodes keep their initial annotation. The frontier is an
    /// ordered set keyed by the annotation; a relaxed path is removed,
    /// re-forked and re-inserted so the set never holds a stale key. A node
    /// improved after its extraction re-enters the frontier, which the
    /// capacity-aware rankings need to converge.
    fn dijkstra<A: Annotation, I: EdgeIterator>(&mut self, source_node: NodeId) -> Vec<PathId> {
        let size = self.job.size();
        let mut iter = I::new(self.job);
        let mut paths = Vec::with_capacity(size);
        let mut annos: BTreeSet<A::Key> = BTreeSet::new();
        for node in 0..size {
            let id = self.job.alloc_path(node, node == source_node);
            annos.insert(A::key(self.job.path(id)));
            paths.push(id);
        }
        while let Some(key) = annos.pop_first() {
            let from = A::node_of(&key);
            iter.set_node(self.job, source_node, from);
            while let Some(to) = iter.next() {
                if to == from {
                    continue; // diagonal entry, carries no link
                }
                let edge = self.job.edge(from, to);
                debug_assert!(edge.has_link(), "edge iterator yielded a missing link");
                let capacity = effective_capacity(edge.capacity(), self.max_saturation);
                let free_capacity = i64::from(capacity) - i64::from(edge.flow());
                // Surcharge every hop so needless intermediate stops lose.
                let distance = edge.distance() + 1;
                let dest = paths[to];
                if A::is_better(self.job.path(dest), self.job.path(paths[from]), capacity, free_capacity, distance) {
                    annos.remove(&A::key(self.job.path(dest)));
                    self.job.fork_path(dest, paths[from], capacity, free_capacity, distance);
                    annos.insert(A::key(self.job.path(dest)));
                }
            }
        }
        paths
    }

    /// Sizes a push from the demand and accuracy, bounds it by the path's
    /// actual headroom and books the result against the demand edge.
    fn push_flow(&mut self, from: NodeId, to: NodeId, path: PathId, max_saturation: Option<u32>) -> u32 {
        let edge = self.job.edge(from, to);
        debug_assert!(edge.unsatisfied_demand() > 0);
        let want = (edge.demand() / self.accuracy).clamp(1, edge.unsatisfied_demand());
        let pushed = self.job.add_flow_along(path, want, max_saturation);
        self.job.edge_mut(from, to).satisfy_demand(pushed);
        self.flow_pushed += u64::from(pushed);
        pushed
    }

    /// Releases a finished run's paths. Fragments that picked up flow are
    /// cut loose from the root and stay attached to their node lists; chains
    /// of flowless, childless paths are freed bottom-up.
    fn cleanup_paths(&mut self, source_id: NodeId, paths: Vec<PathId>) {
        let mut slots: Vec<Option<PathId>> = paths.into_iter().map(Some).collect();
        let source = slots[source_id].take().expect("source path missing");
        for slot in 0..slots.len() {
            let Some(start) = slots[slot] else { continue };
            let mut path = start;
            if self.job.path(path).parent() == Some(source) {
                self.job.detach_path(path);
            }
            loop {
                if path == source || self.job.path(path).flow() > 0 {
                    break;
                }
                let parent = self.job.path(path).parent();
                self.job.detach_path(path);
                if self.job.path(path).num_children() == 0 {
                    slots[self.job.path(path).node()] = None;
                    self.job.free_path(path);
                }
                match parent {
                    Some(p) => path = p,
                    None => break,
                }
            }
        }
        self.job.free_path(source);
    }

    /// Minimum flow along the in-progress chain starting at `cycle_begin`.
    fn find_cycle_flow(&self, state: &[Visit], cycle_begin: PathId) -> u32 {
        let mut flow = u32::MAX;
        let mut cur = cycle_begin;
        loop {
            flow = flow.min(self.job.path(cur).flow());
            let Visit::InProgress(next) = state[self.job.path(cur).node()] else {
                unreachable!("cycle chain left the in-progress walk");
            };
            cur = next;
            if cur == cycle_begin {
                break;
            }
        }
        flow
    }

    /// Cancels `flow` units on every fragment and every edge of the cycle.
    fn eliminate_cycle(&mut self, state: &[Visit], cycle_begin: PathId, flow: u32) {
        let mut cur = cycle_begin;
        loop {
            let prev = self.job.path(cur).node();
            self.job.path_mut(cur).reduce_flow(flow);
            let Visit::InProgress(next) = state[prev] else {
                unreachable!("cycle chain left the in-progress walk");
            };
            cur = next;
            let next_node = self.job.path(cur).node();
            self.job.edge_mut(prev, next_node).remove_flow(flow);
            if cur == cycle_begin {
                break;
            }
        }
        self.cycles_eliminated += 1;
    }

    /// Depth-first cycle search through `origin_id`'s fragments, entering at
    /// `next_id`. Parallel fragments with the same next hop are first merged
    /// onto one representative. A node is only marked resolved if no cycle
    /// was found below it; otherwise another sweep may still find more.
    fn eliminate_cycles_from(&mut self, state: &mut Vec<Visit>, origin_id: NodeId, next_id: NodeId) -> bool {
        match state[next_id] {
            Visit::Resolved => false,
            Visit::InProgress(at_next) => {
                // Arrived at a node of the current chain: that chain loops.
                let flow = self.find_cycle_flow(state, at_next);
                if flow > 0 {
                    self.eliminate_cycle(state, at_next, flow);
                    true
                } else {
                    false
                }
            }
            Visit::Unvisited => {
                let mut next_hops: BTreeMap<NodeId, PathId> = BTreeMap::new();
                let attached: Vec<PathId> = self.job.node_paths(next_id).to_vec();
                for fragment in attached {
                    if self.job.path(fragment).origin() != origin_id {
                        continue;
                    }
                    match next_hops.entry(self.job.path(fragment).node()) {
                        Entry::Vacant(entry) => {
                            entry.insert(fragment);
                        }
                        Entry::Occupied(entry) => {
                            let merged = *entry.get();
                            let moved = self.job.path(fragment).flow();
                            self.job.path_mut(merged).add_flow(moved);
                            self.job.path_mut(fragment).reduce_flow(moved);
                        }
                    }
                }
                let mut found = false;
                for (_, child) in next_hops {
                    if self.job.path(child).flow() > 0 {
                        state[next_id] = Visit::InProgress(child);
                        let to = self.job.path(child).node();
                        found |= self.eliminate_cycles_from(state, origin_id, to);
                    }
                }
                state[next_id] = if found { Visit::Unvisited } else { Visit::Resolved };
                found
            }
        }
    }

    /// Searches every origin's fragment relation for directed cycles and
    /// cancels them. Returns whether anything was cancelled.
    fn eliminate_cycles(&mut self) -> bool {
        let mut cycles_found = false;
        let size = self.job.size();
        for node in 0..size {
            let mut state = vec![Visit::Unvisited; size];
            cycles_found |= self.eliminate_cycles_from(&mut state, node, node);
        }
        cycles_found
    }
}

/// Saturating pass: repeatedly assigns demand along shortest paths, capped
/// at the configured share of each link's capacity, then cancels cycles.
/// Loops until a sweep neither moves flow nor finds a cycle.
pub fn first_pass(job: &mut LinkGraphJob) -> PassInfo {
    let start = Instant::now();
    let accuracy = job.settings().accuracy;
    let max_saturation = Some(job.settings().short_path_saturation);
    let size = job.size();
    let mut mcf = MultiCommodityFlow {
        job,
        max_saturation,
        accuracy,
        flow_pushed: 0,
        cycles_eliminated: 0,
    };
    let mut sweeps = 0u32;
    loop {
        let mut more_loops = false;
        for source in 0..size {
            let paths = mcf.dijkstra::<DistanceAnnotation, GraphEdgeIterator>(source);
            for dest in 0..size {
                if mcf.job.edge(source, dest).unsatisfied_demand() == 0 {
                    continue;
                }
                let path = paths[dest];
                let free_capacity = mcf.job.path(path).free_capacity();
                if free_capacity > 0 && mcf.push_flow(source, dest, path, max_saturation) > 0 {
                    // More may fit on the next sweep's re-routed paths.
                    if mcf.job.edge(source, dest).unsatisfied_demand() > 0 {
                        more_loops = true;
                    }
                } else if mcf.job.edge(source, dest).unsatisfied_demand() == mcf.job.edge(source, dest).demand()
                    && free_capacity > FREE_CAPACITY_NONE
                {
                    // Nothing placed for this pair yet: allow one overloaded
                    // push rather than starving the demand outright.
                    mcf.push_flow(source, dest, path, None);
                }
            }
            mcf.cleanup_paths(source, paths);
        }
        sweeps += 1;
        debug!(sweep = sweeps, more_loops, "shortest-path sweep done");
        if !more_loops && !mcf.eliminate_cycles() {
            break;
        }
    }
    PassInfo {
        pass: "shortest_path",
        sweeps,
        flow_pushed: mcf.flow_pushed,
        cycles_eliminated: mcf.cycles_eliminated,
        elapsed: start.elapsed(),
    }
}

/// Residual pass: routes leftover demand along the flow-share tables the
/// first pass produced, ranked by remaining headroom, with no capacity cap.
/// The share relation is acyclic per origin, so no cycle handling is needed.
pub fn second_pass(job: &mut LinkGraphJob) -> PassInfo {
    let start = Instant::now();
    let accuracy = job.settings().accuracy;
    let size = job.size();
    let mut mcf = MultiCommodityFlow {
        job,
        max_saturation: None,
        accuracy,
        flow_pushed: 0,
        cycles_eliminated: 0,
    };
    let mut sweeps = 0u32;
    loop {
        let mut demand_left = false;
        for source in 0..size {
            let paths = mcf.dijkstra::<CapacityAnnotation, FlowEdgeIterator>(source);
            for dest in 0..size {
                if mcf.job.edge(source, dest).unsatisfied_demand() == 0 {
                    continue;
                }
                let path = paths[dest];
                if mcf.job.path(path).free_capacity() > FREE_CAPACITY_NONE {
                    mcf.push_flow(source, dest, path, None);
                    if mcf.job.edge(source, dest).unsatisfied_demand() > 0 {
                        demand_left = true;
                    }
                }
            }
            mcf.cleanup_paths(source, paths);
        }
        sweeps += 1;
        debug!(sweep = sweeps, demand_left, "capacity-share sweep done");
        if !demand_left {
            break;
        }
    }
    PassInfo {
        pass: "capacity_share",
        sweeps,
        flow_pushed: mcf.flow_pushed,
        cycles_eliminated: 0,
        elapsed: start.elapsed(),
    }
}
