//! Structural properties the solver must uphold on any instance.

use std::collections::HashMap;

use linkflow::graph::job::{LinkGraphJob, SolverSettings};
use linkflow::graph::{NodeId, StationId};
use linkflow::scenarios;
use linkflow::solvers::{first_pass, map_flows, solve};

fn settings(accuracy: u32, saturation: u32) -> SolverSettings {
    SolverSettings {
        accuracy,
        short_path_saturation: saturation,
    }
}

fn node_of_station(job: &LinkGraphJob) -> HashMap<StationId, NodeId> {
    (0..job.size()).map(|node| (job.station(node), node)).collect()
}

/// Per-origin next-hop relation recovered from the share tables.
fn origin_relation(job: &LinkGraphJob, origin: NodeId) -> Vec<(NodeId, NodeId, u64)> {
    let stations = node_of_station(job);
    let origin_station = job.station(origin);
    let mut relation = Vec::new();
    for node in 0..job.size() {
        if let Some(stat) = job.flows(node).get(origin_station) {
            for (&via, &share) in stat.shares() {
                relation.push((node, stations[&via], u64::from(share)));
            }
        }
    }
    relation
}

/// At every node the shares for an origin must balance: what flows in,
/// minus what is delivered there, flows out again. At the origin itself the
/// outgoing shares must cover everything delivered anywhere.
fn assert_flow_conservation(job: &LinkGraphJob) {
    let size = job.size();
    for origin in 0..size {
        let mut inflow = vec![0u64; size];
        let mut outflow = vec![0u64; size];
        for (from, to, share) in origin_relation(job, origin) {
            outflow[from] += share;
            inflow[to] += share;
        }
        let total_delivered: u64 = (0..size)
            .filter(|&dest| dest != origin)
            .map(|dest| {
                let edge = job.edge(origin, dest);
                u64::from(edge.demand() - edge.unsatisfied_demand())
            })
            .sum();
        for node in 0..size {
            if node == origin {
                assert_eq!(inflow[node], 0, "flow returned to origin {origin}");
                assert_eq!(outflow[node], total_delivered, "origin {origin} outflow");
            } else {
                let edge = job.edge(origin, node);
                let delivered = u64::from(edge.demand() - edge.unsatisfied_demand());
                assert_eq!(
                    inflow[node],
                    outflow[node] + delivered,
                    "conservation at node {node} for origin {origin}"
                );
            }
        }
    }
}

fn assert_acyclic_per_origin(job: &LinkGraphJob) {
    let size = job.size();
    for origin in 0..size {
        let mut next_hops = vec![Vec::new(); size];
        for (from, to, _) in origin_relation(job, origin) {
            next_hops[from].push(to);
        }
        // 0 = unvisited, 1 = on stack, 2 = done.
        let mut state = vec![0u8; size];
        let mut stack: Vec<(NodeId, usize)> = Vec::new();
        for start in 0..size {
            if state[start] != 0 {
                continue;
            }
            state[start] = 1;
            stack.push((start, 0));
            while let Some((node, child)) = stack.pop() {
                if child < next_hops[node].len() {
                    stack.push((node, child + 1));
                    let next = next_hops[node][child];
                    assert_ne!(state[next], 1, "cycle through node {next} for origin {origin}");
                    if state[next] == 0 {
                        state[next] = 1;
                        stack.push((next, 0));
                    }
                } else {
                    state[node] = 2;
                }
            }
        }
    }
}

#[test]
fn conservation_holds_on_grid_and_ring() {
    let mut grid = scenarios::grid(5, 4, settings(4, 80)).unwrap();
    solve(&mut grid);
    assert_flow_conservation(&grid);

    let mut ring = scenarios::ring_with_chords(18, 3, settings(2, 70)).unwrap();
    solve(&mut ring);
    assert_flow_conservation(&ring);
}

#[test]
fn first_pass_respects_the_saturation_cap() {
    // Ample capacity: no overload exception can fire, so every link must
    // stay within its saturated share.
    let mut job = scenarios::line(8, settings(4, 80)).unwrap();
    first_pass(&mut job);
    for from in 0..job.size() {
        for &to in job.out_neighbors(from) {
            let edge = job.edge(from, to);
            let cap = (u64::from(edge.capacity()) * 80 / 100).max(1) as u32;
            assert!(
                edge.flow() <= cap,
                "link {from}->{to} exceeds saturated capacity: {} > {cap}",
                edge.flow()
            );
        }
    }
    // 30 and 10 demanded units both fit under the 32-unit cap.
    assert_eq!(job.total_unsatisfied_demand(), 0);
}

#[test]
fn saturated_link_stops_exactly_at_the_cap() {
    let mut job = LinkGraphJob::new(vec![1, 2], settings(1, 80)).unwrap();
    job.set_edge(0, 1, 3, 10).unwrap();
    job.set_demand(0, 1, 8).unwrap();
    first_pass(&mut job);
    assert_eq!(job.edge(0, 1).flow(), 8);
}

#[test]
fn unsatisfied_demand_never_increases() {
    let mut job = scenarios::grid(5, 4, settings(4, 80)).unwrap();
    let initial = job.total_unsatisfied_demand();
    assert_eq!(initial, job.total_demand());

    first_pass(&mut job);
    let after_first = job.total_unsatisfied_demand();
    assert!(after_first <= initial);

    map_flows(&mut job);
    linkflow::solvers::second_pass(&mut job);
    let after_second = job.total_unsatisfied_demand();
    assert!(after_second <= after_first);
    // Every demand in the grid has a route, so nothing may remain.
    assert_eq!(after_second, 0);
}

#[test]
fn share_relation_is_acyclic_after_the_first_pass() {
    let mut grid = scenarios::grid(5, 4, settings(4, 80)).unwrap();
    first_pass(&mut grid);
    map_flows(&mut grid);
    assert_acyclic_per_origin(&grid);

    let mut ring = scenarios::ring_with_chords(18, 3, settings(2, 70)).unwrap();
    first_pass(&mut ring);
    map_flows(&mut ring);
    assert_acyclic_per_origin(&ring);
}

#[test]
fn identical_jobs_solve_identically() {
    let build = || scenarios::grid(6, 5, settings(8, 80)).unwrap();
    let mut a = build();
    let mut b = build();
    solve(&mut a);
    solve(&mut b);

    for from in 0..a.size() {
        for to in 0..a.size() {
            assert_eq!(a.edge(from, to), b.edge(from, to), "edge {from}->{to}");
        }
    }
    for node in 0..a.size() {
        assert_eq!(a.flows(node), b.flows(node), "shares at node {node}");
    }
}
