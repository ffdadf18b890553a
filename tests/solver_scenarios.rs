//! End-to-end routing scenarios for the two-pass solver.

use linkflow::graph::job::{LinkGraphJob, SolverSettings};
use linkflow::solvers::{first_pass, map_flows, second_pass, solve};

fn job(stations: usize, accuracy: u32, saturation: u32) -> LinkGraphJob {
    let stations = (0..stations as u32).map(|i| 100 + i).collect();
    LinkGraphJob::new(
        stations,
        SolverSettings {
            accuracy,
            short_path_saturation: saturation,
        },
    )
    .unwrap()
}

#[test]
fn routes_trivial_demand_between_two_nodes() {
    let mut job = job(2, 10, 100);
    job.set_edge(0, 1, 10, 100).unwrap();
    job.set_demand(0, 1, 50).unwrap();

    solve(&mut job);

    assert_eq!(job.edge(0, 1).flow(), 50);
    assert_eq!(job.edge(0, 1).unsatisfied_demand(), 0);
    let stat = job.flows(0).get(100).unwrap();
    assert_eq!(stat.shares().get(&101), Some(&50));
    assert_eq!(stat.total(), 50);
}

#[test]
fn two_short_hops_beat_one_long_link() {
    let mut job = job(3, 1, 100);
    job.set_edge(0, 1, 1, 10).unwrap();
    job.set_edge(1, 2, 1, 10).unwrap();
    job.set_edge(0, 2, 5, 10).unwrap();
    job.set_demand(0, 2, 8).unwrap();

    solve(&mut job);

    assert_eq!(job.edge(0, 1).flow(), 8);
    assert_eq!(job.edge(1, 2).flow(), 8);
    assert_eq!(job.edge(0, 2).flow(), 0);
    assert_eq!(job.edge(0, 2).unsatisfied_demand(), 0);
    assert_eq!(job.flows(0).get(100).unwrap().shares().get(&101), Some(&8));
    assert_eq!(job.flows(1).get(100).unwrap().shares().get(&102), Some(&8));
}

#[test]
fn saturation_cap_defers_residual_to_second_pass() {
    let mut job = job(2, 1, 80);
    job.set_edge(0, 1, 5, 10).unwrap();
    job.set_demand(0, 1, 50).unwrap();

    // The first pass fills the link to 80% of its capacity and stalls: the
    // pair has already received flow, so no overload exception applies.
    first_pass(&mut job);
    assert_eq!(job.edge(0, 1).flow(), 8);
    assert_eq!(job.edge(0, 1).unsatisfied_demand(), 42);

    // The second pass reuses the established route without a cap.
    map_flows(&mut job);
    second_pass(&mut job);
    assert_eq!(job.edge(0, 1).flow(), 50);
    assert_eq!(job.edge(0, 1).unsatisfied_demand(), 0);

    map_flows(&mut job);
    assert_eq!(job.flows(0).get(100).unwrap().shares().get(&101), Some(&50));
}

#[test]
fn first_pass_overloads_once_for_untouched_pairs() {
    let mut job = job(3, 1, 80);
    job.set_edge(0, 1, 1, 10).unwrap();
    job.set_edge(1, 2, 1, 10).unwrap();
    // The direct demand saturates 0->1 before the relayed pair gets a turn.
    job.set_demand(0, 1, 8).unwrap();
    job.set_demand(0, 2, 5).unwrap();

    first_pass(&mut job);

    // 8 regular units plus a single overloaded push of 5.
    assert_eq!(job.edge(0, 1).flow(), 13);
    assert_eq!(job.edge(1, 2).flow(), 5);
    assert_eq!(job.edge(0, 1).unsatisfied_demand(), 0);
    assert_eq!(job.edge(0, 2).unsatisfied_demand(), 0);
}

#[test]
fn opposed_reroutes_cancel_into_no_cycle() {
    // Demand to node 3 routes 0->1->2->3 on the first sweep and exhausts
    // the 0->1 link; the remainder of the demand to node 4 then routes
    // 0->2->1->4, so fragments 1->2 and 2->1 circle one unit for origin 0.
    let mut job = job(5, 1, 100);
    job.set_edge(0, 1, 1, 2).unwrap();
    job.set_edge(0, 2, 10, 100).unwrap();
    job.set_edge(1, 2, 1, 100).unwrap();
    job.set_edge(2, 1, 1, 100).unwrap();
    job.set_edge(2, 3, 1, 100).unwrap();
    job.set_edge(1, 4, 1, 100).unwrap();
    job.set_demand(0, 3, 1).unwrap();
    job.set_demand(0, 4, 2).unwrap();

    let stats = solve(&mut job);

    assert_eq!(stats.passes[0].cycles_eliminated, 1);
    assert_eq!(job.edge(0, 3).unsatisfied_demand(), 0);
    assert_eq!(job.edge(0, 4).unsatisfied_demand(), 0);

    // The circling flow is gone from both opposed links.
    assert_eq!(job.edge(1, 2).flow(), 0);
    assert_eq!(job.edge(2, 1).flow(), 0);
    assert_eq!(job.edge(0, 1).flow(), 2);
    assert_eq!(job.edge(0, 2).flow(), 1);
    assert_eq!(job.edge(2, 3).flow(), 1);
    assert_eq!(job.edge(1, 4).flow(), 2);

    // Routing tables reflect the cancelled assignment.
    let at0 = job.flows(0).get(100).unwrap();
    assert_eq!(at0.shares().get(&101), Some(&2));
    assert_eq!(at0.shares().get(&102), Some(&1));
    assert_eq!(job.flows(1).get(100).unwrap().shares().get(&104), Some(&2));
    assert_eq!(job.flows(2).get(100).unwrap().shares().get(&103), Some(&1));
    assert_eq!(job.flows(1).get(100).unwrap().shares().get(&102), None);
}

#[test]
fn unreachable_demand_is_left_as_residual() {
    let mut job = job(3, 1, 100);
    job.set_edge(0, 1, 1, 10).unwrap();
    job.set_edge(2, 1, 1, 10).unwrap();
    job.set_demand(0, 2, 5).unwrap();

    solve(&mut job);

    assert_eq!(job.edge(0, 2).unsatisfied_demand(), 5);
    for node in 0..job.size() {
        assert!(job.flows(node).is_empty(), "no shares for unroutable demand");
        for to in 0..job.size() {
            assert_eq!(job.edge(node, to).flow(), 0);
        }
    }
}

#[test]
fn equal_cost_paths_pick_the_lower_intermediate() {
    let mut job = job(4, 1, 100);
    job.set_edge(0, 1, 2, 10).unwrap();
    job.set_edge(0, 2, 2, 10).unwrap();
    job.set_edge(1, 3, 2, 10).unwrap();
    job.set_edge(2, 3, 2, 10).unwrap();
    job.set_demand(0, 3, 4).unwrap();

    solve(&mut job);

    assert_eq!(job.edge(0, 1).flow(), 4);
    assert_eq!(job.edge(1, 3).flow(), 4);
    assert_eq!(job.edge(0, 2).flow(), 0);
    assert_eq!(job.edge(2, 3).flow(), 0);
    assert_eq!(job.flows(0).get(100).unwrap().shares().get(&101), Some(&4));
    assert!(job.flows(2).is_empty());
}
