//! Folds surviving path fragments into the per-node flow-share tables.
//!
//! Runs at each pass boundary. Every fragment still carrying flow becomes a
//! share entry at the node it departs from, keyed by the origin station of
//! its tree and the station of its next hop; the fragments are then released
//! so the next pass starts from an empty arena. The second invocation merges
//! into the tables left by the first.

use tracing::trace;

use crate::graph::job::LinkGraphJob;

pub fn map_flows(job: &mut LinkGraphJob) {
    for node in 0..job.size() {
        let attached = job.take_node_paths(node);
        let here = job.station(node);
        for fragment in attached {
            let flow = job.path(fragment).flow();
            if flow > 0 {
                let via = job.station(job.path(fragment).node());
                let origin = job.station(job.path(fragment).origin());
                debug_assert!(via != here, "fragment must leave its node");
                debug_assert!(via != origin, "flow may not re-enter its origin");
                job.flows_mut(node).add_flow(origin, via, flow);
            }
            job.free_path(fragment);
        }
    }
    trace!(live_paths = job.live_paths(), "flow tables updated");
    debug_assert_eq!(job.live_paths(), 0, "every fragment is owned by exactly one node list");
}
