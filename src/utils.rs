use ndarray::Array2;

use crate::graph::NodeId;
use crate::graph::job::LinkGraphJob;

/// Extracts integer demand triples from a traffic matrix. Entries at or
/// below the float tolerance, or rounding to zero units, are dropped.
pub fn demands_from_traffic_matrix(
    node_count: usize,
    traffic_mat: &Array2<f64>,
    scale: f64,
) -> Vec<(NodeId, NodeId, u32)> {
    let mut demands = Vec::new();
    for from in 0..node_count {
        for to in 0..node_count {
            let value = traffic_mat[[from, to]];
            if value > 1e-9 {
                let units = (value * scale).round() as u32;
                if units > 0 {
                    demands.push((from, to, units));
                }
            }
        }
    }
    demands
}

/// Highest flow-to-capacity ratio over all links; infinite if a
/// zero-capacity link ended up carrying flow.
pub fn max_congestion(job: &LinkGraphJob) -> f64 {
    let mut worst = 0.0f64;
    for from in 0..job.size() {
        for &to in job.out_neighbors(from) {
            let edge = job.edge(from, to);
            if edge.capacity() > 0 {
                let congestion = f64::from(edge.flow()) / f64::from(edge.capacity());
                if congestion > worst {
                    worst = congestion;
                }
            } else if edge.flow() > 0 {
                return f64::INFINITY;
            }
        }
    }
    worst
}

/// Number of real links in the job.
pub fn link_count(job: &LinkGraphJob) -> usize {
    (0..job.size()).map(|n| job.out_neighbors(n).len()).sum()
}
