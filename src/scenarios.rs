//! Deterministic synthetic instances for benchmarks and tests.
//!
//! Capacities, distances and demands are derived from node indices, so the
//! same call always builds the identical job.

use anyhow::Result;

use crate::graph::StationId;
use crate::graph::job::{LinkGraphJob, SolverSettings};

fn stations(count: usize) -> Vec<StationId> {
    (0..count as StationId).map(|i| 100 + i).collect()
}

/// Bidirectional chain with traffic between the endpoints.
pub fn line(len: usize, settings: SolverSettings) -> Result<LinkGraphJob> {
    let mut job = LinkGraphJob::new(stations(len), settings)?;
    for i in 0..len - 1 {
        job.set_edge(i, i + 1, 2, 40)?;
        job.set_edge(i + 1, i, 2, 40)?;
    }
    job.set_demand(0, len - 1, 30)?;
    job.set_demand(len - 1, 0, 10)?;
    Ok(job)
}

/// `width x height` grid, neighbors linked both ways with capacities that
/// vary by position; traffic between opposite corners plus a hub in the
/// middle.
pub fn grid(width: usize, height: usize, settings: SolverSettings) -> Result<LinkGraphJob> {
    let count = width * height;
    let mut job = LinkGraphJob::new(stations(count), settings)?;
    let at = |x: usize, y: usize| y * width + x;
    for y in 0..height {
        for x in 0..width {
            let distance = 1 + ((x + y) % 3) as u32;
            let capacity = 20 + 10 * ((x * y) % 4) as u32;
            if x + 1 < width {
                job.set_edge(at(x, y), at(x + 1, y), distance, capacity)?;
                job.set_edge(at(x + 1, y), at(x, y), distance, capacity)?;
            }
            if y + 1 < height {
                job.set_edge(at(x, y), at(x, y + 1), distance, capacity)?;
                job.set_edge(at(x, y + 1), at(x, y), distance, capacity)?;
            }
        }
    }
    let last = count - 1;
    let hub = at(width / 2, height / 2);
    job.set_demand(0, last, 35)?;
    job.set_demand(last, 0, 25)?;
    job.set_demand(at(width - 1, 0), at(0, height - 1), 20)?;
    job.set_demand(0, hub, 15)?;
    job.set_demand(hub, last, 15)?;
    Ok(job)
}

/// Ring with a chord to the opposite node every `chord_step` positions and
/// rotating cross-ring demands.
pub fn ring_with_chords(count: usize, chord_step: usize, settings: SolverSettings) -> Result<LinkGraphJob> {
    let mut job = LinkGraphJob::new(stations(count), settings)?;
    for i in 0..count {
        let next = (i + 1) % count;
        job.set_edge(i, next, 3, 25)?;
        job.set_edge(next, i, 3, 25)?;
    }
    for i in (0..count).step_by(chord_step) {
        let across = (i + count / 2) % count;
        if across != i {
            job.set_edge(i, across, 10, 50)?;
            job.set_edge(across, i, 10, 50)?;
        }
    }
    for i in (0..count).step_by(3) {
        let target = (i + count / 2) % count;
        if target != i {
            job.set_demand(i, target, 12 + (i % 5) as u32)?;
        }
    }
    Ok(job)
}
