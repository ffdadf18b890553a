pub mod flows;
pub mod job;
pub mod path;

/// Dense node index, `0..job.size()`.
pub type NodeId = usize;

/// Opaque station identifier attached to a node. Routing tables are keyed by
/// station, not by node index, so they stay meaningful outside the job.
pub type StationId = u32;
