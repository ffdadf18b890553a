pub mod flow_mapper;
pub mod mcf;

pub use flow_mapper::map_flows;
pub use mcf::{PassInfo, SolveStats, first_pass, second_pass, solve};
