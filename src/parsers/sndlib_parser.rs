//! Loads SNDlib XML instances and converts them into solver jobs.
//!
//! The XML is parsed into a petgraph network (every listed link becomes a
//! pair of directed edges) plus a dense traffic matrix, then quantized into
//! the integer units the solver works in. Link lengths come from the node
//! coordinates; SNDlib files carry no explicit distances.

use anyhow::{Context, Result, anyhow};
use ndarray::Array2;
use petgraph::Graph;
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use quick_xml::de::from_reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use crate::graph::StationId;
use crate::graph::job::{LinkGraphJob, SolverSettings};
use crate::parsers::xml_models::Network;
use crate::utils::demands_from_traffic_matrix;

/// Units per float quantity when quantizing capacities, lengths and demands.
const UNIT_SCALE: f64 = 10.0;

/// Parsed link attributes.
#[derive(Debug, Clone, Copy)]
pub struct LinkWeight {
    pub capacity: f64,
    pub length: f64,
}

pub type NetworkGraph = DiGraph<String, LinkWeight>;

pub fn resolve_sndlib_base_path() -> PathBuf {
    let mut base_path = PathBuf::from("./sndlib_xml/");
    if !base_path.exists() {
        base_path = PathBuf::from(".");
    }
    base_path
}

pub fn load_network<P: AsRef<Path>>(file_path: P) -> Result<(NetworkGraph, Array2<f64>)> {
    let file = File::open(&file_path)
        .with_context(|| format!("opening {}", file_path.as_ref().display()))?;
    let xml: Network = from_reader(BufReader::new(file))?;
    network_to_graph(xml)
}

/// Builds the directed network and traffic matrix from a parsed instance.
pub fn network_to_graph(xml: Network) -> Result<(NetworkGraph, Array2<f64>)> {
    let network = xml.network_structure;
    let mut graph: NetworkGraph = Graph::new();
    let mut id_to_index = HashMap::new();
    let mut coordinates = Vec::new();

    for node in network.nodes.node_list {
        let node_index = graph.add_node(node.id.clone());
        coordinates.push((node.coordinates.x, node.coordinates.y));
        id_to_index.insert(node.id, node_index);
    }

    let node_count = graph.node_count();

    for link in network.links.link_list {
        let source = *id_to_index
            .get(&link.source)
            .ok_or_else(|| anyhow!("link {} references unknown node {}", link.id, link.source))?;
        let target = *id_to_index
            .get(&link.target)
            .ok_or_else(|| anyhow!("link {} references unknown node {}", link.id, link.target))?;
        let capacity = if let Some(module) = link.pre_installed_module {
            module.capacity
        } else if let Some(module) = link.additional_modules.add_module_list.first() {
            module.capacity
        } else {
            1.0
        };
        let (sx, sy) = coordinates[source.index()];
        let (tx, ty) = coordinates[target.index()];
        let length = ((sx - tx).powi(2) + (sy - ty).powi(2)).sqrt();
        let weight = LinkWeight { capacity, length };
        // SNDlib links are undirected; install both directions.
        graph.add_edge(source, target, weight);
        graph.add_edge(target, source, weight);
    }

    let mut traffic_mat = Array2::zeros((node_count, node_count));
    for demand in xml.demands.demand_list {
        let source = *id_to_index
            .get(&demand.source)
            .ok_or_else(|| anyhow!("demand {} references unknown node {}", demand.id, demand.source))?;
        let target = *id_to_index
            .get(&demand.target)
            .ok_or_else(|| anyhow!("demand {} references unknown node {}", demand.id, demand.target))?;
        traffic_mat[[source.index(), target.index()]] = demand.demand_value;
    }

    Ok((graph, traffic_mat))
}

/// Quantizes a parsed network into a solver job. Stations are numbered by
/// node index.
pub fn build_job(
    graph: &NetworkGraph,
    traffic_mat: &Array2<f64>,
    settings: SolverSettings,
) -> Result<LinkGraphJob> {
    let node_count = graph.node_count();
    let stations: Vec<StationId> = (0..node_count as StationId).collect();
    let mut job = LinkGraphJob::new(stations, settings)?;

    for edge_ref in graph.edge_references() {
        let weight = edge_ref.weight();
        let distance = (weight.length * UNIT_SCALE).round().max(1.0) as u32;
        let capacity = (weight.capacity * UNIT_SCALE).round() as u32;
        job.set_edge(edge_ref.source().index(), edge_ref.target().index(), distance, capacity)?;
    }
    for (from, to, demand) in demands_from_traffic_matrix(node_count, traffic_mat, UNIT_SCALE) {
        job.set_demand(from, to, demand)?;
    }
    Ok(job)
}
