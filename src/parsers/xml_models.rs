//! Serde models for SNDlib network XML files.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename = "network")]
pub struct Network {
    #[serde(rename = "@version")]
    pub version: String,
    #[serde(rename = "networkStructure")]
    pub network_structure: NetworkStructure,
    #[serde(default)]
    pub demands: Demands,
}

#[derive(Debug, Deserialize)]
pub struct NetworkStructure {
    pub nodes: Nodes,
    pub links: Links,
}

#[derive(Debug, Deserialize)]
pub struct Nodes {
    #[serde(rename = "@coordinatesType")]
    pub coordinates_type: String,
    #[serde(rename = "node", default)]
    pub node_list: Vec<Node>,
}

#[derive(Debug, Deserialize)]
pub struct Node {
    #[serde(rename = "@id")]
    pub id: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Deserialize)]
pub struct Links {
    #[serde(rename = "link", default)]
    pub link_list: Vec<Link>,
}

#[derive(Debug, Deserialize)]
pub struct Link {
    #[serde(rename = "@id")]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "preInstalledModule")]
    pub pre_installed_module: Option<PreInstalledModule>,
    #[serde(rename = "additionalModules", default)]
    pub additional_modules: AdditionalModules,
}

#[derive(Debug, Deserialize)]
pub struct PreInstalledModule {
    pub capacity: f64,
    pub cost: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdditionalModules {
    #[serde(rename = "addModule", default)]
    pub add_module_list: Vec<AddModule>,
}

#[derive(Debug, Deserialize)]
pub struct AddModule {
    pub capacity: f64,
    pub cost: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Demands {
    #[serde(rename = "demand", default)]
    pub demand_list: Vec<Demand>,
}

#[derive(Debug, Deserialize)]
pub struct Demand {
    #[serde(rename = "@id")]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "demandValue")]
    pub demand_value: f64,
}
