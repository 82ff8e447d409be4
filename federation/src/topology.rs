//! The junction network: who exists, who feeds whom.
//!
//! Loaded once at startup from a JSON file. Connections are directional and
//! phase-keyed: `connections[j][phase]` is the junction feeding `j`'s
//! `phase` approach, i.e. the one to throttle when that approach congests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use greenwave_protocol::Phase;
use serde::Deserialize;
use serde::Serialize;

use crate::error::FederationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeInfo>,
    #[serde(default)]
    pub connections: BTreeMap<String, BTreeMap<Phase, String>>,
    /// Junctions managed by a neighbouring federation; congestion there is
    /// only reported, never acted upon.
    #[serde(default)]
    pub external_links: BTreeMap<String, String>,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self, FederationError> {
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|source| FederationError::Topology {
            path: path.display().to_string(),
            source,
        })
    }

    /// Human-readable name, falling back to the raw id.
    pub fn node_name<'a>(&'a self, junction_id: &'a str) -> &'a str {
        self.nodes
            .get(junction_id)
            .map(|node| node.name.as_str())
            .unwrap_or(junction_id)
    }

    /// The feeder junction for one approach of `junction_id`, if mapped.
    pub fn upstream_for(&self, junction_id: &str, phase: Phase) -> Option<&str> {
        self.connections
            .get(junction_id)?
            .get(&phase)
            .map(String::as_str)
    }

    pub fn external_link(&self, junction_id: &str) -> Option<&str> {
        self.external_links.get(junction_id).map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
