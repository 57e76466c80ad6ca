//! YAML topology descriptions.
//!
//! A description lists nodes with their role and daemons, the links between
//! them and the overlays to apply. Overlays are kept as plain data here; the
//! engine turns them into validated overlays.

use crate::prefix::IpPrefix;
use crate::topology::{
    DaemonDecl, InterfaceId, Link, NodeId, NodeRole, Topology, TopologyError, TopologyMut,
    TopologyView,
};
use crate::tree::ConfigTree;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use thiserror::Error;

/// Number of `/24` subnets automatic addressing can hand out from `10/8`.
const AUTO_SUBNETS: usize = 1 << 16;
/// Base of the automatic addressing pool, `10.0.0.0`.
const AUTO_BASE: u32 = 0x0a00_0000;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("failed to read topology description {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse topology description: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("automatic addressing ran out of subnets after {0} links")]
    AddressPoolExhausted(usize),
}

/// Root of a topology description document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyDescription {
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub overlays: Vec<OverlayDescription>,
    /// Give links without explicit addresses a `10.x.y.0/24` subnet.
    #[serde(default = "default_auto_address")]
    pub auto_address: bool,
}

fn default_auto_address() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDescription {
    pub name: String,
    #[serde(default)]
    pub role: NodeRole,
    #[serde(default)]
    pub daemons: Vec<DaemonDecl>,
    /// Direct node properties.
    #[serde(default)]
    pub properties: ConfigTree,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDescription {
    pub endpoints: [String; 2],
    /// Explicit addresses for each endpoint, in endpoint order.
    #[serde(default)]
    pub addresses: Option<[IpPrefix; 2]>,
    /// Direct interface properties for each endpoint, in endpoint order.
    #[serde(default)]
    pub properties: [ConfigTree; 2],
}

/// The flavour of an overlay declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    /// Groups OpenR routers and links into a domain; `name` is the domain.
    #[default]
    OpenrDomain,
    /// Arbitrary node and link properties.
    Generic,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayDescription {
    #[serde(default)]
    pub kind: OverlayKind,
    pub name: String,
    /// Nodes in scope. For OpenR domains every link of these routers is in
    /// scope as well.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Links in scope, given as node pairs.
    #[serde(default)]
    pub links: Vec<[String; 2]>,
    #[serde(default)]
    pub node_properties: ConfigTree,
    #[serde(default)]
    pub link_properties: ConfigTree,
}

impl TopologyDescription {
    /// Parse a description from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptionError::Parse`] if the YAML is malformed or does
    /// not match the schema.
    pub fn from_yaml(yaml: &str) -> Result<Self, DescriptionError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a description file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, DescriptionError> {
        let text = std::fs::read_to_string(path).map_err(|source| DescriptionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Build the topology: nodes, daemons, links, addresses and direct
    /// properties. Overlays are not applied.
    ///
    /// # Errors
    ///
    /// Fails on unknown or duplicate nodes, or when automatic addressing
    /// runs out of subnets.
    pub fn build_topology(&self) -> Result<Topology, DescriptionError> {
        let mut topo = Topology::new();
        for node in &self.nodes {
            let id = topo.add_node(node.name.as_str(), node.role)?;
            for decl in &node.daemons {
                topo.add_daemon(&id, decl.clone())?;
            }
            for (key, value) in node.properties.iter() {
                topo.set_node_property(&id, key, value.clone())?;
            }
        }

        let mut auto_index = 0;
        for link in &self.links {
            let [x, y] = &link.endpoints;
            let created = topo.add_link(&NodeId::from(x.as_str()), &NodeId::from(y.as_str()))?;
            // Interfaces in endpoint order, not the link's sorted order.
            let x_itf = endpoint_on(&topo, &created, x);
            let y_itf = endpoint_on(&topo, &created, y);
            let (Some(x_itf), Some(y_itf)) = (x_itf, y_itf) else {
                continue;
            };

            let addresses = match link.addresses {
                Some(addrs) => Some(addrs),
                None if self.auto_address => {
                    let pair = auto_pair(auto_index)?;
                    auto_index += 1;
                    Some(pair)
                }
                None => None,
            };
            if let Some([xa, ya]) = addresses {
                topo.add_address(&x_itf, xa)?;
                topo.add_address(&y_itf, ya)?;
            }

            let [x_props, y_props] = &link.properties;
            for (itf, props) in [(&x_itf, x_props), (&y_itf, y_props)] {
                for (key, value) in props.iter() {
                    topo.set_interface_property(itf, key, value.clone())?;
                }
            }
        }
        Ok(topo)
    }
}

fn endpoint_on(topo: &Topology, link: &Link, node: &str) -> Option<InterfaceId> {
    let (a, b) = link.endpoints();
    [a, b]
        .into_iter()
        .find(|itf| topo.interface(itf).is_some_and(|i| i.node().as_str() == node))
        .cloned()
}

/// Addresses `.1` and `.2` of the `index`-th automatic `/24`.
fn auto_pair(index: usize) -> Result<[IpPrefix; 2], DescriptionError> {
    if index >= AUTO_SUBNETS {
        return Err(DescriptionError::AddressPoolExhausted(index));
    }
    let subnet = u32::try_from(index)
        .map(|i| AUTO_BASE | (i << 8))
        .map_err(|_| DescriptionError::AddressPoolExhausted(index))?;
    let host = |n: u32| IpPrefix::new(IpAddr::V4(Ipv4Addr::from(subnet | n)), 24);
    Ok([
        host(1).map_err(TopologyError::from)?,
        host(2).map_err(TopologyError::from)?,
    ])
}
