//! In-memory topology model and the query surface the engine consumes.
//!
//! The topology exclusively owns every property bag. Overlays write through
//! [`TopologyMut`]; daemon builds read through [`TopologyView`].

use crate::prefix::{IpPrefix, PrefixError};
use crate::tree::{ConfigTree, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Identifier of a node, also used as its network namespace name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of an interface, `<node>-eth<N>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(String);

impl InterfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InterfaceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Whether a node takes part in routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    #[default]
    Router,
    Host,
}

/// A daemon instance declared on a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonDecl {
    /// Daemon kind, e.g. `openr`.
    pub kind: String,
    /// Explicit options, highest precedence during option resolution.
    #[serde(default)]
    pub options: ConfigTree,
    /// Extra arguments appended to the startup line.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl DaemonDecl {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ConfigTree) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    role: NodeRole,
    interfaces: Vec<InterfaceId>,
    daemons: Vec<DaemonDecl>,
    properties: ConfigTree,
}

impl Node {
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn role(&self) -> NodeRole {
        self.role
    }

    #[must_use]
    pub fn interfaces(&self) -> &[InterfaceId] {
        &self.interfaces
    }

    #[must_use]
    pub fn daemons(&self) -> &[DaemonDecl] {
        &self.daemons
    }

    #[must_use]
    pub fn properties(&self) -> &ConfigTree {
        &self.properties
    }
}

#[derive(Debug, Clone)]
pub struct Interface {
    id: InterfaceId,
    node: NodeId,
    peer: Option<InterfaceId>,
    properties: ConfigTree,
    addresses: Vec<IpPrefix>,
}

impl Interface {
    #[must_use]
    pub fn id(&self) -> &InterfaceId {
        &self.id
    }

    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    #[must_use]
    pub fn peer(&self) -> Option<&InterfaceId> {
        self.peer.as_ref()
    }

    #[must_use]
    pub fn properties(&self) -> &ConfigTree {
        &self.properties
    }

    #[must_use]
    pub fn addresses(&self) -> &[IpPrefix] {
        &self.addresses
    }

    /// First IPv4 address of the interface.
    #[must_use]
    pub fn ipv4(&self) -> Option<&IpPrefix> {
        self.addresses.iter().find(|a| a.is_ipv4())
    }

    /// Human readable description, `r1-eth0 <-> r2-eth0`.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.peer {
            Some(peer) => format!("{} <-> {peer}", self.id),
            None => format!("{} (unconnected)", self.id),
        }
    }
}

/// An unordered pair of interfaces.
///
/// Endpoints are stored sorted, so `Link::new(a, b) == Link::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    a: InterfaceId,
    b: InterfaceId,
}

impl Link {
    #[must_use]
    pub fn new(x: InterfaceId, y: InterfaceId) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }

    #[must_use]
    pub fn endpoints(&self) -> (&InterfaceId, &InterfaceId) {
        (&self.a, &self.b)
    }

    #[must_use]
    pub fn contains(&self, itf: &InterfaceId) -> bool {
        &self.a == itf || &self.b == itf
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -- {}", self.a, self.b)
    }
}

/// A topology element that carries a property bag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    Node(NodeId),
    Interface(InterfaceId),
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node `{id}`"),
            Self::Interface(id) => write!(f, "interface `{id}`"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("duplicate node `{0}`")]
    DuplicateNode(NodeId),
    #[error("unknown node `{0}`")]
    UnknownNode(NodeId),
    #[error("unknown interface `{0}`")]
    UnknownInterface(InterfaceId),
    #[error("node `{0}` cannot be linked to itself")]
    SelfLink(NodeId),
    #[error("no link between `{0}` and `{1}`")]
    NoLink(NodeId, NodeId),
    #[error(transparent)]
    Prefix(#[from] PrefixError),
}

/// Read-only query surface over a topology.
pub trait TopologyView {
    /// Node identifiers in a stable order.
    fn nodes(&self) -> Vec<NodeId>;

    /// Every link in creation order.
    fn links(&self) -> Vec<Link>;

    fn node(&self, id: &NodeId) -> Option<&Node>;

    fn interface(&self, id: &InterfaceId) -> Option<&Interface>;

    fn node_property(&self, id: &NodeId, key: &str) -> Option<&Value> {
        self.node(id)?.properties().get(key)
    }

    fn interface_property(&self, id: &InterfaceId, key: &str) -> Option<&Value> {
        self.interface(id)?.properties().get(key)
    }

    /// Interfaces of `id` in creation order; empty for unknown nodes.
    fn interfaces_of(&self, id: &NodeId) -> &[InterfaceId] {
        self.node(id).map(Node::interfaces).unwrap_or_default()
    }

    fn peer_of(&self, id: &InterfaceId) -> Option<&InterfaceId> {
        self.interface(id)?.peer()
    }

    fn is_router(&self, id: &NodeId) -> bool {
        self.node(id).is_some_and(|n| n.role() == NodeRole::Router)
    }
}

/// Mutation surface used by overlays and direct configuration.
pub trait TopologyMut: TopologyView {
    /// Write a node property, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::UnknownNode`] when `id` does not exist.
    fn set_node_property(
        &mut self,
        id: &NodeId,
        key: &str,
        value: Value,
    ) -> Result<Option<Value>, TopologyError>;

    /// Write an interface property, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::UnknownInterface`] when `id` does not exist.
    fn set_interface_property(
        &mut self,
        id: &InterfaceId,
        key: &str,
        value: Value,
    ) -> Result<Option<Value>, TopologyError>;
}

/// The in-memory topology.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: BTreeMap<NodeId, Node>,
    interfaces: BTreeMap<InterfaceId, Interface>,
    links: Vec<Link>,
}

impl Topology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the given role.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::DuplicateNode`] if the name is taken.
    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        role: NodeRole,
    ) -> Result<NodeId, TopologyError> {
        let id = NodeId::new(id);
        if self.nodes.contains_key(&id) {
            return Err(TopologyError::DuplicateNode(id));
        }
        self.nodes.insert(
            id.clone(),
            Node {
                id: id.clone(),
                role,
                interfaces: Vec::new(),
                daemons: Vec::new(),
                properties: ConfigTree::new(),
            },
        );
        Ok(id)
    }

    /// # Errors
    ///
    /// See [`Topology::add_node`].
    pub fn add_router(&mut self, id: impl Into<String>) -> Result<NodeId, TopologyError> {
        self.add_node(id, NodeRole::Router)
    }

    /// # Errors
    ///
    /// See [`Topology::add_node`].
    pub fn add_host(&mut self, id: impl Into<String>) -> Result<NodeId, TopologyError> {
        self.add_node(id, NodeRole::Host)
    }

    /// Connect two nodes, creating one new interface on each side.
    ///
    /// # Errors
    ///
    /// Fails when either node is unknown or both ends are the same node.
    pub fn add_link(&mut self, x: &NodeId, y: &NodeId) -> Result<Link, TopologyError> {
        if x == y {
            return Err(TopologyError::SelfLink(x.clone()));
        }
        let x_itf = self.next_interface_id(x)?;
        let y_itf = self.next_interface_id(y)?;
        self.attach(x, &x_itf, &y_itf);
        self.attach(y, &y_itf, &x_itf);
        let link = Link::new(x_itf, y_itf);
        self.links.push(link.clone());
        Ok(link)
    }

    fn next_interface_id(&self, node: &NodeId) -> Result<InterfaceId, TopologyError> {
        let n = self
            .nodes
            .get(node)
            .ok_or_else(|| TopologyError::UnknownNode(node.clone()))?;
        Ok(InterfaceId::new(format!("{node}-eth{}", n.interfaces.len())))
    }

    fn attach(&mut self, node: &NodeId, itf: &InterfaceId, peer: &InterfaceId) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.interfaces.push(itf.clone());
        }
        self.interfaces.insert(
            itf.clone(),
            Interface {
                id: itf.clone(),
                node: node.clone(),
                peer: Some(peer.clone()),
                properties: ConfigTree::new(),
                addresses: Vec::new(),
            },
        );
    }

    /// Declare a daemon instance on a node.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::UnknownNode`] when `node` does not exist.
    pub fn add_daemon(&mut self, node: &NodeId, decl: DaemonDecl) -> Result<(), TopologyError> {
        self.nodes
            .get_mut(node)
            .ok_or_else(|| TopologyError::UnknownNode(node.clone()))?
            .daemons
            .push(decl);
        Ok(())
    }

    /// Assign an address to an interface.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::UnknownInterface`] when `itf` does not exist.
    pub fn add_address(&mut self, itf: &InterfaceId, prefix: IpPrefix) -> Result<(), TopologyError> {
        self.interfaces
            .get_mut(itf)
            .ok_or_else(|| TopologyError::UnknownInterface(itf.clone()))?
            .addresses
            .push(prefix);
        Ok(())
    }

    /// Links whose endpoints sit on `x` and `y`, in creation order.
    #[must_use]
    pub fn links_between(&self, x: &NodeId, y: &NodeId) -> Vec<Link> {
        self.links
            .iter()
            .filter(|link| {
                let (a, b) = link.endpoints();
                let owner = |itf: &InterfaceId| self.interfaces.get(itf).map(Interface::node);
                matches!(
                    (owner(a), owner(b)),
                    (Some(na), Some(nb)) if (na == x && nb == y) || (na == y && nb == x)
                )
            })
            .cloned()
            .collect()
    }
}

impl TopologyView for Topology {
    fn nodes(&self) -> Vec<NodeId> {
        self.nodes.keys().cloned().collect()
    }

    fn links(&self) -> Vec<Link> {
        self.links.clone()
    }

    fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn interface(&self, id: &InterfaceId) -> Option<&Interface> {
        self.interfaces.get(id)
    }
}

impl TopologyMut for Topology {
    fn set_node_property(
        &mut self,
        id: &NodeId,
        key: &str,
        value: Value,
    ) -> Result<Option<Value>, TopologyError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TopologyError::UnknownNode(id.clone()))?;
        Ok(node.properties.set(key, value))
    }

    fn set_interface_property(
        &mut self,
        id: &InterfaceId,
        key: &str,
        value: Value,
    ) -> Result<Option<Value>, TopologyError> {
        let itf = self
            .interfaces
            .get_mut(id)
            .ok_or_else(|| TopologyError::UnknownInterface(id.clone()))?;
        Ok(itf.properties.set(key, value))
    }
}
