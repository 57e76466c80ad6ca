//! Overlays: named property assignments scoped onto nodes and links.
//!
//! An overlay never stores properties itself. Applying it writes each
//! node property to the nodes in scope and each link property to both
//! interfaces of every link in scope, through [`TopologyMut`].

use crate::error::ConfigurationError;
use ipmesh_lib::{
    ConfigTree, Element, Link, ListMerge, NodeId, OverlayDescription, OverlayKind, Topology,
    TopologyError, TopologyMut, TopologyView, Value, ValueKind,
};
use std::collections::{BTreeMap, BTreeSet};

/// Property key carrying the OpenR domain of a router or interface.
pub const OPENR_DOMAIN_KEY: &str = "openr_domain";

/// Expected shape of a recognised property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub kind: ValueKind,
    /// At most one distinct value may be assigned per element.
    pub exclusive: bool,
}

/// The set of property keys overlays may assign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySchema {
    keys: BTreeMap<String, KeySpec>,
}

impl PropertySchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>, kind: ValueKind, exclusive: bool) -> Self {
        self.insert(key, KeySpec { kind, exclusive });
        self
    }

    /// Register a key. Exclusivity is sticky: once a key is exclusive a
    /// later non-exclusive registration does not relax it.
    pub fn insert(&mut self, key: impl Into<String>, spec: KeySpec) {
        self.keys
            .entry(key.into())
            .and_modify(|s| {
                s.kind = spec.kind;
                s.exclusive |= spec.exclusive;
            })
            .or_insert(spec);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<KeySpec> {
        self.keys.get(key).copied()
    }

    #[must_use]
    pub fn is_exclusive(&self, key: &str) -> bool {
        self.get(key).is_some_and(|s| s.exclusive)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Check one assignment made by `overlay`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownProperty`] for unrecognised keys
    /// and [`ConfigurationError::PropertyKind`] when the value has the wrong
    /// shape.
    pub fn check(
        &self,
        overlay: &str,
        key: &str,
        value: &Value,
    ) -> Result<KeySpec, ConfigurationError> {
        let spec = self
            .get(key)
            .ok_or_else(|| ConfigurationError::UnknownProperty {
                overlay: overlay.to_owned(),
                key: key.to_owned(),
            })?;
        if value.kind() != spec.kind {
            return Err(ConfigurationError::PropertyKind {
                overlay: overlay.to_owned(),
                key: key.to_owned(),
                expected: spec.kind,
                found: value.kind(),
            });
        }
        Ok(spec)
    }
}

/// One property write an overlay performs.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub element: Element,
    pub key: String,
    pub value: Value,
}

/// A named scope plus the properties it assigns.
///
/// The property mappings are fixed at construction; the scope grows only
/// through [`Overlay::add_node`] and [`Overlay::add_link`].
#[derive(Debug, Clone)]
pub struct Overlay {
    name: String,
    nodes: BTreeSet<NodeId>,
    links: BTreeSet<Link>,
    node_properties: ConfigTree,
    link_properties: ConfigTree,
    expand_routers: bool,
}

impl Overlay {
    pub fn new(
        name: impl Into<String>,
        node_properties: ConfigTree,
        link_properties: ConfigTree,
    ) -> Self {
        Self {
            name: name.into(),
            nodes: BTreeSet::new(),
            links: BTreeSet::new(),
            node_properties,
            link_properties,
            expand_routers: false,
        }
    }

    /// An OpenR domain.
    ///
    /// Routers in scope and every interface of a link in scope receive
    /// `openr_domain = domain`. Listing a router also brings all of its
    /// links into scope when the overlay is applied.
    ///
    /// ```
    /// use ipmesh_lib::{ConfigTree, InterfaceId, Topology, TopologyView, Value, ValueKind};
    /// use ipmeshd::overlay::{Overlay, PropertySchema, OPENR_DOMAIN_KEY};
    ///
    /// let mut topo = Topology::new();
    /// let r1 = topo.add_router("r1").expect("add r1");
    /// let r2 = topo.add_router("r2").expect("add r2");
    /// topo.add_link(&r1, &r2).expect("link routers");
    ///
    /// let mut area = Overlay::openr_domain("area0", ConfigTree::new());
    /// area.add_node(r1);
    /// let schema = PropertySchema::new().with_key(OPENR_DOMAIN_KEY, ValueKind::Str, true);
    /// area.apply(&mut topo, &schema).expect("apply overlay");
    ///
    /// assert_eq!(
    ///     topo.interface_property(&InterfaceId::from("r2-eth0"), OPENR_DOMAIN_KEY),
    ///     Some(&Value::from("area0"))
    /// );
    /// ```
    pub fn openr_domain(domain: impl Into<String>, node_properties: ConfigTree) -> Self {
        let domain = domain.into();
        let node_properties = node_properties.with(OPENR_DOMAIN_KEY, domain.as_str());
        let link_properties = ConfigTree::new().with(OPENR_DOMAIN_KEY, domain.as_str());
        Self {
            expand_routers: true,
            ..Self::new(domain, node_properties, link_properties)
        }
    }

    /// Build an overlay from its description, resolving node pairs to the
    /// links between them.
    ///
    /// # Errors
    ///
    /// Fails when a named node does not exist or two listed nodes share no
    /// link.
    pub fn from_description(
        desc: &OverlayDescription,
        topology: &Topology,
    ) -> Result<Self, ConfigurationError> {
        let mut overlay = match desc.kind {
            OverlayKind::OpenrDomain => {
                let mut o = Self::openr_domain(desc.name.as_str(), desc.node_properties.clone());
                o.link_properties.merge(&desc.link_properties, ListMerge::Replace);
                o
            }
            OverlayKind::Generic => Self::new(
                desc.name.as_str(),
                desc.node_properties.clone(),
                desc.link_properties.clone(),
            ),
        };
        for name in &desc.nodes {
            let id = NodeId::from(name.as_str());
            if topology.node(&id).is_none() {
                return Err(TopologyError::UnknownNode(id).into());
            }
            overlay.add_node(id);
        }
        for [x, y] in &desc.links {
            let (x, y) = (NodeId::from(x.as_str()), NodeId::from(y.as_str()));
            let between = topology.links_between(&x, &y);
            if between.is_empty() {
                return Err(TopologyError::NoLink(x, y).into());
            }
            for link in between {
                overlay.add_link(link);
            }
        }
        Ok(overlay)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_node(&mut self, node: NodeId) {
        self.nodes.insert(node);
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.insert(link);
    }

    #[must_use]
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    #[must_use]
    pub fn links(&self) -> &BTreeSet<Link> {
        &self.links
    }

    #[must_use]
    pub fn node_properties(&self) -> &ConfigTree {
        &self.node_properties
    }

    #[must_use]
    pub fn link_properties(&self) -> &ConfigTree {
        &self.link_properties
    }

    /// Check every property against `schema`.
    ///
    /// # Errors
    ///
    /// See [`PropertySchema::check`].
    pub fn validate(&self, schema: &PropertySchema) -> Result<(), ConfigurationError> {
        for (key, value) in self.node_properties.iter().chain(self.link_properties.iter()) {
            schema.check(&self.name, key, value)?;
        }
        Ok(())
    }

    /// Links in effect for `topology`: the declared links plus, with router
    /// expansion, every connected link of a listed router.
    fn effective_links(&self, topology: &impl TopologyView) -> BTreeSet<Link> {
        let mut links = self.links.clone();
        if self.expand_routers {
            for node in self.nodes.iter().filter(|n| topology.is_router(n)) {
                for itf in topology.interfaces_of(node) {
                    if let Some(peer) = topology.peer_of(itf) {
                        links.insert(Link::new(itf.clone(), peer.clone()));
                    }
                }
            }
        }
        links
    }

    /// The writes this overlay performs on `topology`, in a stable order:
    /// nodes first, then both endpoints of each link.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] when the scope names a node or interface
    /// the topology does not have.
    pub fn assignments(
        &self,
        topology: &impl TopologyView,
    ) -> Result<Vec<Assignment>, ConfigurationError> {
        let mut out = Vec::new();
        for node in &self.nodes {
            if topology.node(node).is_none() {
                return Err(TopologyError::UnknownNode(node.clone()).into());
            }
            for (key, value) in self.node_properties.iter() {
                out.push(Assignment {
                    element: Element::Node(node.clone()),
                    key: key.to_owned(),
                    value: value.clone(),
                });
            }
        }
        for link in self.effective_links(topology) {
            let (a, b) = link.endpoints();
            for itf in [a, b] {
                if topology.interface(itf).is_none() {
                    return Err(TopologyError::UnknownInterface(itf.clone()).into());
                }
                for (key, value) in self.link_properties.iter() {
                    out.push(Assignment {
                        element: Element::Interface(itf.clone()),
                        key: key.to_owned(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Validate and write every assignment into `topology`.
    ///
    /// Applying the same overlay twice leaves the topology unchanged after
    /// the first application.
    ///
    /// # Errors
    ///
    /// Fails on schema violations or scope entries missing from the
    /// topology. Nothing is written when validation fails.
    pub fn apply<T: TopologyMut>(
        &self,
        topology: &mut T,
        schema: &PropertySchema,
    ) -> Result<(), ConfigurationError> {
        self.validate(schema)?;
        for assignment in self.assignments(topology)? {
            write_assignment(topology, &self.name, assignment)?;
        }
        Ok(())
    }
}

pub(crate) fn write_assignment<T: TopologyMut>(
    topology: &mut T,
    overlay: &str,
    assignment: Assignment,
) -> Result<(), ConfigurationError> {
    let Assignment { element, key, value } = assignment;
    tracing::debug!(overlay, %element, key = %key, %value, "assigning property");
    match &element {
        Element::Node(id) => topology.set_node_property(id, &key, value)?,
        Element::Interface(id) => topology.set_interface_property(id, &key, value)?,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "simplify test output")]
    use super::*;
    use ipmesh_lib::InterfaceId;
    use rstest::{fixture, rstest};

    #[fixture]
    fn triangle() -> Topology {
        let mut topo = Topology::new();
        let r1 = topo.add_router("r1").expect("r1");
        let r2 = topo.add_router("r2").expect("r2");
        let r3 = topo.add_router("r3").expect("r3");
        let h1 = topo.add_host("h1").expect("h1");
        topo.add_link(&r1, &r2).expect("r1-r2");
        topo.add_link(&r2, &r3).expect("r2-r3");
        topo.add_link(&r3, &r1).expect("r3-r1");
        topo.add_link(&r1, &h1).expect("r1-h1");
        topo
    }

    fn schema() -> PropertySchema {
        PropertySchema::new()
            .with_key(OPENR_DOMAIN_KEY, ValueKind::Str, true)
            .with_key("openr_spark_hold_time_s", ValueKind::Int, false)
    }

    fn domain_of(topo: &Topology, itf: &str) -> Option<Value> {
        topo.interface_property(&InterfaceId::from(itf), OPENR_DOMAIN_KEY)
            .cloned()
    }

    #[rstest]
    fn router_expansion_covers_all_links(mut triangle: Topology) {
        let mut area = Overlay::openr_domain("area0", ConfigTree::new());
        area.add_node(NodeId::from("r2"));
        area.apply(&mut triangle, &schema()).expect("apply");

        for itf in ["r2-eth0", "r2-eth1", "r1-eth0", "r3-eth0"] {
            assert_eq!(domain_of(&triangle, itf), Some(Value::from("area0")), "{itf}");
        }
        assert_eq!(domain_of(&triangle, "r3-eth1"), None);
        assert_eq!(
            triangle.node_property(&NodeId::from("r2"), OPENR_DOMAIN_KEY),
            Some(&Value::from("area0"))
        );
    }

    #[rstest]
    fn apply_is_idempotent(mut triangle: Topology) {
        let mut area = Overlay::openr_domain("area0", ConfigTree::new());
        area.add_node(NodeId::from("r1"));
        area.apply(&mut triangle, &schema()).expect("first");
        let once: Vec<_> = ["r1-eth0", "r1-eth1", "r1-eth2"]
            .iter()
            .map(|i| domain_of(&triangle, i))
            .collect();
        area.apply(&mut triangle, &schema()).expect("second");
        let twice: Vec<_> = ["r1-eth0", "r1-eth1", "r1-eth2"]
            .iter()
            .map(|i| domain_of(&triangle, i))
            .collect();
        assert_eq!(once, twice);
    }

    #[rstest]
    fn generic_overlay_writes_both_endpoints(mut triangle: Topology) {
        let links = triangle.links_between(&NodeId::from("r1"), &NodeId::from("r2"));
        let mut slow = Overlay::new(
            "slow",
            ConfigTree::new(),
            ConfigTree::new().with("openr_spark_hold_time_s", 90),
        );
        for link in links {
            slow.add_link(link);
        }
        slow.apply(&mut triangle, &schema()).expect("apply");
        for itf in ["r1-eth0", "r2-eth0"] {
            assert_eq!(
                triangle.interface_property(&InterfaceId::from(itf), "openr_spark_hold_time_s"),
                Some(&Value::Int(90))
            );
        }
    }

    #[rstest]
    #[case::unknown_key(ConfigTree::new().with("bogus", 1))]
    #[case::wrong_kind(ConfigTree::new().with("openr_spark_hold_time_s", "ten"))]
    fn invalid_properties_write_nothing(mut triangle: Topology, #[case] props: ConfigTree) {
        let mut bad = Overlay::new("bad", props, ConfigTree::new());
        bad.add_node(NodeId::from("r1"));
        assert!(bad.apply(&mut triangle, &schema()).is_err());
        assert!(
            triangle
                .node(&NodeId::from("r1"))
                .expect("r1")
                .properties()
                .is_empty()
        );
    }

    #[rstest]
    fn unknown_scope_node_fails(mut triangle: Topology) {
        let mut area = Overlay::openr_domain("area0", ConfigTree::new());
        area.add_node(NodeId::from("r9"));
        assert_eq!(
            area.apply(&mut triangle, &schema()),
            Err(ConfigurationError::Topology(TopologyError::UnknownNode(
                NodeId::from("r9")
            )))
        );
    }

    #[test]
    fn exclusivity_is_sticky() {
        let mut schema = PropertySchema::new().with_key("k", ValueKind::Str, true);
        schema.insert(
            "k",
            KeySpec {
                kind: ValueKind::Str,
                exclusive: false,
            },
        );
        assert!(schema.is_exclusive("k"));
    }
}
