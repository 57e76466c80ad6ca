//! Global overlay phase.
//!
//! [`OverlayResolver::apply_all`] applies every registered overlay in
//! registration order and then freezes the topology. Node builds only ever
//! see the frozen [`ResolvedTopology`], so no overlay can write while a
//! daemon reads.

use crate::error::ConfigurationError;
use crate::overlay::{Overlay, PropertySchema, write_assignment};
use ipmesh_lib::{Element, Topology, Value};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::ops::Deref;
use std::sync::Arc;

/// A topology with every overlay applied. Read-only and cheap to clone.
#[derive(Debug, Clone)]
pub struct ResolvedTopology(Arc<Topology>);

impl ResolvedTopology {
    #[must_use]
    pub fn shared(&self) -> Arc<Topology> {
        Arc::clone(&self.0)
    }
}

impl From<Topology> for ResolvedTopology {
    fn from(value: Topology) -> Self {
        Self(Arc::new(value))
    }
}

impl Deref for ResolvedTopology {
    type Target = Topology;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Ordered collection of overlays sharing one property schema.
#[derive(Debug, Clone, Default)]
pub struct OverlayResolver {
    schema: PropertySchema,
    overlays: Vec<Overlay>,
}

impl OverlayResolver {
    #[must_use]
    pub fn new(schema: PropertySchema) -> Self {
        Self {
            schema,
            overlays: Vec::new(),
        }
    }

    /// Append an overlay; later overlays win on non-exclusive keys.
    pub fn register(&mut self, overlay: Overlay) {
        self.overlays.push(overlay);
    }

    #[must_use]
    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    #[must_use]
    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    /// Apply all overlays and freeze the result.
    ///
    /// Last write wins per key, except on exclusive keys, where a second
    /// overlay assigning a different value to the same element is a
    /// conflict. Re-assigning an identical value is allowed.
    ///
    /// # Errors
    ///
    /// Returns the first schema, scope or exclusivity violation. The whole
    /// phase is aborted; the partially updated topology is dropped.
    pub fn apply_all(
        &self,
        mut topology: Topology,
    ) -> Result<ResolvedTopology, ConfigurationError> {
        let mut claims: BTreeMap<(Element, String), (&str, Value)> = BTreeMap::new();
        for overlay in &self.overlays {
            overlay.validate(&self.schema)?;
            let assignments = overlay.assignments(&topology)?;
            for a in assignments.iter().filter(|a| self.schema.is_exclusive(&a.key)) {
                match claims.entry((a.element.clone(), a.key.clone())) {
                    Entry::Occupied(entry) => {
                        let (first, first_value) = entry.get();
                        if first_value != &a.value {
                            return Err(ConfigurationError::ExclusiveConflict {
                                element: a.element.clone(),
                                key: a.key.clone(),
                                first: (*first).to_owned(),
                                first_value: first_value.clone(),
                                second: overlay.name().to_owned(),
                                second_value: a.value.clone(),
                            });
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert((overlay.name(), a.value.clone()));
                    }
                }
            }
            let count = assignments.len();
            for a in assignments {
                write_assignment(&mut topology, overlay.name(), a)?;
            }
            tracing::info!(overlay = overlay.name(), assignments = count, "overlay applied");
        }
        Ok(ResolvedTopology::from(topology))
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "simplify test output")]
    use super::*;
    use crate::overlay::OPENR_DOMAIN_KEY;
    use ipmesh_lib::{ConfigTree, InterfaceId, NodeId, TopologyView, ValueKind};
    use rstest::{fixture, rstest};

    #[fixture]
    fn line() -> Topology {
        let mut topo = Topology::new();
        let r1 = topo.add_router("r1").expect("r1");
        let r2 = topo.add_router("r2").expect("r2");
        let r3 = topo.add_router("r3").expect("r3");
        topo.add_link(&r1, &r2).expect("r1-r2");
        topo.add_link(&r2, &r3).expect("r2-r3");
        topo
    }

    fn resolver() -> OverlayResolver {
        OverlayResolver::new(
            PropertySchema::new()
                .with_key(OPENR_DOMAIN_KEY, ValueKind::Str, true)
                .with_key("openr_spark_hold_time_s", ValueKind::Int, false),
        )
    }

    fn area(name: &str, nodes: &[&str]) -> Overlay {
        let mut o = Overlay::openr_domain(name, ConfigTree::new());
        for n in nodes {
            o.add_node(NodeId::from(*n));
        }
        o
    }

    #[rstest]
    fn exclusive_conflict_names_node_and_key(line: Topology) {
        let mut resolver = resolver();
        resolver.register(area("area0", &["r1", "r2"]));
        resolver.register(area("area1", &["r2", "r3"]));
        let err = resolver.apply_all(line).expect_err("conflict");
        let ConfigurationError::ExclusiveConflict {
            element,
            key,
            first,
            second,
            ..
        } = &err
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(element, &Element::Node(NodeId::from("r2")));
        assert_eq!(key.as_str(), OPENR_DOMAIN_KEY);
        assert_eq!((first.as_str(), second.as_str()), ("area0", "area1"));
    }

    #[rstest]
    fn identical_exclusive_values_do_not_conflict(line: Topology) {
        let mut resolver = resolver();
        resolver.register(area("area0", &["r1", "r2"]));
        resolver.register(area("area0", &["r2", "r3"]));
        let resolved = resolver.apply_all(line).expect("resolve");
        assert_eq!(
            resolved.interface_property(&InterfaceId::from("r3-eth0"), OPENR_DOMAIN_KEY),
            Some(&Value::from("area0"))
        );
    }

    #[rstest]
    fn later_overlays_win_on_plain_keys(line: Topology) {
        let mut resolver = resolver();
        for (name, hold) in [("first", 40), ("second", 50)] {
            let mut o = Overlay::new(
                name,
                ConfigTree::new().with("openr_spark_hold_time_s", hold),
                ConfigTree::new(),
            );
            o.add_node(NodeId::from("r1"));
            resolver.register(o);
        }
        let resolved = resolver.apply_all(line).expect("resolve");
        assert_eq!(
            resolved.node_property(&NodeId::from("r1"), "openr_spark_hold_time_s"),
            Some(&Value::Int(50))
        );
    }

    #[rstest]
    fn resolved_topology_is_shared(line: Topology) {
        let resolved = resolver().apply_all(line).expect("resolve");
        let other = resolved.clone();
        assert!(Arc::ptr_eq(&resolved.shared(), &other.shared()));
    }
}
