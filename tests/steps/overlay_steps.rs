//! Behavioural steps for overlay resolution on the triangle topology.
#![expect(clippy::expect_used, reason = "simplify test failure output")]

use cucumber::{World, given, then, when};
use ipmesh_lib::{
    ConfigTree, Element, Interface, NodeId, OverlayDescription, OverlayKind, Topology,
    TopologyDescription, TopologyView,
};
use ipmeshd::config::Config;
use ipmeshd::daemon::DaemonRegistry;
use ipmeshd::overlay::Overlay;
use ipmeshd::resolver::ResolvedTopology;
use ipmeshd::{ConfigurationError, Engine, EngineError};

#[derive(Debug, Default, World)]
pub struct OverlayWorld {
    description: Option<TopologyDescription>,
    result: Option<Result<ResolvedTopology, EngineError>>,
    snapshots: Vec<Vec<(String, ConfigTree)>>,
}

impl OverlayWorld {
    fn description(&mut self) -> &mut TopologyDescription {
        self.description.as_mut().expect("topology given")
    }

    fn resolved(&self) -> &ResolvedTopology {
        match &self.result {
            Some(Ok(topology)) => topology,
            other => panic!("expected a resolved topology, got {other:?}"),
        }
    }
}

/// Every property bag of the topology, nodes then their interfaces.
fn snapshot(topology: &Topology) -> Vec<(String, ConfigTree)> {
    let mut bags = Vec::new();
    for node in topology.nodes() {
        let props = topology.node(&node).expect("node").properties().clone();
        bags.push((node.to_string(), props));
        for itf in topology.interfaces_of(&node) {
            let props = topology.interface(itf).expect("interface").properties().clone();
            bags.push((itf.to_string(), props));
        }
    }
    bags
}

/// Interfaces on links between two routers, and on links touching a host.
fn split_interfaces(topology: &Topology) -> (Vec<&Interface>, Vec<&Interface>) {
    let mut core = Vec::new();
    let mut edge = Vec::new();
    for link in topology.links() {
        let (a, b) = link.endpoints();
        let a = topology.interface(a).expect("a");
        let b = topology.interface(b).expect("b");
        if topology.is_router(a.node()) && topology.is_router(b.node()) {
            core.extend([a, b]);
        } else {
            edge.extend([a, b]);
        }
    }
    (core, edge)
}

#[given("the triangle topology")]
fn triangle_topology(world: &mut OverlayWorld) {
    world.description = Some(test_support::triangle());
}

#[given(regex = r#"^an overlay \"(.+)\" assigning openr_domain \"(.+)\" to node \"(.+)\"$"#)]
fn overlay_on_node(world: &mut OverlayWorld, name: String, domain: String, node: String) {
    world.description().overlays.push(OverlayDescription {
        kind: OverlayKind::Generic,
        name,
        nodes: vec![node],
        node_properties: ConfigTree::new().with("openr_domain", domain),
        ..OverlayDescription::default()
    });
}

#[when("the overlays are resolved")]
fn resolve_overlays(world: &mut OverlayWorld) {
    let engine = Engine::new(Config::for_topology("topology.yaml"));
    let description = world.description().clone();
    world.result = Some(engine.resolve(&description));
}

#[when(regex = r#"^the overlay \"(.+)\" is applied twice$"#)]
fn apply_twice(world: &mut OverlayWorld, name: String) {
    let description = world.description().clone();
    let mut topology = description.build_topology().expect("topology");
    let desc = description
        .overlays
        .iter()
        .find(|o| o.name == name)
        .expect("overlay declared");
    let overlay = Overlay::from_description(desc, &topology).expect("overlay");
    let schema = DaemonRegistry::with_builtin().property_schema();
    for _ in 0..2 {
        overlay.apply(&mut topology, &schema).expect("apply");
        world.snapshots.push(snapshot(&topology));
    }
}

#[then("the second application left the topology unchanged")]
fn unchanged(world: &mut OverlayWorld) {
    let [first, second] = world.snapshots.as_slice() else {
        panic!("expected two snapshots");
    };
    assert_eq!(first, second);
}

#[then(regex = r#"^every router-to-router interface has openr_domain \"(.+)\"$"#)]
fn core_interfaces_have_domain(world: &mut OverlayWorld, domain: String) {
    let (core, _) = split_interfaces(world.resolved());
    assert_eq!(core.len(), 6);
    for itf in core {
        assert_eq!(
            itf.properties().get_str("openr_domain"),
            Some(domain.as_str()),
            "{}",
            itf.id()
        );
    }
}

#[then("no host-facing interface has an openr_domain")]
fn edge_interfaces_untouched(world: &mut OverlayWorld) {
    let (_, edge) = split_interfaces(world.resolved());
    assert_eq!(edge.len(), 12);
    assert!(edge.iter().all(|itf| !itf.properties().contains_key("openr_domain")));
}

#[then(regex = r#"^resolution fails with a conflict on \"(.+)\" for \"(.+)\"$"#)]
fn conflict(world: &mut OverlayWorld, node: String, key: String) {
    match &world.result {
        Some(Err(EngineError::Configuration(ConfigurationError::ExclusiveConflict {
            element,
            key: conflicting,
            ..
        }))) => {
            assert_eq!(element, &Element::Node(NodeId::from(node.as_str())));
            assert_eq!(conflicting, &key);
        }
        other => panic!("expected an exclusive conflict, got {other:?}"),
    }
}

#[then(regex = r#"^node \"(.+)\" has openr_domain \"(.+)\"$"#)]
fn node_domain(world: &mut OverlayWorld, node: String, domain: String) {
    let resolved = world.resolved();
    let value = resolved.node_property(&NodeId::from(node.as_str()), "openr_domain");
    assert_eq!(value.and_then(|v| v.as_str()), Some(domain.as_str()));
}
