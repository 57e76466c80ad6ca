//! Behavioural steps for per-node builds through the engine.
#![expect(clippy::expect_used, reason = "simplify test failure output")]

use cucumber::{World, given, then, when};
use ipmesh_lib::NodeId;
use ipmeshd::config::Config;
use ipmeshd::plan::{BuildReport, NodePlan};
use ipmeshd::{ConfigurationError, Engine, NodeBuildError};
use test_support::{TRIANGLE_YAML, Workspace, interface_entry};

#[derive(Debug, Default, World)]
pub struct BuildWorld {
    yaml: String,
    workspace: Option<Workspace>,
    report: Option<BuildReport>,
}

impl BuildWorld {
    fn workspace(&self) -> &Workspace {
        self.workspace.as_ref().expect("engine ran")
    }

    fn report(&self) -> &BuildReport {
        self.report.as_ref().expect("engine ran")
    }

    fn plan(&self, node: &str) -> &NodePlan {
        self.report()
            .node(&NodeId::from(node))
            .and_then(|r| r.plan())
            .unwrap_or_else(|| panic!("node {node} was not built"))
    }
}

#[given("the triangle topology description")]
fn triangle_description(world: &mut BuildWorld) {
    world.yaml = TRIANGLE_YAML.to_owned();
}

#[given(regex = r#"^an isolated router \"(.+)\" running openr$"#)]
fn isolated_router(world: &mut BuildWorld, name: String) {
    let node =
        format!("nodes:\n  - {{ name: {name}, role: router, daemons: [{{ kind: openr }}] }}\n");
    world.yaml = world.yaml.replacen("nodes:\n", &node, 1);
}

#[when("the engine builds it")]
async fn engine_builds(world: &mut BuildWorld) {
    let workspace = Workspace::new().expect("workspace");
    workspace.write_topology(&world.yaml).expect("topology");
    let path = workspace.write_config("").expect("config");
    let config = Config::from_file(&path).expect("config loads");
    world.report = Some(Engine::new(config).run().await.expect("engine run"));
    world.workspace = Some(workspace);
}

#[then("every node is built")]
fn every_node_built(world: &mut BuildWorld) {
    let report = world.report();
    assert!(report.is_success(), "{:?}", report.failures().collect::<Vec<_>>());
}

#[then(regex = r#"^node \"(.+)\" starts \"(.+)\" before \"(.+)\"$"#)]
fn starts_before(world: &mut BuildWorld, node: String, first: String, second: String) {
    let order = world.plan(&node).startup_order();
    let at = |kind: &str| order.iter().position(|k| *k == kind).expect("kind in plan");
    assert!(at(&first) < at(&second), "{order:?}");
}

#[then(regex = r#"^node \"(.+)\" stops \"(.+)\" before \"(.+)\"$"#)]
fn stops_before(world: &mut BuildWorld, node: String, first: String, second: String) {
    let order = &world.plan(&node).shutdown_order;
    let at = |kind: &str| order.iter().position(|k| k == kind).expect("kind in plan");
    assert!(at(&first) < at(&second), "{order:?}");
}

#[then(regex = r#"^the openr artifact of \"(.+)\" sets spark_hold_time_s (\d+) on \"(.+)\"$"#)]
fn hold_time(world: &mut BuildWorld, node: String, secs: u32, itf: String) {
    let text = world
        .workspace()
        .read_artifact(&node, "openr")
        .expect("openr artifact");
    let entry = interface_entry(&text, &itf).expect("interface flag entry");
    let hold = entry.get("spark_hold_time_s").and_then(serde_json::Value::as_u64);
    assert_eq!(hold, Some(u64::from(secs)), "{entry}");
}

#[then(regex = r#"^node \"(.+)\" fails with a missing property$"#)]
fn fails_missing_property(world: &mut BuildWorld, node: String) {
    let entry = world.report().node(&NodeId::from(node.as_str())).expect("node");
    assert!(
        matches!(
            entry.error(),
            Some(NodeBuildError::Configuration(
                ConfigurationError::MissingProperty { .. }
            ))
        ),
        "{:?}",
        entry.error()
    );
}

#[then(regex = r#"^node \"(.+)\" has no artifacts$"#)]
fn no_artifacts(world: &mut BuildWorld, node: String) {
    let dir = world.workspace().artifact_dir().join(&node);
    let entries = std::fs::read_dir(&dir).map(Iterator::count).unwrap_or(0);
    assert_eq!(entries, 0, "{}", dir.display());
}

#[then(regex = r#"^node \"(.+)\" is built$"#)]
fn node_built(world: &mut BuildWorld, node: String) {
    let plan = world.plan(&node);
    assert!(!plan.daemons.is_empty());
    assert!(world.workspace().read_artifact(&node, "openr").is_some());
}
