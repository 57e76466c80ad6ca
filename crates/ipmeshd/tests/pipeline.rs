//! End-to-end builds of the triangle topology.
#![expect(clippy::expect_used, reason = "simplify test output")]

use ipmesh_lib::NodeId;
use ipmeshd::config::Config;
use ipmeshd::plan::{NodeReport, PLAN_FILE};
use ipmeshd::{ConfigurationError, Engine, NodeBuildError};
use rstest::{fixture, rstest};
use test_support::{TRIANGLE_YAML, Workspace, interface_entry};

#[fixture]
fn workspace() -> Workspace {
    Workspace::new().expect("workspace")
}

fn load(ws: &Workspace, extra: &str) -> Config {
    let path = ws.write_config(extra).expect("config");
    Config::from_file(&path).expect("load config")
}

#[rstest]
#[tokio::test]
async fn triangle_builds_every_router(workspace: Workspace) {
    workspace.write_topology(TRIANGLE_YAML).expect("topology");
    let report = Engine::new(load(&workspace, ""))
        .run()
        .await
        .expect("run");

    assert!(report.is_success());
    for router in ["r1", "r2", "r3"] {
        let openr = workspace.read_artifact(router, "openr").expect("openr artifact");
        assert!(openr.contains("\n--domain=openr\n"));
        assert!(workspace.read_artifact(router, "platform_linux").is_some());
    }
    assert!(workspace.read_artifact("h1", "openr").is_none());

    let r1 = workspace.read_artifact("r1", "openr").expect("r1");
    let entry = |itf: &str| interface_entry(&r1, itf).expect("interface flag entry");
    let field = |itf: &str, key: &str| entry(itf).get(key).cloned().unwrap_or_default();
    assert_eq!(field("r1-eth0", "active"), true);
    assert_eq!(field("r1-eth0", "domain"), "area0");
    assert_eq!(field("r1-eth0", "spark_hold_time_s"), 10);
    assert_eq!(field("r1-eth1", "domain"), "area0");
    assert_eq!(field("r1-eth1", "spark_hold_time_s"), 30);
    assert_eq!(field("r1-eth2", "active"), false);
    assert_eq!(field("r1-eth2", "domain"), "openr");

    let plan = std::fs::read_to_string(workspace.artifact_dir().join(PLAN_FILE)).expect("plan");
    let plan: serde_json::Value = serde_json::from_str(&plan).expect("json");
    let nodes = plan.as_array().expect("array");
    assert_eq!(nodes.len(), 9);
}

#[rstest]
#[tokio::test]
async fn node_without_ipv4_fails_alone(workspace: Workspace) {
    let yaml = TRIANGLE_YAML.replacen(
        "nodes:\n",
        "nodes:\n  - { name: r4, role: router, daemons: [{ kind: openr }] }\n",
        1,
    );
    workspace.write_topology(&yaml).expect("topology");
    let report = Engine::new(load(&workspace, ""))
        .run()
        .await
        .expect("run");

    let r4 = report.node(&NodeId::from("r4")).expect("r4 report");
    assert!(matches!(
        r4.error(),
        Some(NodeBuildError::Configuration(
            ConfigurationError::MissingProperty { .. }
        ))
    ));
    assert!(workspace.read_artifact("r4", "openr").is_none());
    assert!(workspace.read_artifact("r4", "platform_linux").is_none());
    for router in ["r1", "r2", "r3"] {
        assert!(
            report
                .node(&NodeId::from(router))
                .and_then(NodeReport::plan)
                .is_some()
        );
        assert!(workspace.read_artifact(router, "openr").is_some());
    }
}

#[rstest]
#[tokio::test]
async fn validation_failures_stay_on_their_node(workspace: Workspace) {
    // `openr` is not installed in the test environment, so every dry run of
    // a router fails while daemon-less hosts pass.
    workspace.write_topology(TRIANGLE_YAML).expect("topology");
    let config = load(&workspace, "validate = true\ndry_run_timeout_secs = 5");
    let report = Engine::new(config).run().await.expect("run");

    for router in ["r1", "r2", "r3"] {
        let entry = report.node(&NodeId::from(router)).expect("router");
        assert!(matches!(entry.error(), Some(NodeBuildError::Validation(_))));
    }
    let host = report.node(&NodeId::from("h1")).expect("host");
    assert!(host.plan().is_some());
}

#[rstest]
#[tokio::test]
async fn emit_json_writes_tree_next_to_artifact(workspace: Workspace) {
    workspace.write_topology(TRIANGLE_YAML).expect("topology");
    let report = Engine::new(load(&workspace, "emit_json = true"))
        .run()
        .await
        .expect("run");
    assert!(report.is_success());

    let path = workspace.artifact_dir().join("r2").join("openr.json");
    let tree: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).expect("json")).expect("parse");
    let networks = tree.get("networks").and_then(serde_json::Value::as_array);
    assert_eq!(networks.map(Vec::len), Some(4));
}
