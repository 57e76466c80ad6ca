//! Topology fixtures and temporary engine workspaces.

use ipmesh_lib::TopologyDescription;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Three routers in a triangle, two hosts on each router.
///
/// Every router runs OpenR. The `area0` domain covers the three
/// router-to-router links only, and `r1-eth0` (towards `r2`) lowers its
/// spark hold time to 10 seconds.
pub const TRIANGLE_YAML: &str = r"
nodes:
  - { name: r1, role: router, daemons: [{ kind: openr }] }
  - { name: r2, role: router, daemons: [{ kind: openr }] }
  - { name: r3, role: router, daemons: [{ kind: openr }] }
  - { name: h1, role: host }
  - { name: h2, role: host }
  - { name: h3, role: host }
  - { name: h4, role: host }
  - { name: h5, role: host }
  - { name: h6, role: host }
links:
  - endpoints: [r1, r2]
    properties: [{ openr_spark_hold_time_s: 10 }, {}]
  - endpoints: [r2, r3]
  - endpoints: [r3, r1]
  - endpoints: [r1, h1]
  - endpoints: [r1, h2]
  - endpoints: [r2, h3]
  - endpoints: [r2, h4]
  - endpoints: [r3, h5]
  - endpoints: [r3, h6]
overlays:
  - kind: openr_domain
    name: area0
    links: [[r1, r2], [r2, r3], [r3, r1]]
";

/// The parsed [`TRIANGLE_YAML`].
///
/// # Panics
///
/// Never in practice; the fixture is known to parse.
#[must_use]
#[expect(clippy::expect_used, reason = "fixture is static")]
pub fn triangle() -> TopologyDescription {
    TopologyDescription::from_yaml(TRIANGLE_YAML).expect("triangle fixture parses")
}

/// The entry named `itf` of the `--interfaces` flag of an OpenR flagfile.
#[must_use]
pub fn interface_entry(flagfile: &str, itf: &str) -> Option<serde_json::Value> {
    let json = flagfile
        .lines()
        .find_map(|line| line.strip_prefix("--interfaces="))?;
    let entries: Vec<serde_json::Value> = serde_json::from_str(json).ok()?;
    entries
        .into_iter()
        .find(|entry| entry.get("name").and_then(serde_json::Value::as_str) == Some(itf))
}

/// A temporary directory laid out like an engine installation:
/// `topology.yaml`, `config.toml`, `artifacts/` and `logs/`.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// # Errors
    ///
    /// Fails when the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn topology_path(&self) -> PathBuf {
        self.path().join("topology.yaml")
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.path().join("config.toml")
    }

    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        self.path().join("artifacts")
    }

    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.path().join("logs")
    }

    /// Where the engine writes daemon `kind` of `node`.
    #[must_use]
    pub fn artifact(&self, node: &str, kind: &str) -> PathBuf {
        self.artifact_dir().join(node).join(format!("{kind}.cfg"))
    }

    /// Contents of an artifact, or `None` when it was not written.
    #[must_use]
    pub fn read_artifact(&self, node: &str, kind: &str) -> Option<String> {
        fs::read_to_string(self.artifact(node, kind)).ok()
    }

    /// Write the topology description.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn write_topology(&self, yaml: &str) -> io::Result<PathBuf> {
        let path = self.topology_path();
        fs::write(&path, yaml)?;
        Ok(path)
    }

    /// Write an engine configuration pointing into this workspace, followed
    /// by `extra` TOML lines.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors.
    pub fn write_config(&self, extra: &str) -> io::Result<PathBuf> {
        let body = format!(
            "topology_path = '{}'\nartifact_dir = '{}'\nlog_dir = '{}'\n{extra}\n",
            self.topology_path().display(),
            self.artifact_dir().display(),
            self.log_dir().display(),
        );
        let path = self.config_path();
        fs::write(&path, body)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "simplify test output")]
    use super::*;

    #[test]
    fn triangle_has_three_routers_and_six_hosts() {
        let topo = triangle().build_topology().expect("build");
        let routers = ["r1", "r2", "r3"]
            .into_iter()
            .filter(|r| ipmesh_lib::TopologyView::is_router(&topo, &(*r).into()))
            .count();
        assert_eq!(routers, 3);
        assert_eq!(ipmesh_lib::TopologyView::nodes(&topo).len(), 9);
    }

    #[test]
    fn config_points_into_the_workspace() {
        let ws = Workspace::new().expect("workspace");
        let path = ws.write_config("validate = true").expect("config");
        let body = fs::read_to_string(path).expect("read");
        assert!(body.contains(&ws.artifact_dir().display().to_string()));
        assert!(body.ends_with("validate = true\n"));
    }

    #[test]
    fn interface_entries_are_found_by_name() {
        let flagfile = concat!(
            "--domain=openr\n",
            r#"--interfaces=[{"name":"r1-eth0","active":true},{"name":"r1-eth1"}]"#,
            "\n",
        );
        let entry = interface_entry(flagfile, "r1-eth0").expect("entry");
        assert_eq!(entry.get("active"), Some(&serde_json::Value::Bool(true)));
        assert!(interface_entry(flagfile, "r1-eth9").is_none());
    }
}
