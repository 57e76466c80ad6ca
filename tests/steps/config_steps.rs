//! Behavioural steps for engine configuration loading.
#![expect(clippy::expect_used, reason = "simplify test failure output")]

use cucumber::{World, given, then, when};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use ipmeshd::config::Config;
use test_support::EnvVarGuard;

#[derive(Debug, Default, World)]
pub struct ConfigWorld {
    dir: Option<TempDir>,
    path: Option<PathBuf>,
    env: Vec<EnvVarGuard>,
    result: Option<Result<Config, ortho_config::OrthoError>>,
}

impl Drop for ConfigWorld {
    fn drop(&mut self) {
        // Newest guard first so the original value comes back last.
        while let Some(guard) = self.env.pop() {
            drop(guard);
        }
    }
}

#[given(regex = r#"^a configuration file with topology \"(.+)\"$"#)]
fn config_file_with_topology(world: &mut ConfigWorld, topology: String) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("config.toml");
    fs::write(&path, format!("topology_path='{topology}'")).expect("write file");
    world.env.push(EnvVarGuard::remove("IPMESHD_ARTIFACT_DIR"));
    world.dir = Some(dir);
    world.path = Some(path);
}

#[given("a missing configuration file")]
fn missing_configuration_file(world: &mut ConfigWorld) {
    world.path = Some(PathBuf::from("/nonexistent/ipmeshd.toml"));
}

#[given(regex = r#"^the environment variable \"(.+)\" is \"(.+)\"$"#)]
fn environment_variable(world: &mut ConfigWorld, key: String, value: String) {
    world.env.push(EnvVarGuard::set(&key, &value));
}

#[when("the config is loaded")]
fn load_config(world: &mut ConfigWorld) {
    let path = world.path.as_ref().expect("path set");
    world.result = Some(Config::from_file(path));
}

fn loaded(world: &ConfigWorld) -> &Config {
    match &world.result {
        Some(Ok(cfg)) => cfg,
        other => panic!("expected success, got {other:?}"),
    }
}

#[then(regex = r#"^the topology path is \"(.+)\"$"#)]
fn topology_path_is(world: &mut ConfigWorld, expected: String) {
    assert_eq!(loaded(world).topology_path, PathBuf::from(expected));
}

#[then(regex = r#"^the artifact directory is \"(.+)\"$"#)]
fn artifact_dir_is(world: &mut ConfigWorld, expected: String) {
    assert_eq!(loaded(world).artifact_dir, PathBuf::from(expected));
}

#[then("config loading fails")]
fn config_loading_fails(world: &mut ConfigWorld) {
    match world.result.take() {
        Some(Err(_)) => {}
        other => panic!("expected error, got {other:?}"),
    }
}
