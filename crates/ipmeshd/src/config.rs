//! Configuration loading for the ipmeshd engine.
//!
//! The configuration is stored in `/etc/ipmeshd/config.toml`. Values may be
//! overridden by environment variables using the `IPMESHD_` prefix and then
//! by command-line flags.

use clap::{Parser, ValueEnum};
use figment::providers::Env;
use ipmesh_lib::{DEFAULT_ARTIFACT_DIR, DEFAULT_LOG_DIR};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of nodes built at the same time.
const DEFAULT_BUILD_CONCURRENCY: usize = 4;
/// Default limit for one daemon dry run, in seconds.
const DEFAULT_DRY_RUN_TIMEOUT_SECS: u64 = 5;

/// Output format of the log subscriber.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Runtime configuration for the engine.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Config {
    /// YAML topology description to build.
    pub topology_path: PathBuf,
    /// Root of the per-node artifact directories.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Root of the per-node daemon log directories.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Maximum number of nodes built concurrently.
    #[serde(default = "default_build_concurrency")]
    pub build_concurrency: usize,
    /// Run every daemon's dry run after writing its artifacts.
    #[serde(default)]
    pub validate: bool,
    /// Time limit for one dry run in seconds.
    #[serde(default = "default_dry_run_timeout_secs")]
    pub dry_run_timeout_secs: u64,
    /// Also write each built tree as `<kind>.json` next to its artifact.
    #[serde(default)]
    pub emit_json: bool,
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Command-line overrides for configuration values.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "ipmeshd", about = "Render routing daemon configuration for an emulated network")]
struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE", default_value = Config::DEFAULT_PATH)]
    config: PathBuf,
    /// Override the topology description.
    #[arg(long, value_name = "FILE")]
    topology: Option<PathBuf>,
    /// Override the artifact directory.
    #[arg(long)]
    artifact_dir: Option<PathBuf>,
    /// Override the log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Dry-run every daemon after building.
    #[arg(long)]
    validate: bool,
    /// Override the log format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(DEFAULT_ARTIFACT_DIR)
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_build_concurrency() -> usize {
    DEFAULT_BUILD_CONCURRENCY
}

fn default_dry_run_timeout_secs() -> u64 {
    DEFAULT_DRY_RUN_TIMEOUT_SECS
}

impl Config {
    /// Default location of the engine configuration file.
    pub const DEFAULT_PATH: &'static str = "/etc/ipmeshd/config.toml";

    /// A configuration for `topology_path` with every other field at its
    /// default.
    #[must_use]
    pub fn for_topology(topology_path: impl Into<PathBuf>) -> Self {
        Self {
            topology_path: topology_path.into(),
            artifact_dir: default_artifact_dir(),
            log_dir: default_log_dir(),
            build_concurrency: DEFAULT_BUILD_CONCURRENCY,
            validate: false,
            dry_run_timeout_secs: DEFAULT_DRY_RUN_TIMEOUT_SECS,
            emit_json: false,
            log_format: LogFormat::Text,
        }
    }

    #[must_use]
    pub fn dry_run_timeout(&self) -> Duration {
        Duration::from_secs(self.dry_run_timeout_secs)
    }

    /// Per-node log directory.
    #[must_use]
    pub fn node_log_dir(&self, node: &ipmesh_lib::NodeId) -> PathBuf {
        self.log_dir.join(node.as_str())
    }

    /// Load the configuration using command-line overrides and environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or malformed, or a required value is
    /// absent from every layer.
    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    pub fn load() -> Result<Self, ortho_config::OrthoError> {
        let args = CliArgs::parse();
        Self::from_file_with_cli(&args.config, &args)
    }

    /// Load the configuration from `path`, merging `IPMESHD_*` environment
    /// variables over file values.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    pub fn from_file(path: &Path) -> Result<Self, ortho_config::OrthoError> {
        Self::from_file_with_cli(path, &CliArgs::default())
    }

    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    fn from_file_with_cli(path: &Path, cli: &CliArgs) -> Result<Self, ortho_config::OrthoError> {
        let mut fig = ortho_config::load_config_file(path)?.ok_or_else(|| {
            ortho_config::OrthoError::File {
                path: path.to_path_buf(),
                source: Box::new(io::Error::new(
                    io::ErrorKind::NotFound,
                    "Configuration file not found",
                )),
            }
        })?;

        fig = fig.merge(Env::prefixed("IPMESHD_").split("__"));
        if let Some(topology) = &cli.topology {
            fig = fig.merge(("topology_path", topology));
        }
        let mut cfg: Self = fig.extract().map_err(ortho_config::OrthoError::from)?;

        if let Some(dir) = &cli.artifact_dir {
            cfg.artifact_dir = dir.clone();
        }
        if let Some(dir) = &cli.log_dir {
            cfg.log_dir = dir.clone();
        }
        if cli.validate {
            cfg.validate = true;
        }
        if let Some(format) = cli.log_format {
            cfg.log_format = format;
        }
        Ok(cfg)
    }
}
