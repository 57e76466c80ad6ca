//! Daemon lifecycle contract.
//!
//! A [`Daemon`] describes one kind of routing process bound to a node: its
//! dependencies, its default options, how to build its configuration tree
//! and how the external supervisor starts, validates and stops it.
//! Variants layered on a common base (OpenR and its platform agent) call the
//! base's defaults first so derived values win.

mod openr;
mod options;
mod platform;
mod registry;

pub use openr::{Openr, OpenrBase, is_active_interface};
pub use options::{OptionSource, ResolvedOptions, resolve_options};
pub use platform::PlatformLinux;
pub use registry::{DaemonFactory, DaemonRegistry};

use crate::error::ConfigurationError;
use crate::render::GFLAGS_TEMPLATE;
use ipmesh_lib::{ConfigTree, Interface, NodeId, Topology, TopologyView, Value};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A kind of routing daemon.
pub trait Daemon: fmt::Debug + Send + Sync {
    /// Registry name, also the prefix of the kind's property keys.
    fn kind(&self) -> &'static str;

    /// Executable started by the supervisor.
    fn binary(&self) -> &'static str {
        self.kind()
    }

    /// Kinds that must be built and started before this one.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Option keys that overlays may only assign one value per element.
    fn exclusive_keys(&self) -> &'static [&'static str] {
        &[]
    }

    fn template_id(&self) -> &'static str {
        GFLAGS_TEMPLATE
    }

    /// Write the default option values into `defaults`.
    fn set_defaults(&self, defaults: &mut ConfigTree);

    /// Build the configuration tree rendered into the daemon's artifact.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when the topology cannot satisfy the
    /// daemon, for example a node without any IPv4 network.
    fn build(&self, ctx: &BuildContext<'_>) -> Result<ConfigTree, ConfigurationError>;

    /// Argument vector starting the daemon inside its node.
    fn startup_args(&self, ctx: &ProcessContext) -> Vec<String> {
        let mut args = vec![self.binary().to_owned(), ctx.flagfile_arg()];
        args.extend(ctx.extra_args().iter().cloned());
        args
    }

    /// Argument vector that parses the artifact and exits without touching
    /// any runtime state.
    fn dry_run_args(&self, ctx: &ProcessContext) -> Vec<String> {
        vec![
            self.binary().to_owned(),
            ctx.flagfile_arg(),
            "--version".to_owned(),
        ]
    }

    /// [`Daemon::startup_args`] as one shell-quoted line.
    fn startup_line(&self, ctx: &ProcessContext) -> String {
        shell_words::join(self.startup_args(ctx))
    }

    /// [`Daemon::dry_run_args`] as one shell-quoted line.
    fn dry_run(&self, ctx: &ProcessContext) -> String {
        shell_words::join(self.dry_run_args(ctx))
    }

    /// Patterns identifying this daemon's processes on its node only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::KillPattern`] when a pattern does not
    /// compile.
    fn kill_patterns(
        &self,
        ctx: &ProcessContext,
    ) -> Result<Vec<KillPattern>, ConfigurationError> {
        let pattern = KillPattern::for_artifact(ctx, self.binary()).map_err(|source| {
            ConfigurationError::KillPattern {
                kind: self.kind().to_owned(),
                source,
            }
        })?;
        Ok(vec![pattern])
    }
}

/// Everything a [`Daemon::build`] may read.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    topology: &'a Topology,
    node: &'a NodeId,
    options: &'a ResolvedOptions,
    built: &'a BTreeMap<String, ConfigTree>,
    log_dir: &'a Path,
}

impl<'a> BuildContext<'a> {
    #[must_use]
    pub fn new(
        topology: &'a Topology,
        node: &'a NodeId,
        options: &'a ResolvedOptions,
        built: &'a BTreeMap<String, ConfigTree>,
        log_dir: &'a Path,
    ) -> Self {
        Self {
            topology,
            node,
            options,
            built,
            log_dir,
        }
    }

    #[must_use]
    pub fn topology(&self) -> &'a Topology {
        self.topology
    }

    #[must_use]
    pub fn node(&self) -> &'a NodeId {
        self.node
    }

    #[must_use]
    pub fn options(&self) -> &'a ResolvedOptions {
        self.options
    }

    /// Per-node log directory.
    #[must_use]
    pub fn log_dir(&self) -> &'a Path {
        self.log_dir
    }

    /// The built tree of a dependency of the same node.
    #[must_use]
    pub fn dependency(&self, kind: &str) -> Option<&'a ConfigTree> {
        self.built.get(kind)
    }

    /// Interfaces of the node, in creation order.
    pub fn interfaces(&self) -> impl Iterator<Item = &'a Interface> + 'a {
        let topology = self.topology;
        topology
            .interfaces_of(self.node)
            .iter()
            .filter_map(move |id| topology.interface(id))
    }

    /// Per-interface value of `key` for daemon `kind`: the interface
    /// property `<kind>_<key>` if present, else the resolved option.
    #[must_use]
    pub fn interface_value(
        &self,
        itf: &'a Interface,
        kind: &str,
        key: &str,
    ) -> Option<&'a Value> {
        itf.properties()
            .get(&format!("{kind}_{key}"))
            .or_else(|| self.options.get(key))
    }
}

/// Where a built daemon lives at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContext {
    node: NodeId,
    artifact_path: PathBuf,
    extra_args: Vec<String>,
}

impl ProcessContext {
    #[must_use]
    pub fn new(node: NodeId, artifact_path: PathBuf, extra_args: Vec<String>) -> Self {
        Self {
            node,
            artifact_path,
            extra_args,
        }
    }

    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Network namespace the daemon runs in; named after its node.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.node.as_str()
    }

    #[must_use]
    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    #[must_use]
    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// `--flagfile=<artifact>` as a single unquoted argument.
    #[must_use]
    pub fn flagfile_arg(&self) -> String {
        format!("--flagfile={}", self.artifact_path.display())
    }
}

/// A process-matching rule confined to one namespace.
#[derive(Debug, Clone, Serialize)]
pub struct KillPattern {
    namespace: String,
    pattern: String,
    #[serde(skip)]
    regex: Regex,
}

impl KillPattern {
    /// # Errors
    ///
    /// Fails when `pattern` is not a valid regular expression.
    pub fn new(
        namespace: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        let pattern = pattern.into();
        let regex = Regex::new(&pattern)?;
        Ok(Self {
            namespace: namespace.into(),
            pattern,
            regex,
        })
    }

    /// Match `binary` started with this node's artifact.
    ///
    /// # Errors
    ///
    /// Fails only if the escaped pattern does not compile.
    pub fn for_artifact(ctx: &ProcessContext, binary: &str) -> Result<Self, regex::Error> {
        let pattern = format!(
            r"^(\S*/)?{}\s(.*\s)?--flagfile={}(\s|$)",
            regex::escape(binary),
            regex::escape(&ctx.artifact_path().display().to_string())
        );
        Self::new(ctx.namespace(), pattern)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether a process with `cmdline` in `namespace` is covered.
    #[must_use]
    pub fn matches(&self, namespace: &str, cmdline: &str) -> bool {
        namespace == self.namespace && self.regex.is_match(cmdline)
    }
}
