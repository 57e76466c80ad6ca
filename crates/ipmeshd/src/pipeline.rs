//! The build engine.
//!
//! A run has two phases. The overlay phase builds the topology and applies
//! every overlay; any error aborts the run. The node phase builds each node
//! on the blocking pool, at most `build_concurrency` at a time. A node's
//! artifacts are written only once all of its daemons have built and
//! rendered, and a failing node never affects its siblings.

use crate::config::Config;
use crate::daemon::{BuildContext, DaemonRegistry, ProcessContext, resolve_options};
use crate::error::{ConfigurationError, EngineError, NodeBuildError};
use crate::graph::DaemonGraph;
use crate::overlay::Overlay;
use crate::plan::{BuildReport, NodeOutcome, NodePlan, NodeReport, PLAN_FILE, ProcessSpec};
use crate::render::{BuiltinRenderer, JSON_TEMPLATE, Renderer, artifact_path};
use crate::resolver::{OverlayResolver, ResolvedTopology};
use crate::util::{ArtifactBatch, write_atomic};
use crate::validate::validate_plan;
use ipmesh_lib::{ConfigTree, NodeId, Topology, TopologyDescription, TopologyError, TopologyView};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Drives overlay resolution and node builds for one configuration.
#[derive(Clone)]
pub struct Engine {
    config: Arc<Config>,
    registry: Arc<DaemonRegistry>,
    renderer: Arc<dyn Renderer>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// An engine with the built-in daemons and templates.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(DaemonRegistry::with_builtin()),
            renderer: Arc::new(BuiltinRenderer),
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: DaemonRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the configured description, resolve it and build every node.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the description cannot be loaded, the
    /// overlay phase fails or the plan cannot be written. Node failures are
    /// reported in the [`BuildReport`].
    pub async fn run(&self) -> Result<BuildReport, EngineError> {
        let description = TopologyDescription::load(&self.config.topology_path)?;
        let topology = self.resolve(&description)?;
        self.build_all(topology).await
    }

    /// Build the topology of `description` and apply its overlays.
    ///
    /// # Errors
    ///
    /// Fails on an invalid description or any overlay-phase error.
    pub fn resolve(
        &self,
        description: &TopologyDescription,
    ) -> Result<ResolvedTopology, EngineError> {
        let topology = description.build_topology()?;
        let mut resolver = OverlayResolver::new(self.registry.property_schema());
        for desc in &description.overlays {
            resolver.register(Overlay::from_description(desc, &topology)?);
        }
        Ok(resolver.apply_all(topology)?)
    }

    /// Build every node of a resolved topology and write `plan.json` for
    /// the nodes that succeeded.
    ///
    /// # Errors
    ///
    /// Fails when the artifact directory cannot be prepared, a build task
    /// panics or the plan cannot be written.
    pub async fn build_all(&self, topology: ResolvedTopology) -> Result<BuildReport, EngineError> {
        let artifact_dir = &self.config.artifact_dir;
        fs::create_dir_all(artifact_dir).map_err(|source| EngineError::Io {
            path: artifact_dir.clone(),
            source,
        })?;

        let semaphore = Arc::new(Semaphore::new(self.config.build_concurrency.max(1)));
        let builder = Arc::new(NodeBuilder {
            topology: topology.shared(),
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            renderer: Arc::clone(&self.renderer),
        });

        let mut tasks = JoinSet::new();
        for node in topology.nodes() {
            let semaphore = Arc::clone(&semaphore);
            let builder = Arc::clone(&builder);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                builder.run(node).await
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            reports.push(joined??);
        }
        let report = BuildReport::new(reports);

        for (node, err) in report.failures() {
            tracing::error!(node = %node, error = %err, "node build failed");
        }
        let plans: Vec<&NodePlan> = report.plans().collect();
        let path = artifact_dir.join(PLAN_FILE);
        let text = serde_json::to_vec_pretty(&plans)?;
        write_atomic(&path, &text).map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(
            path = %path.display(),
            built = plans.len(),
            failed = report.nodes().len() - plans.len(),
            "build finished"
        );
        Ok(report)
    }
}

/// Shared state of the node phase.
struct NodeBuilder {
    topology: Arc<Topology>,
    config: Arc<Config>,
    registry: Arc<DaemonRegistry>,
    renderer: Arc<dyn Renderer>,
}

impl NodeBuilder {
    async fn run(self: Arc<Self>, node: NodeId) -> Result<NodeReport, tokio::task::JoinError> {
        let builder = Arc::clone(&self);
        let id = node.clone();
        let built = tokio::task::spawn_blocking(move || builder.build(&id)).await?;

        let outcome = match built {
            Ok(plan) if self.config.validate => {
                match validate_plan(&plan, self.config.dry_run_timeout()).await {
                    Ok(()) => NodeOutcome::Built(plan),
                    Err(err) => NodeOutcome::Failed(err.into()),
                }
            }
            Ok(plan) => NodeOutcome::Built(plan),
            Err(err) => NodeOutcome::Failed(err),
        };
        Ok(NodeReport { node, outcome })
    }

    /// Build, render and write the artifacts of one node.
    fn build(&self, id: &NodeId) -> Result<NodePlan, NodeBuildError> {
        let node = self
            .topology
            .node(id)
            .ok_or_else(|| ConfigurationError::from(TopologyError::UnknownNode(id.clone())))?;
        let graph = DaemonGraph::for_node(node, &self.registry)?;
        let log_dir = self.config.node_log_dir(id);

        let mut built: BTreeMap<String, ConfigTree> = BTreeMap::new();
        let mut rendered: Vec<(PathBuf, String)> = Vec::new();
        let mut daemons = Vec::with_capacity(graph.len());
        for instance in graph.instances() {
            let daemon = instance.daemon();
            let kind = daemon.kind();
            let render_err = |source| NodeBuildError::Render {
                kind: kind.to_owned(),
                source,
            };

            let options = resolve_options(daemon, self.topology.as_ref(), id, instance.options())?;
            let ctx = BuildContext::new(&self.topology, id, &options, &built, &log_dir);
            let tree = daemon.build(&ctx)?;

            let path = artifact_path(&self.config.artifact_dir, id, kind);
            let text = self
                .renderer
                .render(daemon.template_id(), &tree)
                .map_err(render_err)?;
            if self.config.emit_json {
                let json = self.renderer.render(JSON_TEMPLATE, &tree).map_err(render_err)?;
                rendered.push((path.with_extension("json"), json));
            }

            let process =
                ProcessContext::new(id.clone(), path.clone(), instance.extra_args().to_vec());
            daemons.push(ProcessSpec {
                kind: kind.to_owned(),
                artifact_path: path.clone(),
                startup_line: daemon.startup_line(&process),
                dry_run: daemon.dry_run(&process),
                kill_patterns: daemon.kill_patterns(&process)?,
            });
            rendered.push((path, text));
            built.insert(kind.to_owned(), tree);
            tracing::debug!(node = %id, kind, "daemon built");
        }

        fs::create_dir_all(&log_dir).map_err(|source| NodeBuildError::Io {
            path: log_dir.clone(),
            source,
        })?;
        let mut batch = ArtifactBatch::new();
        for (path, text) in &rendered {
            if let Err(source) = batch.write(path, text.as_bytes()) {
                batch.rollback();
                return Err(NodeBuildError::Io {
                    path: path.clone(),
                    source,
                });
            }
        }
        let written = batch.commit();
        tracing::info!(node = %id, artifacts = written.len(), "node built");

        Ok(NodePlan {
            node: id.clone(),
            namespace: id.as_str().to_owned(),
            log_dir,
            daemons,
            shutdown_order: graph
                .shutdown_order()
                .into_iter()
                .map(str::to_owned)
                .collect(),
        })
    }
}
