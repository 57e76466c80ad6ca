//! Per-node daemon dependency graph.
//!
//! Instances are ordered dependencies first (depth-first post-order, ties
//! broken by declaration order). Daemons start in that order and stop in
//! reverse.

use crate::daemon::{Daemon, DaemonRegistry};
use crate::error::ConfigurationError;
use ipmesh_lib::{ConfigTree, Node, NodeId};
use std::collections::BTreeMap;

/// One daemon bound to a node.
#[derive(Debug)]
pub struct DaemonInstance {
    daemon: Box<dyn Daemon>,
    options: ConfigTree,
    extra_args: Vec<String>,
    synthesized: bool,
}

impl DaemonInstance {
    #[must_use]
    pub fn daemon(&self) -> &dyn Daemon {
        self.daemon.as_ref()
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.daemon.kind()
    }

    /// Explicit options from the declaration; empty when synthesised.
    #[must_use]
    pub fn options(&self) -> &ConfigTree {
        &self.options
    }

    #[must_use]
    pub fn extra_args(&self) -> &[String] {
        &self.extra_args
    }

    /// Whether the instance was added to satisfy a dependency.
    #[must_use]
    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }
}

#[derive(Debug)]
pub struct DaemonGraph {
    node: NodeId,
    instances: Vec<DaemonInstance>,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mark {
    Temp,
    Perm,
}

struct Walk<'a> {
    instances: &'a [DaemonInstance],
    index: &'a BTreeMap<String, usize>,
    marks: BTreeMap<usize, Mark>,
    stack: Vec<String>,
    order: Vec<usize>,
}

impl Walk<'_> {
    /// Post-order visit; on a cycle returns the path closing it.
    fn visit(&mut self, at: usize) -> Result<(), Vec<String>> {
        let instances = self.instances;
        let Some(instance) = instances.get(at) else {
            return Ok(());
        };
        let kind = instance.kind();
        match self.marks.get(&at) {
            Some(Mark::Perm) => return Ok(()),
            Some(Mark::Temp) => {
                let start = self.stack.iter().position(|k| k == kind).unwrap_or(0);
                let mut cycle: Vec<String> = self.stack.iter().skip(start).cloned().collect();
                cycle.push(kind.to_owned());
                return Err(cycle);
            }
            None => {}
        }

        self.marks.insert(at, Mark::Temp);
        self.stack.push(kind.to_owned());
        for dep in instance.daemon().dependencies() {
            if let Some(&next) = self.index.get(*dep) {
                self.visit(next)?;
            }
        }
        self.stack.pop();
        self.marks.insert(at, Mark::Perm);
        self.order.push(at);
        Ok(())
    }
}

impl DaemonGraph {
    /// Instantiate and order the daemons declared on `node`.
    ///
    /// A dependency kind without a declared instance is added with default
    /// options.
    ///
    /// # Errors
    ///
    /// Fails on unknown or duplicate kinds and on dependency cycles.
    pub fn for_node(node: &Node, registry: &DaemonRegistry) -> Result<Self, ConfigurationError> {
        let node_id = node.id();
        let unknown = |kind: &str| ConfigurationError::UnknownDaemonKind {
            node: node_id.clone(),
            kind: kind.to_owned(),
        };

        let mut instances = Vec::new();
        let mut index: BTreeMap<String, usize> = BTreeMap::new();
        // Indexed by `Daemon::kind`, the name dependencies refer to, which
        // need not match the registry key of the declaration.
        for decl in node.daemons() {
            let daemon = registry.create(&decl.kind).ok_or_else(|| unknown(&decl.kind))?;
            let kind = daemon.kind();
            if index.contains_key(kind) {
                return Err(ConfigurationError::DuplicateDaemon {
                    node: node_id.clone(),
                    kind: kind.to_owned(),
                });
            }
            index.insert(kind.to_owned(), instances.len());
            instances.push(DaemonInstance {
                daemon,
                options: decl.options.clone(),
                extra_args: decl.extra_args.clone(),
                synthesized: false,
            });
        }

        let mut next = 0;
        while let Some(instance) = instances.get(next) {
            let required_by = instance.kind();
            let dependencies = instance.daemon().dependencies();
            for &kind in dependencies {
                if index.contains_key(kind) {
                    continue;
                }
                let daemon = registry.create(kind).ok_or_else(|| unknown(kind))?;
                let created = daemon.kind();
                if index.contains_key(created) {
                    continue;
                }
                tracing::info!(
                    node = %node_id,
                    kind = created,
                    required_by,
                    "adding missing dependency with default options"
                );
                index.insert(created.to_owned(), instances.len());
                instances.push(DaemonInstance {
                    daemon,
                    options: ConfigTree::new(),
                    extra_args: Vec::new(),
                    synthesized: true,
                });
            }
            next += 1;
        }

        let mut walk = Walk {
            instances: &instances,
            index: &index,
            marks: BTreeMap::new(),
            stack: Vec::new(),
            order: Vec::new(),
        };
        for at in 0..instances.len() {
            walk.stack.clear();
            walk.visit(at)
                .map_err(|cycle| ConfigurationError::DependencyCycle {
                    node: node_id.clone(),
                    cycle,
                })?;
        }
        let order = walk.order;

        let mut slots: Vec<Option<DaemonInstance>> = instances.into_iter().map(Some).collect();
        let instances = order
            .into_iter()
            .filter_map(|at| slots.get_mut(at).and_then(Option::take))
            .collect();
        Ok(Self {
            node: node_id.clone(),
            instances,
        })
    }

    #[must_use]
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Instances in build and startup order.
    #[must_use]
    pub fn instances(&self) -> &[DaemonInstance] {
        &self.instances
    }

    #[must_use]
    pub fn startup_order(&self) -> Vec<&'static str> {
        self.instances.iter().map(DaemonInstance::kind).collect()
    }

    #[must_use]
    pub fn shutdown_order(&self) -> Vec<&'static str> {
        self.instances.iter().rev().map(DaemonInstance::kind).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
