//! Shared types for the ipmesh project.
//!
//! This library defines the data model exchanged between the topology
//! description, the overlay phase and the daemon configuration engine:
//! ordered configuration trees, the topology graph with its query surface,
//! interface prefixes and the YAML topology description.

pub mod description;
pub mod prefix;
pub mod topology;
pub mod tree;

pub use description::{DescriptionError, OverlayDescription, OverlayKind, TopologyDescription};
pub use prefix::{IpPrefix, PrefixError};
pub use topology::{
    DaemonDecl, Element, Interface, InterfaceId, Link, Node, NodeId, NodeRole, Topology,
    TopologyError, TopologyMut, TopologyView,
};
pub use tree::{ConfigTree, ListMerge, Value, ValueKind};

/// Default directory receiving rendered daemon configuration artifacts.
///
/// Shared by the engine and its tests to avoid configuration drift.
pub const DEFAULT_ARTIFACT_DIR: &str = "/tmp/ipmesh";

/// Default root of the per-node daemon log directories.
pub const DEFAULT_LOG_DIR: &str = "/var/tmp/log";
