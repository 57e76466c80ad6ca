//! Option resolution for a daemon instance.
//!
//! Precedence, highest first: explicit instance options, the node property
//! `<kind>_<key>` (written by an overlay or declared directly), then the
//! kind's defaults.

use super::Daemon;
use crate::error::ConfigurationError;
use ipmesh_lib::{ConfigTree, ListMerge, NodeId, TopologyView, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// Layer an option value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    Default,
    Property,
    Explicit,
}

/// Merged options of one daemon instance plus the layer each came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOptions {
    values: ConfigTree,
    sources: BTreeMap<String, OptionSource>,
}

impl ResolvedOptions {
    #[must_use]
    pub fn values(&self) -> &ConfigTree {
        &self.values
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get_int(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get_str(key)
    }

    #[must_use]
    pub fn get_list(&self, key: &str) -> Option<&[Value]> {
        self.values.get_list(key)
    }

    #[must_use]
    pub fn source(&self, key: &str) -> Option<OptionSource> {
        self.sources.get(key).copied()
    }

    /// Whether `key` still holds the kind's default.
    #[must_use]
    pub fn is_default(&self, key: &str) -> bool {
        self.source(key) == Some(OptionSource::Default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter()
    }
}

/// Resolve the options of `daemon` on `node`.
///
/// # Errors
///
/// Returns [`ConfigurationError::InvalidOption`] when an explicit option or
/// node property names an unknown key or holds a value of the wrong kind.
pub fn resolve_options(
    daemon: &dyn Daemon,
    topology: &impl TopologyView,
    node: &NodeId,
    explicit: &ConfigTree,
) -> Result<ResolvedOptions, ConfigurationError> {
    let kind = daemon.kind();
    let mut values = ConfigTree::new();
    daemon.set_defaults(&mut values);
    let mut sources: BTreeMap<String, OptionSource> = values
        .keys()
        .map(|k| (k.to_owned(), OptionSource::Default))
        .collect();

    let invalid = |key: &str, reason: String| ConfigurationError::InvalidOption {
        node: node.clone(),
        kind: kind.to_owned(),
        key: key.to_owned(),
        reason,
    };

    let mut properties = ConfigTree::new();
    for (key, default) in values.iter() {
        if let Some(value) = topology.node_property(node, &format!("{kind}_{key}")) {
            if value.kind() != default.kind() {
                return Err(invalid(
                    key,
                    format!(
                        "node property holds a {}, expected a {}",
                        value.kind(),
                        default.kind()
                    ),
                ));
            }
            properties.set(key, value.clone());
        }
    }
    for (key, _) in properties.iter() {
        sources.insert(key.to_owned(), OptionSource::Property);
    }
    values.merge(&properties, ListMerge::Replace);

    for (key, value) in explicit.iter() {
        let Some(default) = values.get(key) else {
            return Err(invalid(key, "unrecognised option".to_owned()));
        };
        if value.kind() != default.kind() {
            return Err(invalid(
                key,
                format!("expected a {}, found a {}", default.kind(), value.kind()),
            ));
        }
        sources.insert(key.to_owned(), OptionSource::Explicit);
    }
    values.merge(explicit, ListMerge::Replace);

    Ok(ResolvedOptions { values, sources })
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "simplify test output")]
    use super::*;
    use crate::daemon::BuildContext;
    use ipmesh_lib::{Topology, TopologyMut};
    use rstest::{fixture, rstest};

    #[derive(Debug)]
    struct Probe;

    impl Daemon for Probe {
        fn kind(&self) -> &'static str {
            "probe"
        }

        fn set_defaults(&self, defaults: &mut ConfigTree) {
            defaults.set("interval", 30);
            defaults.set("label", "none");
        }

        fn build(&self, _ctx: &BuildContext<'_>) -> Result<ConfigTree, ConfigurationError> {
            Ok(ConfigTree::new())
        }
    }

    #[fixture]
    fn topo() -> Topology {
        let mut topo = Topology::new();
        topo.add_router("r1").expect("r1");
        topo
    }

    #[rstest]
    #[case::defaults_only(None, None, 30, OptionSource::Default)]
    #[case::property_over_default(Some(20), None, 20, OptionSource::Property)]
    #[case::explicit_over_property(Some(20), Some(10), 10, OptionSource::Explicit)]
    #[case::explicit_over_default(None, Some(10), 10, OptionSource::Explicit)]
    fn precedence(
        mut topo: Topology,
        #[case] property: Option<i64>,
        #[case] explicit: Option<i64>,
        #[case] expected: i64,
        #[case] source: OptionSource,
    ) {
        let r1 = NodeId::from("r1");
        if let Some(v) = property {
            topo.set_node_property(&r1, "probe_interval", Value::Int(v))
                .expect("property");
        }
        let explicit = explicit
            .map(|v| ConfigTree::new().with("interval", v))
            .unwrap_or_default();
        let opts = resolve_options(&Probe, &topo, &r1, &explicit).expect("resolve");
        assert_eq!(opts.get_int("interval"), Some(expected));
        assert_eq!(opts.source("interval"), Some(source));
        assert_eq!(opts.get_str("label"), Some("none"));
        assert!(opts.is_default("label"));
    }

    #[rstest]
    #[case::unknown(ConfigTree::new().with("bogus", 1))]
    #[case::wrong_kind(ConfigTree::new().with("interval", "soon"))]
    fn rejects_bad_explicit_options(topo: Topology, #[case] explicit: ConfigTree) {
        let err = resolve_options(&Probe, &topo, &NodeId::from("r1"), &explicit)
            .expect_err("invalid option");
        assert!(matches!(err, ConfigurationError::InvalidOption { .. }));
    }

    #[rstest]
    fn unrelated_node_properties_are_ignored(mut topo: Topology) {
        let r1 = NodeId::from("r1");
        topo.set_node_property(&r1, "other_interval", Value::Int(1))
            .expect("property");
        let opts = resolve_options(&Probe, &topo, &r1, &ConfigTree::new()).expect("resolve");
        assert_eq!(opts.get_int("interval"), Some(30));
    }
}
