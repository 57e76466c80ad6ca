//! Registry mapping daemon kind names to factories.

use super::{Daemon, Openr, PlatformLinux, openr, platform};
use crate::overlay::{KeySpec, PropertySchema};
use ipmesh_lib::ConfigTree;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Creates a fresh daemon instance of one kind.
pub type DaemonFactory = Arc<dyn Fn() -> Box<dyn Daemon> + Send + Sync>;

/// Known daemon kinds. Open for extension through [`DaemonRegistry::register`].
#[derive(Clone, Default)]
pub struct DaemonRegistry {
    factories: BTreeMap<String, DaemonFactory>,
}

impl fmt::Debug for DaemonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DaemonRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding `openr` and `platform_linux`.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(openr::KIND, || Box::new(Openr));
        registry.register(platform::KIND, || Box::new(PlatformLinux));
        registry
    }

    /// Register or replace the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Daemon> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    #[must_use]
    pub fn create(&self, kind: &str) -> Option<Box<dyn Daemon>> {
        self.factories.get(kind).map(|factory| factory())
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Property keys overlays may assign: `<kind>_<option>` for every
    /// default option of every kind, typed like the default.
    #[must_use]
    pub fn property_schema(&self) -> PropertySchema {
        let mut schema = PropertySchema::new();
        for factory in self.factories.values() {
            let daemon = factory();
            let mut defaults = ConfigTree::new();
            daemon.set_defaults(&mut defaults);
            let exclusive = daemon.exclusive_keys();
            for (key, value) in defaults.iter() {
                schema.insert(
                    format!("{}_{key}", daemon.kind()),
                    KeySpec {
                        kind: value.kind(),
                        exclusive: exclusive.contains(&key),
                    },
                );
            }
        }
        schema
    }
}
