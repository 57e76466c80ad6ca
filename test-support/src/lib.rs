//! Test support utilities shared by the workspace's unit, integration and
//! behavioural tests.

pub mod env_guard;
pub mod fixtures;
pub mod logging;

pub use env_guard::EnvVarGuard;
pub use fixtures::{TRIANGLE_YAML, Workspace, interface_entry, triangle};
