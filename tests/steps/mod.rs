//! Step definitions for the behavioural scenarios.

mod config_steps;
mod daemon_steps;
mod overlay_steps;

pub use config_steps::ConfigWorld;
pub use daemon_steps::BuildWorld;
pub use overlay_steps::OverlayWorld;
