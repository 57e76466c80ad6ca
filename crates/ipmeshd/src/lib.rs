#![cfg_attr(docsrs, feature(doc_cfg))]

//! Configuration engine for emulated routing networks.
//!
//! # Overview
//! This crate exposes:
//! - [`overlay::Overlay`] and [`resolver::OverlayResolver`]: named property
//!   layers applied to the topology in one global pass, with exclusive-key
//!   conflict detection.
//! - [`daemon::Daemon`]: the routing daemon contract, with the built-in
//!   OpenR and Linux platform agent kinds.
//! - [`graph::DaemonGraph`]: per-node dependency ordering.
//! - [`render::Renderer`]: template rendering of configuration trees.
//! - [`pipeline::Engine`]: the concurrent per-node build and the process
//!   plan handed to the supervisor.
//! - [`config::Config`]: engine configuration loaded from
//!   `/etc/ipmeshd/config.toml` with environment and CLI overrides.
//!
//! # Examples
//! ```rust,no_run
//! use ipmeshd::{config::Config, pipeline::Engine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = Config::load()?;
//! let report = Engine::new(cfg).run().await?;
//! for plan in report.plans() {
//!     println!("{}: {:?}", plan.node, plan.startup_order());
//! }
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod daemon;
pub mod error;
pub mod graph;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod plan;
pub mod render;
pub mod resolver;
pub mod util;
pub mod validate;

pub use error::{ConfigurationError, EngineError, NodeBuildError, RenderError, ValidationError};
pub use pipeline::Engine;
