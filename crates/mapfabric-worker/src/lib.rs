//! MapFabric worker: the consuming side of the job fabric
//!
//! The binary wires the core [`mapfabric_core::Worker`] loop to the
//! [`engine::Engine`] executor. The engine and runners live here, next to
//! the process that owns them; the coordination protocol lives in
//! `mapfabric-core`.

pub mod cache;
pub mod cli;
pub mod engine;
pub mod runner;

pub use engine::{Engine, EngineContext};
