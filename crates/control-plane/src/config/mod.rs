//! Configuration module for the Cutover control plane.
//!
//! Configuration is loaded from environment variables using the `envy`
//! crate and resolved into the engine's [`EngineConfig`](crate::engine::EngineConfig).

mod app;

pub use app::AppConfig;
