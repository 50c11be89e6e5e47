//! Cutover Task Library
//!
//! Request/response boundary between the migration engine and the
//! independently deployed handlers that perform each side effect.
//!
//! This crate provides:
//! - The closed set of task names the migration pipeline invokes
//! - The [`TaskExecutor`] trait the engine calls through
//! - A registry that dispatches task names to handlers
//! - An HTTP handler that forwards requests to a remote endpoint

pub mod error;
pub mod http;
pub mod name;
pub mod registry;

pub use error::TaskError;
pub use http::{create_http_registry, HttpTaskHandler};
pub use name::TaskName;
pub use registry::{TaskExecutor, TaskHandler, TaskRegistry};
