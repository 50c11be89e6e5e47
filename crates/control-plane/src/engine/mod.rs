//! Migration workflow engine.
//!
//! - **Context**: per-run inputs and step outputs
//! - **Step / Graph**: the static migration workflow
//! - **Runner**: walks the graph for one run, checkpointing to history

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod step;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EngineConfig;
pub use context::{
    Credential, ErrorInfo, MigrationContext, MigrationInput, OriginInfo, OriginType, OutputSlot,
    StepFailure,
};
pub use error::{ContextError, EngineError, GraphError, InputError};
pub use graph::WorkflowGraph;
pub use runner::{ExecutionEngine, RunOutcome, RunStatus};
