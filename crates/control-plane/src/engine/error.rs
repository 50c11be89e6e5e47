//! Engine error types.

use cutover_tasks::TaskError;
use thiserror::Error;

use super::context::OutputSlot;

/// Errors raised while building a workflow graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Two steps share a name.
    #[error("Duplicate step: {0}")]
    DuplicateStep(String),

    /// The entry step does not exist.
    #[error("Entry step not found: {0}")]
    UnknownEntry(String),

    /// A step points at a successor that does not exist.
    #[error("Step '{step}' points at unknown step '{target}'")]
    UnknownSuccessor { step: String, target: String },

    /// Two steps write the same output slot.
    #[error("Output slot '{slot}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        slot: OutputSlot,
        first: String,
        second: String,
    },
}

/// Rejected start-migration input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),
}

/// Errors raised while mutating a run's context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// A step tried to write a slot owned by another step.
    #[error("Output slot '{slot}' belongs to step '{owner}', not '{step}'")]
    SlotOwned {
        slot: OutputSlot,
        owner: String,
        step: String,
    },
}

/// Fatal engine errors. Executor failures are not engine errors; they end
/// the run with a FAILED status instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The cursor reached a step missing from the graph.
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// Context invariant violated.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The shared error-reporting task itself failed.
    #[error("Error handler failed while reporting step '{step}': {source}")]
    HandlerFault {
        step: String,
        #[source]
        source: TaskError,
    },
}
