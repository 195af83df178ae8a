//! Verification workflow: the DAG model (§4.2) and the engine that drives
//! it (§4.3).

pub mod dag;
pub mod engine;

pub use dag::TaskDefinition;
pub use engine::{CompletionCallback, TaskHandler, WorkflowEngine};
