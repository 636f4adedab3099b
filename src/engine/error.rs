// ABOUTME: Error types for workflow construction, graph validation and execution
// ABOUTME: Structural errors are fatal; task failures are captured separately as TaskError

use thiserror::Error;

use super::result::TaskState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Duplicate {kind} name: '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Index {index} out of range for {kind} list of length {len}")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Missing required parameters for '{owner}': {missing:?}")]
    MissingParameters { owner: String, missing: Vec<String> },

    #[error("Invalid parameters for '{owner}': {message}")]
    InvalidParameters { owner: String, message: String },

    #[error("Job '{job}' has no tasks")]
    EmptyJob { job: String },

    #[error("Workflow '{workflow}' defines neither jobs nor dependencies")]
    UndefinedGraph { workflow: String },

    #[error("Circular dependency detected: {tasks:?}")]
    CyclicGraph { tasks: Vec<String> },

    #[error("Task not found: {reference}")]
    UnknownTask { reference: String },

    #[error("Task name '{name}' is ambiguous, found in jobs {jobs:?}")]
    AmbiguousTask { name: String, jobs: Vec<String> },

    #[error("Task '{task}' cannot run from state {state}, expected PENDING")]
    InvalidState { task: String, state: TaskState },
}

pub type Result<T> = std::result::Result<T, EngineError>;
