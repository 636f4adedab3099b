// ABOUTME: Main library module for the taskweave workflow engine
// ABOUTME: Exports the engine, parameter binding, configuration and logging setup

pub mod config;
pub mod engine;
pub mod logging;
pub mod params;

// Re-export commonly used types
pub use config::{Config, LoggingConfig};
pub use engine::{
    Dependence, EngineError, ExecutionPointer, Job, JobState, Task, TaskContext, TaskData,
    TaskRef, TaskState, Workflow, WorkflowState, WorkflowStatus,
};
pub use params::{Kwargs, Params};

// Error handling
pub type Result<T> = engine::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
