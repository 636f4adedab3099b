// ABOUTME: Workflow engine module: data, tasks, jobs, dependency graph and orchestration
// ABOUTME: Everything needed to declare, validate and run a workflow lives here

pub mod attribution;
pub mod collection;
pub mod context;
pub mod data;
pub mod dependency;
pub mod error;
pub mod job;
pub mod result;
pub mod task;
pub mod workflow;

pub use attribution::{ExecutionPointer, OutputStore, Position};
pub use collection::{ElementMut, JobList, Named, TaskList, UniqueList};
pub use context::TaskContext;
pub use data::TaskData;
pub use dependency::{Dependence, ExecutionPlan, TaskGraph, TaskNode, TaskRef};
pub use error::{EngineError, Result};
pub use job::Job;
pub use result::{JobState, JobStatus, TaskState, TaskStatus, WorkflowState, WorkflowStatus};
pub use task::{Hook, Task, TaskError, TaskId, TaskStage};
pub use workflow::Workflow;
