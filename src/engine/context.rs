// ABOUTME: Per-run execution context handed to task hooks
// ABOUTME: Wraps the shared TaskData plus the names of the task, job and workflow being run

use serde::Serialize;
use uuid::Uuid;

use super::data::TaskData;

/// Execution context of one workflow run.
///
/// The workflow owns the single live instance and updates the positional
/// names before each task; tasks only read them. Serializes to a snapshot
/// of the data and the current position.
#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub data: TaskData,
    pub(crate) run_id: Uuid,
    pub(crate) task_name: Option<String>,
    pub(crate) job_name: Option<String>,
    pub(crate) workflow_name: Option<String>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::with_data(TaskData::new())
    }

    pub fn with_data(data: TaskData) -> Self {
        Self {
            data,
            run_id: Uuid::new_v4(),
            task_name: None,
            job_name: None,
            workflow_name: None,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    pub fn job_name(&self) -> Option<&str> {
        self.job_name.as_deref()
    }

    pub fn workflow_name(&self) -> Option<&str> {
        self.workflow_name.as_deref()
    }

    pub(crate) fn set_position(&mut self, workflow: &str, job: &str, task: &str) {
        self.workflow_name = Some(workflow.to_string());
        self.job_name = Some(job.to_string());
        self.task_name = Some(task.to_string());
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}
