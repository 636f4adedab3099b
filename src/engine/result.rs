// ABOUTME: Task, job and workflow state enums plus the read-only status report
// ABOUTME: Defines the states each state machine moves through and their aggregate views

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    Skipped,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    Paused,
    Skipped,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    #[default]
    Pending,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    Success,
    Failure,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Skipped | TaskState::Success | TaskState::Failure)
    }
}

impl JobState {
    /// Aggregate member task states into a job state.
    ///
    /// Precedence, highest first: nothing started, anything running, any
    /// failure, everything skipped, partially run, otherwise success.
    pub fn aggregate<I>(states: I) -> Self
    where
        I: IntoIterator<Item = TaskState>,
    {
        let mut total = 0usize;
        let mut pending = 0usize;
        let mut skipped = 0usize;
        let mut in_progress = false;
        let mut failed = false;

        for state in states {
            total += 1;
            match state {
                TaskState::Pending => pending += 1,
                TaskState::InProgress => in_progress = true,
                TaskState::Failure => failed = true,
                TaskState::Skipped => skipped += 1,
                TaskState::Success => {}
            }
        }

        if pending == total {
            JobState::Pending
        } else if in_progress {
            JobState::InProgress
        } else if failed {
            JobState::Failure
        } else if skipped == total {
            JobState::Skipped
        } else if pending > 0 {
            JobState::Paused
        } else {
            JobState::Success
        }
    }
}

/// Snapshot of a workflow and everything it owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStatus {
    pub name: String,
    pub state: WorkflowState,
    pub jobs: Vec<JobStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub name: String,
    pub state: JobState,
    pub tasks: Vec<TaskStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    pub name: String,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowStatus {
    pub fn job(&self, name: &str) -> Option<&JobStatus> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn total_tasks(&self) -> usize {
        self.jobs.iter().map(|job| job.tasks.len()).sum()
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.jobs
            .iter()
            .flat_map(|job| job.tasks.iter())
            .filter(|task| task.state == state)
            .count()
    }
}

impl JobStatus {
    pub fn task(&self, name: &str) -> Option<&TaskStatus> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::InProgress => write!(f, "INPROGRESS"),
            TaskState::Skipped => write!(f, "SKIPPED"),
            TaskState::Success => write!(f, "SUCCESS"),
            TaskState::Failure => write!(f, "FAILURE"),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::InProgress => write!(f, "INPROGRESS"),
            JobState::Paused => write!(f, "PAUSED"),
            JobState::Skipped => write!(f, "SKIPPED"),
            JobState::Success => write!(f, "SUCCESS"),
            JobState::Failure => write!(f, "FAILURE"),
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Pending => write!(f, "PENDING"),
            WorkflowState::InProgress => write!(f, "INPROGRESS"),
            WorkflowState::Success => write!(f, "SUCCESS"),
            WorkflowState::Failure => write!(f, "FAILURE"),
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.name, self.state)?;
        for job in &self.jobs {
            writeln!(f, "  {} [{}]", job.name, job.state)?;
            for task in &job.tasks {
                match &task.error {
                    Some(error) => writeln!(f, "    {} [{}] {}", task.name, task.state, error)?,
                    None => writeln!(f, "    {} [{}]", task.name, task.state)?,
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_precedence() {
        use TaskState::*;

        assert_eq!(JobState::aggregate([]), JobState::Pending);
        assert_eq!(JobState::aggregate([Pending, Pending]), JobState::Pending);
        assert_eq!(
            JobState::aggregate([Success, InProgress, Failure]),
            JobState::InProgress
        );
        assert_eq!(JobState::aggregate([Success, Failure, Pending]), JobState::Failure);
        assert_eq!(JobState::aggregate([Skipped, Skipped]), JobState::Skipped);
        assert_eq!(JobState::aggregate([Success, Pending]), JobState::Paused);
        assert_eq!(JobState::aggregate([Skipped, Pending]), JobState::Paused);
        assert_eq!(JobState::aggregate([Success, Skipped]), JobState::Success);
        assert_eq!(JobState::aggregate([Success]), JobState::Success);
    }

    #[test]
    fn test_state_serialization_matches_display() {
        assert_eq!(
            serde_json::to_value(TaskState::InProgress).unwrap(),
            serde_json::json!(TaskState::InProgress.to_string())
        );
        assert_eq!(
            serde_json::to_value(JobState::InProgress).unwrap(),
            serde_json::json!("INPROGRESS")
        );
        assert_eq!(
            serde_json::to_value(WorkflowState::InProgress).unwrap(),
            serde_json::json!("INPROGRESS")
        );
        assert_eq!(
            serde_yaml::from_str::<TaskState>("INPROGRESS").unwrap(),
            TaskState::InProgress
        );
        assert_eq!(
            serde_json::to_value(JobState::Paused).unwrap(),
            serde_json::json!(JobState::Paused.to_string())
        );
        assert_eq!(TaskState::InProgress.to_string(), "INPROGRESS");
        assert!(TaskState::Skipped.is_terminal());
        assert!(!TaskState::InProgress.is_terminal());
    }

    #[test]
    fn test_status_display() {
        let status = WorkflowStatus {
            name: "nightly".to_string(),
            state: WorkflowState::Failure,
            jobs: vec![JobStatus {
                name: "extract".to_string(),
                state: JobState::Failure,
                tasks: vec![
                    TaskStatus {
                        name: "pull".to_string(),
                        state: TaskState::Failure,
                        error: Some("callback failed: timeout".to_string()),
                    },
                    TaskStatus {
                        name: "store".to_string(),
                        state: TaskState::Pending,
                        error: None,
                    },
                ],
            }],
        };

        let rendered = status.to_string();
        assert!(rendered.starts_with("nightly [FAILURE]"));
        assert!(rendered.contains("    pull [FAILURE] callback failed: timeout"));
        assert!(rendered.contains("    store [PENDING]"));
        assert_eq!(status.total_tasks(), 2);
        assert_eq!(status.count(TaskState::Pending), 1);
    }
}
