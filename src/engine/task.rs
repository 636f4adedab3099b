// ABOUTME: Atomic unit of work wrapping a callback with optional setup and teardown hooks
// ABOUTME: Implements the task state machine and captures hook failures as TaskError

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};
use uuid::Uuid;

use super::context::TaskContext;
use super::error::{EngineError, Result};
use super::result::TaskState;

/// A setup, callback or teardown hook.
pub type Hook = Box<dyn FnMut(&mut TaskContext) -> anyhow::Result<()>>;

/// Object identity of a task, independent of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStage {
    Setup,
    Callback,
    Teardown,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStage::Setup => write!(f, "setup"),
            TaskStage::Callback => write!(f, "callback"),
            TaskStage::Teardown => write!(f, "teardown"),
        }
    }
}

/// Failure captured while running a task's hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} failed: {message}")]
pub struct TaskError {
    pub stage: TaskStage,
    pub message: String,
    /// Underlying causes, outermost first.
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub panicked: bool,
}

impl TaskError {
    fn from_error(stage: TaskStage, error: &anyhow::Error) -> Self {
        Self {
            stage,
            message: error.to_string(),
            causes: error.chain().skip(1).map(ToString::to_string).collect(),
            panicked: false,
        }
    }

    fn from_panic(stage: TaskStage, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "task panicked".to_string()
        };

        Self {
            stage,
            message,
            causes: Vec::new(),
            panicked: true,
        }
    }

    /// Multi-line description including every cause.
    pub fn describe(&self) -> String {
        let mut description = self.to_string();
        if self.panicked {
            description.push_str(" (panic)");
        }
        for cause in &self.causes {
            description.push_str("\n  caused by: ");
            description.push_str(cause);
        }
        description
    }
}

pub struct Task {
    id: TaskId,
    name: String,
    callback: Hook,
    setup: Option<Hook>,
    teardown: Option<Hook>,
    skip: bool,
    state: TaskState,
    err_info: Option<TaskError>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&mut TaskContext) -> anyhow::Result<()> + 'static,
    {
        Self {
            id: TaskId::new(),
            name: name.into(),
            callback: Box::new(callback),
            setup: None,
            teardown: None,
            skip: false,
            state: TaskState::Pending,
            err_info: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: FnMut(&mut TaskContext) -> anyhow::Result<()> + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    pub fn with_teardown<F>(mut self, teardown: F) -> Self
    where
        F: FnMut(&mut TaskContext) -> anyhow::Result<()> + 'static,
    {
        self.teardown = Some(Box::new(teardown));
        self
    }

    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn skip(&self) -> bool {
        self.skip
    }

    /// Only meaningful before the task runs.
    pub fn set_skip(&mut self, skip: bool) {
        self.skip = skip;
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn err_info(&self) -> Option<&TaskError> {
        self.err_info.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Run the task once against `context`.
    ///
    /// Hook failures never escape: they are stored in [`Task::err_info`] and
    /// the task ends in `FAILURE`. The only error returned is an attempt to
    /// run a task that is no longer pending. The task name is appended to
    /// the data history whatever the outcome.
    pub fn run(&mut self, context: &mut TaskContext) -> Result<()> {
        if self.state != TaskState::Pending {
            return Err(EngineError::InvalidState {
                task: self.name.clone(),
                state: self.state,
            });
        }

        if self.skip {
            debug!("Task {} skipped", self.name);
            self.state = TaskState::Skipped;
        } else {
            self.state = TaskState::InProgress;
            self.started_at = Some(Utc::now());
            debug!("Task {} started", self.name);

            let mut failure = match self.setup.as_mut() {
                Some(setup) => invoke(TaskStage::Setup, setup, context).err(),
                None => None,
            };

            if failure.is_none() {
                failure = invoke(TaskStage::Callback, &mut self.callback, context).err();
            }

            if let Some(teardown) = self.teardown.as_mut() {
                if let Err(error) = invoke(TaskStage::Teardown, teardown, context) {
                    match failure {
                        None => failure = Some(error),
                        Some(_) => warn!("Task {} teardown also failed: {}", self.name, error),
                    }
                }
            }

            self.finished_at = Some(Utc::now());
            match failure {
                Some(error) => {
                    debug!("Task {} failed: {}", self.name, error);
                    self.err_info = Some(error);
                    self.state = TaskState::Failure;
                }
                None => {
                    debug!("Task {} succeeded", self.name);
                    self.state = TaskState::Success;
                }
            }
        }

        context.data.add_task_history(self.name.clone());
        Ok(())
    }
}

fn invoke(
    stage: TaskStage,
    hook: &mut Hook,
    context: &mut TaskContext,
) -> std::result::Result<(), TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(|| hook(context))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(TaskError::from_error(stage, &error)),
        Err(payload) => Err(TaskError::from_panic(stage, payload)),
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("has_setup", &self.setup.is_some())
            .field("has_teardown", &self.teardown.is_some())
            .field("skip", &self.skip)
            .field("state", &self.state)
            .field("err_info", &self.err_info)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Hook) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let shared = Rc::clone(&calls);
        let hook = move |label: &'static str| -> Hook {
            let calls = Rc::clone(&shared);
            Box::new(move |_: &mut TaskContext| -> anyhow::Result<()> {
                calls.borrow_mut().push(label);
                Ok(())
            })
        };
        (calls, hook)
    }

    #[test]
    fn test_successful_run_invokes_hooks_in_order() {
        let (calls, hook) = recorder();
        let mut task = Task::new("pull", hook("callback"))
            .with_setup(hook("setup"))
            .with_teardown(hook("teardown"));
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        assert_eq!(task.state(), TaskState::Success);
        assert!(task.err_info().is_none());
        assert_eq!(*calls.borrow(), vec!["setup", "callback", "teardown"]);
        assert_eq!(context.data.history(), ["pull"]);
        assert!(task.duration().is_some());
    }

    #[test]
    fn test_callback_mutates_shared_data() {
        let mut task = Task::new("count", |context: &mut TaskContext| {
            context.data.insert("rows", 12);
            Ok(())
        });
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        assert_eq!(context.data.get_as::<u32>("rows").unwrap(), Some(12));
    }

    #[test]
    fn test_skipped_task_invokes_nothing() {
        let (calls, hook) = recorder();
        let mut task = Task::new("pull", hook("callback"))
            .with_setup(hook("setup"))
            .with_teardown(hook("teardown"));
        task.set_skip(true);
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        assert_eq!(task.state(), TaskState::Skipped);
        assert!(calls.borrow().is_empty());
        assert_eq!(context.data.history(), ["pull"]);
        assert!(task.started_at().is_none());
    }

    #[test]
    fn test_failed_setup_skips_callback_but_runs_teardown() {
        let (calls, hook) = recorder();
        let mut task = Task::new("pull", hook("callback"))
            .with_setup(|_: &mut TaskContext| Err(anyhow!("no connection")))
            .with_teardown(hook("teardown"));
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        assert_eq!(task.state(), TaskState::Failure);
        assert_eq!(*calls.borrow(), vec!["teardown"]);

        let error = task.err_info().unwrap();
        assert_eq!(error.stage, TaskStage::Setup);
        assert_eq!(error.message, "no connection");
        assert_eq!(context.data.history(), ["pull"]);
    }

    #[test]
    fn test_failed_callback_records_cause_chain() {
        let (calls, hook) = recorder();
        let mut task = Task::new("parse", |_: &mut TaskContext| {
            let parsed: std::result::Result<u32, _> = "abc".parse::<u32>();
            parsed.context("row 3 is not a number")?;
            Ok(())
        })
        .with_teardown(hook("teardown"));
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        assert_eq!(task.state(), TaskState::Failure);
        assert_eq!(*calls.borrow(), vec!["teardown"]);

        let error = task.err_info().unwrap();
        assert_eq!(error.stage, TaskStage::Callback);
        assert_eq!(error.message, "row 3 is not a number");
        assert_eq!(error.causes.len(), 1);
        assert!(error.describe().contains("caused by: invalid digit"));
    }

    #[test]
    fn test_panicking_callback_is_captured() {
        let (calls, hook) = recorder();
        let mut task = Task::new("explode", |_: &mut TaskContext| -> anyhow::Result<()> {
            panic!("boom")
        })
        .with_teardown(hook("teardown"));
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        assert_eq!(task.state(), TaskState::Failure);
        assert_eq!(*calls.borrow(), vec!["teardown"]);
        let error = task.err_info().unwrap();
        assert!(error.panicked);
        assert_eq!(error.message, "boom");
    }

    #[test]
    fn test_failed_teardown_marks_failure() {
        let mut task = Task::new("pull", |_: &mut TaskContext| Ok(()))
            .with_teardown(|_: &mut TaskContext| Err(anyhow!("lock not released")));
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        assert_eq!(task.state(), TaskState::Failure);
        assert_eq!(task.err_info().unwrap().stage, TaskStage::Teardown);
    }

    #[test]
    fn test_first_failure_wins_over_teardown_failure() {
        let mut task = Task::new("pull", |_: &mut TaskContext| Err(anyhow!("callback broke")))
            .with_teardown(|_: &mut TaskContext| Err(anyhow!("teardown broke")));
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();

        let error = task.err_info().unwrap();
        assert_eq!(error.stage, TaskStage::Callback);
        assert_eq!(error.message, "callback broke");
    }

    #[test]
    fn test_task_runs_at_most_once() {
        let mut task = Task::new("pull", |_: &mut TaskContext| Ok(()));
        let mut context = TaskContext::new();

        task.run(&mut context).unwrap();
        let result = task.run(&mut context);

        assert_eq!(
            result,
            Err(EngineError::InvalidState {
                task: "pull".to_string(),
                state: TaskState::Success,
            })
        );
        assert_eq!(context.data.history(), ["pull"]);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new("same", |_: &mut TaskContext| Ok(()));
        let b = Task::new("same", |_: &mut TaskContext| Ok(()));
        assert_ne!(a.id(), b.id());
    }
}
