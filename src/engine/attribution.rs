// ABOUTME: Current execution pointer used to attribute side-channel output to tasks
// ABOUTME: The workflow sets it around every task and clears it when a run exits

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Nested output store: job name -> task name -> recorded outputs.
pub type OutputStore = IndexMap<String, IndexMap<String, Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub workflow: String,
    pub job: Option<String>,
    pub task: Option<String>,
}

/// Output recorded during the runs of one workflow.
///
/// Each workflow owns its own log; the pointer only borrows it while that
/// workflow runs.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputLog {
    inner: Arc<RwLock<OutputStore>>,
}

impl OutputLog {
    fn push(&self, job: String, task: String, output: String) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job)
            .or_default()
            .entry(task)
            .or_default()
            .push(output);
    }

    pub(crate) fn snapshot(&self) -> OutputStore {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn for_task(&self, job: &str, task: &str) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job)
            .and_then(|tasks| tasks.get(task))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct PointerState {
    workflow: Option<String>,
    job: Option<String>,
    task: Option<String>,
    log: Option<OutputLog>,
}

/// Shared handle onto "what is running right now".
///
/// Clones observe the same pointer, so instrumentation can keep its own
/// copy and call [`ExecutionPointer::record`] from inside task hooks.
/// Recorded output lands in the store of the workflow currently running.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPointer {
    inner: Arc<RwLock<PointerState>>,
}

impl ExecutionPointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Position> {
        let state = self.read();
        state.workflow.as_ref().map(|workflow| Position {
            workflow: workflow.clone(),
            job: state.job.clone(),
            task: state.task.clone(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.read().workflow.is_some()
    }

    /// File `output` under the currently running (job, task) of the
    /// current workflow.
    ///
    /// Returns false, and drops the output, when no task is running.
    pub fn record(&self, output: impl Into<String>) -> bool {
        let target = {
            let state = self.read();
            match (&state.log, &state.job, &state.task) {
                (Some(log), Some(job), Some(task)) => Some((log.clone(), job.clone(), task.clone())),
                _ => None,
            }
        };

        match target {
            Some((log, job, task)) => {
                log.push(job, task, output.into());
                true
            }
            None => {
                warn!("Dropping output recorded outside of a running task");
                false
            }
        }
    }

    /// Point at `workflow`, routing recorded output into `log`; the
    /// returned guard clears the pointer on drop.
    pub(crate) fn enter_workflow(&self, workflow: &str, log: &OutputLog) -> PointerGuard {
        let mut state = self.write();
        state.workflow = Some(workflow.to_string());
        state.job = None;
        state.task = None;
        state.log = Some(log.clone());
        PointerGuard {
            pointer: self.clone(),
        }
    }

    pub(crate) fn enter_task(&self, job: &str, task: &str) {
        let mut state = self.write();
        state.job = Some(job.to_string());
        state.task = Some(task.to_string());
    }

    pub(crate) fn clear(&self) {
        let mut state = self.write();
        state.workflow = None;
        state.job = None;
        state.task = None;
        state.log = None;
    }

    fn read(&self) -> RwLockReadGuard<'_, PointerState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PointerState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the pointer when a run exits, whichever way it exits.
pub(crate) struct PointerGuard {
    pointer: ExecutionPointer,
}

impl Drop for PointerGuard {
    fn drop(&mut self) {
        self.pointer.clear();
    }
}
