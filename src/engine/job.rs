// ABOUTME: Named, ordered sequence of tasks within a workflow
// ABOUTME: Job state is derived on demand from the states of its member tasks

use serde_json::Value;

use super::collection::{ElementMut, TaskList};
use super::error::Result;
use super::result::{JobState, JobStatus, TaskStatus};
use super::task::{Task, TaskId};
use crate::params::{self, Kwargs, Params};

#[derive(Debug)]
pub struct Job {
    name: String,
    tasks: TaskList,
    params: Kwargs,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: TaskList::new(),
            params: Kwargs::new(),
        }
    }

    /// Build a job whose keyword arguments must satisfy `P`.
    ///
    /// Fails with `MissingParameters` naming every absent field.
    pub fn with_params<P: Params>(name: impl Into<String>, kwargs: Value) -> Result<Self> {
        let name = name.into();
        let kwargs = params::kwargs(&name, kwargs)?;
        params::bind::<P>(&name, &kwargs)?;

        Ok(Self {
            name,
            tasks: TaskList::new(),
            params: kwargs,
        })
    }

    pub fn with_task(mut self, task: Task) -> Result<Self> {
        self.tasks.push(task)?;
        Ok(self)
    }

    pub fn with_tasks<I>(mut self, tasks: I) -> Result<Self>
    where
        I: IntoIterator<Item = Task>,
    {
        self.tasks.extend(tasks)?;
        Ok(self)
    }

    pub fn add_task(&mut self, task: Task) -> Result<()> {
        self.tasks.push(task)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut TaskList {
        &mut self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.by_name(name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<ElementMut<'_, Task>> {
        self.tasks.by_name_mut(name)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|task| task.id() == id)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Typed view of the bound keyword arguments.
    pub fn params<P: Params>(&self) -> Result<P> {
        params::bind(&self.name, &self.params)
    }

    pub fn state(&self) -> JobState {
        JobState::aggregate(self.tasks.iter().map(Task::state))
    }

    /// Flag every task to be skipped. Tasks that already ran are unaffected.
    pub fn skip_all(&mut self) {
        for mut task in self.tasks.iter_mut() {
            task.set_skip(true);
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            name: self.name.clone(),
            state: self.state(),
            tasks: self
                .tasks
                .iter()
                .map(|task| TaskStatus {
                    name: task.name().to_string(),
                    state: task.state(),
                    error: task.err_info().map(ToString::to_string),
                })
                .collect(),
        }
    }
}
