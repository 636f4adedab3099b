// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides call recorders and a builder for assembling test workflows

#![allow(dead_code)]

use anyhow::anyhow;
use std::cell::RefCell;
use std::rc::Rc;

use taskweave::{Dependence, Job, Task, TaskContext, TaskRef, Workflow};

/// Shared log of hook invocations, in call order.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn push(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    /// Task whose setup, callback and teardown all log themselves.
    pub fn task(&self, name: &str) -> Task {
        let setup = self.clone();
        let callback = self.clone();
        let teardown = self.clone();
        let (setup_name, callback_name, teardown_name) = (
            format!("{}:setup", name),
            name.to_string(),
            format!("{}:teardown", name),
        );

        Task::new(name, move |_: &mut TaskContext| {
            callback.push(callback_name.clone());
            Ok(())
        })
        .with_setup(move |_: &mut TaskContext| {
            setup.push(setup_name.clone());
            Ok(())
        })
        .with_teardown(move |_: &mut TaskContext| {
            teardown.push(teardown_name.clone());
            Ok(())
        })
    }

    /// Task whose callback logs itself and then fails.
    pub fn failing_task(&self, name: &str, message: &'static str) -> Task {
        let callback = self.clone();
        let callback_name = name.to_string();

        Task::new(name, move |_: &mut TaskContext| {
            callback.push(callback_name.clone());
            Err(anyhow!(message))
        })
    }

    /// Callback invocations only, without setup/teardown entries.
    pub fn callbacks(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.contains(':'))
            .collect()
    }
}

pub fn noop(name: &str) -> Task {
    Task::new(name, |_: &mut TaskContext| Ok(()))
}

pub struct TestWorkflowBuilder {
    name: String,
    jobs: Vec<Job>,
    dependence: Dependence,
}

impl TestWorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            jobs: Vec::new(),
            dependence: Dependence::new(),
        }
    }

    pub fn with_job(mut self, name: &str, tasks: Vec<Task>) -> Self {
        let job = Job::new(name)
            .with_tasks(tasks)
            .expect("test job has duplicate task names");
        self.jobs.push(job);
        self
    }

    pub fn with_dependency(
        mut self,
        parent: impl Into<TaskRef>,
        child: impl Into<TaskRef>,
    ) -> Self {
        self.dependence.add(parent, child);
        self
    }

    pub fn build(self) -> Workflow {
        let workflow = Workflow::new(self.name)
            .with_jobs(self.jobs)
            .expect("test workflow has duplicate job names");

        if self.dependence.is_empty() {
            workflow
        } else {
            workflow.with_dependence(self.dependence)
        }
    }
}
