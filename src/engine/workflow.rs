// ABOUTME: Workflow orchestrator owning jobs and explicit cross-job dependencies
// ABOUTME: Validates the task graph and runs tasks one at a time in deterministic order

use serde_json::Value;
use tracing::{debug, error, info, info_span, instrument};

use super::attribution::{ExecutionPointer, OutputLog, OutputStore};
use super::collection::{ElementMut, JobList};
use super::context::TaskContext;
use super::dependency::{Dependence, ExecutionPlan, TaskGraph, TaskRef};
use super::error::{EngineError, Result};
use super::job::Job;
use super::result::{TaskState, WorkflowState, WorkflowStatus};
use super::task::{Task, TaskError};
use crate::params::{self, Kwargs, Params};

#[derive(Debug)]
pub struct Workflow {
    name: String,
    jobs: JobList,
    dependence: Option<Dependence>,
    params: Kwargs,
    state: WorkflowState,
    context: Option<TaskContext>,
    pointer: ExecutionPointer,
    outputs: OutputLog,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: JobList::new(),
            dependence: None,
            params: Kwargs::new(),
            state: WorkflowState::Pending,
            context: None,
            pointer: ExecutionPointer::new(),
            outputs: OutputLog::default(),
        }
    }

    /// Build a workflow whose keyword arguments must satisfy `P`.
    pub fn with_params<P: Params>(name: impl Into<String>, kwargs: Value) -> Result<Self> {
        let mut workflow = Self::new(name);
        let kwargs = params::kwargs(&workflow.name, kwargs)?;
        params::bind::<P>(&workflow.name, &kwargs)?;
        workflow.params = kwargs;
        Ok(workflow)
    }

    pub fn with_job(mut self, job: Job) -> Result<Self> {
        self.jobs.push(job)?;
        Ok(self)
    }

    pub fn with_jobs<I>(mut self, jobs: I) -> Result<Self>
    where
        I: IntoIterator<Item = Job>,
    {
        self.jobs.extend(jobs)?;
        Ok(self)
    }

    pub fn with_dependence(mut self, dependence: Dependence) -> Self {
        self.dependence = Some(dependence);
        self
    }

    /// Share an execution pointer with instrumentation created elsewhere.
    pub fn with_pointer(mut self, pointer: ExecutionPointer) -> Self {
        self.pointer = pointer;
        self
    }

    pub fn add_job(&mut self, job: Job) -> Result<()> {
        self.jobs.push(job)
    }

    pub fn set_dependence(&mut self, dependence: Option<Dependence>) {
        self.dependence = dependence;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn jobs(&self) -> &JobList {
        &self.jobs
    }

    pub fn jobs_mut(&mut self) -> &mut JobList {
        &mut self.jobs
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.by_name(name)
    }

    pub fn job_mut(&mut self, name: &str) -> Option<ElementMut<'_, Job>> {
        self.jobs.by_name_mut(name)
    }

    pub fn dependence(&self) -> Option<&Dependence> {
        self.dependence.as_ref()
    }

    /// Find a task by id or alias. Ambiguous bare names yield `None`.
    pub fn task(&self, reference: impl Into<TaskRef>) -> Option<&Task> {
        let (job_index, task_index) = self.locate(&reference.into())?;
        self.jobs.get(job_index)?.tasks().get(task_index)
    }

    pub fn task_mut(&mut self, reference: impl Into<TaskRef>) -> Option<ElementMut<'_, Task>> {
        let (job_index, task_index) = self.locate(&reference.into())?;
        self.jobs
            .slot_mut(job_index)?
            .tasks_mut()
            .get_mut(task_index)
    }

    /// Context of the in-progress or most recent run.
    pub fn context(&self) -> Option<&TaskContext> {
        self.context.as_ref()
    }

    pub fn pointer(&self) -> &ExecutionPointer {
        &self.pointer
    }

    /// Output recorded through the pointer while this workflow ran, keyed
    /// by job then task.
    pub fn outputs(&self) -> OutputStore {
        self.outputs.snapshot()
    }

    pub fn outputs_for(&self, job: &str, task: &str) -> Vec<String> {
        self.outputs.for_task(job, task)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn params<P: Params>(&self) -> Result<P> {
        params::bind(&self.name, &self.params)
    }

    /// Validate the graph and return the order `run` would follow.
    pub fn plan(&self) -> Result<ExecutionPlan> {
        TaskGraph::build(&self.name, &self.jobs, self.dependence.as_ref())?.create_execution_plan()
    }

    /// Run every task once, in dependency order, stopping at the first
    /// failed task.
    ///
    /// A task failure is reported through the returned state, the task's
    /// `err_info` and [`Workflow::status`]. Structural problems (empty job,
    /// cycle, unknown reference, task not pending) abort with an error.
    #[instrument(skip(self), fields(workflow = %self.name))]
    pub fn run(&mut self) -> Result<WorkflowState> {
        let _pointer = self.pointer.enter_workflow(&self.name, &self.outputs);
        let context = TaskContext::new();
        info!(
            "Starting workflow execution: {} (run_id: {})",
            self.name,
            context.run_id()
        );

        self.context = Some(context);
        self.state = WorkflowState::InProgress;

        match self.execute() {
            Ok(state) => {
                self.state = state;
                info!("Workflow {} finished with state {}", self.name, state);
                Ok(state)
            }
            Err(err) => {
                self.state = WorkflowState::Failure;
                error!("Workflow {} aborted: {}", self.name, err);
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<WorkflowState> {
        let plan = self.plan()?;
        debug!(
            "Execution plan: {} tasks, order {:?}",
            plan.total_tasks,
            plan.labels()
        );

        let mut context = self.context.take().unwrap_or_default();
        let outcome = self.execute_plan(&plan, &mut context);
        self.context = Some(context);
        outcome
    }

    fn execute_plan(
        &mut self,
        plan: &ExecutionPlan,
        context: &mut TaskContext,
    ) -> Result<WorkflowState> {
        for (index, node) in plan.order.iter().enumerate() {
            let missing = || EngineError::UnknownTask {
                reference: node.label(),
            };
            let job = self.jobs.slot_mut(node.job_index).ok_or_else(missing)?;
            let job_name = job.name().to_string();
            let task = job
                .tasks_mut()
                .slot_mut(node.task_index)
                .ok_or_else(missing)?;

            if task.state() != TaskState::Pending {
                return Err(EngineError::InvalidState {
                    task: task.name().to_string(),
                    state: task.state(),
                });
            }

            context.set_position(&self.name, &job_name, task.name());
            self.pointer.enter_task(&job_name, task.name());

            let span = info_span!(
                "task",
                workflow = %self.name,
                job = %job_name,
                task = %task.name()
            );
            let _entered = span.enter();

            info!(
                "=== {}/{}/{} - {}/{}",
                self.name,
                job_name,
                task.name(),
                index + 1,
                plan.total_tasks
            );
            task.run(context)?;
            info!("=== {}", task.state());

            if task.state() == TaskState::Failure {
                let description = task
                    .err_info()
                    .map(TaskError::describe)
                    .unwrap_or_default();
                error!(
                    "Task {} in job {} failed, stopping workflow: {}",
                    task.name(),
                    job_name,
                    description
                );
                return Ok(WorkflowState::Failure);
            }
        }

        Ok(WorkflowState::Success)
    }

    /// Read-only snapshot of the workflow, its jobs and their tasks.
    pub fn status(&self) -> WorkflowStatus {
        WorkflowStatus {
            name: self.name.clone(),
            state: self.state,
            jobs: self.jobs.iter().map(Job::status).collect(),
        }
    }

    fn locate(&self, reference: &TaskRef) -> Option<(usize, usize)> {
        let mut found = self
            .jobs
            .iter()
            .enumerate()
            .flat_map(|(job_index, job)| {
                job.tasks()
                    .iter()
                    .enumerate()
                    .map(move |(task_index, task)| (job_index, task_index, job, task))
            })
            .filter(|(_, _, job, task)| match reference {
                TaskRef::Id(id) => task.id() == *id,
                TaskRef::Name(name) => task.name() == name,
                TaskRef::Qualified {
                    job: job_name,
                    task: task_name,
                } => job.name() == job_name && task.name() == task_name,
            });

        let (job_index, task_index, _, _) = found.next()?;
        if found.next().is_some() {
            return None;
        }
        Some((job_index, task_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde::Deserialize;
    use serde_json::json;

    fn ok(name: &str) -> Task {
        Task::new(name, |_: &mut TaskContext| Ok(()))
    }

    fn job(name: &str, tasks: Vec<Task>) -> Job {
        Job::new(name).with_tasks(tasks).unwrap()
    }

    #[test]
    fn test_run_records_positions_in_context() {
        let observed = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = std::rc::Rc::clone(&observed);
        let observer = Task::new("observer", move |context: &mut TaskContext| {
            sink.borrow_mut().push((
                context.workflow_name().map(String::from),
                context.job_name().map(String::from),
                context.task_name().map(String::from),
            ));
            Ok(())
        });

        let mut workflow = Workflow::new("nightly")
            .with_job(job("extract", vec![observer]))
            .unwrap();

        assert_eq!(workflow.run().unwrap(), WorkflowState::Success);
        assert_eq!(
            *observed.borrow(),
            vec![(
                Some("nightly".to_string()),
                Some("extract".to_string()),
                Some("observer".to_string())
            )]
        );
        assert_eq!(workflow.context().unwrap().data.history(), ["observer"]);
        assert!(!workflow.pointer().is_active());
    }

    #[test]
    fn test_failure_stops_remaining_tasks() {
        let mut workflow = Workflow::new("nightly")
            .with_jobs([
                job(
                    "a",
                    vec![
                        ok("a1"),
                        Task::new("a2", |_: &mut TaskContext| Err(anyhow!("disk full"))),
                    ],
                ),
                job("b", vec![ok("b1")]),
            ])
            .unwrap();

        let state = workflow.run().unwrap();

        assert_eq!(state, WorkflowState::Failure);
        assert_eq!(workflow.state(), WorkflowState::Failure);
        assert_eq!(workflow.task("a1").unwrap().state(), TaskState::Success);
        assert_eq!(workflow.task("a2").unwrap().state(), TaskState::Failure);
        assert_eq!(workflow.task("b1").unwrap().state(), TaskState::Pending);
        assert_eq!(workflow.context().unwrap().data.history(), ["a1", "a2"]);
    }

    #[test]
    fn test_structural_error_aborts_before_any_task() {
        let mut workflow = Workflow::new("nightly")
            .with_jobs([job("a", vec![ok("a1")]), Job::new("empty")])
            .unwrap();

        assert!(matches!(workflow.run(), Err(EngineError::EmptyJob { .. })));
        assert_eq!(workflow.state(), WorkflowState::Failure);
        assert_eq!(workflow.task("a1").unwrap().state(), TaskState::Pending);
        assert!(!workflow.pointer().is_active());
    }

    #[test]
    fn test_second_run_is_rejected() {
        let mut workflow = Workflow::new("nightly")
            .with_job(job("a", vec![ok("a1")]))
            .unwrap();

        workflow.run().unwrap();
        assert!(matches!(
            workflow.run(),
            Err(EngineError::InvalidState { task, state: TaskState::Success }) if task == "a1"
        ));
        assert!(workflow.context().unwrap().data.history().is_empty());
    }

    #[test]
    fn test_task_lookup() {
        let mut workflow = Workflow::new("nightly")
            .with_jobs([job("a", vec![ok("x")]), job("b", vec![ok("x"), ok("y")])])
            .unwrap();

        assert!(workflow.task("x").is_none());
        assert!(workflow.task("y").is_some());
        assert!(workflow.task(TaskRef::qualified("b", "x")).is_some());

        let id = workflow.job("a").unwrap().task("x").unwrap().id();
        workflow.task_mut(id).unwrap().set_skip(true);
        assert!(workflow.task(TaskRef::qualified("a", "x")).unwrap().skip());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_run_reports_progress_per_task() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();

        let mut workflow = Workflow::new("nightly")
            .with_jobs([
                job("a", vec![ok("a1").with_skip(true), ok("a2")]),
                job("b", vec![ok("b1")]),
            ])
            .unwrap();
        tracing::subscriber::with_default(subscriber, || workflow.run()).unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("=== nightly/a/a1 - 1/3"));
        assert!(output.contains("=== SKIPPED"));
        assert!(output.contains("=== nightly/a/a2 - 2/3"));
        assert!(output.contains("=== nightly/b/b1 - 3/3"));
        assert_eq!(output.matches("=== SUCCESS").count(), 2);
    }

    #[test]
    fn test_workflows_sharing_a_pointer_keep_separate_outputs() {
        let pointer = ExecutionPointer::new();

        let recording = |name: &str, line: &'static str| {
            let log = pointer.clone();
            Task::new(name, move |_: &mut TaskContext| {
                log.record(line);
                Ok(())
            })
        };

        let mut first = Workflow::new("first")
            .with_pointer(pointer.clone())
            .with_job(job("J", vec![recording("T", "from first")]))
            .unwrap();
        let mut second = Workflow::new("second")
            .with_pointer(pointer.clone())
            .with_job(job("J", vec![recording("T", "from second")]))
            .unwrap();

        first.run().unwrap();
        second.run().unwrap();

        assert_eq!(first.outputs_for("J", "T"), vec!["from first"]);
        assert_eq!(second.outputs_for("J", "T"), vec!["from second"]);
        assert_eq!(first.outputs()["J"]["T"].len(), 1);
        assert!(Workflow::new("idle").outputs().is_empty());
    }

    #[derive(Debug, Deserialize)]
    struct NightlyParams {
        region: String,
    }

    impl Params for NightlyParams {
        const FIELDS: &'static [&'static str] = &["region"];
    }

    #[test]
    fn test_workflow_params() {
        let workflow =
            Workflow::with_params::<NightlyParams>("nightly", json!({"region": "eu"})).unwrap();
        assert_eq!(workflow.params::<NightlyParams>().unwrap().region, "eu");
        assert_eq!(workflow.param("region"), Some(&json!("eu")));

        assert!(matches!(
            Workflow::with_params::<NightlyParams>("nightly", json!({"zone": "a"})),
            Err(EngineError::MissingParameters { missing, .. }) if missing == ["region"]
        ));
    }
}
