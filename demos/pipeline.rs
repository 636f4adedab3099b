// ABOUTME: Demo pipeline wiring two jobs together with a cross-job dependency
// ABOUTME: Loads configuration, initializes logging, runs the workflow and prints its status

use anyhow::{ensure, Result};
use tracing::info;

use taskweave::{Config, Dependence, ExecutionPointer, Job, Task, TaskContext, Workflow};

fn main() -> Result<()> {
    let config = Config::load(None)?;
    taskweave::logging::init(&config.logging, false)?;
    info!("Starting taskweave v{}", taskweave::VERSION);

    let pointer = ExecutionPointer::new();

    let fetch_log = pointer.clone();
    let fetch = Task::new("fetch", move |context: &mut TaskContext| {
        let readings = vec![12.5, 13.1, 11.8, 14.2];
        fetch_log.record(format!("fetched {} readings", readings.len()));
        context.data.insert("readings", readings);
        Ok(())
    });

    let average = Task::new("average", |context: &mut TaskContext| {
        let readings: Vec<f64> = context.data.get_as("readings")?.unwrap_or_default();
        ensure!(!readings.is_empty(), "no readings to average");
        let mean = readings.iter().sum::<f64>() / readings.len() as f64;
        context.data.insert("mean", mean);
        Ok(())
    });

    let prepare = Task::new("prepare", |context: &mut TaskContext| {
        context.data.insert("report_title", "Daily temperature");
        Ok(())
    });

    let publish_log = pointer.clone();
    let publish = Task::new("publish", move |context: &mut TaskContext| {
        let mean: f64 = context.data.get_as("mean")?.unwrap_or_default();
        publish_log.record(format!("published mean {:.2}", mean));
        Ok(())
    })
    .with_setup(|context: &mut TaskContext| {
        ensure!(
            context.data.contains_key("report_title"),
            "report was not prepared"
        );
        Ok(())
    });

    let mut dependence = Dependence::new();
    dependence.add(&average, &publish);

    let mut workflow = Workflow::new("temperature_report")
        .with_pointer(pointer)
        .with_job(Job::new("report").with_tasks([prepare, publish])?)?
        .with_job(Job::new("ingest").with_tasks([fetch, average])?)?
        .with_dependence(dependence);

    info!("Planned order: {:?}", workflow.plan()?.labels());
    workflow.run()?;

    let status = workflow.status();
    match std::env::args().nth(1).as_deref() {
        Some("yaml") => print!("{}", serde_yaml::to_string(&status)?),
        Some("json") => println!("{}", serde_json::to_string_pretty(&status)?),
        _ => print!("{}", status),
    }

    for (job, tasks) in workflow.outputs() {
        for (task, lines) in tasks {
            for line in lines {
                println!("[{}/{}] {}", job, task, line);
            }
        }
    }

    Ok(())
}
