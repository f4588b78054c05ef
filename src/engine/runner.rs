use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::core::{Session, TaskContext};
use crate::engine::{Diagnostics, Kind, Plan, Registry, TaskExecution};
use crate::error::RunError;
use crate::utils::{as_overhead, get_style_run, get_style_task};

/// Executes the primitive tasks of `plan` one after another.
///
/// The first failure stops the run. Nothing is rolled back: artifacts and
/// side effects of the tasks that completed stay in place, and their names
/// are carried by the returned error.
pub(crate) fn run_plan(
    registry: &Registry,
    plan: &Plan,
    session: &mut Session,
) -> Result<Diagnostics, RunError> {
    let steps: Vec<_> = plan
        .tasks(registry)
        .filter(|task| !task.is_composite())
        .collect();

    let mut diagnostics = Diagnostics::default();

    if steps.is_empty() {
        return Ok(diagnostics);
    }

    let root_span = tracing::span!(Level::INFO, "running_tasks");
    root_span.pb_set_length(steps.len() as u64);
    root_span.pb_set_style(&get_style_run());
    root_span.pb_set_message(&format!("Running {}...", plan.targets.join(" ")));
    let _enter = root_span.enter();

    let pb_style = get_style_task();

    for task in steps {
        let Kind::Primitive(action) = &task.kind else {
            continue;
        };

        let span = tracing::span!(Level::INFO, "task", name = task.name());
        span.pb_set_style(&pb_style);
        span.pb_set_message(&format!("Running {}", task.name()));
        let _enter = span.enter();

        let start = Instant::now();

        let mut cx = TaskContext {
            name: task.name(),
            session: &mut *session,
            span: span.clone(),
        };

        let result = match catch_unwind(AssertUnwindSafe(|| action.run(&mut cx))) {
            Ok(result) => result,
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    format!("Task panicked: {s}")
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    format!("Task panicked: {s}")
                } else {
                    String::from("Task panicked with unknown payload")
                };

                Err(anyhow::anyhow!(msg))
            }
        };

        let duration = start.elapsed();

        if let Err(error) = result {
            tracing::error!("{} failed {}", task.name(), as_overhead(start));
            return Err(RunError {
                task: task.name().to_string(),
                completed: diagnostics.completed,
                error,
            });
        }

        tracing::info!("finished {} {}", task.name(), as_overhead(start));

        diagnostics.completed.push(task.name().to_string());
        diagnostics
            .execution_times
            .insert(task.name().to_string(), TaskExecution { start, duration });
        root_span.pb_inc(1);
    }

    tracing::info!("Run complete!");
    Ok(diagnostics)
}
