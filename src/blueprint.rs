use std::collections::BTreeSet;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::core::{Session, TaskContext};
use crate::engine::{Action, Diagnostics, Kind, Plan, Registry, Task, action, run_plan};
use crate::error::{KilnError, PlanError};

/// The blueprint of a pipeline.
///
/// `Blueprint` collects named tasks. A task either runs an action or groups
/// other tasks, and may declare the tasks it has to run after. Names must be
/// unique, a second registration under the same name is rejected.
///
/// Once every task is registered, the blueprint is turned into a
/// [`Pipeline`] to execute targets.
///
/// # Example
///
/// ```rust,no_run
/// use kiln::Blueprint;
///
/// let mut blueprint = Blueprint::new();
/// blueprint
///     .task("hello")
///     .run(|_| {
///         tracing::info!("hello");
///         Ok(())
///     })
///     .unwrap();
/// blueprint.task("default").group(["hello"]).unwrap();
///
/// let pipeline = blueprint.finish();
/// ```
#[derive(Debug, Default)]
pub struct Blueprint {
    pub(crate) registry: Registry,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Pipeline {
        Pipeline {
            registry: self.registry,
        }
    }

    /// Starts the definition of the task called `name`.
    pub fn task(&mut self, name: impl Into<String>) -> TaskDef<'_> {
        TaskDef {
            blueprint: self,
            name: name.into(),
            description: None,
            deps: Vec::new(),
        }
    }

    fn add(&mut self, task: Task) -> Result<(), PlanError> {
        tracing::trace!("registered task {}", task.name());
        self.registry.insert(task)
    }
}

pub struct TaskDef<'a> {
    blueprint: &'a mut Blueprint,
    name: String,
    description: Option<String>,
    deps: Vec<String>,
}

impl TaskDef<'_> {
    /// One line shown by `--list`.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Tasks that have to complete before this one, run in the given order.
    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Registers a primitive task running `callback`.
    pub fn run<F>(self, callback: F) -> Result<(), PlanError>
    where
        F: Fn(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.action(action(callback))
    }

    /// Registers a primitive task running a prepared action.
    pub fn action(self, action: Arc<dyn Action>) -> Result<(), PlanError> {
        self.blueprint.add(Task {
            name: self.name,
            description: self.description,
            deps: self.deps,
            kind: Kind::Primitive(action),
        })
    }

    /// Registers a composite task running `subtasks` in order, after any
    /// dependency declared with [`TaskDef::after`].
    pub fn group<I, S>(mut self, subtasks: I) -> Result<(), PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(subtasks.into_iter().map(Into::into));
        self.blueprint.add(Task {
            name: self.name,
            description: self.description,
            deps: self.deps,
            kind: Kind::Composite,
        })
    }
}

/// A finished set of tasks, ready to run targets against a [`Session`].
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) registry: Registry,
}

impl Pipeline {
    pub fn design() -> Blueprint {
        Blueprint::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.registry.iter()
    }

    /// Resolves the execution order of `targets` without running anything.
    pub fn plan<S: AsRef<str>>(&self, targets: &[S]) -> Result<Plan, PlanError> {
        Plan::new(&self.registry, targets)
    }

    /// Runs `targets` to completion, or up to the first failing task.
    ///
    /// Unknown names and cycles are reported before any task executes.
    pub fn run<S: AsRef<str>>(
        &self,
        session: &mut Session,
        targets: &[S],
    ) -> Result<Diagnostics, KilnError> {
        let plan = self.plan(targets)?;
        tracing::debug!(
            "plan for {}: {}",
            plan.targets().join(" "),
            plan.primitives(&self.registry).join(", ")
        );

        Ok(run_plan(&self.registry, &plan, session)?)
    }

    /// Mermaid diagram of `plan`, with timings when `diagnostics` has them.
    pub fn render_mermaid(&self, plan: &Plan, diagnostics: Option<&Diagnostics>) -> String {
        match diagnostics {
            Some(diagnostics) => diagnostics.render_mermaid(plan, &self.registry),
            None => Diagnostics::default().render_mermaid(plan, &self.registry),
        }
    }

    /// Source files the tasks of `plan` read, relative to the project root.
    pub fn watched(&self, plan: &Plan) -> Vec<Utf8PathBuf> {
        plan.tasks(&self.registry)
            .flat_map(Task::watched)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
