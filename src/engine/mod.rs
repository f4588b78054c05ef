//! The task graph.
//!
//! Tasks are registered by unique name. A primitive task owns one action, a
//! composite task only groups other tasks. Every task may declare
//! dependencies, which for a composite are its subtasks. Running a target
//! executes the depth-first post-order of its dependencies, each task at most
//! once, strictly one after another.

mod diagnostics;
mod plan;
mod runner;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::core::TaskContext;
use crate::error::PlanError;

pub use diagnostics::{Diagnostics, TaskExecution};
pub use plan::Plan;
pub(crate) use runner::run_plan;

/// The body of a primitive task.
pub trait Action: Send + Sync {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()>;

    /// Source files whose change should rerun this action in watch mode.
    fn watched(&self) -> Vec<Utf8PathBuf> {
        Vec::new()
    }
}

/// Adapts a closure into an [`Action`].
pub(crate) struct FnAction<F>(pub F);

impl<F> Action for FnAction<F>
where
    F: Fn(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        (self.0)(cx)
    }
}

/// Boxes a closure as a task action.
pub fn action<F>(func: F) -> Arc<dyn Action>
where
    F: Fn(&mut TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnAction(func))
}

#[derive(Clone)]
pub enum Kind {
    Primitive(Arc<dyn Action>),
    Composite,
}

#[derive(Clone)]
pub struct Task {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) deps: Vec<String>,
    pub(crate) kind: Kind,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declared dependencies, in declaration order.
    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, Kind::Composite)
    }

    pub fn watched(&self) -> Vec<Utf8PathBuf> {
        match &self.kind {
            Kind::Primitive(action) => action.watched(),
            Kind::Composite => Vec::new(),
        }
    }
}

impl Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .field("composite", &self.is_composite())
            .finish()
    }
}

/// Named tasks in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn insert(&mut self, task: Task) -> Result<(), PlanError> {
        if self.index.contains_key(&task.name) {
            return Err(PlanError::Duplicate(task.name));
        }

        self.index.insert(task.name.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn at(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn composite(name: &str, deps: &[&str]) -> Task {
        Task {
            name: name.into(),
            description: None,
            deps: deps.iter().map(|d| d.to_string()).collect(),
            kind: Kind::Composite,
        }
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = Registry::default();
        registry.insert(composite("build", &[])).unwrap();

        let err = registry.insert(composite("build", &["x"])).unwrap_err();
        assert!(matches!(err, PlanError::Duplicate(name) if name == "build"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("build").unwrap().deps().is_empty());
    }
}
