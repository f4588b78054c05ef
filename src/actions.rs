//! Built-in task actions.
//!
//! Each action reads its inputs through the session, so every path is
//! resolved against the project root and every output goes through the
//! artifact store.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

use crate::adapter::{Adapter, Job, Linter, Options, TestRunner};
use crate::assemble::assemble_files;
use crate::core::TaskContext;
use crate::engine::Action;
use crate::error::TestFailure;
use crate::store::{Loc, Role};
use crate::utils::as_overhead;

/// Runs an adapter over a set of inputs and commits its output.
pub struct Invoke {
    pub adapter: Arc<dyn Adapter>,
    pub inputs: Vec<Loc>,
    pub output: Loc,
    pub options: Options,
    /// Prefix the output with the session banner.
    pub banner: bool,
}

impl Action for Invoke {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let s = Instant::now();
        let session = &mut *cx.session;

        let inputs: Vec<Utf8PathBuf> = self.inputs.iter().map(|i| session.resolve(i)).collect();
        let output = session.resolve(&self.output);
        let scratch = session.store.scratch();

        let mut options = self.options.clone();
        if self.banner {
            options.banner = Some(session.banner());
        }

        let job = Job {
            inputs: &inputs,
            output: &output,
            options: &options,
            cwd: &session.project.root,
            scratch: &scratch,
        };

        let result = self
            .adapter
            .transform(&job)
            .with_context(|| format!("{} couldn't produce {}", self.adapter.name(), self.output.path))?;

        let artifact = session.store.commit(
            cx.name,
            &self.output,
            &result.code,
            result.map.as_deref(),
        )?;

        tracing::info!(
            "{} -> {} {}",
            self.adapter.name(),
            artifact.path,
            as_overhead(s)
        );

        Ok(())
    }

    fn watched(&self) -> Vec<Utf8PathBuf> {
        source_paths(&self.inputs)
    }
}

/// Concatenates the banner and `parts`, in order, into `output`.
pub struct Assemble {
    pub parts: Vec<Loc>,
    pub output: Loc,
}

impl Action for Assemble {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let s = Instant::now();
        let session = &mut *cx.session;

        let parts: Vec<_> = self.parts.iter().map(|p| session.resolve(p)).collect();
        let bundle = assemble_files(&session.banner(), &parts)?;
        let artifact = session.store.commit(cx.name, &self.output, &bundle, None)?;
        let digest = artifact.digest.to_hex();

        tracing::info!(
            "assembled {} part(s) into {} ({}) {}",
            parts.len(),
            artifact.path,
            &digest[..12],
            as_overhead(s)
        );

        Ok(())
    }

    fn watched(&self) -> Vec<Utf8PathBuf> {
        source_paths(&self.parts)
    }
}

/// Checks the sources matching `patterns` with a linter.
pub struct Lint {
    pub linter: Arc<dyn Linter>,
    pub patterns: Vec<String>,
}

impl Action for Lint {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let session = &*cx.session;

        let files: Vec<_> = session
            .store
            .expand(Role::Source, &self.patterns)?
            .iter()
            .map(|loc| session.resolve(loc))
            .collect();

        self.linter.check(
            &files,
            &session.config().lint,
            &session.store.scratch(),
            &session.project.root,
        )?;

        Ok(())
    }

    fn watched(&self) -> Vec<Utf8PathBuf> {
        self.patterns.iter().map(Utf8PathBuf::from).collect()
    }
}

/// Runs the test page headless and records the report in the session.
pub struct RunTests {
    pub runner: Arc<dyn TestRunner>,
    pub page: Loc,
}

impl Action for RunTests {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let s = Instant::now();
        let session = &mut *cx.session;

        let page = session.resolve(&self.page);
        let report = self
            .runner
            .run(&page, &session.project.root)
            .with_context(|| format!("{} couldn't run {}", self.runner.name(), self.page.path))?;

        for name in &report.failed {
            tracing::error!("not ok: {name}");
        }

        let total = report.total();
        let failed = report.failed.clone();
        session.outcome.tests = Some(report);

        if failed.is_empty() {
            tracing::info!("{total} test case(s) passed {}", as_overhead(s));
            return Ok(());
        }

        let failure = TestFailure { total, failed };

        if session.config().tests.fatal {
            return Err(failure.into());
        }

        tracing::warn!("{failure}");
        tracing::warn!("test failures are not fatal, but no release commit will follow");
        Ok(())
    }
}

/// Deletes the build and release directories.
pub struct Clean;

impl Action for Clean {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        cx.session.store.clean()?;
        Ok(())
    }
}

/// Copies files between directories, overwriting the destination.
///
/// Sass sources are compiled on the way, the destination then gets a `.css`
/// extension.
pub struct CopySet {
    pub items: Vec<(Loc, Loc)>,
}

impl Action for CopySet {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let s = Instant::now();
        let session = &mut *cx.session;

        for (from, to) in &self.items {
            #[cfg(feature = "scss")]
            if from.path.extension() == Some("scss") {
                let path = session.resolve(from);
                let css = grass::from_path(&path, &grass::Options::default())
                    .map_err(crate::error::StoreError::Sass)?;
                let to = Loc::new(to.role, to.path.with_extension("css"));
                session.store.commit(cx.name, &to, css.as_bytes(), None)?;
                tracing::debug!("compiled {} -> {}", from.path, to.path);
                continue;
            }

            session
                .store
                .copy(cx.name, from, to)
                .with_context(|| format!("couldn't copy {}", from.path))?;
            tracing::debug!("copied {} -> {}", from.path, to.path);
        }

        tracing::info!("copied {} file(s) {}", self.items.len(), as_overhead(s));
        Ok(())
    }

    fn watched(&self) -> Vec<Utf8PathBuf> {
        self.items
            .iter()
            .map(|(from, _)| from)
            .filter(|loc| loc.role == Role::Source)
            .map(|loc| loc.path.clone())
            .collect()
    }
}

fn source_paths(locs: &[Loc]) -> Vec<Utf8PathBuf> {
    locs.iter()
        .filter(|loc| loc.role == Role::Source)
        .map(|loc| loc.path.clone())
        .collect()
}

/// Relative display path, falls back to the absolute one.
pub(crate) fn relative<'a>(root: &Utf8Path, path: &'a Utf8Path) -> &'a Utf8Path {
    path.strip_prefix(root).unwrap_or(path)
}
