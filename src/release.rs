//! The release steps: bump, commit and mark released.
//!
//! Bump, commit, tag and push are not idempotent. None of them is rolled
//! back when a later step fails, so once the version has been bumped every
//! release error says so.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

use crate::actions::relative;
use crate::adapter::Tool;
use crate::core::{Session, TaskContext};
use crate::engine::Action;
use crate::error::{AdapterError, ReleaseError, StoreError};
use crate::store::Role;
use crate::utils::as_overhead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The paths had no changes, no commit was created.
    NothingToCommit,
}

/// Version control, as far as releasing goes.
pub trait Vcs: Send + Sync {
    fn name(&self) -> &str;

    /// Records `paths` in one commit with `message`. An empty change set is
    /// not an error.
    fn commit(
        &self,
        root: &Utf8Path,
        paths: &[Utf8PathBuf],
        message: &str,
    ) -> Result<CommitOutcome, AdapterError>;

    /// Creates an annotated tag on the current commit.
    fn tag(&self, root: &Utf8Path, name: &str, message: &str) -> Result<(), AdapterError>;

    /// Pushes the current branch and `tag` to the default remote.
    fn push(&self, root: &Utf8Path, tag: Option<&str>) -> Result<(), AdapterError>;
}

pub struct Git {
    tool: Tool,
}

impl Git {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    fn git(
        &self,
        root: &Utf8Path,
        args: &[&str],
        paths: &[Utf8PathBuf],
    ) -> Result<Vec<u8>, AdapterError> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string())
            .chain(paths.iter().map(|p| p.to_string()))
            .collect();
        self.tool.stdout(&args, root)
    }
}

impl Vcs for Git {
    fn name(&self) -> &str {
        "git"
    }

    fn commit(
        &self,
        root: &Utf8Path,
        paths: &[Utf8PathBuf],
        message: &str,
    ) -> Result<CommitOutcome, AdapterError> {
        self.git(root, &["add", "--"], paths)?;

        let args: Vec<String> = ["diff", "--cached", "--quiet", "--"]
            .iter()
            .map(|a| a.to_string())
            .chain(paths.iter().map(|p| p.to_string()))
            .collect();
        let diff = self.tool.run(&args, root)?;

        match diff.status.code() {
            Some(0) => return Ok(CommitOutcome::NothingToCommit),
            Some(1) => {}
            _ => {
                return Err(AdapterError::Failed {
                    tool: "git diff".into(),
                    status: diff.status,
                    stderr: String::from_utf8_lossy(&diff.stderr).trim().to_string(),
                });
            }
        }

        self.git(root, &["commit", "-m", message, "--"], paths)?;
        Ok(CommitOutcome::Committed)
    }

    fn tag(&self, root: &Utf8Path, name: &str, message: &str) -> Result<(), AdapterError> {
        self.git(root, &["tag", "-a", name, "-m", message], &[])?;
        Ok(())
    }

    fn push(&self, root: &Utf8Path, tag: Option<&str>) -> Result<(), AdapterError> {
        self.git(root, &["push"], &[])?;
        if let Some(tag) = tag {
            self.git(root, &["push", "origin", tag], &[])?;
        }
        Ok(())
    }
}

/// Writes the next version into the package descriptor.
pub struct Bump;

impl Action for Bump {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let session = &mut *cx.session;
        let policy = session.bump.clone();

        let previous = session
            .package
            .bump(&policy)
            .with_context(|| format!("couldn't bump {} ({policy})", session.package.name()))?;

        tracing::info!(
            "bumped {} from {previous} to {}",
            session.package.name(),
            session.package.version()
        );

        if session.outcome.bumped_from.is_none() {
            session.outcome.bumped_from = Some(previous);
        }

        Ok(())
    }
}

/// Records the staged release files and the package descriptor in one
/// commit.
///
/// Refuses to run after a failed test run in the same session, and, unless
/// disabled, when no test ran at all.
pub struct Commit {
    pub vcs: Arc<dyn Vcs>,
}

impl Action for Commit {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let s = Instant::now();
        let session = &mut *cx.session;

        let result = commit(&*self.vcs, session);
        let outcome = with_bump_note(session, result)?;

        match outcome {
            CommitOutcome::Committed => {
                session.outcome.committed = true;
                tracing::info!("committed release {} {}", session.version(), as_overhead(s));
            }
            CommitOutcome::NothingToCommit => {
                tracing::warn!("nothing changed since the last release commit, skipping");
            }
        }

        Ok(())
    }
}

fn commit(vcs: &dyn Vcs, session: &Session) -> Result<CommitOutcome, ReleaseError> {
    match &session.outcome.tests {
        Some(report) if !report.is_success() => {
            return Err(ReleaseError::TestsFailed(report.failed.len()));
        }
        None if session.config().release.require_tests => return Err(ReleaseError::TestsMissing),
        Some(report) if report.total() == 0 && session.config().release.require_tests => {
            return Err(ReleaseError::TestsMissing);
        }
        _ => {}
    }

    let release = &session.config().release;
    let root = &session.project.root;

    let mut paths = Vec::new();
    for pattern in &release.commit {
        match session.store.expand(Role::Release, std::slice::from_ref(pattern)) {
            Ok(locs) => paths.extend(locs.iter().map(|loc| session.resolve(loc))),
            Err(StoreError::NoMatch(pattern)) => tracing::debug!("nothing matches {pattern}"),
            Err(e) => return Err(e.into()),
        }
    }
    paths.push(session.package.path().to_owned());

    for path in &paths {
        tracing::debug!("recording {}", relative(root, path));
    }

    let message = release
        .message
        .replace("{version}", &session.version().to_string());

    vcs.commit(root, &paths, &message).map_err(ReleaseError::Vcs)
}

/// Tags the release and, when configured, pushes it and publishes the
/// package. Never bumps or commits again.
pub struct MarkReleased {
    pub vcs: Arc<dyn Vcs>,
}

impl Action for MarkReleased {
    fn run(&self, cx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let s = Instant::now();
        let session = &mut *cx.session;

        let result = mark(&*self.vcs, session);
        let tag = with_bump_note(session, result)?;

        tracing::info!("released {} {}", session.version(), as_overhead(s));
        if tag.is_some() {
            session.outcome.tag = tag;
        }

        Ok(())
    }
}

fn mark(vcs: &dyn Vcs, session: &Session) -> Result<Option<String>, ReleaseError> {
    let release = &session.config().release;
    let root = &session.project.root;
    let version = session.version();

    let tag = if release.tag {
        let name = format!("{}{version}", release.tag_prefix);
        vcs.tag(root, &name, &format!("Release {version}"))
            .map_err(ReleaseError::Vcs)?;
        tracing::info!("tagged {name}");
        Some(name)
    } else {
        None
    };

    if release.push {
        vcs.push(root, tag.as_deref()).map_err(ReleaseError::Vcs)?;
        tracing::info!("pushed to the default remote");
    }

    if let Some(command) = &release.publish {
        Tool::new(command)
            .stdout(&[], root)
            .map_err(ReleaseError::Publish)?;
        tracing::info!("published {} {version}", session.package.name());
    }

    Ok(tag)
}

/// Mentions the persisted bump in a release error, so the operator knows the
/// descriptor already carries the new version.
fn with_bump_note<T>(session: &Session, result: Result<T, ReleaseError>) -> anyhow::Result<T> {
    match (&session.outcome.bumped_from, result) {
        (_, Ok(value)) => Ok(value),
        (Some(previous), Err(e)) => Err(anyhow::Error::new(e).context(format!(
            "{} was already bumped from {previous} to {} and left that way",
            session.package.path(),
            session.version()
        ))),
        (None, Err(e)) => Err(e.into()),
    }
}
