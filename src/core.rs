use camino::Utf8PathBuf;
use chrono::NaiveDate;
use semver::Version;
use tracing::Span;

use crate::adapter::TestReport;
use crate::config::{Config, Project};
use crate::error::PackageError;
use crate::package::{BumpPolicy, Package};
use crate::store::{ArtifactStore, Loc};

/// A 32-byte BLAKE3 hash used for change detection.
///
/// Every committed artifact is recorded with the digest of its bytes, which
/// makes reproducibility checks a comparison of two hashes. The watcher uses
/// the same digest to tell a real edit apart from a touched file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn hash_file(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        Ok(blake3::Hasher::new().update_mmap(path)?.finalize().into())
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in &self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// What happened so far in a session, as far as later steps care.
#[derive(Debug, Clone, Default)]
pub struct Outcome {
    /// Result of the latest test run, if any ran.
    pub tests: Option<TestReport>,
    /// Version before the bump, when a bump happened.
    pub bumped_from: Option<Version>,
    /// Whether the release commit was recorded.
    pub committed: bool,
    /// Name of the tag created by the mark step.
    pub tag: Option<String>,
}

/// State shared by every task of one pipeline run.
///
/// Nothing here is global: the project root, the package record, the date
/// printed in banners and the requested bump level all travel with the
/// session, so several sessions can coexist.
#[derive(Debug)]
pub struct Session {
    pub project: Project,
    pub package: Package,
    pub store: ArtifactStore,
    /// Date printed in banners.
    pub date: NaiveDate,
    pub bump: BumpPolicy,
    pub outcome: Outcome,
}

impl Session {
    /// Opens a session over `project`, reading its package descriptor.
    pub fn open(project: Project, bump: BumpPolicy, date: NaiveDate) -> Result<Self, PackageError> {
        let package = Package::load(project.path(&project.config.layout.package))?;
        let store = ArtifactStore::new(&project);

        Ok(Self {
            project,
            package,
            store,
            date,
            bump,
            outcome: Outcome::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.project.config
    }

    pub fn version(&self) -> &Version {
        self.package.version()
    }

    /// Banner for the current version and the session date.
    pub fn banner(&self) -> String {
        crate::banner::render(&self.config().banner, self.version(), self.date)
    }

    pub fn resolve(&self, loc: &Loc) -> Utf8PathBuf {
        self.store.resolve(loc)
    }
}

/// Handed to a task action while it runs.
pub struct TaskContext<'a> {
    /// Name the task is registered under.
    pub name: &'a str,
    pub session: &'a mut Session,
    /// The tracing span of this task, useful for progress reporting.
    pub span: Span,
}

impl TaskContext<'_> {
    pub fn config(&self) -> &Config {
        self.session.config()
    }
}
