use camino::Utf8PathBuf;
#[cfg(feature = "live")]
use std::sync::mpsc::RecvError;

pub use anyhow::Error as RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KilnError {
    #[error("Error while loading the configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Error while reading the package descriptor:\n{0}")]
    Package(#[from] PackageError),

    #[error("Invalid task graph:\n{0}")]
    Plan(#[from] PlanError),

    #[error("{0}")]
    Run(#[from] RunError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[cfg(feature = "logging")]
    #[error("Couldn't initialize logging: {0}")]
    Logging(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse config file '{0}'.\n{1}")]
    Parse(Utf8PathBuf, toml::de::Error),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Project root '{0}' doesn't exist.\n{1}")]
    Root(Utf8PathBuf, std::io::Error),
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Couldn't read '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't write '{0}'.\n{1}")]
    Write(Utf8PathBuf, StoreError),

    #[error("Malformed package descriptor '{0}'.\n{1}")]
    Json(Utf8PathBuf, serde_json::Error),

    #[error("Package descriptor '{0}' has no string field '{1}'")]
    MissingField(Utf8PathBuf, &'static str),

    #[error(transparent)]
    Version(#[from] VersionError),
}

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Invalid version '{0}': {1}")]
    Parse(String, semver::Error),

    #[error("Unknown bump level '{0}', expected patch, minor, major or an explicit version")]
    Level(String),

    #[error("Version {next} is not greater than the current version {current}")]
    NotIncreasing {
        current: semver::Version,
        next: semver::Version,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on '{0}': {1}")]
    Io(Utf8PathBuf, std::io::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Nothing matched '{0}'")]
    NoMatch(String),

    #[cfg(feature = "scss")]
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Couldn't start '{tool}': {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("'{tool}' failed with {status}:\n{stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Input file '{0}' doesn't exist")]
    MissingInput(Utf8PathBuf),

    #[error("Lint violations reported by '{tool}':\n{report}")]
    Lint { tool: String, report: String },

    #[error("IO error on '{0}': {1}")]
    Io(Utf8PathBuf, std::io::Error),

    #[error("Malformed inline source map: {0}")]
    InlineMap(String),

    #[error("Couldn't serialize tool configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Task '{0}' is registered twice")]
    Duplicate(String),

    #[error("Unknown task '{name}' (required by {required_by})")]
    Unknown { name: String, required_by: String },

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),
}

/// A failed run. Tasks listed in `completed` finished before the failure and
/// their artifacts and side effects are left in place.
#[derive(Debug, Error)]
#[error("Task '{task}' failed after {} completed task(s):\n{error:#}", .completed.len())]
pub struct RunError {
    pub task: String,
    pub completed: Vec<String>,
    pub error: anyhow::Error,
}

/// One or more test cases failed in the executed test bundle.
#[derive(Debug, Error)]
#[error("{} of {total} test case(s) failed:\n{}", .failed.len(), .failed.join("\n"))]
pub struct TestFailure {
    pub total: usize,
    pub failed: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Refusing to commit: the test run in this session failed ({0} failing case(s))")]
    TestsFailed(usize),

    #[error("Refusing to commit: no test run recorded in this session")]
    TestsMissing,

    #[error("Version control error: {0}")]
    Vcs(#[source] AdapterError),

    #[error("Publishing failed: {0}")]
    Publish(#[source] AdapterError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error("Couldn't resolve watch path '{0}': {1}")]
    Resolve(String, anyhow::Error),

    #[error(transparent)]
    Kiln(#[from] Box<KilnError>),
}
