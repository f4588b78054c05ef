//! The package descriptor and the version it carries.
//!
//! The descriptor is the only durable state owned by the pipeline. It is read
//! once per session, rewritten only by the bump step, and every field other
//! than `version` is kept exactly as found (including key order).

use std::fmt::Display;
use std::fs;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use semver::{Prerelease, Version};
use serde_json::Value;

use crate::error::{PackageError, VersionError};

/// How the next version is derived from the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BumpPolicy {
    Patch,
    Minor,
    Major,
    /// Jump to an explicit version, which must be greater than the current.
    Exact(Version),
}

impl BumpPolicy {
    /// Computes the successor of `current`. The result is always strictly
    /// greater than `current`.
    ///
    /// A pre-release is promoted to its release first, so `1.3.0-rc.1`
    /// bumped with `Minor` gives `1.3.0`, the same way npm does it.
    pub fn apply(&self, current: &Version) -> Result<Version, VersionError> {
        let pre = !current.pre.is_empty();
        let mut next = current.clone();
        next.pre = Prerelease::EMPTY;
        next.build = semver::BuildMetadata::EMPTY;

        match self {
            BumpPolicy::Patch => {
                if !pre {
                    next.patch += 1;
                }
            }
            BumpPolicy::Minor => {
                if !(pre && current.patch == 0) {
                    next.minor += 1;
                    next.patch = 0;
                }
            }
            BumpPolicy::Major => {
                if !(pre && current.patch == 0 && current.minor == 0) {
                    next.major += 1;
                    next.minor = 0;
                    next.patch = 0;
                }
            }
            BumpPolicy::Exact(version) => next = version.clone(),
        }

        if next <= *current {
            return Err(VersionError::NotIncreasing {
                current: current.clone(),
                next,
            });
        }

        Ok(next)
    }
}

impl FromStr for BumpPolicy {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch" => Ok(BumpPolicy::Patch),
            "minor" => Ok(BumpPolicy::Minor),
            "major" => Ok(BumpPolicy::Major),
            other if other.starts_with(|c: char| c.is_ascii_digit()) => Version::parse(other)
                .map(BumpPolicy::Exact)
                .map_err(|e| VersionError::Parse(other.to_string(), e)),
            other => Err(VersionError::Level(other.to_string())),
        }
    }
}

impl Display for BumpPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BumpPolicy::Patch => f.write_str("patch"),
            BumpPolicy::Minor => f.write_str("minor"),
            BumpPolicy::Major => f.write_str("major"),
            BumpPolicy::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// The package metadata record (`package.json`).
#[derive(Debug, Clone)]
pub struct Package {
    path: Utf8PathBuf,
    document: Value,
    name: String,
    version: Version,
}

impl Package {
    pub fn load(path: impl Into<Utf8PathBuf>) -> Result<Self, PackageError> {
        let path = path.into();
        let text = fs::read_to_string(&path).map_err(|e| PackageError::Read(path.clone(), e))?;
        Self::parse(path, &text)
    }

    pub(crate) fn parse(path: Utf8PathBuf, text: &str) -> Result<Self, PackageError> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| PackageError::Json(path.clone(), e))?;

        let name = document
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| PackageError::MissingField(path.clone(), "name"))?
            .to_string();

        let version = document
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| PackageError::MissingField(path.clone(), "version"))?;

        let version =
            Version::parse(version).map_err(|e| VersionError::Parse(version.to_string(), e))?;

        Ok(Self {
            path,
            document,
            name,
            version,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Bumps the version and persists the descriptor. Running this twice
    /// bumps twice. Returns the previous version.
    pub fn bump(&mut self, policy: &BumpPolicy) -> Result<Version, PackageError> {
        let next = policy.apply(&self.version)?;

        let mut document = self.document.clone();
        if let Some(map) = document.as_object_mut() {
            map.insert("version".into(), Value::String(next.to_string()));
        }

        let text = render(&document).map_err(|e| PackageError::Json(self.path.clone(), e))?;
        crate::store::write_atomic(&self.path, text.as_bytes())
            .map_err(|e| PackageError::Write(self.path.clone(), e))?;

        self.document = document;
        Ok(std::mem::replace(&mut self.version, next))
    }
}

fn render(document: &Value) -> serde_json::Result<String> {
    // serde_json's pretty printer indents with two spaces, same as npm.
    let mut text = serde_json::to_string_pretty(document)?;
    text.push('\n');
    Ok(text)
}
