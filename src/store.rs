//! The artifact store.
//!
//! Build outputs are addressed by a directory [`Role`] and a path relative to
//! that directory. Writes go to a scratch file first and are renamed into
//! place, so an artifact is either fully written or left untouched.

use std::collections::BTreeMap;
use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::Hash32;
use crate::config::Project;
use crate::error::StoreError;

/// Directory a location is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// The project root, where the sources live.
    Source,
    Build,
    Release,
    Doc,
}

/// A file addressed by role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loc {
    pub role: Role,
    pub path: Utf8PathBuf,
}

impl Loc {
    pub fn new(role: Role, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            role,
            path: path.into(),
        }
    }

    pub fn source(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(Role::Source, path)
    }

    pub fn build(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(Role::Build, path)
    }

    pub fn release(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(Role::Release, path)
    }

    pub fn doc(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(Role::Doc, path)
    }

    /// Location of the external source map accompanying this file.
    pub fn map(&self) -> Loc {
        Loc::new(self.role, format!("{}.map", self.path))
    }
}

/// Record of a committed artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: Utf8PathBuf,
    pub producer: String,
    pub digest: Hash32,
    pub map: Option<Utf8PathBuf>,
}

#[derive(Debug)]
pub struct ArtifactStore {
    source: Utf8PathBuf,
    build: Utf8PathBuf,
    release: Utf8PathBuf,
    doc: Utf8PathBuf,
    records: BTreeMap<Utf8PathBuf, Artifact>,
}

impl ArtifactStore {
    pub fn new(project: &Project) -> Self {
        Self {
            source: project.root.clone(),
            build: project.build_dir(),
            release: project.release_dir(),
            doc: project.doc_dir(),
            records: BTreeMap::new(),
        }
    }

    pub fn dir(&self, role: Role) -> &Utf8Path {
        match role {
            Role::Source => &self.source,
            Role::Build => &self.build,
            Role::Release => &self.release,
            Role::Doc => &self.doc,
        }
    }

    pub fn resolve(&self, loc: &Loc) -> Utf8PathBuf {
        self.dir(loc.role).join(&loc.path)
    }

    /// Scratch directory for tools that insist on writing files themselves.
    pub fn scratch(&self) -> Utf8PathBuf {
        self.build.join(".scratch")
    }

    /// Artifacts committed during this session, by absolute path.
    pub fn records(&self) -> impl Iterator<Item = &Artifact> {
        self.records.values()
    }

    pub fn get(&self, loc: &Loc) -> Option<&Artifact> {
        self.records.get(&self.resolve(loc))
    }

    /// Writes `code` (and `map` next to it, as `<output>.map`) and records the
    /// artifact. Both files are staged before either is moved into place.
    pub fn commit(
        &mut self,
        producer: &str,
        output: &Loc,
        code: &[u8],
        map: Option<&[u8]>,
    ) -> Result<&Artifact, StoreError> {
        let path = self.resolve(output);
        let map_path = map.map(|_| self.resolve(&output.map()));

        let staged_code = stage(&path, code)?;
        let staged_map = match (&map_path, map) {
            (Some(map_path), Some(map)) => Some((stage(map_path, map)?, map_path.clone())),
            _ => None,
        };

        rename(&staged_code, &path)?;
        if let Some((staged, map_path)) = staged_map {
            rename(&staged, &map_path)?;
        }

        tracing::debug!("wrote {path} ({} bytes)", code.len());

        let artifact = Artifact {
            path: path.clone(),
            producer: producer.to_string(),
            digest: Hash32::hash(code),
            map: map_path,
        };

        self.records.insert(path.clone(), artifact);
        Ok(&self.records[&path])
    }

    /// Copies `from` to `to`, overwriting the destination.
    pub fn copy(&mut self, producer: &str, from: &Loc, to: &Loc) -> Result<&Artifact, StoreError> {
        let src = self.resolve(from);
        let data = fs::read(&src).map_err(|e| StoreError::Io(src.clone(), e))?;
        self.commit(producer, to, &data, None)
    }

    /// Expands glob `patterns` relative to `role`, returning locations in
    /// sorted order. A pattern that matches nothing is an error.
    pub fn expand(&self, role: Role, patterns: &[String]) -> Result<Vec<Loc>, StoreError> {
        let base = self.dir(role);
        let mut found = Vec::new();

        for pattern in patterns {
            let full = base.join(pattern);
            let mut matched = false;

            for entry in glob::glob(full.as_str())? {
                let path = Utf8PathBuf::try_from(entry?)?;
                if !path.is_file() {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(base) {
                    found.push(Loc::new(role, relative));
                    matched = true;
                }
            }

            if !matched {
                return Err(StoreError::NoMatch(full.to_string()));
            }
        }

        found.sort();
        found.dedup();
        Ok(found)
    }

    /// Deletes the build and release directories.
    pub fn clean(&mut self) -> Result<(), StoreError> {
        let s = Instant::now();

        for dir in [&self.build, &self.release] {
            if fs::metadata(dir).is_ok() {
                fs::remove_dir_all(dir).map_err(|e| StoreError::Io(dir.clone(), e))?;
                tracing::info!("removed {dir}");
            }
        }

        self.records.clear();
        tracing::info!("cleaned build outputs {}", crate::utils::as_overhead(s));

        Ok(())
    }
}

/// Writes `data` to `path` through a sibling temporary file.
pub(crate) fn write_atomic(path: &Utf8Path, data: &[u8]) -> Result<(), StoreError> {
    let staged = stage(path, data)?;
    rename(&staged, path)
}

fn stage(path: &Utf8Path, data: &[u8]) -> Result<Utf8PathBuf, StoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| StoreError::Io(dir.to_owned(), e))?;
    }

    let name = path.file_name().unwrap_or("artifact");
    let staged = path.with_file_name(format!(".{name}.partial"));
    fs::write(&staged, data).map_err(|e| StoreError::Io(staged.clone(), e))?;

    Ok(staged)
}

fn rename(from: &Utf8Path, to: &Utf8Path) -> Result<(), StoreError> {
    fs::rename(from, to).map_err(|e| StoreError::Io(to.to_owned(), e))
}
