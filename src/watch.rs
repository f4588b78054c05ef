//! Watch mode.
//!
//! The watched sources come from the `[watch]` configuration, or from the
//! tasks of the plan when none are configured. Filesystem events are
//! debounced, then filtered twice: first by the watch patterns, then by
//! content, so saving a file without changing it does not trigger a rebuild.
//! A failing rebuild is logged and the watcher keeps going.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::RecursiveMode;
use notify_debouncer_full::new_debouncer;

use crate::blueprint::Pipeline;
use crate::core::{Hash32, Session};
use crate::error::{KilnError, WatchError};

impl Pipeline {
    /// Runs `targets` once, then again every time a watched source changes.
    /// Only returns on a watcher error.
    pub fn watch<S: AsRef<str>>(
        &self,
        session: &mut Session,
        targets: &[S],
    ) -> Result<(), WatchError> {
        let plan = self
            .plan(targets)
            .map_err(|e| WatchError::Kiln(Box::new(KilnError::Plan(e))))?;

        let root = session.project.root.clone();
        let config = session.config().watch.clone();

        let sources: Vec<String> = if config.paths.is_empty() {
            self.watched(&plan).into_iter().map(String::from).collect()
        } else {
            config.paths.clone()
        };

        tracing::info!("running initial build...");
        if let Err(e) = self.run(session, targets) {
            tracing::error!("{e}");
        }

        let mut watched = HashSet::new();
        let mut filters = Vec::new();
        for source in &sources {
            match resolve_watch_path(root.join(source)) {
                Ok((path, pattern)) => {
                    watched.insert(path);
                    filters.push(pattern);
                }
                Err(e) => return Err(WatchError::Resolve(source.clone(), e)),
            }
        }

        let mut fingerprints = Fingerprints::default();
        for filter in &filters {
            if let Ok(paths) = glob::glob(filter.as_str()) {
                for path in paths.flatten() {
                    fingerprints.changed(&path);
                }
            }
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(Duration::from_millis(config.debounce_ms), None, tx)?;

        for path in collapse_watch_paths(watched) {
            tracing::info!("watching {}", path);
            debouncer.watch(&path, RecursiveMode::Recursive)?;
        }

        tracing::info!("initial build completed, now watching for changes...");

        loop {
            match rx.recv()? {
                Ok(events) => {
                    let mut dirty = Vec::new();
                    for de in events {
                        for path in &de.event.paths {
                            if !filters.iter().any(|filter| filter.matches_path(path)) {
                                continue;
                            }
                            if fingerprints.changed(path) {
                                dirty.push(path.clone());
                            }
                        }
                    }

                    if dirty.is_empty() {
                        continue;
                    }

                    for path in &dirty {
                        let path = Utf8Path::from_path(path)
                            .and_then(|p| p.strip_prefix(&root).ok())
                            .map(Utf8Path::to_string)
                            .unwrap_or_else(|| path.display().to_string());
                        tracing::info!("changed: {path}");
                    }

                    tracing::info!("change detected, re-running {}...", plan.targets().join(" "));
                    match self.run(session, targets) {
                        Ok(_) => tracing::info!("rebuild complete, watching for changes..."),
                        Err(e) => tracing::error!("{e}"),
                    }
                }
                Err(errors) => {
                    for e in errors {
                        tracing::error!("watch error: {e:?}");
                    }
                }
            }
        }
    }
}

/// Last seen content hash of every watched file.
#[derive(Debug, Default)]
struct Fingerprints(HashMap<PathBuf, Option<Hash32>>);

impl Fingerprints {
    /// Records the current content of `path` and reports whether it differs
    /// from the previous record. A file seen for the first time counts as
    /// changed, as does a removed one.
    fn changed(&mut self, path: &Path) -> bool {
        let hash = Hash32::hash_file(path).ok();
        match self.0.insert(path.to_path_buf(), hash) {
            Some(previous) => previous != hash,
            None => true,
        }
    }
}

/// Turns a watched source (a file, a directory or a glob) into the directory
/// handed to the watcher and the pattern event paths are matched against.
///
/// The part before the first wildcard has to exist. A directory stands for
/// everything below it. A single file is watched through its parent so
/// editors that save by renaming are still seen.
fn resolve_watch_path(source: impl AsRef<str>) -> anyhow::Result<(Utf8PathBuf, Pattern)> {
    let path = Utf8Path::new(source.as_ref());

    let components: Vec<_> = path.components().collect();
    let wildcard = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let (fixed, rest) = components.split_at(wildcard);
    let fixed: Utf8PathBuf = fixed.iter().collect();
    let rest: Utf8PathBuf = rest.iter().collect();

    let fixed = fixed.canonicalize_utf8()?;
    let pattern = match rest.as_str() {
        "" if fixed.is_dir() => Pattern::new(fixed.join("**/*").as_str())?,
        "" => Pattern::new(fixed.as_str())?,
        _ => Pattern::new(fixed.join(&rest).as_str())?,
    };

    let dir = if rest.as_str().is_empty() && fixed.is_file() {
        fixed.parent().map(Utf8Path::to_path_buf).unwrap_or_else(|| fixed.clone())
    } else {
        fixed
    };

    Ok((dir, pattern))
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered = Vec::new();
    for path in paths {
        if let Some(last) = filtered.last()
            && path.starts_with(last)
        {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/tabdiv.js"), "var Lib = {};").unwrap();
        (dir, root)
    }

    #[test]
    fn test_concrete_file() {
        let (_dir, root) = tempdir();
        let (watch, pattern) = resolve_watch_path(root.join("src/tabdiv.js")).unwrap();

        // watch the parent, match the file
        assert_eq!(watch, root.join("src"));
        assert_eq!(pattern.as_str(), root.join("src/tabdiv.js"));
        assert!(pattern.matches_path(root.join("src/tabdiv.js").as_std_path()));
    }

    #[test]
    fn test_concrete_directory() {
        let (_dir, root) = tempdir();
        let (watch, pattern) = resolve_watch_path(root.join("src")).unwrap();

        // everything below the directory
        assert_eq!(watch, root.join("src"));
        assert!(pattern.matches_path(root.join("src/tabdiv.js").as_std_path()));
        assert!(pattern.matches_path(root.join("src/grammar/vextab.jison").as_std_path()));
    }

    #[test]
    fn test_directory_wildcard() {
        let (_dir, root) = tempdir();
        let (watch, pattern) = resolve_watch_path(root.join("src/*.jison")).unwrap();

        assert_eq!(watch, root.join("src"));
        assert_eq!(pattern.as_str(), root.join("src/*.jison"));
        assert!(pattern.matches_path(root.join("src/vextab.jison").as_std_path()));
    }

    #[test]
    fn test_missing_root() {
        let (_dir, root) = tempdir();
        assert!(resolve_watch_path(root.join("nope/*.js")).is_err());
    }

    #[test]
    fn test_fingerprints_ignore_touch() {
        let (_dir, root) = tempdir();
        let path = root.join("src/tabdiv.js");
        let mut fingerprints = Fingerprints::default();

        assert!(fingerprints.changed(path.as_std_path()));
        // same content written again
        fs::write(&path, "var Lib = {};").unwrap();
        assert!(!fingerprints.changed(path.as_std_path()));

        fs::write(&path, "var Lib = {x: 1};").unwrap();
        assert!(fingerprints.changed(path.as_std_path()));

        fs::remove_file(&path).unwrap();
        assert!(fingerprints.changed(path.as_std_path()));
    }

    #[test]
    fn test_collapse_nested_roots() {
        let paths: HashSet<Utf8PathBuf> = ["/lib/src", "/lib/src/grammar", "/lib/tests", "/lib/src/a/b"]
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect();

        assert_eq!(
            collapse_watch_paths(paths),
            [Utf8PathBuf::from("/lib/src"), Utf8PathBuf::from("/lib/tests")]
        );
    }

    #[test]
    fn test_collapse_keeps_sibling_prefixes() {
        let paths: HashSet<Utf8PathBuf> = ["/lib/src", "/lib/src-old"]
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect();

        // same string prefix, different directory
        assert_eq!(collapse_watch_paths(paths).len(), 2);
    }
}
