//! Project configuration read from `kiln.toml`.
//!
//! Every section is optional. The defaults describe the reference layout: a
//! jison grammar, CoffeeScript library and test modules, a plain JS wrapper
//! and a stylesheet kept in the documentation directory.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the configuration file looked up in the project root.
pub const CONFIG_FILE: &str = "kiln.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub layout: Layout,
    pub outputs: Outputs,
    pub banner: BannerText,
    pub tools: Tools,
    pub lint: LintRules,
    pub tests: TestsConfig,
    pub release: ReleaseConfig,
    pub minify: MinifyConfig,
    pub watch: WatchConfig,
}

/// Where the sources live and where outputs go, relative to the project root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Layout {
    pub build_dir: Utf8PathBuf,
    pub release_dir: Utf8PathBuf,
    pub doc_dir: Utf8PathBuf,
    pub package: Utf8PathBuf,
    pub grammar: Utf8PathBuf,
    pub library: Vec<Utf8PathBuf>,
    pub wrapper: Utf8PathBuf,
    pub player: Vec<Utf8PathBuf>,
    pub tests: Vec<Utf8PathBuf>,
    pub test_page: Utf8PathBuf,
    /// Stylesheets, relative to `doc_dir`.
    pub stylesheets: Vec<Utf8PathBuf>,
    /// Glob patterns of the sources checked by the linter.
    pub lint: Vec<String>,
    /// Global symbol exposed by the library and wrapper bundles.
    pub standalone: String,
    /// Global symbol exposed by the test bundle.
    pub test_standalone: String,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            build_dir: "build".into(),
            release_dir: "releases".into(),
            doc_dir: "doc".into(),
            package: "package.json".into(),
            grammar: "src/vextab.jison".into(),
            library: vec!["src/main.coffee".into()],
            wrapper: "src/tabdiv.js".into(),
            player: vec!["src/player.coffee".into()],
            tests: vec!["tests/vextab_tests.coffee".into()],
            test_page: "tests/runtest.html".into(),
            stylesheets: vec!["vextab.css".into()],
            lint: vec!["src/*.coffee".into()],
            standalone: "Vex.Flow".into(),
            test_standalone: "VexTabTests".into(),
        }
    }
}

/// File names of the artifacts written into the build directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Outputs {
    pub grammar: Utf8PathBuf,
    pub library: Utf8PathBuf,
    pub wrapper: Utf8PathBuf,
    pub player: Utf8PathBuf,
    pub tests: Utf8PathBuf,
    pub debug: Utf8PathBuf,
    pub minified: Utf8PathBuf,
}

impl Default for Outputs {
    fn default() -> Self {
        Self {
            grammar: "vextab-jison.js".into(),
            library: "vextab-lib.js".into(),
            wrapper: "vextab-div.js".into(),
            player: "vextab-player.js".into(),
            tests: "vextab-tests.js".into(),
            debug: "vextab-debug.js".into(),
            minified: "vextab-min.js".into(),
        }
    }
}

/// Fixed text of the banner comment. The version and the date are filled in
/// at build time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BannerText {
    pub project: String,
    pub copyright: String,
    pub links: String,
}

impl Default for BannerText {
    fn default() -> Self {
        Self {
            project: "VexTab".into(),
            copyright: "Copyright (c) 2010 Mohit Muthanna Cheppudira <mohit@muthanna.com>".into(),
            links: "http://www.vexflow.com  http://github.com/0xfe/vextab".into(),
        }
    }
}

/// External executables. Each entry is a command line prefix, the adapters
/// append their own arguments.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Tools {
    pub jison: Vec<String>,
    pub browserify: Vec<String>,
    pub coffee: Vec<String>,
    pub coffeelint: Vec<String>,
    pub uglifyjs: Vec<String>,
    pub git: Vec<String>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            jison: vec!["jison".into()],
            browserify: vec!["browserify".into()],
            coffee: vec!["coffee".into()],
            coffeelint: vec!["coffeelint".into()],
            uglifyjs: vec!["uglifyjs".into()],
            git: vec!["git".into()],
        }
    }
}

/// Severity of a lint rule, mirrors the levels understood by coffeelint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Ignore,
    Warn,
    Error,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintRules {
    pub no_trailing_whitespace: Level,
    pub max_line_length: Level,
}

impl Default for LintRules {
    fn default() -> Self {
        Self {
            no_trailing_whitespace: Level::Error,
            max_line_length: Level::Ignore,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestsConfig {
    /// Headless runner command, the test page path is appended.
    pub runner: Vec<String>,
    /// Whether a failing test case fails the `qunit` task. A failure is
    /// still recorded and blocks the commit step either way.
    pub fatal: bool,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            runner: vec!["node-qunit-puppeteer".into()],
            fatal: true,
        }
    }
}

/// When the version bump happens inside `publish`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BumpTiming {
    /// Bump before building, as the first step of the workflow.
    #[default]
    First,
    /// Test the current sources first, bump only once they pass, then
    /// rebuild and stage with the new version.
    BeforeCommit,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseConfig {
    /// Build outputs copied into the release directory.
    pub targets: Vec<Utf8PathBuf>,
    /// Glob patterns, relative to the release directory, of the files
    /// recorded by the commit step.
    pub commit: Vec<String>,
    pub message: String,
    pub bump: BumpTiming,
    /// Refuse to commit when no test run happened in the same session.
    pub require_tests: bool,
    pub tag: bool,
    pub tag_prefix: String,
    pub push: bool,
    /// Registry publish command (e.g. `["npm", "publish"]`), run last.
    pub publish: Option<Vec<String>>,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                "vextab-lib.js".into(),
                "vextab-div.js".into(),
                "vextab-div.js.map".into(),
            ],
            commit: vec!["*.js".into(), "*.map".into(), "*.css".into()],
            message: "Committing release binaries for new version: {version}".into(),
            bump: BumpTiming::First,
            require_tests: true,
            tag: true,
            tag_prefix: "v".into(),
            push: false,
            publish: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinifyBackend {
    #[default]
    Uglifyjs,
    Builtin,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinifyConfig {
    pub backend: MinifyBackend,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub paths: Vec<String>,
    pub task: String,
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: vec!["src/tabdiv.js".into(), "src/vextab.jison".into()],
            task: "default".into(),
            debounce_ms: 250,
        }
    }
}

/// A configured project: the root directory every path is resolved against
/// and its configuration.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: Utf8PathBuf,
    pub config: Config,
}

impl Project {
    pub fn new(root: impl Into<Utf8PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Loads the project rooted at `root`. The configuration is read from
    /// `path` if given, otherwise from `kiln.toml` in the root when present.
    pub fn load(root: &Utf8Path, path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let root = root
            .canonicalize_utf8()
            .map_err(|e| ConfigError::Root(root.to_owned(), e))?;

        let config = match path {
            Some(path) => read_config(&root.join(path))?,
            None => {
                let path = root.join(CONFIG_FILE);
                if path.is_file() {
                    read_config(&path)?
                } else {
                    tracing::debug!("no {CONFIG_FILE} found, using defaults");
                    Config::default()
                }
            }
        };

        Ok(Self { root, config })
    }

    pub fn path(&self, relative: impl AsRef<Utf8Path>) -> Utf8PathBuf {
        self.root.join(relative)
    }

    pub fn build_dir(&self) -> Utf8PathBuf {
        self.path(&self.config.layout.build_dir)
    }

    pub fn release_dir(&self) -> Utf8PathBuf {
        self.path(&self.config.layout.release_dir)
    }

    pub fn doc_dir(&self) -> Utf8PathBuf {
        self.path(&self.config.layout.doc_dir)
    }
}

fn read_config(path: &Utf8Path) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_owned(), e))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_match_reference_layout() {
        let config = Config::default();
        assert_eq!(config.layout.build_dir, "build");
        assert_eq!(config.layout.release_dir, "releases");
        assert_eq!(config.outputs.debug, "vextab-debug.js");
        assert_eq!(config.release.targets.len(), 3);
        assert_eq!(config.lint.no_trailing_whitespace, Level::Error);
        assert_eq!(config.release.bump, BumpTiming::First);
        assert!(config.tests.fatal);
    }

    #[test]
    fn test_release_stays_local_by_default() {
        let release = ReleaseConfig::default();
        assert!(release.tag);
        assert!(!release.push);
        assert_eq!(release.publish, None);
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [layout]
            build_dir = "out"

            [release]
            bump = "before-commit"
            publish = ["npm", "publish"]

            [minify]
            backend = "builtin"
            "#,
        )
        .unwrap();

        assert_eq!(config.layout.build_dir, "out");
        assert_eq!(config.layout.release_dir, "releases");
        assert_eq!(config.release.bump, BumpTiming::BeforeCommit);
        assert_eq!(config.minify.backend, MinifyBackend::Builtin);
        assert_eq!(
            config.release.publish,
            Some(vec!["npm".to_string(), "publish".to_string()])
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = toml::from_str::<Config>("[layout]\nbiuld_dir = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(root.join(CONFIG_FILE), "[outputs]\nminified = \"lib.min.js\"\n").unwrap();

        let project = Project::load(root, None).unwrap();
        assert_eq!(project.config.outputs.minified, "lib.min.js");
        assert!(project.build_dir().ends_with("build"));
    }
}
