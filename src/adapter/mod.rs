//! Compilation adapters.
//!
//! An adapter is a pure transformation from a set of input files to the bytes
//! of one output file (plus, optionally, its source map). Adapters never write
//! the final artifact themselves, the store does, which keeps every output
//! all-or-nothing.
//!
//! The external tools are invoked as subprocesses. Their command lines come
//! from the `[tools]` section of the configuration.

mod bundle;
mod coffee;
mod grammar;
mod lint;
mod minify;
mod qunit;

use std::fmt::Debug;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{Config, MinifyBackend};
use crate::error::AdapterError;
use crate::release::{Git, Vcs};

pub use bundle::{Browserify, split_inline_map};
pub use coffee::Coffee;
pub use grammar::Jison;
pub use lint::{CoffeeLint, Linter};
pub use minify::{Strip, Uglify};
pub use qunit::{QUnit, TestReport, TestRunner};

/// Per-invocation options, the union of what the adapters understand.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Expose the module under this global name when loaded outside a
    /// module system.
    pub standalone: Option<String>,
    /// Embed a debug source map.
    pub debug: bool,
    /// Move an embedded source map out into `<output>.map`.
    pub external_map: bool,
    /// Source transforms applied while bundling.
    pub transforms: Vec<String>,
    /// Extra file extensions resolved while bundling.
    pub extensions: Vec<String>,
    /// Module format of a generated parser.
    pub module_type: Option<String>,
    /// Text prefixed verbatim to the output. Filled in at run time.
    pub banner: Option<String>,
}

/// Everything an adapter gets to see for one invocation. All paths are
/// absolute.
pub struct Job<'a> {
    pub inputs: &'a [Utf8PathBuf],
    pub output: &'a Utf8Path,
    pub options: &'a Options,
    /// Directory the tool runs in.
    pub cwd: &'a Utf8Path,
    /// Private directory for tools that only write to files.
    pub scratch: &'a Utf8Path,
}

impl Job<'_> {
    pub(crate) fn single_input(&self, adapter: &str) -> Result<&Utf8Path, AdapterError> {
        match self.inputs {
            [input] => Ok(input.as_path()),
            _ => Err(AdapterError::Io(
                self.output.to_owned(),
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{adapter} takes exactly one input, got {}", self.inputs.len()),
                ),
            )),
        }
    }

    pub(crate) fn output_name(&self) -> &str {
        self.output.file_name().unwrap_or("output.js")
    }
}

/// Output of an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformed {
    pub code: Vec<u8>,
    pub map: Option<Vec<u8>>,
}

impl Transformed {
    pub fn code(code: impl Into<Vec<u8>>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

pub trait Adapter: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, job: &Job<'_>) -> Result<Transformed, AdapterError>;
}

/// An adapter backed by a closure, for in-process transformations.
pub struct Custom<F> {
    name: String,
    func: F,
}

impl<F> Adapter for Custom<F>
where
    F: Fn(&Job<'_>) -> Result<Transformed, AdapterError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, job: &Job<'_>) -> Result<Transformed, AdapterError> {
        (self.func)(job)
    }
}

pub fn custom<F>(name: impl Into<String>, func: F) -> Arc<dyn Adapter>
where
    F: Fn(&Job<'_>) -> Result<Transformed, AdapterError> + Send + Sync + 'static,
{
    Arc::new(Custom {
        name: name.into(),
        func,
    })
}

/// The set of collaborators the standard pipeline is wired with.
#[derive(Clone)]
pub struct Toolbox {
    pub grammar: Arc<dyn Adapter>,
    pub bundler: Arc<dyn Adapter>,
    pub compiler: Arc<dyn Adapter>,
    pub minifier: Arc<dyn Adapter>,
    pub linter: Arc<dyn Linter>,
    pub tests: Arc<dyn TestRunner>,
    pub vcs: Arc<dyn Vcs>,
}

impl Toolbox {
    pub fn from_config(config: &Config) -> Self {
        let tools = &config.tools;

        let minifier: Arc<dyn Adapter> = match config.minify.backend {
            MinifyBackend::Uglifyjs => Arc::new(Uglify::new(Tool::new(&tools.uglifyjs))),
            MinifyBackend::Builtin => Arc::new(Strip),
        };

        Self {
            grammar: Arc::new(Jison::new(Tool::new(&tools.jison))),
            bundler: Arc::new(Browserify::new(Tool::new(&tools.browserify))),
            compiler: Arc::new(Coffee::new(Tool::new(&tools.coffee))),
            minifier,
            linter: Arc::new(CoffeeLint::new(Tool::new(&tools.coffeelint))),
            tests: Arc::new(QUnit::new(Tool::new(&config.tests.runner))),
            vcs: Arc::new(Git::new(Tool::new(&tools.git))),
        }
    }
}

impl Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("grammar", &self.grammar.name())
            .field("bundler", &self.bundler.name())
            .field("compiler", &self.compiler.name())
            .field("minifier", &self.minifier.name())
            .field("linter", &self.linter.name())
            .field("tests", &self.tests.name())
            .finish_non_exhaustive()
    }
}

/// An external executable with its fixed leading arguments.
#[derive(Debug, Clone)]
pub struct Tool {
    program: String,
    prefix: Vec<String>,
}

impl Tool {
    pub fn new(command: &[String]) -> Self {
        let (program, prefix) = match command {
            [program, prefix @ ..] => (program.clone(), prefix.to_vec()),
            [] => (String::new(), Vec::new()),
        };

        Self { program, prefix }
    }

    pub fn name(&self) -> &str {
        &self.program
    }

    fn describe(&self, args: &[String]) -> String {
        let mut line = self.program.clone();
        for arg in self.prefix.iter().chain(args) {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Runs the tool to completion and returns its raw output, whatever the
    /// exit status.
    pub fn run(&self, args: &[String], cwd: &Utf8Path) -> Result<Output, AdapterError> {
        tracing::debug!("running {}", self.describe(args));

        Command::new(&self.program)
            .args(&self.prefix)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| AdapterError::Spawn {
                tool: self.program.clone(),
                source,
            })
    }

    /// Runs the tool and returns its stdout, failing on a non-zero exit.
    pub fn stdout(&self, args: &[String], cwd: &Utf8Path) -> Result<Vec<u8>, AdapterError> {
        let output = self.run(args, cwd)?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(AdapterError::Failed {
                tool: self.describe(args),
                status: output.status,
                stderr,
            });
        }

        Ok(output.stdout)
    }
}

/// Reads a file a tool wrote into the scratch directory and removes it.
pub(crate) fn take_scratch(path: &Utf8Path) -> Result<Vec<u8>, AdapterError> {
    let data = std::fs::read(path).map_err(|e| AdapterError::Io(path.to_owned(), e))?;
    std::fs::remove_file(path).map_err(|e| AdapterError::Io(path.to_owned(), e))?;
    Ok(data)
}

pub(crate) fn ensure_dir(path: &Utf8Path) -> Result<(), AdapterError> {
    std::fs::create_dir_all(path).map_err(|e| AdapterError::Io(path.to_owned(), e))
}
