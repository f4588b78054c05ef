use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::adapter::{Tool, ensure_dir};
use crate::config::{Level, LintRules};
use crate::error::AdapterError;

/// A static checker over source files. Produces no artifact, only a verdict.
pub trait Linter: Send + Sync {
    fn name(&self) -> &str;

    /// Checks `files` against `rules`. Violations at error level fail.
    fn check(
        &self,
        files: &[Utf8PathBuf],
        rules: &LintRules,
        scratch: &Utf8Path,
        cwd: &Utf8Path,
    ) -> Result<(), AdapterError>;
}

#[derive(Serialize)]
struct Rule {
    level: Level,
}

#[derive(Serialize)]
struct CoffeeLintConfig {
    no_trailing_whitespace: Rule,
    max_line_length: Rule,
}

impl From<&LintRules> for CoffeeLintConfig {
    fn from(rules: &LintRules) -> Self {
        Self {
            no_trailing_whitespace: Rule {
                level: rules.no_trailing_whitespace,
            },
            max_line_length: Rule {
                level: rules.max_line_length,
            },
        }
    }
}

pub struct CoffeeLint {
    tool: Tool,
}

impl CoffeeLint {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl Linter for CoffeeLint {
    fn name(&self) -> &str {
        "coffeelint"
    }

    fn check(
        &self,
        files: &[Utf8PathBuf],
        rules: &LintRules,
        scratch: &Utf8Path,
        cwd: &Utf8Path,
    ) -> Result<(), AdapterError> {
        ensure_dir(scratch)?;
        let config = scratch.join("coffeelint.json");
        let json = serde_json::to_vec_pretty(&CoffeeLintConfig::from(rules))?;
        std::fs::write(&config, json).map_err(|e| AdapterError::Io(config.clone(), e))?;

        let mut args = vec!["-f".to_string(), config.to_string()];
        args.extend(files.iter().map(|f| f.to_string()));

        let output = self.tool.run(&args, cwd)?;
        let report = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() {
            return Err(AdapterError::Lint {
                tool: self.tool.name().to_string(),
                report,
            });
        }

        if !report.is_empty() {
            tracing::warn!("{report}");
        }

        tracing::info!("{} file(s) lint free", files.len());
        Ok(())
    }
}
