use camino::Utf8Path;

use crate::adapter::{Adapter, Job, Tool, Transformed, ensure_dir, take_scratch};
use crate::error::AdapterError;

/// Grammar compiler: one jison grammar in, one parser module out.
///
/// Grammar syntax errors come back as [`AdapterError::Failed`] carrying the
/// tool's own message, which names the file and line.
pub struct Jison {
    tool: Tool,
}

impl Jison {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    fn args(job: &Job<'_>, input: &Utf8Path, out: &Utf8Path) -> Vec<String> {
        let module_type = job.options.module_type.as_deref().unwrap_or("commonjs");

        vec![
            input.to_string(),
            "-o".into(),
            out.to_string(),
            "-m".into(),
            module_type.into(),
        ]
    }
}

impl Adapter for Jison {
    fn name(&self) -> &str {
        "jison"
    }

    fn transform(&self, job: &Job<'_>) -> Result<Transformed, AdapterError> {
        let input = job.single_input("jison")?;
        ensure_dir(job.scratch)?;
        let out = job.scratch.join(job.output_name());

        self.tool.stdout(&Self::args(job, input, &out), job.cwd)?;

        Ok(Transformed::code(take_scratch(&out)?))
    }
}
