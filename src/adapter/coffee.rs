use crate::adapter::{Adapter, Job, Tool, Transformed};
use crate::error::AdapterError;

/// Plain CoffeeScript compiler, no bundling. Several inputs are compiled one
/// by one and joined in order.
pub struct Coffee {
    tool: Tool,
}

impl Coffee {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }
}

impl Adapter for Coffee {
    fn name(&self) -> &str {
        "coffee"
    }

    fn transform(&self, job: &Job<'_>) -> Result<Transformed, AdapterError> {
        let mut code = Vec::new();

        for input in job.inputs {
            let compiled = self.tool.stdout(
                &["--compile".into(), "--print".into(), input.to_string()],
                job.cwd,
            )?;
            code.extend_from_slice(&compiled);
        }

        Ok(Transformed::code(code))
    }
}
