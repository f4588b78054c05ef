use std::collections::HashMap;
use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::engine::{Plan, Registry};

#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub start: Instant,
    pub duration: Duration,
}

/// Execution metrics of one run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Names of the primitive tasks that completed, in execution order.
    pub completed: Vec<String>,
    pub execution_times: HashMap<String, TaskExecution>,
}

impl Diagnostics {
    pub fn total(&self) -> Duration {
        self.execution_times.values().map(|t| t.duration).sum()
    }

    /// One line per completed task with its duration.
    pub fn summary(&self) -> String {
        let width = self.completed.iter().map(String::len).max().unwrap_or(0);
        let mut f = String::new();

        for name in &self.completed {
            if let Some(exec) = self.execution_times.get(name) {
                let _ = writeln!(f, "{name:<width$}  {:>10.2?}", exec.duration);
            }
        }

        f
    }

    /// Renders the plan as a Mermaid diagram, color-coded by execution
    /// duration.
    ///
    /// * **Green**: Fast
    /// * **Yellow**: Moderate
    /// * **Red**: Slow
    /// * **Grey**: Composite or not run
    pub fn render_mermaid(&self, plan: &Plan, registry: &Registry) -> String {
        let mut f = String::new();
        let _ = writeln!(f, "graph LR");

        let times = &self.execution_times;
        let mut min_time = f64::MAX;
        let mut max_time = f64::MIN;

        for t in times.values() {
            let secs = t.duration.as_secs_f64();
            min_time = min_time.min(secs);
            max_time = max_time.max(secs);
        }

        if min_time > max_time {
            // nothing ran
            min_time = 0.0;
            max_time = 0.0;
        }

        if (max_time - min_time).abs() < f64::EPSILON {
            max_time = min_time + 1.0;
        }

        for &index in &plan.order {
            let task = registry.at(index);
            let name = task.name().replace('"', "\\\"");

            let (label, color) = match times.get(task.name()) {
                Some(exec) => {
                    let t = (exec.duration.as_secs_f64() - min_time) / (max_time - min_time);
                    (format!("{:.2?}", exec.duration), gradient(t))
                }
                None if task.is_composite() => ("group".to_string(), "#D3D3D3".to_string()),
                None => ("not run".to_string(), "#D3D3D3".to_string()),
            };

            let _ = writeln!(f, "    {index}[\"{name}\\n{label}\"]");
            let _ = writeln!(f, "    style {index} fill:{color}");
        }

        for (source, target) in plan.edges() {
            let _ = writeln!(f, "    {source} --> {target}");
        }

        f
    }
}

/// Green at 0.0, yellow at 0.5, red at 1.0.
fn gradient(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);

    let (r, g, b) = if t < 0.5 {
        ((255.0 * t * 2.0) as u8, 255, 0)
    } else {
        (255, (255.0 * (1.0 - (t - 0.5) * 2.0)) as u8, 0)
    };

    format!("#{r:02X}{g:02X}{b:02X}")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::{Kind, Task, action};

    #[test]
    fn test_gradient_ends() {
        assert_eq!(gradient(0.0), "#00FF00");
        assert_eq!(gradient(0.5), "#FFFF00");
        assert_eq!(gradient(1.0), "#FF0000");
    }

    #[test]
    fn test_render_mermaid() {
        let mut registry = Registry::default();
        registry
            .insert(Task {
                name: "jison".into(),
                description: None,
                deps: vec![],
                kind: Kind::Primitive(action(|_| Ok(()))),
            })
            .unwrap();
        registry
            .insert(Task {
                name: "build".into(),
                description: None,
                deps: vec!["jison".into()],
                kind: Kind::Composite,
            })
            .unwrap();

        let plan = Plan::new(&registry, &["build"]).unwrap();
        let mut diagnostics = Diagnostics::default();
        diagnostics.completed.push("jison".into());
        diagnostics.execution_times.insert(
            "jison".into(),
            TaskExecution {
                start: Instant::now(),
                duration: Duration::from_millis(5),
            },
        );

        let out = diagnostics.render_mermaid(&plan, &registry);
        assert!(out.starts_with("graph LR\n"));
        assert!(out.contains("0[\"jison\\n5.00ms\"]"));
        assert!(out.contains("1[\"build\\ngroup\"]"));
        assert!(out.contains("0 --> 1"));
        assert!(diagnostics.summary().starts_with("jison"));
    }
}
