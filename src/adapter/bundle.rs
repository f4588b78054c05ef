use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::adapter::{Adapter, Job, Tool, Transformed};
use crate::error::AdapterError;

const INLINE_MAP: &str = "//# sourceMappingURL=data:application/json;";

/// Module transpiler and bundler.
///
/// Resolves the transitive module graph from the entry points, applies the
/// source transforms (coffeeify for CoffeeScript) and emits one
/// self-contained module. Any syntax or resolution error anywhere in the graph
/// fails the whole bundle.
pub struct Browserify {
    tool: Tool,
}

impl Browserify {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    fn args(job: &Job<'_>) -> Vec<String> {
        let options = job.options;
        let mut args: Vec<String> = job.inputs.iter().map(|p| p.to_string()).collect();

        for transform in &options.transforms {
            args.push("-t".into());
            args.push(transform.clone());
        }

        for extension in &options.extensions {
            args.push(format!("--extension={extension}"));
        }

        if options.debug {
            args.push("--debug".into());
        }

        if let Some(name) = &options.standalone {
            args.push("--standalone".into());
            args.push(name.clone());
        }

        args
    }
}

impl Adapter for Browserify {
    fn name(&self) -> &str {
        "browserify"
    }

    fn transform(&self, job: &Job<'_>) -> Result<Transformed, AdapterError> {
        let code = self.tool.stdout(&Self::args(job), job.cwd)?;

        if job.options.external_map {
            let map_name = format!("{}.map", job.output_name());
            let (code, map) = split_inline_map(&code, &map_name)?;
            return Ok(Transformed { code, map });
        }

        Ok(Transformed::code(code))
    }
}

/// Moves a base64 inline source map out of `code`.
///
/// The inline comment is replaced with a reference to `map_name`. Code without
/// an inline map is returned unchanged.
pub fn split_inline_map(
    code: &[u8],
    map_name: &str,
) -> Result<(Vec<u8>, Option<Vec<u8>>), AdapterError> {
    let text = String::from_utf8_lossy(code);

    let Some(start) = text.rfind(INLINE_MAP) else {
        return Ok((code.to_vec(), None));
    };

    let line_end = text[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(text.len());
    let comment = &text[start..line_end];

    let payload = comment
        .split_once("base64,")
        .map(|(_, payload)| payload.trim())
        .ok_or_else(|| AdapterError::InlineMap("only base64 encoded maps are supported".into()))?;

    let map = STANDARD
        .decode(payload)
        .map_err(|e| AdapterError::InlineMap(e.to_string()))?;

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str("//# sourceMappingURL=");
    out.push_str(map_name);
    out.push_str(&text[line_end..]);
    if !out.ends_with('\n') {
        out.push('\n');
    }

    Ok((out.into_bytes(), Some(map)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::Options;
    use camino::{Utf8Path, Utf8PathBuf};

    #[test]
    fn test_split_inline_map() {
        let map = r#"{"version":3,"sources":["main.coffee"],"mappings":"AAAA"}"#;
        let code = format!(
            "(function(){{}})();\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}\n",
            STANDARD.encode(map)
        );

        let (code, extracted) = split_inline_map(code.as_bytes(), "lib.js.map").unwrap();
        assert_eq!(
            String::from_utf8(code).unwrap(),
            "(function(){})();\n//# sourceMappingURL=lib.js.map\n"
        );
        assert_eq!(extracted.unwrap(), map.as_bytes());
    }

    #[test]
    fn test_no_inline_map() {
        let (code, map) = split_inline_map(b"var x = 1;\n", "x.map").unwrap();
        assert_eq!(code, b"var x = 1;\n");
        assert!(map.is_none());
    }

    #[test]
    fn test_bad_inline_map() {
        let code = b"//# sourceMappingURL=data:application/json;base64,@@@@\n";
        assert!(matches!(
            split_inline_map(code, "x.map"),
            Err(AdapterError::InlineMap(_))
        ));
    }

    #[test]
    fn test_args() {
        let inputs = [Utf8PathBuf::from("/p/src/main.coffee")];
        let options = Options {
            standalone: Some("Vex.Flow".into()),
            debug: true,
            transforms: vec!["coffeeify".into()],
            extensions: vec![".coffee".into()],
            ..Options::default()
        };
        let job = Job {
            inputs: &inputs,
            output: Utf8Path::new("/p/build/vextab-lib.js"),
            options: &options,
            cwd: Utf8Path::new("/p"),
            scratch: Utf8Path::new("/p/build/.scratch"),
        };

        assert_eq!(
            Browserify::args(&job),
            vec![
                "/p/src/main.coffee",
                "-t",
                "coffeeify",
                "--extension=.coffee",
                "--debug",
                "--standalone",
                "Vex.Flow"
            ]
        );
    }
}
