use std::fs;

use camino::Utf8Path;

use crate::adapter::{Adapter, Job, Tool, Transformed, ensure_dir, take_scratch};
use crate::error::AdapterError;
use crate::sourcemap::{Mapping, SourceMap};

/// Minifier backed by uglify-js. Writes the minified code and an external
/// source map, with the banner re-prefixed as a preamble.
pub struct Uglify {
    tool: Tool,
}

impl Uglify {
    pub fn new(tool: Tool) -> Self {
        Self { tool }
    }

    fn args(job: &Job<'_>, input: &Utf8Path, out: &Utf8Path) -> Vec<String> {
        let name = job.output_name();
        let base = input.parent().unwrap_or(job.cwd);

        let mut args = vec![
            input.to_string(),
            "--compress".into(),
            "--mangle".into(),
            "-o".into(),
            out.to_string(),
            "--source-map".into(),
            format!("base='{base}',filename='{name}',url='{name}.map'"),
        ];

        if let Some(banner) = &job.options.banner {
            args.push("--preamble".into());
            args.push(banner.trim_end().to_string());
        }

        args
    }
}

impl Adapter for Uglify {
    fn name(&self) -> &str {
        "uglifyjs"
    }

    fn transform(&self, job: &Job<'_>) -> Result<Transformed, AdapterError> {
        let input = job.single_input("uglifyjs")?;
        ensure_dir(job.scratch)?;

        let name = job.output_name();
        let out = job.scratch.join(name);
        let map = job.scratch.join(format!("{name}.map"));

        self.tool.stdout(&Self::args(job, input, &out), job.cwd)?;

        Ok(Transformed {
            code: take_scratch(&out)?,
            map: Some(take_scratch(&map)?),
        })
    }
}

/// Built-in line-preserving minifier.
///
/// Drops blank lines, whole-line comments and indentation, keeps every
/// remaining statement on its own line and records where each output line
/// came from. No renaming, no compression.
pub struct Strip;

impl Adapter for Strip {
    fn name(&self) -> &str {
        "strip"
    }

    fn transform(&self, job: &Job<'_>) -> Result<Transformed, AdapterError> {
        let input = job.single_input("strip")?;
        let source = fs::read_to_string(input).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AdapterError::MissingInput(input.to_owned()),
            _ => AdapterError::Io(input.to_owned(), e),
        })?;

        let name = job.output_name();
        let (code, map) = strip(
            &source,
            job.options.banner.as_deref().unwrap_or_default(),
            name,
            &source_name(input, job.output),
        );

        Ok(Transformed {
            code: code.into_bytes(),
            map: Some(map.to_json()?.into_bytes()),
        })
    }
}

/// How the map refers to the minified input. Siblings are referenced by file
/// name, anything else by full path.
fn source_name(input: &Utf8Path, output: &Utf8Path) -> String {
    match (input.parent(), output.parent()) {
        (Some(a), Some(b)) if a == b => input.file_name().unwrap_or(input.as_str()).to_string(),
        _ => input.to_string(),
    }
}

fn strip(source: &str, banner: &str, file: &str, source_name: &str) -> (String, SourceMap) {
    let mut out = String::with_capacity(source.len());
    let mut map = SourceMap::new(file, source_name);

    out.push_str(banner);
    if !banner.is_empty() && !banner.ends_with('\n') {
        out.push('\n');
    }
    let mut generated_line = out.lines().count() as u32;

    let mut in_comment = false;

    for (index, line) in source.lines().enumerate() {
        let Some((begin, end)) = scan(line, &mut in_comment) else {
            continue;
        };

        map.add(Mapping {
            generated_line,
            generated_column: 0,
            original_line: index as u32,
            original_column: begin as u32,
        });

        out.push_str(line[begin..end].trim_end());
        out.push('\n');
        generated_line += 1;
    }

    out.push_str("//# sourceMappingURL=");
    out.push_str(file);
    out.push_str(".map\n");

    (out, map)
}

/// Finds the part of `line` worth keeping.
///
/// `in_comment` carries an open block comment from one line to the next.
/// Returns the byte range of the kept text, or `None` for a line holding only
/// whitespace and comments. A block comment still open at the end of a kept
/// line is cut off, so the output never leaves a comment open.
fn scan(line: &str, in_comment: &mut bool) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut begin = line.len() - line.trim_start().len();
    let mut opened_at = None;
    let mut quote = None;
    let mut code = false;
    let mut i = 0;

    while i < bytes.len() {
        let pair = (bytes[i], bytes.get(i + 1).copied());

        if *in_comment {
            if pair == (b'*', Some(b'/')) {
                *in_comment = false;
                i += 2;
                // closes a comment opened on an earlier line
                if opened_at.take().is_none() && !code {
                    let rest = &line[i..];
                    begin = i + rest.len() - rest.trim_start().len();
                }
            } else {
                i += 1;
            }
            continue;
        }

        if let Some(q) = quote {
            match bytes[i] {
                b'\\' => i += 2,
                b if b == q => {
                    quote = None;
                    i += 1;
                }
                _ => i += 1,
            }
            continue;
        }

        match pair {
            (b'/', Some(b'/')) => break,
            (b'/', Some(b'*')) => {
                *in_comment = true;
                opened_at = Some(i);
                i += 2;
                continue;
            }
            (b'"' | b'\'' | b'`', _) => {
                quote = Some(bytes[i]);
                code = true;
            }
            (b, _) if b.is_ascii_whitespace() => {}
            _ => code = true,
        }
        i += 1;
    }

    if !code {
        return None;
    }

    let end = match (*in_comment, opened_at) {
        (true, Some(at)) => at,
        _ => line.len(),
    };

    Some((begin, end))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::adapter::Options;
    use crate::sourcemap::decode;

    const SOURCE: &str = "\
// leading comment
var Lib = {};

/* block
   comment */
function f() {
    return 1;
}
/* inline */ f();
";

    #[test]
    fn test_strip_lines_and_map() {
        let (code, map) = strip(SOURCE, "/**\n * banner\n */\n", "lib.min.js", "lib.js");

        assert_eq!(
            code,
            "/**\n * banner\n */\nvar Lib = {};\nfunction f() {\nreturn 1;\n}\n/* inline */ f();\n//# sourceMappingURL=lib.min.js.map\n"
        );

        let json: serde_json::Value = serde_json::from_str(&map.to_json().unwrap()).unwrap();
        assert_eq!(json["sources"][0], "lib.js");
        let mappings = decode(json["mappings"].as_str().unwrap());

        // banner occupies three lines, no mappings there
        let lines: Vec<_> = mappings
            .iter()
            .map(|m| (m.generated_line, m.original_line, m.original_column))
            .collect();
        assert_eq!(
            lines,
            vec![(3, 1, 0), (4, 5, 0), (5, 6, 4), (6, 7, 0), (7, 8, 0)]
        );

        // every mapped line points at the same text in the source
        let source_lines: Vec<_> = SOURCE.lines().collect();
        let code_lines: Vec<_> = code.lines().collect();
        for m in &mappings {
            let original = &source_lines[m.original_line as usize][m.original_column as usize..];
            assert!(original.starts_with(code_lines[m.generated_line as usize]));
        }
    }

    #[test]
    fn test_strip_code_after_block_comment() {
        let (code, map) = strip("/* a\n b */ x();\n", "", "o.js", "i.js");
        assert_eq!(code, "x();\n//# sourceMappingURL=o.js.map\n");

        let json: serde_json::Value = serde_json::from_str(&map.to_json().unwrap()).unwrap();
        let mappings = decode(json["mappings"].as_str().unwrap());
        assert_eq!(mappings[0].original_line, 1);
        assert_eq!(mappings[0].original_column, 6);
    }

    #[test]
    fn test_strip_comment_opened_mid_line() {
        let (code, map) = strip("a(); /* open\n/* x */\nb();\n", "", "o.js", "i.js");
        assert_eq!(code, "a();\nb();\n//# sourceMappingURL=o.js.map\n");

        let json: serde_json::Value = serde_json::from_str(&map.to_json().unwrap()).unwrap();
        let lines: Vec<_> = decode(json["mappings"].as_str().unwrap())
            .iter()
            .map(|m| (m.generated_line, m.original_line))
            .collect();
        assert_eq!(lines, vec![(0, 0), (1, 2)]);
    }

    #[test]
    fn test_strip_comment_markers_in_strings_and_line_comments() {
        let source = "var s = \"/* not a comment\";\nx(); // nor /* this\ny();\n";
        let (code, _) = strip(source, "", "o.js", "i.js");
        assert_eq!(
            code,
            "var s = \"/* not a comment\";\nx(); // nor /* this\ny();\n//# sourceMappingURL=o.js.map\n"
        );
    }

    #[test]
    fn test_uglify_args() {
        let inputs = [camino::Utf8PathBuf::from("/p/build/vextab-debug.js")];
        let options = Options {
            banner: Some("/**\n * VexTab 1.0.0\n */\n".into()),
            ..Options::default()
        };
        let job = Job {
            inputs: &inputs,
            output: Utf8Path::new("/p/build/vextab-min.js"),
            options: &options,
            cwd: Utf8Path::new("/p"),
            scratch: Utf8Path::new("/p/build/.scratch"),
        };

        assert_eq!(
            Uglify::args(&job, &inputs[0], Utf8Path::new("/p/build/.scratch/vextab-min.js")),
            vec![
                "/p/build/vextab-debug.js",
                "--compress",
                "--mangle",
                "-o",
                "/p/build/.scratch/vextab-min.js",
                "--source-map",
                "base='/p/build',filename='vextab-min.js',url='vextab-min.js.map'",
                "--preamble",
                "/**\n * VexTab 1.0.0\n */"
            ]
        );
    }

    #[test]
    fn test_strip_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(root.join("debug.js"), "  a();\n\n  b();\n").unwrap();

        let inputs = [root.join("debug.js")];
        let options = Options {
            banner: Some("/* b */\n".into()),
            ..Options::default()
        };
        let output = root.join("min.js");
        let job = Job {
            inputs: &inputs,
            output: &output,
            options: &options,
            cwd: root,
            scratch: root,
        };

        let result = Strip.transform(&job).unwrap();
        assert_eq!(
            result.code,
            b"/* b */\na();\nb();\n//# sourceMappingURL=min.js.map\n"
        );

        let map: serde_json::Value = serde_json::from_slice(&result.map.unwrap()).unwrap();
        assert_eq!(map["file"], "min.js");
        assert_eq!(map["sources"][0], "debug.js");
    }

    #[test]
    fn test_strip_missing_input() {
        let inputs = [Utf8Path::new("/definitely/not/here.js").to_owned()];
        let job = Job {
            inputs: &inputs,
            output: Utf8Path::new("/tmp/out.js"),
            options: &Options::default(),
            cwd: Utf8Path::new("/"),
            scratch: Utf8Path::new("/tmp"),
        };
        assert!(matches!(
            Strip.transform(&job),
            Err(AdapterError::MissingInput(_))
        ));
    }
}
