use std::collections::BTreeSet;
use std::fs;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use kiln::adapter::{Linter, Strip, TestReport, TestRunner, Toolbox, Transformed, custom};
use kiln::config::LintRules;
use kiln::release::{CommitOutcome, Vcs};
use kiln::{AdapterError, Blueprint, BumpPolicy, Config, KilnError, Project, Session, recipe};

const WRAPPER: &str = "Lib.Div = function(sel) { this.sel = sel; };\n";

struct Fixture {
    _dir: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let files = [
            ("package.json", "{\n  \"name\": \"vextab\",\n  \"version\": \"1.0.0\"\n}\n"),
            ("src/vextab.jison", "%lex\n%%\n"),
            ("src/main.coffee", "Lib = {}\n"),
            ("src/player.coffee", "class Player\n"),
            ("src/tabdiv.js", WRAPPER),
            ("tests/vextab_tests.coffee", "test 'x'\n"),
            ("tests/runtest.html", "<html></html>\n"),
            ("doc/vextab.css", ".vex-tabdiv {}\n"),
        ];
        for (path, text) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }

        Self { _dir: dir, root }
    }

    fn session(&self, date: NaiveDate) -> Session {
        let project = Project::new(self.root.clone(), Config::default());
        Session::open(project, BumpPolicy::Patch, date).unwrap()
    }

    fn build(&self, name: &str) -> Vec<u8> {
        fs::read(self.root.join("build").join(name)).unwrap()
    }

    fn build_text(&self, name: &str) -> String {
        String::from_utf8(self.build(name)).unwrap()
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

struct Quiet;

impl Linter for Quiet {
    fn name(&self) -> &str {
        "quiet"
    }

    fn check(&self, files: &[Utf8PathBuf], _: &LintRules, _: &Utf8Path, _: &Utf8Path) -> Result<(), AdapterError> {
        assert!(!files.is_empty());
        Ok(())
    }
}

struct Fixed(TestReport);

impl TestRunner for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn run(&self, page: &Utf8Path, _: &Utf8Path) -> Result<TestReport, AdapterError> {
        if !page.is_file() {
            return Err(AdapterError::MissingInput(page.to_owned()));
        }
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct Recorder {
    commits: Mutex<Vec<(Vec<Utf8PathBuf>, String)>>,
    tags: Mutex<Vec<String>>,
}

impl Vcs for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn commit(&self, _: &Utf8Path, paths: &[Utf8PathBuf], message: &str) -> Result<CommitOutcome, AdapterError> {
        self.commits
            .lock()
            .unwrap()
            .push((paths.to_vec(), message.to_string()));
        Ok(CommitOutcome::Committed)
    }

    fn tag(&self, _: &Utf8Path, name: &str, _: &str) -> Result<(), AdapterError> {
        self.tags.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn push(&self, _: &Utf8Path, _: Option<&str>) -> Result<(), AdapterError> {
        Ok(())
    }
}

fn read(path: &Utf8Path) -> Result<String, AdapterError> {
    fs::read_to_string(path).map_err(|e| AdapterError::Io(path.to_owned(), e))
}

/// Stand-ins for the external tools: deterministic, in process.
fn toolbox(report: TestReport, vcs: Arc<Recorder>) -> Toolbox {
    Toolbox {
        grammar: custom("fake-jison", |job| {
            let grammar = read(&job.inputs[0])?;
            Ok(Transformed::code(format!(
                "var parser = {{ rules: {} }};\n",
                grammar.lines().count()
            )))
        }),
        bundler: custom("fake-browserify", |job| {
            let mut code = String::new();
            for input in job.inputs {
                if input.extension() == Some("coffee") {
                    code.push_str("var Lib = { parse: function() { return parser; } };\n");
                } else {
                    code.push_str(&read(input)?);
                }
            }
            let map = job
                .options
                .external_map
                .then(|| br#"{"version":3,"sources":[],"mappings":""}"#.to_vec());
            Ok(Transformed {
                code: code.into_bytes(),
                map,
            })
        }),
        compiler: custom("fake-coffee", |job| {
            let mut code = String::new();
            for input in job.inputs {
                code.push_str(&format!("// {}\n", input.file_name().unwrap_or_default()));
            }
            Ok(Transformed::code(code))
        }),
        minifier: Arc::new(Strip),
        linter: Arc::new(Quiet),
        tests: Arc::new(Fixed(report)),
        vcs,
    }
}

fn passing() -> TestReport {
    TestReport {
        passed: 12,
        failed: vec![],
    }
}

fn pipeline(session: &Session, report: TestReport, vcs: Arc<Recorder>) -> kiln::Pipeline {
    recipe::standard(session.config(), &toolbox(report, vcs)).unwrap()
}

#[test]
fn default_builds_bannered_debug_and_minified_bundles() {
    let fixture = Fixture::new();
    let mut session = fixture.session(date(6));
    let pipeline = pipeline(&session, passing(), Arc::default());

    let diagnostics = pipeline.run(&mut session, &["default"]).unwrap();
    assert_eq!(
        diagnostics.completed,
        ["lint", "coffee", "jison", "browserify:lib", "concat", "uglify"]
    );

    let banner = session.banner();
    assert!(banner.contains("VexTab 1.0.0 built on 2024-05-06."));

    // banner, parser, library, wrapper
    let debug = fixture.build_text("vextab-debug.js");
    assert!(debug.starts_with(&banner));
    let parser = debug.find("var parser").unwrap();
    let library = debug.find("var Lib").unwrap();
    let wrapper = debug.find("Lib.Div").unwrap();
    assert!(parser < library);
    assert!(library < wrapper);
    assert!(debug.ends_with(WRAPPER));

    let minified = fixture.build_text("vextab-min.js");
    assert!(minified.starts_with(&banner));
    assert!(minified.contains("Lib.Div = function(sel) { this.sel = sel; };\n"));
    assert!(minified.ends_with("//# sourceMappingURL=vextab-min.js.map\n"));

    let map: serde_json::Value = serde_json::from_slice(&fixture.build("vextab-min.js.map")).unwrap();
    assert_eq!(map["version"], 3);
    assert_eq!(map["file"], "vextab-min.js");
    assert_eq!(map["sources"][0], "vextab-debug.js");
    assert!(!map["mappings"].as_str().unwrap().is_empty());

    let record = session
        .store
        .get(&kiln::Loc::build("vextab-min.js"))
        .unwrap();
    assert_eq!(record.producer, "uglify");
    assert_eq!(record.digest, kiln::Hash32::hash(minified.as_bytes()));
}

#[test]
fn clean_then_rebuild_is_byte_identical() {
    let fixture = Fixture::new();
    let mut session = fixture.session(date(6));
    let pipeline = pipeline(&session, passing(), Arc::default());

    pipeline.run(&mut session, &["default"]).unwrap();
    let debug = fixture.build("vextab-debug.js");
    let minified = fixture.build("vextab-min.js");
    let map = fixture.build("vextab-min.js.map");

    pipeline.run(&mut session, &["clean"]).unwrap();
    assert!(!fixture.root.join("build").exists());

    pipeline.run(&mut session, &["clean", "default"]).unwrap();
    assert_eq!(fixture.build("vextab-debug.js"), debug);
    assert_eq!(fixture.build("vextab-min.js"), minified);
    assert_eq!(fixture.build("vextab-min.js.map"), map);
}

#[test]
fn banner_only_differs_by_date() {
    let fixture = Fixture::new();

    let mut first = fixture.session(date(6));
    pipeline(&first, passing(), Arc::default())
        .run(&mut first, &["default"])
        .unwrap();
    let a = fixture.build_text("vextab-debug.js");

    let mut second = fixture.session(date(7));
    pipeline(&second, passing(), Arc::default())
        .run(&mut second, &["default"])
        .unwrap();
    let b = fixture.build_text("vextab-debug.js");

    assert_ne!(a, b);
    assert_eq!(a.replace("2024-05-06", "2024-05-07"), b);
}

#[test]
fn publish_stages_commits_and_tags() {
    let fixture = Fixture::new();
    let mut session = fixture.session(date(6));
    let vcs = Arc::new(Recorder::default());
    let pipeline = pipeline(&session, passing(), vcs.clone());

    let diagnostics = pipeline.run(&mut session, &["publish"]).unwrap();
    assert_eq!(diagnostics.completed.first().map(String::as_str), Some("bump"));
    assert_eq!(diagnostics.completed.last().map(String::as_str), Some("release"));

    // version strictly greater, persisted
    assert_eq!(session.version().to_string(), "1.0.1");
    assert_eq!(session.outcome.bumped_from.as_ref().unwrap().to_string(), "1.0.0");
    let descriptor = fs::read_to_string(fixture.root.join("package.json")).unwrap();
    assert!(descriptor.contains("\"version\": \"1.0.1\""));

    // banners of this run carry the new version
    assert!(fixture.build_text("vextab-debug.js").contains("VexTab 1.0.1 built on"));

    let released: BTreeSet<String> = fs::read_dir(fixture.root.join("releases"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(
        released,
        ["vextab-div.js", "vextab-div.js.map", "vextab-lib.js", "vextab.css"]
            .into_iter()
            .map(String::from)
            .collect()
    );

    let commits = vcs.commits.lock().unwrap();
    assert_eq!(commits.len(), 1);
    let (paths, message) = &commits[0];
    assert_eq!(message, "Committing release binaries for new version: 1.0.1");
    assert_eq!(paths.len(), 5);
    assert!(paths.contains(&fixture.root.join("package.json")));
    assert!(paths.contains(&fixture.root.join("releases/vextab-div.js.map")));

    assert_eq!(*vcs.tags.lock().unwrap(), ["v1.0.1"]);
    assert!(session.outcome.committed);
    assert_eq!(session.outcome.tag.as_deref(), Some("v1.0.1"));
}

#[test]
fn publish_with_failing_tests_never_commits() {
    let fixture = Fixture::new();
    let mut session = fixture.session(date(6));
    let vcs = Arc::new(Recorder::default());
    let report = TestReport {
        passed: 11,
        failed: vec!["Basic Tests: bends".into()],
    };
    let pipeline = pipeline(&session, report, vcs.clone());

    let err = pipeline.run(&mut session, &["publish"]).unwrap_err();
    let KilnError::Run(err) = err else {
        panic!("expected a run error, got {err}");
    };

    assert_eq!(err.task, "qunit");
    assert!(err.completed.contains(&"bump".to_string()));
    assert!(!err.completed.contains(&"gitcommit:releases".to_string()));
    assert!(vcs.commits.lock().unwrap().is_empty());
    assert!(vcs.tags.lock().unwrap().is_empty());

    // no rollback: the bump stays
    let descriptor = fs::read_to_string(fixture.root.join("package.json")).unwrap();
    assert!(descriptor.contains("\"version\": \"1.0.1\""));
}

#[test]
fn group_stops_at_first_failure() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut blueprint = Blueprint::new();

    for name in ["a", "b", "c"] {
        let log = log.clone();
        blueprint
            .task(name)
            .run(move |cx| {
                log.lock().unwrap().push(cx.name.to_string());
                match cx.name {
                    "b" => anyhow::bail!("b broke"),
                    _ => Ok(()),
                }
            })
            .unwrap();
    }
    blueprint.task("all").group(["a", "b", "c"]).unwrap();
    let pipeline = blueprint.finish();

    let fixture = Fixture::new();
    let mut session = fixture.session(date(6));

    let KilnError::Run(err) = pipeline.run(&mut session, &["all"]).unwrap_err() else {
        panic!("expected a run error");
    };
    assert_eq!(err.task, "b");
    assert_eq!(err.completed, ["a"]);
    assert!(err.to_string().contains("b broke"));
    assert_eq!(*log.lock().unwrap(), ["a", "b"]);
}

#[test]
fn unknown_target_runs_nothing() {
    let fixture = Fixture::new();
    let mut session = fixture.session(date(6));
    let pipeline = pipeline(&session, passing(), Arc::default());

    let err = pipeline
        .run(&mut session, &["clean", "deploy"])
        .unwrap_err();
    assert!(matches!(err, KilnError::Plan(kiln::PlanError::Unknown { .. })));
    assert!(fixture.root.join("src/tabdiv.js").exists());
    assert!(!fixture.root.join("build").exists());
}
