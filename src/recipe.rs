//! The standard build-and-release pipeline.
//!
//! | task                 | does                                              |
//! |----------------------|---------------------------------------------------|
//! | `lint`               | coffeelint over the CoffeeScript sources          |
//! | `coffee`             | compiles the player module                        |
//! | `jison`              | compiles the grammar into a CommonJS parser       |
//! | `browserify:lib`     | bundles the library (after `jison`)               |
//! | `browserify:tabdiv`  | bundles the wrapper with an external source map   |
//! | `browserify:tests`   | bundles the test suite                            |
//! | `concat`             | banner + parser + library + wrapper               |
//! | `uglify`             | minifies the debug bundle, writes a source map    |
//! | `qunit`              | runs the test page headless                       |
//! | `copy:css`           | stylesheets into the release directory            |
//! | `copy:release`       | release set into the release directory            |
//! | `bump`               | next version into the package descriptor          |
//! | `gitcommit:releases` | commits the release directory and the descriptor  |
//! | `release`            | tags, optionally pushes and publishes             |
//! | `clean`              | deletes the build and release directories         |
//!
//! plus the groups `default`, `build`, `test`, `stage` and `publish`.

use std::sync::Arc;

use crate::actions::{Assemble, Clean, CopySet, Invoke, Lint, RunTests};
use crate::adapter::{Options, Toolbox};
use crate::blueprint::{Blueprint, Pipeline};
use crate::config::{BumpTiming, Config};
use crate::error::PlanError;
use crate::release::{Bump, Commit, MarkReleased};
use crate::store::Loc;

const COFFEEIFY: &str = "coffeeify";

/// Registers every task of the standard pipeline, wired with `tools`.
pub fn standard(config: &Config, tools: &Toolbox) -> Result<Pipeline, PlanError> {
    let mut blueprint = Blueprint::new();
    let layout = &config.layout;
    let outputs = &config.outputs;

    let bundle = |standalone: &str, external_map: bool| Options {
        standalone: Some(standalone.to_string()),
        debug: true,
        external_map,
        transforms: vec![COFFEEIFY.into()],
        extensions: vec![".coffee".into()],
        ..Options::default()
    };

    blueprint
        .task("lint")
        .describe("Check the CoffeeScript sources.")
        .action(Arc::new(Lint {
            linter: tools.linter.clone(),
            patterns: layout.lint.clone(),
        }))?;

    blueprint
        .task("coffee")
        .describe("Compile the player module.")
        .action(Arc::new(Invoke {
            adapter: tools.compiler.clone(),
            inputs: layout.player.iter().cloned().map(Loc::source).collect(),
            output: Loc::build(&outputs.player),
            options: Options::default(),
            banner: false,
        }))?;

    blueprint
        .task("jison")
        .describe("Compile the grammar into a parser module.")
        .action(Arc::new(Invoke {
            adapter: tools.grammar.clone(),
            inputs: vec![Loc::source(&layout.grammar)],
            output: Loc::build(&outputs.grammar),
            options: Options {
                module_type: Some("commonjs".into()),
                ..Options::default()
            },
            banner: false,
        }))?;

    blueprint
        .task("browserify:lib")
        .describe("Bundle the library.")
        .after(["jison"])
        .action(Arc::new(Invoke {
            adapter: tools.bundler.clone(),
            inputs: layout.library.iter().cloned().map(Loc::source).collect(),
            output: Loc::build(&outputs.library),
            options: bundle(&layout.standalone, false),
            banner: false,
        }))?;

    blueprint
        .task("browserify:tabdiv")
        .describe("Bundle the runtime wrapper.")
        .action(Arc::new(Invoke {
            adapter: tools.bundler.clone(),
            inputs: vec![Loc::source(&layout.wrapper)],
            output: Loc::build(&outputs.wrapper),
            options: bundle(&layout.standalone, true),
            banner: false,
        }))?;

    blueprint
        .task("browserify:tests")
        .describe("Bundle the test suite.")
        .action(Arc::new(Invoke {
            adapter: tools.bundler.clone(),
            inputs: layout.tests.iter().cloned().map(Loc::source).collect(),
            output: Loc::build(&outputs.tests),
            options: bundle(&layout.test_standalone, false),
            banner: false,
        }))?;

    blueprint
        .task("concat")
        .describe("Assemble the debug bundle.")
        .after(["jison", "browserify:lib"])
        .action(Arc::new(Assemble {
            parts: vec![
                Loc::build(&outputs.grammar),
                Loc::build(&outputs.library),
                Loc::source(&layout.wrapper),
            ],
            output: Loc::build(&outputs.debug),
        }))?;

    blueprint
        .task("uglify")
        .describe("Minify the debug bundle.")
        .after(["concat"])
        .action(Arc::new(Invoke {
            adapter: tools.minifier.clone(),
            inputs: vec![Loc::build(&outputs.debug)],
            output: Loc::build(&outputs.minified),
            options: Options::default(),
            banner: true,
        }))?;

    blueprint
        .task("qunit")
        .describe("Run the tests headless.")
        .after(["browserify:tests"])
        .action(Arc::new(RunTests {
            runner: tools.tests.clone(),
            page: Loc::source(&layout.test_page),
        }))?;

    blueprint
        .task("copy:css")
        .describe("Copy the stylesheets into the release directory.")
        .action(Arc::new(CopySet {
            items: layout
                .stylesheets
                .iter()
                .map(|css| (Loc::doc(css), Loc::release(css)))
                .collect(),
        }))?;

    blueprint
        .task("copy:release")
        .describe("Copy the release set into the release directory.")
        .after(["browserify:lib", "browserify:tabdiv"])
        .action(Arc::new(CopySet {
            items: config
                .release
                .targets
                .iter()
                .map(|target| (Loc::build(target), Loc::release(target)))
                .collect(),
        }))?;

    blueprint
        .task("bump")
        .describe("Bump the package version.")
        .action(Arc::new(Bump))?;

    blueprint
        .task("gitcommit:releases")
        .describe("Commit the release files and the package descriptor.")
        .action(Arc::new(Commit {
            vcs: tools.vcs.clone(),
        }))?;

    blueprint
        .task("release")
        .describe("Mark the version released.")
        .action(Arc::new(MarkReleased {
            vcs: tools.vcs.clone(),
        }))?;

    blueprint
        .task("clean")
        .describe("Delete the build and release directories.")
        .action(Arc::new(Clean))?;

    blueprint
        .task("default")
        .describe("Lint, compile, assemble and minify.")
        .group(["lint", "coffee", "jison", "concat", "uglify"])?;

    blueprint
        .task("build")
        .describe("Build the library and the wrapper.")
        .group(["jison", "browserify:lib", "browserify:tabdiv"])?;

    blueprint
        .task("test")
        .describe("Bundle and run the tests.")
        .group(["browserify:tests", "qunit"])?;

    blueprint
        .task("stage")
        .describe("Stage current binaries into the release directory.")
        .group(["default", "copy:css", "copy:release"])?;

    let publish = match config.release.bump {
        BumpTiming::First => ["bump", "stage", "test", "gitcommit:releases", "release"],
        BumpTiming::BeforeCommit => {
            tracing::info!("release.bump = before-commit: publish tests before bumping");
            ["test", "bump", "stage", "gitcommit:releases", "release"]
        }
    };

    blueprint
        .task("publish")
        .describe("Bump, stage, test, commit and mark released.")
        .group(publish)?;

    Ok(blueprint.finish())
}
