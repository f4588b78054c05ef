use std::process::ExitCode;
use std::time::Instant;

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::Parser;
use console::style;
use kiln::adapter::Toolbox;
use kiln::{BumpPolicy, Project, Session, recipe};

/// Pseudo-target that keeps rebuilding on source changes.
const WATCH: &str = "watch";

#[derive(Parser, Debug, Clone)]
#[command(name = "kiln", version, about)]
struct Args {
    /// Tasks to run, in order. Defaults to `default`.
    #[clap(index = 1)]
    tasks: Vec<String>,

    /// Project root.
    #[clap(long, default_value = ".")]
    root: Utf8PathBuf,

    /// Configuration file, defaults to `kiln.toml` in the project root.
    #[clap(long)]
    config: Option<Utf8PathBuf>,

    /// Version bump: patch, minor, major or an explicit version.
    #[clap(long, default_value = "patch")]
    bump: BumpPolicy,

    /// Date printed in the banner, defaults to today.
    #[clap(long)]
    date: Option<NaiveDate>,

    /// List the registered tasks and exit.
    #[clap(long)]
    list: bool,

    /// Print the plan of the given tasks as a Mermaid diagram and exit.
    #[clap(long)]
    graph: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    #[cfg(feature = "logging")]
    if let Err(e) = kiln::init_logging() {
        eprintln!("{e}");
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let project = Project::load(&args.root, args.config.as_deref())?;
    let tools = Toolbox::from_config(&project.config);
    let pipeline = recipe::standard(&project.config, &tools)?;

    if args.list {
        for task in pipeline.tasks() {
            let kind = if task.is_composite() { "group" } else { "task" };
            println!(
                "{:<20} {:<6} {}",
                style(task.name()).cyan(),
                kind,
                task.description().unwrap_or_default()
            );
        }
        println!(
            "{:<20} {:<6} Rebuild `{}` on every source change.",
            style(WATCH).cyan(),
            "mode",
            project.config.watch.task
        );
        return Ok(());
    }

    let mut targets = args.tasks;
    let watch = targets.iter().any(|t| t == WATCH);
    targets.retain(|t| t != WATCH);
    if targets.is_empty() {
        targets.push(match watch {
            true => project.config.watch.task.clone(),
            false => "default".into(),
        });
    }

    if args.graph {
        let plan = pipeline.plan(&targets)?;
        println!("{}", pipeline.render_mermaid(&plan, None));
        return Ok(());
    }

    let date = args
        .date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let mut session = Session::open(project, args.bump, date)?;

    if watch {
        return watch_mode(&pipeline, &mut session, &targets);
    }

    eprintln!(
        "Running {} {} for {} {}.",
        style("kiln").red(),
        style(targets.join(" ")).blue(),
        session.package.name(),
        session.version()
    );

    let s = Instant::now();
    let diagnostics = pipeline.run(&mut session, &targets)?;

    eprintln!("{}", diagnostics.summary());
    eprintln!(
        "{} in {:.2?}",
        style("Finished").green().bold(),
        s.elapsed()
    );

    if let Some(previous) = &session.outcome.bumped_from {
        eprintln!("Version {} -> {}", previous, session.version());
    }

    Ok(())
}

#[cfg(feature = "live")]
fn watch_mode(
    pipeline: &kiln::Pipeline,
    session: &mut Session,
    targets: &[String],
) -> anyhow::Result<()> {
    eprintln!(
        "Running {} in {} mode.",
        style("kiln").red(),
        style(WATCH).blue()
    );
    pipeline.watch(session, targets)?;
    Ok(())
}

#[cfg(not(feature = "live"))]
fn watch_mode(_: &kiln::Pipeline, _: &mut Session, _: &[String]) -> anyhow::Result<()> {
    anyhow::bail!("watch mode needs the `live` feature")
}
