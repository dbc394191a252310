/**
 * ng-build
 *
 * Builds an Angular project once, or keeps rebuilding it in watch mode.
 */
use anyhow::{Context, Result};
use angular_build::bundler::{AngularBuilder, BuildResult, BuilderOptions};
use angular_build::compile::WorkerPool;
use angular_build::ngtsc::file_system::{FileSystem, LocalFileSystem};
use angular_build::perform_compile::{exit_code_from_result, format_diagnostics};
use angular_build::perform_watch::{
    project_root, ChangeSource, NotifyChangeSource, RebuildOrchestrator, WatchSet,
};
use angular_build::transformers::api::HostOptions;
use clap::{Arg, ArgAction, Command};
use std::process;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use ts::join_paths;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(2);
        }
    }
}

fn cli() -> Command {
    Command::new("ng-build")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Incremental Angular application builder")
        .arg(
            Arg::new("project")
                .short('p')
                .long("project")
                .value_name("PATH")
                .default_value("tsconfig.json")
                .help("Path to tsconfig.json or its directory"),
        )
        .arg(
            Arg::new("output-path")
                .short('o')
                .long("output-path")
                .value_name("DIR")
                .help("Directory the output files are written to"),
        )
        .arg(
            Arg::new("cache")
                .long("cache")
                .value_name("DIR")
                .help("Persistent cache directory shared between runs"),
        )
        .arg(
            Arg::new("watch")
                .short('w')
                .long("watch")
                .action(ArgAction::SetTrue)
                .help("Rebuild when files change"),
        )
        .arg(
            Arg::new("jit")
                .long("jit")
                .action(ArgAction::SetTrue)
                .help("Load component resources at runtime instead of inlining them"),
        )
}

fn run() -> Result<i32> {
    let matches = cli().get_matches();
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
    let cwd = fs.pwd();
    let absolute = |path: &String| join_paths(&cwd, path);

    let project = matches
        .get_one::<String>("project")
        .map(absolute)
        .unwrap_or_else(|| join_paths(&cwd, "tsconfig.json"));
    let output_path = matches.get_one::<String>("output-path").map(absolute);
    let cache_path = matches.get_one::<String>("cache").map(absolute);
    let watch = matches.get_flag("watch");

    let pool = Arc::new(WorkerPool::new(None).context("failed to start worker pool")?);
    let options = BuilderOptions {
        project: project.clone(),
        jit: matches.get_flag("jit"),
        host_options: HostOptions {
            cache_path: cache_path.clone(),
            ..Default::default()
        },
        output_path: output_path.clone(),
    };
    let builder = AngularBuilder::new(Arc::clone(&fs), options, Some(Arc::clone(&pool)));
    let watch_set = WatchSet::new(fs.as_ref(), &project, output_path.as_deref(), cache_path.as_deref());

    if watch {
        // Output is written back under the output path on every pass.
        let ignored: Vec<String> = watch_set
            .ignored()
            .iter()
            .cloned()
            .chain(output_path.iter().cloned())
            .collect();
        let source = NotifyChangeSource::new(ignored).context("failed to start file watcher")?;
        info!(root = %project_root(&project), "watching for changes");
        drive(fs.as_ref(), RebuildOrchestrator::new(builder, Some(source), Some(pool), watch_set))
    } else {
        drive(
            fs.as_ref(),
            RebuildOrchestrator::<NotifyChangeSource>::new(builder, None, Some(pool), watch_set),
        )
    }
}

/// Reports every result until the orchestrator stops. Returns the exit code
/// of the last pass.
fn drive<S: ChangeSource>(fs: &dyn FileSystem, mut orchestrator: RebuildOrchestrator<S>) -> Result<i32> {
    let mut last_code = 0;
    for result in orchestrator.by_ref() {
        last_code = report(fs, &result)?;
    }
    orchestrator.teardown()?;
    Ok(last_code)
}

/// Prints the diagnostics of a pass and writes its output. Returns the exit
/// code for the pass.
fn report(fs: &dyn FileSystem, result: &BuildResult) -> Result<i32> {
    if let Some(fatal) = &result.fatal {
        eprintln!("error: {}", fatal);
        return Ok(2);
    }
    if !result.diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&result.diagnostics));
    }
    for output in &result.output_files {
        if !output.path.starts_with('/') {
            continue;
        }
        fs.write_file(&output.path, output.contents.as_bytes())
            .with_context(|| format!("failed to write {}", output.path))?;
    }
    if result.output_files.iter().any(|output| !output.path.starts_with('/')) {
        warn!("no output path given; output files were not written");
    }
    debug!(defines = ?result.defines, "global constants for the bundler");
    info!(
        outputs = result.output_files.len(),
        rebuilt = result.rebuilt_modules.len(),
        "pass complete"
    );
    Ok(exit_code_from_result(&result.diagnostics))
}
