//! resty CLI - Markdown/YAML driven REST API test runner.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use resty::discovery;
use resty::executor::ExecutorOptions;
use resty::orchestrator::{Orchestrator, RunOptions};
use resty::report::{self, console, OutputFormat};

/// Markdown/YAML driven REST API test runner.
#[derive(Parser)]
#[command(name = "resty")]
#[command(about = "Markdown/YAML driven REST API test runner", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"), disable_version_flag = true)]
struct Cli {
    /// Files or directories to discover tests in; defaults to the current directory
    paths: Vec<PathBuf>,

    /// Print version and exit
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: (),

    /// Parse and validate only; do not execute
    #[arg(long)]
    dry_run: bool,

    /// List discovered tests instead of running them
    #[arg(short, long)]
    list: bool,

    /// Run every discovered test (default when no `-t`/`-f` given)
    #[arg(short, long, visible_alias = "run-all")]
    all: bool,

    /// Recurse into subdirectories
    #[arg(short, long, action = clap::ArgAction::Set, default_value_t = true)]
    recursive: bool,

    /// Add a path (repeatable; combined with positional paths)
    #[arg(short, long = "path")]
    path: Vec<PathBuf>,

    /// Run specific test by exact name (repeatable)
    #[arg(short, long = "test")]
    test: Vec<String>,

    /// Run tests whose names contain the pattern, case-insensitive (repeatable)
    #[arg(short, long = "filter")]
    filter: Vec<String>,

    /// Output format: text|markdown|json|xml|html
    #[arg(short, long, default_value = "text")]
    output: String,

    /// Save results to file
    #[arg(short, long = "save")]
    save: Option<PathBuf>,

    /// Reserved; no semantics required
    #[arg(long)]
    parallel: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable mocking globally (mock-first, then network)
    #[arg(long)]
    mock: bool,

    /// Enable coloured console output
    #[arg(short, long, action = clap::ArgAction::Set, default_value_t = true)]
    color: bool,

    /// Verbose output
    #[arg(long)]
    verbose: bool,
}

/// Flag names this CLI recognises, long and short, for the `/flag` rewrite
/// below. Kept as a flat list rather than deriving it from `Cli` — clap
/// doesn't expose parsed arg metadata before parsing.
const LONG_FLAGS: &[&str] = &[
    "dry-run", "list", "all", "run-all", "recursive", "path", "test", "filter", "output", "save",
    "parallel", "timeout", "mock", "color", "verbose", "help", "version",
];
const SHORT_FLAGS: &str = "larptfoscvh";

/// Rewrites `/flag` and `/flag=value` arguments into clap's native
/// `--flag`/`-f` form before parsing, so every flag accepts a `-`, `--`, or
/// `/` prefix. Anything not matching a known flag name — including an
/// ordinary absolute path passed positionally — is left untouched.
fn normalize_slash_flags(args: impl Iterator<Item = String>) -> Vec<String> {
    args.map(|arg| {
        let Some(rest) = arg.strip_prefix('/') else {
            return arg;
        };
        let (name, suffix) = match rest.split_once('=') {
            Some((n, v)) => (n, format!("={v}")),
            None => (rest, String::new()),
        };
        if LONG_FLAGS.contains(&name) {
            format!("--{name}{suffix}")
        } else if name.len() == 1 && SHORT_FLAGS.contains(name) {
            format!("-{name}{suffix}")
        } else {
            arg
        }
    })
    .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw_args = normalize_slash_flags(std::env::args());
    let cli = Cli::parse_from(raw_args);

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let format: OutputFormat = cli.output.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let mut search_paths = cli.paths.clone();
    search_paths.extend(cli.path.clone());
    if search_paths.is_empty() {
        search_paths.push(PathBuf::from("."));
    }

    let files = discovery::discover_files(&search_paths, cli.recursive);
    info!(count = files.len(), "discovered test files");

    if cli.list {
        for file in &files {
            println!("{}", file.display());
        }
        return Ok(());
    }

    let global_mock = cli.mock || mock_env_enabled();

    let mut executor_options = ExecutorOptions::default();
    if let Some(secs) = cli.timeout {
        executor_options.timeout_override = Some(std::time::Duration::from_secs(secs));
    }
    executor_options.global_mock = global_mock;

    let selected_tests = if cli.all { Vec::new() } else { cli.test.clone() };

    let options = RunOptions {
        selected_tests,
        filters: cli.filter.clone(),
        dry_run: cli.dry_run,
        executor: executor_options,
        cancel: Arc::new(AtomicBool::new(false)),
    };

    let orchestrator = Orchestrator::new(options);
    let outcome = orchestrator.run(&files).await;

    console::print_summary(&outcome.summary, cli.color);

    let rendered = report::render(format, &outcome.summary);
    if let Some(path) = &cli.save {
        fs::write(path, &rendered)
            .with_context(|| format!("failed to write results to {}", path.display()))?;
        info!(path = %path.display(), "saved results");
    } else if !matches!(format, OutputFormat::Text) {
        println!("{rendered}");
    }

    std::process::exit(outcome.exit_code());
}

fn mock_env_enabled() -> bool {
    std::env::var("RESTY_MOCK")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
