//! monoci - change-aware builds for monorepos
//!
//! The `monoci` command triggers CI builds only for the projects that changed
//! since the last successful run of a workflow.
//!
//! ## Commands
//!
//! - `build`: Trigger, wait for and (on timeout) cancel builds of changed projects
//! - `list projects`: Print the projects that have changes

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use monoci_core::{
    BuildConfig, BuildOrchestrator, BuildOutput, ChangeDetector, ConsolePresenter, JsonPresenter,
    PipelineGateway, RunOutcome,
};
use monoci_git::GitGateway;
use monoci_github::{GitHubActionEnv, GitHubActionsGateway};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "monoci")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build only what changed in a monorepo", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Format of build progress written to stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger build workflow for projects that have changes
    Build {
        #[command(flatten)]
        target: PipelineArgs,

        /// Join projects into a single project and trigger only one workflow
        #[arg(long)]
        once: bool,

        /// Seconds between build status polls
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Seconds to wait for builds before cancelling them
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// List various types of information
    List {
        #[command(subcommand)]
        action: ListAction,
    },
}

#[derive(Subcommand)]
enum ListAction {
    /// List projects that have changes since the last successful build
    Projects {
        #[command(flatten)]
        target: PipelineArgs,

        /// Join projects into a single `|a|b|` project
        #[arg(long)]
        join: bool,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Candidate project paths, relative to the repository root
    #[arg(required = true, num_args = 1..)]
    paths: Vec<String>,

    /// CI provider, e.g. "github"
    #[arg(short = 'C', long, env = "CI_TOOL")]
    ci_tool: String,

    /// Workflow ID, e.g. a file name for GitHub Actions
    #[arg(short = 'W', long = "workflow", env = "WORKFLOW_ID")]
    workflow_id: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    monoci_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Build {
            target,
            once,
            interval_secs,
            timeout_secs,
        } => cmd_build(&target, once, interval_secs, timeout_secs, cli.output).await,
        Commands::List { action } => match action {
            ListAction::Projects { target, join } => cmd_list_projects(&target, join).await,
        },
    }
}

/// Build changed projects and map the run outcome onto the process exit code.
async fn cmd_build(
    target: &PipelineArgs,
    once: bool,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let config = build_config(interval_secs, timeout_secs)?;
    let (pipeline, vcs, paths) = open_gateways(target).await?;
    info!(
        workflow = %target.workflow_id,
        poll_interval_secs = config.poll_interval.as_secs(),
        max_duration_secs = config.max_duration.as_secs_f64(),
        "Starting build"
    );

    let orchestrator = BuildOrchestrator::new(pipeline, vcs, output_for(format), config);
    let outcome = orchestrator.run(&paths, &target.workflow_id, once).await;
    Ok(exit_code(&outcome))
}

async fn cmd_list_projects(target: &PipelineArgs, join: bool) -> Result<ExitCode> {
    let (pipeline, vcs, paths) = open_gateways(target).await?;
    let detector = ChangeDetector::new(pipeline, vcs);

    if join {
        let joined = detector
            .list_projects_joined(&paths, &target.workflow_id)
            .await
            .context("can't list projects that have changes")?;
        println!("{joined}");
    } else {
        let projects = detector
            .list_projects(&paths, &target.workflow_id)
            .await
            .context("can't list projects that have changes")?;
        for project in projects {
            println!("{project}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

type Gateways = (Arc<dyn PipelineGateway>, Arc<GitGateway>, Vec<String>);

async fn open_gateways(target: &PipelineArgs) -> Result<Gateways> {
    let work_dir = std::env::current_dir().context("can't get current directory")?;
    let vcs = GitGateway::open(&work_dir)
        .await
        .context("can't create CI controller")?;
    let pipeline = pipeline_for(&target.ci_tool, GitHubActionEnv::from_env())
        .context("can't create CI controller")?;
    let paths = rel_paths_if_possible(&work_dir, &target.paths);
    Ok((pipeline, Arc::new(vcs), paths))
}

/// Pipeline gateway for a CI tool name.
fn pipeline_for(tool: &str, github_env: GitHubActionEnv) -> Result<Arc<dyn PipelineGateway>> {
    match tool {
        "github" => {
            github_env
                .validate()
                .context("invalid GitHub Actions environment")?;
            Ok(Arc::new(GitHubActionsGateway::new(github_env)?))
        }
        "bitbucket" | "circleci" | "travis" => {
            bail!("CI_TOOL \"{tool}\" is not currently supported")
        }
        _ => bail!("CI_TOOL \"{tool}\" is invalid or unsupported"),
    }
}

fn output_for(format: OutputFormat) -> Arc<dyn BuildOutput> {
    match format {
        OutputFormat::Text => Arc::new(ConsolePresenter::new(std::io::stdout())),
        OutputFormat::Json => Arc::new(JsonPresenter::new(std::io::stdout())),
    }
}

/// Environment defaults, overridden by explicit flags.
fn build_config(interval_secs: Option<u64>, timeout_secs: Option<u64>) -> Result<BuildConfig> {
    let base = BuildConfig::from_env().context("invalid build configuration")?;
    let config = BuildConfig::new(
        interval_secs
            .map(Duration::from_secs)
            .unwrap_or(base.poll_interval),
        timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(base.max_duration),
    )
    .context("invalid build configuration")?;
    Ok(config)
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Absolute paths under `work_dir` become relative; everything else is kept as given.
fn rel_paths_if_possible(work_dir: &Path, paths: &[String]) -> Vec<String> {
    paths
        .iter()
        .map(|raw| {
            let path = Path::new(raw);
            if !path.is_absolute() {
                return raw.clone();
            }
            match path.strip_prefix(work_dir) {
                Ok(rel) => rel.to_string_lossy().into_owned(),
                Err(_) => raw.clone(),
            }
        })
        .collect()
}
