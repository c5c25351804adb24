use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use agency_supervisor::agency::{Agency, InMemoryAgency};
use agency_supervisor::config::{load_state_file, NodeConfig, SupervisionConfig};
use agency_supervisor::node::SupervisionNode;
use agency_supervisor::shutdown::install_shutdown_handler;
use agency_supervisor::supervision::{list_jobs, JobSummary, Supervisor, TickReport};

#[derive(Parser, Debug)]
#[command(name = "agency-supervisor")]
#[command(version)]
#[command(about = "Failover supervision for a cluster's replicated configuration store")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the supervision loop until SIGTERM/SIGINT
    Run(RunArgs),

    /// Run a fixed number of ticks against a state file and print the jobs
    Tick(TickArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct SupervisionArgs {
    /// Root of the cluster's key space in the agency
    #[arg(long, default_value = "/arango")]
    prefix: String,

    /// Creator id recorded on jobs
    #[arg(long, default_value = "supervision")]
    creator: String,

    /// Seed for follower selection (random if unset)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    supervision: SupervisionArgs,

    /// Milliseconds between supervision ticks
    #[arg(long, default_value = "1000")]
    tick_interval_ms: u64,

    /// Port for the dashboard and agency HTTP API (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// JSON file with the initial agency tree
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct TickArgs {
    #[command(flatten)]
    supervision: SupervisionArgs,

    /// JSON file with the agency tree to supervise
    #[arg(long)]
    state_file: PathBuf,

    /// Number of ticks to run
    #[arg(long, short = 'n', default_value = "1")]
    ticks: u32,

    /// Write the resulting agency tree to this file
    #[arg(long)]
    write: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct TickOutput {
    ticks: Vec<TickReport>,
    jobs: Vec<JobSummary>,
    last_index: u64,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn supervision_config(args: &SupervisionArgs) -> SupervisionConfig {
    let config = SupervisionConfig::new(&args.prefix).with_creator(&args.creator);
    match args.seed {
        Some(seed) => config.with_rng_seed(seed),
        None => config,
    }
}

fn print_jobs_table(jobs: &[JobSummary]) {
    if jobs.is_empty() {
        println!("No jobs");
        return;
    }
    println!(
        "{:<36} {:<9} {:<20} {:<12} {:<10} {:>6}  REASON",
        "JOB ID", "STATUS", "TYPE", "SERVER", "SHARD", "AGE"
    );
    for job in jobs {
        println!(
            "{:<36} {:<9} {:<20} {:<12} {:<10} {:>6}  {}",
            job.job_id,
            job.status.to_string(),
            job.job_type,
            job.server.as_deref().unwrap_or("-"),
            job.shard.as_deref().unwrap_or("-"),
            job.age_secs.map(|s| format!("{}s", s)).unwrap_or_else(|| "-".to_string()),
            job.reason.as_deref().unwrap_or(""),
        );
    }
}

// =============================================================================
// Commands
// =============================================================================

async fn run_node(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let supervision =
        supervision_config(&args.supervision).with_tick_interval_ms(args.tick_interval_ms);
    let mut config = NodeConfig::new(supervision);
    if let Some(port) = args.dashboard_port {
        let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;
        config = config.with_dashboard(addr);
    }
    if let Some(path) = args.state_file {
        config = config.with_state_file(path);
    }

    tracing::info!(
        prefix = %config.supervision.prefix,
        dashboard = ?config.dashboard_addr,
        "Starting supervision node"
    );

    let node = SupervisionNode::new(config)?;
    let shutdown = install_shutdown_handler();
    node.run(shutdown).await?;
    Ok(())
}

fn run_ticks(args: TickArgs) -> Result<(), Box<dyn std::error::Error>> {
    let tree = load_state_file(&args.state_file)?;
    let agency = Arc::new(InMemoryAgency::with_tree(tree));
    let config = supervision_config(&args.supervision);
    let prefix = config.prefix.clone();
    let mut supervisor = Supervisor::new(agency.clone(), config);

    let mut ticks = Vec::with_capacity(args.ticks as usize);
    for _ in 0..args.ticks {
        ticks.push(supervisor.tick()?);
    }

    let snapshot = agency.read(&prefix)?;
    let jobs = list_jobs(&snapshot, chrono::Utc::now());

    if let Some(path) = &args.write {
        std::fs::write(path, serde_json::to_string_pretty(&agency.dump()?)?)?;
        tracing::info!(path = %path.display(), "Wrote agency state");
    }

    match args.output {
        OutputFormat::Json => {
            let output = TickOutput {
                ticks,
                jobs,
                last_index: agency.last_index()?,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            let created: usize = ticks.iter().map(|t| t.created.len()).sum();
            println!(
                "Ran {} tick(s): {} job(s) created, agency at index {}",
                ticks.len(),
                created,
                agency.last_index()?
            );
            println!();
            print_jobs_table(&jobs);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Run(run_args) => run_node(run_args).await,
        Commands::Tick(tick_args) => {
            init_tracing();
            run_ticks(tick_args)
        }
    }
}
