//! ezbhddm CLI - Parameter-recovery simulations for the hierarchical EZ diffusion model.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ezbhddm::estimation::{self, ModelSpec};
use ezbhddm::grid::SweepSummary;
use ezbhddm::models::{DesignType, TargetParameter};
use ezbhddm::pool::{CellTask, TaskOutcome};
use ezbhddm::{
    CheckpointManager, Config, GridRunner, ReportStyle, SimulationCell, SimulationGrid,
    WienerGenerator, WorkerPool,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ezbhddm")]
#[command(version)]
#[command(about = "Parameter-recovery simulations for the hierarchical EZ diffusion model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep the design grid, resuming from checkpoints
    Run {
        /// Only these covariate targets (default: from config)
        #[arg(short, long)]
        target: Vec<TargetParameter>,

        /// Only these design types (default: from config)
        #[arg(short, long)]
        design: Vec<DesignType>,

        /// Override repetitions per cell
        #[arg(short, long)]
        repetitions: Option<usize>,
    },

    /// Run a single cell and print every failure with diagnostics
    Cell {
        #[arg(short = 'P', long)]
        participants: usize,

        #[arg(short = 'T', long)]
        trials: usize,

        #[arg(long, default_value = "drift")]
        target: TargetParameter,

        #[arg(long, default_value = "ttest")]
        design: DesignType,

        #[arg(short, long, default_value = "10")]
        repetitions: usize,

        /// RNG seed (default: from config, else random)
        #[arg(long)]
        seed: Option<u64>,

        /// Report style: short or long
        #[arg(long, default_value = "long")]
        style: ReportStyle,
    },

    /// Print result tables from checkpoint artifacts
    Report {
        /// Artifact files (default: every artifact in the checkpoint dir)
        paths: Vec<PathBuf>,

        /// Per-cell report style: short or long
        #[arg(long, default_value = "short")]
        style: ReportStyle,

        /// Also print calibration summaries per cell
        #[arg(long)]
        calibration: bool,
    },

    /// List checkpoint artifacts
    List,

    /// Print the model specification handed to the estimation engine
    Model {
        #[arg(long, default_value = "drift")]
        target: TargetParameter,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .context("Invalid progress template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    config.validate()?;
    Ok(config)
}

fn print_example_config() {
    let example = r#"# ezbhddm configuration file

[grid]
participants = [20, 40, 80, 160, 320]
trials = [20, 40, 80, 160, 320]
targets = ["drift", "nondt", "bound"]
designs = ["ttest", "linreg"]
repetitions = 1000
checkpoint_every = 50

[workers]
size = 12
max_task_retries = 1

[engine]
kind = "jags"            # or "ez" for the closed-form estimator
binary = "${JAGS_HOME}/bin/jags"
adapt = 100
burnin = 0
samples = 400
chains = 4
timeout_secs = 600
max_attempts = 1
keep_workdir = false

[prior]
betaweight_mean = 0.0
betaweight_sdev = 1.0
bound_mean_mean = 1.50
bound_mean_sdev = 0.20
drift_mean_mean = 0.00
drift_mean_sdev = 0.50
nondt_mean_mean = 0.30
nondt_mean_sdev = 0.06
bound_sdev_lower = 0.10
bound_sdev_upper = 0.40
drift_sdev_lower = 0.20
drift_sdev_upper = 0.40
nondt_sdev_lower = 0.05
nondt_sdev_upper = 0.25

[output]
checkpoint_dir = "cache"
# seed = 20240601
"#;
    println!("{example}");
}

fn print_sweep(grid: &SimulationGrid, summary: &SweepSummary) {
    println!("\n=== Sweep {} Complete ===", grid.name());
    println!("Tasks:       {}", summary.tasks);
    println!("Repetitions: {}", summary.repetitions);
    println!("Failures:    {}", summary.failures);
    println!("Abandoned:   {:?}", summary.abandoned);
    println!("Runtime:     {:.1}s", summary.elapsed_secs);
    println!();
    println!("{}", grid.table("RMSE", |c| c.statistics.rmse));
}

fn print_grid(grid: &SimulationGrid, style: ReportStyle, calibration: bool) {
    println!("\n=== {} ===", grid.name());
    println!("Run:         {}", grid.run_id);
    println!("Created:     {}", grid.created_at.to_rfc3339());
    println!("Updated:     {}", grid.updated_at.to_rfc3339());
    println!("Seed:        {}", grid.seed);
    println!("Completed:   {}", grid.completed());
    println!("Failures:    {}", grid.failures());
    println!();
    println!("{}\n", grid.table("ME", |c| c.statistics.mean_error));
    println!("{}\n", grid.table("RMSE", |c| c.statistics.rmse));
    println!("{}\n", grid.table("MAE", |c| c.statistics.mae));
    println!("{}\n", grid.table("Failed", |c| c.failure_count as f64));

    for cell in &grid.cells {
        println!("{}", cell.report(style));
        if calibration {
            print_calibration(cell);
        }
    }
}

fn print_calibration(cell: &SimulationCell) {
    for recovery in cell.recovery() {
        println!(
            "  {:<11} bias={:>10.6} rmse={:>10.6}",
            recovery.scalar.name(),
            -recovery.statistics.mean_error,
            recovery.statistics.rmse
        );
    }
    for report in cell.calibration() {
        if report.count > 0 {
            println!("  {report}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match &cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli)?;
            info!("Configuration is valid");
            info!(
                "  Grid: P={:?} T={:?}, {} repetitions",
                config.grid.participants, config.grid.trials, config.grid.repetitions
            );
            info!(
                "  Targets: {:?}, designs: {:?}",
                config.grid.targets, config.grid.designs
            );
            info!(
                "  Workers: {}, engine: {:?} ({})",
                config.workers.size,
                config.engine.kind,
                config.engine.resolved_binary()
            );
            return Ok(());
        }

        Commands::Model { target } => {
            let prior = if cli.config.exists() {
                load_config(&cli)?.prior
            } else {
                Default::default()
            };
            println!("{}", ModelSpec::new(&prior, *target));
            return Ok(());
        }

        Commands::List => {
            let config = load_config(&cli)?;
            let manager = CheckpointManager::new(&config.output.checkpoint_dir)
                .context("Failed to open checkpoint dir")?;
            for path in manager.list()? {
                match CheckpointManager::load_path(&path) {
                    Ok(grid) => println!(
                        "{:<40} cells={:<3} completed={:<7} failures={:<6} updated={}",
                        path.display(),
                        grid.len(),
                        grid.completed(),
                        grid.failures(),
                        grid.updated_at.to_rfc3339()
                    ),
                    Err(e) => warn!(path = %path.display(), error = %e, "Unreadable artifact"),
                }
            }
        }

        Commands::Report {
            paths,
            style,
            calibration,
        } => {
            let paths = if paths.is_empty() {
                let config = load_config(&cli)?;
                CheckpointManager::new(&config.output.checkpoint_dir)
                    .context("Failed to open checkpoint dir")?
                    .list()?
            } else {
                paths.clone()
            };
            if paths.is_empty() {
                bail!("No checkpoint artifacts to report");
            }
            for path in paths {
                let grid = CheckpointManager::load_path(&path)
                    .with_context(|| format!("Failed to load {path:?}"))?;
                print_grid(&grid, *style, *calibration);
            }
        }

        Commands::Cell {
            participants,
            trials,
            target,
            design,
            repetitions,
            seed,
            style,
        } => {
            let config = load_config(&cli)?;
            let seed = seed.or(config.output.seed).unwrap_or_else(rand::random);
            info!(
                participants = participants,
                trials = trials,
                target = %target,
                design = %design,
                seed = seed,
                "Running single cell"
            );

            let pool = WorkerPool::new(
                Arc::new(WienerGenerator::new()),
                estimation::from_config(&config.engine),
                1,
            )
            .with_progress(progress_bar(*repetitions)?);
            let task = CellTask {
                index: 0,
                cell: SimulationCell::new(*participants, *trials, config.prior.clone(), *target, *design),
                repetitions: *repetitions,
                seed,
            };

            match pool.execute(task).await? {
                TaskOutcome::Completed { cell, report, .. } => {
                    for failure in &report.failures {
                        println!("\n--- Repetition {}: {} ---", failure.index, failure.failure);
                        if let Some(diagnostics) = &failure.failure.diagnostics {
                            println!("{diagnostics}");
                        }
                    }
                    println!("\n{}", cell.report(*style));
                    print_calibration(&cell);
                }
                TaskOutcome::Failed { error, .. } => return Err(error.into()),
                TaskOutcome::Panicked { message, .. } => bail!("Worker panicked: {message}"),
            }
        }

        Commands::Run {
            target,
            design,
            repetitions,
        } => {
            let mut config = load_config(&cli)?;
            if let Some(repetitions) = repetitions {
                config.grid.repetitions = *repetitions;
            }
            let targets = if target.is_empty() {
                config.grid.targets.clone()
            } else {
                target.clone()
            };
            let designs = if design.is_empty() {
                config.grid.designs.clone()
            } else {
                design.clone()
            };

            let manager = CheckpointManager::new(&config.output.checkpoint_dir)
                .context("Failed to create checkpoint manager")?;
            let estimator = estimation::from_config(&config.engine);
            let generator = Arc::new(WienerGenerator::new());

            for design in &designs {
                for target in &targets {
                    let seed = config.output.seed.unwrap_or_else(rand::random);
                    info!(design = %design, target = %target, "Starting design");
                    let mut grid = manager
                        .init_or_resume(&config.grid, &config.prior, *target, *design, seed)
                        .context("Failed to initialize checkpoint")?;

                    let remaining = grid.remaining(config.grid.repetitions);
                    if remaining == 0 {
                        info!(grid = %grid.name(), "All cells complete, nothing to do");
                        continue;
                    }

                    let pb = progress_bar(remaining)?;
                    let pool = WorkerPool::new(
                        generator.clone(),
                        Arc::clone(&estimator),
                        config.workers.size,
                    )
                    .with_progress(pb.clone());
                    let runner = GridRunner::new(pool, &config.grid, &config.workers);
                    let summary = runner.run(&mut grid, Some(&manager)).await?;
                    pb.finish_with_message(format!("Done! {} failures", summary.failures));

                    print_sweep(&grid, &summary);
                }
            }
        }
    }

    Ok(())
}
