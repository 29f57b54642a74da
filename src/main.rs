use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lesion_scorer::algorithm::ensemble::ModelFamily;
use lesion_scorer::{PipelineConfig, pipeline};
use log::info;

#[global_allocator]
static ALLOC: snmalloc_rs::SnMalloc = snmalloc_rs::SnMalloc;

#[derive(Debug, Parser)]
#[command(name = "lesion-scorer", version, about)]
struct Cli {
    /// JSON configuration file, production defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output directory overriding the configured one
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Worker threads for model fitting
    #[arg(long, global = true, default_value_t = num_cpus::get())]
    threads: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Train the committee and write the submission
    Run,
    /// Tune one model family
    Search {
        /// Family to tune, the configured one when omitted
        #[arg(long)]
        family: Option<ModelFamily>,
        /// Number of trials, the configured budget when omitted
        #[arg(long)]
        trials: Option<usize>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(output) = &cli.output {
        config.paths.output_dir.clone_from(output);
    }
    if let Command::Search { family, trials } = &cli.command {
        if let Some(family) = family {
            config.search.family = *family;
        }
        if let Some(trials) = trials {
            config.search.n_trials = *trials;
        }
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.threads.max(1))
        .build_global()
        .context("configuring the worker pool")?;

    let config = load_config(&cli)?;
    info!("{config}");
    let start = Instant::now();

    match cli.command {
        Command::Run => {
            let report = pipeline::run(&config).context("scoring run failed")?;
            info!(
                "Scored {} lesions with {} members (mean pAUC {:.5}) in {:?}",
                report.test_rows,
                report.ensemble_members,
                report.cross_validation.mean_score(),
                start.elapsed()
            );
        }
        Command::Search { .. } => {
            let report = pipeline::search(&config).context("parameter search failed")?;
            info!(
                "Search finished in {:?}, best pAUC {:.5}",
                start.elapsed(),
                report.best_score
            );
        }
    }
    Ok(())
}
