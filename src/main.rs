//! Experiment Dashboard CLI
//!
//! Browse, validate and compare evaluation results across experiment versions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use experiment_dashboard::{
    comparison::compare_metrics,
    config::{Config, DataConfig},
    experiment::ExperimentLoader,
    history::{SortOrder, question_history},
    metrics::MetricsCalculator,
    persistence::{bundle_size, collect_bundle, load_bundle, save_bundle},
    report,
    source::{BundleSource, DataSource, DirectorySource, HttpSource},
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Experiment Dashboard - browse and compare evaluation results
#[derive(Parser)]
#[command(name = "exp-dash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local data directory holding experiments.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL serving mlflow_results/
    #[arg(long, global = true)]
    url: Option<String>,

    /// Bundle file written by the bundle command
    #[arg(long, global = true)]
    bundle: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every experiment with its metrics
    List {
        /// Output as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the metrics and results of an experiment
    Show {
        /// Experiment name
        name: String,

        /// Only list results whose prompt or response contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Show the validation report of an experiment
    Validate {
        /// Experiment name
        name: String,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Compare two experiments question by question
    Compare {
        /// Name of the newer experiment
        current: String,

        /// Name of the experiment to compare against
        previous: String,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// List every question with the answers of each experiment
    Questions {
        /// Only list questions whose text or answers contain this text
        #[arg(short, long)]
        search: Option<String>,

        /// Sort questions in descending order
        #[arg(long)]
        desc: bool,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Save the index and every experiment's results into one file
    Bundle {
        /// Output path for the bundle file
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();

    let config = Config::load()
        .context("Failed to load configuration")?
        .with_overrides(cli.data_dir, cli.url, cli.bundle);
    config.validate().context("Invalid configuration")?;

    let calculator = Arc::new(MetricsCalculator::new(config.cache_ttl()));

    match config.data {
        DataConfig {
            data_dir: Some(dir),
            ..
        } => {
            tracing::info!(path = %dir.display(), "reading experiments from directory");
            let loader = ExperimentLoader::with_calculator(DirectorySource::new(dir), calculator);
            run(&loader, cli.command).await
        }
        DataConfig {
            base_url: Some(url),
            ..
        } => {
            tracing::info!(url = %url, "reading experiments over HTTP");
            let loader = ExperimentLoader::with_calculator(HttpSource::new(url), calculator);
            run(&loader, cli.command).await
        }
        DataConfig {
            bundle: Some(path),
            ..
        } => {
            let bundle = load_bundle(&path)
                .with_context(|| format!("Failed to load bundle '{}'", path.display()))?;
            let loader = ExperimentLoader::with_calculator(BundleSource::new(bundle), calculator);
            run(&loader, cli.command).await
        }
        DataConfig { .. } => anyhow::bail!("No data source configured"),
    }
}

async fn run<S: DataSource>(loader: &ExperimentLoader<S>, command: Commands) -> Result<()> {
    match command {
        Commands::List { json } => cmd_list(loader, json).await,
        Commands::Show { name, search, json } => {
            cmd_show(loader, &name, search.as_deref(), json).await
        }
        Commands::Validate { name, json } => cmd_validate(loader, &name, json).await,
        Commands::Compare {
            current,
            previous,
            json,
        } => cmd_compare(loader, &current, &previous, json).await,
        Commands::Questions { search, desc, json } => {
            cmd_questions(loader, search.as_deref(), desc, json).await
        }
        Commands::Bundle { output } => cmd_bundle(loader, output).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

async fn cmd_list<S: DataSource>(loader: &ExperimentLoader<S>, json: bool) -> Result<()> {
    let experiments = loader
        .load_all()
        .await
        .context("Failed to load experiment index")?;

    if json {
        return print_json(&experiments);
    }

    print!("{}", report::render_experiment_list(&experiments));
    Ok(())
}

async fn cmd_show<S: DataSource>(
    loader: &ExperimentLoader<S>,
    name: &str,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let history = loader
        .try_load_experiment(name)
        .await
        .with_context(|| format!("Failed to load experiment '{}'", name))?;

    if json {
        return print_json(history.current());
    }

    print!("{}", report::render_experiment_details(&history, search));
    Ok(())
}

async fn cmd_validate<S: DataSource>(
    loader: &ExperimentLoader<S>,
    name: &str,
    json: bool,
) -> Result<()> {
    let index = loader
        .index()
        .await
        .context("Failed to load experiment index")?;
    let entry = index
        .get(name)
        .with_context(|| format!("Experiment '{}' not found", name))?;
    let experiment = loader
        .assemble(entry)
        .await
        .with_context(|| format!("Failed to load experiment '{}'", name))?;

    if json {
        return print_json(&experiment.validation);
    }

    print!("{}", report::render_validation(&experiment));
    Ok(())
}

async fn cmd_compare<S: DataSource>(
    loader: &ExperimentLoader<S>,
    current: &str,
    previous: &str,
    json: bool,
) -> Result<()> {
    let history = loader
        .try_load_experiment(current)
        .await
        .with_context(|| format!("Failed to load experiment '{}'", current))?;
    let current = history.current();

    // An older baseline is already part of the loaded chain.
    let loaded;
    let previous = match history.by_name(previous) {
        Some(experiment) => experiment,
        None => {
            loaded = loader
                .try_load_experiment(previous)
                .await
                .with_context(|| format!("Failed to load experiment '{}'", previous))?;
            loaded.current()
        }
    };

    let comparison = compare_metrics(&current.results, &previous.results);

    if json {
        return print_json(&comparison);
    }

    print!("{}", report::render_comparison(current, previous, &comparison));
    Ok(())
}

async fn cmd_questions<S: DataSource>(
    loader: &ExperimentLoader<S>,
    search: Option<&str>,
    desc: bool,
    json: bool,
) -> Result<()> {
    let experiments = loader
        .load_all()
        .await
        .context("Failed to load experiment index")?;
    let order = if desc {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };
    let questions = question_history(&experiments, search, order);

    if json {
        return print_json(&questions);
    }

    print!("{}", report::render_question_history(&questions));
    println!("{}", "─".repeat(60));
    println!(
        "{} questions across {} experiments",
        questions.len(),
        experiments.len()
    );
    Ok(())
}

async fn cmd_bundle<S: DataSource>(loader: &ExperimentLoader<S>, output: PathBuf) -> Result<()> {
    let start = Instant::now();

    let bundle = collect_bundle(loader.source())
        .await
        .context("Failed to collect experiment data")?;
    save_bundle(&bundle, &output).context("Failed to save bundle")?;

    let size = bundle_size(&output)?;
    println!("Bundle saved to: {}", output.display());
    println!("  Experiments: {}", bundle.len());
    println!("  File size:   {:.1} KB", size as f64 / 1024.0);
    println!("  Took:        {:.2?}", start.elapsed());

    Ok(())
}
