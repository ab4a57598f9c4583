//! MSTGCN command-line interface
//!
//! Inspect configurations and run forecasts on synthetic signals.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::{Array2, Array4};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mstgcn_forecast::prelude::*;

#[derive(Parser)]
#[command(name = "mstgcn")]
#[command(about = "MSTGCN traffic flow forecasting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration as TOML
    InitConfig {
        /// Output file path
        #[arg(short, long, default_value = "mstgcn.toml")]
        output: String,
    },

    /// Show model architecture and parameter count
    Summary {
        /// Path to a TOML configuration
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Run one forecast on a synthetic signal
    Forecast {
        /// Path to a TOML configuration
        #[arg(short, long)]
        config: Option<String>,

        /// Path to a saved model (overrides --config)
        #[arg(short, long)]
        model: Option<String>,

        /// Batch size
        #[arg(short, long, default_value = "2")]
        batch: usize,

        /// Number of graph nodes
        #[arg(short, long, default_value = "5")]
        nodes: usize,

        /// JSON edge index `[[sources...], [targets...]]` (defaults to a ring)
        #[arg(short, long)]
        edges: Option<String>,

        /// Pass the graph as one edge list per time step
        #[arg(long)]
        time_varying: bool,

        /// Seed for the synthetic signal
        #[arg(long, default_value = "7")]
        signal_seed: u64,

        /// Save the model after the forecast
        #[arg(long)]
        save: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::InitConfig { output } => {
            MstgcnConfig::default()
                .to_file(&output)
                .with_context(|| format!("writing {}", output))?;
            info!("Wrote default configuration to {}", output);
        }

        Commands::Summary { config } => {
            let model = Mstgcn::new(load_config(config.as_deref())?)?;
            println!("{}", model.summary());
        }

        Commands::Forecast {
            config,
            model,
            batch,
            nodes,
            edges,
            time_varying,
            signal_seed,
            save,
        } => {
            let model = match model {
                Some(path) => Mstgcn::load(&path).with_context(|| format!("loading {}", path))?,
                None => Mstgcn::new(load_config(config.as_deref())?)?,
            };
            let edges = match edges {
                Some(path) => load_edges(&path).with_context(|| format!("reading {}", path))?,
                None => EdgeIndex::ring(nodes),
            };
            run_forecast(&model, batch, nodes, edges, time_varying, signal_seed)?;

            if let Some(path) = save {
                model.save(&path).with_context(|| format!("saving {}", path))?;
                info!("Saved model to {}", path);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<MstgcnConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            MstgcnConfig::from_file(path).with_context(|| format!("reading {}", path))
        }
        None => Ok(MstgcnConfig::default()),
    }
}

fn load_edges(path: &str) -> Result<EdgeIndex> {
    let rows: Vec<Vec<usize>> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let num_edges = rows.first().map_or(0, Vec::len);
    let coo = Array2::from_shape_vec((rows.len(), num_edges), rows.concat())
        .context("edge index rows must have equal length")?;

    let edges = EdgeIndex::from_coo(&coo)?;
    info!("Loaded {} edges from {}", edges.len(), path);
    Ok(edges)
}

fn run_forecast(
    model: &Mstgcn,
    batch: usize,
    nodes: usize,
    edges: EdgeIndex,
    time_varying: bool,
    seed: u64,
) -> Result<()> {
    let config = model.config();
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array4::random_using(
        (batch, nodes, config.in_channels, config.len_input),
        Normal::new(0.0, 1.0)?,
        &mut rng,
    );

    let connectivity = if time_varying {
        Connectivity::repeated(&edges, config.len_input)
    } else {
        Connectivity::Static(edges)
    };

    info!(
        "Forecasting {} steps for {} nodes (batch {}, {} graph)",
        config.num_for_predict,
        nodes,
        batch,
        if time_varying { "time-varying" } else { "static" }
    );

    let forecast = model.forward(&x, &connectivity)?;

    println!("Forecast shape: {:?}", forecast.dim());
    for (b, sample) in forecast.outer_iter().enumerate() {
        println!("Sample {}:", b);
        for (n, steps) in sample.outer_iter().enumerate() {
            let values: Vec<String> = steps.iter().map(|v| format!("{:8.4}", v)).collect();
            println!("  node {:>3}: [{}]", n, values.join(", "));
        }
    }

    Ok(())
}
