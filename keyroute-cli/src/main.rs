use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use keyroute_core::{RouteFinder, RouteFinderSettings, Spoiler};

mod world;

use world::WorldFile;

#[derive(Debug, Parser)]
#[command(name = "keyroute", version, about = "Solvable key item placement for a world graph")]
struct Args {
    /// World description in JSON.
    #[arg(long)]
    world: PathBuf,

    #[arg(long)]
    seed: Option<u64>,

    /// Slot assignments tried per locked edge.
    #[arg(long, default_value_t = 10)]
    max_retries: usize,

    /// Placement attempts allowed across the whole search.
    #[arg(long, default_value_t = 10_000)]
    max_attempts: usize,

    /// Spoiler JSON destination. Printed to stdout when omitted.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the search trace here.
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Write a Mermaid flowchart here.
    #[arg(long)]
    mermaid: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    use_labels: bool,

    /// Draw item slots, with their placed keys, in the flowchart.
    #[arg(long, default_value_t = false)]
    include_items: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Serialize)]
struct Report {
    seed: u64,
    #[serde(flatten)]
    spoiler: Spoiler,
}

/// `-q` wins over any number of `-v`.
fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        _ if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = log_filter(args.verbose, args.quiet);
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    let text = fs::read_to_string(&args.world)
        .with_context(|| format!("failed to read world file {}", args.world.display()))?;
    let graph = WorldFile::parse(&text)
        .and_then(|world| world.build())
        .with_context(|| format!("failed to load world {}", args.world.display()))?;
    info!(
        keys = graph.keys().len(),
        nodes = graph.nodes().len(),
        edges = graph.edges().len(),
        subgraphs = graph.subgraphs().len(),
        "loaded world"
    );

    let seed = match args.seed {
        Some(seed) => seed,
        None => {
            let seed = rand::thread_rng().gen::<u64>();
            info!(seed, "no seed given, picked one");
            seed
        }
    };

    let finder = RouteFinder::with_settings(RouteFinderSettings {
        seed: Some(seed),
        max_retries: args.max_retries,
        max_attempts: args.max_attempts,
    });
    let route = finder.find(graph);

    let report = Report {
        seed,
        spoiler: route.spoiler(),
    };
    let json = serde_json::to_string_pretty(&report).context("failed to serialize spoiler")?;
    match &args.output {
        Some(path) => fs::write(path, format!("{json}\n"))
            .with_context(|| format!("failed to write spoiler {}", path.display()))?,
        None => println!("{json}"),
    }

    if let Some(path) = &args.trace {
        fs::write(path, route.log())
            .with_context(|| format!("failed to write trace {}", path.display()))?;
    }

    if let Some(path) = &args.mermaid {
        let chart = if args.include_items {
            route.to_mermaid(args.use_labels)
        } else {
            route.graph().to_mermaid(args.use_labels, false)
        };
        fs::write(path, chart)
            .with_context(|| format!("failed to write flowchart {}", path.display()))?;
    }

    if !route.all_nodes_visited() {
        bail!("seed {seed} did not produce a complete route; try another seed or raise --max-attempts");
    }
    Ok(())
}
