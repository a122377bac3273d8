use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use layernet_core::types::LayerId;

mod report;

/// Loads a saved network design and reports on it.
#[derive(Parser, Debug)]
struct Args {
    /// Network file (.json, .msgpack or .dhall)
    file: PathBuf,
    /// Fail if any link or resource is oversubscribed or any demand is blocked
    #[arg(long)]
    check: bool,
    /// Only report on this layer
    #[arg(short, long)]
    layer: Option<String>,
    /// List up to this many candidate paths per demand
    #[arg(short, long)]
    k: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let network = layernet_utils::read_network(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    log::info!(
        "read {:?}: {} layers, {} nodes, {} links, {} demands",
        network.name(),
        network.nr_layers(),
        network.nr_nodes(),
        network.nr_links(),
        network.nr_demands()
    );

    let layers: Vec<LayerId> = match &args.layer {
        Some(name) => vec![network
            .layer_by_name(name)
            .map(|l| l.id())
            .with_context(|| format!("no layer named {name:?}"))?],
        None => network.layers_top_down(),
    };
    for &layer in &layers {
        if let Some(summary) = report::LayerSummary::of(&network, layer) {
            println!("{summary}");
        }
        if let Some(k) = args.k {
            print!("{}", report::candidates(&network, layer, k)?);
        }
    }

    if args.check {
        let problems = report::problems(&network, &layers);
        for problem in &problems {
            println!("{problem}");
        }
        anyhow::ensure!(problems.is_empty(), "{} problems found", problems.len());
        println!("no problems found");
    }
    Ok(())
}
