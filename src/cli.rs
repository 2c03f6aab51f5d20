use crate::config::{Config, load_config};
use crate::disabled::Propagation;
use crate::graph::FlowGraph;
use crate::ir::{StatusUpdate, parse_flow};
use crate::layout_dump::write_layout_dump;
use crate::poll::{PollOutcome, Poller, ReplaySource};
use crate::render::{render_svg, write_output_png, write_output_svg};
use crate::text_metrics::FontMetrics;
use crate::view::GraphView;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flowlayer", version, about = "Lay out and render workflow DAGs with live status")]
pub struct Args {
    /// Flow JSON file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file (svg/png). Defaults to stdout for SVG if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Config JSON5 file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Width
    #[arg(short = 'w', long = "width", default_value_t = 1200.0)]
    pub width: f32,

    /// Height
    #[arg(short = 'H', long = "height", default_value_t = 800.0)]
    pub height: f32,

    /// Status update JSON (one document or an array), replayed in order
    #[arg(short = 'u', long = "update")]
    pub updates: Vec<PathBuf>,

    /// Nodes to disable, as '/'-separated paths like `a/sub:b`
    #[arg(long = "disable")]
    pub disable: Vec<String>,

    /// How far each --disable spreads
    #[arg(long = "propagate", value_enum, default_value = "node")]
    pub propagate: PropagateArg,

    /// Node path to select and center on
    #[arg(long = "select")]
    pub select: Option<String>,

    /// Expand every embedded flow
    #[arg(long = "expand-all")]
    pub expand_all: bool,

    /// Reset finished nodes as for a rerun before rendering
    #[arg(long = "rerun")]
    pub rerun: bool,

    /// Write node and edge geometry as JSON
    #[arg(long = "dump-layout")]
    pub dump_layout: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Svg,
    Png,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagateArg {
    Node,
    Parents,
    Children,
    Ancestors,
    Descendants,
    All,
}

impl From<PropagateArg> for Propagation {
    fn from(arg: PropagateArg) -> Self {
        match arg {
            PropagateArg::Node => Propagation::Node,
            PropagateArg::Parents => Propagation::Parents,
            PropagateArg::Children => Propagation::Children,
            PropagateArg::Ancestors => Propagation::Ancestors,
            PropagateArg::Descendants => Propagation::Descendants,
            PropagateArg::All => Propagation::All,
        }
    }
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    config.render.width = args.width;
    config.render.height = args.height;

    let input = read_input(args.input.as_deref())?;
    let data = parse_flow(&input).context("invalid flow document")?;
    let graph = FlowGraph::from_data(&data)?;
    let measure = FontMetrics::new(config.theme.font_family.clone());
    let mut view = GraphView::new(graph, &config, Box::new(measure))?;
    info!(flow = %data.flow_id, nodes = view.graph().len(), "flow loaded");

    if !args.updates.is_empty() {
        let updates = read_updates(&args.updates)?;
        replay(&mut view, &config, updates)?;
    }

    if args.rerun {
        view.prepare_rerun();
    }
    for paths in &args.disable {
        disable_paths(&mut view, paths, args.propagate.into());
    }
    if args.expand_all {
        view.expand_all()?;
        view.reset_pan_zoom(None);
    }
    if let Some(path) = &args.select {
        let idx = view
            .graph()
            .find(path)
            .ok_or_else(|| anyhow::anyhow!("unknown node '{path}'"))?;
        view.select(Some(idx))?;
    }

    if let Some(path) = &args.dump_layout {
        write_layout_dump(path, &view)?;
    }

    let svg = render_svg(&view);
    match args.output_format {
        OutputFormat::Svg => {
            write_output_svg(&svg, args.output.as_deref())?;
        }
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            write_output_png(&svg, &output, &config.render, &config.theme)?;
        }
    }
    Ok(())
}

/// Stderr logging filtered by `FLOWLAYER_LOG`, then `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("FLOWLAYER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("flowlayer=info,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Pushes the documents through the poller without waiting between them.
fn replay(view: &mut GraphView, config: &Config, updates: Vec<StatusUpdate>) -> Result<()> {
    let cancel = CancellationToken::new();
    let mut source = ReplaySource::new(updates).cancel_on_drain(cancel.clone());
    let mut poll = config.poll.clone();
    poll.pending_interval_ms = 0;
    poll.running_interval_ms = 0;
    poll.killing_interval_ms = 0;
    poll.final_delay_ms = 0;
    let mut poller = Poller::new(poll, cancel);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let outcome = runtime.block_on(poller.run(view, &mut source));
    if source.remaining() > 0 {
        warn!(
            unused = source.remaining(),
            "flow finished before every update was replayed"
        );
    }
    info!(applied = poller.applied(), finished = outcome == PollOutcome::Finished, "updates replayed");
    Ok(())
}

/// Disables every '/'-separated path. Unknown paths are skipped so a stale
/// list from an earlier version of the flow still applies.
fn disable_paths(view: &mut GraphView, paths: &str, propagation: Propagation) -> usize {
    let mut applied = 0;
    for path in paths.split('/').filter(|path| !path.is_empty()) {
        match view.graph().find(path) {
            Some(idx) => {
                view.set_disabled(idx, propagation, true);
                applied += 1;
            }
            None => warn!(path, "unknown node in --disable, skipped"),
        }
    }
    applied
}

fn read_updates(paths: &[PathBuf]) -> Result<Vec<StatusUpdate>> {
    let mut updates = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    updates.push(serde_json::from_value(item)?);
                }
            }
            other => updates.push(serde_json::from_value(other)?),
        }
    }
    Ok(updates)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!(
        "Output path required for {} output",
        ext
    ))
}
