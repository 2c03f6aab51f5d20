#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod disabled;
pub mod error;
pub mod graph;
pub mod ir;
pub mod layout;
pub mod layout_dump;
pub mod merge;
pub mod navigate;
#[cfg(feature = "poll")]
pub mod poll;
pub mod render;
pub mod scene;
pub mod status;
pub mod text_metrics;
pub mod theme;
pub mod view;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::Config;
pub use error::{ConfigError, GraphError, LayoutError};
pub use graph::{FlowGraph, NodeIdx};
pub use status::Status;
pub use view::{GraphView, ViewEvent};

use layout_dump::LayoutDump;
use text_metrics::FontMetrics;

/// Lays out a flow JSON document and renders it framed in the viewport.
pub fn render_flow_svg(input: &str, config: &Config) -> anyhow::Result<String> {
    let view = build_view(input, config)?;
    Ok(render::render_svg(&view))
}

/// Lays out a flow JSON document and returns node and edge geometry.
pub fn layout_flow(input: &str, config: &Config) -> anyhow::Result<LayoutDump> {
    let view = build_view(input, config)?;
    Ok(LayoutDump::from_view(&view))
}

fn build_view(input: &str, config: &Config) -> anyhow::Result<GraphView> {
    let data = ir::parse_flow(input)?;
    let graph = FlowGraph::from_data(&data)?;
    let measure = FontMetrics::new(config.theme.font_family.clone());
    Ok(GraphView::new(graph, config, Box::new(measure))?)
}
