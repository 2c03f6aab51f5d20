use crate::graph::{FlowGraph, NodeIdx};
use crate::view::GraphView;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDump {
    pub flow_id: String,
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDump {
    /// Colon separated id path from the top-level flow.
    pub path: String,
    pub kind: String,
    pub status: String,
    pub level: usize,
    /// Center relative to the containing flow's layout.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Center in scene coordinates, absent while a containing flow is collapsed.
    pub scene: Option<[f32; 2]>,
    pub disabled: bool,
    pub expanded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDump {
    /// Path of the flow owning the edge, empty for the top level.
    pub flow: String,
    pub from: String,
    pub to: String,
    pub guides: Vec<[f32; 2]>,
    pub bends: Vec<[f32; 2]>,
}

impl LayoutDump {
    pub fn from_view(view: &GraphView) -> Self {
        let graph = view.graph();
        let root = FlowGraph::root();
        let bounds = view.bounds();

        let nodes = graph
            .descendants(root)
            .into_iter()
            .map(|idx| node_dump(view, idx))
            .collect();

        let edges = std::iter::once(root)
            .chain(graph.descendants(root))
            .filter_map(|flow| graph.scope(flow).map(|scope| (flow, scope)))
            .flat_map(|(flow, scope)| {
                let owner = if flow == root {
                    String::new()
                } else {
                    graph.path_of(flow)
                };
                scope.edges.iter().map(move |edge| EdgeDump {
                    flow: owner.clone(),
                    from: graph.node(edge.from).id.clone(),
                    to: graph.node(edge.to).id.clone(),
                    guides: edge.guides.iter().map(|(x, y)| [*x, *y]).collect(),
                    bends: edge.bends.iter().map(|(x, y)| [*x, *y]).collect(),
                })
            })
            .collect();

        LayoutDump {
            flow_id: graph.node(root).id.clone(),
            width: bounds.width(),
            height: bounds.height(),
            nodes,
            edges,
        }
    }
}

fn node_dump(view: &GraphView, idx: NodeIdx) -> NodeDump {
    let node = view.graph().node(idx);
    NodeDump {
        path: view.graph().path_of(idx),
        kind: if node.is_flow() { "flow" } else { "job" }.to_string(),
        status: node.status.to_string(),
        level: node.level,
        x: node.x,
        y: node.y,
        width: node.width,
        height: node.height,
        scene: view.node_position(idx).map(|(x, y)| [x, y]),
        disabled: view.disabled().is_disabled(idx),
        expanded: view.is_expanded(idx),
    }
}

pub fn write_layout_dump(path: &Path, view: &GraphView) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_view(view);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
