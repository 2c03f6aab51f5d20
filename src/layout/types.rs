use serde::{Deserialize, Serialize};

/// Sizing input for one node of a layout scope.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutNode {
    pub fn new(id: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEdge {
    pub from: String,
    pub to: String,
}

impl LayoutEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Tunables of the layered layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutOptions {
    /// Added to every node width before spreading a layer.
    pub horizontal_margin: f32,
    /// Width and height of the synthetic nodes on long edges.
    pub dummy_size: f32,
    /// Extra vertical room per unit of horizontal edge displacement.
    pub degree_ratio: f32,
    /// Minimum gap between two layers' boxes.
    pub min_layer_gap: f32,
    /// Vertical offset of the corner point inserted after a bending guide.
    pub corner_gap: f32,
    /// Number of up/down barycenter sweep cycles.
    pub refinement_passes: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            horizontal_margin: 8.0,
            dummy_size: 10.0,
            degree_ratio: 1.0 / 8.0,
            min_layer_gap: 40.0,
            corner_gap: 10.0,
            refinement_passes: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodePlacement {
    pub level: usize,
    pub x: f32,
    pub y: f32,
    /// Width the node occupied inside its layer (node width plus margin).
    pub slot_width: f32,
}

/// Route of one input edge. Both lists are empty for edges between
/// adjacent layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeRoute {
    /// One point per dummy node the edge passes through.
    pub guides: Vec<(f32, f32)>,
    /// Guides plus corner-rounding points; what a renderer should draw.
    pub bends: Vec<(f32, f32)>,
}

impl EdgeRoute {
    pub fn is_direct(&self) -> bool {
        self.guides.is_empty()
    }
}

/// Final position of a layer entry, real or dummy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerSlot {
    /// Index into the input nodes, `None` for dummies.
    pub node: Option<usize>,
    pub x: f32,
    pub width: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphLayout {
    /// Parallel to the input node slice.
    pub nodes: Vec<NodePlacement>,
    /// Parallel to the input edge slice.
    pub edges: Vec<EdgeRoute>,
    /// Left-to-right order of every layer after crossing reduction.
    pub layers: Vec<Vec<LayerSlot>>,
    pub dummy_count: usize,
}

impl GraphLayout {
    pub fn max_level(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }
}

/// Working record of a layer entry; dropped once coordinates are copied out.
#[derive(Debug, Clone)]
pub(super) struct LayerNode {
    pub source: Option<usize>,
    pub level: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub ins: Vec<usize>,
    pub outs: Vec<usize>,
}

#[derive(Debug, Default)]
pub(super) struct WorkGraph {
    pub records: Vec<LayerNode>,
    pub layers: Vec<Vec<usize>>,
}

impl WorkGraph {
    pub fn max_level(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    pub fn link(&mut self, from: usize, to: usize) {
        self.records[from].outs.push(to);
        self.records[to].ins.push(from);
    }
}
