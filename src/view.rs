use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{Config, RenderConfig};
use crate::disabled::{DisabledEntry, DisabledSet, Propagation};
use crate::error::GraphError;
use crate::graph::{Edge, FlowGraph, NodeIdx};
use crate::ir::StatusUpdate;
use crate::layout::LayoutOptions;
use crate::merge::{self, MergeReport};
use crate::navigate::{FitBox, Transform, Viewport};
use crate::scene::{ElementId, HitTarget, Icon, Primitive, Scene};
use crate::text_metrics::TextMeasure;
use crate::theme::Theme;

const BOX_PADDING_X: f32 = 8.0;
const BOX_PADDING_Y: f32 = 2.0;
const BOX_RADIUS: f32 = 3.0;
const ICON_WIDTH: f32 = 21.0;
const ICON_HEIGHT: f32 = 20.0;
const ICON_GAP: f32 = 4.0;
const EXPANDED_MARGIN_X: f32 = 10.0;
const EXPANDED_MARGIN_TOP: f32 = 30.0;
const EXPANDED_MARGIN_BOTTOM: f32 = 5.0;
/// Half extent seeded around the first node when computing bounds.
const BOUNDS_SEED: f32 = 10.0;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    GraphRendered,
    SelectionChanged {
        previous: Option<NodeIdx>,
        current: Option<NodeIdx>,
    },
    StatusChanged(Vec<NodeIdx>),
    DisabledChanged(Vec<NodeIdx>),
    FlowExpanded(NodeIdx),
    FlowCollapsed(NodeIdx),
    Transformed(Transform),
    /// A status fetch failed; the view itself is unchanged.
    TransportNotice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

type Subscriber = Box<dyn FnMut(&ViewEvent)>;

/// Axis-aligned box in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    fn inflate(self, margin: f32) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NodeVisual {
    group: ElementId,
    inner: ElementId,
    border: ElementId,
    /// Holder of the nested scope, flows only.
    content: Option<ElementId>,
}

#[derive(Debug, Clone, Copy)]
struct FlowState {
    expanded: bool,
    rendered: bool,
    collapsed_size: (f32, f32),
    content_offset: (f32, f32),
}

/// One flow graph plus the screen state kept beside it: disabled set,
/// selection, expanded sub-flows, the retained [`Scene`] and the
/// [`Viewport`]. Mutations patch scene elements in place and notify
/// subscribers.
pub struct GraphView {
    graph: FlowGraph,
    disabled: DisabledSet,
    selected: Option<NodeIdx>,
    flows: HashMap<NodeIdx, FlowState>,
    visuals: HashMap<NodeIdx, NodeVisual>,
    edge_lines: HashMap<NodeIdx, Vec<ElementId>>,
    scene: Scene,
    viewport: Viewport,
    bounds: Bounds,
    theme: Theme,
    layout: LayoutOptions,
    render: RenderConfig,
    fit_duration: Duration,
    measure: Box<dyn TextMeasure>,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: usize,
}

impl GraphView {
    /// Builds the scene for `graph` and frames it in the viewport.
    pub fn new(
        graph: FlowGraph,
        config: &Config,
        measure: Box<dyn TextMeasure>,
    ) -> Result<Self, GraphError> {
        let mut view = Self {
            graph,
            disabled: DisabledSet::new(),
            selected: None,
            flows: HashMap::new(),
            visuals: HashMap::new(),
            edge_lines: HashMap::new(),
            scene: Scene::new(),
            viewport: Viewport::new(config.render.width, config.render.height, &config.navigate),
            bounds: Bounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 0.0,
                max_y: 0.0,
            },
            theme: config.theme.clone(),
            layout: config.layout.clone(),
            render: config.render.clone(),
            fit_duration: Duration::from_millis(config.navigate.fit_duration_ms),
            measure,
            subscribers: Vec::new(),
            next_subscriber: 0,
        };
        view.render()?;
        Ok(view)
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn disabled(&self) -> &DisabledSet {
        &self.disabled
    }

    pub fn selected(&self) -> Option<NodeIdx> {
        self.selected
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    /// Bounds of the top-level layout including the graph margin.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_expanded(&self, idx: NodeIdx) -> bool {
        self.flows.get(&idx).is_some_and(|state| state.expanded)
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&ViewEvent) + 'static) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(known, _)| *known != id);
        self.subscribers.len() != before
    }

    /// Rebuilds the whole scene. Expansion state and selection are reset.
    pub fn render(&mut self) -> Result<(), GraphError> {
        self.scene = Scene::new();
        self.flows.clear();
        self.visuals.clear();
        self.edge_lines.clear();
        self.selected = None;

        let root = self.scene.root();
        self.render_scope(FlowGraph::root(), root)?;
        self.update_bounds();
        self.reset_pan_zoom(None);
        debug!(
            nodes = self.graph.children(FlowGraph::root()).len(),
            elements = self.scene.len(),
            "graph rendered"
        );
        self.publish(ViewEvent::GraphRendered);
        Ok(())
    }

    /// Merges a status update and refreshes the classes of touched nodes.
    pub fn apply_update(&mut self, update: &StatusUpdate) -> MergeReport {
        let report = merge::apply_update(&mut self.graph, update);
        for &idx in &report.changed {
            self.refresh_node(idx);
        }
        self.publish(ViewEvent::StatusChanged(report.changed.clone()));
        report
    }

    pub fn set_disabled(
        &mut self,
        idx: NodeIdx,
        propagation: Propagation,
        disabled: bool,
    ) -> Vec<NodeIdx> {
        let changed = self.disabled.apply(&self.graph, idx, propagation, disabled);
        for &node in &changed {
            self.refresh_node(node);
        }
        if !changed.is_empty() {
            self.publish(ViewEvent::DisabledChanged(changed.clone()));
        }
        changed
    }

    /// Resets finished nodes for a rerun; see [`DisabledSet::prepare_rerun`].
    pub fn prepare_rerun(&mut self) {
        self.disabled.prepare_rerun(&mut self.graph);
        let all = self.graph.descendants(FlowGraph::root());
        for &idx in &all {
            self.refresh_node(idx);
        }
        self.publish(ViewEvent::StatusChanged(all.clone()));
        self.publish(ViewEvent::DisabledChanged(all));
    }

    pub fn disabled_payload(&self) -> Vec<DisabledEntry> {
        self.disabled.payload(&self.graph)
    }

    /// Selects `idx` (or clears the selection), expanding every flow that
    /// contains it.
    pub fn select(&mut self, idx: Option<NodeIdx>) -> Result<(), GraphError> {
        let idx = idx.filter(|&node| node != FlowGraph::root());
        if idx == self.selected {
            return Ok(());
        }
        let previous = self.selected;
        self.selected = idx;
        if let Some(prev) = previous {
            self.refresh_node(prev);
        }
        if let Some(node) = idx {
            self.ensure_visible(node)?;
            self.refresh_node(node);
            if self.render.auto_pan_zoom {
                self.center_node(node);
            }
        }
        self.publish(ViewEvent::SelectionChanged {
            previous,
            current: idx,
        });
        Ok(())
    }

    /// Handles a click at a screen point: a node toggles its selection.
    pub fn click(&mut self, sx: f32, sy: f32) -> Result<HitTarget, GraphError> {
        let target = self.hit_test(sx, sy);
        if let HitTarget::Node(idx) = target {
            let next = (self.selected != Some(idx)).then_some(idx);
            self.select(next)?;
        }
        Ok(target)
    }

    pub fn hit_test(&self, sx: f32, sy: f32) -> HitTarget {
        let (x, y) = self.viewport.to_scene(sx, sy);
        let tolerance = self.render.edge_hit_tolerance / self.viewport.scale().max(f32::EPSILON);
        self.scene.hit_test(x, y, tolerance)
    }

    pub fn toggle(&mut self, idx: NodeIdx) -> Result<bool, GraphError> {
        if self.is_expanded(idx) {
            self.collapse(idx)
        } else {
            self.expand(idx)
        }
    }

    /// Expands a flow node, laying out its sub-graph on first use.
    /// Returns false when nothing changed.
    pub fn expand(&mut self, idx: NodeIdx) -> Result<bool, GraphError> {
        if idx == FlowGraph::root() || !self.graph.node(idx).is_flow() || self.is_expanded(idx) {
            return Ok(false);
        }
        self.ensure_visible(idx)?;
        let (Some(visual), Some(mut state)) = (
            self.visuals.get(&idx).copied(),
            self.flows.get(&idx).copied(),
        ) else {
            return Ok(false);
        };
        let Some(content) = visual.content else {
            return Ok(false);
        };

        if !state.rendered {
            self.render_scope(idx, content)?;
            state.rendered = true;
        }
        state.expanded = true;
        self.flows.insert(idx, state);
        self.scene.set_hidden(content, false);
        self.scene.set_class(visual.inner, "nodebox expanded");

        self.relayout_from(idx)?;
        self.update_bounds();
        debug!(flow = %self.graph.path_of(idx), "flow expanded");
        self.publish(ViewEvent::FlowExpanded(idx));
        Ok(true)
    }

    pub fn collapse(&mut self, idx: NodeIdx) -> Result<bool, GraphError> {
        let (Some(visual), Some(mut state)) = (
            self.visuals.get(&idx).copied(),
            self.flows.get(&idx).copied(),
        ) else {
            return Ok(false);
        };
        if !state.expanded {
            return Ok(false);
        }
        state.expanded = false;
        self.flows.insert(idx, state);
        if let Some(content) = visual.content {
            self.scene.set_hidden(content, true);
        }
        self.scene.set_class(visual.inner, "nodebox collapsed");
        let node = self.graph.node_mut(idx);
        (node.width, node.height) = state.collapsed_size;

        self.relayout_from(idx)?;
        self.update_bounds();
        debug!(flow = %self.graph.path_of(idx), "flow collapsed");
        self.publish(ViewEvent::FlowCollapsed(idx));
        Ok(true)
    }

    pub fn expand_all(&mut self) -> Result<(), GraphError> {
        for idx in self.graph.descendants(FlowGraph::root()) {
            if self.graph.node(idx).is_flow() {
                self.expand(idx)?;
            }
        }
        Ok(())
    }

    pub fn collapse_all(&mut self) -> Result<(), GraphError> {
        for idx in self.graph.flows_bottom_up() {
            self.collapse(idx)?;
        }
        Ok(())
    }

    /// Center of a drawn node in scene coordinates, `None` while any
    /// containing flow is collapsed.
    pub fn node_position(&self, idx: NodeIdx) -> Option<(f32, f32)> {
        let visual = self.visuals.get(&idx)?;
        let hidden = self
            .graph
            .ancestors(idx)
            .any(|flow| flow != FlowGraph::root() && !self.is_expanded(flow));
        if hidden {
            return None;
        }
        Some(self.scene.origin_of(visual.group))
    }

    /// Frames a single node, zooming in at most to the configured cap.
    pub fn center_node(&mut self, idx: NodeIdx) {
        let Some((x, y)) = self.node_position(idx) else {
            return;
        };
        let node = self.graph.node(idx);
        let fit = FitBox::new(x - node.width / 2.0, y - node.height / 2.0, node.width, node.height)
            .max_scale(self.render.center_max_scale)
            .duration(self.fit_duration);
        self.fit(fit);
    }

    /// Frames the whole graph.
    pub fn reset_pan_zoom(&mut self, duration: Option<Duration>) {
        let bounds = self.bounds;
        let mut fit = FitBox::new(bounds.min_x, bounds.min_y, bounds.width(), bounds.height())
            .max_scale(self.render.center_max_scale);
        fit.duration = duration;
        self.fit(fit);
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.viewport.translate_by(dx, dy);
        self.publish_transform();
    }

    pub fn wheel(&mut self, delta: i32, sx: f32, sy: f32) {
        self.viewport.wheel(delta, sx, sy);
        self.publish_transform();
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.viewport.resize(width, height);
    }

    /// Advances a running pan/zoom animation.
    pub fn tick(&mut self, now: Instant) -> bool {
        let moved = self.viewport.tick(now);
        if moved {
            self.publish_transform();
        }
        moved
    }

    /// Reports a failed status fetch to subscribers.
    pub fn notify_transport(&mut self, message: impl Into<String>) {
        self.publish(ViewEvent::TransportNotice(message.into()));
    }

    fn fit(&mut self, fit: FitBox) {
        self.viewport.fit_box(fit, Instant::now());
        self.publish_transform();
    }

    fn publish_transform(&mut self) {
        let transform = self.viewport.transform();
        self.publish(ViewEvent::Transformed(transform));
    }

    fn publish(&mut self, event: ViewEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&event);
        }
    }

    fn ensure_visible(&mut self, idx: NodeIdx) -> Result<(), GraphError> {
        let mut chain: Vec<NodeIdx> = self
            .graph
            .ancestors(idx)
            .filter(|&flow| flow != FlowGraph::root())
            .collect();
        chain.reverse();
        for flow in chain {
            self.expand(flow)?;
        }
        Ok(())
    }

    /// Draws the children of `flow` into `holder`, lays them out and draws
    /// the edges behind them.
    fn render_scope(&mut self, flow: NodeIdx, holder: ElementId) -> Result<(), GraphError> {
        let edges_group = self.scene.group(holder, "edges");
        for idx in self.graph.children(flow).to_vec() {
            self.draw_node(idx, holder);
        }
        self.graph.layout_scope(flow, &self.layout)?;
        self.move_nodes(flow);

        let primitives: Vec<Primitive> = self
            .graph
            .scope(flow)
            .map(|scope| scope.edges.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|edge| edge_primitive(&self.graph, edge))
            .collect();
        let mut lines = Vec::with_capacity(primitives.len());
        for (index, primitive) in primitives.into_iter().enumerate() {
            let line = self.scene.add(edges_group, primitive, "edge");
            self.scene.set_target(line, HitTarget::Edge { flow, index });
            lines.push(line);
        }
        self.edge_lines.insert(flow, lines);
        Ok(())
    }

    fn draw_node(&mut self, idx: NodeIdx, holder: ElementId) {
        let node = self.graph.node(idx);
        let font_size = self.theme.font_size;
        let label_width = self.measure.text_width(&node.label, font_size);
        let label_height = self.measure.line_height(font_size);

        let group = self.scene.group(holder, "node");
        self.scene.set_target(group, HitTarget::Node(idx));

        let (width, height, inner, border, content) = if node.is_flow() {
            let inner = self.scene.group(group, "nodebox collapsed");
            let border = self.scene.add(inner, group_rect(), "flowborder");
            let id_font = self.theme.flow_id_font_size;
            let flow_id = node.flow_id.clone().unwrap_or_else(|| node.id.clone());
            let id_width = self.measure.text_width(&flow_id, id_font);
            let id_height = self.measure.line_height(id_font);
            let text_x = ICON_WIDTH + ICON_GAP;
            let block_width = text_x + label_width.max(id_width);
            let block_height = ICON_HEIGHT.max(label_height + id_height);

            let label = self.scene.group(inner, "flowlabel");
            self.scene.set_translate(label, BOX_PADDING_X, block_height / 2.0 + BOX_PADDING_Y);
            self.scene.add(
                label,
                Primitive::Icon {
                    icon: Icon::Flow,
                    x: 0.0,
                    y: -ICON_HEIGHT / 2.0,
                    width: ICON_WIDTH,
                    height: ICON_HEIGHT,
                },
                "flowicon",
            );
            self.scene.add(
                label,
                Primitive::Text {
                    x: text_x,
                    y: 1.0,
                    text: node.label.clone(),
                    font_size: None,
                },
                "label",
            );
            self.scene.add(
                label,
                Primitive::Text {
                    x: text_x,
                    y: 11.0,
                    text: flow_id,
                    font_size: Some(id_font),
                },
                "flowid",
            );
            let content = self.scene.group(inner, "expandedGraph");
            self.scene.set_hidden(content, true);

            let size = (
                block_width + 2.0 * BOX_PADDING_X,
                block_height + 2.0 * BOX_PADDING_Y,
            );
            self.flows.insert(
                idx,
                FlowState {
                    expanded: false,
                    rendered: false,
                    collapsed_size: size,
                    content_offset: (0.0, 0.0),
                },
            );
            (size.0, size.1, inner, border, Some(content))
        } else {
            let inner = self.scene.group(group, "nodebox");
            let border = self.scene.add(inner, group_rect(), "border");
            let width = label_width + 2.0 * BOX_PADDING_X;
            let height = label_height + 2.0 * BOX_PADDING_Y;
            self.scene.add(
                inner,
                Primitive::Text {
                    x: BOX_PADDING_X,
                    y: (height + label_height) / 2.0 - 3.0,
                    text: node.label.clone(),
                    font_size: None,
                },
                "label",
            );
            (width, height, inner, border, None)
        };

        let node = self.graph.node_mut(idx);
        node.width = width;
        node.height = height;
        self.visuals.insert(
            idx,
            NodeVisual {
                group,
                inner,
                border,
                content,
            },
        );
        self.apply_box(idx);
        self.refresh_node(idx);
    }

    /// Rewrites class and tooltip of a drawn node from its current state.
    fn refresh_node(&mut self, idx: NodeIdx) {
        let Some(visual) = self.visuals.get(&idx).copied() else {
            return;
        };
        let node = self.graph.node(idx);
        let disabled = self.disabled.is_disabled(idx);

        let mut class = String::from(if node.is_flow() {
            "node flownode "
        } else {
            "node jobnode "
        });
        class.push_str(node.status.as_str());
        if disabled {
            class.push_str(" nodeDisabled");
        }
        if self.selected == Some(idx) {
            class.push_str(" selected");
        }
        let title = if disabled {
            format!("DISABLED ({})", node.job_type)
        } else {
            format!("{} ({})", node.status, node.job_type)
        };
        self.scene.set_class(visual.group, class);
        self.scene.set_title(visual.group, title);
    }

    /// Re-centers the box of `idx` on its origin and sizes its border.
    fn apply_box(&mut self, idx: NodeIdx) {
        let Some(visual) = self.visuals.get(&idx).copied() else {
            return;
        };
        let node = self.graph.node(idx);
        let (width, height) = (node.width, node.height);
        self.scene.set_translate(visual.inner, -width / 2.0, -height / 2.0);
        self.scene.set_rect_size(visual.border, width, height);
        if let (Some(content), Some(state)) = (visual.content, self.flows.get(&idx)) {
            self.scene
                .set_translate(content, state.content_offset.0, state.content_offset.1);
        }
    }

    /// Sizes an expanded flow around its laid-out children.
    fn fit_expanded(&mut self, idx: NodeIdx) {
        let Some(bounds) = children_bounds(&self.graph, idx) else {
            return;
        };
        if let Some(state) = self.flows.get_mut(&idx) {
            state.content_offset = (
                -bounds.min_x + EXPANDED_MARGIN_X,
                -bounds.min_y + EXPANDED_MARGIN_TOP,
            );
        }
        let node = self.graph.node_mut(idx);
        node.width = bounds.width() + 2.0 * EXPANDED_MARGIN_X;
        node.height = bounds.height() + EXPANDED_MARGIN_TOP + EXPANDED_MARGIN_BOTTOM;
    }

    /// After `idx` changed size, re-lays out every containing scope up to
    /// the root.
    fn relayout_from(&mut self, idx: NodeIdx) -> Result<(), GraphError> {
        let mut current = idx;
        loop {
            if current != FlowGraph::root() {
                if self.is_expanded(current) {
                    self.fit_expanded(current);
                }
                self.apply_box(current);
            }
            let Some(parent) = self.graph.node(current).parent else {
                break;
            };
            self.graph.layout_scope(parent, &self.layout)?;
            self.move_nodes(parent);
            current = parent;
        }
        Ok(())
    }

    /// Copies laid-out positions of a scope into the scene.
    fn move_nodes(&mut self, flow: NodeIdx) {
        for &idx in self.graph.children(flow) {
            if let Some(visual) = self.visuals.get(&idx) {
                let node = self.graph.node(idx);
                self.scene.set_translate(visual.group, node.x, node.y);
            }
        }
        let Some(lines) = self.edge_lines.get(&flow) else {
            return;
        };
        let edges = self
            .graph
            .scope(flow)
            .map(|scope| scope.edges.as_slice())
            .unwrap_or_default();
        for (&line, edge) in lines.iter().zip(edges) {
            self.scene.set_primitive(line, edge_primitive(&self.graph, edge));
        }
    }

    fn update_bounds(&mut self) {
        let bounds = children_bounds(&self.graph, FlowGraph::root()).unwrap_or(Bounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 0.0,
            max_y: 0.0,
        });
        self.bounds = bounds.inflate(self.render.graph_margin);
    }
}

fn group_rect() -> Primitive {
    Primitive::Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
        radius: BOX_RADIUS,
    }
}

/// Line from the bottom center of the source to the top center of the
/// target, through the route's bend points.
fn edge_primitive(graph: &FlowGraph, edge: &Edge) -> Primitive {
    let from = graph.node(edge.from);
    let to = graph.node(edge.to);
    let start = (from.x, from.y + from.height / 2.0);
    let end = (to.x, to.y - to.height / 2.0);
    if edge.bends.is_empty() {
        Primitive::Line {
            from: start,
            to: end,
        }
    } else {
        let mut points = Vec::with_capacity(edge.bends.len() + 2);
        points.push(start);
        points.extend_from_slice(&edge.bends);
        points.push(end);
        Primitive::Polyline { points }
    }
}

fn children_bounds(graph: &FlowGraph, flow: NodeIdx) -> Option<Bounds> {
    let children = graph.children(flow);
    let first = graph.node(*children.first()?);
    let seed = Bounds {
        min_x: first.x - BOUNDS_SEED,
        min_y: first.y - BOUNDS_SEED,
        max_x: first.x + BOUNDS_SEED,
        max_y: first.y + BOUNDS_SEED,
    };
    Some(children.iter().fold(seed, |acc, &idx| {
        let node = graph.node(idx);
        Bounds {
            min_x: acc.min_x.min(node.x - node.width / 2.0),
            min_y: acc.min_y.min(node.y - node.height / 2.0),
            max_x: acc.max_x.max(node.x + node.width / 2.0),
            max_y: acc.max_y.max(node.y + node.height / 2.0),
        }
    }))
}
