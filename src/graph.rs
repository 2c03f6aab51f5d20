use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::ir::{Attempt, EdgeData, FlowData, NodeData};
use crate::layout::{GraphLayout, LayoutEdge, LayoutNode, LayoutOptions, layout_graph};
use crate::status::Status;

/// Separator of nested node paths, e.g. `cleanup:purge`.
pub const PATH_SEPARATOR: char = ':';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(usize);

impl NodeIdx {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Job,
    Flow,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    /// Wire type: `flow` or the job type.
    pub job_type: String,
    pub flow_id: Option<String>,
    pub status: Status,
    pub start_time: i64,
    pub end_time: i64,
    pub update_time: i64,
    pub past_attempts: Vec<Attempt>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub level: usize,
    pub parent: Option<NodeIdx>,
    pub in_nodes: Vec<NodeIdx>,
    pub out_nodes: Vec<NodeIdx>,
    pub scope: Option<FlowScope>,
}

impl Node {
    pub fn is_flow(&self) -> bool {
        self.kind == NodeKind::Flow
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowScope {
    pub children: Vec<NodeIdx>,
    pub edges: Vec<Edge>,
    pub index: HashMap<String, NodeIdx>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: NodeIdx,
    pub to: NodeIdx,
    /// One point per dummy node; empty between adjacent layers.
    pub guides: Vec<(f32, f32)>,
    pub bends: Vec<(f32, f32)>,
}

/// Every node, the root flow included, lives in one arena. Coordinates
/// are relative to the containing scope's layout origin.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    nodes: Vec<Node>,
    pub exec_id: Option<u64>,
    pub submit_user: Option<String>,
}

impl FlowGraph {
    pub fn from_data(data: &FlowData) -> Result<Self, GraphError> {
        let mut graph = FlowGraph {
            nodes: Vec::new(),
            exec_id: data.exec_id,
            submit_user: data.submit_user.clone(),
        };
        let root = graph.push(Node {
            id: data.flow_id.clone(),
            label: data.flow_id.clone(),
            kind: NodeKind::Flow,
            job_type: "flow".to_string(),
            flow_id: Some(data.flow_id.clone()),
            status: data.status,
            start_time: data.start_time,
            end_time: data.end_time,
            update_time: data.update_time,
            past_attempts: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            level: 0,
            parent: None,
            in_nodes: Vec::new(),
            out_nodes: Vec::new(),
            scope: None,
        });
        graph.build_scope(root, &data.flow_id, &data.nodes, &data.edges)?;
        Ok(graph)
    }

    pub fn root() -> NodeIdx {
        NodeIdx(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx.0]
    }

    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    pub fn get(&self, idx: NodeIdx) -> Option<&Node> {
        self.nodes.get(idx.0)
    }

    pub fn indices(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        (0..self.nodes.len()).map(NodeIdx)
    }

    pub fn scope(&self, flow: NodeIdx) -> Option<&FlowScope> {
        self.nodes[flow.0].scope.as_ref()
    }

    pub fn children(&self, flow: NodeIdx) -> &[NodeIdx] {
        self.scope(flow).map(|scope| scope.children.as_slice()).unwrap_or(&[])
    }

    pub fn child(&self, flow: NodeIdx, id: &str) -> Option<NodeIdx> {
        self.scope(flow)?.index.get(id).copied()
    }

    /// Resolves a `:`-separated path of ids starting below the root.
    pub fn find(&self, path: &str) -> Option<NodeIdx> {
        path.split(PATH_SEPARATOR)
            .try_fold(Self::root(), |flow, id| self.child(flow, id))
    }

    /// Inverse of [`FlowGraph::find`]; empty for the root.
    pub fn path_of(&self, idx: NodeIdx) -> String {
        let mut ids: Vec<&str> = std::iter::once(idx)
            .chain(self.ancestors(idx))
            .filter(|&node| node != Self::root())
            .map(|node| self.nodes[node.0].id.as_str())
            .collect();
        ids.reverse();
        ids.join(&PATH_SEPARATOR.to_string())
    }

    /// Containing flows from the direct parent up to the root.
    pub fn ancestors(&self, idx: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        std::iter::successors(self.nodes[idx.0].parent, |&node| self.nodes[node.0].parent)
    }

    /// Every node below `flow`, depth-first, parents before children.
    pub fn descendants(&self, flow: NodeIdx) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeIdx> = self.children(flow).iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            out.push(idx);
            stack.extend(self.children(idx).iter().rev().copied());
        }
        out
    }

    /// Flow nodes in post order, innermost first.
    pub fn flows_bottom_up(&self) -> Vec<NodeIdx> {
        let mut flows: Vec<NodeIdx> = std::iter::once(Self::root())
            .chain(self.descendants(Self::root()))
            .filter(|&idx| self.nodes[idx.0].is_flow())
            .collect();
        flows.sort_by_key(|&idx| std::cmp::Reverse(self.ancestors(idx).count()));
        flows
    }

    /// Lays out the direct children of `flow` from their current sizes and
    /// writes level, position and edge guides back into the arena.
    pub fn layout_scope(
        &mut self,
        flow: NodeIdx,
        options: &LayoutOptions,
    ) -> Result<GraphLayout, GraphError> {
        let Some(scope) = self.nodes[flow.0].scope.as_ref() else {
            return Ok(GraphLayout::default());
        };
        let layout_nodes: Vec<LayoutNode> = scope
            .children
            .iter()
            .map(|&idx| {
                let node = &self.nodes[idx.0];
                LayoutNode::new(node.id.clone(), node.width, node.height)
            })
            .collect();
        let layout_edges: Vec<LayoutEdge> = scope
            .edges
            .iter()
            .map(|edge| {
                LayoutEdge::new(
                    self.nodes[edge.from.0].id.clone(),
                    self.nodes[edge.to.0].id.clone(),
                )
            })
            .collect();

        let layout = layout_graph(&layout_nodes, &layout_edges, options).map_err(|source| {
            GraphError::Layout {
                flow: self.nodes[flow.0].id.clone(),
                source,
            }
        })?;

        let children = scope.children.clone();
        for (&idx, placement) in children.iter().zip(&layout.nodes) {
            let node = &mut self.nodes[idx.0];
            node.level = placement.level;
            node.x = placement.x;
            node.y = placement.y;
        }
        if let Some(scope) = self.nodes[flow.0].scope.as_mut() {
            for (edge, route) in scope.edges.iter_mut().zip(&layout.edges) {
                edge.guides = route.guides.clone();
                edge.bends = route.bends.clone();
            }
        }
        Ok(layout)
    }

    fn push(&mut self, node: Node) -> NodeIdx {
        self.nodes.push(node);
        NodeIdx(self.nodes.len() - 1)
    }

    fn build_scope(
        &mut self,
        flow: NodeIdx,
        flow_name: &str,
        nodes: &[NodeData],
        edges: &[EdgeData],
    ) -> Result<(), GraphError> {
        let mut scope = FlowScope::default();
        for data in nodes {
            if scope.index.contains_key(&data.id) {
                return Err(GraphError::DuplicateNode {
                    flow: flow_name.to_string(),
                    id: data.id.clone(),
                });
            }
            let idx = self.push(node_from_data(data, flow));
            scope.children.push(idx);
            scope.index.insert(data.id.clone(), idx);
        }

        let mut seen: HashSet<(NodeIdx, NodeIdx)> = HashSet::new();
        let declared = edges.iter().map(|edge| (edge.from.as_str(), edge.to.as_str()));
        let from_in_lists = nodes.iter().flat_map(|data| {
            data.in_nodes
                .iter()
                .map(move |from| (from.as_str(), data.id.as_str()))
        });
        for (from, to) in declared.chain(from_in_lists) {
            let resolve = |id: &str| {
                scope
                    .index
                    .get(id)
                    .copied()
                    .ok_or_else(|| GraphError::UnknownEndpoint {
                        flow: flow_name.to_string(),
                        from: from.to_string(),
                        to: to.to_string(),
                        missing: id.to_string(),
                    })
            };
            let from_idx = resolve(from)?;
            let to_idx = resolve(to)?;
            if !seen.insert((from_idx, to_idx)) {
                continue;
            }
            self.nodes[from_idx.0].out_nodes.push(to_idx);
            self.nodes[to_idx.0].in_nodes.push(from_idx);
            scope.edges.push(Edge {
                from: from_idx,
                to: to_idx,
                guides: Vec::new(),
                bends: Vec::new(),
            });
        }

        if let Some(node) = self.first_cycle_node(&scope) {
            return Err(GraphError::Cycle {
                flow: flow_name.to_string(),
                node,
            });
        }

        let children = scope.children.clone();
        self.nodes[flow.0].scope = Some(scope);
        for (data, idx) in nodes.iter().zip(children) {
            if data.is_flow() {
                let name = data.flow_id.as_deref().unwrap_or(&data.id);
                self.build_scope(idx, name, &data.nodes, &data.edges)?;
            }
        }
        Ok(())
    }

    /// Kahn's algorithm over one scope; returns the smallest stuck id.
    fn first_cycle_node(&self, scope: &FlowScope) -> Option<String> {
        let mut indeg: HashMap<NodeIdx, usize> = scope
            .children
            .iter()
            .map(|&idx| (idx, self.nodes[idx.0].in_nodes.len()))
            .collect();
        let mut queue: VecDeque<NodeIdx> = scope
            .children
            .iter()
            .copied()
            .filter(|idx| indeg[idx] == 0)
            .collect();
        while let Some(idx) = queue.pop_front() {
            for next in &self.nodes[idx.0].out_nodes {
                if let Some(count) = indeg.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }
        indeg
            .into_iter()
            .filter(|&(_, count)| count > 0)
            .map(|(idx, _)| self.nodes[idx.0].id.clone())
            .min()
    }
}

fn node_from_data(data: &NodeData, parent: NodeIdx) -> Node {
    let kind = if data.is_flow() {
        NodeKind::Flow
    } else {
        NodeKind::Job
    };
    Node {
        id: data.id.clone(),
        label: data.label.clone().unwrap_or_else(|| data.id.clone()),
        kind,
        job_type: data.node_type.clone(),
        flow_id: data.flow_id.clone(),
        status: data.status.unwrap_or_default(),
        start_time: data.start_time,
        end_time: data.end_time,
        update_time: data.update_time,
        past_attempts: data.past_attempts.clone(),
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
        level: 0,
        parent: Some(parent),
        in_nodes: Vec::new(),
        out_nodes: Vec::new(),
        scope: (kind == NodeKind::Flow).then(FlowScope::default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_flow;

    fn sample() -> FlowGraph {
        let data = parse_flow(
            r#"{
                "flowId": "daily",
                "nodes": [
                    {"id": "a", "type": "command"},
                    {"id": "b", "type": "command", "in": ["a"]},
                    {"id": "sub", "type": "flow", "flowId": "cleanup", "in": ["b"],
                     "nodes": [
                        {"id": "a", "type": "command"},
                        {"id": "z", "type": "command", "in": ["a"]}
                     ]}
                ],
                "edges": [{"from": "a", "to": "b"}]
            }"#,
        )
        .unwrap();
        FlowGraph::from_data(&data).unwrap()
    }

    #[test]
    fn ids_are_scoped_per_flow() {
        let graph = sample();
        let outer = graph.find("a").unwrap();
        let inner = graph.find("sub:a").unwrap();
        assert_ne!(outer, inner);
        assert_eq!(graph.path_of(inner), "sub:a");
        assert_eq!(graph.node(inner).parent, graph.find("sub"));
        assert!(graph.find("sub:missing").is_none());
    }

    #[test]
    fn in_lists_and_edges_are_merged() {
        let graph = sample();
        let a = graph.find("a").unwrap();
        let b = graph.find("b").unwrap();
        assert_eq!(graph.node(a).out_nodes, vec![b]);
        assert_eq!(graph.node(b).in_nodes, vec![a]);
        assert_eq!(graph.scope(FlowGraph::root()).unwrap().edges.len(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let data = parse_flow(
            r#"{"flowId": "f", "nodes": [{"id": "a", "type": "command"}, {"id": "a", "type": "java"}]}"#,
        )
        .unwrap();
        assert_eq!(
            FlowGraph::from_data(&data).unwrap_err(),
            GraphError::DuplicateNode {
                flow: "f".to_string(),
                id: "a".to_string()
            }
        );
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let data = parse_flow(
            r#"{"flowId": "f", "nodes": [{"id": "a", "type": "command", "in": ["ghost"]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            FlowGraph::from_data(&data),
            Err(GraphError::UnknownEndpoint { missing, .. }) if missing == "ghost"
        ));
    }

    #[test]
    fn cycle_in_nested_flow_names_the_flow() {
        let data = parse_flow(
            r#"{"flowId": "f", "nodes": [
                {"id": "s", "type": "flow", "flowId": "inner", "nodes": [
                    {"id": "x", "type": "command", "in": ["y"]},
                    {"id": "y", "type": "command", "in": ["x"]}
                ]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            FlowGraph::from_data(&data).unwrap_err(),
            GraphError::Cycle {
                flow: "inner".to_string(),
                node: "x".to_string()
            }
        );
    }

    #[test]
    fn layout_scope_writes_levels_back() {
        let mut graph = sample();
        for idx in graph.indices().collect::<Vec<_>>() {
            let node = graph.node_mut(idx);
            node.width = 40.0;
            node.height = 20.0;
        }
        graph
            .layout_scope(FlowGraph::root(), &LayoutOptions::default())
            .unwrap();
        let levels: Vec<usize> = ["a", "b", "sub"]
            .iter()
            .map(|path| graph.node(graph.find(path).unwrap()).level)
            .collect();
        assert_eq!(levels, vec![0, 1, 2]);
        let inner = graph.find("sub:z").unwrap();
        assert_eq!(graph.node(inner).level, 0);
    }

    #[test]
    fn flows_are_listed_innermost_first() {
        let graph = sample();
        let flows = graph.flows_bottom_up();
        assert_eq!(flows, vec![graph.find("sub").unwrap(), FlowGraph::root()]);
        assert_eq!(graph.descendants(FlowGraph::root()).len(), 5);
    }
}
