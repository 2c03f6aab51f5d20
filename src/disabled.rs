use std::collections::BTreeSet;

use serde::Serialize;

use crate::graph::{FlowGraph, NodeIdx};
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// The node itself.
    Node,
    /// Direct predecessors.
    Parents,
    /// Direct successors.
    Children,
    /// Every transitive predecessor.
    Ancestors,
    /// Every transitive successor.
    Descendants,
    /// Every node of every scope.
    All,
}

/// Kept outside the graph so status merges never touch it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledSet {
    disabled: BTreeSet<NodeIdx>,
}

impl DisabledSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self, idx: NodeIdx) -> bool {
        self.disabled.contains(&idx)
    }

    pub fn len(&self) -> usize {
        self.disabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disabled.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        self.disabled.iter().copied()
    }

    /// Sets one flag, returning whether it changed.
    pub fn set(&mut self, idx: NodeIdx, disabled: bool) -> bool {
        if disabled {
            self.disabled.insert(idx)
        } else {
            self.disabled.remove(&idx)
        }
    }

    /// Applies `disabled` to the nodes `propagation` selects around `idx`.
    ///
    /// Neighbour variants leave `idx` itself alone. Returns the nodes whose
    /// flag actually changed.
    pub fn apply(
        &mut self,
        graph: &FlowGraph,
        idx: NodeIdx,
        propagation: Propagation,
        disabled: bool,
    ) -> Vec<NodeIdx> {
        let targets: Vec<NodeIdx> = match propagation {
            Propagation::Node => vec![idx],
            Propagation::Parents => graph.node(idx).in_nodes.clone(),
            Propagation::Children => graph.node(idx).out_nodes.clone(),
            Propagation::Ancestors => reachable(idx, |node| graph.node(node).in_nodes.as_slice()),
            Propagation::Descendants => reachable(idx, |node| graph.node(node).out_nodes.as_slice()),
            Propagation::All => graph.descendants(FlowGraph::root()),
        };
        targets
            .into_iter()
            .filter(|&target| self.set(target, disabled))
            .collect()
    }

    /// Rewrites the graph for a rerun of a finished execution: skipped and
    /// disabled nodes become ready but stay disabled, succeeded nodes are
    /// disabled, everything else is enabled.
    pub fn prepare_rerun(&mut self, graph: &mut FlowGraph) {
        for idx in graph.descendants(FlowGraph::root()) {
            let node = graph.node_mut(idx);
            let disabled = match node.status {
                Status::Disabled | Status::Skipped => {
                    node.status = Status::Ready;
                    true
                }
                Status::Succeeded => true,
                _ => false,
            };
            self.set(idx, disabled);
        }
    }

    /// Disabled nodes in the nested shape an execution request expects.
    /// A disabled flow is listed by id alone; an enabled flow appears only
    /// when something inside it is disabled.
    pub fn payload(&self, graph: &FlowGraph) -> Vec<DisabledEntry> {
        self.collect_scope(graph, FlowGraph::root())
    }

    fn collect_scope(&self, graph: &FlowGraph, flow: NodeIdx) -> Vec<DisabledEntry> {
        let mut entries = Vec::new();
        for &child in graph.children(flow) {
            let node = graph.node(child);
            if self.is_disabled(child) {
                entries.push(DisabledEntry::Node(node.id.clone()));
            } else if node.is_flow() {
                let children = self.collect_scope(graph, child);
                if !children.is_empty() {
                    entries.push(DisabledEntry::Flow {
                        id: node.id.clone(),
                        children,
                    });
                }
            }
        }
        entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DisabledEntry {
    Node(String),
    Flow {
        id: String,
        children: Vec<DisabledEntry>,
    },
}

fn reachable<'g>(
    start: NodeIdx,
    next: impl Fn(NodeIdx) -> &'g [NodeIdx],
) -> Vec<NodeIdx> {
    let mut visited: BTreeSet<NodeIdx> = BTreeSet::new();
    let mut order = Vec::new();
    let mut stack: Vec<NodeIdx> = next(start).to_vec();
    while let Some(idx) = stack.pop() {
        if idx == start || !visited.insert(idx) {
            continue;
        }
        order.push(idx);
        stack.extend_from_slice(next(idx));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_flow;

    fn graph() -> FlowGraph {
        let data = parse_flow(
            r#"{"flowId": "f", "nodes": [
                {"id": "a", "type": "command", "status": "SUCCEEDED"},
                {"id": "b", "type": "command", "in": ["a"], "status": "SKIPPED"},
                {"id": "c", "type": "command", "in": ["b"], "status": "FAILED"},
                {"id": "d", "type": "command", "in": ["a"]},
                {"id": "s", "type": "flow", "flowId": "inner", "in": ["c", "d"], "nodes": [
                    {"id": "x", "type": "command", "status": "DISABLED"},
                    {"id": "y", "type": "command", "in": ["x"], "status": "KILLED"}
                ]}
            ]}"#,
        )
        .unwrap();
        FlowGraph::from_data(&data).unwrap()
    }

    #[test]
    fn descendants_follow_out_edges_transitively() {
        let graph = graph();
        let mut set = DisabledSet::new();
        let a = graph.find("a").unwrap();
        let changed = set.apply(&graph, a, Propagation::Descendants, true);
        assert_eq!(changed.len(), 4);
        assert!(!set.is_disabled(a));
        assert!(set.is_disabled(graph.find("s").unwrap()));
        assert!(!set.is_disabled(graph.find("s:x").unwrap()));
    }

    #[test]
    fn descendants_of_a_sink_change_nothing() {
        let graph = graph();
        let mut set = DisabledSet::new();
        let sink = graph.find("s").unwrap();
        assert!(set.apply(&graph, sink, Propagation::Descendants, true).is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn parents_only_touch_direct_predecessors() {
        let graph = graph();
        let mut set = DisabledSet::new();
        let c = graph.find("c").unwrap();
        set.apply(&graph, c, Propagation::Parents, true);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![graph.find("b").unwrap()]);
        set.apply(&graph, c, Propagation::Ancestors, true);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn disable_then_enable_all_restores_everything() {
        let graph = graph();
        let mut set = DisabledSet::new();
        let root = FlowGraph::root();
        set.apply(&graph, root, Propagation::All, true);
        assert_eq!(set.len(), graph.len() - 1);
        set.apply(&graph, root, Propagation::All, false);
        assert!(set.is_empty());
    }

    #[test]
    fn rerun_rewrites_finished_nodes() {
        let mut graph = graph();
        let mut set = DisabledSet::new();
        set.prepare_rerun(&mut graph);

        let b = graph.find("b").unwrap();
        let x = graph.find("s:x").unwrap();
        assert_eq!(graph.node(b).status, Status::Ready);
        assert_eq!(graph.node(x).status, Status::Ready);
        assert!(set.is_disabled(b) && set.is_disabled(x));
        assert!(set.is_disabled(graph.find("a").unwrap()));
        assert!(!set.is_disabled(graph.find("c").unwrap()));
        assert!(!set.is_disabled(graph.find("s:y").unwrap()));
    }

    #[test]
    fn payload_nests_partially_disabled_flows() {
        let mut graph = graph();
        let mut set = DisabledSet::new();
        set.prepare_rerun(&mut graph);
        let payload = serde_json::to_value(set.payload(&graph)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!(["a", "b", {"id": "s", "children": ["x"]}])
        );

        set.set(graph.find("s").unwrap(), true);
        let payload = serde_json::to_value(set.payload(&graph)).unwrap();
        assert_eq!(payload, serde_json::json!(["a", "b", "s"]));
    }
}
