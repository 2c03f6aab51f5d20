use tracing::warn;

use crate::graph::{FlowGraph, NodeIdx};
use crate::ir::{Attempt, StatusUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    /// Node the update document was applied to.
    pub changed_node: NodeIdx,
    /// Every live node the update touched, in document order.
    pub changed: Vec<NodeIdx>,
    /// Ids that did not resolve inside their flow.
    pub skipped: Vec<String>,
}

/// Merges `update` into the graph starting at the root flow.
pub fn apply_update(graph: &mut FlowGraph, update: &StatusUpdate) -> MergeReport {
    apply_update_at(graph, FlowGraph::root(), update)
}

/// Merges `update` into `target` and recursively into its children.
///
/// Fields missing from the update keep their live value. Applying the same
/// update twice leaves the graph as applying it once.
pub fn apply_update_at(graph: &mut FlowGraph, target: NodeIdx, update: &StatusUpdate) -> MergeReport {
    let mut report = MergeReport {
        changed_node: target,
        changed: Vec::new(),
        skipped: Vec::new(),
    };
    merge_node(graph, target, update, &mut report);
    report
}

fn merge_node(graph: &mut FlowGraph, idx: NodeIdx, update: &StatusUpdate, report: &mut MergeReport) {
    let node = graph.node_mut(idx);
    if let Some(start) = update.start_time {
        node.start_time = start;
    }
    if let Some(end) = update.end_time {
        node.end_time = end;
    }
    if let Some(time) = update.update_time {
        node.update_time = time;
    }
    if let Some(status) = update.status {
        node.status = status;
    }
    merge_attempts(&mut node.past_attempts, &update.past_attempts);
    report.changed.push(idx);

    for child in &update.nodes {
        let Some(id) = child.id.as_deref() else {
            warn!(flow = %graph.node(idx).id, "status update entry without an id skipped");
            report.skipped.push(String::new());
            continue;
        };
        match graph.child(idx, id) {
            Some(live) => merge_node(graph, live, child, report),
            None => {
                warn!(flow = %graph.node(idx).id, node = id, "status update for unknown node skipped");
                report.skipped.push(id.to_string());
            }
        }
    }
}

/// Overwrites attempts with a known number and appends the rest.
fn merge_attempts(live: &mut Vec<Attempt>, incoming: &[Attempt]) {
    for attempt in incoming {
        match live.iter_mut().find(|known| known.attempt == attempt.attempt) {
            Some(known) => *known = attempt.clone(),
            None => live.push(attempt.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{parse_flow, parse_update};
    use crate::status::Status;

    fn graph() -> FlowGraph {
        let data = parse_flow(
            r#"{"flowId": "f", "status": "RUNNING", "startTime": 100, "nodes": [
                {"id": "a", "type": "command", "status": "SUCCEEDED"},
                {"id": "b", "type": "command", "in": ["a"], "status": "RUNNING",
                 "pastAttempts": [{"attempt": 0, "startTime": 1, "endTime": 2, "status": "FAILED"}]},
                {"id": "s", "type": "flow", "flowId": "inner", "nodes": [
                    {"id": "x", "type": "command"}
                ]}
            ]}"#,
        )
        .unwrap();
        FlowGraph::from_data(&data).unwrap()
    }

    fn snapshot(graph: &FlowGraph) -> Vec<(Status, i64, i64, i64, Vec<Attempt>)> {
        graph
            .indices()
            .map(|idx| {
                let node = graph.node(idx);
                (
                    node.status,
                    node.start_time,
                    node.end_time,
                    node.update_time,
                    node.past_attempts.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn nested_update_reaches_sub_flow_children() {
        let mut graph = graph();
        let update = parse_update(
            r#"{"updateTime": 9, "status": "FAILED_FINISHING", "nodes": [
                {"id": "s", "status": "RUNNING", "nodes": [{"id": "x", "status": "FAILED", "endTime": 7}]}
            ]}"#,
        )
        .unwrap();
        let report = apply_update(&mut graph, &update);

        let x = graph.find("s:x").unwrap();
        assert_eq!(graph.node(x).status, Status::Failed);
        assert_eq!(graph.node(x).end_time, 7);
        assert_eq!(graph.node(FlowGraph::root()).status, Status::FailedFinishing);
        assert_eq!(graph.node(FlowGraph::root()).start_time, 100);
        assert_eq!(report.changed_node, FlowGraph::root());
        assert_eq!(report.changed.len(), 3);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let update = parse_update(
            r#"{"updateTime": 3, "nodes": [{"id": "b", "status": "SUCCEEDED",
                "pastAttempts": [{"attempt": 0, "startTime": 1, "endTime": 3, "status": "FAILED"},
                                 {"attempt": 1, "startTime": 4, "endTime": 5, "status": "KILLED"}]}]}"#,
        )
        .unwrap();
        let mut once = graph();
        apply_update(&mut once, &update);
        let mut twice = graph();
        apply_update(&mut twice, &update);
        apply_update(&mut twice, &update);
        assert_eq!(snapshot(&once), snapshot(&twice));

        let b = once.find("b").unwrap();
        assert_eq!(once.node(b).past_attempts.len(), 2);
        assert_eq!(once.node(b).past_attempts[0].end_time, 3);
    }

    #[test]
    fn empty_attempts_never_remove_history() {
        let mut graph = graph();
        let b = graph.find("b").unwrap();
        apply_update(&mut graph, &parse_update(r#"{"nodes": [{"id": "b", "pastAttempts": []}]}"#).unwrap());
        assert_eq!(graph.node(b).past_attempts.len(), 1);
    }

    #[test]
    fn stale_ids_are_skipped_and_the_rest_applies() {
        let mut graph = graph();
        let update = parse_update(
            r#"{"nodes": [{"id": "gone", "status": "FAILED"}, {"id": "a", "status": "KILLED"}]}"#,
        )
        .unwrap();
        let report = apply_update(&mut graph, &update);
        assert_eq!(report.skipped, vec!["gone".to_string()]);
        assert_eq!(graph.node(graph.find("a").unwrap()).status, Status::Killed);
    }
}
