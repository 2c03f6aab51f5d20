use std::collections::{HashMap, VecDeque};

use crate::error::LayoutError;

use super::spread::spread_layer_smart;
use super::types::{LayerNode, LayoutEdge, LayoutNode, LayoutOptions, WorkGraph};

/// Resolves edge endpoints to node indices. Unknown ids and self loops are
/// rejected; duplicate edges map onto the same pair.
pub(super) fn resolve_edges(
    nodes: &[LayoutNode],
    edges: &[LayoutEdge],
) -> Result<Vec<(usize, usize)>, LayoutError> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.id.as_str(), idx))
        .collect();

    edges
        .iter()
        .map(|edge| {
            let lookup = |id: &str| {
                index.get(id).copied().ok_or_else(|| LayoutError::UnknownNode {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: id.to_string(),
                })
            };
            let from = lookup(&edge.from)?;
            let to = lookup(&edge.to)?;
            if from == to {
                return Err(LayoutError::Cycle(edge.from.clone()));
            }
            Ok((from, to))
        })
        .collect()
}

/// Longest-path layering. A node is only finalized once every predecessor
/// is, so its level is one more than the deepest predecessor.
pub(super) fn assign_levels(
    nodes: &[LayoutNode],
    pairs: &[(usize, usize)],
) -> Result<Vec<usize>, LayoutError> {
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut indeg = vec![0usize; nodes.len()];
    for &(from, to) in pairs {
        outgoing[from].push(to);
        indeg[to] += 1;
    }

    let mut levels = vec![0usize; nodes.len()];
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&idx| indeg[idx] == 0).collect();
    let mut finalized = 0usize;
    while let Some(idx) = queue.pop_front() {
        finalized += 1;
        for &next in &outgoing[idx] {
            levels[next] = levels[next].max(levels[idx] + 1);
            indeg[next] -= 1;
            if indeg[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if finalized < nodes.len() {
        let stuck = (0..nodes.len())
            .filter(|&idx| indeg[idx] > 0)
            .min_by(|&a, &b| nodes[a].id.cmp(&nodes[b].id))
            .map(|idx| nodes[idx].id.clone())
            .unwrap_or_default();
        return Err(LayoutError::Cycle(stuck));
    }
    Ok(levels)
}

/// Buckets nodes into layers (ordered by id) and creates their working records.
pub(super) fn build_layers(
    nodes: &[LayoutNode],
    levels: &[usize],
    options: &LayoutOptions,
) -> WorkGraph {
    let max_level = levels.iter().copied().max().unwrap_or(0);
    let mut work = WorkGraph {
        records: Vec::with_capacity(nodes.len()),
        layers: vec![Vec::new(); max_level + 1],
    };

    let mut order: Vec<usize> = (0..nodes.len()).collect();
    order.sort_by(|&a, &b| nodes[a].id.cmp(&nodes[b].id));
    // Record index equals input index for real nodes.
    for (idx, node) in nodes.iter().enumerate() {
        work.records.push(LayerNode {
            source: Some(idx),
            level: levels[idx],
            x: 0.0,
            y: 0.0,
            width: node.width + options.horizontal_margin,
            height: node.height.max(1.0),
            ins: Vec::new(),
            outs: Vec::new(),
        });
    }
    for idx in order {
        work.layers[levels[idx]].push(idx);
    }
    work
}

/// Splits every edge spanning more than one level into unit hops. Returns
/// the dummy chain of each pair, empty for adjacent levels.
pub(super) fn insert_dummies(
    work: &mut WorkGraph,
    pairs: &[(usize, usize)],
    options: &LayoutOptions,
) -> Vec<Vec<usize>> {
    let mut chains = Vec::with_capacity(pairs.len());
    for &(from, to) in pairs {
        let mut chain = Vec::new();
        let mut last = from;
        for level in work.records[from].level + 1..work.records[to].level {
            let dummy = work.records.len();
            work.records.push(LayerNode {
                source: None,
                level,
                x: work.records[last].x,
                y: 0.0,
                width: options.dummy_size,
                height: options.dummy_size,
                ins: Vec::new(),
                outs: Vec::new(),
            });
            work.layers[level].push(dummy);
            work.link(last, dummy);
            last = dummy;
            chain.push(dummy);
        }
        work.link(last, to);
        chains.push(chain);
    }
    chains
}

#[derive(Debug, Clone, Copy)]
enum Toward {
    Predecessors,
    Successors,
}

/// Two-pass barycenter ordering: a bottom-up sweep seeded from the deepest
/// layer, a correction of the top two layers, then a top-down sweep.
pub(super) fn order_layers(work: &mut WorkGraph, passes: usize) {
    let max_level = work.max_level();
    spread_layer_smart(&work.layers[max_level], &mut work.records);
    sort_layer(work, max_level);
    sweep_up(work);

    if max_level > 1 {
        reorder(work, 1, Toward::Predecessors);
        reorder(work, 0, Toward::Successors);
    }
    sweep_down(work);

    for _ in 1..passes.max(1) {
        sweep_up(work);
        sweep_down(work);
    }
}

fn sweep_up(work: &mut WorkGraph) {
    for level in (0..work.max_level()).rev() {
        reorder(work, level, Toward::Successors);
    }
}

fn sweep_down(work: &mut WorkGraph) {
    for level in 1..=work.max_level() {
        reorder(work, level, Toward::Predecessors);
    }
}

fn reorder(work: &mut WorkGraph, level: usize, toward: Toward) {
    uncross(work, level, toward);
    sort_layer(work, level);
    spread_layer_smart(&work.layers[level], &mut work.records);
}

/// Moves each node to the mean x of its neighbours. Nodes without
/// neighbours on that side keep their position.
fn uncross(work: &mut WorkGraph, level: usize, toward: Toward) {
    for &idx in &work.layers[level] {
        let neighbours = match toward {
            Toward::Predecessors => &work.records[idx].ins,
            Toward::Successors => &work.records[idx].outs,
        };
        if neighbours.is_empty() {
            continue;
        }
        let sum: f32 = neighbours.iter().map(|&n| work.records[n].x).sum();
        let mean = sum / neighbours.len() as f32;
        work.records[idx].x = mean;
    }
}

fn sort_layer(work: &mut WorkGraph, level: usize) {
    let records = &work.records;
    work.layers[level].sort_by(|&a, &b| records[a].x.total_cmp(&records[b].x));
}
