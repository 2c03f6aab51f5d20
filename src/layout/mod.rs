mod ranking;
mod routing;
mod spread;
pub(crate) mod types;
pub use types::*;

use ranking::{assign_levels, build_layers, insert_dummies, order_layers, resolve_edges};
use routing::{route_chain, space_vertically};
use std::collections::HashMap;
use tracing::debug;

use crate::error::LayoutError;

pub fn layout_graph(
    nodes: &[LayoutNode],
    edges: &[LayoutEdge],
    options: &LayoutOptions,
) -> Result<GraphLayout, LayoutError> {
    if nodes.is_empty() {
        return Ok(GraphLayout::default());
    }

    let resolved = resolve_edges(nodes, edges)?;
    let mut pairs: Vec<(usize, usize)> = Vec::with_capacity(resolved.len());
    let mut pair_index: HashMap<(usize, usize), usize> = HashMap::new();
    let edge_pairs: Vec<usize> = resolved
        .iter()
        .map(|&pair| {
            *pair_index.entry(pair).or_insert_with(|| {
                pairs.push(pair);
                pairs.len() - 1
            })
        })
        .collect();

    let levels = assign_levels(nodes, &pairs)?;
    let mut work = build_layers(nodes, &levels, options);
    let chains = insert_dummies(&mut work, &pairs, options);
    let dummy_count = chains.iter().map(Vec::len).sum();

    order_layers(&mut work, options.refinement_passes);
    space_vertically(&mut work, options);

    let routes: Vec<EdgeRoute> = pairs
        .iter()
        .zip(&chains)
        .map(|(&(from, to), chain)| route_chain(&work, from, to, chain, options))
        .collect();

    let placements = (0..nodes.len())
        .map(|idx| {
            let record = &work.records[idx];
            NodePlacement {
                level: record.level,
                x: record.x,
                y: record.y,
                slot_width: record.width,
            }
        })
        .collect();

    let layers = work
        .layers
        .iter()
        .map(|layer| {
            layer
                .iter()
                .map(|&idx| LayerSlot {
                    node: work.records[idx].source,
                    x: work.records[idx].x,
                    width: work.records[idx].width,
                })
                .collect()
        })
        .collect();

    debug!(
        nodes = nodes.len(),
        edges = edges.len(),
        layers = work.layers.len(),
        dummies = dummy_count,
        "layered layout computed"
    );

    Ok(GraphLayout {
        nodes: placements,
        edges: edge_pairs.into_iter().map(|pair| routes[pair].clone()).collect(),
        layers,
        dummy_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, width: f32) -> LayoutNode {
        LayoutNode::new(id, width, 22.0)
    }

    #[test]
    fn linear_chain_has_one_node_per_layer() {
        let nodes = vec![node("A", 30.0), node("B", 42.0), node("C", 30.0)];
        let edges = vec![LayoutEdge::new("A", "B"), LayoutEdge::new("B", "C")];
        let layout = layout_graph(&nodes, &edges, &LayoutOptions::default()).unwrap();

        let levels: Vec<usize> = layout.nodes.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![0, 1, 2]);
        assert_eq!(layout.nodes[1].slot_width, 42.0 + 8.0);
        assert_eq!(layout.dummy_count, 0);
        assert!(layout.edges.iter().all(EdgeRoute::is_direct));
        assert!(layout.nodes[0].y < layout.nodes[1].y && layout.nodes[1].y < layout.nodes[2].y);
        assert_eq!(layout.nodes[0].x, layout.nodes[2].x);
    }

    #[test]
    fn skip_edge_gets_one_guide() {
        let nodes = vec![node("A", 20.0), node("B", 20.0), node("C", 20.0)];
        let edges = vec![
            LayoutEdge::new("A", "C"),
            LayoutEdge::new("A", "B"),
            LayoutEdge::new("B", "C"),
        ];
        let layout = layout_graph(&nodes, &edges, &LayoutOptions::default()).unwrap();

        assert_eq!(layout.dummy_count, 1);
        let dummies: Vec<&LayerSlot> = layout
            .layers
            .iter()
            .flatten()
            .filter(|slot| slot.node.is_none())
            .collect();
        assert_eq!(dummies.len(), 1);
        assert!(layout.layers[1].iter().any(|slot| slot.node.is_none()));
        assert_eq!(layout.edges[0].guides.len(), 1);
        assert!(layout.edges[1].is_direct());
        assert_eq!(layout.edges[0].guides[0].1, layout.nodes[1].y);
    }

    #[test]
    fn steep_edges_get_extra_room() {
        let options = LayoutOptions {
            degree_ratio: 1.0,
            ..LayoutOptions::default()
        };
        let nodes: Vec<LayoutNode> = ["r", "a", "b", "c", "d", "e"]
            .iter()
            .map(|id| node(id, 120.0))
            .collect();
        let edges: Vec<LayoutEdge> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|to| LayoutEdge::new("r", *to))
            .collect();
        let layout = layout_graph(&nodes, &edges, &options).unwrap();
        let gap = layout.nodes[1].y - layout.nodes[0].y;
        assert!(gap > options.min_layer_gap + 22.0, "gap {gap}");
    }

    #[test]
    fn duplicate_edges_share_a_route() {
        let nodes = vec![node("A", 20.0), node("B", 20.0), node("C", 20.0)];
        let edges = vec![
            LayoutEdge::new("A", "B"),
            LayoutEdge::new("B", "C"),
            LayoutEdge::new("A", "C"),
            LayoutEdge::new("A", "C"),
        ];
        let layout = layout_graph(&nodes, &edges, &LayoutOptions::default()).unwrap();
        assert_eq!(layout.dummy_count, 1);
        assert_eq!(layout.edges[2], layout.edges[3]);
    }

    #[test]
    fn empty_input_is_empty_layout() {
        let layout = layout_graph(&[], &[], &LayoutOptions::default()).unwrap();
        assert!(layout.nodes.is_empty());
        assert!(layout.layers.is_empty());
    }

    #[test]
    fn isolated_nodes_share_level_zero() {
        let nodes = vec![node("x", 20.0), node("y", 20.0)];
        let layout = layout_graph(&nodes, &[], &LayoutOptions::default()).unwrap();
        assert!(layout.nodes.iter().all(|p| p.level == 0 && p.y == 0.0));
        assert_ne!(layout.nodes[0].x, layout.nodes[1].x);
    }

    #[test]
    fn extra_passes_keep_layers_disjoint() {
        let options = LayoutOptions {
            refinement_passes: 3,
            ..LayoutOptions::default()
        };
        let ids = ["a", "b", "c", "d", "e", "f", "g"];
        let nodes: Vec<LayoutNode> = ids.iter().map(|id| node(id, 25.0)).collect();
        let edges = vec![
            LayoutEdge::new("a", "c"),
            LayoutEdge::new("b", "c"),
            LayoutEdge::new("a", "g"),
            LayoutEdge::new("c", "d"),
            LayoutEdge::new("c", "e"),
            LayoutEdge::new("d", "f"),
            LayoutEdge::new("e", "f"),
        ];
        let layout = layout_graph(&nodes, &edges, &options).unwrap();
        for layer in &layout.layers {
            for pair in layer.windows(2) {
                assert!(pair[0].x + pair[0].width / 2.0 <= pair[1].x - pair[1].width / 2.0 + 1e-3);
            }
        }
    }
}
