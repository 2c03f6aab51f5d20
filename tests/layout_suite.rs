use std::path::Path;

use flowlayer::config::Config;
use flowlayer::disabled::{DisabledEntry, Propagation};
use flowlayer::graph::{FlowGraph, NodeIdx};
use flowlayer::ir::{parse_flow, parse_update};
use flowlayer::text_metrics::FixedMetrics;
use flowlayer::{GraphView, Status, render_flow_svg};

const FIXTURES: [&str; 5] = [
    "linear.json",
    "diamond.json",
    "skip_edges.json",
    "wide.json",
    "nested.json",
];

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path).expect("fixture read failed")
}

fn load_view(name: &str) -> GraphView {
    let data = parse_flow(&fixture(name)).expect("parse failed");
    let graph = FlowGraph::from_data(&data).expect("invalid flow");
    GraphView::new(graph, &Config::default(), Box::new(FixedMetrics::default())).expect("layout failed")
}

fn scopes(graph: &FlowGraph) -> Vec<NodeIdx> {
    std::iter::once(FlowGraph::root())
        .chain(graph.descendants(FlowGraph::root()))
        .filter(|&idx| graph.node(idx).is_flow())
        .collect()
}

#[test]
fn render_all_fixtures() {
    for name in FIXTURES {
        let svg = render_flow_svg(&fixture(name), &Config::default())
            .unwrap_or_else(|err| panic!("{name}: {err}"));
        assert!(svg.contains("<svg"), "{name}: missing <svg tag");
        assert!(svg.contains("</svg>"), "{name}: missing </svg tag");
        assert!(svg.contains("node jobnode"), "{name}: no job nodes drawn");
    }
}

#[test]
fn edges_always_point_down() {
    for name in FIXTURES {
        let mut view = load_view(name);
        view.expand_all().unwrap();
        let graph = view.graph();
        for flow in scopes(graph) {
            for edge in &graph.scope(flow).unwrap().edges {
                let (from, to) = (graph.node(edge.from), graph.node(edge.to));
                assert!(to.level > from.level, "{name}: {} -> {}", from.id, to.id);
                assert!(to.y > from.y, "{name}: {} -> {}", from.id, to.id);
                assert_eq!(edge.guides.len(), to.level - from.level - 1, "{name}");
            }
        }
    }
}

#[test]
fn nodes_in_a_layer_never_overlap() {
    let margin = Config::default().layout.horizontal_margin;
    for name in FIXTURES {
        let mut view = load_view(name);
        view.expand_all().unwrap();
        let graph = view.graph();
        for flow in scopes(graph) {
            let mut boxes: Vec<(usize, f32, f32)> = graph
                .children(flow)
                .iter()
                .map(|&idx| {
                    let node = graph.node(idx);
                    (node.level, node.x - node.width / 2.0, node.x + node.width / 2.0)
                })
                .collect();
            boxes.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
            for pair in boxes.windows(2) {
                if pair[0].0 == pair[1].0 {
                    assert!(pair[1].1 - pair[0].2 >= margin - 1e-3, "{name}: {pair:?}");
                }
            }
        }
    }
}

#[test]
fn duplicate_edges_are_drawn_once() {
    let view = load_view("skip_edges.json");
    let root = view.graph().scope(FlowGraph::root()).unwrap();
    assert_eq!(root.edges.len(), 6);
    let a = view.graph().find("a").unwrap();
    let e = view.graph().find("e").unwrap();
    assert_eq!(view.graph().node(a).level, 0);
    assert_eq!(view.graph().node(e).level, 4);
}

#[test]
fn nested_update_reaches_every_level() {
    let mut view = load_view("nested.json");
    let update = parse_update(&fixture("nested_update.json")).unwrap();
    let report = view.apply_update(&update);
    assert_eq!(report.skipped, ["gone"]);

    let graph = view.graph();
    assert_eq!(graph.node(FlowGraph::root()).status, Status::Succeeded);
    assert_eq!(graph.node(FlowGraph::root()).update_time, 2500);
    let orders = graph.find("load:orders").unwrap();
    assert_eq!(graph.node(orders).status, Status::Succeeded);
    assert_eq!(graph.node(orders).end_time, 2400);
    let report_job = graph.find("load:check:report").unwrap();
    assert_eq!(graph.node(report_job).status, Status::Succeeded);
    let notify = graph.find("notify").unwrap();
    assert_eq!(graph.node(notify).past_attempts.len(), 1);
    // Untouched fields keep their value.
    let ingest = graph.find("ingest").unwrap();
    assert_eq!(graph.node(ingest).status, Status::Succeeded);
}

#[test]
fn rerun_payload_lists_finished_work() {
    let mut view = load_view("nested.json");
    view.prepare_rerun();

    let payload = view.disabled_payload();
    assert!(payload.contains(&DisabledEntry::Node("ingest".to_string())));
    assert!(!payload.contains(&DisabledEntry::Node("notify".to_string())));
    let load = payload
        .iter()
        .find_map(|entry| match entry {
            DisabledEntry::Flow { id, children } if id == "load" => Some(children),
            _ => None,
        })
        .expect("load flow entry");
    assert_eq!(load, &[DisabledEntry::Node("users".to_string())]);

    // Once the flow itself succeeded it is listed by id alone.
    let update = parse_update(&fixture("nested_update.json")).unwrap();
    view.apply_update(&update);
    view.prepare_rerun();
    assert!(view.disabled_payload().contains(&DisabledEntry::Node("load".to_string())));
}

#[test]
fn disabling_descendants_skips_the_node_itself() {
    let mut view = load_view("diamond.json");
    let start = view.graph().find("start").unwrap();
    let changed = view.set_disabled(start, Propagation::Descendants, true);
    assert_eq!(changed.len(), 3);
    assert!(!view.disabled().is_disabled(start));
}

#[test]
fn deep_selection_expands_the_whole_chain() {
    let mut view = load_view("nested.json");
    let counts = view.graph().find("load:check:counts").unwrap();
    view.select(Some(counts)).unwrap();
    assert!(view.is_expanded(view.graph().find("load").unwrap()));
    assert!(view.is_expanded(view.graph().find("load:check").unwrap()));
    assert!(view.node_position(counts).is_some());
}
