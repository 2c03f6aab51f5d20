use super::types::{EdgeRoute, LayoutOptions, WorkGraph};

/// Assigns layer y coordinates. Layers whose incoming edges run steeply
/// sideways get proportionally more vertical room.
pub(super) fn space_vertically(work: &mut WorkGraph, options: &LayoutOptions) {
    let Some(first) = work.layers.first() else {
        return;
    };

    let mut y = 0.0f32;
    let mut prev_max_height = 1.0f32;
    for &idx in first {
        work.records[idx].y = y;
        prev_max_height = prev_max_height.max(work.records[idx].height);
    }

    for level in 1..work.layers.len() {
        let mut max_delta = 0.0f32;
        let mut layer_max_height = 1.0f32;
        for &idx in &work.layers[level] {
            let node = &work.records[idx];
            layer_max_height = layer_max_height.max(node.height);
            for &upper in &node.ins {
                max_delta = max_delta.max((work.records[upper].x - node.x).abs());
            }
        }

        let angular = max_delta * options.degree_ratio;
        let stacked = options.min_layer_gap + prev_max_height / 2.0 + layer_max_height / 2.0;
        prev_max_height = layer_max_height;
        y += angular.max(stacked);
        for &idx in &work.layers[level] {
            work.records[idx].y = y;
        }
    }
}

/// Turns a dummy chain into guide points. A guide that bends away from
/// both neighbours gets a corner point just below it so the polyline does
/// not kink sharply.
pub(super) fn route_chain(
    work: &WorkGraph,
    from: usize,
    to: usize,
    chain: &[usize],
    options: &LayoutOptions,
) -> EdgeRoute {
    let mut route = EdgeRoute::default();
    if chain.is_empty() {
        return route;
    }

    let mut prev_x = work.records[from].x;
    let dest_x = work.records[to].x;
    for (pos, &dummy) in chain.iter().enumerate() {
        let point = (work.records[dummy].x, work.records[dummy].y);
        route.guides.push(point);
        route.bends.push(point);

        let next_x = chain
            .get(pos + 1)
            .map(|&next| work.records[next].x)
            .unwrap_or(dest_x);
        if point.0 != prev_x && point.0 != next_x && (point.0 > prev_x) == (point.0 > next_x) {
            route.bends.push((point.0, point.1 + options.corner_gap));
        }
        prev_x = point.0;
    }
    route
}
