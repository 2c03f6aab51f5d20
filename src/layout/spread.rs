use super::types::LayerNode;

/// Run of consecutive layer entries sharing one x, spread as a block.
#[derive(Debug, Clone)]
struct Range {
    start: usize,
    end: usize,
    width: f32,
    x: f32,
}

impl Range {
    fn left(&self) -> f32 {
        self.x - self.width / 2.0
    }

    fn right(&self) -> f32 {
        self.x + self.width / 2.0
    }
}

/// Removes horizontal overlap inside one layer.
///
/// Entries already sharing an x are packed side by side around it; the
/// resulting ranges are pushed apart from the center outward and never
/// pulled closer together.
pub(super) fn spread_layer_smart(layer: &[usize], records: &mut [LayerNode]) {
    if layer.is_empty() {
        return;
    }

    let mut ranges: Vec<Range> = Vec::new();
    for (pos, &idx) in layer.iter().enumerate() {
        let node = &records[idx];
        match ranges.last_mut() {
            Some(range) if range.x == node.x => {
                range.end = pos;
                range.width += node.width;
            }
            _ => ranges.push(Range {
                start: pos,
                end: pos,
                width: node.width,
                x: node.x,
            }),
        }
    }

    let count = ranges.len();
    let (left_from, right_from) = if count == 1 {
        (None, 1)
    } else if count % 2 == 1 {
        let mid = count / 2;
        (Some(mid - 1), mid + 1)
    } else {
        let e = count / 2;
        let s = e - 1;
        if ranges[s].right() > ranges[e].left() {
            let mid = (ranges[s].x + ranges[e].x) / 2.0;
            ranges[s].x = mid - ranges[s].width / 2.0;
            ranges[e].x = mid + ranges[e].width / 2.0;
        }
        (s.checked_sub(1), e + 1)
    };

    if let Some(from) = left_from {
        for i in (0..=from).rev() {
            let limit = ranges[i + 1].left();
            let overlap = ranges[i].right() - limit;
            if overlap > 0.0 {
                ranges[i].x -= overlap;
            }
        }
    }
    for i in right_from..count {
        let limit = ranges[i - 1].right();
        let overlap = limit - ranges[i].left();
        if overlap > 0.0 {
            ranges[i].x += overlap;
        }
    }

    for range in &ranges {
        if range.start == range.end {
            records[layer[range.start]].x = range.x;
            continue;
        }
        let mut cursor = range.left();
        for &idx in &layer[range.start..=range.end] {
            let width = records[idx].width;
            records[idx].x = cursor + width / 2.0;
            cursor += width;
        }
    }
}
