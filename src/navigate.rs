use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Share of the viewport a fitted box may occupy.
const FIT_FACTOR: f32 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigateConfig {
    pub zoom_points: Vec<f32>,
    pub zoom_num_levels: usize,
    pub zoom_index: usize,
    /// Tween length used by the view when it reframes the graph.
    pub fit_duration_ms: u64,
}

impl Default for NavigateConfig {
    fn default() -> Self {
        Self {
            zoom_points: vec![0.1, 0.14, 0.2, 0.4, 0.8, 1.0, 1.6, 2.4, 4.0, 8.0, 16.0],
            zoom_num_levels: 48,
            zoom_index: 24,
            fit_duration_ms: 0,
        }
    }
}

/// Scene-space box to frame, as passed to [`Viewport::fit_box`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_scale: Option<f32>,
    pub max_scale: Option<f32>,
    /// `None` or zero applies the transform at once.
    pub duration: Option<Duration>,
}

impl FitBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Default::default()
        }
    }

    pub fn max_scale(mut self, scale: f32) -> Self {
        self.max_scale = Some(scale);
        self
    }

    pub fn min_scale(mut self, scale: f32) -> Self {
        self.min_scale = Some(scale);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translate_x: f32,
    pub translate_y: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tween {
    from: Transform,
    to: Transform,
    to_index: usize,
    start: Instant,
    duration: Duration,
}

/// `screen = scene * scale + translate`.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    translate_x: f32,
    translate_y: f32,
    scale: f32,
    zoom_index: usize,
    zoom_levels: Vec<f32>,
    tween: Option<Tween>,
}

impl Viewport {
    pub fn new(width: f32, height: f32, config: &NavigateConfig) -> Self {
        let levels = config.zoom_num_levels.max(1);
        let zoom_levels: Vec<f32> = (0..levels)
            .map(|level| calculate_zoom_scale(level, levels, &config.zoom_points))
            .collect();
        let zoom_index = config.zoom_index.min(levels - 1);
        Self {
            width,
            height,
            translate_x: 0.0,
            translate_y: 0.0,
            scale: zoom_levels[zoom_index],
            zoom_index,
            zoom_levels,
            tween: None,
        }
    }

    pub fn transform(&self) -> Transform {
        Transform {
            translate_x: self.translate_x,
            translate_y: self.translate_y,
            scale: self.scale,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zoom_index(&self) -> usize {
        self.zoom_index
    }

    pub fn zoom_levels(&self) -> &[f32] {
        &self.zoom_levels
    }

    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    pub fn resize(&mut self, width: f32, height: f32) {
        self.width = width;
        self.height = height;
    }

    /// Shifts the view by a screen-space delta, as a drag does.
    pub fn translate_by(&mut self, dx: f32, dy: f32) {
        self.tween = None;
        self.translate_x += dx;
        self.translate_y += dy;
    }

    /// Multiplies the scale by `factor`, keeping the screen point `(px, py)`
    /// fixed.
    pub fn scale_at(&mut self, factor: f32, px: f32, py: f32) {
        self.tween = None;
        self.scale *= factor;
        self.translate_x = factor * self.translate_x + px - factor * px;
        self.translate_y = factor * self.translate_y + py - factor * py;
    }

    pub fn scale_to(&mut self, scale: f32, px: f32, py: f32) {
        if self.scale == 0.0 {
            return;
        }
        self.scale_at(scale / self.scale, px, py);
        self.scale = scale;
    }

    /// Moves the zoom index by `delta` wheel steps and zooms around the
    /// cursor.
    pub fn wheel(&mut self, delta: i32, px: f32, py: f32) {
        let last = self.zoom_levels.len() as i64 - 1;
        let index = (self.zoom_index as i64 + i64::from(delta)).clamp(0, last) as usize;
        self.zoom_index = index;
        self.scale_to(self.zoom_levels[index], px, py);
    }

    /// Frames a scene box in the viewport. Without a duration the result
    /// applies immediately; otherwise a tween starts at `now`.
    pub fn fit_box(&mut self, fit: FitBox, now: Instant) {
        // Nothing to frame into; the transform stays invertible.
        if !(self.width > 0.0 && self.height > 0.0) {
            return;
        }
        let width = if fit.width > 0.0 { fit.width } else { 1.0 };
        let height = if fit.height > 0.0 { fit.height } else { 1.0 };

        let mut scale = (self.width / width).min(self.height / height) * FIT_FACTOR;
        if let Some(max) = fit.max_scale {
            scale = scale.min(max);
        }
        if let Some(min) = fit.min_scale {
            scale = scale.max(min);
        }

        let target = Transform {
            translate_x: (self.width - width * scale) / 2.0 - scale * fit.x,
            translate_y: (self.height - height * scale) / 2.0 - scale * fit.y,
            scale,
        };
        let to_index = calculate_zoom_level(scale, &self.zoom_levels);

        match fit.duration {
            Some(duration) if !duration.is_zero() => {
                self.tween = Some(Tween {
                    from: self.transform(),
                    to: target,
                    to_index,
                    start: now,
                    duration,
                });
            }
            _ => {
                self.tween = None;
                self.apply(target);
                self.zoom_index = to_index;
            }
        }
    }

    /// Advances a running tween. Returns true while the transform moved.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(tween) = self.tween else {
            return false;
        };
        let elapsed = now.saturating_duration_since(tween.start);
        if elapsed >= tween.duration {
            self.apply(tween.to);
            self.zoom_index = tween.to_index;
            self.tween = None;
            return true;
        }

        let progress = elapsed.as_secs_f32() / tween.duration.as_secs_f32();
        let lerp = |from: f32, to: f32| (to - from) * progress + from;
        self.apply(Transform {
            translate_x: lerp(tween.from.translate_x, tween.to.translate_x),
            translate_y: lerp(tween.from.translate_y, tween.to.translate_y),
            scale: lerp(tween.from.scale, tween.to.scale),
        });
        true
    }

    /// Value for an SVG `transform` attribute.
    pub fn transform_attr(&self) -> String {
        format!(
            "translate({},{}) scale({})",
            self.translate_x, self.translate_y, self.scale
        )
    }

    /// Maps a screen point back into scene coordinates.
    pub fn to_scene(&self, sx: f32, sy: f32) -> (f32, f32) {
        (
            (sx - self.translate_x) / self.scale,
            (sy - self.translate_y) / self.scale,
        )
    }

    /// Scene rectangle currently visible, as `(x, y, width, height)`.
    pub fn visible_rect(&self) -> (f32, f32, f32, f32) {
        let (x, y) = self.to_scene(0.0, 0.0);
        (x, y, self.width / self.scale, self.height / self.scale)
    }

    fn apply(&mut self, transform: Transform) {
        self.translate_x = transform.translate_x;
        self.translate_y = transform.translate_y;
        self.scale = transform.scale;
    }
}

/// Linear interpolation of the zoom table between breakpoints.
pub fn calculate_zoom_scale(level: usize, num_levels: usize, points: &[f32]) -> f32 {
    let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
        return 1.0;
    };
    if level == 0 {
        return first;
    }
    if level >= num_levels {
        return last;
    }
    let factor = (level as f32 / num_levels as f32) * (points.len() - 1) as f32;
    let floor = factor.floor() as usize;
    let ceil = (factor.ceil() as usize).min(points.len() - 1);
    let blend = factor - floor as f32;
    blend * (points[ceil] - points[floor]) + points[floor]
}

/// Index of the largest zoom level not above `scale`.
pub fn calculate_zoom_level(scale: f32, levels: &[f32]) -> usize {
    let Some(&last) = levels.last() else {
        return 0;
    };
    if scale >= last {
        return levels.len() - 1;
    }
    levels
        .iter()
        .position(|&level| scale < level)
        .map(|pos| pos.saturating_sub(1))
        .unwrap_or(0)
}
