use crate::error::ConfigError;
use crate::layout::LayoutOptions;
use crate::navigate::NavigateConfig;
use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    /// Viewport size in pixels.
    pub width: f32,
    pub height: f32,
    /// Blank space around the laid-out graph when fitting it.
    pub graph_margin: f32,
    /// Zoom cap when centering a node or resetting the view.
    pub center_max_scale: f32,
    /// Re-center on the selected node.
    pub auto_pan_zoom: bool,
    /// Screen distance within which a click hits an edge.
    pub edge_hit_tolerance: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            graph_margin: 25.0,
            center_max_scale: 2.0,
            auto_pan_zoom: true,
            edge_hit_tolerance: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollConfig {
    pub pending_interval_ms: u64,
    pub running_interval_ms: u64,
    pub killing_interval_ms: u64,
    /// Wait before the last full refresh once the flow finished.
    pub final_delay_ms: u64,
    pub fetch_timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pending_interval_ms: 1_000,
            running_interval_ms: 5_000,
            killing_interval_ms: 30_000,
            final_delay_ms: 500,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl PollConfig {
    pub fn pending_interval(&self) -> Duration {
        Duration::from_millis(self.pending_interval_ms)
    }

    pub fn running_interval(&self) -> Duration {
        Duration::from_millis(self.running_interval_ms)
    }

    pub fn killing_interval(&self) -> Duration {
        Duration::from_millis(self.killing_interval_ms)
    }

    pub fn final_delay(&self) -> Duration {
        Duration::from_millis(self.final_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutOptions,
    pub render: RenderConfig,
    pub navigate: NavigateConfig,
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: Theme::console(),
            // The console spaces nodes a little wider than the bare engine.
            layout: LayoutOptions {
                horizontal_margin: 10.0,
                ..LayoutOptions::default()
            },
            render: RenderConfig::default(),
            navigate: NavigateConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThemeVariables {
    font_family: Option<String>,
    font_size: Option<f32>,
    flow_id_font_size: Option<f32>,
    text_color: Option<String>,
    background: Option<String>,
    node_fill: Option<String>,
    node_border: Option<String>,
    flow_fill: Option<String>,
    flow_border: Option<String>,
    edge_color: Option<String>,
    selected_border: Option<String>,
    disabled_opacity: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutFile {
    horizontal_margin: Option<f32>,
    dummy_size: Option<f32>,
    degree_ratio: Option<f32>,
    min_layer_gap: Option<f32>,
    corner_gap: Option<f32>,
    refinement_passes: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderFile {
    width: Option<f32>,
    height: Option<f32>,
    graph_margin: Option<f32>,
    center_max_scale: Option<f32>,
    auto_pan_zoom: Option<bool>,
    edge_hit_tolerance: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    theme_variables: Option<ThemeVariables>,
    layout: Option<LayoutFile>,
    render: Option<RenderFile>,
    navigate: Option<NavigateConfig>,
    poll: Option<PollConfig>,
}

/// Reads an optional JSON5 config file and overlays it on the defaults.
/// Keys are camelCase and every one of them is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let parsed: ConfigFile = json5::from_str(contents)?;

    if let Some(theme) = parsed.theme.as_deref().and_then(Theme::by_name) {
        config.theme = theme;
    }

    if let Some(vars) = parsed.theme_variables {
        let theme = &mut config.theme;
        if let Some(v) = vars.font_family {
            theme.font_family = v;
        }
        if let Some(v) = vars.font_size {
            theme.font_size = v;
        }
        if let Some(v) = vars.flow_id_font_size {
            theme.flow_id_font_size = v;
        }
        if let Some(v) = vars.text_color {
            theme.text_color = v;
        }
        if let Some(v) = vars.background {
            theme.background = v;
        }
        if let Some(v) = vars.node_fill {
            theme.node_fill = v;
        }
        if let Some(v) = vars.node_border {
            theme.node_border = v;
        }
        if let Some(v) = vars.flow_fill {
            theme.flow_fill = v;
        }
        if let Some(v) = vars.flow_border {
            theme.flow_border = v;
        }
        if let Some(v) = vars.edge_color {
            theme.edge_color = v;
        }
        if let Some(v) = vars.selected_border {
            theme.selected_border = v;
        }
        if let Some(v) = vars.disabled_opacity {
            theme.disabled_opacity = v;
        }
    }

    if let Some(layout) = parsed.layout {
        if let Some(v) = layout.horizontal_margin {
            config.layout.horizontal_margin = v;
        }
        if let Some(v) = layout.dummy_size {
            config.layout.dummy_size = v;
        }
        if let Some(v) = layout.degree_ratio {
            config.layout.degree_ratio = v;
        }
        if let Some(v) = layout.min_layer_gap {
            config.layout.min_layer_gap = v;
        }
        if let Some(v) = layout.corner_gap {
            config.layout.corner_gap = v;
        }
        if let Some(v) = layout.refinement_passes {
            config.layout.refinement_passes = v.max(1);
        }
    }

    if let Some(render) = parsed.render {
        if let Some(v) = render.width {
            config.render.width = v;
        }
        if let Some(v) = render.height {
            config.render.height = v;
        }
        if let Some(v) = render.graph_margin {
            config.render.graph_margin = v;
        }
        if let Some(v) = render.center_max_scale {
            config.render.center_max_scale = v;
        }
        if let Some(v) = render.auto_pan_zoom {
            config.render.auto_pan_zoom = v;
        }
        if let Some(v) = render.edge_hit_tolerance {
            config.render.edge_hit_tolerance = v;
        }
    }

    // Both sections are `#[serde(default)]`, so missing keys already hold defaults.
    if let Some(navigate) = parsed.navigate {
        config.navigate = navigate;
    }
    if let Some(poll) = parsed.poll {
        config.poll = poll;
    }

    Ok(config)
}
