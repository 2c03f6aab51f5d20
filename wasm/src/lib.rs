use flowlayer::config::{Config, parse_config};
use flowlayer::theme::Theme;
use flowlayer::{layout_flow as layout_flow_dump, render_flow_svg as render_svg};
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowRenderOptions {
    theme: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
    width: Option<f32>,
    height: Option<f32>,
    /// Full JSON5 config; the fields above override it.
    config: Option<String>,
}

fn build_config(options: FlowRenderOptions) -> Result<Config, String> {
    let mut config = match options.config.as_deref() {
        Some(raw) => parse_config(raw).map_err(|error| error.to_string())?,
        None => Config::default(),
    };
    if let Some(theme) = options.theme.as_deref().and_then(Theme::by_name) {
        config.theme = theme;
    }
    if let Some(font_family) = options.font_family {
        config.theme.font_family = font_family;
    }
    if let Some(font_size) = options.font_size {
        config.theme.font_size = font_size;
    }
    if let Some(width) = options.width {
        config.render.width = width;
    }
    if let Some(height) = options.height {
        config.render.height = height;
    }
    Ok(config)
}

fn parse_options(options_json: Option<String>) -> Result<Config, JsValue> {
    let options = match options_json {
        Some(raw_options) => serde_json::from_str::<FlowRenderOptions>(&raw_options)
            .map_err(|error| JsValue::from_str(&error.to_string()))?,
        None => FlowRenderOptions::default(),
    };
    build_config(options).map_err(|error| JsValue::from_str(&error))
}

#[wasm_bindgen]
pub fn render_flow_svg(flow_json: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let config = parse_options(options_json)?;
    render_svg(flow_json, &config).map_err(|error| JsValue::from_str(&error.to_string()))
}

/// Node and edge geometry of a flow as JSON.
#[wasm_bindgen]
pub fn layout_flow(flow_json: &str, options_json: Option<String>) -> Result<String, JsValue> {
    let config = parse_options(options_json)?;
    let dump = layout_flow_dump(flow_json, &config).map_err(|error| JsValue::from_str(&error.to_string()))?;
    serde_json::to_string(&dump).map_err(|error| JsValue::from_str(&error.to_string()))
}

#[cfg(test)]
mod tests {
    use flowlayer::render_flow_svg;

    use crate::{FlowRenderOptions, build_config};

    #[test]
    fn renders_nested_flow() {
        let flow = r#"{
            "flowId": "daily",
            "nodes": [
                {"id": "extract", "type": "command", "status": "SUCCEEDED"},
                {"id": "load", "type": "flow", "flowId": "loading", "in": ["extract"],
                 "nodes": [{"id": "users", "type": "command"}]}
            ]
        }"#;

        let svg = render_flow_svg(flow, &build_config(FlowRenderOptions::default()).unwrap())
            .expect("nested flow should render");

        assert!(svg.contains("<svg"));
        assert!(svg.contains("extract"));
        assert!(svg.contains("loading"));
    }

    #[test]
    fn options_override_config() {
        let options = FlowRenderOptions {
            theme: Some("dark".to_string()),
            width: Some(640.0),
            config: Some("{ render: { width: 300, height: 200 } }".to_string()),
            ..Default::default()
        };
        let config = build_config(options).unwrap();
        assert_eq!(config.render.width, 640.0);
        assert_eq!(config.render.height, 200.0);
        assert_eq!(config.theme.background, flowlayer::theme::Theme::dark().background);
    }
}
