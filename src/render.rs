use crate::config::RenderConfig;
use crate::scene::{ElementId, Icon, Primitive, Scene};
use crate::status::Status;
use crate::theme::Theme;
use crate::view::GraphView;
use anyhow::Result;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

/// Paint of the node group an element belongs to.
#[derive(Clone, Copy)]
struct NodePaint<'a> {
    stroke: &'a str,
    stroke_width: f32,
    opacity: Option<f32>,
}

/// Serializes the current scene and viewport transform as a standalone SVG.
///
/// Classes mirror the interactive scene so the output can be restyled, but
/// every shape also carries inline paint for rasterizers without CSS.
pub fn render_svg(view: &GraphView) -> String {
    let theme = view.theme();
    let viewport = view.viewport();
    let scene = view.scene();
    let (width, height) = (viewport.width, viewport.height);

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
    ));
    svg.push_str(&format!(
        "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
        theme.background
    ));
    svg.push_str("<style>");
    svg.push_str(&stylesheet(theme));
    svg.push_str("</style>");
    svg.push_str("<defs>");
    svg.push_str(&format!(
        "<marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" markerWidth=\"6\" markerHeight=\"6\" orient=\"auto\"><path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"{}\"/></marker>",
        theme.edge_color
    ));
    svg.push_str("</defs>");

    svg.push_str(&format!(
        "<g class=\"main graph\" transform=\"{}\">",
        viewport.transform_attr()
    ));
    let paint = NodePaint {
        stroke: &theme.node_border,
        stroke_width: 1.0,
        opacity: None,
    };
    for &child in &scene.element(scene.root()).children {
        write_element(&mut svg, scene, child, theme, paint);
    }
    svg.push_str("</g></svg>");

    debug!(bytes = svg.len(), elements = scene.len(), "svg serialized");
    svg
}

fn stylesheet(theme: &Theme) -> String {
    let mut css = format!(
        "text{{font-family:{};fill:{};}}.edge{{stroke:{};fill:none;}}.border{{fill:{};stroke:{};}}.flowborder{{fill:{};stroke:{};}}.selected .border,.selected .flowborder{{stroke:{};stroke-width:3;}}.nodeDisabled{{opacity:{};}}",
        theme.font_family,
        theme.text_color,
        theme.edge_color,
        theme.node_fill,
        theme.node_border,
        theme.flow_fill,
        theme.flow_border,
        theme.selected_border,
        theme.disabled_opacity,
    );
    for status in Status::ALL {
        if let Some(color) = theme.status_colors.color(status) {
            let _ = write!(
                css,
                ".{name} > .nodebox > .border,.{name} > .nodebox > .flowborder{{stroke:{color};}}",
                name = status.as_str()
            );
        }
    }
    css
}

/// Derives the paint of a `node ...` group from its class tokens.
fn node_paint<'a>(class: &str, theme: &'a Theme, inherited: NodePaint<'a>) -> NodePaint<'a> {
    let mut tokens = class.split_whitespace();
    if tokens.next() != Some("node") {
        return inherited;
    }
    let flow = tokens.next() == Some("flownode");
    let mut paint = NodePaint {
        stroke: if flow {
            &theme.flow_border
        } else {
            &theme.node_border
        },
        stroke_width: 1.0,
        opacity: None,
    };
    for token in tokens {
        match token {
            "nodeDisabled" => paint.opacity = Some(theme.disabled_opacity),
            "selected" => {
                paint.stroke = &theme.selected_border;
                paint.stroke_width = 3.0;
            }
            name => {
                if let Some(color) = theme.status_colors.color(Status::from_name(name))
                    && paint.stroke_width < 3.0
                {
                    paint.stroke = color;
                    paint.stroke_width = 2.0;
                }
            }
        }
    }
    paint
}

fn write_element(svg: &mut String, scene: &Scene, id: ElementId, theme: &Theme, paint: NodePaint<'_>) {
    let element = scene.element(id);
    if element.hidden {
        return;
    }
    let class = escape_xml(&element.class);

    match &element.primitive {
        Primitive::Group { translate } => {
            let paint = node_paint(&element.class, theme, paint);
            let opacity = match (paint.opacity, element.class.starts_with("node ")) {
                (Some(opacity), true) => format!(" opacity=\"{opacity}\""),
                _ => String::new(),
            };
            svg.push_str(&format!(
                "<g class=\"{class}\" transform=\"translate({:.2},{:.2})\"{opacity}>",
                translate.0, translate.1
            ));
            if let Some(title) = &element.title {
                svg.push_str(&format!("<title>{}</title>", escape_xml(title)));
            }
            for &child in &element.children {
                write_element(svg, scene, child, theme, paint);
            }
            svg.push_str("</g>");
        }
        Primitive::Rect {
            x,
            y,
            width,
            height,
            radius,
        } => {
            let fill = if element.class == "flowborder" {
                &theme.flow_fill
            } else {
                &theme.node_fill
            };
            svg.push_str(&format!(
                "<rect class=\"{class}\" x=\"{x:.2}\" y=\"{y:.2}\" width=\"{width:.2}\" height=\"{height:.2}\" rx=\"{radius}\" ry=\"{radius}\" fill=\"{fill}\" stroke=\"{}\" stroke-width=\"{}\"/>",
                paint.stroke, paint.stroke_width
            ));
        }
        Primitive::Text {
            x,
            y,
            text,
            font_size,
        } => {
            svg.push_str(&format!(
                "<text class=\"{class}\" x=\"{x:.2}\" y=\"{y:.2}\" font-family=\"{}\" font-size=\"{}\" fill=\"{}\">{}</text>",
                escape_xml(&theme.font_family),
                font_size.unwrap_or(theme.font_size),
                theme.text_color,
                escape_xml(text)
            ));
        }
        Primitive::Line { from, to } => {
            svg.push_str(&format!(
                "<line class=\"{class}\" x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"1.2\" marker-end=\"url(#arrow)\"/>",
                from.0, from.1, to.0, to.1, theme.edge_color
            ));
        }
        Primitive::Polyline { points } => {
            svg.push_str(&format!(
                "<polyline class=\"{class}\" points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.2\" marker-end=\"url(#arrow)\"/>",
                points_attr(points),
                theme.edge_color
            ));
        }
        Primitive::Icon {
            icon: Icon::Flow,
            x,
            y,
            width,
            height,
        } => {
            svg.push_str(&flow_icon(*x, *y, *width, *height, &theme.flow_border, &class));
        }
    }
}

/// Two stacked boxes joined by a connector.
fn flow_icon(x: f32, y: f32, width: f32, height: f32, color: &str, class: &str) -> String {
    let box_w = width * 0.45;
    let box_h = height * 0.35;
    let top = (x, y);
    let bottom = (x + width - box_w, y + height - box_h);
    format!(
        "<g class=\"{class}\"><rect x=\"{:.2}\" y=\"{:.2}\" width=\"{box_w:.2}\" height=\"{box_h:.2}\" fill=\"none\" stroke=\"{color}\"/><rect x=\"{:.2}\" y=\"{:.2}\" width=\"{box_w:.2}\" height=\"{box_h:.2}\" fill=\"none\" stroke=\"{color}\"/><polyline points=\"{}\" fill=\"none\" stroke=\"{color}\"/></g>",
        top.0,
        top.1,
        bottom.0,
        bottom.1,
        points_attr(&[
            (top.0 + box_w / 2.0, top.1 + box_h),
            (top.0 + box_w / 2.0, y + height / 2.0),
            (bottom.0 + box_w / 2.0, y + height / 2.0),
            (bottom.0 + box_w / 2.0, bottom.1),
        ])
    )
}

fn points_attr(points: &[(f32, f32)]) -> String {
    points
        .iter()
        .map(|(x, y)| format!("{x:.2},{y:.2}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
            info!(path = %path.display(), "wrote svg");
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig, theme: &Theme) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.font_family = theme
        .font_family
        .split(',')
        .map(|name| name.trim().trim_matches(|c| c == '"' || c == '\''))
        .find(|name| !name.is_empty())
        .unwrap_or("sans-serif")
        .to_string();
    opt.fontdb_mut().load_system_fonts();
    opt.default_size = usvg::Size::from_wh(render_cfg.width, render_cfg.height)
        .ok_or_else(|| anyhow::anyhow!("invalid viewport size {}x{}", render_cfg.width, render_cfg.height))?;

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    info!(path = %output.display(), width = size.width(), height = size.height(), "wrote png");
    Ok(())
}

#[cfg(not(feature = "png"))]
pub fn write_output_png(_svg: &str, _output: &Path, _render_cfg: &RenderConfig, _theme: &Theme) -> Result<()> {
    anyhow::bail!("PNG output requires the `png` feature")
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::disabled::Propagation;
    use crate::graph::FlowGraph;
    use crate::ir::parse_flow;
    use crate::text_metrics::FixedMetrics;

    fn view() -> GraphView {
        let data = parse_flow(
            r#"{
                "flowId": "etl",
                "nodes": [
                    {"id": "extract", "type": "command", "status": "SUCCEEDED"},
                    {"id": "load<db>", "type": "command", "in": ["extract"]},
                    {"id": "report", "type": "flow", "flowId": "reporting", "in": ["extract"],
                     "nodes": [{"id": "render", "type": "command"}]}
                ]
            }"#,
        )
        .unwrap();
        let graph = FlowGraph::from_data(&data).unwrap();
        GraphView::new(graph, &Config::default(), Box::new(FixedMetrics::default())).unwrap()
    }

    #[test]
    fn render_svg_basic() {
        let view = view();
        let svg = render_svg(&view);
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("class=\"node jobnode SUCCEEDED\""));
        assert!(svg.contains("<title>SUCCEEDED (command)</title>"));
        assert!(svg.contains("load&lt;db&gt;"));
        assert!(svg.contains(&view.viewport().transform_attr()));
        assert!(svg.contains(">reporting</text>"));
        // Children of a collapsed flow are not drawn.
        assert!(!svg.contains(">render</text>"));
    }

    #[test]
    fn expanded_flow_children_are_drawn() {
        let mut view = view();
        let report = view.graph().find("report").unwrap();
        view.expand(report).unwrap();
        let svg = render_svg(&view);
        assert!(svg.contains(">render</text>"));
        assert!(svg.contains("class=\"nodebox expanded\""));
    }

    #[test]
    fn disabled_nodes_are_faded() {
        let mut view = view();
        let extract = view.graph().find("extract").unwrap();
        view.set_disabled(extract, Propagation::Node, true);
        let svg = render_svg(&view);
        assert!(svg.contains("class=\"node jobnode SUCCEEDED nodeDisabled\" transform="));
        assert!(svg.contains(&format!("opacity=\"{}\"", view.theme().disabled_opacity)));
    }

    #[test]
    fn status_classes_get_border_colors() {
        let theme = Theme::console();
        let css = stylesheet(&theme);
        assert!(css.contains(".FAILED > .nodebox > .border,"));
        assert!(css.contains(&theme.status_colors.failed));
        assert!(!css.contains(".READY"));
    }
}
