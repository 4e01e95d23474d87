use serde_json::Value;

use crate::data_types::{all_numeric, AxisEdge, AxisId, Tick, TickFormat};
use crate::scales::ChartScale;
use crate::svg::{translate, SvgNode};
use crate::theme::ChartTheme;

/// Where and how one axis of a panel is drawn.
pub struct AxisPlacement {
    pub axis: AxisId,
    /// Id prefix of the owning panel, e.g. `plot.panel`.
    pub base_id: String,
    pub translate: (f64, f64),
    /// Pixel length of the axis line.
    pub length: f64,
    pub format: TickFormat,
    pub label: Option<String>,
    pub label_position: (f64, f64),
    pub label_rotate: Option<f64>,
}

impl AxisPlacement {
    /// Placement of `axis` for a panel with the given geometry.
    pub fn for_panel(
        axis: AxisId,
        base_id: &str,
        plot_width: f64,
        height: f64,
        margin: crate::data_types::Margin,
        cliparea: (f64, f64),
        label_offset: f64,
    ) -> Self {
        let (translate, length, label_position, label_rotate) = match axis {
            AxisId::X => (
                (margin.left, height - margin.bottom),
                cliparea.0,
                (cliparea.0 / 2.0, label_offset),
                None,
            ),
            AxisId::Y1 => (
                (margin.left, margin.top),
                cliparea.1,
                (-label_offset, cliparea.1 / 2.0),
                Some(-90.0),
            ),
            AxisId::Y2 => (
                (plot_width - margin.right, margin.top),
                cliparea.1,
                (label_offset, cliparea.1 / 2.0),
                Some(-90.0),
            ),
        };
        Self {
            axis,
            base_id: base_id.to_string(),
            translate,
            length,
            format: TickFormat::Numeric,
            label: None,
            label_position,
            label_rotate,
        }
    }
}

pub struct AxisRenderer;

impl AxisRenderer {
    fn style_string(style: &Value) -> String {
        match style {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{}: {};", k, s),
                    other => format!("{}: {};", k, other),
                })
                .collect::<Vec<_>>()
                .join(" "),
            Value::String(s) => s.clone(),
            _ => String::new(),
        }
    }

    fn tick_node(
        edge: AxisEdge,
        pixel: f64,
        text: String,
        theme: &ChartTheme,
    ) -> SvgNode {
        let size = theme.tick_size;
        let (transform, line, label) = match edge {
            AxisEdge::Bottom | AxisEdge::Top => (
                translate(pixel, 0.0),
                SvgNode::new("line").attr("y2", size),
                SvgNode::new("text")
                    .attr("y", size + 3.0)
                    .attr("dy", "0.71em")
                    .attr("text-anchor", "middle"),
            ),
            AxisEdge::Left => (
                translate(0.0, pixel),
                SvgNode::new("line").attr("x2", -size),
                SvgNode::new("text")
                    .attr("x", -(size + 3.0))
                    .attr("dy", "0.32em")
                    .attr("text-anchor", "end"),
            ),
            AxisEdge::Right => (
                translate(0.0, pixel),
                SvgNode::new("line").attr("x2", size),
                SvgNode::new("text")
                    .attr("x", size + 3.0)
                    .attr("dy", "0.32em")
                    .attr("text-anchor", "start"),
            ),
        };
        SvgNode::new("g")
            .attr("class", "tick")
            .attr("transform", transform)
            .child(line.attr("stroke", &theme.axis_line))
            .child(
                label
                    .attr("fill", &theme.tick_label)
                    .attr("font-size", theme.tick_label_size)
                    .with_text(text),
            )
    }

    /// Draws one axis: domain line, ticks and the optional label.
    ///
    /// Numeric ticks are formatted through `placement.format`. When any tick is a
    /// label object, every tick is drawn from its own text, style and transform.
    pub fn render_axis(
        placement: &AxisPlacement,
        scale: &ChartScale,
        ticks: &[Tick],
        theme: &ChartTheme,
    ) -> SvgNode {
        let axis = placement.axis;
        let edge = axis.edge();
        let mut group = SvgNode::group(format!("{}.{}_axis", placement.base_id, axis))
            .attr("class", format!("lz-axis lz-{}", axis))
            .attr("transform", translate(placement.translate.0, placement.translate.1));

        let domain = match edge {
            AxisEdge::Bottom | AxisEdge::Top => format!("M0,0H{}", placement.length),
            AxisEdge::Left | AxisEdge::Right => format!("M0,0V{}", placement.length),
        };
        group.push(
            SvgNode::new("path")
                .attr("class", "domain")
                .attr("d", domain)
                .attr("stroke", &theme.axis_line)
                .attr("fill", "none"),
        );

        let numeric = all_numeric(ticks);
        for tick in ticks {
            let pixel = scale.map(tick.position());
            match tick {
                Tick::Value(v) if numeric => {
                    group.push(Self::tick_node(
                        edge,
                        pixel,
                        scale.format_tick(*v, placement.format),
                        theme,
                    ));
                }
                Tick::Value(v) => {
                    group.push(Self::tick_node(edge, pixel, crate::scales::format_number(*v), theme));
                }
                Tick::Label(label) => {
                    let mut node = Self::tick_node(edge, pixel, label.text.clone(), theme);
                    if let Some(text) = node.children.last_mut() {
                        if let Some(style) = &label.style {
                            text.set_attr("style", Self::style_string(style));
                        }
                        if let Some(transform) = &label.transform {
                            text.set_attr("transform", transform);
                        }
                        if let Some(color) = &label.color {
                            text.set_attr("fill", color);
                        }
                    }
                    group.push(node);
                }
            }
        }

        if let Some(label) = &placement.label {
            let (x, y) = placement.label_position;
            let mut text = SvgNode::new("text")
                .attr("id", format!("{}.{}_axis_label", placement.base_id, axis))
                .attr("class", "lz-axis-label")
                .attr("x", x)
                .attr("y", y)
                .attr("fill", &theme.axis_label)
                .attr("font-size", theme.axis_label_size)
                .with_text(label.clone());
            if let Some(rotate) = placement.label_rotate {
                text.set_attr("transform", format!("rotate({} {}, {})", rotate, x, y));
            }
            group.push(text);
        }
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{Margin, TickLabel};

    #[test]
    fn test_region_ticks_use_position_format() {
        let mut placement = AxisPlacement::for_panel(
            AxisId::X,
            "plot.p",
            800.0,
            200.0,
            Margin { top: 10.0, right: 20.0, bottom: 30.0, left: 40.0 },
            (740.0, 160.0),
            0.0,
        );
        placement.format = TickFormat::Region;
        let scale = ChartScale::new_linear((23_000_000.0, 24_000_000.0), (0.0, 740.0));
        let node = AxisRenderer::render_axis(
            &placement,
            &scale,
            &[Tick::Value(23_423_456.0)],
            &ChartTheme::default(),
        );
        assert_eq!(node.get_attr("transform"), Some("translate(40, 170)"));
        let tick = node.find_all_by_class("tick")[0];
        assert_eq!(tick.children[1].text.as_deref(), Some("23.42"));
    }

    #[test]
    fn test_label_ticks_carry_transform() {
        let placement = AxisPlacement::for_panel(
            AxisId::Y1,
            "plot.p",
            800.0,
            200.0,
            Margin::default(),
            (800.0, 200.0),
            0.0,
        );
        let scale = ChartScale::new_linear((0.0, 10.0), (200.0, 0.0));
        let ticks = vec![Tick::Label(TickLabel {
            position: 5.0,
            text: "five".into(),
            transform: Some("rotate(45)".into()),
            ..Default::default()
        })];
        let node = AxisRenderer::render_axis(&placement, &scale, &ticks, &ChartTheme::default());
        let text = &node.find_all_by_class("tick")[0].children[1];
        assert_eq!(text.text.as_deref(), Some("five"));
        assert_eq!(text.get_attr("transform"), Some("rotate(45)"));
    }
}
