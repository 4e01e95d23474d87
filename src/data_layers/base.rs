use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{DataLayer, LayerContext, LayerFetch};
use crate::data_types::{
    AxisBinding, AxisDim, AxisId, AxisRange, DataLayerLayout, DataSources, ElementStatus,
    FilterLayout, Record, SharedState,
};
use crate::error::Result;
use crate::field::Field;
use crate::layout::{find_fields, LayoutHandle};
use crate::registry::Registries;
use crate::scale_functions::ScalableDirective;
use crate::svg::SvgNode;
use crate::theme::ChartTheme;
use crate::transform::PlotTransform;
use crate::utils::{as_number, display_string};

/// The `points` layer: one circle per record at `(x_axis.field, y_axis.field)`.
///
/// Implements the shared extent contract (`floor`/`ceiling`, buffers, `min_extent`,
/// state fallback on x), layout `filters`, scalable `color`, and element status.
pub struct BaseDataLayer {
    id: String,
    state_id: String,
    layout: LayoutHandle,
    state: SharedState,
    registries: Arc<Registries>,
    data_sources: Arc<DataSources>,
    theme: Arc<ChartTheme>,
    data: Vec<Record>,
    color: Option<ScalableDirective>,
    status: HashMap<ElementStatus, HashSet<String>>,
}

impl BaseDataLayer {
    pub fn new(ctx: LayerContext) -> Result<Self> {
        let layout: DataLayerLayout = ctx.layout.read()?;
        for binding in [&layout.x_axis, &layout.y_axis] {
            if let Some(field) = &binding.field {
                Field::parse(field, &ctx.registries.transforms)?;
            }
        }
        for filter in &layout.filters {
            Field::parse(&filter.field, &ctx.registries.transforms)?;
            ctx.registries.match_functions.get(&filter.operator)?;
        }
        let color = layout
            .color
            .as_ref()
            .map(|c| ScalableDirective::parse(c, &ctx.registries))
            .transpose()?;
        Ok(Self {
            state_id: ctx.state_id(),
            id: ctx.id,
            layout: ctx.layout,
            state: ctx.state,
            registries: ctx.registries,
            data_sources: ctx.data_sources,
            theme: ctx.theme,
            data: Vec::new(),
            color,
            status: HashMap::new(),
        })
    }

    fn binding(layout: &DataLayerLayout, dim: AxisDim) -> &AxisBinding {
        match dim {
            AxisDim::X => &layout.x_axis,
            AxisDim::Y => &layout.y_axis,
        }
    }

    fn data_extent(&self, field: &str) -> Option<AxisRange> {
        let field = Field::parse(field, &self.registries.transforms).ok()?;
        AxisRange::from_values(
            self.data
                .iter()
                .filter_map(|record| field.peek(record, None))
                .filter_map(|v| as_number(&v)),
        )
    }

    fn passes_filters(&self, filters: &[FilterLayout], record: &mut Record) -> bool {
        filters.iter().all(|filter| {
            let Ok(field) = Field::parse(&filter.field, &self.registries.transforms) else {
                return false;
            };
            let Ok(test) = self.registries.match_functions.get(&filter.operator) else {
                return false;
            };
            let value = field.resolve(record, None).unwrap_or(Value::Null);
            test(&value, &filter.value)
        })
    }

    fn element_id(layout: &DataLayerLayout, record: &mut Record, index: usize) -> String {
        layout
            .extra
            .get("id_field")
            .and_then(Value::as_str)
            .and_then(|name| Field::new(name).ok())
            .and_then(|field| field.resolve(record, None))
            .map(|v| display_string(&v))
            .unwrap_or_else(|| index.to_string())
    }

    fn status_classes(&self, element_id: &str) -> String {
        let mut classes = String::from("lz-data_layer-points");
        for status in ElementStatus::ALL {
            if self.element_status(element_id, status) {
                classes.push_str(" lz-data_layer-points-");
                classes.push_str(status.adjective());
            }
        }
        classes
    }
}

impl DataLayer for BaseDataLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn state_id(&self) -> String {
        self.state_id.clone()
    }

    fn layout_handle(&self) -> &LayoutHandle {
        &self.layout
    }

    fn axis_extent(&self, dim: AxisDim) -> Option<AxisRange> {
        let layout = self.layout();
        let axis = Self::binding(&layout, dim);
        if let (Some(floor), Some(ceiling)) = (axis.floor, axis.ceiling) {
            return Some(AxisRange::new(floor, ceiling));
        }
        if let Some(field) = &axis.field {
            if self.data.is_empty() {
                return axis.min_extent;
            }
            if let Some(mut extent) = self.data_extent(field) {
                let span = extent.span();
                if let Some(lower) = axis.lower_buffer {
                    extent.min -= span * lower;
                }
                if let Some(upper) = axis.upper_buffer {
                    extent.max += span * upper;
                }
                if let Some(min_extent) = axis.min_extent {
                    extent = extent.union(min_extent);
                }
                return Some(AxisRange::new(
                    axis.floor.unwrap_or(extent.min),
                    axis.ceiling.unwrap_or(extent.max),
                ));
            }
        }
        if dim == AxisDim::X {
            return self.state.read().region();
        }
        None
    }

    fn re_map(&mut self) -> eyre::Result<LayerFetch> {
        self.destroy_all_tooltips();
        let layout = self.layout();
        let namespace = layout
            .namespace
            .clone()
            .ok_or_else(|| eyre::eyre!("Data layer {} does not name a data source", self.state_id))?;
        let source = self.data_sources.get(&namespace)?;
        let fields: Vec<String> = find_fields(&self.layout.get(), &[namespace.as_str()])
            .into_iter()
            .collect();
        debug!(layer = %self.state_id, %namespace, fields = fields.len(), "requesting data");
        let state = self.state.read().clone();
        Ok(source.fetch(&state, &fields))
    }

    fn receive_data(&mut self, records: Vec<Record>) {
        self.data = records;
    }

    fn data(&self) -> &[Record] {
        &self.data
    }

    fn render(&mut self, transform: &PlotTransform) -> SvgNode {
        let layout = self.layout();
        let mut group = SvgNode::group(format!("{}.data_layer", self.state_id))
            .attr("class", "lz-data_layer-container");
        let y_axis = AxisId::from_y_number(layout.y_axis.axis.unwrap_or(1)).unwrap_or(AxisId::Y1);
        let (Some(x_name), Some(y_name)) = (&layout.x_axis.field, &layout.y_axis.field) else {
            return group;
        };
        let (Ok(x_field), Ok(y_field)) = (
            Field::parse(x_name, &self.registries.transforms),
            Field::parse(y_name, &self.registries.transforms),
        ) else {
            return group;
        };
        let (Some(x_scale), Some(y_scale)) = (transform.x_scale, transform.scale(y_axis).copied()) else {
            return group;
        };
        let radius = layout
            .point_size
            .as_ref()
            .and_then(as_number)
            .unwrap_or(self.theme.point_size)
            / std::f64::consts::PI;
        let radius = radius.sqrt();

        let mut data = std::mem::take(&mut self.data);
        for (index, record) in data.iter_mut().enumerate() {
            if !self.passes_filters(&layout.filters, record) {
                continue;
            }
            let element_id = Self::element_id(&layout, record, index);
            if self.element_status(&element_id, ElementStatus::Hidden) {
                continue;
            }
            let x = x_field.resolve(record, None).as_ref().and_then(as_number);
            let y = y_field.resolve(record, None).as_ref().and_then(as_number);
            let (Some(x), Some(y)) = (x, y) else {
                continue;
            };
            let fill = match &self.color {
                Some(directive) => match directive.resolve(record, index, &self.registries.scale_functions) {
                    Ok(Value::Null) => self.theme.point_fill.clone(),
                    Ok(v) => display_string(&v),
                    Err(e) => {
                        warn!(layer = %self.state_id, "color could not be resolved: {}", e);
                        self.theme.point_fill.clone()
                    }
                },
                None => self.theme.point_fill.clone(),
            };
            group.push(
                SvgNode::new("circle")
                    .attr("id", format!("{}-{}", self.state_id, element_id))
                    .attr("class", self.status_classes(&element_id))
                    .attr("cx", x_scale.map(x))
                    .attr("cy", y_scale.map(y))
                    .attr("r", radius)
                    .attr("fill", fill),
            );
        }
        self.data = data;
        group
    }

    fn set_element_status(&mut self, element_id: &str, status: ElementStatus, toggle: bool) {
        let set = self.status.entry(status).or_default();
        if toggle {
            set.insert(element_id.to_string());
        } else {
            set.remove(element_id);
        }
    }

    fn set_all_element_status(&mut self, status: ElementStatus, toggle: bool) {
        if !toggle {
            self.status.entry(status).or_default().clear();
            return;
        }
        let layout = self.layout();
        let mut data = std::mem::take(&mut self.data);
        let ids: HashSet<String> = data
            .iter_mut()
            .enumerate()
            .map(|(index, record)| Self::element_id(&layout, record, index))
            .collect();
        self.data = data;
        self.status.insert(status, ids);
    }

    fn element_status(&self, element_id: &str, status: ElementStatus) -> bool {
        self.status
            .get(&status)
            .is_some_and(|set| set.contains(element_id))
    }

    fn absolute_data_height(&self) -> Option<f64> {
        let row_height = self.layout().row_height?;
        Some(self.data.len() as f64 * row_height)
    }
}

impl std::fmt::Debug for BaseDataLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseDataLayer")
            .field("id", &self.id)
            .field("state_id", &self.state_id)
            .field("records", &self.data.len())
            .finish()
    }
}
