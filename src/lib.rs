//! locus_plot: stacked genomic track panels sharing one region, with linked
//! drag/zoom interaction, declarative JSON layouts and pluggable data layers.

pub mod axis_renderer;
pub mod data_layers;
pub mod data_types;
pub mod error;
pub mod events;
pub mod field;
pub mod layout;
pub mod match_functions;
pub mod panel;
pub mod plot;
pub mod registry;
pub mod scale_functions;
pub mod scales;
pub mod svg;
pub mod theme;
pub mod toolbar;
pub mod transform;
pub mod utils;
pub mod view_controller;

pub use data_layers::{DataLayer, LayerContext};
pub use data_types::{DataSource, DataSources, PlotState, Record, StaticSource};
pub use error::{PlotError, Result};
pub use events::{EventContext, EventHub, ListenerId};
pub use field::Field;
pub use layout::{find_fields, merge, rename_field, LayoutHandle, LayoutStore};
pub use panel::{Panel, RemapStatus};
pub use plot::{Plot, PlotContext};
pub use registry::{Registries, Registry};
pub use svg::SvgNode;
pub use theme::ChartTheme;
pub use toolbar::{Toolbar, Widget, WidgetAction, WidgetView};
