//! Data to pixel projection for one panel render.

use crate::data_types::{AxisId, AxisRange};
use crate::scales::ChartScale;

/// The scales of one panel render, handed to data layers so they can place marks
/// inside the clip area.
#[derive(Clone, Debug, Default)]
pub struct PlotTransform {
    pub x_scale: Option<ChartScale>,
    pub y1_scale: Option<ChartScale>,
    pub y2_scale: Option<ChartScale>,
    /// Clip area size in pixels.
    pub width: f64,
    pub height: f64,
}

impl PlotTransform {
    pub fn scale(&self, axis: AxisId) -> Option<&ChartScale> {
        match axis {
            AxisId::X => self.x_scale.as_ref(),
            AxisId::Y1 => self.y1_scale.as_ref(),
            AxisId::Y2 => self.y2_scale.as_ref(),
        }
    }

    pub fn x_data_to_screen(&self, x: f64) -> Option<f64> {
        self.x_scale.as_ref().map(|s| s.map(x))
    }

    pub fn y_data_to_screen(&self, axis: AxisId, y: f64) -> Option<f64> {
        self.scale(axis).map(|s| s.map(y))
    }

    /// Data-space position `(x, y)` for a pixel inside the clip area.
    pub fn screen_to_data(&self, axis: AxisId, px: f64, py: f64) -> Option<(f64, f64)> {
        Some((self.x_scale.as_ref()?.invert(px), self.scale(axis)?.invert(py)))
    }

    /// Visible data extent on `axis`, taken from the scale's pixel range.
    pub fn visible_extent(&self, axis: AxisId) -> Option<AxisRange> {
        let scale = self.scale(axis)?;
        let (r0, r1) = scale.range();
        let (a, b) = (scale.invert(r0), scale.invert(r1));
        Some(AxisRange::new(a.min(b), a.max(b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_clip_area() {
        let transform = PlotTransform {
            x_scale: Some(ChartScale::new_linear((1000.0, 2000.0), (0.0, 500.0))),
            y1_scale: Some(ChartScale::new_linear((0.0, 10.0), (200.0, 0.0))),
            y2_scale: None,
            width: 500.0,
            height: 200.0,
        };
        assert_eq!(transform.x_data_to_screen(1500.0), Some(250.0));
        assert_eq!(transform.y_data_to_screen(AxisId::Y1, 5.0), Some(100.0));
        assert_eq!(transform.y_data_to_screen(AxisId::Y2, 5.0), None);
        assert_eq!(transform.screen_to_data(AxisId::Y1, 250.0, 100.0), Some((1500.0, 5.0)));
        assert_eq!(transform.visible_extent(AxisId::Y1), Some(AxisRange::new(0.0, 10.0)));
    }
}
