use crate::data_types::AxisRange;
use crate::scales::ChartScale;

/// Zoom applied per wheel notch.
pub const ZOOM_IN_SCALE: f64 = 1.1;
pub const ZOOM_OUT_SCALE: f64 = 0.9;

/// Bound on drag-to-scale factors, as a power of ten.
pub const SCALAR_EXPONENT: i32 = 3;

/// ViewController holds the maths behind panel gestures (pan, tick scaling, wheel
/// zoom) as pure functions, so panels only decide which one applies.
pub struct ViewController;

impl ViewController {
    /// Clamps a scale factor into `[10^-exp, 10^exp]` (or the mirrored negative band)
    /// so a drag can never collapse or explode an axis.
    pub fn constrain(value: f64, exponent: i32) -> f64 {
        let hi = 10f64.powi(exponent);
        let lo = 10f64.powi(-exponent);
        if value.is_nan() {
            return 1.0;
        }
        if value == f64::INFINITY {
            return hi;
        }
        if value == f64::NEG_INFINITY {
            return -hi;
        }
        if value == 0.0 {
            return lo;
        }
        if value > 0.0 {
            value.clamp(lo, hi)
        } else {
            value.clamp(-hi, -lo)
        }
    }

    /// Background drag pans x by the raw pixel delta.
    pub fn background_pan(width: f64, dragged_x: f64) -> (f64, f64) {
        (dragged_x, width + dragged_x)
    }

    /// Dragging an x tick stretches the axis about its origin. `anchor` is the drag
    /// start measured from the left of the clip area.
    pub fn x_tick_scale(width: f64, anchor: f64, dragged_x: f64) -> (f64, f64) {
        let scalar = Self::constrain(anchor / (anchor + dragged_x), SCALAR_EXPONENT);
        (0.0, (width / scalar).max(1.0))
    }

    /// Shift-dragging a y tick pans the axis instead of scaling it.
    pub fn y_tick_pan(height: f64, dragged_y: f64) -> (f64, f64) {
        (height + dragged_y, dragged_y)
    }

    /// Dragging a y tick stretches the axis about its bottom. `anchor` is the drag
    /// start measured up from the bottom of the clip area.
    pub fn y_tick_scale(height: f64, anchor: f64, dragged_y: f64) -> (f64, f64) {
        let scalar = Self::constrain(anchor / (anchor - dragged_y), SCALAR_EXPONENT);
        (height, height - height / scalar)
    }

    /// Zoom scale for a wheel delta; `None` when the wheel did not move.
    pub fn wheel_zoom_scale(delta: f64) -> Option<f64> {
        let delta = delta.clamp(-1.0, 1.0);
        if delta == 0.0 || delta.is_nan() {
            return None;
        }
        Some(if delta < 1.0 { ZOOM_OUT_SCALE } else { ZOOM_IN_SCALE })
    }

    /// Region width after one zoom step, clamped to the plot's region scale bounds
    /// in the direction of travel.
    pub fn zoomed_region_size(
        current_size: f64,
        scale: f64,
        min_region_scale: Option<f64>,
        max_region_scale: Option<f64>,
    ) -> f64 {
        let potential = (current_size / scale).floor();
        match (scale < 1.0, scale > 1.0) {
            (true, _) => max_region_scale.map_or(potential, |max| potential.min(max)),
            (_, true) => min_region_scale.map_or(potential, |min| potential.max(min)),
            _ => potential,
        }
    }

    /// The region a wheel step should display. `previous` is the scale of the last
    /// render, so consecutive steps compound before the debounced commit.
    pub fn zoom_target(
        previous: &ChartScale,
        nominal: (f64, f64),
        scale: f64,
        anchor: f64,
        min_region_scale: Option<f64>,
        max_region_scale: Option<f64>,
    ) -> AxisRange {
        let shown_start = previous.invert(nominal.0).round();
        let shown_end = previous.invert(nominal.1).round();
        let shown_size = shown_end - shown_start;
        let new_size =
            Self::zoomed_region_size(shown_size, scale, min_region_scale, max_region_scale);
        let width = nominal.1 - nominal.0;
        let offset_ratio = if width > 0.0 { anchor / width } else { 0.5 };
        let new_start = (previous.invert(nominal.0) - (new_size - shown_size) * offset_ratio)
            .floor()
            .max(1.0);
        AxisRange::new(new_start, new_start + new_size)
    }

    /// Pixel range that makes `extent` display as `target` once the nominal range is
    /// inverted through it.
    pub fn shifted_range_for(extent: AxisRange, target: AxisRange, nominal: (f64, f64)) -> (f64, f64) {
        let to_pixels = ChartScale::from_extent(target, nominal);
        (to_pixels.map_raw(extent.min), to_pixels.map_raw(extent.max))
    }

    /// Extent shown through the nominal range after shifting: the two-pass rebuild.
    pub fn adjusted_extent(extent: AxisRange, shifted: (f64, f64), nominal: (f64, f64)) -> AxisRange {
        let provisional = ChartScale::from_extent(extent, shifted);
        AxisRange::new(provisional.invert(nominal.0), provisional.invert(nominal.1))
    }

    /// Moves a region by `step` bases, keeping the start at 1 or above.
    pub fn shift_region(region: AxisRange, step: f64) -> AxisRange {
        AxisRange::new((region.min + step).max(1.0), region.max + step)
    }

    /// Grows (`step > 0`) or shrinks a region about its centre by the fraction
    /// `step`, within the plot's region scale bounds.
    pub fn step_zoom_region(
        region: AxisRange,
        step: f64,
        min_region_scale: Option<f64>,
        max_region_scale: Option<f64>,
    ) -> AxisRange {
        let current = region.span();
        let mut size = current * (1.0 + step);
        if let Some(max) = max_region_scale {
            size = size.min(max);
        }
        if let Some(min) = min_region_scale {
            size = size.max(min);
        }
        let delta = ((size - current) / 2.0).floor();
        AxisRange::new((region.min - delta).max(1.0), region.max + delta)
    }
}
