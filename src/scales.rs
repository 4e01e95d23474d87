use crate::data_types::{AxisRange, TickFormat};
use crate::utils::position_formatter::format_position;

/// Linear mapping from a data domain to a pixel range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChartScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl ChartScale {
    pub fn new_linear(domain: (f64, f64), range: (f64, f64)) -> Self {
        let mut d_min = domain.0;
        let mut d_max = domain.1;
        if (d_max - d_min).abs() < f64::EPSILON {
            d_min -= 0.5;
            d_max += 0.5;
        }
        Self {
            domain: (d_min, d_max),
            range,
        }
    }

    pub fn from_extent(extent: AxisRange, range: (f64, f64)) -> Self {
        Self::new_linear((extent.min, extent.max), range)
    }

    /// Unguarded mapping; NaN propagates from a NaN domain or input.
    pub fn map_raw(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        r0 + (value - d0) / (d1 - d0) * (r1 - r0)
    }

    pub fn map(&self, value: f64) -> f64 {
        let res = self.map_raw(value);
        if res.is_nan() || res.is_infinite() {
            0.0
        } else {
            res
        }
    }

    pub fn invert(&self, pixel: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if (r1 - r0).abs() < f64::EPSILON {
            return d0;
        }
        d0 + (pixel - r0) / (r1 - r0) * (d1 - d0)
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    /// Whether the scale produces a usable coordinate; empty panels fail this.
    pub fn is_renderable(&self) -> bool {
        self.map_raw(0.0).is_finite()
    }

    pub fn format_tick(&self, value: f64, format: TickFormat) -> String {
        match format {
            TickFormat::Region => format_position(value, Some(6), false),
            TickFormat::Numeric => format_number(value),
        }
    }
}

/// Default numeric tick text: integers print bare, fractions keep up to four places.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{:.0}", value);
    }
    let text = if value.abs() < 0.001 {
        format!("{:.4e}", value)
    } else {
        format!("{:.4}", value)
    };
    if text.contains('e') {
        return text;
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Which out-of-range end ticks `pretty_ticks` drops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickClip {
    Low,
    High,
    Both,
    #[default]
    Neither,
}

fn round_places(value: f64, places: usize) -> f64 {
    format!("{:.*}", places, value).parse().unwrap_or(value)
}

/// Rounded tick values covering `extent`, close to `target_count` of them and
/// spaced by 1, 2 or 5 times a power of ten.
pub fn pretty_ticks(extent: AxisRange, clip: TickClip, target_count: usize) -> Vec<f64> {
    let target = target_count.max(1) as f64;
    let min_n = target / 3.0;
    let shrink_sml = 0.75;
    let high_u_bias = 1.5;
    let u5_bias = 0.5 + 1.5 * high_u_bias;

    let d = (extent.min - extent.max).abs();
    if !d.is_finite() || d == 0.0 {
        return if extent.min.is_finite() { vec![extent.min] } else { Vec::new() };
    }
    let mut c = d / target;
    if d.log10() < -2.0 {
        c = (d * shrink_sml) / min_n;
    }

    let base = 10f64.powf(c.log10().floor());
    let base_places = if base < 1.0 && base != 0.0 {
        base.log10().round().abs() as usize
    } else {
        0
    };

    let mut unit = base;
    if (2.0 * base) - c < high_u_bias * (c - unit) {
        unit = 2.0 * base;
        if (5.0 * base) - c < u5_bias * (c - unit) {
            unit = 5.0 * base;
            if (10.0 * base) - c < high_u_bias * (c - unit) {
                unit = 10.0 * base;
            }
        }
    }

    let mut ticks = Vec::new();
    let mut i = round_places((extent.min / unit).floor() * unit, base_places);
    while i < extent.max {
        ticks.push(i);
        i += unit;
        if base_places > 0 {
            i = round_places(i, base_places);
        }
    }
    ticks.push(i);

    if matches!(clip, TickClip::Low | TickClip::Both) && ticks.first().is_some_and(|&t| t < extent.min) {
        ticks.remove(0);
    }
    if matches!(clip, TickClip::High | TickClip::Both) && ticks.last().is_some_and(|&t| t > extent.max) {
        ticks.pop();
    }
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_ticks_both_clip() {
        let ticks = pretty_ticks(AxisRange::new(0.0, 10.0), TickClip::Both, 5);
        assert_eq!(ticks, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_pretty_ticks_fractional() {
        let ticks = pretty_ticks(AxisRange::new(0.05, 0.95), TickClip::Both, 5);
        assert_eq!(ticks, vec![0.2, 0.4, 0.6, 0.8]);
    }

    #[test]
    fn test_scale_invert() {
        let s = ChartScale::new_linear((100.0, 200.0), (0.0, 500.0));
        assert_eq!(s.map(150.0), 250.0);
        assert_eq!(s.invert(500.0), 200.0);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.25), "0.25");
    }
}
