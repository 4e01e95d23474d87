/// Unit used to display a genomic position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionUnit {
    Bases,  // 950
    Kb,     // 12.35 Kb
    Mb,     // 23.42 Mb
}

impl PositionUnit {
    pub fn exponent(self) -> i32 {
        match self {
            PositionUnit::Bases => 0,
            PositionUnit::Kb => 3,
            PositionUnit::Mb => 6,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            PositionUnit::Bases => "b",
            PositionUnit::Kb => "Kb",
            PositionUnit::Mb => "Mb",
        }
    }

    fn from_exponent(exp: i32) -> Self {
        match exp {
            e if e >= 6 => PositionUnit::Mb,
            e if e >= 3 => PositionUnit::Kb,
            _ => PositionUnit::Bases,
        }
    }
}

/// Picks the unit from the magnitude of a value (used when no exponent is forced).
pub fn determine_unit(position: f64) -> PositionUnit {
    if position.abs() < 1.0 {
        return PositionUnit::Bases;
    }
    let magnitude = position.abs().log10().floor() as i32;
    PositionUnit::from_exponent(magnitude - magnitude.rem_euclid(3))
}

/// Formats a position in the given unit. With `exponent = Some(6)` the value
/// `23423456` becomes `"23.42"`; `with_suffix` appends the unit (`"23.42 Mb"`).
pub fn format_position(position: f64, exponent: Option<i32>, with_suffix: bool) -> String {
    let unit = match exponent {
        Some(exp) => PositionUnit::from_exponent(exp),
        None => determine_unit(position),
    };
    let scaled = position / 10f64.powi(unit.exponent());
    // At least two decimals in Kb/Mb; more when the value is small for its unit.
    let min_places = unit.exponent().clamp(0, 2);
    let places = if position.abs() >= 1.0 {
        let magnitude = position.abs().log10().floor() as i32;
        (unit.exponent() - magnitude).max(min_places)
    } else {
        min_places
    }
    .clamp(0, 12) as usize;
    let text = format!("{:.*}", places, scaled);
    if with_suffix {
        format!("{} {}", text, unit.suffix())
    } else {
        text
    }
}

/// Formats a region width (`end - start`) for display, e.g. in the region scale widget.
pub fn format_region_width(width: f64) -> String {
    format_position(width, None, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_megabase_positions() {
        assert_eq!(format_position(23_423_456.0, Some(6), false), "23.42");
        assert_eq!(format_position(23_423_456.0, Some(6), true), "23.42 Mb");
        assert_eq!(format_position(123_423_456.0, None, true), "123.42 Mb");
        assert_eq!(format_position(2_000.0, Some(6), false), "0.002");
    }

    #[test]
    fn test_unit_from_magnitude() {
        assert_eq!(determine_unit(950.0), PositionUnit::Bases);
        assert_eq!(determine_unit(12_345.0), PositionUnit::Kb);
        assert_eq!(format_region_width(12_500.0), "12.50 Kb");
        assert_eq!(format_region_width(500.0), "500 b");
    }
}
