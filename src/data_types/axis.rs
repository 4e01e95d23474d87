use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::PlotError;

/// Panel axes. Layouts name them `x`, `y1` and `y2`; nothing else is valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    X,
    Y1,
    Y2,
}

impl AxisId {
    pub const ALL: [AxisId; 3] = [AxisId::X, AxisId::Y1, AxisId::Y2];

    pub fn as_str(self) -> &'static str {
        match self {
            AxisId::X => "x",
            AxisId::Y1 => "y1",
            AxisId::Y2 => "y2",
        }
    }

    /// Position in [`AxisId::ALL`], for per-axis arrays.
    pub fn index(self) -> usize {
        match self {
            AxisId::X => 0,
            AxisId::Y1 => 1,
            AxisId::Y2 => 2,
        }
    }

    pub fn dim(self) -> AxisDim {
        match self {
            AxisId::X => AxisDim::X,
            AxisId::Y1 | AxisId::Y2 => AxisDim::Y,
        }
    }

    /// The data-layer `y_axis.axis` number that binds to this axis.
    pub fn y_number(self) -> Option<u8> {
        match self {
            AxisId::X => None,
            AxisId::Y1 => Some(1),
            AxisId::Y2 => Some(2),
        }
    }

    pub fn from_y_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(AxisId::Y1),
            2 => Some(AxisId::Y2),
            _ => None,
        }
    }

    pub fn edge(self) -> AxisEdge {
        match self {
            AxisId::X => AxisEdge::Bottom,
            AxisId::Y1 => AxisEdge::Left,
            AxisId::Y2 => AxisEdge::Right,
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AxisId {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x" => Ok(AxisId::X),
            "y1" => Ok(AxisId::Y1),
            "y2" => Ok(AxisId::Y2),
            other => Err(PlotError::InvalidAxis(other.to_string())),
        }
    }
}

/// Data-layer side of an axis: layers bind one x field and one y field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AxisDim {
    X,
    Y,
}

impl AxisDim {
    pub fn layout_key(self) -> &'static str {
        match self {
            AxisDim::X => "x_axis",
            AxisDim::Y => "y_axis",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AxisEdge {
    Left,
    Right,
    Top,
    Bottom,
}

/// `[min, max]` along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl From<[f64; 2]> for AxisRange {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

impl From<AxisRange> for [f64; 2] {
    fn from(r: AxisRange) -> Self {
        [r.min, r.max]
    }
}

impl AxisRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn union(self, other: AxisRange) -> AxisRange {
        AxisRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Extent of a set of values, ignoring non-finite entries.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<AxisRange>, v| {
                Some(match acc {
                    Some(r) => r.union(AxisRange::new(v, v)),
                    None => AxisRange::new(v, v),
                })
            })
    }
}

/// How numeric ticks are printed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickFormat {
    #[default]
    Numeric,
    /// Genomic positions in Mb (`23423456` → `23.42`).
    Region,
}

/// A tick carrying its own text and presentation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TickLabel {
    #[serde(alias = "x", alias = "y")]
    pub position: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tick {
    Value(f64),
    Label(TickLabel),
}

impl Tick {
    pub fn position(&self) -> f64 {
        match self {
            Tick::Value(v) => *v,
            Tick::Label(l) => l.position,
        }
    }

    /// Parses a layout tick entry: a bare number or a label object.
    pub fn from_value(value: &Value) -> Option<Tick> {
        match value {
            Value::Number(n) => n.as_f64().map(Tick::Value),
            Value::Object(_) => serde_json::from_value(value.clone()).ok().map(Tick::Label),
            _ => None,
        }
    }
}

/// True when every tick is a bare number, so the axis formats them itself.
pub fn all_numeric(ticks: &[Tick]) -> bool {
    ticks.iter().all(|t| matches!(t, Tick::Value(_)))
}
