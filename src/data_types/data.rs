use serde_json::{Map, Value};

/// One fetched data element, keyed by `namespace:field`.
pub type Record = Map<String, Value>;

/// Visual status flags a data layer tracks per element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementStatus {
    Highlighted,
    Selected,
    Faded,
    Hidden,
}

impl ElementStatus {
    pub const ALL: [ElementStatus; 4] = [
        ElementStatus::Highlighted,
        ElementStatus::Selected,
        ElementStatus::Faded,
        ElementStatus::Hidden,
    ];

    /// Adjective form, used for CSS classes and event payloads.
    pub fn adjective(self) -> &'static str {
        match self {
            ElementStatus::Highlighted => "highlighted",
            ElementStatus::Selected => "selected",
            ElementStatus::Faded => "faded",
            ElementStatus::Hidden => "hidden",
        }
    }

    /// Maps the verb used in layouts (`highlight`, `select`, ...) to a status.
    pub fn from_verb(verb: &str) -> Option<Self> {
        match verb {
            "highlight" => Some(ElementStatus::Highlighted),
            "select" => Some(ElementStatus::Selected),
            "fade" => Some(ElementStatus::Faded),
            "hide" => Some(ElementStatus::Hidden),
            _ => None,
        }
    }
}
