use thiserror::Error;

/// Configuration and API-misuse failures. These are raised synchronously to the
/// caller; data errors travel as `eyre::Report` and are contained by the panel.
#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("{0} layouts must specify \"id\"")]
    MissingId(&'static str),

    #[error("Cannot create {kind} with id [{id}]; {kind} with that id already exists")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Panel not found: {0}")]
    UnknownPanel(String),

    #[error("Data layer not found: {0}")]
    UnknownDataLayer(String),

    #[error("Invalid data layer type: {0}")]
    InvalidDataLayerType(String),

    #[error("Invalid axis identifier: {0}")]
    InvalidAxis(String),

    #[error("Item not found in {registry} registry: {name}")]
    ItemNotFound { registry: &'static str, name: String },

    #[error("Item {0} is already defined")]
    AlreadyDefined(String),

    #[error("Unknown transformation: {0}")]
    UnknownTransform(String),

    #[error("Invalid scale function parameters: {0}")]
    InvalidParameters(String),

    #[error("Invalid event name: {0:?}")]
    InvalidEventName(String),

    #[error("Unable to remove event hook, invalid event: {0}")]
    UnknownEvent(String),

    #[error("The specified event listener is not registered and therefore cannot be removed")]
    ListenerNotRegistered,

    #[error("Data source namespace names can only contain alphanumeric characters or underscores. Invalid name: {0}")]
    InvalidNamespace(String),

    #[error("Layout serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlotError>;
