/// Failures shared by every engine crate.
///
/// Missing data (null knot values, an empty pick) is not an error; those paths
/// return `Option`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{operation} is not supported for {layer} layers")]
    Unsupported {
        operation: String,
        layer: &'static str,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("gpu resource error: {0}")]
    Resource(String),
    #[error("knot {0} not found while recovering function values")]
    UnknownKnot(String),
    #[error("layer {0} not found")]
    UnknownLayer(String),
}

impl EngineError {
    pub fn unsupported(operation: impl Into<String>, layer: &'static str) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            layer,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
