use thiserror::Error;

pub type RouteResult<T> = Result<T, RouteError>;

/// Failures that abort a run before (or between) timesteps.
///
/// Numerical degeneracy inside a timestep (dry reaches, zero velocity,
/// negative intermediate storage) is never reported here; the engines clamp
/// locally and keep going.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),

    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),

    #[error("invalid value for `{name}`: {value} ({reason})")]
    InvalidParameter {
        name: String,
        value: f64,
        reason: &'static str,
    },

    #[error("reach {id} flows to reach {downstream} which is not in the network")]
    UnknownDownstream { id: u32, downstream: u32 },

    #[error("reach ids must be contiguous 1..={expected}, found {found}")]
    NonContiguousIds { expected: usize, found: u32 },

    #[error("cycle detected in reach network: layered {resolved} of {total} reaches")]
    TopologyCycle { resolved: usize, total: usize },

    #[error("reach {id} (layer {layer}) drains to reach {downstream} in layer {downstream_layer}")]
    LayerOrder {
        id: u32,
        layer: usize,
        downstream: u32,
        downstream_layer: usize,
    },

    #[error("point source targets reach {0} which is not in the network")]
    UnknownPointSourceTarget(u32),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("input `{key}` has {actual} entries, expected {expected}")]
    InputSizeMismatch {
        key: String,
        expected: usize,
        actual: usize,
    },
}

impl RouteError {
    pub fn is_configuration(&self) -> bool {
        !matches!(self, RouteError::InputSizeMismatch { .. })
    }
}
