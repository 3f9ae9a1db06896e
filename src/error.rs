//! Error types for defect detection.

use thiserror::Error;

/// Errors that can occur during a detection run.
///
/// Cancellation is not an error: a cancelled run returns a partial
/// [`DetectionReport`](crate::DetectionReport) instead.
#[derive(Debug, Error)]
pub enum DetectError {
    /// A configuration value is invalid. Rejected before any scan starts.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// A layer bitmap could not be decoded.
    ///
    /// Fatal for the whole run: the air-connectivity sweep cannot skip a
    /// layer without breaking the continuity of the air map.
    #[error("Failed to decode layer {layer_index}: {message}")]
    LayerDecode {
        /// Index of the layer that failed to decode.
        layer_index: u32,
        /// Description of the decode failure.
        message: String,
    },

    /// A layer index outside the stack was requested.
    #[error("Layer index {layer_index} out of range (layer count {layer_count})")]
    LayerOutOfRange {
        /// The requested index.
        layer_index: u32,
        /// Number of layers in the stack.
        layer_count: u32,
    },
}

impl DetectError {
    /// Shorthand for an [`DetectError::InvalidConfig`] with the given message.
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type for detection operations.
pub type DetectResult<T> = std::result::Result<T, DetectError>;
