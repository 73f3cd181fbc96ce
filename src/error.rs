//! Error types for the virt-controller

use thiserror::Error;

use crate::quantity::QuantityError;

/// Main error type for virt-controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for service configuration
    #[error("validation error: {0}")]
    Validation(String),

    /// A required VirtualMachine field is unset
    #[error("virtual machine is missing {0}")]
    MissingField(String),

    /// A resource quantity could not be parsed
    #[error("invalid quantity for {field} '{value}': {source}")]
    InvalidQuantity {
        /// Field path the quantity came from (e.g. `requests.memory`)
        field: String,
        /// The raw quantity string
        value: String,
        /// Parse failure
        #[source]
        source: QuantityError,
    },

    /// A volume source is structurally invalid
    #[error("invalid volume '{volume}': {reason}")]
    InvalidVolume {
        /// Name of the offending volume
        volume: String,
        /// What is wrong with it
        reason: String,
    },

    /// A cluster config flag holds a value that is not a boolean literal
    #[error("invalid value '{value}' for {key}: expected a boolean")]
    InvalidFlag {
        /// ConfigMap data key
        key: String,
        /// The raw value found
        value: String,
    },

    /// The config cache did not finish its initial sync
    #[error("config cache sync failed: {0}")]
    CacheSync(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a missing-field error naming the field
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a quantity error with the field it was read from
    pub fn invalid_quantity(
        field: impl Into<String>,
        value: impl Into<String>,
        source: QuantityError,
    ) -> Self {
        Self::InvalidQuantity {
            field: field.into(),
            value: value.into(),
            source,
        }
    }

    /// Create a volume error for the named volume
    pub fn invalid_volume(volume: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVolume {
            volume: volume.into(),
            reason: reason.into(),
        }
    }

    /// Create a flag parse error
    pub fn invalid_flag(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidFlag {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a cache sync error with the given message
    pub fn cache_sync(msg: impl Into<String>) -> Self {
        Self::CacheSync(msg.into())
    }

    /// Returns true if the error was caused by the descriptor itself.
    ///
    /// Rendering is deterministic, so retrying the same descriptor yields the
    /// same error. Controllers should surface these instead of requeueing.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_) | Self::InvalidQuantity { .. } | Self::InvalidVolume { .. }
        )
    }
}
