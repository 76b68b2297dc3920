//! Provisioning error types

use stackdeck_cloud::CloudError;
use thiserror::Error;

/// Why a chain stopped before (or at) its first mutating call
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("{0} cannot be empty.")]
    EmptyField(&'static str),

    #[error("Please ensure all fields are selected/filled.")]
    MissingSelection,

    #[error("{kind} '{name}' already exists.")]
    Duplicate { kind: &'static str, name: String },

    #[error("Could not find IDs for the selected resources ({}).", .fields.join(", "))]
    Unresolved { fields: Vec<&'static str> },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl ProvisionError {
    /// Raised before any call was made
    pub fn is_validation(&self) -> bool {
        !matches!(self, ProvisionError::Cloud(_))
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
