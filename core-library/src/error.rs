use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Store error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LibraryError {
    /// Lift a store error, naming the entity when the row was missing.
    pub fn from_store(error: BridgeError, entity_type: &str, id: &str) -> Self {
        match error {
            BridgeError::NotFound { .. } => Self::NotFound {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
            },
            other => Self::Bridge(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. }) || matches!(self, Self::Bridge(error) if error.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
