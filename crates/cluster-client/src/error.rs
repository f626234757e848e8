//! Cluster accessor errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster object store
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create collided with an existing object (HTTP 409, reason AlreadyExists)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency conflict (HTTP 409, any other reason)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The object handed to the accessor is missing required metadata
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Store temporarily unavailable
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Any other Kubernetes client error (connectivity, throttling, 5xx)
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// JSON serialization error while building a patch
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// True when the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// True when a create collided with an existing object
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClusterError::AlreadyExists(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(response) if response.code == 404 => {
                ClusterError::NotFound(response.message.clone())
            }
            kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
                ClusterError::AlreadyExists(response.message.clone())
            }
            kube::Error::Api(response) if response.code == 409 => {
                ClusterError::Conflict(response.message.clone())
            }
            _ => ClusterError::Kube(err),
        }
    }
}
