//! Controller-specific error types.
//!
//! This module defines error types specific to the Team Controller that are
//! not covered by the cluster accessor's errors.

use cluster_client::ClusterError;
use std::fmt;
use thiserror::Error;

/// Kind of object an accessor call was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Team,
    Namespace,
    RoleBinding,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Team => write!(f, "Team"),
            TargetKind::Namespace => write!(f, "Namespace"),
            TargetKind::RoleBinding => write!(f, "RoleBinding"),
        }
    }
}

/// Accessor verb that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Replace,
    PatchStatus,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Get => write!(f, "get"),
            Verb::List => write!(f, "list"),
            Verb::Create => write!(f, "create"),
            Verb::Replace => write!(f, "replace"),
            Verb::PatchStatus => write!(f, "patch status of"),
        }
    }
}

/// Errors that can occur in the Team Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster accessor call failed
    #[error("Failed to {verb} {kind} {target}: {source}")]
    Cluster {
        verb: Verb,
        kind: TargetKind,
        /// `namespace/name` of namespaced objects, `name` otherwise
        target: String,
        #[source]
        source: ClusterError,
    },

    /// A RoleBinding with the derived name exists but refers to another role
    #[error(
        "RoleBinding {target} refers to {actual} but ClusterRole/{expected} is desired; \
         roleRef cannot be changed in place, delete the RoleBinding to let it be recreated"
    )]
    RoleRefConflict {
        target: String,
        expected: String,
        actual: String,
    },

    /// The reconcile invocation was cancelled
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// No reconcile function is registered for a trigger's resource kind
    #[error("No reconciler registered for {0}")]
    NoReconciler(String),

    /// The Kubernetes client could not be created at startup
    #[error("Failed to initialize cluster client: {0}")]
    ClientInit(#[source] ClusterError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    pub fn cluster(verb: Verb, kind: TargetKind, target: impl Into<String>, source: ClusterError) -> Self {
        ControllerError::Cluster {
            verb,
            kind,
            target: target.into(),
            source,
        }
    }

    /// Whether the trigger source should requeue the identity after this error.
    ///
    /// Every accessor failure is retryable, including AlreadyExists collisions
    /// that could not be resolved and roleRef conflicts that need an operator.
    pub fn is_retryable(&self) -> bool {
        match self {
            ControllerError::Cluster { .. }
            | ControllerError::RoleRefConflict { .. }
            | ControllerError::Cancelled
            | ControllerError::Watch(_) => true,
            ControllerError::NoReconciler(_)
            | ControllerError::ClientInit(_)
            | ControllerError::InvalidConfig(_) => false,
        }
    }
}
