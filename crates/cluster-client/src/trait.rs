//! ClusterClient trait for mocking
//!
//! This trait abstracts the cluster object store so the reconciler can be
//! exercised against an in-memory implementation in unit tests.

use crate::error::ClusterError;
use crate::models::ObjectKey;
use crds::{Team, TeamStatus};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;

/// Trait for cluster object store operations
///
/// Every call is assumed network-backed and may fail transiently
/// independently of its logical outcome. Creates must never silently succeed
/// on a collision: they return [`ClusterError::AlreadyExists`] instead.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Team operations
    async fn get_team(&self, key: &ObjectKey) -> Result<Team, ClusterError>;
    async fn list_teams(&self, namespace: Option<&str>) -> Result<Vec<Team>, ClusterError>;
    /// Replaces `status.activeRoleBindings` on the Team's status subresource.
    async fn patch_team_status(&self, key: &ObjectKey, status: &TeamStatus) -> Result<(), ClusterError>;

    // Namespace operations
    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError>;
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError>;

    // RoleBinding operations
    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<RoleBinding, ClusterError>;
    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError>;
    /// Full replace. The object must carry the `resourceVersion` it was read at.
    async fn replace_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError>;
}
