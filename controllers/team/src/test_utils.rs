//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::reconciler::{ReconcileContext, Reconciler};
use cluster_client::{ClusterClientTrait, ClusterError, MockClusterClient, ObjectKey};
use crds::{AdditionalRoleBinding, Team, TeamSpec, TeamStatus};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio_util::sync::CancellationToken;

/// Helper to create a TeamSpec from `(roleName, nameSpace)` pairs
pub fn create_test_spec(role_name: &str, group_name: &str, bindings: &[(&str, &str)]) -> TeamSpec {
    TeamSpec {
        role_name: role_name.to_string(),
        group_name: group_name.to_string(),
        role_bindings: bindings.iter()
            .map(|(role, ns)| AdditionalRoleBinding {
                role_name: role.to_string(),
                name_space: ns.to_string(),
            })
            .collect(),
    }
}

/// Helper to create test Team CRD
pub fn create_test_team(
    name: &str,
    namespace: &str,
    group_name: &str,
    bindings: &[(&str, &str)],
) -> Team {
    Team {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: create_test_spec("edit", group_name, bindings),
        status: None,
    }
}

/// Helper to create a bare Namespace, as if made by someone else
pub fn create_test_namespace(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Reconciler backed by a mock store; the returned handle shares that store
pub fn create_test_reconciler() -> (Reconciler, MockClusterClient) {
    let mock = MockClusterClient::new();
    let reconciler = Reconciler::new(Box::new(mock.clone()));
    (reconciler, mock)
}

/// Fresh, uncancelled context for one pass over `namespace/name`
pub fn create_test_context(namespace: &str, name: &str) -> ReconcileContext {
    ReconcileContext::new(ObjectKey::new(namespace, name))
}

/// Where an [`InterruptingClient`] interrupts a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Cancel the token once a Namespace create has succeeded
    AfterNamespaceCreate,
    /// Never answer RoleBinding reads
    StallRoleBindingGet,
}

/// Mock-backed client that interrupts a pass part way through
#[derive(Debug, Clone)]
pub struct InterruptingClient {
    inner: MockClusterClient,
    token: CancellationToken,
    interrupt: Interrupt,
}

impl InterruptingClient {
    pub fn new(inner: MockClusterClient, token: CancellationToken, interrupt: Interrupt) -> Self {
        Self { inner, token, interrupt }
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for InterruptingClient {
    async fn get_team(&self, key: &ObjectKey) -> Result<Team, ClusterError> {
        self.inner.get_team(key).await
    }

    async fn list_teams(&self, namespace: Option<&str>) -> Result<Vec<Team>, ClusterError> {
        self.inner.list_teams(namespace).await
    }

    async fn patch_team_status(&self, key: &ObjectKey, status: &TeamStatus) -> Result<(), ClusterError> {
        self.inner.patch_team_status(key, status).await
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        self.inner.get_namespace(name).await
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        let created = self.inner.create_namespace(namespace).await;
        if self.interrupt == Interrupt::AfterNamespaceCreate {
            self.token.cancel();
        }
        created
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<RoleBinding, ClusterError> {
        if self.interrupt == Interrupt::StallRoleBindingGet {
            std::future::pending::<()>().await;
        }
        self.inner.get_role_binding(namespace, name).await
    }

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        self.inner.create_role_binding(role_binding).await
    }

    async fn replace_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        self.inner.replace_role_binding(role_binding).await
    }
}

/// Reconciler whose client interrupts passes run under the returned context
pub fn create_interrupted_reconciler(
    interrupt: Interrupt,
    namespace: &str,
    name: &str,
) -> (Reconciler, MockClusterClient, ReconcileContext) {
    let mock = MockClusterClient::new();
    let token = CancellationToken::new();
    let client = InterruptingClient::new(mock.clone(), token.clone(), interrupt);
    let ctx = ReconcileContext::with_cancel(ObjectKey::new(namespace, name), token);
    (Reconciler::new(Box::new(client)), mock, ctx)
}
