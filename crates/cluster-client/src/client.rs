//! Kubernetes-backed cluster client
//!
//! Implements [`ClusterClientTrait`] on top of `kube::Api`. Every call maps
//! `kube::Error` into [`ClusterError`] so callers can distinguish NotFound and
//! AlreadyExists from transient failures.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::models::ObjectKey;
use crds::{Team, TeamStatus};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// Cluster client backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Wrap an existing Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a client from the ambient kubeconfig or in-cluster config
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Get the underlying Kubernetes client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn teams(&self, namespace: &str) -> Api<Team> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn role_bindings(&self, namespace: &str) -> Api<RoleBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Namespace and name a RoleBinding will be written under
fn role_binding_target(role_binding: &RoleBinding) -> Result<(&str, &str), ClusterError> {
    let namespace = role_binding.metadata.namespace.as_deref()
        .ok_or_else(|| ClusterError::InvalidObject("RoleBinding missing namespace".to_string()))?;
    let name = role_binding.metadata.name.as_deref()
        .ok_or_else(|| ClusterError::InvalidObject("RoleBinding missing name".to_string()))?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_team(&self, key: &ObjectKey) -> Result<Team, ClusterError> {
        debug!("Fetching Team {}", key);
        Ok(self.teams(&key.namespace).get(&key.name).await?)
    }

    async fn list_teams(&self, namespace: Option<&str>) -> Result<Vec<Team>, ClusterError> {
        let api: Api<Team> = match namespace {
            Some(ns) => self.teams(ns),
            None => Api::all(self.client.clone()),
        };
        let teams = api.list(&ListParams::default()).await?;
        Ok(teams.items)
    }

    async fn patch_team_status(&self, key: &ObjectKey, status: &TeamStatus) -> Result<(), ClusterError> {
        // Spelled out so an empty list clears the field under merge-patch semantics
        let status_patch = serde_json::json!({
            "status": {
                "activeRoleBindings": serde_json::to_value(&status.active_role_bindings)?,
            }
        });
        debug!("Patching Team {} status", key);
        self.teams(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await?;
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        Ok(self.namespaces().get(name).await?)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        if namespace.metadata.name.is_none() {
            return Err(ClusterError::InvalidObject("Namespace missing name".to_string()));
        }
        Ok(self.namespaces().create(&PostParams::default(), namespace).await?)
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<RoleBinding, ClusterError> {
        Ok(self.role_bindings(namespace).get(name).await?)
    }

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        let (namespace, _) = role_binding_target(role_binding)?;
        Ok(self.role_bindings(namespace).create(&PostParams::default(), role_binding).await?)
    }

    async fn replace_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        let (namespace, name) = role_binding_target(role_binding)?;
        Ok(self.role_bindings(namespace)
            .replace(name, &PostParams::default(), role_binding)
            .await?)
    }
}
