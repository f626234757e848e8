//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of [`ClusterClientTrait`]
//! that can be used in unit tests without a running API server. It mirrors
//! the API server semantics the reconciler relies on (NotFound on missing
//! objects, AlreadyExists on create collisions, RoleBindings require their
//! namespace to exist), records every call, and can be told to fail specific
//! operations.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::models::ObjectKey;
use crds::{Team, TeamStatus};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Accessor operation, used for call recording and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetTeam,
    ListTeams,
    PatchTeamStatus,
    GetNamespace,
    CreateNamespace,
    GetRoleBinding,
    CreateRoleBinding,
    ReplaceRoleBinding,
}

impl Operation {
    /// True for operations that mutate the store
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Operation::PatchTeamStatus
                | Operation::CreateNamespace
                | Operation::CreateRoleBinding
                | Operation::ReplaceRoleBinding
        )
    }
}

/// A recorded accessor call. `target` is `namespace/name` for namespaced
/// objects and `name` for Namespaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterCall {
    pub operation: Operation,
    pub target: String,
}

/// Failure to inject for a given operation and target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    NotFound,
    AlreadyExists,
    Conflict,
    Unavailable,
}

impl Fault {
    fn to_error(&self, operation: Operation, target: &str) -> ClusterError {
        let detail = format!("injected {:?} failure for {}", operation, target);
        match self {
            Fault::NotFound => ClusterError::NotFound(detail),
            Fault::AlreadyExists => ClusterError::AlreadyExists(detail),
            Fault::Conflict => ClusterError::Conflict(detail),
            Fault::Unavailable => ClusterError::Unavailable(detail),
        }
    }
}

#[derive(Default)]
struct MockState {
    teams: BTreeMap<ObjectKey, Team>,
    namespaces: BTreeMap<String, Namespace>,
    role_bindings: BTreeMap<(String, String), RoleBinding>,
    faults: HashMap<(Operation, String), Fault>,
    calls: Vec<ClusterCall>,
    next_resource_version: u64,
}

impl MockState {
    fn bump_resource_version(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }
}

/// Mock ClusterClient for testing
///
/// Cloning shares the underlying store, so a test can keep a handle for
/// assertions while the reconciler owns another.
#[derive(Clone, Default)]
pub struct MockClusterClient {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Team to the mock store (for test setup)
    pub fn add_team(&self, team: Team) {
        if let Some(key) = ObjectKey::from_meta(&team.metadata) {
            self.state.lock().unwrap().teams.insert(key, team);
        }
    }

    /// Remove a Team from the mock store
    pub fn remove_team(&self, key: &ObjectKey) {
        self.state.lock().unwrap().teams.remove(key);
    }

    /// Add a Namespace to the mock store (for test setup)
    pub fn add_namespace(&self, namespace: Namespace) {
        if let Some(name) = namespace.metadata.name.clone() {
            self.state.lock().unwrap().namespaces.insert(name, namespace);
        }
    }

    /// Add a RoleBinding to the mock store (for test setup)
    pub fn add_role_binding(&self, role_binding: RoleBinding) {
        let namespace = role_binding.metadata.namespace.clone().unwrap_or_default();
        let name = role_binding.metadata.name.clone().unwrap_or_default();
        self.state.lock().unwrap().role_bindings.insert((namespace, name), role_binding);
    }

    /// Make every call of `operation` against `target` fail with `fault`
    /// until [`MockClusterClient::clear_faults`] is called.
    pub fn inject_fault(&self, operation: Operation, target: impl Into<String>, fault: Fault) {
        self.state.lock().unwrap().faults.insert((operation, target.into()), fault);
    }

    /// Remove all injected faults
    pub fn clear_faults(&self) {
        self.state.lock().unwrap().faults.clear();
    }

    /// All calls issued so far, in order
    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Targets of all calls of one operation, in order
    pub fn calls_for(&self, operation: Operation) -> Vec<String> {
        self.state.lock().unwrap().calls.iter()
            .filter(|call| call.operation == operation)
            .map(|call| call.target.clone())
            .collect()
    }

    /// Number of mutating calls issued so far
    pub fn mutation_count(&self) -> usize {
        self.state.lock().unwrap().calls.iter()
            .filter(|call| call.operation.is_mutation())
            .count()
    }

    /// Forget recorded calls (store contents are kept)
    pub fn reset_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Current Team from the store
    pub fn team(&self, key: &ObjectKey) -> Option<Team> {
        self.state.lock().unwrap().teams.get(key).cloned()
    }

    /// Current Namespace from the store
    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.lock().unwrap().namespaces.get(name).cloned()
    }

    /// Current RoleBinding from the store
    pub fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.state.lock().unwrap().role_bindings
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of all stored RoleBindings as `namespace/name`
    pub fn role_binding_names(&self) -> Vec<String> {
        self.state.lock().unwrap().role_bindings.keys()
            .map(|(namespace, name)| format!("{}/{}", namespace, name))
            .collect()
    }

    /// Record the call and return the injected fault for it, if any
    fn begin(&self, state: &mut MockState, operation: Operation, target: &str) -> Result<(), ClusterError> {
        state.calls.push(ClusterCall {
            operation,
            target: target.to_string(),
        });
        match state.faults.get(&(operation, target.to_string())) {
            Some(fault) => Err(fault.to_error(operation, target)),
            None => Ok(()),
        }
    }
}

fn role_binding_key(role_binding: &RoleBinding) -> Result<(String, String), ClusterError> {
    let namespace = role_binding.metadata.namespace.clone()
        .ok_or_else(|| ClusterError::InvalidObject("RoleBinding missing namespace".to_string()))?;
    let name = role_binding.metadata.name.clone()
        .ok_or_else(|| ClusterError::InvalidObject("RoleBinding missing name".to_string()))?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_team(&self, key: &ObjectKey) -> Result<Team, ClusterError> {
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::GetTeam, &key.to_string())?;
        state.teams.get(key).cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("teams \"{}\" not found", key.name)))
    }

    async fn list_teams(&self, namespace: Option<&str>) -> Result<Vec<Team>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::ListTeams, namespace.unwrap_or(""))?;
        Ok(state.teams.iter()
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, team)| team.clone())
            .collect())
    }

    async fn patch_team_status(&self, key: &ObjectKey, status: &TeamStatus) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::PatchTeamStatus, &key.to_string())?;
        let resource_version = state.bump_resource_version();
        let team = state.teams.get_mut(key)
            .ok_or_else(|| ClusterError::NotFound(format!("teams \"{}\" not found", key.name)))?;
        team.status = Some(status.clone());
        team.metadata.resource_version = Some(resource_version);
        Ok(())
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace, ClusterError> {
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::GetNamespace, name)?;
        state.namespaces.get(name).cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("namespaces \"{}\" not found", name)))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace, ClusterError> {
        let name = namespace.metadata.name.clone()
            .ok_or_else(|| ClusterError::InvalidObject("Namespace missing name".to_string()))?;
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::CreateNamespace, &name)?;
        if state.namespaces.contains_key(&name) {
            return Err(ClusterError::AlreadyExists(format!("namespaces \"{}\" already exists", name)));
        }
        let mut created = namespace.clone();
        created.metadata.resource_version = Some(state.bump_resource_version());
        state.namespaces.insert(name, created.clone());
        Ok(created)
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<RoleBinding, ClusterError> {
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::GetRoleBinding, &format!("{}/{}", namespace, name))?;
        state.role_bindings.get(&(namespace.to_string(), name.to_string())).cloned()
            .ok_or_else(|| ClusterError::NotFound(format!(
                "rolebindings.rbac.authorization.k8s.io \"{}\" not found", name
            )))
    }

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        let key = role_binding_key(role_binding)?;
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::CreateRoleBinding, &format!("{}/{}", key.0, key.1))?;
        if !state.namespaces.contains_key(&key.0) {
            return Err(ClusterError::NotFound(format!("namespaces \"{}\" not found", key.0)));
        }
        if state.role_bindings.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(format!(
                "rolebindings.rbac.authorization.k8s.io \"{}\" already exists", key.1
            )));
        }
        let mut created = role_binding.clone();
        created.metadata.resource_version = Some(state.bump_resource_version());
        state.role_bindings.insert(key, created.clone());
        Ok(created)
    }

    async fn replace_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding, ClusterError> {
        let key = role_binding_key(role_binding)?;
        let mut state = self.state.lock().unwrap();
        self.begin(&mut state, Operation::ReplaceRoleBinding, &format!("{}/{}", key.0, key.1))?;
        let current_version = match state.role_bindings.get(&key) {
            Some(existing) => existing.metadata.resource_version.clone(),
            None => {
                return Err(ClusterError::NotFound(format!(
                    "rolebindings.rbac.authorization.k8s.io \"{}\" not found", key.1
                )));
            }
        };
        if role_binding.metadata.resource_version.is_some()
            && role_binding.metadata.resource_version != current_version
        {
            return Err(ClusterError::Conflict(format!(
                "the object has been modified; please apply your changes to the latest version: {}",
                key.1
            )));
        }
        let mut replaced = role_binding.clone();
        replaced.metadata.resource_version = Some(state.bump_resource_version());
        state.role_bindings.insert(key, replaced.clone());
        Ok(replaced)
    }
}
