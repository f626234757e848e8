//! Desired-state extraction
//!
//! Turns a Team spec into the objects that must exist for it: the team's own
//! Namespace, a default RoleBinding in that namespace, and one RoleBinding per
//! additional grant. Everything here is a pure function of the Team identity
//! and spec, so reconciling the same spec twice always proposes the same
//! targets.

use cluster_client::ObjectKey;
use crds::{RoleBindingReference, TeamSpec};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// ClusterRole bound by every team's default RoleBinding
pub const DEFAULT_CLUSTER_ROLE: &str = "team-ns-role";

/// Prefix of every RoleBinding name the controller derives
pub const ROLE_BINDING_PREFIX: &str = "team-rolebinding-";

/// API group of RoleBinding subjects and role references
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "team-controller";
/// Label carrying the owning Team's name on every derived object
pub const TEAM_LABEL: &str = "org.ethzero.cloud/team";
/// Annotation carrying the owning Team's namespace on every derived object
pub const TEAM_NAMESPACE_ANNOTATION: &str = "org.ethzero.cloud/team-namespace";

/// Label selector matching every object the controller derives
pub fn managed_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)
}

/// Name of the RoleBinding derived from `suffix` (team name or role name)
pub fn role_binding_name(suffix: &str) -> String {
    format!("{}{}", ROLE_BINDING_PREFIX, suffix)
}

/// Map a derived object back to the Team that owns it
pub fn owning_team(meta: &ObjectMeta) -> Option<ObjectKey> {
    let name = meta.labels.as_ref()?.get(TEAM_LABEL)?;
    let namespace = meta.annotations.as_ref()?.get(TEAM_NAMESPACE_ANNOTATION)?;
    Some(ObjectKey::new(namespace.clone(), name.clone()))
}

/// Where a RoleBinding target came from in the Team spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOrigin {
    /// The team's own binding to `team-ns-role`
    Default,
    /// Entry `n` (0-based) of `spec.roleBindings`
    Additional(usize),
}

/// Everything a Team requires to exist in the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub namespace: NamespaceTarget,
    /// Default binding first, then additional bindings in declaration order
    pub role_bindings: Vec<RoleBindingTarget>,
}

impl DesiredState {
    /// Derive the targets for the Team identified by `team`.
    ///
    /// Total for any spec that passed schema validation.
    pub fn extract(team: &ObjectKey, spec: &TeamSpec) -> Self {
        let metadata = TargetMetadata::for_team(team);

        let namespace = NamespaceTarget {
            name: team.name.clone(),
            metadata: metadata.clone(),
        };

        let mut role_bindings = Vec::with_capacity(1 + spec.role_bindings.len());
        role_bindings.push(RoleBindingTarget {
            name: role_binding_name(&team.name),
            namespace: team.name.clone(),
            group: spec.group_name.clone(),
            cluster_role: DEFAULT_CLUSTER_ROLE.to_string(),
            origin: BindingOrigin::Default,
            metadata: metadata.clone(),
        });
        role_bindings.extend(spec.role_bindings.iter().enumerate().map(|(index, binding)| {
            RoleBindingTarget {
                name: role_binding_name(&binding.role_name),
                namespace: binding.name_space.clone(),
                group: spec.group_name.clone(),
                cluster_role: binding.role_name.clone(),
                origin: BindingOrigin::Additional(index),
                metadata: metadata.clone(),
            }
        }));

        Self { namespace, role_bindings }
    }

    /// Status references for every RoleBinding target, in application order
    pub fn active_role_bindings(&self) -> Vec<RoleBindingReference> {
        self.role_bindings.iter().map(RoleBindingTarget::reference).collect()
    }
}

/// Labels and annotations stamped on every derived object
#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetMetadata {
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl TargetMetadata {
    fn for_team(team: &ObjectKey) -> Self {
        let labels = BTreeMap::from([
            (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
            (TEAM_LABEL.to_string(), team.name.clone()),
        ]);
        let annotations = BTreeMap::from([
            (TEAM_NAMESPACE_ANNOTATION.to_string(), team.namespace.clone()),
        ]);
        Self { labels, annotations }
    }

    fn object_meta(&self, name: &str, namespace: Option<&str>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: namespace.map(str::to_string),
            labels: Some(self.labels.clone()),
            annotations: Some(self.annotations.clone()),
            ..Default::default()
        }
    }
}

/// The team's dedicated Namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTarget {
    pub name: String,
    metadata: TargetMetadata,
}

impl NamespaceTarget {
    pub fn to_namespace(&self) -> Namespace {
        Namespace {
            metadata: self.metadata.object_meta(&self.name, None),
            ..Default::default()
        }
    }
}

/// A RoleBinding granting a ClusterRole to the team's group in one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBindingTarget {
    pub name: String,
    pub namespace: String,
    /// Identity-provider group the binding grants access to
    pub group: String,
    /// ClusterRole the binding refers to
    pub cluster_role: String,
    pub origin: BindingOrigin,
    metadata: TargetMetadata,
}

/// How an existing RoleBinding compares to its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingComparison {
    InSync,
    /// Same roleRef, different subjects: can be replaced in place
    SubjectsDiffer,
    /// roleRef is immutable, so the binding cannot be converged by an update
    RoleRefDiffers { actual: String },
}

impl RoleBindingTarget {
    pub fn role_ref(&self) -> RoleRef {
        RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: self.cluster_role.clone(),
        }
    }

    pub fn subjects(&self) -> Vec<Subject> {
        vec![Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "Group".to_string(),
            name: self.group.clone(),
            namespace: None,
        }]
    }

    pub fn to_role_binding(&self) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata.object_meta(&self.name, Some(&self.namespace)),
            role_ref: self.role_ref(),
            subjects: Some(self.subjects()),
        }
    }

    pub fn reference(&self) -> RoleBindingReference {
        RoleBindingReference::new(self.namespace.clone(), self.name.clone())
    }

    /// `namespace/name`, for logs and errors
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn compare(&self, existing: &RoleBinding) -> BindingComparison {
        if existing.role_ref != self.role_ref() {
            return BindingComparison::RoleRefDiffers {
                actual: format!("{}/{}", existing.role_ref.kind, existing.role_ref.name),
            };
        }
        if existing.subjects.as_deref().unwrap_or_default() != self.subjects().as_slice() {
            return BindingComparison::SubjectsDiffer;
        }
        BindingComparison::InSync
    }
}
