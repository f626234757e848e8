//! Object references recorded in Team status
//!
//! Follows the Kubernetes `ObjectReference` shape (apiVersion, kind, name,
//! namespace) restricted to the fields the controller writes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API version of the RoleBinding objects the controller manages
pub const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";

/// Reference to a RoleBinding applied on behalf of a Team
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct RoleBindingReference {
    /// API version of the referenced object
    pub api_version: String,

    /// Kind of the referenced object (always "RoleBinding")
    pub kind: String,

    /// Name of the RoleBinding
    pub name: String,

    /// Namespace the RoleBinding lives in
    pub namespace: String,
}

impl RoleBindingReference {
    /// Create a reference to a RoleBinding by namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: RBAC_API_VERSION.to_string(),
            kind: "RoleBinding".to_string(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for RoleBindingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
