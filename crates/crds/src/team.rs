//! Team CRD
//!
//! Declares a team: a dedicated namespace, the identity-provider group that
//! owns it, and additional grants of existing ClusterRoles to that group in
//! other namespaces.

use crate::references::RoleBindingReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[kube(
    group = "org.ethzero.cloud",
    version = "v1alpha1",
    kind = "Team",
    namespaced,
    status = "TeamStatus",
    shortname = "team",
    printcolumn = r#"{"name":"Group","type":"string","jsonPath":".spec.groupName"}"#,
    printcolumn = r#"{"name":"Role","type":"string","jsonPath":".spec.roleName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    /// Name of the Role for this Team object
    #[schemars(length(min = 1, max = 15))]
    pub role_name: String,

    /// Name of the Group for the RoleBinding
    #[schemars(length(min = 1, max = 15))]
    pub group_name: String,

    /// Additional grants of existing ClusterRoles to the team's group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(length(max = 500))]
    pub role_bindings: Vec<AdditionalRoleBinding>,
}

/// Grant of an existing ClusterRole to the team's group in another namespace.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalRoleBinding {
    /// ClusterRole to bind
    pub role_name: String,

    /// Namespace the RoleBinding is created in
    pub name_space: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatus {
    /// RoleBindings applied for this team, in application order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_role_bindings: Vec<RoleBindingReference>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::{CustomResourceExt, Resource};

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: TeamSpec = serde_json::from_value(serde_json::json!({
            "roleName": "edit",
            "groupName": "ad-beta",
            "roleBindings": [
                { "roleName": "viewer", "nameSpace": "shared" }
            ]
        }))
        .unwrap();

        assert_eq!(spec.role_name, "edit");
        assert_eq!(spec.group_name, "ad-beta");
        assert_eq!(
            spec.role_bindings,
            vec![AdditionalRoleBinding {
                role_name: "viewer".to_string(),
                name_space: "shared".to_string(),
            }]
        );
    }

    #[test]
    fn test_role_bindings_default_to_empty() {
        let spec: TeamSpec = serde_json::from_value(serde_json::json!({
            "roleName": "edit",
            "groupName": "ad-alpha"
        }))
        .unwrap();
        assert!(spec.role_bindings.is_empty());

        // Empty lists are omitted again on the way out
        let value = serde_json::to_value(&spec).unwrap();
        assert!(value.get("roleBindings").is_none());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = Team::crd();
        assert_eq!(crd.spec.group, "org.ethzero.cloud");
        assert_eq!(crd.spec.names.kind, "Team");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(Team::api_version(&()), "org.ethzero.cloud/v1alpha1");
    }

    #[test]
    fn test_crd_schema_carries_length_limits() {
        let crd = serde_json::to_value(Team::crd()).unwrap();
        let spec = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]["properties"];

        assert_eq!(spec["roleName"]["minLength"], 1);
        assert_eq!(spec["roleName"]["maxLength"], 15);
        assert_eq!(spec["groupName"]["maxLength"], 15);
        assert_eq!(spec["roleBindings"]["maxItems"], 500);
    }
}
