//! Keys used to address objects in the cluster store

use std::fmt;

/// Namespace/name identity of a namespaced object.
///
/// This is the identity delivered by the trigger source for each reconcile
/// request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build a key from object metadata, defaulting the namespace to `default`
    pub fn from_meta(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> Option<Self> {
        let name = meta.name.as_ref()?;
        let namespace = meta.namespace.as_deref().unwrap_or("default");
        Some(Self::new(namespace, name.clone()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_from_meta() {
        let meta = ObjectMeta {
            name: Some("alpha".to_string()),
            namespace: Some("teams".to_string()),
            ..Default::default()
        };
        assert_eq!(ObjectKey::from_meta(&meta), Some(ObjectKey::new("teams", "alpha")));

        let no_namespace = ObjectMeta {
            name: Some("alpha".to_string()),
            ..Default::default()
        };
        assert_eq!(ObjectKey::from_meta(&no_namespace).unwrap().to_string(), "default/alpha");

        assert_eq!(ObjectKey::from_meta(&ObjectMeta::default()), None);
    }
}
