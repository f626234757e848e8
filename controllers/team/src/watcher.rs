//! Kubernetes resource watchers.
//!
//! This module watches Teams and the objects derived from them and triggers
//! reconciliation using `kube_runtime::Controller`.
//!
//! The Controller relists and reconnects with backoff when a watch drops.
//! Changes to a derived Namespace or RoleBinding trigger the owning Team,
//! found through the labels stamped on the object, so drift is corrected
//! without waiting for the Team itself to change.

use crate::desired::{managed_selector, owning_team};
use crate::error::ControllerError;
use crate::trigger::{self, TriggerContext};
use crds::Team;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Api;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, controller::Config as RuntimeConfig, watcher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Map a derived object to the Team that owns it.
///
/// Owners outside `watch_namespace` are dropped so a namespace-scoped
/// controller never reconciles Teams it does not watch.
pub fn owner_ref(meta: &ObjectMeta, watch_namespace: Option<&str>) -> Option<ObjectRef<Team>> {
    let key = owning_team(meta)?;
    if watch_namespace.is_some_and(|ns| ns != key.namespace) {
        debug!("Ignoring object owned by Team {} outside the watched namespace", key);
        return None;
    }
    Some(ObjectRef::new(&key.name).within(&key.namespace))
}

/// Watches Teams and their derived objects.
pub struct Watcher {
    context: Arc<TriggerContext>,
    team_api: Api<Team>,
    namespace_api: Api<Namespace>,
    role_binding_api: Api<RoleBinding>,
    watch_namespace: Option<String>,
    concurrency: u16,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("watch_namespace", &self.watch_namespace)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        context: Arc<TriggerContext>,
        team_api: Api<Team>,
        namespace_api: Api<Namespace>,
        role_binding_api: Api<RoleBinding>,
        watch_namespace: Option<String>,
        concurrency: u16,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            context,
            team_api,
            namespace_api,
            role_binding_api,
            watch_namespace,
            concurrency,
            shutdown,
        }
    }

    /// Watches Teams, Namespaces and RoleBindings until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Starting Team watcher");

        let selector = managed_selector();
        let namespace_scope = self.watch_namespace.clone();
        let role_binding_scope = self.watch_namespace.clone();

        let controller_config = RuntimeConfig::default().concurrency(self.concurrency);

        let results = Controller::new(self.team_api, watcher::Config::default())
            .watches(
                self.namespace_api,
                watcher::Config::default().labels(&selector),
                move |namespace: Namespace| owner_ref(&namespace.metadata, namespace_scope.as_deref()),
            )
            .watches(
                self.role_binding_api,
                watcher::Config::default().labels(&selector),
                move |role_binding: RoleBinding| owner_ref(&role_binding.metadata, role_binding_scope.as_deref()),
            )
            .with_config(controller_config)
            .run(trigger::reconcile, trigger::error_policy, self.context)
            .for_each(|res| async move {
                match res {
                    Ok((team, _)) => debug!("Reconciled Team {}", team),
                    Err(e) => warn!("Team controller error: {}", e),
                }
            });

        tokio::select! {
            () = self.shutdown.cancelled() => {
                info!("Team watcher stopped");
                Ok(())
            }
            () = results => Err(ControllerError::Watch("Team controller stream ended".to_string())),
        }
    }
}
