//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the cluster
//! client, reconciler, dispatcher, and watcher together and supervises the
//! watcher task until shutdown.

use crate::config::ControllerConfig;
use crate::error::{ControllerError, TargetKind, Verb};
use crate::reconciler::Reconciler;
use crate::trigger::{Dispatcher, TriggerContext};
use crate::watcher::Watcher;
use cluster_client::{ClusterClientTrait, KubeClusterClient};
use crds::Team;
use kube::Api;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Main controller for Team resources.
#[derive(Debug)]
pub struct Controller {
    watcher: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Team Controller");

        let cluster_client = KubeClusterClient::try_default().await
            .map_err(ControllerError::ClientInit)?;
        let kube_client = cluster_client.kube_client().clone();

        let team_api: Api<Team> = match config.watch_namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };
        // Cluster-scoped, and RoleBindings land in each team's own namespace;
        // owners outside the watched namespace are dropped by the watcher
        let namespace_api = Api::all(kube_client.clone());
        let role_binding_api = Api::all(kube_client);

        // The Team watch's initial list queues every existing Team; listing
        // up front surfaces a missing CRD or RBAC grant at startup
        info!("Checking access to Teams...");
        match startup_check(&cluster_client, config.watch_namespace.as_deref()).await {
            Ok(count) => info!("Found {} existing Team(s) to reconcile", count),
            Err(e) => warn!("Startup check failed (will continue): {}", e),
        }

        let shutdown = CancellationToken::new();
        let reconciler = Reconciler::new(Box::new(cluster_client))
            .with_resync_interval(config.resync_interval);
        let context = Arc::new(TriggerContext::new(
            Dispatcher::for_reconciler(Arc::new(reconciler)),
            config.backoff_min,
            config.backoff_max,
            shutdown.clone(),
        ));

        let watcher_instance = Watcher::new(
            context,
            team_api,
            namespace_api,
            role_binding_api,
            config.watch_namespace.clone(),
            config.concurrency,
            shutdown.clone(),
        );
        let watcher = tokio::spawn(watcher_instance.run());

        Ok(Self { watcher, shutdown })
    }

    /// Runs the controller until shutdown.
    ///
    /// Returns when Ctrl-C is received or when the watcher exits; it is
    /// expected to run forever, so an early exit is reported as an error.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Team Controller running");

        let result = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                Ok(())
            }
            result = &mut self.watcher => task_result("Team watcher", result),
        };

        // Aborts in-flight accessor calls of every running pass
        self.shutdown.cancel();
        result
    }
}

fn task_result(
    task: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{} panicked: {}", task, e)))?
        .map_err(|e| ControllerError::Watch(format!("{} error: {}", task, e)))?;
    Err(ControllerError::Watch(format!("{} exited unexpectedly", task)))
}

/// Count the Teams visible to the controller
async fn startup_check(
    client: &dyn ClusterClientTrait,
    namespace: Option<&str>,
) -> Result<usize, ControllerError> {
    let teams = client.list_teams(namespace).await.map_err(|e| {
        ControllerError::cluster(Verb::List, TargetKind::Team, namespace.unwrap_or("all namespaces"), e)
    })?;
    Ok(teams.len())
}
