//! Team Controller
//!
//! Reconciles Team CRDs into cluster objects:
//! - a Namespace named after the team
//! - a RoleBinding granting `team-ns-role` to the team's group in it
//! - one RoleBinding per additional grant in `spec.roleBindings`
//!
//! The controller only creates and corrects these objects. Deleting a Team
//! leaves them in place.

mod backoff;
mod config;
mod controller;
mod desired;
mod error;
mod reconcile_helpers;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod trigger;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube's rustls transport needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting Team Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Concurrency: {}", config.concurrency);
    info!("  Backoff: {:?} to {:?}", config.backoff_min, config.backoff_max);
    match config.resync_interval {
        Some(interval) => info!("  Resync: every {:?}", interval),
        None => info!("  Resync: disabled"),
    }

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    info!("Team Controller stopped");
    Ok(())
}
