//! Helper functions for applying derived targets
//!
//! Both helpers follow the same get-before-create pattern so that repeated
//! passes over the same spec converge instead of colliding:
//! 1. Look the target up by identity
//! 2. If it exists and matches, it is already satisfied
//! 3. If it is missing, create it
//! 4. If the create loses a race (AlreadyExists), treat the winner as the
//!    existing object
//!
//! Any other accessor failure is logged with the target and returned so the
//! trigger source requeues the Team.

use crate::desired::{BindingComparison, NamespaceTarget, RoleBindingTarget};
use crate::error::{ControllerError, TargetKind, Verb};
use crate::reconciler::ReconcileContext;
use cluster_client::ClusterClientTrait;
use k8s_openapi::api::rbac::v1::RoleBinding;
use tracing::{debug, error, info, warn};

/// What applying a target did to the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Updated,
    Unchanged,
}

/// Make sure the team's Namespace exists.
///
/// An existing Namespace with the target's name satisfies the target whoever
/// created it.
pub async fn ensure_namespace(
    client: &dyn ClusterClientTrait,
    ctx: &ReconcileContext,
    target: &NamespaceTarget,
) -> Result<Applied, ControllerError> {
    match ctx.call(client.get_namespace(&target.name)).await? {
        Ok(_) => {
            debug!("Namespace {} already exists", target.name);
            return Ok(Applied::Unchanged);
        }
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            error!("Failed to get Namespace {} for Team {}: {}", target.name, ctx.key, e);
            return Err(ControllerError::cluster(Verb::Get, TargetKind::Namespace, &target.name, e));
        }
    }

    match ctx.call(client.create_namespace(&target.to_namespace())).await? {
        Ok(_) => {
            info!("Created Namespace {} for Team {}", target.name, ctx.key);
            Ok(Applied::Created)
        }
        Err(e) if e.is_already_exists() => {
            debug!("Namespace {} was created concurrently, treating as satisfied", target.name);
            Ok(Applied::Unchanged)
        }
        Err(e) => {
            error!("Unable to create Namespace {} for Team {}: {}", target.name, ctx.key, e);
            Err(ControllerError::cluster(Verb::Create, TargetKind::Namespace, &target.name, e))
        }
    }
}

/// Make sure one RoleBinding exists and grants what the target says.
pub async fn ensure_role_binding(
    client: &dyn ClusterClientTrait,
    ctx: &ReconcileContext,
    target: &RoleBindingTarget,
) -> Result<Applied, ControllerError> {
    let target_name = target.display_name();

    match ctx.call(client.get_role_binding(&target.namespace, &target.name)).await? {
        Ok(existing) => return converge_existing(client, ctx, target, existing).await,
        Err(e) if e.is_not_found() => {}
        Err(e) => {
            error!("Failed to get RoleBinding {} for Team {}: {}", target_name, ctx.key, e);
            return Err(ControllerError::cluster(Verb::Get, TargetKind::RoleBinding, target_name, e));
        }
    }

    match ctx.call(client.create_role_binding(&target.to_role_binding())).await? {
        Ok(_) => {
            info!("Created RoleBinding {} ({:?}) for Team {}", target_name, target.origin, ctx.key);
            Ok(Applied::Created)
        }
        Err(e) if e.is_already_exists() => {
            // Lost a race with another writer; whatever won has to match
            debug!("RoleBinding {} was created concurrently, re-reading", target_name);
            match ctx.call(client.get_role_binding(&target.namespace, &target.name)).await? {
                Ok(existing) => converge_existing(client, ctx, target, existing).await,
                Err(e) => {
                    error!("Failed to re-read RoleBinding {} after collision: {}", target_name, e);
                    Err(ControllerError::cluster(Verb::Get, TargetKind::RoleBinding, target_name, e))
                }
            }
        }
        Err(e) => {
            error!("Unable to create RoleBinding {} for Team {}: {}", target_name, ctx.key, e);
            Err(ControllerError::cluster(Verb::Create, TargetKind::RoleBinding, target_name, e))
        }
    }
}

/// Bring an existing RoleBinding in line with its target
async fn converge_existing(
    client: &dyn ClusterClientTrait,
    ctx: &ReconcileContext,
    target: &RoleBindingTarget,
    existing: RoleBinding,
) -> Result<Applied, ControllerError> {
    let target_name = target.display_name();

    match target.compare(&existing) {
        BindingComparison::InSync => {
            debug!("RoleBinding {} already up-to-date", target_name);
            Ok(Applied::Unchanged)
        }
        BindingComparison::SubjectsDiffer => {
            warn!("RoleBinding {} subjects drifted, restoring group {}", target_name, target.group);
            let mut replacement = target.to_role_binding();
            replacement.metadata.resource_version = existing.metadata.resource_version;
            match ctx.call(client.replace_role_binding(&replacement)).await? {
                Ok(_) => {
                    info!("Updated RoleBinding {} for Team {}", target_name, ctx.key);
                    Ok(Applied::Updated)
                }
                Err(e) => {
                    error!("Unable to update RoleBinding {} for Team {}: {}", target_name, ctx.key, e);
                    Err(ControllerError::cluster(Verb::Replace, TargetKind::RoleBinding, target_name, e))
                }
            }
        }
        BindingComparison::RoleRefDiffers { actual } => {
            error!(
                "RoleBinding {} for Team {} refers to {} instead of ClusterRole/{}",
                target_name, ctx.key, actual, target.cluster_role
            );
            Err(ControllerError::RoleRefConflict {
                target: target_name,
                expected: target.cluster_role.clone(),
                actual,
            })
        }
    }
}
