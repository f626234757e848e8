//! Team reconciler
//!
//! Handles: Team

use super::{Action, ReconcileContext, Reconciler};
use crate::desired::DesiredState;
use crate::error::{ControllerError, TargetKind, Verb};
use crate::reconcile_helpers::{self, Applied};
use crds::{Team, TeamStatus};
use tracing::{debug, error, info, Instrument};

impl Reconciler {
    /// Reconciles the Team identified by `ctx.key`.
    ///
    /// Converges the team's Namespace first, then every RoleBinding in
    /// declaration order, and stops at the first failure so a RoleBinding is
    /// never attempted before the Namespace it may live in. Status is written
    /// only after every target was applied, and only when it changed.
    pub async fn reconcile_team(&self, ctx: &ReconcileContext) -> Result<Action, ControllerError> {
        self.reconcile_team_pass(ctx).instrument(ctx.span.clone()).await
    }

    async fn reconcile_team_pass(&self, ctx: &ReconcileContext) -> Result<Action, ControllerError> {
        let team = match ctx.call(self.client.get_team(&ctx.key)).await? {
            Ok(team) => team,
            Err(e) if e.is_not_found() => {
                // Deleted; the objects it created are left in place
                debug!("Team {} no longer exists, nothing to do", ctx.key);
                return Ok(Action::AwaitChange);
            }
            Err(e) => {
                error!("Failed to get Team {}: {}", ctx.key, e);
                return Err(ControllerError::cluster(Verb::Get, TargetKind::Team, ctx.key.to_string(), e));
            }
        };

        info!("Reconciling Team {}", ctx.key);

        let desired = DesiredState::extract(&ctx.key, &team.spec);
        debug!(
            "Team {} requires Namespace {} and {} RoleBinding(s)",
            ctx.key,
            desired.namespace.name,
            desired.role_bindings.len()
        );

        let mut changed = 0usize;

        if reconcile_helpers::ensure_namespace(self.client.as_ref(), ctx, &desired.namespace).await?
            != Applied::Unchanged
        {
            changed += 1;
        }

        for target in &desired.role_bindings {
            if reconcile_helpers::ensure_role_binding(self.client.as_ref(), ctx, target).await?
                != Applied::Unchanged
            {
                changed += 1;
            }
        }

        self.update_status(ctx, &team, &desired).await?;

        if changed > 0 {
            info!("Team {} converged ({} object(s) created or updated)", ctx.key, changed);
        } else {
            debug!("Team {} already converged", ctx.key);
        }

        Ok(self.converged_action())
    }

    /// Record the applied RoleBindings on the Team, skipping the write when
    /// the status already says the same thing.
    async fn update_status(
        &self,
        ctx: &ReconcileContext,
        team: &Team,
        desired: &DesiredState,
    ) -> Result<(), ControllerError> {
        let status = TeamStatus {
            active_role_bindings: desired.active_role_bindings(),
        };

        if team.status.as_ref() == Some(&status) {
            debug!("Team {} already has correct status, skipping update", ctx.key);
            return Ok(());
        }

        match ctx.call(self.client.patch_team_status(&ctx.key, &status)).await? {
            Ok(()) => {
                debug!(
                    "Updated Team {} status: {} active RoleBinding(s)",
                    ctx.key,
                    status.active_role_bindings.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to update Team {} status: {}", ctx.key, e);
                Err(ControllerError::cluster(Verb::PatchStatus, TargetKind::Team, ctx.key.to_string(), e))
            }
        }
    }
}
