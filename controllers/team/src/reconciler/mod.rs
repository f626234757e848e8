//! Reconciliation logic for the Team CRD.
//!
//! One reconcile pass converges a single Team identity: it fetches the Team,
//! derives the Namespace and RoleBindings the spec requires, and applies them
//! in order through the cluster accessor. The reconciler holds no cache and
//! no lock; the cluster store's create uniqueness is the only synchronisation
//! between concurrent passes for different Teams.

pub mod team;

use crate::error::ControllerError;
use cluster_client::{ClusterClientTrait, ClusterError, ObjectKey};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Span, info_span};

/// What the trigger source should do after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Converged; wait for the next change
    AwaitChange,
    /// Converged; reconcile again after the given delay
    RequeueAfter(Duration),
}

/// Per-invocation context handed to a reconcile pass.
///
/// Carries the identity being reconciled, the span every log line of the
/// pass is recorded in, and the invocation's cancellation token.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub key: ObjectKey,
    pub span: Span,
    pub cancel: CancellationToken,
}

impl ReconcileContext {
    pub fn new(key: ObjectKey) -> Self {
        Self::with_cancel(key, CancellationToken::new())
    }

    pub fn with_cancel(key: ObjectKey, cancel: CancellationToken) -> Self {
        let span = info_span!("reconcile", team = %key.name, namespace = %key.namespace);
        Self { key, span, cancel }
    }

    /// Run one accessor call, aborting it if the invocation is cancelled.
    ///
    /// The outer result fails only on cancellation; the inner result is the
    /// accessor's own outcome. A call is never issued once cancellation has
    /// been observed.
    pub async fn call<T, F>(&self, call: F) -> Result<Result<T, ClusterError>, ControllerError>
    where
        F: Future<Output = Result<T, ClusterError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ControllerError::Cancelled),
            result = call => Ok(result),
        }
    }
}

/// Reconciles Team resources.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClientTrait>,
    /// Delay before re-reconciling a converged Team, if periodic resync is on
    resync_interval: Option<Duration>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("resync_interval", &self.resync_interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(client: Box<dyn ClusterClientTrait>) -> Self {
        Self {
            client,
            resync_interval: None,
        }
    }

    /// Re-reconcile converged Teams every `interval`
    #[must_use]
    pub fn with_resync_interval(mut self, interval: Option<Duration>) -> Self {
        self.resync_interval = interval;
        self
    }

    /// Action returned by a pass that converged every target
    fn converged_action(&self) -> Action {
        match self.resync_interval {
            Some(interval) => Action::RequeueAfter(interval),
            None => Action::AwaitChange,
        }
    }
}
