//! Trigger source and dispatch.
//!
//! `kube_runtime::Controller` owns the work queue: it deduplicates triggers,
//! never runs two passes over the same Team at once, caps concurrency, and
//! keeps one scheduled deadline per Team. Every object it hands over is
//! turned into a [`TriggerEvent`] and run through the reconcile function
//! registered for its [`ResourceKind`] in the [`Dispatcher`].
//!
//! Failed passes are requeued with a per-identity Fibonacci backoff that is
//! reset by the next successful pass.

use crate::backoff::FibonacciBackoff;
use crate::error::ControllerError;
use crate::reconciler::{Action, ReconcileContext, Reconciler};
use cluster_client::ObjectKey;
use crds::Team;
use futures::FutureExt;
use futures::future::BoxFuture;
use kube_runtime::controller::Action as RequeueAction;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Kind of resource a trigger refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Team,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Team => write!(f, "Team"),
        }
    }
}

/// Request to reconcile one identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerEvent {
    pub kind: ResourceKind,
    pub key: ObjectKey,
}

impl TriggerEvent {
    pub fn team(key: ObjectKey) -> Self {
        Self {
            kind: ResourceKind::Team,
            key,
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// Result of one reconcile invocation as seen by the trigger source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Converged, wait for the next change
    Done,
    /// Failed, retry with backoff
    Requeue,
    /// Converged, run again after the delay
    RequeueAfter(Duration),
    /// Cannot be handled, drop the event
    Fatal,
}

impl Outcome {
    pub fn from_result(result: &Result<Action, ControllerError>) -> Self {
        match result {
            Ok(Action::AwaitChange) => Outcome::Done,
            Ok(Action::RequeueAfter(delay)) => Outcome::RequeueAfter(*delay),
            Err(e) => Outcome::from_error(e),
        }
    }

    pub fn from_error(error: &ControllerError) -> Self {
        if error.is_retryable() { Outcome::Requeue } else { Outcome::Fatal }
    }
}

type ReconcileFn = Arc<dyn Fn(ReconcileContext) -> BoxFuture<'static, Result<Action, ControllerError>> + Send + Sync>;

/// Fixed table from resource kind to reconcile function
#[derive(Default)]
pub struct Dispatcher {
    table: HashMap<ResourceKind, ReconcileFn>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("kinds", &self.table.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch table with every reconciler the controller runs
    pub fn for_reconciler(reconciler: Arc<Reconciler>) -> Self {
        Self::new().register(ResourceKind::Team, move |ctx| {
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.reconcile_team(&ctx).await }
        })
    }

    /// Register the reconcile function for `kind`, replacing any previous one
    #[must_use]
    pub fn register<F, Fut>(mut self, kind: ResourceKind, reconcile: F) -> Self
    where
        F: Fn(ReconcileContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Action, ControllerError>> + Send + 'static,
    {
        let boxed: ReconcileFn = Arc::new(move |ctx| reconcile(ctx).boxed());
        self.table.insert(kind, boxed);
        self
    }

    pub async fn dispatch(&self, kind: ResourceKind, ctx: ReconcileContext) -> Result<Action, ControllerError> {
        match self.table.get(&kind) {
            Some(reconcile) => reconcile(ctx).await,
            None => Err(ControllerError::NoReconciler(kind.to_string())),
        }
    }
}

/// Shared state handed to every pass the controller runs
#[derive(Debug)]
pub struct TriggerContext {
    dispatcher: Dispatcher,
    backoffs: Mutex<HashMap<TriggerEvent, FibonacciBackoff>>,
    backoff_min: Duration,
    backoff_max: Duration,
    /// Parent of every pass's cancellation token
    shutdown: CancellationToken,
}

impl TriggerContext {
    pub fn new(dispatcher: Dispatcher, backoff_min: Duration, backoff_max: Duration, shutdown: CancellationToken) -> Self {
        Self {
            dispatcher,
            backoffs: Mutex::new(HashMap::new()),
            backoff_min,
            backoff_max,
            shutdown,
        }
    }

    fn backoffs(&self) -> MutexGuard<'_, HashMap<TriggerEvent, FibonacciBackoff>> {
        self.backoffs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one pass over `event`'s identity
    pub async fn reconcile(&self, event: &TriggerEvent) -> Result<RequeueAction, ControllerError> {
        let ctx = ReconcileContext::with_cancel(event.key.clone(), self.shutdown.child_token());
        let action = self.dispatcher.dispatch(event.kind, ctx).await?;
        Ok(self.requeue_action(event, Outcome::from_result(&Ok(action))))
    }

    /// Translate the outcome of a pass into what the scheduler does next
    pub fn requeue_action(&self, event: &TriggerEvent, outcome: Outcome) -> RequeueAction {
        match outcome {
            Outcome::Done => {
                self.reset_backoff(event);
                RequeueAction::await_change()
            }
            Outcome::RequeueAfter(delay) => {
                self.reset_backoff(event);
                RequeueAction::requeue(delay)
            }
            Outcome::Requeue => {
                let (min, max) = (self.backoff_min, self.backoff_max);
                let delay = self.backoffs()
                    .entry(event.clone())
                    .or_insert_with(|| FibonacciBackoff::new(min, max))
                    .next_backoff();
                debug!("Requeueing {} in {:?}", event, delay);
                RequeueAction::requeue(delay)
            }
            Outcome::Fatal => {
                self.reset_backoff(event);
                RequeueAction::await_change()
            }
        }
    }

    fn reset_backoff(&self, event: &TriggerEvent) {
        if let Some(backoff) = self.backoffs().get_mut(event) {
            backoff.reset();
        }
    }
}

fn team_event(team: &Team) -> Option<TriggerEvent> {
    ObjectKey::from_meta(&team.metadata).map(TriggerEvent::team)
}

/// Reconcile entry point handed to `kube_runtime::Controller::run`
pub async fn reconcile(team: Arc<Team>, ctx: Arc<TriggerContext>) -> Result<RequeueAction, ControllerError> {
    let Some(event) = team_event(&team) else {
        warn!("Ignoring Team without a name");
        return Ok(RequeueAction::await_change());
    };
    ctx.reconcile(&event).await
}

/// Error policy handed to `kube_runtime::Controller::run`
pub fn error_policy(team: Arc<Team>, error: &ControllerError, ctx: Arc<TriggerContext>) -> RequeueAction {
    let Some(event) = team_event(&team) else {
        return RequeueAction::await_change();
    };

    let outcome = Outcome::from_error(error);
    if outcome == Outcome::Fatal {
        error!("Dropping {}: {}", event, error);
    } else {
        warn!("Reconciliation failed for {}: {}", event, error);
    }
    ctx.requeue_action(&event, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TargetKind, Verb};
    use crate::test_utils::*;
    use cluster_client::ClusterError;
    use futures::StreamExt;
    use futures::channel::mpsc;
    use kube_runtime::reflector::{self, ObjectRef, Store};
    use kube_runtime::{controller, watcher};
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn alpha() -> TriggerEvent {
        TriggerEvent::team(ObjectKey::new("default", "alpha"))
    }

    fn context(dispatcher: Dispatcher) -> TriggerContext {
        TriggerContext::new(dispatcher, secs(5), secs(300), CancellationToken::new())
    }

    fn transient() -> ControllerError {
        ControllerError::cluster(
            Verb::Create,
            TargetKind::Namespace,
            "alpha",
            ClusterError::Unavailable("timeout".to_string()),
        )
    }

    fn store_with(teams: &[&str]) -> Store<Team> {
        let (reader, mut writer) = reflector::store();
        writer.apply_watcher_event(&watcher::Event::Init);
        for name in teams {
            let team = create_test_team(name, "default", &format!("ad-{}", name), &[]);
            writer.apply_watcher_event(&watcher::Event::InitApply(team));
        }
        writer.apply_watcher_event(&watcher::Event::InitDone);
        reader
    }

    /// Drive `ctx` through kube_runtime's scheduler for `window`, feeding it
    /// a trigger for `alpha` at each of `triggers` (offsets from the start)
    async fn run_scheduler(ctx: TriggerContext, triggers: Vec<Duration>, window: Duration) {
        let (sender, receiver) = mpsc::unbounded::<ObjectRef<Team>>();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for offset in triggers {
                tokio::time::sleep_until(start + offset).await;
                if sender.unbounded_send(ObjectRef::new("alpha").within("default")).is_err() {
                    break;
                }
            }
            // Keep the queue open until the window closes
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let results = controller::applier(
            |team: Arc<Team>, ctx: Arc<TriggerContext>| Box::pin(reconcile(team, ctx)),
            error_policy,
            Arc::new(ctx),
            store_with(&["alpha"]),
            receiver.map(Ok::<_, Infallible>),
            controller::Config::default(),
        );
        let _ = tokio::time::timeout(window, results.for_each(|_| async {})).await;
    }

    #[test]
    fn test_failures_back_off_and_success_resets() {
        let ctx = context(Dispatcher::new());
        let event = alpha();

        let delays: Vec<RequeueAction> = (0..4)
            .map(|_| ctx.requeue_action(&event, Outcome::Requeue))
            .collect();
        assert_eq!(
            delays,
            vec![
                RequeueAction::requeue(secs(5)),
                RequeueAction::requeue(secs(5)),
                RequeueAction::requeue(secs(10)),
                RequeueAction::requeue(secs(15)),
            ]
        );

        assert_eq!(ctx.requeue_action(&event, Outcome::Done), RequeueAction::await_change());
        assert_eq!(ctx.requeue_action(&event, Outcome::Requeue), RequeueAction::requeue(secs(5)));
    }

    #[test]
    fn test_backoff_is_tracked_per_identity() {
        let ctx = context(Dispatcher::new());
        let beta = TriggerEvent::team(ObjectKey::new("default", "beta"));

        for _ in 0..3 {
            ctx.requeue_action(&alpha(), Outcome::Requeue);
        }
        assert_eq!(ctx.requeue_action(&beta, Outcome::Requeue), RequeueAction::requeue(secs(5)));
        assert_eq!(ctx.requeue_action(&alpha(), Outcome::Requeue), RequeueAction::requeue(secs(15)));
    }

    #[test]
    fn test_resync_requeues_after_interval() {
        let ctx = context(Dispatcher::new());
        ctx.requeue_action(&alpha(), Outcome::Requeue);
        ctx.requeue_action(&alpha(), Outcome::Requeue);

        assert_eq!(
            ctx.requeue_action(&alpha(), Outcome::RequeueAfter(secs(600))),
            RequeueAction::requeue(secs(600))
        );
        // A converged pass also clears the failure backoff
        assert_eq!(ctx.requeue_action(&alpha(), Outcome::Requeue), RequeueAction::requeue(secs(5)));
    }

    #[test]
    fn test_fatal_errors_wait_for_change() {
        let ctx = context(Dispatcher::new());
        let team = Arc::new(create_test_team("alpha", "default", "ad-alpha", &[]));
        let ctx = Arc::new(ctx);

        let action = error_policy(Arc::clone(&team), &ControllerError::NoReconciler("Team".to_string()), Arc::clone(&ctx));
        assert_eq!(action, RequeueAction::await_change());

        let action = error_policy(team, &transient(), ctx);
        assert_eq!(action, RequeueAction::requeue(secs(5)));
    }

    #[test]
    fn test_outcome_from_result() {
        assert_eq!(Outcome::from_result(&Ok(Action::AwaitChange)), Outcome::Done);
        assert_eq!(
            Outcome::from_result(&Ok(Action::RequeueAfter(secs(30)))),
            Outcome::RequeueAfter(secs(30))
        );
        assert_eq!(Outcome::from_result(&Err(transient())), Outcome::Requeue);
        assert_eq!(Outcome::from_result(&Err(ControllerError::Cancelled)), Outcome::Requeue);
        assert_eq!(
            Outcome::from_result(&Err(ControllerError::NoReconciler("Team".to_string()))),
            Outcome::Fatal
        );
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_fatal() {
        let dispatcher = Dispatcher::new();
        let result = dispatcher
            .dispatch(ResourceKind::Team, create_test_context("default", "alpha"))
            .await;
        assert!(matches!(result, Err(ControllerError::NoReconciler(ref kind)) if kind == "Team"));
        assert_eq!(Outcome::from_result(&result), Outcome::Fatal);
    }

    #[tokio::test]
    async fn test_dispatch_calls_registered_reconciler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let dispatcher = Dispatcher::new().register(ResourceKind::Team, move |ctx| {
            let counter = Arc::clone(&counter);
            async move {
                assert_eq!(ctx.key.name, "alpha");
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Action::AwaitChange)
            }
        });

        let result = dispatcher
            .dispatch(ResourceKind::Team, create_test_context("default", "alpha"))
            .await;
        assert_eq!(result.unwrap(), Action::AwaitChange);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconcile_runs_registered_reconciler() {
        let (reconciler, mock) = create_test_reconciler();
        mock.add_team(create_test_team("alpha", "default", "ad-alpha", &[]));
        let ctx = Arc::new(context(Dispatcher::for_reconciler(Arc::new(reconciler))));

        let team = Arc::new(create_test_team("alpha", "default", "ad-alpha", &[]));
        let action = reconcile(team, ctx).await.unwrap();

        assert_eq!(action, RequeueAction::await_change());
        assert!(mock.role_binding("alpha", "team-rolebinding-alpha").is_some());
    }

    #[tokio::test]
    async fn test_resync_keeps_one_deadline_per_team() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let passes = Arc::new(AtomicUsize::new(0));

        let (a, p, n) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&passes));
        let dispatcher = Dispatcher::new().register(ResourceKind::Team, move |_ctx| {
            let (active, peak, passes) = (Arc::clone(&a), Arc::clone(&p), Arc::clone(&n));
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                passes.fetch_add(1, Ordering::SeqCst);
                Ok(Action::RequeueAfter(Duration::from_millis(100)))
            }
        });

        // Five change triggers while a resync deadline is pending
        let triggers = (0..5).map(|i| Duration::from_millis(23 * i)).collect();
        run_scheduler(context(dispatcher), triggers, Duration::from_secs(1)).await;

        // One resync chain gives about ten passes; five chains would give fifty
        let passes = passes.load(Ordering::SeqCst);
        assert!(passes >= 5, "only {} passes", passes);
        assert!(passes <= 20, "{} passes, resync chains multiplied", passes);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_change_during_failing_pass_runs_without_backoff() {
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&passes);
        let dispatcher = Dispatcher::new().register(ResourceKind::Team, move |ctx| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    return Err(ControllerError::RoleRefConflict {
                        target: format!("{}/team-rolebinding-alpha", ctx.key.name),
                        expected: "team-ns-role".to_string(),
                        actual: "admin".to_string(),
                    });
                }
                Ok(Action::AwaitChange)
            }
        });

        // Failure backoff of 300s; the second trigger lands mid-pass
        let ctx = TriggerContext::new(dispatcher, secs(300), secs(300), CancellationToken::new());
        let triggers = vec![Duration::ZERO, Duration::from_millis(20)];
        run_scheduler(ctx, triggers, Duration::from_millis(500)).await;

        assert_eq!(passes.load(Ordering::SeqCst), 2);
    }
}
