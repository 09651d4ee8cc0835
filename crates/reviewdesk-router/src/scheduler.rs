//! Navigation scheduler: one active pass, a pending queue, coalesced bursts.
//!
//! Triggers carry no target. Every pass re-reads the live [`Location`], so a
//! burst of triggers that lands while a pass is running converges on whatever
//! the URL says when the follow-up pass starts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use reviewdesk_schema::{Notification, QueryParams};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RouterConfig;
use crate::error::{NavigationError, RouteTableError};
use crate::error_view::ErrorPresenter;
use crate::guard::{evaluate_guards, GuardOutcome};
use crate::lifecycle::{ContentRegion, PageLifecycleManager};
use crate::location::Location;
use crate::page::{Confirmation, Presenter, Session, StaticConfirmation};
use crate::route_table::{RouteDescriptor, RouteTable};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    /// Programmatic `navigate()`.
    Navigate,
    /// The fragment was changed from outside (address bar, link).
    HashChange,
    /// A guard moved the location.
    Redirect,
    /// Re-evaluate the current location (startup, retry).
    Reload,
}

/// A "re-evaluate now" request. Deliberately has no target path.
#[derive(Debug, Clone)]
pub struct NavigationRequest {
    pub id: Uuid,
    pub requested_at: DateTime<Utc>,
    pub origin: TriggerOrigin,
}

impl NavigationRequest {
    pub fn new(origin: TriggerOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            requested_at: Utc::now(),
            origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPhase {
    Idle,
    /// Idle with one dequeued request waiting out the debounce delay.
    Scheduled,
    Routing,
}

/// Point-in-time view of the scheduler, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub phase: RoutingPhase,
    pub pending: usize,
    pub current_route: Option<String>,
    pub mounted_page: Option<u64>,
    /// Completed passes, whatever their outcome.
    pub passes: u64,
    /// Requests taken off the trigger channel.
    pub received: u64,
}

impl SchedulerSnapshot {
    pub fn is_routing(&self) -> bool {
        self.phase == RoutingPhase::Routing
    }

    fn is_settled(&self, submitted: u64) -> bool {
        self.phase == RoutingPhase::Idle && self.pending == 0 && self.received >= submitted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    pub current_route: Option<String>,
    pub is_routing: bool,
    pub queue_length: usize,
    pub available_routes: Vec<String>,
    pub caller_identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PassOutcome {
    Mounted(String),
    Redirected(String),
    Vetoed,
    Failed,
}

#[derive(Debug)]
struct SchedulerState {
    phase: RoutingPhase,
    pending: VecDeque<NavigationRequest>,
    current_route: Option<String>,
    mounted_page: Option<u64>,
    passes: u64,
    received: u64,
    redirect_streak: usize,
}

impl SchedulerState {
    fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            phase: self.phase,
            pending: self.pending.len(),
            current_route: self.current_route.clone(),
            mounted_page: self.mounted_page,
            passes: self.passes,
            received: self.received,
        }
    }
}

fn publish(tx: &watch::Sender<SchedulerSnapshot>, state: &SchedulerState) {
    tx.send_replace(state.snapshot());
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct RouterBuilder {
    config: RouterConfig,
    routes: RouteTable,
    session: Arc<dyn Session>,
    presenter: Arc<dyn Presenter>,
    confirmation: Arc<dyn Confirmation>,
    initial_fragment: String,
}

impl RouterBuilder {
    /// Without an explicit confirmation capability, discard prompts are declined.
    pub fn new(config: RouterConfig, session: Arc<dyn Session>, presenter: Arc<dyn Presenter>) -> Self {
        let routes = RouteTable::new(config.login_path.clone());
        Self {
            config,
            routes,
            session,
            presenter,
            confirmation: Arc::new(StaticConfirmation(false)),
            initial_fragment: String::new(),
        }
    }

    pub fn confirmation(mut self, confirmation: Arc<dyn Confirmation>) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn initial_location(mut self, fragment: &str) -> Self {
        self.initial_fragment = fragment.to_string();
        self
    }

    pub fn route(mut self, descriptor: RouteDescriptor) -> Result<Self, RouteTableError> {
        self.routes.add(descriptor)?;
        Ok(self)
    }

    pub fn build(self) -> (NavigationScheduler, RouterHandle) {
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let location = Arc::new(Location::new(&self.initial_fragment));
        let routes = Arc::new(RwLock::new(self.routes));
        let lifecycle = PageLifecycleManager::new(
            self.confirmation,
            Arc::clone(&self.presenter),
            self.config.mount_timeout(),
        );
        let region_rx = lifecycle.subscribe();

        let state = SchedulerState {
            phase: RoutingPhase::Idle,
            pending: VecDeque::new(),
            current_route: None,
            mounted_page: None,
            passes: 0,
            received: 0,
            redirect_streak: 0,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());

        let handle = RouterHandle {
            trigger: trigger_tx,
            submitted: Arc::new(AtomicU64::new(0)),
            location: Arc::clone(&location),
            routes: Arc::clone(&routes),
            session: Arc::clone(&self.session),
            snapshot: snapshot_rx,
            region: region_rx,
        };

        let scheduler = NavigationScheduler {
            rx: trigger_rx,
            runner: PassRunner {
                errors: ErrorPresenter::new(self.config.home_path.clone()),
                config: self.config,
                routes,
                location,
                lifecycle,
                session: self.session,
                presenter: self.presenter,
            },
            state,
            snapshot_tx,
        };
        (scheduler, handle)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the scheduler state machine and the only page lifecycle manager.
///
/// Drive it with [`NavigationScheduler::run`] (or [`NavigationScheduler::spawn`]);
/// it stops once every [`RouterHandle`] has been dropped.
pub struct NavigationScheduler {
    rx: mpsc::UnboundedReceiver<NavigationRequest>,
    runner: PassRunner,
    state: SchedulerState,
    snapshot_tx: watch::Sender<SchedulerSnapshot>,
}

impl NavigationScheduler {
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        debug!("navigation scheduler started");
        while let Some(request) = self.rx.recv().await {
            self.state.received += 1;
            let mut next = Some(request);
            while let Some(request) = next.take() {
                self.dispatch(request).await;
                next = self.next_pending().await;
            }
        }
        debug!("all router handles dropped, navigation scheduler stopped");
    }

    /// Runs one pass while continuing to accept triggers into the pending queue.
    async fn dispatch(&mut self, request: NavigationRequest) {
        let Self {
            rx,
            runner,
            state,
            snapshot_tx,
        } = self;

        state.phase = RoutingPhase::Routing;
        publish(snapshot_tx, state);

        let span = info_span!("navigation", id = %request.id, origin = ?request.origin);
        let outcome = {
            let pass = runner.run_pass(state.redirect_streak).instrument(span);
            tokio::pin!(pass);
            loop {
                tokio::select! {
                    outcome = &mut pass => break outcome,
                    Some(queued) = rx.recv() => {
                        state.received += 1;
                        state.pending.push_back(queued);
                        debug!(pending = state.pending.len(), "navigation queued behind active pass");
                        publish(snapshot_tx, state);
                    }
                }
            }
        };

        match outcome {
            PassOutcome::Mounted(route) => {
                info!(route = %route, "navigation completed");
                state.current_route = Some(route);
                state.redirect_streak = 0;
            }
            PassOutcome::Redirected(target) => {
                debug!(target = %target, "redirect scheduled");
                state.redirect_streak += 1;
                state.pending.push_back(NavigationRequest::new(TriggerOrigin::Redirect));
            }
            PassOutcome::Vetoed => {}
            PassOutcome::Failed => state.redirect_streak = 0,
        }

        state.mounted_page = runner.lifecycle.mounted_page();
        state.passes += 1;
        state.phase = RoutingPhase::Idle;
        publish(snapshot_tx, state);
    }

    /// Dequeues one pending request and waits out the debounce delay.
    ///
    /// The rest of the queue is collapsed into it: queued requests carry no
    /// payload, so one pass re-reading the location serves all of them.
    async fn next_pending(&mut self) -> Option<NavigationRequest> {
        let request = self.state.pending.pop_front()?;
        let coalesced = self.state.pending.len();
        if coalesced > 0 {
            debug!(coalesced, "collapsed queued navigation requests");
            self.state.pending.clear();
        }
        self.state.phase = RoutingPhase::Scheduled;
        publish(&self.snapshot_tx, &self.state);

        let debounce = tokio::time::sleep(self.runner.config.debounce());
        tokio::pin!(debounce);
        loop {
            tokio::select! {
                _ = &mut debounce => break,
                Some(absorbed) = self.rx.recv() => {
                    debug!(id = %absorbed.id, "trigger absorbed into scheduled pass");
                    self.state.received += 1;
                    publish(&self.snapshot_tx, &self.state);
                }
            }
        }
        Some(request)
    }
}

struct PassRunner {
    config: RouterConfig,
    routes: Arc<RwLock<RouteTable>>,
    location: Arc<Location>,
    lifecycle: PageLifecycleManager,
    session: Arc<dyn Session>,
    presenter: Arc<dyn Presenter>,
    errors: ErrorPresenter,
}

impl PassRunner {
    async fn run_pass(&mut self, redirect_streak: usize) -> PassOutcome {
        match self.try_pass(redirect_streak).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_veto() => {
                debug!(reason = %err, "navigation vetoed by current page");
                PassOutcome::Vetoed
            }
            Err(err) => {
                self.fail(err);
                PassOutcome::Failed
            }
        }
    }

    async fn try_pass(&mut self, redirect_streak: usize) -> Result<PassOutcome, NavigationError> {
        let (path, params) = self.location.resolve();
        debug!(path = %path, "routing");

        self.lifecycle.teardown().await?;

        let route = self
            .lookup(&path)
            .ok_or_else(|| NavigationError::MissingFallback(path.clone()))?;

        if let GuardOutcome::Redirect { to, message } =
            evaluate_guards(&route, self.session.as_ref(), &self.config)
        {
            if redirect_streak >= self.config.max_redirects {
                return Err(NavigationError::TooManyRedirects(redirect_streak + 1));
            }
            if let Some(message) = message {
                warn!(route = route.path(), "access denied by role guard");
                self.presenter.notify(Notification::warning(message));
            }
            self.location
                .set_fragment(&Location::fragment_for(&to, &QueryParams::new()));
            return Ok(PassOutcome::Redirected(to));
        }

        let mounted = self.lifecycle.mount(&route, &params).await;
        // The title follows the target route even when mounting failed.
        self.presenter.set_title(&self.config.page_title(route.title()));
        mounted?;

        Ok(PassOutcome::Mounted(route.path().to_string()))
    }

    fn lookup(&self, path: &str) -> Option<Arc<RouteDescriptor>> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .lookup(path)
    }

    fn fail(&mut self, err: NavigationError) {
        error!(error = %err, "navigation failed");
        let role = self.session.current_role();
        let view = self.errors.render(&anyhow::Error::from(err), role);
        self.lifecycle.show_error(view);
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable entry point for the rest of the application.
#[derive(Clone)]
pub struct RouterHandle {
    trigger: mpsc::UnboundedSender<NavigationRequest>,
    submitted: Arc<AtomicU64>,
    location: Arc<Location>,
    routes: Arc<RwLock<RouteTable>>,
    session: Arc<dyn Session>,
    snapshot: watch::Receiver<SchedulerSnapshot>,
    region: watch::Receiver<ContentRegion>,
}

impl RouterHandle {
    /// Moves the location and always requests a pass, even when the location
    /// did not change (forced re-route). Returns `false` once the scheduler
    /// has stopped.
    pub fn navigate(&self, path: &str, params: Option<&QueryParams>) -> bool {
        let empty = QueryParams::new();
        let fragment = Location::fragment_for(path, params.unwrap_or(&empty));
        self.location.set_fragment(&fragment);
        self.fire(TriggerOrigin::Navigate)
    }

    /// External fragment change. Like `hashchange`, only an actual change
    /// requests a pass.
    pub fn set_location(&self, fragment: &str) -> bool {
        if !self.location.set_fragment(fragment) {
            return false;
        }
        self.fire(TriggerOrigin::HashChange)
    }

    /// Re-routes the current location (startup, retry after a failure).
    pub fn reload(&self) -> bool {
        self.fire(TriggerOrigin::Reload)
    }

    pub fn add_route(&self, descriptor: RouteDescriptor) -> Result<(), RouteTableError> {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .add(descriptor)
    }

    pub fn remove_route(&self, path: &str) -> Option<Arc<RouteDescriptor>> {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path)
    }

    pub fn current_route(&self) -> Option<String> {
        self.snapshot.borrow().current_route.clone()
    }

    pub fn location(&self) -> String {
        self.location.fragment()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerSnapshot> {
        self.snapshot.clone()
    }

    pub fn content(&self) -> ContentRegion {
        self.region.borrow().clone()
    }

    pub fn debug_info(&self) -> DebugInfo {
        let snapshot = self.snapshot();
        let available_routes = self
            .routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .paths();
        DebugInfo {
            current_route: snapshot.current_route,
            is_routing: snapshot.phase == RoutingPhase::Routing,
            queue_length: snapshot.pending,
            available_routes,
            caller_identity: self.session.identity(),
        }
    }

    /// Resolves once every trigger fired so far has been served and the
    /// scheduler is idle with an empty queue.
    pub async fn wait_until_settled(&self) -> SchedulerSnapshot {
        let mut rx = self.snapshot.clone();
        loop {
            let target = self.submitted.load(Ordering::SeqCst);
            let settled = rx
                .wait_for(|snapshot| snapshot.is_settled(target))
                .await
                .map(|snapshot| snapshot.clone());
            let Ok(snapshot) = settled else {
                return self.snapshot();
            };
            if self.submitted.load(Ordering::SeqCst) == target {
                return snapshot;
            }
        }
    }

    fn fire(&self, origin: TriggerOrigin) -> bool {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        if self.trigger.send(NavigationRequest::new(origin)).is_err() {
            self.submitted.fetch_sub(1, Ordering::SeqCst);
            warn!(?origin, "navigation scheduler is not running");
            return false;
        }
        true
    }
}
