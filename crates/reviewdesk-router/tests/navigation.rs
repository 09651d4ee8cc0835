use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reviewdesk_router::*;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

const SETTLE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingPresenter {
    notifications: Mutex<Vec<Notification>>,
    titles: Mutex<Vec<String>>,
    translations: AtomicUsize,
}

impl RecordingPresenter {
    fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    fn last_title(&self) -> Option<String> {
        self.titles.lock().unwrap().last().cloned()
    }
}

impl Presenter for RecordingPresenter {
    fn apply_translations(&self, _region: &mut ContentRegion) {
        self.translations.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    fn set_title(&self, title: &str) {
        self.titles.lock().unwrap().push(title.to_string());
    }
}

#[derive(Default)]
struct PageLog {
    renders: AtomicUsize,
    cleanups: AtomicUsize,
    params: Mutex<Vec<QueryParams>>,
}

struct ScriptedPage {
    name: &'static str,
    log: Arc<PageLog>,
    gate: Option<Arc<Notify>>,
    render_error: Option<&'static str>,
    dirty: bool,
    leavable: bool,
}

#[async_trait]
impl Page for ScriptedPage {
    async fn render(&mut self) -> Result<ViewContent> {
        self.log.renders.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(message) = self.render_error {
            return Err(anyhow!(message));
        }
        Ok(ViewContent::new(format!("<main id=\"{}\"></main>", self.name)))
    }

    async fn init(&mut self, params: &QueryParams) -> Result<()> {
        self.log.params.lock().unwrap().push(params.clone());
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        self.log.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    fn can_leave(&self) -> bool {
        self.leavable
    }
}

#[derive(Clone)]
struct PageSpec {
    name: &'static str,
    log: Arc<PageLog>,
    gate: Option<Arc<Notify>>,
    render_error: Option<&'static str>,
    dirty: bool,
    leavable: bool,
}

impl PageSpec {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            log: Arc::new(PageLog::default()),
            gate: None,
            render_error: None,
            dirty: false,
            leavable: true,
        }
    }

    fn route(&self, path: &str, title: &str) -> RouteDescriptor {
        let spec = self.clone();
        RouteDescriptor::new(path, title, move || {
            Ok(Box::new(ScriptedPage {
                name: spec.name,
                log: Arc::clone(&spec.log),
                gate: spec.gate.clone(),
                render_error: spec.render_error,
                dirty: spec.dirty,
                leavable: spec.leavable,
            }) as Box<dyn Page>)
        })
    }
}

struct Harness {
    handle: RouterHandle,
    presenter: Arc<RecordingPresenter>,
    session: Arc<LocalSession>,
    task: JoinHandle<()>,
}

impl Harness {
    fn start(session: LocalSession, confirm: bool, routes: Vec<RouteDescriptor>) -> Self {
        let config = RouterConfig {
            debounce_ms: 1,
            ..RouterConfig::default()
        };
        Self::start_with(config, session, confirm, routes)
    }

    fn start_with(
        config: RouterConfig,
        session: LocalSession,
        confirm: bool,
        routes: Vec<RouteDescriptor>,
    ) -> Self {
        let presenter = Arc::new(RecordingPresenter::default());
        let session = Arc::new(session);
        let mut builder = RouterBuilder::new(config, session.clone(), presenter.clone())
            .confirmation(Arc::new(StaticConfirmation(confirm)));
        for route in routes {
            builder = builder.route(route).unwrap();
        }
        let (scheduler, handle) = builder.build();
        Self {
            handle,
            presenter,
            session,
            task: scheduler.spawn(),
        }
    }

    async fn go(&self, path: &str) -> SchedulerSnapshot {
        assert!(self.handle.navigate(path, None));
        self.settle().await
    }

    async fn settle(&self) -> SchedulerSnapshot {
        timeout(SETTLE, self.handle.wait_until_settled())
            .await
            .expect("router did not settle")
    }
}

fn base_routes() -> Vec<RouteDescriptor> {
    vec![
        PageSpec::new("login").route("/login", "Login"),
        PageSpec::new("dashboard").route("/dashboard", "Dashboard").require_auth(),
    ]
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anonymous_caller_is_redirected_to_login() {
    let mut routes = base_routes();
    routes.push(PageSpec::new("goals").route("/goals", "Goals").require_auth());
    let harness = Harness::start(LocalSession::anonymous(), true, routes);

    let snapshot = harness.go("/goals").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/login"));
    assert_eq!(harness.handle.location(), "#/login");
    assert!(harness.handle.content().markup.contains("id=\"login\""));
    assert!(harness.presenter.notifications().is_empty());
}

#[tokio::test]
async fn worker_denied_admin_route_gets_one_notification() {
    let mut routes = base_routes();
    routes.push(
        PageSpec::new("settings")
            .route("/settings", "Settings")
            .allow_roles([Role::Admin]),
    );
    let harness = Harness::start(LocalSession::signed_in("w@example.com", Role::Worker), true, routes);

    let snapshot = harness.go("/settings").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/dashboard"));

    let notifications = harness.presenter.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, NotificationLevel::Warning);
    assert_eq!(
        notifications[0].message,
        RouterConfig::default().permission_denied_message
    );
}

#[tokio::test]
async fn signed_in_caller_is_sent_home_from_login_but_not_from_registration() {
    let mut routes = base_routes();
    routes.push(PageSpec::new("register").route("/register/company", "Register company"));
    let harness = Harness::start(LocalSession::signed_in("a@example.com", Role::Admin), true, routes);

    let snapshot = harness.go("/login").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/dashboard"));

    let snapshot = harness.go("/register/company").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/register/company"));
}

#[tokio::test]
async fn protected_route_opens_after_sign_in() {
    let mut routes = base_routes();
    routes.push(PageSpec::new("a").route("/a", "A"));
    let b = PageSpec::new("b");
    routes.push(b.route("/b", "B").allow_roles([Role::Admin]));
    let harness = Harness::start(LocalSession::anonymous(), true, routes);

    let snapshot = harness.go("/b").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/login"));
    assert_eq!(b.log.renders.load(Ordering::SeqCst), 0);

    harness.session.sign_in("admin@example.com", Role::Admin);
    let snapshot = harness.go("/b").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/b"));
    assert_eq!(b.log.renders.load(Ordering::SeqCst), 1);
    assert_eq!(harness.presenter.last_title().as_deref(), Some("B"));
}

#[tokio::test]
async fn unknown_path_mounts_login_descriptor() {
    let login = PageSpec::new("login");
    let harness = Harness::start(
        LocalSession::anonymous(),
        true,
        vec![login.route("/login", "Login")],
    );

    let snapshot = harness.go("/does/not/exist").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/login"));
    assert_eq!(login.log.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn redirect_loop_is_cut_off() {
    let config = RouterConfig {
        debounce_ms: 1,
        max_redirects: 3,
        ..RouterConfig::default()
    };
    // A protected login page can never be reached anonymously.
    let routes = vec![PageSpec::new("login").route("/login", "Login").require_auth()];
    let harness = Harness::start_with(config, LocalSession::anonymous(), true, routes);

    let snapshot = harness.go("/login").await;
    assert_eq!(snapshot.current_route, None);
    assert_eq!(snapshot.passes, 4);
    assert!(harness.handle.content().markup.contains("route-error"));
}

// ---------------------------------------------------------------------------
// Teardown vetoes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn declined_discard_keeps_current_page() {
    let editor = PageSpec {
        dirty: true,
        ..PageSpec::new("editor")
    };
    let other = PageSpec::new("other");
    let mut routes = base_routes();
    routes.push(editor.route("/editor", "Editor"));
    routes.push(other.route("/other", "Other"));
    let harness = Harness::start(LocalSession::anonymous(), false, routes);

    let before = harness.go("/editor").await;
    let content = harness.handle.content();

    let after = harness.go("/other").await;
    assert_eq!(after.mounted_page, before.mounted_page);
    assert_eq!(after.current_route.as_deref(), Some("/editor"));
    assert!(!after.is_routing());
    assert_eq!(after.passes, before.passes + 1);
    assert_eq!(harness.handle.content(), content);
    assert_eq!(editor.log.cleanups.load(Ordering::SeqCst), 0);
    assert_eq!(other.log.renders.load(Ordering::SeqCst), 0);
    assert!(!harness.handle.debug_info().is_routing);
}

#[tokio::test]
async fn confirmed_discard_moves_on_and_cleans_up() {
    let editor = PageSpec {
        dirty: true,
        ..PageSpec::new("editor")
    };
    let mut routes = base_routes();
    routes.push(editor.route("/editor", "Editor"));
    routes.push(PageSpec::new("other").route("/other", "Other"));
    let harness = Harness::start(LocalSession::anonymous(), true, routes);

    harness.go("/editor").await;
    let after = harness.go("/other").await;
    assert_eq!(after.current_route.as_deref(), Some("/other"));
    assert_eq!(editor.log.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_that_cannot_be_left_vetoes_without_error_view() {
    let locked = PageSpec {
        leavable: false,
        ..PageSpec::new("locked")
    };
    let mut routes = base_routes();
    routes.push(locked.route("/locked", "Locked"));
    routes.push(PageSpec::new("other").route("/other", "Other"));
    let harness = Harness::start(LocalSession::anonymous(), true, routes);

    harness.go("/locked").await;
    let after = harness.go("/other").await;
    assert_eq!(after.current_route.as_deref(), Some("/locked"));
    assert!(harness.handle.content().markup.contains("id=\"locked\""));
    assert!(!harness.handle.content().markup.contains("route-error"));
}

#[tokio::test]
async fn vetoed_pass_still_drains_queue() {
    let editor = PageSpec {
        dirty: true,
        ..PageSpec::new("editor")
    };
    let mut routes = base_routes();
    routes.push(editor.route("/editor", "Editor"));
    routes.push(PageSpec::new("other").route("/other", "Other"));
    let harness = Harness::start(LocalSession::anonymous(), false, routes);
    harness.go("/editor").await;

    harness.handle.navigate("/other", None);
    harness.handle.navigate("/other", None);
    let snapshot = harness.settle().await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/editor"));
    assert_eq!(snapshot.pending, 0);
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn burst_during_pass_coalesces_to_one_follow_up() {
    let gate = Arc::new(Notify::new());
    let slow = PageSpec {
        gate: Some(Arc::clone(&gate)),
        ..PageSpec::new("slow")
    };
    let mut routes = base_routes();
    routes.push(slow.route("/slow", "Slow"));
    routes.push(PageSpec::new("x").route("/x", "X"));
    let y = PageSpec::new("y");
    routes.push(y.route("/y", "Y"));
    let harness = Harness::start(LocalSession::anonymous(), true, routes);

    let mut watch = harness.handle.subscribe();
    harness.handle.navigate("/slow", None);
    timeout(SETTLE, watch.wait_for(|s| s.is_routing()))
        .await
        .unwrap()
        .unwrap();

    assert!(harness.handle.set_location("#/x"));
    assert!(harness.handle.set_location("#/y"));
    timeout(SETTLE, watch.wait_for(|s| s.pending == 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(harness.handle.debug_info().queue_length, 2);
    assert!(harness.handle.debug_info().is_routing);

    gate.notify_one();
    let snapshot = harness.settle().await;
    assert_eq!(snapshot.passes, 2);
    assert_eq!(snapshot.current_route.as_deref(), Some("/y"));
    assert_eq!(y.log.renders.load(Ordering::SeqCst), 1);
    assert_eq!(slow.log.renders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn navigating_to_same_location_forces_fresh_pass() {
    let a = PageSpec::new("a");
    let mut routes = base_routes();
    routes.push(a.route("/a", "A"));
    let harness = Harness::start(LocalSession::anonymous(), true, routes);

    let first = harness.go("/a").await;
    let second = harness.go("/a").await;
    assert_eq!(second.passes, first.passes + 1);
    assert_eq!(a.log.renders.load(Ordering::SeqCst), 2);
    assert_ne!(second.mounted_page, first.mounted_page);
}

#[tokio::test]
async fn unchanged_location_does_not_trigger() {
    let harness = Harness::start(LocalSession::anonymous(), true, base_routes());
    harness.go("/login").await;
    assert!(!harness.handle.set_location("#/login"));
    assert_eq!(harness.settle().await.passes, 1);
}

#[tokio::test]
async fn query_params_reach_init_verbatim() {
    let users = PageSpec::new("users");
    let mut routes = base_routes();
    routes.push(users.route("/users", "Users"));
    let harness = Harness::start(LocalSession::anonymous(), true, routes);

    let mut params = QueryParams::new();
    params.insert("team".into(), "R&D".into());
    params.insert("page".into(), "2".into());
    harness.handle.navigate("/users", Some(&params));
    harness.settle().await;

    assert_eq!(users.log.params.lock().unwrap().as_slice(), &[params]);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

fn broken_routes() -> (PageSpec, Vec<RouteDescriptor>) {
    let broken = PageSpec {
        render_error: Some("ledger service offline"),
        ..PageSpec::new("broken")
    };
    let mut routes = base_routes();
    routes.push(broken.route("/broken", "Broken").require_auth());
    (broken, routes)
}

#[tokio::test]
async fn render_failure_shows_detail_to_developer() {
    let (_, routes) = broken_routes();
    let harness = Harness::start(LocalSession::signed_in("dev@example.com", Role::Developer), true, routes);

    harness.go("/dashboard").await;
    let snapshot = harness.go("/broken").await;

    let content = harness.handle.content();
    assert!(content.markup.contains("route-error"));
    assert!(content.markup.contains("ledger service offline"));
    assert_eq!(snapshot.current_route.as_deref(), Some("/dashboard"));
    assert_eq!(harness.presenter.last_title().as_deref(), Some("Broken"));
    assert!(!snapshot.is_routing());
}

#[tokio::test]
async fn render_failure_hides_detail_from_worker() {
    let (_, routes) = broken_routes();
    let harness = Harness::start(LocalSession::signed_in("w@example.com", Role::Worker), true, routes);

    harness.go("/broken").await;
    let content = harness.handle.content();
    assert!(content.markup.contains("route-error"));
    assert!(!content.markup.contains("ledger service offline"));
}

#[tokio::test]
async fn failed_page_is_still_torn_down_on_next_navigation() {
    let (broken, routes) = broken_routes();
    let harness = Harness::start(LocalSession::signed_in("w@example.com", Role::Worker), true, routes);

    harness.go("/broken").await;
    let snapshot = harness.go("/dashboard").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/dashboard"));
    assert_eq!(broken.log.cleanups.load(Ordering::SeqCst), 1);
    assert!(!harness.handle.content().markup.contains("route-error"));
}

#[tokio::test]
async fn missing_fallback_renders_error_view() {
    let harness = Harness::start(
        LocalSession::anonymous(),
        true,
        vec![PageSpec::new("a").route("/a", "A")],
    );

    let snapshot = harness.go("/nowhere").await;
    assert_eq!(snapshot.current_route, None);
    assert!(harness.handle.content().markup.contains("route-error"));
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn routes_can_be_added_and_removed_at_runtime() {
    let harness = Harness::start(LocalSession::anonymous(), true, base_routes());
    let reports = PageSpec::new("reports");
    harness
        .handle
        .add_route(reports.route("/reports", "Reports"))
        .unwrap();

    let snapshot = harness.go("/reports").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/reports"));

    assert!(harness.handle.remove_route("/reports").is_some());
    let snapshot = harness.go("/reports").await;
    assert_eq!(snapshot.current_route.as_deref(), Some("/login"));
    assert!(harness.handle.add_route(reports.route("reports", "Reports")).is_err());
}

#[tokio::test]
async fn debug_info_reports_state_and_identity() {
    let harness = Harness::start(
        LocalSession::signed_in("ana@example.com", Role::Admin),
        true,
        base_routes(),
    );
    harness.go("/dashboard").await;

    let info = harness.handle.debug_info();
    assert_eq!(info.current_route.as_deref(), Some("/dashboard"));
    assert!(!info.is_routing);
    assert_eq!(info.queue_length, 0);
    assert_eq!(info.available_routes, vec!["/dashboard", "/login"]);
    assert_eq!(info.caller_identity.as_deref(), Some("ana@example.com"));
    assert_eq!(harness.handle.current_route().as_deref(), Some("/dashboard"));
}

#[tokio::test]
async fn translations_run_after_each_mount() {
    let harness = Harness::start(LocalSession::anonymous(), true, base_routes());
    harness.go("/login").await;
    harness.go("/login").await;
    assert_eq!(harness.presenter.translations.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn scheduler_stops_when_handles_are_dropped() {
    let Harness { handle, task, .. } = Harness::start(LocalSession::anonymous(), true, base_routes());
    let clone = handle.clone();
    drop(handle);
    assert!(clone.reload());
    drop(clone);

    timeout(SETTLE, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn reload_routes_initial_location() {
    let presenter = Arc::new(RecordingPresenter::default());
    let (scheduler, handle) = RouterBuilder::new(
        RouterConfig::default(),
        Arc::new(LocalSession::anonymous()),
        presenter.clone(),
    )
    .initial_location("#/login?next=%2Fgoals")
    .route(PageSpec::new("login").route("/login", "Login"))
    .unwrap()
    .build();
    let _task = scheduler.spawn();

    assert!(handle.reload());
    let snapshot = timeout(SETTLE, handle.wait_until_settled()).await.unwrap();
    assert_eq!(snapshot.current_route.as_deref(), Some("/login"));
    assert_eq!(presenter.last_title().as_deref(), Some("Login"));
}
