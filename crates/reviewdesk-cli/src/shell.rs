//! Headless console: wires the router to text output and drives it with
//! one command per line.

use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reviewdesk_router::{
    Confirmation, ContentRegion, LocalSession, Location, Notification, NotificationLevel,
    Presenter, QueryParams, Role, RouterBuilder, RouterHandle, StaticConfirmation,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::console::ConsoleFile;
use crate::pages::route_descriptor;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

/// Localizes `data-i18n` elements and buffers notifications and titles until
/// the shell prints them.
pub struct ConsolePresenter {
    translations: BTreeMap<String, String>,
    events: Mutex<Vec<String>>,
}

impl ConsolePresenter {
    pub fn new(translations: BTreeMap<String, String>) -> Self {
        Self {
            translations,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn drain_events(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn push(&self, event: String) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl Presenter for ConsolePresenter {
    fn apply_translations(&self, region: &mut ContentRegion) {
        region.markup = translate(&region.markup, &self.translations);
        for overlay in &mut region.overlays {
            overlay.markup = translate(&overlay.markup, &self.translations);
        }
    }

    fn notify(&self, notification: Notification) {
        let level = match notification.level {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        };
        self.push(format!("[{level}] {}", notification.message));
    }

    fn set_title(&self, title: &str) {
        self.push(format!("[title] {title}"));
    }
}

/// Replaces the text content of every element tagged `data-i18n="key"` that
/// has a translation. Elements with nested markup keep their children.
pub fn translate(markup: &str, translations: &BTreeMap<String, String>) -> String {
    const ATTR: &str = "data-i18n=\"";

    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(start) = rest.find(ATTR) {
        let after_attr = &rest[start + ATTR.len()..];
        let Some(key_end) = after_attr.find('"') else {
            break;
        };
        let key = &after_attr[..key_end];
        let Some(tag_end) = after_attr.find('>') else {
            break;
        };
        let text = &after_attr[tag_end + 1..];
        let text_end = text.find('<').unwrap_or(text.len());

        let head_len = start + ATTR.len() + tag_end + 1;
        out.push_str(&rest[..head_len]);
        match translations.get(key) {
            Some(value) => out.push_str(&html_escape::encode_text(value)),
            None => out.push_str(&text[..text_end]),
        }
        rest = &text[text_end..];
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Asks on the terminal whether unsaved changes may be discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptConfirmation;

#[async_trait]
impl Confirmation for PromptConfirmation {
    async fn confirm_discard(&self, message: &str) -> bool {
        let prompt = message.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        })
        .await;
        match answer {
            Ok(Ok(discard)) => discard,
            Ok(Err(err)) => {
                warn!(error = %err, "discard prompt failed, keeping changes");
                false
            }
            Err(err) => {
                warn!(error = %err, "discard prompt task failed, keeping changes");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DiscardPolicy {
    /// Prompt on the terminal.
    Ask,
    /// Always discard unsaved changes.
    Yes,
    /// Never discard; navigation away from edited pages is cancelled.
    No,
}

impl DiscardPolicy {
    fn confirmation(self) -> Arc<dyn Confirmation> {
        match self {
            Self::Ask => Arc::new(PromptConfirmation),
            Self::Yes => Arc::new(StaticConfirmation(true)),
            Self::No => Arc::new(StaticConfirmation(false)),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// `#/path?query`: external location change.
    Fragment(String),
    /// `go /path [key=value ...]`: programmatic navigation.
    Go { path: String, params: QueryParams },
    Reload,
    SignIn { user: String, role: Role },
    SignOut,
    Debug,
    Routes,
}

impl FromStr for ShellCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.starts_with('#') {
            return Ok(Self::Fragment(line.to_string()));
        }

        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| anyhow!("empty command"))?;
        match command {
            "go" => {
                let path = words
                    .next()
                    .ok_or_else(|| anyhow!("usage: go <path> [key=value ...]"))?
                    .to_string();
                let mut params = QueryParams::new();
                for pair in words {
                    let (key, value) = pair
                        .split_once('=')
                        .ok_or_else(|| anyhow!("expected key=value, got: {pair}"))?;
                    params.insert(key.to_string(), value.to_string());
                }
                Ok(Self::Go { path, params })
            }
            "reload" => Ok(Self::Reload),
            "sign-in" => {
                let (Some(user), Some(role)) = (words.next(), words.next()) else {
                    bail!("usage: sign-in <user> <role>");
                };
                let role = role.parse::<Role>().map_err(|e| anyhow!(e))?;
                Ok(Self::SignIn {
                    user: user.to_string(),
                    role,
                })
            }
            "sign-out" => Ok(Self::SignOut),
            "debug" => Ok(Self::Debug),
            "routes" => Ok(Self::Routes),
            other => Err(anyhow!("unknown command: {other}")),
        }
    }
}

/// Blank lines and `//` comments are skipped.
pub fn parse_line(line: &str) -> Option<Result<ShellCommand>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with("//") {
        return None;
    }
    Some(trimmed.parse())
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

pub struct Shell {
    handle: RouterHandle,
    session: Arc<LocalSession>,
    presenter: Arc<ConsolePresenter>,
    task: JoinHandle<()>,
}

impl Shell {
    /// Builds the router from the console definition and starts its scheduler.
    pub fn start(console: &ConsoleFile, policy: DiscardPolicy, start: &str) -> Result<Self> {
        let session = Arc::new(LocalSession::anonymous());
        if console.session.authenticated {
            let role = console
                .session
                .role
                .ok_or_else(|| anyhow!("authenticated session requires a role"))?;
            let user = console.session.user.as_deref().unwrap_or("console");
            session.sign_in(user, role);
        }
        let presenter = Arc::new(ConsolePresenter::new(console.translations.clone()));

        let mut builder = RouterBuilder::new(console.router.clone(), session.clone(), presenter.clone())
            .confirmation(policy.confirmation())
            .initial_location(start);
        for spec in &console.routes {
            builder = builder
                .route(route_descriptor(spec))
                .with_context(|| format!("invalid route: {}", spec.path))?;
        }
        let (scheduler, handle) = builder.build();
        info!(routes = console.routes.len(), "console router started");

        Ok(Self {
            handle,
            session,
            presenter,
            task: scheduler.spawn(),
        })
    }

    pub fn handle(&self) -> &RouterHandle {
        &self.handle
    }

    /// Routes the initial location and prints the result.
    pub async fn boot<W: Write>(&self, out: &mut W) -> Result<()> {
        self.handle.reload();
        self.settle_and_print(out).await
    }

    pub async fn execute<W: Write>(&self, command: ShellCommand, out: &mut W) -> Result<()> {
        match command {
            ShellCommand::Fragment(fragment) => {
                if !self.handle.set_location(&fragment) {
                    writeln!(out, "(location unchanged)")?;
                    return Ok(());
                }
            }
            ShellCommand::Go { path, params } => {
                self.handle.navigate(&path, Some(&params));
            }
            ShellCommand::Reload => {
                self.handle.reload();
            }
            ShellCommand::SignIn { user, role } => {
                self.session.sign_in(user.as_str(), role);
                writeln!(out, "signed in as {user} ({role})")?;
                return Ok(());
            }
            ShellCommand::SignOut => {
                self.session.sign_out();
                writeln!(out, "signed out")?;
                return Ok(());
            }
            ShellCommand::Debug => {
                let info = self.handle.debug_info();
                writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?;
                return Ok(());
            }
            ShellCommand::Routes => {
                for path in self.handle.debug_info().available_routes {
                    writeln!(out, "{path}")?;
                }
                return Ok(());
            }
        }
        self.settle_and_print(out).await
    }

    /// Stops accepting commands and waits for the scheduler to finish.
    pub async fn shutdown(self) -> Result<()> {
        let Self { handle, task, .. } = self;
        drop(handle);
        task.await.context("navigation scheduler panicked")
    }

    async fn settle_and_print<W: Write>(&self, out: &mut W) -> Result<()> {
        let snapshot = tokio::time::timeout(SETTLE_TIMEOUT, self.handle.wait_until_settled())
            .await
            .context("navigation did not settle")?;

        for event in self.presenter.drain_events() {
            writeln!(out, "{event}")?;
        }
        let (path, _) = Location::parse(&self.handle.location());
        writeln!(
            out,
            "== {} (location {path}, passes {}) ==",
            snapshot.current_route.as_deref().unwrap_or("-"),
            snapshot.passes
        )?;
        let region = self.handle.content();
        writeln!(out, "{}", region.markup)?;
        for overlay in &region.overlays {
            writeln!(out, "-- overlay {} --", overlay.id)?;
            writeln!(out, "{}", overlay.markup)?;
        }
        Ok(())
    }
}
