//! Page capability trait and the shell collaborators the router consumes.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use reviewdesk_schema::{Notification, QueryParams, Role, ViewContent};
use tokio::sync::{mpsc, oneshot};

use crate::lifecycle::ContentRegion;

/// One screen of the console.
///
/// `render` and `init` may suspend (they usually load data). The remaining
/// methods have permissive defaults so simple pages only implement the two
/// required ones.
#[async_trait]
pub trait Page: Send {
    async fn render(&mut self) -> Result<ViewContent>;

    async fn init(&mut self, params: &QueryParams) -> Result<()>;

    /// Release page resources. Errors are logged and ignored by the router.
    async fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn has_unsaved_changes(&self) -> bool {
        false
    }

    fn can_leave(&self) -> bool {
        true
    }
}

/// Builds a fresh page instance for a route.
pub type PageFactory = Arc<dyn Fn() -> Result<Box<dyn Page>> + Send + Sync>;

/// Identity and authorization state of the caller.
pub trait Session: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn current_role(&self) -> Option<Role>;

    /// Display identity for diagnostics (e.g. an email address).
    fn identity(&self) -> Option<String> {
        None
    }

    fn has_any_role(&self, roles: &HashSet<Role>) -> bool {
        self.current_role()
            .map(|role| roles.contains(&role))
            .unwrap_or(false)
    }
}

/// Presentation hooks of the application shell.
pub trait Presenter: Send + Sync {
    fn apply_translations(&self, region: &mut ContentRegion);

    fn enhance_accessibility(&self, _region: &mut ContentRegion) {}

    fn notify(&self, notification: Notification);

    fn set_title(&self, title: &str);
}

/// Asks the user whether unsaved edits may be discarded.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm_discard(&self, message: &str) -> bool;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmation(pub bool);

#[async_trait]
impl Confirmation for StaticConfirmation {
    async fn confirm_discard(&self, _message: &str) -> bool {
        self.0
    }
}

/// A pending discard prompt waiting for the UI to answer.
#[derive(Debug)]
pub struct ConfirmRequest {
    pub message: String,
    reply: oneshot::Sender<bool>,
}

impl ConfirmRequest {
    pub fn respond(self, discard: bool) {
        let _ = self.reply.send(discard);
    }
}

/// Forwards prompts to whatever UI task owns the receiver.
///
/// A closed channel or a dropped request counts as "keep my changes".
#[derive(Debug, Clone)]
pub struct ChannelConfirmation {
    tx: mpsc::Sender<ConfirmRequest>,
}

impl ChannelConfirmation {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ConfirmRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Confirmation for ChannelConfirmation {
    async fn confirm_discard(&self, message: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let request = ConfirmRequest {
            message: message.to_string(),
            reply,
        };
        if self.tx.send(request).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
struct Identity {
    user: Option<String>,
    role: Option<Role>,
}

/// In-process session whose identity can change at runtime (sign in / out).
#[derive(Debug, Default)]
pub struct LocalSession {
    identity: RwLock<Identity>,
}

impl LocalSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: impl Into<String>, role: Role) -> Self {
        let session = Self::default();
        session.sign_in(user, role);
        session
    }

    pub fn sign_in(&self, user: impl Into<String>, role: Role) {
        let mut identity = self.identity.write().unwrap_or_else(|e| e.into_inner());
        identity.user = Some(user.into());
        identity.role = Some(role);
    }

    pub fn sign_out(&self) {
        let mut identity = self.identity.write().unwrap_or_else(|e| e.into_inner());
        *identity = Identity::default();
    }

    fn snapshot(&self) -> Identity {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Session for LocalSession {
    fn is_authenticated(&self) -> bool {
        self.snapshot().user.is_some()
    }

    fn current_role(&self) -> Option<Role> {
        self.snapshot().role
    }

    fn identity(&self) -> Option<String> {
        self.snapshot().user
    }
}
