use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Query parameters parsed from the `?...` part of a route fragment.
pub type QueryParams = BTreeMap<String, String>;

/// Console roles known to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    Admin,
    Evaluator,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::Admin => "admin",
            Self::Evaluator => "evaluator",
            Self::Worker => "worker",
        }
    }

    /// Only developers get diagnostic detail on failure views.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Developer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "developer" => Ok(Self::Developer),
            "admin" => Ok(Self::Admin),
            "evaluator" => Ok(Self::Evaluator),
            "worker" => Ok(Self::Worker),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A transient layer (modal, popover) opened on top of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    pub id: String,
    pub markup: String,
}

/// Output of a page render, spliced into the content region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewContent {
    pub markup: String,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
}

impl ViewContent {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            overlays: Vec::new(),
        }
    }

    pub fn with_overlay(mut self, id: impl Into<String>, markup: impl Into<String>) -> Self {
        self.overlays.push(Overlay {
            id: id.into(),
            markup: markup.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A transient user-facing message (toast) raised by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }
}
