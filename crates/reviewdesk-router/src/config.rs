use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_home_path")]
    pub home_path: String,
    /// Paths an authenticated caller may still visit while signing up.
    #[serde(default = "default_registration_paths")]
    pub registration_paths: Vec<String>,
    #[serde(default = "default_permission_denied_message")]
    pub permission_denied_message: String,
    #[serde(default)]
    pub title_suffix: Option<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub mount_timeout_ms: Option<u64>,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            home_path: default_home_path(),
            registration_paths: default_registration_paths(),
            permission_denied_message: default_permission_denied_message(),
            title_suffix: None,
            debounce_ms: default_debounce_ms(),
            mount_timeout_ms: None,
            max_redirects: default_max_redirects(),
        }
    }
}

impl RouterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read router config: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse router config: {}", path.display()))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn mount_timeout(&self) -> Option<Duration> {
        self.mount_timeout_ms.map(Duration::from_millis)
    }

    pub fn is_registration_path(&self, path: &str) -> bool {
        self.registration_paths.iter().any(|p| p == path)
    }

    /// Document title for a route, with the optional application suffix.
    pub fn page_title(&self, title: &str) -> String {
        match &self.title_suffix {
            Some(suffix) if !suffix.is_empty() => format!("{title} - {suffix}"),
            _ => title.to_string(),
        }
    }
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_home_path() -> String {
    "/dashboard".to_string()
}

fn default_registration_paths() -> Vec<String> {
    [
        "/register",
        "/register/company",
        "/register/verify",
        "/register/complete",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_permission_denied_message() -> String {
    "You do not have permission to access this page.".to_string()
}

fn default_debounce_ms() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    5
}
