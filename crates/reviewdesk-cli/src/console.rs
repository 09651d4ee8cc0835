//! `console.yaml`: router settings, the console identity, translations and
//! the config-driven pages.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use reviewdesk_router::RouterConfig;
use reviewdesk_schema::{Overlay, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleFile {
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub session: SessionSpec,
    /// `data-i18n` key to display text.
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSpec {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    pub path: String,
    pub title: String,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub allowed_roles: Option<Vec<Role>>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
    /// The page reports unsaved edits, so leaving it asks for confirmation.
    #[serde(default)]
    pub unsaved_changes: bool,
    /// Render fails with this message.
    #[serde(default)]
    pub fail_render: Option<String>,
}

pub fn load_console(path: &Path) -> Result<ConsoleFile> {
    let console: ConsoleFile = read_yaml_file(path)?;
    validate_console(&console)?;
    Ok(console)
}

pub fn validate_console(console: &ConsoleFile) -> Result<()> {
    let mut seen = HashSet::new();
    for route in &console.routes {
        if !route.path.starts_with('/') {
            return Err(anyhow!("route path must start with '/': {}", route.path));
        }
        if !seen.insert(route.path.as_str()) {
            return Err(anyhow!("duplicate route path: {}", route.path));
        }
        if matches!(&route.allowed_roles, Some(roles) if roles.is_empty()) {
            return Err(anyhow!("allowed_roles is empty for route: {}", route.path));
        }
    }

    if !seen.contains(console.router.login_path.as_str()) {
        return Err(anyhow!(
            "login_path is not a registered route: {}",
            console.router.login_path
        ));
    }

    if console.session.authenticated && console.session.role.is_none() {
        return Err(anyhow!("authenticated session requires a role"));
    }

    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read console file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}
