use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use reviewdesk_schema::Role;

use crate::error::RouteTableError;
use crate::page::{Page, PageFactory};

/// Static metadata for one navigable path.
///
/// Declaring allowed roles always implies `auth_required`, since a role check
/// presupposes an identity.
#[derive(Clone)]
pub struct RouteDescriptor {
    path: String,
    title: String,
    factory: PageFactory,
    auth_required: bool,
    allowed_roles: Option<HashSet<Role>>,
}

impl std::fmt::Debug for RouteDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteDescriptor")
            .field("path", &self.path)
            .field("title", &self.title)
            .field("auth_required", &self.auth_required)
            .field("allowed_roles", &self.allowed_roles)
            .finish_non_exhaustive()
    }
}

impl RouteDescriptor {
    pub fn new<F>(path: impl Into<String>, title: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Page>> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            title: title.into(),
            factory: Arc::new(factory),
            auth_required: false,
            allowed_roles: None,
        }
    }

    pub fn require_auth(mut self) -> Self {
        self.auth_required = true;
        self
    }

    pub fn allow_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = Some(roles.into_iter().collect());
        self.auth_required = true;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    pub fn allowed_roles(&self) -> Option<&HashSet<Role>> {
        self.allowed_roles.as_ref()
    }

    pub fn instantiate(&self) -> Result<Box<dyn Page>> {
        (self.factory)()
    }
}

/// Registry of routes keyed by exact path.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<String, Arc<RouteDescriptor>>,
    fallback: String,
}

impl RouteTable {
    /// Creates an empty table whose unknown paths degrade to `fallback`.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            routes: HashMap::new(),
            fallback: fallback.into(),
        }
    }

    pub fn add(&mut self, descriptor: RouteDescriptor) -> Result<(), RouteTableError> {
        let path = descriptor.path();
        if path.is_empty() || !path.starts_with('/') {
            return Err(RouteTableError::InvalidPath(path.to_string()));
        }
        self.routes.insert(path.to_string(), Arc::new(descriptor));
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<Arc<RouteDescriptor>> {
        self.routes.remove(path)
    }

    /// Exact match, else the fallback descriptor.
    ///
    /// Returns `None` only when the fallback itself is not registered.
    pub fn lookup(&self, path: &str) -> Option<Arc<RouteDescriptor>> {
        self.routes
            .get(path)
            .or_else(|| self.routes.get(&self.fallback))
            .cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
