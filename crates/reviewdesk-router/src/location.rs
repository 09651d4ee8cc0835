//! The live `#/<path>?<query>` fragment that drives routing.

use std::sync::RwLock;

use reviewdesk_schema::QueryParams;
use url::form_urlencoded;

/// Shared, mutable URL fragment.
///
/// The handle writes it, the scheduler reads it at the start of every pass.
/// Queued navigation requests never carry a target of their own, so whatever
/// is stored here when a pass starts is what gets routed.
#[derive(Debug, Default)]
pub struct Location {
    fragment: RwLock<String>,
}

impl Location {
    pub fn new(fragment: &str) -> Self {
        Self {
            fragment: RwLock::new(normalize_fragment(fragment)),
        }
    }

    pub fn fragment(&self) -> String {
        self.fragment
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Stores a new fragment. Returns `true` when the value actually changed,
    /// which is when a browser would fire `hashchange`.
    pub fn set_fragment(&self, fragment: &str) -> bool {
        let next = normalize_fragment(fragment);
        let mut current = self.fragment.write().unwrap_or_else(|e| e.into_inner());
        if *current == next {
            return false;
        }
        *current = next;
        true
    }

    /// Path and query of the fragment as it is right now.
    pub fn resolve(&self) -> (String, QueryParams) {
        Self::parse(&self.fragment())
    }

    pub fn parse(fragment: &str) -> (String, QueryParams) {
        let raw = fragment.trim().trim_start_matches('#');
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, query),
            None => (raw, ""),
        };

        let params = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect::<QueryParams>();
        (normalize_path(path), params)
    }

    pub fn fragment_for(path: &str, params: &QueryParams) -> String {
        let path = normalize_path(path);
        if params.is_empty() {
            return format!("#{path}");
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        format!("#{path}?{query}")
    }
}

fn normalize_fragment(fragment: &str) -> String {
    let trimmed = fragment.trim();
    if trimmed.starts_with('#') {
        trimmed.to_string()
    } else {
        format!("#{trimmed}")
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.trim();
    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}
