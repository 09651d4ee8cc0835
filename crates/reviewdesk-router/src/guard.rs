//! Authentication and permission guards.
//!
//! Guards only decide. The scheduler performs the redirect as a deferred
//! location change so a guard never re-enters routing.

use std::collections::HashSet;

use reviewdesk_schema::Role;

use crate::config::RouterConfig;
use crate::page::Session;
use crate::route_table::RouteDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    Redirect {
        to: String,
        message: Option<String>,
    },
}

impl GuardOutcome {
    fn redirect(to: &str) -> Self {
        Self::Redirect {
            to: to.to_string(),
            message: None,
        }
    }
}

/// Anonymous callers cannot enter protected routes; signed-in callers are
/// sent home from public routes unless they are inside the registration flow.
pub fn check_authentication(
    route: &RouteDescriptor,
    is_authenticated: bool,
    config: &RouterConfig,
) -> GuardOutcome {
    if route.auth_required() && !is_authenticated {
        return GuardOutcome::redirect(&config.login_path);
    }
    if !route.auth_required() && is_authenticated && !config.is_registration_path(route.path()) {
        return GuardOutcome::redirect(&config.home_path);
    }
    GuardOutcome::Proceed
}

pub fn check_permissions<F>(route: &RouteDescriptor, has_any_role: F, config: &RouterConfig) -> GuardOutcome
where
    F: Fn(&HashSet<Role>) -> bool,
{
    match route.allowed_roles() {
        Some(roles) if !has_any_role(roles) => GuardOutcome::Redirect {
            to: config.home_path.clone(),
            message: Some(config.permission_denied_message.clone()),
        },
        _ => GuardOutcome::Proceed,
    }
}

/// Authentication first, then permissions.
pub fn evaluate_guards(
    route: &RouteDescriptor,
    session: &dyn Session,
    config: &RouterConfig,
) -> GuardOutcome {
    match check_authentication(route, session.is_authenticated(), config) {
        GuardOutcome::Proceed => check_permissions(route, |roles| session.has_any_role(roles), config),
        redirect => redirect,
    }
}
