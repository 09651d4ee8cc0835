//! Client-side navigation and page-lifecycle controller for the review console.
//!
//! Navigation triggers enter the [`NavigationScheduler`], which serializes them
//! into one active pass plus a pending queue. Each pass resolves the live
//! [`Location`], tears down the current page through the
//! [`PageLifecycleManager`], runs the guard chain against the [`RouteTable`]
//! entry and mounts the next page. Failures end up in the [`ErrorPresenter`].

pub mod config;
pub mod error;
pub mod error_view;
pub mod guard;
pub mod lifecycle;
pub mod location;
pub mod page;
pub mod route_table;
pub mod scheduler;

pub use config::*;
pub use error::*;
pub use error_view::*;
pub use guard::*;
pub use lifecycle::*;
pub use location::*;
pub use page::*;
pub use route_table::*;
pub use scheduler::*;

pub use reviewdesk_schema::{Notification, NotificationLevel, Overlay, QueryParams, Role, ViewContent};
