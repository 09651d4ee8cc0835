use thiserror::Error;

/// Ways a navigation pass can end without mounting the requested page.
///
/// `Cancelled` and `PageCannotBeLeft` are absorbed by the scheduler; every
/// other variant is rendered through the error presenter.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("navigation cancelled: unsaved changes were kept")]
    Cancelled,
    #[error("the current page cannot be left")]
    PageCannotBeLeft,
    #[error("page failed to mount: {0}")]
    MountFailure(#[source] anyhow::Error),
    #[error("no route matches {0} and no fallback route is registered")]
    MissingFallback(String),
    #[error("navigation redirected {0} times in a row")]
    TooManyRedirects(usize),
}

impl NavigationError {
    /// True for outcomes that leave the current page in place without an error view.
    pub fn is_veto(&self) -> bool {
        matches!(self, Self::Cancelled | Self::PageCannotBeLeft)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("route path must be non-empty and start with '/': {0:?}")]
    InvalidPath(String),
}
