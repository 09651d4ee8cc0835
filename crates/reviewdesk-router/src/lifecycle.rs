//! Ownership of the mounted page and of the content region it renders into.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use reviewdesk_schema::{Overlay, QueryParams, ViewContent};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::NavigationError;
use crate::page::{Confirmation, Page, Presenter};
use crate::route_table::RouteDescriptor;

pub const DISCARD_PROMPT: &str = "You have unsaved changes. Leave this page and discard them?";

/// The single visual slot pages render into, plus overlays they opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentRegion {
    pub markup: String,
    pub overlays: Vec<Overlay>,
}

impl ContentRegion {
    pub fn is_empty(&self) -> bool {
        self.markup.is_empty() && self.overlays.is_empty()
    }

    fn replace(&mut self, view: ViewContent) {
        self.markup = view.markup;
        self.overlays = view.overlays;
    }

    fn clear(&mut self) {
        self.markup.clear();
        self.overlays.clear();
    }
}

/// Tears down the current page and mounts the next one.
///
/// At most one page exists at any time: the old page is dropped before the
/// factory of the next route runs. Observers receive region snapshots through
/// [`PageLifecycleManager::subscribe`] but never mutate the region.
pub struct PageLifecycleManager {
    current: Option<Box<dyn Page>>,
    generation: u64,
    region: ContentRegion,
    region_tx: watch::Sender<ContentRegion>,
    confirmation: Arc<dyn Confirmation>,
    presenter: Arc<dyn Presenter>,
    mount_timeout: Option<Duration>,
}

impl PageLifecycleManager {
    pub fn new(
        confirmation: Arc<dyn Confirmation>,
        presenter: Arc<dyn Presenter>,
        mount_timeout: Option<Duration>,
    ) -> Self {
        let (region_tx, _) = watch::channel(ContentRegion::default());
        Self {
            current: None,
            generation: 0,
            region: ContentRegion::default(),
            region_tx,
            confirmation,
            presenter,
            mount_timeout,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ContentRegion> {
        self.region_tx.subscribe()
    }

    pub fn region(&self) -> &ContentRegion {
        &self.region
    }

    /// Identifier of the mounted page instance, bumped on every instantiation.
    pub fn mounted_page(&self) -> Option<u64> {
        self.current.as_ref().map(|_| self.generation)
    }

    /// Retires the current page.
    ///
    /// Both vetoes (declined discard, `can_leave() == false`) are evaluated
    /// before anything irreversible happens, so a vetoed teardown leaves the
    /// page and its content exactly as they were.
    pub async fn teardown(&mut self) -> Result<(), NavigationError> {
        let Some(page) = self.current.as_mut() else {
            return Ok(());
        };

        if page.has_unsaved_changes() && !self.confirmation.confirm_discard(DISCARD_PROMPT).await {
            debug!("discard declined, keeping current page");
            return Err(NavigationError::Cancelled);
        }
        if !page.can_leave() {
            debug!("current page refused to be left");
            return Err(NavigationError::PageCannotBeLeft);
        }
        if let Err(err) = page.cleanup().await {
            warn!(error = %err, "page cleanup failed, continuing teardown");
        }

        self.current = None;
        self.region.clear();
        self.publish();
        Ok(())
    }

    /// Instantiates, renders and initializes the page for `route`.
    pub async fn mount(
        &mut self,
        route: &RouteDescriptor,
        params: &QueryParams,
    ) -> Result<(), NavigationError> {
        let page = route.instantiate().map_err(NavigationError::MountFailure)?;
        self.generation += 1;
        let timeout = self.mount_timeout;
        let page = self.current.insert(page);

        let view = bounded(timeout, "render", page.render()).await?;
        self.region.replace(view);
        self.region_tx.send_replace(self.region.clone());

        bounded(timeout, "init", page.init(params)).await?;
        self.presenter.apply_translations(&mut self.region);
        self.presenter.enhance_accessibility(&mut self.region);
        self.publish();
        debug!(route = route.path(), generation = self.generation, "page mounted");
        Ok(())
    }

    /// Replaces the whole region with a failure view.
    pub fn show_error(&mut self, view: ViewContent) {
        self.region.replace(view);
        self.presenter.apply_translations(&mut self.region);
        self.publish();
    }

    fn publish(&self) {
        self.region_tx.send_replace(self.region.clone());
    }
}

async fn bounded<T, F>(timeout: Option<Duration>, stage: &str, fut: F) -> Result<T, NavigationError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("{stage} timed out after {}ms", limit.as_millis())),
        },
        None => fut.await,
    };
    result.map_err(NavigationError::MountFailure)
}
