use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reviewdesk_router::{Page, QueryParams, RouteDescriptor, ViewContent};
use tracing::debug;

use crate::console::RouteSpec;

/// A page whose markup, overlays and behaviour all come from `console.yaml`.
pub struct TemplatePage {
    spec: RouteSpec,
    params: QueryParams,
}

impl TemplatePage {
    pub fn new(spec: RouteSpec) -> Self {
        Self {
            spec,
            params: QueryParams::new(),
        }
    }
}

#[async_trait]
impl Page for TemplatePage {
    async fn render(&mut self) -> Result<ViewContent> {
        if let Some(message) = &self.spec.fail_render {
            return Err(anyhow!("{message}"));
        }
        Ok(ViewContent {
            markup: self.spec.body.clone(),
            overlays: self.spec.overlays.clone(),
        })
    }

    async fn init(&mut self, params: &QueryParams) -> Result<()> {
        debug!(path = %self.spec.path, ?params, "template page initialized");
        self.params = params.clone();
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        debug!(path = %self.spec.path, params = self.params.len(), "template page cleaned up");
        Ok(())
    }

    fn has_unsaved_changes(&self) -> bool {
        self.spec.unsaved_changes
    }
}

pub fn route_descriptor(spec: &RouteSpec) -> RouteDescriptor {
    let template = spec.clone();
    let mut descriptor = RouteDescriptor::new(&spec.path, &spec.title, move || {
        Ok(Box::new(TemplatePage::new(template.clone())) as Box<dyn Page>)
    });
    if spec.auth_required {
        descriptor = descriptor.require_auth();
    }
    if let Some(roles) = &spec.allowed_roles {
        descriptor = descriptor.allow_roles(roles.iter().copied());
    }
    descriptor
}
