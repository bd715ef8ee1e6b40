//! One window's entry point. A runtime binds that window's capabilities to
//! a component registry: the parent document creates components and renders
//! them, a child document attaches to the component its window was opened
//! for, and `destroy_all` tears down whatever is still up.

use std::sync::Arc;

use transom_child::ChildInstance;
use transom_component::{ActiveInstances, Component, ComponentOptions, ComponentRegistry};
use transom_core::errors::ChildError;
use transom_core::handshake::{decode_window_name, is_payload_name};
use transom_core::{Result, RuntimeOptions, TransomError};
use transom_parent::ParentServices;
use transom_transport::{BusRef, PageRef, SharedScope};

use crate::handle::ComponentHandle;

#[derive(Clone)]
pub struct Runtime {
    page: PageRef,
    bus: BusRef,
    scope: SharedScope,
    registry: ComponentRegistry,
    active: ActiveInstances,
    options: RuntimeOptions,
}

impl Runtime {
    pub fn new(page: PageRef, bus: BusRef, scope: SharedScope) -> Self {
        Self::with_options(page, bus, scope, RuntimeOptions::default())
    }

    pub fn with_options(
        page: PageRef,
        bus: BusRef,
        scope: SharedScope,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            page,
            bus,
            scope,
            registry: ComponentRegistry::new(),
            active: ActiveInstances::new(),
            options,
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Validates and registers a component definition. Definition problems
    /// (bad tag, missing url, duplicate tag, a required prop with a
    /// default) fail here, before anything renders.
    pub async fn create(&self, options: ComponentOptions) -> Result<ComponentHandle> {
        let component = Arc::new(Component::new(options)?);
        self.registry.register(component.clone()).await?;
        tracing::info!(tag = %component.tag(), "component created");
        Ok(ComponentHandle::new(component, self.services()))
    }

    /// True when this window's name carries a handshake payload, meaning a
    /// parent opened it for a component render.
    pub async fn is_child(&self) -> bool {
        match self.page.window().name().await {
            Ok(name) => is_payload_name(&name),
            Err(_) => false,
        }
    }

    /// Attaches the child side of a render. The window name carries the
    /// tag; the same component must have been `create`d in this window.
    pub async fn attach(&self) -> Result<Arc<ChildInstance>> {
        let name = self.page.window().name().await?;
        if !is_payload_name(&name) {
            return Err(ChildError::NotAChildWindow.into());
        }
        let payload = decode_window_name(&name)?;
        let component = self.registry.get(&payload.tag).await.ok_or_else(|| {
            TransomError::other(format!("no component created for tag '{}'", payload.tag))
        })?;
        ChildInstance::attach(
            component,
            self.page.clone(),
            self.bus.clone(),
            self.options.clone(),
        )
        .await
    }

    /// Destroys every live render this runtime started.
    pub async fn destroy_all(&self) -> Result<()> {
        self.active.destroy_all().await
    }

    fn services(&self) -> ParentServices {
        ParentServices {
            page: self.page.clone(),
            bus: self.bus.clone(),
            scope: self.scope.clone(),
            active: self.active.clone(),
            options: self.options.clone(),
        }
    }
}
