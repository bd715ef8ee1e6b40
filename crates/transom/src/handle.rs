//! Render surfaces. A [`ComponentHandle`] is the cloneable parent-side
//! face of one component definition; every `render` call produces a fresh
//! [`RenderHandle`] bound to one live instance.

use std::sync::Arc;

use tokio::sync::broadcast;

use transom_component::ComponentRef;
use transom_core::lifecycle::{LifecycleEvent, RenderState};
use transom_core::types::{CloseReason, RenderContext};
use transom_core::Result;
use transom_parent::{
    can_render_to, ElementLocator, ParentInstance, ParentServices, RenderRequest,
};
use transom_props::PropBag;
use transom_transport::WindowHandle;

use crate::adapter::HostAdapter;

#[derive(Clone)]
pub struct ComponentHandle {
    component: ComponentRef,
    services: ParentServices,
}

impl ComponentHandle {
    pub(crate) fn new(component: ComponentRef, services: ParentServices) -> Self {
        Self {
            component,
            services,
        }
    }

    pub fn tag(&self) -> &str {
        self.component.tag()
    }

    /// Renders in the component's default context with no target element.
    /// Contexts that require a container will refuse this.
    pub async fn render(&self, props: PropBag) -> Result<RenderHandle> {
        self.render_with(RenderRequest::new(props)).await
    }

    /// Renders into an element of the current page.
    pub async fn render_to(
        &self,
        target: impl Into<ElementLocator>,
        props: PropBag,
    ) -> Result<RenderHandle> {
        let mut request = RenderRequest::new(props);
        request.target = Some(target.into());
        self.render_with(request).await
    }

    /// Full-control render. Callers set context, target, and delegation on
    /// the request themselves. Resolves once the child has entered and the
    /// `on_rendered` callback has fired.
    pub async fn render_with(&self, request: RenderRequest) -> Result<RenderHandle> {
        let instance = ParentInstance::new(self.component.clone(), self.services.clone());
        instance.render(request).await?;
        Ok(RenderHandle { instance })
    }

    /// Renders into an element produced by a host framework adapter. The
    /// adapter is told to unmount once the render is destroyed, or right
    /// away if the render fails.
    pub async fn render_mounted(
        &self,
        adapter: Arc<dyn HostAdapter>,
        props: PropBag,
    ) -> Result<RenderHandle> {
        let element = adapter.mount(self, &props).await?;
        tracing::debug!(tag = %self.tag(), framework = adapter.framework(), "mounted");
        let handle = match self
            .render_to(ElementLocator::Handle(element.clone()), props)
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                adapter.unmount(element).await;
                return Err(err);
            }
        };

        let instance = handle.instance.clone();
        let mut events = instance.events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LifecycleEvent::StateChanged {
                        state: RenderState::Destroyed,
                        ..
                    })
                    | Err(broadcast::error::RecvError::Closed) => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if instance.state() == RenderState::Destroyed {
                            break;
                        }
                    }
                }
            }
            adapter.unmount(element).await;
        });
        Ok(handle)
    }

    /// Probes whether `window` hosts a delegate willing to render this
    /// component.
    pub async fn can_render_to(&self, window: &WindowHandle) -> bool {
        can_render_to(
            &self.services.bus,
            &self.component,
            window,
            self.services.options.delegate_timeout,
        )
        .await
    }
}

/// One live render. Dropping the handle does not close it; the instance
/// stays registered until closed, destroyed, or drained by `destroy_all`.
#[derive(Clone)]
pub struct RenderHandle {
    instance: Arc<ParentInstance>,
}

impl std::fmt::Debug for RenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderHandle")
            .field("uid", &self.instance.uid())
            .finish_non_exhaustive()
    }
}

impl RenderHandle {
    pub fn uid(&self) -> &str {
        self.instance.uid()
    }

    pub fn state(&self) -> RenderState {
        self.instance.state()
    }

    pub fn context(&self) -> RenderContext {
        self.instance.context()
    }

    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.instance.events()
    }

    pub async fn update_props(&self, partial: PropBag) -> Result<()> {
        self.instance.update_props(partial).await
    }

    pub async fn close(&self) -> Result<()> {
        self.instance.close(CloseReason::ParentCall).await
    }

    pub async fn focus(&self) -> Result<()> {
        self.instance.focus().await
    }

    pub async fn resize(&self, width: Option<f64>, height: Option<f64>) -> Result<()> {
        self.instance.resize(width, height).await
    }

    pub async fn show(&self) -> Result<()> {
        self.instance.show().await
    }

    pub async fn hide(&self) -> Result<()> {
        self.instance.hide().await
    }

    /// The controller underneath, for event subscriptions or delegation
    /// plumbing the handle does not wrap.
    pub fn instance(&self) -> &Arc<ParentInstance> {
        &self.instance
    }
}
