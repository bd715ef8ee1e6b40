//! The DOM-facing half of a render. A [`LocalSurface`] owns the container,
//! frame and prerender state for renders into the parent's own document; a
//! [`RenderSurface`] routes each operation either to that local state or,
//! for delegated renders, over the bus to the host window that holds the
//! equivalent state there.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use transom_component::{ComponentRef, TemplateContext};
use transom_core::errors::{RenderError, RpcError, SecurityError};
use transom_core::types::{CssSize, RenderContext};
use transom_core::{Result, TransomError};
use transom_props::PropBag;
use transom_transport::{
    AttributeMap, BusRef, ElementRef, FrameHandle, PageRef, WindowHandle,
};

use crate::commands::SurfaceOp;

/// How the caller addressed the render target.
#[derive(Clone)]
pub enum ElementLocator {
    Selector(String),
    Handle(ElementRef),
}

impl ElementLocator {
    fn describe(&self) -> String {
        match self {
            Self::Selector(selector) => selector.clone(),
            Self::Handle(element) => element
                .selector()
                .map(str::to_string)
                .unwrap_or_else(|| element.id().to_string()),
        }
    }
}

impl From<&str> for ElementLocator {
    fn from(selector: &str) -> Self {
        Self::Selector(selector.to_string())
    }
}

impl From<String> for ElementLocator {
    fn from(selector: String) -> Self {
        Self::Selector(selector)
    }
}

impl From<ElementRef> for ElementLocator {
    fn from(element: ElementRef) -> Self {
        Self::Handle(element)
    }
}

/// Names for surface operations, used by the per-driver delegation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    OpenContainer,
    Open,
    OpenPrerender,
    ReleasePrerender,
    SetWindowName,
    LoadUrl,
    Show,
    Hide,
    Resize,
    DestroyContainer,
}

#[derive(Default)]
struct SurfaceState {
    target: Option<ElementRef>,
    container: Option<ElementRef>,
    frame: Option<FrameHandle>,
    prerender: Option<FrameHandle>,
    window: Option<WindowHandle>,
}

/// Container, frame and prerender state held in one browsing context. The
/// same type backs both direct renders and the host side of a delegated
/// render.
pub struct LocalSurface {
    page: PageRef,
    component: ComponentRef,
    uid: String,
    context: RenderContext,
    attributes: AttributeMap,
    props: PropBag,
    state: Mutex<SurfaceState>,
}

impl LocalSurface {
    pub fn new(
        page: PageRef,
        component: ComponentRef,
        uid: impl Into<String>,
        context: RenderContext,
        props: PropBag,
    ) -> Self {
        let attributes = match context {
            RenderContext::Iframe => component.attributes.iframe.clone(),
            RenderContext::Popup => component.attributes.popup.clone(),
        };
        Self {
            page,
            component,
            uid: uid.into(),
            context,
            attributes,
            props,
            state: Mutex::new(SurfaceState::default()),
        }
    }

    pub fn context(&self) -> RenderContext {
        self.context
    }

    /// Resolves the render target and builds the container under it via the
    /// component's template.
    pub async fn open_container(&self, locator: &ElementLocator) -> Result<ElementRef> {
        let target = match locator {
            ElementLocator::Handle(element) => element.clone(),
            ElementLocator::Selector(selector) => self
                .page
                .resolve_element(selector)
                .await
                .ok_or_else(|| RenderError::ContainerNotFound(selector.clone()))?,
        };
        let template = self.component.container_template.clone();
        let container = template(TemplateContext {
            page: self.page.clone(),
            uid: self.uid.clone(),
            tag: self.component.tag().to_string(),
            context: self.context,
            dimensions: self.component.dimensions,
            target: target.clone(),
            props: self.props.clone(),
        })
        .await?;

        tracing::debug!(uid = %self.uid, target = %locator.describe(), "container opened");
        let mut state = self.state.lock().unwrap();
        state.target = Some(target);
        state.container = Some(container.clone());
        Ok(container)
    }

    /// Opens the child frame inside the container, hidden until the
    /// prerender handoff.
    pub async fn open_frame(&self) -> Result<WindowHandle> {
        let container = self.container().ok_or_else(|| {
            TransomError::from(RenderError::ContainerRequired {
                tag: self.component.tag().to_string(),
                context: self.context,
            })
        })?;
        let frame = self.page.open_frame(&container, &self.attributes).await?;
        frame.element.set_visible(false).await;

        let window = frame.window.clone();
        let mut state = self.state.lock().unwrap();
        state.frame = Some(frame);
        state.window = Some(window.clone());
        Ok(window)
    }

    /// Takes ownership of a window somebody else opened (the `window` prop,
    /// or a popup the driver opened).
    pub fn adopt_window(&self, window: WindowHandle) {
        self.state.lock().unwrap().window = Some(window);
    }

    /// Puts template markup in front of the user while the child document
    /// loads. Frames get a dedicated same-origin sibling frame; popups are
    /// written directly while they are still blank.
    pub async fn open_prerender(&self, html: &str) -> Result<()> {
        match self.context {
            RenderContext::Iframe => {
                let container = match self.container() {
                    Some(container) => container,
                    None => return Ok(()),
                };
                let frame = self.page.open_frame(&container, &self.attributes).await?;
                self.page.write_document(&frame.window, html).await?;
                self.state.lock().unwrap().prerender = Some(frame);
                Ok(())
            }
            RenderContext::Popup => {
                let window = match self.window() {
                    Some(window) => window,
                    None => return Ok(()),
                };
                // A freshly opened popup is still same-origin; once it has
                // navigated the write is refused and we skip prerendering.
                if let Err(err) = self.page.write_document(&window, html).await {
                    tracing::debug!(error = %err, "skipping popup prerender");
                }
                Ok(())
            }
        }
    }

    /// Swaps the live child document in: the frame becomes visible and the
    /// prerender frame is torn down.
    pub async fn release_prerender(&self) -> Result<()> {
        let (frame, prerender) = {
            let mut state = self.state.lock().unwrap();
            (state.frame.clone(), state.prerender.take())
        };
        if let Some(frame) = frame {
            frame.element.set_visible(true).await;
        }
        if let Some(prerender) = prerender {
            prerender.element.remove().await;
        }
        Ok(())
    }

    pub async fn set_window_name(&self, name: &str) -> Result<()> {
        let window = self
            .window()
            .ok_or_else(|| TransomError::other("no child window is open"))?;
        window.set_name(name).await
    }

    pub async fn load_url(&self, url: &str) -> Result<()> {
        let window = self
            .window()
            .ok_or_else(|| TransomError::other("no child window is open"))?;
        window.load_url(url).await
    }

    pub async fn show(&self) -> Result<()> {
        if let Some(container) = self.container() {
            container.set_visible(true).await;
        }
        Ok(())
    }

    pub async fn hide(&self) -> Result<()> {
        if let Some(container) = self.container() {
            container.set_visible(false).await;
        }
        Ok(())
    }

    pub async fn resize(&self, width: Option<f64>, height: Option<f64>) -> Result<()> {
        if let Some(container) = self.container() {
            container
                .set_css_size(width.map(CssSize::Px), height.map(CssSize::Px))
                .await;
        }
        Ok(())
    }

    /// Removes the container subtree. Any frame inside it goes away with
    /// it, which closes the hosted child window.
    pub async fn destroy_container(&self) -> Result<()> {
        let container = {
            let mut state = self.state.lock().unwrap();
            state.frame = None;
            state.prerender = None;
            state.container.take()
        };
        if let Some(container) = container {
            container.remove().await;
        }
        Ok(())
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.state.lock().unwrap().window.clone()
    }

    pub fn container(&self) -> Option<ElementRef> {
        self.state.lock().unwrap().container.clone()
    }

    pub fn target(&self) -> Option<ElementRef> {
        self.state.lock().unwrap().target.clone()
    }

    pub fn frame_element(&self) -> Option<ElementRef> {
        self.state
            .lock()
            .unwrap()
            .frame
            .as_ref()
            .map(|frame| frame.element.clone())
    }
}

/// Bus client for a delegate host's surface listener.
pub struct RemoteSurface {
    bus: BusRef,
    host: WindowHandle,
    endpoint: String,
    timeout: Duration,
}

impl RemoteSurface {
    pub fn new(bus: BusRef, host: WindowHandle, endpoint: String, timeout: Duration) -> Self {
        Self {
            bus,
            host,
            endpoint,
            timeout,
        }
    }

    pub async fn invoke(&self, op: &SurfaceOp) -> Result<Value> {
        let payload = serde_json::to_value(op).map_err(RpcError::from)?;
        let call = self.bus.call(&self.host, &self.endpoint, payload);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(TransomError::from),
            Err(_) => Err(RpcError::Timeout(self.endpoint.clone()).into()),
        }
    }
}

/// Per-operation routing for one render: every operation goes to the local
/// state unless the render is delegated and the driver's table forwards
/// that operation to the host.
pub struct RenderSurface {
    local: LocalSurface,
    remote: Option<RemoteSurface>,
    delegated: &'static [OpKind],
}

impl RenderSurface {
    pub fn direct(local: LocalSurface) -> Self {
        Self {
            local,
            remote: None,
            delegated: &[],
        }
    }

    pub fn delegated(local: LocalSurface, remote: RemoteSurface, ops: &'static [OpKind]) -> Self {
        Self {
            local,
            remote: Some(remote),
            delegated: ops,
        }
    }

    pub fn is_delegated(&self, op: OpKind) -> bool {
        self.remote.is_some() && self.delegated.contains(&op)
    }

    fn remote(&self) -> &RemoteSurface {
        // Only reached behind is_delegated.
        self.remote.as_ref().unwrap()
    }

    pub fn context(&self) -> RenderContext {
        self.local.context()
    }

    pub async fn open_container(&self, locator: &ElementLocator) -> Result<()> {
        if self.is_delegated(OpKind::OpenContainer) {
            let selector = match locator {
                ElementLocator::Selector(selector) => selector.clone(),
                ElementLocator::Handle(_) => {
                    return Err(SecurityError::RemoteElementNotSelector.into())
                }
            };
            self.remote()
                .invoke(&SurfaceOp::OpenContainer { selector })
                .await?;
            Ok(())
        } else {
            self.local.open_container(locator).await.map(|_| ())
        }
    }

    /// Opens the child frame. Returns the handle only for local opens; a
    /// delegate host keeps the handle on its side and watches it there.
    pub async fn open_window(&self) -> Result<Option<WindowHandle>> {
        if self.is_delegated(OpKind::Open) {
            self.remote().invoke(&SurfaceOp::Open).await?;
            Ok(None)
        } else {
            self.local.open_frame().await.map(Some)
        }
    }

    pub async fn open_prerender(&self, html: &str) -> Result<()> {
        if self.is_delegated(OpKind::OpenPrerender) {
            self.remote()
                .invoke(&SurfaceOp::OpenPrerender {
                    html: html.to_string(),
                })
                .await?;
            Ok(())
        } else {
            self.local.open_prerender(html).await
        }
    }

    pub async fn release_prerender(&self) -> Result<()> {
        if self.is_delegated(OpKind::ReleasePrerender) {
            self.remote().invoke(&SurfaceOp::ReleasePrerender).await?;
            Ok(())
        } else {
            self.local.release_prerender().await
        }
    }

    pub async fn set_window_name(&self, name: &str) -> Result<()> {
        if self.is_delegated(OpKind::SetWindowName) {
            self.remote()
                .invoke(&SurfaceOp::SetWindowName {
                    name: name.to_string(),
                })
                .await?;
            Ok(())
        } else {
            self.local.set_window_name(name).await
        }
    }

    pub async fn load_url(&self, url: &str) -> Result<()> {
        if self.is_delegated(OpKind::LoadUrl) {
            self.remote()
                .invoke(&SurfaceOp::LoadUrl {
                    url: url.to_string(),
                })
                .await?;
            Ok(())
        } else {
            self.local.load_url(url).await
        }
    }

    pub async fn show(&self) -> Result<()> {
        if self.is_delegated(OpKind::Show) {
            self.remote().invoke(&SurfaceOp::Show).await?;
            Ok(())
        } else {
            self.local.show().await
        }
    }

    pub async fn hide(&self) -> Result<()> {
        if self.is_delegated(OpKind::Hide) {
            self.remote().invoke(&SurfaceOp::Hide).await?;
            Ok(())
        } else {
            self.local.hide().await
        }
    }

    pub async fn resize(&self, width: Option<f64>, height: Option<f64>) -> Result<()> {
        if self.is_delegated(OpKind::Resize) {
            self.remote()
                .invoke(&SurfaceOp::Resize { width, height })
                .await?;
            Ok(())
        } else {
            self.local.resize(width, height).await
        }
    }

    pub async fn destroy_container(&self) -> Result<()> {
        if self.is_delegated(OpKind::DestroyContainer) {
            self.remote().invoke(&SurfaceOp::DestroyContainer).await?;
            Ok(())
        } else {
            self.local.destroy_container().await
        }
    }

    /// Tells a delegate host to drop everything it holds for this render.
    /// No-op for direct renders.
    pub async fn destroy_remote(&self) -> Result<()> {
        if let Some(remote) = &self.remote {
            remote.invoke(&SurfaceOp::Destroy).await?;
        }
        Ok(())
    }

    pub fn adopt_window(&self, window: WindowHandle) {
        self.local.adopt_window(window);
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.local.window()
    }

    pub fn container(&self) -> Option<ElementRef> {
        self.local.container()
    }

    pub fn target(&self) -> Option<ElementRef> {
        self.local.target()
    }

    pub fn frame_element(&self) -> Option<ElementRef> {
        self.local.frame_element()
    }
}
