//! Per-context render policy. The drivers decide what "open", "close",
//! "resize" and prerendering mean for an iframe versus a popup; the
//! mechanics live in [`crate::surface`].

use async_trait::async_trait;
use std::sync::Arc;

use transom_component::ComponentRef;
use transom_core::errors::RenderError;
use transom_core::types::RenderContext;
use transom_core::Result;
use transom_transport::{PageRef, PopupOptions, WindowHandle};

use crate::surface::{OpKind, RenderSurface};

/// Everything a driver needs for one operation.
pub struct DriverCtx<'a> {
    pub page: &'a PageRef,
    pub surface: &'a RenderSurface,
    pub component: &'a ComponentRef,
}

#[async_trait]
pub trait ContextDriver: Send + Sync {
    fn context(&self) -> RenderContext;

    /// Whether the child lives inside the container (and therefore a
    /// container must exist before `open`).
    fn renders_into_container(&self) -> bool;

    /// Whether closing goes through the child (windows the parent can not
    /// reliably close from outside).
    fn call_child_to_close(&self) -> bool;

    /// Operations a delegate host performs for this context.
    fn delegated_ops(&self) -> &'static [OpKind];

    /// Opens the child window. `None` means a delegate host opened it and
    /// keeps the handle.
    async fn open(&self, ctx: &DriverCtx<'_>) -> Result<Option<WindowHandle>>;

    async fn resize(&self, ctx: &DriverCtx<'_>, width: Option<f64>, height: Option<f64>)
        -> Result<()>;

    async fn show(&self, ctx: &DriverCtx<'_>) -> Result<()>;

    async fn hide(&self, ctx: &DriverCtx<'_>) -> Result<()>;

    /// Closes the child window itself (the container teardown is separate).
    async fn close_window(&self, ctx: &DriverCtx<'_>) -> Result<()>;
}

pub fn driver_for(context: RenderContext) -> Arc<dyn ContextDriver> {
    match context {
        RenderContext::Iframe => Arc::new(IframeDriver),
        RenderContext::Popup => Arc::new(PopupDriver),
    }
}

pub struct IframeDriver;

const IFRAME_DELEGATED_OPS: &[OpKind] = &[
    OpKind::OpenContainer,
    OpKind::Open,
    OpKind::OpenPrerender,
    OpKind::ReleasePrerender,
    OpKind::SetWindowName,
    OpKind::LoadUrl,
    OpKind::Show,
    OpKind::Hide,
    OpKind::Resize,
    OpKind::DestroyContainer,
];

#[async_trait]
impl ContextDriver for IframeDriver {
    fn context(&self) -> RenderContext {
        RenderContext::Iframe
    }

    fn renders_into_container(&self) -> bool {
        true
    }

    fn call_child_to_close(&self) -> bool {
        false
    }

    fn delegated_ops(&self) -> &'static [OpKind] {
        IFRAME_DELEGATED_OPS
    }

    async fn open(&self, ctx: &DriverCtx<'_>) -> Result<Option<WindowHandle>> {
        ctx.surface.open_window().await
    }

    async fn resize(
        &self,
        ctx: &DriverCtx<'_>,
        width: Option<f64>,
        height: Option<f64>,
    ) -> Result<()> {
        ctx.surface.resize(width, height).await
    }

    async fn show(&self, ctx: &DriverCtx<'_>) -> Result<()> {
        ctx.surface.show().await
    }

    async fn hide(&self, ctx: &DriverCtx<'_>) -> Result<()> {
        ctx.surface.hide().await
    }

    async fn close_window(&self, ctx: &DriverCtx<'_>) -> Result<()> {
        // Tearing the container down removes the frame and closes the
        // hosted window, locally or on the delegate host.
        ctx.surface.destroy_container().await?;
        if let Some(window) = ctx.surface.window() {
            if let Err(err) = window.close().await {
                tracing::debug!(error = %err, "frame window close after container teardown");
            }
        }
        Ok(())
    }
}

pub struct PopupDriver;

// Popups are opened by the requester itself; a host window never gets the
// user-gesture permission to do it. Only the overlay container and its
// visibility cross.
const POPUP_DELEGATED_OPS: &[OpKind] = &[
    OpKind::OpenContainer,
    OpKind::Show,
    OpKind::Hide,
    OpKind::DestroyContainer,
];

#[async_trait]
impl ContextDriver for PopupDriver {
    fn context(&self) -> RenderContext {
        RenderContext::Popup
    }

    fn renders_into_container(&self) -> bool {
        false
    }

    fn call_child_to_close(&self) -> bool {
        true
    }

    fn delegated_ops(&self) -> &'static [OpKind] {
        POPUP_DELEGATED_OPS
    }

    async fn open(&self, ctx: &DriverCtx<'_>) -> Result<Option<WindowHandle>> {
        let (screen_width, screen_height) = ctx.page.screen_size().await;
        let width = ctx.component.dimensions.width.to_pixels(screen_width);
        let height = ctx.component.dimensions.height.to_pixels(screen_height);

        let mut attributes = ctx.component.attributes.popup.clone();
        let left = ((screen_width - width) / 2.0).max(0.0);
        let top = ((screen_height - height) / 2.0).max(0.0);
        attributes.insert("left".to_string(), format!("{left}"));
        attributes.insert("top".to_string(), format!("{top}"));

        let window = ctx
            .page
            .open_popup(&PopupOptions {
                width,
                height,
                attributes,
            })
            .await?;
        // Some blockers hand back a window and close it immediately.
        if window.is_closed().await {
            return Err(RenderError::PopupBlocked.into());
        }
        ctx.surface.adopt_window(window.clone());
        Ok(Some(window))
    }

    async fn resize(
        &self,
        _ctx: &DriverCtx<'_>,
        width: Option<f64>,
        height: Option<f64>,
    ) -> Result<()> {
        tracing::debug!(?width, ?height, "resize is a no-op for popups");
        Ok(())
    }

    async fn show(&self, _ctx: &DriverCtx<'_>) -> Result<()> {
        Err(RenderError::UnsupportedOperation {
            op: "show".to_string(),
            context: RenderContext::Popup,
        }
        .into())
    }

    async fn hide(&self, _ctx: &DriverCtx<'_>) -> Result<()> {
        Err(RenderError::UnsupportedOperation {
            op: "hide".to_string(),
            context: RenderContext::Popup,
        }
        .into())
    }

    async fn close_window(&self, ctx: &DriverCtx<'_>) -> Result<()> {
        ctx.surface.destroy_container().await?;
        if let Some(window) = ctx.surface.window() {
            window.close().await?;
        }
        Ok(())
    }
}
