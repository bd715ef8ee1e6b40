//! Host-framework integration point. A UI framework embeds components by
//! implementing this single trait; the runtime stays framework-agnostic
//! and ships no implementations of it.

use async_trait::async_trait;

use transom_core::Result;
use transom_props::PropBag;
use transom_transport::ElementRef;

use crate::handle::ComponentHandle;

/// Implemented by a host framework that owns the container element a
/// component renders into. See [`ComponentHandle::render_mounted`].
#[async_trait]
pub trait HostAdapter: Send + Sync {
    /// Host framework name, for logs.
    fn framework(&self) -> &str;

    /// Produces the element the render should target. Called once per
    /// render, before any window opens.
    async fn mount(&self, component: &ComponentHandle, props: &PropBag) -> Result<ElementRef>;

    /// Invoked after the render backing a mounted element is destroyed, or
    /// immediately if the render failed.
    async fn unmount(&self, element: ElementRef);
}
