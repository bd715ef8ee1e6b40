use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use transom_core::types::CssSize;
use transom_core::Result;

use crate::store::SharedScope;
use crate::window::WindowHandle;

pub type AttributeMap = BTreeMap<String, String>;

/// One element the control plane touches: a render target, a container, an
/// outlet, or a frame shell. Everything visual beyond these operations is
/// out of scope.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    fn id(&self) -> &str;

    /// The selector this element was resolved from, if any. Delegated
    /// targets must be addressable by selector.
    fn selector(&self) -> Option<&str>;

    async fn is_attached(&self) -> bool;

    async fn remove(&self);

    async fn set_visible(&self, visible: bool);

    async fn visible(&self) -> bool;

    async fn set_css_size(&self, width: Option<CssSize>, height: Option<CssSize>);

    async fn css_size(&self) -> (Option<CssSize>, Option<CssSize>);

    /// Resolves when the element leaves its document, immediately if it
    /// already has.
    async fn wait_removed(&self);

    /// Content size updates, for auto-resize observation.
    fn size_updates(&self) -> watch::Receiver<(f64, f64)>;
}

pub type ElementRef = Arc<dyn ElementHandle>;

impl std::fmt::Debug for dyn ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("id", &self.id())
            .field("selector", &self.selector())
            .finish_non_exhaustive()
    }
}

/// A frame element together with the browsing context it hosts. Removing
/// the element closes the window.
#[derive(Clone)]
pub struct FrameHandle {
    pub element: ElementRef,
    pub window: WindowHandle,
}

#[derive(Debug, Clone, Default)]
pub struct PopupOptions {
    pub width: f64,
    pub height: f64,
    pub attributes: AttributeMap,
}

/// One browsing context's view of its page and window tree. Every instance
/// is scoped to the window it was created for; two contexts in the same
/// process get independent `Page` handles.
#[async_trait]
pub trait Page: Send + Sync {
    /// This context's own window.
    fn window(&self) -> WindowHandle;

    /// This context's origin.
    async fn domain(&self) -> String;

    // --- window tree -----------------------------------------------------

    async fn opener(&self) -> Option<WindowHandle>;

    async fn top(&self) -> WindowHandle;

    async fn parent(&self) -> Option<WindowHandle>;

    /// The ancestor `distance` levels below the top window, counting the
    /// top window as distance zero.
    async fn nth_parent_from_top(&self, distance: u32) -> Option<WindowHandle>;

    async fn is_top(&self) -> bool;

    async fn distance_from_top(&self) -> u32;

    async fn is_same_top_window(&self, other: &WindowHandle) -> bool;

    // --- opening contexts ------------------------------------------------

    async fn open_frame(&self, into: &ElementRef, attributes: &AttributeMap)
        -> Result<FrameHandle>;

    async fn open_popup(&self, options: &PopupOptions) -> Result<WindowHandle>;

    /// Writes markup into a same-origin blank window (prerender content).
    async fn write_document(&self, window: &WindowHandle, html: &str) -> Result<()>;

    // --- elements --------------------------------------------------------

    async fn resolve_element(&self, selector: &str) -> Option<ElementRef>;

    async fn body(&self) -> Result<ElementRef>;

    async fn create_element(&self, class_name: &str, parent: Option<&ElementRef>)
        -> Result<ElementRef>;

    // --- page lifecycle --------------------------------------------------

    /// Cancelled when this page unloads.
    fn unload_token(&self) -> CancellationToken;

    async fn screen_size(&self) -> (f64, f64);

    // --- shared scope ----------------------------------------------------

    /// Publishes this page's handoff scope so same-origin contexts can
    /// find it.
    async fn attach_scope(&self, scope: SharedScope);

    /// Another window's scope, only when it is same-origin with this page.
    async fn scope_of(&self, window: &WindowHandle) -> Option<SharedScope>;

    /// Searches same-origin scopes in this page's frame tree for a window
    /// registered under `uid`.
    async fn find_registered_window(&self, uid: &str) -> Option<WindowHandle>;
}

pub type PageRef = Arc<dyn Page>;
