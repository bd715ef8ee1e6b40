use async_trait::async_trait;
use transom_core::types::CssSize;
use transom_core::Result;

use crate::page::ElementHandle;
use crate::window::{RemoteWindow, WindowId, WindowKind};

use super::MemoryEnv;

/// A window as seen from another window. Identity reads always work;
/// content reads are gated on the viewer sharing the target's origin at
/// the moment of the call.
pub(crate) struct MemoryWindow {
    env: MemoryEnv,
    viewer: WindowId,
    target: WindowId,
    kind: WindowKind,
}

impl MemoryWindow {
    pub(crate) fn new(env: MemoryEnv, viewer: WindowId, target: WindowId, kind: WindowKind) -> Self {
        Self {
            env,
            viewer,
            target,
            kind,
        }
    }

    fn same_origin(&self) -> bool {
        if self.viewer == self.target {
            return true;
        }
        let viewer = self.env.with_window(&self.viewer, |w| w.domain.clone());
        let target = self.env.with_window(&self.target, |w| w.domain.clone());
        match (viewer, target) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[async_trait]
impl RemoteWindow for MemoryWindow {
    fn id(&self) -> &WindowId {
        &self.target
    }

    fn kind(&self) -> WindowKind {
        self.kind
    }

    async fn is_closed(&self) -> bool {
        self.env.is_window_closed(&self.target)
    }

    async fn close(&self) -> Result<()> {
        self.env.close_window(&self.target);
        Ok(())
    }

    async fn focus(&self) -> Result<()> {
        self.env
            .with_window_mut(&self.target, |w| w.focused = true);
        Ok(())
    }

    async fn name(&self) -> Result<String> {
        if !self.same_origin() {
            return Err(transom_core::TransomError::other(
                "window name is not readable across origins",
            ));
        }
        self.env
            .window_name(&self.target)
            .ok_or_else(|| transom_core::TransomError::other("window does not exist"))
    }

    async fn set_name(&self, name: &str) -> Result<()> {
        self.env
            .with_window_mut(&self.target, |w| w.name = name.to_string());
        Ok(())
    }

    async fn load_url(&self, url: &str) -> Result<()> {
        self.env.do_load_url(&self.target, url)
    }

    async fn url(&self) -> Option<String> {
        if !self.same_origin() {
            return None;
        }
        self.env.window_url(&self.target)
    }

    async fn domain(&self) -> Option<String> {
        if !self.same_origin() {
            return None;
        }
        self.env.window_domain(&self.target)
    }
}

pub(crate) struct MemoryElement {
    env: MemoryEnv,
    id: String,
    selector: Option<String>,
}

impl MemoryElement {
    pub(crate) fn new(env: MemoryEnv, id: String, selector: Option<String>) -> Self {
        Self { env, id, selector }
    }

    fn with_state<T>(&self, f: impl FnOnce(&super::ElementState) -> T) -> Option<T> {
        let map = self.env.inner.elements.read().unwrap();
        map.get(&self.id).map(f)
    }

    fn with_state_mut<T>(&self, f: impl FnOnce(&mut super::ElementState) -> T) -> Option<T> {
        let mut map = self.env.inner.elements.write().unwrap();
        map.get_mut(&self.id).map(f)
    }
}

#[async_trait]
impl ElementHandle for MemoryElement {
    fn id(&self) -> &str {
        &self.id
    }

    fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    async fn is_attached(&self) -> bool {
        self.with_state(|s| *s.attached_tx.borrow()).unwrap_or(false)
    }

    async fn remove(&self) {
        self.env.remove_element(&self.id);
    }

    async fn set_visible(&self, visible: bool) {
        self.with_state_mut(|s| s.visible = visible);
    }

    async fn visible(&self) -> bool {
        self.with_state(|s| s.visible).unwrap_or(false)
    }

    async fn set_css_size(&self, width: Option<CssSize>, height: Option<CssSize>) {
        self.with_state_mut(|s| {
            if width.is_some() {
                s.width = width;
            }
            if height.is_some() {
                s.height = height;
            }
        });
    }

    async fn css_size(&self) -> (Option<CssSize>, Option<CssSize>) {
        self.with_state(|s| (s.width.clone(), s.height.clone()))
            .unwrap_or((None, None))
    }

    async fn wait_removed(&self) {
        let rx = self.with_state(|s| s.attached_tx.subscribe());
        let Some(mut rx) = rx else {
            return;
        };
        // wait_for sees the current value first, so an already-detached
        // element resolves without an extra send.
        let _ = rx.wait_for(|attached| !attached).await;
    }

    fn size_updates(&self) -> tokio::sync::watch::Receiver<(f64, f64)> {
        self.with_state(|s| s.size_tx.subscribe())
            .unwrap_or_else(|| tokio::sync::watch::channel((0.0, 0.0)).1)
    }
}
