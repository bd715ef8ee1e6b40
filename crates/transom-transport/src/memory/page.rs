use async_trait::async_trait;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use transom_core::{RenderError, Result, TransomError};

use crate::page::{AttributeMap, ElementRef, FrameHandle, Page, PopupOptions};
use crate::store::SharedScope;
use crate::window::{WindowHandle, WindowId, WindowKind};

use super::{ElementState, MemoryEnv, WindowState};

/// `Page` scoped to one window of a [`MemoryEnv`].
#[derive(Clone)]
pub struct MemoryPage {
    env: MemoryEnv,
    window: WindowId,
}

impl MemoryPage {
    pub(crate) fn new(env: MemoryEnv, window: WindowId) -> Self {
        Self { env, window }
    }

    pub fn window_id(&self) -> &WindowId {
        &self.window
    }

    fn handle(&self, target: &WindowId) -> WindowHandle {
        self.env.handle_for(&self.window, target)
    }
}

#[async_trait]
impl Page for MemoryPage {
    fn window(&self) -> WindowHandle {
        self.handle(&self.window)
    }

    async fn domain(&self) -> String {
        self.env.window_domain(&self.window).unwrap_or_default()
    }

    async fn opener(&self) -> Option<WindowHandle> {
        let opener = self.env.with_window(&self.window, |w| w.opener.clone())?;
        opener.map(|id| self.handle(&id))
    }

    async fn top(&self) -> WindowHandle {
        let top = self.env.top_of(&self.window);
        self.handle(&top)
    }

    async fn parent(&self) -> Option<WindowHandle> {
        let parent = self.env.with_window(&self.window, |w| w.parent.clone())?;
        parent.map(|id| self.handle(&id))
    }

    async fn nth_parent_from_top(&self, distance: u32) -> Option<WindowHandle> {
        let chain = self.env.chain_from_top(&self.window);
        chain.get(distance as usize).map(|id| self.handle(id))
    }

    async fn is_top(&self) -> bool {
        self.env
            .with_window(&self.window, |w| w.parent.is_none())
            .unwrap_or(true)
    }

    async fn distance_from_top(&self) -> u32 {
        (self.env.chain_from_top(&self.window).len() - 1) as u32
    }

    async fn is_same_top_window(&self, other: &WindowHandle) -> bool {
        self.env.top_of(&self.window) == self.env.top_of(other.id())
    }

    async fn open_frame(
        &self,
        into: &ElementRef,
        attributes: &AttributeMap,
    ) -> Result<FrameHandle> {
        let (doc, attached) = {
            let map = self.env.inner.elements.read().unwrap();
            match map.get(into.id()) {
                Some(state) => (state.doc.clone(), *state.attached_tx.borrow()),
                None => return Err(TransomError::other("frame target does not exist")),
            }
        };
        if !attached {
            return Err(TransomError::other("frame target is detached"));
        }

        // Blank frames inherit the origin of the document that owns them.
        let domain = self
            .env
            .window_domain(&doc)
            .ok_or_else(|| TransomError::other("frame target document is gone"))?;

        let frame_id = WindowId::new();
        self.env.insert_window(
            frame_id.clone(),
            WindowState {
                kind: WindowKind::Frame,
                parent: Some(doc),
                opener: None,
                name: String::new(),
                domain,
                url: None,
                closed: false,
                focused: false,
                unload: CancellationToken::new(),
                scope: None,
                prerender_html: None,
                popup_size: None,
            },
        );

        let hosted = {
            let mut map = self.env.inner.elements.write().unwrap();
            if let Some(state) = map.get_mut(into.id()) {
                state.window = Some(frame_id.clone());
                state.attributes.extend(attributes.clone());
                true
            } else {
                false
            }
        };
        if !hosted {
            return Err(TransomError::other("frame target was removed"));
        }

        Ok(FrameHandle {
            element: into.clone(),
            window: self.handle(&frame_id),
        })
    }

    async fn open_popup(&self, options: &PopupOptions) -> Result<WindowHandle> {
        if self.env.inner.popups_blocked.load(Ordering::SeqCst) {
            return Err(RenderError::PopupBlocked.into());
        }

        // A fresh popup is blank, so it starts same-origin with its opener.
        let domain = self
            .env
            .window_domain(&self.window)
            .ok_or_else(|| TransomError::other("opener window is gone"))?;

        let popup_id = WindowId::new();
        self.env.insert_window(
            popup_id.clone(),
            WindowState {
                kind: WindowKind::Popup,
                parent: None,
                opener: Some(self.window.clone()),
                name: String::new(),
                domain,
                url: None,
                closed: false,
                focused: false,
                unload: CancellationToken::new(),
                scope: None,
                prerender_html: None,
                popup_size: Some((options.width, options.height)),
            },
        );
        Ok(self.handle(&popup_id))
    }

    async fn write_document(&self, window: &WindowHandle, html: &str) -> Result<()> {
        let my_domain = self.env.window_domain(&self.window);
        let state = self
            .env
            .with_window(window.id(), |w| (w.domain.clone(), w.url.is_none(), w.closed));
        match state {
            Some((ref domain, blank, false)) if blank && Some(domain) == my_domain.as_ref() => {
                self.env
                    .with_window_mut(window.id(), |w| w.prerender_html = Some(html.to_string()));
                Ok(())
            }
            Some(_) => Err(TransomError::other(
                "can only write into a same-origin blank window",
            )),
            None => Err(TransomError::other("window does not exist")),
        }
    }

    async fn resolve_element(&self, selector: &str) -> Option<ElementRef> {
        let id = {
            let map = self.env.inner.elements.read().unwrap();
            map.iter()
                .find(|(_, state)| {
                    state.doc == self.window
                        && state.selector.as_deref() == Some(selector)
                        && *state.attached_tx.borrow()
                })
                .map(|(id, _)| id.clone())
        }?;
        Some(self.env.element_ref(&id))
    }

    async fn body(&self) -> Result<ElementRef> {
        if let Some(body) = self.resolve_element("body").await {
            return Ok(body);
        }
        if self.env.is_window_closed(&self.window) {
            return Err(TransomError::other("page window is closed"));
        }
        Ok(self.env.add_element(&self.window, "body"))
    }

    async fn create_element(
        &self,
        class_name: &str,
        parent: Option<&ElementRef>,
    ) -> Result<ElementRef> {
        let (doc, parent_id) = match parent {
            Some(parent) => {
                let map = self.env.inner.elements.read().unwrap();
                let state = map
                    .get(parent.id())
                    .ok_or_else(|| TransomError::other("parent element does not exist"))?;
                if !*state.attached_tx.borrow() {
                    return Err(TransomError::other("parent element is detached"));
                }
                (state.doc.clone(), Some(parent.id().to_string()))
            }
            None => (self.window.clone(), None),
        };
        let id = self.env.new_element(ElementState {
            doc,
            selector: None,
            class_name: class_name.to_string(),
            parent: parent_id,
            attributes: AttributeMap::new(),
            attached_tx: watch::channel(true).0,
            size_tx: watch::channel((0.0, 0.0)).0,
            visible: true,
            width: None,
            height: None,
            window: None,
        });
        Ok(self.env.element_ref(&id))
    }

    fn unload_token(&self) -> CancellationToken {
        self.env
            .with_window(&self.window, |w| w.unload.clone())
            .unwrap_or_else(|| {
                let token = CancellationToken::new();
                token.cancel();
                token
            })
    }

    async fn screen_size(&self) -> (f64, f64) {
        *self.env.inner.screen.read().unwrap()
    }

    async fn attach_scope(&self, scope: SharedScope) {
        self.env
            .with_window_mut(&self.window, |w| w.scope = Some(scope));
    }

    async fn scope_of(&self, window: &WindowHandle) -> Option<SharedScope> {
        let my_domain = self.env.window_domain(&self.window)?;
        let (domain, scope) = self
            .env
            .with_window(window.id(), |w| (w.domain.clone(), w.scope.clone()))?;
        if domain != my_domain {
            return None;
        }
        scope
    }

    async fn find_registered_window(&self, uid: &str) -> Option<WindowHandle> {
        let my_domain = self.env.window_domain(&self.window)?;
        // The search is rooted at this window's ancestor so popups can see
        // scopes published in their opener's frame tree.
        let ancestor = self
            .env
            .with_window(&self.window, |w| w.opener.clone().or_else(|| w.parent.clone()))??;
        let root = self.env.top_of(&ancestor);
        let candidates: Vec<(WindowId, SharedScope)> = {
            let map = self.env.inner.windows.read().unwrap();
            map.iter()
                .filter(|(_, state)| !state.closed && state.domain == my_domain)
                .filter_map(|(id, state)| state.scope.clone().map(|s| (id.clone(), s)))
                .collect()
        };
        for (id, scope) in candidates {
            if self.env.top_of(&id) != root {
                continue;
            }
            if let Some(window) = scope.windows.get(uid).await {
                return Some(self.handle(window.id()));
            }
        }
        None
    }
}
