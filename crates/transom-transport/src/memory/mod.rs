//! In-process implementation of the transport capabilities. Models a tree
//! of windows with opener/parent links, per-window message listeners, a
//! flat element store, popup blocking, and navigation hooks, so parent and
//! child protocol code can run as plain tokio tasks in one test.

mod bus;
mod handles;
mod page;

pub use bus::MemoryBus;
pub use page::MemoryPage;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use transom_core::types::CssSize;

use crate::bus::BusHandler;
use crate::page::{AttributeMap, ElementRef};
use crate::store::SharedScope;
use crate::window::{WindowHandle, WindowId, WindowKind};

use handles::{MemoryElement, MemoryWindow};

pub(crate) struct WindowState {
    pub kind: WindowKind,
    pub parent: Option<WindowId>,
    pub opener: Option<WindowId>,
    pub name: String,
    pub domain: String,
    pub url: Option<String>,
    pub closed: bool,
    pub focused: bool,
    pub unload: CancellationToken,
    pub scope: Option<SharedScope>,
    pub prerender_html: Option<String>,
    pub popup_size: Option<(f64, f64)>,
}

pub(crate) struct ElementState {
    pub doc: WindowId,
    pub selector: Option<String>,
    pub class_name: String,
    pub parent: Option<String>,
    pub attributes: AttributeMap,
    pub attached_tx: watch::Sender<bool>,
    pub size_tx: watch::Sender<(f64, f64)>,
    pub visible: bool,
    pub width: Option<CssSize>,
    pub height: Option<CssSize>,
    pub window: Option<WindowId>,
}

type NavigateHook = Arc<dyn Fn(WindowId, String) + Send + Sync>;

pub(crate) struct EnvInner {
    pub windows: RwLock<HashMap<WindowId, WindowState>>,
    pub elements: RwLock<HashMap<String, ElementState>>,
    pub listeners: RwLock<HashMap<(WindowId, String), BusHandler>>,
    pub popups_blocked: AtomicBool,
    pub screen: RwLock<(f64, f64)>,
    next_element: AtomicU64,
    navigate_hooks: RwLock<Vec<NavigateHook>>,
}

#[derive(Clone)]
pub struct MemoryEnv {
    pub(crate) inner: Arc<EnvInner>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EnvInner {
                windows: RwLock::new(HashMap::new()),
                elements: RwLock::new(HashMap::new()),
                listeners: RwLock::new(HashMap::new()),
                popups_blocked: AtomicBool::new(false),
                screen: RwLock::new((1920.0, 1080.0)),
                next_element: AtomicU64::new(1),
                navigate_hooks: RwLock::new(Vec::new()),
            }),
        }
    }

    // --- construction ----------------------------------------------------

    pub fn create_top_window(&self, domain: &str) -> WindowId {
        let id = WindowId::new();
        self.insert_window(
            id.clone(),
            WindowState {
                kind: WindowKind::Top,
                parent: None,
                opener: None,
                name: String::new(),
                domain: domain.to_string(),
                url: None,
                closed: false,
                focused: false,
                unload: CancellationToken::new(),
                scope: None,
                prerender_html: None,
                popup_size: None,
            },
        );
        id
    }

    pub(crate) fn insert_window(&self, id: WindowId, state: WindowState) {
        self.inner
            .windows
            .write()
            .unwrap()
            .insert(id, state);
    }

    pub fn page_for(&self, window: &WindowId) -> MemoryPage {
        MemoryPage::new(self.clone(), window.clone())
    }

    pub fn bus_for(&self, window: &WindowId) -> MemoryBus {
        MemoryBus::new(self.clone(), window.clone())
    }

    /// A handle on `target` as seen from `viewer`. Cross-origin reads
    /// through the handle come back `None`.
    pub fn handle_for(&self, viewer: &WindowId, target: &WindowId) -> WindowHandle {
        let kind = self
            .with_window(target, |w| w.kind)
            .unwrap_or(WindowKind::Top);
        Arc::new(MemoryWindow::new(
            self.clone(),
            viewer.clone(),
            target.clone(),
            kind,
        ))
    }

    // --- test controls ---------------------------------------------------

    pub fn block_popups(&self, blocked: bool) {
        self.inner.popups_blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn set_screen_size(&self, width: f64, height: f64) {
        *self.inner.screen.write().unwrap() = (width, height);
    }

    /// Creates a selector-addressable element in `doc`, as a page author
    /// would have written it into the markup.
    pub fn add_element(&self, doc: &WindowId, selector: &str) -> ElementRef {
        let id = self.new_element(ElementState {
            doc: doc.clone(),
            selector: Some(selector.to_string()),
            class_name: String::new(),
            parent: None,
            attributes: AttributeMap::new(),
            attached_tx: watch::channel(true).0,
            size_tx: watch::channel((0.0, 0.0)).0,
            visible: true,
            width: None,
            height: None,
            window: None,
        });
        self.element_ref(&id)
    }

    /// Simulates the element's rendered content changing size.
    pub fn set_element_content_size(&self, element_id: &str, width: f64, height: f64) {
        let map = self.inner.elements.read().unwrap();
        if let Some(state) = map.get(element_id) {
            let _ = state.size_tx.send((width, height));
        }
    }

    /// Simulates the user navigating `window` away: its unload token fires.
    pub fn navigate_away(&self, window: &WindowId) {
        let token = self.with_window(window, |w| w.unload.clone());
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Registers a hook invoked whenever any window navigates via
    /// `load_url`. Tests use this to boot child contexts.
    pub fn on_navigate(&self, hook: impl Fn(WindowId, String) + Send + Sync + 'static) {
        self.inner
            .navigate_hooks
            .write()
            .unwrap()
            .push(Arc::new(hook));
    }

    // --- probes ----------------------------------------------------------

    pub fn window_name(&self, window: &WindowId) -> Option<String> {
        self.with_window(window, |w| w.name.clone())
    }

    pub fn window_url(&self, window: &WindowId) -> Option<String> {
        self.with_window(window, |w| w.url.clone()).flatten()
    }

    pub fn window_domain(&self, window: &WindowId) -> Option<String> {
        self.with_window(window, |w| w.domain.clone())
    }

    pub fn is_window_closed(&self, window: &WindowId) -> bool {
        self.with_window(window, |w| w.closed).unwrap_or(true)
    }

    pub fn was_focused(&self, window: &WindowId) -> bool {
        self.with_window(window, |w| w.focused).unwrap_or(false)
    }

    pub fn prerender_html(&self, window: &WindowId) -> Option<String> {
        self.with_window(window, |w| w.prerender_html.clone())
            .flatten()
    }

    pub fn popup_size(&self, window: &WindowId) -> Option<(f64, f64)> {
        self.with_window(window, |w| w.popup_size).flatten()
    }

    // --- internals -------------------------------------------------------

    pub(crate) fn with_window<T>(
        &self,
        id: &WindowId,
        f: impl FnOnce(&WindowState) -> T,
    ) -> Option<T> {
        let map = self.inner.windows.read().unwrap();
        map.get(id).map(f)
    }

    pub(crate) fn with_window_mut<T>(
        &self,
        id: &WindowId,
        f: impl FnOnce(&mut WindowState) -> T,
    ) -> Option<T> {
        let mut map = self.inner.windows.write().unwrap();
        map.get_mut(id).map(f)
    }

    pub(crate) fn new_element(&self, state: ElementState) -> String {
        let n = self.inner.next_element.fetch_add(1, Ordering::SeqCst);
        let id = format!("el-{n}");
        self.inner
            .elements
            .write()
            .unwrap()
            .insert(id.clone(), state);
        id
    }

    pub(crate) fn element_ref(&self, id: &str) -> ElementRef {
        let selector = {
            let map = self.inner.elements.read().unwrap();
            map.get(id).and_then(|e| e.selector.clone())
        };
        Arc::new(MemoryElement::new(self.clone(), id.to_string(), selector))
    }

    /// Marks a window closed, along with every frame window nested under
    /// it. Popups it opened survive.
    pub(crate) fn close_window(&self, id: &WindowId) {
        tracing::debug!(window = %id, "closing window");
        let mut to_close = vec![id.clone()];
        let mut map = self.inner.windows.write().unwrap();
        while let Some(current) = to_close.pop() {
            if let Some(state) = map.get_mut(&current) {
                if state.closed {
                    continue;
                }
                state.closed = true;
                state.unload.cancel();
            }
            for (child_id, child) in map.iter() {
                if child.parent.as_ref() == Some(&current) && !child.closed {
                    to_close.push(child_id.clone());
                }
            }
        }
    }

    /// Detaches an element and its subtree. Frame elements close their
    /// hosted windows.
    pub(crate) fn remove_element(&self, id: &str) {
        let mut windows_to_close = Vec::new();
        {
            let mut map = self.inner.elements.write().unwrap();
            let mut to_remove = vec![id.to_string()];
            while let Some(current) = to_remove.pop() {
                if let Some(state) = map.get_mut(&current) {
                    let was_attached = *state.attached_tx.borrow();
                    if !was_attached {
                        continue;
                    }
                    let _ = state.attached_tx.send(false);
                    if let Some(win) = state.window.clone() {
                        windows_to_close.push(win);
                    }
                }
                for (child_id, child) in map.iter() {
                    if child.parent.as_deref() == Some(current.as_str())
                        && *child.attached_tx.borrow()
                    {
                        to_remove.push(child_id.clone());
                    }
                }
            }
        }
        for win in windows_to_close {
            self.close_window(&win);
        }
    }

    pub(crate) fn do_load_url(&self, window: &WindowId, url: &str) -> transom_core::Result<()> {
        let navigated = self.with_window_mut(window, |state| {
            if state.closed {
                return false;
            }
            if state.url.is_some() {
                // The previous document unloads when a new one replaces it.
                state.unload.cancel();
                state.unload = CancellationToken::new();
            }
            if let Ok(parsed) = url::Url::parse(url) {
                let origin = parsed.origin().ascii_serialization();
                if origin != "null" {
                    state.domain = origin;
                }
            }
            state.url = Some(url.to_string());
            true
        });
        match navigated {
            Some(true) => {
                tracing::debug!(window = %window, url, "window navigated");
                let hooks = {
                    let list = self.inner.navigate_hooks.read().unwrap();
                    list.clone()
                };
                for hook in hooks {
                    hook(window.clone(), url.to_string());
                }
                Ok(())
            }
            Some(false) => Err(transom_core::TransomError::other(
                "can not navigate a closed window",
            )),
            None => Err(transom_core::TransomError::other("window does not exist")),
        }
    }

    /// Top of the frame tree containing `id`. Popups are their own top.
    pub(crate) fn top_of(&self, id: &WindowId) -> WindowId {
        let map = self.inner.windows.read().unwrap();
        let mut current = id.clone();
        while let Some(parent) = map.get(&current).and_then(|w| w.parent.clone()) {
            current = parent;
        }
        current
    }

    /// Ancestor chain of `id`, top window first, `id` last.
    pub(crate) fn chain_from_top(&self, id: &WindowId) -> Vec<WindowId> {
        let map = self.inner.windows.read().unwrap();
        let mut chain = vec![id.clone()];
        let mut current = id.clone();
        while let Some(parent) = map.get(&current).and_then(|w| w.parent.clone()) {
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        chain
    }

    pub(crate) fn listener(&self, window: &WindowId, method: &str) -> Option<BusHandler> {
        let map = self.inner.listeners.read().unwrap();
        map.get(&(window.clone(), method.to_string())).cloned()
    }

    pub(crate) fn add_listener(
        &self,
        window: &WindowId,
        method: &str,
        handler: BusHandler,
    ) -> bool {
        let mut map = self.inner.listeners.write().unwrap();
        let key = (window.clone(), method.to_string());
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, handler);
        true
    }

    pub(crate) fn remove_listener(&self, window: &WindowId, method: &str) {
        let mut map = self.inner.listeners.write().unwrap();
        map.remove(&(window.clone(), method.to_string()));
    }
}

impl Default for MemoryEnv {
    fn default() -> Self {
        Self::new()
    }
}
