//! The child half of a render. Attaching parses the window name the parent
//! wrote, walks back to the parent window, pulls the props across, exports
//! the child command surface, and reports in. One instance per window.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use tokio_util::sync::CancellationToken;

use transom_component::ComponentRef;
use transom_core::errors::{ChildError, RpcError, SecurityError};
use transom_core::handshake::{decode_window_name, is_payload_name, HandshakePayload};
use transom_core::types::{CloseReason, RenderContext};
use transom_core::{CleanupRegistry, Result, RuntimeOptions, TransomError};
use transom_parent::{child_endpoint, ChildCommand, ChildExportsRef, ParentCommand};
use transom_props::{decode_props_from_parent, normalize_child_props, PropBag, RemoteCaller};
use transom_transport::{BusHandler, BusMessage, BusRef, PageRef, WindowHandle};

use crate::autoresize;
use crate::resolve;

/// Invoked with the full prop bag after every parent-driven update.
pub type PropObserver = Arc<dyn Fn(&PropBag) + Send + Sync>;

static ATTACHED_WINDOWS: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn claim_window(key: &str) -> bool {
    ATTACHED_WINDOWS.lock().unwrap().insert(key.to_string())
}

fn release_window(key: &str) {
    ATTACHED_WINDOWS.lock().unwrap().remove(key);
}

pub struct ChildInstance {
    component: ComponentRef,
    page: PageRef,
    bus: BusRef,
    options: RuntimeOptions,
    payload: HandshakePayload,
    parent: WindowHandle,
    props: Mutex<PropBag>,
    observers: Mutex<Vec<PropObserver>>,
    cleanup: CleanupRegistry,
    destroyed: AtomicBool,
}

impl std::fmt::Debug for ChildInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildInstance")
            .field("uid", &self.payload.uid)
            .finish_non_exhaustive()
    }
}

impl ChildInstance {
    /// Binds this window to the parent that opened it. Fails when the
    /// window carries no payload name, when the declared parent domain is
    /// not trusted, or when the window already has an instance.
    pub async fn attach(
        component: ComponentRef,
        page: PageRef,
        bus: BusRef,
        options: RuntimeOptions,
    ) -> Result<Arc<Self>> {
        let key = page.window().id().as_str().to_string();
        if !claim_window(&key) {
            return Err(ChildError::AlreadyAttached.into());
        }
        match Self::attach_claimed(component, page, bus, options, &key).await {
            Ok(instance) => Ok(instance),
            Err(err) => {
                release_window(&key);
                Err(err)
            }
        }
    }

    async fn attach_claimed(
        component: ComponentRef,
        page: PageRef,
        bus: BusRef,
        options: RuntimeOptions,
        key: &str,
    ) -> Result<Arc<Self>> {
        let name = page.window().name().await?;
        if !is_payload_name(&name) {
            return Err(ChildError::NotAChildWindow.into());
        }
        let payload = decode_window_name(&name)?;
        if payload.tag != component.tag() {
            return Err(TransomError::other(format!(
                "window was opened for '{}', not '{}'",
                payload.tag,
                component.tag()
            )));
        }

        let parent = resolve::resolve_parent(&page, &payload).await?;
        if !component
            .allowed_parent_domains()
            .matches(&payload.parent_domain)
        {
            return Err(SecurityError::ParentDomainNotAllowed {
                tag: component.tag().to_string(),
                domain: payload.parent_domain.clone(),
            }
            .into());
        }

        let raw = resolve::resolve_props(&page, &parent, &payload).await?;
        let caller = remote_caller(&bus, &parent);
        let raw_bag = decode_props_from_parent(&raw, &caller);
        let own_origin = page.domain().await;
        let props = normalize_child_props(
            component.schema(),
            &raw_bag,
            &json!({}),
            &payload.parent_domain,
            &own_origin,
            false,
        );

        tracing::debug!(uid = %payload.uid, tag = %payload.tag, context = %payload.context, "child attaching");
        let instance = Arc::new(Self {
            component,
            page,
            bus,
            options,
            payload,
            parent,
            props: Mutex::new(props),
            observers: Mutex::new(Vec::new()),
            cleanup: CleanupRegistry::new(),
            destroyed: AtomicBool::new(false),
        });

        {
            let key = key.to_string();
            instance
                .cleanup
                .register(async move {
                    release_window(&key);
                })
                .await;
        }

        instance.register_exports().await?;
        instance.spawn_unload_watch().await;
        instance.spawn_auto_resize().await;

        let exports = ChildExportsRef {
            endpoint: child_endpoint(&instance.payload.uid),
        };
        let init = serde_json::to_value(&ParentCommand::Init { exports }).map_err(RpcError::from)?;
        instance
            .bus
            .call(&instance.parent, &instance.payload.exports.endpoint, init)
            .await?;
        Ok(instance)
    }

    pub fn uid(&self) -> &str {
        &self.payload.uid
    }

    pub fn tag(&self) -> &str {
        &self.payload.tag
    }

    pub fn context(&self) -> RenderContext {
        self.payload.context
    }

    pub fn parent_domain(&self) -> &str {
        &self.payload.parent_domain
    }

    pub fn component(&self) -> &ComponentRef {
        &self.component
    }

    pub fn props(&self) -> PropBag {
        self.props.lock().unwrap().clone()
    }

    /// Observers fire after every parent-driven prop update.
    pub fn on_props(&self, observer: PropObserver) {
        self.observers.lock().unwrap().push(observer);
    }

    pub async fn resize(&self, width: Option<f64>, height: Option<f64>) -> Result<()> {
        self.send(ParentCommand::Resize { width, height }).await
    }

    pub async fn hide(&self) -> Result<()> {
        self.send(ParentCommand::Hide).await
    }

    pub async fn show(&self) -> Result<()> {
        self.send(ParentCommand::Show).await
    }

    /// Asks the parent to close this render.
    pub async fn close(&self) -> Result<()> {
        self.send(ParentCommand::Close {
            reason: CloseReason::ChildCall,
        })
        .await
    }

    /// Reports a close the user initiated inside the child document.
    pub async fn user_close(&self) -> Result<()> {
        self.send(ParentCommand::Close {
            reason: CloseReason::UserClosed,
        })
        .await
    }

    /// Reports a fatal child-side failure. The parent runs its error path
    /// and tears the window down; local state is dropped right away.
    pub async fn error(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let report = self.send(ParentCommand::Error { message }).await;
        self.destroy().await;
        report
    }

    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cleanup.run_all().await;
    }

    pub(crate) fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub(crate) async fn report(&self, command: ParentCommand) -> Result<()> {
        self.send(command).await
    }

    async fn send(&self, command: ParentCommand) -> Result<()> {
        let payload = serde_json::to_value(&command).map_err(RpcError::from)?;
        self.bus
            .call(&self.parent, &self.payload.exports.endpoint, payload)
            .await?;
        Ok(())
    }

    async fn register_exports(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        let handler: BusHandler = Arc::new(move |message: BusMessage| {
            let weak = weak.clone();
            Box::pin(async move {
                let instance = weak.upgrade().ok_or_else(|| RpcError::Remote {
                    method: "child".to_string(),
                    message: "child instance destroyed".to_string(),
                })?;
                instance.handle_command(message).await
            })
        });
        let guard = self
            .bus
            .listen(&child_endpoint(&self.payload.uid), handler)
            .await?;
        self.cleanup
            .register(async move {
                drop(guard);
            })
            .await;
        Ok(())
    }

    async fn handle_command(
        self: Arc<Self>,
        message: BusMessage,
    ) -> std::result::Result<Value, RpcError> {
        if message.origin != self.payload.parent_domain {
            return Err(RpcError::Remote {
                method: "child".to_string(),
                message: format!("unexpected caller origin '{}'", message.origin),
            });
        }
        let command: ChildCommand = serde_json::from_value(message.data)?;
        match command {
            ChildCommand::UpdateProps { props } => {
                self.apply_update(&props)
                    .await
                    .map_err(|err| RpcError::Remote {
                        method: "update_props".to_string(),
                        message: err.to_string(),
                    })?;
                Ok(Value::Null)
            }
            ChildCommand::Close => {
                // Reply before the window goes away.
                let instance = self.clone();
                tokio::spawn(async move {
                    instance.destroy().await;
                    if let Err(err) = instance.page.window().close().await {
                        tracing::debug!(error = %err, "window close failed");
                    }
                });
                Ok(Value::Null)
            }
        }
    }

    async fn apply_update(&self, encoded: &Value) -> Result<()> {
        let caller = remote_caller(&self.bus, &self.parent);
        let update = decode_props_from_parent(encoded, &caller);
        let own_origin = self.page.domain().await;
        let normalized = normalize_child_props(
            self.component.schema(),
            &update,
            &json!({}),
            &self.payload.parent_domain,
            &own_origin,
            true,
        );
        let snapshot = {
            let mut props = self.props.lock().unwrap();
            props.merge(normalized);
            props.clone()
        };
        tracing::debug!(uid = %self.payload.uid, "props updated by parent");
        self.notify_observers(&snapshot);
        Ok(())
    }

    fn notify_observers(&self, props: &PropBag) {
        let observers = self.observers.lock().unwrap().clone();
        for observer in observers {
            observer(props);
        }
    }

    async fn spawn_unload_watch(self: &Arc<Self>) {
        let token = CancellationToken::new();
        {
            let token = token.clone();
            self.cleanup
                .register(async move {
                    token.cancel();
                })
                .await;
        }
        let weak = Arc::downgrade(self);
        let unload = self.page.unload_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = unload.cancelled() => {
                    let Some(instance) = weak.upgrade() else { return };
                    let check = serde_json::to_value(&ParentCommand::CheckClose)
                        .unwrap_or(Value::Null);
                    if let Err(err) = instance
                        .bus
                        .call(&instance.parent, &instance.payload.exports.endpoint, check)
                        .await
                    {
                        tracing::debug!(error = %err, "check_close after unload failed");
                    }
                    instance.destroy().await;
                }
            }
        });
    }

    async fn spawn_auto_resize(self: &Arc<Self>) {
        if self.payload.context == RenderContext::Popup {
            return;
        }
        let auto = &self.component.auto_resize;
        if !auto.width && !auto.height {
            return;
        }
        let element = match &auto.element {
            Some(selector) => self.page.resolve_element(selector).await,
            None => self.page.body().await.ok(),
        };
        let Some(element) = element else {
            tracing::debug!(uid = %self.payload.uid, "auto resize element not found");
            return;
        };
        let token = CancellationToken::new();
        {
            let token = token.clone();
            self.cleanup
                .register(async move {
                    token.cancel();
                })
                .await;
        }
        autoresize::spawn(self, element, token);
    }
}

fn remote_caller(bus: &BusRef, parent: &WindowHandle) -> RemoteCaller {
    let bus = bus.clone();
    let parent = parent.clone();
    Arc::new(move |method, name, payload| {
        let bus = bus.clone();
        let parent = parent.clone();
        Box::pin(async move {
            bus.call(&parent, &method, json!({ "name": name, "payload": payload }))
                .await
                .map_err(TransomError::from)
        })
    })
}
