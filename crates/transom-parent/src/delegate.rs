//! Delegated rendering. A window that can not touch the right document, a
//! popup bridging back to a checkout page for example, asks a host window
//! to run the DOM half of the render for it. The requester keeps the
//! instance, the props, and the child relationship; the host runs a
//! [`LocalSurface`] and answers forwarded surface ops.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use transom_component::ComponentRef;
use transom_core::errors::{RenderError, RpcError, SecurityError};
use transom_core::types::{CloseReason, RenderContext};
use transom_core::{Result, RuntimeOptions, TransomError};
use transom_props::{decode_props_from_parent, encode_props_for_child, PropBag, RemoteCaller};
use transom_transport::{
    BusHandler, BusMessage, BusRef, ListenerGuard, PageRef, WindowHandle,
};

use crate::commands::{
    allow_delegate_method, delegate_events_endpoint, delegate_method, delegate_surface_endpoint,
    prop_call_endpoint, DelegateEvent, DelegateRequest, DelegateResponse, SurfaceOp,
};
use crate::instance::ParentInstance;
use crate::surface::{ElementLocator, LocalSurface};

/// Asks `host` whether it hosts renders for `component` at all. Any
/// failure, including nobody listening, reads as "no".
pub async fn can_render_to(
    bus: &BusRef,
    component: &ComponentRef,
    host: &WindowHandle,
    timeout: Duration,
) -> bool {
    let method = allow_delegate_method(component.name());
    matches!(
        tokio::time::timeout(timeout, bus.call(host, &method, json!({}))).await,
        Ok(Ok(_))
    )
}

/// Negotiates a delegated render with `host` on behalf of `instance`.
/// Returns the bus endpoint the host serves surface ops on.
pub(crate) async fn establish_link(
    instance: &Arc<ParentInstance>,
    host: &WindowHandle,
    context: RenderContext,
    props: &PropBag,
) -> Result<String> {
    let component = instance.component().clone();
    let services = instance.services().clone();
    let timeout = services.options.delegate_timeout;

    let allow = allow_delegate_method(component.name());
    let probe = tokio::time::timeout(
        timeout,
        services
            .bus
            .call(host, &allow, json!({ "context": context.as_str() })),
    )
    .await;
    match probe {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            return Err(RenderError::DelegateUnavailable(err.to_string()).into());
        }
        Err(_) => {
            return Err(RenderError::DelegateUnavailable(format!(
                "no window answered '{allow}'"
            ))
            .into());
        }
    }

    // The host reports closures and errors it observes back through here.
    let events = delegate_events_endpoint(instance.uid());
    let weak = Arc::downgrade(instance);
    let handler: BusHandler = Arc::new(move |message: BusMessage| {
        let weak = weak.clone();
        Box::pin(async move {
            let event: DelegateEvent = serde_json::from_value(message.data)?;
            let Some(instance) = weak.upgrade() else {
                return Ok(Value::Null);
            };
            let result = match event {
                DelegateEvent::CloseDetected => instance.close(CloseReason::CloseDetected).await,
                DelegateEvent::UserClose => instance.close(CloseReason::UserClosed).await,
                DelegateEvent::Error { message } => {
                    instance.fail(TransomError::other(message)).await
                }
            };
            result.map_err(|err| RpcError::Remote {
                method: "delegate_event".to_string(),
                message: err.to_string(),
            })?;
            Ok(Value::Null)
        })
    });
    let guard = services.bus.listen(&events, handler).await?;
    instance
        .cleanup()
        .register(async move {
            drop(guard);
        })
        .await;

    // Only props that opt into delegation cross over; their callbacks come
    // back to us as prop calls, window props stay behind.
    let mut delegated = PropBag::default();
    for (name, definition) in component.schema().iter() {
        if definition.allow_delegate {
            if let Some(value) = props.get(name) {
                delegated.set(name, value.clone());
            }
        }
    }
    let encoded = encode_props_for_child(
        component.schema(),
        &delegated,
        false,
        &prop_call_endpoint(instance.uid()),
    );

    let request = DelegateRequest {
        uid: instance.uid().to_string(),
        tag: component.tag().to_string(),
        context,
        props: encoded,
        events,
    };
    let payload = serde_json::to_value(&request).map_err(RpcError::from)?;
    let method = delegate_method(component.name());
    let reply = match tokio::time::timeout(timeout, services.bus.call(host, &method, payload)).await
    {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            return Err(RenderError::DelegateUnavailable(err.to_string()).into());
        }
        Err(_) => {
            return Err(RenderError::DelegateUnavailable(format!(
                "'{method}' did not answer in time"
            ))
            .into());
        }
    };
    let response: DelegateResponse = serde_json::from_value(reply).map_err(RpcError::from)?;
    tracing::debug!(uid = %instance.uid(), surface = %response.surface, "delegated render established");
    Ok(response.surface)
}

struct HostEntry {
    surface: Arc<LocalSurface>,
    guard: ListenerGuard,
    watch: CancellationToken,
}

/// The hosting half. One per component per window that agrees to render
/// for others. Registering it answers `can_render_to` probes and serves
/// delegated surfaces until [`DelegateHost::shutdown`].
pub struct DelegateHost {
    component: ComponentRef,
    page: PageRef,
    bus: BusRef,
    options: RuntimeOptions,
    entries: Arc<Mutex<HashMap<String, HostEntry>>>,
    guards: Mutex<Vec<ListenerGuard>>,
}

impl DelegateHost {
    pub async fn new(
        component: ComponentRef,
        page: PageRef,
        bus: BusRef,
        options: RuntimeOptions,
    ) -> Result<Arc<Self>> {
        let host = Arc::new(Self {
            component: component.clone(),
            page,
            bus: bus.clone(),
            options,
            entries: Arc::new(Mutex::new(HashMap::new())),
            guards: Mutex::new(Vec::new()),
        });

        let weak = Arc::downgrade(&host);
        let allow: BusHandler = Arc::new(move |message: BusMessage| {
            let weak = weak.clone();
            Box::pin(async move {
                let host = upgrade(&weak)?;
                host.check_requester(&message)
                    .await
                    .map_err(|err| remote_error("allow_delegate", err))?;
                Ok(json!(true))
            })
        });
        let guard = bus
            .listen(&allow_delegate_method(component.name()), allow)
            .await?;
        host.guards.lock().unwrap().push(guard);

        let weak = Arc::downgrade(&host);
        let delegate: BusHandler = Arc::new(move |message: BusMessage| {
            let weak = weak.clone();
            Box::pin(async move {
                let host = upgrade(&weak)?;
                host.handle_delegate(message).await
            })
        });
        let guard = bus.listen(&delegate_method(component.name()), delegate).await?;
        host.guards.lock().unwrap().push(guard);

        Ok(host)
    }

    pub fn surface_for(&self, uid: &str) -> Option<Arc<LocalSurface>> {
        self.entries
            .lock()
            .unwrap()
            .get(uid)
            .map(|entry| entry.surface.clone())
    }

    pub async fn shutdown(&self) {
        let uids: Vec<String> = self.entries.lock().unwrap().keys().cloned().collect();
        for uid in uids {
            self.remove_entry(&uid).await;
        }
        self.guards.lock().unwrap().clear();
    }

    /// A requester must share our top window and come from our own origin
    /// or one the component trusts.
    async fn check_requester(&self, message: &BusMessage) -> Result<()> {
        if !self.page.is_same_top_window(&message.source).await {
            return Err(SecurityError::DifferentTopWindow.into());
        }
        let own = self.page.domain().await;
        if message.origin == own {
            return Ok(());
        }
        let trusted = self
            .component
            .domain_matcher(&PropBag::default(), &own)
            .map(|matcher| matcher.matches(&message.origin))
            .unwrap_or(false);
        if !trusted {
            return Err(SecurityError::DomainNotAllowed {
                tag: self.component.tag().to_string(),
                domain: message.origin.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn handle_delegate(
        self: &Arc<Self>,
        message: BusMessage,
    ) -> std::result::Result<Value, RpcError> {
        self.check_requester(&message)
            .await
            .map_err(|err| remote_error("delegate", err))?;
        let request: DelegateRequest = serde_json::from_value(message.data.clone())?;
        if request.tag != self.component.tag() {
            return Err(RpcError::Remote {
                method: "delegate".to_string(),
                message: format!(
                    "this window hosts '{}', not '{}'",
                    self.component.tag(),
                    request.tag
                ),
            });
        }
        tracing::debug!(uid = %request.uid, origin = %message.origin, "hosting delegated render");

        let requester = message.source.clone();
        let caller: RemoteCaller = {
            let bus = self.bus.clone();
            let requester = requester.clone();
            Arc::new(move |method, name, payload| {
                let bus = bus.clone();
                let requester = requester.clone();
                Box::pin(async move {
                    bus.call(&requester, &method, json!({ "name": name, "payload": payload }))
                        .await
                        .map_err(TransomError::from)
                })
            })
        };
        let props = decode_props_from_parent(&request.props, &caller);
        let surface = Arc::new(LocalSurface::new(
            self.page.clone(),
            self.component.clone(),
            request.uid.clone(),
            request.context,
            props,
        ));

        let watch = CancellationToken::new();
        let endpoint = delegate_surface_endpoint(&request.uid);
        let weak = Arc::downgrade(self);
        let ops: BusHandler = {
            let uid = request.uid.clone();
            let surface = surface.clone();
            let requester = requester.clone();
            let events = request.events.clone();
            let watch = watch.clone();
            Arc::new(move |message: BusMessage| {
                let weak = weak.clone();
                let uid = uid.clone();
                let surface = surface.clone();
                let requester = requester.clone();
                let events = events.clone();
                let watch = watch.clone();
                Box::pin(async move {
                    let host = upgrade(&weak)?;
                    let op: SurfaceOp = serde_json::from_value(message.data)?;
                    host.handle_surface_op(&uid, &surface, requester, events, watch, op)
                        .await
                })
            })
        };
        let guard = self.bus.listen(&endpoint, ops).await?;
        self.entries.lock().unwrap().insert(
            request.uid.clone(),
            HostEntry {
                surface,
                guard,
                watch,
            },
        );

        Ok(serde_json::to_value(&DelegateResponse { surface: endpoint })?)
    }

    async fn handle_surface_op(
        self: &Arc<Self>,
        uid: &str,
        surface: &Arc<LocalSurface>,
        requester: WindowHandle,
        events: String,
        watch: CancellationToken,
        op: SurfaceOp,
    ) -> std::result::Result<Value, RpcError> {
        let result = match op {
            SurfaceOp::OpenContainer { selector } => {
                surface
                    .open_container(&ElementLocator::Selector(selector))
                    .await
                    .map(|_| ())
            }
            SurfaceOp::Open => match surface.open_frame().await {
                Ok(window) => {
                    self.spawn_watch(surface, window, requester, events, watch);
                    Ok(())
                }
                Err(err) => Err(err),
            },
            SurfaceOp::OpenPrerender { html } => surface.open_prerender(&html).await,
            SurfaceOp::ReleasePrerender => surface.release_prerender().await,
            SurfaceOp::SetWindowName { name } => surface.set_window_name(&name).await,
            SurfaceOp::LoadUrl { url } => surface.load_url(&url).await,
            SurfaceOp::Show => surface.show().await,
            SurfaceOp::Hide => surface.hide().await,
            SurfaceOp::Resize { width, height } => surface.resize(width, height).await,
            SurfaceOp::DestroyContainer => surface.destroy_container().await,
            SurfaceOp::Destroy => {
                // Dropping our own listener guard mid-call is fine, the bus
                // invokes a clone of the handler.
                self.remove_entry(uid).await;
                Ok(())
            }
        };
        result.map_err(|err| remote_error("surface", err))?;
        Ok(Value::Null)
    }

    /// Watches the hosted frame so the requester hears about closures it
    /// has no window handle to observe itself.
    fn spawn_watch(
        &self,
        surface: &Arc<LocalSurface>,
        window: WindowHandle,
        requester: WindowHandle,
        events: String,
        token: CancellationToken,
    ) {
        let bus = self.bus.clone();
        let interval = self.options.close_watch_interval;
        let frame = surface.frame_element();
        tokio::spawn(async move {
            let removed = async {
                match frame {
                    Some(element) => element.wait_removed().await,
                    None => std::future::pending().await,
                }
            };
            let closed = async {
                loop {
                    tokio::time::sleep(interval).await;
                    if window.is_closed().await {
                        return;
                    }
                }
            };
            tokio::select! {
                _ = token.cancelled() => return,
                _ = removed => {}
                _ = closed => {}
            }
            let payload =
                serde_json::to_value(&DelegateEvent::CloseDetected).unwrap_or(Value::Null);
            if let Err(err) = bus.call(&requester, &events, payload).await {
                tracing::debug!(error = %err, "delegate close notice failed");
            }
        });
    }

    async fn remove_entry(&self, uid: &str) {
        let entry = self.entries.lock().unwrap().remove(uid);
        if let Some(entry) = entry {
            entry.watch.cancel();
            if let Err(err) = entry.surface.destroy_container().await {
                tracing::debug!(uid, error = %err, "delegated container teardown failed");
            }
            drop(entry.guard);
        }
    }
}

fn upgrade(weak: &Weak<DelegateHost>) -> std::result::Result<Arc<DelegateHost>, RpcError> {
    weak.upgrade().ok_or_else(|| RpcError::Remote {
        method: "delegate".to_string(),
        message: "delegation host shut down".to_string(),
    })
}

fn remote_error(method: &str, err: TransomError) -> RpcError {
    RpcError::Remote {
        method: method.to_string(),
        message: err.to_string(),
    }
}
