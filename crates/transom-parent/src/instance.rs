//! The parent-side controller for one render. A [`ParentInstance`] owns the
//! normalized props, the render state machine, the command listeners its
//! child talks to, and the cleanup trail that undoes all of it.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use transom_component::{ActiveInstance, ActiveInstances, ComponentRef};
use transom_core::errors::{RenderError, RpcError, SecurityError};
use transom_core::handshake::{
    encode_window_name, ExportsRef, HandshakePayload, PropsRef, WindowRef, PAYLOAD_VERSION,
};
use transom_core::id::new_uid;
use transom_core::lifecycle::{LifecycleBus, LifecycleEvent, RenderState};
use transom_core::types::{CloseReason, RenderContext};
use transom_core::{CleanupRegistry, Deferred, Result, RuntimeOptions, TransomError};
use transom_core::matcher::DomainMatcher;
use transom_props::{
    check_required, encode_props_for_child, extend_query, normalize_props, props_to_query,
    InstanceGuard, PropBag, PropFunction,
};
use transom_transport::{
    BusHandler, BusMessage, BusRef, PageRef, SharedScope, WindowHandle, WindowKind,
};

use crate::commands::{parent_endpoint, prop_call_endpoint, ChildCommand, ParentCommand};
use crate::delegate;
use crate::drivers::{driver_for, ContextDriver, DriverCtx};
use crate::surface::{ElementLocator, LocalSurface, RemoteSurface, RenderSurface};
use crate::watchers;

/// Shared services every instance renders against. One per runtime.
#[derive(Clone)]
pub struct ParentServices {
    pub page: PageRef,
    pub bus: BusRef,
    pub scope: SharedScope,
    pub active: ActiveInstances,
    pub options: RuntimeOptions,
}

/// One `render()` call.
pub struct RenderRequest {
    pub props: PropBag,
    pub target: Option<ElementLocator>,
    pub context: Option<RenderContext>,
    /// Render the DOM side into this window instead of our own.
    pub delegate: Option<WindowHandle>,
}

impl RenderRequest {
    pub fn new(props: PropBag) -> Self {
        Self {
            props,
            target: None,
            context: None,
            delegate: None,
        }
    }
}

/// Where the parent reaches its child back after init.
#[derive(Clone)]
pub struct ChildEndpoint {
    pub window: WindowHandle,
    pub endpoint: String,
}

struct Inner {
    state: RenderState,
    context: RenderContext,
    raw_props: PropBag,
    props: PropBag,
    /// Scratch object shared with prop suppliers.
    instance_state: Value,
    page_origin: String,
    matcher: Option<DomainMatcher>,
    child_domain: Option<String>,
    window: Option<WindowHandle>,
    exports: Option<ChildEndpoint>,
    driver: Option<Arc<dyn ContextDriver>>,
    surface: Option<Arc<RenderSurface>>,
}

pub struct ParentInstance {
    uid: String,
    component: ComponentRef,
    services: ParentServices,
    events: LifecycleBus,
    cleanup: CleanupRegistry,
    guard: InstanceGuard,
    init: Deferred<()>,
    rendered: AtomicBool,
    closed: AtomicBool,
    errored: AtomicBool,
    inner: Mutex<Inner>,
}

impl ParentInstance {
    pub fn new(component: ComponentRef, services: ParentServices) -> Arc<Self> {
        let default_context = component.default_context;
        Arc::new(Self {
            uid: new_uid(),
            component,
            services,
            events: LifecycleBus::default(),
            cleanup: CleanupRegistry::new(),
            guard: InstanceGuard::new(),
            init: Deferred::new(),
            rendered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            errored: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                state: RenderState::Created,
                context: default_context,
                raw_props: PropBag::default(),
                props: PropBag::default(),
                instance_state: json!({}),
                page_origin: String::new(),
                matcher: None,
                child_domain: None,
                window: None,
                exports: None,
                driver: None,
                surface: None,
            }),
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn component(&self) -> &ComponentRef {
        &self.component
    }

    pub fn state(&self) -> RenderState {
        self.inner.lock().unwrap().state
    }

    pub fn context(&self) -> RenderContext {
        self.inner.lock().unwrap().context
    }

    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn props(&self) -> PropBag {
        self.inner.lock().unwrap().props.clone()
    }

    pub(crate) fn services(&self) -> &ParentServices {
        &self.services
    }

    pub(crate) fn cleanup(&self) -> &CleanupRegistry {
        &self.cleanup
    }

    pub(crate) fn init_deferred(&self) -> &Deferred<()> {
        &self.init
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.inner.lock().unwrap().window.clone()
    }

    pub fn child_endpoint(&self) -> Option<ChildEndpoint> {
        self.inner.lock().unwrap().exports.clone()
    }

    /// Runs the render sequence to completion. Any failure funnels through
    /// the single error path before this returns.
    pub async fn render(self: &Arc<Self>, request: RenderRequest) -> Result<()> {
        if self.rendered.swap(true, Ordering::SeqCst) {
            return Err(RenderError::AlreadyRendered.into());
        }
        match self.render_flow(request).await {
            Ok(()) => Ok(()),
            Err(err) => {
                match self.fail(err.clone()).await {
                    // A secondary failure while handling the first replaces it.
                    Err(wrapped) => Err(wrapped),
                    Ok(()) => Err(err),
                }
            }
        }
    }

    async fn render_flow(self: &Arc<Self>, request: RenderRequest) -> Result<()> {
        let component = self.component.clone();
        let services = self.services.clone();

        if component.singleton && services.active.contains_tag(component.tag()).await {
            return Err(RenderError::SingletonViolation(component.tag().to_string()).into());
        }
        services
            .active
            .register(self.clone() as Arc<dyn ActiveInstance>)
            .await;

        // Props first: nothing opens until they normalize and validate.
        let instance_state = self.inner.lock().unwrap().instance_state.clone();
        let props = normalize_props(
            component.schema(),
            &request.props,
            &instance_state,
            Some(&self.guard),
        )?;
        check_required(component.schema(), &props)?;
        if let Some(validate) = &component.validate {
            validate(&props).map_err(|reason| {
                TransomError::other(format!(
                    "component '{}' rejected its props: {reason}",
                    component.tag()
                ))
            })?;
        }

        // An adopted window dictates the context; otherwise the request or
        // the component default does.
        let adopted = props.get("window").and_then(|v| v.as_window().cloned());
        let context = match &adopted {
            Some(window) => match window.kind() {
                WindowKind::Popup => RenderContext::Popup,
                _ => RenderContext::Iframe,
            },
            None => request.context.unwrap_or(component.default_context),
        };
        let driver = driver_for(context);

        let page_origin = services.page.domain().await;
        let child_origin = component.origin_for(&props, &page_origin)?;
        let matcher = component.domain_matcher(&props, &page_origin)?;

        if driver.renders_into_container() && adopted.is_none() && request.target.is_none() {
            return Err(RenderError::ContainerRequired {
                tag: component.tag().to_string(),
                context,
            }
            .into());
        }

        let delegated = request.delegate.is_some();
        let local = LocalSurface::new(
            services.page.clone(),
            component.clone(),
            self.uid.clone(),
            context,
            props.clone(),
        );
        let surface = match &request.delegate {
            Some(host) => {
                let endpoint = delegate::establish_link(self, host, context, &props).await?;
                Arc::new(RenderSurface::delegated(
                    local,
                    RemoteSurface::new(
                        services.bus.clone(),
                        host.clone(),
                        endpoint,
                        services.options.delegate_timeout,
                    ),
                    driver.delegated_ops(),
                ))
            }
            None => Arc::new(RenderSurface::direct(local)),
        };

        {
            let mut inner = self.inner.lock().unwrap();
            inner.context = context;
            inner.raw_props = request.props;
            inner.props = props.clone();
            inner.page_origin = page_origin.clone();
            inner.matcher = Some(matcher);
            inner.driver = Some(driver.clone());
            inner.surface = Some(surface.clone());
        }

        self.transition(RenderState::Opening);
        self.register_listeners().await?;

        if let Some(on_render) = self.prop_fn("on_render") {
            on_render
                .call(json!({ "context": context.as_str() }))
                .await?;
        }

        let url = {
            let base = component.url_for(&props)?;
            let query = props_to_query(component.schema(), &props)?;
            extend_query(&base, &query)?
        };

        if let Some(locator) = &request.target {
            surface.open_container(locator).await?;
        }

        let window = match adopted {
            Some(window) => {
                surface.adopt_window(window.clone());
                Some(window)
            }
            None => {
                let ctx = DriverCtx {
                    page: &services.page,
                    surface: surface.as_ref(),
                    component: &component,
                };
                driver.open(&ctx).await?
            }
        };
        if let Some(window) = &window {
            self.inner.lock().unwrap().window = Some(window.clone());
        }
        self.transition(RenderState::WindowOpened);
        self.spawn_watchers(window.as_ref(), &surface).await;

        // The handshake name and the prerender document are independent.
        let name = self
            .build_window_name(context, delegated, &props, &child_origin, &page_origin)
            .await?;
        let prerender_html = (component.prerender_template)(component.tag(), context);
        tokio::try_join!(
            surface.set_window_name(&name),
            surface.open_prerender(&prerender_html),
        )?;
        self.transition(RenderState::HandshakeSent);
        self.transition(RenderState::Prerendering);

        if driver.renders_into_container() {
            surface.show().await?;
        }
        if let Some(on_display) = self.prop_fn("on_display") {
            on_display.call(Value::Null).await?;
        }

        surface.load_url(&url).await?;
        self.spawn_timeout(&props).await;

        self.init.wait().await?;
        self.transition(RenderState::Entered);

        tokio::time::sleep(services.options.prerender_release_delay).await;
        surface.release_prerender().await?;

        self.transition(RenderState::Rendered);
        self.events.publish(LifecycleEvent::Rendered {
            uid: self.uid.clone(),
        });
        if let Some(on_rendered) = self.prop_fn("on_rendered") {
            on_rendered.call(Value::Null).await?;
        }
        self.transition(RenderState::Active);
        Ok(())
    }

    /// Encodes everything the child needs into its window name: how to find
    /// us, how to get its props, and where to call back.
    async fn build_window_name(
        &self,
        context: RenderContext,
        delegated: bool,
        props: &PropBag,
        child_origin: &str,
        page_origin: &str,
    ) -> Result<String> {
        let services = &self.services;
        let same_domain = child_origin == page_origin;

        let parent_ref = if same_domain {
            services
                .scope
                .windows
                .insert(&self.uid, services.page.window())
                .await;
            let scope = services.scope.clone();
            let key = self.uid.clone();
            self.cleanup
                .register(async move {
                    scope.windows.remove(&key).await;
                })
                .await;
            WindowRef::Global {
                uid: self.uid.clone(),
            }
        } else if delegated {
            // A frame-tree position reference is meaningless from inside
            // another window's tree, and a cross-origin child can not use
            // the scope registry.
            return Err(RenderError::Failed(
                "can not hand a cross-origin child a reference to a delegated parent".to_string(),
            )
            .into());
        } else if context == RenderContext::Popup {
            WindowRef::Opener
        } else if services.page.is_top().await {
            WindowRef::Top
        } else {
            WindowRef::Parent {
                distance: services.page.distance_from_top().await,
            }
        };

        let encoded = encode_props_for_child(
            self.component.schema(),
            props,
            same_domain,
            &prop_call_endpoint(&self.uid),
        );
        let props_ref = if same_domain {
            services.scope.props.insert(&self.uid, encoded).await;
            let scope = services.scope.clone();
            let key = self.uid.clone();
            self.cleanup
                .register(async move {
                    scope.props.remove(&key).await;
                })
                .await;
            PropsRef::Uid {
                uid: self.uid.clone(),
            }
        } else {
            PropsRef::Raw { value: encoded }
        };

        let payload = HandshakePayload {
            version: PAYLOAD_VERSION,
            uid: self.uid.clone(),
            tag: self.component.tag().to_string(),
            context,
            parent_domain: page_origin.to_string(),
            parent: parent_ref,
            props: props_ref,
            exports: ExportsRef {
                endpoint: parent_endpoint(&self.uid),
            },
        };
        Ok(encode_window_name(self.component.name(), &payload)?)
    }

    async fn register_listeners(self: &Arc<Self>) -> Result<()> {
        let weak = Arc::downgrade(self);
        let commands: BusHandler = Arc::new(move |message: BusMessage| {
            let weak = weak.clone();
            Box::pin(async move {
                let instance = weak.upgrade().ok_or_else(|| RpcError::Remote {
                    method: "parent".to_string(),
                    message: "instance destroyed".to_string(),
                })?;
                instance.handle_command(message).await
            })
        });
        let guard = self
            .services
            .bus
            .listen(&parent_endpoint(&self.uid), commands)
            .await?;
        self.cleanup
            .register(async move {
                drop(guard);
            })
            .await;

        let weak = Arc::downgrade(self);
        let calls: BusHandler = Arc::new(move |message: BusMessage| {
            let weak = weak.clone();
            Box::pin(async move {
                let instance = weak.upgrade().ok_or_else(|| RpcError::Remote {
                    method: "prop_call".to_string(),
                    message: "instance destroyed".to_string(),
                })?;
                instance.handle_prop_call(message).await
            })
        });
        let guard = self
            .services
            .bus
            .listen(&prop_call_endpoint(&self.uid), calls)
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
        let command: ParentCommand = serde_json::from_value(message.data.clone())?;
        self.check_child_origin(&message.origin)
            .map_err(|err| remote_error("parent", err))?;

        match command {
            ParentCommand::Init { exports } => {
                tracing::debug!(uid = %self.uid, origin = %message.origin, "child initialized");
                {
                    let mut inner = self.inner.lock().unwrap();
                    inner.child_domain = Some(message.origin.clone());
                    inner.exports = Some(ChildEndpoint {
                        window: message.source.clone(),
                        endpoint: exports.endpoint,
                    });
                }
                self.init.resolve(());
                Ok(Value::Null)
            }
            ParentCommand::Close { reason } => {
                self.close(reason)
                    .await
                    .map_err(|err| remote_error("close", err))?;
                Ok(Value::Null)
            }
            ParentCommand::CheckClose => {
                let instance = self.clone();
                tokio::spawn(async move {
                    instance.check_close().await;
                });
                Ok(Value::Null)
            }
            ParentCommand::Resize { width, height } => {
                self.resize(width, height)
                    .await
                    .map_err(|err| remote_error("resize", err))?;
                Ok(Value::Null)
            }
            ParentCommand::Hide => {
                self.hide().await.map_err(|err| remote_error("hide", err))?;
                Ok(Value::Null)
            }
            ParentCommand::Show => {
                self.show().await.map_err(|err| remote_error("show", err))?;
                Ok(Value::Null)
            }
            ParentCommand::Error { message: text } => {
                self.fail(TransomError::other(text))
                    .await
                    .map_err(|err| remote_error("error", err))?;
                Ok(Value::Null)
            }
        }
    }

    async fn handle_prop_call(
        &self,
        message: BusMessage,
    ) -> std::result::Result<Value, RpcError> {
        self.check_child_origin(&message.origin)
            .map_err(|err| remote_error("prop_call", err))?;
        let name = message
            .data
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Remote {
                method: "prop_call".to_string(),
                message: "missing prop name".to_string(),
            })?;
        let payload = message
            .data
            .get("payload")
            .cloned()
            .unwrap_or(Value::Null);
        let props = self.props();
        transom_props::dispatch_prop_call(&props, name, payload)
            .await
            .map_err(|err| remote_error(name, err))
    }

    /// Every inbound child message must come from the origin the component
    /// resolved at render time.
    fn check_child_origin(&self, origin: &str) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        let matcher = inner
            .matcher
            .as_ref()
            .ok_or_else(|| TransomError::other("component is not rendered"))?;
        if !matcher.matches(origin) {
            return Err(SecurityError::DomainNotAllowed {
                tag: self.component.tag().to_string(),
                domain: origin.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn spawn_watchers(self: &Arc<Self>, window: Option<&WindowHandle>, surface: &RenderSurface) {
        let token = CancellationToken::new();
        {
            let token = token.clone();
            self.cleanup
                .register(async move {
                    token.cancel();
                })
                .await;
        }

        if let Some(window) = window {
            watchers::spawn_close_watcher(
                self,
                window.clone(),
                self.services.options.close_watch_interval,
                token.clone(),
            );
        }
        if let Some(frame) = surface.frame_element() {
            watchers::spawn_removal_watcher(self, frame, token.clone());
        }
        if let Some(target) = surface.target() {
            watchers::spawn_removal_watcher(self, target, token.clone());
        }
        watchers::spawn_unload_watcher(self, token);
    }

    async fn spawn_timeout(self: &Arc<Self>, props: &PropBag) {
        let Some(ms) = props.get("timeout").and_then(|v| v.as_f64()) else {
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
        watchers::spawn_timeout_watcher(self, ms as u64, token);
    }

    pub async fn update_props(&self, partial: PropBag) -> Result<()> {
        self.transition(RenderState::UpdatingProps);
        let result = self.apply_props(partial).await;
        self.transition(RenderState::Active);
        result
    }

    async fn apply_props(&self, partial: PropBag) -> Result<()> {
        let schema = self.component.schema();
        let (merged_raw, instance_state) = {
            let mut inner = self.inner.lock().unwrap();
            inner.raw_props.merge(partial.clone());
            (inner.raw_props.clone(), inner.instance_state.clone())
        };
        let normalized = normalize_props(schema, &merged_raw, &instance_state, Some(&self.guard))?;
        check_required(schema, &normalized)?;

        // Forward only what this update touched, under canonical names.
        let mut update = PropBag::default();
        for name in partial.names() {
            let canonical = if schema.get(name).is_some() {
                name.to_string()
            } else {
                schema
                    .iter()
                    .find(|(_, def)| def.alias.as_deref() == Some(name))
                    .map(|(canonical, _)| canonical.to_string())
                    .unwrap_or_else(|| name.to_string())
            };
            if let Some(value) = normalized.get(&canonical) {
                update.set(&canonical, value.clone());
            }
        }

        let (exports, same_domain) = {
            let mut inner = self.inner.lock().unwrap();
            inner.props = normalized;
            let exports = inner
                .exports
                .clone()
                .ok_or_else(|| TransomError::other("child exports not available"))?;
            let same_domain =
                inner.child_domain.as_deref() == Some(inner.page_origin.as_str());
            (exports, same_domain)
        };
        self.events.publish(LifecycleEvent::PropsUpdated {
            uid: self.uid.clone(),
        });

        let encoded = encode_props_for_child(
            schema,
            &update,
            same_domain,
            &prop_call_endpoint(&self.uid),
        );
        let payload = serde_json::to_value(&ChildCommand::UpdateProps { props: encoded })
            .map_err(RpcError::from)?;
        self.services
            .bus
            .call(&exports.window, &exports.endpoint, payload)
            .await?;
        Ok(())
    }

    /// At most one close per instance; later calls are no-ops.
    pub async fn close(&self, reason: CloseReason) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(uid = %self.uid, %reason, "closing");
        self.transition(RenderState::Closing);
        self.events.publish(LifecycleEvent::Closed {
            uid: self.uid.clone(),
            reason,
        });
        self.init
            .reject(RenderError::WindowClosedDuringRender.into());

        if let Some(on_close) = self.prop_fn("on_close") {
            if let Err(err) = on_close.call(json!({ "reason": reason.as_str() })).await {
                tracing::warn!(uid = %self.uid, error = %err, "on_close callback failed");
            }
        }

        let call_child = {
            let inner = self.inner.lock().unwrap();
            inner
                .driver
                .as_ref()
                .map(|driver| driver.call_child_to_close())
                .unwrap_or(false)
        };
        if call_child {
            if let Some(exports) = self.child_endpoint() {
                let bus = self.services.bus.clone();
                let uid = self.uid.clone();
                tokio::spawn(async move {
                    let payload =
                        serde_json::to_value(&ChildCommand::Close).unwrap_or(Value::Null);
                    if let Err(err) = bus.call(&exports.window, &exports.endpoint, payload).await {
                        tracing::debug!(uid = %uid, error = %err, "child close call failed");
                    }
                });
            }
        }

        self.destroy().await
    }

    /// Probes child liveness twice, a beat apart, before treating an unload
    /// as the user closing the window. Reloads survive this.
    pub async fn check_close(&self) {
        let Some(window) = self.window() else {
            return;
        };
        if !window.is_closed().await {
            tokio::time::sleep(self.services.options.check_close_delay).await;
            if !window.is_closed().await {
                return;
            }
        }
        if let Err(err) = self.close(CloseReason::UserClosed).await {
            tracing::debug!(uid = %self.uid, error = %err, "close after unload probe failed");
        }
    }

    pub async fn resize(&self, width: Option<f64>, height: Option<f64>) -> Result<()> {
        let (driver, surface) = self.driver_surface()?;
        let ctx = DriverCtx {
            page: &self.services.page,
            surface: surface.as_ref(),
            component: &self.component,
        };
        driver.resize(&ctx, width, height).await
    }

    pub async fn show(&self) -> Result<()> {
        let (driver, surface) = self.driver_surface()?;
        let ctx = DriverCtx {
            page: &self.services.page,
            surface: surface.as_ref(),
            component: &self.component,
        };
        driver.show(&ctx).await
    }

    pub async fn hide(&self) -> Result<()> {
        let (driver, surface) = self.driver_surface()?;
        let ctx = DriverCtx {
            page: &self.services.page,
            surface: surface.as_ref(),
            component: &self.component,
        };
        driver.hide(&ctx).await
    }

    pub async fn focus(&self) -> Result<()> {
        let window = self
            .window()
            .ok_or_else(|| TransomError::other("no window to focus"))?;
        window.focus().await
    }

    /// The single error path. First failure wins; it is delivered to the
    /// `on_error` prop when one was supplied, and the instance is destroyed
    /// either way. A failure while handling the failure wraps both.
    pub async fn error(&self, err: TransomError) -> Result<()> {
        self.fail(err).await
    }

    pub(crate) async fn fail(&self, err: TransomError) -> Result<()> {
        if self.errored.swap(true, Ordering::SeqCst) {
            tracing::debug!(uid = %self.uid, error = %err, "error after instance already failed");
            return Ok(());
        }
        tracing::warn!(uid = %self.uid, error = %err, "component errored");
        self.transition(RenderState::Erroring);
        self.events.publish(LifecycleEvent::Errored {
            uid: self.uid.clone(),
            message: err.to_string(),
        });
        self.init.reject(err.clone());

        let handler = self.prop_fn("on_error");
        let handled = handler.is_some();
        if let Some(on_error) = handler {
            if let Err(secondary) = on_error.call(json!({ "message": err.to_string() })).await {
                let _ = self.destroy().await;
                return Err(TransomError::double_fault(&err, &secondary));
            }
        }
        if let Err(secondary) = self.destroy().await {
            return Err(TransomError::double_fault(&err, &secondary));
        }
        if !handled {
            tracing::error!(uid = %self.uid, error = %err, "unhandled component error");
        }
        Ok(())
    }

    /// Unwinds the instance: window teardown through the driver, then every
    /// registered cleanup task in reverse order. Safe to call twice.
    pub async fn destroy(&self) -> Result<()> {
        if self.state() != RenderState::Destroyed {
            if !matches!(self.state(), RenderState::Closing | RenderState::Erroring) {
                self.transition(RenderState::Closing);
            }
            self.transition(RenderState::Destroyed);
        }
        self.guard.revoke();
        self.init
            .reject(RenderError::WindowClosedDuringRender.into());
        self.services.active.remove(&self.uid).await;

        let pieces = {
            let inner = self.inner.lock().unwrap();
            match (&inner.driver, &inner.surface) {
                (Some(driver), Some(surface)) => Some((driver.clone(), surface.clone())),
                _ => None,
            }
        };
        let mut failure: Option<TransomError> = None;
        if let Some((driver, surface)) = pieces {
            let ctx = DriverCtx {
                page: &self.services.page,
                surface: surface.as_ref(),
                component: &self.component,
            };
            if let Err(err) = driver.close_window(&ctx).await {
                failure = Some(err);
            }
            if let Err(err) = surface.destroy_remote().await {
                tracing::debug!(uid = %self.uid, error = %err, "delegate teardown failed");
            }
        }
        self.cleanup.run_all().await;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn driver_surface(&self) -> Result<(Arc<dyn ContextDriver>, Arc<RenderSurface>)> {
        let inner = self.inner.lock().unwrap();
        match (&inner.driver, &inner.surface) {
            (Some(driver), Some(surface)) => Ok((driver.clone(), surface.clone())),
            _ => Err(TransomError::other("component is not rendered")),
        }
    }

    fn prop_fn(&self, name: &str) -> Option<PropFunction> {
        self.inner
            .lock()
            .unwrap()
            .props
            .get(name)
            .and_then(|value| value.as_function().cloned())
    }

    fn transition(&self, next: RenderState) -> bool {
        let from = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.state.can_transition(next) {
                tracing::debug!(uid = %self.uid, from = %inner.state, to = %next, "skipping state transition");
                return false;
            }
            let from = inner.state;
            inner.state = next;
            from
        };
        tracing::debug!(uid = %self.uid, %from, to = %next, "state");
        self.events.publish(LifecycleEvent::StateChanged {
            uid: self.uid.clone(),
            state: next,
        });
        true
    }
}

#[async_trait]
impl ActiveInstance for ParentInstance {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn tag(&self) -> &str {
        self.component.tag()
    }

    async fn destroy(&self) -> Result<()> {
        ParentInstance::destroy(self).await
    }
}

fn remote_error(method: &str, err: TransomError) -> RpcError {
    RpcError::Remote {
        method: method.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use transom_component::{Component, ComponentOptions};
    use transom_core::errors::PropError;
    use transom_core::handshake::decode_window_name;
    use transom_props::{PropDefinition, PropFunction, PropKind, PropValue};
    use transom_transport::{ListenerGuard, MemoryEnv, MessageBus, WindowId};

    use crate::commands::ChildExportsRef;

    fn component(tag: &str) -> ComponentRef {
        Arc::new(
            Component::new(ComponentOptions::new(tag, "https://child.example.com/sheet")).unwrap(),
        )
    }

    fn services_for(env: &MemoryEnv, window: &WindowId) -> ParentServices {
        ParentServices {
            page: Arc::new(env.page_for(window)),
            bus: Arc::new(env.bus_for(window)),
            scope: SharedScope::new(),
            active: ActiveInstances::new(),
            options: RuntimeOptions::default(),
        }
    }

    fn fn_prop(calls: &Arc<Mutex<Vec<Value>>>) -> PropValue {
        let calls = calls.clone();
        PropValue::Function(PropFunction::from_sync(move |payload| {
            calls.lock().unwrap().push(payload);
            Ok(Value::Null)
        }))
    }

    struct FakeChild {
        id: WindowId,
        payload: HandshakePayload,
        url: String,
        commands: Arc<Mutex<Vec<ChildCommand>>>,
        _listener: ListenerGuard,
    }

    /// Renders `instance` into `#checkout` and plays the child's half of
    /// the handshake by hand: decode the window name, listen for child
    /// commands, send init.
    async fn boot_with_fake_child(
        env: &MemoryEnv,
        top: &WindowId,
        instance: &Arc<ParentInstance>,
        props: PropBag,
    ) -> FakeChild {
        env.add_element(top, "#checkout");
        let (navigated_tx, mut navigated) = mpsc::unbounded_channel();
        env.on_navigate(move |window, url| {
            let _ = navigated_tx.send((window, url));
        });

        let task = {
            let instance = instance.clone();
            let mut request = RenderRequest::new(props);
            request.target = Some(ElementLocator::from("#checkout"));
            tokio::spawn(async move { instance.render(request).await })
        };

        let (child_id, url) = navigated.recv().await.unwrap();
        let payload = decode_window_name(&env.window_name(&child_id).unwrap()).unwrap();

        let commands = Arc::new(Mutex::new(Vec::new()));
        let child_bus = env.bus_for(&child_id);
        let recorder = commands.clone();
        let handler: BusHandler = Arc::new(move |message: BusMessage| {
            let recorder = recorder.clone();
            Box::pin(async move {
                let command: ChildCommand = serde_json::from_value(message.data)?;
                recorder.lock().unwrap().push(command);
                Ok(Value::Null)
            })
        });
        let listener = child_bus.listen("fake_child_commands", handler).await.unwrap();

        let init = serde_json::to_value(&ParentCommand::Init {
            exports: ChildExportsRef {
                endpoint: "fake_child_commands".to_string(),
            },
        })
        .unwrap();
        let parent_handle = env.handle_for(&child_id, top);
        child_bus
            .call(&parent_handle, &payload.exports.endpoint, init)
            .await
            .unwrap();

        task.await.unwrap().unwrap();
        FakeChild {
            id: child_id,
            payload,
            url,
            commands,
            _listener: listener,
        }
    }

    async fn settle(instance: &Arc<ParentInstance>, state: RenderState) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while instance.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn iframe_render_completes_with_cooperating_child() {
        let env = MemoryEnv::new();
        let top = env.create_top_window("https://merchant.example.com");
        let instance = ParentInstance::new(component("pay-sheet"), services_for(&env, &top));

        let on_close_calls = Arc::new(Mutex::new(Vec::new()));
        let mut props = PropBag::default();
        props.set("amount", PropValue::Json(json!(42)));
        props.set("on_close", fn_prop(&on_close_calls));

        let child = boot_with_fake_child(&env, &top, &instance, props).await;
        assert!(child.url.starts_with("https://child.example.com/sheet"));
        assert_eq!(child.payload.tag, "pay-sheet");
        assert_eq!(child.payload.parent_domain, "https://merchant.example.com");
        assert!(matches!(child.payload.parent, WindowRef::Top));
        match &child.payload.props {
            PropsRef::Raw { value } => {
                assert_eq!(value.get("amount"), Some(&json!(42)));
            }
            other => panic!("cross-origin child should get raw props, got {other:?}"),
        }

        assert_eq!(instance.state(), RenderState::Active);
        assert!(instance.window().is_some());
        assert!(instance.child_endpoint().is_some());

        let mut update = PropBag::default();
        update.set("amount", PropValue::Json(json!(43)));
        instance.update_props(update).await.unwrap();
        {
            let commands = child.commands.lock().unwrap();
            assert_eq!(commands.len(), 1);
            match &commands[0] {
                ChildCommand::UpdateProps { props } => {
                    assert_eq!(props.get("amount"), Some(&json!(43)));
                }
                other => panic!("expected an update, got {other:?}"),
            }
        }
        assert_eq!(instance.state(), RenderState::Active);

        instance.close(CloseReason::ParentCall).await.unwrap();
        assert_eq!(instance.state(), RenderState::Destroyed);
        assert_eq!(on_close_calls.lock().unwrap().len(), 1);
        // Iframe teardown closes the frame window with the container.
        assert!(env.is_window_closed(&child.id));

        instance.close(CloseReason::ParentCall).await.unwrap();
        assert_eq!(on_close_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn render_without_container_fails_for_iframe() {
        let env = MemoryEnv::new();
        let top = env.create_top_window("https://merchant.example.com");
        let services = services_for(&env, &top);
        let instance = ParentInstance::new(component("pay-sheet"), services.clone());

        let err = instance
            .render(RenderRequest::new(PropBag::default()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransomError::Render(RenderError::ContainerRequired { .. })
        ));
        assert_eq!(instance.state(), RenderState::Destroyed);
        assert!(services.active.is_empty().await);
    }

    #[tokio::test]
    async fn render_times_out_when_no_child_initializes() {
        let env = MemoryEnv::new();
        let top = env.create_top_window("https://merchant.example.com");
        env.add_element(&top, "#checkout");
        let instance = ParentInstance::new(component("pay-sheet"), services_for(&env, &top));

        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut props = PropBag::default();
        props.set("timeout", PropValue::Json(json!(40)));
        props.set("on_error", fn_prop(&errors));

        let mut request = RenderRequest::new(props);
        request.target = Some(ElementLocator::from("#checkout"));
        let err = instance.render(request).await.unwrap_err();
        assert!(matches!(
            err,
            TransomError::Render(RenderError::Timeout { .. })
        ));

        settle(&instance, RenderState::Destroyed).await;
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        let message = errors[0]["message"].as_str().unwrap();
        assert!(message.contains("pay-sheet"));
    }

    #[tokio::test]
    async fn blocked_popup_fails_with_popup_blocked() {
        let env = MemoryEnv::new();
        env.block_popups(true);
        let top = env.create_top_window("https://merchant.example.com");
        let services = services_for(&env, &top);
        let instance = ParentInstance::new(component("pay-sheet"), services.clone());

        let mut request = RenderRequest::new(PropBag::default());
        request.context = Some(RenderContext::Popup);
        let err = instance.render(request).await.unwrap_err();
        assert!(matches!(
            err,
            TransomError::Render(RenderError::PopupBlocked)
        ));
        assert_eq!(instance.state(), RenderState::Destroyed);
        assert!(instance.cleanup.is_cleaned().await);
        assert!(services.active.is_empty().await);
    }

    #[tokio::test]
    async fn singleton_second_render_is_rejected() {
        let env = MemoryEnv::new();
        let top = env.create_top_window("https://merchant.example.com");
        env.add_element(&top, "#checkout");

        let mut options = ComponentOptions::new("pay-once", "https://child.example.com/sheet");
        options.singleton = true;
        let component: ComponentRef = Arc::new(Component::new(options).unwrap());
        let services = services_for(&env, &top);

        let first = ParentInstance::new(component.clone(), services.clone());
        let task = {
            let first = first.clone();
            let mut request = RenderRequest::new(PropBag::default());
            request.target = Some(ElementLocator::from("#checkout"));
            tokio::spawn(async move { first.render(request).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = ParentInstance::new(component, services.clone());
        let mut request = RenderRequest::new(PropBag::default());
        request.target = Some(ElementLocator::from("#checkout"));
        let err = second.render(request).await.unwrap_err();
        assert!(matches!(
            err,
            TransomError::Render(RenderError::SingletonViolation(_))
        ));

        first.destroy().await.unwrap();
        assert!(task.await.unwrap().is_err());
        assert!(services.active.is_empty().await);
    }

    #[tokio::test]
    async fn missing_required_prop_fails_before_anything_opens() {
        let env = MemoryEnv::new();
        let top = env.create_top_window("https://merchant.example.com");
        env.add_element(&top, "#checkout");
        let (navigated_tx, mut navigated) = mpsc::unbounded_channel();
        env.on_navigate(move |window, url| {
            let _ = navigated_tx.send((window, url));
        });

        let mut options = ComponentOptions::new("pay-sheet", "https://child.example.com/sheet");
        options
            .props
            .define("amount", PropDefinition::new(PropKind::Number));
        let component: ComponentRef = Arc::new(Component::new(options).unwrap());
        let instance = ParentInstance::new(component, services_for(&env, &top));

        let mut request = RenderRequest::new(PropBag::default());
        request.target = Some(ElementLocator::from("#checkout"));
        let err = instance.render(request).await.unwrap_err();
        assert!(matches!(
            err,
            TransomError::Prop(PropError::Required(ref name)) if name == "amount"
        ));

        // No window was opened and the failed instance cleaned up after
        // itself.
        assert!(navigated.try_recv().is_err());
        assert_eq!(instance.state(), RenderState::Destroyed);
        assert!(instance.cleanup.is_cleaned().await);
    }

    #[tokio::test]
    async fn commands_from_foreign_origins_are_rejected() {
        let env = MemoryEnv::new();
        let top = env.create_top_window("https://merchant.example.com");
        let instance = ParentInstance::new(component("pay-sheet"), services_for(&env, &top));
        let child = boot_with_fake_child(&env, &top, &instance, PropBag::default()).await;

        let intruder = env.create_top_window("https://evil.example.com");
        let intruder_bus = env.bus_for(&intruder);
        let parent_handle = env.handle_for(&intruder, &top);
        let close = serde_json::to_value(&ParentCommand::Close {
            reason: CloseReason::ChildCall,
        })
        .unwrap();
        let err = intruder_bus
            .call(&parent_handle, &child.payload.exports.endpoint, close)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("evil.example.com"));
        assert_eq!(instance.state(), RenderState::Active);
    }
}
