//! End-to-end protocol tests: parent and child run against the shared
//! in-memory environment, talking only through the runtime surface.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use transom_component::ComponentOptions;
use transom_core::errors::RenderError;
use transom_core::{RenderContext, RenderState, Result, TransomError};
use transom_props::{PropBag, PropFunction, PropValue};
use transom_transport::{MemoryEnv, SharedScope, WindowId};

use crate::adapter::HostAdapter;
use crate::handle::{ComponentHandle, RenderHandle};
use crate::runtime::Runtime;
use crate::{ChildInstance, ElementRef};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transom=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn runtime_for(env: &MemoryEnv, window: &WindowId) -> Runtime {
    init_tracing();
    Runtime::new(
        Arc::new(env.page_for(window)),
        Arc::new(env.bus_for(window)),
        SharedScope::new(),
    )
}

fn options(tag: &str) -> ComponentOptions {
    ComponentOptions::new(tag, "https://child.example.com/sheet")
}

fn fn_prop(calls: &Arc<Mutex<Vec<Value>>>) -> PropValue {
    let calls = calls.clone();
    PropValue::Function(PropFunction::from_sync(move |payload| {
        calls.lock().unwrap().push(payload);
        Ok(Value::Null)
    }))
}

/// Renders through one runtime and attaches a child through another, the
/// way two real documents would.
async fn boot(
    env: &MemoryEnv,
    top: &WindowId,
    options: ComponentOptions,
    props: PropBag,
) -> (RenderHandle, Arc<ChildInstance>, WindowId) {
    env.add_element(top, "#checkout");
    let (tx, mut navigated) = mpsc::unbounded_channel();
    env.on_navigate(move |window, url| {
        let _ = tx.send((window, url));
    });

    let parent_runtime = runtime_for(env, top);
    let handle = parent_runtime.create(options.clone()).await.unwrap();
    let render = tokio::spawn({
        let handle = handle.clone();
        async move { handle.render_to("#checkout", props).await }
    });

    let (child_id, _) = navigated.recv().await.unwrap();
    let child_runtime = runtime_for(env, &child_id);
    child_runtime.create(options).await.unwrap();
    let child = child_runtime.attach().await.unwrap();

    let rendered = render.await.unwrap().unwrap();
    (rendered, child, child_id)
}

#[tokio::test]
async fn iframe_round_trip_through_the_runtime() {
    let env = MemoryEnv::new();
    let top = env.create_top_window("https://merchant.example.com");

    let greetings = Arc::new(Mutex::new(Vec::new()));
    let closes = Arc::new(Mutex::new(Vec::new()));
    let mut props = PropBag::default();
    props.set("amount", PropValue::Json(json!(42)));
    props.set("greet", fn_prop(&greetings));
    props.set("on_close", fn_prop(&closes));

    let (handle, child, child_id) = boot(&env, &top, options("pay-sheet"), props).await;
    assert_eq!(handle.state(), RenderState::Active);
    assert_eq!(handle.context(), RenderContext::Iframe);
    assert_eq!(child.tag(), "pay-sheet");

    // The child drives a parent function prop over the bus.
    let greet = child
        .props()
        .get("greet")
        .and_then(|value| value.as_function())
        .cloned()
        .unwrap();
    greet.call(json!("hi")).await.unwrap();
    assert_eq!(greetings.lock().unwrap().as_slice(), &[json!("hi")]);

    // Parent-side surface ops land on the child window.
    handle.focus().await.unwrap();
    assert!(env.was_focused(&child_id));

    // Closing twice reports on_close exactly once.
    handle.close().await.unwrap();
    handle.close().await.unwrap();
    assert_eq!(handle.state(), RenderState::Destroyed);
    assert_eq!(closes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn popup_render_is_blocked_cleanly() {
    let env = MemoryEnv::new();
    let top = env.create_top_window("https://merchant.example.com");
    env.block_popups(true);

    let runtime = runtime_for(&env, &top);
    let mut popup = options("pay-popup");
    popup.default_context = RenderContext::Popup;
    let handle = runtime.create(popup).await.unwrap();

    let err = handle.render(PropBag::default()).await.unwrap_err();
    assert!(matches!(
        err,
        TransomError::Render(RenderError::PopupBlocked)
    ));
    runtime.destroy_all().await.unwrap();
}

#[tokio::test]
async fn attach_requires_a_registered_component() {
    let env = MemoryEnv::new();
    let top = env.create_top_window("https://merchant.example.com");
    env.add_element(&top, "#checkout");
    let (tx, mut navigated) = mpsc::unbounded_channel();
    env.on_navigate(move |window, url| {
        let _ = tx.send((window, url));
    });

    let parent_runtime = runtime_for(&env, &top);
    assert!(!parent_runtime.is_child().await);
    let handle = parent_runtime.create(options("pay-sheet")).await.unwrap();
    let render = tokio::spawn({
        let handle = handle.clone();
        async move { handle.render_to("#checkout", PropBag::default()).await }
    });

    let (child_id, _) = navigated.recv().await.unwrap();
    let child_runtime = runtime_for(&env, &child_id);
    assert!(child_runtime.is_child().await);

    // No component created in this window yet.
    let err = child_runtime.attach().await.unwrap_err();
    assert!(err.to_string().contains("no component created"));

    child_runtime.create(options("pay-sheet")).await.unwrap();
    let child = child_runtime.attach().await.unwrap();
    assert_eq!(child.tag(), "pay-sheet");
    render.await.unwrap().unwrap();
    parent_runtime.destroy_all().await.unwrap();
}

#[tokio::test]
async fn destroy_all_drains_pending_renders() {
    let env = MemoryEnv::new();
    let top = env.create_top_window("https://merchant.example.com");
    env.add_element(&top, "#a");
    env.add_element(&top, "#b");
    let (tx, mut navigated) = mpsc::unbounded_channel();
    env.on_navigate(move |window, url| {
        let _ = tx.send((window, url));
    });

    let runtime = runtime_for(&env, &top);
    let sheet = runtime.create(options("sheet-a")).await.unwrap();
    let panel = runtime.create(options("sheet-b")).await.unwrap();

    let render_a = tokio::spawn({
        let sheet = sheet.clone();
        async move { sheet.render_to("#a", PropBag::default()).await }
    });
    let render_b = tokio::spawn({
        let panel = panel.clone();
        async move { panel.render_to("#b", PropBag::default()).await }
    });
    // Both children have opened; neither will ever init.
    navigated.recv().await.unwrap();
    navigated.recv().await.unwrap();

    runtime.destroy_all().await.unwrap();

    for render in [render_a, render_b] {
        let err = render.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            TransomError::Render(RenderError::WindowClosedDuringRender)
        ));
    }
    // Nothing left to drain.
    runtime.destroy_all().await.unwrap();
}

struct SlotAdapter {
    env: MemoryEnv,
    top: WindowId,
    mounted: Arc<Mutex<Vec<String>>>,
    unmounted: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl HostAdapter for SlotAdapter {
    fn framework(&self) -> &str {
        "test-harness"
    }

    async fn mount(&self, _component: &ComponentHandle, _props: &PropBag) -> Result<ElementRef> {
        let element = self.env.add_element(&self.top, "#adapter-slot");
        self.mounted.lock().unwrap().push(element.id().to_string());
        Ok(element)
    }

    async fn unmount(&self, element: ElementRef) {
        self.unmounted.lock().unwrap().push(element.id().to_string());
    }
}

#[tokio::test]
async fn adapter_unmounts_after_the_render_is_destroyed() {
    let env = MemoryEnv::new();
    let top = env.create_top_window("https://merchant.example.com");
    let (tx, mut navigated) = mpsc::unbounded_channel();
    env.on_navigate(move |window, url| {
        let _ = tx.send((window, url));
    });

    let mounted = Arc::new(Mutex::new(Vec::new()));
    let unmounted = Arc::new(Mutex::new(Vec::new()));
    let adapter = Arc::new(SlotAdapter {
        env: env.clone(),
        top: top.clone(),
        mounted: mounted.clone(),
        unmounted: unmounted.clone(),
    });

    let parent_runtime = runtime_for(&env, &top);
    let handle = parent_runtime.create(options("pay-sheet")).await.unwrap();
    let render = tokio::spawn({
        let handle = handle.clone();
        let adapter = adapter.clone();
        async move { handle.render_mounted(adapter, PropBag::default()).await }
    });

    let (child_id, _) = navigated.recv().await.unwrap();
    let child_runtime = runtime_for(&env, &child_id);
    child_runtime.create(options("pay-sheet")).await.unwrap();
    let _child = child_runtime.attach().await.unwrap();
    let rendered = render.await.unwrap().unwrap();

    assert_eq!(mounted.lock().unwrap().len(), 1);
    assert!(unmounted.lock().unwrap().is_empty());

    rendered.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while unmounted.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*mounted.lock().unwrap(), *unmounted.lock().unwrap());
}
