use futures_util::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

use transom_core::errors::RpcError;

use crate::window::{WindowHandle, WindowId};

/// An inbound call: who sent it, from which origin, and the payload.
pub struct BusMessage {
    pub source: WindowHandle,
    pub origin: String,
    pub data: Value,
}

pub type BusHandler =
    Arc<dyn Fn(BusMessage) -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

/// Unregisters its listener when dropped.
pub struct ListenerGuard {
    unlisten: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("armed", &self.unlisten.is_some())
            .finish()
    }
}

impl ListenerGuard {
    pub fn new(unlisten: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unlisten: Some(Box::new(unlisten)),
        }
    }

    /// A guard that does nothing on drop.
    pub fn noop() -> Self {
        Self { unlisten: None }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(unlisten) = self.unlisten.take() {
            unlisten();
        }
    }
}

/// Typed request/reply messaging between windows. One listener per method
/// name per window; calls to a window with no listener fail rather than
/// queue.
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    /// The window this bus handle sends from.
    fn source_window(&self) -> &WindowId;

    async fn call(&self, target: &WindowHandle, method: &str, data: Value)
        -> Result<Value, RpcError>;

    async fn listen(&self, method: &str, handler: BusHandler) -> Result<ListenerGuard, RpcError>;
}

pub type BusRef = Arc<dyn MessageBus>;
