use async_trait::async_trait;
use serde_json::Value;

use transom_core::errors::RpcError;

use crate::bus::{BusHandler, BusMessage, ListenerGuard, MessageBus};
use crate::window::{WindowHandle, WindowId};

use super::MemoryEnv;

/// `MessageBus` scoped to one window of a [`MemoryEnv`]. Calls are routed
/// to the target window's registered handler and awaited in-process.
#[derive(Clone)]
pub struct MemoryBus {
    env: MemoryEnv,
    window: WindowId,
}

impl MemoryBus {
    pub(crate) fn new(env: MemoryEnv, window: WindowId) -> Self {
        Self { env, window }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn source_window(&self) -> &WindowId {
        &self.window
    }

    async fn call(
        &self,
        target: &WindowHandle,
        method: &str,
        data: Value,
    ) -> Result<Value, RpcError> {
        if self.env.is_window_closed(target.id()) {
            return Err(RpcError::WindowClosed);
        }
        let handler = self
            .env
            .listener(target.id(), method)
            .ok_or_else(|| RpcError::NoListener(method.to_string()))?;
        let origin = self.env.window_domain(&self.window).unwrap_or_default();
        // The receiver sees the caller's window from its own vantage point.
        let source = self.env.handle_for(target.id(), &self.window);
        handler(BusMessage {
            source,
            origin,
            data,
        })
        .await
    }

    async fn listen(&self, method: &str, handler: BusHandler) -> Result<ListenerGuard, RpcError> {
        if !self.env.add_listener(&self.window, method, handler) {
            return Err(RpcError::ListenerExists(method.to_string()));
        }
        let env = self.env.clone();
        let window = self.window.clone();
        let method = method.to_string();
        Ok(ListenerGuard::new(move || {
            env.remove_listener(&window, &method);
        }))
    }
}
