//! Background tasks that watch a rendered child for disappearing out from
//! under us. Each holds only a weak reference to its instance and stops on
//! the instance's cleanup token.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use transom_core::errors::RenderError;
use transom_core::types::CloseReason;
use transom_transport::{ElementRef, WindowHandle};

use crate::instance::ParentInstance;

/// Polls the child window until it reports closed, then runs the close path.
pub(crate) fn spawn_close_watcher(
    instance: &Arc<ParentInstance>,
    window: WindowHandle,
    interval: Duration,
    token: CancellationToken,
) {
    let weak = Arc::downgrade(instance);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if window.is_closed().await {
                close_detected(&weak).await;
                return;
            }
        }
    });
}

/// Fires when the container or frame element leaves the document.
pub(crate) fn spawn_removal_watcher(
    instance: &Arc<ParentInstance>,
    element: ElementRef,
    token: CancellationToken,
) {
    let weak = Arc::downgrade(instance);
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = element.wait_removed() => {
                close_detected(&weak).await;
            }
        }
    });
}

/// Tears the instance down when our own page unloads.
pub(crate) fn spawn_unload_watcher(instance: &Arc<ParentInstance>, token: CancellationToken) {
    let weak = Arc::downgrade(instance);
    let unload = instance.services().page.unload_token();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = unload.cancelled() => {
                if let Some(instance) = weak.upgrade() {
                    if let Err(err) = instance.destroy().await {
                        tracing::debug!(error = %err, "destroy on page unload failed");
                    }
                }
            }
        }
    });
}

/// Fails the render if the child does not initialize within its deadline.
pub(crate) fn spawn_timeout_watcher(
    instance: &Arc<ParentInstance>,
    ms: u64,
    token: CancellationToken,
) {
    let weak = Arc::downgrade(instance);
    let init = instance.init_deferred().clone();
    let tag = instance.component().tag().to_string();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = init.wait() => {}
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                if let Some(instance) = weak.upgrade() {
                    let err = RenderError::Timeout { tag, ms };
                    if let Err(err) = instance.fail(err.into()).await {
                        tracing::debug!(error = %err, "timeout error path failed");
                    }
                }
            }
        }
    });
}

async fn close_detected(weak: &Weak<ParentInstance>) {
    let Some(instance) = weak.upgrade() else {
        return;
    };
    if let Err(err) = instance.close(CloseReason::CloseDetected).await {
        tracing::debug!(error = %err, "close after window disappeared failed");
    }
}
