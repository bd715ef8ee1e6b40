//! Watches the child's content element and reports size changes to the
//! parent, debounced so layout bursts collapse into one resize.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use transom_parent::ParentCommand;
use transom_transport::ElementRef;

use crate::instance::ChildInstance;

pub(crate) fn spawn(instance: &Arc<ChildInstance>, element: ElementRef, token: CancellationToken) {
    let weak = Arc::downgrade(instance);
    let debounce = instance.options().resize_debounce;
    let report_width = instance.component().auto_resize.width;
    let report_height = instance.component().auto_resize.height;
    tokio::spawn(async move {
        let mut updates = element.size_updates();
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                changed = updates.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            // Let a burst of layout changes settle before reporting.
            loop {
                match tokio::time::timeout(debounce, updates.changed()).await {
                    Ok(Ok(())) => continue,
                    Ok(Err(_)) => return,
                    Err(_) => break,
                }
            }
            let (width, height) = *updates.borrow();
            let Some(instance) = weak.upgrade() else { return };
            let command = ParentCommand::Resize {
                width: report_width.then_some(width),
                height: report_height.then_some(height),
            };
            if let Err(err) = instance.report(command).await {
                tracing::debug!(error = %err, "resize report failed");
            }
        }
    });
}
