//! Turning a decoded handshake payload into a parent window handle and the
//! initial props value.

use serde_json::Value;

use transom_core::errors::ChildError;
use transom_core::handshake::{HandshakePayload, PropsRef, WindowRef};
use transom_core::Result;
use transom_transport::{PageRef, WindowHandle};

/// Follows the payload's window reference back to the parent.
pub async fn resolve_parent(page: &PageRef, payload: &HandshakePayload) -> Result<WindowHandle> {
    let parent = match &payload.parent {
        WindowRef::Opener => page.opener().await,
        WindowRef::Top => Some(page.top().await),
        WindowRef::Parent { distance } => page.nth_parent_from_top(*distance).await,
        WindowRef::Global { uid } => page.find_registered_window(uid).await,
    };
    match parent {
        Some(parent) => Ok(parent),
        None => Err(ChildError::ParentNotFound(payload.tag.clone()).into()),
    }
}

/// Fetches the initial props: verbatim from the payload, or parked in the
/// parent's scope when both sides share an origin.
pub async fn resolve_props(
    page: &PageRef,
    parent: &WindowHandle,
    payload: &HandshakePayload,
) -> Result<Value> {
    match &payload.props {
        PropsRef::Raw { value } => Ok(value.clone()),
        PropsRef::Uid { uid } => {
            if let Some(url) = page.window().url().await {
                if url.starts_with("file://") {
                    return Err(ChildError::PropsAccessFile.into());
                }
            }
            let scope = page
                .scope_of(parent)
                .await
                .ok_or(ChildError::PropsAccessDenied)?;
            let value = scope
                .props
                .get(uid)
                .await
                .ok_or_else(|| ChildError::PropsMissing(uid.clone()))?;
            Ok(value)
        }
    }
}
