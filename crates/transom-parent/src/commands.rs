//! Wire shapes for everything a parent instance says or hears over the
//! message bus: the command surface it exports to its child, the commands
//! it sends back, and the delegation protocol. All of these are internally
//! tagged so a foreign payload fails to decode instead of half-matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use transom_core::types::{CloseReason, RenderContext};

/// Where a child reaches its parent's command listener.
pub fn parent_endpoint(uid: &str) -> String {
    format!("transom_parent_{uid}")
}

/// Where function-valued props are invoked.
pub fn prop_call_endpoint(uid: &str) -> String {
    format!("transom_prop_call_{uid}")
}

/// Where a parent reaches the child's command listener, as exported by the
/// child's init call.
pub fn child_endpoint(uid: &str) -> String {
    format!("transom_child_{uid}")
}

/// Delegation probe, registered per component name on a potential host.
pub fn allow_delegate_method(component_name: &str) -> String {
    format!("transom_allow_delegate_{component_name}")
}

/// Delegation request, registered next to the probe.
pub fn delegate_method(component_name: &str) -> String {
    format!("transom_delegate_{component_name}")
}

/// Per-render surface a delegate host serves operations on.
pub fn delegate_surface_endpoint(uid: &str) -> String {
    format!("transom_delegate_surface_{uid}")
}

/// Per-render listener a requester serves delegate host callbacks on.
pub fn delegate_events_endpoint(uid: &str) -> String {
    format!("transom_delegate_events_{uid}")
}

/// Commands the child sends to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentCommand {
    /// First contact. Carries where the parent can reach the child back.
    Init { exports: ChildExportsRef },
    Close { reason: CloseReason },
    /// The child window is unloading; probe whether it actually went away.
    CheckClose,
    Resize {
        width: Option<f64>,
        height: Option<f64>,
    },
    Hide,
    Show,
    Error { message: String },
}

/// Commands the parent sends to its child, on the endpoint the child
/// handed over at init.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildCommand {
    /// Partial update; values already encoded for the wire.
    UpdateProps { props: Value },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildExportsRef {
    pub endpoint: String,
}

/// Asks a window to host the DOM side of a render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateRequest {
    pub uid: String,
    pub tag: String,
    pub context: RenderContext,
    /// Encoded subset of props whose definitions opt into delegation.
    pub props: Value,
    /// Bus method on the requester for host-to-parent callbacks.
    pub events: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateResponse {
    /// Bus method the host serves [`SurfaceOp`]s on.
    pub surface: String,
}

/// Callbacks a delegate host routes back to the requesting parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DelegateEvent {
    /// The host saw the child window or its container go away.
    CloseDetected,
    /// A user action in the host's UI closed the component.
    UserClose,
    Error { message: String },
}

/// One forwarded surface operation. The host applies it to the container,
/// frame and prerender state it keeps for this render.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SurfaceOp {
    OpenContainer {
        selector: String,
    },
    Open,
    OpenPrerender {
        html: String,
    },
    ReleasePrerender,
    SetWindowName {
        name: String,
    },
    LoadUrl {
        url: String,
    },
    Show,
    Hide,
    Resize {
        width: Option<f64>,
        height: Option<f64>,
    },
    DestroyContainer,
    /// Tear down everything the host holds for this render.
    Destroy,
}
