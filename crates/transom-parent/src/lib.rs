//! Parent-side rendering. [`ParentInstance`] drives one render through its
//! state machine: normalize props, open a window through a context driver,
//! hand the child its handshake payload via the window name, then serve
//! commands and prop calls until something closes it. The surface layer
//! splits every DOM-touching step so a delegating window can forward those
//! steps to a host window instead.

pub mod commands;
pub mod delegate;
pub mod drivers;
pub mod instance;
pub mod surface;
pub(crate) mod watchers;

pub use commands::{
    allow_delegate_method, child_endpoint, delegate_events_endpoint, delegate_method,
    delegate_surface_endpoint, parent_endpoint, prop_call_endpoint, ChildCommand, ChildExportsRef,
    DelegateEvent, DelegateRequest, DelegateResponse, ParentCommand, SurfaceOp,
};
pub use delegate::{can_render_to, DelegateHost};
pub use drivers::{driver_for, ContextDriver, DriverCtx};
pub use instance::{ChildEndpoint, ParentInstance, ParentServices, RenderRequest};
pub use surface::{ElementLocator, LocalSurface, OpKind, RemoteSurface, RenderSurface};
