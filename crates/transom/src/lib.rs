//! Cross-window component framework: define a component once, render it
//! from a parent document into an iframe or popup, and drive props, events,
//! and lifecycle across the window boundary over a message bus.
//!
//! The [`Runtime`] is the entry point. A parent document creates component
//! definitions and renders them; the document loaded inside the opened
//! window attaches with the same runtime surface and becomes the child half
//! of the pair. All window, DOM, and messaging access goes through the
//! capability traits in `transom-transport`, so the whole protocol runs
//! unchanged against the bundled in-memory environment in tests.

pub mod adapter;
pub mod handle;
pub mod runtime;

#[cfg(test)]
mod tests;

pub use adapter::HostAdapter;
pub use handle::{ComponentHandle, RenderHandle};
pub use runtime::Runtime;

pub use transom_child::{ChildInstance, PropObserver};
pub use transom_component::{
    AutoResize, Component, ComponentOptions, ComponentRef, ContainerTemplate, PrerenderTemplate,
    TemplateContext, UrlSource,
};
pub use transom_core::{
    CloseReason, CssSize, Dimensions, DomainMatcher, LifecycleEvent, RenderContext, RenderState,
    Result, RuntimeOptions, TransomError,
};
pub use transom_parent::{DelegateHost, ElementLocator, RenderRequest};
pub use transom_props::{
    PropBag, PropDefinition, PropFunction, PropKind, PropSchema, PropValue,
};
pub use transom_transport::{
    BusRef, ElementRef, MemoryEnv, MessageBus, Page, PageRef, RemoteWindow, SharedScope,
    WindowHandle, WindowId,
};
