//! Capability traits for the cross-window control plane.
//!
//! Nothing here talks to a real browser. `RemoteWindow`, `MessageBus`, and
//! `Page` describe what a host environment must provide: open and inspect
//! windows, send typed messages between them, and manipulate the handful of
//! elements the control plane cares about. The `memory` module implements
//! all of it in-process so the full parent/child protocol can run inside a
//! single test.

pub mod bus;
pub mod memory;
pub mod page;
pub mod store;
pub mod window;

pub use bus::{BusHandler, BusMessage, BusRef, ListenerGuard, MessageBus};
pub use memory::{MemoryBus, MemoryEnv, MemoryPage};
pub use page::{AttributeMap, ElementHandle, ElementRef, FrameHandle, Page, PageRef, PopupOptions};
pub use store::{KeyedStore, SharedScope};
pub use window::{RemoteWindow, WindowHandle, WindowId, WindowKind};
