//! Child-side runtime. A document rendered by a parent calls
//! [`ChildInstance::attach`] once: it parses the handshake payload out of
//! the window name, resolves the parent window, pulls props across the
//! boundary, and reports in. From then on the instance serves parent
//! commands, watches its own unload, and streams resize updates.

mod autoresize;
pub mod instance;
pub mod resolve;

pub use instance::{ChildInstance, PropObserver};
