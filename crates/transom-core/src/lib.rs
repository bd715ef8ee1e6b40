pub mod cleanup;
pub mod config;
pub mod deferred;
pub mod errors;
pub mod handshake;
pub mod id;
pub mod lifecycle;
pub mod matcher;
pub mod types;

pub use cleanup::CleanupRegistry;
pub use config::RuntimeOptions;
pub use deferred::Deferred;
pub use errors::{
    ChildError, DefinitionError, PayloadError, PropError, RenderError, RpcError, SecurityError,
    TransomError,
};
pub use handshake::{
    decode_window_name, encode_window_name, ExportsRef, HandshakePayload, PropsRef, WindowRef,
    PAYLOAD_VERSION,
};
pub use id::{new_short_uid, new_uid, InstanceId};
pub use lifecycle::{LifecycleBus, LifecycleEvent, RenderState};
pub use matcher::DomainMatcher;
pub use types::{CloseReason, CssSize, Dimensions, RenderContext};

pub type Result<T> = std::result::Result<T, TransomError>;
