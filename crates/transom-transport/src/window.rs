use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use transom_core::id::new_uid;
use transom_core::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    pub fn new() -> Self {
        Self(new_uid())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for WindowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for WindowId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Top,
    Frame,
    Popup,
}

/// A window that may live in another browsing context. Operations that a
/// real host can not perform across origins surface as `None` or errors;
/// callers must treat both as "not ours to read".
#[async_trait]
pub trait RemoteWindow: Send + Sync {
    fn id(&self) -> &WindowId;

    fn kind(&self) -> WindowKind;

    async fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<()>;

    async fn focus(&self) -> Result<()>;

    async fn name(&self) -> Result<String>;

    async fn set_name(&self, name: &str) -> Result<()>;

    async fn load_url(&self, url: &str) -> Result<()>;

    /// The window's current url, when readable from the caller's origin.
    async fn url(&self) -> Option<String>;

    /// The window's origin, when readable from the caller's origin.
    async fn domain(&self) -> Option<String>;
}

pub type WindowHandle = Arc<dyn RemoteWindow>;

impl fmt::Debug for dyn RemoteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteWindow")
            .field("id", self.id())
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}
