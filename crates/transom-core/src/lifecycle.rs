use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::types::CloseReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    Created,
    Opening,
    WindowOpened,
    HandshakeSent,
    Prerendering,
    Entered,
    Rendered,
    Active,
    UpdatingProps,
    Closing,
    Erroring,
    Destroyed,
}

impl RenderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Opening => "opening",
            Self::WindowOpened => "window_opened",
            Self::HandshakeSent => "handshake_sent",
            Self::Prerendering => "prerendering",
            Self::Entered => "entered",
            Self::Rendered => "rendered",
            Self::Active => "active",
            Self::UpdatingProps => "updating_props",
            Self::Closing => "closing",
            Self::Erroring => "erroring",
            Self::Destroyed => "destroyed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Closing and erroring are reachable from any live state; everything
    /// else follows the render sequence.
    pub fn can_transition(self, next: RenderState) -> bool {
        use RenderState::*;
        match (self, next) {
            (Created, Opening)
            | (Opening, WindowOpened)
            | (WindowOpened, HandshakeSent)
            | (HandshakeSent, Prerendering)
            | (HandshakeSent, Entered)
            | (Prerendering, Entered)
            | (Entered, Rendered)
            | (Rendered, Active)
            | (Active, UpdatingProps)
            | (UpdatingProps, Active)
            | (Closing, Destroyed)
            | (Erroring, Destroyed) => true,
            (from, Closing) => !matches!(from, Closing | Erroring | Destroyed),
            (from, Erroring) => !matches!(from, Erroring | Destroyed),
            _ => false,
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LifecycleEvent {
    StateChanged { uid: String, state: RenderState },
    Rendered { uid: String },
    Displayed { uid: String },
    PropsUpdated { uid: String },
    Closed { uid: String, reason: CloseReason },
    Errored { uid: String, message: String },
    #[serde(other)]
    Unknown,
}

pub struct LifecycleBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: LifecycleEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new(64)
    }
}
