use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::window::WindowHandle;

/// Thread-safe uid-keyed store. Entries are handed from one instance to
/// another during the handshake and removed by whoever inserted them.
#[derive(Clone)]
pub struct KeyedStore<T> {
    entries: Arc<RwLock<HashMap<String, T>>>,
}

impl<T: Clone> KeyedStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns false if the key was already present.
    pub async fn insert(&self, key: &str, value: T) -> bool {
        let mut map = self.entries.write().await;
        if map.contains_key(key) {
            return false;
        }
        map.insert(key.to_string(), value);
        true
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn remove(&self, key: &str) -> Option<T> {
        self.entries.write().await.remove(key)
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T: Clone> Default for KeyedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The two handoff registries a rendering page publishes for its children:
/// initial props parked by uid, and windows addressable by uid. Always
/// injected; reading another page's scope requires same-origin access.
#[derive(Clone, Default)]
pub struct SharedScope {
    pub props: KeyedStore<Value>,
    pub windows: KeyedStore<WindowHandle>,
}

impl SharedScope {
    pub fn new() -> Self {
        Self::default()
    }
}
