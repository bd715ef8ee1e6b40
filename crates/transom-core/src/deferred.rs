use std::sync::Arc;
use tokio::sync::watch;

use crate::errors::TransomError;
use crate::Result;

/// A settle-once async cell. Any number of tasks can await the outcome; the
/// first `resolve` or `reject` wins and later settlements are ignored.
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    tx: Arc<watch::Sender<Option<Result<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Returns false if the cell was already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Returns false if the cell was already settled.
    pub fn reject(&self, err: TransomError) -> bool {
        self.settle(Err(err))
    }

    fn settle(&self, result: Result<T>) -> bool {
        self.tx.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn peek(&self) -> Option<Result<T>> {
        self.tx.borrow().clone()
    }

    pub async fn wait(&self) -> Result<T> {
        let mut rx = self.tx.subscribe();
        let outcome = {
            let slot = rx
                .wait_for(|slot| slot.is_some())
                .await
                .map_err(|_| TransomError::other("deferred sender dropped"))?;
            slot.clone()
        };
        match outcome {
            Some(result) => result,
            None => Err(TransomError::other("deferred settled without a value")),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}
