use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

type CleanupTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Collects teardown work for one component instance. Tasks run in reverse
/// registration order, each exactly once. Registering after cleanup has run
/// executes the task immediately.
#[derive(Clone)]
pub struct CleanupRegistry {
    inner: Arc<Mutex<CleanupState>>,
}

struct CleanupState {
    tasks: Vec<CleanupTask>,
    cleaned: bool,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CleanupState {
                tasks: Vec::new(),
                cleaned: false,
            })),
        }
    }

    pub async fn register<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.inner.lock().await;
        if state.cleaned {
            drop(state);
            task.await;
        } else {
            state.tasks.push(Box::pin(task));
        }
    }

    pub async fn has_tasks(&self) -> bool {
        !self.inner.lock().await.tasks.is_empty()
    }

    pub async fn is_cleaned(&self) -> bool {
        self.inner.lock().await.cleaned
    }

    /// Drains the registry. The lock is released between tasks, so a task may
    /// itself register further cleanup and concurrent callers drain disjoint
    /// tasks.
    pub async fn run_all(&self) {
        let pending = {
            let mut state = self.inner.lock().await;
            state.cleaned = true;
            state.tasks.len()
        };
        if pending > 0 {
            tracing::debug!(tasks = pending, "running cleanup");
        }
        loop {
            let task = {
                let mut state = self.inner.lock().await;
                state.tasks.pop()
            };
            match task {
                Some(task) => task.await,
                None => break,
            }
        }
    }
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
