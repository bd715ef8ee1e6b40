use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use transom_core::errors::PropError;
use transom_core::{Result, TransomError};

type PropFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// A callback prop. Cheap to clone; all clones share the same underlying
/// callable, so `once` and `memoized` guards hold across clones.
#[derive(Clone)]
pub struct PropFunction {
    inner: Arc<PropFn>,
}

impl PropFunction {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |payload| f(payload).boxed()),
        }
    }

    /// Wraps a plain synchronous closure.
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |payload| {
            let f = f.clone();
            async move { f(payload) }
        })
    }

    /// A callback that accepts anything and returns null.
    pub fn noop() -> Self {
        Self::from_sync(|_| Ok(Value::Null))
    }

    pub async fn call(&self, payload: Value) -> Result<Value> {
        (self.inner)(payload).await
    }

    /// At most one real invocation; later calls resolve to null without
    /// touching the underlying callable.
    pub fn once(self) -> Self {
        let called = Arc::new(AtomicBool::new(false));
        Self::new(move |payload| {
            let inner = self.inner.clone();
            let called = called.clone();
            async move {
                if called.swap(true, Ordering::SeqCst) {
                    return Ok(Value::Null);
                }
                inner(payload).await
            }
        })
    }

    /// The first call's outcome is cached and replayed; concurrent first
    /// calls share one execution.
    pub fn memoized(self) -> Self {
        let cell: Arc<OnceCell<Result<Value>>> = Arc::new(OnceCell::new());
        Self::new(move |payload| {
            let inner = self.inner.clone();
            let cell = cell.clone();
            async move {
                cell.get_or_init(|| inner(payload)).await.clone()
            }
        })
    }

    /// Ties invocations to an instance: once the guard is revoked, calls
    /// fail instead of reaching the callable.
    pub fn guarded(self, name: &str, guard: InstanceGuard) -> Self {
        let name = name.to_string();
        Self::new(move |payload| {
            let inner = self.inner.clone();
            let name = name.clone();
            let guard = guard.clone();
            async move {
                if guard.is_revoked() {
                    return Err(TransomError::Prop(PropError::InstanceGone(name)));
                }
                inner(payload).await
            }
        })
    }
}

/// Liveness flag shared between an instance and the callbacks it handed
/// out. Revoked exactly once, on destroy.
#[derive(Clone, Default)]
pub struct InstanceGuard {
    revoked: Arc<AtomicBool>,
}

impl InstanceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::SeqCst)
    }
}
