use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use transom_core::errors::DefinitionError;
use transom_core::Result;

use crate::component::ComponentRef;

/// Tag-keyed registry of created components. Tags are claimed for the
/// registry's lifetime; re-registering one is an error.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: Arc<RwLock<HashMap<String, ComponentRef>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, component: ComponentRef) -> Result<()> {
        let mut map = self.components.write().await;
        let tag = component.tag().to_string();
        if map.contains_key(&tag) {
            return Err(DefinitionError::DuplicateTag(tag).into());
        }
        tracing::debug!(tag = %tag, "component registered");
        map.insert(tag, component);
        Ok(())
    }

    pub async fn get(&self, tag: &str) -> Option<ComponentRef> {
        self.components.read().await.get(tag).cloned()
    }

    pub async fn len(&self) -> usize {
        self.components.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.components.read().await.is_empty()
    }
}

/// One live render, as the registry sees it.
#[async_trait]
pub trait ActiveInstance: Send + Sync {
    fn uid(&self) -> &str;

    fn tag(&self) -> &str;

    async fn destroy(&self) -> Result<()>;
}

/// Every instance currently rendering or rendered, across all components.
/// Singleton probes and `destroy_all` run against this.
#[derive(Clone, Default)]
pub struct ActiveInstances {
    entries: Arc<RwLock<Vec<Arc<dyn ActiveInstance>>>>,
}

impl ActiveInstances {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, instance: Arc<dyn ActiveInstance>) {
        self.entries.write().await.push(instance);
    }

    pub async fn remove(&self, uid: &str) {
        self.entries.write().await.retain(|entry| entry.uid() != uid);
    }

    pub async fn contains_tag(&self, tag: &str) -> bool {
        self.entries
            .read()
            .await
            .iter()
            .any(|entry| entry.tag() == tag)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drains the registry and destroys every instance. All instances are
    /// attempted; the first failure is reported.
    pub async fn destroy_all(&self) -> Result<()> {
        let drained: Vec<Arc<dyn ActiveInstance>> =
            std::mem::take(&mut *self.entries.write().await);
        tracing::debug!(instances = drained.len(), "destroying all instances");

        let mut first_err = None;
        for instance in drained {
            if let Err(err) = instance.destroy().await {
                tracing::warn!(uid = %instance.uid(), error = %err, "destroy failed");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ComponentOptions;
    use crate::Component;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use transom_core::TransomError;

    #[tokio::test]
    async fn duplicate_tags_are_rejected() {
        let registry = ComponentRegistry::new();
        let a = Arc::new(
            Component::new(ComponentOptions::new("widget", "https://c.example.com")).unwrap(),
        );
        let b = Arc::new(
            Component::new(ComponentOptions::new("widget", "https://d.example.com")).unwrap(),
        );

        registry.register(a).await.unwrap();
        let err = registry.register(b).await.unwrap_err();
        assert!(matches!(
            err,
            TransomError::Definition(DefinitionError::DuplicateTag(tag)) if tag == "widget"
        ));
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("widget").await.is_some());
    }

    struct FakeInstance {
        uid: String,
        tag: String,
        destroys: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ActiveInstance for FakeInstance {
        fn uid(&self) -> &str {
            &self.uid
        }

        fn tag(&self) -> &str {
            &self.tag
        }

        async fn destroy(&self) -> Result<()> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fake(uid: &str, tag: &str, destroys: &Arc<AtomicUsize>) -> Arc<dyn ActiveInstance> {
        Arc::new(FakeInstance {
            uid: uid.to_string(),
            tag: tag.to_string(),
            destroys: destroys.clone(),
        })
    }

    #[tokio::test]
    async fn tracks_and_removes_instances() {
        let destroys = Arc::new(AtomicUsize::new(0));
        let active = ActiveInstances::new();

        active.register(fake("u1", "widget", &destroys)).await;
        active.register(fake("u2", "other", &destroys)).await;
        assert!(active.contains_tag("widget").await);

        active.remove("u1").await;
        assert!(!active.contains_tag("widget").await);
        assert!(active.contains_tag("other").await);
        assert_eq!(active.len().await, 1);
    }

    #[tokio::test]
    async fn destroy_all_drains_and_destroys() {
        let destroys = Arc::new(AtomicUsize::new(0));
        let active = ActiveInstances::new();
        active.register(fake("u1", "widget", &destroys)).await;
        active.register(fake("u2", "widget", &destroys)).await;

        active.destroy_all().await.unwrap();
        assert_eq!(destroys.load(Ordering::SeqCst), 2);
        assert_eq!(active.len().await, 0);

        // Draining twice is harmless.
        active.destroy_all().await.unwrap();
        assert_eq!(destroys.load(Ordering::SeqCst), 2);
    }
}
