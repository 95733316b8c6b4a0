use crate::api::{HierarchyStore, MultiParented, PutOptions, StoreEvent};
use crate::error::Result;
use crate::item::{Item, ItemId};
use crate::query::Query;
use async_trait::async_trait;
use log::debug;
use tokio::sync::{broadcast, Mutex};

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Store wrapper that signals every mutation of the wrapped store.
///
/// Writes are serialized through an async mutex, so the `old_item` carried
/// by a change event is the state the write actually replaced.
pub struct EventedStore<S> {
    inner: S,
    events: broadcast::Sender<StoreEvent>,
    writes: Mutex<()>,
}

impl<S: HierarchyStore> EventedStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner,
            events,
            writes: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn emit(&self, event: StoreEvent) {
        debug!("store event: {}", event.kind());
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl<S: HierarchyStore> HierarchyStore for EventedStore<S> {
    fn id_property(&self) -> &str {
        self.inner.id_property()
    }

    fn parent_property(&self) -> &str {
        self.inner.parent_property()
    }

    fn get_identity(&self, item: &Item) -> Option<ItemId> {
        self.inner.get_identity(item)
    }

    fn multi_parented(&self) -> MultiParented {
        self.inner.multi_parented()
    }

    fn is_writable(&self) -> bool {
        self.inner.is_writable()
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StoreEvent>> {
        Some(self.events.subscribe())
    }

    async fn get(&self, id: &ItemId) -> Result<Option<Item>> {
        self.inner.get(id).await
    }

    async fn put(&self, item: Item, options: PutOptions) -> Result<ItemId> {
        let _guard = self.writes.lock().await;

        let old_item = match self.inner.get_identity(&item) {
            Some(id) => self.inner.get(&id).await?,
            None => None,
        };
        let fallback = item.clone();
        let id = self.inner.put(item, options).await?;
        let item = self.inner.get(&id).await?.unwrap_or(fallback);

        match old_item {
            Some(old_item) => self.emit(StoreEvent::Change {
                item,
                old_item: Some(old_item),
            }),
            None => self.emit(StoreEvent::New { item }),
        }
        Ok(id)
    }

    async fn remove(&self, id: &ItemId) -> Result<bool> {
        let _guard = self.writes.lock().await;

        let Some(item) = self.inner.get(id).await? else {
            return Ok(false);
        };
        let removed = self.inner.remove(id).await?;
        if removed {
            self.emit(StoreEvent::Delete { item });
        }
        Ok(removed)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        self.inner.query(query).await
    }

    async fn get_children(&self, parent: &Item) -> Result<Vec<Item>> {
        self.inner.get_children(parent).await
    }
}
