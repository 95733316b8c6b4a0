use crate::cache::{CacheState, ChildrenCache};
use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::event::ModelEvent;
use crate::state::{CheckedState, ItemField, ItemState};
use checktree_store::{HierarchyStore, Item, ItemId, Parents, PutOptions, StoreEvent};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::{broadcast, Mutex as TokioMutex};
use tokio::task::JoinHandle;

/// Data model of a checkbox tree over a hierarchical store.
///
/// Cheap to clone; clones share the same caches and event stream.
#[derive(Clone)]
pub struct TreeModel {
    pub(crate) inner: Arc<ModelInner>,
}

pub(crate) struct ModelInner {
    pub(crate) store: Arc<dyn HierarchyStore>,
    pub(crate) config: RwLock<ModelConfig>,
    pub(crate) root: Mutex<Option<Item>>,
    pub(crate) children: ChildrenCache,
    pub(crate) snapshots: Mutex<HashMap<ItemId, Item>>,
    pub(crate) events: broadcast::Sender<ModelEvent>,
    pub(crate) store_events: Mutex<Option<broadcast::Receiver<StoreEvent>>>,
    pub(crate) deferred: Mutex<Vec<JoinHandle<()>>>,
    /// Held by every walk that writes checked states, so two walks never
    /// recompute the same ancestor from different reads.
    pub(crate) walks: TokioMutex<()>,
    pub(crate) validating: AtomicUsize,
    pub(crate) monitored: bool,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TreeModel {
    /// Builds the model, resolves its root and, in strict mode, validates the
    /// stored checked states.
    pub async fn open(store: Arc<dyn HierarchyStore>, config: ModelConfig) -> Result<Self> {
        let model = Self::new(store, config)?;
        model.get_root().await?;
        model.validate_data().await;
        Ok(model)
    }

    /// Builds the model without touching the store.
    pub fn new(store: Arc<dyn HierarchyStore>, config: ModelConfig) -> Result<Self> {
        config.validate()?;
        if config.checked_attr == store.parent_property() {
            return Err(ModelError::config(format!(
                "checked_attr '{}' collides with the store parent property",
                config.checked_attr
            )));
        }
        if !store.is_writable() {
            warn!("store is not write enabled, checked states will not persist");
        }

        let store_events = store.subscribe();
        let monitored = store_events.is_some();
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            inner: Arc::new(ModelInner {
                store,
                config: RwLock::new(config),
                root: Mutex::new(None),
                children: ChildrenCache::default(),
                snapshots: Mutex::new(HashMap::new()),
                events,
                store_events: Mutex::new(store_events),
                deferred: Mutex::new(Vec::new()),
                walks: TokioMutex::new(()),
                validating: AtomicUsize::new(0),
                monitored,
            }),
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn HierarchyStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn config(&self) -> ModelConfig {
        self.with_config(Clone::clone)
    }

    /// Whether the store signals its own mutations.
    #[must_use]
    pub fn is_monitored(&self) -> bool {
        self.inner.monitored
    }

    pub(crate) fn with_config<R>(&self, f: impl FnOnce(&ModelConfig) -> R) -> R {
        let config = self
            .inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&config)
    }

    pub(crate) fn emit(&self, event: ModelEvent) {
        debug!("model event: {}", event.kind());
        // Nobody listening is fine.
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn report_error(&self, context: &str, err: &ModelError) {
        let message = format!("{context}: {err}");
        error!("{message}");
        self.emit(ModelEvent::Error { message });
    }

    // --- Root ---

    /// Root of the tree: the fabricated forest root, or the single item
    /// matched by the root query.
    pub async fn get_root(&self) -> Result<Item> {
        if let Some(root) = self.cached_root() {
            if self.with_config(|c| c.forest) {
                return Ok(root);
            }
            if let Some(id) = self.get_identity(&root) {
                return Ok(self.inner.store.get(&id).await?.unwrap_or(root));
            }
            return Ok(root);
        }

        let (forest, query) = self.with_config(|c| (c.forest, c.query.clone()));
        let root = if forest {
            let root_id = self.with_config(|c| c.root_id.clone());
            info!("using forest root '{root_id}'");
            Item::new().with(self.inner.store.id_property(), root_id)
        } else {
            let items = self.inner.store.query(&query).await?;
            let [root] = <[Item; 1]>::try_from(items)
                .map_err(|items| ModelError::RootQuery { returned: items.len() })?;
            info!("resolved root item {:?}", self.get_identity(&root));
            self.remember(&root);
            root
        };
        *lock(&self.inner.root) = Some(root.clone());
        Ok(root)
    }

    /// Resolves the root when nothing is cached yet, so root checks never
    /// run against an unknown root. Failures are reported.
    pub(crate) async fn resolve_root(&self) {
        if self.cached_root().is_some() {
            return;
        }
        if let Err(err) = self.get_root().await {
            self.report_error("resolve root", &err);
        }
    }

    pub(crate) fn cached_root(&self) -> Option<Item> {
        lock(&self.inner.root).clone()
    }

    fn root_id(&self) -> Option<ItemId> {
        if self.with_config(|c| c.forest) {
            return Some(ItemId::new(self.with_config(|c| c.root_id.clone())));
        }
        self.cached_root().and_then(|root| self.get_identity(&root))
    }

    #[must_use]
    pub fn is_root(&self, item: &Item) -> bool {
        match (self.root_id(), self.get_identity(item)) {
            (Some(root), Some(id)) => root == id,
            _ => false,
        }
    }

    pub(crate) fn is_forest_root(&self, item: &Item) -> bool {
        self.with_config(|c| c.forest) && self.is_root(item)
    }

    // --- Traversal ---

    #[must_use]
    pub fn get_identity(&self, item: &Item) -> Option<ItemId> {
        self.inner.store.get_identity(item)
    }

    /// Children of `parent` in store order, served from the children cache.
    pub async fn get_children(&self, parent: &Item) -> Result<Vec<Item>> {
        let id = self.get_identity(parent).ok_or(ModelError::MissingIdentity)?;
        let forest_root = self.is_forest_root(parent);
        let store = &self.inner.store;

        let ids = self
            .inner
            .children
            .get_or_fetch(&id, || async {
                debug!("querying children of {id}");
                let items = if forest_root {
                    let query = self.with_config(|c| c.query.clone());
                    store.query(&query).await?
                } else {
                    store.get_children(parent).await?
                };
                let mut ids = Vec::with_capacity(items.len());
                for item in &items {
                    if let Some(child) = self.get_identity(item) {
                        self.observe(&child, item);
                        ids.push(child);
                    }
                }
                Ok::<_, ModelError>(ids)
            })
            .await?;

        let mut children = Vec::with_capacity(ids.len());
        for child in &ids {
            if let Some(item) = store.get(child).await? {
                children.push(item);
            }
        }
        Ok(children)
    }

    /// Parents of `item`. Items matching the root query of a forest also
    /// report the forest root. Lookup failures are reported and skipped.
    pub async fn get_parents(&self, item: &Item) -> Vec<Item> {
        let parent_ids = Parents::from_item(item, self.inner.store.parent_property());
        let mut parents = Vec::with_capacity(parent_ids.len() + 1);
        for id in &parent_ids {
            match self.inner.store.get(id).await {
                Ok(Some(parent)) => parents.push(parent),
                Ok(None) => debug!("parent {id} not found"),
                Err(err) => self.report_error("get parents", &err.into()),
            }
        }
        if let Some(root) = self.forest_parent(item) {
            parents.push(root);
        }
        parents
    }

    fn forest_parent(&self, item: &Item) -> Option<Item> {
        let matches = self.with_config(|c| c.forest && c.query.matches(item));
        if !matches || self.is_root(item) {
            return None;
        }
        self.cached_root()
    }

    /// False only once the children query resolved to an empty list.
    #[must_use]
    pub fn may_have_children(&self, item: &Item) -> bool {
        if self.is_root(item) {
            return true;
        }
        match self.get_identity(item) {
            Some(id) => !matches!(self.inner.children.state(&id), CacheState::Resolved(0)),
            None => false,
        }
    }

    pub(crate) fn children_resolved(&self, item: &Item) -> bool {
        self.get_identity(item)
            .is_some_and(|id| matches!(self.inner.children.state(&id), CacheState::Resolved(_)))
    }

    #[must_use]
    pub fn is_child_of(&self, parent: &Item, item: &Item) -> bool {
        let Some(parent_id) = self.get_identity(parent) else {
            return false;
        };
        if Parents::from_item(item, self.inner.store.parent_property()).contains(&parent_id) {
            return true;
        }
        self.is_forest_root(parent) && self.with_config(|c| c.query.matches(item))
    }

    pub async fn fetch_item_by_identity(&self, id: &ItemId) -> Result<Option<Item>> {
        if self.root_id().as_ref() == Some(id) && self.with_config(|c| c.forest) {
            return Ok(self.cached_root());
        }
        Ok(self.inner.store.get(id).await?)
    }

    /// Latest state of `item`, or `None` when it is no longer stored.
    pub(crate) async fn current(&self, item: &Item) -> Result<Option<Item>> {
        if self.is_forest_root(item) {
            return Ok(self.cached_root());
        }
        match self.get_identity(item) {
            Some(id) => Ok(self.inner.store.get(&id).await?),
            None => Ok(Some(item.clone())),
        }
    }

    pub(crate) async fn current_or_report(&self, item: &Item) -> Option<Item> {
        match self.current(item).await {
            Ok(current) => current,
            Err(err) => {
                self.report_error("refresh item", &err);
                None
            }
        }
    }

    // --- Item properties ---

    pub(crate) fn property_name(&self, field: ItemField) -> Option<String> {
        self.with_config(|c| match field {
            ItemField::Checked => Some(c.checked_attr.clone()),
            ItemField::Enabled => c.enabled_attr.clone(),
            ItemField::Icon => c.icon_attr.clone(),
            ItemField::Label => Some(c.label_attr.clone()),
        })
    }

    fn field_value(&self, item: &Item, field: ItemField) -> Option<Value> {
        let property = self.property_name(field)?;
        item.get(&property).cloned()
    }

    #[must_use]
    pub fn get_label(&self, item: &Item) -> Option<String> {
        if self.is_root(item) {
            if let Some(label) = self.with_config(|c| c.root_label.clone()) {
                return Some(label);
            }
        }
        match self.field_value(item, ItemField::Label)? {
            Value::String(label) => Some(label),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    #[must_use]
    pub fn get_icon(&self, item: &Item) -> Option<Value> {
        self.field_value(item, ItemField::Icon)
    }

    #[must_use]
    pub fn get_enabled(&self, item: &Item) -> bool {
        match self.field_value(item, ItemField::Enabled) {
            None | Some(Value::Null) => true,
            Some(value) => CheckedState::from_value(&value) == Some(CheckedState::Checked),
        }
    }

    /// Writes the enabled flag. A no-op without an enabled property.
    pub async fn set_enabled(&self, item: &Item, enabled: bool) -> Result<bool> {
        let Some(property) = self.property_name(ItemField::Enabled) else {
            return Ok(false);
        };
        let mut current = self.current(item).await?.unwrap_or_else(|| item.clone());
        self.set_value(&mut current, &property, Value::Bool(enabled)).await
    }

    pub async fn get_item_state(&self, item: &Item) -> ItemState {
        ItemState {
            checked: self.get_checked(item).await,
            enabled: self.get_enabled(item),
        }
    }

    pub fn set_label_attr(&self, label_attr: &str) -> Result<()> {
        if label_attr.is_empty() {
            return Err(ModelError::config("label_attr must not be empty"));
        }
        let old = {
            let mut config = self
                .inner
                .config
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if config.label_attr == label_attr {
                return Ok(());
            }
            std::mem::replace(&mut config.label_attr, label_attr.to_string())
        };
        self.emit(ModelEvent::LabelChange {
            old,
            new: label_attr.to_string(),
        });
        Ok(())
    }

    /// The enabled property cannot change once the model exists.
    pub fn set_enabled_attr(&self, enabled_attr: Option<&str>) -> Result<()> {
        if self.with_config(|c| c.enabled_attr.as_deref() == enabled_attr) {
            return Ok(());
        }
        Err(ModelError::ReadOnly("enabled_attr".to_string()))
    }

    /// Writes `value` to `item[property]` when it differs. Forest root
    /// writes stay in memory; everything else goes to the store.
    pub(crate) async fn set_value(&self, item: &mut Item, property: &str, value: Value) -> Result<bool> {
        if item.get(property) == Some(&value) {
            return Ok(false);
        }
        if self.is_forest_root(item) {
            item.set(property, value.clone());
            *lock(&self.inner.root) = Some(item.clone());
        } else {
            if !self.inner.store.is_writable() {
                return Err(ModelError::StoreNotWritable);
            }
            let old_value = item.set(property, value.clone());
            let previous = self.remember(item);
            if let Err(err) = self.inner.store.put(item.clone(), PutOptions::default()).await {
                match old_value {
                    Some(old_value) => item.set(property, old_value),
                    None => item.remove(property),
                };
                self.restore_snapshot(item, previous);
                return Err(err.into());
            }
        }
        self.emit(ModelEvent::Change {
            item: item.clone(),
            property: property.to_string(),
            value: Some(value),
        });
        Ok(true)
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.inner.store.is_writable() {
            Ok(())
        } else {
            Err(ModelError::StoreNotWritable)
        }
    }

    // --- Snapshots ---

    /// Whether the model has seen `item`.
    #[must_use]
    pub fn is_item(&self, item: &Item) -> bool {
        if self.is_forest_root(item) {
            return true;
        }
        self.get_identity(item)
            .is_some_and(|id| lock(&self.inner.snapshots).contains_key(&id))
    }

    /// Replaces the snapshot of `item` and returns the one it replaced.
    pub(crate) fn remember(&self, item: &Item) -> Option<Item> {
        let id = self.get_identity(item)?;
        lock(&self.inner.snapshots).insert(id, item.clone())
    }

    /// Puts back the snapshot `remember` replaced, after a write the store
    /// rejected.
    pub(crate) fn restore_snapshot(&self, item: &Item, previous: Option<Item>) {
        let Some(id) = self.get_identity(item) else {
            return;
        };
        let mut snapshots = lock(&self.inner.snapshots);
        match previous {
            Some(previous) => snapshots.insert(id, previous),
            None => snapshots.remove(&id),
        };
    }

    /// Records `item` unless a snapshot already exists.
    fn observe(&self, id: &ItemId, item: &Item) {
        lock(&self.inner.snapshots)
            .entry(id.clone())
            .or_insert_with(|| item.clone());
    }

    pub(crate) fn snapshot(&self, id: &ItemId) -> Option<Item> {
        lock(&self.inner.snapshots).get(id).cloned()
    }

    pub(crate) fn forget(&self, id: &ItemId) {
        lock(&self.inner.snapshots).remove(id);
    }

    /// Drops cached children and snapshots. The model can still be used and
    /// repopulates its caches on demand.
    pub fn destroy(&self) {
        self.inner.children.clear();
        lock(&self.inner.snapshots).clear();
        lock(&self.inner.deferred).clear();
        debug!("model caches dropped");
    }
}
