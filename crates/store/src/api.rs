use crate::error::{Result, StoreError};
use crate::item::{Item, ItemId};
use crate::parents::Parents;
use crate::query::Query;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Directives accompanying a `put`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// `Some(false)`: the object must not exist yet. `Some(true)`: replace an
    /// existing object. `None`: insert or replace.
    pub overwrite: Option<bool>,
    /// Replaces the object's parent property with these identities.
    pub parent: Option<Vec<ItemId>>,
    /// Places the object before this sibling in store order.
    pub before: Option<ItemId>,
}

impl PutOptions {
    #[must_use]
    pub fn create() -> Self {
        Self {
            overwrite: Some(false),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn overwrite() -> Self {
        Self {
            overwrite: Some(true),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn under(mut self, parents: impl IntoIterator<Item = ItemId>) -> Self {
        self.parent = Some(parents.into_iter().collect());
        self
    }

    #[must_use]
    pub fn placed_before(mut self, sibling: Option<ItemId>) -> Self {
        self.before = sibling;
        self
    }
}

/// Shape of the parent property across a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiParented {
    /// Decided by the first object written with a parent reference.
    #[default]
    Auto,
    /// Parent property holds one identity.
    Single,
    /// Parent property holds an array of identities.
    Multiple,
}

/// Mutation notification emitted by evented stores.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    New { item: Item },
    Change { item: Item, old_item: Option<Item> },
    Delete { item: Item },
}

impl StoreEvent {
    #[must_use]
    pub fn item(&self) -> &Item {
        match self {
            Self::New { item } | Self::Change { item, .. } | Self::Delete { item } => item,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::New { .. } => "new",
            Self::Change { .. } => "change",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Capability contract of a hierarchical object store.
///
/// Every async method is a suspension point; callers must not assume any
/// ordering between independent calls.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Property holding an object's identity.
    fn id_property(&self) -> &str;

    /// Property holding an object's parent reference(s).
    fn parent_property(&self) -> &str;

    fn get_identity(&self, item: &Item) -> Option<ItemId> {
        item.id(self.id_property())
    }

    fn multi_parented(&self) -> MultiParented {
        MultiParented::Auto
    }

    fn is_writable(&self) -> bool {
        true
    }

    /// Event stream for stores that signal their own mutations.
    fn subscribe(&self) -> Option<broadcast::Receiver<StoreEvent>> {
        None
    }

    async fn get(&self, id: &ItemId) -> Result<Option<Item>>;

    /// Stores `item`, returning its (possibly generated) identity.
    async fn put(&self, item: Item, options: PutOptions) -> Result<ItemId>;

    async fn add(&self, item: Item, options: PutOptions) -> Result<ItemId> {
        let options = PutOptions {
            overwrite: Some(false),
            ..options
        };
        self.put(item, options).await
    }

    /// Removes the object; returns false when it did not exist.
    async fn remove(&self, id: &ItemId) -> Result<bool>;

    /// Matching objects in store order.
    async fn query(&self, query: &Query) -> Result<Vec<Item>>;

    async fn get_children(&self, parent: &Item) -> Result<Vec<Item>> {
        let Some(id) = self.get_identity(parent) else {
            return Ok(Vec::new());
        };
        let query = Query::all().eq(self.parent_property(), id.to_value());
        self.query(&query).await
    }

    /// Adds `parents` to the child's parent reference. Self references and
    /// duplicates are ignored. Returns whether the child was updated.
    async fn add_parent(&self, child: &Item, parents: &[ItemId]) -> Result<bool> {
        let (id, mut current) = current_object(self, child).await?;
        let mut set = Parents::from_item(&current, self.parent_property());
        let mut changed = false;
        for parent in parents.iter().filter(|parent| **parent != id) {
            changed |= set.add(parent.clone());
        }
        if changed {
            current.set(self.parent_property().to_string(), set.to_value());
            self.put(current, PutOptions::default()).await?;
        }
        Ok(changed)
    }

    /// Removes `parents` from the child's parent reference.
    async fn remove_parent(&self, child: &Item, parents: &[ItemId]) -> Result<bool> {
        let (_, mut current) = current_object(self, child).await?;
        let mut set = Parents::from_item(&current, self.parent_property());
        let mut changed = false;
        for parent in parents {
            changed |= set.remove(parent);
        }
        if changed {
            current.set(self.parent_property().to_string(), set.to_value());
            self.put(current, PutOptions::default()).await?;
        }
        Ok(changed)
    }
}

async fn current_object<S>(store: &S, item: &Item) -> Result<(ItemId, Item)>
where
    S: HierarchyStore + ?Sized,
{
    let id = store
        .get_identity(item)
        .ok_or_else(|| StoreError::invalid("object has no identity"))?;
    let current = store
        .get(&id)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    Ok((id, current))
}
