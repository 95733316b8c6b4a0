use crate::api::{HierarchyStore, MultiParented, PutOptions};
use crate::error::{Result, StoreError};
use crate::item::{Item, ItemId};
use crate::parents::Parents;
use crate::query::Query;
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreConfig {
    pub id_property: String,
    pub parent_property: String,
    pub multi_parented: MultiParented,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            id_property: "id".to_string(),
            parent_property: "parent".to_string(),
            multi_parented: MultiParented::Auto,
        }
    }
}

impl MemoryStoreConfig {
    /// Store whose objects may have several parents.
    #[must_use]
    pub fn multi_parented() -> Self {
        Self {
            multi_parented: MultiParented::Multiple,
            ..Self::default()
        }
    }
}

#[derive(Default)]
struct MemoryState {
    data: Vec<Item>,
    index: HashMap<ItemId, usize>,
    shape: MultiParented,
    next_id: u64,
}

impl MemoryState {
    fn reindex(&mut self, id_property: &str) {
        self.index = self
            .data
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| item.id(id_property).map(|id| (id, pos)))
            .collect();
    }

    fn generate_id(&mut self) -> ItemId {
        loop {
            self.next_id += 1;
            let id = ItemId::new(self.next_id.to_string());
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }
}

/// In-memory hierarchical store.
///
/// Objects keep insertion order unless placed with `before`. Children are
/// found by querying the parent property, so multi-parented objects appear
/// under every parent they reference.
pub struct MemoryStore {
    id_property: String,
    parent_property: String,
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            id_property: config.id_property,
            parent_property: config.parent_property,
            state: RwLock::new(MemoryState {
                shape: config.multi_parented,
                ..MemoryState::default()
            }),
        }
    }

    /// Store preloaded with `data`. Objects without an identity get a
    /// generated one; duplicate identities are rejected.
    pub fn with_data(config: MemoryStoreConfig, data: impl IntoIterator<Item = Item>) -> Result<Self> {
        let store = Self::new(config);
        for item in data {
            store.put_object(item, PutOptions::create())?;
        }
        Ok(store)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_state().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_state(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn put_object(&self, mut item: Item, options: PutOptions) -> Result<ItemId> {
        let mut state = self.write_state();

        let id = match item.id(&self.id_property) {
            Some(id) => id,
            None => {
                let id = state.generate_id();
                item.set(self.id_property.clone(), id.to_value());
                id
            }
        };

        if let Some(parents) = options.parent {
            let parents = Parents::multiple(parents.into_iter().filter(|parent| *parent != id));
            item.set(self.parent_property.clone(), parents.to_value());
        }
        self.shape_parents(&mut state, &mut item);

        let existing = state.index.get(&id).copied();
        if existing.is_some() && options.overwrite == Some(false) {
            return Err(StoreError::AlreadyExists(id));
        }

        let before = options.before.filter(|sibling| *sibling != id);
        match (existing, before) {
            (Some(pos), None) => state.data[pos] = item,
            (existing, before) => {
                if let Some(pos) = existing {
                    state.data.remove(pos);
                }
                let target = before.and_then(|sibling| {
                    state
                        .data
                        .iter()
                        .position(|other| other.id(&self.id_property).as_ref() == Some(&sibling))
                });
                match (target, existing) {
                    (Some(pos), _) => state.data.insert(pos, item),
                    (None, Some(pos)) => {
                        let pos = pos.min(state.data.len());
                        state.data.insert(pos, item);
                    }
                    (None, None) => state.data.push(item),
                }
                state.reindex(&self.id_property);
            }
        }
        Ok(id)
    }

    /// Coerces the parent property to the store's parent shape.
    fn shape_parents(&self, state: &mut MemoryState, item: &mut Item) {
        let value = match item.get(&self.parent_property) {
            None | Some(Value::Null) => return,
            Some(value) => value.clone(),
        };

        if state.shape == MultiParented::Auto {
            state.shape = if value.is_array() {
                MultiParented::Multiple
            } else {
                MultiParented::Single
            };
            debug!("memory store parent shape resolved to {:?}", state.shape);
        }

        let parents = Parents::from_value(Some(&value));
        let shaped = match state.shape {
            MultiParented::Multiple if !value.is_array() => {
                Parents::multiple(parents.iter().cloned()).to_value()
            }
            MultiParented::Single if value.is_array() => {
                parents.first().map_or(Value::Null, ItemId::to_value)
            }
            _ => return,
        };
        match shaped {
            Value::Null => {
                item.remove(&self.parent_property);
            }
            shaped => {
                item.set(self.parent_property.clone(), shaped);
            }
        }
    }
}

#[async_trait]
impl HierarchyStore for MemoryStore {
    fn id_property(&self) -> &str {
        &self.id_property
    }

    fn parent_property(&self) -> &str {
        &self.parent_property
    }

    fn multi_parented(&self) -> MultiParented {
        self.read_state().shape
    }

    async fn get(&self, id: &ItemId) -> Result<Option<Item>> {
        let state = self.read_state();
        Ok(state.index.get(id).map(|&pos| state.data[pos].clone()))
    }

    async fn put(&self, item: Item, options: PutOptions) -> Result<ItemId> {
        self.put_object(item, options)
    }

    async fn remove(&self, id: &ItemId) -> Result<bool> {
        let mut state = self.write_state();
        let Some(pos) = state.index.get(id).copied() else {
            return Ok(false);
        };
        state.data.remove(pos);
        state.reindex(&self.id_property);
        Ok(true)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>> {
        let state = self.read_state();
        Ok(state
            .data
            .iter()
            .filter(|item| query.matches(item))
            .cloned()
            .collect())
    }
}
