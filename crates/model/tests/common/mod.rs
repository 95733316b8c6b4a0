#![allow(dead_code)]

use checktree_model::{CheckedState, ModelConfig, ModelEvent, TreeModel};
use checktree_store::{HierarchyStore, Item, ItemId, MemoryStore, MemoryStoreConfig, Query};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn item(value: Value) -> Item {
    Item::try_from(value).expect("object literal")
}

/// `R:[A,B], A:[leaf1(false), leaf2(false)], B:[leaf3(true)]`
pub fn scenario_items() -> Vec<Item> {
    vec![
        item(json!({"id": "R", "name": "Root"})),
        item(json!({"id": "A", "name": "A", "parent": "R"})),
        item(json!({"id": "B", "name": "B", "parent": "R"})),
        item(json!({"id": "leaf1", "name": "Leaf 1", "parent": "A", "checked": false})),
        item(json!({"id": "leaf2", "name": "Leaf 2", "parent": "A", "checked": false})),
        item(json!({"id": "leaf3", "name": "Leaf 3", "parent": "B", "checked": true})),
    ]
}

pub fn memory(items: Vec<Item>) -> MemoryStore {
    MemoryStore::with_data(MemoryStoreConfig::default(), items).expect("memory store")
}

pub fn root_config(checked_root: bool) -> ModelConfig {
    ModelConfig {
        checked_root,
        ..ModelConfig::single_root(Query::all().eq("id", "R"))
    }
}

pub async fn node(model: &TreeModel, id: &str) -> Item {
    model
        .fetch_item_by_identity(&ItemId::new(id))
        .await
        .expect("fetch item")
        .unwrap_or_else(|| panic!("item {id} not stored"))
}

pub async fn state(model: &TreeModel, id: &str) -> Option<CheckedState> {
    let item = node(model, id).await;
    model.get_checked(&item).await
}

/// Raw stored checked value, bypassing the model.
pub async fn stored(store: &dyn HierarchyStore, id: &str) -> Option<Value> {
    store
        .get(&ItemId::new(id))
        .await
        .expect("store get")
        .and_then(|item| item.get("checked").cloned())
}

pub fn drain(events: &mut Receiver<ModelEvent>) -> Vec<ModelEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
        }
    }
}

pub fn checked_writes(events: &[ModelEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ModelEvent::Change { property, .. } if property == "checked"))
        .count()
}
