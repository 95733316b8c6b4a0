mod common;

use checktree_model::{CheckedState, ModelConfig, ModelEvent, RootAction, TreeModel};
use checktree_store::{
    EventedStore, HierarchyStore, Item, ItemId, MemoryStore, PutOptions, Query, StoreEvent,
};
use common::{drain, init_logging, item, memory, node, root_config, scenario_items, state};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use CheckedState::{Checked, Mixed, Unchecked};

type Evented = Arc<EventedStore<MemoryStore>>;

async fn open_evented(config: ModelConfig) -> (Evented, TreeModel) {
    init_logging();
    let store = Arc::new(EventedStore::new(memory(scenario_items())));
    let model = TreeModel::open(store.clone(), config).await.expect("open model");
    model.sync_store_events().await;
    (store, model)
}

fn children_changed_for(events: &[ModelEvent], parent: &str) -> bool {
    events.iter().any(|event| match event {
        ModelEvent::ChildrenChange { parent: p, .. } => p.id("id") == Some(ItemId::new(parent)),
        _ => false,
    })
}

#[tokio::test]
async fn own_writes_are_not_reprocessed() {
    let (_store, model) = open_evented(root_config(true)).await;
    let mut events = model.subscribe();

    let leaf1 = node(&model, "leaf1").await;
    model.set_checked(&leaf1, Checked).await;
    let direct = drain(&mut events);
    assert!(!direct.is_empty());

    model.sync_store_events().await;
    assert_eq!(drain(&mut events), Vec::new());
}

#[tokio::test]
async fn external_checked_change_reconciles_ancestors() {
    let (store, model) = open_evented(root_config(true)).await;
    let mut events = model.subscribe();

    let mut leaf1 = node(&model, "leaf1").await;
    leaf1.set("checked", json!(true));
    store.put(leaf1, PutOptions::default()).await.expect("put");

    assert!(model.sync_store_events().await > 0);
    assert_eq!(state(&model, "A").await, Some(Mixed));
    assert_eq!(state(&model, "R").await, Some(Mixed));

    let events = drain(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        ModelEvent::Change { property, value: Some(value), .. }
            if property == "checked" && *value == json!(true)
    )));
}

#[tokio::test]
async fn external_rename_is_forwarded() {
    let (store, model) = open_evented(root_config(true)).await;
    let mut events = model.subscribe();

    let mut b = node(&model, "B").await;
    b.set("name", json!("Bee"));
    store.put(b, PutOptions::default()).await.expect("put");
    model.sync_store_events().await;

    let events = drain(&mut events);
    assert_eq!(events.len(), 1);
    match &events[0] {
        ModelEvent::Change { property, value, .. } => {
            assert_eq!(property, "name");
            assert_eq!(value, &Some(json!("Bee")));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(model.get_label(&node(&model, "B").await).as_deref(), Some("Bee"));
}

#[tokio::test]
async fn new_item_refreshes_and_reconciles_its_parent() {
    let (store, model) = open_evented(root_config(true)).await;
    let mut events = model.subscribe();

    store
        .put(
            item(json!({"id": "leaf4", "parent": "B", "checked": false})),
            PutOptions::default(),
        )
        .await
        .expect("put");
    model.sync_store_events().await;

    assert_eq!(state(&model, "B").await, Some(Mixed));
    let b = node(&model, "B").await;
    assert_eq!(model.get_children(&b).await.expect("children").len(), 2);

    let events = drain(&mut events);
    assert!(children_changed_for(&events, "B"));
    assert!(!events
        .iter()
        .any(|event| matches!(event, ModelEvent::RootChange { .. })));
}

#[tokio::test]
async fn delete_reconciles_former_parent() {
    let (store, model) = open_evented(root_config(true)).await;
    let leaf2 = node(&model, "leaf2").await;
    model.set_checked(&leaf2, Checked).await;
    assert_eq!(state(&model, "A").await, Some(Mixed));
    model.sync_store_events().await;

    let mut events = model.subscribe();
    assert!(store.remove(&ItemId::new("leaf1")).await.expect("remove"));
    model.sync_store_events().await;

    assert_eq!(state(&model, "A").await, Some(Checked));
    assert_eq!(state(&model, "R").await, Some(Checked));

    let events = drain(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        ModelEvent::Delete { item } if item.id("id") == Some(ItemId::new("leaf1"))
    )));
    assert!(children_changed_for(&events, "A"));
    let leaf1 = item(json!({"id": "leaf1"}));
    assert!(!model.is_item(&leaf1));
}

#[tokio::test]
async fn delete_of_a_still_stored_item_is_a_move() {
    let (_store, model) = open_evented(root_config(true)).await;
    let mut events = model.subscribe();

    let leaf3 = node(&model, "leaf3").await;
    model
        .handle_store_event(StoreEvent::Delete { item: leaf3.clone() })
        .await;

    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|event| matches!(event, ModelEvent::Delete { .. })));
    assert!(children_changed_for(&events, "B"));
    assert!(model.is_item(&leaf3));
}

#[tokio::test]
async fn reparenting_updates_old_and_new_parent() {
    let (store, model) = open_evented(root_config(true)).await;
    let mut events = model.subscribe();

    let mut leaf3 = node(&model, "leaf3").await;
    leaf3.set("parent", json!("A"));
    store.put(leaf3, PutOptions::default()).await.expect("put");
    model.sync_store_events().await;

    let a = node(&model, "A").await;
    let b = node(&model, "B").await;
    assert_eq!(model.get_children(&a).await.expect("children").len(), 3);
    assert!(model.get_children(&b).await.expect("children").is_empty());
    assert!(!model.may_have_children(&b));
    assert_eq!(state(&model, "A").await, Some(Mixed));

    let events = drain(&mut events);
    assert!(children_changed_for(&events, "A"));
    assert!(children_changed_for(&events, "B"));
}

#[tokio::test]
async fn reparenting_is_applied_after_an_intervening_model_write() {
    let (store, model) = open_evented(root_config(true)).await;
    let a = node(&model, "A").await;
    assert_eq!(model.get_children(&a).await.expect("children").len(), 2);
    let mut events = model.subscribe();

    let mut leaf1 = node(&model, "leaf1").await;
    leaf1.set("parent", json!("B"));
    store.put(leaf1.clone(), PutOptions::default()).await.expect("put");
    model.set_checked(&leaf1, Checked).await;
    model.sync_store_events().await;

    let ids = |children: Vec<Item>| -> Vec<ItemId> {
        children.iter().filter_map(|child| child.id("id")).collect()
    };
    let a = node(&model, "A").await;
    let b = node(&model, "B").await;
    assert_eq!(
        ids(model.get_children(&a).await.expect("children")),
        vec![ItemId::new("leaf2")]
    );
    let b_children = ids(model.get_children(&b).await.expect("children"));
    assert_eq!(b_children.len(), 2);
    assert!(b_children.contains(&ItemId::new("leaf1")));
    assert_eq!(state(&model, "A").await, Some(Unchecked));
    assert_eq!(state(&model, "B").await, Some(Checked));

    let events = drain(&mut events);
    assert!(children_changed_for(&events, "A"));
    assert!(children_changed_for(&events, "B"));
}

#[tokio::test]
async fn write_interface_notifies_without_store_events() {
    let store = Arc::new(memory(scenario_items()));
    let model = TreeModel::open(store, root_config(true)).await.expect("open");
    assert!(!model.is_monitored());
    let mut receiver = model.subscribe();

    let b = node(&model, "B").await;
    let created = model
        .new_item(item(json!({"id": "leaf4", "checked": false})), Some(&b), None)
        .await
        .expect("new item")
        .expect("stored");
    assert_eq!(created.get("parent"), Some(&json!("B")));
    assert_eq!(state(&model, "B").await, Some(Mixed));
    assert!(children_changed_for(&drain(&mut receiver), "B"));

    assert!(model.delete_item(&created).await.expect("delete"));
    assert_eq!(state(&model, "B").await, Some(Checked));
    let events = drain(&mut receiver);
    assert!(events.iter().any(|event| matches!(event, ModelEvent::Delete { .. })));

    let a = node(&model, "A").await;
    let leaf3 = node(&model, "leaf3").await;
    model
        .paste_item(&leaf3, &b, &a, false, None)
        .await
        .expect("paste");
    assert_eq!(node(&model, "leaf3").await.get("parent"), Some(&json!("A")));
    assert_eq!(state(&model, "A").await, Some(Mixed));
    let events = drain(&mut receiver);
    assert!(children_changed_for(&events, "A"));
    assert!(children_changed_for(&events, "B"));
}

#[tokio::test]
async fn new_item_with_existing_identity_moves_it() {
    let store = Arc::new(memory(scenario_items()));
    let model = TreeModel::open(store, root_config(true)).await.expect("open");

    let a = node(&model, "A").await;
    let moved = model
        .new_item(item(json!({"id": "leaf3"})), Some(&a), None)
        .await
        .expect("new item")
        .expect("stored");
    assert_eq!(moved.get("parent"), Some(&json!("A")));
    assert_eq!(moved.get("checked"), Some(&json!(true)));
    assert_eq!(state(&model, "A").await, Some(Mixed));
}

#[tokio::test]
async fn new_item_with_existing_identity_gains_a_parent_on_multi_parented_stores() {
    let items = vec![
        item(json!({"id": "R"})),
        item(json!({"id": "A", "parent": ["R"]})),
        item(json!({"id": "B", "parent": ["R"]})),
        item(json!({"id": "x", "parent": ["A"], "checked": true})),
        item(json!({"id": "y", "parent": ["B"], "checked": false})),
    ];
    let store = Arc::new(EventedStore::new(
        MemoryStore::with_data(checktree_store::MemoryStoreConfig::multi_parented(), items)
            .expect("store"),
    ));
    let model = TreeModel::open(store, root_config(true)).await.expect("open");
    model.sync_store_events().await;
    assert_eq!(state(&model, "B").await, Some(Unchecked));

    let b = node(&model, "B").await;
    let shared = model
        .new_item(item(json!({"id": "x"})), Some(&b), None)
        .await
        .expect("new item")
        .expect("stored");
    model.sync_store_events().await;

    assert_eq!(shared.get("parent"), Some(&json!(["A", "B"])));
    assert_eq!(state(&model, "A").await, Some(Checked));
    assert_eq!(state(&model, "B").await, Some(Mixed));
    assert_eq!(state(&model, "R").await, Some(Mixed));
}

#[tokio::test]
async fn forest_root_membership_changes_are_announced() {
    let store = Arc::new(memory(vec![
        item(json!({"id": "AF", "type": "continent", "checked": false})),
        item(json!({"id": "KE", "parent": "AF", "checked": false})),
    ]));
    let model = TreeModel::open(store, ModelConfig::forest(Query::all().eq("type", "continent")))
        .await
        .expect("open");
    let root = model.get_root().await.expect("root");
    let mut receiver = model.subscribe();

    let created = model
        .new_item(item(json!({"id": "EU", "type": "continent"})), Some(&root), None)
        .await
        .expect("new item")
        .expect("stored");
    assert_eq!(created.get("parent"), None);
    assert_eq!(model.get_children(&root).await.expect("children").len(), 2);

    let events = drain(&mut receiver);
    assert!(events.iter().any(|event| matches!(
        event,
        ModelEvent::RootChange { action: RootAction::New, .. }
    )));
    assert!(children_changed_for(&events, checktree_model::DEFAULT_ROOT_ID));

    let eu = node(&model, "EU").await;
    let ke = node(&model, "KE").await;
    let af = node(&model, "AF").await;
    model
        .paste_item(&ke, &af, &eu, false, None)
        .await
        .expect("paste");
    model.paste_item(&eu, &root, &af, false, None).await.expect("paste");
    let events = drain(&mut receiver);
    assert!(events.iter().any(|event| matches!(
        event,
        ModelEvent::RootChange { action: RootAction::Detach, .. }
    )));
}

#[tokio::test]
async fn background_listener_applies_external_changes() {
    let (store, model) = open_evented(root_config(true)).await;
    let listener = model.spawn_listener().expect("listener");
    assert!(model.spawn_listener().is_none());

    let mut leaf2 = node(&model, "leaf2").await;
    leaf2.set("checked", json!(true));
    store.put(leaf2, PutOptions::default()).await.expect("put");

    let mut reconciled = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        model.settle().await;
        if state(&model, "A").await == Some(Mixed) {
            reconciled = true;
            break;
        }
    }
    assert!(reconciled, "listener did not reconcile A");
    listener.abort();
}
