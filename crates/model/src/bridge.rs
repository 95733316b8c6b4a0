//! Store event handling: keeps the children cache, the snapshots and the
//! checked states in step with mutations the model did not make itself.

use crate::event::{ModelEvent, RootAction};
use crate::model::{lock, TreeModel};
use crate::state::ItemField;
use checktree_store::{Item, ItemId, Parents, StoreEvent};
use log::{debug, warn};
use serde_json::Value;
use std::mem;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;

/// One property difference between two states of an item.
struct PropertyChange {
    property: String,
    new: Option<Value>,
}

fn diff_items(old: &Item, new: &Item) -> Vec<PropertyChange> {
    let mut changes = Vec::new();
    for (property, old_value) in old.properties() {
        let new_value = new.get(property);
        if new_value != Some(old_value) {
            changes.push(PropertyChange {
                property: property.clone(),
                new: new_value.cloned(),
            });
        }
    }
    for (property, new_value) in new.properties() {
        if !old.contains(property) {
            changes.push(PropertyChange {
                property: property.clone(),
                new: Some(new_value.clone()),
            });
        }
    }
    changes
}

/// Parent ids named by some of `versions` but not by all of them.
fn moved_parents<'a>(
    parent_property: &str,
    versions: impl IntoIterator<Item = Option<&'a Item>>,
) -> Vec<ItemId> {
    let sets: Vec<Parents> = versions
        .into_iter()
        .flatten()
        .map(|item| Parents::from_item(item, parent_property))
        .collect();
    let mut moved: Vec<ItemId> = Vec::new();
    for id in sets.iter().flat_map(|parents| parents.iter()) {
        if !moved.contains(id) && !sets.iter().all(|parents| parents.contains(id)) {
            moved.push(id.clone());
        }
    }
    moved
}

impl TreeModel {
    pub async fn handle_store_event(&self, event: StoreEvent) {
        debug!("handling store {} event", event.kind());
        self.resolve_root().await;
        match event {
            StoreEvent::New { item } => self.on_new_item(item).await,
            StoreEvent::Change { item, old_item } => self.on_change(item, old_item).await,
            StoreEvent::Delete { item } => self.on_delete_item(item).await,
        }
    }

    /// Handles every queued store event and waits for the reconciliations
    /// they scheduled, until the queue stays empty. Returns the number of
    /// events handled.
    pub async fn sync_store_events(&self) -> usize {
        let mut handled = 0;
        loop {
            let next = match lock(&self.inner.store_events).as_mut() {
                Some(events) => events.try_recv(),
                None => Err(TryRecvError::Empty),
            };
            match next {
                Ok(event) => {
                    self.handle_store_event(event).await;
                    handled += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => self.on_lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => {
                    if !self.settle_once().await {
                        break;
                    }
                }
            }
        }
        handled
    }

    /// Moves store event handling onto a background task. Returns `None`
    /// when the store is not evented or a listener already runs.
    pub fn spawn_listener(&self) -> Option<JoinHandle<()>> {
        let mut events = lock(&self.inner.store_events).take()?;
        let model = self.clone();
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => model.handle_store_event(event).await,
                    Err(RecvError::Lagged(skipped)) => model.on_lagged(skipped),
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("store event listener stopped");
        }))
    }

    /// Waits until no deferred reconciliation is pending.
    pub async fn settle(&self) {
        while self.settle_once().await {}
    }

    async fn settle_once(&self) -> bool {
        let pending = mem::take(&mut *lock(&self.inner.deferred));
        if pending.is_empty() {
            return false;
        }
        for handle in pending {
            if let Err(err) = handle.await {
                warn!("deferred reconciliation failed: {err}");
            }
        }
        true
    }

    fn on_lagged(&self, skipped: u64) {
        warn!("missed {skipped} store events, dropping the children cache");
        self.inner.children.clear();
    }

    fn defer_reconcile(&self, item: Item) {
        let model = self.clone();
        let handle = tokio::spawn(async move {
            let _walk = model.inner.walks.lock().await;
            if let Some(current) = model.current_or_report(&item).await {
                model.update_checked_parent(current, false).await;
            }
        });
        let mut deferred = lock(&self.inner.deferred);
        deferred.retain(|handle| !handle.is_finished());
        deferred.push(handle);
    }

    pub(crate) async fn on_new_item(&self, item: Item) {
        let parents = self.get_parents(&item).await;
        if let Some(root) = self.cached_root() {
            if self.is_child_of(&root, &item) {
                self.emit(ModelEvent::RootChange {
                    item: item.clone(),
                    action: RootAction::New,
                });
            }
        }
        self.children_changed(parents).await;
    }

    pub(crate) async fn on_delete_item(&self, item: Item) {
        let Some(id) = self.get_identity(&item) else {
            return;
        };
        self.inner.children.invalidate(&id);

        // A delete followed by a re-insert is a move. Only a confirmed
        // absence purges the item.
        let gone = match self.inner.store.get(&id).await {
            Ok(found) => found.is_none(),
            Err(err) => return self.report_error("confirm deleted item", &err.into()),
        };
        if gone {
            self.forget(&id);
            if let Some(root) = self.cached_root() {
                if self.is_child_of(&root, &item) {
                    self.emit(ModelEvent::RootChange {
                        item: item.clone(),
                        action: RootAction::Delete,
                    });
                }
            }
            self.emit(ModelEvent::Delete { item: item.clone() });
        }

        let former_parents = self.get_parents(&item).await;
        self.children_changed(former_parents).await;
    }

    async fn on_change(&self, item: Item, old_item: Option<Item>) {
        let Some(id) = self.get_identity(&item) else {
            return;
        };
        // Events may be stale by the time they are handled; diff the latest
        // stored state so each change is acted on once.
        let latest = match self.inner.store.get(&id).await {
            Ok(Some(latest)) => latest,
            Ok(None) => return,
            Err(err) => {
                self.report_error("refresh changed item", &err.into());
                item.clone()
            }
        };
        let snapshot = self.snapshot(&id);
        // A model write can replace the snapshot before this event is
        // handled, so the event's own parent values count too.
        let moved = moved_parents(
            self.inner.store.parent_property(),
            [old_item.as_ref(), Some(&item), snapshot.as_ref(), Some(&latest)],
        );
        let changes = snapshot
            .or(old_item)
            .map(|previous| diff_items(&previous, &latest))
            .unwrap_or_default();
        self.remember(&latest);

        for change in changes {
            self.on_set_item(&latest, change);
        }
        if !moved.is_empty() {
            self.refresh_parents(&moved).await;
        }
    }

    fn on_set_item(&self, item: &Item, change: PropertyChange) {
        let checked_attr = self.property_name(ItemField::Checked);
        if checked_attr.as_deref() == Some(change.property.as_str())
            && self.with_config(|c| c.checked_strict)
        {
            self.defer_reconcile(item.clone());
        }

        self.emit(ModelEvent::Change {
            item: item.clone(),
            property: change.property,
            value: change.new,
        });
    }

    async fn refresh_parents(&self, ids: &[ItemId]) {
        let mut affected = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch_item_by_identity(id).await {
                Ok(Some(parent)) => affected.push(parent),
                Ok(None) => debug!("parent {id} not found"),
                Err(err) => self.report_error("parent change", &err),
            }
        }
        self.children_changed(affected).await;
    }

    /// Refreshes the children of every parent in `parents`, notifies the
    /// presentation and re-establishes each parent's composite state.
    pub(crate) async fn children_changed(&self, parents: Vec<Item>) {
        let strict = self.with_config(|c| c.checked_strict);
        for parent in parents {
            let Some(id) = self.get_identity(&parent) else {
                continue;
            };
            self.inner.children.invalidate(&id);
            match self.get_children(&parent).await {
                Ok(children) => {
                    self.emit(ModelEvent::ChildrenChange {
                        parent: parent.clone(),
                        children,
                    });
                    if strict {
                        let _walk = self.inner.walks.lock().await;
                        self.reconcile_parent(parent).await;
                    }
                }
                Err(err) => self.report_error("children change", &err),
            }
        }
    }
}
