use crate::error::{ModelError, Result};
use crate::event::{ModelEvent, RootAction};
use crate::model::TreeModel;
use checktree_store::{Item, MultiParented, Parents, PutOptions};
use log::debug;
use serde_json::Value;

impl TreeModel {
    /// Inserts `args` as a new item below `parent`, placed before `before`.
    ///
    /// When an item with the same identity already exists, `parent` is
    /// added to its parents on a multi-parented store, or the item is moved
    /// below `parent` otherwise. Returns the stored item.
    pub async fn new_item(
        &self,
        args: Item,
        parent: Option<&Item>,
        before: Option<&Item>,
    ) -> Result<Option<Item>> {
        self.ensure_writable()?;
        self.resolve_root().await;
        let store = &self.inner.store;
        let parent = parent.filter(|parent| !self.is_forest_root(parent));
        let before_id = before.and_then(|item| self.get_identity(item));

        if let Some(id) = self.get_identity(&args) {
            if let Some(existing) = store.get(&id).await? {
                if let Some(parent) = parent {
                    self.attach_existing(existing, parent, before).await?;
                }
                return Ok(store.get(&id).await?);
            }
        }

        let mut options = PutOptions::create().placed_before(before_id);
        if let Some(parent_id) = parent.and_then(|parent| self.get_identity(parent)) {
            options = options.under([parent_id]);
        }
        let id = store.put(args, options).await?;
        let item = store.get(&id).await?;
        debug!("created item {id}");

        if let Some(item) = &item {
            if !self.inner.monitored {
                self.on_new_item(item.clone()).await;
            }
        }
        Ok(item)
    }

    async fn attach_existing(&self, existing: Item, parent: &Item, before: Option<&Item>) -> Result<()> {
        let parent_property = self.inner.store.parent_property().to_string();
        let multi_parented = self.inner.store.multi_parented() == MultiParented::Multiple
            || matches!(parent.get(&parent_property), Some(Value::Array(_)))
            || matches!(existing.get(&parent_property), Some(Value::Array(_)));

        if multi_parented {
            let parent_id = self.get_identity(parent).ok_or(ModelError::MissingIdentity)?;
            let mut parents = Parents::from_item(&existing, &parent_property);
            if !parents.is_multiple() {
                parents = Parents::multiple(parents.iter().cloned());
            }
            if parents.add(parent_id) {
                let mut existing = existing;
                self.set_value(&mut existing, &parent_property, parents.to_value())
                    .await?;
                self.children_changed(vec![parent.clone()]).await;
            }
            return Ok(());
        }

        let former = self.get_parents(&existing).await;
        match former.first() {
            Some(old_parent) => {
                self.paste_item(&existing, old_parent, parent, false, before)
                    .await
            }
            None => {
                let root = self.get_root().await?;
                self.paste_item(&existing, &root, parent, false, before).await
            }
        }
    }

    /// Moves `child` from `old_parent` to `new_parent`, or adds
    /// `new_parent` as an extra parent when `copy` is set.
    pub async fn paste_item(
        &self,
        child: &Item,
        old_parent: &Item,
        new_parent: &Item,
        copy: bool,
        before: Option<&Item>,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.resolve_root().await;
        let parent_property = self.inner.store.parent_property().to_string();
        let mut child = self.current(child).await?.unwrap_or_else(|| child.clone());
        let mut parents = Parents::from_item(&child, &parent_property);
        let old_id = self.get_identity(old_parent);
        let new_id = self.get_identity(new_parent);

        let mut affected = vec![new_parent.clone()];
        if old_id != new_id {
            let from_root = self.is_root(old_parent);
            let to_root = self.is_root(new_parent);
            if !copy {
                affected.push(old_parent.clone());
                if let Some(old_id) = &old_id {
                    parents.remove(old_id);
                }
            }
            if from_root && !copy {
                self.emit(ModelEvent::RootChange {
                    item: child.clone(),
                    action: RootAction::Detach,
                });
            }
            if to_root {
                self.emit(ModelEvent::RootChange {
                    item: child.clone(),
                    action: RootAction::Attach,
                });
            }
            if !self.is_forest_root(new_parent) {
                if let Some(new_id) = new_id {
                    parents.add(new_id);
                }
            }
        }

        match parents.to_value() {
            Value::Null => {
                child.remove(&parent_property);
            }
            value => {
                child.set(parent_property, value);
            }
        }
        let previous = self.remember(&child);
        let before_id = before.and_then(|item| self.get_identity(item));
        let options = PutOptions::default().placed_before(before_id);
        if let Err(err) = self.inner.store.put(child.clone(), options).await {
            self.restore_snapshot(&child, previous);
            return Err(err.into());
        }

        self.children_changed(affected).await;
        Ok(())
    }

    /// Removes `item` from the store. Returns false when it did not exist.
    pub async fn delete_item(&self, item: &Item) -> Result<bool> {
        self.ensure_writable()?;
        self.resolve_root().await;
        let id = self.get_identity(item).ok_or(ModelError::MissingIdentity)?;
        let captured = self.current(item).await?.unwrap_or_else(|| item.clone());
        let removed = self.inner.store.remove(&id).await?;
        if removed && !self.inner.monitored {
            self.on_delete_item(captured).await;
        }
        Ok(removed)
    }
}
