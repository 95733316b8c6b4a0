//! Checked-state engine: normalization, the minimal-write gate, downward
//! cascade, upward reconciliation and whole-tree validation.

use crate::event::ModelEvent;
use crate::model::TreeModel;
use crate::state::{composite_state, CheckedState, ItemField};
use checktree_store::Item;
use log::{debug, info};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

impl TreeModel {
    /// Checked state of `item` as currently stored.
    ///
    /// The root reports `None` unless it takes part in propagation. With
    /// `checked_all` an undefined value is replaced by the configured default,
    /// which is persisted.
    pub async fn get_checked(&self, item: &Item) -> Option<CheckedState> {
        self.resolve_root().await;
        let mut current = self.current_or_report(item).await.unwrap_or_else(|| item.clone());
        self.read_checked(&mut current).await
    }

    /// Sets the checked state of `item`. In strict mode the state cascades
    /// to every descendant and the ancestors are reconciled afterwards.
    pub async fn set_checked(&self, item: &Item, state: CheckedState) {
        self.resolve_root().await;
        let _walk = self.inner.walks.lock().await;
        let Some(current) = self.current_or_report(item).await else {
            debug!("set_checked on an item that is no longer stored");
            return;
        };
        if self.with_config(|c| c.checked_strict) {
            self.update_checked_child(current, state).await;
        } else {
            let mut current = current;
            self.set_checked_raw(&mut current, state).await;
        }
    }

    /// Coerces `state` to what `item` may hold.
    #[must_use]
    pub fn normalize_state(&self, item: &Item, state: CheckedState) -> CheckedState {
        if !state.is_mixed() {
            return state;
        }
        let (multi_state, normalize) = self.with_config(|c| (c.multi_state, c.normalize));
        if !multi_state {
            return CheckedState::Checked;
        }
        if normalize && !self.may_have_children(item) {
            return CheckedState::Checked;
        }
        CheckedState::Mixed
    }

    /// Re-establishes the composite state of every ancestor of `item`.
    pub async fn reconcile_ancestors(&self, item: &Item) {
        self.resolve_root().await;
        let _walk = self.inner.walks.lock().await;
        if let Some(current) = self.current_or_report(item).await {
            self.update_checked_parent(current, false).await;
        }
    }

    /// Runs whole-tree validation when strict mode and store validation are
    /// both enabled.
    pub async fn validate_data(&self) {
        if !self.with_config(|c| c.checked_strict && c.validate_store) {
            return;
        }
        let _walk = self.inner.walks.lock().await;
        let root = match self.get_root().await {
            Ok(root) => root,
            Err(err) => return self.report_error("validate data", &err),
        };
        let children = match self.get_children(&root).await {
            Ok(children) => children,
            Err(err) => return self.report_error("validate data", &err),
        };
        info!("validating checked states below the root");
        self.validate_children(root, children).await;
    }

    /// Switches strict mode. Turning it on re-validates the tree.
    pub async fn set_checked_strict(&self, strict: bool) {
        let was_strict = self.with_config(|c| c.checked_strict);
        if was_strict == strict {
            return;
        }
        {
            let mut config = self
                .inner
                .config
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            config.checked_strict = strict;
        }
        if strict {
            self.validate_data().await;
        }
    }

    pub(crate) async fn read_checked(&self, item: &mut Item) -> Option<CheckedState> {
        let (checked_root, checked_all, default) =
            self.with_config(|c| (c.checked_root, c.checked_all, c.checked_state));
        if !checked_root && self.is_root(item) {
            return None;
        }
        let attr = self.property_name(ItemField::Checked)?;
        match item.get(&attr).and_then(CheckedState::from_value) {
            Some(state) => Some(state),
            None if checked_all => {
                let state = CheckedState::from(default);
                self.set_checked_raw(item, state).await;
                Some(state)
            }
            None => None,
        }
    }

    /// Writes `state` only when it changes the stored value, or when
    /// normalization altered it. Returns whether the store was written.
    pub(crate) async fn set_checked_raw(&self, item: &mut Item, state: CheckedState) -> bool {
        let (checked_root, checked_all, multi_state, normalize) = self.with_config(|c| {
            (c.checked_root, c.checked_all, c.multi_state, c.normalize)
        });
        if !checked_root && self.is_root(item) {
            return false;
        }
        if state.is_mixed() && multi_state && normalize && !self.children_resolved(item) {
            if let Err(err) = self.get_children(item).await {
                self.report_error("resolve children", &err);
            }
        }

        let normalized = self.normalize_state(item, state);
        let Some(attr) = self.property_name(ItemField::Checked) else {
            return false;
        };
        let current = item.get(&attr).and_then(CheckedState::from_value);
        let writable = current.is_some() || checked_all;
        if !writable || (current == Some(normalized) && normalized == state) {
            return false;
        }
        match self.set_value(item, &attr, normalized.to_value()).await {
            Ok(written) => written,
            Err(err) => {
                self.report_error("set checked", &err);
                false
            }
        }
    }

    /// Cascade: writes `state` to `item` and then to its descendants,
    /// parents before children. Every node whose value changed reconciles
    /// its ancestors afterwards.
    fn update_checked_child(&self, item: Item, state: CheckedState) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let children = match self.get_children(&item).await {
                Ok(children) => children,
                Err(err) => {
                    self.report_error("cascade checked state", &err);
                    Vec::new()
                }
            };
            let mut item = item;
            let changed = self.set_checked_raw(&mut item, state).await;
            for child in children {
                self.update_checked_child(child, state).await;
            }
            if changed {
                self.update_checked_parent(item, false).await;
            }
        })
    }

    /// Reconciliation: recomputes every parent whose state disagrees with
    /// `item` (or every parent when `force` is set) and walks up from the
    /// parents that changed. Shared ancestors may be visited more than once.
    pub(crate) fn update_checked_parent(&self, item: Item, force: bool) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if !self.with_config(|c| c.checked_strict) {
                return;
            }
            let checked_root = self.with_config(|c| c.checked_root);
            let mut item = item;
            let parents = self.get_parents(&item).await;
            let state = self.read_checked(&mut item).await;

            for mut parent in parents {
                if !checked_root && self.is_root(&parent) {
                    continue;
                }
                let parent_state = self.read_checked(&mut parent).await;
                if state != parent_state || force {
                    self.reconcile_parent(parent).await;
                }
            }
        })
    }

    /// Recomputes `parent` from its children and walks further up when the
    /// parent changed.
    pub(crate) async fn reconcile_parent(&self, parent: Item) {
        if !self.with_config(|c| c.checked_root) && self.is_root(&parent) {
            return;
        }
        let children = match self.get_children(&parent).await {
            Ok(children) => children,
            Err(err) => return self.report_error("reconcile parent", &err),
        };
        let Some(state) = self.composite_of(children).await else {
            return;
        };
        let mut parent = self.current_or_report(&parent).await.unwrap_or(parent);
        if self.set_checked_raw(&mut parent, state).await {
            self.update_checked_parent(parent, false).await;
        }
    }

    /// Composite of the children's states. Stops reading at the first mixed
    /// child.
    async fn composite_of(&self, children: Vec<Item>) -> Option<CheckedState> {
        let mut states = Vec::with_capacity(children.len());
        for mut child in children {
            let state = self.read_checked(&mut child).await;
            states.push(state);
            if state == Some(CheckedState::Mixed) {
                break;
            }
        }
        composite_state(states)
    }

    /// Bottom-up validation of the subtree below `parent`.
    fn validate_children(&self, parent: Item, children: Vec<Item>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.inner.validating.fetch_add(1, Ordering::SeqCst);

            for child in &children {
                match self.get_children(child).await {
                    Ok(grandchildren) if !grandchildren.is_empty() => {
                        self.validate_children(child.clone(), grandchildren).await;
                    }
                    Ok(_) => self.normalize_leaf(child.clone()).await,
                    Err(err) => self.report_error("validate children", &err),
                }
            }

            // Children were rewritten by the walk above.
            let mut fresh = Vec::with_capacity(children.len());
            for child in &children {
                if let Some(child) = self.current_or_report(child).await {
                    fresh.push(child);
                }
            }
            let composite = self.composite_of(fresh).await;
            let mut parent = self.current_or_report(&parent).await.unwrap_or(parent);
            let current = self.read_checked(&mut parent).await;
            if let (Some(_), Some(state)) = (current, composite) {
                self.set_checked_raw(&mut parent, state).await;
            }

            if self.inner.validating.fetch_sub(1, Ordering::SeqCst) == 1 {
                info!("checked state validation complete");
                self.emit(ModelEvent::DataValidated);
            }
        })
    }

    /// Reads a leaf (materializing its default) and re-normalizes a stored
    /// mixed value.
    async fn normalize_leaf(&self, leaf: Item) {
        let mut leaf = leaf;
        if self.read_checked(&mut leaf).await != Some(CheckedState::Mixed) {
            return;
        }
        let normalized = self.normalize_state(&leaf, CheckedState::Mixed);
        if normalized.is_mixed() {
            return;
        }
        let Some(attr) = self.property_name(ItemField::Checked) else {
            return;
        };
        if let Err(err) = self.set_value(&mut leaf, &attr, normalized.to_value()).await {
            self.report_error("normalize leaf", &err);
        }
    }
}
