use checktree_store::ItemId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

type Slot = Arc<OnceCell<Vec<ItemId>>>;

/// Cache lookup result for one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheState {
    Missing,
    Pending,
    Resolved(usize),
}

/// Per-parent children identities.
///
/// Each parent owns one `OnceCell`: concurrent callers join the query in
/// flight instead of issuing their own. A failed query leaves the cell empty
/// so the next caller retries. Invalidation drops the cell; callers already
/// waiting on it still receive its result.
#[derive(Default)]
pub(crate) struct ChildrenCache {
    slots: Mutex<HashMap<ItemId, Slot>>,
}

impl ChildrenCache {
    fn slots(&self) -> MutexGuard<'_, HashMap<ItemId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) async fn get_or_fetch<E, F, Fut>(&self, parent: &ItemId, fetch: F) -> Result<Vec<ItemId>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ItemId>, E>>,
    {
        let slot = self.slots().entry(parent.clone()).or_default().clone();
        slot.get_or_try_init(fetch).await.cloned()
    }

    pub(crate) fn state(&self, parent: &ItemId) -> CacheState {
        match self.slots().get(parent) {
            None => CacheState::Missing,
            Some(slot) => match slot.get() {
                Some(children) => CacheState::Resolved(children.len()),
                None => CacheState::Pending,
            },
        }
    }

    pub(crate) fn invalidate(&self, parent: &ItemId) -> bool {
        self.slots().remove(parent).is_some()
    }

    pub(crate) fn clear(&self) {
        self.slots().clear();
    }
}
