//! # Checktree Model
//!
//! Tri-state checked-state propagation for checkbox trees over a
//! hierarchical store.
//!
//! ## Features
//!
//! - **Strict mode**: a change cascades to every descendant, ancestors are
//!   reconciled to the composite state of their children
//! - **Lazy state**: checked values are materialized on first read when
//!   `checked_all` is set
//! - **Multi-parent hierarchies**: diamonds converge on every path
//! - **Store bridge**: external store mutations invalidate cached children
//!   and trigger the same reconciliation
//! - **Event stream** for the presentation layer
//!
//! ## Architecture
//!
//! ```text
//! set_checked(item, state)
//!     │
//!     ├──> Cascade (update_checked_child)
//!     │      └─> descendants, parents first
//!     │
//!     ├──> Reconciliation (update_checked_parent)
//!     │      └─> composite of children, walking up
//!     │
//!     └──> ModelEvent stream
//!
//! StoreEvent ──> Bridge ──> ChildrenCache invalidation
//!                   └─> Reconciliation
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use checktree_model::{CheckedState, ModelConfig, TreeModel};
//! use checktree_store::{EventedStore, MemoryStore, MemoryStoreConfig, Query};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(EventedStore::new(MemoryStore::new(MemoryStoreConfig::default())));
//!     let config = ModelConfig::single_root(Query::all().eq("id", "root"));
//!     let model = TreeModel::open(store, config).await?;
//!
//!     let root = model.get_root().await?;
//!     for child in model.get_children(&root).await? {
//!         model.set_checked(&child, CheckedState::Checked).await;
//!     }
//!     model.sync_store_events().await;
//!     Ok(())
//! }
//! ```

mod bridge;
mod cache;
mod checked;
mod config;
mod error;
mod event;
mod model;
mod state;
mod write;

pub use config::{ModelConfig, DEFAULT_ROOT_ID};
pub use error::{ModelError, Result};
pub use event::{ModelEvent, RootAction};
pub use model::TreeModel;
pub use state::{composite_state, CheckedState, ItemField, ItemState};
