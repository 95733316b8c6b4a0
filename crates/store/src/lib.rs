//! # Checktree Store
//!
//! Hierarchical object store contract and the in-memory stores used by the
//! checktree model.
//!
//! ## Features
//!
//! - **Store contract** (`HierarchyStore`): async get/put/remove/query with
//!   parent-property based children lookup
//! - **Multi-parent helper** (`Parents`): one shape-preserving abstraction
//!   over single and multiple parent references
//! - **In-memory store** with single, multiple or auto-detected parent shape
//!   and `before` placement
//! - **Evented wrapper** signaling `new` / `change` / `delete` mutations
//!
//! ## Architecture
//!
//! ```text
//! EventedStore<S> ──> broadcast::Sender<StoreEvent>
//!     │
//!     └──> S: HierarchyStore (MemoryStore)
//!            ├─> Item / ItemId
//!            ├─> Parents
//!            └─> Query
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use checktree_store::{EventedStore, HierarchyStore, Item, MemoryStore, MemoryStoreConfig, PutOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = EventedStore::new(MemoryStore::new(MemoryStoreConfig::default()));
//!     let mut events = store.subscribe().expect("evented");
//!
//!     store.put(Item::new().with("id", "root"), PutOptions::default()).await?;
//!     store.put(Item::new().with("id", "a").with("parent", "root"), PutOptions::default()).await?;
//!
//!     let root = store.get(&"root".into()).await?.expect("root");
//!     println!("{} children", store.get_children(&root).await?.len());
//!     println!("{:?}", events.recv().await?);
//!     Ok(())
//! }
//! ```

mod api;
mod error;
mod evented;
mod item;
mod memory;
mod parents;
mod query;

pub use api::{HierarchyStore, MultiParented, PutOptions, StoreEvent};
pub use error::{Result, StoreError};
pub use evented::{EventedStore, DEFAULT_EVENT_CAPACITY};
pub use item::{Item, ItemId};
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use parents::Parents;
pub use query::Query;
