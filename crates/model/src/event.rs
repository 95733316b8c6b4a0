use checktree_store::Item;
use serde_json::Value;

/// How a root-level membership change came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootAction {
    New,
    Delete,
    Attach,
    Detach,
}

/// Notification delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A property of `item` changed. `value` is `None` when it was removed.
    Change {
        item: Item,
        property: String,
        value: Option<Value>,
    },
    ChildrenChange {
        parent: Item,
        children: Vec<Item>,
    },
    /// Whole-tree validation finished.
    DataValidated,
    Delete {
        item: Item,
    },
    RootChange {
        item: Item,
        action: RootAction,
    },
    LabelChange {
        old: String,
        new: String,
    },
    Error {
        message: String,
    },
}

impl ModelEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Change { .. } => "change",
            Self::ChildrenChange { .. } => "children-change",
            Self::DataValidated => "data-validated",
            Self::Delete { .. } => "delete",
            Self::RootChange { .. } => "root-change",
            Self::LabelChange { .. } => "label-change",
            Self::Error { .. } => "error",
        }
    }
}
