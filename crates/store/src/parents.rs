use crate::item::{Item, ItemId};
use serde_json::Value;

/// Ordered set of parent identities read from an object's parent property.
///
/// A parent property holds either a single identity or an array of them.
/// `Parents` remembers which shape it was built from: a single-shaped set
/// holds at most one identity (adding replaces it) and serializes back to a
/// scalar, a multi-shaped set serializes to an array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parents {
    ids: Vec<ItemId>,
    multiple: bool,
}

impl Parents {
    /// Empty, single-shaped set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Multi-shaped set from the given identities, duplicates dropped.
    pub fn multiple(ids: impl IntoIterator<Item = ItemId>) -> Self {
        let mut parents = Self {
            ids: Vec::new(),
            multiple: true,
        };
        for id in ids {
            parents.add(id);
        }
        parents
    }

    #[must_use]
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Array(values)) => {
                Self::multiple(values.iter().filter_map(ItemId::from_value))
            }
            Some(value) => Self {
                ids: ItemId::from_value(value).into_iter().collect(),
                multiple: false,
            },
            None => Self::default(),
        }
    }

    #[must_use]
    pub fn from_item(item: &Item, parent_property: &str) -> Self {
        Self::from_value(item.get(parent_property))
    }

    /// Inserts `id`; returns false when it was already present.
    pub fn add(&mut self, id: ItemId) -> bool {
        if self.contains(&id) {
            return false;
        }
        if self.multiple || self.ids.is_empty() {
            self.ids.push(id);
        } else {
            self.ids[0] = id;
        }
        true
    }

    /// Removes `id`; returns false when it was not present.
    pub fn remove(&mut self, id: &ItemId) -> bool {
        match self.ids.iter().position(|p| p == id) {
            Some(index) => {
                self.ids.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn set(&mut self, id: ItemId) {
        self.ids.clear();
        self.ids.push(id);
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.ids.iter()
    }

    #[must_use]
    pub fn first(&self) -> Option<&ItemId> {
        self.ids.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Value to store under the parent property.
    #[must_use]
    pub fn to_value(&self) -> Value {
        if self.multiple {
            Value::Array(self.ids.iter().map(ItemId::to_value).collect())
        } else {
            self.ids.first().map_or(Value::Null, ItemId::to_value)
        }
    }
}

impl<'a> IntoIterator for &'a Parents {
    type Item = &'a ItemId;
    type IntoIter = std::slice::Iter<'a, ItemId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}
