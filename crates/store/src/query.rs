use crate::item::{Item, ItemId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Object query: a conjunction of property constraints.
///
/// A constraint matches when the object's value equals it, or when the
/// object's value is an array containing it. A `null` constraint matches
/// objects where the property is null or absent. Identity-like scalars
/// compare by their string form, so `1` matches `"1"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(BTreeMap<String, Value>);

impl Query {
    /// Query matching every object.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(property.into(), value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn constraints(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn matches(&self, item: &Item) -> bool {
        self.0
            .iter()
            .all(|(property, expected)| value_matches(item.get(property), expected))
    }
}

fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None | Some(Value::Null), Value::Null) => true,
        (None, _) => false,
        (Some(Value::Array(values)), expected) if !expected.is_array() => {
            values.iter().any(|value| scalar_eq(value, expected))
        }
        (Some(actual), expected) => scalar_eq(actual, expected),
    }
}

fn scalar_eq(actual: &Value, expected: &Value) -> bool {
    match (ItemId::from_value(actual), ItemId::from_value(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_query_matches_everything() {
        assert!(Query::all().matches(&Item::new()));
        assert!(Query::all().matches(&Item::new().with("id", "a")));
    }

    #[test]
    fn equality_and_membership() {
        let item = Item::new()
            .with("type", "continent")
            .with("parent", json!(["a", "b"]));
        assert!(Query::all().eq("type", "continent").matches(&item));
        assert!(!Query::all().eq("type", "country").matches(&item));
        assert!(Query::all().eq("parent", "b").matches(&item));
        assert!(!Query::all().eq("parent", "c").matches(&item));
        assert!(Query::all()
            .eq("type", "continent")
            .eq("parent", "a")
            .matches(&item));
    }

    #[test]
    fn null_matches_absent() {
        let root = Item::new().with("id", "root");
        let child = Item::new().with("id", "c").with("parent", "root");
        let top = Query::all().eq("parent", Value::Null);
        assert!(top.matches(&root));
        assert!(!top.matches(&child));
    }

    #[test]
    fn numeric_and_string_identities_compare_equal() {
        let item = Item::new().with("parent", 1);
        assert!(Query::all().eq("parent", "1").matches(&item));
        assert!(!Query::all().eq("missing", "1").matches(&item));
    }
}
