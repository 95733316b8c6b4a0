use serde_json::Value;
use std::fmt;

/// Tri-state checkbox value.
///
/// "Undefined" (no stored value) is modeled as `Option::None` by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckedState {
    Unchecked,
    Checked,
    Mixed,
}

impl CheckedState {
    /// Stored representation of the mixed state.
    pub const MIXED: &'static str = "mixed";

    /// Reads a persisted value. Null means undefined; anything that is not a
    /// boolean or `"mixed"` coerces by truthiness.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(checked) => Some(Self::from(*checked)),
            Value::String(s) if s == Self::MIXED => Some(Self::Mixed),
            Value::String(s) => Some(Self::from(!s.is_empty())),
            Value::Number(n) => Some(Self::from(n.as_f64().is_some_and(|n| n != 0.0))),
            Value::Array(_) | Value::Object(_) => Some(Self::Checked),
        }
    }

    #[must_use]
    pub fn to_value(self) -> Value {
        match self {
            Self::Unchecked => Value::Bool(false),
            Self::Checked => Value::Bool(true),
            Self::Mixed => Value::String(Self::MIXED.to_string()),
        }
    }

    #[must_use]
    pub fn is_mixed(self) -> bool {
        self == Self::Mixed
    }
}

impl From<bool> for CheckedState {
    fn from(checked: bool) -> Self {
        if checked {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }
}

impl fmt::Display for CheckedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchecked => f.write_str("false"),
            Self::Checked => f.write_str("true"),
            Self::Mixed => f.write_str(Self::MIXED),
        }
    }
}

/// Aggregate state of a set of children.
///
/// Undefined children are ignored; an empty or all-undefined set yields
/// `None`. Any mixed child, or a mix of checked and unchecked children,
/// yields `Mixed`.
pub fn composite_state<I>(states: I) -> Option<CheckedState>
where
    I: IntoIterator<Item = Option<CheckedState>>,
{
    let mut checked = false;
    let mut unchecked = false;
    for state in states.into_iter().flatten() {
        match state {
            CheckedState::Mixed => return Some(CheckedState::Mixed),
            CheckedState::Checked => checked = true,
            CheckedState::Unchecked => unchecked = true,
        }
    }
    match (checked, unchecked) {
        (true, true) => Some(CheckedState::Mixed),
        (true, false) => Some(CheckedState::Checked),
        (false, true) => Some(CheckedState::Unchecked),
        (false, false) => None,
    }
}

/// Item properties the model reads through configured property names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Checked,
    Enabled,
    Icon,
    Label,
}

/// Presentation state of a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemState {
    pub checked: Option<CheckedState>,
    pub enabled: bool,
}
