use crate::error::{ModelError, Result};
use anyhow::Context;
use checktree_store::Query;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_ROOT_ID: &str = "$root$";

/// Configuration of a checkbox tree model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Materialize `checked_state` on every item read without a checked value
    pub checked_all: bool,

    /// Default checked value for items without one
    pub checked_state: bool,

    /// Whether the root takes part in checked-state propagation
    pub checked_root: bool,

    /// Cascade to descendants and reconcile ancestors on every change
    pub checked_strict: bool,

    /// Item property holding the checked state
    pub checked_attr: String,

    /// Item property holding the enabled flag (read-only after construction)
    pub enabled_attr: Option<String>,

    /// Item property holding an icon descriptor
    pub icon_attr: Option<String>,

    /// Item property holding the display label
    pub label_attr: String,

    /// Allow the mixed state on branches
    pub multi_state: bool,

    /// Coerce mixed leaves to checked
    pub normalize: bool,

    /// Root query: the single root item, or the top-level items of a forest
    pub query: Query,

    /// Fabricate a root above every item matching `query`
    pub forest: bool,

    /// Identity of the fabricated forest root
    pub root_id: String,

    /// Label reported for the root instead of its label property
    pub root_label: Option<String>,

    /// Validate the whole tree when the model opens
    pub validate_store: bool,

    /// Capacity of the model event channel
    pub event_capacity: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            checked_all: true,
            checked_state: false,
            checked_root: false,
            checked_strict: true,
            checked_attr: "checked".to_string(),
            enabled_attr: None,
            icon_attr: None,
            label_attr: "name".to_string(),
            multi_state: true,
            normalize: true,
            query: Query::all(),
            forest: false,
            root_id: DEFAULT_ROOT_ID.to_string(),
            root_label: None,
            validate_store: true,
            event_capacity: 1024,
        }
    }
}

impl ModelConfig {
    /// Model over a single root item selected by `query`
    pub fn single_root(query: Query) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    /// Model over a fabricated root whose children match `query`
    pub fn forest(query: Query) -> Self {
        Self {
            query,
            forest: true,
            ..Default::default()
        }
    }

    /// Plain checkboxes: no propagation, no mixed state
    pub fn flat() -> Self {
        Self {
            checked_strict: false,
            multi_state: false,
            validate_store: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.checked_attr.is_empty() {
            return Err(ModelError::config("checked_attr must not be empty"));
        }
        if self.label_attr.is_empty() {
            return Err(ModelError::config("label_attr must not be empty"));
        }
        if self.checked_attr == self.label_attr {
            return Err(ModelError::config(format!(
                "checked_attr and label_attr must differ (both '{}')",
                self.checked_attr
            )));
        }
        if matches!(&self.enabled_attr, Some(attr) if attr.is_empty()) {
            return Err(ModelError::config("enabled_attr must not be empty when set"));
        }
        if self.forest && self.root_id.is_empty() {
            return Err(ModelError::config("root_id must not be empty for a forest root"));
        }
        if self.event_capacity == 0 {
            return Err(ModelError::config("event_capacity must be > 0"));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(source).context("Failed to parse model config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model config {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("Invalid model config {}", path.display()))
    }
}
