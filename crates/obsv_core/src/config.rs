//! Structure configuration.

/// How a multi-map entry treats a value that it already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    /// Values are kept in insertion order and duplicates are allowed.
    #[default]
    List,
    /// Values are kept in insertion order and duplicates are rejected.
    Set,
}

impl ValueKind {
    /// Returns true if this kind rejects duplicate values.
    #[must_use]
    pub const fn is_distinct(self) -> bool {
        matches!(self, Self::Set)
    }
}

/// Configuration shared by graphs, maps and multi-maps.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of events retained by the change feed for polling (0 = none).
    pub history_limit: usize,

    /// Duplicate policy for multi-map value collections.
    pub value_kind: ValueKind,

    /// Label attached to tracing output for this structure.
    pub label: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_limit: 1024,
            value_kind: ValueKind::List,
            label: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the change feed history limit.
    #[must_use]
    pub const fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the multi-map value kind.
    #[must_use]
    pub const fn value_kind(mut self, kind: ValueKind) -> Self {
        self.value_kind = kind;
        self
    }

    /// Sets the tracing label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
