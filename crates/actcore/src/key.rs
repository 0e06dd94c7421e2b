use serde::{Deserialize, Serialize};
use std::fmt;

/// Named transition selector returned by an activity's execution.
///
/// Keys compare by name only; the `Default` sentinel is the catch-all entry
/// in a transition table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NextActivityKey(String);

pub const DEFAULT_KEY_NAME: &str = "Default";

impl NextActivityKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_KEY_NAME
    }
}

impl Default for NextActivityKey {
    fn default() -> Self {
        Self(DEFAULT_KEY_NAME.to_string())
    }
}

impl fmt::Display for NextActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NextActivityKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Ordered execution priority.
///
/// Interrupt requests are gated on `target.priority >= context.priority`;
/// `HIGHEST` is reserved for instance cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const LOWEST: Priority = Priority(i32::MIN);
    pub const NORMAL: Priority = Priority(0);
    pub const HIGHEST: Priority = Priority(i32::MAX);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
