/// Concurrent-editing synchronization engine for a collaborative timeline.
/// Reconciles the locally-held element collection against a continuously
/// updated remote replica, deferring and merging concurrent edits.
use serde::{Deserialize, Serialize};
use std::fmt;

mod store;
pub use store::*;

mod feed;
pub use feed::*;

mod memory;
pub use memory::*;

mod shelf;
pub use shelf::*;

mod engine;
pub use engine::*;

/// Remote project scope; all collections live under one project document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
