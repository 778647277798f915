use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

mod model;
pub use model::*;
mod animation;
pub use animation::*;
mod diff;
pub use diff::*;
mod merge;
pub use merge::*;

#[derive(Debug, Error)]
pub enum ElementError {
    #[error("unsupported element kind: {0}")]
    UnsupportedKind(String),
    #[error("unsupported animation kind: {0}")]
    UnsupportedAnimationKind(String),
    #[error("malformed record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid placement: {0}")]
    InvalidPlacement(&'static str),
    #[error("time frame start {start} is not before end {end}")]
    InvalidTimeFrame { start: u64, end: u64 },
}

/// Stable logical identifier, assigned at creation and never reassigned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ElementId(pub Uuid);

impl ElementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct AnimationId(pub Uuid);

impl AnimationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnimationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnimationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collaborator identity; opaque to the engine, used for presence display
/// and the last-editor signal only, never for authorization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier; null until the record is first persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
