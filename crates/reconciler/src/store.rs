/// Contracts the engine requires of its remote collaborators: a document
/// store with per-collection change subscriptions and a binary asset store.
/// Implementations live elsewhere; the engine only holds trait handles.
use element::{Animation, Element, FieldDelta, RemoteId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::{FeedSubscription, ProjectId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote write failed: {0}")]
    Write(String),

    #[error("unknown project: {0}")]
    UnknownProject(ProjectId),

    #[error("store closed")]
    Closed,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Collections of the project document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Elements,
    Animations,
    /// The project document itself; carries the scalar `background` and
    /// `max_time` fields.
    Project,
    Videos,
    Audios,
    Images,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Elements => "elements",
            Collection::Animations => "animations",
            Collection::Project => "project",
            Collection::Videos => "videos",
            Collection::Audios => "audios",
            Collection::Images => "images",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One raw change notification. Carries the current full value of the
/// document (the last known value for removals), never a delta: delivery
/// order per document is not guaranteed FIFO across network retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChange {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub doc_id: RemoteId,
    pub data: Value,
}

/// Asset URL catalogs kept on the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

impl AssetKind {
    pub fn collection(&self) -> Collection {
        match self {
            AssetKind::Video => Collection::Videos,
            AssetKind::Audio => Collection::Audios,
            AssetKind::Image => Collection::Images,
        }
    }

    pub fn folder(&self) -> &'static str {
        match self {
            AssetKind::Video => "videos",
            AssetKind::Audio => "audios",
            AssetKind::Image => "images",
        }
    }
}

/// Remote document store, keyed by project. Writes are issued
/// fire-and-forget by the engine: the local optimistic apply never waits on
/// completion, and there is no retry machinery behind this trait.
pub trait ProjectStore: Send + Sync {
    fn create_element(&self, project: &ProjectId, element: &Element) -> StoreResult<RemoteId>;

    /// Full-document upsert: recreates the document if it was deleted.
    fn replace_element(
        &self,
        project: &ProjectId,
        uid: &RemoteId,
        element: &Element,
    ) -> StoreResult<()>;

    /// Field-level partial update.
    fn update_element(
        &self,
        project: &ProjectId,
        uid: &RemoteId,
        delta: &FieldDelta,
    ) -> StoreResult<()>;

    /// Idempotent: deleting an already-deleted document succeeds.
    fn delete_element(&self, project: &ProjectId, uid: &RemoteId) -> StoreResult<()>;

    fn create_animation(&self, project: &ProjectId, animation: &Animation)
        -> StoreResult<RemoteId>;

    fn replace_animation(
        &self,
        project: &ProjectId,
        uid: &RemoteId,
        animation: &Animation,
    ) -> StoreResult<()>;

    fn delete_animation(&self, project: &ProjectId, uid: &RemoteId) -> StoreResult<()>;

    fn set_background(&self, project: &ProjectId, color: &str) -> StoreResult<()>;

    fn set_max_time(&self, project: &ProjectId, max_time: u64) -> StoreResult<()>;

    fn add_asset_url(&self, project: &ProjectId, kind: AssetKind, url: &str) -> StoreResult<()>;

    /// Subscribe to every collection of the project. The first batch replays
    /// all existing documents as `Added`.
    fn subscribe(&self, project: &ProjectId) -> FeedSubscription;
}

/// Binary asset store: accepts a named blob under a folder path and returns
/// a stable retrieval URL. The engine stores and relays URLs, never bytes.
pub trait AssetStore: Send + Sync {
    fn upload(
        &self,
        project: &ProjectId,
        folder: &str,
        name: &str,
        bytes: &[u8],
    ) -> StoreResult<String>;
}
