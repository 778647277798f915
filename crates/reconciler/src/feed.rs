/// Remote change feed adapter: normalizes raw store notifications into the
/// uniform event shape the engine consumes. Pure translation, no merge
/// logic; the store-assigned identifier is attached as `uid`.
use element::{Animation, Element, ElementError, RemoteId};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{AssetKind, ChangeKind, Collection, DocChange};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Element(#[from] ElementError),

    #[error("document {0} carries no logical id")]
    MissingId(RemoteId),

    #[error("document {0} is malformed: {1}")]
    Malformed(RemoteId, String),
}

/// Normalized remote event. Element and animation events carry the current
/// full value as a snapshot; removals carry the last known value.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    ElementAdded(Element),
    ElementModified(Element),
    ElementRemoved(Element),
    AnimationAdded(Animation),
    AnimationModified(Animation),
    AnimationRemoved(Animation),
    AssetAdded(AssetKind, String),
    BackgroundChanged(String),
    MaxTimeChanged(u64),
}

/// Translate one raw change. A project-document change can carry both
/// scalar fields, so the result is a (possibly empty) list of events.
pub fn decode(change: &DocChange) -> Result<Vec<RemoteEvent>, FeedError> {
    match change.collection {
        Collection::Elements => {
            if change.data.get("id").is_none() {
                return Err(FeedError::MissingId(change.doc_id.clone()));
            }
            let mut element = Element::from_document(&change.data)?;
            element.uid = Some(change.doc_id.clone());
            Ok(vec![match change.kind {
                ChangeKind::Added => RemoteEvent::ElementAdded(element),
                ChangeKind::Modified => RemoteEvent::ElementModified(element),
                ChangeKind::Removed => RemoteEvent::ElementRemoved(element),
            }])
        }
        Collection::Animations => {
            let mut animation = Animation::from_document(&change.data)?;
            animation.uid = Some(change.doc_id.clone());
            Ok(vec![match change.kind {
                ChangeKind::Added => RemoteEvent::AnimationAdded(animation),
                ChangeKind::Modified => RemoteEvent::AnimationModified(animation),
                ChangeKind::Removed => RemoteEvent::AnimationRemoved(animation),
            }])
        }
        Collection::Project => {
            let mut events = Vec::new();
            if let Some(color) = change.data.get("background").and_then(Value::as_str) {
                events.push(RemoteEvent::BackgroundChanged(color.to_string()));
            }
            if let Some(max_time) = change.data.get("max_time").and_then(Value::as_u64) {
                events.push(RemoteEvent::MaxTimeChanged(max_time));
            }
            Ok(events)
        }
        Collection::Videos | Collection::Audios | Collection::Images => {
            // Asset catalogs are append-only; other change kinds are noise.
            if change.kind != ChangeKind::Added {
                return Ok(Vec::new());
            }
            let url = change
                .data
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    FeedError::Malformed(change.doc_id.clone(), "missing url".to_string())
                })?;
            let kind = match change.collection {
                Collection::Videos => AssetKind::Video,
                Collection::Audios => AssetKind::Audio,
                _ => AssetKind::Image,
            };
            Ok(vec![RemoteEvent::AssetAdded(kind, url.to_string())])
        }
    }
}

/// Receiving half of a store subscription. Dropping or unsubscribing stops
/// delivery; unsubscription is idempotent, and batches already broadcast by
/// the store are silently discarded afterwards.
#[derive(Debug)]
pub struct FeedSubscription {
    rx: mpsc::UnboundedReceiver<Vec<DocChange>>,
    active: bool,
}

impl FeedSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Vec<DocChange>>) -> Self {
        Self { rx, active: true }
    }

    /// Non-blocking drain of the next pending batch.
    pub fn try_next(&mut self) -> Option<Vec<DocChange>> {
        if !self.active {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub async fn next(&mut self) -> Option<Vec<DocChange>> {
        if !self.active {
            return None;
        }
        self.rx.recv().await
    }

    pub fn unsubscribe(&mut self) {
        if self.active {
            self.active = false;
            self.rx.close();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use element::ElementId;
    use serde_json::json;

    fn element_change(kind: ChangeKind) -> DocChange {
        let element = Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
        DocChange {
            collection: Collection::Elements,
            kind,
            doc_id: RemoteId::new("d1"),
            data: element.to_document().unwrap(),
        }
    }

    #[test]
    fn element_events_attach_the_store_identifier() {
        let events = decode(&element_change(ChangeKind::Modified)).unwrap();
        match events.as_slice() {
            [RemoteEvent::ElementModified(element)] => {
                assert_eq!(element.uid, Some(RemoteId::new("d1")));
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn project_change_can_yield_both_scalar_events() {
        let change = DocChange {
            collection: Collection::Project,
            kind: ChangeKind::Modified,
            doc_id: RemoteId::new("p"),
            data: json!({ "background": "#222222", "max_time": 45_000 }),
        };
        let events = decode(&change).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RemoteEvent::BackgroundChanged(c) if c == "#222222"));
        assert!(matches!(&events[1], RemoteEvent::MaxTimeChanged(45_000)));
    }

    #[test]
    fn missing_logical_id_is_reported() {
        let change = DocChange {
            collection: Collection::Elements,
            kind: ChangeKind::Removed,
            doc_id: RemoteId::new("d2"),
            data: json!({ "type": "audio" }),
        };
        assert!(matches!(decode(&change), Err(FeedError::MissingId(_))));
    }

    #[test]
    fn unknown_kind_surfaces_as_element_error() {
        let change = DocChange {
            collection: Collection::Elements,
            kind: ChangeKind::Added,
            doc_id: RemoteId::new("d3"),
            data: json!({ "id": ElementId::new(), "type": "hologram" }),
        };
        assert!(matches!(
            decode(&change),
            Err(FeedError::Element(ElementError::UnsupportedKind(_)))
        ));
    }

    #[test]
    fn unsubscribe_is_idempotent_and_stops_delivery() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut feed = FeedSubscription::new(rx);
        tx.send(vec![element_change(ChangeKind::Added)]).unwrap();

        feed.unsubscribe();
        feed.unsubscribe();
        assert!(!feed.is_active());
        // The already-broadcast batch is discarded, not delivered.
        assert!(feed.try_next().is_none());
    }
}
