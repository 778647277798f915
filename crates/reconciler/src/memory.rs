/// In-memory reference implementation of the store contracts.
///
/// Backs the integration tests: several engines subscribe to one
/// `MemoryStore` and every mutation is broadcast synchronously to all live
/// subscribers, the writer included, which is how the real feed behaves and
/// what exercises the engine's self-feedback suppression.
use element::{Animation, Element, FieldDelta, RemoteId};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::{
    AssetKind, AssetStore, ChangeKind, Collection, DocChange, FeedSubscription, ProjectId,
    ProjectStore, StoreError, StoreResult,
};

#[derive(Default)]
struct ProjectDocs {
    scalars: Map<String, Value>,
    elements: BTreeMap<RemoteId, Value>,
    animations: BTreeMap<RemoteId, Value>,
    videos: BTreeMap<RemoteId, Value>,
    audios: BTreeMap<RemoteId, Value>,
    images: BTreeMap<RemoteId, Value>,
    blobs: HashMap<String, Vec<u8>>,
    subscribers: Vec<mpsc::UnboundedSender<Vec<DocChange>>>,
}

impl ProjectDocs {
    fn assets(&mut self, kind: AssetKind) -> &mut BTreeMap<RemoteId, Value> {
        match kind {
            AssetKind::Video => &mut self.videos,
            AssetKind::Audio => &mut self.audios,
            AssetKind::Image => &mut self.images,
        }
    }

    fn broadcast(&mut self, changes: Vec<DocChange>) {
        if changes.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| tx.send(changes.clone()).is_ok());
    }
}

#[derive(Default)]
struct Inner {
    projects: HashMap<ProjectId, ProjectDocs>,
    next_doc: u64,
    fail_writes: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail; used to exercise the
    /// write-failure alert path.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    fn checked(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        let inner = self.lock();
        if inner.fail_writes {
            return Err(StoreError::Write("simulated write failure".to_string()));
        }
        Ok(inner)
    }

    fn next_doc_id(inner: &mut Inner) -> RemoteId {
        inner.next_doc += 1;
        RemoteId::new(format!("d{}", inner.next_doc))
    }

    fn encode<T, E: std::fmt::Display>(
        result: std::result::Result<T, E>,
    ) -> StoreResult<T> {
        result.map_err(|e| StoreError::Write(e.to_string()))
    }

    fn upsert(
        docs: &mut ProjectDocs,
        collection: Collection,
        uid: &RemoteId,
        data: Value,
    ) {
        let map = match collection {
            Collection::Elements => &mut docs.elements,
            Collection::Animations => &mut docs.animations,
            _ => unreachable!("upsert is only used for element and animation documents"),
        };
        let kind = if map.contains_key(uid) {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        map.insert(uid.clone(), data.clone());
        docs.broadcast(vec![DocChange {
            collection,
            kind,
            doc_id: uid.clone(),
            data,
        }]);
    }

    fn delete(docs: &mut ProjectDocs, collection: Collection, uid: &RemoteId) {
        let map = match collection {
            Collection::Elements => &mut docs.elements,
            Collection::Animations => &mut docs.animations,
            _ => unreachable!("delete is only used for element and animation documents"),
        };
        if let Some(data) = map.remove(uid) {
            docs.broadcast(vec![DocChange {
                collection,
                kind: ChangeKind::Removed,
                doc_id: uid.clone(),
                data,
            }]);
        }
    }

    fn set_scalar(&self, project: &ProjectId, key: &str, value: Value) -> StoreResult<()> {
        let mut inner = self.checked()?;
        let docs = inner.projects.entry(project.clone()).or_default();
        docs.scalars.insert(key.to_string(), value);
        let data = Value::Object(docs.scalars.clone());
        docs.broadcast(vec![DocChange {
            collection: Collection::Project,
            kind: ChangeKind::Modified,
            doc_id: RemoteId::new("project"),
            data,
        }]);
        Ok(())
    }
}

impl ProjectStore for MemoryStore {
    fn create_element(&self, project: &ProjectId, element: &Element) -> StoreResult<RemoteId> {
        let mut inner = self.checked()?;
        let uid = Self::next_doc_id(&mut inner);
        let data = Self::encode(element.to_document())?;
        let docs = inner.projects.entry(project.clone()).or_default();
        docs.elements.insert(uid.clone(), data.clone());
        docs.broadcast(vec![DocChange {
            collection: Collection::Elements,
            kind: ChangeKind::Added,
            doc_id: uid.clone(),
            data,
        }]);
        Ok(uid)
    }

    fn replace_element(
        &self,
        project: &ProjectId,
        uid: &RemoteId,
        element: &Element,
    ) -> StoreResult<()> {
        let mut inner = self.checked()?;
        let data = Self::encode(element.to_document())?;
        let docs = inner.projects.entry(project.clone()).or_default();
        Self::upsert(docs, Collection::Elements, uid, data);
        Ok(())
    }

    fn update_element(
        &self,
        project: &ProjectId,
        uid: &RemoteId,
        delta: &FieldDelta,
    ) -> StoreResult<()> {
        let mut inner = self.checked()?;
        let docs = inner.projects.entry(project.clone()).or_default();
        let current = docs
            .elements
            .get(uid)
            .ok_or_else(|| StoreError::Write(format!("no such document: {}", uid)))?;
        let mut element = Self::encode(Element::from_document(current))?;
        delta.apply_to(&mut element);
        let data = Self::encode(element.to_document())?;
        Self::upsert(docs, Collection::Elements, uid, data);
        Ok(())
    }

    fn delete_element(&self, project: &ProjectId, uid: &RemoteId) -> StoreResult<()> {
        let mut inner = self.checked()?;
        let docs = inner.projects.entry(project.clone()).or_default();
        Self::delete(docs, Collection::Elements, uid);
        Ok(())
    }

    fn create_animation(
        &self,
        project: &ProjectId,
        animation: &Animation,
    ) -> StoreResult<RemoteId> {
        let mut inner = self.checked()?;
        let uid = Self::next_doc_id(&mut inner);
        let data = Self::encode(animation.to_document())?;
        let docs = inner.projects.entry(project.clone()).or_default();
        docs.animations.insert(uid.clone(), data.clone());
        docs.broadcast(vec![DocChange {
            collection: Collection::Animations,
            kind: ChangeKind::Added,
            doc_id: uid.clone(),
            data,
        }]);
        Ok(uid)
    }

    fn replace_animation(
        &self,
        project: &ProjectId,
        uid: &RemoteId,
        animation: &Animation,
    ) -> StoreResult<()> {
        let mut inner = self.checked()?;
        let data = Self::encode(animation.to_document())?;
        let docs = inner.projects.entry(project.clone()).or_default();
        Self::upsert(docs, Collection::Animations, uid, data);
        Ok(())
    }

    fn delete_animation(&self, project: &ProjectId, uid: &RemoteId) -> StoreResult<()> {
        let mut inner = self.checked()?;
        let docs = inner.projects.entry(project.clone()).or_default();
        Self::delete(docs, Collection::Animations, uid);
        Ok(())
    }

    fn set_background(&self, project: &ProjectId, color: &str) -> StoreResult<()> {
        self.set_scalar(project, "background", Value::String(color.to_string()))
    }

    fn set_max_time(&self, project: &ProjectId, max_time: u64) -> StoreResult<()> {
        self.set_scalar(project, "max_time", Value::from(max_time))
    }

    fn add_asset_url(&self, project: &ProjectId, kind: AssetKind, url: &str) -> StoreResult<()> {
        let mut inner = self.checked()?;
        let uid = Self::next_doc_id(&mut inner);
        let docs = inner.projects.entry(project.clone()).or_default();
        let data = serde_json::json!({ "url": url });
        docs.assets(kind).insert(uid.clone(), data.clone());
        docs.broadcast(vec![DocChange {
            collection: kind.collection(),
            kind: ChangeKind::Added,
            doc_id: uid,
            data,
        }]);
        Ok(())
    }

    fn subscribe(&self, project: &ProjectId) -> FeedSubscription {
        let mut inner = self.lock();
        let docs = inner.projects.entry(project.clone()).or_default();
        let (tx, rx) = mpsc::unbounded_channel();

        // Replay existing state as the initial batch, the way a snapshot
        // listener first fires with every current document.
        let mut initial = Vec::new();
        if !docs.scalars.is_empty() {
            initial.push(DocChange {
                collection: Collection::Project,
                kind: ChangeKind::Modified,
                doc_id: RemoteId::new("project"),
                data: Value::Object(docs.scalars.clone()),
            });
        }
        let collections = [
            (Collection::Elements, &docs.elements),
            (Collection::Animations, &docs.animations),
            (Collection::Videos, &docs.videos),
            (Collection::Audios, &docs.audios),
            (Collection::Images, &docs.images),
        ];
        for (collection, map) in collections {
            for (doc_id, data) in map {
                initial.push(DocChange {
                    collection,
                    kind: ChangeKind::Added,
                    doc_id: doc_id.clone(),
                    data: data.clone(),
                });
            }
        }
        if !initial.is_empty() {
            let _ = tx.send(initial);
        }

        docs.subscribers.push(tx);
        FeedSubscription::new(rx)
    }
}

impl AssetStore for MemoryStore {
    fn upload(
        &self,
        project: &ProjectId,
        folder: &str,
        name: &str,
        bytes: &[u8],
    ) -> StoreResult<String> {
        let mut inner = self.checked()?;
        let docs = inner.projects.entry(project.clone()).or_default();
        let path = format!("{}/{}", folder, name);
        docs.blobs.insert(path.clone(), bytes.to_vec());
        Ok(format!("mem://{}/{}", project, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectId {
        ProjectId::new("p1")
    }

    #[test]
    fn create_broadcasts_to_subscribers() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe(&project());

        let element = Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
        let uid = store.create_element(&project(), &element).unwrap();

        let batch = feed.try_next().expect("expected a broadcast batch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].doc_id, uid);
        assert_eq!(batch[0].kind, ChangeKind::Added);
    }

    #[test]
    fn subscribe_replays_existing_documents() {
        let store = MemoryStore::new();
        let element = Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
        store.create_element(&project(), &element).unwrap();
        store.set_background(&project(), "#222222").unwrap();

        let mut feed = store.subscribe(&project());
        let batch = feed.try_next().expect("expected the initial snapshot");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].collection, Collection::Project);
        assert_eq!(batch[1].collection, Collection::Elements);
    }

    #[test]
    fn replace_is_an_upsert() {
        let store = MemoryStore::new();
        let element = Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
        let uid = store.create_element(&project(), &element).unwrap();
        store.delete_element(&project(), &uid).unwrap();

        let mut feed = store.subscribe(&project());
        assert!(feed.try_next().is_none());

        store.replace_element(&project(), &uid, &element).unwrap();
        let batch = feed.try_next().expect("upsert must broadcast");
        assert_eq!(batch[0].kind, ChangeKind::Added);
    }

    #[test]
    fn deletes_are_idempotent() {
        let store = MemoryStore::new();
        let uid = RemoteId::new("missing");
        assert!(store.delete_element(&project(), &uid).is_ok());
    }

    #[test]
    fn failing_writes_surface_store_errors() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let element = Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
        assert!(matches!(
            store.create_element(&project(), &element),
            Err(StoreError::Write(_))
        ));
    }
}
