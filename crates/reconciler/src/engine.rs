/// The reconciler: sole mutator of the canonical element collection.
///
/// Holds the elements driving rendering and further edits, the set of
/// deferred remote updates for elements under local selection, and the
/// conflict shelf. Local edits apply optimistically and are written through
/// fire-and-forget; remote events either apply directly, defer until the
/// user deselects, or are discarded as self-feedback echoes.
use chrono::{DateTime, Utc};
use element::{
    diff, resolve, Animation, AnimationId, Effect, Element, ElementId, ElementKind, FieldDelta,
    LiveElement, MergeOutcome, Placement, RemoteChangeKind, RenderHandle, UserId,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::{
    decode, AssetKind, AssetStore, ChangeKind, ConflictShelf, DocChange, FeedError,
    FeedSubscription, ProjectId, ProjectStore, RemoteEvent,
};

pub const DEFAULT_BACKGROUND: &str = "#111111";
pub const DEFAULT_MAX_TIME_MS: u64 = 30_000;

/// Where a mutation originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    Local,
    Remote,
}

/// Canonical-state-changed signal consumed by the rendering collaborator,
/// which rebuilds its display objects wholesale from `timeline_entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeNotice {
    Timeline,
    Animations,
    Background,
    MaxTime,
    Assets,
}

/// Blocking user-facing notifications. Delivered synchronously through the
/// registered handler; there is no retry machinery behind them.
#[derive(Debug, Clone)]
pub enum Alert {
    WriteFailed { message: String },
    MergeConflict { element: ElementId },
    MissingElementId,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::WriteFailed { message } => write!(f, "error synchronizing data: {}", message),
            Alert::MergeConflict { element } => write!(
                f,
                "conflicting edits on element {}; review the conflict track and delete one copy",
                element
            ),
            Alert::MissingElementId => write!(f, "element id is undefined"),
        }
    }
}

/// A remote update captured while its element was under local selection.
/// `from` is the canonical snapshot at the moment of divergence; later
/// deferred events only advance `to` and `kind`.
#[derive(Debug, Clone)]
pub struct PendingMerge {
    pub from: Element,
    pub to: Element,
    pub kind: RemoteChangeKind,
    pub captured_at: DateTime<Utc>,
}

pub struct Reconciler {
    store: Arc<dyn ProjectStore>,
    assets: Arc<dyn AssetStore>,
    user: Option<UserId>,

    project_id: Option<ProjectId>,
    feed: Option<FeedSubscription>,

    background: String,
    max_time: u64,
    elements: Vec<LiveElement>,
    animations: Vec<Animation>,
    videos: Vec<String>,
    audios: Vec<String>,
    images: Vec<String>,

    selected: Option<ElementId>,
    pending: HashMap<ElementId, PendingMerge>,
    shelf: ConflictShelf,
    online_users: Vec<UserId>,

    watchers: Vec<mpsc::UnboundedSender<ChangeNotice>>,
    alert_handler: Option<Box<dyn Fn(&Alert) + Send + Sync>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ProjectStore>, assets: Arc<dyn AssetStore>) -> Self {
        Self {
            store,
            assets,
            user: None,
            project_id: None,
            feed: None,
            background: DEFAULT_BACKGROUND.to_string(),
            max_time: DEFAULT_MAX_TIME_MS,
            elements: Vec::new(),
            animations: Vec::new(),
            videos: Vec::new(),
            audios: Vec::new(),
            images: Vec::new(),
            selected: None,
            pending: HashMap::new(),
            shelf: ConflictShelf::new(),
            online_users: Vec::new(),
            watchers: Vec::new(),
            alert_handler: None,
        }
    }

    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    // ----- lifecycle -------------------------------------------------------

    pub fn open_project(&mut self, project: ProjectId) {
        self.close_project();
        self.feed = Some(self.store.subscribe(&project));
        self.project_id = Some(project);
    }

    /// Idempotent. Stops remote intake and resets all project-scoped state;
    /// batches the store broadcast before the unsubscribe are discarded.
    pub fn close_project(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.unsubscribe();
        }
        self.project_id = None;
        self.background = DEFAULT_BACKGROUND.to_string();
        self.max_time = DEFAULT_MAX_TIME_MS;
        self.elements.clear();
        self.animations.clear();
        self.videos.clear();
        self.audios.clear();
        self.images.clear();
        self.selected = None;
        self.pending.clear();
        self.shelf = ConflictShelf::new();
        self.online_users.clear();
    }

    fn project(&self) -> Option<ProjectId> {
        if self.project_id.is_none() {
            warn!("no project context; operation skipped");
        }
        self.project_id.clone()
    }

    // ----- observation -----------------------------------------------------

    pub fn subscribe_changes(&mut self) -> mpsc::UnboundedReceiver<ChangeNotice> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.push(tx);
        rx
    }

    pub fn set_alert_handler(&mut self, handler: impl Fn(&Alert) + Send + Sync + 'static) {
        self.alert_handler = Some(Box::new(handler));
    }

    fn emit(&mut self, notice: ChangeNotice) {
        self.watchers.retain(|tx| tx.send(notice).is_ok());
    }

    fn alert(&self, alert: Alert) {
        error!(%alert, "user alert");
        if let Some(handler) = &self.alert_handler {
            handler(&alert);
        }
    }

    // ----- accessors -------------------------------------------------------

    pub fn background(&self) -> &str {
        &self.background
    }

    pub fn max_time(&self) -> u64 {
        self.max_time
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().map(|live| &live.element)
    }

    pub fn element(&self, id: &ElementId) -> Option<&Element> {
        self.elements
            .iter()
            .map(|live| &live.element)
            .find(|element| element.id == *id)
    }

    pub fn animations(&self) -> &[Animation] {
        &self.animations
    }

    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    pub fn audios(&self) -> &[String] {
        &self.audios
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn selected(&self) -> Option<ElementId> {
        self.selected
    }

    pub fn pending_merge(&self, id: &ElementId) -> Option<&PendingMerge> {
        self.pending.get(id)
    }

    pub fn shelf(&self) -> &ConflictShelf {
        &self.shelf
    }

    /// Canonical and conflict-shelf elements interleaved by display order,
    /// the shape the rendering surface rebuilds from.
    pub fn timeline_entries(&self) -> Vec<&Element> {
        let mut entries: Vec<&Element> = self
            .elements
            .iter()
            .map(|live| &live.element)
            .chain(self.shelf.elements())
            .collect();
        entries.sort_by_key(|element| element.order);
        entries
    }

    pub fn online_users(&self) -> &[UserId] {
        &self.online_users
    }

    pub fn last_editor(&self, id: &ElementId) -> Option<UserId> {
        self.find_value_ref(id)?.edit_persons.last().copied()
    }

    pub fn is_last_editor_online(&self, id: &ElementId) -> bool {
        self.last_editor(id)
            .map(|user| self.online_users.contains(&user))
            .unwrap_or(false)
    }

    fn position(&self, id: &ElementId) -> Option<usize> {
        self.elements.iter().position(|live| live.element.id == *id)
    }

    fn find_value_ref(&self, id: &ElementId) -> Option<&Element> {
        self.element(id).or_else(|| self.shelf.get(id))
    }

    fn find_value(&self, id: &ElementId) -> Option<Element> {
        self.find_value_ref(id).cloned()
    }

    // ----- remote intake ---------------------------------------------------

    /// Drain every batch the feed has queued. No-op without a subscription.
    pub fn pump(&mut self) {
        loop {
            let batch = match self.feed.as_mut().and_then(FeedSubscription::try_next) {
                Some(batch) => batch,
                None => break,
            };
            self.apply_remote_batch(batch);
        }
    }

    /// Apply one change batch, element by element: a malformed document
    /// must not abort processing of the rest of the batch.
    pub fn apply_remote_batch(&mut self, batch: Vec<DocChange>) {
        for change in batch {
            match decode(&change) {
                Ok(events) => {
                    for event in events {
                        self.apply_remote_event(event);
                    }
                }
                Err(FeedError::MissingId(doc_id)) if change.kind == ChangeKind::Removed => {
                    error!(%doc_id, "removal without a logical id");
                    self.alert(Alert::MissingElementId);
                }
                Err(err) => {
                    error!(%err, collection = %change.collection, "skipping undecodable change");
                }
            }
        }
    }

    fn apply_remote_event(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::ElementAdded(element) => self.add_element(element, ChangeSource::Remote),
            RemoteEvent::ElementModified(element) => {
                self.reconcile_remote_element(element, RemoteChangeKind::Updated)
            }
            RemoteEvent::ElementRemoved(element) => {
                self.reconcile_remote_element(element, RemoteChangeKind::Deleted)
            }
            RemoteEvent::AnimationAdded(animation) => {
                self.add_animation(animation, ChangeSource::Remote)
            }
            RemoteEvent::AnimationModified(animation) => {
                self.update_animation(animation, ChangeSource::Remote)
            }
            RemoteEvent::AnimationRemoved(animation) => self.remove_animation_remote(&animation),
            RemoteEvent::AssetAdded(kind, url) => self.add_asset(kind, url, ChangeSource::Remote),
            RemoteEvent::BackgroundChanged(color) => {
                self.set_background(color, ChangeSource::Remote)
            }
            RemoteEvent::MaxTimeChanged(max_time) => {
                self.set_max_time(max_time, ChangeSource::Remote)
            }
        }
    }

    /// Decide, per element edit state, whether a remote update applies
    /// directly or is deferred until deselection.
    fn reconcile_remote_element(&mut self, element: Element, kind: RemoteChangeKind) {
        if self.selected == Some(element.id) {
            let Some(current) = self.element(&element.id).cloned() else {
                return;
            };
            if kind == RemoteChangeKind::Updated && diff(&current, &element).is_empty() {
                // Round-tripped local write; nothing diverged.
                return;
            }
            let entry = self
                .pending
                .entry(element.id)
                .or_insert_with(|| PendingMerge {
                    from: current,
                    to: element.clone(),
                    kind,
                    captured_at: Utc::now(),
                });
            entry.to = element;
            entry.kind = kind;
            debug!(id = %entry.to.id, ?kind, "remote change deferred until deselection");
            return;
        }

        match kind {
            RemoteChangeKind::Updated => self.update_element(element, ChangeSource::Remote),
            RemoteChangeKind::Deleted => self.remove_element_remote(element.id),
        }
    }

    // ----- selection & merge -----------------------------------------------

    /// Switching away from an element counts as deselecting it, so any
    /// pending merge for the previous selection is resolved first.
    pub fn select(&mut self, id: ElementId) -> bool {
        if self.selected == Some(id) {
            return true;
        }
        if self.position(&id).is_none() && !self.shelf.contains(&id) {
            return false;
        }
        if self.selected.is_some() {
            self.deselect();
        }
        self.selected = Some(id);
        true
    }

    /// Deselect the active element. If a remote update was deferred while it
    /// was selected, run the three-way merge now: success re-persists the
    /// merged value, failure forks the local branch onto the conflict shelf
    /// and advances the canonical slot to the remote value.
    pub fn deselect(&mut self) {
        let Some(id) = self.selected.take() else {
            return;
        };
        if self.shelf.contains(&id) {
            return;
        }
        let Some(entry) = self.pending.remove(&id) else {
            return;
        };
        let Some(pos) = self.position(&id) else {
            return;
        };
        let local = self.elements[pos].element.clone();

        match resolve(&entry.from, &local, &entry.to, entry.kind) {
            MergeOutcome::Merged(mut merged) => {
                if merged.uid.is_none() {
                    merged.uid = local.uid.clone();
                }
                // Re-persist: for a deferred delete this recreates the
                // document with the remote's last state (delete wins).
                self.update_element(merged, ChangeSource::Local);
            }
            MergeOutcome::Conflict => {
                self.shelf.fork(&local);
                self.elements[pos].element = entry.to;
                self.emit(ChangeNotice::Timeline);
                self.alert(Alert::MergeConflict { element: id });
            }
        }
    }

    // ----- element mutations -----------------------------------------------

    pub fn add_video_element(
        &mut self,
        src: impl Into<String>,
        duration_ms: u64,
        aspect_ratio: f64,
    ) {
        let name = format!("Media(video) {}", self.elements.len() + 1);
        let element = Element::video(name, src, self.next_order(), duration_ms, aspect_ratio);
        self.add_element(element, ChangeSource::Local);
    }

    pub fn add_image_element(&mut self, src: impl Into<String>, aspect_ratio: f64) {
        let name = format!("Media(image) {}", self.elements.len() + 1);
        let element = Element::image(name, src, self.next_order(), self.max_time, aspect_ratio);
        self.add_element(element, ChangeSource::Local);
    }

    pub fn add_audio_element(&mut self, src: impl Into<String>, duration_ms: u64) {
        let name = format!("Media(audio) {}", self.elements.len() + 1);
        let element = Element::audio(name, src, self.next_order(), duration_ms);
        self.add_element(element, ChangeSource::Local);
    }

    pub fn add_text_element(&mut self, text: impl Into<String>, font_size: u32, font_weight: u32) {
        let name = format!("Text {}", self.elements.len() + 1);
        let element = Element::text(
            name,
            text,
            font_size,
            font_weight,
            self.next_order(),
            self.max_time,
        );
        self.add_element(element, ChangeSource::Local);
    }

    fn next_order(&self) -> u32 {
        self.elements
            .iter()
            .map(|live| live.element.order + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn add_element(&mut self, element: Element, source: ChangeSource) {
        match source {
            ChangeSource::Remote => {
                if self.position(&element.id).is_some() {
                    return;
                }
                self.elements.push(LiveElement::new(element));
                self.emit(ChangeNotice::Timeline);
            }
            ChangeSource::Local => {
                let id = element.id;
                let record = element.clone();
                self.elements.push(LiveElement::new(element));
                self.emit(ChangeNotice::Timeline);
                if let Some(project) = self.project() {
                    match self.store.create_element(&project, &record) {
                        Ok(uid) => {
                            if let Some(pos) = self.position(&id) {
                                self.elements[pos].element.uid = Some(uid);
                            }
                        }
                        Err(err) => self.alert(Alert::WriteFailed {
                            message: err.to_string(),
                        }),
                    }
                }
                self.select(id);
            }
        }
    }

    /// The single canonical mutation entry point. Conflict-shelf copies are
    /// mutated in place and never written to the store; otherwise local
    /// updates write through (unless a pending merge is withholding writes)
    /// and remote updates are discarded when they change nothing.
    pub fn update_element(&mut self, mut element: Element, source: ChangeSource) {
        if self.shelf.contains(&element.id) {
            self.shelf.update(element);
            self.emit(ChangeNotice::Timeline);
            return;
        }

        let Some(pos) = self.position(&element.id) else {
            if source == ChangeSource::Local {
                warn!(id = %element.id, "update for unknown element");
            }
            return;
        };

        if element.uid.is_none() {
            element.uid = self.elements[pos].element.uid.clone();
        }

        let has_pending = self.pending.contains_key(&element.id);
        match source {
            ChangeSource::Remote => {
                if !has_pending && diff(&self.elements[pos].element, &element).is_empty() {
                    return;
                }
            }
            ChangeSource::Local => {
                if self.selected == Some(element.id) {
                    self.touch_edit_persons(&mut element);
                }
                if !has_pending {
                    self.persist_replace(&element);
                }
            }
        }

        self.elements[pos].element = element;
        self.emit(ChangeNotice::Timeline);
    }

    pub fn update_placement(&mut self, id: ElementId, placement: Placement) {
        if let Err(err) = placement.validate() {
            warn!(%err, %id, "placement update rejected");
            return;
        }
        let Some(mut element) = self.find_value(&id) else {
            return;
        };
        element.placement = placement;
        self.update_element(element, ChangeSource::Local);
    }

    /// Partial time-frame update; bounds are clamped into `[0, max_time]`
    /// and an update that would leave `start >= end` is rejected.
    pub fn update_time_frame(&mut self, id: ElementId, start: Option<i64>, end: Option<i64>) {
        let Some(mut element) = self.find_value(&id) else {
            return;
        };
        let mut frame = element.time_frame;
        if let Some(start) = start {
            frame.start = start.max(0) as u64;
        }
        if let Some(end) = end {
            frame.end = end.max(0) as u64;
        }
        frame.clamp(self.max_time);
        if let Err(err) = frame.validate() {
            warn!(%err, %id, "time frame update rejected");
            return;
        }
        element.time_frame = frame;
        self.update_element(element, ChangeSource::Local);
    }

    pub fn update_effect(&mut self, id: ElementId, effect: Effect) {
        let Some(mut element) = self.find_value(&id) else {
            return;
        };
        match &mut element.kind {
            ElementKind::Video { effect: slot, .. } | ElementKind::Image { effect: slot, .. } => {
                *slot = effect;
            }
            _ => {
                warn!(%id, "effects apply to video and image elements only");
                return;
            }
        }
        self.update_element(element, ChangeSource::Local);
    }

    pub fn remove_element(&mut self, id: ElementId) {
        // Deleting the shelf copy discards the forked branch.
        if self.shelf.remove(&id).is_some() {
            if self.selected == Some(id) {
                self.selected = None;
            }
            self.emit(ChangeNotice::Timeline);
            return;
        }

        let Some(pos) = self.position(&id) else {
            return;
        };

        // Deleting the original of a live conflict pair promotes the shelf
        // branch onto the original's identity instead.
        if self.promote_survivor(pos) {
            return;
        }

        let Some(uid) = self.elements[pos].element.uid.clone() else {
            // Never persisted remotely; nothing to delete there.
            return;
        };
        let Some(project) = self.project() else {
            return;
        };
        if let Err(err) = self.store.delete_element(&project, &uid) {
            self.alert(Alert::WriteFailed {
                message: err.to_string(),
            });
            return;
        }
        self.elements.remove(pos);
        self.pending.remove(&id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.emit(ChangeNotice::Timeline);
    }

    fn remove_element_remote(&mut self, id: ElementId) {
        let Some(pos) = self.position(&id) else {
            return;
        };
        // The other session deleted the original of a conflict pair we hold:
        // the same recovery gesture applies, keeping our forked branch.
        if self.promote_survivor(pos) {
            return;
        }
        self.elements.remove(pos);
        self.pending.remove(&id);
        self.emit(ChangeNotice::Timeline);
    }

    fn promote_survivor(&mut self, pos: usize) -> bool {
        let original_id = self.elements[pos].element.id;
        let Some(mut survivor) = self.shelf.take_for_original(original_id) else {
            return false;
        };
        let original = &self.elements[pos].element;
        survivor.id = original.id;
        survivor.uid = original.uid.clone();
        survivor.name = original.name.clone();
        survivor.conflict_id = None;
        self.update_element(survivor, ChangeSource::Local);
        true
    }

    /// Move an element to a new display position. Order values over the
    /// canonical collection are reassigned contiguously; only elements whose
    /// order actually changed are written back, as individual field updates.
    pub fn reorder(&mut self, id: ElementId, to_index: usize) {
        let mut ordered: Vec<ElementId> = {
            let mut elements: Vec<&Element> =
                self.elements.iter().map(|live| &live.element).collect();
            elements.sort_by_key(|element| element.order);
            elements.iter().map(|element| element.id).collect()
        };
        let Some(from_index) = ordered.iter().position(|other| *other == id) else {
            return;
        };
        let moved = ordered.remove(from_index);
        let to_index = to_index.min(ordered.len());
        ordered.insert(to_index, moved);

        let project = self.project();
        let mut changed = false;
        for (new_order, element_id) in ordered.iter().enumerate() {
            let new_order = new_order as u32;
            let Some(pos) = self.position(element_id) else {
                continue;
            };
            if self.elements[pos].element.order == new_order {
                continue;
            }
            self.elements[pos].element.order = new_order;
            changed = true;

            let Some(project) = &project else {
                continue;
            };
            match self.elements[pos].element.uid.clone() {
                Some(uid) => {
                    let delta = FieldDelta {
                        order: Some(new_order),
                        ..Default::default()
                    };
                    if let Err(err) = self.store.update_element(project, &uid, &delta) {
                        self.alert(Alert::WriteFailed {
                            message: err.to_string(),
                        });
                    }
                }
                None => {
                    warn!(id = %element_id, "element has no remote identifier; order write skipped")
                }
            }
        }
        if changed {
            self.emit(ChangeNotice::Timeline);
        }
    }

    fn touch_edit_persons(&self, element: &mut Element) {
        if let Some(user) = self.user {
            if element.edit_persons.last() != Some(&user) {
                element.edit_persons.push(user);
            }
        }
    }

    fn persist_replace(&self, element: &Element) {
        let Some(project) = self.project() else {
            return;
        };
        let Some(uid) = element.uid.clone() else {
            warn!(id = %element.id, "element has no remote identifier; write skipped");
            return;
        };
        if let Err(err) = self.store.replace_element(&project, &uid, element) {
            self.alert(Alert::WriteFailed {
                message: err.to_string(),
            });
        }
    }

    // ----- animations ------------------------------------------------------

    pub fn add_animation(&mut self, animation: Animation, source: ChangeSource) {
        if self
            .animations
            .iter()
            .any(|other| other.id == animation.id)
        {
            return;
        }
        let id = animation.id;
        let record = animation.clone();
        self.animations.push(animation);
        self.emit(ChangeNotice::Animations);

        if source == ChangeSource::Local {
            let Some(project) = self.project() else {
                return;
            };
            match self.store.create_animation(&project, &record) {
                Ok(uid) => {
                    if let Some(animation) =
                        self.animations.iter_mut().find(|other| other.id == id)
                    {
                        animation.uid = Some(uid);
                    }
                }
                Err(err) => self.alert(Alert::WriteFailed {
                    message: err.to_string(),
                }),
            }
        }
    }

    /// Animations reconcile last-writer-wins; a remote update identical to
    /// the held value is discarded.
    pub fn update_animation(&mut self, mut animation: Animation, source: ChangeSource) {
        let Some(pos) = self
            .animations
            .iter()
            .position(|other| other.id == animation.id)
        else {
            return;
        };

        match source {
            ChangeSource::Remote => {
                if self.animations[pos] == animation {
                    return;
                }
            }
            ChangeSource::Local => {
                if animation.uid.is_none() {
                    animation.uid = self.animations[pos].uid.clone();
                }
                match (&animation.uid, self.project()) {
                    (Some(uid), Some(project)) => {
                        if let Err(err) = self.store.replace_animation(&project, uid, &animation) {
                            self.alert(Alert::WriteFailed {
                                message: err.to_string(),
                            });
                        }
                    }
                    (None, _) => {
                        warn!(id = %animation.id, "animation has no remote identifier; write skipped")
                    }
                    _ => {}
                }
            }
        }

        self.animations[pos] = animation;
        self.emit(ChangeNotice::Animations);
    }

    pub fn remove_animation(&mut self, id: AnimationId) {
        let Some(pos) = self.animations.iter().position(|other| other.id == id) else {
            return;
        };
        let Some(uid) = self.animations[pos].uid.clone() else {
            return;
        };
        let Some(project) = self.project() else {
            return;
        };
        if let Err(err) = self.store.delete_animation(&project, &uid) {
            self.alert(Alert::WriteFailed {
                message: err.to_string(),
            });
            return;
        }
        self.animations.remove(pos);
        self.emit(ChangeNotice::Animations);
    }

    fn remove_animation_remote(&mut self, animation: &Animation) {
        let before = self.animations.len();
        self.animations.retain(|other| other.id != animation.id);
        if self.animations.len() != before {
            self.emit(ChangeNotice::Animations);
        }
    }

    // ----- project scalars & assets ----------------------------------------

    pub fn set_background(&mut self, color: impl Into<String>, source: ChangeSource) {
        let color = color.into();
        match source {
            ChangeSource::Remote => {
                if self.background == color {
                    return;
                }
            }
            ChangeSource::Local => {
                if let Some(project) = self.project() {
                    if let Err(err) = self.store.set_background(&project, &color) {
                        self.alert(Alert::WriteFailed {
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        self.background = color;
        self.emit(ChangeNotice::Background);
    }

    pub fn set_max_time(&mut self, max_time: u64, source: ChangeSource) {
        match source {
            ChangeSource::Remote => {
                if self.max_time == max_time {
                    return;
                }
            }
            ChangeSource::Local => {
                if let Some(project) = self.project() {
                    if let Err(err) = self.store.set_max_time(&project, max_time) {
                        self.alert(Alert::WriteFailed {
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        self.max_time = max_time;
        self.emit(ChangeNotice::MaxTime);
    }

    pub fn add_asset(&mut self, kind: AssetKind, url: impl Into<String>, source: ChangeSource) {
        let url = url.into();
        let exists = match kind {
            AssetKind::Video => self.videos.contains(&url),
            AssetKind::Audio => self.audios.contains(&url),
            AssetKind::Image => self.images.contains(&url),
        };
        if exists {
            return;
        }
        match kind {
            AssetKind::Video => self.videos.push(url.clone()),
            AssetKind::Audio => self.audios.push(url.clone()),
            AssetKind::Image => self.images.push(url.clone()),
        }
        self.emit(ChangeNotice::Assets);

        if source == ChangeSource::Local {
            if let Some(project) = self.project() {
                if let Err(err) = self.store.add_asset_url(&project, kind, &url) {
                    self.alert(Alert::WriteFailed {
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    /// Upload a blob to the asset store and register the returned URL.
    pub fn upload_asset(&mut self, kind: AssetKind, name: &str, bytes: &[u8]) {
        let Some(project) = self.project() else {
            return;
        };
        match self.assets.upload(&project, kind.folder(), name, bytes) {
            Ok(url) => self.add_asset(kind, url, ChangeSource::Local),
            Err(err) => self.alert(Alert::WriteFailed {
                message: err.to_string(),
            }),
        }
    }

    // ----- presence & rendering --------------------------------------------

    pub fn set_online_users(&mut self, users: Vec<UserId>) {
        self.online_users = users;
        self.emit(ChangeNotice::Timeline);
    }

    /// The rendering collaborator writes the live handle back after a
    /// wholesale rebuild; the handle never leaves this process.
    pub fn set_render_handle(&mut self, id: ElementId, handle: Option<RenderHandle>) {
        if let Some(pos) = self.position(&id) {
            self.elements[pos].render = handle;
        }
    }
}
