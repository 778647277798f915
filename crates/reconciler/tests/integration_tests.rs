/// Multi-session integration tests: several engines reconciling against one
/// shared store, covering deferred merges, conflict forks and reorders.
use element::{ElementId, UserId};
use reconciler::*;
use std::sync::{Arc, Mutex};

fn project() -> ProjectId {
    ProjectId::new("studio")
}

fn session(store: &Arc<MemoryStore>) -> Reconciler {
    let mut engine = Reconciler::new(store.clone(), store.clone()).with_user(UserId::new());
    engine.open_project(project());
    engine.pump();
    engine
}

fn capture_alerts(engine: &mut Reconciler) -> Arc<Mutex<Vec<Alert>>> {
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let sink = alerts.clone();
    engine.set_alert_handler(move |alert| sink.lock().unwrap().push(alert.clone()));
    alerts
}

/// Drain a raw store subscription and count element updates.
fn count_element_updates(feed: &mut FeedSubscription) -> usize {
    let mut count = 0;
    while let Some(batch) = feed.try_next() {
        count += batch
            .iter()
            .filter(|change| {
                change.collection == Collection::Elements && change.kind == ChangeKind::Modified
            })
            .count();
    }
    count
}

#[tokio::test]
async fn remote_add_propagates_between_sessions() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.add_video_element("mem://clip.mp4", 4_000, 16.0 / 9.0);
    session2.pump();

    let original = session1.elements().next().unwrap();
    let replica = session2.elements().next().expect("element must propagate");
    assert_eq!(replica.id, original.id);
    assert_eq!(replica.uid, original.uid);
    // Only the adding session auto-selects.
    assert_eq!(session2.selected(), None);
}

#[tokio::test]
async fn opening_a_project_replays_existing_state() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    session1.add_audio_element("mem://a.mp3", 2_000);
    session1.set_background("#222222", ChangeSource::Local);
    session1.set_max_time(45_000, ChangeSource::Local);

    let late = session(&store);
    assert_eq!(late.elements().count(), 1);
    assert_eq!(late.background(), "#222222");
    assert_eq!(late.max_time(), 45_000);
}

#[tokio::test]
async fn deferred_update_merges_disjoint_fields_on_deselect() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.add_video_element("mem://clip.mp4", 1_000, 1.0);
    session1.pump();
    session2.pump();
    let id = session1.elements().next().unwrap().id;
    assert_eq!(session1.selected(), Some(id));

    // Session 2 retimes the element while session 1 holds it selected.
    session2.update_time_frame(id, None, Some(2_000));
    session1.pump();
    assert!(session1.pending_merge(&id).is_some());

    // Session 1 drags it while the remote change is deferred.
    let mut placement = session1.element(&id).unwrap().placement;
    placement.x = 50.0;
    session1.update_placement(id, placement);

    session1.deselect();

    let merged = session1.element(&id).unwrap();
    assert_eq!(merged.placement.x, 50.0);
    assert_eq!(merged.time_frame.end, 2_000);
    assert!(session1.shelf().is_empty());

    // The merged value is re-persisted and converges on session 2.
    session2.pump();
    let replica = session2.element(&id).unwrap();
    assert_eq!(replica.placement.x, 50.0);
    assert_eq!(replica.time_frame.end, 2_000);
}

#[tokio::test]
async fn same_field_divergence_forks_a_conflict() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.add_video_element("mem://clip.mp4", 1_000, 1.0);
    session1.pump();
    session2.pump();
    let id = session1.elements().next().unwrap().id;
    let alerts = capture_alerts(&mut session1);

    // Session 2 moves and retimes in one edit, from the pre-drag state.
    let mut theirs = session2.element(&id).unwrap().clone();
    theirs.placement.x = 99.0;
    theirs.time_frame.end = 2_000;
    session2.update_element(theirs, ChangeSource::Local);

    session1.pump();
    let mut placement = session1.element(&id).unwrap().placement;
    placement.x = 50.0;
    session1.update_placement(id, placement);

    session1.deselect();

    // The local branch is forked onto the shelf under a new identity.
    assert_eq!(session1.shelf().len(), 1);
    let fork = session1.shelf().elements().next().unwrap();
    assert_ne!(fork.id, id);
    assert_eq!(fork.conflict_id, Some(id));
    assert_eq!(fork.placement.x, 50.0);
    assert!(fork.name.ends_with("(conflict)"));

    // The canonical slot advanced to session 2's value.
    let canonical = session1.element(&id).unwrap();
    assert_eq!(canonical.placement.x, 99.0);
    assert_eq!(canonical.time_frame.end, 2_000);

    assert!(matches!(
        alerts.lock().unwrap().as_slice(),
        [Alert::MergeConflict { .. }]
    ));

    // Both versions render as timeline entries.
    assert_eq!(session1.timeline_entries().len(), 2);
}

#[tokio::test]
async fn deleting_the_original_resolves_the_pair_everywhere() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.add_video_element("mem://clip.mp4", 1_000, 1.0);
    session1.pump();
    session2.pump();
    let id = session1.elements().next().unwrap().id;

    let mut theirs = session2.element(&id).unwrap().clone();
    theirs.placement.x = 99.0;
    session2.update_element(theirs, ChangeSource::Local);
    session1.pump();
    let mut placement = session1.element(&id).unwrap().placement;
    placement.x = 50.0;
    session1.update_placement(id, placement);
    session1.deselect();
    assert_eq!(session1.shelf().len(), 1);

    // Deleting the shadowed original keeps the forked branch.
    session1.remove_element(id);
    assert!(session1.shelf().is_empty());
    assert_eq!(session1.element(&id).unwrap().placement.x, 50.0);

    // The promotion is persisted, so the other session converges on it.
    session2.pump();
    assert_eq!(session2.element(&id).unwrap().placement.x, 50.0);
}

#[tokio::test]
async fn remote_delete_wins_over_local_edits_in_flight() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.add_video_element("mem://clip.mp4", 1_000, 1.0);
    session1.pump();
    session2.pump();
    let id = session1.elements().next().unwrap().id;

    // Session 1 drags to x=50 before any divergence: written through.
    let mut placement = session1.element(&id).unwrap().placement;
    placement.x = 50.0;
    session1.update_placement(id, placement);
    session2.pump();

    // Session 2 deletes; session 1 keeps editing before it notices.
    session2.remove_element(id);
    session1.pump();
    let mut placement = session1.element(&id).unwrap().placement;
    placement.x = 70.0;
    session1.update_placement(id, placement);

    session1.deselect();

    // The delete-then-recreate remote truth wins; x=70 is discarded.
    let survivor = session1.element(&id).unwrap();
    assert_eq!(survivor.placement.x, 50.0);
    assert!(session1.shelf().is_empty());

    // The document was recreated, so the deleting session gets it back.
    session2.pump();
    assert_eq!(session2.element(&id).unwrap().placement.x, 50.0);
}

#[tokio::test]
async fn reorder_rewrites_only_changed_orders() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    for n in 0..4 {
        session1.add_audio_element(format!("mem://{}.mp3", n), 1_000);
    }
    session1.deselect();
    session1.pump();
    let ids: Vec<ElementId> = session1.timeline_entries().iter().map(|e| e.id).collect();

    let mut raw = store.subscribe(&project());
    while raw.try_next().is_some() {} // discard the snapshot replay

    // Moving the last element to the front shifts every order.
    session1.reorder(ids[3], 0);
    let entries = session1.timeline_entries();
    let orders: Vec<u32> = entries.iter().map(|e| e.order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3]);
    assert_eq!(entries[0].id, ids[3]);
    assert_eq!(count_element_updates(&mut raw), 4);

    // Swapping two neighbours touches exactly those two.
    let entries: Vec<ElementId> = session1.timeline_entries().iter().map(|e| e.id).collect();
    session1.reorder(entries[1], 2);
    assert_eq!(count_element_updates(&mut raw), 2);
    let orders: Vec<u32> = session1.timeline_entries().iter().map(|e| e.order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn closing_the_project_stops_remote_intake() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.close_project();
    session2.add_audio_element("mem://a.mp3", 1_000);

    session1.pump();
    assert_eq!(session1.elements().count(), 0);
    assert_eq!(session1.background(), DEFAULT_BACKGROUND);

    // Closing twice is harmless.
    session1.close_project();
}

#[tokio::test]
async fn animations_reconcile_last_writer_wins() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.add_text_element("hello", 32, 400);
    session1.deselect();
    session2.pump();
    let target = session1.elements().next().unwrap().id;

    let animation = element::Animation::new(target, 600, element::AnimationKind::FadeIn);
    let animation_id = animation.id;
    session1.add_animation(animation, ChangeSource::Local);
    session2.pump();
    assert_eq!(session2.animations().len(), 1);

    // Session 2 rewrites the duration; the last write wins everywhere.
    let mut theirs = session2.animations()[0].clone();
    theirs.duration = 1_200;
    session2.update_animation(theirs, ChangeSource::Local);
    session1.pump();
    assert_eq!(session1.animations()[0].duration, 1_200);

    session2.remove_animation(animation_id);
    session1.pump();
    assert!(session1.animations().is_empty());
}

#[tokio::test]
async fn scalar_project_fields_propagate() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let mut session2 = session(&store);

    session1.set_background("#303030", ChangeSource::Local);
    session1.set_max_time(60_000, ChangeSource::Local);
    session2.pump();

    assert_eq!(session2.background(), "#303030");
    assert_eq!(session2.max_time(), 60_000);
}

#[tokio::test]
async fn a_malformed_document_does_not_poison_the_batch() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);

    let good = element::Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
    let batch = vec![
        DocChange {
            collection: Collection::Elements,
            kind: ChangeKind::Added,
            doc_id: element::RemoteId::new("bad"),
            data: serde_json::json!({ "id": ElementId::new(), "type": "hologram" }),
        },
        DocChange {
            collection: Collection::Elements,
            kind: ChangeKind::Added,
            doc_id: element::RemoteId::new("good"),
            data: good.to_document().unwrap(),
        },
    ];
    session1.apply_remote_batch(batch);

    assert_eq!(session1.elements().count(), 1);
    assert_eq!(session1.elements().next().unwrap().id, good.id);
}

#[tokio::test]
async fn removal_without_a_logical_id_raises_the_undefined_id_alert() {
    let store = Arc::new(MemoryStore::new());
    let mut session1 = session(&store);
    let alerts = capture_alerts(&mut session1);

    session1.apply_remote_batch(vec![DocChange {
        collection: Collection::Elements,
        kind: ChangeKind::Removed,
        doc_id: element::RemoteId::new("ghost"),
        data: serde_json::json!({ "type": "audio" }),
    }]);

    assert!(matches!(
        alerts.lock().unwrap().as_slice(),
        [Alert::MissingElementId]
    ));
}
