/// Holding area for element versions that could not be merged
/// automatically. Entries are rendered as extra timeline rows until the
/// user resolves the pair by deleting one side; until then they are
/// locally-editable scratch state and are never written to the store.
use chrono::{DateTime, Utc};
use element::{Element, ElementId};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ShelfEntry {
    element: Element,
    forked_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ConflictShelf {
    entries: HashMap<ElementId, ShelfEntry>,
}

impl ConflictShelf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fork the diverged local value of `original` into the shelf under a
    /// synthetic id. An original has at most one live entry: a second
    /// divergence before resolution replaces the existing entry's value
    /// instead of forking again.
    pub fn fork(&mut self, original: &Element) -> ElementId {
        if let Some((shelf_id, entry)) = self
            .entries
            .iter_mut()
            .find(|(_, entry)| entry.element.conflict_id == Some(original.id))
        {
            let shelf_id = *shelf_id;
            let keep_name = entry.element.name.clone();
            entry.element = original.clone();
            entry.element.id = shelf_id;
            entry.element.conflict_id = Some(original.id);
            entry.element.name = keep_name;
            entry.forked_at = Utc::now();
            return shelf_id;
        }

        let mut copy = original.clone();
        copy.id = ElementId::new();
        copy.conflict_id = Some(original.id);
        copy.name = format!("{} (conflict)", original.name);
        let shelf_id = copy.id;
        self.entries.insert(
            shelf_id,
            ShelfEntry {
                element: copy,
                forked_at: Utc::now(),
            },
        );
        shelf_id
    }

    pub fn contains(&self, shelf_id: &ElementId) -> bool {
        self.entries.contains_key(shelf_id)
    }

    pub fn get(&self, shelf_id: &ElementId) -> Option<&Element> {
        self.entries.get(shelf_id).map(|entry| &entry.element)
    }

    /// Replace a shelf copy in place (local edits to the forked branch).
    pub fn update(&mut self, element: Element) -> bool {
        match self.entries.get_mut(&element.id) {
            Some(entry) => {
                entry.element = element;
                true
            }
            None => false,
        }
    }

    /// Discard the forked branch.
    pub fn remove(&mut self, shelf_id: &ElementId) -> Option<Element> {
        self.entries.remove(shelf_id).map(|entry| entry.element)
    }

    /// Take the entry shadowing `original_id`, if any; used when the user
    /// deletes the original and the shelf data is promoted onto its
    /// identity.
    pub fn take_for_original(&mut self, original_id: ElementId) -> Option<Element> {
        let shelf_id = self
            .entries
            .iter()
            .find(|(_, entry)| entry.element.conflict_id == Some(original_id))
            .map(|(id, _)| *id)?;
        self.remove(&shelf_id)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.entries.values().map(|entry| &entry.element)
    }

    pub fn forked_at(&self, shelf_id: &ElementId) -> Option<DateTime<Utc>> {
        self.entries.get(shelf_id).map(|entry| entry.forked_at)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
