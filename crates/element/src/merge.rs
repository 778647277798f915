/// Three-way merge of a diverged element.
///
/// Reconciles a common ancestor with a locally-edited and a remote version
/// by merging at top-level field granularity. Concurrent edits usually touch
/// disjoint fields (one editor drags position while another retimes); when
/// both sides changed the same field differently the merge fails for the
/// whole element and the caller forks a conflict instead.
use serde::{Deserialize, Serialize};

use crate::{diff, Element};

/// What the deferred remote change was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteChangeKind {
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged(Element),
    Conflict,
}

impl MergeOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, MergeOutcome::Conflict)
    }
}

/// Resolve a deferred remote change against the local edit in progress.
///
/// A remote delete always wins: the remote version is returned for
/// re-persistence and in-flight local edits are discarded. This path never
/// produces a conflict.
pub fn resolve(
    original: &Element,
    local: &Element,
    remote: &Element,
    kind: RemoteChangeKind,
) -> MergeOutcome {
    match kind {
        RemoteChangeKind::Updated => merge_update(original, local, remote),
        RemoteChangeKind::Deleted => MergeOutcome::Merged(remote.clone()),
    }
}

fn merge_update(original: &Element, local: &Element, remote: &Element) -> MergeOutcome {
    let delta_local = diff(original, local);
    let delta_remote = diff(original, remote);

    let mut merged = original.clone();
    let clean = merge_field(
        &mut merged.order,
        delta_local.order.as_ref(),
        delta_remote.order.as_ref(),
    ) && merge_field(
        &mut merged.placement,
        delta_local.placement.as_ref(),
        delta_remote.placement.as_ref(),
    ) && merge_field(
        &mut merged.time_frame,
        delta_local.time_frame.as_ref(),
        delta_remote.time_frame.as_ref(),
    ) && merge_field(
        &mut merged.edit_persons,
        delta_local.edit_persons.as_ref(),
        delta_remote.edit_persons.as_ref(),
    ) && merge_field(
        &mut merged.kind,
        delta_local.properties.as_ref(),
        delta_remote.properties.as_ref(),
    );

    if clean {
        MergeOutcome::Merged(merged)
    } else {
        MergeOutcome::Conflict
    }
}

/// Field-level three-way rule: untouched keeps the ancestor value, a
/// one-sided change wins outright, and a two-sided change is accepted only
/// when both sides converged on the same value.
fn merge_field<T: Clone + PartialEq>(slot: &mut T, local: Option<&T>, remote: Option<&T>) -> bool {
    match (local, remote) {
        (None, None) => true,
        (Some(value), None) | (None, Some(value)) => {
            *slot = value.clone();
            true
        }
        (Some(local), Some(remote)) => {
            if local == remote {
                *slot = remote.clone();
                true
            } else {
                false
            }
        }
    }
}
