/// Field-level structural diff between two element snapshots.
///
/// The comparable field set is closed: identity fields (`id`, `uid`,
/// `conflict_id`) are not part of a delta, and render handles cannot appear
/// because `Element` is the persisted projection. A delta doubles as the
/// partial-update patch pushed to the remote store.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Element, ElementKind, Placement, TimeFrame, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementField {
    Name,
    Order,
    Placement,
    TimeFrame,
    EditPersons,
    Properties,
}

impl fmt::Display for ElementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementField::Name => "name",
            ElementField::Order => "order",
            ElementField::Placement => "placement",
            ElementField::TimeFrame => "time_frame",
            ElementField::EditPersons => "edit_persons",
            ElementField::Properties => "properties",
        };
        write!(f, "{}", name)
    }
}

/// Differing top-level fields, each carrying the value from the `b` side of
/// the comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_frame: Option<TimeFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_persons: Option<Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ElementKind>,
}

impl FieldDelta {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    pub fn contains(&self, field: ElementField) -> bool {
        self.fields().contains(&field)
    }

    pub fn fields(&self) -> Vec<ElementField> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push(ElementField::Name);
        }
        if self.order.is_some() {
            fields.push(ElementField::Order);
        }
        if self.placement.is_some() {
            fields.push(ElementField::Placement);
        }
        if self.time_frame.is_some() {
            fields.push(ElementField::TimeFrame);
        }
        if self.edit_persons.is_some() {
            fields.push(ElementField::EditPersons);
        }
        if self.properties.is_some() {
            fields.push(ElementField::Properties);
        }
        fields
    }

    /// Overlay the carried values onto `element`.
    pub fn apply_to(&self, element: &mut Element) {
        if let Some(name) = &self.name {
            element.name = name.clone();
        }
        if let Some(order) = self.order {
            element.order = order;
        }
        if let Some(placement) = self.placement {
            element.placement = placement;
        }
        if let Some(time_frame) = self.time_frame {
            element.time_frame = time_frame;
        }
        if let Some(edit_persons) = &self.edit_persons {
            element.edit_persons = edit_persons.clone();
        }
        if let Some(properties) = &self.properties {
            element.kind = properties.clone();
        }
    }
}

/// Compare two snapshots field by field, reporting the values from `b`.
pub fn diff(a: &Element, b: &Element) -> FieldDelta {
    let mut delta = FieldDelta::default();
    if a.name != b.name {
        delta.name = Some(b.name.clone());
    }
    if a.order != b.order {
        delta.order = Some(b.order);
    }
    if a.placement != b.placement {
        delta.placement = Some(b.placement);
    }
    if a.time_frame != b.time_frame {
        delta.time_frame = Some(b.time_frame);
    }
    if a.edit_persons != b.edit_persons {
        delta.edit_persons = Some(b.edit_persons.clone());
    }
    if a.kind != b.kind {
        delta.properties = Some(b.kind.clone());
    }
    delta
}
