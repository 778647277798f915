/// Editable timeline element model and its persisted projection.
///
/// `Element` is the serializable value that diffing, merging and the remote
/// store operate on. `LiveElement` pairs it with the rendering handle, which
/// exists only in memory: keeping the handle out of `Element` makes it
/// impossible for diff/copy/persist paths to leak it.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ElementError, ElementId, RemoteId, UserId};

/// Canvas geometry for one element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Placement {
    pub fn validate(&self) -> Result<(), ElementError> {
        let components = [
            self.x,
            self.y,
            self.width,
            self.height,
            self.rotation,
            self.scale_x,
            self.scale_y,
        ];
        if components.iter().any(|c| c.is_nan()) {
            return Err(ElementError::InvalidPlacement("NaN component"));
        }
        if self.width < 0.0 || self.height < 0.0 {
            return Err(ElementError::InvalidPlacement("negative size"));
        }
        Ok(())
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

/// Active interval on the timeline, in integer milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub start: u64,
    pub end: u64,
}

impl TimeFrame {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Clamp both bounds into `[0, max_time]`.
    pub fn clamp(&mut self, max_time: u64) {
        self.start = self.start.min(max_time);
        self.end = self.end.min(max_time);
    }

    pub fn validate(&self) -> Result<(), ElementError> {
        if self.start < self.end {
            Ok(())
        } else {
            Err(ElementError::InvalidTimeFrame {
                start: self.start,
                end: self.end,
            })
        }
    }

    pub fn contains(&self, time_ms: u64) -> bool {
        self.start <= time_ms && time_ms <= self.end
    }
}

/// Visual effect applied to video and image elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Effect {
    #[default]
    None,
    BlackAndWhite,
    Sepia,
    Invert,
    Saturate,
}

/// Per-character layout cache for text elements. Plain data, duplicated on
/// copy; the rendering surface rebuilds its own objects from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: u32,
    pub font_weight: u32,
}

/// Closed set of element kinds with their kind-specific properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Video {
        src: String,
        #[serde(default)]
        effect: Effect,
    },
    Image {
        src: String,
        #[serde(default)]
        effect: Effect,
    },
    Audio {
        src: String,
    },
    Text {
        text: String,
        font_size: u32,
        font_weight: u32,
        #[serde(default)]
        fragments: Vec<TextFragment>,
    },
}

impl ElementKind {
    pub const TAGS: [&'static str; 4] = ["video", "image", "audio", "text"];

    pub fn tag(&self) -> &'static str {
        match self {
            ElementKind::Video { .. } => "video",
            ElementKind::Image { .. } => "image",
            ElementKind::Audio { .. } => "audio",
            ElementKind::Text { .. } => "text",
        }
    }

    pub fn tag_known(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }
}

/// The persisted projection of a timeline element. Everything here is safe
/// to diff, copy and write to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(default)]
    pub uid: Option<RemoteId>,
    /// Back-reference to the shadowed original; set only on conflict forks.
    #[serde(default)]
    pub conflict_id: Option<ElementId>,
    pub name: String,
    pub order: u32,
    pub placement: Placement,
    pub time_frame: TimeFrame,
    #[serde(default)]
    pub edit_persons: Vec<UserId>,
    #[serde(flatten)]
    pub kind: ElementKind,
}

impl Element {
    fn with_kind(name: String, order: u32, time_frame: TimeFrame, kind: ElementKind) -> Self {
        Self {
            id: ElementId::new(),
            uid: None,
            conflict_id: None,
            name,
            order,
            placement: Placement::default(),
            time_frame,
            edit_persons: Vec::new(),
            kind,
        }
    }

    pub fn video(
        name: impl Into<String>,
        src: impl Into<String>,
        order: u32,
        duration_ms: u64,
        aspect_ratio: f64,
    ) -> Self {
        let mut element = Self::with_kind(
            name.into(),
            order,
            TimeFrame::new(0, duration_ms),
            ElementKind::Video {
                src: src.into(),
                effect: Effect::None,
            },
        );
        element.placement.width = 100.0 * aspect_ratio;
        element
    }

    pub fn image(
        name: impl Into<String>,
        src: impl Into<String>,
        order: u32,
        max_time: u64,
        aspect_ratio: f64,
    ) -> Self {
        let mut element = Self::with_kind(
            name.into(),
            order,
            TimeFrame::new(0, max_time),
            ElementKind::Image {
                src: src.into(),
                effect: Effect::None,
            },
        );
        element.placement.width = 100.0 * aspect_ratio;
        element
    }

    pub fn audio(
        name: impl Into<String>,
        src: impl Into<String>,
        order: u32,
        duration_ms: u64,
    ) -> Self {
        Self::with_kind(
            name.into(),
            order,
            TimeFrame::new(0, duration_ms),
            ElementKind::Audio { src: src.into() },
        )
    }

    pub fn text(
        name: impl Into<String>,
        text: impl Into<String>,
        font_size: u32,
        font_weight: u32,
        order: u32,
        max_time: u64,
    ) -> Self {
        Self::with_kind(
            name.into(),
            order,
            TimeFrame::new(0, max_time),
            ElementKind::Text {
                text: text.into(),
                font_size,
                font_weight,
                fragments: Vec::new(),
            },
        )
    }

    /// Serialize for persistence. Absent optionals are stripped so the
    /// store never receives explicit null markers.
    pub fn to_document(&self) -> Result<Value, ElementError> {
        Ok(strip_nulls(serde_json::to_value(self)?))
    }

    /// Decode a stored document. The kind tag is checked against the closed
    /// set first so a schema mismatch between client versions surfaces as
    /// `UnsupportedKind` rather than a generic decode error.
    pub fn from_document(doc: &Value) -> Result<Self, ElementError> {
        let tag = doc.get("type").and_then(Value::as_str).unwrap_or_default();
        if !ElementKind::tag_known(tag) {
            return Err(ElementError::UnsupportedKind(tag.to_string()));
        }
        Ok(serde_json::from_value(doc.clone())?)
    }
}

/// Recursively remove null-valued keys. Applied before any value is
/// persisted; most stores reject or mishandle explicit absence markers.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

/// Opaque handle into the rendering surface. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderHandle(pub u64);

/// Canonical in-memory shape: the persisted projection plus the live
/// rendering handle owned by the refresh cycle.
#[derive(Debug, Clone)]
pub struct LiveElement {
    pub element: Element,
    pub render: Option<RenderHandle>,
}

impl LiveElement {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            render: None,
        }
    }

    /// Value-independent copy, excluding the render handle by construction.
    pub fn snapshot(&self) -> Element {
        self.element.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;

    fn sample_elements() -> Vec<Element> {
        vec![
            Element::video("Media(video) 1", "mem://v.mp4", 0, 4_000, 16.0 / 9.0),
            Element::image("Media(image) 1", "mem://i.png", 1, 30_000, 1.5),
            Element::audio("Media(audio) 1", "mem://a.mp3", 2, 2_500),
            Element::text("Text 1", "hello", 32, 400, 3, 30_000),
        ]
    }

    #[test]
    fn copy_round_trips_for_every_kind() {
        for element in sample_elements() {
            let live = LiveElement {
                element: element.clone(),
                render: Some(RenderHandle(7)),
            };
            let copy = live.snapshot();
            assert!(diff(&element, &copy).is_empty());
        }
    }

    #[test]
    fn text_fragments_are_duplicated_as_plain_data() {
        let mut element = Element::text("Text 1", "hi", 32, 400, 0, 30_000);
        if let ElementKind::Text { fragments, .. } = &mut element.kind {
            fragments.push(TextFragment {
                text: "h".to_string(),
                x: 0.0,
                y: 0.0,
                font_size: 32,
                font_weight: 400,
            });
        }
        let copy = element.clone();
        assert_eq!(element, copy);
        if let (ElementKind::Text { fragments: a, .. }, ElementKind::Text { fragments: b, .. }) =
            (&element.kind, &copy.kind)
        {
            assert_eq!(a, b);
        } else {
            panic!("expected text kinds");
        }
    }

    #[test]
    fn to_document_strips_absent_identifiers() {
        let element = Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
        let doc = element.to_document().unwrap();
        assert!(doc.get("uid").is_none());
        assert!(doc.get("conflict_id").is_none());
        assert_eq!(doc.get("type").and_then(Value::as_str), Some("audio"));
    }

    #[test]
    fn strip_nulls_recurses_into_objects_and_arrays() {
        let value = serde_json::json!({
            "keep": 1,
            "drop": null,
            "nested": { "drop": null, "keep": "x" },
            "list": [{ "drop": null }, 2],
        });
        let stripped = strip_nulls(value);
        assert_eq!(
            stripped,
            serde_json::json!({
                "keep": 1,
                "nested": { "keep": "x" },
                "list": [{}, 2],
            })
        );
    }

    #[test]
    fn from_document_rejects_unknown_kind() {
        let element = Element::audio("Media(audio) 1", "mem://a.mp3", 0, 1_000);
        let mut doc = element.to_document().unwrap();
        doc["type"] = Value::String("hologram".to_string());
        match Element::from_document(&doc) {
            Err(ElementError::UnsupportedKind(tag)) => assert_eq!(tag, "hologram"),
            other => panic!("expected UnsupportedKind, got {:?}", other),
        }
    }

    #[test]
    fn document_round_trip_preserves_value() {
        for element in sample_elements() {
            let doc = element.to_document().unwrap();
            let decoded = Element::from_document(&doc).unwrap();
            assert_eq!(element, decoded);
        }
    }

    #[test]
    fn time_frame_clamps_into_project_bounds() {
        let mut frame = TimeFrame::new(500, 31_000);
        frame.clamp(30_000);
        assert_eq!(frame, TimeFrame::new(500, 30_000));

        let mut frame = TimeFrame::new(40_000, 50_000);
        frame.clamp(30_000);
        assert_eq!(frame, TimeFrame::new(30_000, 30_000));
        assert!(frame.validate().is_err());
    }

    #[test]
    fn placement_rejects_nan_and_negative_size() {
        let mut placement = Placement::default();
        assert!(placement.validate().is_ok());

        placement.x = f64::NAN;
        assert!(placement.validate().is_err());

        placement.x = 0.0;
        placement.width = -4.0;
        assert!(placement.validate().is_err());
    }
}
