/// Animations bound to timeline elements. Lifecycle mirrors the element
/// path through the remote feed, but reconciliation is last-writer-wins:
/// no pending-merge or conflict handling.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AnimationId, ElementError, ElementId, RemoteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideDirection {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextSlideStyle {
    #[default]
    None,
    Character,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnimationKind {
    FadeIn,
    FadeOut,
    Breathe,
    SlideIn {
        direction: SlideDirection,
        use_clip_path: bool,
        #[serde(default)]
        text_style: TextSlideStyle,
    },
    SlideOut {
        direction: SlideDirection,
        use_clip_path: bool,
        #[serde(default)]
        text_style: TextSlideStyle,
    },
}

impl AnimationKind {
    pub const TAGS: [&'static str; 5] = ["fadeIn", "fadeOut", "breathe", "slideIn", "slideOut"];

    pub fn tag(&self) -> &'static str {
        match self {
            AnimationKind::FadeIn => "fadeIn",
            AnimationKind::FadeOut => "fadeOut",
            AnimationKind::Breathe => "breathe",
            AnimationKind::SlideIn { .. } => "slideIn",
            AnimationKind::SlideOut { .. } => "slideOut",
        }
    }

    pub fn tag_known(tag: &str) -> bool {
        Self::TAGS.contains(&tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub id: AnimationId,
    #[serde(default)]
    pub uid: Option<RemoteId>,
    pub target_id: ElementId,
    /// Duration in milliseconds.
    pub duration: u64,
    #[serde(flatten)]
    pub kind: AnimationKind,
}

impl Animation {
    pub fn new(target_id: ElementId, duration: u64, kind: AnimationKind) -> Self {
        Self {
            id: AnimationId::new(),
            uid: None,
            target_id,
            duration,
            kind,
        }
    }

    pub fn to_document(&self) -> Result<Value, ElementError> {
        Ok(crate::strip_nulls(serde_json::to_value(self)?))
    }

    pub fn from_document(doc: &Value) -> Result<Self, ElementError> {
        let tag = doc.get("type").and_then(Value::as_str).unwrap_or_default();
        if !AnimationKind::tag_known(tag) {
            return Err(ElementError::UnsupportedAnimationKind(tag.to_string()));
        }
        Ok(serde_json::from_value(doc.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_round_trip() {
        let animation = Animation::new(
            ElementId::new(),
            1_200,
            AnimationKind::SlideIn {
                direction: SlideDirection::Left,
                use_clip_path: true,
                text_style: TextSlideStyle::Character,
            },
        );
        let doc = animation.to_document().unwrap();
        assert_eq!(doc.get("type").and_then(Value::as_str), Some("slideIn"));
        assert!(doc.get("uid").is_none());
        let decoded = Animation::from_document(&doc).unwrap();
        assert_eq!(animation, decoded);
    }

    #[test]
    fn unknown_animation_kind_is_rejected() {
        let animation = Animation::new(ElementId::new(), 500, AnimationKind::FadeIn);
        let mut doc = animation.to_document().unwrap();
        doc["type"] = Value::String("teleport".to_string());
        assert!(matches!(
            Animation::from_document(&doc),
            Err(ElementError::UnsupportedAnimationKind(_))
        ));
    }
}
