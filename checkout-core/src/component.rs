//! Checkout components - the draggable blocks pages are built from.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Key-value content of a component. Keys are scoped by component kind.
pub type Content = Map<String, Value>;

/// Content key marking an in-flight upload.
pub const UPLOADING_KEY: &str = "uploading";
/// Content key flagging a failed upload.
pub const UPLOAD_ERROR_KEY: &str = "uploadError";
/// Content key carrying the failure message of an upload.
pub const UPLOAD_ERROR_MESSAGE_KEY: &str = "uploadErrorMessage";

/// Unique identifier for a component within one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Generate a fresh id prefixed with the component kind.
    #[must_use]
    pub fn generate(kind: ComponentKind) -> Self {
        Self(prefixed_id(kind.as_str()))
    }

    /// Wrap an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Build `"{prefix}-{12 hex chars}"` from a v4 UUID.
pub(crate) fn prefixed_id(prefix: &str) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &simple[..12])
}

/// The block type a component renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// Free text block.
    Text,
    /// Image, optionally linked.
    Image,
    /// Product advantage with icon.
    Advantage,
    /// Trust seal.
    Seal,
    /// Countdown timer.
    Timer,
    /// Customer testimonial.
    Testimonial,
    /// Embedded video.
    Video,
}

impl ComponentKind {
    /// All kinds in palette order.
    pub const ALL: [Self; 7] = [
        Self::Text,
        Self::Image,
        Self::Advantage,
        Self::Seal,
        Self::Timer,
        Self::Testimonial,
        Self::Video,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Advantage => "advantage",
            Self::Seal => "seal",
            Self::Timer => "timer",
            Self::Testimonial => "testimonial",
            Self::Video => "video",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Content fields that hold uploaded images for this kind.
    #[must_use]
    pub const fn image_fields(self) -> &'static [&'static str] {
        match self {
            Self::Image => &["src"],
            Self::Testimonial => &["avatar"],
            _ => &[],
        }
    }

    /// Content a freshly created component starts with.
    #[must_use]
    pub fn default_content(self) -> Content {
        let value = match self {
            Self::Text => json!({ "text": "Edite este texto", "align": "left", "size": 16 }),
            Self::Image => json!({ "src": "", "alt": "", "link": "" }),
            Self::Advantage => json!({
                "title": "Vantagem",
                "description": "Descreva a vantagem",
                "icon": "check",
            }),
            Self::Seal => json!({ "kind": "secure", "label": "Compra segura" }),
            Self::Timer => json!({
                "minutes": 15,
                "message": "Oferta por tempo limitado",
                "expiredMessage": "Oferta encerrada",
            }),
            Self::Testimonial => json!({
                "author": "Cliente",
                "text": "Depoimento",
                "rating": 5,
                "avatar": "",
            }),
            Self::Video => json!({ "url": "", "autoplay": false }),
        };
        match value {
            Value::Object(map) => map,
            _ => Content::new(),
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A placed block with typed content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique identifier.
    pub id: ComponentId,
    /// Block type.
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// Kind-scoped content.
    #[serde(default)]
    pub content: Content,
}

impl Component {
    /// Create a component of the given kind with default content.
    #[must_use]
    pub fn new(kind: ComponentKind) -> Self {
        Self {
            id: ComponentId::generate(kind),
            kind,
            content: kind.default_content(),
        }
    }

    /// Replace the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ComponentId>) -> Self {
        self.id = id.into();
        self
    }

    /// Replace the content.
    #[must_use]
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = content;
        self
    }

    /// Whether an upload is in flight for this component.
    #[must_use]
    pub fn is_uploading(&self) -> bool {
        self.content
            .get(UPLOADING_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the last upload for this component failed.
    #[must_use]
    pub fn has_upload_error(&self) -> bool {
        self.content
            .get(UPLOAD_ERROR_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Read a string content field.
    #[must_use]
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }

    /// Copy of this component under a fresh id, without upload markers.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut content = self.content.clone();
        content.remove(UPLOADING_KEY);
        content.remove(UPLOAD_ERROR_KEY);
        content.remove(UPLOAD_ERROR_MESSAGE_KEY);
        Self {
            id: ComponentId::generate(self.kind),
            kind: self.kind,
            content,
        }
    }

    /// Shallow-merge `partial` into the content; other fields are untouched.
    pub fn merge_content(&mut self, partial: &Content) {
        for (key, value) in partial {
            self.content.insert(key.clone(), value.clone());
        }
    }
}
