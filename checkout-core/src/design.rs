//! Visual design configuration: theme, font, color palette and background.
//!
//! Colors live in a nested palette addressed by dotted paths such as
//! `button.hover.background`. A [`DesignLayer`] is a partial configuration
//! used while resolving stored data; [`DesignConfig`] is always complete.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{EngineError, EngineResult};

/// Font used when nothing else is configured.
pub const DEFAULT_FONT: &str = "Inter";

/// Named theme of a design.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Theme {
    /// The light preset.
    #[default]
    Light,
    /// The dark preset.
    Dark,
    /// Anything edited away from a preset.
    Custom,
}

impl Theme {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Custom => "custom",
        }
    }

    /// Parse a theme name. Unknown names map to [`Theme::Custom`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::Light,
            "dark" => Self::Dark,
            _ => Self::Custom,
        }
    }
}

impl From<String> for Theme {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<Theme> for String {
    fn from(theme: Theme) -> Self {
        theme.as_str().to_string()
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A palette entry: either a color value or a group of named roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorNode {
    /// A color value, e.g. `#16a34a`.
    Leaf(String),
    /// Nested roles.
    Group(BTreeMap<String, ColorNode>),
}

/// Nested map of color roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorPalette(BTreeMap<String, ColorNode>);

fn split_path(path: &str) -> EngineResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(EngineError::Validation(format!("invalid color path: {path:?}")));
    }
    Ok(segments)
}

fn merge_maps(target: &mut BTreeMap<String, ColorNode>, source: &BTreeMap<String, ColorNode>) {
    for (key, node) in source {
        match (target.get_mut(key), node) {
            (Some(ColorNode::Group(existing)), ColorNode::Group(incoming)) => {
                merge_maps(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), node.clone());
            }
        }
    }
}

fn collect_leaves(prefix: &str, map: &BTreeMap<String, ColorNode>, out: &mut Vec<(String, String)>) {
    for (key, node) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match node {
            ColorNode::Leaf(value) => out.push((path, value.clone())),
            ColorNode::Group(children) => collect_leaves(&path, children, out),
        }
    }
}

impl ColorPalette {
    /// An empty palette.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in light palette.
    #[must_use]
    pub fn light() -> Self {
        Self::from_pairs(&[
            ("background", "#f4f4f5"),
            ("text.primary", "#18181b"),
            ("text.secondary", "#52525b"),
            ("button.default.background", "#16a34a"),
            ("button.default.text", "#ffffff"),
            ("button.hover.background", "#15803d"),
            ("button.hover.text", "#ffffff"),
            ("button.disabled.background", "#a1a1aa"),
            ("button.disabled.text", "#f4f4f5"),
            ("sections.header.background", "#ffffff"),
            ("sections.summary.background", "#ffffff"),
            ("sections.form.background", "#ffffff"),
            ("sections.footer.background", "#f4f4f5"),
            ("border", "#e4e4e7"),
        ])
    }

    /// Build a palette from `(path, color)` pairs.
    ///
    /// Pairs with an empty path segment are skipped.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let mut palette = Self::new();
        for (path, value) in pairs {
            if let Ok(segments) = split_path(path) {
                palette.insert_segments(&segments, (*value).to_string());
            }
        }
        palette
    }

    /// Whether the palette holds no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a color by dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        let mut segments = path.split('.');
        let mut node = self.0.get(segments.next()?)?;
        for segment in segments {
            match node {
                ColorNode::Group(children) => node = children.get(segment)?,
                ColorNode::Leaf(_) => return None,
            }
        }
        match node {
            ColorNode::Leaf(value) => Some(value),
            ColorNode::Group(_) => None,
        }
    }

    /// Set one color by dotted path, creating groups along the way.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a path with empty segments,
    /// a path naming an existing group, or a path running through an
    /// existing color.
    pub fn set(&mut self, path: &str, value: impl Into<String>) -> EngineResult<()> {
        let segments = split_path(path)?;
        self.check_settable(path, &segments)?;
        self.insert_segments(&segments, value.into());
        Ok(())
    }

    fn check_settable(&self, path: &str, segments: &[&str]) -> EngineResult<()> {
        let mut map = &self.0;
        for (depth, segment) in segments.iter().enumerate() {
            let last = depth + 1 == segments.len();
            match map.get(*segment) {
                None => return Ok(()),
                Some(ColorNode::Leaf(_)) if last => return Ok(()),
                Some(ColorNode::Leaf(_)) => {
                    let color = segments[..=depth].join(".");
                    return Err(EngineError::Validation(format!(
                        "color path {path:?} passes through color {color:?}"
                    )));
                }
                Some(ColorNode::Group(_)) if last => {
                    return Err(EngineError::Validation(format!(
                        "color path {path:?} names a group"
                    )));
                }
                Some(ColorNode::Group(children)) => map = children,
            }
        }
        Ok(())
    }

    fn insert_segments(&mut self, segments: &[&str], value: String) {
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut map = &mut self.0;
        for segment in parents {
            let node = map
                .entry((*segment).to_string())
                .or_insert_with(|| ColorNode::Group(BTreeMap::new()));
            if matches!(node, ColorNode::Leaf(_)) {
                *node = ColorNode::Group(BTreeMap::new());
            }
            let ColorNode::Group(children) = node else {
                return;
            };
            map = children;
        }
        map.insert((*last).to_string(), ColorNode::Leaf(value));
    }

    /// Overlay `other` onto this palette leaf by leaf.
    pub fn merge(&mut self, other: &Self) {
        merge_maps(&mut self.0, &other.0);
    }

    /// Every color as `(dotted path, value)`, sorted by path.
    #[must_use]
    pub fn leaves(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        collect_leaves("", &self.0, &mut out);
        out
    }

    /// Paths whose values differ between two palettes.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Vec<String> {
        let left: BTreeMap<String, String> = self.leaves().into_iter().collect();
        let right: BTreeMap<String, String> = other.leaves().into_iter().collect();
        let mut paths: Vec<String> = left
            .iter()
            .filter(|(path, value)| right.get(*path) != Some(*value))
            .map(|(path, _)| path.clone())
            .chain(right.keys().filter(|path| !left.contains_key(*path)).cloned())
            .collect();
        paths.sort();
        paths
    }
}

fn default_opacity() -> f64 {
    1.0
}

/// Page background image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundImage {
    /// Public URL of the image.
    pub url: String,
    /// Whether the image stays fixed while scrolling.
    #[serde(default)]
    pub fixed: bool,
    /// Whether the image tiles.
    #[serde(default)]
    pub repeat: bool,
    /// Opacity between 0.0 and 1.0.
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

impl BackgroundImage {
    /// A non-repeating, fully opaque background.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fixed: false,
            repeat: false,
            opacity: 1.0,
        }
    }
}

/// Complete design configuration of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignConfig {
    /// Named theme or `custom`.
    pub theme: Theme,
    /// Font family.
    pub font: String,
    /// Color roles.
    pub colors: ColorPalette,
    /// Optional background image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<BackgroundImage>,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            font: DEFAULT_FONT.to_string(),
            colors: ColorPalette::light(),
            background_image: None,
        }
    }
}

impl DesignConfig {
    /// Overlay a partial layer on top of this configuration.
    pub fn apply_layer(&mut self, layer: &DesignLayer) {
        if let Some(theme) = layer.theme {
            self.theme = theme;
        }
        if let Some(font) = &layer.font {
            self.font.clone_from(font);
        }
        self.colors.merge(&layer.colors);
        if let Some(background) = &layer.background_image {
            self.background_image = Some(background.clone());
        }
    }
}

/// A partial design, as stored in a composite blob or derived from legacy
/// columns. Missing fields fall through to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignLayer {
    /// Theme, if set.
    #[serde(default)]
    pub theme: Option<Theme>,
    /// Font, if set.
    #[serde(default)]
    pub font: Option<String>,
    /// Colors set by this layer.
    #[serde(default)]
    pub colors: ColorPalette,
    /// Background image, if set.
    #[serde(default)]
    pub background_image: Option<BackgroundImage>,
}

impl DesignLayer {
    /// Whether the layer sets nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.theme.is_none()
            && self.font.is_none()
            && self.colors.is_empty()
            && self.background_image.is_none()
    }

    /// Parse a stored design blob. Absent or malformed blobs yield an empty
    /// layer.
    #[must_use]
    pub fn from_blob(blob: Option<&serde_json::Value>) -> Self {
        match blob {
            None | Some(serde_json::Value::Null) => Self::default(),
            Some(value) => match Self::deserialize(value) {
                Ok(layer) => layer,
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring malformed design blob");
                    Self::default()
                }
            },
        }
    }
}

/// Flat design columns from the older page schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyDesignFields {
    /// Main button background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    /// Main button label color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text_color: Option<String>,
    /// Page background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Primary text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    /// Secondary text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_text_color: Option<String>,
    /// Header section background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_color: Option<String>,
    /// Font family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Theme name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Background image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_url: Option<String>,
}

impl LegacyDesignFields {
    /// Whether no column is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
