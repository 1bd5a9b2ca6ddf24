//! Layered design resolution and design edits.
//!
//! Precedence, highest first:
//!
//! 1. explicit overrides supplied by the caller
//! 2. the stored composite design blob
//! 3. legacy flat columns from the older schema
//! 4. built-in defaults
//!
//! Layers merge per color leaf, so a layer that only sets
//! `button.default.background` leaves every other role to the layers below.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::design::{BackgroundImage, ColorPalette, DesignConfig, DesignLayer, LegacyDesignFields, Theme};
use crate::presets::Preset;
use crate::EngineResult;

/// Legacy column to palette path mapping.
const LEGACY_COLOR_PATHS: [(&str, &str); 6] = [
    ("primary_color", "button.default.background"),
    ("button_text_color", "button.default.text"),
    ("background_color", "background"),
    ("text_color", "text.primary"),
    ("secondary_text_color", "text.secondary"),
    ("header_color", "sections.header.background"),
];

fn legacy_color(fields: &LegacyDesignFields, column: &str) -> Option<String> {
    let value = match column {
        "primary_color" => &fields.primary_color,
        "button_text_color" => &fields.button_text_color,
        "background_color" => &fields.background_color,
        "text_color" => &fields.text_color,
        "secondary_text_color" => &fields.secondary_text_color,
        "header_color" => &fields.header_color,
        _ => &None,
    };
    value.clone().filter(|v| !v.is_empty())
}

/// Convert legacy columns into a partial design.
#[must_use]
pub fn legacy_layer(fields: &LegacyDesignFields) -> DesignLayer {
    let mut colors = ColorPalette::new();
    for (column, path) in LEGACY_COLOR_PATHS {
        if let Some(value) = legacy_color(fields, column) {
            let pairs = [(path, value.as_str())];
            colors.merge(&ColorPalette::from_pairs(&pairs));
        }
    }
    DesignLayer {
        theme: fields.theme.as_deref().map(Theme::from_name),
        font: fields.font_family.clone().filter(|f| !f.is_empty()),
        colors,
        background_image: fields
            .background_image_url
            .as_ref()
            .filter(|url| !url.is_empty())
            .map(BackgroundImage::new),
    }
}

/// Resolve a complete design from all layers.
#[must_use]
pub fn resolve(
    overrides: Option<&DesignLayer>,
    stored: Option<&Value>,
    legacy: &LegacyDesignFields,
) -> DesignConfig {
    let mut design = DesignConfig::default();
    design.apply_layer(&legacy_layer(legacy));
    design.apply_layer(&DesignLayer::from_blob(stored));
    if let Some(overrides) = overrides {
        design.apply_layer(overrides);
    }
    design
}

/// Flat columns written alongside the composite blob on save.
#[must_use]
pub fn derive_legacy_fields(design: &DesignConfig) -> LegacyDesignFields {
    let color = |path: &str| design.colors.get(path).map(str::to_string);
    LegacyDesignFields {
        primary_color: color("button.default.background"),
        button_text_color: color("button.default.text"),
        background_color: color("background"),
        text_color: color("text.primary"),
        secondary_text_color: color("text.secondary"),
        header_color: color("sections.header.background"),
        font_family: Some(design.font.clone()),
        theme: Some(design.theme.as_str().to_string()),
        background_image_url: design.background_image.as_ref().map(|bg| bg.url.clone()),
    }
}

/// Replace the whole palette and font with a preset's.
#[must_use]
pub fn apply_preset(design: &DesignConfig, preset: &Preset) -> DesignConfig {
    DesignConfig {
        theme: preset.theme(),
        font: preset.font.clone(),
        colors: preset.colors.clone(),
        background_image: design.background_image.clone(),
    }
}

/// Change one color. The theme becomes `custom`.
///
/// # Errors
///
/// Returns [`crate::EngineError::Validation`] for a malformed path or one
/// that clashes with the palette's shape.
pub fn set_color(design: &DesignConfig, path: &str, value: &str) -> EngineResult<DesignConfig> {
    let mut next = design.clone();
    next.colors.set(path, value)?;
    next.theme = Theme::Custom;
    Ok(next)
}

/// Change the font. The theme is left alone.
#[must_use]
pub fn set_font(design: &DesignConfig, font: &str) -> DesignConfig {
    DesignConfig {
        font: font.to_string(),
        ..design.clone()
    }
}

/// Set or clear the background image. The theme is left alone.
#[must_use]
pub fn set_background_image(design: &DesignConfig, image: Option<BackgroundImage>) -> DesignConfig {
    DesignConfig {
        background_image: image,
        ..design.clone()
    }
}

/// A design edit requested by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DesignUpdate {
    /// Apply a preset wholesale.
    ApplyPreset {
        /// The preset to apply.
        preset: Preset,
    },
    /// Edit a single color.
    SetColor {
        /// Dotted palette path.
        path: String,
        /// New color value.
        value: String,
    },
    /// Change the font.
    SetFont {
        /// Font family.
        font: String,
    },
    /// Set or clear the background image.
    SetBackgroundImage {
        /// New background, or `None` to clear.
        image: Option<BackgroundImage>,
    },
}

impl DesignUpdate {
    /// Apply the edit to `design`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed color path.
    pub fn apply(&self, design: &DesignConfig) -> EngineResult<DesignConfig> {
        match self {
            Self::ApplyPreset { preset } => Ok(apply_preset(design, preset)),
            Self::SetColor { path, value } => set_color(design, path, value),
            Self::SetFont { font } => Ok(set_font(design, font)),
            Self::SetBackgroundImage { image } => Ok(set_background_image(design, image.clone())),
        }
    }
}
