//! Theme presets and the font list.
//!
//! A preset is an immutable `{colors, font}` bundle. Hosts can plug their own
//! catalog in through [`PresetCatalog`]; [`BuiltinPresets`] ships the light
//! and dark themes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::design::{ColorPalette, Theme, DEFAULT_FONT};
use crate::error::StoreError;

/// A selectable font.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontOption {
    /// Font family value stored in the design.
    pub value: String,
    /// Human-readable label.
    pub label: String,
}

impl FontOption {
    fn new(value: &str, label: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
        }
    }
}

/// A named color and font bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Preset name, also the theme name it applies.
    pub name: String,
    /// Full color palette.
    pub colors: ColorPalette,
    /// Font family.
    pub font: String,
}

impl Preset {
    /// Theme a design takes when this preset is applied.
    #[must_use]
    pub fn theme(&self) -> Theme {
        Theme::from_name(&self.name)
    }
}

/// Source of presets and fonts.
#[async_trait]
pub trait PresetCatalog: Send + Sync {
    /// Fonts offered to the merchant.
    async fn list_fonts(&self) -> Result<Vec<FontOption>, StoreError>;

    /// Names of available presets.
    async fn list_presets(&self) -> Result<Vec<String>, StoreError>;

    /// Fetch a preset by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown name.
    async fn get_preset(&self, name: &str) -> Result<Preset, StoreError>;
}

/// Light preset.
#[must_use]
pub fn light() -> Preset {
    Preset {
        name: "light".to_string(),
        colors: ColorPalette::light(),
        font: DEFAULT_FONT.to_string(),
    }
}

/// Dark preset.
#[must_use]
pub fn dark() -> Preset {
    Preset {
        name: "dark".to_string(),
        colors: ColorPalette::from_pairs(&[
            ("background", "#09090b"),
            ("text.primary", "#fafafa"),
            ("text.secondary", "#a1a1aa"),
            ("button.default.background", "#22c55e"),
            ("button.default.text", "#052e16"),
            ("button.hover.background", "#16a34a"),
            ("button.hover.text", "#052e16"),
            ("button.disabled.background", "#3f3f46"),
            ("button.disabled.text", "#a1a1aa"),
            ("sections.header.background", "#18181b"),
            ("sections.summary.background", "#18181b"),
            ("sections.form.background", "#18181b"),
            ("sections.footer.background", "#09090b"),
            ("border", "#27272a"),
        ]),
        font: DEFAULT_FONT.to_string(),
    }
}

/// Fonts bundled with the studio.
#[must_use]
pub fn fonts() -> Vec<FontOption> {
    vec![
        FontOption::new("Inter", "Inter"),
        FontOption::new("Roboto", "Roboto"),
        FontOption::new("Open Sans", "Open Sans"),
        FontOption::new("Montserrat", "Montserrat"),
        FontOption::new("Poppins", "Poppins"),
        FontOption::new("Lato", "Lato"),
    ]
}

/// Built-in catalog with the light and dark presets.
#[derive(Debug, Clone, Default)]
pub struct BuiltinPresets;

impl BuiltinPresets {
    /// Create the catalog.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PresetCatalog for BuiltinPresets {
    async fn list_fonts(&self) -> Result<Vec<FontOption>, StoreError> {
        Ok(fonts())
    }

    async fn list_presets(&self) -> Result<Vec<String>, StoreError> {
        Ok(vec!["light".to_string(), "dark".to_string()])
    }

    async fn get_preset(&self, name: &str) -> Result<Preset, StoreError> {
        match name {
            "light" => Ok(light()),
            "dark" => Ok(dark()),
            other => Err(StoreError::NotFound(format!("preset {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_cover_same_roles() {
        let light_paths: Vec<String> = light().colors.leaves().into_iter().map(|(p, _)| p).collect();
        let dark_paths: Vec<String> = dark().colors.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(light_paths, dark_paths);
    }

    #[test]
    fn test_preset_theme() {
        assert_eq!(light().theme(), Theme::Light);
        assert_eq!(dark().theme(), Theme::Dark);
    }

    #[tokio::test]
    async fn test_builtin_catalog() {
        let catalog = BuiltinPresets::new();
        let fonts = catalog.list_fonts().await.expect("fonts");
        assert!(fonts.iter().any(|f| f.value == "Inter"));

        let dark = catalog.get_preset("dark").await.expect("dark");
        assert_eq!(dark.colors.get("background"), Some("#09090b"));

        let missing = catalog.get_preset("neon").await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }
}
