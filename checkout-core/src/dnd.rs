//! Drag-and-drop messages.
//!
//! The interaction layer reports a drop as two strings: what was dragged and
//! where it landed. Palette entries are dragged as `palette:{type}` and become
//! inserts; anything else is an existing component and becomes a move.

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentId, ComponentKind};
use crate::document::ContainerRef;
use crate::mutation::Mutation;
use crate::{EngineError, EngineResult};

/// Prefix of palette drag ids.
pub const PALETTE_PREFIX: &str = "palette:";

/// A completed drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRequest {
    /// Id of the dragged item.
    pub dragged_id: String,
    /// Container id: `top`, `bottom` or `{rowId}:{columnIndex}`.
    pub target_container_id: String,
}

/// What was dragged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragSource {
    /// A new block from the palette.
    Palette(ComponentKind),
    /// A component already on the page.
    Existing(ComponentId),
}

impl DragSource {
    /// Classify a drag id.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an unknown palette type or an
    /// empty id.
    pub fn parse(dragged_id: &str) -> EngineResult<Self> {
        if let Some(kind) = dragged_id.strip_prefix(PALETTE_PREFIX) {
            return ComponentKind::parse(kind)
                .map(Self::Palette)
                .ok_or_else(|| EngineError::Validation(format!("unknown block type: {kind}")));
        }
        if dragged_id.is_empty() {
            return Err(EngineError::Validation("empty drag id".into()));
        }
        Ok(Self::Existing(ComponentId::new(dragged_id)))
    }
}

impl DropRequest {
    /// Build a drop request.
    #[must_use]
    pub fn new(dragged_id: impl Into<String>, target_container_id: impl Into<String>) -> Self {
        Self {
            dragged_id: dragged_id.into(),
            target_container_id: target_container_id.into(),
        }
    }

    /// Translate the drop into an insert or a move.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for malformed ids.
    pub fn to_mutation(&self) -> EngineResult<Mutation> {
        let target: ContainerRef = self.target_container_id.parse()?;
        Ok(match DragSource::parse(&self.dragged_id)? {
            DragSource::Palette(kind) => Mutation::Insert {
                component: Component::new(kind),
                target,
            },
            DragSource::Existing(id) => Mutation::Move { id, target },
        })
    }
}
