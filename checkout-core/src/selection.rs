//! Edit-session selection.
//!
//! Tracks whether the merchant is editing a component, working on a row, or
//! looking at the bare page. The component editor and the row tools are
//! never visible together.

use serde::{Deserialize, Serialize};

use crate::component::ComponentId;
use crate::document::{ContainerRef, Document};
use crate::{EngineError, EngineResult};

/// What is currently selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Selection {
    /// Nothing selected.
    #[default]
    Idle,
    /// A component is open in the editor.
    Component {
        /// Selected component.
        id: ComponentId,
    },
    /// A row (and one of its columns) is selected.
    Row {
        /// Selected row.
        row_id: String,
        /// Active column within the row.
        column: usize,
    },
}

/// Which edit panel the host should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Panel {
    /// No edit panel.
    None,
    /// Content editor for the selected component.
    ComponentEditor,
    /// Row and column tooling.
    RowTools,
}

/// Selection state machine.
#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    selection: Selection,
    active_column: usize,
}

impl SelectionController {
    /// Start idle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current selection.
    #[must_use]
    pub fn current(&self) -> &Selection {
        &self.selection
    }

    /// Selected component id, if any.
    #[must_use]
    pub fn selected_component(&self) -> Option<&ComponentId> {
        match &self.selection {
            Selection::Component { id } => Some(id),
            _ => None,
        }
    }

    /// Last clicked column index.
    #[must_use]
    pub fn active_column(&self) -> usize {
        self.active_column
    }

    /// Visible edit panel.
    #[must_use]
    pub fn panel(&self) -> Panel {
        match self.selection {
            Selection::Idle => Panel::None,
            Selection::Component { .. } => Panel::ComponentEditor,
            Selection::Row { .. } => Panel::RowTools,
        }
    }

    /// Open a component in the editor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ComponentNotFound`] and keeps the current
    /// selection if `id` is not in the document.
    pub fn select_component(&mut self, doc: &Document, id: &ComponentId) -> EngineResult<()> {
        doc.find_component(id)?;
        tracing::debug!(component = %id, "Selected component");
        self.selection = Selection::Component { id: id.clone() };
        Ok(())
    }

    /// Select a row column. Also makes `column` the active column.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown row or column.
    pub fn select_column(&mut self, doc: &Document, row_id: &str, column: usize) -> EngineResult<()> {
        doc.container(&ContainerRef::column(row_id, column))?;
        tracing::debug!(row = row_id, column, "Selected row column");
        self.active_column = column;
        self.selection = Selection::Row {
            row_id: row_id.to_string(),
            column,
        };
        Ok(())
    }

    /// Select a row, keeping the active column when it fits the row.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RowNotFound`] for an unknown row.
    pub fn select_row(&mut self, doc: &Document, row_id: &str) -> EngineResult<()> {
        let row = doc
            .row(row_id)
            .ok_or_else(|| EngineError::RowNotFound(row_id.to_string()))?;
        let column = if self.active_column < row.columns().len() {
            self.active_column
        } else {
            0
        };
        self.select_column(doc, row_id, column)
    }

    /// Close the edit panel.
    pub fn back(&mut self) {
        self.selection = Selection::Idle;
    }

    /// Drop the selection if what it points at no longer exists.
    ///
    /// Returns `true` when the selection was reset.
    pub fn revalidate(&mut self, doc: &Document) -> bool {
        let valid = match &self.selection {
            Selection::Idle => true,
            Selection::Component { id } => doc.contains(id),
            Selection::Row { row_id, column } => doc
                .container(&ContainerRef::column(row_id.clone(), *column))
                .is_ok(),
        };
        if !valid {
            tracing::debug!(selection = ?self.selection, "Selection no longer valid");
            self.selection = Selection::Idle;
        }
        !valid
    }
}
