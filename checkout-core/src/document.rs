//! Document tree for a composed checkout page.
//!
//! A [`Document`] holds three kinds of containers: the top slot, the bottom
//! slot, and the columns of every [`Row`]. Together they partition all
//! components, so each component id appears in exactly one container.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::component::{prefixed_id, Component, ComponentId};
use crate::{EngineError, EngineResult};

/// An ordered list of components, rendered top to bottom.
pub type Column = Vec<Component>;

/// Column arrangement of a row. Fixed when the row is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowLayout {
    /// One full-width column.
    Single,
    /// Two equal columns.
    TwoColumns,
    /// Two columns with spans 1:2.
    TwoColumnsAsymmetric,
    /// Three equal columns.
    ThreeColumns,
}

impl RowLayout {
    /// Number of columns the layout has.
    #[must_use]
    pub const fn column_count(self) -> usize {
        self.spans().len()
    }

    /// Relative span of each column.
    #[must_use]
    pub const fn spans(self) -> &'static [u8] {
        match self {
            Self::Single => &[1],
            Self::TwoColumns => &[1, 1],
            Self::TwoColumnsAsymmetric => &[1, 2],
            Self::ThreeColumns => &[1, 1, 1],
        }
    }

    /// Wire name of the layout.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::TwoColumns => "two-columns",
            Self::TwoColumnsAsymmetric => "two-columns-asymmetric",
            Self::ThreeColumns => "three-columns",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [
            Self::Single,
            Self::TwoColumns,
            Self::TwoColumnsAsymmetric,
            Self::ThreeColumns,
        ]
        .into_iter()
        .find(|layout| layout.as_str() == name)
    }
}

/// A layout unit holding a fixed number of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Unique row identifier.
    pub id: String,
    layout: RowLayout,
    columns: Vec<Column>,
}

impl Row {
    /// Create an empty row with a fresh id.
    #[must_use]
    pub fn new(layout: RowLayout) -> Self {
        Self::with_id(prefixed_id("row"), layout)
    }

    /// Create an empty row with the given id.
    #[must_use]
    pub fn with_id(id: impl Into<String>, layout: RowLayout) -> Self {
        Self {
            id: id.into(),
            layout,
            columns: vec![Column::new(); layout.column_count()],
        }
    }

    /// Build a row from stored columns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if the column count does not match
    /// the layout.
    pub fn from_columns(
        id: impl Into<String>,
        layout: RowLayout,
        columns: Vec<Column>,
    ) -> EngineResult<Self> {
        let id = id.into();
        if columns.len() != layout.column_count() {
            return Err(EngineError::Validation(format!(
                "row {id} has {} columns, layout {} needs {}",
                columns.len(),
                layout.as_str(),
                layout.column_count()
            )));
        }
        Ok(Self {
            id,
            layout,
            columns,
        })
    }

    /// The row's layout.
    #[must_use]
    pub fn layout(&self) -> RowLayout {
        self.layout
    }

    /// All columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// A single column by index.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub(crate) fn column_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    /// Number of components across all columns.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Iterate over every component in column order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.columns.iter().flatten()
    }
}

/// Reference to one container in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "container", rename_all = "snake_case")]
pub enum ContainerRef {
    /// The top slot.
    Top,
    /// The bottom slot.
    Bottom,
    /// A column inside a row.
    Column {
        /// Row identifier.
        row_id: String,
        /// Zero-based column index.
        index: usize,
    },
}

impl ContainerRef {
    /// Reference a row column.
    #[must_use]
    pub fn column(row_id: impl Into<String>, index: usize) -> Self {
        Self::Column {
            row_id: row_id.into(),
            index,
        }
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("top"),
            Self::Bottom => f.write_str("bottom"),
            Self::Column { row_id, index } => write!(f, "{row_id}:{index}"),
        }
    }
}

impl FromStr for ContainerRef {
    type Err = EngineError;

    /// Parse `"top"`, `"bottom"` or `"{rowId}:{columnIndex}"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            other => {
                let (row_id, index) = other
                    .rsplit_once(':')
                    .ok_or_else(|| EngineError::Validation(format!("invalid container: {s}")))?;
                let index = index
                    .parse()
                    .map_err(|_| EngineError::Validation(format!("invalid column index: {s}")))?;
                if row_id.is_empty() {
                    return Err(EngineError::Validation(format!("invalid container: {s}")));
                }
                Ok(Self::column(row_id, index))
            }
        }
    }
}

/// A component found in the document, with where it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<'a> {
    /// The component.
    pub component: &'a Component,
    /// Container holding it.
    pub container: ContainerRef,
    /// Position inside the container.
    pub index: usize,
}

/// The composed page: two slots plus a grid of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub(crate) top_slot: Column,
    #[serde(default)]
    pub(crate) bottom_slot: Column,
    #[serde(default)]
    pub(crate) rows: Vec<Row>,
}

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a document from stored containers.
    ///
    /// # Errors
    ///
    /// Returns an error if a component id is placed more than once or a row
    /// has the wrong number of columns.
    pub fn from_parts(top_slot: Column, bottom_slot: Column, rows: Vec<Row>) -> EngineResult<Self> {
        let doc = Self {
            top_slot,
            bottom_slot,
            rows,
        };
        doc.check_invariants()?;
        Ok(doc)
    }

    /// Components in the top slot.
    #[must_use]
    pub fn top_slot(&self) -> &[Component] {
        &self.top_slot
    }

    /// Components in the bottom slot.
    #[must_use]
    pub fn bottom_slot(&self) -> &[Component] {
        &self.bottom_slot
    }

    /// Rows in display order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Find a row by id.
    #[must_use]
    pub fn row(&self, row_id: &str) -> Option<&Row> {
        self.rows.iter().find(|row| row.id == row_id)
    }

    /// Every container paired with its reference, in lookup order:
    /// top slot, bottom slot, then each row's columns.
    pub fn containers(&self) -> impl Iterator<Item = (ContainerRef, &Column)> {
        let slots = [
            (ContainerRef::Top, &self.top_slot),
            (ContainerRef::Bottom, &self.bottom_slot),
        ];
        let columns = self.rows.iter().flat_map(|row| {
            row.columns
                .iter()
                .enumerate()
                .map(move |(index, column)| (ContainerRef::column(row.id.clone(), index), column))
        });
        slots.into_iter().chain(columns)
    }

    /// Resolve a container reference.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RowNotFound`] or [`EngineError::ColumnOutOfRange`].
    pub fn container(&self, target: &ContainerRef) -> EngineResult<&Column> {
        match target {
            ContainerRef::Top => Ok(&self.top_slot),
            ContainerRef::Bottom => Ok(&self.bottom_slot),
            ContainerRef::Column { row_id, index } => {
                let row = self
                    .row(row_id)
                    .ok_or_else(|| EngineError::RowNotFound(row_id.clone()))?;
                row.column(*index).ok_or_else(|| EngineError::ColumnOutOfRange {
                    row_id: row_id.clone(),
                    index: *index,
                    columns: row.columns.len(),
                })
            }
        }
    }

    pub(crate) fn container_mut(&mut self, target: &ContainerRef) -> EngineResult<&mut Column> {
        match target {
            ContainerRef::Top => Ok(&mut self.top_slot),
            ContainerRef::Bottom => Ok(&mut self.bottom_slot),
            ContainerRef::Column { row_id, index } => {
                let row = self
                    .rows
                    .iter_mut()
                    .find(|row| row.id == *row_id)
                    .ok_or_else(|| EngineError::RowNotFound(row_id.clone()))?;
                let columns = row.columns.len();
                row.column_mut(*index)
                    .ok_or_else(|| EngineError::ColumnOutOfRange {
                        row_id: row_id.clone(),
                        index: *index,
                        columns,
                    })
            }
        }
    }

    /// Locate a component with a single linear scan over all containers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ComponentNotFound`] if no container holds `id`.
    pub fn find_component(&self, id: &ComponentId) -> EngineResult<Located<'_>> {
        self.containers()
            .find_map(|(container, column)| {
                column
                    .iter()
                    .position(|c| c.id == *id)
                    .map(|index| Located {
                        component: &column[index],
                        container,
                        index,
                    })
            })
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))
    }

    /// Whether a component with this id is placed anywhere.
    #[must_use]
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.find_component(id).is_ok()
    }

    /// All components in render order: top slot, rows, bottom slot.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Component> {
        self.top_slot
            .iter()
            .chain(self.rows.iter().flat_map(Row::components))
            .chain(self.bottom_slot.iter())
            .collect()
    }

    /// Ids of all components in render order.
    #[must_use]
    pub fn ids(&self) -> Vec<&ComponentId> {
        self.flatten().into_iter().map(|c| &c.id).collect()
    }

    /// Total number of placed components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.top_slot.len()
            + self.bottom_slot.len()
            + self.rows.iter().map(Row::component_count).sum::<usize>()
    }

    /// Check the single-placement invariant and row arity.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateId`] for the first id placed twice, or
    /// [`EngineError::Validation`] for a malformed row.
    pub fn check_invariants(&self) -> EngineResult<()> {
        let mut row_ids = HashSet::new();
        for row in &self.rows {
            if row.columns.len() != row.layout.column_count() {
                return Err(EngineError::Validation(format!(
                    "row {} has {} columns, layout {} needs {}",
                    row.id,
                    row.columns.len(),
                    row.layout.as_str(),
                    row.layout.column_count()
                )));
            }
            if !row_ids.insert(row.id.as_str()) {
                return Err(EngineError::Validation(format!("duplicate row id: {}", row.id)));
            }
        }

        let mut seen = HashSet::new();
        for component in self.flatten() {
            if !seen.insert(&component.id) {
                return Err(EngineError::DuplicateId(component.id.to_string()));
            }
        }
        Ok(())
    }

    /// Serialize the document to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string(self).map_err(EngineError::Serialization)
    }

    /// Deserialize a document from JSON and check its invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the document is malformed.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let doc: Self = serde_json::from_str(json)?;
        doc.check_invariants()?;
        Ok(doc)
    }
}
