//! # Document Mutations
//!
//! Every edit to a [`Document`] goes through this module. Operations are
//! pure: they take the current document by reference and return a rebuilt
//! one, leaving the input untouched when they fail.
//!
//! ## Semantics
//!
//! - **Insert** appends to an existing container.
//! - **Move** scans top slot, bottom slot, then every row column; the
//!   component is detached and appended to the end of the target.
//! - **Duplicate** places the copy immediately after its source.
//! - **Reorder** swaps with the neighbour; at either edge it is a no-op.
//! - **RemoveRow** discards the row's components, they are not relocated.
//!
//! After each operation the single-placement invariant and component
//! conservation are checked before the new document is handed back.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentId, Content};
use crate::document::{ContainerRef, Document, Row, RowLayout};
use crate::{EngineError, EngineResult};

/// Default maximum number of components per document.
pub const DEFAULT_MAX_COMPONENTS: usize = 500;
/// Default maximum number of rows per document.
pub const DEFAULT_MAX_ROWS: usize = 50;

/// Direction for [`Mutation::Reorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards the start of the container.
    Up,
    /// Towards the end of the container.
    Down,
}

/// Size limits enforced by growing operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of components.
    pub max_components: usize,
    /// Maximum number of rows.
    pub max_rows: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_components: DEFAULT_MAX_COMPONENTS,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl Limits {
    fn check_components(&self, doc: &Document) -> EngineResult<()> {
        if doc.component_count() >= self.max_components {
            return Err(EngineError::LimitExceeded(format!(
                "at most {} components per page",
                self.max_components
            )));
        }
        Ok(())
    }

    fn check_rows(&self, doc: &Document) -> EngineResult<()> {
        if doc.rows().len() >= self.max_rows {
            return Err(EngineError::LimitExceeded(format!(
                "at most {} rows per page",
                self.max_rows
            )));
        }
        Ok(())
    }
}

/// An edit request, as produced by the host's event handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Mutation {
    /// Append a new component to a container.
    Insert {
        /// The component to place.
        component: Component,
        /// Destination container.
        target: ContainerRef,
    },
    /// Move an existing component to the end of a container.
    Move {
        /// Component to move.
        id: ComponentId,
        /// Destination container.
        target: ContainerRef,
    },
    /// Clone a component right after itself.
    Duplicate {
        /// Component to copy.
        id: ComponentId,
    },
    /// Swap a component with its neighbour.
    Reorder {
        /// Component to shift.
        id: ComponentId,
        /// Which neighbour to swap with.
        direction: Direction,
    },
    /// Delete a component.
    Remove {
        /// Component to delete.
        id: ComponentId,
    },
    /// Shallow-merge content into a component.
    UpdateContent {
        /// Component to edit.
        id: ComponentId,
        /// Keys to overwrite.
        content: Content,
    },
    /// Append an empty row.
    AddRow {
        /// Column arrangement of the new row.
        layout: RowLayout,
    },
    /// Delete a row and everything in it.
    RemoveRow {
        /// Row to delete.
        row_id: String,
    },
}

impl Mutation {
    /// Short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Move { .. } => "move",
            Self::Duplicate { .. } => "duplicate",
            Self::Reorder { .. } => "reorder",
            Self::Remove { .. } => "remove",
            Self::UpdateContent { .. } => "update_content",
            Self::AddRow { .. } => "add_row",
            Self::RemoveRow { .. } => "remove_row",
        }
    }
}

/// Outcome of a successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The rebuilt document.
    pub document: Document,
    /// Components that no longer exist after the operation.
    pub removed: Vec<Component>,
    /// Id of a component created by the operation.
    pub created: Option<ComponentId>,
    /// Id of a row created by the operation.
    pub created_row: Option<String>,
    /// False when the operation turned out to be a no-op.
    pub changed: bool,
}

impl Applied {
    fn changed(document: Document) -> Self {
        Self {
            document,
            removed: Vec::new(),
            created: None,
            created_row: None,
            changed: true,
        }
    }
}

/// Apply a mutation with the given limits.
///
/// # Errors
///
/// Returns the operation's error; `doc` is never modified.
pub fn apply(doc: &Document, mutation: &Mutation, limits: &Limits) -> EngineResult<Applied> {
    let applied = match mutation {
        Mutation::Insert { component, target } => {
            let document = insert(doc, component.clone(), target, limits)?;
            Applied {
                created: Some(component.id.clone()),
                ..Applied::changed(document)
            }
        }
        Mutation::Move { id, target } => Applied::changed(move_component(doc, id, target)?),
        Mutation::Duplicate { id } => {
            let (document, copy_id) = duplicate(doc, id, limits)?;
            Applied {
                created: Some(copy_id),
                ..Applied::changed(document)
            }
        }
        Mutation::Reorder { id, direction } => {
            let (document, changed) = reorder(doc, id, *direction)?;
            Applied {
                changed,
                ..Applied::changed(document)
            }
        }
        Mutation::Remove { id } => {
            let (document, component) = remove(doc, id)?;
            Applied {
                removed: vec![component],
                ..Applied::changed(document)
            }
        }
        Mutation::UpdateContent { id, content } => {
            Applied::changed(update_content(doc, id, content)?)
        }
        Mutation::AddRow { layout } => {
            let (document, row_id) = add_row(doc, *layout, limits)?;
            Applied {
                created_row: Some(row_id),
                ..Applied::changed(document)
            }
        }
        Mutation::RemoveRow { row_id } => {
            let (document, removed) = remove_row(doc, row_id)?;
            Applied {
                removed,
                ..Applied::changed(document)
            }
        }
    };

    let removed: Vec<&ComponentId> = applied.removed.iter().map(|c| &c.id).collect();
    ensure_conserved(doc, &applied.document, &removed)?;
    tracing::debug!(
        action = mutation.name(),
        changed = applied.changed,
        components = applied.document.component_count(),
        "Applied mutation"
    );
    Ok(applied)
}

/// Append `component` to `target`.
///
/// # Errors
///
/// Fails if the target does not exist, the id is already placed, or the
/// component limit is reached.
pub fn insert(
    doc: &Document,
    component: Component,
    target: &ContainerRef,
    limits: &Limits,
) -> EngineResult<Document> {
    if doc.contains(&component.id) {
        return Err(EngineError::DuplicateId(component.id.to_string()));
    }
    limits.check_components(doc)?;

    let mut next = doc.clone();
    next.container_mut(target)?.push(component);
    Ok(next)
}

/// Detach `id` from its container and append it to `target`.
///
/// # Errors
///
/// Returns a not-found error for an unknown component or target; nothing
/// is detached in that case.
pub fn move_component(
    doc: &Document,
    id: &ComponentId,
    target: &ContainerRef,
) -> EngineResult<Document> {
    doc.container(target)?;
    let source = doc.find_component(id)?;
    let (from, index) = (source.container, source.index);

    let mut next = doc.clone();
    let component = next.container_mut(&from)?.remove(index);
    next.container_mut(target)?.push(component);
    Ok(next)
}

/// Copy `id` under a fresh id right after the source.
///
/// # Errors
///
/// Fails for an unknown component or when the component limit is reached.
pub fn duplicate(
    doc: &Document,
    id: &ComponentId,
    limits: &Limits,
) -> EngineResult<(Document, ComponentId)> {
    let source = doc.find_component(id)?;
    limits.check_components(doc)?;

    let mut copy = source.component.duplicate();
    while doc.contains(&copy.id) {
        copy = source.component.duplicate();
    }
    let copy_id = copy.id.clone();
    let (container, index) = (source.container, source.index);

    let mut next = doc.clone();
    next.container_mut(&container)?.insert(index + 1, copy);
    Ok((next, copy_id))
}

/// Swap `id` with its neighbour. Returns whether anything moved.
///
/// # Errors
///
/// Returns [`EngineError::ComponentNotFound`] for an unknown component.
pub fn reorder(
    doc: &Document,
    id: &ComponentId,
    direction: Direction,
) -> EngineResult<(Document, bool)> {
    let found = doc.find_component(id)?;
    let len = doc.container(&found.container)?.len();
    let neighbour = match direction {
        Direction::Up if found.index > 0 => found.index - 1,
        Direction::Down if found.index + 1 < len => found.index + 1,
        _ => return Ok((doc.clone(), false)),
    };
    let (container, index) = (found.container, found.index);

    let mut next = doc.clone();
    next.container_mut(&container)?.swap(index, neighbour);
    Ok((next, true))
}

/// Delete `id` from whichever container holds it.
///
/// # Errors
///
/// Returns [`EngineError::ComponentNotFound`] for an unknown component.
pub fn remove(doc: &Document, id: &ComponentId) -> EngineResult<(Document, Component)> {
    let found = doc.find_component(id)?;
    let (container, index) = (found.container, found.index);

    let mut next = doc.clone();
    let component = next.container_mut(&container)?.remove(index);
    Ok((next, component))
}

/// Shallow-merge `partial` into the content of `id`.
///
/// # Errors
///
/// Returns [`EngineError::ComponentNotFound`] for an unknown component.
pub fn update_content(doc: &Document, id: &ComponentId, partial: &Content) -> EngineResult<Document> {
    let found = doc.find_component(id)?;
    let (container, index) = (found.container, found.index);

    let mut next = doc.clone();
    next.container_mut(&container)?[index].merge_content(partial);
    Ok(next)
}

/// Append an empty row. Returns the new row id.
///
/// # Errors
///
/// Returns [`EngineError::LimitExceeded`] when the row limit is reached.
pub fn add_row(doc: &Document, layout: RowLayout, limits: &Limits) -> EngineResult<(Document, String)> {
    limits.check_rows(doc)?;

    let mut row = Row::new(layout);
    while doc.row(&row.id).is_some() {
        row = Row::new(layout);
    }
    let row_id = row.id.clone();

    let mut next = doc.clone();
    next.rows.push(row);
    Ok((next, row_id))
}

/// Delete a row, discarding its components.
///
/// # Errors
///
/// Returns [`EngineError::RowNotFound`] for an unknown row.
pub fn remove_row(doc: &Document, row_id: &str) -> EngineResult<(Document, Vec<Component>)> {
    let position = doc
        .rows()
        .iter()
        .position(|row| row.id == row_id)
        .ok_or_else(|| EngineError::RowNotFound(row_id.to_string()))?;

    let mut next = doc.clone();
    let row = next.rows.remove(position);
    let removed = row.components().cloned().collect();
    Ok((next, removed))
}

/// Check that `after` has no duplicates and every id of `before` that was
/// not removed is still present.
fn ensure_conserved(
    before: &Document,
    after: &Document,
    removed: &[&ComponentId],
) -> EngineResult<()> {
    after.check_invariants()?;

    let present: HashSet<&ComponentId> = after.ids().into_iter().collect();
    let removed: HashSet<&ComponentId> = removed.iter().copied().collect();
    for id in before.ids() {
        if !removed.contains(id) && !present.contains(id) {
            return Err(EngineError::Validation(format!(
                "component {id} lost during mutation"
            )));
        }
    }
    Ok(())
}
