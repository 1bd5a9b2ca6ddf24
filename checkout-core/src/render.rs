//! Render projection.
//!
//! Presentation layers get a flat list of blocks, each with one or more
//! columns, without needing to know about slots versus rows. Every column
//! carries the container id to use as a drop target.

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentId, ComponentKind, Content};
use crate::design::DesignConfig;
use crate::document::{Column, ContainerRef, Document};
use crate::selection::{Selection, SelectionController};

/// A component ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderComponent {
    /// Component id.
    pub id: ComponentId,
    /// Block type.
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// Content to draw.
    pub content: Content,
    /// Upload in flight.
    pub uploading: bool,
    /// Last upload failed.
    pub upload_error: bool,
    /// Open in the editor.
    pub selected: bool,
}

/// One column of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderColumn {
    /// Drop target id of this column.
    pub container_id: String,
    /// Relative grid span.
    pub span: u8,
    /// Row and column are selected.
    pub selected: bool,
    /// Components top to bottom.
    pub components: Vec<RenderComponent>,
}

/// A horizontal band of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderBlock {
    /// Stable key: `top`, `bottom` or the row id.
    pub key: String,
    /// Columns left to right.
    pub columns: Vec<RenderColumn>,
}

/// Everything a presentation layer needs to draw the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPage {
    /// Resolved design.
    pub design: DesignConfig,
    /// Blocks in display order: top slot, rows, bottom slot.
    pub blocks: Vec<RenderBlock>,
}

impl RenderPage {
    /// Every component in display order.
    pub fn components(&self) -> impl Iterator<Item = &RenderComponent> {
        self.blocks
            .iter()
            .flat_map(|block| block.columns.iter())
            .flat_map(|column| column.components.iter())
    }
}

fn render_component(component: &Component, selection: &Selection) -> RenderComponent {
    RenderComponent {
        id: component.id.clone(),
        kind: component.kind,
        content: component.content.clone(),
        uploading: component.is_uploading(),
        upload_error: component.has_upload_error(),
        selected: matches!(selection, Selection::Component { id } if *id == component.id),
    }
}

fn render_column(
    container: &ContainerRef,
    span: u8,
    column: &Column,
    selection: &Selection,
) -> RenderColumn {
    let selected = match (selection, container) {
        (
            Selection::Row {
                row_id,
                column: active,
            },
            ContainerRef::Column {
                row_id: target,
                index,
            },
        ) => row_id == target && active == index,
        _ => false,
    };
    RenderColumn {
        container_id: container.to_string(),
        span,
        selected,
        components: column
            .iter()
            .map(|c| render_component(c, selection))
            .collect(),
    }
}

fn slot_block(key: &str, container: &ContainerRef, column: &Column, selection: &Selection) -> RenderBlock {
    RenderBlock {
        key: key.to_string(),
        columns: vec![render_column(container, 1, column, selection)],
    }
}

/// Project a document for drawing.
#[must_use]
pub fn project(doc: &Document, design: &DesignConfig, selection: &SelectionController) -> RenderPage {
    let selection = selection.current();
    let mut blocks = Vec::with_capacity(doc.rows().len() + 2);
    blocks.push(slot_block("top", &ContainerRef::Top, &doc.top_slot, selection));
    for row in doc.rows() {
        let spans = row.layout().spans();
        let columns = row
            .columns()
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let span = spans.get(index).copied().unwrap_or(1);
                render_column(&ContainerRef::column(row.id.clone(), index), span, column, selection)
            })
            .collect();
        blocks.push(RenderBlock {
            key: row.id.clone(),
            columns,
        });
    }
    blocks.push(slot_block("bottom", &ContainerRef::Bottom, &doc.bottom_slot, selection));
    RenderPage {
        design: design.clone(),
        blocks,
    }
}
