//! Background image uploads.
//!
//! An upload is started by the editor, runs as its own tokio task, and
//! reports back through an [`UploadEvent`] on an mpsc channel. While it runs
//! the target component carries `uploading: true` in its content; the rest of
//! the document stays editable.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::assets::AssetStore;
use crate::component::{
    Component, ComponentId, UPLOADING_KEY, UPLOAD_ERROR_KEY, UPLOAD_ERROR_MESSAGE_KEY,
};
use crate::document::Document;
use crate::{EngineError, EngineResult};

/// Where an upload's URL ends up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum UploadTarget {
    /// An image field of a component.
    Component {
        /// Component receiving the image.
        id: ComponentId,
        /// Content field to set, e.g. `src`.
        field: String,
    },
    /// The design's background image.
    Background,
}

/// An upload in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    /// Ticket id.
    pub id: Uuid,
    /// Destination of the resulting URL.
    pub target: UploadTarget,
    /// Asset store path being written.
    pub path: String,
}

impl UploadTicket {
    /// Create a ticket for `target` writing to `path`.
    #[must_use]
    pub fn new(target: UploadTarget, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            path: path.into(),
        }
    }
}

/// Completion report of one upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEvent {
    /// The ticket the task was started with.
    pub ticket: UploadTicket,
    /// Public URL on success, error message on failure.
    pub outcome: Result<String, String>,
}

/// Run an upload on the ambient runtime and report on `events`.
///
/// # Errors
///
/// Returns [`EngineError::Upload`] when called outside a tokio runtime.
pub fn spawn_upload(
    store: Arc<dyn AssetStore>,
    ticket: UploadTicket,
    bytes: Vec<u8>,
    events: UnboundedSender<UploadEvent>,
) -> EngineResult<JoinHandle<()>> {
    let runtime = Handle::try_current()
        .map_err(|_| EngineError::Upload("no async runtime to run the upload on".into()))?;
    Ok(runtime.spawn(async move {
        let outcome = store
            .upload(bytes, &ticket.path)
            .await
            .map_err(|e| e.to_string());
        match &outcome {
            Ok(url) => tracing::debug!(path = %ticket.path, url = %url, "Upload finished"),
            Err(e) => tracing::warn!(path = %ticket.path, error = %e, "Upload failed"),
        }
        if events.send(UploadEvent { ticket, outcome }).is_err() {
            tracing::debug!("Editor dropped before upload completed");
        }
    }))
}

/// Check that `field` accepts uploaded images for this component.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] for a non-image field.
pub fn validate_image_field(component: &Component, field: &str) -> EngineResult<()> {
    if component.kind.image_fields().contains(&field) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{} components have no image field {field:?}",
            component.kind
        )))
    }
}

fn edit_component(
    doc: &Document,
    id: &ComponentId,
    edit: impl FnOnce(&mut Component),
) -> EngineResult<Document> {
    let found = doc.find_component(id)?;
    let (container, index) = (found.container, found.index);
    let mut next = doc.clone();
    if let Some(component) = next.container_mut(&container)?.get_mut(index) {
        edit(component);
    }
    Ok(next)
}

/// Flag a component as uploading and clear any previous failure.
///
/// # Errors
///
/// Returns [`EngineError::ComponentNotFound`] for an unknown component.
pub fn mark_uploading(doc: &Document, id: &ComponentId) -> EngineResult<Document> {
    edit_component(doc, id, |component| {
        component
            .content
            .insert(UPLOADING_KEY.to_string(), Value::Bool(true));
        component.content.remove(UPLOAD_ERROR_KEY);
        component.content.remove(UPLOAD_ERROR_MESSAGE_KEY);
    })
}

/// Store the uploaded URL and clear the markers.
///
/// Returns the new document and the field's previous value.
///
/// # Errors
///
/// Returns [`EngineError::ComponentNotFound`] for an unknown component.
pub fn apply_upload_success(
    doc: &Document,
    id: &ComponentId,
    field: &str,
    url: &str,
) -> EngineResult<(Document, Option<String>)> {
    let mut previous = None;
    let next = edit_component(doc, id, |component| {
        previous = component
            .content
            .insert(field.to_string(), Value::String(url.to_string()))
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|v| !v.is_empty());
        component.content.remove(UPLOADING_KEY);
        component.content.remove(UPLOAD_ERROR_KEY);
        component.content.remove(UPLOAD_ERROR_MESSAGE_KEY);
    })?;
    Ok((next, previous))
}

/// Clear the uploading marker and flag the failure. The image field keeps
/// whatever durable value it had.
///
/// # Errors
///
/// Returns [`EngineError::ComponentNotFound`] for an unknown component.
pub fn apply_upload_failure(doc: &Document, id: &ComponentId, message: &str) -> EngineResult<Document> {
    edit_component(doc, id, |component| {
        component.content.remove(UPLOADING_KEY);
        component
            .content
            .insert(UPLOAD_ERROR_KEY.to_string(), Value::Bool(true));
        component.content.insert(
            UPLOAD_ERROR_MESSAGE_KEY.to_string(),
            Value::String(message.to_string()),
        );
    })
}

/// Remove `uploading` markers that no task will ever resolve, e.g. on a page
/// saved by a client that crashed mid-upload. Returns how many were removed.
#[must_use]
pub fn strip_stale_markers(doc: &Document) -> (Document, usize) {
    let mut next = doc.clone();
    let mut stripped = 0;
    let containers: Vec<_> = doc.containers().map(|(target, _)| target).collect();
    for target in containers {
        if let Ok(column) = next.container_mut(&target) {
            for component in column.iter_mut() {
                if component.content.remove(UPLOADING_KEY).is_some() {
                    stripped += 1;
                }
            }
        }
    }
    (next, stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryAssetStore;
    use crate::component::ComponentKind;
    use serde_json::json;

    fn doc() -> Document {
        let mut image = Component::new(ComponentKind::Image).with_id("image-1");
        image
            .content
            .insert("src".into(), json!("memory://assets/p/image-1/old.png"));
        Document::from_parts(vec![image], Vec::new(), Vec::new()).expect("valid")
    }

    #[test]
    fn test_image_fields_validated() {
        let image = Component::new(ComponentKind::Image);
        assert!(validate_image_field(&image, "src").is_ok());
        assert!(validate_image_field(&image, "alt").is_err());
        let testimonial = Component::new(ComponentKind::Testimonial);
        assert!(validate_image_field(&testimonial, "avatar").is_ok());
        let text = Component::new(ComponentKind::Text);
        assert!(validate_image_field(&text, "src").is_err());
    }

    #[test]
    fn test_success_replaces_value_and_clears_markers() {
        let id: ComponentId = "image-1".into();
        let uploading = mark_uploading(&doc(), &id).expect("mark");
        assert!(uploading.find_component(&id).expect("found").component.is_uploading());

        let (done, previous) =
            apply_upload_success(&uploading, &id, "src", "memory://assets/p/image-1/new.png")
                .expect("apply");
        let component = done.find_component(&id).expect("found").component;
        assert!(!component.is_uploading());
        assert_eq!(component.text_field("src"), Some("memory://assets/p/image-1/new.png"));
        assert_eq!(previous.as_deref(), Some("memory://assets/p/image-1/old.png"));
    }

    #[test]
    fn test_failure_keeps_durable_value() {
        let id: ComponentId = "image-1".into();
        let uploading = mark_uploading(&doc(), &id).expect("mark");
        let failed = apply_upload_failure(&uploading, &id, "quota exceeded").expect("apply");
        let component = failed.find_component(&id).expect("found").component;
        assert!(!component.is_uploading());
        assert!(component.has_upload_error());
        assert_eq!(component.text_field("uploadErrorMessage"), Some("quota exceeded"));
        assert_eq!(component.text_field("src"), Some("memory://assets/p/image-1/old.png"));

        let retried = mark_uploading(&failed, &id).expect("mark again");
        assert!(!retried.find_component(&id).expect("found").component.has_upload_error());
    }

    #[test]
    fn test_strip_stale_markers() {
        let marked = mark_uploading(&doc(), &"image-1".into()).expect("mark");
        let (clean, stripped) = strip_stale_markers(&marked);
        assert_eq!(stripped, 1);
        assert!(clean.flatten().iter().all(|c| !c.is_uploading()));
    }

    #[tokio::test]
    async fn test_spawned_upload_reports_event() {
        let store = Arc::new(MemoryAssetStore::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ticket = UploadTicket::new(
            UploadTarget::Component {
                id: "image-1".into(),
                field: "src".into(),
            },
            "p/image-1/a.png",
        );
        spawn_upload(store.clone(), ticket.clone(), vec![7], tx)
            .expect("spawn")
            .await
            .expect("task");
        let event = rx.recv().await.expect("event");
        assert_eq!(event.ticket, ticket);
        assert_eq!(event.outcome, Ok("memory://assets/p/image-1/a.png".to_string()));
        assert!(store.contains("p/image-1/a.png"));
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let ticket = UploadTicket::new(UploadTarget::Background, "p/bg.png");
        let result = spawn_upload(Arc::new(MemoryAssetStore::new()), ticket, vec![1], tx);
        assert!(matches!(result, Err(EngineError::Upload(_))));
    }
}
