//! # Editing Session
//!
//! [`Editor`] is the entry point a host talks to. It owns the document, the
//! design, the selection and the sync state of one page, and drives uploads
//! and saves against the configured stores.
//!
//! ## Architecture
//!
//! ```text
//!  host events ──► Editor::apply ──► mutation::apply ──► Document'
//!                      │                                   │
//!                      ├──► SelectionController::revalidate│
//!                      └──► SyncController (dirty, assets) ◄┘
//!
//!  start_upload ──► tokio task ──► AssetStore::upload
//!                                     │ UploadEvent (mpsc)
//!  pump_uploads / save ◄──────────────┘
//!
//!  save ──► wait uploads ──► scan transient refs ──► PersistenceStore::save
//!                                                     └─► AssetStore::remove (best effort)
//! ```
//!
//! `Editor` is a cheap handle: clones share one session. Synchronous
//! operations hold the session lock only briefly and never across an await,
//! so edits stay possible while a save or an upload is running.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::assets::{self, AssetStore};
use crate::component::{Component, ComponentId, ComponentKind, Content};
use crate::config::EditorConfig;
use crate::design::{BackgroundImage, DesignConfig, DesignLayer};
use crate::dnd::DropRequest;
use crate::document::{ContainerRef, Document, RowLayout};
use crate::error::StoreError;
use crate::mutation::{self, Applied, Direction, Mutation};
use crate::presets::{FontOption, PresetCatalog};
use crate::render::{self, RenderPage};
use crate::resolver::{self, DesignUpdate};
use crate::selection::{Panel, Selection, SelectionController};
use crate::store::{PageRecord, PageSnapshot, PersistenceStore};
use crate::sync::{RefreshOutcome, SaveReport, SyncController};
use crate::upload::{self, UploadEvent, UploadTarget, UploadTicket};
use crate::{EngineError, EngineResult};

/// External collaborators of an editor.
#[derive(Clone)]
pub struct EditorStores {
    /// Page persistence.
    pub pages: Arc<dyn PersistenceStore>,
    /// Image storage.
    pub assets: Arc<dyn AssetStore>,
    /// Presets and fonts.
    pub presets: Arc<dyn PresetCatalog>,
}

impl EditorStores {
    /// Bundle the three stores.
    #[must_use]
    pub fn new(
        pages: Arc<dyn PersistenceStore>,
        assets: Arc<dyn AssetStore>,
        presets: Arc<dyn PresetCatalog>,
    ) -> Self {
        Self {
            pages,
            assets,
            presets,
        }
    }
}

impl std::fmt::Debug for EditorStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorStores").finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Session {
    document: Document,
    design: DesignConfig,
    selection: SelectionController,
    sync: SyncController,
}

struct Inner {
    page_id: String,
    config: EditorConfig,
    stores: EditorStores,
    overrides: Option<DesignLayer>,
    session: Mutex<Session>,
    save_lock: tokio::sync::Mutex<()>,
    events_tx: UnboundedSender<UploadEvent>,
    events_rx: tokio::sync::Mutex<UnboundedReceiver<UploadEvent>>,
}

/// Editing session for one checkout page.
#[derive(Clone)]
pub struct Editor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("page_id", &self.inner.page_id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Build a document and design from a stored page, or defaults.
fn materialize(
    record: Option<&PageRecord>,
    overrides: Option<&DesignLayer>,
) -> EngineResult<(Document, DesignConfig)> {
    let Some(record) = record else {
        let mut design = DesignConfig::default();
        if let Some(overrides) = overrides {
            design.apply_layer(overrides);
        }
        return Ok((Document::new(), design));
    };
    let design = resolver::resolve(overrides, record.design_blob.as_ref(), &record.legacy_fields);
    let document = Document::from_parts(
        record.top_components.clone(),
        record.bottom_components.clone(),
        record.rows.clone(),
    )?;
    let (document, stripped) = upload::strip_stale_markers(&document);
    if stripped > 0 {
        tracing::warn!(stripped, "Cleared upload markers left by an earlier session");
    }
    Ok((document, design))
}

fn persistence(e: StoreError) -> EngineError {
    EngineError::Persistence(e.to_string())
}

impl Editor {
    /// Start a session on a page that has not been loaded, with defaults.
    #[must_use]
    pub fn new(page_id: impl Into<String>, stores: EditorStores, config: EditorConfig) -> Self {
        Self::from_parts(page_id.into(), stores, config, None, Document::new(), DesignConfig::default())
    }

    /// Load a page and start a session on it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the store fails, or a
    /// validation error if the stored page breaks document invariants.
    pub async fn open(
        page_id: impl Into<String>,
        stores: EditorStores,
        config: EditorConfig,
    ) -> EngineResult<Self> {
        Self::open_with_overrides(page_id, stores, config, None).await
    }

    /// Like [`Editor::open`], with caller overrides layered over stored data.
    ///
    /// The overrides are reapplied on every reload.
    ///
    /// # Errors
    ///
    /// See [`Editor::open`].
    #[tracing::instrument(skip_all)]
    pub async fn open_with_overrides(
        page_id: impl Into<String>,
        stores: EditorStores,
        config: EditorConfig,
        overrides: Option<DesignLayer>,
    ) -> EngineResult<Self> {
        let page_id = page_id.into();
        let record = stores.pages.load(&page_id).await.map_err(persistence)?;
        let (document, design) = materialize(record.as_ref(), overrides.as_ref())?;
        tracing::info!(
            page = %page_id,
            found = record.is_some(),
            components = document.component_count(),
            rows = document.rows().len(),
            "Opened page"
        );
        Ok(Self::from_parts(page_id, stores, config, overrides, document, design))
    }

    fn from_parts(
        page_id: String,
        stores: EditorStores,
        config: EditorConfig,
        overrides: Option<DesignLayer>,
        document: Document,
        design: DesignConfig,
    ) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                page_id,
                config,
                stores,
                overrides,
                session: Mutex::new(Session {
                    document,
                    design,
                    selection: SelectionController::new(),
                    sync: SyncController::new(),
                }),
                save_lock: tokio::sync::Mutex::new(()),
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
            }),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Page being edited.
    #[must_use]
    pub fn page_id(&self) -> &str {
        &self.inner.page_id
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.inner.config
    }

    /// Copy of the current document.
    #[must_use]
    pub fn document(&self) -> Document {
        self.session().document.clone()
    }

    /// Copy of the current design.
    #[must_use]
    pub fn design(&self) -> DesignConfig {
        self.session().design.clone()
    }

    /// All components in render order.
    #[must_use]
    pub fn flatten(&self) -> Vec<Component> {
        self.session()
            .document
            .flatten()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Projection for a presentation layer.
    #[must_use]
    pub fn render(&self) -> RenderPage {
        let session = self.session();
        render::project(&session.document, &session.design, &session.selection)
    }

    /// Whether there are unsaved edits.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.session().sync.is_dirty()
    }

    /// Whether a save is running.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.session().sync.is_saving()
    }

    /// Uploads still in flight.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.session().sync.pending_uploads()
    }

    /// Asset paths queued for deletion after the next save.
    #[must_use]
    pub fn superseded_assets(&self) -> Vec<String> {
        self.session().sync.superseded()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    fn owned_asset_path(&self, value: &str) -> Option<String> {
        if value.is_empty() || assets::is_transient_ref(value) {
            return None;
        }
        self.inner.stores.assets.path_for_url(value)
    }

    /// Store paths the document or design still points at.
    fn referenced_asset_paths(&self, document: &Document, design: &DesignConfig) -> HashSet<String> {
        document
            .flatten()
            .into_iter()
            .flat_map(|component| self.image_paths(component))
            .chain(
                design
                    .background_image
                    .as_ref()
                    .and_then(|bg| self.owned_asset_path(&bg.url)),
            )
            .collect()
    }

    fn image_paths(&self, component: &Component) -> Vec<String> {
        component
            .kind
            .image_fields()
            .iter()
            .filter_map(|field| component.text_field(field))
            .filter_map(|value| self.owned_asset_path(value))
            .collect()
    }

    /// Apply a mutation to the document.
    ///
    /// # Errors
    ///
    /// Returns the mutation's error; the document is left unchanged.
    pub fn apply(&self, mutation: &Mutation) -> EngineResult<Applied> {
        let mut guard = self.session();
        let session = &mut *guard;
        let applied = mutation::apply(&session.document, mutation, &self.inner.config.limits())
            .inspect_err(|e| {
                tracing::debug!(action = mutation.name(), error = %e, "Mutation rejected");
            })?;

        for removed in &applied.removed {
            for path in self.image_paths(removed) {
                session.sync.supersede(path);
            }
        }
        if let Mutation::UpdateContent { id, .. } = mutation {
            let before = session.document.find_component(id)?.component;
            let after = applied.document.find_component(id)?.component;
            let kept: Vec<String> = self.image_paths(after);
            for path in self.image_paths(before) {
                if !kept.contains(&path) {
                    session.sync.supersede(path);
                }
            }
        }

        if applied.changed && self.inner.config.dirty_policy.marks_dirty(mutation) {
            session.sync.mark_dirty();
        } else {
            session.sync.touch();
        }
        session.document = applied.document.clone();
        session.selection.revalidate(&session.document);
        Ok(applied)
    }

    /// Insert a component into a container. Returns its id.
    ///
    /// # Errors
    ///
    /// See [`mutation::insert`].
    pub fn insert(&self, component: Component, target: ContainerRef) -> EngineResult<ComponentId> {
        let id = component.id.clone();
        self.apply(&Mutation::Insert { component, target })?;
        Ok(id)
    }

    /// Insert a new component of `kind` with default content.
    ///
    /// # Errors
    ///
    /// See [`mutation::insert`].
    pub fn insert_new(&self, kind: ComponentKind, target: ContainerRef) -> EngineResult<ComponentId> {
        self.insert(Component::new(kind), target)
    }

    /// Move a component to the end of `target`.
    ///
    /// # Errors
    ///
    /// See [`mutation::move_component`].
    pub fn move_component(&self, id: &ComponentId, target: ContainerRef) -> EngineResult<()> {
        self.apply(&Mutation::Move {
            id: id.clone(),
            target,
        })
        .map(|_| ())
    }

    /// Duplicate a component. Returns the copy's id.
    ///
    /// # Errors
    ///
    /// See [`mutation::duplicate`].
    pub fn duplicate(&self, id: &ComponentId) -> EngineResult<ComponentId> {
        let applied = self.apply(&Mutation::Duplicate { id: id.clone() })?;
        applied
            .created
            .ok_or_else(|| EngineError::ComponentNotFound(id.to_string()))
    }

    /// Swap a component with its neighbour. Returns whether it moved.
    ///
    /// # Errors
    ///
    /// See [`mutation::reorder`].
    pub fn reorder(&self, id: &ComponentId, direction: Direction) -> EngineResult<bool> {
        self.apply(&Mutation::Reorder {
            id: id.clone(),
            direction,
        })
        .map(|applied| applied.changed)
    }

    /// Remove a component.
    ///
    /// # Errors
    ///
    /// See [`mutation::remove`].
    pub fn remove(&self, id: &ComponentId) -> EngineResult<()> {
        self.apply(&Mutation::Remove { id: id.clone() }).map(|_| ())
    }

    /// Merge content into a component.
    ///
    /// # Errors
    ///
    /// See [`mutation::update_content`].
    pub fn update_content(&self, id: &ComponentId, content: Content) -> EngineResult<()> {
        self.apply(&Mutation::UpdateContent {
            id: id.clone(),
            content,
        })
        .map(|_| ())
    }

    /// Append a row. Returns its id.
    ///
    /// # Errors
    ///
    /// See [`mutation::add_row`].
    pub fn add_row(&self, layout: RowLayout) -> EngineResult<String> {
        let applied = self.apply(&Mutation::AddRow { layout })?;
        applied
            .created_row
            .ok_or_else(|| EngineError::Validation("row was not created".into()))
    }

    /// Remove a row and its components.
    ///
    /// # Errors
    ///
    /// See [`mutation::remove_row`].
    pub fn remove_row(&self, row_id: &str) -> EngineResult<()> {
        self.apply(&Mutation::RemoveRow {
            row_id: row_id.to_string(),
        })
        .map(|_| ())
    }

    /// Handle a drag-and-drop.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed ids, or the error of the
    /// resulting insert or move.
    pub fn drop_item(&self, request: &DropRequest) -> EngineResult<Applied> {
        let mutation = request.to_mutation()?;
        self.apply(&mutation)
    }

    // -----------------------------------------------------------------------
    // Design
    // -----------------------------------------------------------------------

    /// Apply a design edit.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed color path.
    pub fn update_design(&self, update: &DesignUpdate) -> EngineResult<()> {
        let mut session = self.session();
        let next = update.apply(&session.design)?;
        let previous_url = session.design.background_image.as_ref().map(|bg| bg.url.clone());
        let next_url = next.background_image.as_ref().map(|bg| bg.url.clone());
        if previous_url != next_url {
            if let Some(path) = previous_url.and_then(|url| self.owned_asset_path(&url)) {
                session.sync.supersede(path);
            }
        }
        tracing::debug!(theme = %next.theme, "Design updated");
        session.design = next;
        session.sync.mark_dirty();
        Ok(())
    }

    /// Apply a preset from the catalog by name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an unknown preset and
    /// [`EngineError::Persistence`] if the catalog fails.
    pub async fn apply_preset(&self, name: &str) -> EngineResult<()> {
        let preset = self
            .inner
            .stores
            .presets
            .get_preset(name)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => EngineError::Validation(format!("unknown preset: {name}")),
                other => persistence(other),
            })?;
        self.update_design(&DesignUpdate::ApplyPreset { preset })
    }

    /// Edit one color. The theme becomes `custom`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed path.
    pub fn set_color(&self, path: &str, value: &str) -> EngineResult<()> {
        self.update_design(&DesignUpdate::SetColor {
            path: path.to_string(),
            value: value.to_string(),
        })
    }

    /// Change the font.
    ///
    /// # Errors
    ///
    /// Infallible in practice; returns `Result` like the other design edits.
    pub fn set_font(&self, font: &str) -> EngineResult<()> {
        self.update_design(&DesignUpdate::SetFont {
            font: font.to_string(),
        })
    }

    /// Set or clear the background image.
    ///
    /// # Errors
    ///
    /// Infallible in practice; returns `Result` like the other design edits.
    pub fn set_background_image(&self, image: Option<BackgroundImage>) -> EngineResult<()> {
        self.update_design(&DesignUpdate::SetBackgroundImage { image })
    }

    /// Fonts offered by the preset catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the catalog fails.
    pub async fn fonts(&self) -> EngineResult<Vec<FontOption>> {
        self.inner
            .stores
            .presets
            .list_fonts()
            .await
            .map_err(persistence)
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> Selection {
        self.session().selection.current().clone()
    }

    /// Visible edit panel.
    #[must_use]
    pub fn panel(&self) -> Panel {
        self.session().selection.panel()
    }

    /// Active column index.
    #[must_use]
    pub fn active_column(&self) -> usize {
        self.session().selection.active_column()
    }

    /// Open a component in the editor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ComponentNotFound`] for an unknown id.
    pub fn select_component(&self, id: &ComponentId) -> EngineResult<()> {
        let mut guard = self.session();
        let session = &mut *guard;
        session.selection.select_component(&session.document, id)
    }

    /// Select a row.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RowNotFound`] for an unknown row.
    pub fn select_row(&self, row_id: &str) -> EngineResult<()> {
        let mut guard = self.session();
        let session = &mut *guard;
        session.selection.select_row(&session.document, row_id)
    }

    /// Select a row column.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown row or column.
    pub fn select_column(&self, row_id: &str, column: usize) -> EngineResult<()> {
        let mut guard = self.session();
        let session = &mut *guard;
        session.selection.select_column(&session.document, row_id, column)
    }

    /// Close the edit panel.
    pub fn back(&self) {
        self.session().selection.back();
    }

    // -----------------------------------------------------------------------
    // Uploads
    // -----------------------------------------------------------------------

    /// Upload an image into a component field.
    ///
    /// The component is flagged `uploading` until the upload is applied by
    /// [`Editor::pump_uploads`] or a save.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown component, a validation
    /// error for a non-image field, or [`EngineError::Upload`] outside a
    /// tokio runtime.
    pub fn start_upload(
        &self,
        id: &ComponentId,
        field: &str,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> EngineResult<UploadTicket> {
        let mut session = self.session();
        let found = session.document.find_component(id)?;
        upload::validate_image_field(found.component, field)?;

        let ticket = UploadTicket::new(
            UploadTarget::Component {
                id: id.clone(),
                field: field.to_string(),
            },
            assets::asset_path(&self.inner.page_id, id.as_str(), file_name),
        );
        upload::spawn_upload(
            Arc::clone(&self.inner.stores.assets),
            ticket.clone(),
            bytes,
            self.inner.events_tx.clone(),
        )?;

        session.document = upload::mark_uploading(&session.document, id)?;
        session.sync.upload_started(ticket.clone());
        session.sync.touch();
        tracing::info!(component = %id, field, path = %ticket.path, "Upload started");
        Ok(ticket)
    }

    /// Upload the payload of a `data:` URL into a component field.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upload`] for a malformed data URL, otherwise
    /// as [`Editor::start_upload`].
    pub fn upload_data_url(&self, id: &ComponentId, field: &str, data_url: &str) -> EngineResult<UploadTicket> {
        let (mime, bytes) =
            assets::decode_data_url(data_url).map_err(|e| EngineError::Upload(e.to_string()))?;
        let ext = mime.rsplit('/').next().unwrap_or("bin");
        self.start_upload(id, field, bytes, &format!("upload.{ext}"))
    }

    /// Upload a new page background image.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Upload`] outside a tokio runtime.
    pub fn start_background_upload(&self, bytes: Vec<u8>, file_name: &str) -> EngineResult<UploadTicket> {
        let mut session = self.session();
        let ticket = UploadTicket::new(
            UploadTarget::Background,
            assets::asset_path(&self.inner.page_id, "background", file_name),
        );
        upload::spawn_upload(
            Arc::clone(&self.inner.stores.assets),
            ticket.clone(),
            bytes,
            self.inner.events_tx.clone(),
        )?;
        session.sync.upload_started(ticket.clone());
        tracing::info!(path = %ticket.path, "Background upload started");
        Ok(ticket)
    }

    fn apply_upload_event(&self, event: UploadEvent) {
        let mut guard = self.session();
        let session = &mut *guard;
        let UploadEvent { ticket, outcome } = event;

        if !session.sync.upload_finished(&ticket) {
            tracing::debug!(path = %ticket.path, "Ignoring upload from a previous session state");
            if outcome.is_ok() {
                session.sync.supersede(ticket.path);
            }
            return;
        }

        match (ticket.target, outcome) {
            (UploadTarget::Component { id, field }, Ok(url)) => {
                match upload::apply_upload_success(&session.document, &id, &field, &url) {
                    Ok((document, previous)) => {
                        if let Some(path) = previous.and_then(|v| self.owned_asset_path(&v)) {
                            session.sync.supersede(path);
                        }
                        session.document = document;
                        session.sync.mark_dirty();
                    }
                    Err(EngineError::ComponentNotFound(_)) => {
                        tracing::debug!(component = %id, "Upload finished for a removed component");
                        session.sync.supersede(ticket.path);
                    }
                    Err(e) => {
                        tracing::warn!(component = %id, error = %e, "Could not apply finished upload");
                        session.sync.supersede(ticket.path);
                    }
                }
            }
            (UploadTarget::Component { id, .. }, Err(message)) => {
                tracing::warn!(component = %id, error = %message, "Upload failed");
                if let Ok(document) = upload::apply_upload_failure(&session.document, &id, &message) {
                    session.document = document;
                    session.sync.touch();
                }
            }
            (UploadTarget::Background, Ok(url)) => {
                let previous = session.design.background_image.clone();
                if let Some(path) = previous.as_ref().and_then(|bg| self.owned_asset_path(&bg.url)) {
                    session.sync.supersede(path);
                }
                let image = match previous {
                    Some(bg) => BackgroundImage { url, ..bg },
                    None => BackgroundImage::new(url),
                };
                session.design = resolver::set_background_image(&session.design, Some(image));
                session.sync.mark_dirty();
            }
            (UploadTarget::Background, Err(message)) => {
                tracing::warn!(error = %message, "Background upload failed");
            }
        }
    }

    fn uploads_pending(&self) -> bool {
        let session = self.session();
        session.sync.pending_uploads() > 0
            || session
                .document
                .flatten()
                .iter()
                .any(|component| component.is_uploading())
    }

    /// Apply finished uploads. Returns how many were applied.
    ///
    /// Does nothing while a save is draining uploads itself.
    pub fn pump_uploads(&self) -> usize {
        let Ok(mut events) = self.inner.events_rx.try_lock() else {
            return 0;
        };
        let mut applied = 0;
        while let Ok(event) = events.try_recv() {
            self.apply_upload_event(event);
            applied += 1;
        }
        applied
    }

    async fn wait_for_uploads(&self) -> usize {
        let mut events = self.inner.events_rx.lock().await;
        let mut applied = 0;
        loop {
            while let Ok(event) = events.try_recv() {
                self.apply_upload_event(event);
                applied += 1;
            }
            if !self.uploads_pending() {
                return applied;
            }
            match events.recv().await {
                Some(event) => {
                    self.apply_upload_event(event);
                    applied += 1;
                }
                None => return applied,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Save and refresh
    // -----------------------------------------------------------------------

    /// Commit the page.
    ///
    /// Waits for in-flight uploads, refuses to commit transient references,
    /// writes design and containers in one store call, then requests cleanup
    /// of superseded assets. Only one save runs at a time.
    ///
    /// # Errors
    ///
    /// - [`EngineError::SaveInProgress`] if another save is running
    /// - [`EngineError::Timeout`] if uploads did not finish in time
    /// - [`EngineError::Validation`] if a transient reference remains
    /// - [`EngineError::Persistence`] if the store rejected the commit
    ///
    /// On any error nothing is written and the dirty flag is unchanged.
    #[tracing::instrument(skip(self), fields(page = %self.inner.page_id))]
    pub async fn save(&self) -> EngineResult<SaveReport> {
        let Ok(_guard) = self.inner.save_lock.try_lock() else {
            tracing::debug!("Save rejected: another save is running");
            return Err(EngineError::SaveInProgress);
        };
        self.session().sync.set_saving(true);
        let result = self.run_save().await;
        self.session().sync.set_saving(false);
        result
    }

    async fn run_save(&self) -> EngineResult<SaveReport> {
        let timeout = self.inner.config.upload_wait_timeout;
        let uploads_awaited = if let Ok(n) = tokio::time::timeout(timeout, self.wait_for_uploads()).await {
            n
        } else {
            tracing::warn!(?timeout, "Save aborted: uploads still running");
            return Err(EngineError::Timeout(timeout));
        };

        let (snapshot, revision, (superseded, retained)) = {
            let session = self.session();
            let transient = assets::find_transient_refs(&session.document, &session.design);
            if !transient.is_empty() {
                tracing::warn!(refs = ?transient, "Save blocked by unresolved local references");
                return Err(EngineError::Validation(format!(
                    "unresolved local references: {}",
                    transient.join(", ")
                )));
            }
            let in_use = self.referenced_asset_paths(&session.document, &session.design);
            let (retained, cleanup): (Vec<String>, Vec<String>) = session
                .sync
                .superseded()
                .into_iter()
                .partition(|path| in_use.contains(path));
            if !retained.is_empty() {
                tracing::debug!(paths = ?retained, "Keeping superseded assets still referenced");
            }
            (
                PageSnapshot::new(&session.document, &session.design),
                session.sync.revision(),
                (cleanup, retained),
            )
        };

        self.inner
            .stores
            .pages
            .save(&self.inner.page_id, &snapshot)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Commit rejected");
                persistence(e)
            })?;
        let still_dirty = self.session().sync.commit_succeeded(revision);

        let mut cleanup_error = None;
        if !superseded.is_empty() {
            if let Err(e) = self.inner.stores.assets.remove(&superseded).await {
                tracing::warn!(error = %e, paths = superseded.len(), "Asset cleanup failed");
                cleanup_error = Some(e.to_string());
            }
        }
        if !superseded.is_empty() || !retained.is_empty() {
            let mut session = self.session();
            session.sync.clear_superseded(&superseded);
            session.sync.clear_superseded(&retained);
        }

        tracing::info!(
            components = snapshot.top_components.len()
                + snapshot.bottom_components.len()
                + snapshot.rows.iter().map(|r| r.component_count()).sum::<usize>(),
            cleaned = superseded.len(),
            "Saved page"
        );
        Ok(SaveReport {
            uploads_awaited,
            cleanup_requested: superseded,
            cleanup_error,
            still_dirty,
        })
    }

    /// Reload from the store unless that would discard local work.
    ///
    /// Suppressed while dirty, while uploads are in flight, and while a
    /// save is running.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Persistence`] if the load fails; local state is
    /// kept.
    #[tracing::instrument(skip(self), fields(page = %self.inner.page_id))]
    pub async fn refresh(&self) -> EngineResult<RefreshOutcome> {
        let Ok(_guard) = self.inner.save_lock.try_lock() else {
            tracing::debug!("Refresh suppressed: save running");
            return Ok(RefreshOutcome::SuppressedSaving);
        };
        if self.has_local_work() {
            tracing::debug!("Refresh suppressed: unsaved edits");
            return Ok(RefreshOutcome::SuppressedDirty);
        }

        let record = self
            .inner
            .stores
            .pages
            .load(&self.inner.page_id)
            .await
            .map_err(persistence)?;
        let (document, design) = materialize(record.as_ref(), self.inner.overrides.as_ref())?;

        if self.has_local_work() {
            return Ok(RefreshOutcome::SuppressedDirty);
        }
        let mut guard = self.session();
        let session = &mut *guard;
        session.document = document;
        session.design = design;
        session.sync.reset();
        session.selection.revalidate(&session.document);
        tracing::info!("Reloaded page from store");
        Ok(RefreshOutcome::Reloaded)
    }

    fn has_local_work(&self) -> bool {
        let dirty = self.session().sync.is_dirty();
        dirty || self.uploads_pending()
    }
}

/// Content map from a JSON object; anything else yields an empty map.
#[must_use]
pub fn content_from_json(value: Value) -> Content {
    match value {
        Value::Object(map) => map,
        _ => Content::new(),
    }
}
