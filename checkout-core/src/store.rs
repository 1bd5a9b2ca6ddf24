//! Page persistence.
//!
//! [`PersistenceStore`] is the seam to whatever database holds checkout
//! pages. Two implementations are provided: [`MemoryPageStore`] for tests and
//! embedding, and [`FilePageStore`] which keeps one pretty-printed JSON file
//! per page under a data directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::Component;
use crate::design::{DesignConfig, LegacyDesignFields};
use crate::document::{Document, Row};
use crate::error::StoreError;

/// A page as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    /// Composite design, possibly absent on pages from the older schema.
    #[serde(default)]
    pub design_blob: Option<Value>,
    /// Flat design columns.
    #[serde(default)]
    pub legacy_fields: LegacyDesignFields,
    /// Row grid.
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Top slot components.
    #[serde(default)]
    pub top_components: Vec<Component>,
    /// Bottom slot components.
    #[serde(default)]
    pub bottom_components: Vec<Component>,
    /// Last commit time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub updated_at: u64,
}

/// Everything written by one save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    /// Fully resolved design.
    pub design_blob: DesignConfig,
    /// Row grid.
    pub rows: Vec<Row>,
    /// Top slot components.
    pub top_components: Vec<Component>,
    /// Bottom slot components.
    pub bottom_components: Vec<Component>,
    /// Flat columns derived from the design for older readers.
    pub derived_legacy_fields: LegacyDesignFields,
}

impl PageSnapshot {
    /// Capture a document and design for commit.
    #[must_use]
    pub fn new(document: &Document, design: &DesignConfig) -> Self {
        Self {
            design_blob: design.clone(),
            rows: document.rows().to_vec(),
            top_components: document.top_slot().to_vec(),
            bottom_components: document.bottom_slot().to_vec(),
            derived_legacy_fields: crate::resolver::derive_legacy_fields(design),
        }
    }

    /// The record a store holds after committing this snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the design cannot be encoded.
    pub fn to_record(&self) -> Result<PageRecord, StoreError> {
        Ok(PageRecord {
            design_blob: Some(serde_json::to_value(&self.design_blob)?),
            legacy_fields: self.derived_legacy_fields.clone(),
            rows: self.rows.clone(),
            top_components: self.top_components.clone(),
            bottom_components: self.bottom_components.clone(),
            updated_at: current_timestamp_ms(),
        })
    }
}

/// Durable storage for checkout pages.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Load a page. Returns `Ok(None)` if the page has never been saved.
    async fn load(&self, page_id: &str) -> Result<Option<PageRecord>, StoreError>;

    /// Commit a page. Either the whole snapshot is written or nothing is.
    async fn save(&self, page_id: &str, snapshot: &PageSnapshot) -> Result<(), StoreError>;

    /// Ids of all stored pages.
    async fn list_pages(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory page store.
#[derive(Debug, Clone, Default)]
pub struct MemoryPageStore {
    pages: Arc<RwLock<HashMap<String, PageRecord>>>,
    reject_saves: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
}

impl MemoryPageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record directly, as another writer would.
    pub fn insert(&self, page_id: &str, record: PageRecord) {
        let mut pages = self
            .pages
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pages.insert(page_id.to_string(), record);
    }

    /// Read a record without going through the async trait.
    #[must_use]
    pub fn get(&self, page_id: &str) -> Option<PageRecord> {
        let pages = self
            .pages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pages.get(page_id).cloned()
    }

    /// Make subsequent saves fail with [`StoreError::Rejected`].
    pub fn set_reject_saves(&self, reject: bool) {
        self.reject_saves.store(reject, Ordering::SeqCst);
    }

    /// Number of successful commits.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceStore for MemoryPageStore {
    async fn load(&self, page_id: &str) -> Result<Option<PageRecord>, StoreError> {
        Ok(self.get(page_id))
    }

    async fn save(&self, page_id: &str, snapshot: &PageSnapshot) -> Result<(), StoreError> {
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected(format!("save of page {page_id} refused")));
        }
        let record = snapshot.to_record()?;
        self.insert(page_id, record);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_pages(&self) -> Result<Vec<String>, StoreError> {
        let pages = self
            .pages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut ids: Vec<String> = pages.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Filesystem page store: `{data_dir}/{page_id}.json`.
#[derive(Debug, Clone)]
pub struct FilePageStore {
    data_dir: PathBuf,
}

impl FilePageStore {
    /// Create a store rooted at `data_dir`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// Directory holding the page files.
    #[must_use]
    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    fn page_path(&self, page_id: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.json", sanitize_filename(page_id)))
    }
}

#[async_trait]
impl PersistenceStore for FilePageStore {
    async fn load(&self, page_id: &str) -> Result<Option<PageRecord>, StoreError> {
        let path = self.page_path(page_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: PageRecord = serde_json::from_str(&contents)?;
        Ok(Some(record))
    }

    async fn save(&self, page_id: &str, snapshot: &PageSnapshot) -> Result<(), StoreError> {
        let record = snapshot.to_record()?;
        let json = serde_json::to_string_pretty(&record)?;
        let path = self.page_path(page_id);
        // Write then rename so readers never see a half-written page.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(page = page_id, path = %path.display(), "Wrote page file");
        Ok(())
    }

    async fn list_pages(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Sanitize a page id for use as a filename.
///
/// Replaces any character that is not ASCII alphanumeric, `-`, or `_` with
/// `_`. The result never needs percent-encoding in a URL path.
pub(crate) fn sanitize_filename(page_id: &str) -> String {
    page_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
