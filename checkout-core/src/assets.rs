//! Asset storage and transient references.
//!
//! Uploaded images live in an [`AssetStore`] and are referenced from
//! component content by public URL. Before an upload finishes the host may
//! show a local preview through a `blob:` or `data:` reference; such values
//! are *transient* and must never reach the persistence store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::join_all;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::component::Component;
use crate::design::DesignConfig;
use crate::document::Document;
use crate::error::StoreError;
use crate::store::sanitize_filename;

/// URL schemes that only resolve inside the editing session.
pub const TRANSIENT_SCHEMES: [&str; 2] = ["blob:", "data:"];

/// Object storage for uploaded images.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `bytes` at `path` and return its public URL.
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, StoreError>;

    /// Public URL for a stored path.
    fn public_url(&self, path: &str) -> String;

    /// Map a public URL back to its store path, if it belongs to this store.
    fn path_for_url(&self, url: &str) -> Option<String>;

    /// Delete stored objects.
    async fn remove(&self, paths: &[String]) -> Result<(), StoreError>;
}

/// Whether `value` is a session-local reference.
#[must_use]
pub fn is_transient_ref(value: &str) -> bool {
    TRANSIENT_SCHEMES
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

fn scan_value(value: &Value, path: &str, out: &mut Vec<String>) {
    match value {
        Value::String(s) if is_transient_ref(s) => out.push(path.to_string()),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_value(item, &format!("{path}[{i}]"), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                scan_value(item, &format!("{path}.{key}"), out);
            }
        }
        _ => {}
    }
}

/// Content paths of `component` holding transient references.
#[must_use]
pub fn transient_refs(component: &Component) -> Vec<String> {
    let mut out = Vec::new();
    for (key, value) in &component.content {
        scan_value(value, &format!("{}.{key}", component.id), &mut out);
    }
    out
}

/// Every transient reference left in a document and its design.
#[must_use]
pub fn find_transient_refs(document: &Document, design: &DesignConfig) -> Vec<String> {
    let mut out: Vec<String> = document
        .flatten()
        .into_iter()
        .flat_map(transient_refs)
        .collect();
    if let Some(background) = &design.background_image {
        if is_transient_ref(&background.url) {
            out.push("design.backgroundImage.url".to_string());
        }
    }
    out
}

/// Decode a `data:` URL into its media type and bytes.
///
/// # Errors
///
/// Returns [`StoreError::Rejected`] for anything that is not a well-formed
/// `data:` URL.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), StoreError> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| StoreError::Rejected("not a data URL".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| StoreError::Rejected("data URL without payload".into()))?;
    let (mime, is_base64) = match meta.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (meta, false),
    };
    let mime = if mime.is_empty() {
        "text/plain".to_string()
    } else {
        mime.to_string()
    };
    let bytes = if is_base64 {
        STANDARD
            .decode(payload)
            .map_err(|e| StoreError::Rejected(format!("invalid base64 payload: {e}")))?
    } else {
        payload.as_bytes().to_vec()
    };
    Ok((mime, bytes))
}

/// Storage path for a new upload: `{pageId}/{componentId}/{uuid}.{ext}`.
#[must_use]
pub fn asset_path(page_id: &str, owner: &str, file_name: &str) -> String {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map_or_else(|| "bin".to_string(), str::to_ascii_lowercase);
    format!(
        "{}/{}/{}.{ext}",
        sanitize_filename(page_id),
        sanitize_filename(owner),
        Uuid::new_v4().simple()
    )
}

/// In-memory asset store.
///
/// Optionally delays uploads and can be told to fail them, which makes it
/// useful for exercising the save protocol.
#[derive(Debug, Clone)]
pub struct MemoryAssetStore {
    base_url: String,
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    latency: Duration,
    fail_uploads: Arc<AtomicBool>,
    fail_removals: Arc<AtomicBool>,
}

impl Default for MemoryAssetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAssetStore {
    /// Create an empty store with `memory://assets/` URLs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: "memory://assets/".to_string(),
            objects: Arc::new(RwLock::new(HashMap::new())),
            latency: Duration::ZERO,
            fail_uploads: Arc::new(AtomicBool::new(false)),
            fail_removals: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Delay every upload by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make uploads fail.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make removals fail.
    pub fn set_fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    /// Whether an object exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(path)
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, StoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected(format!("upload to {path} refused")));
        }
        self.objects
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.to_string(), bytes);
        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.base_url)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StoreError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("removal refused".into()));
        }
        let mut objects = self
            .objects
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }
}

/// Filesystem asset store serving files under a public base URL.
#[derive(Debug, Clone)]
pub struct FileAssetStore {
    root: PathBuf,
    base_url: Url,
}

impl FileAssetStore {
    /// Create a store writing under `root` and publishing under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if `root` cannot be created, or
    /// [`StoreError::Rejected`] if `base_url` cannot be a base.
    pub fn new(root: impl Into<PathBuf>, base_url: &Url) -> Result<Self, StoreError> {
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Rejected(format!("{base_url} cannot be a base URL")));
        }
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let mut base_url = base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { root, base_url })
    }

    fn file_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(StoreError::Rejected(format!("invalid asset path: {path}")));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl AssetStore for FileAssetStore {
    async fn upload(&self, bytes: Vec<u8>, path: &str) -> Result<String, StoreError> {
        let file = self.file_path(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, bytes).await?;
        tracing::debug!(path, "Stored asset");
        Ok(self.public_url(path))
    }

    fn public_url(&self, path: &str) -> String {
        self.base_url
            .join(path)
            .map_or_else(|_| format!("{}{path}", self.base_url), String::from)
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(self.base_url.as_str())
            .filter(|path| !path.is_empty())
            .map(str::to_string)
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StoreError> {
        let removals = paths.iter().map(|path| async move {
            let file = self.file_path(path)?;
            match tokio::fs::remove_file(&file).await {
                Ok(()) => Ok::<(), StoreError>(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::Io(e)),
            }
        });
        let results: Vec<Result<(), StoreError>> = join_all(removals).await;
        results.into_iter().collect()
    }
}
