//! # Save Synchronization
//!
//! Bookkeeping for reconciling local edits with the persistence store.
//!
//! ## Save protocol
//!
//! ```text
//! 1. wait for in-flight uploads (bounded)    -> Timeout
//! 2. scan for blob:/data: references         -> Validation
//! 3. collect superseded asset paths
//! 4. commit design + containers              -> Persistence
//! 5. clear dirty, then best-effort cleanup of the paths from step 3
//! ```
//!
//! The async driving of these steps lives in [`crate::editor`]; this module
//! owns the state they read and write.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::upload::UploadTicket;

/// Result of a remote refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// State was reloaded from the store.
    Reloaded,
    /// Skipped because there are unsaved edits.
    SuppressedDirty,
    /// Skipped because a save is running.
    SuppressedSaving,
}

/// Summary of a successful save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    /// Uploads that finished while the save was waiting.
    pub uploads_awaited: usize,
    /// Superseded asset paths the cleanup was requested for.
    pub cleanup_requested: Vec<String>,
    /// Cleanup failure, if any. Never fails the save.
    pub cleanup_error: Option<String>,
    /// Whether edits made during the save left the session dirty.
    pub still_dirty: bool,
}

/// Dirty tracking, pending uploads and superseded assets for one session.
#[derive(Debug, Clone, Default)]
pub struct SyncController {
    dirty: bool,
    revision: u64,
    saving: bool,
    superseded: BTreeSet<String>,
    pending: HashMap<Uuid, UploadTicket>,
}

impl SyncController {
    /// Clean controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether there are unsaved edits.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a save is running.
    #[must_use]
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Monotonic edit counter.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Record an edit that should be saved.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    /// Record a state change that is not itself worth saving.
    pub fn touch(&mut self) {
        self.revision += 1;
    }

    pub(crate) fn set_saving(&mut self, saving: bool) {
        self.saving = saving;
    }

    /// Mark the commit of `revision` as durable.
    ///
    /// Dirty is only cleared when nothing changed since the snapshot was
    /// taken. Returns whether the session is still dirty.
    pub fn commit_succeeded(&mut self, revision: u64) -> bool {
        if self.revision == revision {
            self.dirty = false;
        }
        self.dirty
    }

    /// Forget all state after a reload.
    pub fn reset(&mut self) {
        self.dirty = false;
        self.revision += 1;
        self.superseded.clear();
    }

    /// Queue an asset path for deletion after the next successful save.
    pub fn supersede(&mut self, path: impl Into<String>) {
        let path = path.into();
        tracing::debug!(path = %path, "Asset superseded");
        self.superseded.insert(path);
    }

    /// Superseded paths, in path order.
    #[must_use]
    pub fn superseded(&self) -> Vec<String> {
        self.superseded.iter().cloned().collect()
    }

    /// Drop paths whose cleanup has been issued.
    pub fn clear_superseded(&mut self, paths: &[String]) {
        for path in paths {
            self.superseded.remove(path);
        }
    }

    /// Track a started upload.
    pub fn upload_started(&mut self, ticket: UploadTicket) {
        self.pending.insert(ticket.id, ticket);
    }

    /// Stop tracking an upload. Returns `false` for an unknown ticket.
    pub fn upload_finished(&mut self, ticket: &UploadTicket) -> bool {
        self.pending.remove(&ticket.id).is_some()
    }

    /// Number of uploads in flight.
    #[must_use]
    pub fn pending_uploads(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::UploadTarget;

    #[test]
    fn test_dirty_cleared_only_for_latest_revision() {
        let mut sync = SyncController::new();
        assert!(!sync.is_dirty());

        sync.mark_dirty();
        let snapshot = sync.revision();
        assert!(!sync.commit_succeeded(snapshot));

        sync.mark_dirty();
        let snapshot = sync.revision();
        sync.mark_dirty();
        assert!(sync.commit_succeeded(snapshot), "edit after snapshot keeps dirty");
    }

    #[test]
    fn test_superseded_paths_deduplicate() {
        let mut sync = SyncController::new();
        sync.supersede("p/a.png");
        sync.supersede("p/a.png");
        sync.supersede("p/b.png");
        assert_eq!(sync.superseded(), vec!["p/a.png", "p/b.png"]);

        sync.clear_superseded(&["p/a.png".to_string()]);
        assert_eq!(sync.superseded(), vec!["p/b.png"]);
    }

    #[test]
    fn test_upload_tracking() {
        let mut sync = SyncController::new();
        let ticket = UploadTicket::new(UploadTarget::Background, "p/bg.png");
        sync.upload_started(ticket.clone());
        assert_eq!(sync.pending_uploads(), 1);
        assert!(sync.upload_finished(&ticket));
        assert!(!sync.upload_finished(&ticket));
        assert_eq!(sync.pending_uploads(), 0);
    }

    #[test]
    fn test_reset_clears_dirty_and_superseded() {
        let mut sync = SyncController::new();
        sync.mark_dirty();
        sync.supersede("p/a.png");
        sync.reset();
        assert!(!sync.is_dirty());
        assert!(sync.superseded().is_empty());
    }
}
