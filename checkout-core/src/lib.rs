//! # Checkout Core
//!
//! Composition engine for drag-and-drop payment checkout pages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   Editor                    │
//! ├─────────────────────────────────────────────┤
//! │  Document        │  Design                  │
//! │  - Slots, rows   │  - Presets, palette      │
//! │  - Mutations     │  - Layered resolution    │
//! │  - Selection     │  - Legacy fields         │
//! ├─────────────────────────────────────────────┤
//! │  Uploads         │  Save protocol           │
//! │  - Async tasks   │  - Dirty tracking        │
//! │  - Markers       │  - Asset cleanup         │
//! ├─────────────────────────────────────────────┤
//! │  PersistenceStore │ AssetStore │ Presets    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Pure modules ([`document`], [`mutation`], [`resolver`], [`selection`])
//! never touch I/O. [`editor::Editor`] wires them to the store traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod component;
pub mod config;
pub mod design;
pub mod dnd;
pub mod document;
pub mod editor;
pub mod error;
pub mod form_cache;
pub mod mutation;
pub mod presets;
pub mod render;
pub mod resolver;
pub mod selection;
pub mod store;
pub mod sync;
pub mod upload;

pub use assets::{AssetStore, FileAssetStore, MemoryAssetStore};
pub use component::{Component, ComponentId, ComponentKind, Content};
pub use config::{DirtyPolicy, EditorConfig};
pub use design::{BackgroundImage, ColorPalette, DesignConfig, DesignLayer, LegacyDesignFields, Theme};
pub use dnd::DropRequest;
pub use document::{Column, ContainerRef, Document, Row, RowLayout};
pub use editor::{Editor, EditorStores};
pub use error::{EngineError, EngineResult, StoreError};
pub use form_cache::FormCache;
pub use mutation::{Applied, Direction, Limits, Mutation};
pub use presets::{BuiltinPresets, FontOption, Preset, PresetCatalog};
pub use render::RenderPage;
pub use resolver::DesignUpdate;
pub use selection::{Panel, Selection, SelectionController};
pub use store::{FilePageStore, MemoryPageStore, PageRecord, PageSnapshot, PersistenceStore};
pub use sync::{RefreshOutcome, SaveReport, SyncController};
pub use upload::{UploadEvent, UploadTarget, UploadTicket};

/// Checkout core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
