//! # Checkout Studio
//!
//! Command-line host for the checkout composition engine.
//!
//! Pages are JSON files under `<data-dir>/pages`, uploaded images live under
//! `<data-dir>/assets` and are addressed through `--asset-base-url`.
//!
//! ## Usage
//!
//! ```bash
//! checkout-studio init summer-sale
//! checkout-studio drop summer-sale palette:text top
//! checkout-studio apply summer-sale '{"action":"add_row","layout":"two-columns"}'
//! checkout-studio design summer-sale --preset dark
//! checkout-studio upload summer-sale image-1a2b3c4d ./hero.png
//! checkout-studio show summer-sale
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `Studio` - Stores and editor settings shared by every command
//! - `Studio::run` - Opens an editor, applies the command, saves if needed

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use checkout_core::{
    BuiltinPresets, DesignUpdate, DropRequest, Editor, EditorConfig, EditorStores,
    FileAssetStore, FilePageStore, Mutation, PresetCatalog, RenderPage, SaveReport,
};
use clap::{Parser, Subcommand};
use url::Url;

/// Default directory holding pages and assets.
pub const DEFAULT_DATA_DIR: &str = "./studio-data";

/// Default public base URL of uploaded assets.
pub const DEFAULT_ASSET_BASE_URL: &str = "http://localhost:8787/assets/";

/// Command-line arguments for checkout-studio.
#[derive(Debug, Clone, Parser)]
#[command(name = "checkout-studio")]
#[command(about = "Compose checkout pages from the command line")]
#[command(version)]
pub struct CliArgs {
    /// Directory holding pages and assets
    #[arg(long, env = "CHECKOUT_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Public base URL under which assets are served
    #[arg(long, env = "CHECKOUT_ASSET_BASE_URL", default_value = DEFAULT_ASSET_BASE_URL)]
    pub asset_base_url: Url,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Studio subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create an empty page with the default design
    Init {
        /// Page id
        page: String,
    },
    /// Print a page outline
    Show {
        /// Page id
        page: String,
        /// Print the render projection as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a mutation given as JSON and save
    Apply {
        /// Page id
        page: String,
        /// Mutation, e.g. `{"action":"remove","id":"text-1a2b3c4d"}`
        mutation: String,
    },
    /// Drop a palette block or an existing component into a container and save
    Drop {
        /// Page id
        page: String,
        /// `palette:{type}` or a component id
        dragged: String,
        /// `top`, `bottom` or `{rowId}:{columnIndex}`
        target: String,
    },
    /// Edit the page design and save
    Design {
        /// Page id
        page: String,
        /// Apply a named preset
        #[arg(long, conflicts_with = "update")]
        preset: Option<String>,
        /// Apply a design update given as JSON
        #[arg(long)]
        update: Option<String>,
    },
    /// Upload an image into a component field and save
    Upload {
        /// Page id
        page: String,
        /// Component id
        component: String,
        /// Image file
        file: PathBuf,
        /// Content field receiving the URL
        #[arg(long, default_value = "src")]
        field: String,
    },
    /// List presets and fonts
    Presets,
    /// List stored pages
    List,
}

/// Stores and settings shared by every command.
#[derive(Debug, Clone)]
pub struct Studio {
    stores: EditorStores,
    config: EditorConfig,
}

impl Studio {
    /// Set up file stores under `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created or the base URL
    /// cannot hold paths.
    pub fn new(data_dir: &Path, asset_base_url: &Url, config: EditorConfig) -> anyhow::Result<Self> {
        let pages =
            FilePageStore::new(data_dir.join("pages")).context("Failed to open page store")?;
        let assets = FileAssetStore::new(data_dir.join("assets"), asset_base_url)
            .context("Failed to open asset store")?;
        let stores = EditorStores::new(
            Arc::new(pages),
            Arc::new(assets),
            Arc::new(BuiltinPresets::new()),
        );
        Ok(Self { stores, config })
    }

    /// Build a studio from parsed arguments and `CHECKOUT_*` variables.
    ///
    /// # Errors
    ///
    /// See [`Studio::new`].
    pub fn from_args(args: &CliArgs) -> anyhow::Result<Self> {
        Self::new(&args.data_dir, &args.asset_base_url, EditorConfig::from_env())
    }

    async fn open(&self, page: &str) -> anyhow::Result<Editor> {
        Editor::open(page, self.stores.clone(), self.config.clone())
            .await
            .with_context(|| format!("Failed to open page {page}"))
    }

    /// Run one command. Returns the text to print.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be opened, the input is malformed,
    /// the edit is rejected or the save fails.
    pub async fn run(&self, command: Command) -> anyhow::Result<String> {
        match command {
            Command::Init { page } => {
                let editor = self.open(&page).await?;
                let report = editor.save().await?;
                Ok(format!("Initialized {page}\n{}", describe_save(&report)))
            }
            Command::Show { page, json } => {
                let editor = self.open(&page).await?;
                let render = editor.render();
                if json {
                    Ok(serde_json::to_string_pretty(&render)?)
                } else {
                    Ok(outline(&page, &render))
                }
            }
            Command::Apply { page, mutation } => {
                let mutation: Mutation =
                    serde_json::from_str(&mutation).context("Invalid mutation JSON")?;
                let editor = self.open(&page).await?;
                let applied = editor.apply(&mutation)?;
                let mut out = format!("Applied {}", mutation.name());
                if let Some(id) = applied.created {
                    let _ = write!(out, " (created {id})");
                }
                if let Some(row) = applied.created_row {
                    let _ = write!(out, " (created row {row})");
                }
                self.finish(&editor, out).await
            }
            Command::Drop {
                page,
                dragged,
                target,
            } => {
                let editor = self.open(&page).await?;
                let applied = editor.drop_item(&DropRequest::new(dragged.as_str(), target.as_str()))?;
                let out = match applied.created {
                    Some(id) => format!("Inserted {id} into {target}"),
                    None => format!("Moved {dragged} to {target}"),
                };
                self.finish(&editor, out).await
            }
            Command::Design {
                page,
                preset,
                update,
            } => {
                let editor = self.open(&page).await?;
                match (preset, update) {
                    (Some(name), _) => editor.apply_preset(&name).await?,
                    (None, Some(update)) => {
                        let update: DesignUpdate =
                            serde_json::from_str(&update).context("Invalid design update JSON")?;
                        editor.update_design(&update)?;
                    }
                    (None, None) => anyhow::bail!("Pass --preset or --update"),
                }
                let out = format!("Design is now {}", editor.design().theme);
                self.finish(&editor, out).await
            }
            Command::Upload {
                page,
                component,
                file,
                field,
            } => {
                let bytes = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let file_name = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("upload.bin")
                    .to_string();
                let editor = self.open(&page).await?;
                let ticket = editor.start_upload(&component.as_str().into(), &field, bytes, &file_name)?;
                let out = format!("Uploaded {} to {}", file.display(), ticket.path);
                self.finish(&editor, out).await
            }
            Command::Presets => {
                let catalog = &self.stores.presets;
                let mut out = String::from("Presets:\n");
                for name in catalog.list_presets().await? {
                    let _ = writeln!(out, "  {name}");
                }
                out.push_str("Fonts:\n");
                for font in catalog.list_fonts().await? {
                    let _ = writeln!(out, "  {} ({})", font.value, font.label);
                }
                Ok(out)
            }
            Command::List => {
                let pages = self.stores.pages.list_pages().await?;
                Ok(pages.join("\n"))
            }
        }
    }

    async fn finish(&self, editor: &Editor, mut out: String) -> anyhow::Result<String> {
        let report = editor.save().await.context("Save failed")?;
        out.push('\n');
        out.push_str(&describe_save(&report));
        Ok(out)
    }
}

fn describe_save(report: &SaveReport) -> String {
    let mut out = String::from("Saved");
    if report.uploads_awaited > 0 {
        let _ = write!(out, " after {} upload(s)", report.uploads_awaited);
    }
    if !report.cleanup_requested.is_empty() {
        let _ = write!(out, ", removed {} old asset(s)", report.cleanup_requested.len());
    }
    if let Some(error) = &report.cleanup_error {
        let _ = write!(out, " (cleanup failed: {error})");
    }
    out
}

/// Plain-text outline of a page.
#[must_use]
pub fn outline(page: &str, render: &RenderPage) -> String {
    let mut out = format!(
        "Page {page} - theme {}, font {}\n",
        render.design.theme, render.design.font
    );
    for block in &render.blocks {
        let _ = writeln!(out, "[{}]", block.key);
        for column in &block.columns {
            if block.columns.len() > 1 {
                let _ = writeln!(out, "  {} (span {})", column.container_id, column.span);
            }
            for component in &column.components {
                let mut flags = String::new();
                if component.uploading {
                    flags.push_str(" uploading");
                }
                if component.upload_error {
                    flags.push_str(" upload-error");
                }
                let _ = writeln!(out, "    - {} {}{flags}", component.id, component.kind);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::{ComponentKind, MemoryPageStore, PersistenceStore};

    fn studio(dir: &Path) -> Studio {
        let base = Url::parse(DEFAULT_ASSET_BASE_URL).expect("url");
        Studio::new(dir, &base, EditorConfig::default()).expect("studio")
    }

    #[test]
    fn test_cli_defaults() {
        let args = CliArgs::try_parse_from(["checkout-studio", "show", "p1"]).expect("parse");
        assert_eq!(args.asset_base_url.as_str(), DEFAULT_ASSET_BASE_URL);
        assert!(matches!(args.command, Command::Show { json: false, .. }));
    }

    #[test]
    fn test_cli_rejects_preset_with_update() {
        let result = CliArgs::try_parse_from([
            "checkout-studio",
            "design",
            "p1",
            "--preset",
            "dark",
            "--update",
            "{}",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_init_drop_and_show() {
        let dir = tempfile::tempdir().expect("tempdir");
        let studio = studio(dir.path());

        studio
            .run(Command::Init { page: "p1".into() })
            .await
            .expect("init");
        let out = studio
            .run(Command::Drop {
                page: "p1".into(),
                dragged: "palette:timer".into(),
                target: "top".into(),
            })
            .await
            .expect("drop");
        assert!(out.starts_with("Inserted timer-"));

        let shown = studio
            .run(Command::Show {
                page: "p1".into(),
                json: false,
            })
            .await
            .expect("show");
        assert!(shown.contains("[top]"));
        assert!(shown.contains(" timer"));
        assert!(dir.path().join("pages").join("p1.json").exists());
    }

    #[tokio::test]
    async fn test_apply_mutation_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let studio = studio(dir.path());

        let out = studio
            .run(Command::Apply {
                page: "p1".into(),
                mutation: r#"{"action":"add_row","layout":"two-columns-asymmetric"}"#.into(),
            })
            .await
            .expect("apply");
        assert!(out.contains("created row"));

        let bad = studio
            .run(Command::Apply {
                page: "p1".into(),
                mutation: r#"{"action":"remove","id":"ghost"}"#.into(),
            })
            .await;
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn test_upload_writes_asset_and_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let studio = studio(dir.path());
        let image = dir.path().join("hero.png");
        std::fs::write(&image, [0x89, 0x50, 0x4E, 0x47]).expect("write image");

        let editor = studio.open("p1").await.expect("open");
        let id = editor
            .insert_new(ComponentKind::Image, checkout_core::ContainerRef::Top)
            .expect("insert");
        editor.save().await.expect("save");

        let out = studio
            .run(Command::Upload {
                page: "p1".into(),
                component: id.to_string(),
                file: image,
                field: "src".into(),
            })
            .await
            .expect("upload");
        assert!(out.contains("after 1 upload(s)"));

        let editor = studio.open("p1").await.expect("reopen");
        let src = editor.flatten()[0].text_field("src").map(str::to_string);
        let src = src.expect("src");
        assert!(src.starts_with("http://localhost:8787/assets/p1/"));
        assert!(src.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_design_preset_and_presets_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let studio = studio(dir.path());

        let out = studio
            .run(Command::Design {
                page: "p1".into(),
                preset: Some("dark".into()),
                update: None,
            })
            .await
            .expect("design");
        assert!(out.starts_with("Design is now dark"));

        let listing = studio.run(Command::Presets).await.expect("presets");
        assert!(listing.contains("light"));
        assert!(listing.contains("Fonts:"));

        let pages = studio.run(Command::List).await.expect("list");
        assert_eq!(pages, "p1");
    }

    #[tokio::test]
    async fn test_outline_marks_uploads() {
        let stores = EditorStores::new(
            Arc::new(MemoryPageStore::new()),
            Arc::new(checkout_core::MemoryAssetStore::new()),
            Arc::new(BuiltinPresets::new()),
        );
        let editor = Editor::new("p1", stores.clone(), EditorConfig::default());
        editor
            .insert_new(ComponentKind::Seal, checkout_core::ContainerRef::Bottom)
            .expect("insert");
        let text = outline("p1", &editor.render());
        assert!(text.starts_with("Page p1 - theme light"));
        assert!(text.contains("[bottom]"));
        assert!(stores.pages.list_pages().await.expect("list").is_empty());
    }
}
