pub mod check;
pub mod format;
pub mod init;
pub mod suggest;
pub mod tree;

pub use check::{check, CheckArgs};
pub use format::{format, FormatArgs};
pub use init::{init, InitArgs};
pub use suggest::{suggest, SuggestArgs};
pub use tree::{tree, TreeArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use flowtree_common::RealFileSystem;
use flowtree_editor::Document;
use std::path::Path;
use std::sync::Arc;

/// Loads a flow file relative to `cwd` with the configured catalogue
fn open_document(config: &Config, cwd: &Path, file: &Path) -> Result<Document> {
    let registry = Arc::new(config.registry(cwd)?);
    let path = cwd.join(file);
    Document::load(registry, config.codec(), &RealFileSystem, &path)
        .with_context(|| format!("Failed to open {}", file.display()))
}
