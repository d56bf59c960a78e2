//! Error types for the editor

use crate::registry::CatalogueError;
use crate::snapshot::SnapshotError;
use crate::tree::TreeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Parse error: {0}")]
    Parse(#[from] flowtree_parser::ParseError),

    #[error("Catalogue error: {0}")]
    Catalogue(#[from] CatalogueError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Mutation error: {0}")]
    Mutation(#[from] crate::mutations::MutationError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("IO error: {0}")]
    Io(#[from] flowtree_common::CommonError),

    #[error("Document holds {0} top-level components, expected one")]
    MultipleRoots(usize),

    #[error("Document is not file-backed")]
    NotFileBacked,
}
