//! Shared plumbing for the flowtree crates: file access behind a trait and
//! a read-only walker over component trees.

mod error;
mod filesystem;
mod visitor;

pub use error::{CommonError, CommonResult};
pub use filesystem::{FileSystem, MockFileSystem, RealFileSystem};
pub use visitor::{walk_all, walk_component, Visitor};
