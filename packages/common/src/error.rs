use std::path::PathBuf;
use thiserror::Error;

/// Storage failures shared by the flowtree crates
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
}

pub type CommonResult<T> = Result<T, CommonError>;
