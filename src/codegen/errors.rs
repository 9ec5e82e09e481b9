use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodegenError {
    #[error("can't find a target for triple {triple:?}: {message}")]
    TargetLookup { triple: String, message: String },
    #[error("can't open output file {path:?}: {message}")]
    FileOpen { path: PathBuf, message: String },
    #[error("the target machine can't emit this file type: {0}")]
    CannotEmitFileType(String),
    #[error("llvm error: {0}")]
    Llvm(String),
    #[error("object emission is not available, build with the `llvm` feature")]
    BackendUnavailable,
}
