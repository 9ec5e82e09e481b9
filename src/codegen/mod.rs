//! Object file emission.
//!
//! A verified module is handed to LLVM, which is only linked in with the `llvm` feature.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{compile_unit_info::CompileUnitInfo, ir::Module};

pub mod errors;
#[cfg(feature = "llvm")]
mod llvm;

pub use errors::CodegenError;

/// Describes the machine to generate code for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetOptions {
    /// The target triple, the host triple if not set.
    pub triple: Option<String>,
    pub cpu: String,
    pub features: String,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            triple: None,
            cpu: "generic".to_string(),
            features: String::new(),
        }
    }
}

/// Converts a module to an object.
/// The object will be written to `info.output_file`.
///
/// Returns the path to the object.
pub fn compile_to_object(info: &CompileUnitInfo, module: &Module) -> Result<PathBuf, CodegenError> {
    #[cfg(feature = "llvm")]
    {
        llvm::compile_to_object(info, module)
    }

    #[cfg(not(feature = "llvm"))]
    {
        tracing::debug!(
            "not compiling {:?} to {:?}, llvm backend disabled",
            module.name,
            info.output_file
        );
        Err(CodegenError::BackendUnavailable)
    }
}

#[cfg(all(test, not(feature = "llvm")))]
mod tests {
    use super::*;

    #[test]
    fn backend_unavailable_without_llvm() {
        let info = CompileUnitInfo::new(PathBuf::from("unit.toml"));
        assert_eq!(
            compile_to_object(&info, &Module::new("unit")),
            Err(CodegenError::BackendUnavailable)
        );
    }
}
