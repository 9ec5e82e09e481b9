use ariadne::Source;
use std::path::PathBuf;

use crate::codegen::TargetOptions;

/// This struct holds the information needed to compile this compilation unit,
/// like the optimization level, the target and which artifacts to write.
#[derive(Debug, Clone)]
pub struct CompileUnitInfo {
    /// The syntax tree file of this compile unit.
    pub input: PathBuf,
    /// The source the tree was parsed from, used for error locations.
    pub source: Option<(String, Source<String>)>,
    /// The optimization level to use with this compilation unit.
    pub optlevel: OptLevel,
    /// The file where to put the compilation result.
    /// Other artifacts use the same name with their own extension.
    pub output_file: PathBuf,
    /// Whether to output the textual IR of this compile unit.
    pub output_ir: bool,
    /// Whether to write an object file.
    pub output_object: bool,
    pub target: TargetOptions,
}

impl CompileUnitInfo {
    pub fn new(input: PathBuf) -> Self {
        let output_file = input.with_extension("o");
        Self {
            input,
            source: None,
            optlevel: OptLevel::None,
            output_file,
            output_ir: false,
            output_object: false,
            target: TargetOptions::default(),
        }
    }

    /// The name of the module generated for this unit.
    pub fn module_name(&self) -> String {
        self.input
            .file_stem()
            .map(|x| x.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptLevel {
    None,       // -O0
    Less,       // -O1
    Default,    // -O2
    Aggressive, // -O3
}

impl From<u8> for OptLevel {
    fn from(value: u8) -> Self {
        match value {
            0 => OptLevel::None,
            1 => OptLevel::Less,
            2 => OptLevel::Default,
            _ => OptLevel::Aggressive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_input() {
        let info = CompileUnitInfo::new(PathBuf::from("trees/fib.toml"));
        assert_eq!(info.output_file, PathBuf::from("trees/fib.o"));
        assert_eq!(info.module_name(), "fib");
        assert_eq!(info.target.cpu, "generic");
    }

    #[test]
    fn opt_levels() {
        assert_eq!(OptLevel::from(0), OptLevel::None);
        assert_eq!(OptLevel::from(2), OptLevel::Default);
        assert_eq!(OptLevel::from(9), OptLevel::Aggressive);
    }
}
