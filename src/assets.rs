use crate::assembler::model::BinaryKind;
use std::path::PathBuf;

pub const SOURCE_EXT: &str = "cws";
pub const EXECUTABLE_EXT: &str = "cwx";
pub const LIBRARY_EXT: &str = "cwl";

pub fn binary_ext(kind: BinaryKind) -> &'static str {
    match kind {
        BinaryKind::Executable => EXECUTABLE_EXT,
        BinaryKind::Library => LIBRARY_EXT,
    }
}

pub fn default_suite_dir() -> PathBuf {
    ["asm", "test"].iter().collect()
}

pub fn default_include_dir() -> PathBuf {
    ["asm", "include"].iter().collect()
}
