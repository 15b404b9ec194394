pub mod disasm;
pub mod lang;
pub mod model;
pub mod phases;

use crate::isa::types::hw::Byte;
use model::{Binary, ConstantTable};
use phases::{
    compile, precompile,
    preprocess::{self, FsProvider, MemoryProvider, Preprocessor, SourceProvider},
    resolve, serialize,
    types::{ErrorKind, Located},
};
use std::{fmt::Display, path::PathBuf};

#[derive(Debug)]
pub enum Error {
    Preprocess(preprocess::Error),
    Precompile(precompile::Error),
    Compile(compile::Error),
    Resolve(resolve::Error),
    Serialize(serialize::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Preprocess(err) => err.kind(),
            Error::Precompile(err) => err.kind(),
            Error::Compile(err) => err.kind(),
            Error::Resolve(err) => err.kind(),
            Error::Serialize(err) => err.kind(),
        }
    }

    fn phase(&self) -> &'static str {
        match self {
            Error::Preprocess(_) => "Preprocessor",
            Error::Precompile(_) => "First pass",
            Error::Compile(_) => "Second pass",
            Error::Resolve(_) => "Resolver",
            Error::Serialize(_) => "Serializer",
        }
    }
}

impl From<preprocess::Error> for Error {
    fn from(err: preprocess::Error) -> Self {
        Error::Preprocess(err)
    }
}

impl From<precompile::Error> for Error {
    fn from(err: precompile::Error) -> Self {
        Error::Precompile(err)
    }
}

impl From<compile::Error> for Error {
    fn from(err: compile::Error) -> Self {
        Error::Compile(err)
    }
}

impl From<resolve::Error> for Error {
    fn from(err: resolve::Error) -> Self {
        Error::Resolve(err)
    }
}

impl From<serialize::Error> for Error {
    fn from(err: serialize::Error) -> Self {
        Error::Serialize(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (in {}): ", self.kind(), self.phase())?;
        match self {
            Error::Preprocess(err) => write!(f, "{}", err),
            Error::Precompile(err) => write!(f, "{}", err),
            Error::Compile(err) => write!(f, "{}", err),
            Error::Resolve(err) => write!(f, "{}", err),
            Error::Serialize(err) => write!(f, "{}", err),
        }
    }
}

/// An assembly failure along with the name of the file it points into, when known.
#[derive(Debug)]
pub struct Diagnostic {
    pub error: Located<Error>,
    pub file: Option<String>,
}

impl Diagnostic {
    pub fn kind(&self) -> ErrorKind {
        self.error.inner().kind()
    }

    /// `file:line:col`, or as much of it as is known.
    pub fn position(&self) -> Option<String> {
        let loc = self.error.loc()?;
        Some(format!(
            "{}:{}:{}",
            self.file.as_deref().unwrap_or("<unknown>"),
            loc.line,
            loc.col
        ))
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error.inner())?;
        if let Some(pos) = self.position() {
            write!(f, " at {}", pos)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Runs every phase up to (but not including) serialization.
pub fn build_with(
    provider: &mut dyn SourceProvider,
    root: &str,
    defines: &ConstantTable,
) -> Result<Binary, Diagnostic> {
    let mut preprocessor = Preprocessor::new(provider);
    for (name, val) in defines {
        preprocessor.define(name, val.clone());
    }

    let result = preprocessor
        .run(root)
        .map_err(|err| err.map(Error::from))
        .and_then(|items| {
            let (mut session, deferred) =
                precompile(&items).map_err(|err| err.map(Error::from))?;
            compile(&mut session, &deferred).map_err(|err| err.map(Error::from))?;
            resolve(session).map_err(|err| err.map(Error::from))
        });

    result.map_err(|error| {
        let file = error
            .loc()
            .and_then(|loc| preprocessor.files().get(loc.file).cloned());
        Diagnostic { error, file }
    })
}

pub fn build(
    path: &str,
    include_dirs: Vec<PathBuf>,
    defines: &ConstantTable,
) -> Result<Binary, Diagnostic> {
    build_with(&mut FsProvider::new(include_dirs), path, defines)
}

/// Serializes an already built container.
pub fn assemble_binary(binary: &Binary) -> Result<Vec<Byte>, Diagnostic> {
    serialize::to_bytes(binary).map_err(|err| Diagnostic {
        error: Error::from(err).into(),
        file: None,
    })
}

/// Assembles a source tree into container bytes.
pub fn assemble_with(
    provider: &mut dyn SourceProvider,
    root: &str,
    defines: &ConstantTable,
) -> Result<Vec<Byte>, Diagnostic> {
    assemble_binary(&build_with(provider, root, defines)?)
}

pub fn assemble(
    path: &str,
    include_dirs: Vec<PathBuf>,
    defines: &ConstantTable,
) -> Result<Vec<Byte>, Diagnostic> {
    assemble_binary(&build(path, include_dirs, defines)?)
}

/// Assembles a single self-contained source text.
pub fn assemble_str(source: &str) -> Result<Vec<Byte>, Diagnostic> {
    let mut provider = MemoryProvider::new().with("<input>", source);
    assemble_with(&mut provider, "<input>", &ConstantTable::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::model::Constant;

    #[test]
    fn assembles_a_minimal_executable() {
        assert_eq!(
            assemble_str(".cwx:16\n.symbol main\nnop\neop\n").unwrap(),
            vec![
                0xCA, 0xFE, b'C', b'W', b'X', 0b010, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 1, 0, 2, 0, 0x00, 0x07
            ]
        );
    }

    #[test]
    fn diagnostics_name_the_file() {
        let mut provider = MemoryProvider::new()
            .with("main.cws", ".cwx:16\n#include \"defs.cws\"\n.symbol main\nnop\n")
            .with("defs.cws", "#define X 1\n.symbol main\n");
        let diag = build_with(&mut provider, "main.cws", &ConstantTable::new()).unwrap_err();

        assert_eq!(diag.kind(), ErrorKind::Reference);
        assert_eq!(diag.file.as_deref(), Some("main.cws"));
        assert_eq!(diag.position().unwrap(), "main.cws:3:9");
        assert!(diag.to_string().contains("'main' is already taken"));
    }

    #[test]
    fn defines_are_visible() {
        let mut defines = ConstantTable::new();
        defines.insert("VALUE".to_owned(), Constant::Number(300));
        let mut provider =
            MemoryProvider::new().with("a.cws", ".cwx:16\n.symbol main\npush VALUE\n");
        let binary = build_with(&mut provider, "a.cws", &defines).unwrap();
        assert_eq!(binary.symbols[0].body, vec![0x20, 0x2C, 0x01]);
    }
}
