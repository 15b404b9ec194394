use super::lang::Lang;
use super::phases::types::{Loc, Located};
use crate::isa::types::{
    hw::{BitWidth, Byte, MAX_CONSTANTS},
    schema::{InstDef, RefTarget},
};
use derive_more::{Constructor, Display};
use std::collections::HashMap;

/// A preprocessor value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Empty,
    Number(i64),
    Str(String),
}

impl Constant {
    pub fn is_truthy(&self) -> bool {
        match self {
            Constant::Empty => false,
            Constant::Number(n) => *n != 0,
            Constant::Str(s) => !s.is_empty(),
        }
    }

    /// Interprets command-line style text: a decimal or `$`-hex number, otherwise a string.
    pub fn parse_text(text: &str) -> Self {
        if text.is_empty() {
            return Constant::Empty;
        }

        let number = match text.strip_prefix('$') {
            Some(hex) => i64::from_str_radix(hex, 16).ok(),
            None => text.parse::<i64>().ok(),
        };
        match number {
            Some(n) => Constant::Number(n),
            None => Constant::Str(text.to_owned()),
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Empty => write!(f, "<empty>"),
            Constant::Number(n) => write!(f, "{}", n),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

pub type ConstantTable = HashMap<String, Constant>;

/// Which directive produced a constant pool entry.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstKind {
    #[display(fmt = "data")]
    Data,
    #[display(fmt = "values")]
    Values,
    #[display(fmt = "string")]
    String,
}

impl ConstKind {
    pub fn target(self) -> RefTarget {
        match self {
            ConstKind::Data => RefTarget::Data,
            ConstKind::Values => RefTarget::Values,
            ConstKind::String => RefTarget::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    Empty,
    Full,
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Empty => write!(f, "array is empty"),
            PoolError::Full => write!(f, "too many constants (at most {})", MAX_CONSTANTS),
        }
    }
}

/// The deduplicated table of raw byte blobs referenced by index from instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<Vec<Byte>>,
}

impl ConstantPool {
    pub fn new() -> Self {
        ConstantPool::default()
    }

    pub fn register(&mut self, bytes: Vec<Byte>) -> Result<Byte, PoolError> {
        if bytes.is_empty() {
            return Err(PoolError::Empty);
        }

        if let Some(idx) = self.entries.iter().position(|entry| *entry == bytes) {
            return Ok(idx as Byte);
        }

        if self.entries.len() >= MAX_CONSTANTS {
            return Err(PoolError::Full);
        }

        self.entries.push(bytes);
        Ok((self.entries.len() - 1) as Byte)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: Byte) -> Option<&[Byte]> {
        self.entries.get(idx as usize).map(Vec::as_slice)
    }

    pub fn into_entries(self) -> Vec<Vec<Byte>> {
        self.entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Constructor)]
pub struct ModuleSlot {
    pub name: String,
    pub index: Byte,
    pub optional: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaHeader {
    pub title: String,
    pub description: String,
    pub author: String,
    pub version: [Byte; 3],
    pub runtime: [Byte; 3],
    pub resources: [Byte; 3],
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BinaryKind {
    #[display(fmt = "executable")]
    Executable,
    #[display(fmt = "library")]
    Library,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Constructor)]
#[display(fmt = "{} {}", width, kind)]
pub struct BinaryType {
    pub kind: BinaryKind,
    pub width: BitWidth,
}

impl BinaryType {
    pub fn is_library(&self) -> bool {
        self.kind == BinaryKind::Library
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolBlob {
    /// Symbol names are not part of the container, so this is only known when assembling.
    pub name: Option<String>,
    pub index: Byte,
    pub body: Vec<Byte>,
}

/// A fully resolved container, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub ty: BinaryType,
    pub meta: MetaHeader,
    pub slots: Vec<ModuleSlot>,
    pub constants: Vec<Vec<Byte>>,
    pub symbols: Vec<SymbolBlob>,
}

impl Binary {
    pub fn symbol(&self, name: &str) -> Option<&SymbolBlob> {
        self.symbols
            .iter()
            .find(|sym| sym.name.as_ref().map_or(false, |n| n == name))
    }
}

/// A resolved operand: an immediate, or a reference into one of the assembler's tables.
/// Label references are numeric (a signed distance); every other table is indexed by a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Value(i64),
    NumRef(RefTarget, i64),
    ByteRef(RefTarget, Byte),
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{}", v),
            Operand::NumRef(target, v) => write!(f, "{}({:+})", target, v),
            Operand::ByteRef(target, idx) => write!(f, "{}#{}", target, idx),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Resolved(Operand),
    Unresolved(String),
}

/// What a name declared at the top level refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Constant(Byte, ConstKind),
    Module(Byte),
    Extern(Byte),
    /// An index into `Session::symbols`, the container index is only allocated at resolution.
    Symbol(usize),
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub def: InstDef,
    pub offset: usize,
    pub args: Vec<Located<Binding>>,
    pub loc: Option<Loc>,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub fixed: Option<Byte>,
    pub insts: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
    pub size: usize,
    pub loc: Option<Loc>,
}

impl Symbol {
    pub fn new(name: String, fixed: Option<Byte>, loc: Option<Loc>) -> Self {
        Symbol {
            name,
            fixed,
            insts: Vec::new(),
            labels: HashMap::new(),
            size: 0,
            loc,
        }
    }
}

/// Every table of one assembly run. Built by the first pass, filled in by the second and
/// consumed by resolution.
#[derive(Debug, Clone)]
pub struct Session {
    pub lang: Lang,
    pub ty: BinaryType,
    pub meta: MetaHeader,
    pub slots: Vec<ModuleSlot>,
    pub pool: ConstantPool,
    pub refs: HashMap<String, Reference>,
    pub symbols: Vec<Symbol>,
}

impl Session {
    pub fn new(ty: BinaryType) -> Self {
        Session {
            lang: Lang::new(),
            ty,
            meta: MetaHeader::default(),
            slots: Vec::new(),
            pool: ConstantPool::new(),
            refs: HashMap::new(),
            symbols: Vec::new(),
        }
    }

    pub fn width(&self) -> BitWidth {
        self.ty.width
    }

    /// Whether `name` is already taken by a top-level reference or an instruction mnemonic.
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.refs.contains_key(name) || self.lang.lookup(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_deduplicates() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.register(b"hello".to_vec()), Ok(0));
        assert_eq!(pool.register(vec![1, 2]), Ok(1));
        assert_eq!(pool.register(b"hello".to_vec()), Ok(0));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.register(vec![]), Err(PoolError::Empty));
    }

    #[test]
    fn pool_capacity() {
        let mut pool = ConstantPool::new();
        for i in 0..255u16 {
            assert_eq!(pool.register(i.to_le_bytes().to_vec()), Ok(i as u8));
        }
        assert_eq!(pool.register(vec![0xAA, 0xBB, 0xCC]), Err(PoolError::Full));
        assert_eq!(pool.register(vec![0x00, 0x00]), Ok(0));
    }

    #[test]
    fn constant_text() {
        assert_eq!(Constant::parse_text("12"), Constant::Number(12));
        assert_eq!(Constant::parse_text("-3"), Constant::Number(-3));
        assert_eq!(Constant::parse_text("$ff"), Constant::Number(255));
        assert_eq!(Constant::parse_text("abc"), Constant::Str("abc".to_owned()));
        assert_eq!(Constant::parse_text(""), Constant::Empty);
        assert!(!Constant::Str(String::new()).is_truthy());
        assert!(Constant::Number(-1).is_truthy());
    }
}
