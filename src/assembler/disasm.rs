use super::lang::Lang;
use super::model::{Binary, BinaryKind, BinaryType, MetaHeader, ModuleSlot, SymbolBlob};
use crate::isa::types::{
    hw::{
        BitWidth, Byte, OpCode, SlotFlags, TypeFlags, MAGIC, MAX_SLOTS, MAX_SLOT_INDEX,
        MAX_SYMBOL_INDEX, TYPE_TAG_EXECUTABLE, TYPE_TAG_LIBRARY, TYPE_TAG_PREFIX,
    },
    schema::{ArgType, InstDef, Target},
};
use std::{convert::TryFrom, fmt::Display};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    BadMagic,
    BadTypeTag([Byte; 3]),
    BadFlags(Byte),
    Truncated(&'static str),
    NonAscii(&'static str),
    BadSlot(Byte),
    TooManySlots(Byte),
    BadSymbolIndex(Byte),
    TrailingBytes(usize),
    UnknownOpcode(OpCode, usize),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadMagic => write!(f, "Not a CW container (bad magic)"),
            Error::BadTypeTag(tag) => write!(f, "Bad type tag {:02X?}", tag),
            Error::BadFlags(flags) => write!(f, "Bad type flags {:#04X}", flags),
            Error::Truncated(what) => {
                write!(f, "Unexpectedly encountered end of stream in the {}", what)
            }
            Error::NonAscii(what) => write!(f, "The {} is not ASCII", what),
            Error::BadSlot(raw) => write!(f, "Bad module slot byte {:#04X}", raw),
            Error::TooManySlots(n) => {
                write!(f, "Too many module slots ({}, at most {})", n, MAX_SLOTS)
            }
            Error::BadSymbolIndex(idx) => write!(
                f,
                "Symbol index {} is out of range (0-{})",
                idx, MAX_SYMBOL_INDEX
            ),
            Error::TrailingBytes(n) => write!(f, "{} trailing byte(s) after the symbol table", n),
            Error::UnknownOpcode(op, offset) => {
                write!(f, "Invalid opcode ${:02X} at offset {}", op, offset)
            }
        }
    }
}

impl std::error::Error for Error {}

struct Reader<'a> {
    bytes: &'a [Byte],
    pos: usize,
    width: BitWidth,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [Byte], Error> {
        let end = self.pos.checked_add(n).ok_or(Error::Truncated(what))?;
        let slice = self.bytes.get(self.pos..end).ok_or(Error::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }

    fn byte(&mut self, what: &'static str) -> Result<Byte, Error> {
        Ok(self.take(1, what)?[0])
    }

    fn triple(&mut self, what: &'static str) -> Result<[Byte; 3], Error> {
        let bytes = self.take(3, what)?;
        Ok([bytes[0], bytes[1], bytes[2]])
    }

    fn blob(&mut self, what: &'static str) -> Result<&'a [Byte], Error> {
        let prefix = self.take(self.width.bytes(), what)?;
        let len = self.width.decode(prefix).ok_or(Error::Truncated(what))?;
        let len = usize::try_from(len).map_err(|_| Error::Truncated(what))?;
        self.take(len, what)
    }

    fn text(&mut self, what: &'static str) -> Result<String, Error> {
        let bytes = self.blob(what)?;
        if !bytes.is_ascii() {
            return Err(Error::NonAscii(what));
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn read_type(r: &mut Reader) -> Result<BinaryType, Error> {
    if r.take(MAGIC.len(), "magic")? != &MAGIC[..] {
        return Err(Error::BadMagic);
    }

    let tag = r.triple("type tag")?;
    let kind = match tag {
        [c, w, t] if [c, w] == TYPE_TAG_PREFIX && t == TYPE_TAG_EXECUTABLE => {
            BinaryKind::Executable
        }
        [c, w, t] if [c, w] == TYPE_TAG_PREFIX && t == TYPE_TAG_LIBRARY => BinaryKind::Library,
        _ => return Err(Error::BadTypeTag(tag)),
    };

    let raw = r.byte("type flags")?;
    let flags = TypeFlags::from_bits(raw).ok_or(Error::BadFlags(raw))?;
    if flags.contains(TypeFlags::LIBRARY) != (kind == BinaryKind::Library) {
        return Err(Error::BadFlags(raw));
    }

    Ok(BinaryType::new(kind, flags.width()))
}

/// Parses a container, checking every field the serializer would have checked.
pub fn read(bytes: &[Byte]) -> Result<Binary, Error> {
    let mut r = Reader {
        bytes,
        pos: 0,
        width: BitWidth::W8,
    };

    let ty = read_type(&mut r)?;
    r.width = ty.width;

    let meta = MetaHeader {
        title: r.text("title")?,
        description: r.text("description")?,
        author: r.text("author")?,
        version: r.triple("version")?,
        runtime: r.triple("runtime version")?,
        resources: r.triple("resource sizes")?,
    };

    let slot_count = r.byte("slot table")?;
    if slot_count as usize > MAX_SLOTS {
        return Err(Error::TooManySlots(slot_count));
    }
    let mut slots = Vec::with_capacity(slot_count as usize);
    for _ in 0..slot_count {
        let raw = r.byte("slot table")?;
        let flags = SlotFlags::from_bits_truncate(raw);
        let index = raw & !SlotFlags::all().bits();
        if index > MAX_SLOT_INDEX {
            return Err(Error::BadSlot(raw));
        }
        let name = r.text("module name")?;
        slots.push(ModuleSlot::new(
            name,
            index,
            flags.contains(SlotFlags::OPTIONAL),
        ));
    }

    let constant_count = r.byte("constant table")?;
    let constants = (0..constant_count)
        .map(|_| r.blob("constant table").map(<[Byte]>::to_vec))
        .collect::<Result<Vec<_>, _>>()?;

    let symbol_count = r.byte("symbol table")?;
    let mut symbols = Vec::with_capacity(symbol_count as usize);
    for _ in 0..symbol_count {
        let index = r.byte("symbol table")?;
        if index > MAX_SYMBOL_INDEX {
            return Err(Error::BadSymbolIndex(index));
        }
        symbols.push(SymbolBlob {
            name: None,
            index,
            body: r.blob("symbol table")?.to_vec(),
        });
    }

    if r.pos != bytes.len() {
        return Err(Error::TrailingBytes(bytes.len() - r.pos));
    }

    Ok(Binary {
        ty,
        meta,
        slots,
        constants,
        symbols,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisassembledInst<'a> {
    pub offset: usize,
    pub def: &'a InstDef,
    pub args: Vec<u64>,
}

impl<'a> Display for DisassembledInst<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.def.name)?;
        for (idx, (contract, raw)) in self.def.args.iter().zip(&self.args).enumerate() {
            let sep = if idx == 0 { " " } else { ", " };
            match contract {
                ArgType::ShortLabelBw => write!(f, "{}-{}", sep, raw)?,
                ArgType::ShortLabelFw => write!(f, "{}+{}", sep, raw)?,
                ArgType::Number | ArgType::Label | ArgType::Anything | ArgType::Byte => {
                    write!(f, "{}{}", sep, raw)?
                }
                _ => write!(f, "{}{}#{}", sep, contract, raw)?,
            }
        }
        Ok(())
    }
}

/// Decodes a symbol body against `lang`. Numeric operands are reported as raw unsigned values.
pub fn disassemble<'a>(
    body: &[Byte],
    lang: &'a Lang,
    width: BitWidth,
) -> Result<Vec<DisassembledInst<'a>>, Error> {
    let mut r = Reader {
        bytes: body,
        pos: 0,
        width,
    };

    let mut insts = Vec::new();
    while r.pos < body.len() {
        let offset = r.pos;
        let opcode = r.byte("symbol body")?;
        let def = lang
            .lookup_opcode(opcode)
            .ok_or(Error::UnknownOpcode(opcode, offset))?;

        let mut args = Vec::with_capacity(def.args.len());
        for contract in &def.args {
            let raw = match contract.target() {
                Target::Byte => r.byte("symbol body")? as u64,
                Target::Number => {
                    let bytes = r.take(width.bytes(), "symbol body")?;
                    width.decode(bytes).ok_or(Error::Truncated("symbol body"))?
                }
            };
            args.push(raw);
        }

        insts.push(DisassembledInst { offset, def, args });
    }

    Ok(insts)
}
