use super::types::ErrorKind;
use crate::assembler::model::{Binary, BinaryKind};
use crate::isa::types::hw::{
    BitWidth, Byte, SlotFlags, TypeFlags, MAGIC, MAX_CONSTANTS, MAX_MODULE_NAME_LEN, MAX_SLOTS,
    MAX_SLOT_INDEX, MAX_SYMBOLS, MAX_SYMBOL_INDEX, TYPE_TAG_EXECUTABLE, TYPE_TAG_LIBRARY,
    TYPE_TAG_PREFIX,
};
use std::fmt::Display;
use std::io::{self, Write};

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    TooManySlots(usize),
    SlotIndexOutOfRange(Byte),
    ModuleNameTooLong(String),
    TooManyConstants(usize),
    TooManySymbols(usize),
    SymbolIndexOutOfRange(Byte),
    TooLong { what: &'static str, len: usize },
    NonAscii(&'static str),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::SlotIndexOutOfRange(_) | Error::SymbolIndexOutOfRange(_) => {
                ErrorKind::Reference
            }
            Error::NonAscii(_) => ErrorKind::Argument,
            _ => ErrorKind::Capacity,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "{}", err),
            Error::TooManySlots(n) => {
                write!(f, "Too many module slots ({}, at most {})", n, MAX_SLOTS)
            }
            Error::SlotIndexOutOfRange(idx) => write!(
                f,
                "Module slot index {} is out of range (0-{})",
                idx, MAX_SLOT_INDEX
            ),
            Error::ModuleNameTooLong(name) => write!(
                f,
                "Module name '{}' is longer than {} characters",
                name, MAX_MODULE_NAME_LEN
            ),
            Error::TooManyConstants(n) => {
                write!(f, "Too many constants ({}, at most {})", n, MAX_CONSTANTS)
            }
            Error::TooManySymbols(n) => {
                write!(f, "Too many symbols ({}, at most {})", n, MAX_SYMBOLS)
            }
            Error::SymbolIndexOutOfRange(idx) => write!(
                f,
                "Symbol index {} is out of range (0-{})",
                idx, MAX_SYMBOL_INDEX
            ),
            Error::TooLong { what, len } => write!(
                f,
                "The {} is too long ({} bytes) for the container width",
                what, len
            ),
            Error::NonAscii(what) => write!(f, "The {} must be plain ASCII", what),
        }
    }
}

impl std::error::Error for Error {}

struct Writer<'a, W: Write> {
    out: &'a mut W,
    width: BitWidth,
}

impl<'a, W: Write> Writer<'a, W> {
    fn bytes(&mut self, bytes: &[Byte]) -> Result<(), Error> {
        Ok(self.out.write_all(bytes)?)
    }

    fn byte(&mut self, b: Byte) -> Result<(), Error> {
        self.bytes(&[b])
    }

    /// Writes a count which is known to fit in a byte.
    fn count(&mut self, n: usize, max: usize, err: fn(usize) -> Error) -> Result<(), Error> {
        if n > max {
            return Err(err(n));
        }
        self.byte(n as Byte)
    }

    fn blob(&mut self, what: &'static str, bytes: &[Byte]) -> Result<(), Error> {
        if !self.width.fits_len(bytes.len()) {
            return Err(Error::TooLong {
                what,
                len: bytes.len(),
            });
        }
        let prefix = self.width.encode(bytes.len() as u64);
        self.bytes(&prefix)?;
        self.bytes(bytes)
    }

    fn text(&mut self, what: &'static str, text: &str) -> Result<(), Error> {
        if !text.is_ascii() {
            return Err(Error::NonAscii(what));
        }
        self.blob(what, text.as_bytes())
    }
}

/// Writes `binary` in the container format. On error the sink may hold a partial container.
pub fn serialize<W: Write>(binary: &Binary, out: &mut W) -> Result<(), Error> {
    let mut w = Writer {
        out,
        width: binary.ty.width,
    };

    w.bytes(&MAGIC)?;
    w.bytes(&TYPE_TAG_PREFIX)?;
    w.byte(match binary.ty.kind {
        BinaryKind::Executable => TYPE_TAG_EXECUTABLE,
        BinaryKind::Library => TYPE_TAG_LIBRARY,
    })?;
    w.byte(TypeFlags::encode(binary.ty.is_library(), binary.ty.width).bits())?;

    let meta = &binary.meta;
    w.text("title", &meta.title)?;
    w.text("description", &meta.description)?;
    w.text("author", &meta.author)?;
    w.bytes(&meta.version)?;
    w.bytes(&meta.runtime)?;
    w.bytes(&meta.resources)?;

    w.count(binary.slots.len(), MAX_SLOTS, Error::TooManySlots)?;
    for slot in &binary.slots {
        if slot.index > MAX_SLOT_INDEX {
            return Err(Error::SlotIndexOutOfRange(slot.index));
        }
        if slot.name.len() > MAX_MODULE_NAME_LEN {
            return Err(Error::ModuleNameTooLong(slot.name.clone()));
        }

        let mut flags = SlotFlags::empty();
        flags.set(SlotFlags::OPTIONAL, slot.optional);
        w.byte(slot.index | flags.bits())?;
        w.text("module name", &slot.name)?;
    }

    w.count(binary.constants.len(), MAX_CONSTANTS, Error::TooManyConstants)?;
    for constant in &binary.constants {
        w.blob("constant", constant)?;
    }

    w.count(binary.symbols.len(), MAX_SYMBOLS, Error::TooManySymbols)?;
    for symbol in &binary.symbols {
        if symbol.index > MAX_SYMBOL_INDEX {
            return Err(Error::SymbolIndexOutOfRange(symbol.index));
        }
        w.byte(symbol.index)?;
        w.blob("symbol body", &symbol.body)?;
    }

    Ok(())
}

pub fn to_bytes(binary: &Binary) -> Result<Vec<Byte>, Error> {
    let mut out = Vec::new();
    serialize(binary, &mut out)?;
    log::debug!("serialized {} byte(s)", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::model::{BinaryType, MetaHeader, ModuleSlot, SymbolBlob};

    fn binary(width: BitWidth) -> Binary {
        Binary {
            ty: BinaryType::new(BinaryKind::Executable, width),
            meta: MetaHeader::default(),
            slots: vec![],
            constants: vec![],
            symbols: vec![SymbolBlob {
                name: Some("main".to_owned()),
                index: 0,
                body: vec![0x00, 0x07],
            }],
        }
    }

    #[test]
    fn minimal_container() {
        assert_eq!(
            to_bytes(&binary(BitWidth::W16)).unwrap(),
            vec![
                0xCA, 0xFE, b'C', b'W', b'X', 0b010, // type
                0, 0, 0, 0, 0, 0, // title, description, author
                0, 0, 0, 0, 0, 0, 0, 0, 0, // version, runtime, resources
                0, // slots
                0, // constants
                1, 0, 2, 0, 0x00, 0x07, // symbols
            ]
        );
    }

    #[test]
    fn full_container() {
        let mut bin = binary(BitWidth::W32);
        bin.ty.kind = BinaryKind::Library;
        bin.meta.title = "t".to_owned();
        bin.meta.version = [1, 2, 3];
        bin.slots = vec![
            ModuleSlot::new("io".to_owned(), 2, false),
            ModuleSlot::new("gfx".to_owned(), 15, true),
        ];
        bin.constants = vec![vec![9, 8]];
        bin.symbols[0].index = 4;

        let bytes = to_bytes(&bin).unwrap();
        assert_eq!(&bytes[..6], &[0xCA, 0xFE, b'C', b'W', b'L', 0b101]);
        assert_eq!(&bytes[6..15], &[1, 0, 0, 0, b't', 0, 0, 0, 0]);
        assert_eq!(&bytes[15..19], &[0, 0, 0, 0]);
        assert_eq!(&bytes[19..24], &[1, 2, 3, 0, 0]);
        assert_eq!(&bytes[24..28], &[0, 0, 0, 0]);
        assert_eq!(
            &bytes[28..],
            &[
                2, // slots
                2, 2, 0, 0, 0, b'i', b'o', //
                15 | 0x20, 3, 0, 0, 0, b'g', b'f', b'x', //
                1, 2, 0, 0, 0, 9, 8, // constants
                1, 4, 2, 0, 0, 0, 0x00, 0x07, // symbols
            ][..]
        );
    }

    #[test]
    fn ceilings() {
        let mut bin = binary(BitWidth::W16);
        bin.symbols[0].index = 255;
        assert!(matches!(to_bytes(&bin), Err(Error::SymbolIndexOutOfRange(255))));

        let mut bin = binary(BitWidth::W16);
        bin.slots = (0..17)
            .map(|i| ModuleSlot::new(format!("m{}", i), i as Byte, false))
            .collect();
        assert!(matches!(to_bytes(&bin), Err(Error::TooManySlots(17))));

        let mut bin = binary(BitWidth::W16);
        bin.slots = vec![ModuleSlot::new("m".to_owned(), 16, false)];
        assert!(matches!(to_bytes(&bin), Err(Error::SlotIndexOutOfRange(16))));

        let mut bin = binary(BitWidth::W16);
        bin.constants = (0..256u16).map(|i| i.to_le_bytes().to_vec()).collect();
        assert!(matches!(to_bytes(&bin), Err(Error::TooManyConstants(256))));
    }

    #[test]
    fn lengths_must_fit_the_width() {
        let mut bin = binary(BitWidth::W8);
        bin.symbols[0].body = vec![0; 256];
        assert!(matches!(
            to_bytes(&bin),
            Err(Error::TooLong {
                what: "symbol body",
                len: 256
            })
        ));

        bin.symbols[0].body = vec![0; 255];
        assert_eq!(to_bytes(&bin).unwrap().len(), 6 + 3 + 9 + 3 + 1 + 1 + 255);
    }

    #[test]
    fn metadata_is_ascii() {
        let mut bin = binary(BitWidth::W16);
        bin.meta.author = "Zoë".to_owned();
        assert!(matches!(to_bytes(&bin), Err(Error::NonAscii("author"))));
    }
}
