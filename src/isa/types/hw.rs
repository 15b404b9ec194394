use bitflags::bitflags;
use derive_more::Display;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use static_assertions::const_assert;
use std::convert::TryFrom;
use strum_macros::EnumIter;

pub type Byte = u8;
pub type OpCode = u8;

pub const BYTE_MAX: i64 = 0xFF;

pub const NATIVE_OPCODE_MAX: OpCode = 0x7F;
pub const EXTENDED_OPCODE_MIN: OpCode = 0x80;
const_assert!(NATIVE_OPCODE_MAX < EXTENDED_OPCODE_MIN);

pub const MAX_SLOTS: usize = 16;
pub const MAX_SLOT_INDEX: Byte = 15;
const_assert!(MAX_SLOT_INDEX as usize + 1 == MAX_SLOTS);

pub const MAX_CONSTANTS: usize = 255;
pub const MAX_SYMBOLS: usize = 255;
pub const MAX_SYMBOL_INDEX: Byte = 254;
const_assert!(MAX_SYMBOL_INDEX as usize + 1 == MAX_SYMBOLS);

pub const MAX_MODULE_NAME_LEN: usize = 6;

pub const MAGIC: [Byte; 2] = [0xCA, 0xFE];
pub const TYPE_TAG_PREFIX: [Byte; 2] = *b"CW";
pub const TYPE_TAG_EXECUTABLE: Byte = b'X';
pub const TYPE_TAG_LIBRARY: Byte = b'L';

bitflags! {
    /// The single flags byte following the `CW?` type tag.
    pub struct TypeFlags: Byte {
        const LIBRARY = 1 << 0;
        const WIDTH   = 0b110;
    }
}

bitflags! {
    /// Flags or'd into a module slot's index byte.
    pub struct SlotFlags: Byte {
        const OPTIONAL = 1 << 5;
    }
}

impl TypeFlags {
    pub const WIDTH_SHIFT: u32 = 1;

    pub fn encode(library: bool, width: BitWidth) -> Self {
        let mut flags = TypeFlags::from_bits_truncate(width.code() << TypeFlags::WIDTH_SHIFT);
        flags.set(TypeFlags::LIBRARY, library);
        flags
    }

    pub fn width(self) -> BitWidth {
        // The mask leaves exactly two bits, and every two bit code names a width.
        BitWidth::from_code((self & TypeFlags::WIDTH).bits() >> TypeFlags::WIDTH_SHIFT)
            .unwrap_or(BitWidth::W8)
    }
}

/// The container-wide numeric encoding size. The discriminant is the width
/// code stored in the container's flags byte.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, EnumIter)]
pub enum BitWidth {
    #[display(fmt = "8-bit")]
    W8 = 0,
    #[display(fmt = "16-bit")]
    W16 = 1,
    #[display(fmt = "32-bit")]
    W32 = 2,
    #[display(fmt = "64-bit")]
    W64 = 3,
}

impl BitWidth {
    pub fn from_code(code: Byte) -> Option<Self> {
        BitWidth::from_u8(code)
    }

    pub fn from_bits(bits: i64) -> Option<Self> {
        match bits {
            8 => Some(BitWidth::W8),
            16 => Some(BitWidth::W16),
            32 => Some(BitWidth::W32),
            64 => Some(BitWidth::W64),
            _ => None,
        }
    }

    pub const fn code(self) -> Byte {
        self as Byte
    }

    pub const fn bits(self) -> u32 {
        8 << (self as u32)
    }

    pub const fn bytes(self) -> usize {
        1 << (self as usize)
    }

    pub fn max_unsigned(self) -> u64 {
        match self {
            BitWidth::W64 => u64::MAX,
            _ => (1u64 << self.bits()) - 1,
        }
    }

    /// Whether `len` is representable as a length prefix of this width.
    pub fn fits_len(self, len: usize) -> bool {
        u64::try_from(len).map_or(false, |len| len <= self.max_unsigned())
    }

    /// Whether `val` is representable at this width, reading it either as
    /// a signed or as an unsigned quantity.
    pub fn fits_value(self, val: i64) -> bool {
        match self {
            BitWidth::W64 => true,
            _ => {
                let min = -(1i64 << (self.bits() - 1));
                val >= min && val <= self.max_unsigned() as i64
            }
        }
    }

    pub fn mask(self, val: u64) -> u64 {
        val & self.max_unsigned()
    }

    pub fn encode_into(self, val: u64, out: &mut Vec<Byte>) {
        out.extend_from_slice(&self.mask(val).to_le_bytes()[..self.bytes()]);
    }

    pub fn encode(self, val: u64) -> Vec<Byte> {
        let mut out = Vec::with_capacity(self.bytes());
        self.encode_into(val, &mut out);
        out
    }

    /// Returns `None` if `bytes` is too short.
    pub fn decode(self, bytes: &[Byte]) -> Option<u64> {
        let bytes = bytes.get(..self.bytes())?;
        let mut buff = [0; 8];
        buff[..bytes.len()].copy_from_slice(bytes);
        Some(u64::from_le_bytes(buff))
    }
}

pub fn fits_byte(val: i64) -> bool {
    val >= 0 && val <= BYTE_MAX
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn width_codes_roundtrip() {
        for width in BitWidth::iter() {
            assert_eq!(BitWidth::from_code(width.code()), Some(width));
            assert_eq!(BitWidth::from_bits(width.bits() as i64), Some(width));
            assert_eq!(width.bytes() * 8, width.bits() as usize);
        }
        assert_eq!(BitWidth::from_code(4), None);
        assert_eq!(BitWidth::from_bits(24), None);
    }

    #[test]
    fn encoding_is_masked_little_endian() {
        assert_eq!(BitWidth::W16.encode(0x1234), vec![0x34, 0x12]);
        assert_eq!(BitWidth::W16.encode((-1i64) as u64), vec![0xFF, 0xFF]);
        assert_eq!(BitWidth::W32.encode(0x1_0000_0001), vec![0x01, 0, 0, 0]);
        assert_eq!(BitWidth::W64.encode(1).len(), 8);
        assert_eq!(BitWidth::W8.encode(0x1FF), vec![0xFF]);
    }

    #[test]
    fn value_ranges() {
        assert!(BitWidth::W16.fits_value(65535));
        assert!(BitWidth::W16.fits_value(-32768));
        assert!(!BitWidth::W16.fits_value(65536));
        assert!(!BitWidth::W16.fits_value(-32769));
        assert!(BitWidth::W64.fits_value(i64::MIN));
        assert!(BitWidth::W8.fits_len(255));
        assert!(!BitWidth::W8.fits_len(256));
    }

    #[test]
    fn type_flags() {
        let flags = TypeFlags::encode(true, BitWidth::W32);
        assert_eq!(flags.bits(), 0b101);
        assert_eq!(flags.width(), BitWidth::W32);
        assert!(flags.contains(TypeFlags::LIBRARY));
        assert_eq!(TypeFlags::encode(false, BitWidth::W16).bits(), 0b010);
    }
}
