use super::types::ErrorKind;
use crate::assembler::model::Operand;
use crate::isa::types::{
    hw::{self, BitWidth, Byte, MAX_SLOT_INDEX, MAX_SYMBOL_INDEX},
    schema::{ArgType, Target},
};
use std::fmt::Display;

const SHORT_LABEL_MAX: i64 = 0xFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Incompatible(ArgType, Operand),
    OutOfRange(ArgType, i64),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Argument
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Incompatible(contract, operand) => write!(
                f,
                "operand '{}' is not acceptable for a {} argument",
                operand, contract
            ),
            Error::OutOfRange(contract, val) => {
                write!(f, "value {} is out of range for a {} argument", val, contract)
            }
        }
    }
}

/// An operand in the representation its contract's target width requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    Byte(Byte),
    Number(u64),
}

impl Encoded {
    pub fn write(self, width: BitWidth, out: &mut Vec<Byte>) {
        match self {
            Encoded::Byte(b) => out.push(b),
            Encoded::Number(n) => width.encode_into(n, out),
        }
    }
}

fn in_range(contract: ArgType, val: i64, ok: bool) -> Result<(), Error> {
    if ok {
        Ok(())
    } else {
        Err(Error::OutOfRange(contract, val))
    }
}

/// Checks that `operand` is acceptable for `contract`, ignoring the container width.
pub fn classify(contract: ArgType, operand: &Operand) -> Result<(), Error> {
    let incompatible = || -> Result<(), Error> { Err(Error::Incompatible(contract, *operand)) };

    match (contract, *operand) {
        (ArgType::Anything, _) => Ok(()),
        (_, Operand::NumRef(target, _)) | (_, Operand::ByteRef(target, _))
            if !contract.accepts_reference(target) =>
        {
            incompatible()
        }

        (ArgType::ShortLabelFw, Operand::NumRef(_, d)) => {
            in_range(contract, d, d > 0 && d <= SHORT_LABEL_MAX)
        }
        (ArgType::ShortLabelBw, Operand::NumRef(_, d)) => {
            in_range(contract, d, d < 0 && d >= -SHORT_LABEL_MAX)
        }
        (ArgType::Label, Operand::NumRef(..)) => Ok(()),

        (ArgType::Module, Operand::Value(v)) => {
            in_range(contract, v, v >= 0 && v <= MAX_SLOT_INDEX as i64)
        }
        (ArgType::ExternSymbol, Operand::Value(v)) => {
            in_range(contract, v, v >= 0 && v <= MAX_SYMBOL_INDEX as i64)
        }

        (ArgType::Number, _) => Ok(()),
        (ArgType::Byte, Operand::Value(v)) | (ArgType::Byte, Operand::NumRef(_, v)) => {
            in_range(contract, v, hw::fits_byte(v))
        }

        // A refined byte contract which accepted the reference's target above.
        (_, Operand::ByteRef(..)) => Ok(()),
        _ => incompatible(),
    }
}

pub fn check_arg(contract: ArgType, operand: &Operand) -> bool {
    classify(contract, operand).is_ok()
}

/// Validates `operand` against `contract` and coerces it to the contract's target width.
pub fn normalize_arg(
    contract: ArgType,
    operand: &Operand,
    width: BitWidth,
) -> Result<Encoded, Error> {
    classify(contract, operand)?;

    Ok(match (contract.target(), *operand) {
        (Target::Byte, Operand::ByteRef(_, b)) => Encoded::Byte(b),
        (Target::Byte, Operand::NumRef(_, d)) if contract == ArgType::ShortLabelBw => {
            Encoded::Byte((-d) as Byte)
        }
        (Target::Byte, Operand::Value(v)) | (Target::Byte, Operand::NumRef(_, v)) => {
            // Every byte contract has range checked the value already.
            Encoded::Byte(v as Byte)
        }
        (Target::Number, Operand::ByteRef(_, b)) => Encoded::Number(b as u64),
        (Target::Number, Operand::Value(v)) | (Target::Number, Operand::NumRef(_, v)) => {
            if !width.fits_value(v) {
                return Err(Error::OutOfRange(contract, v));
            }
            Encoded::Number(v as u64)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::types::schema::RefTarget;

    #[test]
    fn string_contract() {
        assert!(!check_arg(ArgType::String, &Operand::ByteRef(RefTarget::Data, 0)));
        assert!(check_arg(ArgType::String, &Operand::ByteRef(RefTarget::String, 0)));
        assert!(!check_arg(ArgType::String, &Operand::Value(0)));
    }

    #[test]
    fn short_labels() {
        let fw = |d| check_arg(ArgType::ShortLabelFw, &Operand::NumRef(RefTarget::Label, d));
        assert!(!fw(-1));
        assert!(!fw(0));
        assert!(fw(1));
        assert!(fw(255));
        assert!(!fw(256));

        let bw = |d| check_arg(ArgType::ShortLabelBw, &Operand::NumRef(RefTarget::Label, d));
        assert!(!bw(0));
        assert!(bw(-1));
        assert!(bw(-255));
        assert!(!bw(-256));
        assert!(!bw(3));

        assert_eq!(
            normalize_arg(
                ArgType::ShortLabelBw,
                &Operand::NumRef(RefTarget::Label, -200),
                BitWidth::W16
            ),
            Ok(Encoded::Byte(200))
        );
        assert!(!check_arg(ArgType::ShortLabelFw, &Operand::Value(3)));
    }

    #[test]
    fn arrays() {
        for target in &[RefTarget::Values, RefTarget::Data, RefTarget::String] {
            assert!(check_arg(ArgType::Array, &Operand::ByteRef(*target, 3)));
        }
        assert!(check_arg(ArgType::ByteArray, &Operand::ByteRef(RefTarget::Data, 3)));
        assert!(!check_arg(ArgType::ByteArray, &Operand::ByteRef(RefTarget::Values, 3)));
        assert!(!check_arg(ArgType::Array, &Operand::ByteRef(RefTarget::Module, 3)));
    }

    #[test]
    fn slot_and_symbol_ceilings() {
        assert!(check_arg(ArgType::Module, &Operand::Value(15)));
        assert_eq!(
            classify(ArgType::Module, &Operand::Value(16)),
            Err(Error::OutOfRange(ArgType::Module, 16))
        );
        assert!(check_arg(ArgType::ExternSymbol, &Operand::Value(254)));
        assert!(!check_arg(ArgType::ExternSymbol, &Operand::Value(255)));
        assert!(check_arg(ArgType::Module, &Operand::ByteRef(RefTarget::Module, 4)));
        assert!(!check_arg(ArgType::Module, &Operand::ByteRef(RefTarget::ExternSymbol, 4)));
        assert!(!check_arg(ArgType::InternSymbol, &Operand::Value(1)));
    }

    #[test]
    fn width_coercion() {
        assert_eq!(
            normalize_arg(ArgType::Byte, &Operand::Value(255), BitWidth::W32),
            Ok(Encoded::Byte(255))
        );
        assert_eq!(
            normalize_arg(ArgType::Byte, &Operand::Value(256), BitWidth::W32),
            Err(Error::OutOfRange(ArgType::Byte, 256))
        );
        assert_eq!(
            normalize_arg(ArgType::Byte, &Operand::NumRef(RefTarget::Label, 7), BitWidth::W16),
            Ok(Encoded::Byte(7))
        );
        assert_eq!(
            normalize_arg(
                ArgType::Number,
                &Operand::ByteRef(RefTarget::Data, 9),
                BitWidth::W64
            ),
            Ok(Encoded::Number(9))
        );
        assert_eq!(
            normalize_arg(ArgType::Number, &Operand::Value(-1), BitWidth::W16),
            Ok(Encoded::Number(u64::MAX))
        );
        assert_eq!(
            normalize_arg(ArgType::Number, &Operand::Value(70000), BitWidth::W16),
            Err(Error::OutOfRange(ArgType::Number, 70000))
        );
        assert_eq!(
            normalize_arg(
                ArgType::Label,
                &Operand::NumRef(RefTarget::Label, -4),
                BitWidth::W16
            ),
            Ok(Encoded::Number((-4i64) as u64))
        );
    }

    #[test]
    fn anything_accepts_everything() {
        assert!(check_arg(ArgType::Anything, &Operand::Value(-5)));
        assert!(check_arg(ArgType::Anything, &Operand::ByteRef(RefTarget::Module, 1)));
        assert!(check_arg(ArgType::Anything, &Operand::NumRef(RefTarget::Label, 1000)));
    }

    #[test]
    fn encoded_write() {
        let mut out = Vec::new();
        Encoded::Byte(7).write(BitWidth::W32, &mut out);
        Encoded::Number(0x0102).write(BitWidth::W32, &mut out);
        assert_eq!(out, vec![7, 0x02, 0x01, 0, 0]);
    }
}
