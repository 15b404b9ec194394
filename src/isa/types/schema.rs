use super::hw::{BitWidth, OpCode, EXTENDED_OPCODE_MIN};
use enum_map::{enum_map, Enum, EnumMap};
use once_cell::sync::Lazy;
use std::fmt::Display;
use strum_macros::{EnumIter, EnumString};

/*
    Operand contracts:

        Every instruction declares, per operand, an `ArgType`. The contract has a *target width*
        (`Target::Number`, encoded at the container's bit width, or `Target::Byte`, encoded as
        a single byte) and possibly a *refinement* (e.g. it must name a label, or a string
        constant).

        Resolved operands (see `crate::assembler::model::Operand`) are either immediates or
        references into one of the assembler's tables, tagged with a `RefTarget`. Which
        reference targets each contract accepts is spelled out in `REFERENCE_TABLE`; range
        rules (short label distances, slot and symbol ceilings) live alongside the validator
        in `crate::assembler::phases::validate`.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Number,
    Byte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, EnumIter, EnumString)]
pub enum ArgType {
    #[strum(serialize = "number", serialize = "num")]
    Number,
    #[strum(serialize = "byte")]
    Byte,
    #[strum(serialize = "label")]
    Label,
    #[strum(serialize = "shortlabelfw", serialize = "slabelfw")]
    ShortLabelFw,
    #[strum(serialize = "shortlabelbw", serialize = "slabelbw")]
    ShortLabelBw,
    #[strum(serialize = "internsymbol", serialize = "symbol")]
    InternSymbol,
    #[strum(serialize = "externsymbol", serialize = "extern")]
    ExternSymbol,
    #[strum(serialize = "module")]
    Module,
    #[strum(serialize = "data")]
    Data,
    #[strum(serialize = "values", serialize = "vals")]
    Values,
    #[strum(serialize = "string", serialize = "str")]
    String,
    #[strum(serialize = "array")]
    Array,
    #[strum(serialize = "bytearray")]
    ByteArray,
    #[strum(serialize = "anything", serialize = "any")]
    Anything,
}

/// The table a reference operand points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, EnumIter)]
pub enum RefTarget {
    Label,
    InternSymbol,
    ExternSymbol,
    Module,
    Data,
    Values,
    String,
}

fn any_of(targets: &[RefTarget]) -> EnumMap<RefTarget, bool> {
    enum_map! { target => targets.contains(&target) }
}

fn all() -> EnumMap<RefTarget, bool> {
    enum_map! { _ => true }
}

static REFERENCE_TABLE: Lazy<EnumMap<ArgType, EnumMap<RefTarget, bool>>> = Lazy::new(|| {
    enum_map! {
        ArgType::Number => all(),
        ArgType::Byte => all(),
        ArgType::Anything => all(),
        ArgType::Label => any_of(&[RefTarget::Label]),
        ArgType::ShortLabelFw => any_of(&[RefTarget::Label]),
        ArgType::ShortLabelBw => any_of(&[RefTarget::Label]),
        ArgType::InternSymbol => any_of(&[RefTarget::InternSymbol]),
        ArgType::ExternSymbol => any_of(&[RefTarget::ExternSymbol]),
        ArgType::Module => any_of(&[RefTarget::Module]),
        ArgType::Data => any_of(&[RefTarget::Data]),
        ArgType::Values => any_of(&[RefTarget::Values]),
        ArgType::String => any_of(&[RefTarget::String]),
        ArgType::Array => any_of(&[RefTarget::Values, RefTarget::Data, RefTarget::String]),
        ArgType::ByteArray => any_of(&[RefTarget::Data, RefTarget::String]),
    }
});

impl ArgType {
    pub fn name(self) -> &'static str {
        match self {
            ArgType::Number => "number",
            ArgType::Byte => "byte",
            ArgType::Label => "label",
            ArgType::ShortLabelFw => "shortlabelfw",
            ArgType::ShortLabelBw => "shortlabelbw",
            ArgType::InternSymbol => "internsymbol",
            ArgType::ExternSymbol => "externsymbol",
            ArgType::Module => "module",
            ArgType::Data => "data",
            ArgType::Values => "values",
            ArgType::String => "string",
            ArgType::Array => "array",
            ArgType::ByteArray => "bytearray",
            ArgType::Anything => "anything",
        }
    }

    /// `Anything` is encoded at the wide target, since it may carry any operand.
    pub fn target(self) -> Target {
        match self {
            ArgType::Number | ArgType::Label | ArgType::Anything => Target::Number,
            _ => Target::Byte,
        }
    }

    pub fn accepts_reference(self, target: RefTarget) -> bool {
        REFERENCE_TABLE[self][target]
    }

    pub fn encoded_len(self, width: BitWidth) -> usize {
        match self.target() {
            Target::Number => width.bytes(),
            Target::Byte => 1,
        }
    }
}

impl Display for ArgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Display for RefTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefTarget::Label => write!(f, "label"),
            RefTarget::InternSymbol => write!(f, "symbol"),
            RefTarget::ExternSymbol => write!(f, "extern"),
            RefTarget::Module => write!(f, "module"),
            RefTarget::Data => write!(f, "data"),
            RefTarget::Values => write!(f, "values"),
            RefTarget::String => write!(f, "string"),
        }
    }
}

/// A mnemonic's encoding contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstDef {
    pub name: String,
    pub opcode: OpCode,
    pub args: Vec<ArgType>,
}

impl InstDef {
    pub fn new(name: &str, opcode: OpCode, args: Vec<ArgType>) -> Self {
        InstDef {
            name: name.to_lowercase(),
            opcode,
            args,
        }
    }

    pub fn with_0(name: &str, opcode: OpCode) -> Self {
        InstDef::new(name, opcode, vec![])
    }

    pub fn with_1(name: &str, opcode: OpCode, arg: ArgType) -> Self {
        InstDef::new(name, opcode, vec![arg])
    }

    pub fn with_2(name: &str, opcode: OpCode, arg1: ArgType, arg2: ArgType) -> Self {
        InstDef::new(name, opcode, vec![arg1, arg2])
    }

    pub fn is_extended(&self) -> bool {
        self.opcode >= EXTENDED_OPCODE_MIN
    }

    /// The opcode byte plus every operand at its target width.
    pub fn encoded_len(&self, width: BitWidth) -> usize {
        1 + self
            .args
            .iter()
            .map(|arg| arg.encoded_len(width))
            .sum::<usize>()
    }
}

impl Display for InstDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (${:02X})", self.name, self.opcode)?;
        for (idx, arg) in self.args.iter().enumerate() {
            write!(f, "{}{}", if idx == 0 { " " } else { ", " }, arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn names_parse_back() {
        for kind in ArgType::iter() {
            assert_eq!(ArgType::from_str(kind.name()), Ok(kind));
        }
        assert_eq!(ArgType::from_str("slabelbw"), Ok(ArgType::ShortLabelBw));
        assert!(ArgType::from_str("register").is_err());
    }

    #[test]
    fn array_contracts() {
        assert!(ArgType::Array.accepts_reference(RefTarget::Values));
        assert!(ArgType::Array.accepts_reference(RefTarget::Data));
        assert!(ArgType::Array.accepts_reference(RefTarget::String));
        assert!(!ArgType::Array.accepts_reference(RefTarget::Module));
        assert!(ArgType::ByteArray.accepts_reference(RefTarget::String));
        assert!(!ArgType::ByteArray.accepts_reference(RefTarget::Values));
    }

    #[test]
    fn refined_contracts_accept_only_their_target() {
        for target in RefTarget::iter() {
            assert_eq!(
                ArgType::String.accepts_reference(target),
                target == RefTarget::String
            );
            assert_eq!(
                ArgType::InternSymbol.accepts_reference(target),
                target == RefTarget::InternSymbol
            );
            assert!(ArgType::Anything.accepts_reference(target));
        }
    }

    #[test]
    fn encoded_lengths() {
        let def = InstDef::with_2("callx", 0x09, ArgType::Module, ArgType::ExternSymbol);
        assert_eq!(def.encoded_len(BitWidth::W64), 3);
        let def = InstDef::with_1("push", 0x01, ArgType::Number);
        assert_eq!(def.encoded_len(BitWidth::W32), 5);
        assert!(!def.is_extended());
    }
}
