use crate::isa::{
    defs,
    types::{
        hw::{OpCode, EXTENDED_OPCODE_MIN, NATIVE_OPCODE_MAX},
        schema::InstDef,
    },
};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt::Display;

static NATIVE: Lazy<Lang> = Lazy::new(Lang::native);

/// The instruction signature table of one assembly run. Starts out as a copy of the
/// native instruction set, and grows by `.extinstr` declarations.
#[derive(Debug, Clone)]
pub struct Lang {
    insts: HashMap<String, InstDef>,
    opcodes: HashMap<OpCode, String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterError {
    NameTaken(String),
    OpcodeTaken(OpCode, String),
    NotExtended(OpCode),
}

impl Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterError::NameTaken(name) => {
                write!(f, "an instruction named '{}' already exists", name)
            }
            RegisterError::OpcodeTaken(op, name) => {
                write!(f, "opcode ${:02X} is already taken by '{}'", op, name)
            }
            RegisterError::NotExtended(op) => write!(
                f,
                "opcode ${:02X} is not in the extended range ${:02X}-$FF",
                op, EXTENDED_OPCODE_MIN
            ),
        }
    }
}

impl Lang {
    fn sanitize_name(name: &str) -> String {
        name.to_lowercase()
    }

    fn native() -> Self {
        let mut builder = Builder::new();
        defs::inst::register(&mut builder);
        builder.build()
    }

    pub fn get_native() -> &'static Lang {
        Lazy::force(&NATIVE)
    }

    pub fn new() -> Self {
        Lang::get_native().clone()
    }

    pub fn lookup(&self, name: &str) -> Option<&InstDef> {
        self.insts.get(&Self::sanitize_name(name))
    }

    pub fn lookup_opcode(&self, opcode: OpCode) -> Option<&InstDef> {
        self.opcodes
            .get(&opcode)
            .and_then(|name| self.insts.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstDef> {
        self.insts.values()
    }

    pub fn register_extended(&mut self, def: InstDef) -> Result<(), RegisterError> {
        if !def.is_extended() {
            return Err(RegisterError::NotExtended(def.opcode));
        }

        if self.insts.contains_key(&def.name) {
            return Err(RegisterError::NameTaken(def.name));
        }

        if let Some(owner) = self.opcodes.get(&def.opcode) {
            return Err(RegisterError::OpcodeTaken(def.opcode, owner.clone()));
        }

        log::debug!("registered extended instruction {}", def);
        self.insert(def);
        Ok(())
    }

    fn insert(&mut self, def: InstDef) {
        self.opcodes.insert(def.opcode, def.name.clone());
        self.insts.insert(def.name.clone(), def);
    }
}

impl Default for Lang {
    fn default() -> Self {
        Lang::new()
    }
}

pub struct Builder {
    lang: Lang,
}

impl Builder {
    fn new() -> Self {
        Builder {
            lang: Lang {
                insts: HashMap::new(),
                opcodes: HashMap::new(),
            },
        }
    }

    fn build(self) -> Lang {
        self.lang
    }

    pub(crate) fn register(&mut self, def: InstDef) {
        assert!(def.opcode <= NATIVE_OPCODE_MAX);
        assert!(!self.lang.insts.contains_key(&def.name));
        assert!(!self.lang.opcodes.contains_key(&def.opcode));

        self.lang.insert(def)
    }
}
