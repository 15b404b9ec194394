use super::types::{ErrorKind, Located};
use super::validate;
use crate::assembler::model::{
    Binary, Binding, Instruction, Operand, Reference, Session, Symbol, SymbolBlob,
};
use crate::isa::types::{
    hw::{BitWidth, Byte, MAX_SYMBOLS},
    schema::RefTarget,
};
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    TooManySymbols,
    UnresolvedReference(String),
    BadArgument {
        mnemonic: String,
        position: usize,
        err: validate::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TooManySymbols => ErrorKind::Capacity,
            Error::UnresolvedReference(_) => ErrorKind::Reference,
            Error::BadArgument { err, .. } => err.kind(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TooManySymbols => write!(f, "Too many symbols (at most {})", MAX_SYMBOLS),
            Error::UnresolvedReference(name) => write!(f, "Unresolved reference '{}'", name),
            Error::BadArgument {
                mnemonic,
                position,
                err,
            } => write!(
                f,
                "Signature mismatch: '{}' argument {}: {}",
                mnemonic,
                position + 1,
                err
            ),
        }
    }
}

/// Gives every symbol its container index. Fixed indices are claimed first, the rest take
/// the lowest free index in declaration order.
fn allocate_indices(symbols: &[Symbol]) -> Result<Vec<Byte>, Located<Error>> {
    let mut taken = [false; MAX_SYMBOLS];
    for idx in symbols.iter().filter_map(|sym| sym.fixed) {
        taken[idx as usize] = true;
    }

    let mut free = (0..MAX_SYMBOLS).filter(|idx| !taken[*idx]);
    symbols
        .iter()
        .map(|sym| match sym.fixed {
            Some(idx) => Ok(idx),
            None => free.next().map(|idx| idx as Byte).ok_or_else(|| {
                Located::from(Error::TooManySymbols).proximate_to_option_loc(sym.loc)
            }),
        })
        .collect()
}

struct Resolver<'a> {
    session: &'a Session,
    indices: &'a [Byte],
}

impl<'a> Resolver<'a> {
    fn lookup(&self, symbol: &Symbol, inst: &Instruction, name: &str) -> Option<Operand> {
        if let Some(offset) = symbol.labels.get(name) {
            let distance = *offset as i64 - inst.offset as i64;
            return Some(Operand::NumRef(RefTarget::Label, distance));
        }

        Some(match self.session.refs.get(name)? {
            Reference::Symbol(id) => Operand::ByteRef(RefTarget::InternSymbol, self.indices[*id]),
            Reference::Constant(idx, kind) => Operand::ByteRef(kind.target(), *idx),
            Reference::Module(slot) => Operand::ByteRef(RefTarget::Module, *slot),
            Reference::Extern(idx) => Operand::ByteRef(RefTarget::ExternSymbol, *idx),
        })
    }

    fn operand(
        &self,
        symbol: &Symbol,
        inst: &Instruction,
        arg: &Located<Binding>,
    ) -> Result<Operand, Located<Error>> {
        match arg.inner() {
            Binding::Resolved(operand) => Ok(*operand),
            Binding::Unresolved(name) => self
                .lookup(symbol, inst, name)
                .ok_or_else(|| arg.transfer(Error::UnresolvedReference(name.clone()))),
        }
    }

    fn emit(&self, symbol: &Symbol, width: BitWidth) -> Result<Vec<Byte>, Located<Error>> {
        let mut body = Vec::with_capacity(symbol.size);
        for inst in &symbol.insts {
            body.push(inst.def.opcode);
            for (position, (contract, arg)) in inst.def.args.iter().zip(&inst.args).enumerate() {
                let operand = self.operand(symbol, inst, arg)?;
                let encoded = validate::normalize_arg(*contract, &operand, width).map_err(|err| {
                    arg.transfer(Error::BadArgument {
                        mnemonic: inst.def.name.clone(),
                        position,
                        err,
                    })
                })?;
                encoded.write(width, &mut body);
            }
        }

        debug_assert_eq!(body.len(), symbol.size);
        Ok(body)
    }
}

/// Resolves every named operand and encodes the symbol bodies, giving the finished container.
pub fn resolve(session: Session) -> Result<Binary, Located<Error>> {
    let indices = allocate_indices(&session.symbols)?;
    let resolver = Resolver {
        session: &session,
        indices: &indices,
    };

    let width = session.width();
    let mut symbols = Vec::with_capacity(session.symbols.len());
    for (symbol, index) in session.symbols.iter().zip(indices.iter()) {
        let body = resolver.emit(symbol, width)?;
        log::debug!(
            "symbol '{}' -> index {}, {} byte(s)",
            symbol.name,
            index,
            body.len()
        );
        symbols.push(SymbolBlob {
            name: Some(symbol.name.clone()),
            index: *index,
            body,
        });
    }

    Ok(Binary {
        ty: session.ty,
        meta: session.meta,
        slots: session.slots,
        constants: session.pool.into_entries(),
        symbols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::phases::{compile::compile, precompile::precompile};
    use crate::assembler::phases::preprocess::{MemoryProvider, Preprocessor};
    use crate::isa::types::schema::ArgType;

    fn run(source: &str) -> Result<Binary, Error> {
        let mut provider = MemoryProvider::new().with("main.cws", source);
        let items = Preprocessor::new(&mut provider).run("main.cws").unwrap();
        let (mut session, deferred) = precompile(&items).unwrap();
        compile(&mut session, &deferred).unwrap();
        resolve(session).map_err(Located::value)
    }

    fn body(binary: &Binary, name: &str) -> Vec<Byte> {
        binary.symbol(name).unwrap().body.clone()
    }

    #[test]
    fn minimal_executable() {
        let binary = run(".cwx:16\n.symbol main\nnop\neop\n").unwrap();
        assert_eq!(binary.symbols.len(), 1);
        assert_eq!(binary.symbols[0].index, 0);
        assert_eq!(body(&binary, "main"), vec![0x00, 0x07]);
    }

    #[test]
    fn string_literal_as_number() {
        let binary = run(concat!(
            ".cwx:32\n",
            ".str first, \"y\"\n",
            ".symbol main\n",
            "push \"x\"\n",
            "eop\n",
        ))
        .unwrap();
        assert_eq!(binary.constants, vec![b"y".to_vec(), b"x".to_vec()]);
        assert_eq!(body(&binary, "main"), vec![0x20, 1, 0, 0, 0, 0x07]);
    }

    #[test]
    fn label_distances() {
        let binary = run(concat!(
            ".cwx:16\n",
            ".symbol main\n",
            "top: nop\n",
            "jfw end\n",
            "jmp top\n",
            "end: jbw top\n",
        ))
        .unwrap();
        assert_eq!(
            body(&binary, "main"),
            vec![0x00, 0x13, 5, 0x10, 0xFD, 0xFF, 0x14, 6]
        );
    }

    #[test]
    fn short_label_direction() {
        assert_eq!(
            run(".cwx:16\n.symbol main\ntop: jfw top\n"),
            Err(Error::BadArgument {
                mnemonic: "jfw".to_owned(),
                position: 0,
                err: validate::Error::OutOfRange(ArgType::ShortLabelFw, 0),
            })
        );
    }

    #[test]
    fn symbol_indices() {
        let binary = run(concat!(
            ".cwx:16\n",
            ".symbol a\n",
            "ret\n",
            ".symbol b, 0\n",
            "call a\n",
            ".symbol c\n",
            "call c\n",
        ))
        .unwrap();
        assert_eq!(
            binary
                .symbols
                .iter()
                .map(|sym| sym.index)
                .collect::<Vec<_>>(),
            vec![1, 0, 2]
        );
        assert_eq!(body(&binary, "b"), vec![0x08, 1]);
        assert_eq!(body(&binary, "c"), vec![0x08, 2]);
    }

    #[test]
    fn forward_symbol_reference() {
        let binary = run(".cwx:16\n.symbol main\ncall helper\neop\n.symbol helper\nret\n").unwrap();
        assert_eq!(body(&binary, "main"), vec![0x08, 1, 0x07]);
    }

    #[test]
    fn table_references() {
        let binary = run(concat!(
            ".cwx:32\n",
            ".module io, 3\n",
            ".extern print_line, 9\n",
            ".data blob, [1, 2, 3]\n",
            ".str greeting, \"hi\"\n",
            ".symbol main\n",
            "callx io, print_line\n",
            "lds greeting\n",
            "ldd blob\n",
            "lda greeting\n",
            "lds \"hi\"\n",
            "push blob\n",
            "eop\n",
        ))
        .unwrap();
        assert_eq!(binary.constants, vec![vec![1, 2, 3], b"hi".to_vec()]);
        assert_eq!(
            body(&binary, "main"),
            vec![
                0x09, 3, 9, 0x52, 1, 0x53, 0, 0x50, 1, 0x52, 1, 0x20, 0, 0, 0, 0, 0x07
            ]
        );
    }

    #[test]
    fn unresolved_and_mismatched() {
        assert_eq!(
            run(".cwx:16\n.symbol main\njmp nowhere\n"),
            Err(Error::UnresolvedReference("nowhere".to_owned()))
        );
        assert_eq!(
            run(".cwx:16\n.str s, \"x\"\n.symbol main\nldd s\n"),
            Err(Error::BadArgument {
                mnemonic: "ldd".to_owned(),
                position: 0,
                err: validate::Error::Incompatible(
                    ArgType::Data,
                    Operand::ByteRef(RefTarget::String, 0)
                ),
            })
        );
    }

    #[test]
    fn labels_are_local_to_their_symbol() {
        assert_eq!(
            run(".cwx:16\n.symbol a\nhere: nop\n.symbol b\njmp here\n"),
            Err(Error::UnresolvedReference("here".to_owned()))
        );
    }

    #[test]
    fn symbol_table_capacity() {
        let mut source = String::from(".cwx:16\n");
        for i in 0..=MAX_SYMBOLS {
            source.push_str(&format!(".symbol s{}\nret\n", i));
        }
        assert_eq!(run(&source), Err(Error::TooManySymbols));
    }
}
