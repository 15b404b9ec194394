use super::types::{ErrorKind, Item, Located};
use super::validate;
use crate::assembler::model::{Binding, Instruction, Operand, Reference, Session, Symbol};
use crate::isa::types::hw::{Byte, MAX_SYMBOL_INDEX};
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    OutsideSymbol,
    UnknownDirective(String),
    UnknownInstruction(String),
    NameCollision(String),
    DuplicateLabel(String),
    SymbolIndexOutOfRange(i64),
    DuplicateSymbolIndex(Byte),
    UnexpectedToken(String, &'static str),
    ArgCount {
        mnemonic: String,
        expected: usize,
        found: usize,
    },
    BadArgument {
        mnemonic: String,
        position: usize,
        err: validate::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutsideSymbol | Error::UnknownDirective(_) => ErrorKind::Structural,
            Error::UnknownInstruction(_)
            | Error::NameCollision(_)
            | Error::DuplicateLabel(_)
            | Error::SymbolIndexOutOfRange(_)
            | Error::DuplicateSymbolIndex(_) => ErrorKind::Reference,
            Error::UnexpectedToken(..) | Error::ArgCount { .. } => ErrorKind::Argument,
            Error::BadArgument { err, .. } => err.kind(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::OutsideSymbol => write!(f, "Instructions and labels must follow '.symbol'"),
            Error::UnknownDirective(name) => write!(f, "Unknown directive '.{}'", name),
            Error::UnknownInstruction(name) => write!(f, "Unknown instruction '{}'", name),
            Error::NameCollision(name) => write!(f, "The name '{}' is already taken", name),
            Error::DuplicateLabel(name) => {
                write!(f, "Label '{}' is already defined in this symbol", name)
            }
            Error::SymbolIndexOutOfRange(idx) => write!(
                f,
                "Symbol index {} is out of range (0-{})",
                idx, MAX_SYMBOL_INDEX
            ),
            Error::DuplicateSymbolIndex(idx) => {
                write!(f, "Symbol index {} is already fixed by another symbol", idx)
            }
            Error::UnexpectedToken(found, expected) => {
                write!(f, "Unexpected token '{}', expected {}", found, expected)
            }
            Error::ArgCount {
                mnemonic,
                expected,
                found,
            } => write!(
                f,
                "Signature mismatch: '{}' takes {} argument(s), found {}",
                mnemonic, expected, found
            ),
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

fn unexpected(item: &Located<Item>, expected: &'static str) -> Located<Error> {
    item.transfer(Error::UnexpectedToken(item.inner().to_string(), expected))
}

fn operand(item: &Located<Item>) -> Result<Located<Binding>, Located<Error>> {
    let binding = match item.inner() {
        Item::Number(n) => Binding::Resolved(Operand::Value(*n)),
        Item::ConstRef(idx, kind) => Binding::Resolved(Operand::ByteRef(kind.target(), *idx)),
        Item::Word(name) => Binding::Unresolved(name.clone()),
        _ => return Err(unexpected(item, "an argument")),
    };
    Ok(item.transfer(binding))
}

struct Compiler<'a> {
    session: &'a mut Session,
    current: Option<usize>,
}

impl<'a> Compiler<'a> {
    fn symbol(&mut self, line: &[Located<Item>]) -> Result<(), Located<Error>> {
        let head = &line[0];
        let (name, name_item) = match line.get(1) {
            Some(item) => match item.inner() {
                Item::Word(name) => (name, item),
                _ => return Err(unexpected(item, "a symbol name")),
            },
            None => return Err(unexpected(head, "a symbol name")),
        };

        let fixed = match &line[2..] {
            [] => None,
            [sep, idx] => {
                match sep.inner() {
                    Item::Separator(_) => (),
                    _ => return Err(unexpected(sep, "a separator")),
                }
                match idx.inner() {
                    Item::Number(n) if *n >= 0 && *n <= MAX_SYMBOL_INDEX as i64 => Some(*n as Byte),
                    Item::Number(n) => return Err(idx.transfer(Error::SymbolIndexOutOfRange(*n))),
                    _ => return Err(unexpected(idx, "a symbol index")),
                }
            }
            [other] => return Err(unexpected(other, "a separator")),
            [_, _, extra, ..] => return Err(unexpected(extra, "end of line")),
        };

        if self.session.is_name_taken(name) {
            return Err(name_item.transfer(Error::NameCollision(name.clone())));
        }
        if let Some(idx) = fixed {
            if self.session.symbols.iter().any(|sym| sym.fixed == Some(idx)) {
                return Err(name_item.transfer(Error::DuplicateSymbolIndex(idx)));
            }
        }

        let id = self.session.symbols.len();
        log::debug!("symbol '{}' (fixed index: {:?})", name, fixed);
        self.session
            .symbols
            .push(Symbol::new(name.clone(), fixed, head.loc()));
        self.session
            .refs
            .insert(name.clone(), Reference::Symbol(id));
        self.current = Some(id);
        Ok(())
    }

    fn current(&mut self, at: &Located<Item>) -> Result<&mut Symbol, Located<Error>> {
        match self.current {
            Some(id) => Ok(&mut self.session.symbols[id]),
            None => Err(at.transfer(Error::OutsideSymbol)),
        }
    }

    fn instruction(&mut self, line: &[Located<Item>]) -> Result<(), Located<Error>> {
        let head = &line[0];
        let mnemonic = match head.inner() {
            Item::Word(name) => name,
            _ => return Err(unexpected(head, "an instruction")),
        };
        let def = self
            .session
            .lang
            .lookup(mnemonic)
            .cloned()
            .ok_or_else(|| head.transfer(Error::UnknownInstruction(mnemonic.clone())))?;

        let mut args = Vec::new();
        let mut rest = line[1..].iter();
        while let Some(item) = rest.next() {
            args.push(operand(item)?);
            match rest.next() {
                None => break,
                Some(sep) => match sep.inner() {
                    Item::Separator(_) => (),
                    _ => return Err(unexpected(sep, "a separator")),
                },
            }
            if rest.as_slice().is_empty() {
                return Err(line[line.len() - 1].transfer(Error::UnexpectedToken(
                    String::from(","),
                    "an argument",
                )));
            }
        }

        if args.len() != def.args.len() {
            return Err(head.transfer(Error::ArgCount {
                mnemonic: def.name.clone(),
                expected: def.args.len(),
                found: args.len(),
            }));
        }

        let width = self.session.width();
        for (position, (contract, arg)) in def.args.iter().zip(args.iter()).enumerate() {
            if let Binding::Resolved(operand) = arg.inner() {
                validate::normalize_arg(*contract, operand, width).map_err(|err| {
                    arg.transfer(Error::BadArgument {
                        mnemonic: def.name.clone(),
                        position,
                        err,
                    })
                })?;
            }
        }

        let symbol = self.current(head)?;
        let len = def.encoded_len(width);
        log::trace!("{} at {}+{}", def.name, symbol.name, symbol.size);
        symbol.insts.push(Instruction {
            def,
            offset: symbol.size,
            args,
            loc: head.loc(),
        });
        symbol.size += len;
        Ok(())
    }

    fn line(&mut self, line: &[Located<Item>]) -> Result<(), Located<Error>> {
        let head = &line[0];
        match head.inner() {
            Item::Directive(name) if name == "symbol" => return self.symbol(line),
            Item::Directive(name) => {
                return Err(head.transfer(Error::UnknownDirective(name.clone())))
            }
            _ => (),
        }

        let mut line = line;
        if let (Item::Word(label), Some(Item::Separator(':'))) =
            (head.inner(), line.get(1).map(Located::inner))
        {
            let symbol = self.current(head)?;
            if symbol.labels.contains_key(label) {
                return Err(head.transfer(Error::DuplicateLabel(label.clone())));
            }
            symbol.labels.insert(label.clone(), symbol.size);
            line = &line[2..];
            if line.is_empty() {
                return Ok(());
            }
        }

        self.instruction(line)
    }
}

/// The second pass. Opens symbols, records labels and checks each instruction against its
/// signature. Named operands are left for resolution.
pub fn compile(session: &mut Session, items: &[Located<Item>]) -> Result<(), Located<Error>> {
    let mut compiler = Compiler {
        session,
        current: None,
    };

    for line in items
        .split(|item| *item.inner() == Item::Break)
        .filter(|line| !line.is_empty())
    {
        compiler.line(line)?;
    }

    log::debug!("second pass: {} symbol(s)", compiler.session.symbols.len());
    Ok(())
}
