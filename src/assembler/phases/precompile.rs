use super::types::{ErrorKind, Item, Loc, Located};
use crate::assembler::lang::RegisterError;
use crate::assembler::model::{
    BinaryKind, BinaryType, ConstKind, ModuleSlot, PoolError, Reference, Session,
};
use crate::isa::types::{
    hw::{self, BitWidth, Byte, MAX_MODULE_NAME_LEN, MAX_SLOTS, MAX_SLOT_INDEX, MAX_SYMBOL_INDEX},
    schema::{ArgType, InstDef},
};
use std::fmt::Display;
use std::str::FromStr;
use strum_macros::EnumString;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ExpectedHeader(String),
    DuplicateHeader,
    InvalidWidth(i64),
    UnexpectedEof(&'static str),
    UnexpectedToken(String, &'static str),
    ValueOutOfRange(i64, &'static str),
    NameCollision(String),
    ModuleNameTooLong(String),
    DuplicateSlot(Byte),
    SlotOutOfRange(i64),
    TooManySlots,
    ExternOutOfRange(i64),
    UnknownArgType(String),
    Register(RegisterError),
    Pool(PoolError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ExpectedHeader(_)
            | Error::DuplicateHeader
            | Error::InvalidWidth(_)
            | Error::UnexpectedEof(_) => ErrorKind::Structural,
            Error::UnexpectedToken(..)
            | Error::ValueOutOfRange(..)
            | Error::ModuleNameTooLong(_)
            | Error::UnknownArgType(_)
            | Error::Pool(PoolError::Empty) => ErrorKind::Argument,
            Error::NameCollision(_)
            | Error::DuplicateSlot(_)
            | Error::SlotOutOfRange(_)
            | Error::ExternOutOfRange(_)
            | Error::Register(_) => ErrorKind::Reference,
            Error::TooManySlots | Error::Pool(PoolError::Full) => ErrorKind::Capacity,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ExpectedHeader(found) => write!(
                f,
                "Expected header '.cwx'/'.executable' or '.cwl'/'.library', found '{}'",
                found
            ),
            Error::DuplicateHeader => write!(f, "The header may only be given once"),
            Error::InvalidWidth(bits) => {
                write!(f, "Invalid bit width {}, expected 16, 32 or 64", bits)
            }
            Error::UnexpectedEof(expected) => {
                write!(f, "Unexpected end of line, expected {}", expected)
            }
            Error::UnexpectedToken(found, expected) => {
                write!(f, "Unexpected token '{}', expected {}", found, expected)
            }
            Error::ValueOutOfRange(val, target) => {
                write!(f, "Value {} is out of range for {}", val, target)
            }
            Error::NameCollision(name) => write!(f, "The name '{}' is already taken", name),
            Error::ModuleNameTooLong(name) => write!(
                f,
                "Module name '{}' must be at most {} ASCII characters",
                name, MAX_MODULE_NAME_LEN
            ),
            Error::DuplicateSlot(slot) => write!(f, "Module slot {} is already taken", slot),
            Error::SlotOutOfRange(slot) => write!(
                f,
                "Module slot {} is out of range (0-{})",
                slot, MAX_SLOT_INDEX
            ),
            Error::TooManySlots => write!(f, "Too many module slots (at most {})", MAX_SLOTS),
            Error::ExternOutOfRange(idx) => write!(
                f,
                "External symbol index {} is out of range (0-{})",
                idx, MAX_SYMBOL_INDEX
            ),
            Error::UnknownArgType(name) => write!(f, "Unknown argument type '{}'", name),
            Error::Register(err) => write!(f, "{}", err),
            Error::Pool(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
enum Directive {
    #[strum(serialize = "data")]
    Data,
    #[strum(serialize = "str", serialize = "string")]
    Str,
    #[strum(serialize = "vals", serialize = "values")]
    Values,
    #[strum(serialize = "module")]
    Module,
    #[strum(serialize = "optmodule")]
    OptModule,
    #[strum(serialize = "extern")]
    Extern,
    #[strum(serialize = "extinstr")]
    ExtInstr,
    #[strum(serialize = "title")]
    Title,
    #[strum(serialize = "author", serialize = "copyright")]
    Author,
    #[strum(serialize = "description")]
    Description,
    #[strum(serialize = "version")]
    Version,
    #[strum(serialize = "runtime")]
    Runtime,
    #[strum(serialize = "resources")]
    Resources,
}

fn header_kind(name: &str) -> Option<BinaryKind> {
    match name {
        "cwx" | "executable" => Some(BinaryKind::Executable),
        "cwl" | "library" => Some(BinaryKind::Library),
        _ => None,
    }
}

fn unexpected(item: &Located<Item>, expected: &'static str) -> Located<Error> {
    item.transfer(Error::UnexpectedToken(item.inner().to_string(), expected))
}

/// A cursor over the arguments of one directive line.
struct Args<'a> {
    head: &'a Located<Item>,
    items: &'a [Located<Item>],
    pos: usize,
}

impl<'a> Args<'a> {
    fn new(line: &'a [Located<Item>]) -> Self {
        Args {
            head: &line[0],
            items: &line[1..],
            pos: 0,
        }
    }

    fn last(&self) -> &'a Located<Item> {
        self.items.last().unwrap_or(self.head)
    }

    fn is_done(&self) -> bool {
        self.pos >= self.items.len()
    }

    fn peek(&self) -> Option<&'a Item> {
        self.items.get(self.pos).map(Located::inner)
    }

    fn next(&mut self, expected: &'static str) -> Result<&'a Located<Item>, Located<Error>> {
        let item = self
            .items
            .get(self.pos)
            .ok_or_else(|| self.last().transfer(Error::UnexpectedEof(expected)))?;
        self.pos += 1;
        Ok(item)
    }

    fn name(&mut self) -> Result<(&'a str, Option<Loc>), Located<Error>> {
        let item = self.next("a name")?;
        match item.inner() {
            Item::Word(name) => Ok((name, item.loc())),
            _ => Err(unexpected(item, "a name")),
        }
    }

    fn number(&mut self, expected: &'static str) -> Result<Located<i64>, Located<Error>> {
        let item = self.next(expected)?;
        match item.inner() {
            Item::Number(n) => Ok(item.transfer(*n)),
            _ => Err(unexpected(item, expected)),
        }
    }

    fn byte(&mut self, expected: &'static str) -> Result<Byte, Located<Error>> {
        let n = self.number(expected)?;
        if hw::fits_byte(*n.inner()) {
            Ok(*n.inner() as Byte)
        } else {
            Err(n.map(|n| Error::ValueOutOfRange(n, expected)))
        }
    }

    fn string(&mut self) -> Result<&'a str, Located<Error>> {
        let item = self.next("a string")?;
        match item.inner() {
            Item::Str(s) => Ok(s),
            _ => Err(unexpected(item, "a string")),
        }
    }

    fn separator(&mut self) -> Result<(), Located<Error>> {
        let item = self.next("a separator")?;
        match item.inner() {
            Item::Separator(_) => Ok(()),
            _ => Err(unexpected(item, "a separator")),
        }
    }

    /// Consumes a separator if there is anything left on the line.
    fn more(&mut self) -> Result<bool, Located<Error>> {
        if self.is_done() {
            return Ok(false);
        }
        self.separator()?;
        Ok(true)
    }

    fn finish(&self) -> Result<(), Located<Error>> {
        match self.items.get(self.pos) {
            None => Ok(()),
            Some(item) => Err(unexpected(item, "end of line")),
        }
    }

    /// A separated list of literals, optionally grouped by (ignored) brackets.
    fn elements(&mut self) -> Result<Vec<&'a Located<Item>>, Located<Error>> {
        let mut out = Vec::new();
        let mut depth = 0usize;
        loop {
            let item = self.next("a value")?;
            match item.inner() {
                Item::BracketOpen => {
                    depth += 1;
                    continue;
                }
                Item::Number(_) | Item::Str(_) => out.push(item),
                _ => return Err(unexpected(item, "a value")),
            }

            while depth > 0 && self.peek() == Some(&Item::BracketClose) {
                self.pos += 1;
                depth -= 1;
            }

            if !self.more()? {
                break;
            }
        }

        if depth != 0 {
            return Err(self.last().transfer(Error::UnexpectedEof("']'")));
        }
        Ok(out)
    }

    /// Two or three bytes, the third defaulting to zero.
    fn version(&mut self, required: usize) -> Result<[Byte; 3], Located<Error>> {
        let mut out = [0; 3];
        for (idx, slot) in out.iter_mut().enumerate() {
            if idx > 0 && !self.more()? {
                if idx < required {
                    return Err(self.last().transfer(Error::UnexpectedEof("a separator")));
                }
                break;
            }
            *slot = self.byte("a version byte")?;
        }
        Ok(out)
    }
}

fn claim_name(session: &Session, name: &str, loc: Option<Loc>) -> Result<(), Located<Error>> {
    if session.is_name_taken(name) {
        let err = Error::NameCollision(name.to_owned());
        return Err(match loc {
            Some(loc) => Located::with_loc(loc, err),
            None => err.into(),
        });
    }
    Ok(())
}

fn register_constant(
    session: &mut Session,
    head: &Located<Item>,
    name: &str,
    kind: ConstKind,
    bytes: Vec<Byte>,
) -> Result<(), Located<Error>> {
    let idx = session
        .pool
        .register(bytes)
        .map_err(|err| head.transfer(Error::Pool(err)))?;
    session
        .refs
        .insert(name.to_owned(), Reference::Constant(idx, kind));
    log::debug!("{} constant '{}' is entry {}", kind, name, idx);
    Ok(())
}

fn set_text(field: &mut String, what: &str, text: &str) {
    if text.is_empty() {
        log::warn!("empty {} string", what);
    }
    if !field.is_empty() {
        log::warn!("{} set more than once, keeping the last", what);
    }
    *field = text.to_owned();
}

impl Directive {
    fn apply(self, session: &mut Session, args: &mut Args) -> Result<(), Located<Error>> {
        let width = session.width();
        match self {
            Directive::Data | Directive::Values | Directive::Str => {
                let (name, loc) = args.name()?;
                claim_name(session, name, loc)?;
                args.separator()?;

                let mut bytes = Vec::new();
                let kind = match self {
                    Directive::Str => {
                        bytes.extend_from_slice(args.string()?.as_bytes());
                        ConstKind::String
                    }
                    Directive::Data => {
                        for item in args.elements()? {
                            match item.inner() {
                                Item::Number(n) if hw::fits_byte(*n) => bytes.push(*n as Byte),
                                Item::Number(n) => {
                                    return Err(item.transfer(Error::ValueOutOfRange(*n, "a byte")))
                                }
                                Item::Str(s) => bytes.extend_from_slice(s.as_bytes()),
                                _ => return Err(unexpected(item, "a byte")),
                            }
                        }
                        ConstKind::Data
                    }
                    _ => {
                        for item in args.elements()? {
                            match item.inner() {
                                Item::Number(n) if width.fits_value(*n) => {
                                    width.encode_into(*n as u64, &mut bytes)
                                }
                                Item::Number(n) => {
                                    return Err(item.transfer(Error::ValueOutOfRange(
                                        *n,
                                        "the container width",
                                    )))
                                }
                                _ => return Err(unexpected(item, "a number")),
                            }
                        }
                        ConstKind::Values
                    }
                };
                register_constant(session, args.head, name, kind, bytes)?;
            }
            Directive::Module | Directive::OptModule => {
                let (name, loc) = args.name()?;
                args.separator()?;
                let slot = args.number("a slot index")?;

                if name.len() > MAX_MODULE_NAME_LEN || !name.is_ascii() {
                    return Err(args.head.transfer(Error::ModuleNameTooLong(name.to_owned())));
                }
                if *slot.inner() < 0 || *slot.inner() > MAX_SLOT_INDEX as i64 {
                    return Err(slot.map(Error::SlotOutOfRange));
                }
                let index = *slot.inner() as Byte;
                if session.slots.iter().any(|other| other.index == index) {
                    return Err(slot.transfer(Error::DuplicateSlot(index)));
                }
                if session.slots.len() >= MAX_SLOTS {
                    return Err(args.head.transfer(Error::TooManySlots));
                }
                claim_name(session, name, loc)?;

                let optional = self == Directive::OptModule;
                session
                    .slots
                    .push(ModuleSlot::new(name.to_owned(), index, optional));
                session
                    .refs
                    .insert(name.to_owned(), Reference::Module(index));
                log::debug!("module '{}' bound to slot {}", name, index);
            }
            Directive::Extern => {
                let (name, loc) = args.name()?;
                args.separator()?;
                let idx = args.number("a symbol index")?;
                if *idx.inner() < 0 || *idx.inner() > MAX_SYMBOL_INDEX as i64 {
                    return Err(idx.map(Error::ExternOutOfRange));
                }
                claim_name(session, name, loc)?;
                session
                    .refs
                    .insert(name.to_owned(), Reference::Extern(*idx.inner() as Byte));
            }
            Directive::ExtInstr => {
                let (name, loc) = args.name()?;
                args.separator()?;
                let opcode = args.byte("an opcode")?;

                let mut arg_types = Vec::new();
                while args.more()? {
                    let (arg, loc) = args.name()?;
                    let ty = ArgType::from_str(&arg.to_lowercase()).map_err(|_| {
                        let err = Error::UnknownArgType(arg.to_owned());
                        match loc {
                            Some(loc) => Located::with_loc(loc, err),
                            None => err.into(),
                        }
                    })?;
                    arg_types.push(ty);
                }

                claim_name(session, name, loc)?;
                session
                    .lang
                    .register_extended(InstDef::new(name, opcode, arg_types))
                    .map_err(|err| args.head.transfer(Error::Register(err)))?;
            }
            Directive::Title => set_text(&mut session.meta.title, "title", args.string()?),
            Directive::Author => set_text(&mut session.meta.author, "author", args.string()?),
            Directive::Description => set_text(
                &mut session.meta.description,
                "description",
                args.string()?,
            ),
            Directive::Version => session.meta.version = args.version(2)?,
            Directive::Runtime => session.meta.runtime = args.version(2)?,
            Directive::Resources => session.meta.resources = args.version(3)?,
        }
        Ok(())
    }
}

fn parse_header(line: &[Located<Item>]) -> Result<BinaryType, Located<Error>> {
    let head = &line[0];
    let kind = match head.inner() {
        Item::Directive(name) => header_kind(name),
        _ => None,
    }
    .ok_or_else(|| head.transfer(Error::ExpectedHeader(head.inner().to_string())))?;

    let mut args = Args::new(line);
    args.separator()?;
    let bits = args.number("a bit width")?;
    let width = match *bits.inner() {
        16 | 32 | 64 => BitWidth::from_bits(*bits.inner()),
        _ => None,
    }
    .ok_or_else(|| bits.transfer(Error::InvalidWidth(*bits.inner())))?;
    args.finish()?;

    Ok(BinaryType::new(kind, width))
}

/// Forwards a line to the second pass, moving string literals into the constant pool.
fn defer(
    session: &mut Session,
    line: &[Located<Item>],
    out: &mut Vec<Located<Item>>,
) -> Result<(), Located<Error>> {
    for item in line {
        match item.inner() {
            Item::Str(s) => {
                let idx = session
                    .pool
                    .register(s.as_bytes().to_vec())
                    .map_err(|err| item.transfer(Error::Pool(err)))?;
                out.push(item.transfer(Item::ConstRef(idx, ConstKind::String)));
            }
            _ => out.push(item.clone()),
        }
    }

    if let Some(last) = line.last() {
        out.push(last.transfer(Item::Break));
    }
    Ok(())
}

/// The first pass. Fixes the container type from the header and consumes every table
/// directive, returning the session along with the lines left for the second pass.
pub fn precompile(
    items: &[Located<Item>],
) -> Result<(Session, Vec<Located<Item>>), Located<Error>> {
    let mut lines = items
        .split(|item| *item.inner() == Item::Break)
        .filter(|line| !line.is_empty());

    let header = lines
        .next()
        .ok_or_else(|| Located::from(Error::UnexpectedEof("the header")))?;
    let ty = parse_header(header)?;
    log::info!("assembling a {}", ty);

    let mut session = Session::new(ty);
    let mut deferred = Vec::new();
    for line in lines {
        if let Item::Directive(name) = line[0].inner() {
            if header_kind(name).is_some() {
                return Err(line[0].transfer(Error::DuplicateHeader));
            }

            if let Ok(directive) = Directive::from_str(name) {
                log::trace!("first pass directive {:?}", directive);
                let mut args = Args::new(line);
                directive.apply(&mut session, &mut args)?;
                args.finish()?;
                continue;
            }
        }

        defer(&mut session, line, &mut deferred)?;
    }

    log::debug!(
        "first pass: {} constant(s), {} slot(s), {} deferred item(s)",
        session.pool.len(),
        session.slots.len(),
        deferred.len()
    );
    Ok((session, deferred))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::phases::preprocess::{MemoryProvider, Preprocessor};

    fn items(source: &str) -> Vec<Located<Item>> {
        let mut provider = MemoryProvider::new().with("main.cws", source);
        Preprocessor::new(&mut provider).run("main.cws").unwrap()
    }

    fn run(source: &str) -> Result<(Session, Vec<Item>), Error> {
        precompile(&items(source))
            .map(|(session, deferred)| {
                (
                    session,
                    deferred.into_iter().map(Located::value).collect(),
                )
            })
            .map_err(Located::value)
    }

    fn err(source: &str) -> Error {
        run(source).err().unwrap()
    }

    #[test]
    fn headers() {
        let (session, _) = run(".cwx:16\n").unwrap();
        assert_eq!(session.ty, BinaryType::new(BinaryKind::Executable, BitWidth::W16));
        let (session, _) = run(".LIBRARY, 64\n").unwrap();
        assert_eq!(session.ty, BinaryType::new(BinaryKind::Library, BitWidth::W64));

        assert_eq!(err(""), Error::UnexpectedEof("the header"));
        assert_eq!(err("nop\n"), Error::ExpectedHeader("nop".to_owned()));
        assert_eq!(err(".cwx:8\n"), Error::InvalidWidth(8));
        assert_eq!(err(".cwx\n"), Error::UnexpectedEof("a separator"));
        assert_eq!(err(".cwx:16\n.cwl:16\n"), Error::DuplicateHeader);
    }

    #[test]
    fn values_follow_container_width() {
        for (bits, width) in &[(16, BitWidth::W16), (32, BitWidth::W32), (64, BitWidth::W64)] {
            let (session, _) = run(&format!(".cwx:{}\n.values v, -2\n", bits)).unwrap();
            let bytes = session.pool.get(0).unwrap();
            assert_eq!(bytes.len(), width.bytes());
            assert_eq!(bytes.to_vec(), width.encode((-2i64) as u64));
        }
        assert_eq!(
            err(".cwx:16\n.vals v, 70000\n"),
            Error::ValueOutOfRange(70000, "the container width")
        );
    }

    #[test]
    fn data_and_strings() {
        let (session, deferred) = run(concat!(
            ".cwx:32\n",
            ".data d, [1, 2], \"ab\"\n",
            ".str s, \"hi\"\n",
            ".string again, \"hi\"\n",
            "lds \"hi\"\n",
        ))
        .unwrap();
        assert_eq!(session.pool.get(0), Some(&[1, 2, b'a', b'b'][..]));
        assert_eq!(session.pool.get(1), Some(&b"hi"[..]));
        assert_eq!(session.pool.len(), 2);
        assert_eq!(session.refs["again"], Reference::Constant(1, ConstKind::String));
        assert_eq!(
            deferred,
            vec![
                Item::Word("lds".to_owned()),
                Item::ConstRef(1, ConstKind::String),
                Item::Break,
            ]
        );

        assert_eq!(err(".cwx:16\n.data d, 256\n"), Error::ValueOutOfRange(256, "a byte"));
        assert_eq!(err(".cwx:16\n.str s, \"\"\n"), Error::Pool(PoolError::Empty));
        assert_eq!(
            err(".cwx:16\n.data d, [1, 2\n"),
            Error::UnexpectedEof("']'")
        );
        assert_eq!(
            err(".cwx:16\n.data push, 1\n"),
            Error::NameCollision("push".to_owned())
        );
    }

    #[test]
    fn constant_pool_capacity() {
        let mut source = String::from(".cwx:16\n");
        for i in 0..256 {
            source.push_str(&format!(".data c{}, 1, {}\n", i, i));
        }
        let err = err(&source);
        assert_eq!(err, Error::Pool(PoolError::Full));
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }

    #[test]
    fn module_slots() {
        let (session, _) = run(".cwl:16\n.module io, 0\n.optmodule gfx, 15\n").unwrap();
        assert_eq!(
            session.slots,
            vec![
                ModuleSlot::new("io".to_owned(), 0, false),
                ModuleSlot::new("gfx".to_owned(), 15, true),
            ]
        );
        assert_eq!(session.refs["gfx"], Reference::Module(15));

        let mut source = String::from(".cwx:16\n");
        for i in 0..17 {
            source.push_str(&format!(".module m{}, {}\n", i, i));
        }
        assert_eq!(err(&source), Error::SlotOutOfRange(16));

        assert_eq!(
            err(".cwx:16\n.module a, 1\n.module b, 1\n"),
            Error::DuplicateSlot(1)
        );
        assert_eq!(
            err(".cwx:16\n.module a, 1\n.module a, 2\n"),
            Error::NameCollision("a".to_owned())
        );
        assert_eq!(
            err(".cwx:16\n.module toolong, 1\n"),
            Error::ModuleNameTooLong("toolong".to_owned())
        );
    }

    #[test]
    fn extended_instructions() {
        let (session, _) = run(".cwx:16\n.extinstr beep, $80, byte, Symbol\n").unwrap();
        let def = session.lang.lookup("BEEP").unwrap();
        assert_eq!(def.opcode, 0x80);
        assert_eq!(def.args, vec![ArgType::Byte, ArgType::InternSymbol]);

        assert_eq!(
            err(".cwx:16\n.extinstr beep, $20\n"),
            Error::Register(RegisterError::NotExtended(0x20))
        );
        assert_eq!(
            err(".cwx:16\n.extinstr beep, $80, register\n"),
            Error::UnknownArgType("register".to_owned())
        );
        assert_eq!(
            err(".cwx:16\n.module beep, 1\n.extinstr beep, $80\n"),
            Error::NameCollision("beep".to_owned())
        );
    }

    #[test]
    fn metadata() {
        let (session, deferred) = run(concat!(
            ".cwx:16\n",
            ".title \"Demo\"\n",
            ".copyright \"Someone\"\n",
            ".description \"A demo\"\n",
            ".version 1, 2\n",
            ".runtime 0, 9, 1\n",
            ".resources 16, 32, 8\n",
            ".extern ext, 254\n",
        ))
        .unwrap();
        assert_eq!(session.meta.title, "Demo");
        assert_eq!(session.meta.author, "Someone");
        assert_eq!(session.meta.description, "A demo");
        assert_eq!(session.meta.version, [1, 2, 0]);
        assert_eq!(session.meta.runtime, [0, 9, 1]);
        assert_eq!(session.meta.resources, [16, 32, 8]);
        assert_eq!(session.refs["ext"], Reference::Extern(254));
        assert!(deferred.is_empty());

        assert_eq!(
            err(".cwx:16\n.resources 1, 2\n"),
            Error::UnexpectedEof("a separator")
        );
        assert_eq!(err(".cwx:16\n.extern e, 255\n"), Error::ExternOutOfRange(255));
        assert_eq!(
            err(".cwx:16\n.title \"a\" \"b\"\n"),
            Error::UnexpectedToken("\"b\"".to_owned(), "end of line")
        );
    }

    #[test]
    fn other_lines_are_deferred() {
        let (_, deferred) = run(".cwx:16\n.symbol main\nstart: push 5\neop\n").unwrap();
        assert_eq!(
            deferred,
            vec![
                Item::Directive("symbol".to_owned()),
                Item::Word("main".to_owned()),
                Item::Break,
                Item::Word("start".to_owned()),
                Item::Separator(':'),
                Item::Word("push".to_owned()),
                Item::Number(5),
                Item::Break,
                Item::Word("eop".to_owned()),
                Item::Break,
            ]
        );
    }
}
