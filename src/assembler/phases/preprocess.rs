use super::expr;
use super::tokenize::{self, Token};
use super::types::{ErrorKind, FileId, Item, Loc, Located};
use crate::assembler::model::{Constant, ConstantTable};
use std::collections::HashMap;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

pub const MAX_INCLUDE_DEPTH: usize = 64;

pub struct Source {
    pub name: String,
    pub text: String,
}

/// Where the preprocessor reads the root file and every `#include` from.
pub trait SourceProvider {
    /// `including` is the name of the file containing the `#include`, or `None` for the root.
    fn load(&mut self, name: &str, including: Option<&str>) -> io::Result<Source>;
}

/// Resolves names relative to the including file first, then against each include directory.
#[derive(Debug, Clone, Default)]
pub struct FsProvider {
    include_dirs: Vec<PathBuf>,
}

impl FsProvider {
    pub fn new(include_dirs: Vec<PathBuf>) -> Self {
        FsProvider { include_dirs }
    }

    fn candidates(&self, name: &str, including: Option<&str>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        match including.and_then(|file| Path::new(file).parent()) {
            Some(dir) => paths.push(dir.join(name)),
            None => paths.push(PathBuf::from(name)),
        }
        paths.extend(self.include_dirs.iter().map(|dir| dir.join(name)));
        paths
    }
}

impl SourceProvider for FsProvider {
    fn load(&mut self, name: &str, including: Option<&str>) -> io::Result<Source> {
        let path = self
            .candidates(name, including)
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;

        Ok(Source {
            name: path.to_string_lossy().into_owned(),
            text: std::fs::read_to_string(&path)?,
        })
    }
}

/// Serves sources from memory, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    files: HashMap<String, String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        MemoryProvider::default()
    }

    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.files.insert(name.to_owned(), text.to_owned());
    }
}

impl SourceProvider for MemoryProvider {
    fn load(&mut self, name: &str, _including: Option<&str>) -> io::Result<Source> {
        match self.files.get(name) {
            Some(text) => Ok(Source {
                name: name.to_owned(),
                text: text.clone(),
            }),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    TokenError(String),
    MalformedNumber(String),
    UnknownDirective(String),
    DirectiveOrder(&'static str),
    MidLineDirective(String),
    UnterminatedConditional,
    MissingName(&'static str),
    UnexpectedToken(String, &'static str),
    Include(String, String),
    IncludeTooDeep(String),
    Expression(expr::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TokenError(_) | Error::MalformedNumber(_) => ErrorKind::Lexical,
            Error::UnknownDirective(_)
            | Error::DirectiveOrder(_)
            | Error::MidLineDirective(_)
            | Error::UnterminatedConditional
            | Error::MissingName(_)
            | Error::UnexpectedToken(..)
            | Error::IncludeTooDeep(_) => ErrorKind::Structural,
            Error::Include(..) => ErrorKind::Io,
            Error::Expression(err) => err.kind(),
        }
    }
}

impl From<expr::Error> for Error {
    fn from(err: expr::Error) -> Self {
        Error::Expression(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::TokenError(raw) => write!(f, "Unrecognized token '{}'", raw),
            Error::MalformedNumber(raw) => write!(f, "Malformed numeric literal '{}'", raw),
            Error::UnknownDirective(name) => {
                write!(f, "Unknown preprocessor directive '#{}'", name)
            }
            Error::DirectiveOrder(msg) => write!(f, "Directive out of order: {}", msg),
            Error::MidLineDirective(name) => {
                write!(f, "'#{}' must start its own line", name)
            }
            Error::UnterminatedConditional => {
                write!(f, "Conditional block is not terminated by '#endif'")
            }
            Error::MissingName(directive) => write!(f, "Expected a name after '{}'", directive),
            Error::UnexpectedToken(tk, msg) => write!(f, "Unexpected token '{}': {}", tk, msg),
            Error::Include(name, err) => write!(f, "Could not include '{}': {}", name, err),
            Error::IncludeTooDeep(name) => write!(
                f,
                "Including '{}' exceeds the maximum include depth of {}",
                name, MAX_INCLUDE_DEPTH
            ),
            Error::Expression(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug)]
struct CondFrame {
    parent_active: bool,
    active: bool,
    any_true: bool,
    in_else: bool,
    loc: Option<Loc>,
}

#[derive(Debug, Default)]
struct ConditionalState {
    stack: Vec<CondFrame>,
}

impl ConditionalState {
    fn is_active(&self) -> bool {
        self.stack.last().map_or(true, |frame| frame.active)
    }

    fn push(&mut self, cond: bool, loc: Option<Loc>) {
        let parent_active = self.is_active();
        self.stack.push(CondFrame {
            parent_active,
            active: parent_active && cond,
            any_true: parent_active && cond,
            in_else: false,
            loc,
        });
    }

    /// Whether an `#elif` here needs its condition evaluated at all.
    fn elif_pending(&self) -> Result<bool, Error> {
        match self.stack.last() {
            None => Err(Error::DirectiveOrder("'#elif' without '#if'")),
            Some(frame) if frame.in_else => Err(Error::DirectiveOrder("'#elif' after '#else'")),
            Some(frame) => Ok(frame.parent_active && !frame.any_true),
        }
    }

    fn handle_elif(&mut self, cond: bool) {
        if let Some(frame) = self.stack.last_mut() {
            frame.active = frame.parent_active && !frame.any_true && cond;
            frame.any_true |= frame.active;
        }
    }

    fn handle_else(&mut self) -> Result<(), Error> {
        let frame = self
            .stack
            .last_mut()
            .ok_or(Error::DirectiveOrder("'#else' without '#if'"))?;
        if frame.in_else {
            return Err(Error::DirectiveOrder("duplicate '#else'"));
        }

        frame.active = frame.parent_active && !frame.any_true;
        frame.any_true = true;
        frame.in_else = true;
        Ok(())
    }

    fn handle_endif(&mut self) -> Result<(), Error> {
        self.stack
            .pop()
            .map(|_| ())
            .ok_or(Error::DirectiveOrder("'#endif' without '#if'"))
    }
}

/// The tokens of one directive line, without the directive itself, the trailing comment
/// or the `Break`.
struct Line<'a> {
    directive: &'a Located<Token>,
    args: &'a [Located<Token>],
}

impl<'a> Line<'a> {
    fn err(&self, err: Error) -> Located<Error> {
        self.directive.transfer(err)
    }

    fn expect_empty(&self, msg: &'static str) -> Result<(), Located<Error>> {
        match self.args.first() {
            None => Ok(()),
            Some(tk) => Err(tk.transfer(Error::UnexpectedToken(tk.inner().text(), msg))),
        }
    }

    fn name(&self, directive: &'static str) -> Result<&'a str, Located<Error>> {
        match self.args.first().map(Located::inner) {
            Some(Token::Word(name)) => Ok(name),
            _ => Err(self.err(Error::MissingName(directive))),
        }
    }
}

fn literal(tk: &Located<Token>) -> Result<Option<Constant>, Located<Error>> {
    Ok(Some(match tk.inner() {
        Token::Number(raw) => Constant::Number(
            tokenize::parse_number(raw)
                .map_err(|_| tk.transfer(Error::MalformedNumber(raw.clone())))?,
        ),
        Token::Hex(raw) => Constant::Number(
            tokenize::parse_hex(raw)
                .map_err(|_| tk.transfer(Error::MalformedNumber(format!("${}", raw))))?,
        ),
        Token::Char(c) => Constant::Number(*c as i64),
        Token::Str(s) => Constant::Str(s.clone()),
        _ => return Ok(None),
    }))
}

pub struct Preprocessor<'a> {
    provider: &'a mut dyn SourceProvider,
    constants: ConstantTable,
    files: Vec<String>,
    out: Vec<Located<Item>>,
    depth: usize,
}

impl<'a> Preprocessor<'a> {
    pub fn new(provider: &'a mut dyn SourceProvider) -> Self {
        Preprocessor {
            provider,
            constants: ConstantTable::new(),
            files: Vec::new(),
            out: Vec::new(),
            depth: 0,
        }
    }

    pub fn define(&mut self, name: &str, val: Constant) {
        self.constants.insert(name.to_owned(), val);
    }

    pub fn constants(&self) -> &ConstantTable {
        &self.constants
    }

    /// Every file read so far, indexed by `FileId`.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn run(&mut self, root: &str) -> Result<Vec<Located<Item>>, Located<Error>> {
        self.process_file(root, None, None)?;
        log::debug!(
            "preprocessed {} file(s) into {} items",
            self.files.len(),
            self.out.len()
        );
        Ok(std::mem::replace(&mut self.out, Vec::new()))
    }

    fn file_id(&mut self, name: &str) -> FileId {
        match self.files.iter().position(|file| file == name) {
            Some(id) => id,
            None => {
                self.files.push(name.to_owned());
                self.files.len() - 1
            }
        }
    }

    fn process_file(
        &mut self,
        name: &str,
        including: Option<&str>,
        at: Option<Loc>,
    ) -> Result<(), Located<Error>> {
        let located = |err: Error| match at {
            Some(loc) => Located::with_loc(loc, err),
            None => err.into(),
        };

        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(located(Error::IncludeTooDeep(name.to_owned())));
        }

        let source = self
            .provider
            .load(name, including)
            .map_err(|err| located(Error::Include(name.to_owned(), err.to_string())))?;
        let file = self.file_id(&source.name);
        log::debug!("preprocessing '{}' (file {})", source.name, file);

        let tokens = tokenize::tokenize(&source.text, file);
        if let Some(tk) = tokens.iter().find(|tk| tk.inner().is_lexical_error()) {
            return Err(tk.transfer(Error::TokenError(tk.inner().text())));
        }

        self.depth += 1;
        let result = self.process_tokens(&tokens, &source.name);
        self.depth -= 1;
        result
    }

    fn process_tokens(
        &mut self,
        tokens: &[Located<Token>],
        file: &str,
    ) -> Result<(), Located<Error>> {
        let mut conds = ConditionalState::default();
        let mut pos = 0;
        while pos < tokens.len() {
            let tk = &tokens[pos];
            if let Token::PreDirective(name) = tk.inner() {
                if pos > 0 && *tokens[pos - 1].inner() != Token::Break {
                    return Err(tk.transfer(Error::MidLineDirective(name.clone())));
                }

                let end = tokens[pos..]
                    .iter()
                    .position(|tk| *tk.inner() == Token::Break)
                    .map_or(tokens.len(), |off| pos + off);
                let args_end = match tokens[end - 1].inner() {
                    Token::Comment(_) => end - 1,
                    _ => end,
                };

                let line = Line {
                    directive: tk,
                    args: &tokens[pos + 1..args_end],
                };
                self.directive(&line, &mut conds, file)?;
                pos = end + 1;
                continue;
            }

            if !conds.is_active() {
                pos += 1;
                continue;
            }

            pos = self.emit(tokens, pos)?;
        }

        match conds.stack.last() {
            None => Ok(()),
            Some(frame) => {
                let err = Error::UnterminatedConditional;
                Err(match frame.loc {
                    Some(loc) => Located::with_loc(loc, err),
                    None => err.into(),
                })
            }
        }
    }

    fn push(&mut self, loc: Option<Loc>, item: Item) {
        let item = match loc {
            Some(loc) => Located::with_loc(loc, item),
            None => item.into(),
        };
        self.out.push(item);
    }

    fn push_constant(&mut self, loc: Option<Loc>, val: Constant) {
        match val {
            Constant::Empty => (),
            Constant::Number(n) => self.push(loc, Item::Number(n)),
            Constant::Str(s) => self.push(loc, Item::Str(s)),
        }
    }

    /// Emits the normalized form of `tokens[pos]`, returning the position of the next token.
    fn emit(&mut self, tokens: &[Located<Token>], pos: usize) -> Result<usize, Located<Error>> {
        let tk = &tokens[pos];
        let loc = tk.loc();
        let item = match tk.inner() {
            Token::Break => {
                match self.out.last().map(Located::inner) {
                    None | Some(Item::Break) => (),
                    Some(_) => self.push(loc, Item::Break),
                }
                return Ok(pos + 1);
            }
            Token::Comment(_) | Token::Escape(_) => return Ok(pos + 1),
            Token::Open => {
                let mut next = pos + 1;
                let val = expr::evaluate(tokens, &mut next, &self.constants)
                    .map_err(|err| err.map(Error::from))?;
                self.push_constant(loc, val);
                return Ok(next);
            }
            Token::Word(name) => match self.constants.get(name) {
                Some(val) => {
                    let val = val.clone();
                    self.push_constant(loc, val);
                    return Ok(pos + 1);
                }
                None => Item::Word(name.clone()),
            },
            Token::Number(_) | Token::Hex(_) | Token::Char(_) | Token::Str(_) => {
                if let Some(val) = literal(tk)? {
                    self.push_constant(loc, val);
                }
                return Ok(pos + 1);
            }
            Token::Directive(name) => Item::Directive(name.to_lowercase()),
            Token::Separator(c) => Item::Separator(*c),
            Token::BracketOpen => Item::BracketOpen,
            Token::BracketClose => Item::BracketClose,
            Token::Op(op) => Item::Op(*op),
            other => {
                return Err(tk.transfer(Error::UnexpectedToken(other.text(), "not allowed here")))
            }
        };
        self.push(loc, item);
        Ok(pos + 1)
    }

    fn condition(&self, line: &Line) -> Result<bool, Located<Error>> {
        let first = match line.args.first() {
            Some(first) => first,
            None => return Err(line.err(Error::MissingName("#if"))),
        };

        let (val, consumed) = match first.inner() {
            Token::Open => {
                let mut pos = 1;
                let val = expr::evaluate(line.args, &mut pos, &self.constants)
                    .map_err(|err| err.map(Error::from))?;
                (val, pos)
            }
            Token::Word(name) => (
                self.constants.get(name).cloned().unwrap_or(Constant::Empty),
                1,
            ),
            _ => match literal(first)? {
                Some(val) => (val, 1),
                None => {
                    return Err(first.transfer(Error::UnexpectedToken(
                        first.inner().text(),
                        "expected a condition",
                    )))
                }
            },
        };

        if let Some(tk) = line.args.get(consumed) {
            return Err(tk.transfer(Error::UnexpectedToken(
                tk.inner().text(),
                "expected end of line after condition",
            )));
        }
        Ok(val.is_truthy())
    }

    fn defined(&self, line: &Line, directive: &'static str) -> Result<bool, Located<Error>> {
        let name = line.name(directive)?;
        Line {
            directive: line.directive,
            args: &line.args[1..],
        }
        .expect_empty("expected end of line after name")?;
        Ok(self.constants.contains_key(name))
    }

    fn define_value(&self, line: &Line) -> Result<Constant, Located<Error>> {
        let rest = &line.args[1..];
        let (val, consumed) = match rest.first() {
            None => return Ok(Constant::Empty),
            Some(tk) => match tk.inner() {
                Token::Open => {
                    let mut pos = 1;
                    let val = expr::evaluate(rest, &mut pos, &self.constants)
                        .map_err(|err| err.map(Error::from))?;
                    (val, pos)
                }
                Token::Word(name) => match self.constants.get(name) {
                    Some(val) => (val.clone(), 1),
                    None => {
                        return Err(tk.transfer(Error::Expression(expr::Error::UnknownConstant(
                            name.clone(),
                        ))))
                    }
                },
                _ => match literal(tk)? {
                    Some(val) => (val, 1),
                    None => {
                        return Err(tk.transfer(Error::UnexpectedToken(
                            tk.inner().text(),
                            "expected a literal or expression",
                        )))
                    }
                },
            },
        };

        match rest.get(consumed) {
            None => Ok(val),
            Some(tk) => Err(tk.transfer(Error::UnexpectedToken(
                tk.inner().text(),
                "expected end of line after value",
            ))),
        }
    }

    fn directive(
        &mut self,
        line: &Line,
        conds: &mut ConditionalState,
        file: &str,
    ) -> Result<(), Located<Error>> {
        let name = match line.directive.inner() {
            Token::PreDirective(name) => name.to_lowercase(),
            _ => unreachable!(),
        };
        log::trace!("directive #{} at {:?}", name, line.directive.loc());

        match name.as_str() {
            "if" => {
                let cond = conds.is_active() && self.condition(line)?;
                conds.push(cond, line.directive.loc());
                return Ok(());
            }
            "ifdef" | "ifndef" => {
                let positive = name == "ifdef";
                let cond = conds.is_active() && {
                    let defined = self.defined(line, if positive { "#ifdef" } else { "#ifndef" })?;
                    defined == positive
                };
                conds.push(cond, line.directive.loc());
                return Ok(());
            }
            "elif" => {
                let pending = conds.elif_pending().map_err(|err| line.err(err))?;
                let cond = pending && self.condition(line)?;
                conds.handle_elif(cond);
                return Ok(());
            }
            "else" => {
                conds.handle_else().map_err(|err| line.err(err))?;
                return line.expect_empty("expected end of line after '#else'");
            }
            "endif" => {
                conds.handle_endif().map_err(|err| line.err(err))?;
                return line.expect_empty("expected end of line after '#endif'");
            }
            _ => (),
        }

        if !conds.is_active() {
            return Ok(());
        }

        match name.as_str() {
            "define" => {
                let key = line.name("#define")?;
                let val = self.define_value(line)?;
                if let Some(old) = self.constants.get(key) {
                    log::warn!("redefining '{}' (was {}) as {}", key, old, val);
                }
                self.constants.insert(key.to_owned(), val);
            }
            "undef" => {
                let key = line.name("#undef")?;
                if self.constants.remove(key).is_none() {
                    log::warn!("'#undef {}' of a name that is not defined", key);
                }
            }
            "include" => {
                let target = match line.args.first().map(Located::inner) {
                    Some(Token::Str(target)) if line.args.len() == 1 => target,
                    _ => return Err(line.err(Error::MissingName("#include"))),
                };
                self.process_file(target, Some(file), line.directive.loc())?;
            }
            _ => return Err(line.err(Error::UnknownDirective(name))),
        }
        Ok(())
    }
}
