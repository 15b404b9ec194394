use crate::assembler::model::ConstKind;
use derive_more::Constructor;
use std::fmt::Display;

/*
    Phases:

        1.  Tokenization: The raw characters of a source file are run through a small state
            machine, giving a flat `Vec<Located<Token>>` which still contains comments,
            escapes, and possibly error tokens (the tokenizer never fails).

        2.  Preprocessing: Preprocessor directives (`#define`, `#include`, conditionals) are
            executed, named constants substituted and parenthesized expressions folded. The
            result is a single stream of `Item`s across all included files, each tagged with
            its `Loc`.

        3.  Precompilation (first pass): The mandatory header fixes the container type, then
            table directives (constants, module slots, extended instructions, metadata) are
            consumed. Everything else is deferred, untouched, to the next phase.

        4.  Compilation (second pass): Symbols are opened, labels recorded and each instruction
            line is matched against its signature. Operands which are already known are
            validated immediately, named references are left unresolved.

        5.  Resolution: Symbol indices are allocated, every named reference is resolved and
            each operand normalized against its contract, giving the byte body of each symbol.

        6.  Serialization: The resolved `Binary` is written out in the container format.
*/

pub type FileId = usize;

#[derive(Debug, PartialEq, Clone, Copy, Eq, Constructor)]
pub struct Loc {
    pub file: FileId,
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Located<T: Sized> {
    loc: Option<Loc>,
    val: T,
}

impl Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(line: {}, col: {})", self.line, self.col)
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.loc {
            None => write!(f, "@<unknown location>: {}", self.val),
            Some(loc) => write!(f, "@{}: {}", loc, self.val),
        }
    }
}

impl<T> Located<T> {
    fn new(loc: Option<Loc>, val: T) -> Self {
        Located { loc, val }
    }

    pub fn with_loc(loc: Loc, val: T) -> Self {
        Located::new(Some(loc), val)
    }

    pub fn loc(&self) -> Option<Loc> {
        self.loc
    }

    pub fn inner(&self) -> &T {
        &self.val
    }

    pub fn value(self) -> T {
        self.val
    }

    pub fn proximate_to_option_loc(self, loc: Option<Loc>) -> Self {
        match self.loc {
            None => Self { loc, ..self },
            Some(_) => self,
        }
    }

    pub fn proximate_to_loc(self, loc: Loc) -> Self {
        self.proximate_to_option_loc(Some(loc))
    }

    pub fn proximate_to<S>(self, other: &Located<S>) -> Self {
        self.proximate_to_option_loc(other.loc)
    }

    pub fn map<S, F>(self, f: F) -> Located<S>
    where
        F: FnOnce(T) -> S,
    {
        Located::new(self.loc, f(self.val))
    }

    pub fn map_result<S, E, F>(self, f: F) -> Result<Located<S>, Located<E>>
    where
        F: FnOnce(T) -> Result<S, E>,
    {
        match f(self.val) {
            Ok(s) => Ok(Located::new(self.loc, s)),
            Err(err) => Err(Located::new(self.loc, err)),
        }
    }

    pub fn transfer<S>(&self, s: S) -> Located<S> {
        Located::new(self.loc, s)
    }
}

impl<T> From<T> for Located<T> {
    fn from(val: T) -> Self {
        Located { loc: None, val }
    }
}

/// Operators understood by the expression evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Modulo,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    AndAnd,
    OrOr,
    EqEq,
    NotEq,
}

impl Operator {
    pub const UNARY_PRECEDENCE: u8 = 11;

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Modulo => "//",
            Operator::Amp => "&",
            Operator::Pipe => "|",
            Operator::Caret => "^",
            Operator::Tilde => "~",
            Operator::Bang => "!",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::AndAnd => "&&",
            Operator::OrOr => "||",
            Operator::EqEq => "==",
            Operator::NotEq => "!=",
        }
    }

    /// Higher binds tighter. `None` for operators which are only ever unary.
    pub fn binary_precedence(self) -> Option<u8> {
        match self {
            Operator::Star | Operator::Slash | Operator::Modulo => Some(10),
            Operator::Plus | Operator::Minus => Some(9),
            Operator::Shl | Operator::Shr => Some(8),
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => Some(7),
            Operator::EqEq | Operator::NotEq => Some(6),
            Operator::Amp => Some(5),
            Operator::Caret => Some(4),
            Operator::Pipe => Some(3),
            Operator::AndAnd => Some(2),
            Operator::OrOr => Some(1),
            Operator::Tilde | Operator::Bang => None,
        }
    }

    pub fn is_unary(self) -> bool {
        match self {
            Operator::Tilde | Operator::Bang | Operator::Plus | Operator::Minus => true,
            _ => false,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The normalized stream the preprocessor hands to the assembler passes. Literals have
/// been converted to values, constants substituted and comments dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Break,
    Separator(char),
    Word(String),
    Number(i64),
    Str(String),
    Directive(String),
    BracketOpen,
    BracketClose,
    Op(Operator),

    /// A string literal which the first pass has moved into the constant pool.
    ConstRef(u8, ConstKind),
}

impl Display for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Item::Break => write!(f, "<end of line>"),
            Item::Separator(c) => write!(f, "{}", c),
            Item::Word(w) => write!(f, "{}", w),
            Item::Number(n) => write!(f, "{}", n),
            Item::Str(s) => write!(f, "{:?}", s),
            Item::Directive(d) => write!(f, ".{}", d),
            Item::BracketOpen => write!(f, "["),
            Item::BracketClose => write!(f, "]"),
            Item::Op(op) => write!(f, "{}", op),
            Item::ConstRef(idx, kind) => write!(f, "{}#{}", kind, idx),
        }
    }
}

/// Broad classification of every error the pipeline can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Structural,
    Reference,
    Argument,
    Capacity,
    Expression,
    Io,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Lexical => write!(f, "Lexical error"),
            ErrorKind::Structural => write!(f, "Structural error"),
            ErrorKind::Reference => write!(f, "Reference error"),
            ErrorKind::Argument => write!(f, "Argument error"),
            ErrorKind::Capacity => write!(f, "Capacity error"),
            ErrorKind::Expression => write!(f, "Expression error"),
            ErrorKind::Io => write!(f, "I/O error"),
        }
    }
}
