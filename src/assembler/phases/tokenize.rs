use super::types::{FileId, Loc, Located, Operator};
use std::fmt::Display;
use std::num::ParseIntError;

const MAX_HEX_DIGITS: usize = 8;

// This enum models the lexical units we can unambiguously distinguish as characters stream
// past. It *does not* model the semantics of the language: whether a `Word` is a mnemonic, a
// label or a constant name is decided by later phases. Malformed input never aborts
// tokenization, it is reported inline as `Unexpected` or `Error` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Break,
    Separator(char),
    Word(String),
    /// Decimal digits, including a leading sign if one was written.
    Number(String),
    /// The decoded contents of a string literal.
    Str(String),
    Char(char),
    Escape(char),
    Hex(String),
    Directive(String),
    PreDirective(String),
    Comment(String),
    Open,
    Close,
    BracketOpen,
    BracketClose,
    Op(Operator),

    /// A multi-character unit which started out well but turned out malformed.
    Unexpected(String),
    /// A character which cannot begin any token.
    Error(char),
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_str(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(c) => out.push(c),
            None => (),
        }
    }
    out
}

impl Token {
    /// Reconstructs the source text this token was read from.
    pub fn text(&self) -> String {
        match self {
            Token::Break => String::from("\n"),
            Token::Separator(c) | Token::Error(c) => c.to_string(),
            Token::Word(s) | Token::Number(s) | Token::Unexpected(s) => s.clone(),
            Token::Str(s) => format!("\"{}\"", escape_str(s)),
            Token::Char(c) => format!("%{}", c),
            Token::Escape(c) => format!("\\{}", c),
            Token::Hex(s) => format!("${}", s),
            Token::Directive(s) => format!(".{}", s),
            Token::PreDirective(s) => format!("#{}", s),
            Token::Comment(s) => format!(";{}", s),
            Token::Open => String::from("("),
            Token::Close => String::from(")"),
            Token::BracketOpen => String::from("["),
            Token::BracketClose => String::from("]"),
            Token::Op(op) => op.as_str().to_owned(),
        }
    }

    pub fn is_lexical_error(&self) -> bool {
        match self {
            Token::Unexpected(_) | Token::Error(_) => true,
            _ => false,
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Break => write!(f, "<end of line>"),
            tk => write!(f, "{}", tk.text()),
        }
    }
}

pub fn parse_number(raw: &str) -> Result<i64, ParseIntError> {
    raw.parse::<i64>()
}

pub fn parse_hex(raw: &str) -> Result<i64, ParseIntError> {
    // At most eight digits are ever lexed, so this always fits.
    u32::from_str_radix(raw, 16).map(i64::from)
}

fn is_newline(c: char) -> bool {
    c == '\n' || c == '\r'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn single_op(c: char) -> Option<Operator> {
    match c {
        '*' => Some(Operator::Star),
        '/' => Some(Operator::Slash),
        '&' => Some(Operator::Amp),
        '|' => Some(Operator::Pipe),
        '^' => Some(Operator::Caret),
        '!' => Some(Operator::Bang),
        '<' => Some(Operator::Lt),
        '>' => Some(Operator::Gt),
        _ => None,
    }
}

fn double_op(first: char, second: char) -> Option<Operator> {
    match (first, second) {
        ('<', '<') => Some(Operator::Shl),
        ('>', '>') => Some(Operator::Shr),
        ('&', '&') => Some(Operator::AndAnd),
        ('|', '|') => Some(Operator::OrOr),
        ('=', '=') => Some(Operator::EqEq),
        ('!', '=') => Some(Operator::NotEq),
        ('>', '=') => Some(Operator::Ge),
        ('<', '=') => Some(Operator::Le),
        ('/', '/') => Some(Operator::Modulo),
        _ => None,
    }
}

/// The kind of the token currently being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Comment,
    Str { escaped: bool },
    CharLit,
    Escape,
    Hex,
    Word,
    Number,
    Sign(char),
    Directive,
    PreDirective,
    Single(char),
}

struct Lexer {
    file: FileId,
    line: usize,
    col: usize,

    state: State,
    start: Loc,
    buff: String,

    out: Vec<Located<Token>>,
}

impl Lexer {
    fn new(file: FileId) -> Self {
        Lexer {
            file,
            line: 1,
            col: 1,
            state: State::Idle,
            start: Loc::new(file, 1, 1),
            buff: String::new(),
            out: Vec::new(),
        }
    }

    fn here(&self) -> Loc {
        Loc::new(self.file, self.line, self.col)
    }

    fn advance(&mut self, c: char) {
        if is_newline(c) {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
    }

    fn open(&mut self, state: State) {
        self.state = state;
        self.start = self.here();
        self.buff.clear();
    }

    fn emit_here(&mut self, tk: Token) {
        let loc = self.here();
        self.out.push(Located::with_loc(loc, tk));
    }

    fn finish(&mut self, tk: Token) {
        self.out.push(Located::with_loc(self.start, tk));
        self.state = State::Idle;
        self.buff.clear();
    }

    fn take_buff(&mut self) -> String {
        std::mem::replace(&mut self.buff, String::new())
    }

    fn begin(&mut self, c: char) {
        match c {
            '\n' | '\r' => self.emit_here(Token::Break),
            c if c.is_whitespace() => (),
            ';' => self.open(State::Comment),
            '"' => self.open(State::Str { escaped: false }),
            '%' => self.open(State::CharLit),
            '\\' => self.open(State::Escape),
            '$' => self.open(State::Hex),
            '.' => self.open(State::Directive),
            '#' => self.open(State::PreDirective),
            ',' | ':' => self.emit_here(Token::Separator(c)),
            '(' => self.emit_here(Token::Open),
            ')' => self.emit_here(Token::Close),
            '[' => self.emit_here(Token::BracketOpen),
            ']' => self.emit_here(Token::BracketClose),
            '~' => self.emit_here(Token::Op(Operator::Tilde)),
            '+' | '-' => self.open(State::Sign(c)),
            '*' | '/' | '&' | '|' | '^' | '!' | '<' | '>' | '=' => self.open(State::Single(c)),
            c if c.is_ascii_digit() => {
                self.open(State::Number);
                self.buff.push(c);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                self.open(State::Word);
                self.buff.push(c);
            }
            c => self.emit_here(Token::Error(c)),
        }
    }

    /// Feeds one character (or the end of input) to the state machine. Returns whether the
    /// character was consumed; if not, it must be fed again in the new state.
    fn step(&mut self, c: Option<char>) -> bool {
        match self.state {
            State::Idle => {
                if let Some(c) = c {
                    self.begin(c);
                }
                true
            }
            State::Comment => match c {
                Some(c) if !is_newline(c) => {
                    self.buff.push(c);
                    true
                }
                _ => {
                    let text = self.take_buff();
                    self.finish(Token::Comment(text));
                    false
                }
            },
            State::Str { escaped } => match c {
                None | Some('\n') | Some('\r') => {
                    let raw = format!("\"{}", self.take_buff());
                    self.finish(Token::Unexpected(raw));
                    false
                }
                Some('"') if !escaped => {
                    let text = unescape_str(&self.take_buff());
                    self.finish(Token::Str(text));
                    true
                }
                Some(c) => {
                    self.buff.push(c);
                    self.state = State::Str {
                        escaped: !escaped && c == '\\',
                    };
                    true
                }
            },
            State::CharLit | State::Escape => match c {
                Some(c) if !is_newline(c) => {
                    let tk = if self.state == State::CharLit {
                        Token::Char(c)
                    } else {
                        Token::Escape(c)
                    };
                    self.finish(tk);
                    true
                }
                _ => {
                    let raw = if self.state == State::CharLit { "%" } else { "\\" };
                    self.finish(Token::Unexpected(raw.to_owned()));
                    false
                }
            },
            State::Hex => match c {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.buff.push(c);
                    true
                }
                _ => {
                    let digits = self.take_buff();
                    if digits.is_empty() || digits.len() > MAX_HEX_DIGITS {
                        self.finish(Token::Unexpected(format!("${}", digits)));
                    } else {
                        self.finish(Token::Hex(digits));
                    }
                    false
                }
            },
            State::Word | State::Number | State::Directive | State::PreDirective => {
                let accepts = match (self.state, c) {
                    (_, None) => false,
                    (State::Number, Some(c)) => c.is_ascii_digit(),
                    (_, Some(c)) => is_word_char(c),
                };

                if let (true, Some(c)) = (accepts, c) {
                    self.buff.push(c);
                    return true;
                }

                let text = self.take_buff();
                let tk = match self.state {
                    State::Word => Token::Word(text),
                    State::Number => Token::Number(text),
                    State::Directive if text.is_empty() => Token::Unexpected(String::from(".")),
                    State::Directive => Token::Directive(text),
                    _ if text.is_empty() => Token::Unexpected(String::from("#")),
                    _ => Token::PreDirective(text),
                };
                self.finish(tk);
                false
            }
            State::Sign(sign) => match c {
                Some(c) if c.is_ascii_digit() => {
                    self.state = State::Number;
                    self.buff.push(sign);
                    self.buff.push(c);
                    true
                }
                _ => {
                    let op = if sign == '-' {
                        Operator::Minus
                    } else {
                        Operator::Plus
                    };
                    self.finish(Token::Op(op));
                    false
                }
            },
            State::Single(first) => {
                if let Some(op) = c.and_then(|c| double_op(first, c)) {
                    self.finish(Token::Op(op));
                    return true;
                }

                let tk = match single_op(first) {
                    Some(op) => Token::Op(op),
                    None => Token::Unexpected(first.to_string()),
                };
                self.finish(tk);
                false
            }
        }
    }
}

/// Splits `source` into tokens tagged with `file`. The result always ends with a `Break`.
pub fn tokenize(source: &str, file: FileId) -> Vec<Located<Token>> {
    let mut lexer = Lexer::new(file);

    let mut after_cr = false;
    for c in source.chars() {
        // "\r\n" is one line break.
        if after_cr && c == '\n' {
            after_cr = false;
            continue;
        }
        after_cr = c == '\r';

        while !lexer.step(Some(c)) {}
        lexer.advance(c);
    }
    while !lexer.step(None) {}

    lexer.emit_here(Token::Break);
    lexer.out
}
