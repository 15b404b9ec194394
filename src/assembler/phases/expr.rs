use super::tokenize::{self, Token};
use super::types::{ErrorKind, Located, Operator};
use crate::assembler::model::{Constant, ConstantTable};
use std::fmt::Display;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Unbalanced,
    Empty,
    InvalidOperation(Operator),
    StackUnderflow(Operator),
    DivisionByZero,
    UnknownConstant(String),
    UnexpectedToken(String),
    MalformedNumber(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedNumber(_) => ErrorKind::Lexical,
            Error::UnknownConstant(_) => ErrorKind::Reference,
            _ => ErrorKind::Expression,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unbalanced => write!(f, "Unbalanced parentheses in expression"),
            Error::Empty => write!(f, "Expression is invalid or empty"),
            Error::InvalidOperation(op) => {
                write!(f, "Operator '{}' cannot be applied to these operands", op)
            }
            Error::StackUnderflow(op) => write!(f, "Missing operand for operator '{}'", op),
            Error::DivisionByZero => write!(f, "Division by zero"),
            Error::UnknownConstant(name) => write!(f, "Unknown constant '{}'", name),
            Error::UnexpectedToken(tk) => write!(f, "Unexpected token in expression: '{}'", tk),
            Error::MalformedNumber(raw) => write!(f, "Malformed numeric literal '{}'", raw),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Entry {
    Marker,
    Unary(Operator),
    Binary(Operator),
}

impl Entry {
    fn precedence(self) -> Option<u8> {
        match self {
            Entry::Marker => None,
            Entry::Unary(_) => Some(Operator::UNARY_PRECEDENCE),
            Entry::Binary(op) => op.binary_precedence(),
        }
    }
}

fn apply_unary(op: Operator, val: Constant) -> Result<Constant, Error> {
    let n = match val {
        Constant::Number(n) => n,
        _ => return Err(Error::InvalidOperation(op)),
    };

    Ok(Constant::Number(match op {
        Operator::Minus => n.wrapping_neg(),
        Operator::Plus => n,
        Operator::Tilde => !n,
        Operator::Bang => (n == 0) as i64,
        _ => return Err(Error::InvalidOperation(op)),
    }))
}

fn apply_numeric(op: Operator, l: i64, r: i64) -> Result<i64, Error> {
    Ok(match op {
        Operator::Plus => l.wrapping_add(r),
        Operator::Minus => l.wrapping_sub(r),
        Operator::Star => l.wrapping_mul(r),
        Operator::Slash | Operator::Modulo if r == 0 => return Err(Error::DivisionByZero),
        Operator::Slash => l.wrapping_div(r),
        Operator::Modulo => l.wrapping_rem(r),
        Operator::Amp => l & r,
        Operator::Pipe => l | r,
        Operator::Caret => l ^ r,
        Operator::Shl => l.wrapping_shl(r as u32),
        Operator::Shr => l.wrapping_shr(r as u32),
        Operator::Lt => (l < r) as i64,
        Operator::Le => (l <= r) as i64,
        Operator::Gt => (l > r) as i64,
        Operator::Ge => (l >= r) as i64,
        Operator::EqEq => (l == r) as i64,
        Operator::NotEq => (l != r) as i64,
        Operator::AndAnd => (l != 0 && r != 0) as i64,
        Operator::OrOr => (l != 0 || r != 0) as i64,
        Operator::Tilde | Operator::Bang => return Err(Error::InvalidOperation(op)),
    })
}

fn apply_textual(op: Operator, l: String, r: String) -> Result<Constant, Error> {
    Ok(match op {
        Operator::Plus => Constant::Str(l + &r),
        Operator::Minus => match l.strip_suffix(r.as_str()) {
            Some(stripped) => Constant::Str(stripped.to_owned()),
            None => Constant::Str(l),
        },
        Operator::Slash if r.is_empty() => Constant::Str(l),
        Operator::Slash => Constant::Str(l.replace(r.as_str(), "")),
        Operator::EqEq => Constant::Number((l == r) as i64),
        Operator::NotEq => Constant::Number((l != r) as i64),
        _ => return Err(Error::InvalidOperation(op)),
    })
}

fn apply_binary(op: Operator, l: Constant, r: Constant) -> Result<Constant, Error> {
    match (l, r) {
        (Constant::Number(l), Constant::Number(r)) => {
            apply_numeric(op, l, r).map(Constant::Number)
        }
        (Constant::Str(l), Constant::Str(r)) => apply_textual(op, l, r),
        (Constant::Str(l), Constant::Number(r)) => apply_textual(op, l, r.to_string()),
        (Constant::Number(l), Constant::Str(r)) => apply_textual(op, l.to_string(), r),
        _ => Err(Error::InvalidOperation(op)),
    }
}

struct Evaluator<'a> {
    constants: &'a ConstantTable,
    values: Vec<Constant>,
    ops: Vec<Entry>,
    expect_operand: bool,
}

impl<'a> Evaluator<'a> {
    fn reduce_one(&mut self) -> Result<(), Error> {
        match self.ops.pop() {
            Some(Entry::Unary(op)) => {
                let val = self.values.pop().ok_or(Error::StackUnderflow(op))?;
                self.values.push(apply_unary(op, val)?);
            }
            Some(Entry::Binary(op)) => {
                let r = self.values.pop().ok_or(Error::StackUnderflow(op))?;
                let l = self.values.pop().ok_or(Error::StackUnderflow(op))?;
                self.values.push(apply_binary(op, l, r)?);
            }
            Some(Entry::Marker) | None => unreachable!(),
        }
        Ok(())
    }

    /// Reduces while the top of the operator stack binds at least as tightly as `prec`.
    fn reduce_while(&mut self, prec: u8) -> Result<(), Error> {
        while let Some(top) = self.ops.last().and_then(|entry| entry.precedence()) {
            if top < prec {
                break;
            }
            self.reduce_one()?;
        }
        Ok(())
    }

    /// Returns whether the outermost parenthesis has been closed.
    fn close(&mut self) -> Result<bool, Error> {
        if self.expect_operand {
            return Err(match self.ops.last() {
                Some(Entry::Marker) => Error::Empty,
                Some(Entry::Unary(op)) | Some(Entry::Binary(op)) => Error::StackUnderflow(*op),
                None => Error::Unbalanced,
            });
        }

        self.reduce_while(0)?;
        match self.ops.pop() {
            Some(Entry::Marker) => (),
            _ => return Err(Error::Unbalanced),
        }
        Ok(self.ops.is_empty())
    }

    fn operator(&mut self, op: Operator) -> Result<(), Error> {
        if self.expect_operand {
            if !op.is_unary() {
                return Err(Error::UnexpectedToken(op.to_string()));
            }
            self.ops.push(Entry::Unary(op));
            return Ok(());
        }

        let prec = op
            .binary_precedence()
            .ok_or_else(|| Error::UnexpectedToken(op.to_string()))?;
        self.reduce_while(prec)?;
        self.ops.push(Entry::Binary(op));
        self.expect_operand = true;
        Ok(())
    }

    fn operand(&mut self, val: Constant) {
        self.values.push(val);
        self.expect_operand = false;
    }

    fn lookup(&self, name: &str) -> Result<Constant, Error> {
        match self.constants.get(name) {
            Some(Constant::Empty) | None => Err(Error::UnknownConstant(name.to_owned())),
            Some(val) => Ok(val.clone()),
        }
    }

    fn token(&mut self, tk: &Token) -> Result<bool, Error> {
        match tk {
            Token::Comment(_) => (),
            Token::Break => return Err(Error::Unbalanced),
            Token::Open if self.expect_operand => self.ops.push(Entry::Marker),
            Token::Close => return self.close(),
            Token::Op(op) => self.operator(*op)?,
            Token::Number(raw)
                if !self.expect_operand && raw.starts_with(|c: char| c == '-' || c == '+') =>
            {
                // `a -1` lexes the sign into the literal, but here it can only be an operator.
                let (sign, digits) = raw.split_at(1);
                self.operator(if sign == "-" {
                    Operator::Minus
                } else {
                    Operator::Plus
                })?;
                self.token(&Token::Number(digits.to_owned()))?;
            }
            tk if !self.expect_operand => return Err(Error::UnexpectedToken(tk.text())),
            Token::Number(raw) => {
                let val = tokenize::parse_number(raw)
                    .map_err(|_| Error::MalformedNumber(raw.clone()))?;
                self.operand(Constant::Number(val));
            }
            Token::Hex(raw) => {
                let val =
                    tokenize::parse_hex(raw).map_err(|_| Error::MalformedNumber(raw.clone()))?;
                self.operand(Constant::Number(val));
            }
            Token::Char(c) => self.operand(Constant::Number(*c as i64)),
            Token::Str(s) => self.operand(Constant::Str(s.clone())),
            Token::Word(name) => {
                let val = self.lookup(name)?;
                self.operand(val);
            }
            tk => return Err(Error::UnexpectedToken(tk.text())),
        }
        Ok(false)
    }
}

/// Evaluates a parenthesized expression. `pos` must point just past the opening parenthesis;
/// on success it is left just past the matching close.
pub fn evaluate(
    tokens: &[Located<Token>],
    pos: &mut usize,
    constants: &ConstantTable,
) -> Result<Constant, Located<Error>> {
    let start = pos.checked_sub(1).and_then(|idx| tokens.get(idx));
    let err_at = |err: Error, tk: Option<&Located<Token>>| -> Located<Error> {
        match tk.or(start) {
            Some(tk) => tk.transfer(err),
            None => err.into(),
        }
    };

    let mut ev = Evaluator {
        constants,
        values: Vec::new(),
        ops: vec![Entry::Marker],
        expect_operand: true,
    };

    loop {
        let tk = match tokens.get(*pos) {
            Some(tk) => tk,
            None => return Err(err_at(Error::Unbalanced, None)),
        };
        *pos += 1;

        if ev.token(tk.inner()).map_err(|err| err_at(err, Some(tk)))? {
            break;
        }
    }

    match (ev.values.pop(), ev.values.is_empty()) {
        (Some(Constant::Empty), _) | (None, _) | (_, false) => Err(err_at(Error::Empty, None)),
        (Some(val), true) => {
            log::trace!("folded expression to {}", val);
            Ok(val)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tokenize::tokenize;
    use super::*;

    fn eval_with(source: &str, constants: &ConstantTable) -> Result<Constant, Error> {
        let tokens = tokenize(source, 0);
        assert_eq!(tokens[0].inner(), &Token::Open);
        let mut pos = 1;
        evaluate(&tokens, &mut pos, constants).map_err(Located::value)
    }

    fn eval(source: &str) -> Result<Constant, Error> {
        eval_with(source, &ConstantTable::new())
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("(2+3)"), Ok(Constant::Number(5)));
        assert_eq!(eval("(2 + 3 * 4)"), Ok(Constant::Number(14)));
        assert_eq!(eval("((2 + 3) * 4)"), Ok(Constant::Number(20)));
        assert_eq!(eval("(10 - 2 - 3)"), Ok(Constant::Number(5)));
        assert_eq!(eval("(17 // 5)"), Ok(Constant::Number(2)));
        assert_eq!(eval("(1 << 4 | 1)"), Ok(Constant::Number(17)));
        assert_eq!(eval("($10 + %A)"), Ok(Constant::Number(16 + 65)));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("(~0)"), Ok(Constant::Number(-1)));
        assert_eq!(eval("(!0)"), Ok(Constant::Number(1)));
        assert_eq!(eval("(!7)"), Ok(Constant::Number(0)));
        assert_eq!(eval("(-(2 + 3))"), Ok(Constant::Number(-5)));
        assert_eq!(eval("(4 -1)"), Ok(Constant::Number(3)));
        assert_eq!(eval("(4 - -1)"), Ok(Constant::Number(5)));
    }

    #[test]
    fn logic_and_comparison() {
        assert_eq!(eval("(1 < 2 && 3 >= 3)"), Ok(Constant::Number(1)));
        assert_eq!(eval("(0 || 1 == 2)"), Ok(Constant::Number(0)));
        assert_eq!(eval("(1 + 1 == 2)"), Ok(Constant::Number(1)));
    }

    #[test]
    fn strings() {
        assert_eq!(eval(r#"("ab"+"cd")"#), Ok(Constant::Str("abcd".to_owned())));
        assert_eq!(eval(r#"("file.cws" - ".cws")"#), Ok(Constant::Str("file".to_owned())));
        assert_eq!(eval(r#"("abc" - "x")"#), Ok(Constant::Str("abc".to_owned())));
        assert_eq!(eval(r#"("a-b-c" / "-")"#), Ok(Constant::Str("abc".to_owned())));
        assert_eq!(eval(r#"("v" + 2)"#), Ok(Constant::Str("v2".to_owned())));
        assert_eq!(eval(r#"("x" == "x")"#), Ok(Constant::Number(1)));
        assert_eq!(
            eval(r#"("x" * 2)"#),
            Err(Error::InvalidOperation(Operator::Star))
        );
        assert_eq!(eval(r#"(~"x")"#), Err(Error::InvalidOperation(Operator::Tilde)));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(eval("(5/0)"), Err(Error::DivisionByZero));
        assert_eq!(eval("(5 // 0)"), Err(Error::DivisionByZero));
    }

    #[test]
    fn constants() {
        let mut constants = ConstantTable::new();
        constants.insert("SIZE".to_owned(), Constant::Number(8));
        constants.insert("NAME".to_owned(), Constant::Str("lib".to_owned()));
        constants.insert("FLAG".to_owned(), Constant::Empty);
        assert_eq!(eval_with("(SIZE * 2)", &constants), Ok(Constant::Number(16)));
        assert_eq!(
            eval_with(r#"(NAME + ".cwl")"#, &constants),
            Ok(Constant::Str("lib.cwl".to_owned()))
        );
        assert_eq!(
            eval_with("(FLAG)", &constants),
            Err(Error::UnknownConstant("FLAG".to_owned()))
        );
        assert_eq!(
            eval_with("(OTHER)", &constants),
            Err(Error::UnknownConstant("OTHER".to_owned()))
        );
    }

    #[test]
    fn malformed() {
        assert_eq!(eval("()"), Err(Error::Empty));
        assert_eq!(eval("(1 +)"), Err(Error::StackUnderflow(Operator::Plus)));
        assert_eq!(eval("(1 2)"), Err(Error::UnexpectedToken("2".to_owned())));
        assert_eq!(eval("((1)"), Err(Error::Unbalanced));
        assert_eq!(eval("(1, 2)"), Err(Error::UnexpectedToken(",".to_owned())));
        assert_eq!(
            eval("(99999999999999999999)"),
            Err(Error::MalformedNumber("99999999999999999999".to_owned()))
        );
    }

    #[test]
    fn position_is_advanced_past_close() {
        let tokens = tokenize("(1 + (2)) rest", 0);
        let mut pos = 1;
        assert_eq!(
            evaluate(&tokens, &mut pos, &ConstantTable::new()),
            Ok(Constant::Number(3))
        );
        assert_eq!(tokens[pos].inner(), &Token::Word("rest".to_owned()));
    }
}
