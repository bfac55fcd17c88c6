//! Evaluator backing the reference realm's `eval`.
//!
//! Accepts numeric expressions: decimal literals (with fraction and exponent), `+ - * / %`,
//! unary `+`/`-`, parentheses and an optional trailing `;`.

use crate::error::HostError;

/// Deepest nesting of parentheses and unary operators accepted before giving up.
const MAX_NESTING_DEPTH: usize = 256;

/// Evaluates `source`. Blank source evaluates to `None` (`undefined`).
pub(crate) fn evaluate(source: &str) -> Result<Option<f64>, HostError> {
  let mut parser = Parser {
    src: source.as_bytes(),
    pos: 0,
    depth: 0,
  };
  parser.skip_ws();
  if parser.eat(b';') {
    parser.skip_ws();
  }
  if parser.at_end() {
    return Ok(None);
  }
  let value = parser.additive()?;
  parser.skip_ws();
  if parser.eat(b';') {
    parser.skip_ws();
  }
  if !parser.at_end() {
    return Err(parser.unexpected());
  }
  Ok(Some(value))
}

struct Parser<'a> {
  src: &'a [u8],
  pos: usize,
  depth: usize,
}

impl<'a> Parser<'a> {
  fn at_end(&self) -> bool {
    self.pos >= self.src.len()
  }

  fn peek(&self) -> Option<u8> {
    self.src.get(self.pos).copied()
  }

  fn eat(&mut self, c: u8) -> bool {
    if self.peek() == Some(c) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn skip_ws(&mut self) {
    while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
      self.pos += 1;
    }
  }

  fn unexpected(&self) -> HostError {
    match self.peek() {
      Some(c) => HostError::SyntaxError(format!(
        "unexpected token '{c}' at offset {pos}",
        c = c as char,
        pos = self.pos
      )),
      None => HostError::SyntaxError("unexpected end of input".to_string()),
    }
  }

  fn additive(&mut self) -> Result<f64, HostError> {
    let mut acc = self.multiplicative()?;
    loop {
      self.skip_ws();
      if self.eat(b'+') {
        acc += self.multiplicative()?;
      } else if self.eat(b'-') {
        acc -= self.multiplicative()?;
      } else {
        return Ok(acc);
      }
    }
  }

  fn multiplicative(&mut self) -> Result<f64, HostError> {
    let mut acc = self.unary()?;
    loop {
      self.skip_ws();
      if self.eat(b'*') {
        acc *= self.unary()?;
      } else if self.eat(b'/') {
        acc /= self.unary()?;
      } else if self.eat(b'%') {
        acc %= self.unary()?;
      } else {
        return Ok(acc);
      }
    }
  }

  // Every parenthesis and unary operator passes through here, so this bounds the recursion.
  fn unary(&mut self) -> Result<f64, HostError> {
    if self.depth >= MAX_NESTING_DEPTH {
      return Err(HostError::SyntaxError(
        "expression nested too deeply".to_string(),
      ));
    }
    self.depth += 1;
    let value = self.unary_operand();
    self.depth -= 1;
    value
  }

  fn unary_operand(&mut self) -> Result<f64, HostError> {
    self.skip_ws();
    if self.eat(b'-') {
      return Ok(-self.unary()?);
    }
    if self.eat(b'+') {
      return self.unary();
    }
    self.primary()
  }

  fn primary(&mut self) -> Result<f64, HostError> {
    self.skip_ws();
    if self.eat(b'(') {
      let value = self.additive()?;
      self.skip_ws();
      if !self.eat(b')') {
        return Err(self.unexpected());
      }
      return Ok(value);
    }
    self.number()
  }

  fn number(&mut self) -> Result<f64, HostError> {
    let start = self.pos;
    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
      self.pos += 1;
    }
    if self.eat(b'.') {
      while self.peek().is_some_and(|c| c.is_ascii_digit()) {
        self.pos += 1;
      }
    }
    if self.pos == start || (self.pos == start + 1 && self.src[start] == b'.') {
      self.pos = start;
      return Err(self.unexpected());
    }
    if matches!(self.peek(), Some(b'e' | b'E')) {
      let mark = self.pos;
      self.pos += 1;
      if matches!(self.peek(), Some(b'+' | b'-')) {
        self.pos += 1;
      }
      let digits = self.pos;
      while self.peek().is_some_and(|c| c.is_ascii_digit()) {
        self.pos += 1;
      }
      if self.pos == digits {
        self.pos = mark;
        return Err(self.unexpected());
      }
    }
    // The scanned slice only contains ASCII digits, `.`, `e`/`E` and signs.
    let text = std::str::from_utf8(&self.src[start..self.pos])
      .map_err(|_| HostError::SyntaxError("invalid numeric literal".to_string()))?;
    text
      .parse::<f64>()
      .map_err(|_| HostError::SyntaxError(format!("invalid numeric literal '{text}'")))
  }
}
