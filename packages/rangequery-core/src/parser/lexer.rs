//! Character-level cursor shared by the recursive-descent parser.

use crate::error::{ParseLocation, RangeError, Result};

pub struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    _src: &'a str,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Cursor {
            chars: src.chars().collect(),
            pos: 0,
            _src: src,
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// `(line, column)` of the current position, 1-indexed. Expressions
    /// are expected to be single-line query strings, but newlines are
    /// still tracked in case one sneaks in.
    pub fn line_col(&self) -> (usize, usize) {
        let mut line = 1;
        let mut col = 1;
        for &c in &self.chars[..self.pos.min(self.chars.len())] {
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    pub fn skip_sp(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    pub fn expect_char(&mut self, want: char, rule: &'static str) -> Result<()> {
        match self.advance() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.err(rule, &format!("expected '{want}', found '{c}'"))),
            None => Err(self.err(rule, &format!("expected '{want}', found end of input"))),
        }
    }

    /// Matches the literal `RANGE` exactly, only when it is not itself
    /// the prefix of a longer upper-alnum run (so `%RANGEX` is rejected
    /// rather than silently treated as `%RANGE` followed by garbage).
    #[allow(non_snake_case)]
    pub fn consume_literal_RANGE(&mut self) -> bool {
        const LIT: [char; 5] = ['R', 'A', 'N', 'G', 'E'];
        for (i, want) in LIT.iter().enumerate() {
            if self.peek_at(i) != Some(*want) {
                return false;
            }
        }
        if matches!(self.peek_at(5), Some(c) if c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return false;
        }
        self.pos += 5;
        true
    }

    /// `UPPER_ALNUM+` — used for keys and attrs.
    pub fn lex_upper_alnum(&mut self, rule: &'static str) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_uppercase() || c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err(rule, "expected one or more of [A-Z0-9]"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// `value = first , ( last? , middle+ | last* )` collapsed into one
    /// scan: a lowercase-alpha run, then zero or more `-`-joined
    /// lowercase/digit segments. A trailing `-` not followed by an
    /// alnum segment is left unconsumed (it belongs to a `,-` operator
    /// or is simply invalid trailing input).
    pub fn lex_value(&mut self, rule: &'static str) -> Result<String> {
        let start = self.pos;
        if !matches!(self.peek(), Some(c) if c.is_ascii_lowercase()) {
            return Err(self.err(rule, "expected a lowercase-alpha value"));
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_lowercase()) {
            self.pos += 1;
        }
        loop {
            if self.peek() == Some('-')
                && matches!(self.peek_at(1), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit())
            {
                self.pos += 1;
                while matches!(self.peek(), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit())
                {
                    self.pos += 1;
                }
            } else if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit())
                {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    /// `rvalue = ( lowerAlpha | upperAlpha | digit | '-' | ' ' | '.' )+`
    /// Trailing spaces are trimmed (they belong to the `sp` separator
    /// before the next token, not to the value itself).
    pub fn lex_rvalue(&mut self, rule: &'static str) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '-' || c == ' ' || c == '.')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err(rule, "expected a reverse-lookup value"));
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        Ok(raw.trim_end_matches(' ').to_string())
    }

    fn err(&self, rule: &'static str, msg: &str) -> RangeError {
        let (line, column) = self.line_col();
        RangeError::Parse(ParseLocation { line, column, rule }, msg.to_string())
    }
}
