//! Grammar + parser — see `spec.md` §4.5.
//!
//! Hand-written recursive-descent parser over a `Vec<char>` cursor (no
//! PEG-codegen dependency: none of the example repos in this pack pull
//! in a parser-combinator/PEG crate, so this follows the same
//! hand-rolled-AST idiom the teacher uses for its own Datalog term
//! parser). Produces a flat stream of `ParseEvent`s in left-to-right
//! textual order; `crate::compiler` folds that stream into bytecode.

mod events;
mod lexer;

pub use events::ParseEvent;

use crate::error::{ParseLocation, RangeError, Result};
use lexer::Cursor;

/// Parse a range expression into its left-to-right stream of parse
/// events. An empty or all-whitespace expression yields an empty
/// stream (`spec.md` §4.6 "empty source program").
pub fn parse(expr: &str) -> Result<Vec<ParseEvent>> {
    let mut p = Parser {
        cursor: Cursor::new(expr),
        events: Vec::new(),
    };
    p.cursor.skip_sp();
    if !p.cursor.at_end() {
        p.parse_combined()?;
    }
    p.cursor.skip_sp();
    if !p.cursor.at_end() {
        return Err(p.err("expr", "unexpected trailing input"));
    }
    Ok(p.events)
}

struct Parser<'a> {
    cursor: Cursor<'a>,
    events: Vec<ParseEvent>,
}

impl<'a> Parser<'a> {
    fn err(&self, rule: &'static str, msg: &str) -> RangeError {
        let (line, column) = self.cursor.line_col();
        RangeError::Parse(ParseLocation { line, column, rule }, msg.to_string())
    }

    /// `combined = rexpr , [ cexpr ]`
    ///
    /// The `[cexpr]` is implemented as a loop rather than a single
    /// optional recursive call: each iteration consumes one `,`-led
    /// operator and its right-hand `rexpr`, folding left to right, which
    /// is exactly what the grammar's right-nested `[cexpr]` inside
    /// `union`/`inter`/`diff` reduces to once parsed iteratively.
    fn parse_combined(&mut self) -> Result<()> {
        self.parse_rexpr()?;
        loop {
            self.cursor.skip_sp();
            if self.cursor.peek() != Some(',') {
                break;
            }
            self.parse_cexpr()?;
        }
        Ok(())
    }

    /// `cexpr = sp , ( union | inter | diff ) , sp`
    fn parse_cexpr(&mut self) -> Result<()> {
        self.cursor.expect_char(',', "cexpr")?;
        self.cursor.skip_sp();
        match self.cursor.peek() {
            Some('&') => {
                self.cursor.advance();
                self.cursor.skip_sp();
                self.parse_rexpr()?;
                self.events.push(ParseEvent::OpInter);
            }
            Some('-') => {
                self.cursor.advance();
                self.cursor.skip_sp();
                self.parse_rexpr()?;
                self.events.push(ParseEvent::OpDiff);
            }
            _ => {
                self.parse_rexpr()?;
                self.events.push(ParseEvent::OpUnion);
            }
        }
        Ok(())
    }

    /// `rexpr = sp , ( cluster | brackets | value | rlookup )`
    fn parse_rexpr(&mut self) -> Result<()> {
        self.cursor.skip_sp();
        match self.cursor.peek() {
            Some('%') => self.parse_cluster(),
            Some('(') => self.parse_brackets(),
            Some('*') => self.parse_rlookup(),
            Some(c) if c.is_ascii_lowercase() => self.parse_value(),
            _ => Err(self.err("rexpr", "expected '%', '(', '*' or a lowercase value")),
        }
    }

    /// `cluster = ( '%' , "RANGE" | '%' , rexpr | '%' , rlookup ) , [ key ]`
    fn parse_cluster(&mut self) -> Result<()> {
        self.cursor.expect_char('%', "cluster")?;
        if self.cursor.consume_literal_RANGE() {
            self.events.push(ParseEvent::Value("RANGE".to_string()));
            self.events.push(ParseEvent::AddValue);
        } else {
            self.parse_rexpr()?;
        }
        self.events.push(ParseEvent::OpCluster);

        if self.cursor.peek() == Some(':') {
            self.cursor.advance();
            let key = self.cursor.lex_upper_alnum("key")?;
            self.events.push(ParseEvent::OpKey(key));
        }
        Ok(())
    }

    /// `brackets = '(' , combined , ')'`
    fn parse_brackets(&mut self) -> Result<()> {
        self.cursor.expect_char('(', "brackets")?;
        self.cursor.skip_sp();
        self.parse_combined()?;
        self.cursor.skip_sp();
        self.cursor.expect_char(')', "brackets")?;
        Ok(())
    }

    /// `value = first , ( last? , middle+ | last* )`
    ///
    /// Implemented pragmatically as: a lowercase-alpha run, followed by
    /// any run of lowercase-alpha, digit, or `-` (the grammar's
    /// `first`/`middle`/`last` split enforces the same effective
    /// character set; this collapses it into one greedy scan, see
    /// `DESIGN.md`).
    fn parse_value(&mut self) -> Result<()> {
        let v = self.cursor.lex_value("value")?;
        self.events.push(ParseEvent::Value(v));
        self.events.push(ParseEvent::AddValue);
        Ok(())
    }

    /// `rlookup = '*' , rvalue , [ attr ] , [ cexpr ]`
    ///
    /// The trailing `[cexpr]` is handled by the caller's `parse_combined`
    /// loop, same as for any other `rexpr`.
    fn parse_rlookup(&mut self) -> Result<()> {
        self.cursor.expect_char('*', "rlookup")?;
        let v = self.cursor.lex_rvalue("rlookup")?;
        self.events.push(ParseEvent::Value(v));
        self.events.push(ParseEvent::AddValue);
        self.events.push(ParseEvent::OpRev);

        if self.cursor.peek() == Some(';') {
            self.cursor.advance();
            let attr = self.cursor.lex_upper_alnum("attr")?;
            self.events.push(ParseEvent::OpRevAttr(attr));

            if self.cursor.peek() == Some(':') {
                self.cursor.advance();
                let hint = self.cursor.lex_value("hint")?;
                self.events.push(ParseEvent::OpRevHint(hint));
            }
        }
        Ok(())
    }
}
