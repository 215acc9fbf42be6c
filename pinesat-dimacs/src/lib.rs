//! DIMACS CNF parser and writer for the Pinesat SAT solver.
//!
//! Supports the `p cnf` and `p inccnf` headers. The strictness of header checking is
//! configurable. Comment lines of the form `c --name=value` are collected so that the caller can
//! apply them as embedded solver options.

use std::{io, mem::replace};

use pinesat_formula::{CnfFormula, ExtendFormula, Lit, Var};

use anyhow::Error;
use thiserror::Error;

/// Possible errors while parsing a DIMACS CNF formula.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error(
        "line {}: Unexpected character in DIMACS CNF input: '{}'",
        line,
        unexpected
    )]
    UnexpectedInput { line: usize, unexpected: char },
    #[error(
        "line {}: Literal index is too large: {}{}...",
        line,
        index,
        final_digit
    )]
    LiteralTooLarge {
        line: usize,
        index: usize,
        final_digit: usize,
    },
    #[error("line {}: Invalid header syntax: {}", line, header)]
    InvalidHeader { line: usize, header: String },
    #[error("line {}: Unterminated clause", line)]
    UnterminatedClause { line: usize },
    #[error(
        "Formula has {} variables while the header specifies {} variables",
        var_count,
        header_var_count
    )]
    VarCount {
        var_count: usize,
        header_var_count: usize,
    },
    #[error(
        "Formula has {} clauses while the header specifies {} clauses",
        clause_count,
        header_clause_count
    )]
    ClauseCount {
        clause_count: usize,
        header_clause_count: usize,
    },
    #[error("Parser invoked after a previous error")]
    PreviousError,
}

/// The kind of formula announced by a DIMACS header.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HeaderKind {
    Cnf,
    IncCnf,
}

/// Variable and clause count present in a DIMACS CNF header.
#[derive(Copy, Clone, Debug)]
pub struct DimacsHeader {
    pub kind: HeaderKind,
    pub var_count: usize,
    /// Not present in `p inccnf` headers.
    pub clause_count: Option<usize>,
}

/// How strictly header counts are enforced.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ParserMode {
    /// Var and clause counts must match the header exactly.
    Strict,
    /// Counts may differ from the header; a header is still required to be well formed.
    Relaxed,
    /// Like relaxed, but a missing header is also accepted.
    Forced,
}

impl Default for ParserMode {
    fn default() -> ParserMode {
        ParserMode::Relaxed
    }
}

/// An embedded option found in a `c --name=value` comment.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct EmbeddedOption {
    pub name: String,
    pub value: String,
}

/// Parser for DIMACS CNF files.
///
/// This parser can consume the input in chunks while also producing the parsed result in chunks.
pub struct DimacsParser {
    formula: CnfFormula,
    partial_clause: Vec<Lit>,
    header: Option<DimacsHeader>,
    mode: ParserMode,
    options: Vec<EmbeddedOption>,

    line_number: usize,
    clause_count: usize,
    partial_lit: usize,
    negate_next_lit: bool,

    in_lit: bool,
    in_comment_or_header: bool,
    in_header: bool,
    start_of_line: bool,
    error: bool,

    comment_line: Vec<u8>,
}

impl Default for DimacsParser {
    fn default() -> DimacsParser {
        DimacsParser::new()
    }
}

impl DimacsParser {
    /// Create a new DIMACS CNF parser using the default (relaxed) mode.
    pub fn new() -> DimacsParser {
        DimacsParser::with_mode(ParserMode::default())
    }

    /// Create a new DIMACS CNF parser with the given strictness.
    pub fn with_mode(mode: ParserMode) -> DimacsParser {
        DimacsParser {
            formula: CnfFormula::new(),
            partial_clause: vec![],
            header: None,
            mode,
            options: vec![],

            line_number: 1,
            clause_count: 0,
            partial_lit: 0,
            negate_next_lit: false,

            in_lit: false,
            in_comment_or_header: false,
            in_header: false,
            start_of_line: true,
            error: false,

            comment_line: vec![],
        }
    }

    /// Parse the given input and check the header if present.
    ///
    /// This parses the whole input into a single [`CnfFormula`]. Incremental parsing is possible
    /// using [`parse_incremental`](DimacsParser::parse_incremental) or the
    /// [`parse_chunk`](DimacsParser::parse_chunk) method.
    pub fn parse(input: impl io::Read) -> Result<CnfFormula, Error> {
        Ok(Self::parse_incremental(input, |_| Ok(()))?.take_formula())
    }

    /// Parse the given input incrementally and check the header if present.
    ///
    /// The callback is invoked repeatedly with a reference to the parser. The callback can process
    /// the formula incrementally by calling [`take_formula`](DimacsParser::take_formula) on the
    /// passed argument.
    pub fn parse_incremental(
        input: impl io::Read,
        mut callback: impl FnMut(&mut DimacsParser) -> Result<(), Error>,
    ) -> Result<DimacsParser, Error> {
        use io::BufRead;

        let mut buffer = io::BufReader::new(input);
        let mut parser = Self::new();

        loop {
            let data = buffer.fill_buf()?;
            if data.is_empty() {
                break;
            }
            parser.parse_chunk(data)?;
            let len = data.len();
            buffer.consume(len);

            callback(&mut parser)?;
        }
        parser.eof()?;
        callback(&mut parser)?;
        parser.check_header()?;

        Ok(parser)
    }

    /// Parse a chunk of input.
    ///
    /// After parsing the last chunk call the [`eof`](DimacsParser::eof) method.
    ///
    /// If this method returns an error, the parser is in an invalid state and cannot parse further
    /// chunks.
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Result<(), ParserError> {
        if self.error {
            return Err(ParserError::PreviousError);
        }
        for &byte in chunk.iter() {
            if byte == b'\n' {
                self.line_number += 1;
            }
            match byte {
                b'\n' | b'\r' if self.in_comment_or_header => {
                    if self.in_header {
                        self.in_header = false;
                        self.parse_header_line()?;
                    } else {
                        self.parse_comment_line();
                    }
                    self.in_comment_or_header = false;
                    self.start_of_line = true
                }
                _ if self.in_comment_or_header => {
                    self.comment_line.push(byte);
                }
                b'0'..=b'9' => {
                    self.in_lit = true;
                    let digit = (byte - b'0') as usize;

                    const CAN_OVERFLOW: usize = Var::max_count() / 10;
                    const OVERFLOW_DIGIT: usize = Var::max_count() % 10;

                    // Overflow check that is fast but still works if LitIdx has the same size as
                    // usize
                    if CAN_OVERFLOW <= self.partial_lit {
                        let carry = (digit <= OVERFLOW_DIGIT) as usize;

                        if CAN_OVERFLOW + carry <= self.partial_lit {
                            self.error = true;
                            return Err(ParserError::LiteralTooLarge {
                                line: self.line_number,
                                index: self.partial_lit,
                                final_digit: digit,
                            });
                        }
                    }

                    self.partial_lit = self.partial_lit * 10 + digit;
                    self.start_of_line = false;
                }
                b'-' if !self.in_lit && !self.negate_next_lit => {
                    self.negate_next_lit = true;
                    self.start_of_line = false;
                }
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.finish_lit();
                    if byte == b'\n' {
                        self.start_of_line = true;
                    }
                }
                b'c' if self.start_of_line => {
                    self.in_comment_or_header = true;
                    self.comment_line.clear();
                }
                b'p' if self.start_of_line => {
                    self.in_comment_or_header = true;
                    self.in_header = true;
                    self.comment_line.clear();
                }
                _ => {
                    self.error = true;
                    return Err(ParserError::UnexpectedInput {
                        line: self.line_number,
                        unexpected: byte as char,
                    });
                }
            }
        }
        Ok(())
    }

    /// Finish parsing.
    ///
    /// This has to be called after the last call to [`parse_chunk`](DimacsParser::parse_chunk).
    pub fn eof(&mut self) -> Result<(), ParserError> {
        if self.error {
            return Err(ParserError::PreviousError);
        }
        if self.in_header {
            self.in_header = false;
            self.parse_header_line()?;
        }
        self.finish_lit();
        if self.negate_next_lit || !self.partial_clause.is_empty() {
            self.error = true;
            return Err(ParserError::UnterminatedClause {
                line: self.line_number,
            });
        }
        Ok(())
    }

    /// Perform the header checks the parser mode asks for.
    pub fn check_header(&self) -> Result<(), ParserError> {
        if self.mode != ParserMode::Strict {
            return Ok(());
        }
        if let Some(header) = self.header {
            if header.var_count < self.formula.var_count() {
                return Err(ParserError::VarCount {
                    var_count: self.formula.var_count(),
                    header_var_count: header.var_count,
                });
            }
            if let Some(clause_count) = header.clause_count {
                if clause_count != self.clause_count {
                    return Err(ParserError::ClauseCount {
                        clause_count: self.clause_count,
                        header_clause_count: clause_count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Take the formula parsed so far.
    ///
    /// Takes the clauses parsed since the last call, leaving the parser with an empty formula.
    /// The variable count of the returned formula matches the header if one was parsed.
    pub fn take_formula(&mut self) -> CnfFormula {
        let mut formula = replace(&mut self.formula, CnfFormula::new());
        if let Some(header) = self.header {
            formula.set_var_count(header.var_count);
        }
        formula
    }

    /// The header of the parsed formula if present.
    pub fn header(&self) -> Option<DimacsHeader> {
        self.header
    }

    /// Embedded `c --name=value` options seen so far.
    pub fn embedded_options(&self) -> &[EmbeddedOption] {
        &self.options
    }

    /// Number of clauses parsed so far.
    pub fn clause_count(&self) -> usize {
        self.clause_count
    }

    /// Number of variables in the parsed formula.
    pub fn var_count(&self) -> usize {
        self.formula.var_count()
    }

    fn finish_lit(&mut self) {
        if self.in_lit {
            self.in_lit = false;
            let lit_value = replace(&mut self.partial_lit, 0);
            let negate = replace(&mut self.negate_next_lit, false);
            if lit_value == 0 {
                let clause = replace(&mut self.partial_clause, vec![]);
                self.formula.add_clause(&clause);
                self.partial_clause = clause;
                self.partial_clause.clear();
                self.clause_count += 1;
            } else {
                let index = lit_value - 1;
                self.partial_clause
                    .push(Lit::from_index(index, !negate));
            }
        }
    }

    fn parse_header_line(&mut self) -> Result<(), ParserError> {
        let line = String::from_utf8_lossy(&self.comment_line).into_owned();
        let mut fields = line.split_whitespace();

        let invalid_header = |line_number| ParserError::InvalidHeader {
            line: line_number,
            header: format!("p{}", line),
        };

        let kind = match fields.next() {
            Some("cnf") => HeaderKind::Cnf,
            Some("inccnf") => HeaderKind::IncCnf,
            _ => return Err(invalid_header(self.line_number)),
        };

        let header = match kind {
            HeaderKind::Cnf => {
                let var_count = fields
                    .next()
                    .and_then(|field| field.parse().ok())
                    .ok_or_else(|| invalid_header(self.line_number))?;
                let clause_count = fields
                    .next()
                    .and_then(|field| field.parse().ok())
                    .ok_or_else(|| invalid_header(self.line_number))?;
                DimacsHeader {
                    kind,
                    var_count,
                    clause_count: Some(clause_count),
                }
            }
            HeaderKind::IncCnf => DimacsHeader {
                kind,
                var_count: 0,
                clause_count: None,
            },
        };

        if fields.next().is_some() || self.header.is_some() {
            return Err(invalid_header(self.line_number));
        }

        self.header = Some(header);
        Ok(())
    }

    fn parse_comment_line(&mut self) {
        let line = String::from_utf8_lossy(&self.comment_line);
        let line = line.trim();
        if let Some(option) = line.strip_prefix("--") {
            if let Some(eq) = option.find('=') {
                let (name, value) = option.split_at(eq);
                self.options.push(EmbeddedOption {
                    name: name.to_owned(),
                    value: value[1..].to_owned(),
                });
            }
        }
    }
}

/// Write a formula in DIMACS CNF format.
pub fn write_dimacs(target: &mut impl io::Write, formula: &CnfFormula) -> io::Result<()> {
    writeln!(
        target,
        "p cnf {} {}",
        formula.var_count(),
        formula.len()
    )?;
    for clause in formula.iter() {
        write_dimacs_clause(target, clause)?;
    }
    Ok(())
}

/// Write a single clause in DIMACS CNF format.
pub fn write_dimacs_clause(target: &mut impl io::Write, clause: &[Lit]) -> io::Result<()> {
    for &lit in clause.iter() {
        itoa::write(&mut *target, lit.to_dimacs())?;
        target.write_all(b" ")?;
    }
    target.write_all(b"0\n")
}

/// Write a model as a DIMACS witness (`v` lines terminated by 0).
pub fn write_witness(target: &mut impl io::Write, model: &[Lit]) -> io::Result<()> {
    let mut line_len = 0;
    for &lit in model.iter() {
        if line_len == 0 {
            target.write_all(b"v")?;
            line_len = 1;
        }
        target.write_all(b" ")?;
        itoa::write(&mut *target, lit.to_dimacs())?;
        line_len += 1;
        if line_len >= 16 {
            target.write_all(b"\n")?;
            line_len = 0;
        }
    }
    if line_len == 0 {
        target.write_all(b"v")?;
    }
    target.write_all(b" 0\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use pinesat_formula::cnf::strategy::cnf_formula;
    use pinesat_formula::cnf_formula;

    #[test]
    fn parse_simple() {
        let input = b"p cnf 3 2\n1 2 0\n-1 -2 3 0\n";
        let formula = DimacsParser::parse(&input[..]).unwrap();
        assert_eq!(
            formula,
            cnf_formula![
                1, 2;
                -1, -2, 3;
            ]
        );
    }

    #[test]
    fn parse_inccnf_header() {
        let input = b"p inccnf\n1 2 0\n";
        let mut parser = DimacsParser::with_mode(ParserMode::Strict);
        parser.parse_chunk(input).unwrap();
        parser.eof().unwrap();
        parser.check_header().unwrap();
        assert_eq!(parser.header().unwrap().kind, HeaderKind::IncCnf);
        assert_eq!(parser.clause_count(), 1);
    }

    #[test]
    fn parse_embedded_options() {
        let input = b"c --elim=0\nc plain comment\nc --restartmargin=25\np cnf 1 1\n1 0\n";
        let mut parser = DimacsParser::new();
        parser.parse_chunk(input).unwrap();
        parser.eof().unwrap();
        assert_eq!(
            parser.embedded_options(),
            &[
                EmbeddedOption {
                    name: "elim".to_owned(),
                    value: "0".to_owned()
                },
                EmbeddedOption {
                    name: "restartmargin".to_owned(),
                    value: "25".to_owned()
                },
            ]
        );
    }

    #[test]
    fn strict_clause_count_mismatch() {
        let input = b"p cnf 2 3\n1 2 0\n";
        let mut parser = DimacsParser::with_mode(ParserMode::Strict);
        parser.parse_chunk(input).unwrap();
        parser.eof().unwrap();
        match parser.check_header() {
            Err(ParserError::ClauseCount { .. }) => (),
            result => panic!("unexpected result {:?}", result.map(|_| ())),
        }
    }

    #[test]
    fn unterminated_clause() {
        let input = b"p cnf 2 1\n1 2\n";
        let mut parser = DimacsParser::new();
        parser.parse_chunk(input).unwrap();
        match parser.eof() {
            Err(ParserError::UnterminatedClause { .. }) => (),
            result => panic!("unexpected result {:?}", result),
        }
    }

    #[test]
    fn unexpected_character() {
        let input = b"p cnf 2 1\n1 x 0\n";
        let mut parser = DimacsParser::new();
        match parser.parse_chunk(input) {
            Err(ParserError::UnexpectedInput { unexpected: 'x', .. }) => (),
            result => panic!("unexpected result {:?}", result),
        }
    }

    proptest! {
        #[test]
        fn roundtrip(formula in cnf_formula(1..100usize, 0..500, 0..10)) {
            let mut written = vec![];
            write_dimacs(&mut written, &formula).unwrap();

            let parsed = DimacsParser::parse(&written[..]).unwrap();

            prop_assert_eq!(parsed, formula);
        }

        #[test]
        fn roundtrip_chunked(
            formula in cnf_formula(1..100usize, 0..500, 0..10),
            chunk_len in 1..80usize,
        ) {
            let mut written = vec![];
            write_dimacs(&mut written, &formula).unwrap();

            let mut parser = DimacsParser::with_mode(ParserMode::Strict);
            for chunk in written.chunks(chunk_len) {
                parser.parse_chunk(chunk).unwrap();
            }
            parser.eof().unwrap();
            parser.check_header().unwrap();

            let mut parsed = parser.take_formula();
            parsed.set_var_count(formula.var_count());

            prop_assert_eq!(parsed, formula);
        }
    }
}
