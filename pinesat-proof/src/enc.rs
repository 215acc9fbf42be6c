//! Shared framing helpers for proof emitters.
//!
//! ASCII framing uses decimal numbers with space and newline separators. Binary framing uses the
//! 7-bit base-128 varint encoding (LEB128); signed values (clause ids in deletion lists, literals
//! in id-carrying formats) are zigzag encoded first.
//!
//! Literals in binary DRAT-family framing use the MiniSat convention: a positive literal `v`
//! becomes `2v`, a negative one `2v + 1`, leaving 0 free as the clause terminator.

use std::io::{self, Write};

use pinesat_formula::Lit;

use crate::ClauseId;

/// Binary encoding of a literal in the DRAT convention.
pub fn drat_code(lit: Lit) -> u64 {
    let var = lit.index() as u64 + 1;
    (var << 1) | lit.is_negative() as u64
}

/// Zigzag encoding of a signed number.
pub fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Write a literal in ASCII followed by a space.
pub fn write_lit_ascii(target: &mut impl Write, lit: Lit) -> io::Result<()> {
    itoa::write(&mut *target, lit.to_dimacs())?;
    target.write_all(b" ")
}

/// Write an unsigned number in ASCII followed by a space.
pub fn write_u64_ascii(target: &mut impl Write, value: u64) -> io::Result<()> {
    itoa::write(&mut *target, value)?;
    target.write_all(b" ")
}

/// Write a signed number in ASCII followed by a space.
pub fn write_i64_ascii(target: &mut impl Write, value: i64) -> io::Result<()> {
    itoa::write(&mut *target, value)?;
    target.write_all(b" ")
}

/// Write a literal as a binary varint.
pub fn write_lit_binary(target: &mut impl Write, lit: Lit) -> io::Result<()> {
    leb128::write::unsigned(target, drat_code(lit))?;
    Ok(())
}

/// Write an unsigned number as a binary varint.
pub fn write_u64_binary(target: &mut impl Write, value: u64) -> io::Result<()> {
    leb128::write::unsigned(target, value)?;
    Ok(())
}

/// Write a signed number as a zigzag binary varint.
pub fn write_i64_binary(target: &mut impl Write, value: i64) -> io::Result<()> {
    leb128::write::unsigned(target, zigzag(value))?;
    Ok(())
}

/// Write a clause id, in the framing given by `binary`.
pub fn write_id(target: &mut impl Write, id: ClauseId, binary: bool) -> io::Result<()> {
    if binary {
        write_u64_binary(target, id)
    } else {
        write_u64_ascii(target, id)
    }
}

/// Write all literals of a clause followed by a terminating zero.
pub fn write_clause(target: &mut impl Write, lits: &[Lit], binary: bool) -> io::Result<()> {
    if binary {
        for &lit in lits {
            write_lit_binary(target, lit)?;
        }
        target.write_all(&[0])
    } else {
        for &lit in lits {
            write_lit_ascii(target, lit)?;
        }
        target.write_all(b"0\n")
    }
}

/// Write a list of clause ids followed by a terminating zero.
pub fn write_id_list(target: &mut impl Write, ids: &[ClauseId], binary: bool) -> io::Result<()> {
    if binary {
        for &id in ids {
            write_i64_binary(target, id as i64)?;
        }
        target.write_all(&[0])
    } else {
        for &id in ids {
            write_u64_ascii(target, id)?;
        }
        target.write_all(b"0\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pinesat_formula::lit;

    #[test]
    fn drat_codes() {
        assert_eq!(drat_code(lit!(1)), 2);
        assert_eq!(drat_code(lit!(-1)), 3);
        assert_eq!(drat_code(lit!(5)), 10);
        assert_eq!(drat_code(lit!(-5)), 11);
    }

    #[test]
    fn zigzag_mapping() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
    }

    #[test]
    fn ascii_clause() {
        let mut out = vec![];
        write_clause(&mut out, &[lit!(1), lit!(-2)], false).unwrap();
        assert_eq!(out, b"1 -2 0\n");
    }

    #[test]
    fn binary_clause() {
        let mut out = vec![];
        write_clause(&mut out, &[lit!(1), lit!(-2)], true).unwrap();
        assert_eq!(out, &[2, 5, 0]);
    }
}
