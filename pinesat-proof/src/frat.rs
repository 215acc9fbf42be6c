//! FRAT proof emission.
//!
//! FRAT identifies every clause by id. Additions may carry an optional antecedent hint (`l`
//! segment), deletions name the clause, and all clauses still live at the end of the proof are
//! finalized. Original clauses are recorded with `o` steps.

use std::io::Write;

use pinesat_formula::Lit;

use crate::emit::Emitter;
use crate::enc::{write_clause, write_id, write_id_list};
use crate::{ClauseId, Tracer};

/// Emits an FRAT proof, in ASCII or binary framing.
pub struct FratTracer<W: Write> {
    emitter: Emitter<W>,
    binary: bool,
}

impl<W: Write> FratTracer<W> {
    pub fn new(target: W, binary: bool) -> FratTracer<W> {
        FratTracer {
            emitter: Emitter::new(target),
            binary,
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(mut self) -> W {
        self.emitter.flush();
        self.emitter.into_inner()
    }

    fn step(&mut self, letter: u8, id: ClauseId, lits: &[Lit], antecedents: Option<&[ClauseId]>) {
        let binary = self.binary;
        self.emitter.with(|target| {
            target.write_all(&[letter])?;
            if !binary {
                target.write_all(b" ")?;
            }
            write_id(target, id, binary)?;
            if let Some(antecedents) = antecedents {
                // Lits and hint are separated by a zero terminator in both framings, but the
                // ASCII newline moves behind the hint.
                if binary {
                    write_clause(target, lits, true)?;
                    target.write_all(b"l")?;
                    write_id_list(target, antecedents, true)?;
                } else {
                    for &lit in lits {
                        crate::enc::write_lit_ascii(target, lit)?;
                    }
                    target.write_all(b"0 l ")?;
                    write_id_list(target, antecedents, false)?;
                }
            } else {
                write_clause(target, lits, binary)?;
            }
            Ok(())
        });
    }
}

impl<W: Write> Tracer for FratTracer<W> {
    fn add_original_clause(&mut self, id: ClauseId, _redundant: bool, lits: &[Lit], _restored: bool) {
        self.step(b'o', id, lits, None);
    }

    fn add_derived_clause(
        &mut self,
        id: ClauseId,
        _redundant: bool,
        lits: &[Lit],
        antecedents: &[ClauseId],
    ) {
        if antecedents.is_empty() {
            self.step(b'a', id, lits, None);
        } else {
            self.step(b'a', id, lits, Some(antecedents));
        }
    }

    fn delete_clause(&mut self, id: ClauseId, _redundant: bool, lits: &[Lit]) {
        self.step(b'd', id, lits, None);
    }

    fn weaken_minus(&mut self, id: ClauseId, lits: &[Lit]) {
        self.step(b'd', id, lits, None);
    }

    fn finalize_clause(&mut self, id: ClauseId, lits: &[Lit]) {
        self.step(b'f', id, lits, None);
    }

    fn conclude_unsat(&mut self, _conclusion: crate::Conclusion, _ids: &[ClauseId]) {
        self.emitter.flush();
    }

    fn needs_antecedents(&self) -> bool {
        true
    }

    fn flush(&mut self) {
        self.emitter.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pinesat_formula::lits;

    #[test]
    fn ascii_steps() {
        let mut tracer = FratTracer::new(vec![], false);
        tracer.add_original_clause(1, false, &lits![1, 2], false);
        tracer.add_derived_clause(2, true, &lits![1], &[1]);
        tracer.delete_clause(1, false, &lits![1, 2]);
        tracer.finalize_clause(2, &lits![1]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(out, "o 1 1 2 0\na 2 1 0 l 1 0\nd 1 1 2 0\nf 2 1 0\n");
    }

    #[test]
    fn derived_without_hint() {
        let mut tracer = FratTracer::new(vec![], false);
        tracer.add_derived_clause(3, true, &lits![-2], &[]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(out, "a 3 -2 0\n");
    }
}
