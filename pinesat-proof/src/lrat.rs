//! LRAT proof emission.
//!
//! Every addition carries the full antecedent chain, so checking needs no search. Deletions are
//! by id and grouped into a single deletion line per addition, led by the id of the most recent
//! addition as the format prescribes.

use std::io::Write;

use pinesat_formula::Lit;

use crate::emit::Emitter;
use crate::enc::{write_clause, write_id, write_id_list, write_lit_ascii};
use crate::{ClauseId, Tracer};

/// Emits an LRAT proof, in ASCII or binary framing.
pub struct LratTracer<W: Write> {
    emitter: Emitter<W>,
    binary: bool,
    last_id: ClauseId,
    pending_deletes: Vec<ClauseId>,
}

impl<W: Write> LratTracer<W> {
    pub fn new(target: W, binary: bool) -> LratTracer<W> {
        LratTracer {
            emitter: Emitter::new(target),
            binary,
            last_id: 0,
            pending_deletes: vec![],
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(mut self) -> W {
        self.flush_deletes();
        self.emitter.flush();
        self.emitter.into_inner()
    }

    fn flush_deletes(&mut self) {
        if self.pending_deletes.is_empty() {
            return;
        }
        let binary = self.binary;
        let last_id = self.last_id;
        let deletes = std::mem::replace(&mut self.pending_deletes, vec![]);
        self.emitter.with(|target| {
            if binary {
                target.write_all(b"d")?;
            } else {
                write_id(target, last_id, false)?;
                target.write_all(b"d ")?;
            }
            write_id_list(target, &deletes, binary)
        });
    }

    fn add(&mut self, id: ClauseId, lits: &[Lit], antecedents: &[ClauseId]) {
        self.flush_deletes();
        self.last_id = id;
        let binary = self.binary;
        self.emitter.with(|target| {
            if binary {
                target.write_all(b"a")?;
            }
            write_id(target, id, binary)?;
            if binary {
                write_clause(target, lits, true)?;
                write_id_list(target, antecedents, true)?;
            } else {
                for &lit in lits {
                    write_lit_ascii(target, lit)?;
                }
                target.write_all(b"0 ")?;
                write_id_list(target, antecedents, false)?;
            }
            Ok(())
        });
    }
}

impl<W: Write> Tracer for LratTracer<W> {
    fn add_original_clause(&mut self, id: ClauseId, _redundant: bool, _lits: &[Lit], _restored: bool) {
        // Original clauses are implicitly numbered by the checker; remember the id so deletion
        // lines stay correctly led even before the first derived clause.
        self.last_id = id;
    }

    fn add_derived_clause(
        &mut self,
        id: ClauseId,
        _redundant: bool,
        lits: &[Lit],
        antecedents: &[ClauseId],
    ) {
        self.add(id, lits, antecedents);
    }

    fn delete_clause(&mut self, id: ClauseId, _redundant: bool, _lits: &[Lit]) {
        self.pending_deletes.push(id);
    }

    fn weaken_minus(&mut self, id: ClauseId, _lits: &[Lit]) {
        self.pending_deletes.push(id);
    }

    fn conclude_unsat(&mut self, _conclusion: crate::Conclusion, _ids: &[ClauseId]) {
        self.flush_deletes();
        self.emitter.flush();
    }

    fn needs_antecedents(&self) -> bool {
        true
    }

    fn flush(&mut self) {
        self.flush_deletes();
        self.emitter.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pinesat_formula::lits;

    #[test]
    fn ascii_adds_and_deletes() {
        let mut tracer = LratTracer::new(vec![], false);
        tracer.add_original_clause(1, false, &lits![1, 2], false);
        tracer.add_original_clause(2, false, &lits![-1, 2], false);
        tracer.add_derived_clause(3, true, &lits![2], &[1, 2]);
        tracer.delete_clause(1, false, &lits![1, 2]);
        tracer.delete_clause(2, false, &lits![-1, 2]);
        tracer.add_derived_clause(4, true, &lits![], &[3]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(out, "3 2 0 1 2 0\n3 d 1 2 0\n4 0 3 0\n");
    }

    #[test]
    fn binary_framing() {
        let mut tracer = LratTracer::new(vec![], true);
        tracer.add_derived_clause(3, true, &lits![2], &[1, 2]);
        tracer.delete_clause(1, false, &lits![1, 2]);

        // 'a' id lits 0 ants(zigzag) 0, then 'd' ids(zigzag) 0
        assert_eq!(
            tracer.into_inner(),
            &[b'a', 3, 4, 0, 2, 4, 0, b'd', 2, 0]
        );
    }
}
