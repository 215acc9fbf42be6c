//! DRAT proof emission.
//!
//! DRAT proofs consist of clause additions and deletions only. Clause ids are not part of the
//! format, so weakened clauses are tracked in a side table to turn weaken/strengthen pairs into
//! delete/re-add pairs and to drop the redundant delete after a weaken.

use std::io::Write;

use rustc_hash::FxHashMap;

use pinesat_formula::Lit;

use crate::emit::Emitter;
use crate::enc::write_clause;
use crate::{ClauseId, Tracer};

/// Emits a DRAT proof, in ASCII or binary framing.
pub struct DratTracer<W: Write> {
    emitter: Emitter<W>,
    binary: bool,
    /// Clauses moved to the extension stack, by id.
    weakened: FxHashMap<ClauseId, Vec<Lit>>,
}

impl<W: Write> DratTracer<W> {
    pub fn new(target: W, binary: bool) -> DratTracer<W> {
        DratTracer {
            emitter: Emitter::new(target),
            binary,
            weakened: FxHashMap::default(),
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(mut self) -> W {
        self.emitter.flush();
        self.emitter.into_inner()
    }

    fn add(&mut self, lits: &[Lit]) {
        let binary = self.binary;
        self.emitter.with(|target| {
            if binary {
                target.write_all(b"a")?;
            }
            write_clause(target, lits, binary)
        });
    }

    fn delete(&mut self, lits: &[Lit]) {
        let binary = self.binary;
        self.emitter.with(|target| {
            if binary {
                target.write_all(b"d")?;
            } else {
                target.write_all(b"d ")?;
            }
            write_clause(target, lits, binary)
        });
    }
}

impl<W: Write> Tracer for DratTracer<W> {
    fn add_original_clause(&mut self, id: ClauseId, _redundant: bool, lits: &[Lit], restored: bool) {
        // The original formula is the checker's other input; only restored clauses reappear.
        if restored {
            self.weakened.remove(&id);
            self.add(lits);
        }
    }

    fn add_derived_clause(
        &mut self,
        _id: ClauseId,
        _redundant: bool,
        lits: &[Lit],
        _antecedents: &[ClauseId],
    ) {
        self.add(lits);
    }

    fn delete_clause(&mut self, id: ClauseId, _redundant: bool, lits: &[Lit]) {
        if self.weakened.remove(&id).is_some() {
            // Already deleted when it was weakened.
            return;
        }
        self.delete(lits);
    }

    fn weaken_minus(&mut self, id: ClauseId, lits: &[Lit]) {
        self.weakened.insert(id, lits.to_vec());
        self.delete(lits);
    }

    fn strengthen(&mut self, id: ClauseId) {
        if let Some(lits) = self.weakened.remove(&id) {
            self.add(&lits);
        }
    }

    fn conclude_unsat(&mut self, _conclusion: crate::Conclusion, _ids: &[ClauseId]) {
        self.add(&[]);
        self.emitter.flush();
    }

    fn flush(&mut self) {
        self.emitter.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pinesat_formula::lits;

    use crate::Conclusion;

    #[test]
    fn ascii_add_and_delete() {
        let mut tracer = DratTracer::new(vec![], false);
        tracer.add_derived_clause(4, true, &lits![1, -2], &[]);
        tracer.delete_clause(4, true, &lits![1, -2]);
        tracer.conclude_unsat(Conclusion::ConflictClause, &[5]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(out, "1 -2 0\nd 1 -2 0\n0\n");
    }

    #[test]
    fn binary_framing() {
        let mut tracer = DratTracer::new(vec![], true);
        tracer.add_derived_clause(4, true, &lits![1, -2], &[]);
        tracer.delete_clause(4, true, &lits![1, -2]);

        assert_eq!(tracer.into_inner(), &[b'a', 2, 5, 0, b'd', 2, 5, 0]);
    }

    #[test]
    fn weaken_then_delete_is_emitted_once() {
        let mut tracer = DratTracer::new(vec![], false);
        tracer.weaken_minus(7, &lits![3, 4]);
        tracer.delete_clause(7, false, &lits![3, 4]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(out, "d 3 4 0\n");
    }

    #[test]
    fn strengthen_restores_weakened_clause() {
        let mut tracer = DratTracer::new(vec![], false);
        tracer.weaken_minus(7, &lits![3, 4]);
        tracer.strengthen(7);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(out, "d 3 4 0\n3 4 0\n");
    }
}
