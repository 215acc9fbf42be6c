//! VeriPB proof emission.
//!
//! Clauses are rendered as pseudo-Boolean constraints with unit coefficients. Derived clauses
//! become `rup` steps whose antecedent ids are given as hints. With checked deletions enabled,
//! clauses that took part in a derivation are moved to the core before deletion.

use std::io::Write;

use rustc_hash::FxHashSet;

use pinesat_formula::Lit;

use crate::emit::Emitter;
use crate::{ClauseId, Conclusion, Tracer};

/// Emits a VeriPB proof.
pub struct VeripbTracer<W: Write> {
    emitter: Emitter<W>,
    checked_deletions: bool,
    header_written: bool,
    original_count: u64,
    /// Ids referenced as antecedents, to be core-marked before checked deletion.
    used_ids: FxHashSet<ClauseId>,
}

fn write_pb_clause(target: &mut impl Write, lits: &[Lit]) -> std::io::Result<()> {
    for &lit in lits {
        if lit.is_positive() {
            write!(target, "1 x{} ", lit.index() + 1)?;
        } else {
            write!(target, "1 ~x{} ", lit.index() + 1)?;
        }
    }
    writeln!(target, ">= 1 ;")
}

impl<W: Write> VeripbTracer<W> {
    pub fn new(target: W, checked_deletions: bool) -> VeripbTracer<W> {
        VeripbTracer {
            emitter: Emitter::new(target),
            checked_deletions,
            header_written: false,
            original_count: 0,
            used_ids: FxHashSet::default(),
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(mut self) -> W {
        self.emitter.flush();
        self.emitter.into_inner()
    }

    fn ensure_header(&mut self) {
        if self.header_written {
            return;
        }
        self.header_written = true;
        let original_count = self.original_count;
        self.emitter.with(|target| {
            writeln!(target, "pseudo-Boolean proof version 1.2")?;
            writeln!(target, "f {}", original_count)
        });
    }
}

impl<W: Write> Tracer for VeripbTracer<W> {
    fn add_original_clause(&mut self, _id: ClauseId, _redundant: bool, lits: &[Lit], restored: bool) {
        if !self.header_written {
            self.original_count += 1;
        } else if restored {
            // Restored clauses reenter the derivation via redundance-free RUP.
            self.emitter.with(|target| {
                target.write_all(b"rup ")?;
                write_pb_clause(target, lits)
            });
        }
    }

    fn add_derived_clause(
        &mut self,
        _id: ClauseId,
        _redundant: bool,
        lits: &[Lit],
        antecedents: &[ClauseId],
    ) {
        self.ensure_header();
        if self.checked_deletions {
            for &id in antecedents {
                self.used_ids.insert(id);
            }
        }
        self.emitter.with(|target| {
            target.write_all(b"rup ")?;
            write_pb_clause(target, lits)
        });
    }

    fn delete_clause(&mut self, id: ClauseId, _redundant: bool, lits: &[Lit]) {
        self.ensure_header();
        let core_first = self.checked_deletions && self.used_ids.remove(&id);
        self.emitter.with(|target| {
            if core_first {
                writeln!(target, "core id {}", id)?;
            }
            target.write_all(b"del spec ")?;
            write_pb_clause(target, lits)
        });
    }

    fn weaken_minus(&mut self, id: ClauseId, lits: &[Lit]) {
        self.delete_clause(id, false, lits);
    }

    fn conclude_sat(&mut self, _model: &[Lit]) {
        self.ensure_header();
        self.emitter.with(|target| {
            writeln!(target, "output NONE")?;
            writeln!(target, "conclusion SAT")?;
            writeln!(target, "end pseudo-Boolean proof")
        });
        self.emitter.flush();
    }

    fn conclude_unsat(&mut self, _conclusion: Conclusion, _ids: &[ClauseId]) {
        self.ensure_header();
        self.emitter.with(|target| {
            writeln!(target, "output NONE")?;
            writeln!(target, "conclusion UNSAT")?;
            writeln!(target, "end pseudo-Boolean proof")
        });
        self.emitter.flush();
    }

    fn conclude_unknown(&mut self) {
        self.ensure_header();
        self.emitter.with(|target| {
            writeln!(target, "output NONE")?;
            writeln!(target, "conclusion NONE")?;
            writeln!(target, "end pseudo-Boolean proof")
        });
        self.emitter.flush();
    }

    fn needs_antecedents(&self) -> bool {
        self.checked_deletions
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
    fn header_and_rup_steps() {
        let mut tracer = VeripbTracer::new(vec![], false);
        tracer.add_original_clause(1, false, &lits![1, 2], false);
        tracer.add_original_clause(2, false, &lits![-1], false);
        tracer.add_derived_clause(3, true, &lits![2], &[1, 2]);
        tracer.conclude_unsat(Conclusion::ConflictClause, &[3]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(
            out,
            "pseudo-Boolean proof version 1.2\n\
             f 2\n\
             rup 1 x2 >= 1 ;\n\
             output NONE\n\
             conclusion UNSAT\n\
             end pseudo-Boolean proof\n"
        );
    }

    #[test]
    fn checked_deletion_marks_core() {
        let mut tracer = VeripbTracer::new(vec![], true);
        tracer.add_original_clause(1, false, &lits![1, 2], false);
        tracer.add_derived_clause(2, true, &lits![2], &[1]);
        tracer.delete_clause(1, false, &lits![1, 2]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert!(out.contains("core id 1\n"));
        assert!(out.contains("del spec 1 x1 1 x2 >= 1 ;\n"));
    }
}
