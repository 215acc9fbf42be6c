//! IDRUP and LIDRUP proof emission.
//!
//! Both dialects record the interaction of an incremental solving session: input clauses, solve
//! queries with their assumptions, derived and deleted clauses, and a conclusion section with
//! `s`/`m`/`u` lines after each query. LIDRUP additionally carries clause ids and antecedent
//! chains and coalesces weaken-plus-delete pairs into single `w` records.

use std::io::Write;

use rustc_hash::FxHashSet;

use pinesat_formula::Lit;

use crate::emit::Emitter;
use crate::enc::{write_clause, write_id, write_id_list, write_lit_ascii};
use crate::{ClauseId, Conclusion, Status, Tracer};

/// Emits an IDRUP interaction proof.
pub struct IdrupTracer<W: Write> {
    emitter: Emitter<W>,
    assumptions: Vec<Lit>,
    core: Vec<Lit>,
}

impl<W: Write> IdrupTracer<W> {
    pub fn new(target: W) -> IdrupTracer<W> {
        let mut emitter = Emitter::new(target);
        emitter.with(|target| writeln!(target, "p idrup"));
        IdrupTracer {
            emitter,
            assumptions: vec![],
            core: vec![],
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(mut self) -> W {
        self.emitter.flush();
        self.emitter.into_inner()
    }

    fn line(&mut self, letter: u8, lits: &[Lit]) {
        self.emitter.with(|target| {
            target.write_all(&[letter, b' '])?;
            write_clause(target, lits, false)
        });
    }
}

impl<W: Write> Tracer for IdrupTracer<W> {
    fn add_original_clause(&mut self, _id: ClauseId, _redundant: bool, lits: &[Lit], restored: bool) {
        self.line(if restored { b'r' } else { b'i' }, lits);
    }

    fn add_derived_clause(
        &mut self,
        _id: ClauseId,
        _redundant: bool,
        lits: &[Lit],
        _antecedents: &[ClauseId],
    ) {
        self.line(b'l', lits);
    }

    fn delete_clause(&mut self, _id: ClauseId, _redundant: bool, lits: &[Lit]) {
        self.line(b'd', lits);
    }

    fn weaken_minus(&mut self, _id: ClauseId, lits: &[Lit]) {
        self.line(b'w', lits);
    }

    fn strengthen(&mut self, _id: ClauseId) {}

    fn add_assumption(&mut self, lit: Lit) {
        self.assumptions.push(lit);
    }

    fn add_assumption_clause(&mut self, _id: ClauseId, lits: &[Lit], _antecedents: &[ClauseId]) {
        // The assumption clause is the negated failed core.
        self.core.clear();
        self.core.extend(lits.iter().map(|&lit| !lit));
    }

    fn solve_query(&mut self) {
        let assumptions = std::mem::replace(&mut self.assumptions, vec![]);
        self.line(b'q', &assumptions);
    }

    fn reset_assumptions(&mut self) {
        self.assumptions.clear();
    }

    fn conclude_sat(&mut self, model: &[Lit]) {
        self.emitter.with(|target| writeln!(target, "s SATISFIABLE"));
        self.line(b'm', model);
        self.emitter.flush();
    }

    fn conclude_unsat(&mut self, conclusion: Conclusion, _ids: &[ClauseId]) {
        self.emitter
            .with(|target| writeln!(target, "s UNSATISFIABLE"));
        let core = match conclusion {
            Conclusion::Assumptions => std::mem::replace(&mut self.core, vec![]),
            Conclusion::ConflictClause | Conclusion::Constraint => vec![],
        };
        self.line(b'u', &core);
        self.emitter.flush();
    }

    fn conclude_unknown(&mut self) {
        self.emitter.with(|target| writeln!(target, "s UNKNOWN"));
        self.emitter.flush();
    }

    fn report_status(&mut self, _status: Status, _id: ClauseId) {}

    fn flush(&mut self) {
        self.emitter.flush();
    }
}

/// Emits an LIDRUP interaction proof.
pub struct LidrupTracer<W: Write> {
    emitter: Emitter<W>,
    assumptions: Vec<Lit>,
    core_clause: Option<(ClauseId, Vec<Lit>)>,
    /// Ids already emitted as `w` records; a later delete for them is dropped.
    weakened: FxHashSet<ClauseId>,
}

impl<W: Write> LidrupTracer<W> {
    pub fn new(target: W) -> LidrupTracer<W> {
        let mut emitter = Emitter::new(target);
        emitter.with(|target| writeln!(target, "p lidrup"));
        LidrupTracer {
            emitter,
            assumptions: vec![],
            core_clause: None,
            weakened: FxHashSet::default(),
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(mut self) -> W {
        self.emitter.flush();
        self.emitter.into_inner()
    }

    fn id_line(&mut self, letter: u8, id: ClauseId, lits: &[Lit]) {
        self.emitter.with(|target| {
            target.write_all(&[letter, b' '])?;
            write_id(target, id, false)?;
            write_clause(target, lits, false)
        });
    }
}

impl<W: Write> Tracer for LidrupTracer<W> {
    fn add_original_clause(&mut self, id: ClauseId, _redundant: bool, lits: &[Lit], restored: bool) {
        if restored {
            self.weakened.remove(&id);
            self.id_line(b'r', id, lits);
        } else {
            self.id_line(b'i', id, lits);
        }
    }

    fn add_derived_clause(
        &mut self,
        id: ClauseId,
        _redundant: bool,
        lits: &[Lit],
        antecedents: &[ClauseId],
    ) {
        let emitter = &mut self.emitter;
        emitter.with(|target| {
            target.write_all(b"l ")?;
            write_id(target, id, false)?;
            for &lit in lits {
                write_lit_ascii(target, lit)?;
            }
            target.write_all(b"0 ")?;
            write_id_list(target, antecedents, false)
        });
    }

    fn delete_clause(&mut self, id: ClauseId, _redundant: bool, _lits: &[Lit]) {
        if self.weakened.remove(&id) {
            // Coalesced into the preceding `w` record.
            return;
        }
        self.emitter.with(|target| {
            target.write_all(b"d ")?;
            write_id_list(target, &[id], false)
        });
    }

    fn weaken_minus(&mut self, id: ClauseId, lits: &[Lit]) {
        self.weakened.insert(id);
        self.id_line(b'w', id, lits);
    }

    fn strengthen(&mut self, id: ClauseId) {
        self.weakened.remove(&id);
    }

    fn add_assumption(&mut self, lit: Lit) {
        self.assumptions.push(lit);
    }

    fn add_assumption_clause(&mut self, id: ClauseId, lits: &[Lit], _antecedents: &[ClauseId]) {
        self.core_clause = Some((id, lits.to_vec()));
    }

    fn solve_query(&mut self) {
        let assumptions = std::mem::replace(&mut self.assumptions, vec![]);
        self.emitter.with(|target| {
            target.write_all(b"q ")?;
            write_clause(target, &assumptions, false)
        });
    }

    fn reset_assumptions(&mut self) {
        self.assumptions.clear();
    }

    fn conclude_sat(&mut self, model: &[Lit]) {
        self.emitter.with(|target| writeln!(target, "s SATISFIABLE"));
        self.emitter.with(|target| {
            target.write_all(b"m ")?;
            write_clause(target, model, false)
        });
        self.emitter.flush();
    }

    fn conclude_unsat(&mut self, conclusion: Conclusion, _ids: &[ClauseId]) {
        self.emitter
            .with(|target| writeln!(target, "s UNSATISFIABLE"));
        let core: Vec<Lit> = match conclusion {
            Conclusion::Assumptions => match self.core_clause.take() {
                Some((_, lits)) => lits.iter().map(|&lit| !lit).collect(),
                None => vec![],
            },
            Conclusion::ConflictClause | Conclusion::Constraint => vec![],
        };
        self.emitter.with(|target| {
            target.write_all(b"u ")?;
            write_clause(target, &core, false)
        });
        self.emitter.flush();
    }

    fn conclude_unknown(&mut self) {
        self.emitter.with(|target| writeln!(target, "s UNKNOWN"));
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

    use pinesat_formula::{lit, lits};

    #[test]
    fn idrup_interaction() {
        let mut tracer = IdrupTracer::new(vec![]);
        tracer.add_original_clause(1, false, &lits![1, 2], false);
        tracer.add_assumption(lit!(-1));
        tracer.solve_query();
        tracer.add_derived_clause(2, true, &lits![2], &[]);
        tracer.conclude_sat(&lits![-1, 2]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(
            out,
            "p idrup\ni 1 2 0\nq -1 0\nl 2 0\ns SATISFIABLE\nm -1 2 0\n"
        );
    }

    #[test]
    fn lidrup_coalesces_weaken_delete() {
        let mut tracer = LidrupTracer::new(vec![]);
        tracer.add_original_clause(1, false, &lits![1, 2], false);
        tracer.weaken_minus(1, &lits![1, 2]);
        tracer.delete_clause(1, false, &lits![1, 2]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(out, "p lidrup\ni 1 1 2 0\nw 1 1 2 0\n");
    }

    #[test]
    fn lidrup_failed_core() {
        let mut tracer = LidrupTracer::new(vec![]);
        tracer.add_assumption(lit!(1));
        tracer.add_assumption(lit!(2));
        tracer.solve_query();
        tracer.add_assumption_clause(5, &lits![-1, -2], &[3, 4]);
        tracer.conclude_unsat(Conclusion::Assumptions, &[5]);

        let out = String::from_utf8(tracer.into_inner()).unwrap();
        assert!(out.contains("q 1 2 0\n"));
        assert!(out.ends_with("s UNSATISFIABLE\nu 1 2 0\n"));
    }
}
