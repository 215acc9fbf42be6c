//! Binary clauses and their propagation.
//!
//! Binary clauses are not stored in the clause arena. Instead both literals keep an entry for
//! the clause in a dedicated per-literal store, which doubles as the implication list of the
//! binary implication graph. Propagation over these lists is the fast path and runs before any
//! long clause of the same literal is looked at, since a binary clause can never be repaired by
//! moving a watch.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

use crate::context::{
    AssignmentP, BinaryClausesP, Context, ImplGraphP, StatsP, TrailP,
};

use super::assignment::enqueue_assignment;
use super::{Conflict, Reason};

/// One half of a binary clause.
#[derive(Copy, Clone, Debug)]
pub struct BinaryWatch {
    /// The other literal of the clause.
    pub other: Lit,
    pub id: ClauseId,
    pub redundant: bool,
    /// Derived by hyper binary or ternary resolution.
    pub hyper: bool,
    /// Garbage entries are skipped during propagation and reclaimed by the next flush.
    pub garbage: bool,
}

/// Binary clauses.
#[derive(Default)]
pub struct BinaryClauses {
    by_lit: Vec<Vec<BinaryWatch>>,
    count: usize,
    redundant_count: usize,
}

impl BinaryClauses {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.by_lit.resize(count * 2, vec![]);
    }

    /// Add a binary clause.
    pub fn add_binary_clause(&mut self, lits: [Lit; 2], id: ClauseId, redundant: bool, hyper: bool) {
        for i in 0..2 {
            let watch = BinaryWatch {
                other: lits[i ^ 1],
                id,
                redundant,
                hyper,
                garbage: false,
            };
            self.by_lit[(!lits[i]).code()].push(watch);
        }
        self.count += 1;
        if redundant {
            self.redundant_count += 1;
        }
    }

    /// Implications of a given literal.
    ///
    /// These are the entries for all binary clauses containing the negation of the literal; they
    /// may include garbage entries.
    pub fn implied(&self, lit: Lit) -> &[BinaryWatch] {
        &self.by_lit[lit.code()]
    }

    /// Entries for all binary clauses containing the literal itself.
    pub fn containing(&self, lit: Lit) -> &[BinaryWatch] {
        &self.by_lit[(!lit).code()]
    }

    /// Number of live binary clauses containing the literal.
    pub fn occurrence_count(&self, lit: Lit) -> usize {
        self.containing(lit)
            .iter()
            .filter(|watch| !watch.garbage)
            .count()
    }

    pub fn implied_mut(&mut self, lit: Lit) -> &mut Vec<BinaryWatch> {
        &mut self.by_lit[lit.code()]
    }

    /// Mark a binary clause as garbage on both sides.
    ///
    /// Returns the id of the clause if it was found live.
    pub fn mark_garbage(&mut self, lits: [Lit; 2]) -> Option<ClauseId> {
        let mut id = None;
        for i in 0..2 {
            for watch in self.by_lit[(!lits[i]).code()].iter_mut() {
                if watch.other == lits[i ^ 1] && !watch.garbage {
                    watch.garbage = true;
                    if id.is_none() {
                        id = Some(watch.id);
                        self.count -= 1;
                        if watch.redundant {
                            self.redundant_count -= 1;
                        }
                    }
                    break;
                }
            }
        }
        id
    }

    /// Adjust the clause counts for an entry removed outside of [`mark_garbage`].
    pub fn note_removed(&mut self, redundant: bool) {
        self.count -= 1;
        if redundant {
            self.redundant_count -= 1;
        }
    }

    /// Physically remove all garbage entries.
    ///
    /// The caller is responsible for having emitted the matching proof deletions when the
    /// entries were marked.
    pub fn flush_garbage(&mut self) {
        for list in self.by_lit.iter_mut() {
            list.retain(|watch| !watch.garbage);
        }
    }


    /// Number of binary clauses.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of redundant binary clauses.
    pub fn redundant_count(&self) -> usize {
        self.redundant_count
    }
}

/// Propagate all literals implied by the given literal via binary clauses.
///
/// On conflict return the binary clause propagating the conflicting assignment.
pub fn propagate_binary(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ImplGraphP,
        mut StatsP,
        mut TrailP,
        BinaryClausesP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    let (binary_clauses, mut ctx) = ctx.split_part(BinaryClausesP);

    let implied = binary_clauses.implied(lit);
    ctx.part_mut(StatsP).ticks += implied.len() as u64;

    for watch in implied {
        if watch.garbage {
            continue;
        }
        let implied_lit = watch.other;
        let assignment = ctx.part(AssignmentP);

        if assignment.lit_is_false(implied_lit) {
            return Err(Conflict::Binary([implied_lit, !lit], watch.id));
        } else if !assignment.lit_is_true(implied_lit) {
            enqueue_assignment(
                ctx.borrow(),
                implied_lit,
                Reason::Binary {
                    other: [!lit],
                    id: watch.id,
                },
            );
        }
    }

    Ok(())
}
