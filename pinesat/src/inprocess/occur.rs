//! Dense occurrence lists for inprocessing.
//!
//! At most one clause indexing is active at a time: either the two-watched-literal scheme used
//! for propagation, or the full occurrence lists used by the occurrence based inprocessing
//! passes. Switching modes reconstructs the newly needed indexing from the clause database.

use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use crate::clause::ClauseRef;
use crate::context::{ClauseAllocP, ClauseDbP, Context, OccurP, WatchlistsP};

/// Occurrence lists over the long clauses.
#[derive(Default)]
pub struct OccurLists {
    occs: Vec<Vec<ClauseRef>>,
    active: bool,
}

impl OccurLists {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.occs.resize(count * 2, vec![]);
    }

    /// Whether occurrence mode is active.
    pub fn active(&self) -> bool {
        self.active
    }

    /// The long clauses containing a literal.
    ///
    /// May contain clauses that were deleted since the lists were built; check the header.
    pub fn occs(&self, lit: Lit) -> &[ClauseRef] {
        &self.occs[lit.code()]
    }

    /// Register a new clause.
    pub fn add_clause(&mut self, cref: ClauseRef, lits: &[Lit]) {
        for &lit in lits {
            self.occs[lit.code()].push(cref);
        }
    }

    /// Remove a clause from the lists of the given literals.
    pub fn remove_clause(&mut self, cref: ClauseRef, lits: &[Lit]) {
        for &lit in lits {
            let list = &mut self.occs[lit.code()];
            if let Some(position) = list.iter().position(|&entry| entry == cref) {
                list.swap_remove(position);
            }
        }
    }

    fn clear(&mut self) {
        for list in self.occs.iter_mut() {
            list.clear();
        }
        self.active = false;
    }
}

/// Build the occurrence lists and disable the watchlists.
pub fn enter_occurrence_mode(
    mut ctx: partial!(Context, mut OccurP, mut WatchlistsP, ClauseAllocP, ClauseDbP),
) {
    if ctx.part(OccurP).active() {
        return;
    }
    ctx.part_mut(WatchlistsP).disable();

    let (occur, ctx) = ctx.split_part_mut(OccurP);
    let alloc = ctx.part(ClauseAllocP);

    for &cref in ctx.part(ClauseDbP).clauses.iter() {
        let clause = alloc.clause(cref);
        if clause.header().deleted() {
            continue;
        }
        occur.add_clause(cref, clause.lits());
    }
    occur.active = true;
}

/// Drop the occurrence lists; the watchlists are rebuilt lazily by the search.
pub fn leave_occurrence_mode(mut ctx: partial!(Context, mut OccurP)) {
    ctx.part_mut(OccurP).clear();
}
