//! Propagation of long clauses.
use partial_ref::{partial, PartialRef};

use pinesat_formula::Lit;

use crate::context::{
    AssignmentP, ClauseAllocP, Context, ImplGraphP, StatsP, TrailP, WatchlistsP,
};

use super::assignment::enqueue_assignment;
use super::{Conflict, Reason, Watch};

/// Propagate all literals implied by long clauses watched by the given literal.
///
/// On conflict return the clause propagating the conflicting assignment.
///
/// See [`prop::watch`](crate::prop::watch) for the invariants that this has to uphold. The search
/// for a replacement watch starts at the clause's rotating position cursor, so that repeated
/// propagations of the same clause do not rescan its falsified prefix.
pub fn propagate_long(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut StatsP,
        mut TrailP,
        mut WatchlistsP,
    ),
    lit: Lit,
) -> Result<(), Conflict> {
    let (watchlists, mut ctx) = ctx.split_part_mut(WatchlistsP);
    let (alloc, mut ctx) = ctx.split_part_mut(ClauseAllocP);

    let mut watches = watchlists.take_watched_by(lit);

    let false_lit = !lit;

    let mut write = 0;
    let mut result = Ok(());

    'watches: for read in 0..watches.len() {
        let watch = watches[read];

        ctx.part_mut(StatsP).ticks += 1;

        // If the blocking literal (which is part of the watched clause) is already true, the
        // watched clause is satisfied and we don't even have to look at it.
        if ctx.part(AssignmentP).lit_is_true(watch.blocking) {
            watches[write] = watch;
            write += 1;
            continue;
        }

        let cref = watch.cref;
        let clause = alloc.clause_mut(cref);
        let clause_len = clause.header().len();

        // Ensure the literal we're currently propagating is at index 1. This prepares the
        // literal order for further propagations, as the propagating literal has to be at
        // index 0.
        let lits = clause.lits_mut();
        if lits[0] == false_lit {
            lits.swap(0, 1);
        }
        let first = lits[0];

        let new_watch = Watch {
            cref,
            blocking: first,
        };

        // If the other watched literal (now the first) isn't the blocking literal, check
        // whether that one is true. If so nothing else needs to be done.
        if first != watch.blocking && ctx.part(AssignmentP).lit_is_true(first) {
            watches[write] = new_watch;
            write += 1;
            continue;
        }

        // Try to find a non-false unwatched literal to replace our current literal as the
        // watched literal, starting at the rotating cursor of the previous search.
        let search_start = clause.header().pos().max(2).min(clause_len);
        let ranges = [(search_start, clause_len), (2, search_start)];

        for &(begin, end) in ranges.iter() {
            for pos in begin..end {
                let rest_lit = clause.lits()[pos];
                if !ctx.part(AssignmentP).lit_is_false(rest_lit) {
                    // Found a replacement: reorder the literals and move the watch over.
                    let lits = clause.lits_mut();
                    lits[1] = rest_lit;
                    lits[pos] = false_lit;
                    clause.header_mut().set_pos(pos + 1);

                    debug_assert_ne!(!rest_lit, lit);
                    watchlists.add_watch(!rest_lit, new_watch);
                    continue 'watches;
                }
            }
        }

        // No replacement, so the clause is either propagating or conflicting. Either way the
        // watch is kept.
        watches[write] = new_watch;
        write += 1;

        if ctx.part(AssignmentP).lit_is_false(first) {
            // Keep all unprocessed watches and stop.
            for rest in read + 1..watches.len() {
                watches[write] = watches[rest];
                write += 1;
            }
            result = Err(Conflict::Long(cref));
            break;
        }

        enqueue_assignment(ctx.borrow(), first, Reason::Long(cref));
    }

    watches.truncate(write);
    watchlists.set_watched_by(lit, watches);

    result
}
