//! Learns a new clause by analyzing a conflict.
use std::mem::swap;

use partial_ref::{partial, split_borrow, PartialRef};

use pinesat_formula::{Lit, Var};

use pinesat_proof::ClauseId;

use crate::clause::ClauseRef;
use crate::context::{
    AnalyzeConflictP, AssignmentP, ClauseAllocP, ConfigP, Context, EvsidsP, ImplGraphP, ProofP,
    StatsP, TrailP, VmtfP,
};
use crate::decision::bump_var;
use crate::prop::{Conflict, Reason};

use vec_mut_scan::VecMutScan;

/// Sort key of an antecedent id.
///
/// Root level units come first ordered by id, then reasons by trail depth, the conflict last.
/// Listing the antecedents in this order makes the learned clause checkable by plain unit
/// propagation without search.
type ChainKey = (u32, ClauseId);

const CONFLICT_DEPTH: u32 = u32::max_value();

/// Temporaries for conflict analysis
#[derive(Default)]
pub struct AnalyzeConflict {
    /// This is the learned clause after analysis finishes.
    clause: Vec<Lit>,
    /// Number of literals in the current clause at the current level.
    current_level_count: usize,
    /// Variables in the current clause.
    var_flags: Vec<bool>,
    /// Entries to clean in `var_flags`.
    to_clean: Vec<Var>,
    /// Variables known not to be removable by minimization.
    poison: Vec<bool>,
    /// Entries to clean in `poison`.
    poison_clean: Vec<Var>,
    /// Clauses to bump and candidates for on-the-fly subsumption.
    involved: Vec<ClauseRef>,
    /// Antecedent ids paired with their sort key.
    unordered_ids: Vec<(ChainKey, ClauseId)>,
    /// The ordered antecedent chain of the learned clause.
    chain: Vec<ClauseId>,
    /// Stack for recursive minimization.
    stack: Vec<Lit>,
    /// Glue of the learned clause.
    glue: usize,
    /// Stamps for counting distinct decision levels.
    level_stamps: Vec<u64>,
    level_stamp: u64,
}

impl AnalyzeConflict {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.var_flags.resize(count, false);
        self.poison.resize(count, false);
        self.level_stamps.resize(count + 1, 0);
    }

    /// The learned clause.
    pub fn clause(&self) -> &[Lit] {
        &self.clause
    }

    /// Long clauses involved in the conflict.
    pub fn involved(&self) -> &[ClauseRef] {
        &self.involved
    }

    /// The glue (LBD) of the learned clause.
    pub fn glue(&self) -> usize {
        self.glue
    }

    /// Ids of the clauses involved in the derivation of the learned clause.
    ///
    /// In propagation order, so that the learned clause is checkable without search.
    pub fn chain(&self) -> &[ClauseId] {
        &self.chain
    }

    fn push_id(&mut self, key: ChainKey, id: ClauseId) {
        self.unordered_ids.push((key, id));
    }
}

/// Learns a new clause by analyzing a conflict.
///
/// Returns the lowest decision level that makes the learned clause asserting. The conflict has
/// to contain at least one literal of the current decision level.
pub fn analyze_conflict(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut EvsidsP,
        mut StatsP,
        mut VmtfP,
        AssignmentP,
        ClauseAllocP,
        ConfigP,
        ImplGraphP,
        ProofP,
        TrailP,
    ),
    conflict: Conflict,
) -> usize {
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);

    let needs_chain = ctx.part(ProofP).needs_antecedents();

    {
        let analyze = ctx.part_mut(AnalyzeConflictP);

        analyze.clause.clear();
        analyze.involved.clear();
        analyze.chain.clear();
        analyze.unordered_ids.clear();
        analyze.current_level_count = 0;
        analyze.glue = 0;
    }

    // We start with all the literals of the conflicted clause
    let conflict_lits = conflict.lits(&lit_ctx);

    if needs_chain {
        let id = conflict.id(&lit_ctx);
        ctx.part_mut(AnalyzeConflictP)
            .push_id((CONFLICT_DEPTH, id), id);
    }

    if ctx.part(TrailP).current_level() == 0 {
        // Conflict with no decisions, generate the empty clause
        for &lit in conflict_lits {
            record_unit_antecedent(ctx.borrow(), lit, needs_chain);
        }
        finish_chain(ctx.borrow(), needs_chain);
        return 0;
    }

    for &lit in conflict_lits {
        add_literal(ctx.borrow(), lit, needs_chain);
    }

    if let Conflict::Long(cref) = conflict {
        ctx.part_mut(AnalyzeConflictP).involved.push(cref);
    }

    // To get rid of all but one literal of the current level, we resolve the clause with the
    // reason for those literals. The correct order for this is reverse chronological.

    split_borrow!(ctx_trail = &(TrailP) ctx);

    for &lit in ctx_trail.part(TrailP).trail().iter().rev() {
        let analyze = ctx.part_mut(AnalyzeConflictP);
        let lit_present = &mut analyze.var_flags[lit.index()];
        // Is the lit present in the current clause?
        if *lit_present {
            *lit_present = false;
            analyze.current_level_count -= 1;
            if analyze.current_level_count == 0 {
                // lit is the last literal of the current level present in the current clause,
                // therefore the resulting clause will assert !lit so we put it in position 0
                analyze.clause.push(!lit);
                let end = analyze.clause.len() - 1;
                analyze.clause.swap(0, end);

                break;
            } else {
                // We removed the literal and now add its reason.
                let (graph, mut ctx) = ctx.split_part(ImplGraphP);

                let reason = graph.reason(lit.var());

                debug_assert!(
                    !matches!(reason, Reason::External),
                    "external reasons are materialized before analysis"
                );

                let lits = reason.lits(&lit_ctx);

                if needs_chain {
                    if let Some(id) = reason.id(&lit_ctx) {
                        let depth = graph.depth(lit.var()) as u32;
                        ctx.part_mut(AnalyzeConflictP).push_id((depth + 1, id), id);
                    }
                }

                for &lit in lits {
                    add_literal(ctx.borrow(), lit, needs_chain);
                }

                if let &Reason::Long(cref) = reason {
                    ctx.part_mut(AnalyzeConflictP).involved.push(cref);
                }
            }
        }
    }

    // This needs var_flags set and keeps some var_flags set.
    if ctx.part(ConfigP).minimize != 0 {
        minimize_clause(ctx.borrow(), needs_chain);
    }

    if ctx.part(ConfigP).shrink != 0 {
        shrink_clause(ctx.borrow(), needs_chain);
    }

    compute_glue(ctx.borrow());

    finish_chain(ctx.borrow(), needs_chain);

    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);

    for var in analyze.to_clean.drain(..) {
        analyze.var_flags[var.index()] = false;
    }
    for var in analyze.poison_clean.drain(..) {
        analyze.poison[var.index()] = false;
    }

    // We find the highest level literal besides the asserted literal and move it into position 1.
    // This is important to ensure the watchlist constraints are not violated on backtracking.
    let mut backtrack_to = 0;

    if analyze.clause.len() > 1 {
        let (prefix, rest) = analyze.clause.split_at_mut(2);
        let lit_1 = &mut prefix[1];
        backtrack_to = ctx.part(ImplGraphP).level(lit_1.var());
        for lit in rest.iter_mut() {
            let lit_level = ctx.part(ImplGraphP).level(lit.var());
            if lit_level > backtrack_to {
                backtrack_to = lit_level;
                swap(lit_1, lit);
            }
        }
    }

    ctx.part_mut(EvsidsP).decay();

    backtrack_to
}

/// Add a literal to the current clause.
fn add_literal(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut EvsidsP,
        mut VmtfP,
        AssignmentP,
        ImplGraphP,
        ProofP,
        TrailP
    ),
    lit: Lit,
    needs_chain: bool,
) {
    let lit_level = ctx.part(ImplGraphP).level(lit.var());

    if lit_level == 0 {
        record_unit_antecedent(ctx.borrow(), lit, needs_chain);
        return;
    }

    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    // No need to add literals that are already present
    if !analyze.var_flags[lit.index()] {
        bump_var(ctx.borrow(), lit.var());

        analyze.var_flags[lit.index()] = true;
        analyze.to_clean.push(lit.var());
        if lit_level == ctx.part(TrailP).current_level() {
            analyze.current_level_count += 1;
        } else {
            analyze.clause.push(lit);
        }
    }
}

/// Record the unit clause justifying a root level literal in the antecedent chain.
fn record_unit_antecedent(
    mut ctx: partial!(Context, mut AnalyzeConflictP, ImplGraphP, ProofP),
    lit: Lit,
    needs_chain: bool,
) {
    if !needs_chain {
        return;
    }
    if let Some(id) = ctx.part(ProofP).unit_id(lit.var()) {
        ctx.part_mut(AnalyzeConflictP).push_id((0, id), id);
    } else {
        let reason = *ctx.part(ImplGraphP).reason(lit.var());
        if let Reason::Unit { id } = reason {
            ctx.part_mut(AnalyzeConflictP).push_id((0, id), id);
        }
    }
}

/// Sort, deduplicate and store the collected antecedent ids.
fn finish_chain(mut ctx: partial!(Context, mut AnalyzeConflictP), needs_chain: bool) {
    let analyze = ctx.part_mut(AnalyzeConflictP);
    if !needs_chain {
        return;
    }
    analyze.unordered_ids.sort_unstable_by_key(|&(key, _)| key);
    analyze.unordered_ids.dedup();
    analyze.chain.clear();
    analyze
        .chain
        .extend(analyze.unordered_ids.iter().map(|&(_, id)| id));
}

/// Count the distinct decision levels of the learned clause.
fn compute_glue(mut ctx: partial!(Context, mut AnalyzeConflictP, ImplGraphP)) {
    let (analyze, ctx) = ctx.split_part_mut(AnalyzeConflictP);
    let impl_graph = ctx.part(ImplGraphP);

    analyze.level_stamp += 1;
    let stamp = analyze.level_stamp;

    let mut glue = 0;
    for &lit in analyze.clause.iter() {
        let level = impl_graph.level(lit.var());
        if analyze.level_stamps[level] != stamp {
            analyze.level_stamps[level] = stamp;
            glue += 1;
        }
    }
    analyze.glue = glue;
}

/// A Bloom filter of levels.
#[derive(Default)]
struct LevelAbstraction {
    bits: u64,
}

impl LevelAbstraction {
    /// Add a level to the Bloom filter.
    pub fn add(&mut self, level: usize) {
        self.bits |= 1 << (level % 64)
    }

    /// Test whether a level could be in the Bloom filter.
    pub fn test(&self, level: usize) -> bool {
        self.bits & (1 << (level % 64)) != 0
    }
}

/// Performs recursive clause minimization.
///
/// **Note:** Requires AnalyzeConflict's var_flags to be set for exactly the variables of the
/// unminimized clause. This also sets some more var_flags, but lists them in to_clean.
///
/// This routine tries to remove some redundant literals of the learned clause, i.e. literals
/// that are already implied by other literals of the clause. This is done by a DFS in the
/// implication graph (following edges in reverse) for each candidate literal. The search doesn't
/// expand literals already known to be implied by literals of the clause. When a decision
/// literal that is not in the clause is found the literal is not redundant.
///
/// The var_flags array doubles as the cache of positive results (removable), the poison array
/// caches negative results. A search is also aborted when it reaches a decision level that is
/// not present in the clause at all, checked approximately through a Bloom filter.
fn minimize_clause(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut StatsP,
        ClauseAllocP,
        ConfigP,
        ImplGraphP,
        ProofP,
        TrailP,
    ),
    needs_chain: bool,
) {
    let max_depth = ctx.part(ConfigP).minimizedepth as usize;
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let impl_graph = ctx.part(ImplGraphP);

    let mut involved_levels = LevelAbstraction::default();

    for &lit in analyze.clause.iter() {
        involved_levels.add(impl_graph.level(lit.var()));
    }

    let mut removed = 0;

    let mut scan = VecMutScan::new(&mut analyze.clause);

    // we always keep the first literal
    scan.next();

    'next_lit: while let Some(lit) = scan.next() {
        let reason = impl_graph.reason(lit.var());
        if reason.is_decision() || analyze.poison[lit.index()] {
            continue;
        }

        // Start the DFS
        analyze.stack.clear();
        analyze.stack.push(!*lit);

        // Used to remember which var_flags are set during this DFS
        let top = analyze.to_clean.len();

        // Used to remember which antecedents were added during the DFS, so we can remove them in
        // case the literal is not redundant.
        let ids_top = analyze.unordered_ids.len();

        let mut steps = 0;

        while let Some(open) = analyze.stack.pop() {
            let reason = impl_graph.reason(open.var());
            let lits = reason.lits(&lit_ctx);

            steps += 1;

            if needs_chain {
                if let Some(id) = reason.id(&lit_ctx) {
                    let depth = impl_graph.depth(open.var()) as u32;
                    analyze.unordered_ids.push(((depth + 1, id), id));
                }
            }

            for &reason_lit in lits {
                let reason_level = impl_graph.level(reason_lit.var());

                if reason_level == 0 {
                    if needs_chain {
                        if let Some(id) = ctx.part(ProofP).unit_id(reason_lit.var()) {
                            analyze.unordered_ids.push(((0, id), id));
                        }
                    }
                    continue;
                }

                if !analyze.var_flags[reason_lit.index()] {
                    // We haven't established reason_lit to be redundant and haven't visited it
                    // yet.

                    let abort = steps > max_depth
                        || analyze.poison[reason_lit.index()]
                        || impl_graph.reason(reason_lit.var()).is_decision()
                        || !involved_levels.test(reason_level);

                    if abort {
                        // reason_lit is a decision not in the clause, was already found
                        // irremovable, or sits in a decision level known not to be in the
                        // clause. Poison everything visited during _this_ DFS.
                        for var in analyze.to_clean.drain(top..) {
                            analyze.var_flags[var.index()] = false;
                            if !analyze.poison[var.index()] {
                                analyze.poison[var.index()] = true;
                                analyze.poison_clean.push(var);
                            }
                        }
                        if !analyze.poison[lit.index()] {
                            analyze.poison[lit.index()] = true;
                            analyze.poison_clean.push(lit.var());
                        }
                        analyze.unordered_ids.truncate(ids_top);
                        continue 'next_lit;
                    } else {
                        analyze.var_flags[reason_lit.index()] = true;
                        analyze.to_clean.push(reason_lit.var());
                        analyze.stack.push(!reason_lit);
                    }
                }
            }
        }

        removed += 1;
        lit.remove();
    }

    drop(scan);

    ctx.part_mut(StatsP).minimized_lits += removed;
}

/// Trail-segment shrinking of the minimized clause.
///
/// For every decision level with more than one literal in the clause, try to replace the whole
/// block by the negation of a single dominating trail literal of that level. Walking the level's
/// trail segment backwards, the block's literals are resolved with their reasons; the walk fails
/// when a reason pulls in a literal of another level that is not already part of the clause.
fn shrink_clause(
    mut ctx: partial!(
        Context,
        mut AnalyzeConflictP,
        mut StatsP,
        ClauseAllocP,
        ImplGraphP,
        ProofP,
        TrailP,
    ),
    needs_chain: bool,
) {
    let (analyze, mut ctx) = ctx.split_part_mut(AnalyzeConflictP);
    split_borrow!(lit_ctx = &(ClauseAllocP) ctx);
    let impl_graph = ctx.part(ImplGraphP);
    let trail = ctx.part(TrailP);

    if analyze.clause.len() < 3 {
        return;
    }

    // Process levels one at a time; collect them first.
    let mut levels: Vec<usize> = analyze.clause[1..]
        .iter()
        .map(|lit| impl_graph.level(lit.var()))
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let mut shrunken_total = 0u64;

    for &level in levels.iter() {
        if level == 0 {
            continue;
        }
        let block: Vec<Lit> = analyze.clause[1..]
            .iter()
            .cloned()
            .filter(|lit| impl_graph.level(lit.var()) == level)
            .collect();
        if block.len() < 2 {
            continue;
        }

        let frame_start = match trail.control().get(level) {
            Some(frame) => frame.trail_offset,
            None => continue,
        };

        // Open literals of the walk are marked in var_flags on top of the clause marks; record
        // the additions so they can be undone.
        let flags_top = analyze.to_clean.len();
        let ids_top = analyze.unordered_ids.len();

        let mut open = block.len();
        let mut dominator = None;
        let mut failed = false;

        let block_depth_max = block
            .iter()
            .map(|lit| impl_graph.depth(lit.var()))
            .max()
            .unwrap_or(0);

        let mut depth = block_depth_max;

        while open > 0 {
            if depth < frame_start {
                failed = true;
                break;
            }
            let trail_lit = trail.trail()[depth];
            let falsified = !trail_lit;

            if analyze.var_flags[trail_lit.index()] || block.contains(&falsified) {
                // This trail literal is open.
                if open == 1 {
                    dominator = Some(trail_lit);
                    break;
                }
                open -= 1;

                let reason = impl_graph.reason(trail_lit.var());
                if reason.is_decision() {
                    failed = true;
                    break;
                }
                if needs_chain {
                    if let Some(id) = reason.id(&lit_ctx) {
                        let rdepth = impl_graph.depth(trail_lit.var()) as u32;
                        analyze.unordered_ids.push(((rdepth + 1, id), id));
                    }
                }
                for &reason_lit in reason.lits(&lit_ctx) {
                    let reason_level = impl_graph.level(reason_lit.var());
                    if reason_level == 0 {
                        if needs_chain {
                            if let Some(id) = ctx.part(ProofP).unit_id(reason_lit.var()) {
                                analyze.unordered_ids.push(((0, id), id));
                            }
                        }
                    } else if reason_level == level {
                        if !analyze.var_flags[reason_lit.index()] {
                            analyze.var_flags[reason_lit.index()] = true;
                            analyze.to_clean.push(reason_lit.var());
                            open += 1;
                        }
                    } else if !analyze.var_flags[reason_lit.index()] {
                        // A literal of another level that is not part of the clause.
                        failed = true;
                        break;
                    }
                }
                if failed {
                    break;
                }
            }
            if depth == 0 {
                failed = true;
                break;
            }
            depth -= 1;
        }

        let dominator = match (failed, dominator) {
            (false, Some(dominator)) if !block.contains(&!dominator) => dominator,
            _ => {
                // Undo the walk's marks and antecedents.
                for var in analyze.to_clean.drain(flags_top..) {
                    analyze.var_flags[var.index()] = false;
                }
                analyze.unordered_ids.truncate(ids_top);
                continue;
            }
        };

        // Replace the block by the dominator's negation.
        let shrunken = block.len() - 1;
        let first = analyze.clause[0];
        analyze
            .clause
            .retain(|&lit| lit == first || impl_graph.level(lit.var()) != level);
        analyze.clause.push(!dominator);
        if !analyze.var_flags[dominator.index()] {
            analyze.var_flags[dominator.index()] = true;
            analyze.to_clean.push(dominator.var());
        }

        shrunken_total += shrunken as u64;
    }

    ctx.part_mut(StatsP).shrunken_lits += shrunken_total;
}
