//! Local search over the irredundant clauses.
//!
//! A ProbSAT style random walk starting from the saved phases. The walk never changes the
//! solver state; its only outputs are the min phases (the assignment with the fewest unsatisfied
//! clauses seen) and possibly an improved best-phase record. Rephasing picks these up.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, ConfigP, Context, PhasesP, ScheduleP,
    StatsP, VariablesP,
};
use crate::schedule::effort_limit;

/// SplitMix style pseudo random number generator.
///
/// Small, fast and good enough for picking walk moves.
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Rng {
        Rng {
            state: seed.wrapping_add(0x9e3779b97f4a7c15),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    /// A uniform number below the given bound.
    pub fn below(&mut self, bound: usize) -> usize {
        (self.next_u64() % bound.max(1) as u64) as usize
    }

    pub fn bool(&mut self) -> bool {
        self.next_u64() & 1 != 0
    }
}

/// Run the local search within its tick budget.
///
/// Returns the number of clauses left unsatisfied by the best assignment found.
pub fn walk(
    mut ctx: partial!(
        Context,
        mut PhasesP,
        mut ScheduleP,
        mut StatsP,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        ClauseDbP,
        ConfigP,
        VariablesP,
    ),
) -> Option<usize> {
    let (enabled, effort, seed) = {
        let config = ctx.part(ConfigP);
        (config.walk != 0, config.walkeffort, config.seed as u64)
    };
    if !enabled {
        return None;
    }

    let ticks = ctx.part(StatsP).ticks;
    let last = ctx.part(ScheduleP).pass_ticks.walk;
    let budget = effort_limit(ticks, last, effort);
    ctx.part_mut(ScheduleP).pass_ticks.walk = ticks;

    let mut rng = Rng::new(seed ^ ctx.part(StatsP).conflicts);

    // Materialize the irredundant formula over unassigned variables; root fixed literals are
    // substituted away.
    let assignment = ctx.part(AssignmentP);
    let var_count = assignment.assignment().len();

    let mut clauses: Vec<Vec<Lit>> = vec![];

    for code in 0..var_count * 2 {
        let lit = Lit::from_code(code);
        for watch in ctx.part(BinaryClausesP).implied(lit) {
            let this = !lit;
            if watch.garbage || watch.redundant || this.code() > watch.other.code() {
                continue;
            }
            collect_clause(assignment, &[this, watch.other], &mut clauses);
        }
    }

    {
        let alloc = ctx.part(ClauseAllocP);
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            let header = alloc.header(cref);
            if header.deleted() || header.redundant() {
                continue;
            }
            collect_clause(assignment, alloc.clause(cref).lits(), &mut clauses);
        }
    }

    if clauses.is_empty() {
        return Some(0);
    }

    // Occurrence lists and the starting assignment from the saved phases.
    let mut occs: Vec<Vec<usize>> = vec![vec![]; var_count * 2];
    for (index, clause) in clauses.iter().enumerate() {
        for &lit in clause.iter() {
            occs[lit.code()].push(index);
        }
    }

    let mut values: Vec<bool> = (0..var_count)
        .map(|index| ctx.part(PhasesP).saved(Var::from_index(index)))
        .collect();

    let lit_is_true = |values: &[bool], lit: Lit| values[lit.index()] == lit.is_positive();

    let mut unsat: Vec<usize> = vec![];
    let mut unsat_pos: Vec<Option<usize>> = vec![None; clauses.len()];
    for (index, clause) in clauses.iter().enumerate() {
        if !clause.iter().any(|&lit| lit_is_true(&values, lit)) {
            unsat_pos[index] = Some(unsat.len());
            unsat.push(index);
        }
    }

    let mut best_unsat = unsat.len();
    let mut spent = 0u64;

    while !unsat.is_empty() && spent < budget {
        let clause_index = unsat[rng.below(unsat.len())];

        // Pick the flip variable: mostly the one with the fewest broken clauses, sometimes at
        // random.
        let clause = &clauses[clause_index];
        let flip_lit = if rng.below(100) < 15 {
            clause[rng.below(clause.len())]
        } else {
            let mut best_lit = clause[0];
            let mut best_breaks = usize::max_value();
            for &lit in clause.iter() {
                let mut breaks = 0;
                for &other_index in occs[(!lit).code()].iter() {
                    spent += 1;
                    let other = &clauses[other_index];
                    let satisfied_elsewhere = other.iter().any(|&l| {
                        l != !lit && lit_is_true(&values, l)
                    });
                    if !satisfied_elsewhere && lit_is_true(&values, !lit) {
                        breaks += 1;
                    }
                }
                if breaks < best_breaks {
                    best_breaks = breaks;
                    best_lit = lit;
                }
            }
            best_lit
        };

        // Flip it and update the unsatisfied set.
        let var = flip_lit.var();
        values[var.index()] = !values[var.index()];
        spent += 1;

        for &index in occs[var.positive().code()]
            .iter()
            .chain(occs[var.negative().code()].iter())
        {
            spent += 1;
            let satisfied = clauses[index].iter().any(|&lit| lit_is_true(&values, lit));
            match (satisfied, unsat_pos[index]) {
                (true, Some(pos)) => {
                    let last = unsat.len() - 1;
                    unsat.swap(pos, last);
                    unsat.pop();
                    if pos < unsat.len() {
                        let moved = unsat[pos];
                        unsat_pos[moved] = Some(pos);
                    }
                    unsat_pos[index] = None;
                }
                (false, None) => {
                    unsat_pos[index] = Some(unsat.len());
                    unsat.push(index);
                }
                _ => (),
            }
        }

        if unsat.len() < best_unsat {
            best_unsat = unsat.len();
            let phases = ctx.part_mut(PhasesP);
            for index in 0..var_count {
                phases.set_min(Var::from_index(index), values[index]);
            }
        }
    }

    ctx.part_mut(StatsP).ticks += spent;

    let phases = ctx.part_mut(PhasesP);
    let improved = match phases.min_unsat {
        Some(previous) => best_unsat < previous,
        None => true,
    };
    if improved {
        phases.min_unsat = Some(best_unsat);
        ctx.part_mut(StatsP).walk_improved += 1;
    }

    Some(best_unsat)
}

fn collect_clause(
    assignment: &crate::prop::Assignment,
    lits: &[Lit],
    clauses: &mut Vec<Vec<Lit>>,
) {
    let mut reduced = vec![];
    for &lit in lits {
        match assignment.lit_value(lit) {
            Some(true) => return,
            Some(false) => (),
            None => reduced.push(lit),
        }
    }
    if !reduced.is_empty() {
        clauses.push(reduced);
    }
}
