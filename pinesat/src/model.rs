//! Model reconstruction and polarity flipping.
//!
//! After a satisfiable search the internal assignment only covers the live variables. The
//! extension stack re-derives values for everything that inprocessing removed; the result is
//! cached per external variable so that `val` keeps answering after the search state moved on.

use partial_ref::{partial, PartialRef};

use pinesat_formula::{Lit, Var};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, ClauseDbP, Context, ExtendP, ImplGraphP, PhasesP,
    VariablesP,
};
use crate::varmap::VarStatus;

/// Fill the external solution cache from the full internal assignment.
///
/// Returns the model as external literals, for proof emission and API queries.
pub fn reconstruct_model(
    mut ctx: partial!(
        Context,
        mut VariablesP,
        AssignmentP,
        ExtendP,
    ),
) -> Vec<Lit> {
    let external_count = ctx.part(VariablesP).external_count();

    let mut values: Vec<Option<bool>> = vec![None; external_count];

    {
        let variables = ctx.part(VariablesP);
        let assignment = ctx.part(AssignmentP);
        for index in 0..external_count {
            let external = Var::from_index(index);
            // Substituted variables answer through their representative.
            let repr = variables.equivalences.find_const(external.positive());
            if let Some(internal) = variables.internal_from_external(repr.var()) {
                if let Some(value) = assignment.var_value(internal) {
                    values[index] = Some(value == repr.is_positive());
                }
            }
        }
    }

    // Extension stack walk assigns everything that elimination removed.
    ctx.part(ExtendP).extend_model(&mut values);

    let mut model = vec![];
    for index in 0..values.len().min(external_count) {
        let external = Var::from_index(index);
        let value = values[index];
        ctx.part_mut(VariablesP).set_solution(external, value);
        if let Some(value) = value {
            model.push(external.lit(value));
        }
    }
    model
}

/// Whether the polarity of an external literal can be flipped in the current model.
///
/// A variable that was never added to a clause is not flippable. Neither is a variable whose
/// value was produced by the extension stack, since its clauses are no longer represented.
pub fn flippable(
    mut ctx: partial!(
        Context,
        AssignmentP,
        BinaryClausesP,
        ClauseAllocP,
        ClauseDbP,
        ImplGraphP,
        VariablesP,
    ),
    external: Lit,
) -> bool {
    let variables = ctx.part(VariablesP);

    let internal = match variables.internal_from_external_lit(external) {
        Some(internal) => internal,
        None => return false,
    };
    if variables.status(internal.var()) != VarStatus::Active {
        return false;
    }

    let assignment = ctx.part(AssignmentP);
    let value = match assignment.var_value(internal.var()) {
        Some(value) => value,
        None => return false,
    };

    // Every clause satisfied through this variable must have a second satisfied literal.
    let true_lit = internal.var().lit(value);

    {
        let alloc = ctx.part(ClauseAllocP);
        for &cref in ctx.part(ClauseDbP).clauses.iter() {
            let clause = alloc.clause(cref);
            let header = clause.header();
            if header.deleted() || header.redundant() {
                continue;
            }
            if !clause.lits().contains(&true_lit) {
                continue;
            }
            let supported = clause
                .lits()
                .iter()
                .any(|&lit| lit != true_lit && assignment.lit_is_true(lit));
            if !supported {
                return false;
            }
        }
    }

    for watch in ctx.part(BinaryClausesP).containing(true_lit) {
        if watch.garbage || watch.redundant {
            continue;
        }
        if !assignment.lit_is_true(watch.other) {
            return false;
        }
    }

    true
}

/// Flip the polarity of an external literal in the current model.
///
/// Returns false when the literal is not flippable. The internal assignment, the solution
/// cache and the saved phase are all updated.
pub fn flip(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut PhasesP,
        mut VariablesP,
        BinaryClausesP,
        ClauseAllocP,
        ClauseDbP,
        ImplGraphP,
    ),
    external: Lit,
) -> bool {
    if !flippable(ctx.borrow(), external) {
        return false;
    }

    let variables = ctx.part(VariablesP);
    let internal = match variables.internal_from_external_lit(external) {
        Some(internal) => internal,
        None => return false,
    };

    let old_value = match ctx.part(AssignmentP).var_value(internal.var()) {
        Some(value) => value,
        None => return false,
    };
    let new_value = !old_value;

    ctx.part_mut(AssignmentP)
        .set_var(internal.var(), Some(new_value));
    ctx.part_mut(PhasesP)
        .set_saved(internal.var(), new_value);

    // The mapping is variable to variable, so the external value equals the internal one.
    ctx.part_mut(VariablesP)
        .set_solution(external.var(), Some(new_value));

    true
}
