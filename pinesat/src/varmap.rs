//! External to internal variable mapping and variable metadata.
//!
//! The user talks about external variables, the engine about internal ones. Initially the
//! mapping is the identity extended on demand, but inprocessing may eliminate, substitute or
//! compact internal variables, after which the two sides diverge. Values of external variables
//! that no longer have an internal counterpart are answered from a solution cache filled during
//! model reconstruction.

use pinesat_formula::lit::LitIdx;
use pinesat_formula::{Lit, Var};

const NO_VAR: LitIdx = LitIdx::max_value();

/// A mapping from variables to variables.
#[derive(Default)]
pub struct VarMap {
    mapping: Vec<LitIdx>,
}

impl VarMap {
    /// Look up a variable in the mapping
    pub fn get(&self, from: Var) -> Option<Var> {
        match self.mapping.get(from.index()).cloned() {
            Some(index) if index == NO_VAR => None,
            Some(index) => Some(Var::from_index(index as usize)),
            None => None,
        }
    }

    /// Insert a new mapping.
    ///
    /// Note that the parameters are reversed from the usual order, to match the naming
    /// convention used for maps.
    ///
    /// This has the precondition that `from` is not mapped.
    pub fn insert(&mut self, into: Var, from: Var) {
        self.ensure_mapping(from);
        debug_assert_eq!(self.mapping[from.index()], NO_VAR);
        self.mapping[from.index()] = into.index() as LitIdx
    }

    /// Remove a mapping.
    ///
    /// Does nothing if `from` is not mapped.
    pub fn remove(&mut self, from: Var) {
        if from.index() < self.mapping.len() {
            self.mapping[from.index()] = NO_VAR;
        }
    }

    /// One past the largest mapped index.
    pub fn watermark(&self) -> usize {
        self.mapping.len()
    }

    fn ensure_mapping(&mut self, from: Var) {
        if self.mapping.len() <= from.index() {
            self.mapping.resize(from.index() + 1, NO_VAR);
        }
    }
}

/// Union-find over literals used for equivalent literal substitution.
///
/// Two literals in one class are equal in every model of the remaining formula; the negations
/// are kept consistent, i.e. merging `a` and `b` also merges `¬a` and `¬b`.
#[derive(Default)]
pub struct LitUnionFind {
    parent: Vec<LitIdx>,
}

impl LitUnionFind {
    pub fn set_var_count(&mut self, count: usize) {
        let old = self.parent.len();
        self.parent.reserve(count * 2);
        for code in old..count * 2 {
            self.parent.push(code as LitIdx);
        }
    }

    /// The representative of a literal's equivalence class.
    pub fn find(&mut self, lit: Lit) -> Lit {
        let mut code = lit.code();
        while self.parent[code] as usize != code {
            // Path halving
            let parent = self.parent[code] as usize;
            let grandparent = self.parent[parent];
            self.parent[code] = grandparent;
            code = grandparent as usize;
        }
        Lit::from_code(code)
    }

    /// The representative without path compression.
    pub fn find_const(&self, lit: Lit) -> Lit {
        let mut code = lit.code();
        while self.parent[code] as usize != code {
            code = self.parent[code] as usize;
        }
        Lit::from_code(code)
    }

    /// Whether the literal is its own representative.
    pub fn is_representative(&self, lit: Lit) -> bool {
        self.parent[lit.code()] as usize == lit.code()
    }

    /// Make `repr` the representative of `lit`'s class.
    ///
    /// Returns false if the merge would identify a literal with its own negation.
    pub fn merge(&mut self, repr: Lit, lit: Lit) -> bool {
        let repr_root = self.find(repr);
        let lit_root = self.find(lit);
        if repr_root == !lit_root {
            return false;
        }
        if repr_root != lit_root {
            self.parent[lit_root.code()] = repr_root.code() as LitIdx;
            self.parent[(!lit_root).code()] = (!repr_root).code() as LitIdx;
        }
        true
    }
}

/// Status of an internal variable.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum VarStatus {
    /// Allocated but not occurring in any clause yet.
    Unused,
    Active,
    /// Assigned at the root level.
    Fixed,
    /// Removed by bounded variable elimination; model values come from the extension stack.
    Eliminated,
    /// Replaced by its equivalence class representative.
    Substituted,
    /// All occurrences had a single polarity; removed like an eliminated variable.
    Pure,
}

impl Default for VarStatus {
    fn default() -> VarStatus {
        VarStatus::Unused
    }
}

/// External to internal variable mapping and metadata.
#[derive(Default)]
pub struct Variables {
    internal_from_external: VarMap,
    external_from_internal: VarMap,
    /// Status by internal variable index.
    status: Vec<VarStatus>,
    /// Freeze reference counts by external variable index.
    frozen: Vec<u32>,
    /// Cached solution values by external variable index.
    solution: Vec<Option<bool>>,
    /// External variables whose value was queried or fixed since the last solve.
    tainted: Vec<bool>,
    /// Equivalence classes over external literals.
    ///
    /// Kept on the external side so that substitutions survive internal compaction.
    pub equivalences: LitUnionFind,
    /// Number of allocated internal variables.
    internal_count: usize,
    /// One past the largest external variable seen.
    external_count: usize,
}

impl Variables {
    /// Number of allocated internal variables.
    pub fn internal_count(&self) -> usize {
        self.internal_count
    }

    /// One past the largest external variable in use.
    pub fn external_count(&self) -> usize {
        self.external_count
    }

    /// Status of an internal variable.
    pub fn status(&self, var: Var) -> VarStatus {
        self.status[var.index()]
    }

    pub fn set_status(&mut self, var: Var, status: VarStatus) {
        self.status[var.index()] = status;
    }

    /// Whether the internal variable takes part in search and inprocessing.
    pub fn is_active(&self, var: Var) -> bool {
        self.status[var.index()] == VarStatus::Active
    }

    /// The internal variable of an external one, if it has one.
    pub fn internal_from_external(&self, external: Var) -> Option<Var> {
        self.internal_from_external.get(external)
    }

    /// The external variable of an internal one, if it has one.
    pub fn external_from_internal(&self, internal: Var) -> Option<Var> {
        self.external_from_internal.get(internal)
    }

    /// Map an external literal to its internal counterpart, if mapped.
    pub fn internal_from_external_lit(&self, external: Lit) -> Option<Lit> {
        self.internal_from_external(external.var())
            .map(|var| var.lit(external.is_positive()))
    }

    /// Map an internal literal to its external counterpart.
    ///
    /// Every internal variable that occurs in emitted clauses has an external name; variables
    /// introduced by the engine get a fresh one when they are created.
    pub fn external_from_internal_lit(&self, internal: Lit) -> Lit {
        let external = self
            .external_from_internal(internal.var())
            .expect("internal variable without external name");
        external.lit(internal.is_positive())
    }

    /// Get or create the internal variable backing an external one.
    ///
    /// Newly mapped variables prefer the identity mapping so that proofs of non-incremental
    /// use read naturally.
    pub fn alloc_external(&mut self, external: Var) -> Var {
        if let Some(internal) = self.internal_from_external.get(external) {
            return internal;
        }

        self.external_count = self.external_count.max(external.index() + 1);

        let identity = Var::from_index(external.index());
        let internal = if external.index() >= self.internal_count {
            let var = Var::from_index(self.internal_count);
            if self.external_from_internal.get(var).is_none() {
                var
            } else {
                self.fresh_internal()
            }
        } else if self.external_from_internal.get(identity).is_none()
            && self.status.get(identity.index()) == Some(&VarStatus::Unused)
        {
            identity
        } else {
            self.fresh_internal()
        };

        self.grow_internal(internal);
        self.internal_from_external.insert(internal, external);
        self.external_from_internal.insert(external, internal);
        self.grow_external(external);
        internal
    }

    /// Allocate an engine-introduced internal variable with a fresh external name.
    pub fn alloc_internal(&mut self) -> Var {
        let external = Var::from_index(self.external_count);
        self.alloc_external(external)
    }

    fn fresh_internal(&mut self) -> Var {
        Var::from_index(self.internal_count)
    }

    fn grow_internal(&mut self, var: Var) {
        if self.internal_count <= var.index() {
            self.internal_count = var.index() + 1;
            self.status.resize(self.internal_count, VarStatus::Unused);
        }
    }

    fn grow_external(&mut self, var: Var) {
        if self.frozen.len() <= var.index() {
            self.frozen.resize(var.index() + 1, 0);
            self.solution.resize(var.index() + 1, None);
            self.tainted.resize(var.index() + 1, false);
        }
        self.external_count = self.external_count.max(var.index() + 1);
        self.equivalences.set_var_count(self.external_count);
    }

    /// Drop all internal names and statuses for a compaction.
    ///
    /// The external side (freeze counts, solution cache, equivalences) is untouched.
    pub fn reset_internal(&mut self, count: usize) {
        self.internal_from_external = VarMap::default();
        self.external_from_internal = VarMap::default();
        self.status = vec![VarStatus::Unused; count];
        self.internal_count = count;
    }

    /// Register the new internal name of an external variable after a compaction.
    pub fn remap_internal(&mut self, external: Var, internal: Var) {
        debug_assert!(internal.index() < self.internal_count);
        self.internal_from_external.insert(internal, external);
        self.external_from_internal.insert(external, internal);
    }

    /// Increment the freeze count of an external variable.
    pub fn freeze(&mut self, external: Var) {
        self.grow_external(external);
        self.frozen[external.index()] += 1;
    }

    /// Decrement the freeze count of an external variable.
    ///
    /// Returns false if the variable was not frozen.
    pub fn melt(&mut self, external: Var) -> bool {
        match self.frozen.get_mut(external.index()) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Whether the internal variable is frozen through its external name.
    pub fn is_frozen_internal(&self, internal: Var) -> bool {
        match self.external_from_internal(internal) {
            Some(external) => self
                .frozen
                .get(external.index())
                .map(|&count| count > 0)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Cache the solution value of an external variable.
    pub fn set_solution(&mut self, external: Var, value: Option<bool>) {
        self.grow_external(external);
        self.solution[external.index()] = value;
    }

    /// The cached solution value of an external variable.
    pub fn solution(&self, external: Var) -> Option<bool> {
        self.solution.get(external.index()).cloned().flatten()
    }

    pub fn mark_tainted(&mut self, external: Var) {
        self.grow_external(external);
        self.tainted[external.index()] = true;
    }

    pub fn is_tainted(&self, external: Var) -> bool {
        self.tainted.get(external.index()).cloned().unwrap_or(false)
    }

    /// Iterator over all internal variables with a given status.
    pub fn with_status<'a>(&'a self, status: VarStatus) -> impl Iterator<Item = Var> + 'a {
        (0..self.internal_count)
            .map(Var::from_index)
            .filter(move |&var| self.status(var) == status)
    }

    /// The equivalence representative of an external literal.
    pub fn repr_external_lit(&mut self, lit: Lit) -> Lit {
        self.equivalences.set_var_count(lit.index() + 1);
        self.equivalences.find(lit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pinesat_formula::{lit, var};

    #[test]
    fn identity_preferred() {
        let mut variables = Variables::default();
        let a = variables.alloc_external(var!(1));
        let b = variables.alloc_external(var!(2));
        assert_eq!(a, Var::from_index(0));
        assert_eq!(b, Var::from_index(1));
        assert_eq!(variables.internal_from_external(var!(2)), Some(b));
        assert_eq!(variables.external_from_internal(b), Some(var!(2)));
    }

    #[test]
    fn gaps_are_allocated() {
        let mut variables = Variables::default();
        let c = variables.alloc_external(var!(5));
        assert_eq!(c, Var::from_index(4));
        assert_eq!(variables.internal_count(), 5);
        let a = variables.alloc_external(var!(1));
        assert_eq!(a, Var::from_index(0));
    }

    #[test]
    fn freeze_and_melt() {
        let mut variables = Variables::default();
        variables.alloc_external(var!(3));
        variables.freeze(var!(3));
        variables.freeze(var!(3));
        let internal = variables.internal_from_external(var!(3)).unwrap();
        assert!(variables.is_frozen_internal(internal));
        assert!(variables.melt(var!(3)));
        assert!(variables.is_frozen_internal(internal));
        assert!(variables.melt(var!(3)));
        assert!(!variables.is_frozen_internal(internal));
        assert!(!variables.melt(var!(3)));
    }

    #[test]
    fn union_find_polarity() {
        let mut uf = LitUnionFind::default();
        uf.set_var_count(4);

        assert!(uf.merge(lit!(1), lit!(-2)));
        assert_eq!(uf.find(lit!(-2)), lit!(1));
        assert_eq!(uf.find(lit!(2)), lit!(-1));

        assert!(uf.merge(lit!(2), lit!(3)));
        assert_eq!(uf.find(lit!(3)), lit!(-1));
        assert_eq!(uf.find(lit!(-3)), lit!(1));

        // 1 ~ -2 and 2 ~ 3, so merging 1 and 3 must fail
        assert!(!uf.merge(lit!(1), lit!(3)));
    }

    #[test]
    fn engine_vars_get_fresh_external_names() {
        let mut variables = Variables::default();
        variables.alloc_external(var!(2));
        let fresh = variables.alloc_internal();
        let external = variables.external_from_internal(fresh).unwrap();
        assert_eq!(external, var!(3));
    }
}
