//! Pinesat is a CDCL based SAT solver with inprocessing, incremental solving and proof tracing.
//!
//! The solver is accessed through [`Solver`]. Clauses and assumptions use the literal types of
//! [`pinesat_formula`], proof tracers the event trait of [`pinesat_proof`].

pub mod config;

mod analyze;
mod cdcl;
mod clause;
mod context;
mod decision;
mod extend;
mod external;
mod incremental;
mod inprocess;
mod load;
mod lookahead;
mod model;
mod phase;
mod proof;
mod prop;
mod rephase;
mod restart;
mod schedule;
mod simplify;
mod solver;
mod state;
mod stats;
mod tmp;
mod varmap;
mod walk;

pub use config::{ConfigError, SolverConfig};
pub use external::ExternalPropagate;
pub use solver::{ProofFormat, SolveResult, Solver};

pub use pinesat_formula::{CnfFormula, ExtendFormula, Lit, Var};
pub use pinesat_proof::{ClauseId, Tracer};
