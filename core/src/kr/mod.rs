//! Knowledge-representation boundary: terms, substitutions, conditions and updates.
//!
//! This is the small Prolog-style term layer the execution pipeline needs to
//! talk about parameters, preconditions and postconditions. It is not a logic
//! engine; entailment is left to the mental-state implementation.

mod condition;
mod parse;
mod substitution;
mod term;

pub use condition::{LiteralKind, MentalLiteral, MentalStateCondition, Update};
pub use parse::{parse_term, parse_terms};
pub use substitution::{unify, unify_all, Substitution};
pub use term::Term;

pub(crate) use substitution::unify_into;
