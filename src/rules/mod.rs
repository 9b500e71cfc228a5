//! Rule matching: which transform chain applies to which file.
//!
//! - [`pattern`]: path predicates (regex or glob) and the match-with-exclusions test
//! - [`chain`]: loader steps, typed options and chain resolution
//! - [`rule_set`]: module rules and the ordered, first-match-wins rule set

pub mod chain;
pub mod pattern;
pub mod rule_set;

pub use chain::*;
pub use pattern::*;
pub use rule_set::*;
