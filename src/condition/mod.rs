//! Build-time macro environment and the conditional evaluator.
//!
//! The scanner consults this module at every `#if`-family directive to
//! decide whether the text that follows is live.

mod env;
mod expr;

pub use env::{MacroEnvironment, MacroValue};
pub use expr::{parse_integer, CompareOp, Condition, ConditionEvaluator};
