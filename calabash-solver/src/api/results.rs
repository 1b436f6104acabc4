use crate::basic_types::Solution;

/// The outcome of a solving step.
#[derive(Debug)]
pub enum SatisfactionResult {
    /// The program has at least one model; all distinct models found by the
    /// step are reported.
    Satisfiable(Vec<Solution>),
    /// The program has no model.
    Unsatisfiable,
}
