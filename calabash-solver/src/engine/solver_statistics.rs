use log::info;

/// Counters accumulated over one solving step, merged across search threads
/// when the step finishes.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SolverStatistics {
    pub(crate) num_decisions: u64,
    pub(crate) num_conflicts: u64,
    pub(crate) num_propagations: u64,
    pub(crate) num_models: u64,
    pub(crate) num_propagate_calls: u64,
    pub(crate) num_check_calls: u64,
    pub(crate) num_undo_calls: u64,
    pub(crate) num_decide_calls: u64,
}

impl SolverStatistics {
    pub(crate) fn merge(&mut self, other: &SolverStatistics) {
        self.num_decisions += other.num_decisions;
        self.num_conflicts += other.num_conflicts;
        self.num_propagations += other.num_propagations;
        self.num_models += other.num_models;
        self.num_propagate_calls += other.num_propagate_calls;
        self.num_check_calls += other.num_check_calls;
        self.num_undo_calls += other.num_undo_calls;
        self.num_decide_calls += other.num_decide_calls;
    }

    pub(crate) fn log(&self) {
        info!(
            "statistics: {} decisions, {} conflicts, {} propagations, {} models",
            self.num_decisions, self.num_conflicts, self.num_propagations, self.num_models
        );
        info!(
            "statistics: propagator hooks: {} propagate, {} check, {} undo, {} decide",
            self.num_propagate_calls,
            self.num_check_calls,
            self.num_undo_calls,
            self.num_decide_calls
        );
    }
}
