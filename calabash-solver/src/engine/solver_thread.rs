use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use fnv::FnvHashSet;
use log::debug;
use log::trace;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

use crate::basic_types::Inconsistency;
use crate::basic_types::PropagationStatus;
use crate::basic_types::PropagatorError;
use crate::basic_types::Solution;
use crate::calabash_assert_simple;
use crate::containers::KeyedVec;
use crate::engine::clause_database::Conflict;
use crate::engine::propagation::PropagationContext;
use crate::engine::propagation::PropagatorId;
use crate::engine::propagation::PropagatorModes;
use crate::engine::propagation::PropagatorStore;
use crate::engine::propagation::PropagatorUndoMode;
use crate::engine::variables::Atom;
use crate::engine::variables::Literal;
use crate::engine::Assignment;
use crate::engine::ClauseAttributes;
use crate::engine::ClauseDatabase;
use crate::engine::SolverStatistics;
use crate::engine::WeightConstraint;

/// Run unit propagation and weight-constraint propagation to a joint
/// fixpoint. Also used at the root, both while clauses are being added and
/// from [`PropagatorInitialisationContext::propagate`].
///
/// [`PropagatorInitialisationContext::propagate`]:
/// crate::PropagatorInitialisationContext::propagate
pub(crate) fn propagate_fixpoint(
    clause_database: &mut ClauseDatabase,
    weight_constraints: &[WeightConstraint],
    assignment: &mut Assignment,
    statistics: &mut SolverStatistics,
) -> Result<(), Conflict> {
    let trail_size_before = assignment.size();
    let result = fixpoint_loop(clause_database, weight_constraints, assignment);
    statistics.num_propagations += (assignment.size() - trail_size_before) as u64;
    result
}

fn fixpoint_loop(
    clause_database: &mut ClauseDatabase,
    weight_constraints: &[WeightConstraint],
    assignment: &mut Assignment,
) -> Result<(), Conflict> {
    loop {
        clause_database.propagate(assignment)?;

        let mut changed = false;
        for constraint in weight_constraints {
            changed |= constraint.propagate(assignment)?;
        }
        if !changed {
            return Ok(());
        }
    }
}

/// The state reached across threads during one solving step: found models,
/// clauses to keep beyond the step, and the abort flag raised when a
/// propagator fails.
#[derive(Debug, Default)]
pub(crate) struct SharedSearchState {
    pub(crate) sink: Mutex<ModelSink>,
    pub(crate) promoted: Mutex<Vec<Vec<Literal>>>,
    pub(crate) abort: AtomicBool,
}

/// Models are recorded under a lock which also serialises total-assignment
/// checks; threads can enumerate overlapping regions, so models are
/// deduplicated on their program-atom values.
#[derive(Debug, Default)]
pub(crate) struct ModelSink {
    seen: FnvHashSet<Vec<bool>>,
    pub(crate) models: Vec<Solution>,
}

#[derive(Clone, Copy, Debug)]
struct Decision {
    literal: Literal,
    flipped: bool,
}

/// The complete search state owned by one solver thread: its assignment, its
/// copy of the clause database, the effective watch sets, and the undo
/// bookkeeping of the propagator protocol.
#[derive(Debug)]
pub(crate) struct ThreadState {
    pub(crate) thread_id: u32,
    pub(crate) assignment: Assignment,
    pub(crate) clause_database: ClauseDatabase,
    pub(crate) weight_constraints: Vec<WeightConstraint>,
    /// Per propagator, the literals watched in this thread: the static
    /// registrations of initialisation, mutated by thread-local watch
    /// operations.
    pub(crate) watch_sets: KeyedVec<PropagatorId, FnvHashSet<Literal>>,
    /// Watched literals that became true but have not been reported yet.
    pub(crate) pending: KeyedVec<PropagatorId, Vec<Literal>>,
    /// Change batches already reported to `propagate`, with the decision
    /// level they were reported at; consumed by `undo` on backtracking.
    reported: KeyedVec<PropagatorId, Vec<(usize, Vec<Literal>)>>,
    /// Whether `check` has fired since the last `undo`, per propagator.
    check_fired: KeyedVec<PropagatorId, bool>,
    pub(crate) modes: KeyedVec<PropagatorId, PropagatorModes>,
    decisions: Vec<Decision>,
    notification_pointer: usize,
    num_shared_atoms: u32,
    num_static_clauses: usize,
    num_static_unit_clauses: usize,
    program_atoms: Vec<Atom>,
    pub(crate) conflict: Option<Conflict>,
    rng: SmallRng,
    random_polarity: bool,
    pub(crate) statistics: SolverStatistics,
}

impl ThreadState {
    #[allow(clippy::too_many_arguments, reason = "plain construction from the solver's step state")]
    pub(crate) fn new(
        thread_id: u32,
        assignment: Assignment,
        clause_database: ClauseDatabase,
        weight_constraints: Vec<WeightConstraint>,
        watch_sets: KeyedVec<PropagatorId, FnvHashSet<Literal>>,
        modes: KeyedVec<PropagatorId, PropagatorModes>,
        program_atoms: Vec<Atom>,
        random_seed: u64,
        random_polarity: bool,
    ) -> ThreadState {
        let mut pending = KeyedVec::default();
        let mut reported = KeyedVec::default();
        let mut check_fired = KeyedVec::default();
        for _ in 0..modes.len() {
            let _ = pending.push(Vec::new());
            let _ = reported.push(Vec::new());
            let _ = check_fired.push(false);
        }

        let num_shared_atoms = assignment.num_atoms();
        let num_static_clauses = clause_database.num_clauses();
        let num_static_unit_clauses = clause_database.num_unit_clauses();

        ThreadState {
            thread_id,
            assignment,
            clause_database,
            weight_constraints,
            watch_sets,
            pending,
            reported,
            check_fired,
            modes,
            decisions: Vec::new(),
            notification_pointer: 0,
            num_shared_atoms,
            num_static_clauses,
            num_static_unit_clauses,
            program_atoms,
            conflict: None,
            rng: SmallRng::seed_from_u64(random_seed.wrapping_add(thread_id as u64)),
            random_polarity,
            statistics: SolverStatistics::default(),
        }
    }

    pub(crate) fn propagate_core(&mut self) -> Result<(), Conflict> {
        propagate_fixpoint(
            &mut self.clause_database,
            &self.weight_constraints,
            &mut self.assignment,
            &mut self.statistics,
        )
    }

    pub(crate) fn add_dynamic_clause(
        &mut self,
        literals: &[Literal],
        attributes: ClauseAttributes,
    ) -> Result<(), Conflict> {
        self.clause_database
            .add_clause(literals, attributes, &mut self.assignment)
    }

    pub(crate) fn new_volatile_literal(&mut self) -> Literal {
        let atom = self.assignment.grow();
        self.clause_database.grow_to(self.assignment.num_atoms());
        Literal::positive(atom)
    }

    /// Whether the literal was allocated by this thread (volatile), as
    /// opposed to being part of the static, shared atom range.
    pub(crate) fn is_thread_local(&self, literal: Literal) -> bool {
        literal.atom().id() > self.num_shared_atoms
    }

    /// Turn trail growth into pending watch events for every propagator
    /// watching one of the newly true literals.
    fn collect_notifications(&mut self) {
        while self.notification_pointer < self.assignment.size() {
            let literal = self.assignment.trail().at(self.notification_pointer);
            self.notification_pointer += 1;

            for id in self.watch_sets.keys() {
                if self.watch_sets[id].contains(&literal) {
                    self.pending[id].push(literal);
                }
            }
        }
    }

    fn record_reported(&mut self, id: PropagatorId, level: usize, changes: &[Literal]) {
        self.reported[id].push((level, changes.to_vec()));
    }

    /// Remove and return, in their original report order, the literals that
    /// were reported to `propagate` above the given level.
    fn take_reported_above(&mut self, id: PropagatorId, level: usize) -> Vec<Literal> {
        let reported = &mut self.reported[id];
        let keep = reported
            .iter()
            .take_while(|(batch_level, _)| *batch_level <= level)
            .count();

        reported
            .split_off(keep)
            .into_iter()
            .flat_map(|(_, literals)| literals)
            .collect()
    }

    pub(crate) fn push_decision(&mut self, literal: Literal, flipped: bool) {
        self.assignment.increase_decision_level();
        self.decisions.push(Decision { literal, flipped });
        self.assignment.assign(literal);
    }

    fn pick_fallback(&mut self) -> Literal {
        for atom in self.assignment.atoms() {
            let positive = Literal::positive(atom);
            if !self.assignment.has_literal(positive) || !self.assignment.is_free(positive) {
                continue;
            }
            let positive_first = if self.random_polarity {
                self.rng.gen()
            } else {
                false
            };
            return if positive_first { positive } else { !positive };
        }

        unreachable!("a decision is only requested on partial assignments")
    }
}

enum StepOutcome {
    Fixpoint,
    Conflict,
}

/// The search loop of one solver thread: exhaustive model enumeration by
/// chronological decision flipping, interleaved with the propagator hooks of
/// the protocol.
pub(crate) fn run_search(
    state: &mut ThreadState,
    propagators: &PropagatorStore,
    shared: &SharedSearchState,
) -> Result<(), PropagatorError> {
    debug!("thread {} starts searching", state.thread_id);

    loop {
        if shared.abort.load(Ordering::Relaxed) {
            return Ok(());
        }

        match propagate_and_notify(state, propagators)? {
            StepOutcome::Conflict => {
                state.statistics.num_conflicts += 1;
                if !backtrack_and_flip(state, propagators) {
                    break;
                }
            }
            StepOutcome::Fixpoint => {
                if !state.assignment.is_total() {
                    make_decision(state, propagators);
                    continue;
                }

                on_total_assignment(state, propagators, shared)?;
                if state.conflict.is_some() {
                    state.statistics.num_conflicts += 1;
                    if !backtrack_and_flip(state, propagators) {
                        break;
                    }
                } else if state.assignment.is_total() {
                    // the model was recorded; move on to the next branch
                    if !backtrack_and_flip(state, propagators) {
                        break;
                    }
                }
                // otherwise a check introduced fresh literals: keep searching
            }
        }
    }

    promote_dynamic_clauses(state, shared);
    debug!("thread {} exhausted its search space", state.thread_id);
    Ok(())
}

/// Alternate engine propagation with `propagate` deliveries until neither has
/// anything left to do, then fire the fixpoint `check` hooks.
fn propagate_and_notify(
    state: &mut ThreadState,
    propagators: &PropagatorStore,
) -> Result<StepOutcome, PropagatorError> {
    loop {
        if let Err(conflict) = state.propagate_core() {
            state.conflict = Some(conflict);
            return Ok(StepOutcome::Conflict);
        }
        state.collect_notifications();

        let mut delivered_any = false;
        for id in propagators.ids() {
            let changes = std::mem::take(&mut state.pending[id]);
            if changes.is_empty() {
                continue;
            }
            delivered_any = true;

            let level = state.assignment.decision_level();
            state.record_reported(id, level, &changes);
            state.statistics.num_propagate_calls += 1;
            trace!(
                "thread {}: propagate({}) with {} changes",
                state.thread_id,
                propagators[id].name(),
                changes.len()
            );

            let status = {
                let mut context = PropagationContext::new(state, id);
                propagators[id].propagate(&mut context, &changes)
            };
            if let Some(outcome) = handle_hook_status(state, status)? {
                return Ok(outcome);
            }
        }
        if delivered_any {
            continue;
        }

        let trail_size = state.assignment.size();
        let clause_count =
            state.clause_database.num_clauses() + state.clause_database.num_unit_clauses();
        for id in propagators.ids() {
            if !state.modes[id].check_mode.fires_at_fixpoint() {
                continue;
            }
            state.check_fired[id] = true;
            state.statistics.num_check_calls += 1;

            let status = {
                let mut context = PropagationContext::new(state, id);
                propagators[id].check(&mut context)
            };
            if let Some(outcome) = handle_hook_status(state, status)? {
                return Ok(outcome);
            }
        }
        let nothing_new = state.assignment.size() == trail_size
            && state.clause_database.num_clauses() + state.clause_database.num_unit_clauses()
                == clause_count;
        if nothing_new {
            return Ok(StepOutcome::Fixpoint);
        }
    }
}

fn handle_hook_status(
    state: &mut ThreadState,
    status: PropagationStatus,
) -> Result<Option<StepOutcome>, PropagatorError> {
    match status {
        Ok(()) => {
            if state.conflict.is_some() {
                Ok(Some(StepOutcome::Conflict))
            } else {
                Ok(None)
            }
        }
        Err(Inconsistency::Conflict) => {
            if state.conflict.is_none() {
                state.conflict = Some(Conflict {
                    literals: Vec::new(),
                });
            }
            Ok(Some(StepOutcome::Conflict))
        }
        Err(Inconsistency::Error(error)) => Err(error),
    }
}

/// Total-assignment handling: run the `check(Total)` hooks and report the
/// model. The model sink lock is held throughout, serialising total checks
/// against model emission in other threads.
fn on_total_assignment(
    state: &mut ThreadState,
    propagators: &PropagatorStore,
    shared: &SharedSearchState,
) -> Result<(), PropagatorError> {
    let mut sink = shared.sink.lock().expect("model sink lock poisoned");

    for id in propagators.ids() {
        if !state.modes[id].check_mode.fires_at_total() {
            continue;
        }
        state.check_fired[id] = true;
        state.statistics.num_check_calls += 1;

        let status = {
            let mut context = PropagationContext::new(state, id);
            propagators[id].check(&mut context)
        };
        if handle_hook_status(state, status)?.is_some() {
            return Ok(());
        }
        if !state.assignment.is_total() {
            return Ok(());
        }
    }

    // vet the candidate against the full database: clauses added mid-search
    // can carry stale watches, and weight constraint propagation is not
    // complete
    if let Some(conflict) = state.clause_database.find_falsified_clause(&state.assignment) {
        state.conflict = Some(conflict);
        return Ok(());
    }
    if let Some(constraint) = state
        .weight_constraints
        .iter()
        .find(|constraint| !constraint.is_satisfied_under(&state.assignment))
    {
        state.conflict = Some(constraint.conflict());
        return Ok(());
    }

    let values: Vec<bool> = state
        .program_atoms
        .iter()
        .map(|&atom| state.assignment.is_true(Literal::positive(atom)))
        .collect();
    if sink.seen.insert(values.clone()) {
        debug!(
            "thread {} found model #{}",
            state.thread_id,
            sink.models.len() + 1
        );
        state.statistics.num_models += 1;
        sink.models.push(Solution::new(values));
    }

    Ok(())
}

/// Backtrack to the given level: unassign, fire the `undo` hooks, and drop
/// the popped decisions.
fn backtrack(state: &mut ThreadState, propagators: &PropagatorStore, target_level: usize) {
    let _ = state.assignment.backtrack_to(target_level);
    state.clause_database.synchronise(&state.assignment);
    state.notification_pointer = state.assignment.size();
    state.decisions.truncate(target_level);
    state.conflict = None;

    for id in propagators.ids() {
        // events that were queued for literals which are no longer true were
        // never reported, so they must not be reported (nor undone) later
        let assignment = &state.assignment;
        state.pending[id].retain(|&literal| assignment.is_true(literal));

        let changes = state.take_reported_above(id, target_level);
        let fire_for_check = state.modes[id].undo_mode == PropagatorUndoMode::Always
            && state.check_fired[id];
        if changes.is_empty() && !fire_for_check {
            continue;
        }

        state.statistics.num_undo_calls += 1;
        state.check_fired[id] = false;
        let context = PropagationContext::new(state, id);
        propagators[id].undo(&context, &changes);
    }
}

/// Pop levels until an unflipped decision is found, then assert its negation
/// in its place. Returns false when the search space is exhausted.
fn backtrack_and_flip(state: &mut ThreadState, propagators: &PropagatorStore) -> bool {
    loop {
        let Some(&last) = state.decisions.last() else {
            return false;
        };

        let target_level = state.assignment.decision_level() - 1;
        backtrack(state, propagators, target_level);

        if !last.flipped {
            state.push_decision(!last.literal, true);
            return true;
        }
    }
}

/// Branch: ask the registered propagators in order, falling back to the
/// engine's own heuristic when all of them defer.
fn make_decision(state: &mut ThreadState, propagators: &PropagatorStore) {
    let fallback = state.pick_fallback();

    let mut decision = fallback;
    for id in propagators.ids() {
        state.statistics.num_decide_calls += 1;
        if let Some(literal) = propagators[id].decide(state.thread_id, &state.assignment, fallback)
        {
            decision = literal;
            break;
        }
    }

    calabash_assert_simple!(
        state.assignment.has_literal(decision) && state.assignment.is_free(decision),
        "decision literal {decision} must be free and known to the solver"
    );

    trace!("thread {}: deciding {decision}", state.thread_id);
    state.statistics.num_decisions += 1;
    state.push_decision(decision, false);
}

/// Untagged dynamic clauses outlive the step: collect them for promotion into
/// the static database once every thread has finished.
fn promote_dynamic_clauses(state: &ThreadState, shared: &SharedSearchState) {
    let mut promoted = shared.promoted.lock().expect("promotion lock poisoned");

    for (literals, attributes) in state.clause_database.clauses_from(state.num_static_clauses) {
        if !attributes.is_tagged() {
            promoted.push(literals.to_vec());
        }
    }
    for (literal, attributes) in state
        .clause_database
        .unit_clauses_from(state.num_static_unit_clauses)
    {
        if !attributes.is_tagged() {
            promoted.push(vec![literal]);
        }
    }
}
