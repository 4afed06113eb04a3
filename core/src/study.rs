//! Study protocol sequencing
//!
//! `StudyFlow` is the composition root of a run: it owns the per-kind
//! repetition counters, the single current trial, the three condition
//! sequencers, and the injected host collaborators. It decides when a block
//! of repeated trials is complete and advances the linear page index that
//! represents progress through the experiment protocol.
//!
//! Nothing here is a global: every collaborator is passed in explicitly at
//! construction and every state transition is a plain synchronous call from
//! the host's run loop.

use std::time::Duration;

use log::{error, warn};

use crate::condition::{ConditionError, ConditionSequencer, ConditionTable};
use crate::export::ActionExporter;
use crate::storage::{FeedbackSink, ResourceStore, ViewerPose};
use crate::task::TaskController;
use crate::transform::{GestureKind, Transform};

/// Consecutive matched trials required before a block is considered done.
pub const DEFAULT_MAX_REPETITION: u32 = 4;

/// Fixed delay the host should honor between cycle completion and the page
/// advance, so in-flight animations and sounds can finish.
pub const PAGE_ADVANCE_DELAY: Duration = Duration::from_secs(2);

/// Feedback sound requested on a successful match.
pub const MATCH_FEEDBACK_SOUND: &str = "task_success";

/// Summary of one completed trial, handed back to the host.
#[derive(Debug, Clone, Copy)]
pub struct TrialOutcome {
    pub kind: GestureKind,
    /// Final scored discrepancy; infinite when unknown.
    pub accuracy: f32,
    /// Whether the final transform matched the target within tolerance.
    pub matched: bool,
    /// Whether another trial of this kind should follow.
    pub repeat_kind: bool,
    /// Whether this trial completed the kind's full condition cycle.
    pub cycle_completed: bool,
}

/// Overarching sequencer for one study run.
pub struct StudyFlow<S, V, F> {
    store: S,
    viewer: V,
    feedback: F,
    /// One sequencer per kind, indexed in `GestureKind::ALL` order.
    sequencers: [ConditionSequencer; 3],
    counters: [u32; 3],
    max_repetition: u32,
    page_index: usize,
    proceed_ready: bool,
    current_trial: Option<TaskController>,
    exporter: ActionExporter,
    load_issues: Vec<ConditionError>,
    /// Trials whose export write failed, kept for a later manual export.
    unpersisted: Vec<TaskController>,
}

impl<S, V, F> StudyFlow<S, V, F>
where
    S: ResourceStore,
    V: ViewerPose,
    F: FeedbackSink,
{
    /// Build a run: loads all three condition tables from the store.
    ///
    /// A table that fails to load degrades that kind to its default
    /// condition instead of aborting the run; the failure is kept in
    /// [`load_issues`](Self::load_issues) for the operator alert.
    pub fn new(store: S, viewer: V, feedback: F) -> Self {
        let mut load_issues = Vec::new();
        let sequencers = GestureKind::ALL.map(|kind| {
            ConditionSequencer::load(kind, &store).unwrap_or_else(|err| {
                error!("loading {} conditions failed: {err}", kind.label());
                load_issues.push(err);
                ConditionSequencer::from_table(kind, ConditionTable::empty())
            })
        });
        Self {
            store,
            viewer,
            feedback,
            sequencers,
            counters: [0; 3],
            max_repetition: DEFAULT_MAX_REPETITION,
            page_index: 0,
            proceed_ready: false,
            current_trial: None,
            exporter: ActionExporter::new(),
            load_issues,
            unpersisted: Vec::new(),
        }
    }

    /// Override the per-kind repetition count.
    pub fn with_max_repetition(mut self, max_repetition: u32) -> Self {
        self.max_repetition = max_repetition;
        self
    }

    /// Condition-table failures collected at construction.
    pub fn load_issues(&self) -> &[ConditionError] {
        &self.load_issues
    }

    /// The kind's condition sequencer.
    pub fn sequencer(&self, kind: GestureKind) -> &ConditionSequencer {
        &self.sequencers[kind_index(kind)]
    }

    /// Mutable access for condition lookups (they update the display cache).
    pub fn sequencer_mut(&mut self, kind: GestureKind) -> &mut ConditionSequencer {
        &mut self.sequencers[kind_index(kind)]
    }

    /// Open the next trial. Exactly one trial is current at a time; an
    /// unfinished predecessor is cancelled and discarded.
    pub fn begin_trial(&mut self, kind: GestureKind, target: Transform) -> &mut TaskController {
        if let Some(mut stale) = self.current_trial.take() {
            warn!("beginning a trial while {} was still open", stale.id());
            stale.cancel();
        }
        self.current_trial.insert(TaskController::new(kind, target))
    }

    /// The current trial, if one is open.
    pub fn current_trial(&self) -> Option<&TaskController> {
        self.current_trial.as_ref()
    }

    /// Mutable access for the gesture layer to stream events into.
    pub fn current_trial_mut(&mut self) -> Option<&mut TaskController> {
        self.current_trial.as_mut()
    }

    /// Abandon the current trial (gesture interrupted). Nothing is scored or
    /// persisted.
    pub fn cancel_trial(&mut self) {
        if let Some(mut trial) = self.current_trial.take() {
            trial.cancel();
        }
    }

    /// Close out the current trial: score it, emit feedback and advance the
    /// kind's condition cycle on a match, persist the record, and fold the
    /// result into the repetition bookkeeping.
    ///
    /// Missing current trial is logged and treated as a no-op; the study UI
    /// must never crash mid-session.
    pub fn complete_trial(&mut self) -> Option<TrialOutcome> {
        let Some(mut trial) = self.current_trial.take() else {
            error!("trial completion attempted without a current trial");
            return None;
        };

        let viewer = self.viewer.viewer_position();
        let accuracy = match trial.update_accuracy_result(viewer) {
            Ok(accuracy) => accuracy,
            Err(err) => {
                error!("trial {}: {err}", trial.id());
                f32::INFINITY
            }
        };
        let matched = trial.is_matching(viewer);
        let kind = trial.kind();

        let mut cycle_completed = false;
        if matched {
            self.feedback.play_feedback_sound(MATCH_FEEDBACK_SOUND);
            match self.sequencers[kind_index(kind)].advance(&mut self.store) {
                Ok(true) => {
                    cycle_completed = true;
                    self.proceed_ready = true;
                }
                Ok(false) => {}
                Err(err) => {
                    // Counterbalancing state is degraded but the session
                    // continues; the operator sees it in the logs.
                    error!("advancing {} conditions failed: {err}", kind.label());
                }
            }
        }

        trial.persist(&mut self.exporter, &mut self.store);
        if trial.state() != crate::task::TrialState::Persisted {
            self.unpersisted.push(trial);
        }
        // Only matched trials count toward the block; a miss always repeats.
        let repeat_kind = if matched {
            self.task_completed(kind)
        } else {
            true
        };

        Some(TrialOutcome {
            kind,
            accuracy,
            matched,
            repeat_kind,
            cycle_completed,
        })
    }

    /// Repetition bookkeeping for one matched trial: returns whether another
    /// trial of `kind` should run. Reaching the per-kind maximum of matched
    /// trials resets the counter and reports the block as finished.
    pub fn task_completed(&mut self, kind: GestureKind) -> bool {
        let counter = &mut self.counters[kind_index(kind)];
        *counter += 1;
        if *counter < self.max_repetition {
            true
        } else {
            *counter = 0;
            false
        }
    }

    /// Whether a completed condition cycle is waiting on the page advance.
    pub fn proceed_ready(&self) -> bool {
        self.proceed_ready
    }

    /// Linear index into the experiment protocol's page sequence.
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Advance the protocol to its next stage. The host calls this after
    /// honoring [`PAGE_ADVANCE_DELAY`].
    pub fn advance_page(&mut self) {
        self.page_index += 1;
        self.proceed_ready = false;
    }

    /// Completed trials whose export write failed. They stay here so the
    /// operator can trigger a manual export after fixing the store.
    pub fn unpersisted_trials(&self) -> &[TaskController] {
        &self.unpersisted
    }

    /// The injected storage collaborator.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// The injected feedback collaborator.
    pub fn feedback(&self) -> &F {
        &self.feedback
    }
}

fn kind_index(kind: GestureKind) -> usize {
    match kind {
        GestureKind::Position => 0,
        GestureKind::Rotation => 1,
        GestureKind::Scale => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FixedViewer, MemoryStore, RecordingSink};
    use nalgebra::Vector3;

    const TABLE: &str = "status,condition1,condition2,condition3,condition4\n\
                         Active,A,B,C,D\n\
                         Inactive,B,D,A,C\n";

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn seeded_flow() -> StudyFlow<MemoryStore, FixedViewer, RecordingSink> {
        let mut store = MemoryStore::new();
        for kind in GestureKind::ALL {
            store.insert_resource(kind.condition_resource(), TABLE);
        }
        StudyFlow::new(
            store,
            FixedViewer(Some(Vector3::new(0.0, 1.6, 0.0))),
            RecordingSink::default(),
        )
    }

    fn run_position_trial(
        flow: &mut StudyFlow<MemoryStore, FixedViewer, RecordingSink>,
        observed: Vector3<f32>,
    ) -> TrialOutcome {
        let target = Transform::at_translation(Vector3::new(0.0, 1.0, 0.0));
        let trial = flow.begin_trial(GestureKind::Position, target);
        trial.start(Transform::identity());
        trial.end(Transform::at_translation(observed));
        flow.complete_trial().expect("trial was open")
    }

    #[test]
    fn repetition_counter_requests_repeats_until_max() {
        let mut flow = seeded_flow();
        for _ in 0..3 {
            assert!(flow.task_completed(GestureKind::Scale));
        }
        assert!(!flow.task_completed(GestureKind::Scale));
        // Counter reset: the next block starts over.
        assert!(flow.task_completed(GestureKind::Scale));
    }

    #[test]
    fn counters_are_independent_per_kind() {
        let mut flow = seeded_flow();
        assert!(flow.task_completed(GestureKind::Position));
        assert!(flow.task_completed(GestureKind::Rotation));
        assert!(flow.task_completed(GestureKind::Rotation));
        // Position is still at one completion out of four.
        assert!(flow.task_completed(GestureKind::Position));
    }

    #[test]
    fn completion_without_a_trial_is_a_logged_noop() {
        init_logs();
        let mut flow = seeded_flow();
        assert!(flow.complete_trial().is_none());
    }

    #[test]
    fn matched_trial_plays_feedback_and_advances_conditions() {
        let mut flow = seeded_flow();
        let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 1.2, 0.0));

        assert!(outcome.matched);
        assert!(outcome.accuracy < 0.5);
        assert_eq!(flow.feedback().played, vec![MATCH_FEEDBACK_SOUND]);
        assert_eq!(flow.sequencer(GestureKind::Position).cursor().index(), 1);
        assert!(!flow.store().records().is_empty());
    }

    #[test]
    fn unmatched_trial_neither_chimes_nor_advances() {
        let mut flow = seeded_flow();
        let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 3.0, 0.0));

        assert!(!outcome.matched);
        assert!(outcome.repeat_kind);
        assert!(flow.feedback().played.is_empty());
        assert!(flow.sequencer(GestureKind::Position).cursor().is_unset());
        // The record is still persisted for offline analysis.
        assert!(!flow.store().records().is_empty());
    }

    #[test]
    fn cycle_completion_raises_proceed_ready_and_page_advance_clears_it() {
        let mut flow = seeded_flow().with_max_repetition(8);
        let mut completed = false;
        for _ in 0..4 {
            let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 1.1, 0.0));
            completed = outcome.cycle_completed;
        }
        assert!(completed);
        assert!(flow.proceed_ready());

        let before = flow.page_index();
        flow.advance_page();
        assert_eq!(flow.page_index(), before + 1);
        assert!(!flow.proceed_ready());
    }

    #[test]
    fn missing_condition_tables_degrade_instead_of_aborting() {
        init_logs();
        let flow = StudyFlow::new(
            MemoryStore::new(),
            FixedViewer(None),
            RecordingSink::default(),
        );
        assert_eq!(flow.load_issues().len(), 3);
    }

    #[test]
    fn degraded_run_still_scores_trials() {
        let mut flow = StudyFlow::new(
            MemoryStore::new(),
            FixedViewer(None),
            RecordingSink::default(),
        );
        let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 1.2, 0.0));
        assert!(outcome.matched);
        // Advancing the empty table fails softly; the cursor stays unset.
        assert!(flow.sequencer(GestureKind::Position).cursor().is_unset());
    }

    #[test]
    fn unmatched_trials_do_not_count_toward_the_block() {
        let mut flow = seeded_flow();
        // A run of misses never closes the block.
        for _ in 0..4 {
            let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 5.0, 0.0));
            assert!(!outcome.matched);
            assert!(outcome.repeat_kind);
        }
        // The full count of matched trials is still required afterwards.
        for _ in 0..3 {
            let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 1.1, 0.0));
            assert!(outcome.matched);
            assert!(outcome.repeat_kind);
        }
        let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 1.1, 0.0));
        assert!(!outcome.repeat_kind);
    }

    #[test]
    fn failed_export_keeps_the_trial_for_manual_export() {
        init_logs();
        let mut flow = seeded_flow();
        flow.store_mut().fail_writes = true;
        let outcome = run_position_trial(&mut flow, Vector3::new(0.0, 3.0, 0.0));
        assert!(!outcome.matched);
        assert_eq!(flow.unpersisted_trials().len(), 1);
        assert_eq!(flow.unpersisted_trials()[0].events().len(), 2);
    }

    #[test]
    fn beginning_a_trial_discards_an_unfinished_one() {
        let mut flow = seeded_flow();
        flow.begin_trial(GestureKind::Position, Transform::identity());
        let second = flow.begin_trial(GestureKind::Rotation, Transform::identity());
        assert_eq!(second.kind(), GestureKind::Rotation);
        assert_eq!(flow.current_trial().unwrap().kind(), GestureKind::Rotation);
    }

    #[test]
    fn cancelled_trial_leaves_no_current_trial() {
        let mut flow = seeded_flow();
        flow.begin_trial(GestureKind::Scale, Transform::identity());
        flow.cancel_trial();
        assert!(flow.current_trial().is_none());
    }
}
