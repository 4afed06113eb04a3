//! Trial orchestration
//!
//! A `TaskController` owns exactly one trial: its throttled event log, a
//! tolerance matcher bound to the trial's target, and the final accuracy
//! once scored. The external gesture layer streams transforms in; on
//! completion the controller scores the last recorded transform and hands a
//! serialized record to the storage collaborator.
//!
//! State machine: Created → Started → InProgress → Ended → Scored →
//! Persisted. Violations (double start, actions after end) are logged and
//! ignored in release builds; the study UI must never crash mid-session.

use log::{debug, error};
use nalgebra::Vector3;
use thiserror::Error;
use uuid::Uuid;

use crate::event_log::{ActionEvent, ThrottledEventLog};
use crate::export::ActionExporter;
use crate::matcher::ToleranceMatcher;
use crate::storage::ResourceStore;
use crate::transform::{GestureKind, GesturePhase, Transform};

/// Trial-level errors.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("no recorded transform; the trial has no events to score")]
    NoRecordedTransform,
}

/// Lifecycle state of one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    Created,
    Started,
    InProgress,
    Ended,
    Scored,
    Persisted,
}

/// Controller for a single trial of one gesture kind.
#[derive(Debug)]
pub struct TaskController {
    id: Uuid,
    kind: GestureKind,
    log: ThrottledEventLog,
    matcher: ToleranceMatcher,
    accuracy_result: Option<f32>,
    state: TrialState,
}

impl TaskController {
    /// Create a trial for `kind` with the given target transform. The
    /// matcher is bound to the target for the trial's whole lifetime.
    pub fn new(kind: GestureKind, target: Transform) -> Self {
        Self::with_throttle_interval(kind, target, crate::event_log::DEFAULT_THROTTLE_INTERVAL)
    }

    /// Create a trial with a custom update-throttle interval.
    pub fn with_throttle_interval(
        kind: GestureKind,
        target: Transform,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            log: ThrottledEventLog::with_interval(interval),
            matcher: ToleranceMatcher::for_kind(kind, target),
            accuracy_result: None,
            state: TrialState::Created,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> GestureKind {
        self.kind
    }

    pub fn state(&self) -> TrialState {
        self.state
    }

    /// Admitted events so far, insertion order.
    pub fn events(&self) -> &[ActionEvent] {
        self.log.snapshot()
    }

    /// Final accuracy, once scored.
    pub fn accuracy_result(&self) -> Option<f32> {
        self.accuracy_result
    }

    /// Record the trial-start boundary event. Must be called exactly once,
    /// before any action.
    pub fn start(&mut self, observed: Transform) {
        debug_assert_eq!(self.state, TrialState::Created, "trial started twice");
        if self.state != TrialState::Created {
            error!("trial {} started twice; ignoring", self.id);
            return;
        }
        self.log.append_immediate(self.boundary(GesturePhase::Start, observed));
        self.state = TrialState::Started;
        debug!("trial {} ({}) started", self.id, self.kind.label());
    }

    /// Record a continuous manipulation update through the throttle gate.
    pub fn add_action(&mut self, observed: Transform) {
        debug_assert!(
            matches!(self.state, TrialState::Started | TrialState::InProgress),
            "action outside an open trial"
        );
        if !matches!(self.state, TrialState::Started | TrialState::InProgress) {
            error!("trial {}: action outside an open trial; ignoring", self.id);
            return;
        }
        self.log.append_throttled(ActionEvent::new(
            self.kind,
            GesturePhase::Update,
            observed,
            *self.matcher.target(),
        ));
        self.state = TrialState::InProgress;
    }

    /// Record the trial-end boundary event. Must be called exactly once; no
    /// further actions are valid afterwards.
    ///
    /// A pending throttled update is drained first so the most recent
    /// observation is never lost to the gate.
    pub fn end(&mut self, observed: Transform) {
        debug_assert!(
            matches!(self.state, TrialState::Started | TrialState::InProgress),
            "end outside an open trial"
        );
        if !matches!(self.state, TrialState::Started | TrialState::InProgress) {
            error!("trial {}: end outside an open trial; ignoring", self.id);
            return;
        }
        self.log.drain_pending();
        self.log.append_immediate(self.boundary(GesturePhase::End, observed));
        self.state = TrialState::Ended;
        debug!("trial {} ({}) ended", self.id, self.kind.label());
    }

    /// Score the trial: compute and store the matcher's accuracy for the
    /// last recorded transform.
    pub fn update_accuracy_result(
        &mut self,
        viewer: Option<Vector3<f32>>,
    ) -> Result<f32, TrialError> {
        let last = self.log.last().ok_or(TrialError::NoRecordedTransform)?;
        let accuracy = self.matcher.accuracy(&last.observed, viewer);
        self.accuracy_result = Some(accuracy);
        self.state = TrialState::Scored;
        Ok(accuracy)
    }

    /// Whether the last recorded transform matches the target. `false`
    /// when no event exists yet; an empty trial is not an error here.
    pub fn is_matching(&self, viewer: Option<Vector3<f32>>) -> bool {
        match self.log.last() {
            Some(last) => self.matcher.is_matching(&last.observed, viewer),
            None => false,
        }
    }

    /// Hand the full record (all events plus final accuracy) to the storage
    /// collaborator. Failure is logged, never fatal: the study continues and
    /// the in-memory record stays available for manual export.
    pub fn persist(&mut self, exporter: &mut ActionExporter, store: &mut dyn ResourceStore) {
        let accuracy = self.accuracy_result.unwrap_or(f32::INFINITY);
        match exporter.persist_trial(store, self.id, self.log.snapshot(), accuracy) {
            Ok(()) => {
                self.state = TrialState::Persisted;
            }
            Err(err) => {
                error!("trial {}: {err}; record kept in memory", self.id);
            }
        }
    }

    /// Abandon the trial cleanly: drop the pending throttled update. The
    /// controller itself is discarded by the owner afterwards.
    pub fn cancel(&mut self) {
        self.log.cancel();
        debug!("trial {} ({}) cancelled", self.id, self.kind.label());
    }

    fn boundary(&self, phase: GesturePhase, observed: Transform) -> ActionEvent {
        ActionEvent::new(self.kind, phase, observed, *self.matcher.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn target() -> Transform {
        Transform::at_translation(Vector3::new(0.0, 1.0, 0.0))
    }

    #[test]
    fn scored_trial_uses_the_last_recorded_transform() {
        let mut trial = TaskController::new(GestureKind::Position, target());
        trial.start(Transform::identity());
        trial.end(Transform::at_translation(Vector3::new(0.0, 1.4, 0.0)));

        let accuracy = trial.update_accuracy_result(None).unwrap();
        assert_relative_eq!(accuracy, 0.4, epsilon = 1.0e-6);
        assert!(trial.is_matching(None));
        assert_eq!(trial.state(), TrialState::Scored);
    }

    #[test]
    fn scoring_an_empty_trial_fails() {
        let mut trial = TaskController::new(GestureKind::Position, target());
        assert!(matches!(
            trial.update_accuracy_result(None),
            Err(TrialError::NoRecordedTransform)
        ));
        assert!(!trial.is_matching(None));
    }

    #[test]
    fn boundary_events_frame_the_log() {
        let mut trial = TaskController::new(GestureKind::Scale, target());
        trial.start(Transform::identity());
        trial.add_action(Transform::identity().with_uniform_scale(1.5));
        trial.end(Transform::identity().with_uniform_scale(2.0));

        let events = trial.events();
        assert_eq!(events.first().unwrap().phase, GesturePhase::Start);
        assert_eq!(events.last().unwrap().phase, GesturePhase::End);
    }

    #[test]
    fn end_drains_the_pending_update() {
        // A gate far wider than the test's runtime keeps both updates pending.
        let mut trial = TaskController::with_throttle_interval(
            GestureKind::Position,
            target(),
            std::time::Duration::from_secs(60),
        );
        trial.start(Transform::identity());
        // Two updates inside one throttle interval: only the most recent may
        // survive, and it must survive the end of the trial.
        trial.add_action(Transform::at_translation(Vector3::new(0.1, 0.0, 0.0)));
        trial.add_action(Transform::at_translation(Vector3::new(0.2, 0.0, 0.0)));
        trial.end(Transform::at_translation(Vector3::new(0.3, 0.0, 0.0)));

        let updates: Vec<_> = trial
            .events()
            .iter()
            .filter(|e| e.phase == GesturePhase::Update)
            .collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].observed.translation.x, 0.2);
    }

    #[test]
    fn persisted_trial_reaches_terminal_state() {
        let mut store = MemoryStore::new();
        let mut exporter = ActionExporter::new();
        let mut trial = TaskController::new(GestureKind::Position, target());
        trial.start(Transform::identity());
        trial.end(Transform::at_translation(Vector3::new(0.0, 1.0, 0.0)));
        trial.update_accuracy_result(None).unwrap();

        trial.persist(&mut exporter, &mut store);
        assert_eq!(trial.state(), TrialState::Persisted);
        // Header plus two boundary rows.
        assert_eq!(store.records().len(), 3);
    }

    #[test]
    fn persist_failure_keeps_the_trial_in_memory() {
        let mut store = MemoryStore::new();
        store.fail_writes = true;
        let mut exporter = ActionExporter::new();
        let mut trial = TaskController::new(GestureKind::Position, target());
        trial.start(Transform::identity());
        trial.end(Transform::identity());
        trial.update_accuracy_result(None).unwrap();

        trial.persist(&mut exporter, &mut store);
        assert_ne!(trial.state(), TrialState::Persisted);
        assert_eq!(trial.events().len(), 2);
    }

    #[test]
    fn rotation_trial_without_viewer_is_unmatched_not_fatal() {
        let mut trial = TaskController::new(GestureKind::Rotation, Transform::identity());
        trial.start(Transform::identity());
        trial.end(Transform::identity());

        let accuracy = trial.update_accuracy_result(None).unwrap();
        assert!(accuracy.is_infinite());
        assert!(!trial.is_matching(None));
    }

    #[test]
    fn cancel_discards_pending_updates() {
        let mut trial = TaskController::with_throttle_interval(
            GestureKind::Position,
            target(),
            std::time::Duration::from_secs(60),
        );
        trial.start(Transform::identity());
        trial.add_action(Transform::at_translation(Vector3::new(0.1, 0.0, 0.0)));
        trial.cancel();
        // Only the start boundary was admitted.
        assert_eq!(trial.events().len(), 1);
    }
}
