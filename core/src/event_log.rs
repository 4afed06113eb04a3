//! Throttled, append-only action logs
//!
//! Continuous gesture updates arrive at display refresh rate (60-120 Hz);
//! persisting every update is wasteful for offline analysis, but the first
//! and last events of each gesture phase must never be lost. The log
//! therefore splits its API: boundary markers are appended immediately,
//! continuous updates pass a minimum-interval gate that retains only the
//! most recent event per interval (trailing edge).
//!
//! The gate is clock-driven rather than timer-driven: a pending update is
//! admitted by the next append, an explicit flush, or the forced drain at
//! trial end. No scheduled callback exists, so dropping the log mid-trial
//! leaks nothing.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::transform::{GestureKind, GesturePhase, Transform};

/// Default minimum interval between admitted throttled events.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(200);

/// One timestamped manipulation event within a trial.
///
/// Immutable once created; ordered by timestamp within the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Unique event id.
    pub id: Uuid,
    /// Wall-clock creation time.
    pub timestamp: DateTime<Utc>,
    /// Manipulation dimension of the owning trial.
    pub kind: GestureKind,
    /// Lifecycle phase within the trial.
    pub phase: GesturePhase,
    /// Transform observed at this instant.
    pub observed: Transform,
    /// Target transform of the trial.
    pub target: Transform,
}

impl ActionEvent {
    /// Create an event stamped with the current time.
    pub fn new(
        kind: GestureKind,
        phase: GesturePhase,
        observed: Transform,
        target: Transform,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            phase,
            observed,
            target,
        }
    }

    /// Status tag written to the action export for this event.
    pub fn status_tag(&self) -> &'static str {
        self.phase.tag(self.kind)
    }
}

/// Ordered, append-only event record with rate-limited update admission.
///
/// Single-writer, single-reader; all operations are confined to the host's
/// run loop, so no synchronization is needed.
#[derive(Debug)]
pub struct ThrottledEventLog {
    events: Vec<ActionEvent>,
    interval: Duration,
    /// Instant of the last admission the gate is keyed on. Initialized to
    /// the log's opening instant, so updates inside the first interval
    /// collapse as well.
    last_admitted: Instant,
    pending: Option<ActionEvent>,
}

impl ThrottledEventLog {
    /// Open a log with the default throttle interval.
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_THROTTLE_INTERVAL)
    }

    /// Open a log with a custom throttle interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self::opened_at(interval, Instant::now())
    }

    /// Open a log keyed on an explicit opening instant. Used by tests that
    /// drive the gate with synthetic clocks.
    pub fn opened_at(interval: Duration, now: Instant) -> Self {
        Self {
            events: Vec::new(),
            interval,
            last_admitted: now,
            pending: None,
        }
    }

    /// Append a boundary event. Never throttled, never dropped.
    pub fn append_immediate(&mut self, event: ActionEvent) {
        self.events.push(event);
    }

    /// Append a continuous-update event through the throttle gate.
    pub fn append_throttled(&mut self, event: ActionEvent) {
        self.append_throttled_at(event, Instant::now());
    }

    /// Gate logic at an explicit instant.
    ///
    /// A due pending event is admitted first; the incoming event is then
    /// admitted directly when the interval has elapsed since the last
    /// admission, otherwise it replaces the pending slot (only the most
    /// recent update per interval survives). Never blocks, never errors.
    pub fn append_throttled_at(&mut self, event: ActionEvent, now: Instant) {
        self.flush_at(now);
        if now.duration_since(self.last_admitted) >= self.interval {
            self.events.push(event);
            self.last_admitted = now;
        } else {
            self.pending = Some(event);
        }
    }

    /// Admit the pending event if its interval has elapsed.
    pub fn flush(&mut self) {
        self.flush_at(Instant::now());
    }

    /// Flush logic at an explicit instant.
    pub fn flush_at(&mut self, now: Instant) {
        if now.duration_since(self.last_admitted) >= self.interval {
            if let Some(pending) = self.pending.take() {
                self.events.push(pending);
                self.last_admitted += self.interval;
            }
        }
    }

    /// Admit the pending event unconditionally.
    ///
    /// Called before the trial-end boundary marker so the most recent update
    /// is never lost to the gate.
    pub fn drain_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.events.push(pending);
            self.last_admitted = Instant::now();
        }
    }

    /// Discard the pending event without admitting it. Clean abandonment of
    /// an interrupted trial.
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Read-only view of the admitted events, insertion order preserved.
    pub fn snapshot(&self) -> &[ActionEvent] {
        &self.events
    }

    /// First admitted event.
    pub fn first(&self) -> Option<&ActionEvent> {
        self.events.first()
    }

    /// Last admitted event.
    pub fn last(&self) -> Option<&ActionEvent> {
        self.events.last()
    }

    /// Number of admitted events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event has been admitted yet.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether an update is waiting in the gate.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for ThrottledEventLog {
    fn default() -> Self {
        Self::new()
    }
}
