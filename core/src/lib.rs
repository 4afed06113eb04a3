//! ATLAS Study Core
//!
//! Condition sequencing, tolerance matching, and throttled trial telemetry
//! for counterbalanced 3D-manipulation experiments.
//!
//! The crate is the non-visual core of a spatial-manipulation user study:
//! it tracks a participant through a counterbalanced sequence of
//! experimental conditions loaded from persisted tables, records a
//! rate-limited action log per trial, and scores how closely a manipulated
//! transform matches its target. Rendering, gesture recognition, audio, and
//! UI remain host responsibilities behind the collaborator traits in
//! [`storage`].
//!
//! # Design Principles
//!
//! - **Explicit composition**: no ambient singletons; `StudyFlow` owns every
//!   collaborator it uses and receives them at construction.
//! - **Fail-soft sessions**: storage and tracking failures degrade to
//!   documented defaults and logged warnings; a running study never crashes
//!   on a missing resource.
//! - **Single logical thread**: all operations are synchronous calls from
//!   the host's run loop; the throttle gate is clock-driven, so there are no
//!   internal timers to leak.
//!
//! # Example
//!
//! ```
//! use atlas_core::storage::{FixedViewer, MemoryStore, RecordingSink};
//! use atlas_core::study::StudyFlow;
//! use atlas_core::transform::{GestureKind, Transform};
//! use nalgebra::Vector3;
//!
//! let mut flow = StudyFlow::new(
//!     MemoryStore::new(),
//!     FixedViewer(Some(Vector3::new(0.0, 1.6, 0.0))),
//!     RecordingSink::default(),
//! );
//!
//! let target = Transform::at_translation(Vector3::new(0.0, 1.0, 0.0));
//! let trial = flow.begin_trial(GestureKind::Position, target);
//! trial.start(Transform::identity());
//! trial.end(Transform::at_translation(Vector3::new(0.0, 1.2, 0.0)));
//!
//! let outcome = flow.complete_trial().unwrap();
//! assert!(outcome.matched);
//! ```

pub mod condition;
pub mod event_log;
pub mod export;
pub mod matcher;
pub mod storage;
pub mod study;
pub mod task;
pub mod transform;

pub use condition::{ConditionError, ConditionSequencer, ConditionSpec, ConditionTable};
pub use event_log::{ActionEvent, ThrottledEventLog, DEFAULT_THROTTLE_INTERVAL};
pub use matcher::{MatchError, ToleranceMatcher};
pub use study::{StudyFlow, TrialOutcome, DEFAULT_MAX_REPETITION, PAGE_ADVANCE_DELAY};
pub use task::{TaskController, TrialError, TrialState};
pub use transform::{GestureKind, GesturePhase, Transform};
