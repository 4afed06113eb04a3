//! Counterbalanced experiment conditions
//!
//! Persisted condition tables (one CSV resource per gesture kind) and the
//! sequencer that walks them: current-condition lookup, cursor advancement,
//! active-row rotation at the end of a counterbalancing half-cycle, and
//! full-cycle completion detection.

pub mod sequencer;
pub mod table;

pub use self::sequencer::{
    ConditionCursor, ConditionSequencer, ConditionSpec, Direction, Distance, ScaleDirection,
    ScaleMagnitude, SpinDirection, SpinMagnitude, Technique,
};
pub use self::table::{ConditionError, ConditionRow, ConditionTable, RowStatus};
