//! Condition sequencing for one gesture kind
//!
//! Deterministic, persisted counterbalancing across experiment runs. One
//! sequencer exists per gesture kind; all three share this generic engine,
//! parameterized only by the per-kind mapping from single-letter condition
//! codes to semantic tuples.
//!
//! Lifecycle: `Idle(cursor = -1)` → lookups via [`ConditionSequencer::current`]
//! → advances walk the active row's codes → stepping past the last code
//! completes the half-cycle, rotates the persisted active row to the next
//! counterbalancing order, and resets the cursor to the unset sentinel.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::condition::table::{ConditionError, ConditionTable};
use crate::storage::ResourceStore;
use crate::transform::GestureKind;

/// Cursor sentinel: no condition consumed yet in this cycle.
pub const CURSOR_UNSET: i32 = -1;

/// Gesture technique compared by the study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Technique {
    /// Direct hand manipulation of the entity.
    DirectTouch,
    /// Indirect gaze-and-pinch manipulation.
    GazePinch,
}

impl Technique {
    pub fn label(&self) -> &'static str {
        match self {
            Technique::DirectTouch => "direct_touch",
            Technique::GazePinch => "gaze_pinch",
        }
    }
}

/// Target distance factor for position trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Near,
    Far,
}

/// Target displacement direction for position trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Target spin direction for rotation trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinDirection {
    Clockwise,
    CounterClockwise,
}

/// Target spin magnitude for rotation trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinMagnitude {
    /// Quarter turn (90 degrees).
    Quarter,
    /// Half turn (180 degrees).
    Half,
}

/// Target resize direction for scale trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleDirection {
    Enlarge,
    Shrink,
}

/// Target resize magnitude for scale trials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMagnitude {
    Subtle,
    Strong,
}

/// Semantic tuple one condition code maps to, per gesture kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionSpec {
    Position {
        distance: Distance,
        direction: Direction,
    },
    Rotation {
        direction: SpinDirection,
        magnitude: SpinMagnitude,
    },
    Scale {
        direction: ScaleDirection,
        magnitude: ScaleMagnitude,
    },
}

impl ConditionSpec {
    /// Exhaustive code-to-tuple mapping for one kind. `None` for letters
    /// outside the kind's code set.
    pub fn for_code(kind: GestureKind, code: char) -> Option<ConditionSpec> {
        match kind {
            GestureKind::Position => {
                let (distance, direction) = match code {
                    'A' => (Distance::Near, Direction::Horizontal),
                    'B' => (Distance::Near, Direction::Vertical),
                    'C' => (Distance::Far, Direction::Horizontal),
                    'D' => (Distance::Far, Direction::Vertical),
                    _ => return None,
                };
                Some(ConditionSpec::Position {
                    distance,
                    direction,
                })
            }
            GestureKind::Rotation => {
                let (direction, magnitude) = match code {
                    'A' => (SpinDirection::Clockwise, SpinMagnitude::Quarter),
                    'B' => (SpinDirection::Clockwise, SpinMagnitude::Half),
                    'C' => (SpinDirection::CounterClockwise, SpinMagnitude::Quarter),
                    'D' => (SpinDirection::CounterClockwise, SpinMagnitude::Half),
                    _ => return None,
                };
                Some(ConditionSpec::Rotation {
                    direction,
                    magnitude,
                })
            }
            GestureKind::Scale => {
                let (direction, magnitude) = match code {
                    'A' => (ScaleDirection::Enlarge, ScaleMagnitude::Subtle),
                    'B' => (ScaleDirection::Enlarge, ScaleMagnitude::Strong),
                    'C' => (ScaleDirection::Shrink, ScaleMagnitude::Subtle),
                    'D' => (ScaleDirection::Shrink, ScaleMagnitude::Strong),
                    _ => return None,
                };
                Some(ConditionSpec::Scale {
                    direction,
                    magnitude,
                })
            }
        }
    }

    /// Documented fallback when no active row is available: the kind's
    /// near/horizontal-equivalent tuple. Keeps the experiment running in a
    /// degraded-but-safe mode.
    pub fn default_for(kind: GestureKind) -> ConditionSpec {
        match kind {
            GestureKind::Position => ConditionSpec::Position {
                distance: Distance::Near,
                direction: Direction::Horizontal,
            },
            GestureKind::Rotation => ConditionSpec::Rotation {
                direction: SpinDirection::Clockwise,
                magnitude: SpinMagnitude::Quarter,
            },
            GestureKind::Scale => ConditionSpec::Scale {
                direction: ScaleDirection::Enlarge,
                magnitude: ScaleMagnitude::Subtle,
            },
        }
    }
}

/// Position in the active row's code list, plus the completion flag.
///
/// Invariant: `index` is either the unset sentinel or within
/// `[0, code_count - 1]`; stepping past the last index completes the cycle
/// and resets the index to unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionCursor {
    index: i32,
    completed: bool,
}

impl ConditionCursor {
    pub fn unset() -> Self {
        Self {
            index: CURSOR_UNSET,
            completed: false,
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn is_unset(&self) -> bool {
        self.index == CURSOR_UNSET
    }

    pub fn completed(&self) -> bool {
        self.completed
    }
}

impl Default for ConditionCursor {
    fn default() -> Self {
        Self::unset()
    }
}

/// Counterbalancing sequencer for one gesture kind.
///
/// Owns its condition table and cursor exclusively; persistence goes through
/// the injected [`ResourceStore`] at the half-cycle checkpoint only.
#[derive(Debug)]
pub struct ConditionSequencer {
    kind: GestureKind,
    resource: &'static str,
    table: ConditionTable,
    cursor: ConditionCursor,
    ordering: [Technique; 2],
    /// De-duplication guard carried by the position sequencer only: the last
    /// row index actually handed out by a lookup.
    last_used_safe_index: Option<i32>,
    /// Cache of the most recently resolved tuple, read by the host for
    /// display and logging only.
    current_spec: Option<ConditionSpec>,
}

impl ConditionSequencer {
    /// Load the kind's condition table from the store.
    ///
    /// The table's row parity decides the technique presentation order for
    /// this run: an even active-row index presents direct touch first, an
    /// odd one gaze-pinch first. The flag is baked in here and never
    /// recomputed.
    pub fn load(kind: GestureKind, store: &dyn ResourceStore) -> Result<Self, ConditionError> {
        let resource = kind.condition_resource();
        let text =
            store
                .read_resource(resource)
                .map_err(|e| ConditionError::ResourceUnavailable {
                    resource: resource.to_owned(),
                    reason: e.to_string(),
                })?;
        let table = ConditionTable::parse(&text)?;
        Self::validate_codes(kind, &table)?;
        Ok(Self::from_table(kind, table))
    }

    /// Build a sequencer around an already-parsed table.
    pub fn from_table(kind: GestureKind, table: ConditionTable) -> Self {
        let ordering = match table.active_index() {
            Some(i) if i % 2 == 1 => [Technique::GazePinch, Technique::DirectTouch],
            _ => [Technique::DirectTouch, Technique::GazePinch],
        };
        Self {
            kind,
            resource: kind.condition_resource(),
            table,
            cursor: ConditionCursor::unset(),
            ordering,
            last_used_safe_index: None,
            current_spec: None,
        }
    }

    fn validate_codes(kind: GestureKind, table: &ConditionTable) -> Result<(), ConditionError> {
        for (i, row) in table.rows().iter().enumerate() {
            for code in &row.codes {
                if ConditionSpec::for_code(kind, *code).is_none() {
                    return Err(ConditionError::MalformedRow {
                        line: i + 2,
                        reason: format!("code '{code}' has no {} semantics", kind.label()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Current condition: the run's technique ordering plus the semantic
    /// tuple at the (clamped) cursor in the active row.
    ///
    /// `NoActiveRow` is not fatal here: the caller must be able to continue
    /// the session, so the documented per-kind default tuple is returned and
    /// the failure is logged.
    pub fn current(&mut self) -> ([Technique; 2], ConditionSpec) {
        match self.try_current() {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    "{} sequencer falling back to default condition: {err}",
                    self.kind.label()
                );
                let spec = ConditionSpec::default_for(self.kind);
                self.current_spec = Some(spec);
                (self.ordering, spec)
            }
        }
    }

    /// Fallible variant of [`current`](Self::current).
    pub fn try_current(&mut self) -> Result<([Technique; 2], ConditionSpec), ConditionError> {
        let row = self.table.active_row()?;
        let last_index = (row.codes.len() - 1) as i32;
        let mut index = self.cursor.index.clamp(0, last_index);

        // Position-only de-duplication: if the clamped index equals the one
        // handed out by the previous lookup, bump it by one (clamped) so a
        // repeated lookup inside one trial never re-selects the same code.
        // Rotation and scale sequencers skip this guard, matching the
        // observed per-kind behavior.
        if self.kind == GestureKind::Position && self.last_used_safe_index == Some(index) {
            index = (index + 1).clamp(0, last_index);
        }
        let code = row.codes[index as usize];

        if self.kind == GestureKind::Position {
            self.last_used_safe_index = Some(index);
        }

        // Codes were validated at load; an unmapped letter can only mean the
        // table was swapped out from under us.
        let spec = ConditionSpec::for_code(self.kind, code).ok_or_else(|| {
            ConditionError::MalformedRow {
                line: 0,
                reason: format!("code '{code}' has no {} semantics", self.kind.label()),
            }
        })?;
        self.current_spec = Some(spec);
        Ok((self.ordering, spec))
    }

    /// Step to the next condition code.
    ///
    /// Stepping past the last code ends the counterbalancing half-cycle: the
    /// rotated table (active flag moved to the next row, wraparound) is
    /// persisted in full for the next run, the consumed row is retired in
    /// memory, and the cursor resets to unset with `completed` raised.
    /// Returns whether the cycle completed.
    pub fn advance(&mut self, store: &mut dyn ResourceStore) -> Result<bool, ConditionError> {
        let code_count = self.table.code_count() as i32;
        let next = self.cursor.index.max(0) + 1;
        if next < code_count {
            self.cursor.index = next;
            return Ok(false);
        }

        let rotated = self.table.rotated()?;
        store
            .write_resource(self.resource, &rotated.to_csv())
            .map_err(|e| ConditionError::PersistFailure {
                resource: self.resource.to_owned(),
                reason: e.to_string(),
            })?;
        self.table.retire_active();
        self.cursor = ConditionCursor {
            index: CURSOR_UNSET,
            completed: true,
        };
        self.last_used_safe_index = None;
        Ok(true)
    }

    /// Whether the full condition cycle has been consumed.
    pub fn is_cycle_complete(&self) -> bool {
        self.cursor.completed
    }

    /// Raw cursor state.
    pub fn cursor(&self) -> ConditionCursor {
        self.cursor
    }

    /// The run's technique presentation order.
    pub fn ordering(&self) -> [Technique; 2] {
        self.ordering
    }

    /// Most recently resolved tuple, for display/logging.
    pub fn current_spec(&self) -> Option<ConditionSpec> {
        self.current_spec
    }

    pub fn kind(&self) -> GestureKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const TABLE: &str = "status,condition1,condition2,condition3,condition4\n\
                         Active,A,B,C,D\n\
                         Inactive,B,D,A,C\n\
                         Inactive,C,A,D,B\n";

    fn seeded_store(kind: GestureKind) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_resource(kind.condition_resource(), TABLE);
        store
    }

    #[test]
    fn load_requires_the_resource() {
        let store = MemoryStore::new();
        assert!(matches!(
            ConditionSequencer::load(GestureKind::Position, &store),
            Err(ConditionError::ResourceUnavailable { .. })
        ));
    }

    #[test]
    fn load_rejects_codes_without_semantics() {
        let mut store = MemoryStore::new();
        store.insert_resource(
            GestureKind::Scale.condition_resource(),
            "status,condition1\nActive,Z\n",
        );
        assert!(matches!(
            ConditionSequencer::load(GestureKind::Scale, &store),
            Err(ConditionError::MalformedRow { .. })
        ));
    }

    #[test]
    fn full_cycle_completes_after_code_count_advances() {
        let mut store = seeded_store(GestureKind::Rotation);
        let mut seq = ConditionSequencer::load(GestureKind::Rotation, &store).unwrap();
        assert!(seq.cursor().is_unset());

        for _ in 0..3 {
            assert!(!seq.advance(&mut store).unwrap());
            assert!(!seq.is_cycle_complete());
        }
        assert!(seq.advance(&mut store).unwrap());
        assert!(seq.is_cycle_complete());
        assert!(seq.cursor().is_unset());
    }

    #[test]
    fn completion_rotates_the_persisted_active_row() {
        let mut store = seeded_store(GestureKind::Rotation);
        let mut seq = ConditionSequencer::load(GestureKind::Rotation, &store).unwrap();
        for _ in 0..4 {
            seq.advance(&mut store).unwrap();
        }

        let persisted = store
            .read_resource(GestureKind::Rotation.condition_resource())
            .unwrap();
        let reloaded = ConditionTable::parse(&persisted).unwrap();
        assert_eq!(reloaded.active_index(), Some(1));
    }

    #[test]
    fn current_after_completion_falls_back_to_default() {
        let mut store = seeded_store(GestureKind::Rotation);
        let mut seq = ConditionSequencer::load(GestureKind::Rotation, &store).unwrap();
        for _ in 0..4 {
            seq.advance(&mut store).unwrap();
        }

        // The consumed row was retired in memory, so the lookup degrades to
        // the documented default tuple.
        let (_, spec) = seq.current();
        assert_eq!(spec, ConditionSpec::default_for(GestureKind::Rotation));
    }

    #[test]
    fn current_walks_the_active_row_codes() {
        let mut store = seeded_store(GestureKind::Scale);
        let mut seq = ConditionSequencer::load(GestureKind::Scale, &store).unwrap();

        let (_, first) = seq.try_current().unwrap();
        assert_eq!(first, ConditionSpec::for_code(GestureKind::Scale, 'A').unwrap());

        seq.advance(&mut store).unwrap();
        let (_, second) = seq.try_current().unwrap();
        assert_eq!(second, ConditionSpec::for_code(GestureKind::Scale, 'B').unwrap());
    }

    #[test]
    fn position_lookup_deduplicates_repeated_index() {
        let mut store = seeded_store(GestureKind::Position);
        let mut seq = ConditionSequencer::load(GestureKind::Position, &store).unwrap();

        let (_, first) = seq.try_current().unwrap();
        let (_, again) = seq.try_current().unwrap();
        assert_eq!(first, ConditionSpec::for_code(GestureKind::Position, 'A').unwrap());
        assert_eq!(again, ConditionSpec::for_code(GestureKind::Position, 'B').unwrap());
    }

    #[test]
    fn rotation_lookup_does_not_deduplicate() {
        let mut store = seeded_store(GestureKind::Rotation);
        let mut seq = ConditionSequencer::load(GestureKind::Rotation, &store).unwrap();

        let (_, first) = seq.try_current().unwrap();
        let (_, again) = seq.try_current().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn failed_persistence_surfaces_as_persist_failure() {
        let mut store = seeded_store(GestureKind::Position);
        let mut seq = ConditionSequencer::load(GestureKind::Position, &store).unwrap();
        for _ in 0..3 {
            seq.advance(&mut store).unwrap();
        }
        store.fail_writes = true;
        assert!(matches!(
            seq.advance(&mut store),
            Err(ConditionError::PersistFailure { .. })
        ));
    }

    #[test]
    fn technique_ordering_follows_active_row_parity() {
        let mut store = seeded_store(GestureKind::Position);
        let seq = ConditionSequencer::load(GestureKind::Position, &store).unwrap();
        assert_eq!(seq.ordering(), [Technique::DirectTouch, Technique::GazePinch]);

        store.insert_resource(
            GestureKind::Position.condition_resource(),
            "status,condition1,condition2,condition3,condition4\n\
             Inactive,A,B,C,D\n\
             Active,B,D,A,C\n",
        );
        let seq = ConditionSequencer::load(GestureKind::Position, &store).unwrap();
        assert_eq!(seq.ordering(), [Technique::GazePinch, Technique::DirectTouch]);
    }
}
