//! Transform snapshots and gesture taxonomy
//!
//! This module defines the immutable transform snapshot exchanged between the
//! host gesture layer and the study core, together with the gesture taxonomy
//! that selects matchers, condition tables, and lifecycle labels.
//!
//! A `Transform` is produced externally once per manipulation update and is
//! never mutated after creation; the core only reads it.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of an entity's pose at one manipulation update.
///
/// Scale components are assumed uniform in practice (targets broadcast a
/// scalar), but the full vector is preserved so exports stay lossless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation in world units.
    pub translation: Vector3<f32>,
    /// Rotation as a unit quaternion.
    pub rotation: UnitQuaternion<f32>,
    /// Per-axis scale factors.
    pub scale: Vector3<f32>,
}

impl Transform {
    /// Create a snapshot from explicit components.
    pub fn new(
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        scale: Vector3<f32>,
    ) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Identity pose at the origin with unit scale.
    pub fn identity() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Snapshot at a translation, identity rotation and unit scale.
    pub fn at_translation(translation: Vector3<f32>) -> Self {
        Self {
            translation,
            ..Self::identity()
        }
    }

    /// Snapshot with a scalar target scale broadcast to all three axes.
    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vector3::new(scale, scale, scale);
        self
    }

    /// Snapshot with the given rotation.
    pub fn with_rotation(mut self, rotation: UnitQuaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// The manipulation dimension a trial exercises.
///
/// Determines which tolerance matcher applies, which condition table drives
/// counterbalancing, and the lifecycle labels written to the action export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureKind {
    /// Translating the entity in space.
    Position,
    /// Rotating the entity about its center.
    Rotation,
    /// Uniformly resizing the entity.
    Scale,
}

impl GestureKind {
    /// All kinds, in protocol order.
    pub const ALL: [GestureKind; 3] = [
        GestureKind::Position,
        GestureKind::Rotation,
        GestureKind::Scale,
    ];

    /// Label written to the export's `type` column.
    pub fn label(&self) -> &'static str {
        match self {
            GestureKind::Position => "position",
            GestureKind::Rotation => "rotation",
            GestureKind::Scale => "scale",
        }
    }

    /// Status tag for the trial-start boundary event.
    pub fn start_tag(&self) -> &'static str {
        match self {
            GestureKind::Position => "position_start",
            GestureKind::Rotation => "rotation_start",
            GestureKind::Scale => "scale_start",
        }
    }

    /// Status tag for the trial-end boundary event.
    pub fn end_tag(&self) -> &'static str {
        match self {
            GestureKind::Position => "position_end",
            GestureKind::Rotation => "rotation_end",
            GestureKind::Scale => "scale_end",
        }
    }

    /// File stem of this kind's persisted condition table.
    pub fn condition_resource(&self) -> &'static str {
        match self {
            GestureKind::Position => "conditions_position",
            GestureKind::Rotation => "conditions_rotation",
            GestureKind::Scale => "conditions_scale",
        }
    }
}

/// Lifecycle phase of an action event within one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GesturePhase {
    /// First event of the trial; always recorded immediately.
    Start,
    /// Continuous manipulation update; subject to throttling.
    Update,
    /// Last event of the trial; always recorded immediately.
    End,
}

impl GesturePhase {
    /// Status tag written to the export for this phase of the given kind.
    pub fn tag(&self, kind: GestureKind) -> &'static str {
        match self {
            GesturePhase::Start => kind.start_tag(),
            GesturePhase::Update => "update",
            GesturePhase::End => kind.end_tag(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_scale_broadcasts_scalar() {
        let t = Transform::identity().with_uniform_scale(2.5);
        assert_eq!(t.scale, Vector3::new(2.5, 2.5, 2.5));
    }

    #[test]
    fn phase_tags_follow_kind() {
        assert_eq!(GesturePhase::Start.tag(GestureKind::Rotation), "rotation_start");
        assert_eq!(GesturePhase::End.tag(GestureKind::Scale), "scale_end");
        assert_eq!(GesturePhase::Update.tag(GestureKind::Position), "update");
    }

    #[test]
    fn condition_resources_are_distinct() {
        let names: std::collections::HashSet<_> = GestureKind::ALL
            .iter()
            .map(|k| k.condition_resource())
            .collect();
        assert_eq!(names.len(), 3);
    }
}
