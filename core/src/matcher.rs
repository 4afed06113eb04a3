//! Tolerance matching between observed and target transforms
//!
//! Pure geometric comparison: given an observed transform and a fixed target,
//! decide match/no-match within a tolerance and compute a scalar discrepancy
//! (lower is better, `f32::INFINITY` means "unknown").
//!
//! Three quantities are compared: translation distance, scale distance, and
//! view-compensated rotation angle. View compensation discounts the apparent
//! roll contributed purely by the participant's viewing angle, so that two
//! rotations that look the same from the current viewpoint are judged equal
//! even when their raw quaternions differ.

use log::warn;
use nalgebra::{UnitQuaternion, Vector3};
use thiserror::Error;

use crate::transform::Transform;

/// Default translation tolerance in world units.
pub const POSITION_TOLERANCE: f32 = 0.5;

/// Default scale-vector tolerance.
pub const SCALE_TOLERANCE: f32 = 0.5;

/// Default rotation tolerance: 15 degrees, in radians.
pub const ROTATION_TOLERANCE: f32 = 15.0 * std::f32::consts::PI / 180.0;

/// Below this length a direction is considered degenerate and view
/// compensation falls back to the identity correction.
const DIRECTION_EPSILON: f32 = 1.0e-6;

/// Matching errors. These never abort a trial; callers downgrade them to an
/// infinite discrepancy and log.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("viewer position unavailable; rotation cannot be view-compensated")]
    ViewerUnknown,
}

/// Tolerance matcher bound to one target transform.
///
/// A closed sum over the three geometric quantities; each trial owns exactly
/// one variant, selected by its gesture kind.
#[derive(Debug, Clone)]
pub enum ToleranceMatcher {
    /// Euclidean distance between translation vectors.
    Position { target: Transform, tolerance: f32 },
    /// Angular distance between view-compensated rotations.
    Rotation { target: Transform, tolerance: f32 },
    /// Euclidean distance between scale vectors.
    Scale { target: Transform, tolerance: f32 },
}

impl ToleranceMatcher {
    /// Position matcher with the default tolerance.
    pub fn position(target: Transform) -> Self {
        ToleranceMatcher::Position {
            target,
            tolerance: POSITION_TOLERANCE,
        }
    }

    /// Rotation matcher with the default tolerance.
    pub fn rotation(target: Transform) -> Self {
        ToleranceMatcher::Rotation {
            target,
            tolerance: ROTATION_TOLERANCE,
        }
    }

    /// Scale matcher with the default tolerance.
    pub fn scale(target: Transform) -> Self {
        ToleranceMatcher::Scale {
            target,
            tolerance: SCALE_TOLERANCE,
        }
    }

    /// Matcher for the given kind with its default tolerance.
    pub fn for_kind(kind: crate::transform::GestureKind, target: Transform) -> Self {
        use crate::transform::GestureKind;
        match kind {
            GestureKind::Position => Self::position(target),
            GestureKind::Rotation => Self::rotation(target),
            GestureKind::Scale => Self::scale(target),
        }
    }

    /// The target this matcher compares against.
    pub fn target(&self) -> &Transform {
        match self {
            ToleranceMatcher::Position { target, .. }
            | ToleranceMatcher::Rotation { target, .. }
            | ToleranceMatcher::Scale { target, .. } => target,
        }
    }

    /// The configured tolerance.
    pub fn tolerance(&self) -> f32 {
        match self {
            ToleranceMatcher::Position { tolerance, .. }
            | ToleranceMatcher::Rotation { tolerance, .. }
            | ToleranceMatcher::Scale { tolerance, .. } => *tolerance,
        }
    }

    /// Scalar discrepancy between `observed` and the target.
    ///
    /// The rotation variant requires the current viewer position for view
    /// compensation; `Err(ViewerUnknown)` is returned when it is unavailable.
    pub fn try_accuracy(
        &self,
        observed: &Transform,
        viewer: Option<Vector3<f32>>,
    ) -> Result<f32, MatchError> {
        match self {
            ToleranceMatcher::Position { target, .. } => {
                Ok((observed.translation - target.translation).norm())
            }
            ToleranceMatcher::Scale { target, .. } => {
                Ok((observed.scale - target.scale).norm())
            }
            ToleranceMatcher::Rotation { target, .. } => {
                let viewer = viewer.ok_or(MatchError::ViewerUnknown)?;
                let q_observed =
                    view_compensated(&observed.rotation, &observed.translation, &viewer);
                let q_target = view_compensated(&target.rotation, &target.translation, &viewer);
                Ok(angle_between(&q_observed, &q_target))
            }
        }
    }

    /// Discrepancy with failure downgraded to `f32::INFINITY`.
    ///
    /// A trial with unknown accuracy is never marked as matched, so infinity
    /// is the safe degraded value.
    pub fn accuracy(&self, observed: &Transform, viewer: Option<Vector3<f32>>) -> f32 {
        match self.try_accuracy(observed, viewer) {
            Ok(value) => value,
            Err(err) => {
                warn!("accuracy unavailable: {err}");
                f32::INFINITY
            }
        }
    }

    /// Whether `observed` matches the target within tolerance.
    pub fn is_matching(&self, observed: &Transform, viewer: Option<Vector3<f32>>) -> bool {
        self.accuracy(observed, viewer) <= self.tolerance()
    }
}

/// Prepend the viewing-angle correction to a raw rotation.
///
/// The correction is the minimal rotation taking the direction
/// transform-to-viewer onto its projection into the vertical/depth plane
/// (horizontal component zeroed). Degenerate directions (viewer on the
/// transform, or exactly on the horizontal axis) yield the identity
/// correction, as does the antipodal case where no minimal rotation exists.
fn view_compensated(
    rotation: &UnitQuaternion<f32>,
    translation: &Vector3<f32>,
    viewer: &Vector3<f32>,
) -> UnitQuaternion<f32> {
    let toward_viewer = viewer - translation;
    if toward_viewer.norm() <= DIRECTION_EPSILON {
        return *rotation;
    }
    let direction = toward_viewer.normalize();

    let mut projected = direction;
    projected.x = 0.0;
    if projected.norm() <= DIRECTION_EPSILON {
        return *rotation;
    }
    let projected = projected.normalize();

    let correction = UnitQuaternion::rotation_between(&direction, &projected)
        .unwrap_or_else(UnitQuaternion::identity);
    correction * rotation
}

/// Angle in radians, range [0, π], between two rotations.
///
/// `2·acos(clamp(|q1·q2|, -1, 1))` over the normalized coordinate vectors;
/// the absolute value makes the result robust to quaternion double cover
/// (q and -q represent the same rotation).
pub fn angle_between(q1: &UnitQuaternion<f32>, q2: &UnitQuaternion<f32>) -> f32 {
    let dot = q1.coords.normalize().dot(&q2.coords.normalize());
    2.0 * dot.abs().clamp(-1.0, 1.0).acos()
}
