//! Collaborator interfaces to the host application
//!
//! The study core never touches rendering, audio, or the filesystem
//! directly. The host implements these traits and the composition root
//! injects them; everything here is an explicit dependency, not an ambient
//! singleton.
//!
//! In-memory implementations live alongside the traits: they back the test
//! suite and double as a reference for host implementors.

use std::collections::HashMap;

use nalgebra::Vector3;
use thiserror::Error;

/// Failures reported by the host's storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource '{0}' not found")]
    NotFound(String),

    #[error("storage i/o failure: {0}")]
    Io(String),
}

/// Tabular-resource and record persistence, implemented by the host.
pub trait ResourceStore {
    /// Read a named text resource (e.g. a condition table).
    fn read_resource(&self, name: &str) -> Result<String, StoreError>;

    /// Rewrite a named text resource in full.
    fn write_resource(&mut self, name: &str, contents: &str) -> Result<(), StoreError>;

    /// Append one serialized row to the run's action export.
    fn persist_record(&mut self, row: &str) -> Result<(), StoreError>;
}

/// Source of the participant's current head/viewer position.
///
/// Nullable by design: tracking can drop out mid-trial, and the rotation
/// matcher degrades to an unknown accuracy rather than failing the run.
pub trait ViewerPose {
    fn viewer_position(&self) -> Option<Vector3<f32>>;
}

/// Fire-and-forget feedback channel into the host's presentation layer.
pub trait FeedbackSink {
    fn play_feedback_sound(&mut self, name: &str);
}

/// In-memory `ResourceStore` used by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    resources: HashMap<String, String>,
    records: Vec<String>,
    /// When set, every write fails. Exercises the fail-soft persistence
    /// paths.
    pub fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a named resource.
    pub fn insert_resource(&mut self, name: &str, contents: &str) {
        self.resources.insert(name.to_owned(), contents.to_owned());
    }

    /// Rows handed to `persist_record`, in order.
    pub fn records(&self) -> &[String] {
        &self.records
    }
}

impl ResourceStore for MemoryStore {
    fn read_resource(&self, name: &str) -> Result<String, StoreError> {
        self.resources
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_owned()))
    }

    fn write_resource(&mut self, name: &str, contents: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io("writes disabled".into()));
        }
        self.resources.insert(name.to_owned(), contents.to_owned());
        Ok(())
    }

    fn persist_record(&mut self, row: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io("writes disabled".into()));
        }
        self.records.push(row.to_owned());
        Ok(())
    }
}

/// Viewer pose fixed at construction. Tests and degraded-tracking stubs.
#[derive(Debug, Clone, Copy)]
pub struct FixedViewer(pub Option<Vector3<f32>>);

impl ViewerPose for FixedViewer {
    fn viewer_position(&self) -> Option<Vector3<f32>> {
        self.0
    }
}

/// Feedback sink that records requested sound names.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub played: Vec<String>,
}

impl FeedbackSink for RecordingSink {
    fn play_feedback_sound(&mut self, name: &str) {
        self.played.push(name.to_owned());
    }
}
