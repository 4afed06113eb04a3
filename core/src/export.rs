//! Action export serialization
//!
//! Flattens a trial's recorded events into the run's append-only CSV export:
//! one header for the whole run, then one row per action event. Rotations are
//! stored as four components (imaginary x,y,z plus real w), scale as three,
//! timestamps as ISO-8601 UTC.

use csv::WriterBuilder;
use thiserror::Error;
use uuid::Uuid;

use crate::event_log::ActionEvent;
use crate::storage::ResourceStore;
use crate::transform::Transform;

/// Export-side failures. Persist failures are fail-soft: the in-memory trial
/// record is retained so a later manual export stays possible.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize export row: {0}")]
    Serialize(String),

    #[error("failed to persist export row: {0}")]
    Persist(String),
}

/// Column names of the run export, in order.
pub const EXPORT_COLUMNS: [&str; 25] = [
    "TaskID",
    "date",
    "type",
    "status",
    "original_translation_x",
    "original_translation_y",
    "original_translation_z",
    "original_rotation_x",
    "original_rotation_y",
    "original_rotation_z",
    "original_rotation_w",
    "original_scale_x",
    "original_scale_y",
    "original_scale_z",
    "target_translation_x",
    "target_translation_y",
    "target_translation_z",
    "target_rotation_x",
    "target_rotation_y",
    "target_rotation_z",
    "target_rotation_w",
    "target_scale_x",
    "target_scale_y",
    "target_scale_z",
    "accuracy_result",
];

/// Serializes trials into the run's single export resource.
///
/// Emits the header exactly once per run, lazily before the first row.
#[derive(Debug, Default)]
pub struct ActionExporter {
    header_emitted: bool,
}

impl ActionExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist every event of one trial, each row carrying the trial's final
    /// accuracy. Rows are handed to the store one at a time, append-only.
    pub fn persist_trial(
        &mut self,
        store: &mut dyn ResourceStore,
        task_id: Uuid,
        events: &[ActionEvent],
        accuracy: f32,
    ) -> Result<(), ExportError> {
        if !self.header_emitted {
            let header = csv_line(&EXPORT_COLUMNS)?;
            store
                .persist_record(&header)
                .map_err(|e| ExportError::Persist(e.to_string()))?;
            self.header_emitted = true;
        }
        for event in events {
            let row = event_row(task_id, event, accuracy)?;
            store
                .persist_record(&row)
                .map_err(|e| ExportError::Persist(e.to_string()))?;
        }
        Ok(())
    }
}

/// One export row for an action event.
pub fn event_row(
    task_id: Uuid,
    event: &ActionEvent,
    accuracy: f32,
) -> Result<String, ExportError> {
    let mut fields = vec![
        task_id.to_string(),
        event.timestamp.to_rfc3339(),
        event.kind.label().to_owned(),
        event.status_tag().to_owned(),
    ];
    push_transform(&mut fields, &event.observed);
    push_transform(&mut fields, &event.target);
    fields.push(accuracy.to_string());
    csv_line(&fields)
}

fn push_transform(fields: &mut Vec<String>, transform: &Transform) {
    let t = &transform.translation;
    fields.extend([t.x.to_string(), t.y.to_string(), t.z.to_string()]);
    // Quaternion coordinates are stored (i, j, k, w); the export keeps the
    // same order, real part last.
    let q = transform.rotation.coords;
    fields.extend([
        q.x.to_string(),
        q.y.to_string(),
        q.z.to_string(),
        q.w.to_string(),
    ]);
    let s = &transform.scale;
    fields.extend([s.x.to_string(), s.y.to_string(), s.z.to_string()]);
}

fn csv_line<S: AsRef<[u8]>>(fields: &[S]) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(|e| ExportError::Serialize(e.to_string()))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Serialize(e.to_string()))?;
    let mut line =
        String::from_utf8(bytes).map_err(|e| ExportError::Serialize(e.to_string()))?;
    // persist_record appends one logical row; strip the writer's terminator.
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}
