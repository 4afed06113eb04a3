//! Persisted condition tables
//!
//! A condition table is a small CSV resource doubling as config and mutable
//! persisted state: a header `status,condition1,...,conditionN`, then one row
//! per counterbalancing order. Exactly one row carries `Active` at any time;
//! the flag rotates to the next row (wraparound) when a half-cycle ends.

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by condition-table loading, lookup, and persistence.
///
/// None of these abort a run: callers fall back to per-kind default
/// conditions and surface the problem to the study operator.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("condition resource '{resource}' unavailable: {reason}")]
    ResourceUnavailable { resource: String, reason: String },

    #[error("malformed condition row {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("no active row in condition table")]
    NoActiveRow,

    #[error("failed to persist condition table '{resource}': {reason}")]
    PersistFailure { resource: String, reason: String },
}

/// Whether a counterbalancing row is the one currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    Active,
    Inactive,
}

impl RowStatus {
    /// Column value written to the persisted table.
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Active => "Active",
            RowStatus::Inactive => "Inactive",
        }
    }

    fn parse(value: &str, line: usize) -> Result<Self, ConditionError> {
        match value {
            "Active" => Ok(RowStatus::Active),
            "Inactive" => Ok(RowStatus::Inactive),
            other => Err(ConditionError::MalformedRow {
                line,
                reason: format!("unknown status '{other}'"),
            }),
        }
    }
}

/// One counterbalancing order: a status flag and an ordered list of
/// single-letter condition codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRow {
    pub status: RowStatus,
    pub codes: Vec<char>,
}

/// An ordered condition table loaded from one persisted CSV resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionTable {
    rows: Vec<ConditionRow>,
    code_count: usize,
}

impl ConditionTable {
    /// Build a table from rows. All rows must share one non-zero code count.
    pub fn new(rows: Vec<ConditionRow>) -> Result<Self, ConditionError> {
        let code_count = rows.first().map(|r| r.codes.len()).unwrap_or(0);
        if !rows.is_empty() && code_count == 0 {
            return Err(ConditionError::MalformedRow {
                line: 2,
                reason: "row has no condition codes".into(),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            if row.codes.len() != code_count {
                return Err(ConditionError::MalformedRow {
                    line: i + 2,
                    reason: format!(
                        "expected {} condition codes, found {}",
                        code_count,
                        row.codes.len()
                    ),
                });
            }
        }
        Ok(Self { rows, code_count })
    }

    /// Table with no rows. Used as the degraded fallback when a condition
    /// resource cannot be loaded; every lookup then reports `NoActiveRow`.
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            code_count: 0,
        }
    }

    /// Parse the persisted CSV text.
    ///
    /// The header fixes the expected column count; any row deviating from it
    /// is a `MalformedRow`. Codes must be single ASCII letters.
    pub fn parse(text: &str) -> Result<Self, ConditionError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let expected_columns = reader
            .headers()
            .map_err(|e| ConditionError::MalformedRow {
                line: 1,
                reason: e.to_string(),
            })?
            .len();
        if expected_columns < 2 {
            return Err(ConditionError::MalformedRow {
                line: 1,
                reason: "header must list a status column and at least one condition".into(),
            });
        }

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let line = i + 2;
            let record = record.map_err(|e| ConditionError::MalformedRow {
                line,
                reason: e.to_string(),
            })?;
            if record.len() != expected_columns {
                return Err(ConditionError::MalformedRow {
                    line,
                    reason: format!(
                        "expected {} columns, found {}",
                        expected_columns,
                        record.len()
                    ),
                });
            }

            let status = RowStatus::parse(&record[0], line)?;
            let mut codes = Vec::with_capacity(expected_columns - 1);
            for field in record.iter().skip(1) {
                let mut chars = field.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_uppercase() => codes.push(c),
                    _ => {
                        return Err(ConditionError::MalformedRow {
                            line,
                            reason: format!("condition code '{field}' is not a single letter"),
                        })
                    }
                }
            }
            rows.push(ConditionRow { status, codes });
        }

        Self::new(rows)
    }

    /// Serialize back to the persisted CSV layout.
    ///
    /// Fields are statuses and single letters; no quoting can ever be
    /// required, so the text is assembled directly.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("status");
        for i in 1..=self.code_count {
            out.push_str(&format!(",condition{i}"));
        }
        out.push('\n');
        for row in &self.rows {
            out.push_str(row.status.as_str());
            for code in &row.codes {
                out.push(',');
                out.push(*code);
            }
            out.push('\n');
        }
        out
    }

    /// Number of condition codes per row.
    pub fn code_count(&self) -> usize {
        self.code_count
    }

    /// All rows, in table order.
    pub fn rows(&self) -> &[ConditionRow] {
        &self.rows
    }

    /// Index of the active row, if any.
    pub fn active_index(&self) -> Option<usize> {
        self.rows.iter().position(|r| r.status == RowStatus::Active)
    }

    /// The active row, or `NoActiveRow`.
    pub fn active_row(&self) -> Result<&ConditionRow, ConditionError> {
        self.active_index()
            .map(|i| &self.rows[i])
            .ok_or(ConditionError::NoActiveRow)
    }

    /// A copy of this table with the active flag rotated to the next row
    /// (wraparound). This is what gets persisted at the end of a half-cycle
    /// so the next run starts on the following counterbalancing order.
    pub fn rotated(&self) -> Result<ConditionTable, ConditionError> {
        let active = self.active_index().ok_or(ConditionError::NoActiveRow)?;
        let mut rotated = self.clone();
        rotated.rows[active].status = RowStatus::Inactive;
        let next = (active + 1) % rotated.rows.len();
        rotated.rows[next].status = RowStatus::Active;
        Ok(rotated)
    }

    /// Retire the active row in memory (mark it `Inactive`).
    ///
    /// Done after the rotated table has been persisted: the consumed row is
    /// spent for this run, and the rotated activation only applies to the
    /// next run's load.
    pub fn retire_active(&mut self) {
        if let Some(active) = self.active_index() {
            self.rows[active].status = RowStatus::Inactive;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "status,condition1,condition2,condition3,condition4\n\
                         Active,A,B,C,D\n\
                         Inactive,B,D,A,C\n\
                         Inactive,C,A,D,B\n";

    #[test]
    fn parses_well_formed_table() {
        let table = ConditionTable::parse(TABLE).unwrap();
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.code_count(), 4);
        assert_eq!(table.active_index(), Some(0));
        assert_eq!(table.active_row().unwrap().codes, vec!['A', 'B', 'C', 'D']);
    }

    #[test]
    fn rejects_column_count_mismatch() {
        let text = "status,condition1,condition2\nActive,A\n";
        let err = ConditionTable::parse(text).unwrap_err();
        assert!(matches!(err, ConditionError::MalformedRow { line: 2, .. }));
    }

    #[test]
    fn rejects_unknown_status() {
        let text = "status,condition1\nCurrent,A\n";
        let err = ConditionTable::parse(text).unwrap_err();
        assert!(matches!(err, ConditionError::MalformedRow { line: 2, .. }));
    }

    #[test]
    fn rejects_rows_without_codes() {
        let err = ConditionTable::new(vec![ConditionRow {
            status: RowStatus::Active,
            codes: Vec::new(),
        }])
        .unwrap_err();
        assert!(matches!(err, ConditionError::MalformedRow { .. }));
        // A rowless table stays valid: it is the degraded fallback.
        assert!(ConditionTable::new(Vec::new()).is_ok());
    }

    #[test]
    fn rejects_multi_letter_codes() {
        let text = "status,condition1\nActive,AB\n";
        assert!(ConditionTable::parse(text).is_err());
    }

    #[test]
    fn save_load_round_trip_rotates_active_by_one() {
        let table = ConditionTable::parse(TABLE).unwrap();
        let persisted = table.rotated().unwrap().to_csv();
        let reloaded = ConditionTable::parse(&persisted).unwrap();

        let actives: Vec<_> = reloaded
            .rows()
            .iter()
            .filter(|r| r.status == RowStatus::Active)
            .collect();
        assert_eq!(actives.len(), 1);
        assert_eq!(reloaded.active_index(), Some(1));
    }

    #[test]
    fn rotation_wraps_around_the_last_row() {
        let text = "status,condition1,condition2\n\
                    Inactive,A,B\n\
                    Active,B,A\n";
        let rotated = ConditionTable::parse(text).unwrap().rotated().unwrap();
        assert_eq!(rotated.active_index(), Some(0));
    }

    #[test]
    fn rotation_without_active_row_fails() {
        let text = "status,condition1\nInactive,A\n";
        let table = ConditionTable::parse(text).unwrap();
        assert!(matches!(
            table.rotated(),
            Err(ConditionError::NoActiveRow)
        ));
    }
}
