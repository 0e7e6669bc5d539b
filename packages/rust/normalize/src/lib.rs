//! Schema normalizer: clean extracted records, remap them into the
//! destination schema, and resolve destination identifiers.
//!
//! This stage is pure data transformation — it performs no I/O beyond the
//! already-loaded identifier table and the explicit CSV entry points in
//! [`output`]. It never fails the pipeline: per-record resolution failures
//! are recorded in the result, not thrown.

mod output;

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use rankpipe_shared::{NormalizedRecord, PipelineError, PlayerRecord, Result};

pub use output::{
    raw_csv_string, rankings_csv_string, read_rankings_csv, read_rankings_from_reader,
    write_rankings_csv,
};

// ---------------------------------------------------------------------------
// Identifier table
// ---------------------------------------------------------------------------

/// One row of the external identifier reference table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierRecord {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Position")]
    pub position: String,
}

/// The destination system's player reference table, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct IdentifierTable {
    entries: Vec<IdentifierRecord>,
}

impl IdentifierTable {
    pub fn new(entries: Vec<IdentifierRecord>) -> Self {
        Self { entries }
    }

    /// Load from a CSV file with header `ID,Name,Position`.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let entries = csv_reader
            .deserialize()
            .collect::<std::result::Result<Vec<IdentifierRecord>, _>>()
            .map_err(|e| PipelineError::Csv(e.to_string()))?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a player to a destination identifier.
    ///
    /// A match is an entry whose name contains `name` as a case-insensitive
    /// substring and whose position matches exactly. With multiple matches
    /// the first entry in table order wins — deterministic by construction,
    /// deliberately not a best-match search.
    pub fn resolve(&self, name: &str, position: &str) -> Option<&IdentifierRecord> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|entry| entry.position == position && entry.name.to_lowercase().contains(&needle))
    }
}

// ---------------------------------------------------------------------------
// normalize
// ---------------------------------------------------------------------------

/// Output of normalization: destination-shaped records in input order, plus
/// the names that found no identifier.
#[derive(Debug, Clone, Default)]
pub struct NormalizeResult {
    pub records: Vec<NormalizedRecord>,
    pub unresolved: Vec<String>,
}

/// Clean and reshape extracted records into the destination schema.
///
/// String fields are trimmed (idempotent), numeric fields coerce with `None`
/// as the explicit missing sentinel, and output row order equals input row
/// order.
#[instrument(skip_all, fields(records = records.len(), identifiers = identifiers.len()))]
pub fn normalize(records: &[PlayerRecord], identifiers: &IdentifierTable) -> NormalizeResult {
    let mut normalized = Vec::with_capacity(records.len());
    let mut unresolved = Vec::new();

    for record in records {
        let name = record.name.trim();
        let position = record.position.trim();

        let id = identifiers
            .resolve(name, position)
            .map(|entry| entry.id.clone());
        if id.is_none() {
            unresolved.push(name.to_string());
        }

        normalized.push(NormalizedRecord {
            id,
            name: name.to_string(),
            position: position.to_string(),
            adp: parse_decimal(&record.adp),
            team: record.team.trim().to_string(),
            rank: parse_integer(&record.rank),
            position_rank: parse_integer(&record.position_rank),
            adp_position_rank: parse_integer(&record.adp_position_rank),
            adp_diff: parse_decimal(&record.adp_diff),
        });
    }

    if !unresolved.is_empty() {
        warn!(count = unresolved.len(), "players had no identifier match");
    }

    NormalizeResult {
        records: normalized,
        unresolved,
    }
}

/// Coerce a cell to an integer. Sources sometimes render whole numbers as
/// decimals ("7.0"), so an integral float also counts.
fn parse_integer(cell: &str) -> Option<i64> {
    let cleaned = cell.trim();
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(value) = cleaned.parse::<i64>() {
        return Some(value);
    }
    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Some(value as i64),
        _ => None,
    }
}

fn parse_decimal(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chase() -> PlayerRecord {
        PlayerRecord {
            name: "Ja'Marr Chase".into(),
            team: "CIN".into(),
            position: "WR".into(),
            rank: "1".into(),
            position_rank: "1".into(),
            adp: "1.2".into(),
            adp_position_rank: "1".into(),
            adp_diff: "-0.2".into(),
        }
    }

    fn table() -> IdentifierTable {
        IdentifierTable::new(vec![
            IdentifierRecord {
                id: "123".into(),
                name: "Ja'Marr Chase".into(),
                position: "WR".into(),
            },
            IdentifierRecord {
                id: "456".into(),
                name: "Bijan Robinson".into(),
                position: "RB".into(),
            },
        ])
    }

    #[test]
    fn surname_resolves_via_substring_match() {
        let record = PlayerRecord {
            name: "Chase".into(),
            position: "WR".into(),
            ..PlayerRecord::default()
        };

        let result = normalize(&[record], &table());
        assert_eq!(result.records[0].id.as_deref(), Some("123"));
        assert!(result.unresolved.is_empty());
    }

    #[test]
    fn position_must_match_exactly() {
        let record = PlayerRecord {
            name: "Chase".into(),
            position: "RB".into(),
            ..PlayerRecord::default()
        };

        let result = normalize(&[record], &table());
        assert_eq!(result.records[0].id, None);
        assert_eq!(result.unresolved, vec!["Chase".to_string()]);
    }

    #[test]
    fn ambiguous_match_takes_first_table_entry_deterministically() {
        let ambiguous = IdentifierTable::new(vec![
            IdentifierRecord {
                id: "11".into(),
                name: "Michael Thomas".into(),
                position: "WR".into(),
            },
            IdentifierRecord {
                id: "22".into(),
                name: "Mike Thomas".into(),
                position: "WR".into(),
            },
        ]);
        let record = PlayerRecord {
            name: "Thomas".into(),
            position: "WR".into(),
            ..PlayerRecord::default()
        };

        for _ in 0..3 {
            let result = normalize(std::slice::from_ref(&record), &ambiguous);
            assert_eq!(result.records[0].id.as_deref(), Some("11"));
        }
    }

    #[test]
    fn empty_name_never_matches() {
        let record = PlayerRecord {
            name: "   ".into(),
            position: "WR".into(),
            ..PlayerRecord::default()
        };

        let result = normalize(&[record], &table());
        assert_eq!(result.records[0].id, None);
    }

    #[test]
    fn unparsable_numbers_become_missing_not_zero() {
        let mut record = chase();
        record.adp = "N/A".into();
        record.position_rank = "—".into();
        record.rank = "0".into();

        let result = normalize(&[record], &table());
        let normalized = &result.records[0];
        assert_eq!(normalized.adp, None);
        assert_eq!(normalized.position_rank, None);
        // A literal zero is data, not a missing value.
        assert_eq!(normalized.rank, Some(0));
    }

    #[test]
    fn integral_floats_coerce_to_integers() {
        let mut record = chase();
        record.position_rank = "7.0".into();

        let result = normalize(&[record], &table());
        assert_eq!(result.records[0].position_rank, Some(7));
    }

    #[test]
    fn output_order_equals_input_order() {
        let mut second = chase();
        second.name = "Bijan Robinson".into();
        second.position = "RB".into();
        second.rank = "2".into();

        let result = normalize(&[chase(), second], &table());
        assert_eq!(result.records[0].name, "Ja'Marr Chase");
        assert_eq!(result.records[1].name, "Bijan Robinson");
        assert_eq!(result.records[1].id.as_deref(), Some("456"));
    }

    #[test]
    fn normalization_is_idempotent() {
        let first = normalize(&[chase()], &table());

        // Feed the normalized output back through as if extracted again.
        let reextracted: Vec<PlayerRecord> = first
            .records
            .iter()
            .map(|r| PlayerRecord {
                name: r.name.clone(),
                team: r.team.clone(),
                position: r.position.clone(),
                rank: r.rank.map(|v| v.to_string()).unwrap_or_default(),
                position_rank: r.position_rank.map(|v| v.to_string()).unwrap_or_default(),
                adp: r.adp.map(|v| v.to_string()).unwrap_or_default(),
                adp_position_rank: r
                    .adp_position_rank
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                adp_diff: r.adp_diff.map(|v| v.to_string()).unwrap_or_default(),
            })
            .collect();

        let second = normalize(&reextracted, &table());
        assert_eq!(first.records, second.records);
    }

    #[test]
    fn identifier_table_parses_csv() {
        let csv_text = "ID,Name,Position\n123,Ja'Marr Chase,WR\n456,Bijan Robinson,RB\n";
        let table = IdentifierTable::from_reader(csv_text.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("Chase", "WR").unwrap().id, "123");
    }

    #[test]
    fn identifier_fixture_validates() {
        let table =
            IdentifierTable::from_csv_path(Path::new("../../../fixtures/csv/identifiers.fixture.csv"))
                .expect("read fixture");
        assert!(!table.is_empty());
        assert_eq!(table.resolve("Ja'Marr Chase", "WR").unwrap().id, "123");
    }
}
