//! Destination CSV materialization.
//!
//! The destination form only accepts one layout: the header row
//! `ID,Name,Position,ADP,Team,ETR Rank,ETR Pos Rank,ADP Pos Rank,ADP Diff`
//! with unresolved IDs as empty fields. The column order is the
//! [`NormalizedRecord`] field order, so serialization and the documented
//! layout cannot drift apart.

use std::io::Read;
use std::path::Path;

use rankpipe_shared::{NormalizedRecord, PipelineError, PlayerRecord, Result};

fn csv_err(e: csv::Error) -> PipelineError {
    PipelineError::Csv(e.to_string())
}

/// Write records to the destination upload file.
pub fn write_rankings_csv(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

/// Render records as destination-shaped CSV text.
pub fn rankings_csv_string(records: &[NormalizedRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| PipelineError::Csv(e.to_string()))
}

/// Render extracted records as CSV text, pre-normalization. This is the
/// "raw dataset" shape handed to the archive.
pub fn raw_csv_string(records: &[PlayerRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| PipelineError::Csv(e.to_string()))
}

/// Read a destination-shaped CSV back into records.
pub fn read_rankings_csv(path: &Path) -> Result<Vec<NormalizedRecord>> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    read_rankings_from_reader(file)
}

pub fn read_rankings_from_reader<R: Read>(reader: R) -> Result<Vec<NormalizedRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader
        .deserialize()
        .collect::<std::result::Result<Vec<NormalizedRecord>, _>>()
        .map_err(csv_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<NormalizedRecord> {
        vec![
            NormalizedRecord {
                id: Some("123".into()),
                name: "Ja'Marr Chase".into(),
                position: "WR".into(),
                adp: Some(1.2),
                team: "CIN".into(),
                rank: Some(1),
                position_rank: Some(1),
                adp_position_rank: Some(1),
                adp_diff: Some(-0.2),
            },
            NormalizedRecord {
                id: None,
                name: "Practice Squad Guy".into(),
                position: "TE".into(),
                adp: None,
                team: "FA".into(),
                rank: Some(300),
                position_rank: Some(42),
                adp_position_rank: None,
                adp_diff: None,
            },
        ]
    }

    #[test]
    fn header_row_is_the_destination_layout() {
        let text = rankings_csv_string(&sample()).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "ID,Name,Position,ADP,Team,ETR Rank,ETR Pos Rank,ADP Pos Rank,ADP Diff"
        );
    }

    #[test]
    fn unresolved_id_serializes_as_empty_field_not_null() {
        let text = rankings_csv_string(&sample()).unwrap();
        let unresolved_line = text
            .lines()
            .find(|line| line.contains("Practice Squad Guy"))
            .unwrap();
        assert!(unresolved_line.starts_with(','));
        assert!(!text.to_lowercase().contains("null"));
    }

    #[test]
    fn csv_round_trip_preserves_field_values() {
        let records = sample();
        let text = rankings_csv_string(&records).unwrap();
        let reparsed = read_rankings_from_reader(text.as_bytes()).unwrap();
        assert_eq!(records, reparsed);
    }

    #[test]
    fn write_and_read_through_a_file() {
        let dir = std::env::temp_dir().join(format!("rankpipe-csv-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rankings.csv");

        let records = sample();
        write_rankings_csv(&path, &records).unwrap();
        let reparsed = read_rankings_csv(&path).unwrap();
        assert_eq!(records, reparsed);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn raw_csv_keeps_source_field_names() {
        let raw = vec![PlayerRecord {
            name: "Ja'Marr Chase".into(),
            team: "CIN".into(),
            position: "WR".into(),
            rank: "1".into(),
            position_rank: "1".into(),
            adp: "1.2".into(),
            adp_position_rank: "1".into(),
            adp_diff: "-0.2".into(),
        }];

        let text = raw_csv_string(&raw).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "name,team,position,rank,position_rank,adp,adp_position_rank,adp_diff"
        );
        assert!(text.contains("Ja'Marr Chase"));
    }

    #[test]
    fn rankings_fixture_parses() {
        let records =
            read_rankings_csv(Path::new("../../../fixtures/csv/rankings.fixture.csv"))
                .expect("read fixture");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].name, "Ja'Marr Chase");
        // The fixture's unresolved row reads back with no ID.
        assert!(records.iter().any(|r| r.id.is_none()));
    }
}
