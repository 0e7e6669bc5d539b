//! Table extractor: materialize the source site's ranking table into ordered
//! player records.
//!
//! The extractor is all-or-nothing. A row that cannot be mapped through the
//! row shape aborts the whole extraction — partial ranking data is unsafe to
//! publish downstream. Retry policy, if any, belongs to the caller.

use std::time::Duration;

use tracing::{debug, instrument};

use rankpipe_driver::PageDriver;
use rankpipe_shared::{ExtractError, PlayerRecord, Result};

// ---------------------------------------------------------------------------
// RowShape
// ---------------------------------------------------------------------------

/// Which player field one table cell feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeField {
    Rank,
    Name,
    Team,
    Position,
    PositionRank,
    Adp,
    AdpPositionRank,
    AdpDiff,
    /// Read and discarded (e.g. bye week, projected points).
    Skip,
}

impl ShapeField {
    /// Map a configured column name to a field. Names that do not correspond
    /// to a destination field are read and discarded.
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "rank" | "etr_rank" => Self::Rank,
            "name" => Self::Name,
            "team" => Self::Team,
            "position" | "pos" => Self::Position,
            "position_rank" | "etr_pos_rank" => Self::PositionRank,
            "adp" => Self::Adp,
            "adp_pos_rank" | "adp_position_rank" => Self::AdpPositionRank,
            "adp_diff" => Self::AdpDiff,
            other => {
                debug!(column = other, "column does not map to a field, skipping");
                Self::Skip
            }
        }
    }
}

/// Ordered cell→field mapping for one table row.
#[derive(Debug, Clone)]
pub struct RowShape {
    fields: Vec<ShapeField>,
}

impl RowShape {
    pub fn new(fields: Vec<ShapeField>) -> Result<Self> {
        if fields.is_empty() {
            return Err(ExtractError::MalformedTable {
                message: "row shape has no columns".into(),
            }
            .into());
        }
        Ok(Self { fields })
    }

    /// Build a shape from ordered column names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        Self::new(
            names
                .iter()
                .map(|name| ShapeField::from_name(name.as_ref()))
                .collect(),
        )
    }

    /// The source site's ranking table layout.
    pub fn source_default() -> Self {
        Self {
            fields: vec![
                ShapeField::Name,
                ShapeField::Team,
                ShapeField::Position,
                ShapeField::Rank,
                ShapeField::PositionRank,
                ShapeField::Adp,
                ShapeField::AdpPositionRank,
                ShapeField::AdpDiff,
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

/// Extract the ranking table at `url` into ordered player records.
///
/// Waits for the table selector within `timeout`; rows come back in source
/// order with every cell trimmed. Works against an authenticated or an
/// anonymous driver — the rankings page itself decides what it serves.
#[instrument(skip_all, fields(url = %url, selector = %table_selector))]
pub async fn extract<D: PageDriver>(
    driver: &mut D,
    url: &str,
    table_selector: &str,
    shape: &RowShape,
    timeout: Duration,
) -> Result<Vec<PlayerRecord>> {
    driver.navigate(url).await?;

    if !driver.wait_for_selector(table_selector, timeout).await? {
        return Err(ExtractError::Timeout {
            selector: table_selector.to_string(),
        }
        .into());
    }

    let rows = driver.read_table(table_selector).await?;
    let records = materialize(&rows, shape)?;

    debug!(rows = records.len(), "table extracted");
    Ok(records)
}

/// Map raw table rows through the shape into player records.
pub fn materialize(rows: &[Vec<String>], shape: &RowShape) -> Result<Vec<PlayerRecord>> {
    if rows.is_empty() {
        return Err(ExtractError::MalformedTable {
            message: "table contained no data rows".into(),
        }
        .into());
    }

    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        if row.len() < shape.len() {
            return Err(ExtractError::MalformedTable {
                message: format!(
                    "row {index} has {} cells, expected at least {}",
                    row.len(),
                    shape.len()
                ),
            }
            .into());
        }

        let mut record = PlayerRecord::default();
        for (field, cell) in shape.fields.iter().zip(row) {
            let value = cell.trim().to_string();
            match field {
                ShapeField::Rank => record.rank = value,
                ShapeField::Name => record.name = value,
                ShapeField::Team => record.team = value,
                ShapeField::Position => record.position = value,
                ShapeField::PositionRank => record.position_rank = value,
                ShapeField::Adp => record.adp = value,
                ShapeField::AdpPositionRank => record.adp_position_rank = value,
                ShapeField::AdpDiff => record.adp_diff = value,
                ShapeField::Skip => {}
            }
        }
        records.push(record);
    }

    verify_rank_order(&records)?;
    Ok(records)
}

/// The rank column is the source site's own ordering: where its cells parse,
/// they must be unique and strictly increasing within the batch.
fn verify_rank_order(records: &[PlayerRecord]) -> Result<()> {
    let mut last: Option<i64> = None;

    for (index, record) in records.iter().enumerate() {
        let Ok(rank) = record.rank.parse::<i64>() else {
            continue;
        };
        if let Some(prev) = last {
            if rank <= prev {
                return Err(ExtractError::MalformedTable {
                    message: format!("rank {rank} at row {index} does not increase past {prev}"),
                }
                .into());
            }
        }
        last = Some(rank);
    }
    Ok(())
}
