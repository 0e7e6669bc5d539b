//! Core domain types for the rankings pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Character budget for diagnostic markup excerpts. Operator diagnostics get
/// the head of the page, never an arbitrary-size dump.
pub const MARKUP_EXCERPT_BUDGET: usize = 2048;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// PlayerRecord
// ---------------------------------------------------------------------------

/// One ranked player as extracted from the source table.
///
/// All fields are trimmed cell text; numeric coercion happens during
/// normalization so that "source omitted this stat" stays distinguishable
/// from a fabricated zero. Row order within a batch reflects the source
/// site's ranking and is preserved end to end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Player display name.
    pub name: String,
    /// Team code (e.g. `CIN`).
    pub team: String,
    /// Position code (e.g. `WR`).
    pub position: String,
    /// Overall rank in source-site ordering.
    pub rank: String,
    /// Rank within the player's position.
    pub position_rank: String,
    /// Average draft position from the external market.
    pub adp: String,
    /// ADP rank within the player's position.
    pub adp_position_rank: String,
    /// Signed difference between rank and ADP.
    pub adp_diff: String,
}

// ---------------------------------------------------------------------------
// NormalizedRecord
// ---------------------------------------------------------------------------

/// A player record reshaped into the destination schema.
///
/// Field declaration order is the destination column order; the serde renames
/// are the destination header row. `None` is the explicit "missing" sentinel
/// and serializes to an empty CSV field (never the word "null").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Destination-system identifier, if the player resolved.
    #[serde(rename = "ID")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Position")]
    pub position: String,
    #[serde(rename = "ADP")]
    pub adp: Option<f64>,
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "ETR Rank")]
    pub rank: Option<i64>,
    #[serde(rename = "ETR Pos Rank")]
    pub position_rank: Option<i64>,
    #[serde(rename = "ADP Pos Rank")]
    pub adp_position_rank: Option<i64>,
    #[serde(rename = "ADP Diff")]
    pub adp_diff: Option<f64>,
}

// ---------------------------------------------------------------------------
// ConfirmationEvent
// ---------------------------------------------------------------------------

/// Observable state of one confirmable action.
///
/// Each authenticated boundary action moves `NotStarted → Submitted` and then
/// to exactly one terminal state. Absence of a success banner is `TimedOut`,
/// never silently treated as success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationEvent {
    #[default]
    NotStarted,
    Submitted,
    ConfirmedSuccess,
    ConfirmedFailure,
    TimedOut,
}

impl ConfirmationEvent {
    /// Whether the action reached its success confirmation.
    pub fn is_success(self) -> bool {
        matches!(self, ConfirmationEvent::ConfirmedSuccess)
    }
}

impl std::fmt::Display for ConfirmationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConfirmationEvent::NotStarted => "not started",
            ConfirmationEvent::Submitted => "submitted",
            ConfirmationEvent::ConfirmedSuccess => "confirmed",
            ConfirmationEvent::ConfirmedFailure => "failed",
            ConfirmationEvent::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Per-run ledger of confirmation states, one per confirmable action.
///
/// The flow crosses two authenticated boundaries, so the two logins are
/// tracked separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub source_login: ConfirmationEvent,
    pub extraction: ConfirmationEvent,
    pub destination_login: ConfirmationEvent,
    pub upload: ConfirmationEvent,
    pub save: ConfirmationEvent,
}

// ---------------------------------------------------------------------------
// DiagnosticSnapshot
// ---------------------------------------------------------------------------

/// Last-observed page state captured when a wait gives out.
///
/// The markup excerpt is bounded by [`MARKUP_EXCERPT_BUDGET`] and the
/// snapshot never contains credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    /// URL the page was on when the snapshot was taken.
    pub url: String,
    /// Page title, if readable.
    pub title: String,
    /// Truncated page markup for operator inspection.
    pub markup_excerpt: String,
}

impl DiagnosticSnapshot {
    /// Build a snapshot, truncating the markup to the fixed budget.
    pub fn new(url: impl Into<String>, title: impl Into<String>, markup: &str) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            markup_excerpt: markup.chars().take(MARKUP_EXCERPT_BUDGET).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let s = id.to_string();
        let parsed: RunId = s.parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn snapshot_truncates_to_budget() {
        let markup = "x".repeat(MARKUP_EXCERPT_BUDGET * 2);
        let snapshot = DiagnosticSnapshot::new("https://example.com", "t", &markup);
        assert_eq!(snapshot.markup_excerpt.chars().count(), MARKUP_EXCERPT_BUDGET);
    }

    #[test]
    fn snapshot_keeps_short_markup_intact() {
        let snapshot = DiagnosticSnapshot::new("https://example.com", "t", "<html></html>");
        assert_eq!(snapshot.markup_excerpt, "<html></html>");
    }

    #[test]
    fn report_starts_with_nothing_confirmed() {
        let report = RunReport::default();
        assert_eq!(report.source_login, ConfirmationEvent::NotStarted);
        assert_eq!(report.save, ConfirmationEvent::NotStarted);
        assert!(!report.upload.is_success());
    }

    #[test]
    fn normalized_record_uses_destination_headers() {
        let record = NormalizedRecord {
            id: Some("123".into()),
            name: "Ja'Marr Chase".into(),
            position: "WR".into(),
            adp: Some(1.2),
            team: "CIN".into(),
            rank: Some(1),
            position_rank: Some(1),
            adp_position_rank: Some(1),
            adp_diff: Some(-0.2),
        };
        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["ID"], "123");
        assert_eq!(json["ETR Rank"], 1);
        assert_eq!(json["ADP Diff"], -0.2);
    }
}
