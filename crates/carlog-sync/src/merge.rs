//! Append-only merge of a snapshot into the historical log.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use carlog_core::ListingRecord;
use carlog_storage::{read_listings, write_listings};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub history_rows_before: usize,
    pub snapshot_rows: usize,
    /// Snapshot rows whose key was not already present.
    pub rows_added: usize,
    pub duplicates_dropped: usize,
    /// Rows of the stored history that collapsed onto an earlier history row.
    pub history_collapsed: usize,
    pub history_rows_after: usize,
    /// No history existed and the snapshot became the history.
    pub bootstrapped: bool,
}

/// Union of `history` then `snapshot`, keeping the first row per dedupe key.
pub fn merge_records(history: Vec<ListingRecord>, snapshot: Vec<ListingRecord>) -> (Vec<ListingRecord>, MergeSummary) {
    let history_rows_before = history.len();
    let snapshot_rows = snapshot.len();

    let mut seen = HashSet::with_capacity(history_rows_before + snapshot_rows);
    let mut merged = Vec::with_capacity(history_rows_before + snapshot_rows);
    for row in history {
        if seen.insert(row.dedupe_key()) {
            merged.push(row);
        }
    }
    let kept_history = merged.len();
    for row in snapshot {
        if seen.insert(row.dedupe_key()) {
            merged.push(row);
        }
    }

    let summary = MergeSummary {
        history_rows_before,
        snapshot_rows,
        rows_added: merged.len() - kept_history,
        duplicates_dropped: history_rows_before + snapshot_rows - merged.len(),
        history_collapsed: history_rows_before - kept_history,
        history_rows_after: merged.len(),
        bootstrapped: false,
    };
    (merged, summary)
}

/// Merge the snapshot file into the history file.
///
/// The history is rewritten through a temp file and rename, and only when the
/// merge changed it. A missing snapshot is an error; a missing history is
/// created from the snapshot.
pub fn merge_files(history_path: &Path, snapshot_path: &Path) -> Result<MergeSummary> {
    let snapshot = read_listings(snapshot_path)?
        .ok_or_else(|| anyhow!("snapshot {} does not exist; run the scrape first", snapshot_path.display()))?;
    let history = read_listings(history_path)?;
    let bootstrapped = history.is_none();

    let (merged, mut summary) = merge_records(history.unwrap_or_default(), snapshot);
    summary.bootstrapped = bootstrapped;

    let unchanged = !bootstrapped && summary.rows_added == 0 && summary.history_collapsed == 0;
    if unchanged {
        debug!(path = %history_path.display(), "history unchanged; not rewriting");
    } else {
        write_listings(history_path, &merged)
            .with_context(|| format!("writing merged history {}", history_path.display()))?;
    }

    info!(
        before = summary.history_rows_before,
        snapshot = summary.snapshot_rows,
        added = summary.rows_added,
        duplicates = summary.duplicates_dropped,
        after = summary.history_rows_after,
        bootstrapped,
        "merged snapshot into history"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carlog_core::ListingAttributes;
    use carlog_storage::encode_listings;
    use std::fs;

    fn row(date: &str, url: &str, price: &str) -> ListingRecord {
        ListingRecord::new(
            date,
            url,
            ListingAttributes {
                make: "Toyota".into(),
                model: "Yaris".into(),
                price_value: price.into(),
                price_currency: "EUR".into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn keeps_first_row_per_key_in_history_then_snapshot_order() {
        let history = vec![row("2024-01-01", "A", "100"), row("2024-01-01", "B", "200")];
        let snapshot = vec![row("2024-01-01", "B", "999"), row("2024-01-02", "A", "110")];

        let (merged, summary) = merge_records(history, snapshot);
        let keys: Vec<(&str, &str, &str)> = merged
            .iter()
            .map(|r| (r.scrape_date.as_str(), r.listing_url.as_str(), r.price_value.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-01-01", "A", "100"),
                ("2024-01-01", "B", "200"),
                ("2024-01-02", "A", "110"),
            ]
        );
        assert_eq!(summary.rows_added, 1);
        assert_eq!(summary.duplicates_dropped, 1);
        assert_eq!(summary.history_rows_after, 3);
    }

    #[test]
    fn merging_is_idempotent() {
        let history = vec![row("2024-01-01", "A", "100")];
        let snapshot = vec![row("2024-01-02", "A", "100"), row("2024-01-02", "C", "300")];
        let (once, _) = merge_records(history, snapshot.clone());
        let (twice, summary) = merge_records(once.clone(), snapshot);
        assert_eq!(once, twice);
        assert_eq!(summary.rows_added, 0);
        assert_eq!(summary.duplicates_dropped, 2);
    }

    #[test]
    fn duplicate_rows_inside_one_snapshot_collapse() {
        let snapshot = vec![row("2024-01-02", "C", "300"), row("2024-01-02", " C ", "301")];
        let (merged, summary) = merge_records(Vec::new(), snapshot);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].price_value, "300");
        assert_eq!(summary.duplicates_dropped, 1);
    }

    #[test]
    fn first_run_bootstraps_history_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("historical_listings.csv");
        let snapshot = dir.path().join("today_listings.csv");
        write_listings(&snapshot, &[row("2024-01-01", "A", "100"), row("2024-01-01", "A", "100")]).unwrap();

        let summary = merge_files(&history, &snapshot).unwrap();
        assert!(summary.bootstrapped);
        assert_eq!(summary.history_rows_after, 1);
        assert_eq!(read_listings(&history).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn rerunning_the_same_merge_leaves_history_bytes_alone() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("historical_listings.csv");
        let snapshot = dir.path().join("today_listings.csv");
        write_listings(&history, &[row("2024-01-01", "A", "100")]).unwrap();
        write_listings(&snapshot, &[row("2024-01-02", "A", "100")]).unwrap();

        merge_files(&history, &snapshot).unwrap();
        let after_first = fs::read(&history).unwrap();
        let summary = merge_files(&history, &snapshot).unwrap();
        assert_eq!(summary.rows_added, 0);
        assert_eq!(fs::read(&history).unwrap(), after_first);
        assert_eq!(
            after_first,
            encode_listings(&[row("2024-01-01", "A", "100"), row("2024-01-02", "A", "100")]).unwrap()
        );
    }

    #[test]
    fn missing_snapshot_is_an_error_and_history_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("historical_listings.csv");
        write_listings(&history, &[row("2024-01-01", "A", "100")]).unwrap();
        let before = fs::read(&history).unwrap();

        let err = merge_files(&history, &dir.path().join("today_listings.csv")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert_eq!(fs::read(&history).unwrap(), before);
    }

    #[test]
    fn snapshot_row_already_in_history_is_not_added_again() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("historical_listings.csv");
        let snapshot = dir.path().join("today_listings.csv");
        write_listings(&history, &[row("2024-01-01", "A", "100")]).unwrap();
        write_listings(&snapshot, &[row("2024-01-01", "A", "100"), row("2024-01-02", "B", "200")]).unwrap();

        let summary = merge_files(&history, &snapshot).unwrap();
        assert_eq!(summary.rows_added, 1);
        assert_eq!(summary.duplicates_dropped, 1);
        let stored = read_listings(&history).unwrap().unwrap();
        assert_eq!(stored, vec![row("2024-01-01", "A", "100"), row("2024-01-02", "B", "200")]);
    }

    #[test]
    fn history_with_colliding_keys_is_collapsed_and_keeps_new_rows() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("historical_listings.csv");
        let snapshot = dir.path().join("today_listings.csv");
        write_listings(&history, &[row("2024-01-01", "A", "100"), row("2024-01-01", "A ", "101")]).unwrap();
        write_listings(&snapshot, &[row("2024-01-02", "B", "200")]).unwrap();

        let summary = merge_files(&history, &snapshot).unwrap();
        assert_eq!(summary.rows_added, 1);
        assert_eq!(summary.history_collapsed, 1);
        assert_eq!(summary.history_rows_after, 2);

        let stored = read_listings(&history).unwrap().unwrap();
        assert_eq!(stored, vec![row("2024-01-01", "A", "100"), row("2024-01-02", "B", "200")]);
    }

    #[test]
    fn history_with_colliding_keys_is_rewritten_even_without_new_rows() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("historical_listings.csv");
        let snapshot = dir.path().join("today_listings.csv");
        write_listings(&history, &[row("2024-01-01", "A", "100"), row("2024-01-01", " A", "101")]).unwrap();
        write_listings(&snapshot, &[row("2024-01-01", "A", "100")]).unwrap();

        let summary = merge_files(&history, &snapshot).unwrap();
        assert_eq!(summary.rows_added, 0);
        assert_eq!(read_listings(&history).unwrap().unwrap(), vec![row("2024-01-01", "A", "100")]);
    }

    #[test]
    fn foreign_history_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path().join("historical_listings.csv");
        let snapshot = dir.path().join("today_listings.csv");
        fs::write(&history, "date,url\n2024-01-01,A\n").unwrap();
        write_listings(&snapshot, &[row("2024-01-02", "A", "100")]).unwrap();

        assert!(merge_files(&history, &snapshot).is_err());
        assert_eq!(fs::read_to_string(&history).unwrap(), "date,url\n2024-01-01,A\n");
    }
}
