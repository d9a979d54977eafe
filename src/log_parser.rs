//! Parsing of delimited `git log` output.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::git::{FIELD_SEPARATOR, RECORD_SEPARATOR};

/// One commit as reported by `git log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Abbreviated hash; used as the deduplication key.
    pub commit: String,
    /// ISO-8601 date with offset, exactly as git printed it.
    pub date: String,
    /// Subject line.
    pub message: String,
}

impl CommitRecord {
    pub fn new(
        commit: impl Into<String>,
        date: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            commit: commit.into(),
            date: date.into(),
            message: message.into(),
        }
    }
}

/// Parse `hash US date US subject RS ...` output into records.
///
/// Entries that do not have exactly three fields are dropped; blank
/// segments (such as the one after a trailing separator) are skipped.
pub fn parse_log(raw: &str) -> Vec<CommitRecord> {
    raw.trim_matches(RECORD_SEPARATOR)
        .split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let fields: Vec<&str> = entry.split(FIELD_SEPARATOR).collect();
            match fields.as_slice() {
                [commit, date, message] => Some(CommitRecord::new(*commit, *date, *message)),
                _ => {
                    trace!(fields = fields.len(), entry, "dropping malformed log entry");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(commit: &str, date: &str, message: &str) -> String {
        format!("{commit}\u{1f}{date}\u{1f}{message}\u{1e}")
    }

    #[test]
    fn parses_records_in_order() {
        let raw = [
            record("a1b2c3d", "2024-05-01 10:00:00 +0800", "feat: first"),
            record("b2c3d4e", "2024-05-02 11:00:00 +0800", "fix: second"),
            record("c3d4e5f", "2024-05-03 12:00:00 +0800", "docs: third"),
        ]
        .concat();

        let records = parse_log(&raw);
        let ids: Vec<&str> = records.iter().map(|r| r.commit.as_str()).collect();
        assert_eq!(ids, vec!["a1b2c3d", "b2c3d4e", "c3d4e5f"]);
        assert_eq!(records[1].date, "2024-05-02 11:00:00 +0800");
        assert_eq!(records[2].message, "docs: third");
    }

    #[test]
    fn malformed_entry_is_dropped() {
        let raw = format!(
            "{}{}{}{}",
            record("a1", "2024-05-01 10:00:00 +0000", "one"),
            "b2\u{1f}only-two-fields\u{1e}",
            "c3\u{1f}d\u{1f}e\u{1f}four-fields\u{1e}",
            record("d4", "2024-05-04 10:00:00 +0000", "two"),
        );

        let records = parse_log(&raw);
        assert_eq!(
            records,
            vec![
                CommitRecord::new("a1", "2024-05-01 10:00:00 +0000", "one"),
                CommitRecord::new("d4", "2024-05-04 10:00:00 +0000", "two"),
            ]
        );
    }

    #[test]
    fn newlines_between_records_are_trimmed() {
        // git separates pretty-format entries with a newline after each %x1e.
        let raw = "a1\u{1f}d1\u{1f}m1\u{1e}\nb2\u{1f}d2\u{1f}m2\u{1e}";
        let records = parse_log(raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].commit, "b2");
    }

    #[test]
    fn empty_output_yields_nothing() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("\u{1e}\u{1e}\n").is_empty());
    }

    #[test]
    fn subject_keeps_inner_whitespace() {
        let records = parse_log("a1\u{1f}d1\u{1f}fix:  keep   spacing\u{1e}");
        assert_eq!(records[0].message, "fix:  keep   spacing");
    }
}
