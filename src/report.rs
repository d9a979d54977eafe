//! Rendering collected logs with first-seen-wins deduplication.
//!
//! Branches and authors often share history (a local branch and its remote
//! counterpart, or a merge matched by two authors). Each commit id is kept
//! only in the first group, in group order, where it appears.

use std::collections::HashSet;

use serde::Serialize;

use crate::ai::Summarizer;
use crate::collect::GroupedLogs;
use crate::error::Result;
use crate::log_parser::CommitRecord;
use crate::task::GroupKey;

/// One group after deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportGroup {
    #[serde(flatten)]
    pub key: GroupKey,
    pub commits: Vec<CommitRecord>,
}

/// Keep each commit id once across all groups, in iteration order.
///
/// Groups left empty by deduplication are kept so their headers still render.
pub fn dedup_groups(logs: &GroupedLogs) -> Vec<ReportGroup> {
    let mut seen: HashSet<&str> = HashSet::new();
    logs.iter()
        .map(|(key, records)| ReportGroup {
            key: key.clone(),
            commits: records
                .iter()
                .filter(|record| seen.insert(record.commit.as_str()))
                .cloned()
                .collect(),
        })
        .collect()
}

/// Plain-text report: a header per group followed by `<date> <subject>` lines.
pub fn render_plain(groups: &[ReportGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        out.push_str(&format!("Project: {}\n", group.key.project));
        out.push_str(&format!("Branch: {}\n", group.key.branch));
        out.push_str(&format!("Author: {}\n", group.key.author));
        for commit in &group.commits {
            out.push_str(&format!("{} {}\n", commit.date, commit.message));
        }
        out.push('\n');
    }
    out
}

pub fn unique_commit_count(groups: &[ReportGroup]) -> usize {
    groups.iter().map(|group| group.commits.len()).sum()
}

/// Summarize the rendered report with `summarizer`.
///
/// Empty reports are refused by the summarizer before any request is sent.
pub fn summarize(
    summarizer: &dyn Summarizer,
    system_prompt: &str,
    groups: &[ReportGroup],
) -> Result<String> {
    let text = render_plain(groups);
    Ok(summarizer.summarize(system_prompt, &text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use std::sync::Mutex;

    struct RecordingSummarizer {
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Summarizer for RecordingSummarizer {
        fn summarize(&self, system_prompt: &str, user_text: &str) -> std::result::Result<String, AiError> {
            if user_text.trim().is_empty() {
                return Err(AiError::EmptyInput);
            }
            self.seen
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_text.to_string()));
            Ok("summary".to_string())
        }
    }

    fn rec(id: &str) -> CommitRecord {
        CommitRecord::new(id, format!("2024-05-0{} 10:00:00 +0000", id.len()), format!("msg {id}"))
    }

    fn logs() -> GroupedLogs {
        let mut logs = GroupedLogs::new();
        logs.append(
            GroupKey::new("demo", "origin/main", "alice"),
            vec![rec("a1"), rec("b2"), rec("a1")],
        );
        logs.append(
            GroupKey::new("demo", "feature", "alice"),
            vec![rec("b2"), rec("c3")],
        );
        logs.append(GroupKey::new("demo", "origin/main", "bob"), vec![rec("c3")]);
        logs
    }

    fn ids(group: &ReportGroup) -> Vec<&str> {
        group.commits.iter().map(|c| c.commit.as_str()).collect()
    }

    #[test]
    fn first_group_wins() {
        let groups = dedup_groups(&logs());
        assert_eq!(groups.len(), 3);
        assert_eq!(ids(&groups[0]), vec!["a1", "b2"]);
        assert_eq!(ids(&groups[1]), vec!["c3"]);
        assert!(groups[2].commits.is_empty());
        assert_eq!(unique_commit_count(&groups), 3);
    }

    #[test]
    fn dedup_is_idempotent() {
        let logs = logs();
        assert_eq!(dedup_groups(&logs), dedup_groups(&logs));
        assert_eq!(
            render_plain(&dedup_groups(&logs)),
            render_plain(&dedup_groups(&logs))
        );
    }

    #[test]
    fn render_lists_headers_and_lines() {
        let text = render_plain(&dedup_groups(&logs()));
        assert!(text.starts_with("Project: demo\nBranch: origin/main\nAuthor: alice\n"));
        assert!(text.contains("msg a1\n"));
        assert_eq!(text.matches("msg c3").count(), 1);
        assert!(text.contains("Author: bob\n\n"));
    }

    #[test]
    fn empty_logs_render_nothing() {
        assert!(render_plain(&dedup_groups(&GroupedLogs::new())).is_empty());
    }

    #[test]
    fn summarize_sends_rendered_report() {
        let summarizer = RecordingSummarizer {
            seen: Mutex::new(Vec::new()),
        };
        let groups = dedup_groups(&logs());
        let summary = summarize(&summarizer, "Be brief.", &groups).unwrap();
        assert_eq!(summary, "summary");

        let seen = summarizer.seen.lock().unwrap();
        assert_eq!(seen[0].0, "Be brief.");
        assert_eq!(seen[0].1, render_plain(&groups));
    }

    #[test]
    fn summarize_refuses_empty_report() {
        let summarizer = RecordingSummarizer {
            seen: Mutex::new(Vec::new()),
        };
        let err = summarize(&summarizer, "p", &[]).unwrap_err();
        assert!(matches!(err, crate::error::Error::Ai(AiError::EmptyInput)));
    }
}
