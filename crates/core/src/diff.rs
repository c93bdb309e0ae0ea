//! Field-level diff of request content.
//!
//! Used to describe requester edits in the comment thread and the audit
//! log, including the comment appended when a declined request is
//! reopened.

use serde::{Deserialize, Serialize};

/// The status of a field in a diff comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
    Unchanged,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
        }
    }

    fn classify(old: &str, new: &str) -> Self {
        match (old.is_empty(), new.is_empty()) {
            _ if old == new => Self::Unchanged,
            (true, false) => Self::Added,
            (false, true) => Self::Removed,
            _ => Self::Changed,
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editable content of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContent {
    pub source: String,
    pub target: String,
    pub reason: String,
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub status: DiffStatus,
    pub old: String,
    pub new: String,
}

/// Compare two versions of the request content, returning only the fields
/// that differ, in a fixed order (source, target, reason).
pub fn diff_content(old: &RequestContent, new: &RequestContent) -> Vec<FieldChange> {
    [
        ("source", &old.source, &new.source),
        ("target", &old.target, &new.target),
        ("reason", &old.reason, &new.reason),
    ]
    .into_iter()
    .filter_map(|(field, o, n)| {
        let status = DiffStatus::classify(o, n);
        (status != DiffStatus::Unchanged).then(|| FieldChange {
            field,
            status,
            old: o.clone(),
            new: n.clone(),
        })
    })
    .collect()
}

/// Render changes as a unified-diff-like block, one `-`/`+` pair per field.
pub fn render_changes(changes: &[FieldChange]) -> String {
    let mut out = String::new();
    for change in changes {
        out.push_str(&format!("{} ({}):\n", change.field, change.status));
        if !change.old.is_empty() {
            out.push_str(&format!("- {}\n", change.old));
        }
        if !change.new.is_empty() {
            out.push_str(&format!("+ {}\n", change.new));
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(source: &str, target: &str, reason: &str) -> RequestContent {
        RequestContent {
            source: source.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    #[test]
    fn identical_content_has_no_changes() {
        let c = content("http://x", "wikidb", "t");
        assert!(diff_content(&c, &c).is_empty());
    }

    #[test]
    fn classifies_each_field() {
        let old = content("", "wikidb", "old reason");
        let new = content("http://x", "wikidb", "new reason");
        let changes = diff_content(&old, &new);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "source");
        assert_eq!(changes[0].status, DiffStatus::Added);
        assert_eq!(changes[1].field, "reason");
        assert_eq!(changes[1].status, DiffStatus::Changed);
    }

    #[test]
    fn removed_source() {
        let changes = diff_content(&content("http://x", "a", "r"), &content("", "a", "r"));
        assert_eq!(changes[0].status, DiffStatus::Removed);
    }

    #[test]
    fn render_shows_old_and_new() {
        let changes = diff_content(&content("", "a", "old"), &content("", "a", "new"));
        assert_eq!(render_changes(&changes), "reason (changed):\n- old\n+ new");
    }
}
