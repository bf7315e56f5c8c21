//! Non-fatal problems collected during a run.
//!
//! Steps push issues instead of printing them, and `main` prints the whole
//! report once the step's normal output is done.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Issue {
    Unresolved { alias: String, context: String },
    RejectedRow { sheet: String, row: usize, reason: String },
    FetchFailed { target: String, error: String },
    MissingMatch { match_id: String },
    MalformedMatch { match_id: String, error: String },
}

impl Issue {
    pub fn kind(&self) -> &'static str {
        match self {
            Issue::Unresolved { .. } => "unresolved identities",
            Issue::RejectedRow { .. } => "rejected rows",
            Issue::FetchFailed { .. } => "failed fetches",
            Issue::MissingMatch { .. } => "missing matches",
            Issue::MalformedMatch { .. } => "malformed matches",
        }
    }

    pub fn unresolved(alias: impl Into<String>, context: impl Into<String>) -> Self {
        Issue::Unresolved { alias: alias.into(), context: context.into() }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::Unresolved { alias, context } => write!(f, "{alias:?}: {context}"),
            Issue::RejectedRow { sheet, row, reason } => write!(f, "{sheet} row {row}: {reason}"),
            Issue::FetchFailed { target, error } => write!(f, "{target}: {error}"),
            Issue::MissingMatch { match_id } => write!(f, "{match_id}"),
            Issue::MalformedMatch { match_id, error } => write!(f, "{match_id}: {error}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    issues: Vec<Issue>,
}

impl RunReport {
    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues.extend(issues);
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// 0 when clean, 2 when the run finished but left work for a human.
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() { 0 } else { 2 }
    }

    /// Issues grouped by kind, each group in a stable order.
    pub fn render(&self) -> String {
        let mut groups: BTreeMap<&str, Vec<&Issue>> = BTreeMap::new();
        for issue in &self.issues {
            groups.entry(issue.kind()).or_default().push(issue);
        }

        let mut out = String::new();
        for (kind, mut issues) in groups {
            issues.sort();
            issues.dedup();
            out.push_str(&format!("{} {kind}:\n", issues.len()));
            for issue in issues {
                out.push_str(&format!("  - {issue}\n"));
            }
        }
        out
    }
}
