use crate::model::{LockSet, SubjectId};
use crate::working::WorkingSelection;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Violation {
    NoChanges,
    /// Selected subjects without a willingness choice, ascending.
    MissingWillingness {
        #[serde(rename = "subjectIds")]
        subject_ids: Vec<SubjectId>,
    },
}

impl Violation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoChanges => "no_changes",
            Self::MissingWillingness { .. } => "missing_willingness",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NoChanges => "There's nothing new to save yet.".to_string(),
            Self::MissingWillingness { subject_ids } => {
                let n = subject_ids.len();
                let noun = if n == 1 { "subject" } else { "subjects" };
                format!("Please choose \"Willing to teach?\" for {n} selected {noun}.")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub violations: Vec<Violation>,
}

impl Verdict {
    pub fn can_save(&self) -> bool {
        self.violations.is_empty()
    }

    /// The violation reported to the user first: no changes wins over completeness.
    pub fn primary(&self) -> Option<&Violation> {
        self.violations.first()
    }
}

pub fn check(working: &WorkingSelection, change_count: usize) -> Verdict {
    let mut violations = Vec::new();
    if change_count == 0 {
        violations.push(Violation::NoChanges);
    }
    let missing = working.missing_willingness();
    if !missing.is_empty() {
        violations.push(Violation::MissingWillingness {
            subject_ids: missing,
        });
    }
    Verdict { violations }
}

/// Assigned subjects are held to the same completeness rule as any other selection.
pub fn can_save(working: &WorkingSelection, _locks: &LockSet, change_count: usize) -> bool {
    check(working, change_count).can_save()
}
