use crate::model::{LockSet, Proficiency, Snapshot, Subject, SubjectId, Willingness};
use crate::working::WorkingSelection;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffRow {
    pub subject_id: SubjectId,
    pub old_proficiency: Option<Proficiency>,
    pub new_proficiency: Option<Proficiency>,
    pub old_willingness: Option<Willingness>,
    pub new_willingness: Option<Willingness>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<DiffRow>,
    pub updated: Vec<DiffRow>,
    pub removed: Vec<DiffRow>,
}

impl Diff {
    pub fn change_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// Compares the persisted baseline against the working selection.
///
/// Subjects missing from `working` but present in `locks` are never reported as
/// removed; the reconciler re-injects them on save. Willingness `None` and
/// `Some(NotWilling)` are different states. Every partition is ascending by id.
pub fn diff(snapshot: &Snapshot, working: &WorkingSelection, locks: &LockSet) -> Diff {
    let mut out = Diff::default();

    for id in working.selected_ids() {
        let Some(cur) = working.snap_of(id) else {
            continue;
        };
        match snapshot.get(id) {
            None => out.added.push(DiffRow {
                subject_id: id,
                old_proficiency: None,
                new_proficiency: Some(cur.proficiency),
                old_willingness: None,
                new_willingness: cur.willingness,
            }),
            Some(prev) if prev != cur => out.updated.push(DiffRow {
                subject_id: id,
                old_proficiency: Some(prev.proficiency),
                new_proficiency: Some(cur.proficiency),
                old_willingness: prev.willingness,
                new_willingness: cur.willingness,
            }),
            Some(_) => {}
        }
    }

    for (id, prev) in snapshot.iter() {
        if working.is_selected(id) || locks.contains(&id) {
            continue;
        }
        out.removed.push(DiffRow {
            subject_id: id,
            old_proficiency: Some(prev.proficiency),
            new_proficiency: None,
            old_willingness: prev.willingness,
            new_willingness: None,
        });
    }

    out
}

/// Catalog lookup for display fields.
#[derive(Debug, Clone, Default)]
pub struct SubjectIndex {
    by_id: HashMap<SubjectId, Subject>,
}

impl SubjectIndex {
    pub fn new(subjects: &[Subject]) -> Self {
        Self {
            by_id: subjects.iter().map(|s| (s.id, s.clone())).collect(),
        }
    }

    /// Keeps entries already known so a narrower catalog filter does not blank out
    /// the display of subjects selected earlier in the session.
    pub fn extend(&mut self, subjects: &[Subject]) {
        for s in subjects {
            self.by_id.insert(s.id, s.clone());
        }
    }

    pub fn get(&self, id: SubjectId) -> Option<&Subject> {
        self.by_id.get(&id)
    }

    fn code(&self, id: SubjectId) -> String {
        self.get(id)
            .map(|s| s.code.clone())
            .unwrap_or_else(|| format!("#{id}"))
    }

    fn name(&self, id: SubjectId) -> String {
        self.get(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "Unknown subject".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRowView {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    pub old_prof: Option<Proficiency>,
    pub new_prof: Option<Proficiency>,
    pub old_will: Option<Willingness>,
    pub new_will: Option<Willingness>,
}

impl DiffRow {
    pub fn describe(&self, index: &SubjectIndex) -> DiffRowView {
        let subj = index.get(self.subject_id);
        DiffRowView {
            id: self.subject_id,
            code: index.code(self.subject_id),
            name: index.name(self.subject_id),
            strand: subj.and_then(|s| s.strand.clone()),
            grade_level: subj.and_then(|s| s.grade_level.clone()),
            old_prof: self.old_proficiency,
            new_prof: self.new_proficiency,
            old_will: self.old_willingness,
            new_will: self.new_willingness,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRow {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
    pub proficiency: Proficiency,
    pub willingness: Option<Willingness>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<f64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,
    pub locked: bool,
}

/// Current selection for the summary panel, sorted by code, then name.
pub fn selection_summary(
    working: &WorkingSelection,
    index: &SubjectIndex,
    locks: &LockSet,
) -> Vec<SelectionRow> {
    if working.is_empty() {
        return Vec::new();
    }
    let mut rows: Vec<SelectionRow> = working
        .entries()
        .map(|e| {
            let subj = index.get(e.subject_id);
            SelectionRow {
                id: e.subject_id,
                code: index.code(e.subject_id),
                name: index.name(e.subject_id),
                proficiency: e.proficiency,
                willingness: e.willingness,
                strand: subj.and_then(|s| s.strand.clone()),
                grade_level: subj.and_then(|s| s.grade_level.clone()),
                units: subj.and_then(|s| s.units),
                subject_type: subj.and_then(|s| s.subject_type.clone()),
                locked: locks.contains(&e.subject_id),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.code
            .cmp(&b.code)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.id.cmp(&b.id))
    });
    rows
}
