use crate::model::{
    LockSet, PreferenceEntry, PreferenceRecord, Proficiency, Snap, Snapshot, SubjectId,
    Willingness,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Unchanged,
    /// Deselect refused because the subject is assigned. Nothing changed.
    Blocked(SubjectId),
}

impl EditOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Blocked(_) => "blocked",
        }
    }
}

/// In-progress edit state. A subject is selected iff it has a proficiency; willingness
/// keys are always a subset of proficiency keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSelection {
    proficiency: BTreeMap<SubjectId, Proficiency>,
    willingness: BTreeMap<SubjectId, Willingness>,
}

impl WorkingSelection {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut w = Self::default();
        for (id, snap) in snapshot.iter() {
            w.put(id, snap);
        }
        w
    }

    fn put(&mut self, id: SubjectId, snap: Snap) {
        self.proficiency.insert(id, snap.proficiency);
        match snap.willingness {
            Some(v) => self.willingness.insert(id, v),
            None => self.willingness.remove(&id),
        };
    }

    pub fn select(&mut self, id: SubjectId) -> EditOutcome {
        if self.proficiency.contains_key(&id) {
            return EditOutcome::Unchanged;
        }
        self.proficiency.insert(id, Proficiency::default());
        self.willingness.remove(&id);
        EditOutcome::Applied
    }

    pub fn deselect(&mut self, id: SubjectId, locks: &LockSet) -> EditOutcome {
        if locks.contains(&id) {
            return EditOutcome::Blocked(id);
        }
        if self.proficiency.remove(&id).is_none() {
            return EditOutcome::Unchanged;
        }
        self.willingness.remove(&id);
        EditOutcome::Applied
    }

    pub fn toggle(&mut self, id: SubjectId, locks: &LockSet) -> EditOutcome {
        if self.is_selected(id) {
            self.deselect(id, locks)
        } else {
            self.select(id)
        }
    }

    pub fn set_proficiency(&mut self, id: SubjectId, value: Proficiency) -> EditOutcome {
        match self.proficiency.get_mut(&id) {
            Some(cur) if *cur == value => EditOutcome::Unchanged,
            Some(cur) => {
                *cur = value;
                EditOutcome::Applied
            }
            None => EditOutcome::Unchanged,
        }
    }

    pub fn set_willingness(&mut self, id: SubjectId, value: Willingness) -> EditOutcome {
        if !self.is_selected(id) {
            return EditOutcome::Unchanged;
        }
        match self.willingness.insert(id, value) {
            Some(prev) if prev == value => EditOutcome::Unchanged,
            _ => EditOutcome::Applied,
        }
    }

    pub fn is_selected(&self, id: SubjectId) -> bool {
        self.proficiency.contains_key(&id)
    }

    pub fn proficiency_of(&self, id: SubjectId) -> Option<Proficiency> {
        self.proficiency.get(&id).copied()
    }

    pub fn willingness_of(&self, id: SubjectId) -> Option<Willingness> {
        self.willingness.get(&id).copied()
    }

    pub fn snap_of(&self, id: SubjectId) -> Option<Snap> {
        self.proficiency_of(id).map(|proficiency| Snap {
            proficiency,
            willingness: self.willingness_of(id),
        })
    }

    /// Ascending.
    pub fn selected_ids(&self) -> impl Iterator<Item = SubjectId> + '_ {
        self.proficiency.keys().copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = PreferenceEntry> + '_ {
        self.proficiency.iter().map(|(id, p)| PreferenceEntry {
            subject_id: *id,
            proficiency: *p,
            willingness: self.willingness_of(*id),
        })
    }

    /// Current state in baseline form.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::from_entries(self.entries())
    }

    pub fn len(&self) -> usize {
        self.proficiency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proficiency.is_empty()
    }

    /// Selected subjects with no willingness choice, ascending.
    pub fn missing_willingness(&self) -> Vec<SubjectId> {
        self.selected_ids()
            .filter(|id| !self.willingness.contains_key(id))
            .collect()
    }

    /// Adds or overwrites the given saved records, leaving other selections alone.
    pub fn merge_records(&mut self, records: &[PreferenceRecord]) {
        for r in records {
            self.put(
                r.subject_id,
                Snap {
                    proficiency: r.proficiency,
                    willingness: Some(r.willingness),
                },
            );
        }
    }

    pub fn reset_to(&mut self, records: &[PreferenceRecord]) {
        self.proficiency.clear();
        self.willingness.clear();
        self.merge_records(records);
    }
}
