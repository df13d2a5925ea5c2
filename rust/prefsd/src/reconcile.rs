use crate::backend::{PreferenceBackend, SaveOutcome};
use crate::diff::{self, Diff, DiffRowView, SelectionRow, SubjectIndex};
use crate::gate::{self, Verdict, Violation};
use crate::model::{
    self, CatalogFilter, LockSet, PreferenceRecord, Proficiency, Snap, Snapshot, Subject,
    SubjectId, Willingness,
};
use crate::working::{EditOutcome, WorkingSelection};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Confirming,
    Saving,
    Clearing,
}

/// Initialization inputs that can fail independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InitInput {
    Catalog,
    Preferences,
    Locks,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{}", .0.message())]
    Rejected(Violation),
    #[error("a save or clear is already in progress")]
    Busy,
    #[error("cannot {action} while {phase:?}")]
    BadPhase { action: &'static str, phase: Phase },
    #[error("{0}")]
    PersistFailed(String),
    #[error("{0}")]
    ClearFailed(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(v) => v.code(),
            Self::Busy => "busy",
            Self::BadPhase { .. } => "bad_phase",
            Self::PersistFailed(_) => "persist_failed",
            Self::ClearFailed(_) => "clear_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub saved_count: usize,
    /// Changes relative to the baseline that was replaced.
    pub diff: Diff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub kept: Vec<SubjectId>,
    pub dropped: Vec<SubjectId>,
}

fn settle<T: Default>(
    input: InitInput,
    professor_id: i64,
    result: anyhow::Result<T>,
    degraded: &mut Vec<InitInput>,
) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            let error = format!("{e:#}");
            warn!(professor_id, ?input, %error, "init load failed; continuing empty");
            degraded.push(input);
            T::default()
        }
    }
}

fn outcome_error(result: anyhow::Result<SaveOutcome>) -> Option<String> {
    match result {
        Ok(o) if o.success => None,
        Ok(o) => Some(o.message.unwrap_or_else(|| "Please try again.".to_string())),
        Err(e) => Some(format!("{e:#}")),
    }
}

/// One professor's preference edit session.
#[derive(Debug, Clone)]
pub struct Session {
    professor_id: i64,
    catalog: Vec<Subject>,
    strands: Vec<String>,
    index: SubjectIndex,
    snapshot: Snapshot,
    working: WorkingSelection,
    locks: LockSet,
    phase: Phase,
    pending: Option<Vec<PreferenceRecord>>,
    degraded: Vec<InitInput>,
    last_saved_count: usize,
}

impl Session {
    /// Never fails: an input that cannot be loaded starts empty and is listed in
    /// `degraded()`.
    pub fn open<B: PreferenceBackend + ?Sized>(
        backend: &B,
        professor_id: i64,
        filter: &CatalogFilter,
    ) -> Self {
        let mut degraded = Vec::new();
        let catalog = settle(
            InitInput::Catalog,
            professor_id,
            backend.load_catalog(filter),
            &mut degraded,
        );
        let prefs = settle(
            InitInput::Preferences,
            professor_id,
            backend.load_persisted_preferences(professor_id),
            &mut degraded,
        );
        let locked = settle(
            InitInput::Locks,
            professor_id,
            backend.load_locked_assignments(professor_id),
            &mut degraded,
        );

        let snapshot = Snapshot::from_entries(prefs);
        if snapshot.is_empty() {
            debug!(professor_id, "no saved preferences; starting a first-time selection");
        }
        let working = WorkingSelection::from_snapshot(&snapshot);
        info!(
            professor_id,
            subjects = catalog.len(),
            baseline = snapshot.len(),
            locked = locked.len(),
            ?degraded,
            "preference session opened"
        );

        Self {
            professor_id,
            strands: model::strands(&catalog),
            index: SubjectIndex::new(&catalog),
            catalog,
            snapshot,
            working,
            locks: locked.into_iter().collect(),
            phase: Phase::Idle,
            pending: None,
            degraded,
            last_saved_count: 0,
        }
    }

    pub fn professor_id(&self) -> i64 {
        self.professor_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn catalog(&self) -> &[Subject] {
        &self.catalog
    }

    pub fn strands(&self) -> &[String] {
        &self.strands
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn working(&self) -> &WorkingSelection {
        &self.working
    }

    /// Catalog entry for `id` from any catalog page seen in this session.
    pub fn subject(&self, id: SubjectId) -> Option<&Subject> {
        self.index.get(id)
    }

    pub fn locks(&self) -> &LockSet {
        &self.locks
    }

    pub fn degraded(&self) -> &[InitInput] {
        &self.degraded
    }

    pub fn last_saved_count(&self) -> usize {
        self.last_saved_count
    }

    fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Saving | Phase::Clearing)
    }

    fn edit(
        &mut self,
        f: impl FnOnce(&mut WorkingSelection, &LockSet) -> EditOutcome,
    ) -> Result<EditOutcome, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let outcome = f(&mut self.working, &self.locks);
        match outcome {
            EditOutcome::Blocked(id) => {
                warn!(professor_id = self.professor_id, subject_id = id, "deselect of assigned subject blocked");
            }
            // A pending confirmation no longer matches what would be saved.
            EditOutcome::Applied if self.phase == Phase::Confirming => {
                self.phase = Phase::Idle;
            }
            _ => {}
        }
        Ok(outcome)
    }

    pub fn select(&mut self, id: SubjectId) -> Result<EditOutcome, SessionError> {
        self.edit(|w, _| w.select(id))
    }

    pub fn deselect(&mut self, id: SubjectId) -> Result<EditOutcome, SessionError> {
        self.edit(|w, locks| w.deselect(id, locks))
    }

    pub fn toggle(&mut self, id: SubjectId) -> Result<EditOutcome, SessionError> {
        self.edit(|w, locks| w.toggle(id, locks))
    }

    pub fn set_proficiency(
        &mut self,
        id: SubjectId,
        value: Proficiency,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(|w, _| w.set_proficiency(id, value))
    }

    pub fn set_willingness(
        &mut self,
        id: SubjectId,
        value: Willingness,
    ) -> Result<EditOutcome, SessionError> {
        self.edit(|w, _| w.set_willingness(id, value))
    }

    pub fn diff(&self) -> Diff {
        diff::diff(&self.snapshot, &self.working, &self.locks)
    }

    pub fn diff_views(&self) -> (Vec<DiffRowView>, Vec<DiffRowView>, Vec<DiffRowView>) {
        let d = self.diff();
        let views = |rows: &[diff::DiffRow]| -> Vec<DiffRowView> {
            rows.iter().map(|r| r.describe(&self.index)).collect()
        };
        (views(&d.added), views(&d.updated), views(&d.removed))
    }

    pub fn verdict(&self) -> Verdict {
        gate::check(&self.working, self.diff().change_count())
    }

    pub fn selection_summary(&self) -> Vec<SelectionRow> {
        diff::selection_summary(&self.working, &self.index, &self.locks)
    }

    /// Re-fetches the catalog for a new filter. Baseline and selection are untouched.
    pub fn reload_catalog<B: PreferenceBackend + ?Sized>(
        &mut self,
        backend: &B,
        filter: &CatalogFilter,
    ) -> anyhow::Result<usize> {
        let list = backend.load_catalog(filter)?;
        if !filter.constrains_strand() {
            self.strands = model::strands(&list);
        }
        self.index.extend(&list);
        self.catalog = list;
        self.degraded.retain(|i| *i != InitInput::Catalog);
        Ok(self.catalog.len())
    }

    pub fn refresh_locks<B: PreferenceBackend + ?Sized>(
        &mut self,
        backend: &B,
    ) -> anyhow::Result<usize> {
        let ids = backend.load_locked_assignments(self.professor_id)?;
        self.locks = ids.into_iter().collect();
        let unsaved = self
            .locks
            .iter()
            .filter(|id| !self.snapshot.contains(**id))
            .count();
        debug!(
            professor_id = self.professor_id,
            locked = self.locks.len(),
            unsaved,
            "assignments refreshed"
        );
        self.degraded.retain(|i| *i != InitInput::Locks);
        Ok(self.locks.len())
    }

    /// Idle -> Confirming when the gate passes. A rejection leaves the phase as it was.
    pub fn request_save(&mut self) -> Result<Diff, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let d = self.diff();
        let verdict = gate::check(&self.working, d.change_count());
        if let Some(v) = verdict.primary() {
            debug!(professor_id = self.professor_id, code = v.code(), "save request rejected");
            return Err(SessionError::Rejected(v.clone()));
        }
        self.phase = Phase::Confirming;
        Ok(d)
    }

    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        self.phase = Phase::Idle;
        Ok(())
    }

    /// Each field falls back on its own: working, then baseline, then the locked default.
    fn locked_record(&self, id: SubjectId) -> PreferenceRecord {
        let saved = self.snapshot.get(id);
        let proficiency = self
            .working
            .proficiency_of(id)
            .or(saved.map(|s| s.proficiency))
            .unwrap_or(Snap::LOCKED_DEFAULT.proficiency);
        let willingness = self
            .working
            .willingness_of(id)
            .or(saved.and_then(|s| s.willingness))
            .or(Snap::LOCKED_DEFAULT.willingness)
            .unwrap_or(Willingness::Willing);
        PreferenceRecord {
            subject_id: id,
            proficiency,
            willingness,
        }
    }

    /// Working selection plus every assigned subject, ordered by id. Built fresh on
    /// each call.
    pub fn final_payload(&self) -> Vec<PreferenceRecord> {
        let mut by_id: BTreeMap<SubjectId, PreferenceRecord> = self
            .working
            .entries()
            .map(|e| {
                (
                    e.subject_id,
                    PreferenceRecord {
                        subject_id: e.subject_id,
                        proficiency: e.proficiency,
                        willingness: e.willingness.unwrap_or(Willingness::Willing),
                    },
                )
            })
            .collect();
        for id in &self.locks {
            if !by_id.contains_key(id) {
                by_id.insert(*id, self.locked_record(*id));
            }
        }
        by_id.into_values().collect()
    }

    /// Confirming -> Saving. Returns the payload to persist.
    pub fn begin_save(&mut self) -> Result<Vec<PreferenceRecord>, SessionError> {
        match self.phase {
            Phase::Confirming => {}
            Phase::Saving | Phase::Clearing => return Err(SessionError::Busy),
            Phase::Idle => {
                return Err(SessionError::BadPhase {
                    action: "save",
                    phase: self.phase,
                })
            }
        }
        let payload = self.final_payload();
        info!(professor_id = self.professor_id, records = payload.len(), "saving preferences");
        self.phase = Phase::Saving;
        self.pending = Some(payload.clone());
        Ok(payload)
    }

    /// Saving -> Idle on success, Saving -> Confirming on failure with nothing mutated.
    pub fn finish_save(
        &mut self,
        result: anyhow::Result<SaveOutcome>,
    ) -> Result<SaveReport, SessionError> {
        let (Phase::Saving, Some(payload)) = (self.phase, self.pending.take()) else {
            return Err(SessionError::BadPhase {
                action: "finish save",
                phase: self.phase,
            });
        };

        if let Some(message) = outcome_error(result) {
            warn!(professor_id = self.professor_id, %message, "save failed");
            self.phase = Phase::Confirming;
            return Err(SessionError::PersistFailed(message));
        }

        let changes = self.diff();
        let reinjected: Vec<PreferenceRecord> = payload
            .iter()
            .filter(|r| !self.working.is_selected(r.subject_id))
            .copied()
            .collect();
        self.working.merge_records(&reinjected);
        self.snapshot = Snapshot::from_records(&payload);
        self.last_saved_count = payload.len();
        self.phase = Phase::Idle;
        info!(
            professor_id = self.professor_id,
            saved = payload.len(),
            reinjected = reinjected.len(),
            "preferences saved"
        );
        Ok(SaveReport {
            saved_count: payload.len(),
            diff: changes,
        })
    }

    pub fn save<B: PreferenceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<SaveReport, SessionError> {
        let payload = self.begin_save()?;
        let result = backend.save_preferences(self.professor_id, &payload);
        self.finish_save(result)
    }

    /// Persists only the assigned subjects and makes that the new baseline.
    pub fn clear<B: PreferenceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<ClearReport, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let resume = self.phase;
        self.phase = Phase::Clearing;

        let payload: Vec<PreferenceRecord> =
            self.locks.iter().map(|id| self.locked_record(*id)).collect();
        info!(professor_id = self.professor_id, kept = payload.len(), "clearing preferences");

        if let Some(message) = outcome_error(backend.save_preferences(self.professor_id, &payload))
        {
            warn!(professor_id = self.professor_id, %message, "clear failed");
            self.phase = resume;
            return Err(SessionError::ClearFailed(message));
        }

        let dropped: Vec<SubjectId> = self
            .snapshot
            .iter()
            .map(|(id, _)| id)
            .chain(self.working.selected_ids())
            .filter(|id| !self.locks.contains(id))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        self.working.reset_to(&payload);
        self.snapshot = self.working.to_snapshot();
        self.last_saved_count = payload.len();
        self.phase = Phase::Idle;
        Ok(ClearReport {
            kept: payload.iter().map(|r| r.subject_id).collect(),
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PreferenceEntry;
    use anyhow::anyhow;

    #[derive(Default)]
    struct FakeBackend {
        catalog: Vec<Subject>,
        prefs: Vec<PreferenceEntry>,
        locks: Vec<SubjectId>,
        fail_loads: bool,
        fail_saves: bool,
        reject_saves: bool,
        saved: Vec<Vec<PreferenceRecord>>,
    }

    impl PreferenceBackend for FakeBackend {
        fn load_catalog(&self, filter: &CatalogFilter) -> anyhow::Result<Vec<Subject>> {
            if self.fail_loads {
                return Err(anyhow!("catalog offline"));
            }
            Ok(self.catalog.iter().filter(|s| filter.matches(s)).cloned().collect())
        }

        fn load_persisted_preferences(&self, _: i64) -> anyhow::Result<Vec<PreferenceEntry>> {
            if self.fail_loads {
                return Err(anyhow!("preferences offline"));
            }
            Ok(self.prefs.clone())
        }

        fn load_locked_assignments(&self, _: i64) -> anyhow::Result<Vec<SubjectId>> {
            if self.fail_loads {
                return Err(anyhow!("assignments offline"));
            }
            Ok(self.locks.clone())
        }

        fn save_preferences(
            &mut self,
            _: i64,
            records: &[PreferenceRecord],
        ) -> anyhow::Result<SaveOutcome> {
            if self.fail_saves {
                return Err(anyhow!("connection reset"));
            }
            if self.reject_saves {
                return Ok(SaveOutcome::rejected("server busy"));
            }
            self.saved.push(records.to_vec());
            Ok(SaveOutcome::ok())
        }
    }

    fn pref(id: SubjectId, p: Proficiency, w: Option<Willingness>) -> PreferenceEntry {
        PreferenceEntry {
            subject_id: id,
            proficiency: p,
            willingness: w,
        }
    }

    fn rec(id: SubjectId, p: Proficiency, w: Willingness) -> PreferenceRecord {
        PreferenceRecord {
            subject_id: id,
            proficiency: p,
            willingness: w,
        }
    }

    fn open(backend: &FakeBackend) -> Session {
        Session::open(backend, 1, &CatalogFilter::default())
    }

    #[test]
    fn first_time_selection_with_failed_loads() {
        let mut backend = FakeBackend {
            fail_loads: true,
            ..Default::default()
        };
        let mut s = open(&backend);
        assert_eq!(
            s.degraded(),
            &[InitInput::Catalog, InitInput::Preferences, InitInput::Locks]
        );
        assert!(s.snapshot().is_empty());

        s.toggle(9).expect("edit");
        s.set_willingness(9, Willingness::Willing).expect("edit");
        s.request_save().expect("confirm");
        let report = s.save(&mut backend).expect("save");
        assert_eq!(report.saved_count, 1);
        assert_eq!(report.diff.added.len(), 1);
    }

    #[test]
    fn blocked_deselect_keeps_locked_subject() {
        let backend = FakeBackend {
            prefs: vec![pref(5, Proficiency::Beginner, Some(Willingness::Willing))],
            locks: vec![5],
            ..Default::default()
        };
        let mut s = open(&backend);
        assert_eq!(s.deselect(5).expect("edit"), EditOutcome::Blocked(5));
        assert!(s.working().is_selected(5));
        assert_eq!(s.diff().change_count(), 0);
        assert_eq!(
            s.request_save(),
            Err(SessionError::Rejected(Violation::NoChanges))
        );
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn incomplete_selection_cannot_reach_confirming() {
        let backend = FakeBackend::default();
        let mut s = open(&backend);
        s.select(9).expect("edit");
        s.set_proficiency(9, Proficiency::Intermediate).expect("edit");
        let err = s.request_save().expect_err("gate");
        assert_eq!(
            err,
            SessionError::Rejected(Violation::MissingWillingness {
                subject_ids: vec![9]
            })
        );
        assert_eq!(err.code(), "missing_willingness");
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn payload_always_contains_locked_ids() {
        let backend = FakeBackend {
            prefs: vec![pref(2, Proficiency::Advanced, Some(Willingness::NotWilling))],
            locks: vec![2, 3],
            ..Default::default()
        };
        let mut s = open(&backend);
        // Simulate a working state that lost a locked id.
        s.working = WorkingSelection::default();
        s.select(7).expect("edit");
        s.set_willingness(7, Willingness::Willing).expect("edit");

        let payload = s.final_payload();
        assert_eq!(
            payload,
            vec![
                rec(2, Proficiency::Advanced, Willingness::NotWilling),
                rec(3, Proficiency::Beginner, Willingness::Willing),
                rec(7, Proficiency::Beginner, Willingness::Willing),
            ]
        );
        // Locked ids are not shown as removed.
        assert!(s.diff().removed.is_empty());
    }

    #[test]
    fn successful_save_replaces_baseline_and_merges_reinjected() {
        let mut backend = FakeBackend {
            prefs: vec![pref(1, Proficiency::Beginner, Some(Willingness::Willing))],
            locks: vec![4],
            ..Default::default()
        };
        let mut s = open(&backend);
        s.select(6).expect("edit");
        s.set_willingness(6, Willingness::NotWilling).expect("edit");
        s.request_save().expect("confirm");
        s.save(&mut backend).expect("save");

        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(backend.saved.len(), 1);
        assert_eq!(s.snapshot(), &Snapshot::from_records(&backend.saved[0]));
        assert!(s.working().is_selected(4));
        assert_eq!(s.working().willingness_of(4), Some(Willingness::Willing));
        assert_eq!(s.diff().change_count(), 0);
        assert_eq!(s.last_saved_count(), 3);
    }

    #[test]
    fn failed_save_returns_to_confirming_and_retry_succeeds() {
        let mut backend = FakeBackend {
            fail_saves: true,
            ..Default::default()
        };
        let mut s = open(&backend);
        s.select(3).expect("edit");
        s.set_willingness(3, Willingness::Willing).expect("edit");
        s.request_save().expect("confirm");

        let err = s.save(&mut backend).expect_err("network");
        assert_eq!(err, SessionError::PersistFailed("connection reset".into()));
        assert_eq!(s.phase(), Phase::Confirming);
        assert!(s.snapshot().is_empty());
        assert!(s.working().is_selected(3));

        backend.fail_saves = false;
        backend.reject_saves = true;
        let err = s.save(&mut backend).expect_err("server");
        assert_eq!(err.to_string(), "server busy");
        assert_eq!(s.phase(), Phase::Confirming);

        backend.reject_saves = false;
        s.save(&mut backend).expect("retry");
        assert_eq!(s.snapshot().len(), 1);
    }

    #[test]
    fn saving_refuses_reentry() {
        let mut backend = FakeBackend::default();
        let mut s = open(&backend);
        s.select(3).expect("edit");
        s.set_willingness(3, Willingness::Willing).expect("edit");
        s.request_save().expect("confirm");
        s.begin_save().expect("first");

        assert_eq!(s.begin_save(), Err(SessionError::Busy));
        assert_eq!(s.request_save(), Err(SessionError::Busy));
        assert_eq!(s.select(4), Err(SessionError::Busy));
        assert_eq!(s.clear(&mut backend).expect_err("busy"), SessionError::Busy);
        assert_eq!(s.phase(), Phase::Saving);

        s.finish_save(Ok(SaveOutcome::ok())).expect("finish");
        assert_eq!(s.phase(), Phase::Idle);
        assert!(matches!(
            s.finish_save(Ok(SaveOutcome::ok())),
            Err(SessionError::BadPhase { .. })
        ));
    }

    #[test]
    fn edit_while_confirming_withdraws_confirmation() {
        let backend = FakeBackend::default();
        let mut s = open(&backend);
        s.select(3).expect("edit");
        s.set_willingness(3, Willingness::Willing).expect("edit");
        s.request_save().expect("confirm");
        s.set_proficiency(3, Proficiency::Advanced).expect("edit");
        assert_eq!(s.phase(), Phase::Idle);
        assert!(matches!(s.begin_save(), Err(SessionError::BadPhase { .. })));
    }

    #[test]
    fn clear_keeps_only_locked_subjects() {
        let mut backend = FakeBackend {
            prefs: vec![
                pref(2, Proficiency::Advanced, Some(Willingness::Willing)),
                pref(4, Proficiency::Beginner, Some(Willingness::Willing)),
                pref(9, Proficiency::Beginner, Some(Willingness::Willing)),
            ],
            locks: vec![2, 4],
            ..Default::default()
        };
        let mut s = open(&backend);
        let report = s.clear(&mut backend).expect("clear");

        let expected = vec![
            rec(2, Proficiency::Advanced, Willingness::Willing),
            rec(4, Proficiency::Beginner, Willingness::Willing),
        ];
        assert_eq!(backend.saved, vec![expected.clone()]);
        assert_eq!(s.snapshot(), &Snapshot::from_records(&expected));
        assert!(!s.snapshot().contains(9));
        assert_eq!(report.kept, vec![2, 4]);
        assert_eq!(report.dropped, vec![9]);
        assert_eq!(s.working().len(), 2);
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn clear_prefers_working_values_and_defaults_unknown() {
        let mut backend = FakeBackend {
            prefs: vec![pref(2, Proficiency::Beginner, None)],
            locks: vec![2, 8],
            ..Default::default()
        };
        let mut s = open(&backend);
        s.set_proficiency(2, Proficiency::Intermediate).expect("edit");
        s.clear(&mut backend).expect("clear");
        assert_eq!(
            backend.saved[0],
            vec![
                rec(2, Proficiency::Intermediate, Willingness::Willing),
                rec(8, Proficiency::Beginner, Willingness::Willing),
            ]
        );
    }

    #[test]
    fn failed_clear_mutates_nothing() {
        let mut backend = FakeBackend {
            prefs: vec![pref(9, Proficiency::Beginner, Some(Willingness::Willing))],
            fail_saves: true,
            ..Default::default()
        };
        let mut s = open(&backend);
        let before = (s.snapshot().clone(), s.working().clone());
        let err = s.clear(&mut backend).expect_err("clear");
        assert_eq!(err.code(), "clear_failed");
        assert_eq!((s.snapshot().clone(), s.working().clone()), before);
        assert_eq!(s.phase(), Phase::Idle);
    }

    #[test]
    fn narrower_catalog_keeps_display_of_earlier_subjects() {
        let subj = |id, code: &str, strand: &str| Subject {
            id,
            code: code.to_string(),
            name: code.to_string(),
            strand: Some(strand.to_string()),
            grade_level: Some("11".into()),
            units: None,
            subject_type: None,
        };
        let backend = FakeBackend {
            catalog: vec![subj(1, "CALC", "STEM"), subj(2, "ACCT", "ABM")],
            ..Default::default()
        };
        let mut s = open(&backend);
        s.select(1).expect("edit");
        let n = s
            .reload_catalog(
                &backend,
                &CatalogFilter {
                    strand: Some("ABM".into()),
                    ..Default::default()
                },
            )
            .expect("reload");
        assert_eq!(n, 1);
        assert_eq!(s.strands(), &["ABM".to_string(), "STEM".to_string()]);
        assert_eq!(s.selection_summary()[0].code, "CALC");
    }

    #[test]
    fn refreshed_locks_clear_degraded_flag_and_guard_deselect() {
        let mut backend = FakeBackend {
            fail_loads: true,
            ..Default::default()
        };
        let mut s = open(&backend);
        s.select(4).expect("edit");

        backend.fail_loads = false;
        backend.locks = vec![4];
        assert_eq!(s.refresh_locks(&backend).expect("refresh"), 1);
        assert!(!s.degraded().contains(&InitInput::Locks));
        assert!(s.degraded().contains(&InitInput::Preferences));
        assert_eq!(s.deselect(4), Ok(EditOutcome::Blocked(4)));
        assert!(s.working().is_selected(4));
    }

    #[test]
    fn clear_keeps_saved_willingness_when_reselected_subject_is_unanswered() {
        let mut backend = FakeBackend {
            prefs: vec![pref(2, Proficiency::Beginner, Some(Willingness::NotWilling))],
            ..Default::default()
        };
        let mut s = open(&backend);
        s.toggle(2).expect("edit");
        s.toggle(2).expect("edit");
        assert_eq!(s.working().willingness_of(2), None);

        backend.locks = vec![2];
        s.refresh_locks(&backend).expect("refresh");
        s.clear(&mut backend).expect("clear");
        assert_eq!(
            backend.saved[0],
            vec![rec(2, Proficiency::Beginner, Willingness::NotWilling)]
        );
        assert_eq!(s.working().willingness_of(2), Some(Willingness::NotWilling));
    }

    #[test]
    fn failed_clear_from_confirming_resumes_confirming() {
        let mut backend = FakeBackend {
            locks: vec![4],
            fail_saves: true,
            ..Default::default()
        };
        let mut s = open(&backend);
        s.select(3).expect("edit");
        s.set_willingness(3, Willingness::Willing).expect("edit");
        s.request_save().expect("confirm");
        let before = (s.snapshot().clone(), s.working().clone());

        let err = s.clear(&mut backend).expect_err("clear");
        assert_eq!(err.code(), "clear_failed");
        assert_eq!(s.phase(), Phase::Confirming);
        assert_eq!((s.snapshot().clone(), s.working().clone()), before);

        // The pending confirmation is still usable.
        backend.fail_saves = false;
        let report = s.save(&mut backend).expect("save");
        assert_eq!(report.saved_count, 2);
    }

    #[test]
    fn clear_from_confirming_settles_idle() {
        let mut backend = FakeBackend {
            prefs: vec![pref(9, Proficiency::Advanced, Some(Willingness::Willing))],
            locks: vec![4],
            ..Default::default()
        };
        let mut s = open(&backend);
        s.deselect(9).expect("edit");
        s.request_save().expect("confirm");

        let report = s.clear(&mut backend).expect("clear");
        assert_eq!(report.kept, vec![4]);
        assert_eq!(report.dropped, vec![9]);
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.diff().change_count(), 0);
        assert!(matches!(s.begin_save(), Err(SessionError::BadPhase { .. })));
    }
}
