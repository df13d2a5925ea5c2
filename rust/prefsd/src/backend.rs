use crate::model::{CatalogFilter, PreferenceEntry, PreferenceRecord, Subject, SubjectId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl SaveOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Remote collaborators the reconciliation session reads from and writes to.
pub trait PreferenceBackend {
    fn load_catalog(&self, filter: &CatalogFilter) -> anyhow::Result<Vec<Subject>>;

    fn load_persisted_preferences(&self, professor_id: i64)
        -> anyhow::Result<Vec<PreferenceEntry>>;

    fn load_locked_assignments(&self, professor_id: i64) -> anyhow::Result<Vec<SubjectId>>;

    /// Replace-all: `records` is the complete desired set for the professor.
    fn save_preferences(
        &mut self,
        professor_id: i64,
        records: &[PreferenceRecord],
    ) -> anyhow::Result<SaveOutcome>;
}
