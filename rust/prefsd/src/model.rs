use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type SubjectId = i64;

/// Subjects administratively assigned to a professor. Immune to deselection.
pub type LockSet = BTreeSet<SubjectId>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<f64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub subject_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proficiency {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Proficiency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Willingness {
    Willing,
    NotWilling,
}

impl Willingness {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "willing" => Some(Self::Willing),
            "not_willing" => Some(Self::NotWilling),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Willing => "willing",
            Self::NotWilling => "not_willing",
        }
    }
}

/// One snapshot entry. `willingness: None` means the professor made no choice,
/// which is a distinct state from an explicit `NotWilling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snap {
    pub proficiency: Proficiency,
    pub willingness: Option<Willingness>,
}

impl Snap {
    /// Value used when a locked subject has to be re-injected and nothing is known about it.
    pub const LOCKED_DEFAULT: Snap = Snap {
        proficiency: Proficiency::Beginner,
        willingness: Some(Willingness::Willing),
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceEntry {
    pub subject_id: SubjectId,
    pub proficiency: Proficiency,
    pub willingness: Option<Willingness>,
}

/// A row of the replace-all payload sent to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub subject_id: SubjectId,
    pub proficiency: Proficiency,
    pub willingness: Willingness,
}

/// Last state confirmed as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<SubjectId, Snap>,
}

impl Snapshot {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = PreferenceEntry>,
    {
        let entries = entries
            .into_iter()
            .map(|e| {
                (
                    e.subject_id,
                    Snap {
                        proficiency: e.proficiency,
                        willingness: e.willingness,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn from_records(records: &[PreferenceRecord]) -> Self {
        let entries = records
            .iter()
            .map(|r| {
                (
                    r.subject_id,
                    Snap {
                        proficiency: r.proficiency,
                        willingness: Some(r.willingness),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, id: SubjectId) -> Option<Snap> {
        self.entries.get(&id).copied()
    }

    pub fn contains(&self, id: SubjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubjectId, Snap)> + '_ {
        self.entries.iter().map(|(id, s)| (*id, *s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFilter {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub strand: Option<String>,
}

fn active(v: &Option<String>) -> Option<String> {
    let v = v.as_deref()?.trim();
    if v.is_empty() || v.eq_ignore_ascii_case("all") {
        return None;
    }
    Some(v.to_lowercase())
}

impl CatalogFilter {
    pub fn constrains_strand(&self) -> bool {
        active(&self.strand).is_some()
    }

    pub fn matches(&self, subject: &Subject) -> bool {
        if let Some(q) = active(&self.query) {
            if !subject.name.to_lowercase().contains(&q) && !subject.code.to_lowercase().contains(&q)
            {
                return false;
            }
        }
        if let Some(g) = active(&self.grade_level) {
            if subject.grade_level.as_deref().unwrap_or("").trim().to_lowercase() != g {
                return false;
            }
        }
        if let Some(s) = active(&self.strand) {
            if subject.strand.as_deref().unwrap_or("").trim().to_lowercase() != s {
                return false;
            }
        }
        true
    }
}

/// Distinct, non-empty strands in display order.
pub fn strands(subjects: &[Subject]) -> Vec<String> {
    let set: BTreeSet<String> = subjects
        .iter()
        .filter_map(|s| s.strand.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    set.into_iter().collect()
}
