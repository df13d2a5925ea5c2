//! Maps loosely-typed records (IPC params, stored text columns) into the strict model
//! types. Nothing past this module sees partial records.

use crate::model::{PreferenceEntry, Proficiency, Subject, SubjectId, Willingness};
use serde_json::Value;

fn field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| v.get(*k))
        .find(|x| !x.is_null())
}

fn as_id(v: &Value) -> Option<SubjectId> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_text(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn subject_from_value(v: &Value) -> Option<Subject> {
    let id = field(v, &["id", "subj_id", "subjectId"]).and_then(as_id)?;
    let code = field(v, &["code", "subj_code"]).and_then(as_text)?;
    let name = field(v, &["name", "subj_name"]).and_then(as_text)?;
    Some(Subject {
        id,
        code,
        name,
        strand: field(v, &["strand"]).and_then(as_text),
        grade_level: field(v, &["gradeLevel", "grade_level"]).and_then(as_text),
        units: field(v, &["units"]).and_then(as_number),
        subject_type: field(v, &["type", "subj_type"]).and_then(as_text),
    })
}

/// A record with an unknown proficiency is dropped. An unknown willingness is read as unset.
pub fn preference_from_value(v: &Value) -> Option<PreferenceEntry> {
    let subject_id = field(v, &["subjectId", "subj_id", "id"]).and_then(as_id)?;
    let proficiency = field(v, &["proficiency"])
        .and_then(Value::as_str)
        .and_then(Proficiency::parse)?;
    let willingness = field(v, &["willingness"])
        .and_then(Value::as_str)
        .and_then(Willingness::parse);
    Some(PreferenceEntry {
        subject_id,
        proficiency,
        willingness,
    })
}

pub fn subject_ids_from_value(v: &Value) -> Vec<SubjectId> {
    let Some(items) = v.as_array() else {
        return Vec::new();
    };
    let mut ids: Vec<SubjectId> = items
        .iter()
        .filter_map(|item| match item {
            Value::Object(_) => field(item, &["subj_id", "subjectId", "id"]).and_then(as_id),
            other => as_id(other),
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
