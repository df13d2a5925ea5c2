use crate::backend::PreferenceBackend;
use crate::db::SqliteBackend;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{catalog_filter, get_i64, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model;
use crate::normalize;
use serde_json::json;

fn handle_catalog_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(items) = req.params.get("subjects").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing subjects", None);
    };

    let mut subjects = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match normalize::subject_from_value(item) {
            Some(s) => subjects.push(s),
            None => rejected.push(i),
        }
    }

    match SqliteBackend::new(conn).upsert_subjects(&subjects) {
        Ok(n) => ok(
            &req.id,
            json!({ "imported": n, "rejected": rejected }),
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "subjects" })),
        ),
    }
}

fn handle_catalog_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "subjects": [], "strands": [] }));
    };
    let filter = catalog_filter(&req.params);
    match SqliteBackend::new(conn).load_catalog(&filter) {
        Ok(subjects) => {
            let strands = model::strands(&subjects);
            ok(&req.id, json!({ "subjects": subjects, "strands": strands }))
        }
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn assignments_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let professor_id = get_i64(&req.params, "professorId")?;
    let raw = req
        .params
        .get("subjectIds")
        .ok_or_else(|| HandlerErr::new("bad_params", "missing subjectIds"))?;
    let ids = normalize::subject_ids_from_value(raw);

    let count = SqliteBackend::new(conn)
        .set_assignments(professor_id, &ids)
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", format!("{e:#}"))
                .with_details(json!({ "table": "subject_assignments" }))
        })?;
    Ok(json!({ "professorId": professor_id, "count": count }))
}

/// Seeds a professor's persisted preferences from loosely-typed records, replacing
/// whatever was stored. Open sessions keep their baseline until reopened.
fn preferences_import(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let conn = state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let professor_id = get_i64(&req.params, "professorId")?;
    let items = req
        .params
        .get("preferences")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::new("bad_params", "missing preferences"))?;

    let mut entries = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match normalize::preference_from_value(item) {
            Some(e) => entries.push(e),
            None => rejected.push(i),
        }
    }

    let imported = SqliteBackend::new(conn)
        .replace_preferences(professor_id, &entries)
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", format!("{e:#}"))
                .with_details(json!({ "table": "subject_preferences" }))
        })?;
    Ok(json!({ "professorId": professor_id, "imported": imported, "rejected": rejected }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.import" => Some(handle_catalog_import(state, req)),
        "catalog.list" => Some(handle_catalog_list(state, req)),
        "assignments.set" => Some(match assignments_set(state, req) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        "preferences.import" => Some(match preferences_import(state, req) {
            Ok(v) => ok(&req.id, v),
            Err(e) => e.response(&req.id),
        }),
        _ => None,
    }
}
