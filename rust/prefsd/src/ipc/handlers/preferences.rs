use crate::db::SqliteBackend;
use crate::gate::Violation;
use crate::ipc::error::ok;
use crate::ipc::helpers::{catalog_filter, get_i64, get_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{Proficiency, Willingness};
use crate::reconcile::{Session, SessionError};
use crate::working::EditOutcome;
use serde_json::json;
use tracing::info;

const BLOCKED_WARNING: &str = "You can't remove a subject that's already assigned to you.";

fn session_err(e: SessionError, session: &Session) -> HandlerErr {
    let mut details = json!({ "phase": session.phase() });
    if let SessionError::Rejected(Violation::MissingWillingness { subject_ids }) = &e {
        details["subjectIds"] = json!(subject_ids);
        details["count"] = json!(subject_ids.len());
    }
    HandlerErr::new(e.code(), e.to_string()).with_details(details)
}

fn session_view(s: &Session) -> serde_json::Value {
    let (added, updated, removed) = s.diff_views();
    let change_count = added.len() + updated.len() + removed.len();
    let verdict = s.verdict();
    let can_save = crate::gate::can_save(s.working(), s.locks(), change_count);
    json!({
        "professorId": s.professor_id(),
        "phase": s.phase(),
        "degraded": s.degraded(),
        "subjects": s.catalog(),
        "strands": s.strands(),
        "selection": s.selection_summary(),
        "selectedCount": s.working().len(),
        "baselineCount": s.snapshot().len(),
        "lockedIds": s.locks(),
        "diff": {
            "added": added,
            "updated": updated,
            "removed": removed,
        },
        "changeCount": change_count,
        "verdict": {
            "canSave": can_save,
            "violations": verdict.violations,
            "message": verdict.primary().map(Violation::message),
        },
        "lastSavedCount": s.last_saved_count(),
    })
}

fn session_mut<'a>(state: &'a mut AppState, req: &Request) -> Result<&'a mut Session, HandlerErr> {
    let professor_id = get_i64(&req.params, "professorId")?;
    state.sessions.get_mut(&professor_id).ok_or_else(|| {
        HandlerErr::new("no_session", "open the professor's preferences first")
            .with_details(json!({ "professorId": professor_id }))
    })
}

fn prefs_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let professor_id = get_i64(&req.params, "professorId")?;
    let filter = catalog_filter(&req.params);

    let session = Session::open(&SqliteBackend::new(conn), professor_id, &filter);
    let view = session_view(&session);
    if state.sessions.insert(professor_id, session).is_some() {
        info!(professor_id, "reopened preference session; previous edits discarded");
    }
    Ok(view)
}

fn prefs_filter(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, sessions, .. } = state;
    let conn = db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let professor_id = get_i64(&req.params, "professorId")?;
    let session = sessions
        .get_mut(&professor_id)
        .ok_or_else(|| HandlerErr::new("no_session", "open the professor's preferences first"))?;
    session
        .reload_catalog(&SqliteBackend::new(conn), &catalog_filter(&req.params))
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    Ok(session_view(session))
}

fn prefs_refresh_locks(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, sessions, .. } = state;
    let conn = db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let professor_id = get_i64(&req.params, "professorId")?;
    let session = sessions
        .get_mut(&professor_id)
        .ok_or_else(|| HandlerErr::new("no_session", "open the professor's preferences first"))?;
    session
        .refresh_locks(&SqliteBackend::new(conn))
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    Ok(session_view(session))
}

fn prefs_edit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_i64(&req.params, "subjectId")?;
    let session = session_mut(state, req)?;

    let adds = matches!(req.method.as_str(), "prefs.select" | "prefs.toggle")
        && !session.working().is_selected(subject_id);
    if adds && session.subject(subject_id).is_none() {
        return Err(HandlerErr::new(
            "bad_params",
            "subject is not in the catalog; reload it with prefs.filter",
        )
        .with_details(json!({ "subjectId": subject_id })));
    }

    let result = match req.method.as_str() {
        "prefs.toggle" => session.toggle(subject_id),
        "prefs.select" => session.select(subject_id),
        "prefs.deselect" => session.deselect(subject_id),
        "prefs.setProficiency" => {
            let raw = get_str(&req.params, "proficiency")?;
            let level = Proficiency::parse(raw).ok_or_else(|| {
                HandlerErr::new(
                    "bad_params",
                    "proficiency must be one of: beginner, intermediate, advanced",
                )
                .with_details(json!({ "proficiency": raw }))
            })?;
            session.set_proficiency(subject_id, level)
        }
        "prefs.setWillingness" => {
            let raw = get_str(&req.params, "willingness")?;
            let value = Willingness::parse(raw).ok_or_else(|| {
                HandlerErr::new("bad_params", "willingness must be one of: willing, not_willing")
                    .with_details(json!({ "willingness": raw }))
            })?;
            session.set_willingness(subject_id, value)
        }
        other => {
            return Err(HandlerErr::new(
                "not_implemented",
                format!("unknown method: {other}"),
            ))
        }
    };

    let outcome = result.map_err(|e| session_err(e, session))?;
    let mut resp = json!({
        "outcome": outcome.as_str(),
        "view": session_view(session),
    });
    if let EditOutcome::Blocked(id) = outcome {
        resp["warning"] = json!({
            "title": "Assigned subject",
            "message": BLOCKED_WARNING,
            "subjectId": id,
        });
    }
    Ok(resp)
}

fn prefs_view(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = session_mut(state, req)?;
    Ok(session_view(session))
}

fn prefs_request_save(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let session = session_mut(state, req)?;
    match session.request_save() {
        Ok(_) => Ok(session_view(session)),
        Err(e) => Err(session_err(e, session)),
    }
}

fn prefs_cancel(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = session_mut(state, req)?;
    match session.cancel() {
        Ok(()) => Ok(session_view(session)),
        Err(e) => Err(session_err(e, session)),
    }
}

fn prefs_confirm_save(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, sessions, .. } = state;
    let conn = db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let professor_id = get_i64(&req.params, "professorId")?;
    let session = sessions
        .get_mut(&professor_id)
        .ok_or_else(|| HandlerErr::new("no_session", "open the professor's preferences first"))?;

    let mut backend = SqliteBackend::new(conn);
    match session.save(&mut backend) {
        Ok(report) => Ok(json!({
            "savedCount": report.saved_count,
            "added": report.diff.added.len(),
            "updated": report.diff.updated.len(),
            "removed": report.diff.removed.len(),
            "message": "Your subject preferences have been updated.",
            "view": session_view(session),
        })),
        Err(e) => Err(session_err(e, session)),
    }
}

fn prefs_clear(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let AppState { db, sessions, .. } = state;
    let conn = db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let professor_id = get_i64(&req.params, "professorId")?;
    let session = sessions
        .get_mut(&professor_id)
        .ok_or_else(|| HandlerErr::new("no_session", "open the professor's preferences first"))?;

    let mut backend = SqliteBackend::new(conn);
    match session.clear(&mut backend) {
        Ok(report) => {
            let message = if report.kept.is_empty() {
                "All saved subject preferences have been removed."
            } else {
                "Cleared all except subjects already assigned to you."
            };
            Ok(json!({
                "kept": report.kept,
                "dropped": report.dropped,
                "message": message,
                "view": session_view(session),
            }))
        }
        Err(e) => Err(session_err(e, session)),
    }
}

fn prefs_close(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let professor_id = get_i64(&req.params, "professorId")?;
    let closed = state.sessions.remove(&professor_id).is_some();
    Ok(json!({ "professorId": professor_id, "closed": closed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "prefs.open" => prefs_open(state, req),
        "prefs.filter" => prefs_filter(state, req),
        "prefs.refreshLocks" => prefs_refresh_locks(state, req),
        "prefs.toggle" | "prefs.select" | "prefs.deselect" | "prefs.setProficiency"
        | "prefs.setWillingness" => prefs_edit(state, req),
        "prefs.view" => prefs_view(state, req),
        "prefs.requestSave" => prefs_request_save(state, req),
        "prefs.cancel" => prefs_cancel(state, req),
        "prefs.confirmSave" => prefs_confirm_save(state, req),
        "prefs.clear" => prefs_clear(state, req),
        "prefs.close" => prefs_close(state, req),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
