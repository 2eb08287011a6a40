use crate::db;
use crate::engine;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;

/// Pass/fail counts and rate for one subject across a class's active
/// students. Pure fold over each student's computed grade for the subject.
fn handle_stats_subject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subject_id = match helpers::require_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_class(conn, req, &class_id) {
        return e;
    }
    let subject_name: Option<String> = match conn
        .query_row(
            "SELECT name FROM subjects WHERE id = ? AND class_id = ?",
            (&subject_id, &class_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(subject_name) = subject_name else {
        return err(&req.id, "not_found", "subject not found", None);
    };

    let policy = match db::load_policy(conn, &class_id) {
        Ok(p) => p.unwrap_or_default(),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let students = match helpers::list_students(conn, &class_id) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };

    let mut subject_grades = Vec::new();
    for s in students.iter().filter(|s| s.active) {
        let computation = match helpers::compute_student_from_db(conn, &class_id, &s.id) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        };
        if let Some(g) = computation
            .subjects
            .into_iter()
            .find(|g| g.subject_id == subject_id)
        {
            subject_grades.push(g);
        }
    }

    let stats = engine::subject_statistics(&subject_grades, &policy);
    let mut result = serde_json::to_value(stats).unwrap_or_else(|_| json!({}));
    result["subjectId"] = json!(subject_id);
    result["subjectName"] = json!(subject_name);
    ok(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.subject" => Some(handle_stats_subject(state, req)),
        _ => None,
    }
}
