use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;

/// Snapshot the computed results of a class's active students into the
/// published-results store under a term key, for student-facing display.
/// Snapshots are frozen copies; recomputation never rewrites them until the
/// class is published again under the same key.
fn handle_results_publish(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term_key = match helpers::require_str(req, "termKey") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if term_key.trim().is_empty() {
        return err(&req.id, "bad_params", "termKey must not be empty", None);
    }
    if let Err(e) = helpers::require_class(conn, req, &class_id) {
        return e;
    }

    let students = match helpers::list_students(conn, &class_id) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let published_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();

    let mut published = 0_usize;
    for s in students.iter().filter(|s| s.active) {
        let computation = match helpers::compute_student_from_db(conn, &class_id, &s.id) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        };
        let payload = json!({
            "studentId": s.id,
            "displayName": s.display_name,
            "termKey": term_key,
            "subjects": computation.subjects,
            "result": computation.result,
        });
        let payload_text = match serde_json::to_string(&payload) {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
        };
        if let Err(e) = conn.execute(
            "INSERT OR REPLACE INTO published_results(student_id, term_key, payload, published_at)
             VALUES(?, ?, ?, ?)",
            (&s.id, &term_key, &payload_text, &published_at),
        ) {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "published_results" })),
            );
        }
        published += 1;
    }

    ok(
        &req.id,
        json!({ "termKey": term_key, "published": published, "publishedAt": published_at }),
    )
}

fn handle_results_published_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match helpers::require_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let term_key = match helpers::require_str(req, "termKey") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let row: Option<(String, String)> = match conn
        .query_row(
            "SELECT payload, published_at FROM published_results
             WHERE student_id = ? AND term_key = ?",
            (&student_id, &term_key),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((payload_text, published_at)) = row else {
        return err(&req.id, "not_found", "no published result", None);
    };
    let payload: serde_json::Value = match serde_json::from_str(&payload_text) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({ "payload": payload, "publishedAt": published_at }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.publish" => Some(handle_results_publish(state, req)),
        "results.published.get" => Some(handle_results_published_get(state, req)),
        _ => None,
    }
}
