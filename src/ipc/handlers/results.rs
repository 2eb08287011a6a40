use crate::db;
use crate::engine::{Mark, Status};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn computation_json(computation: &crate::engine::StudentComputation) -> serde_json::Value {
    serde_json::to_value(computation).unwrap_or_else(|_| json!({}))
}

fn handle_results_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match helpers::require_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_student(conn, req, &class_id, &student_id) {
        return e;
    }

    match helpers::compute_student_from_db(conn, &class_id, &student_id) {
        Ok(computation) => {
            let mut result = computation_json(&computation);
            result["studentId"] = json!(student_id);
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

fn handle_results_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_class(conn, req, &class_id) {
        return e;
    }

    let students = match helpers::list_students(conn, &class_id) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let mut rows = Vec::with_capacity(students.len());
    for s in &students {
        let computation = match helpers::compute_student_from_db(conn, &class_id, &s.id) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
        };
        let mut row = computation_json(&computation);
        row["studentId"] = json!(s.id);
        row["displayName"] = json!(s.display_name);
        row["active"] = json!(s.active);
        rows.push(row);
    }
    ok(&req.id, json!({ "students": rows }))
}

/// Record completion-exam scores for a student who must sit them, then
/// resolve the completion round. Scores are keyed by subjectId and may be a
/// number, "absent", or "excused".
fn handle_results_completion(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match helpers::require_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_student(conn, req, &class_id, &student_id) {
        return e;
    }
    let Some(scores) = req.params.get("scores").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.scores", None);
    };
    if scores.is_empty() {
        return err(&req.id, "bad_params", "scores is empty", None);
    }

    let before = match helpers::compute_student_from_db(conn, &class_id, &student_id) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    if before.first_round.status != Status::MustSitCompletion {
        return err(
            &req.id,
            "bad_params",
            format!(
                "student is not scheduled for completion exams (status: {:?})",
                before.first_round.status
            ),
            None,
        );
    }

    let policy = match db::load_policy(conn, &class_id) {
        Ok(p) => p.unwrap_or_default(),
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let failing_ids: Vec<&str> = before
        .subjects
        .iter()
        .filter(|g| {
            !g.is_exempt
                && matches!(g.final_grade_with_decision, Some(v) if v < policy.pass_threshold)
        })
        .map(|g| g.subject_id.as_str())
        .collect();

    let mut updates: Vec<(String, Mark)> = Vec::with_capacity(scores.len());
    for (subject_id, value) in scores {
        if !failing_ids.contains(&subject_id.as_str()) {
            return err(
                &req.id,
                "bad_params",
                format!("subject {} is not awaiting a completion exam", subject_id),
                None,
            );
        }
        let mark = if let Some(s) = value.as_str() {
            match s {
                "absent" => Mark::Absent,
                "excused" => Mark::Excused,
                _ => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("scores.{}: unknown status {}", subject_id, s),
                        None,
                    )
                }
            }
        } else {
            match helpers::parse_score_value(value) {
                Ok(Mark::Unset) => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("scores.{} must not be null", subject_id),
                        None,
                    )
                }
                Ok(m) => m,
                Err(msg) => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("scores.{}: {}", subject_id, msg),
                        None,
                    )
                }
            }
        };
        updates.push((subject_id.clone(), mark));
    }

    for (subject_id, mark) in &updates {
        if let Err(e) = db::upsert_grade_field(
            conn,
            &class_id,
            &student_id,
            subject_id,
            "final_exam_2nd",
            *mark,
        ) {
            return err(&req.id, "db_insert_failed", format!("{e:?}"), None);
        }
    }

    match helpers::compute_student_from_db(conn, &class_id, &student_id) {
        Ok(computation) => {
            let mut result = computation_json(&computation);
            result["studentId"] = json!(student_id);
            ok(&req.id, result)
        }
        Err(e) => err(&req.id, "db_query_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.student" => Some(handle_results_student(state, req)),
        "results.class" => Some(handle_results_class(state, req)),
        "results.completion" => Some(handle_results_completion(state, req)),
        _ => None,
    }
}
