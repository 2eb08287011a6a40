use crate::db;
use crate::engine::Mark;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Teacher grade entry: patch any of the five exam fields for one
/// student/subject. Values are scores in [0,100] or null to clear; the
/// attendance sentinels are written through attendance.record only.
fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let subject_id = match helpers::require_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_student(conn, req, &class_id, &student_id) {
        return e;
    }
    if let Err(e) = helpers::require_subject(conn, req, &class_id, &subject_id) {
        return e;
    }
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.patch", None);
    };
    if patch.is_empty() {
        return err(&req.id, "bad_params", "patch is empty", None);
    }

    let mut updates: Vec<(&'static str, Mark)> = Vec::new();
    for (key, value) in patch {
        let Some(column) = helpers::grade_column(key) else {
            return err(
                &req.id,
                "bad_params",
                format!("unknown grade field: {}", key),
                None,
            );
        };
        match helpers::parse_score_value(value) {
            Ok(mark) => updates.push((column, mark)),
            Err(msg) => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("patch.{}: {}", key, msg),
                    None,
                )
            }
        }
    }

    for (column, mark) in updates {
        if let Err(e) =
            db::upsert_grade_field(conn, &class_id, &student_id, &subject_id, column, mark)
        {
            return err(&req.id, "db_insert_failed", format!("{e:?}"), None);
        }
    }

    ok(&req.id, json!({ "studentId": student_id, "subjectId": subject_id }))
}

fn handle_grades_get(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let grades = match db::load_subject_grades(conn, &class_id, &student_id) {
        Ok(g) => g,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:?}"), None),
    };
    let rows: Vec<serde_json::Value> = grades
        .iter()
        .map(|g| {
            json!({
                "subjectId": g.subject_id,
                "subjectName": g.subject_name,
                "firstTerm": g.first_term.to_json(),
                "midYear": g.mid_year.to_json(),
                "secondTerm": g.second_term.to_json(),
                "finalExam1st": g.final_exam_1st.to_json(),
                "finalExam2nd": g.final_exam_2nd.to_json(),
            })
        })
        .collect();
    ok(&req.id, json!({ "grades": rows }))
}

/// Attendance boundary: the attendance subsystem records an absence or
/// excusal for a given exam by writing the sentinel straight into the grade
/// cell. Same storage as teacher entry, different writer.
fn handle_attendance_record(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let subject_id = match helpers::require_str(req, "subjectId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let field = match helpers::require_str(req, "field") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let status = match helpers::require_str(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_student(conn, req, &class_id, &student_id) {
        return e;
    }
    if let Err(e) = helpers::require_subject(conn, req, &class_id, &subject_id) {
        return e;
    }
    let Some(column) = helpers::grade_column(&field) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown grade field: {}", field),
            None,
        );
    };
    let mark = match status.as_str() {
        "absent" => Mark::Absent,
        "excused" => Mark::Excused,
        _ => {
            return err(
                &req.id,
                "bad_params",
                "status must be \"absent\" or \"excused\"",
                None,
            )
        }
    };

    match db::upsert_grade_field(conn, &class_id, &student_id, &subject_id, column, mark) {
        Ok(()) => ok(
            &req.id,
            json!({ "studentId": student_id, "subjectId": subject_id, "field": field, "status": status }),
        ),
        Err(e) => err(&req.id, "db_insert_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.update" => Some(handle_grades_update(state, req)),
        "grades.get" => Some(handle_grades_get(state, req)),
        "attendance.record" => Some(handle_attendance_record(state, req)),
        _ => None,
    }
}
