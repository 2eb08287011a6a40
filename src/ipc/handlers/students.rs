use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let last_name = match helpers::require_str(req, "lastName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let first_name = match helpers::require_str(req, "firstName") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = helpers::require_class(conn, req, &class_id) {
        return e;
    }

    let student_no = req
        .params
        .get("studentNo")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let sort_order: i64 = match conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_id = ?",
        [&class_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, student_no, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
        (
            &student_id,
            &class_id,
            last_name.trim(),
            first_name.trim(),
            student_no.as_deref(),
            if active { 1 } else { 0 },
            sort_order,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, last_name, first_name, student_no, active, sort_order
         FROM students WHERE class_id = ? ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Result<Vec<serde_json::Value>, _> = stmt
        .query_map([&class_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "lastName": r.get::<_, String>(1)?,
                "firstName": r.get::<_, String>(2)?,
                "studentNo": r.get::<_, Option<String>>(3)?,
                "active": r.get::<_, i64>(4)? != 0,
                "sortOrder": r.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect());
    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing params.patch", None);
    };

    let mut sets: Vec<String> = Vec::new();
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();
    for (key, column) in [
        ("lastName", "last_name"),
        ("firstName", "first_name"),
        ("studentNo", "student_no"),
    ] {
        if let Some(v) = patch.get(key) {
            if v.is_null() && key == "studentNo" {
                sets.push(format!("{} = NULL", column));
                continue;
            }
            let Some(s) = v.as_str() else {
                return err(
                    &req.id,
                    "bad_params",
                    format!("patch.{} must be a string", key),
                    None,
                );
            };
            sets.push(format!("{} = ?", column));
            binds.push(rusqlite::types::Value::Text(s.trim().to_string()));
        }
    }
    if let Some(v) = patch.get("active") {
        let Some(b) = v.as_bool() else {
            return err(&req.id, "bad_params", "patch.active must be a bool", None);
        };
        sets.push("active = ?".to_string());
        binds.push(rusqlite::types::Value::Integer(if b { 1 } else { 0 }));
    }
    if sets.is_empty() {
        return err(&req.id, "bad_params", "patch is empty", None);
    }

    let sql = format!(
        "UPDATE students SET {}, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now') WHERE id = ?",
        sets.join(", ")
    );
    binds.push(rusqlite::types::Value::Text(student_id.clone()));
    match conn.execute(&sql, rusqlite::params_from_iter(binds)) {
        Ok(_) => ok(&req.id, json!({ "studentId": student_id })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let result = conn
        .execute("DELETE FROM subject_grades WHERE student_id = ?", [&student_id])
        .and_then(|_| {
            conn.execute(
                "DELETE FROM published_results WHERE student_id = ?",
                [&student_id],
            )
        })
        .and_then(|_| conn.execute("DELETE FROM students WHERE id = ?", [&student_id]));
    match result {
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(&req.id, "db_insert_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
