use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match helpers::require_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = name.trim().to_string();
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name) VALUES(?, ?)",
        (&class_id, &name),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }
    if let Err(e) = db::seed_default_policy(conn, &class_id) {
        return err(&req.id, "db_insert_failed", format!("{e:?}"), None);
    }

    ok(&req.id, json!({ "classId": class_id }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare("SELECT id, name FROM classes ORDER BY name") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Result<Vec<serde_json::Value>, _> = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect());
    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Replace the class's ordered subject list. Subjects are matched by name so
/// reordering or renaming-free updates keep ids (and grade rows); removed
/// subjects lose their grade rows.
fn handle_subjects_set(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let Some(names) = req.params.get("subjects").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing params.subjects", None);
    };
    let mut wanted: Vec<String> = Vec::with_capacity(names.len());
    for v in names {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "subjects must be strings", None);
        };
        let s = s.trim();
        if s.is_empty() {
            return err(&req.id, "bad_params", "subject name must not be empty", None);
        }
        if wanted.iter().any(|w| w == s) {
            return err(
                &req.id,
                "bad_params",
                format!("duplicate subject name: {}", s),
                None,
            );
        }
        wanted.push(s.to_string());
    }

    let existing: Result<HashMap<String, String>, rusqlite::Error> = conn
        .prepare("SELECT name, id FROM subjects WHERE class_id = ?")
        .and_then(|mut stmt| {
            stmt.query_map([&class_id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })
            .and_then(|it| it.collect())
        });
    let existing = match existing {
        Ok(m) => m,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Drop subjects no longer listed, along with their grade rows.
    for (name, id) in &existing {
        if wanted.iter().any(|w| w == name) {
            continue;
        }
        if let Err(e) = conn
            .execute("DELETE FROM subject_grades WHERE subject_id = ?", [id])
            .and_then(|_| conn.execute("DELETE FROM subjects WHERE id = ?", [id]))
        {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }

    let mut out = Vec::with_capacity(wanted.len());
    for (i, name) in wanted.iter().enumerate() {
        let result = match existing.get(name) {
            Some(id) => conn
                .execute(
                    "UPDATE subjects SET sort_order = ? WHERE id = ?",
                    (i as i64, id),
                )
                .map(|_| id.clone()),
            None => {
                let id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO subjects(id, class_id, name, sort_order) VALUES(?, ?, ?, ?)",
                    (&id, &class_id, name, i as i64),
                )
                .map(|_| id)
            }
        };
        match result {
            Ok(id) => out.push(json!({ "id": id, "name": name, "sortOrder": i })),
            Err(e) => return err(&req.id, "db_insert_failed", e.to_string(), None),
        }
    }

    ok(&req.id, json!({ "subjects": out }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match helpers::require_db(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match helpers::require_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut stmt = match conn.prepare(
        "SELECT id, name, sort_order FROM subjects WHERE class_id = ? ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Result<Vec<serde_json::Value>, _> = stmt
        .query_map([&class_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "sortOrder": r.get::<_, i64>(2)?,
            }))
        })
        .and_then(|it| it.collect());
    match rows {
        Ok(subjects) => ok(&req.id, json!({ "subjects": subjects })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.list" => Some(handle_classes_list(state, req)),
        "subjects.set" => Some(handle_subjects_set(state, req)),
        "subjects.list" => Some(handle_subjects_list(state, req)),
        _ => None,
    }
}
