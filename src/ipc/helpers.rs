use rusqlite::{Connection, OptionalExtension};

use super::error::err;
use super::types::{AppState, Request};
use crate::db;
use crate::engine::{self, Mark, StudentComputation};

pub fn require_db<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing params.{}", key), None))
}

pub fn require_class(
    conn: &Connection,
    req: &Request,
    class_id: &str,
) -> Result<(), serde_json::Value> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if found.is_none() {
        return Err(err(&req.id, "not_found", "class not found", None));
    }
    Ok(())
}

pub fn require_student(
    conn: &Connection,
    req: &Request,
    class_id: &str,
    student_id: &str,
) -> Result<(), serde_json::Value> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND class_id = ?",
            (student_id, class_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if found.is_none() {
        return Err(err(&req.id, "not_found", "student not found", None));
    }
    Ok(())
}

pub fn require_subject(
    conn: &Connection,
    req: &Request,
    class_id: &str,
    subject_id: &str,
) -> Result<(), serde_json::Value> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subjects WHERE id = ? AND class_id = ?",
            (subject_id, class_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    if found.is_none() {
        return Err(err(&req.id, "not_found", "subject not found", None));
    }
    Ok(())
}

/// Parse a teacher-entered score value: a number in [0,100] or null to clear.
/// Sentinels go through attendance.record, not through grade entry.
pub fn parse_score_value(v: &serde_json::Value) -> Result<Mark, String> {
    if v.is_null() {
        return Ok(Mark::Unset);
    }
    let Some(n) = v.as_f64() else {
        return Err("score must be a number or null".to_string());
    };
    if !(0.0..=100.0).contains(&n) {
        return Err(format!("score {} out of range [0,100]", n));
    }
    Ok(Mark::Score(n))
}

/// The five grade columns addressable over the wire, with their storage names.
pub fn grade_column(field: &str) -> Option<&'static str> {
    match field {
        "firstTerm" => Some("first_term"),
        "midYear" => Some("mid_year"),
        "secondTerm" => Some("second_term"),
        "finalExam1st" => Some("final_exam_1st"),
        "finalExam2nd" => Some("final_exam_2nd"),
        _ => None,
    }
}

pub struct StudentRow {
    pub id: String,
    pub display_name: String,
    pub active: bool,
}

pub fn list_students(conn: &Connection, class_id: &str) -> anyhow::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, last_name, first_name, active
         FROM students
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            Ok(StudentRow {
                id: r.get(0)?,
                display_name: format!("{}, {}", last, first),
                active: r.get::<_, i64>(3)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Load one student's grades and the class policy, run the full pipeline.
pub fn compute_student_from_db(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> anyhow::Result<StudentComputation> {
    let policy = db::load_policy(conn, class_id)?.unwrap_or_default();
    let grades = db::load_subject_grades(conn, class_id, student_id)?;
    Ok(engine::compute_student(&grades, &policy))
}
