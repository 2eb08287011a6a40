use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::engine::{GradingPolicy, Mark, SubjectGrade};

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("results.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    // The per-class subject list. sort_order is the deterministic tie-break
    // order for grace-point allocation.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_class_sort ON subjects(class_id, sort_order)",
        [],
    )?;

    // Raw grade cells. Nullable REAL with -1 (absent) / -2 (excused) sentinel
    // markers; the attendance subsystem writes the sentinels directly.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subject_grades(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            first_term REAL,
            mid_year REAL,
            second_term REAL,
            final_exam_1st REAL,
            final_exam_2nd REAL,
            updated_at TEXT,
            PRIMARY KEY(student_id, subject_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subject_grades_class ON subject_grades(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grading_policy(
            class_id TEXT PRIMARY KEY,
            pass_threshold INTEGER NOT NULL,
            max_total_decision_points INTEGER NOT NULL,
            max_subjects_eligible INTEGER NOT NULL,
            points_per_subject_cap INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    // Published snapshots for student-facing display, keyed by
    // (student, term). Never read back into the engine.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS published_results(
            student_id TEXT NOT NULL,
            term_key TEXT NOT NULL,
            payload TEXT NOT NULL,
            published_at TEXT NOT NULL,
            PRIMARY KEY(student_id, term_key),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    Ok(conn)
}

pub fn seed_default_policy(conn: &Connection, class_id: &str) -> anyhow::Result<()> {
    let p = GradingPolicy::default();
    conn.execute(
        "INSERT OR IGNORE INTO grading_policy(
            class_id, pass_threshold, max_total_decision_points,
            max_subjects_eligible, points_per_subject_cap
         ) VALUES(?, ?, ?, ?, ?)",
        (
            class_id,
            p.pass_threshold,
            p.max_total_decision_points,
            p.max_subjects_eligible_for_decision,
            p.points_per_subject_cap,
        ),
    )?;
    Ok(())
}

pub fn load_policy(conn: &Connection, class_id: &str) -> anyhow::Result<Option<GradingPolicy>> {
    let row = conn
        .query_row(
            "SELECT pass_threshold, max_total_decision_points,
                    max_subjects_eligible, points_per_subject_cap
             FROM grading_policy WHERE class_id = ?",
            [class_id],
            |r| {
                Ok(GradingPolicy {
                    pass_threshold: r.get(0)?,
                    max_total_decision_points: r.get(1)?,
                    max_subjects_eligible_for_decision: r.get(2)?,
                    points_per_subject_cap: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn save_policy(conn: &Connection, class_id: &str, policy: &GradingPolicy) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO grading_policy(
            class_id, pass_threshold, max_total_decision_points,
            max_subjects_eligible, points_per_subject_cap
         ) VALUES(?, ?, ?, ?, ?)",
        (
            class_id,
            policy.pass_threshold,
            policy.max_total_decision_points,
            policy.max_subjects_eligible_for_decision,
            policy.points_per_subject_cap,
        ),
    )?;
    Ok(())
}

/// One SubjectGrade per class subject in list order, with Unset cells where
/// the student has no stored row yet.
pub fn load_subject_grades(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
) -> anyhow::Result<Vec<SubjectGrade>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name,
                g.first_term, g.mid_year, g.second_term,
                g.final_exam_1st, g.final_exam_2nd
         FROM subjects s
         LEFT JOIN subject_grades g
           ON g.subject_id = s.id AND g.student_id = ?1
         WHERE s.class_id = ?2
         ORDER BY s.sort_order",
    )?;
    let rows = stmt
        .query_map((student_id, class_id), |r| {
            Ok(SubjectGrade {
                subject_id: r.get(0)?,
                subject_name: r.get(1)?,
                first_term: Mark::from_stored(r.get(2)?),
                mid_year: Mark::from_stored(r.get(3)?),
                second_term: Mark::from_stored(r.get(4)?),
                final_exam_1st: Mark::from_stored(r.get(5)?),
                final_exam_2nd: Mark::from_stored(r.get(6)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Merge one field of a grade row, creating the row if needed. The column
/// name comes from a fixed whitelist in the handler, never caller input.
pub fn upsert_grade_field(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    subject_id: &str,
    column: &str,
    mark: Mark,
) -> anyhow::Result<()> {
    let sql = format!(
        "INSERT INTO subject_grades(class_id, student_id, subject_id, {col}, updated_at)
         VALUES(?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
         ON CONFLICT(student_id, subject_id) DO UPDATE
         SET {col} = ?4, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ','now')",
        col = column
    );
    conn.execute(&sql, (class_id, student_id, subject_id, mark.to_stored()))?;
    Ok(())
}
