use crate::boundaries;
use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, get_caller, get_owned_class, get_required_i64, get_required_str, require_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const ALLOWED_SUBJECTS: [&str; 2] = ["Maths AA SL", "Maths AA HL"];
const YEAR_GROUP_MIN: i64 = 1;
const YEAR_GROUP_MAX: i64 = 13;

fn validate_class_fields(params: &serde_json::Value) -> Result<(i64, String), HandlerErr> {
    let year_group = get_required_i64(params, "yearGroup")?;
    if !(YEAR_GROUP_MIN..=YEAR_GROUP_MAX).contains(&year_group) {
        return Err(HandlerErr::with_details(
            "bad_params",
            "year group must be an integer between 1 and 13",
            json!({ "yearGroup": year_group }),
        ));
    }
    let subject = get_required_str(params, "subject")?;
    if !ALLOWED_SUBJECTS.contains(&subject.as_str()) {
        return Err(HandlerErr::with_details(
            "bad_params",
            "invalid subject selected",
            json!({ "subject": subject, "allowed": ALLOWED_SUBJECTS }),
        ));
    }
    Ok((year_group, subject))
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;

    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.year_group,
               c.subject,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
             FROM classes c
             WHERE c.user_id = ?
             ORDER BY c.year_group, c.subject",
        )
        .map_err(db_err("db_query_failed"))?;
    let classes = stmt
        .query_map([&user_id], |row| {
            let id: String = row.get(0)?;
            let year_group: i64 = row.get(1)?;
            let subject: String = row.get(2)?;
            let student_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "yearGroup": year_group,
                "subject": subject,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    Ok(json!({ "classes": classes }))
}

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let (year_group, subject) = validate_class_fields(params)?;

    let class_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, year_group, subject, user_id) VALUES(?, ?, ?, ?)",
        (&class_id, year_group, &subject, &user_id),
    )
    .map_err(db_err("db_insert_failed"))?;

    Ok(json!({ "classId": class_id, "yearGroup": year_group, "subject": subject }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    get_owned_class(conn, &class_id, &user_id)?;
    let (year_group, subject) = validate_class_fields(params)?;

    conn.execute(
        "UPDATE classes SET year_group = ?, subject = ? WHERE id = ?",
        (year_group, &subject, &class_id),
    )
    .map_err(db_err("db_update_failed"))?;

    Ok(json!({ "classId": class_id, "yearGroup": year_group, "subject": subject }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    get_owned_class(conn, &class_id, &user_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;

    // Explicit delete order (no ON DELETE CASCADE): grades, boundaries,
    // students, then the class row.
    tx.execute(
        "DELETE FROM grades
         WHERE student_id IN (SELECT id FROM students WHERE class_id = ?)",
        [&class_id],
    )
    .map_err(db_err("db_delete_failed"))?;
    tx.execute("DELETE FROM grade_boundaries WHERE class_id = ?", [&class_id])
        .map_err(db_err("db_delete_failed"))?;
    tx.execute("DELETE FROM students WHERE class_id = ?", [&class_id])
        .map_err(db_err("db_delete_failed"))?;
    tx.execute("DELETE FROM classes WHERE id = ?", [&class_id])
        .map_err(db_err("db_delete_failed"))?;

    tx.commit().map_err(db_err("db_tx_failed"))?;
    Ok(json!({ "classId": class_id, "deleted": true }))
}

fn class_grade_points(
    conn: &Connection,
    class_id: &str,
) -> Result<Vec<(NaiveDate, f64)>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT g.date, g.score
             FROM grades g
             JOIN students s ON s.id = g.student_id
             WHERE s.class_id = ?",
        )
        .map_err(db_err("db_query_failed"))?;
    let raw: Vec<(String, f64)> = stmt
        .query_map([class_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    raw.into_iter()
        .map(|(date, score)| {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map(|d| (d, score))
                .map_err(|_| {
                    HandlerErr::with_details(
                        "db_query_failed",
                        "stored grade date is not YYYY-MM-DD",
                        json!({ "date": date }),
                    )
                })
        })
        .collect()
}

fn overview(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    let (year_group, subject) = get_owned_class(conn, &class_id, &user_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, name, surname FROM students WHERE class_id = ? ORDER BY surname, name",
        )
        .map_err(db_err("db_query_failed"))?;
    let students = stmt
        .query_map([&class_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let surname: String = r.get(2)?;
            Ok(json!({ "id": id, "name": name, "surname": surname }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    let series = calc::progress_series(class_grade_points(conn, &class_id)?);
    // The original charts the class average as the mean of daily averages,
    // not the mean of all scores.
    let class_average = calc::mean(series.iter().map(|p| p.average));
    let class_grade = match class_average {
        Some(avg) => boundaries::resolve_grade(conn, &class_id, avg)
            .map_err(db_err("db_query_failed"))?,
        None => None,
    };

    let series_json: Vec<serde_json::Value> = series
        .iter()
        .map(|p| {
            json!({
                "date": p.date.format("%Y-%m-%d").to_string(),
                "average": p.average,
                "sampleCount": p.sample_count
            })
        })
        .collect();

    Ok(json!({
        "classId": class_id,
        "yearGroup": year_group,
        "subject": subject,
        "students": students,
        "series": series_json,
        "classAverage": class_average,
        "classGrade": class_grade
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => list(state, &req.params),
        "classes.create" => create(state, &req.params),
        "classes.update" => update(state, &req.params),
        "classes.delete" => delete(state, &req.params),
        "classes.overview" => overview(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
