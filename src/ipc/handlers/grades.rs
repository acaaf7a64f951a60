use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, get_caller, get_owned_student, get_required_f64, get_required_str, require_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::{Local, NaiveDate};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const ALLOWED_ASSESSMENTS: [&str; 4] = ["Paper 1", "Paper 2", "Paper 3", "Cycle Test"];

struct GradeInput {
    assessment_name: String,
    score: f64,
    date: String,
}

/// Score range enforcement happens here, at grade entry; the boundary
/// resolver deliberately accepts any score.
fn validate_grade_fields(params: &serde_json::Value) -> Result<GradeInput, HandlerErr> {
    let assessment_name = get_required_str(params, "assessmentName")?;
    if !ALLOWED_ASSESSMENTS.contains(&assessment_name.as_str()) {
        return Err(HandlerErr::with_details(
            "bad_params",
            "invalid assessment name selected",
            json!({ "assessmentName": assessment_name, "allowed": ALLOWED_ASSESSMENTS }),
        ));
    }

    let score = get_required_f64(params, "score")?;
    if !(0.0..=100.0).contains(&score) {
        return Err(HandlerErr::with_details(
            "bad_params",
            "score must be a number between 0 and 100",
            json!({ "score": score }),
        ));
    }

    let date_str = get_required_str(params, "date")?;
    let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", "invalid date format, expected YYYY-MM-DD"))?;
    if date > Local::now().date_naive() {
        return Err(HandlerErr::new("bad_params", "date cannot be in the future"));
    }

    Ok(GradeInput {
        assessment_name,
        score,
        date: date.format("%Y-%m-%d").to_string(),
    })
}

/// Look up a grade the caller owns; returns its student_id.
fn get_owned_grade(
    conn: &rusqlite::Connection,
    grade_id: &str,
    user_id: &str,
) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT student_id FROM grades WHERE id = ? AND user_id = ?",
        [grade_id, user_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(db_err("db_query_failed"))?
    .ok_or_else(|| {
        HandlerErr::with_details("not_found", "grade not found", json!({ "gradeId": grade_id }))
    })
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let student_id = get_required_str(params, "studentId")?;
    get_owned_student(conn, &student_id, &user_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, assessment_name, score, date
             FROM grades
             WHERE student_id = ?
             ORDER BY date",
        )
        .map_err(db_err("db_query_failed"))?;
    let grades = stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let assessment_name: String = r.get(1)?;
            let score: f64 = r.get(2)?;
            let date: String = r.get(3)?;
            Ok(json!({
                "id": id,
                "assessmentName": assessment_name,
                "score": score,
                "date": date
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;

    Ok(json!({ "grades": grades }))
}

fn add(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let student_id = get_required_str(params, "studentId")?;
    get_owned_student(conn, &student_id, &user_id)?;
    let input = validate_grade_fields(params)?;

    let grade_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, assessment_name, score, date, student_id, user_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &grade_id,
            &input.assessment_name,
            input.score,
            &input.date,
            &student_id,
            &user_id,
        ),
    )
    .map_err(db_err("db_insert_failed"))?;

    Ok(json!({
        "gradeId": grade_id,
        "assessmentName": input.assessment_name,
        "score": input.score,
        "date": input.date
    }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let grade_id = get_required_str(params, "gradeId")?;
    let student_id = get_owned_grade(conn, &grade_id, &user_id)?;
    let input = validate_grade_fields(params)?;

    conn.execute(
        "UPDATE grades SET assessment_name = ?, score = ?, date = ? WHERE id = ?",
        (&input.assessment_name, input.score, &input.date, &grade_id),
    )
    .map_err(db_err("db_update_failed"))?;

    Ok(json!({
        "gradeId": grade_id,
        "studentId": student_id,
        "assessmentName": input.assessment_name,
        "score": input.score,
        "date": input.date
    }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let grade_id = get_required_str(params, "gradeId")?;
    let student_id = get_owned_grade(conn, &grade_id, &user_id)?;

    conn.execute("DELETE FROM grades WHERE id = ?", [&grade_id])
        .map_err(db_err("db_delete_failed"))?;

    Ok(json!({ "gradeId": grade_id, "studentId": student_id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.list" => list(state, &req.params),
        "grades.add" => add(state, &req.params),
        "grades.update" => update(state, &req.params),
        "grades.delete" => delete(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
