use crate::boundaries;
use crate::calc;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, get_caller, get_owned_class, get_owned_student, get_required_str, require_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

const NAME_MAX_LEN: usize = 20;

fn validate_names(params: &serde_json::Value) -> Result<(String, String), HandlerErr> {
    let name = get_required_str(params, "name")?.trim().to_string();
    let surname = get_required_str(params, "surname")?.trim().to_string();
    if name.is_empty() || surname.is_empty() {
        return Err(HandlerErr::new("bad_params", "name and surname are required"));
    }
    if name.chars().count() > NAME_MAX_LEN || surname.chars().count() > NAME_MAX_LEN {
        return Err(HandlerErr::new(
            "bad_params",
            "name and surname must be 20 characters or fewer",
        ));
    }
    Ok((name, surname))
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    get_owned_class(conn, &class_id, &user_id)?;

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

    Ok(json!({ "students": students }))
}

fn create(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    get_owned_class(conn, &class_id, &user_id)?;
    let (name, surname) = validate_names(params)?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, name, surname, class_id, user_id) VALUES(?, ?, ?, ?, ?)",
        (&student_id, &name, &surname, &class_id, &user_id),
    )
    .map_err(db_err("db_insert_failed"))?;

    Ok(json!({ "studentId": student_id, "name": name, "surname": surname }))
}

fn update(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let student_id = get_required_str(params, "studentId")?;
    get_owned_student(conn, &student_id, &user_id)?;
    let (name, surname) = validate_names(params)?;

    conn.execute(
        "UPDATE students SET name = ?, surname = ? WHERE id = ?",
        (&name, &surname, &student_id),
    )
    .map_err(db_err("db_update_failed"))?;

    Ok(json!({ "studentId": student_id, "name": name, "surname": surname }))
}

fn delete(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let student_id = get_required_str(params, "studentId")?;
    let (_, _, class_id) = get_owned_student(conn, &student_id, &user_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    tx.execute("DELETE FROM grades WHERE student_id = ?", [&student_id])
        .map_err(db_err("db_delete_failed"))?;
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(db_err("db_delete_failed"))?;
    tx.commit().map_err(db_err("db_tx_failed"))?;

    Ok(json!({ "studentId": student_id, "classId": class_id, "deleted": true }))
}

fn overview(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let student_id = get_required_str(params, "studentId")?;
    let (name, surname, class_id) = get_owned_student(conn, &student_id, &user_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, assessment_name, score, date
             FROM grades
             WHERE student_id = ?
             ORDER BY date",
        )
        .map_err(db_err("db_query_failed"))?;
    let mut scores: Vec<f64> = Vec::new();
    let grades = stmt
        .query_map([&student_id], |r| {
            let id: String = r.get(0)?;
            let assessment_name: String = r.get(1)?;
            let score: f64 = r.get(2)?;
            let date: String = r.get(3)?;
            Ok((score, json!({
                "id": id,
                "assessmentName": assessment_name,
                "score": score,
                "date": date
            })))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?
        .into_iter()
        .map(|(score, value)| {
            scores.push(score);
            value
        })
        .collect::<Vec<_>>();

    let average = calc::mean(scores.iter().copied());
    let grade = match average {
        Some(avg) => boundaries::resolve_grade(conn, &class_id, avg)
            .map_err(db_err("db_query_failed"))?,
        None => None,
    };

    Ok(json!({
        "studentId": student_id,
        "classId": class_id,
        "name": name,
        "surname": surname,
        "grades": grades,
        "average": average,
        "grade": grade
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => list(state, &req.params),
        "students.create" => create(state, &req.params),
        "students.update" => update(state, &req.params),
        "students.delete" => delete(state, &req.params),
        "students.overview" => overview(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
