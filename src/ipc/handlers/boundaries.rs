use crate::boundaries;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    db_err, get_caller, get_owned_class, get_required_f64, get_required_str, require_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Full-replace upload of a class's boundary set from CSV content.
/// Validation runs entirely before the destructive delete+insert, and the
/// replacement itself is one transaction, so a failed upload leaves the
/// prior active set untouched.
fn upload(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    let (_, subject) = get_owned_class(conn, &class_id, &user_id)?;
    let content = get_required_str(params, "content")?;

    let rules = boundaries::parse_boundary_csv(&content, &subject)
        .map_err(|e| HandlerErr::with_details(e.code(), e.message(), e.details()))?;

    let written = boundaries::replace_boundaries(conn, &class_id, &subject, &rules)
        .map_err(db_err("db_tx_failed"))?;

    Ok(json!({ "classId": class_id, "subject": subject, "rulesWritten": written }))
}

fn list(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    let (_, subject) = get_owned_class(conn, &class_id, &user_id)?;

    let rules = boundaries::list_boundaries(conn, &class_id).map_err(db_err("db_query_failed"))?;
    let rules_json: Vec<serde_json::Value> = rules
        .iter()
        .map(|b| {
            json!({
                "grade": b.grade,
                "lowerBound": b.lower_bound,
                "upperBound": b.upper_bound
            })
        })
        .collect();

    Ok(json!({ "classId": class_id, "subject": subject, "boundaries": rules_json }))
}

fn resolve(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_conn(state)?;
    let user_id = get_caller(conn, params)?;
    let class_id = get_required_str(params, "classId")?;
    get_owned_class(conn, &class_id, &user_id)?;
    let score = get_required_f64(params, "score")?;

    // A null grade is "undetermined", not a failure.
    let grade = boundaries::resolve_grade(conn, &class_id, score)
        .map_err(db_err("db_query_failed"))?;

    Ok(json!({ "classId": class_id, "score": score, "grade": grade }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "boundaries.upload" => upload(state, &req.params),
        "boundaries.list" => list(state, &req.params),
        "boundaries.resolve" => resolve(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
