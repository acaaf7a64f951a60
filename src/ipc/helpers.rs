use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

use super::error::err;
use super::types::AppState;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn db_err(code: &'static str) -> impl Fn(rusqlite::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, e.to_string())
}

pub fn require_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing numeric {}", key)))
}

pub fn get_required_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing integer {}", key)))
}

/// Look up a class the caller owns. `not_found` covers both a missing class
/// and one owned by somebody else, so callers learn nothing about other
/// tenants' data.
pub fn get_owned_class(
    conn: &Connection,
    class_id: &str,
    user_id: &str,
) -> Result<(i64, String), HandlerErr> {
    conn.query_row(
        "SELECT year_group, subject FROM classes WHERE id = ? AND user_id = ?",
        [class_id, user_id],
        |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
    )
    .optional()
    .map_err(db_err("db_query_failed"))?
    .ok_or_else(|| {
        HandlerErr::with_details("not_found", "class not found", json!({ "classId": class_id }))
    })
}

/// Look up a student the caller owns; returns (name, surname, class_id).
pub fn get_owned_student(
    conn: &Connection,
    student_id: &str,
    user_id: &str,
) -> Result<(String, String, String), HandlerErr> {
    conn.query_row(
        "SELECT name, surname, class_id FROM students WHERE id = ? AND user_id = ?",
        [student_id, user_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .optional()
    .map_err(db_err("db_query_failed"))?
    .ok_or_else(|| {
        HandlerErr::with_details(
            "not_found",
            "student not found",
            json!({ "studentId": student_id }),
        )
    })
}

pub fn user_exists(conn: &Connection, user_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM users WHERE id = ?", [user_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(db_err("db_query_failed"))
}

/// Every authenticated method carries an explicit userId; there is no
/// ambient session. Rejects callers the database has never seen.
pub fn get_caller(conn: &Connection, params: &serde_json::Value) -> Result<String, HandlerErr> {
    let user_id = get_required_str(params, "userId")?;
    if !user_exists(conn, &user_id)? {
        return Err(HandlerErr::new("unauthorized", "unknown userId"));
    }
    Ok(user_id)
}
